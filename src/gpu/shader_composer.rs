use std::borrow::Cow;

use naga_oil::compose::{
    ComposableModuleDescriptor, Composer, ComposerError, NagaModuleDescriptor, ShaderLanguage,
    ShaderType,
};

use crate::gpu::shader_registry::ShaderKind;

/// Wraps `naga_oil::compose::Composer` so tile shaders can `#import` the
/// shared WGSL modules.
///
/// Consuming shaders use `#import tessera::module_name`. Composition yields
/// `naga::Module` IR directly, so nothing is re-parsed when the device
/// builds the shader module.
pub struct ShaderComposer {
    composer: Composer,
}

struct ModuleDef {
    source: &'static str,
    file_path: &'static str,
}

/// Shared modules, dependencies first.
const MODULES: &[ModuleDef] = &[
    ModuleDef {
        source: include_str!("../../assets/shaders/modules/tile.wgsl"),
        file_path: "modules/tile.wgsl",
    },
    ModuleDef {
        source: include_str!("../../assets/shaders/modules/ycbcr.wgsl"),
        file_path: "modules/ycbcr.wgsl",
    },
];

impl ShaderComposer {
    /// Composer with every shared module registered.
    ///
    /// # Errors
    ///
    /// The composer error of the first module that fails to register.
    pub fn new() -> Result<Self, Box<ComposerError>> {
        let mut composer = Composer::default();
        for m in MODULES {
            let _ = composer
                .add_composable_module(ComposableModuleDescriptor {
                    source: m.source,
                    file_path: m.file_path,
                    language: ShaderLanguage::Wgsl,
                    ..Default::default()
                })
                .map_err(Box::new)?;
        }
        Ok(Self { composer })
    }

    /// Compose the program for `kind` into a `wgpu::ShaderModule`.
    ///
    /// # Errors
    ///
    /// The composer error if the source does not compose.
    pub fn compose(
        &mut self,
        device: &wgpu::Device,
        kind: ShaderKind,
    ) -> Result<wgpu::ShaderModule, Box<ComposerError>> {
        let naga_module = self.compose_naga(kind.source(), kind.file_path())?;
        Ok(device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(kind.name()),
            source: wgpu::ShaderSource::Naga(Cow::Owned(naga_module)),
        }))
    }

    /// Compose a shader source into a `naga::Module` without a device.
    ///
    /// # Errors
    ///
    /// The composer error if the source does not compose.
    pub fn compose_naga(
        &mut self,
        source: &str,
        file_path: &str,
    ) -> Result<naga::Module, Box<ComposerError>> {
        self.composer
            .make_naga_module(NagaModuleDescriptor {
                source,
                file_path,
                shader_type: ShaderType::Wgsl,
                ..Default::default()
            })
            .map_err(Box::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_program_composes() {
        let mut composer = ShaderComposer::new().unwrap();
        for kind in ShaderKind::ALL {
            let module = composer
                .compose_naga(kind.source(), kind.file_path())
                .unwrap_or_else(|e| panic!("shader '{kind}' failed to compose: {e}"));
            let entry_points: Vec<&str> =
                module.entry_points.iter().map(|ep| ep.name.as_str()).collect();
            assert!(entry_points.contains(&"vs_main"));
            assert!(entry_points.contains(&"fs_main"));
        }
    }
}
