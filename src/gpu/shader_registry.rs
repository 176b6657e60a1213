//! Per-context cache of compiled shader programs.

use std::fmt;
use std::str::FromStr;

use rustc_hash::FxHashMap;

use crate::error::ConfigError;
use crate::gpu::driver::ProgramId;
use crate::pixel::format::PixelFormat;

/// Programs the texture layer draws with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderKind {
    /// Plain textured quads.
    Standard,
    /// Planar 4:2:0 to RGB, limited range (BT.601 video levels).
    YCbCr420p,
    /// Planar 4:2:0 to RGB, full range (JPEG levels).
    YCbCrJ420p,
}

impl ShaderKind {
    /// Every program kind.
    pub const ALL: [Self; 3] = [Self::Standard, Self::YCbCr420p, Self::YCbCrJ420p];

    /// Program needed to display textures of format `pf`.
    #[must_use]
    pub const fn for_pixel_format(pf: PixelFormat) -> Self {
        match pf {
            PixelFormat::YCbCr420p => Self::YCbCr420p,
            PixelFormat::YCbCrJ420p => Self::YCbCrJ420p,
            _ => Self::Standard,
        }
    }

    /// Canonical name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::YCbCr420p => "ycbcr420p",
            Self::YCbCrJ420p => "ycbcrj420p",
        }
    }

    /// WGSL source, possibly with `#import` directives.
    #[must_use]
    pub const fn source(self) -> &'static str {
        match self {
            Self::Standard => include_str!("../../assets/shaders/textured.wgsl"),
            Self::YCbCr420p => include_str!("../../assets/shaders/ycbcr420p.wgsl"),
            Self::YCbCrJ420p => include_str!("../../assets/shaders/ycbcrj420p.wgsl"),
        }
    }

    /// Path the source is reported under in composition errors.
    #[must_use]
    pub const fn file_path(self) -> &'static str {
        match self {
            Self::Standard => "textured.wgsl",
            Self::YCbCr420p => "ycbcr420p.wgsl",
            Self::YCbCrJ420p => "ycbcrj420p.wgsl",
        }
    }

    /// Whether the program samples three planes.
    #[must_use]
    pub const fn is_planar(self) -> bool {
        !matches!(self, Self::Standard)
    }
}

impl fmt::Display for ShaderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ShaderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| ConfigError::UnknownShader(s.to_owned()))
    }
}

/// Compiled programs, one per kind, created on first request.
#[derive(Debug, Default)]
pub struct ShaderRegistry {
    programs: FxHashMap<ShaderKind, ProgramId>,
}

impl ShaderRegistry {
    /// Program for `kind`, compiling it with `compile` on first request.
    ///
    /// # Errors
    ///
    /// Whatever `compile` returns; nothing is cached on failure.
    pub fn get_or_compile<E>(
        &mut self,
        kind: ShaderKind,
        compile: impl FnOnce(ShaderKind) -> Result<ProgramId, E>,
    ) -> Result<ProgramId, E> {
        if let Some(&program) = self.programs.get(&kind) {
            return Ok(program);
        }
        let program = compile(kind)?;
        log::debug!("compiled {kind} shader program");
        let _ = self.programs.insert(kind, program);
        Ok(program)
    }

    /// Already compiled program for `kind`.
    #[must_use]
    pub fn get(&self, kind: ShaderKind) -> Option<ProgramId> {
        self.programs.get(&kind).copied()
    }

    /// Remove every program for destruction.
    pub fn drain(&mut self) -> Vec<ProgramId> {
        self.programs.drain().map(|(_, program)| program).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn programs_compile_once() {
        let mut registry = ShaderRegistry::default();
        let mut compiled = Vec::new();
        for _ in 0..3 {
            let _ = registry
                .get_or_compile(ShaderKind::YCbCr420p, |kind| {
                    compiled.push(kind);
                    Ok::<_, ()>(ProgramId::from_raw(1))
                })
                .unwrap();
        }
        assert_eq!(compiled, vec![ShaderKind::YCbCr420p]);
        assert_eq!(registry.drain(), vec![ProgramId::from_raw(1)]);
        assert_eq!(registry.get(ShaderKind::YCbCr420p), None);
    }

    #[test]
    fn failed_compile_is_not_cached() {
        let mut registry = ShaderRegistry::default();
        assert!(registry
            .get_or_compile(ShaderKind::Standard, |_| Err("syntax"))
            .is_err());
        assert_eq!(registry.get(ShaderKind::Standard), None);
    }

    #[test]
    fn kind_follows_pixel_format() {
        assert_eq!(
            ShaderKind::for_pixel_format(PixelFormat::YCbCrJ420p),
            ShaderKind::YCbCrJ420p
        );
        assert_eq!(
            ShaderKind::for_pixel_format(PixelFormat::B8G8R8A8),
            ShaderKind::Standard
        );
        assert_eq!("ycbcr420p".parse::<ShaderKind>(), Ok(ShaderKind::YCbCr420p));
        assert!("yuv".parse::<ShaderKind>().is_err());
    }
}
