//! Context configuration with TOML preset support.
//!
//! Options serialize to/from TOML so a deployment can keep per-machine
//! presets (for example a `minimal` preset for old embedded hardware).

mod debug;
mod render;
mod texture;

use std::path::Path;

pub use debug::DebugOptions;
pub use render::{RenderOptions, ShaderUsage};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
pub use texture::TextureOptions;

use crate::error::{ConfigError, TesseraError};

/// Top-level options container. All sections use `#[serde(default)]` so
/// partial TOML files (e.g. only overriding `[texture]`) work correctly.
#[derive(
    Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default, JsonSchema,
)]
#[serde(default)]
pub struct GpuOptions {
    /// Driver diagnostics.
    pub debug: DebugOptions,
    /// Texture allocation and upload policy.
    pub texture: TextureOptions,
    /// Presentation settings.
    pub render: RenderOptions,
}

impl GpuOptions {
    /// Generate JSON Schema describing the options.
    #[must_use]
    pub fn json_schema() -> schemars::Schema {
        schemars::schema_for!(GpuOptions)
    }

    /// Parse options from TOML text. Missing fields use defaults.
    ///
    /// # Errors
    ///
    /// [`ConfigError::OptionsParse`] on malformed TOML or unknown enum names.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::OptionsParse(e.to_string()))
    }

    /// Load options from a TOML file. Missing fields use defaults.
    ///
    /// # Errors
    ///
    /// [`TesseraError::Io`] if the file cannot be read,
    /// [`TesseraError::Config`] if it does not parse.
    pub fn load(path: &Path) -> Result<Self, TesseraError> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_toml(&content)?)
    }

    /// Save options to a TOML file (pretty-printed).
    ///
    /// # Errors
    ///
    /// [`TesseraError::Config`] if serialization fails, [`TesseraError::Io`]
    /// if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), TesseraError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::OptionsParse(e.to_string()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// List available preset names (TOML file stems) in a directory.
    #[must_use]
    pub fn list_presets(dir: &Path) -> Vec<String> {
        let mut names = Vec::new();
        if let Ok(entries) = std::fs::read_dir(dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().is_some_and(|ext| ext == "toml") {
                    if let Some(stem) =
                        path.file_stem().and_then(|s| s.to_str())
                    {
                        names.push(stem.to_owned());
                    }
                }
            }
        }
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::state::BlendMode;
    use crate::pixel::tex_info::TexCompression;

    #[test]
    fn default_round_trips_through_toml() {
        let opts = GpuOptions::default();
        let toml_str = toml::to_string_pretty(&opts).unwrap();
        let parsed: GpuOptions = toml::from_str(&toml_str).unwrap();
        assert_eq!(opts, parsed);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let toml_str = r#"
[texture]
compression = "B5G6R5"
force_pot = true

[render]
default_blend_mode = "add"
shader_usage = "minimal"
"#;
        let opts = GpuOptions::from_toml(toml_str).unwrap();
        assert_eq!(opts.texture.compression, TexCompression::B5G6R5);
        assert!(opts.texture.force_pot);
        assert_eq!(opts.render.default_blend_mode, BlendMode::Add);
        assert_eq!(opts.render.shader_usage, ShaderUsage::Minimal);
        // Everything else should be default
        assert!(opts.texture.use_pixel_buffers);
        assert_eq!(opts.render.multisample_samples, 1);
        assert_eq!(opts.debug, DebugOptions::default());
    }

    #[test]
    fn unknown_names_are_config_errors() {
        let result = GpuOptions::from_toml("[texture]\ncompression = \"DXT5\"\n");
        assert!(matches!(result, Err(ConfigError::OptionsParse(_))));
        let result = GpuOptions::from_toml("[render]\ndefault_blend_mode = \"screen\"\n");
        assert!(matches!(result, Err(ConfigError::OptionsParse(_))));
    }

    #[test]
    fn save_load_and_list_presets() {
        let dir = std::env::temp_dir().join(format!("tessera-presets-{}", std::process::id()));
        let mut opts = GpuOptions::default();
        opts.debug.error_checks = Some(true);
        opts.texture.use_mipmaps = true;
        opts.save(&dir.join("fast.toml")).unwrap();
        GpuOptions::default().save(&dir.join("baseline.toml")).unwrap();
        std::fs::write(dir.join("notes.txt"), "ignored").unwrap();

        assert_eq!(GpuOptions::load(&dir.join("fast.toml")).unwrap(), opts);
        assert_eq!(GpuOptions::list_presets(&dir), vec!["baseline", "fast"]);
        assert!(matches!(
            GpuOptions::load(&dir.join("missing.toml")),
            Err(TesseraError::Io(_))
        ));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn bundled_minimal_preset_parses() {
        let opts =
            GpuOptions::from_toml(include_str!("../../assets/presets/minimal.toml")).unwrap();
        assert_eq!(opts.render.shader_usage, ShaderUsage::Minimal);
        assert_eq!(opts.texture.compression, TexCompression::B5G6R5);
        assert!(!opts.texture.use_pixel_buffers);
        assert!(opts.render.vsync);
    }

    #[test]
    fn schema_has_expected_properties() {
        let schema_value =
            serde_json::to_value(GpuOptions::json_schema()).unwrap();
        let props = schema_value["properties"].as_object().unwrap();
        assert!(props.contains_key("debug"));
        assert!(props.contains_key("texture"));
        assert!(props.contains_key("render"));

        let texture = &props["texture"]["properties"];
        assert!(texture.get("compression").is_some());
        assert!(texture.get("force_pot").is_some());
    }

    #[test]
    fn shader_usage_names_round_trip() {
        for usage in [ShaderUsage::Full, ShaderUsage::Minimal, ShaderUsage::FragmentOnly] {
            assert_eq!(usage.to_string().parse::<ShaderUsage>().unwrap(), usage);
        }
        assert!("partial".parse::<ShaderUsage>().is_err());
    }
}
