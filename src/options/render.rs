use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::gpu::state::BlendMode;

/// How much of the shader pipeline the hardware may be asked for.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum ShaderUsage {
    /// Every program, including colour conversion.
    #[default]
    Full,
    /// Only the standard textured program; planar formats are refused.
    Minimal,
    /// Fragment programs without custom vertex stages.
    FragmentOnly,
}

impl ShaderUsage {
    const NAMES: [(Self, &'static str); 3] = [
        (Self::Full, "full"),
        (Self::Minimal, "minimal"),
        (Self::FragmentOnly, "fragment_only"),
    ];
}

impl fmt::Display for ShaderUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = Self::NAMES
            .iter()
            .find(|(usage, _)| usage == self)
            .map_or("full", |(_, name)| name);
        f.write_str(name)
    }
}

impl FromStr for ShaderUsage {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::NAMES
            .iter()
            .find(|(_, name)| *name == s)
            .map(|(usage, _)| *usage)
            .ok_or_else(|| ConfigError::UnknownShader(s.to_owned()))
    }
}

/// Presentation settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[schemars(title = "Render", inline)]
#[serde(default)]
pub struct RenderOptions {
    /// Requested multisample count; rounded down to a supported one.
    #[schemars(title = "Multisample Samples", range(min = 1, max = 16))]
    pub multisample_samples: u32,
    /// Blend mode new contexts start with.
    #[schemars(title = "Default Blend Mode")]
    pub default_blend_mode: BlendMode,
    /// Shader pipeline level.
    #[schemars(title = "Shader Usage")]
    pub shader_usage: ShaderUsage,
    /// Wait for vertical blank when presenting.
    #[schemars(title = "VSync")]
    pub vsync: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            multisample_samples: 1,
            default_blend_mode: BlendMode::Blend,
            shader_usage: ShaderUsage::Full,
            vsync: true,
        }
    }
}
