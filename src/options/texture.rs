use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::pixel::tex_info::TexCompression;

/// Texture allocation and upload policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[schemars(title = "Textures", inline)]
#[serde(default)]
pub struct TextureOptions {
    /// Pad every texture to power-of-two dimensions.
    #[schemars(title = "Force Power-of-Two")]
    pub force_pot: bool,
    /// Lossy storage for opaque RGB sources.
    #[schemars(title = "Compression")]
    pub compression: TexCompression,
    /// Stage uploads through pixel buffers when the hardware has them.
    #[schemars(title = "Use Pixel Buffers")]
    pub use_pixel_buffers: bool,
    /// Request mipmaps for new textures.
    #[schemars(title = "Use Mipmaps")]
    pub use_mipmaps: bool,
}

impl Default for TextureOptions {
    fn default() -> Self {
        Self {
            force_pot: false,
            compression: TexCompression::None,
            use_pixel_buffers: true,
            use_mipmaps: false,
        }
    }
}
