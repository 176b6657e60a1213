//! Validated texture descriptors.

use std::fmt;
use std::str::FromStr;

use glam::IVec2;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result, TesseraError};
use crate::gpu::context::GraphicsContext;
use crate::pixel::format::{api_format, ApiFormat, PixelFormat};

/// Lossy texture storage applied to opaque RGB sources.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema,
)]
pub enum TexCompression {
    /// Store textures in their source format.
    #[default]
    #[serde(rename = "none")]
    None,
    /// Store opaque RGB textures as 16-bit 5-6-5.
    #[serde(rename = "B5G6R5")]
    B5G6R5,
}

impl TexCompression {
    /// Format a texture should be stored in when its source is `source`.
    #[must_use]
    pub const fn apply(self, source: PixelFormat) -> PixelFormat {
        match (self, source) {
            (
                Self::B5G6R5,
                PixelFormat::R8G8B8 | PixelFormat::R8G8B8X8 | PixelFormat::B8G8R8X8,
            ) => PixelFormat::B5G6R5,
            _ => source,
        }
    }
}

impl fmt::Display for TexCompression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            Self::B5G6R5 => f.write_str("B5G6R5"),
        }
    }
}

impl FromStr for TexCompression {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "B5G6R5" => Ok(Self::B5G6R5),
            _ => Err(ConfigError::UnknownCompression(s.to_owned())),
        }
    }
}

/// Smallest power of two `>= n`; zero stays zero.
#[must_use]
pub fn next_pow2(n: i32) -> i32 {
    if n <= 0 {
        0
    } else {
        (n as u32).next_power_of_two() as i32
    }
}

/// Driver-side size for a logical `size`.
#[must_use]
pub fn padded_size(size: IVec2, use_pot: bool) -> IVec2 {
    if use_pot {
        IVec2::new(next_pow2(size.x), next_pow2(size.y))
    } else {
        size
    }
}

/// A texture request checked against the active context's capabilities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TexInfo {
    size: IVec2,
    padded_size: IVec2,
    pf: PixelFormat,
    use_mipmap: bool,
    use_pot: bool,
    pot_border_color: u32,
}

impl TexInfo {
    /// Validate a texture request.
    ///
    /// # Errors
    ///
    /// [`TesseraError::UnsupportedSize`] if either axis exceeds the context's
    /// maximum texture size, [`TesseraError::UnsupportedFormat`] if `pf`
    /// needs float storage the context lacks or has no driver triple for
    /// the context's profile. Planar formats are checked per plane.
    pub fn new(
        ctx: &GraphicsContext,
        size: IVec2,
        pf: PixelFormat,
        use_mipmap: bool,
        use_pot: bool,
        pot_border_color: u32,
    ) -> Result<Self> {
        let max = ctx.max_texture_size();
        if size.x < 0 || size.y < 0 || (size.x as u32) > max || (size.y as u32) > max {
            return Err(TesseraError::UnsupportedSize { size, max });
        }
        if pf.is_float() && !ctx.supports_float_format() {
            return Err(TesseraError::UnsupportedFormat(format!(
                "float textures ({pf}) not supported by this context"
            )));
        }
        let _ = api_format(pf.plane_format(), ctx.profile())?;
        Ok(Self {
            size,
            padded_size: padded_size(size, use_pot),
            pf,
            use_mipmap,
            use_pot,
            pot_border_color,
        })
    }

    /// Whether textures should be padded to powers of two.
    ///
    /// True if the hardware requires it, the caller forces it, or an embedded
    /// profile needs mipmaps.
    #[must_use]
    pub fn should_use_pot(
        ctx: &GraphicsContext,
        force_pot: bool,
        need_mipmap: bool,
    ) -> bool {
        ctx.uses_pot_textures() || force_pot || (ctx.is_embedded() && need_mipmap)
    }

    /// Logical size.
    #[must_use]
    pub const fn size(&self) -> IVec2 {
        self.size
    }

    /// Size the driver allocates.
    #[must_use]
    pub const fn padded_size(&self) -> IVec2 {
        self.padded_size
    }

    /// Pixel format.
    #[must_use]
    pub const fn pixel_format(&self) -> PixelFormat {
        self.pf
    }

    /// Whether mipmaps were requested.
    #[must_use]
    pub const fn use_mipmap(&self) -> bool {
        self.use_mipmap
    }

    /// Whether the texture is padded to powers of two.
    #[must_use]
    pub const fn use_pot(&self) -> bool {
        self.use_pot
    }

    /// Packed RGBA value for the padding border.
    #[must_use]
    pub const fn pot_border_color(&self) -> u32 {
        self.pot_border_color
    }

    /// Bytes of GPU memory the padded texture occupies.
    #[must_use]
    pub fn mem_needed(&self) -> usize {
        let texels = self.padded_size.x.max(0) as usize * self.padded_size.y.max(0) as usize;
        if self.pf.is_planar() {
            texels * 3 / 2
        } else {
            texels * self.pf.bytes_per_pixel()
        }
    }

    /// Extent of mipmap `level`; level 0 is the logical size.
    #[must_use]
    pub fn mipmap_size(&self, level: u32) -> IVec2 {
        mipmap_extent(self.size, level)
    }

    /// Driver triple for this descriptor under the context's profile.
    ///
    /// # Errors
    ///
    /// See [`api_format`].
    pub fn api_format(&self, ctx: &GraphicsContext) -> Result<ApiFormat> {
        api_format(self.pf, ctx.profile())
    }

    /// Log the descriptor at debug level.
    pub fn dump(&self) {
        log::debug!(
            "TexInfo size={}x{} padded={}x{} pf={} mipmap={} pot={}",
            self.size.x,
            self.size.y,
            self.padded_size.x,
            self.padded_size.y,
            self.pf,
            self.use_mipmap,
            self.use_pot,
        );
    }
}

/// Halve both axes `level` times, never going below one texel.
#[must_use]
pub fn mipmap_extent(size: IVec2, level: u32) -> IVec2 {
    let mut size = size;
    for _ in 0..level {
        size = IVec2::new((size.x >> 1).max(1), (size.y >> 1).max(1));
    }
    size
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::headless::{HeadlessDriver, HeadlessLimits};
    use crate::options::GpuOptions;
    use std::rc::Rc;

    fn context(limits: HeadlessLimits) -> Rc<GraphicsContext> {
        let driver = HeadlessDriver::new(limits);
        GraphicsContext::new(Box::new(driver), GpuOptions::default()).unwrap()
    }

    #[test]
    fn padded_size_is_pot_and_covers_logical_size() {
        for (w, h) in [(1, 1), (3, 5), (100, 7), (1920, 1080), (1024, 1025)] {
            let size = IVec2::new(w, h);
            let padded = padded_size(size, true);
            assert!(padded.x >= w && padded.y >= h);
            assert!((padded.x as u32).is_power_of_two());
            assert!((padded.y as u32).is_power_of_two());
            assert_eq!(padded_size(size, false), size);
        }
        assert_eq!(next_pow2(0), 0);
    }

    #[test]
    fn mipmap_levels_halve_with_floor_of_one() {
        let size = IVec2::new(100, 6);
        assert_eq!(mipmap_extent(size, 0), size);
        for level in 1..10 {
            let expected = IVec2::new((100 >> level).max(1), (6 >> level).max(1));
            assert_eq!(mipmap_extent(size, level), expected);
        }
    }

    #[test]
    fn full_hd_fits_but_4k_wide_does_not() {
        let ctx = context(HeadlessLimits {
            max_texture_size: 2048,
            requires_pot: false,
            ..HeadlessLimits::default()
        });
        let hd =
            TexInfo::new(&ctx, IVec2::new(1920, 1080), PixelFormat::R8G8B8A8, false, false, 0)
                .unwrap();
        assert_eq!(hd.padded_size(), IVec2::new(1920, 1080));
        assert_eq!(hd.mem_needed(), 1920 * 1080 * 4);

        let wide =
            TexInfo::new(&ctx, IVec2::new(4096, 1080), PixelFormat::R8G8B8A8, false, false, 0);
        assert!(matches!(
            wide,
            Err(TesseraError::UnsupportedSize { max: 2048, .. })
        ));
    }

    #[test]
    fn exactly_max_size_is_accepted() {
        let ctx = context(HeadlessLimits {
            max_texture_size: 512,
            ..HeadlessLimits::default()
        });
        assert!(TexInfo::new(&ctx, IVec2::new(512, 512), PixelFormat::I8, false, false, 0).is_ok());
        assert!(TexInfo::new(&ctx, IVec2::new(512, 513), PixelFormat::I8, false, false, 0).is_err());
    }

    #[test]
    fn float_formats_need_float_support() {
        let ctx = context(HeadlessLimits {
            supports_float: false,
            ..HeadlessLimits::default()
        });
        let result =
            TexInfo::new(&ctx, IVec2::new(16, 16), PixelFormat::R32G32B32A32F, false, false, 0);
        assert!(matches!(result, Err(TesseraError::UnsupportedFormat(_))));
    }

    #[test]
    fn formats_without_a_driver_triple_are_refused() {
        let desktop = context(HeadlessLimits::default());
        let result = TexInfo::new(&desktop, IVec2::new(16, 16), PixelFormat::B8G8R8, false, false, 0);
        assert!(matches!(result, Err(TesseraError::UnsupportedFormat(_))));
        assert!(
            TexInfo::new(&desktop, IVec2::new(16, 16), PixelFormat::YCbCr420p, false, false, 0)
                .is_ok()
        );

        let embedded = context(HeadlessLimits {
            embedded: true,
            ..HeadlessLimits::default()
        });
        let result =
            TexInfo::new(&embedded, IVec2::new(16, 16), PixelFormat::B8G8R8A8, false, false, 0);
        assert!(matches!(result, Err(TesseraError::UnsupportedFormat(_))));
        let result = TexInfo::new(&embedded, IVec2::new(16, 16), PixelFormat::I32F, false, false, 0);
        assert!(matches!(result, Err(TesseraError::UnsupportedFormat(_))));
        assert!(
            TexInfo::new(&embedded, IVec2::new(16, 16), PixelFormat::R8G8B8A8, false, false, 0)
                .is_ok()
        );
    }

    #[test]
    fn pot_policy_follows_hardware_force_and_embedded_mipmaps() {
        let desktop = context(HeadlessLimits::default());
        assert!(!TexInfo::should_use_pot(&desktop, false, true));
        assert!(TexInfo::should_use_pot(&desktop, true, false));

        let embedded = context(HeadlessLimits {
            embedded: true,
            ..HeadlessLimits::default()
        });
        assert!(TexInfo::should_use_pot(&embedded, false, true));
        assert!(!TexInfo::should_use_pot(&embedded, false, false));

        let old = context(HeadlessLimits {
            requires_pot: true,
            ..HeadlessLimits::default()
        });
        assert!(TexInfo::should_use_pot(&old, false, false));
    }

    #[test]
    fn pot_descriptor_pads_and_accounts_padded_memory() {
        let ctx = context(HeadlessLimits::default());
        let info =
            TexInfo::new(&ctx, IVec2::new(300, 200), PixelFormat::B5G6R5, false, true, 0).unwrap();
        assert_eq!(info.padded_size(), IVec2::new(512, 256));
        assert_eq!(info.mem_needed(), 512 * 256 * 2);
    }

    #[test]
    fn compression_names_round_trip() {
        for c in [TexCompression::None, TexCompression::B5G6R5] {
            assert_eq!(c.to_string().parse::<TexCompression>().unwrap(), c);
        }
        assert_eq!(
            "DXT1".parse::<TexCompression>(),
            Err(ConfigError::UnknownCompression("DXT1".to_owned()))
        );
        assert_eq!(
            TexCompression::B5G6R5.apply(PixelFormat::R8G8B8),
            PixelFormat::B5G6R5
        );
        assert_eq!(
            TexCompression::B5G6R5.apply(PixelFormat::R8G8B8A8),
            PixelFormat::R8G8B8A8
        );
    }
}
