//! Pixel format enumeration and its mapping onto driver format triples.

use std::fmt;
use std::str::FromStr;

use crate::error::{ConfigError, TesseraError};

/// Encodings a bitmap or texture plane can use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 8-bit luminance.
    I8,
    /// 8-bit alpha.
    A8,
    /// 8-bit red.
    R8,
    /// 24-bit RGB.
    R8G8B8,
    /// 24-bit BGR. Decodable, but has no texture mapping.
    B8G8R8,
    /// 32-bit RGBA.
    R8G8B8A8,
    /// 32-bit RGB with an unused fourth byte.
    R8G8B8X8,
    /// 32-bit BGRA.
    B8G8R8A8,
    /// 32-bit BGR with an unused fourth byte.
    B8G8R8X8,
    /// 16-bit packed 5-6-5 RGB.
    B5G6R5,
    /// 128-bit float RGBA.
    R32G32B32A32F,
    /// 32-bit float luminance.
    I32F,
    /// Planar 4:2:0 luma/chroma, limited (video) range.
    YCbCr420p,
    /// Planar 4:2:0 luma/chroma, full (JPEG) range.
    YCbCrJ420p,
}

impl PixelFormat {
    /// Every format, in declaration order.
    pub const ALL: [Self; 14] = [
        Self::I8,
        Self::A8,
        Self::R8,
        Self::R8G8B8,
        Self::B8G8R8,
        Self::R8G8B8A8,
        Self::R8G8B8X8,
        Self::B8G8R8A8,
        Self::B8G8R8X8,
        Self::B5G6R5,
        Self::R32G32B32A32F,
        Self::I32F,
        Self::YCbCr420p,
        Self::YCbCrJ420p,
    ];

    /// Bytes per texel. Planar formats report their luma plane (one byte).
    #[must_use]
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            Self::I8
            | Self::A8
            | Self::R8
            | Self::YCbCr420p
            | Self::YCbCrJ420p => 1,
            Self::B5G6R5 => 2,
            Self::R8G8B8 | Self::B8G8R8 => 3,
            Self::R8G8B8A8
            | Self::R8G8B8X8
            | Self::B8G8R8A8
            | Self::B8G8R8X8
            | Self::I32F => 4,
            Self::R32G32B32A32F => 16,
        }
    }

    /// Whether textures of this format need float storage.
    #[must_use]
    pub const fn is_float(self) -> bool {
        matches!(self, Self::R32G32B32A32F | Self::I32F)
    }

    /// Whether this is a three-plane 4:2:0 format.
    #[must_use]
    pub const fn is_planar(self) -> bool {
        matches!(self, Self::YCbCr420p | Self::YCbCrJ420p)
    }

    /// Format of each individual plane texture.
    #[must_use]
    pub const fn plane_format(self) -> Self {
        if self.is_planar() {
            Self::I8
        } else {
            self
        }
    }

    /// Number of textures backing one image of this format.
    #[must_use]
    pub const fn plane_count(self) -> usize {
        if self.is_planar() {
            3
        } else {
            1
        }
    }

    /// Whether the format carries a meaningful alpha channel.
    #[must_use]
    pub const fn has_alpha(self) -> bool {
        matches!(
            self,
            Self::A8 | Self::R8G8B8A8 | Self::B8G8R8A8 | Self::R32G32B32A32F
        )
    }

    /// Canonical name, as accepted by [`FromStr`].
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::I8 => "I8",
            Self::A8 => "A8",
            Self::R8 => "R8",
            Self::R8G8B8 => "R8G8B8",
            Self::B8G8R8 => "B8G8R8",
            Self::R8G8B8A8 => "R8G8B8A8",
            Self::R8G8B8X8 => "R8G8B8X8",
            Self::B8G8R8A8 => "B8G8R8A8",
            Self::B8G8R8X8 => "B8G8R8X8",
            Self::B5G6R5 => "B5G6R5",
            Self::R32G32B32A32F => "R32G32B32A32F",
            Self::I32F => "I32F",
            Self::YCbCr420p => "YCbCr420p",
            Self::YCbCrJ420p => "YCbCrJ420p",
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PixelFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|pf| pf.name() == s)
            .ok_or_else(|| ConfigError::UnknownPixelFormat(s.to_owned()))
    }
}

/// Driver API family the context speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ApiProfile {
    /// Full desktop API.
    #[default]
    Desktop,
    /// Constrained mobile/embedded API.
    Embedded,
}

/// Client-side channel layout of uploaded pixel data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiPixelFormat {
    /// Single luminance channel.
    Luminance,
    /// Single alpha channel.
    Alpha,
    /// Single red channel.
    Red,
    /// Three channels, RGB order.
    Rgb,
    /// Four channels, RGBA order.
    Rgba,
    /// Four channels, BGRA order.
    Bgra,
}

/// Storage layout the driver allocates for a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiInternalFormat {
    /// 8-bit luminance.
    Luminance,
    /// 8-bit alpha.
    Alpha,
    /// 8-bit red.
    R8,
    /// 8-bit-per-channel RGB.
    Rgb,
    /// 8-bit-per-channel RGBA.
    Rgba,
    /// 32-bit float RGBA.
    Rgba32F,
    /// 32-bit float luminance.
    Luminance32F,
}

/// Per-component data type of uploaded pixel data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiDataType {
    /// One byte per component.
    UnsignedByte,
    /// Four bytes packed into a reversed 32-bit word.
    UnsignedInt8888Rev,
    /// 5-6-5 packed into 16 bits.
    UnsignedShort565,
    /// 32-bit float per component.
    Float,
}

/// The `(format, internal format, data type)` triple a driver expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ApiFormat {
    /// Client-side layout.
    pub format: ApiPixelFormat,
    /// Driver-side storage.
    pub internal_format: ApiInternalFormat,
    /// Component type.
    pub data_type: ApiDataType,
}

impl ApiFormat {
    const fn new(
        format: ApiPixelFormat,
        internal_format: ApiInternalFormat,
        data_type: ApiDataType,
    ) -> Self {
        Self {
            format,
            internal_format,
            data_type,
        }
    }
}

/// Four-byte formats are uploaded as reversed words on macOS.
const RGBA_DATA_TYPE: ApiDataType = if cfg!(target_os = "macos") {
    ApiDataType::UnsignedInt8888Rev
} else {
    ApiDataType::UnsignedByte
};

/// Map `pf` onto the driver triple for `profile`.
///
/// # Errors
///
/// Returns [`TesseraError::UnsupportedFormat`] for formats without a
/// single-plane mapping (planar formats, `B8G8R8`) and for formats the
/// embedded profile cannot store (BGRA order, float storage).
pub fn api_format(
    pf: PixelFormat,
    profile: ApiProfile,
) -> Result<ApiFormat, TesseraError> {
    use ApiDataType as T;
    use ApiInternalFormat as I;
    use ApiPixelFormat as F;

    let embedded = profile == ApiProfile::Embedded;
    let unsupported = |why: &str| -> Result<ApiFormat, TesseraError> {
        Err(TesseraError::UnsupportedFormat(format!(
            "{pf} has no texture mapping: {why}"
        )))
    };
    match pf {
        PixelFormat::I8 => Ok(ApiFormat::new(F::Luminance, I::Luminance, T::UnsignedByte)),
        PixelFormat::A8 => Ok(ApiFormat::new(F::Alpha, I::Alpha, T::UnsignedByte)),
        PixelFormat::R8 => Ok(ApiFormat::new(F::Red, I::R8, T::UnsignedByte)),
        PixelFormat::R8G8B8 => Ok(ApiFormat::new(F::Rgb, I::Rgb, T::UnsignedByte)),
        PixelFormat::B5G6R5 => {
            Ok(ApiFormat::new(F::Rgb, I::Rgb, T::UnsignedShort565))
        }
        PixelFormat::R8G8B8A8 | PixelFormat::R8G8B8X8 => {
            Ok(ApiFormat::new(F::Rgba, I::Rgba, RGBA_DATA_TYPE))
        }
        PixelFormat::B8G8R8A8 | PixelFormat::B8G8R8X8 => {
            if embedded {
                unsupported("BGRA upload is not available on embedded profiles")
            } else {
                Ok(ApiFormat::new(F::Bgra, I::Rgba, RGBA_DATA_TYPE))
            }
        }
        PixelFormat::R32G32B32A32F => {
            if embedded {
                unsupported("float storage is not available on embedded profiles")
            } else {
                Ok(ApiFormat::new(F::Bgra, I::Rgba32F, T::Float))
            }
        }
        PixelFormat::I32F => {
            if embedded {
                unsupported("float storage is not available on embedded profiles")
            } else {
                Ok(ApiFormat::new(F::Luminance, I::Luminance32F, T::Float))
            }
        }
        PixelFormat::B8G8R8 => unsupported("24-bit BGR must be converted first"),
        PixelFormat::YCbCr420p | PixelFormat::YCbCrJ420p => {
            unsupported("planar formats are uploaded plane by plane as I8")
        }
    }
}
