//! Crate-level error types.

use std::fmt;

use glam::IVec2;

use crate::gpu::driver::DriverError;
use crate::gpu::render_context::RenderContextError;
use crate::gpu::state::BlendMode;

/// Malformed textual configuration supplied by a caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Texture compression name not recognised.
    UnknownCompression(String),
    /// Blend mode name not recognised.
    UnknownBlendMode(String),
    /// Shader program name not recognised.
    UnknownShader(String),
    /// Pixel format name not recognised.
    UnknownPixelFormat(String),
    /// TOML options parsing/serialization failure.
    OptionsParse(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownCompression(s) => {
                write!(f, "texture compression {s} not supported")
            }
            Self::UnknownBlendMode(s) => write!(f, "blend mode {s} not supported"),
            Self::UnknownShader(s) => write!(f, "unknown shader program {s}"),
            Self::UnknownPixelFormat(s) => write!(f, "unknown pixel format {s}"),
            Self::OptionsParse(msg) => write!(f, "options parse error: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Errors produced by the tessera crate.
#[derive(Debug)]
pub enum TesseraError {
    /// Pixel format / feature combination the active hardware cannot store.
    UnsupportedFormat(String),
    /// Requested extent exceeds the context's maximum texture dimension.
    UnsupportedSize {
        /// Requested logical size.
        size: IVec2,
        /// Maximum texture dimension reported by the context.
        max: u32,
    },
    /// Blend mode the active hardware cannot perform.
    UnsupportedBlendMode(BlendMode),
    /// Feature disabled by configuration or missing on the hardware.
    UnsupportedFeature(String),
    /// Driver reported an error while transferring pixels.
    Upload {
        /// Operation that failed.
        label: &'static str,
        /// Driver-side cause.
        source: DriverError,
    },
    /// Driver reported an error while creating an object.
    Allocation {
        /// Operation that failed.
        label: &'static str,
        /// Driver-side cause.
        source: DriverError,
    },
    /// Synchronous error check after a state-affecting call failed.
    Driver {
        /// Operation that was checked.
        label: &'static str,
        /// Driver-side cause.
        source: DriverError,
    },
    /// Malformed configuration.
    Config(ConfigError),
    /// The context was torn down and may no longer be used.
    ContextTornDown,
    /// GPU context initialization failure.
    RenderContext(RenderContextError),
    /// Generic I/O failure.
    Io(std::io::Error),
}

impl fmt::Display for TesseraError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedFormat(msg) => write!(f, "unsupported format: {msg}"),
            Self::UnsupportedSize { size, max } => write!(
                f,
                "texture too large ({}x{}); maximum supported by graphics card is {max}",
                size.x, size.y
            ),
            Self::UnsupportedBlendMode(mode) => {
                write!(f, "blend mode {mode} not supported by this context")
            }
            Self::UnsupportedFeature(msg) => write!(f, "unsupported feature: {msg}"),
            Self::Upload { label, source } => {
                write!(f, "upload failed in {label}: {source}")
            }
            Self::Allocation { label, source } => {
                write!(f, "allocation failed in {label}: {source}")
            }
            Self::Driver { label, source } => {
                write!(f, "driver error in {label}: {source}")
            }
            Self::Config(e) => write!(f, "configuration error: {e}"),
            Self::ContextTornDown => {
                write!(f, "graphics context used after teardown")
            }
            Self::RenderContext(e) => write!(f, "GPU error: {e}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for TesseraError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Upload { source, .. }
            | Self::Allocation { source, .. }
            | Self::Driver { source, .. } => Some(source),
            Self::Config(e) => Some(e),
            Self::RenderContext(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for TesseraError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<RenderContextError> for TesseraError {
    fn from(e: RenderContextError) -> Self {
        Self::RenderContext(e)
    }
}

impl From<std::io::Error> for TesseraError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// Crate result alias.
pub type Result<T, E = TesseraError> = std::result::Result<T, E>;
