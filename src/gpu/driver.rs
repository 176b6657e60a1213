//! The imperative driver seam every backend implements.
//!
//! A [`GpuDriver`] exposes the handful of object and state calls the texture
//! layer needs, in the shape of a classic immediate-mode graphics API:
//! numbered texture units, a current blend state, a current program and
//! indexed draws. Backends translate these into whatever the hardware
//! speaks; [`GraphicsContext`](crate::gpu::context::GraphicsContext) is the
//! only caller.

use std::fmt;

use glam::{IVec2, Vec4};

use crate::geometry::IntRect;
use crate::gpu::shader_registry::ShaderKind;
use crate::gpu::state::BlendState;
use crate::pixel::format::{ApiFormat, ApiProfile, PixelFormat};
use crate::texture::vertex_array::TexturedVertex;

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u32);

        impl $name {
            /// Wrap a backend-assigned id.
            #[must_use]
            pub const fn from_raw(raw: u32) -> Self {
                Self(raw)
            }

            /// Backend-assigned id.
            #[must_use]
            pub const fn raw(self) -> u32 {
                self.0
            }
        }
    };
}

handle!(
    /// Driver texture object.
    TextureId
);
handle!(
    /// Driver pixel transfer buffer.
    BufferId
);
handle!(
    /// Driver offscreen render target.
    RenderTargetId
);
handle!(
    /// Driver shader program.
    ProgramId
);

/// Sequential id allocator shared by the backends.
#[derive(Debug, Default)]
pub(crate) struct IdAllocator {
    next: u32,
}

impl IdAllocator {
    /// Next unused id; zero is never handed out.
    pub(crate) fn allocate(&mut self) -> u32 {
        self.next += 1;
        self.next
    }
}

/// How a backend reaches the hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Presents into a window surface.
    Windowed,
    /// Renders into an offscreen target.
    Offscreen,
    /// Software bookkeeping only; nothing reaches a GPU.
    Headless,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Windowed => f.write_str("windowed"),
            Self::Offscreen => f.write_str("offscreen"),
            Self::Headless => f.write_str("headless"),
        }
    }
}

/// Errors a driver reports, either directly or from [`GpuDriver::take_error`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// An argument was out of range.
    InvalidValue(String),
    /// The call is not legal in the current state.
    InvalidOperation(String),
    /// The driver ran out of memory.
    OutOfMemory,
    /// Backend validation layer rejected a command.
    Validation(String),
    /// The underlying device or context is gone.
    ContextLost,
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidValue(msg) => write!(f, "invalid value: {msg}"),
            Self::InvalidOperation(msg) => write!(f, "invalid operation: {msg}"),
            Self::OutOfMemory => f.write_str("out of memory"),
            Self::Validation(msg) => write!(f, "validation error: {msg}"),
            Self::ContextLost => f.write_str("context lost"),
        }
    }
}

impl std::error::Error for DriverError {}

/// Hardware capabilities, queried once per context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverLimits {
    /// Largest texture dimension on either axis.
    pub max_texture_size: u32,
    /// Non-power-of-two textures are not supported.
    pub requires_pot: bool,
    /// Float texture storage is available.
    pub supports_float: bool,
    /// Pixel transfer buffers are available.
    pub supports_pixel_buffers: bool,
    /// API family.
    pub profile: ApiProfile,
    /// The backend can report used video memory.
    pub memory_info: bool,
    /// Installed video memory in bytes, if known.
    pub video_mem_installed: Option<u64>,
    /// `Min`/`Max` blend equations are available.
    pub min_max_blend: bool,
    /// Supported multisample counts, ascending.
    pub sample_counts: Vec<u32>,
    /// Row alignment, in bytes, of texture readback into pack buffers.
    pub pack_row_alignment: usize,
    /// Hardware vendor string.
    pub vendor: String,
    /// Driver version string.
    pub version: String,
}

/// Kind of pixel transfer buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    /// Staging for uploads into textures.
    PixelUnpack,
    /// Destination for texture readback.
    PixelPack,
}

/// Texture creation request.
///
/// Textures always sample with linear filtering and clamp-to-edge
/// addressing.
#[derive(Debug, Clone, Copy)]
pub struct TextureDesc<'a> {
    /// Debug label.
    pub label: &'a str,
    /// Allocated (padded) size.
    pub size: IVec2,
    /// Pixel format of the data that will be written.
    pub pf: PixelFormat,
    /// Driver format triple.
    pub format: ApiFormat,
    /// Fill with transparent black before first use.
    pub clear: bool,
}

/// Where uploaded pixels come from.
#[derive(Debug, Clone, Copy)]
pub enum UploadSource<'a> {
    /// Client memory, first byte at the rectangle's top-left pixel.
    Memory(&'a [u8]),
    /// A pixel-unpack buffer, first byte at `offset`.
    Buffer {
        /// Staging buffer.
        buffer: BufferId,
        /// Byte offset of the rectangle's top-left pixel.
        offset: usize,
    },
}

/// Sub-image upload into an existing texture.
#[derive(Debug, Clone, Copy)]
pub struct TextureWrite<'a> {
    /// Destination texture.
    pub texture: TextureId,
    /// Top-left texel written.
    pub origin: IVec2,
    /// Extent written.
    pub size: IVec2,
    /// Source row length in pixels.
    pub row_length: usize,
    /// Source pixel format.
    pub pf: PixelFormat,
    /// Source data.
    pub source: UploadSource<'a>,
}

/// Backend implementing the imperative calls the context issues.
///
/// Calls that return `Err` leave driver state unchanged. Errors raised
/// asynchronously (validation layers) are collected and handed out by
/// [`GpuDriver::take_error`].
pub trait GpuDriver {
    /// How this backend reaches the hardware.
    fn backend(&self) -> BackendKind;

    /// Make the backend's context current on the calling thread.
    ///
    /// # Errors
    ///
    /// [`DriverError::ContextLost`] if the device is gone.
    fn make_current(&mut self) -> Result<(), DriverError>;

    /// Present or submit the finished frame.
    ///
    /// # Errors
    ///
    /// Backend-specific presentation failures.
    fn swap_buffers(&mut self) -> Result<(), DriverError>;

    /// Query hardware capabilities.
    fn query_limits(&mut self) -> DriverLimits;

    /// Currently used video memory in bytes, if the backend can tell.
    fn video_mem_used(&mut self) -> Option<u64>;

    /// Allocate a texture.
    ///
    /// # Errors
    ///
    /// [`DriverError::InvalidValue`] for sizes the hardware cannot hold,
    /// [`DriverError::OutOfMemory`] when allocation fails.
    fn create_texture(&mut self, desc: &TextureDesc<'_>) -> Result<TextureId, DriverError>;

    /// Write a rectangle of pixels into a texture.
    ///
    /// # Errors
    ///
    /// [`DriverError::InvalidValue`] if the rectangle leaves the texture,
    /// [`DriverError::InvalidOperation`] for unknown handles or short
    /// sources.
    fn write_texture(&mut self, write: &TextureWrite<'_>) -> Result<(), DriverError>;

    /// Copy a rectangle of a texture into a pixel-pack buffer, rows padded
    /// to [`DriverLimits::pack_row_alignment`].
    ///
    /// # Errors
    ///
    /// As [`GpuDriver::write_texture`].
    fn read_texture(
        &mut self,
        texture: TextureId,
        rect: IntRect,
        buffer: BufferId,
    ) -> Result<(), DriverError>;

    /// Release a texture. Unknown handles are ignored.
    fn delete_texture(&mut self, texture: TextureId);

    /// Bind `texture` (or nothing) to a texture unit.
    ///
    /// # Errors
    ///
    /// [`DriverError::InvalidOperation`] for unknown handles.
    fn bind_texture(&mut self, unit: usize, texture: Option<TextureId>)
        -> Result<(), DriverError>;

    /// Set the blend equation and factors.
    ///
    /// # Errors
    ///
    /// [`DriverError::InvalidOperation`] for equations the hardware lacks.
    fn set_blend(&mut self, state: BlendState) -> Result<(), DriverError>;

    /// Set the constant blend colour.
    ///
    /// # Errors
    ///
    /// Backend-specific.
    fn set_blend_color(&mut self, color: Vec4) -> Result<(), DriverError>;

    /// Allocate a pixel transfer buffer of `size` bytes.
    ///
    /// # Errors
    ///
    /// [`DriverError::InvalidOperation`] if pixel buffers are unsupported,
    /// [`DriverError::OutOfMemory`] when allocation fails.
    fn create_buffer(&mut self, kind: BufferKind, size: usize) -> Result<BufferId, DriverError>;

    /// Fill part of a pixel-unpack buffer.
    ///
    /// # Errors
    ///
    /// [`DriverError::InvalidValue`] if the write overruns the buffer.
    fn write_buffer(
        &mut self,
        buffer: BufferId,
        offset: usize,
        data: &[u8],
    ) -> Result<(), DriverError>;

    /// Read the first `len` bytes of a pixel-pack buffer.
    ///
    /// # Errors
    ///
    /// [`DriverError::InvalidValue`] if `len` exceeds the buffer.
    fn read_buffer(&mut self, buffer: BufferId, len: usize) -> Result<Vec<u8>, DriverError>;

    /// Release a buffer. Unknown handles are ignored.
    fn delete_buffer(&mut self, buffer: BufferId);

    /// Allocate an offscreen render target.
    ///
    /// # Errors
    ///
    /// As [`GpuDriver::create_texture`].
    fn create_render_target(&mut self, size: IVec2) -> Result<RenderTargetId, DriverError>;

    /// Release a render target. Unknown handles are ignored.
    fn delete_render_target(&mut self, target: RenderTargetId);

    /// Compile and link a shader program.
    ///
    /// # Errors
    ///
    /// [`DriverError::Validation`] if compilation fails.
    fn compile_program(&mut self, kind: ShaderKind) -> Result<ProgramId, DriverError>;

    /// Make `program` current; `None` selects the fixed textured program.
    ///
    /// # Errors
    ///
    /// [`DriverError::InvalidOperation`] for unknown handles.
    fn use_program(&mut self, program: Option<ProgramId>) -> Result<(), DriverError>;

    /// Release a program. Unknown handles are ignored.
    fn delete_program(&mut self, program: ProgramId);

    /// Draw indexed triangles with the current bindings, blend state and
    /// program.
    ///
    /// # Errors
    ///
    /// [`DriverError::InvalidOperation`] if no texture is bound to unit 0.
    fn draw_indexed(
        &mut self,
        vertices: &[TexturedVertex],
        indices: &[u32],
    ) -> Result<(), DriverError>;

    /// Pop the oldest pending asynchronous error.
    fn take_error(&mut self) -> Option<DriverError>;
}
