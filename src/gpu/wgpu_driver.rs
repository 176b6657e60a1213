//! [`GpuDriver`] on top of wgpu.
//!
//! wgpu has no current-state machine, so the driver keeps one: bound
//! texture units, blend state and program are plain fields, and every
//! indexed draw turns them into a bind group and a cached pipeline for
//! that `(program, blend)` pair. Draws are submitted immediately; the
//! first draw of a frame clears the target.
//!
//! Synchronous calls run inside wgpu error scopes so failures come back as
//! `Err`. Anything wgpu reports outside a scope lands in a queue drained by
//! [`GpuDriver::take_error`].

use std::collections::VecDeque;
use std::sync::{mpsc, Arc, Mutex};

use encase::ShaderType;
use glam::{IVec2, Vec2, Vec4};
use rustc_hash::FxHashMap;

use crate::geometry::IntRect;
use crate::gpu::driver::{
    BackendKind, BufferId, BufferKind, DriverError, DriverLimits, GpuDriver, IdAllocator,
    ProgramId, RenderTargetId, TextureDesc, TextureId, TextureWrite, UploadSource,
};
use crate::gpu::dynamic_buffer::TypedBuffer;
use crate::gpu::pipeline_helpers::{
    create_tile_pipeline, filtering_sampler, linear_sampler, texture_2d, uniform_buffer,
};
use crate::gpu::render_context::{RenderContext, RenderContextError};
use crate::gpu::render_target::RenderTarget;
use crate::gpu::shader_composer::ShaderComposer;
use crate::gpu::shader_registry::ShaderKind;
use crate::gpu::state::{BlendMode, BlendState, TEXTURE_UNITS};
use crate::pixel::convert::convert_row;
use crate::pixel::format::{ApiInternalFormat, ApiPixelFormat, ApiProfile, PixelFormat};
use crate::texture::vertex_array::TexturedVertex;

/// Channel spread applied by `tessera::tile::apply_swizzle`.
const SWIZZLE_RGBA: u32 = 0;
const SWIZZLE_LUMINANCE: u32 = 1;
const SWIZZLE_ALPHA: u32 = 2;

#[derive(ShaderType)]
struct TileUniforms {
    viewport: Vec2,
    swizzle: u32,
}

/// How a texture is stored on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DeviceFormat {
    /// wgpu storage format.
    pub(crate) format: wgpu::TextureFormat,
    /// Pixel layout the device copy of the data has.
    pub(crate) upload_pf: PixelFormat,
    /// Swizzle the fragment shader applies.
    pub(crate) swizzle: u32,
}

/// Storage for a texture of `pf` whose driver triple asks for `internal`
/// storage in `layout` order.
pub(crate) fn device_format(
    pf: PixelFormat,
    layout: ApiPixelFormat,
    internal: ApiInternalFormat,
) -> DeviceFormat {
    use wgpu::TextureFormat as F;

    let (format, upload_pf, swizzle) = match internal {
        ApiInternalFormat::Luminance => (F::R8Unorm, PixelFormat::I8, SWIZZLE_LUMINANCE),
        ApiInternalFormat::Alpha => (F::R8Unorm, PixelFormat::A8, SWIZZLE_ALPHA),
        ApiInternalFormat::R8 => (F::R8Unorm, PixelFormat::R8, SWIZZLE_RGBA),
        ApiInternalFormat::Rgb => (F::Rgba8Unorm, PixelFormat::R8G8B8A8, SWIZZLE_RGBA),
        ApiInternalFormat::Rgba if layout == ApiPixelFormat::Bgra => {
            (F::Bgra8Unorm, PixelFormat::B8G8R8A8, SWIZZLE_RGBA)
        }
        ApiInternalFormat::Rgba => (F::Rgba8Unorm, PixelFormat::R8G8B8A8, SWIZZLE_RGBA),
        ApiInternalFormat::Rgba32F => (F::Rgba32Float, pf, SWIZZLE_RGBA),
        ApiInternalFormat::Luminance32F => (F::R32Float, pf, SWIZZLE_LUMINANCE),
    };
    DeviceFormat {
        format,
        upload_pf,
        swizzle,
    }
}

fn map_wgpu_error(error: &wgpu::Error) -> DriverError {
    match error {
        wgpu::Error::OutOfMemory { .. } => DriverError::OutOfMemory,
        other => DriverError::Validation(other.to_string()),
    }
}

fn map_surface_error(error: wgpu::SurfaceError) -> DriverError {
    match error {
        wgpu::SurfaceError::OutOfMemory => DriverError::OutOfMemory,
        wgpu::SurfaceError::Lost => DriverError::ContextLost,
        other => DriverError::Validation(other.to_string()),
    }
}

/// Run `f` inside out-of-memory and validation error scopes.
fn checked<T>(device: &wgpu::Device, f: impl FnOnce() -> T) -> Result<T, DriverError> {
    device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = f();
    let validation = pollster::block_on(device.pop_error_scope());
    let oom = pollster::block_on(device.pop_error_scope());
    match oom.or(validation) {
        Some(error) => Err(map_wgpu_error(&error)),
        None => Ok(value),
    }
}

fn extent(size: IVec2) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width: size.x as u32,
        height: size.y as u32,
        depth_or_array_layers: 1,
    }
}

fn rect_inside(origin: IVec2, size: IVec2, bounds: IVec2) -> bool {
    origin.cmpge(IVec2::ZERO).all()
        && size.cmpge(IVec2::ZERO).all()
        && (origin + size).cmple(bounds).all()
}

struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    size: IVec2,
    device: DeviceFormat,
}

enum PixelBuffer {
    /// Uploads are staged in client memory and handed to
    /// `Queue::write_texture`, which does its own staging.
    Unpack(Vec<u8>),
    Pack(wgpu::Buffer),
}

struct Frame {
    surface: Option<(wgpu::SurfaceTexture, wgpu::TextureView)>,
    cleared: bool,
}

/// wgpu implementation of [`GpuDriver`].
pub struct WgpuDriver {
    rc: RenderContext,
    kind: BackendKind,
    ids: IdAllocator,
    composer: ShaderComposer,
    textures: FxHashMap<TextureId, GpuTexture>,
    buffers: FxHashMap<BufferId, PixelBuffer>,
    render_targets: FxHashMap<RenderTargetId, RenderTarget>,
    programs: FxHashMap<ProgramId, (ShaderKind, wgpu::ShaderModule)>,
    pipelines: FxHashMap<(ProgramId, BlendState), wgpu::RenderPipeline>,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    sampler: wgpu::Sampler,
    placeholder: wgpu::TextureView,
    uniforms: wgpu::Buffer,
    vertices: TypedBuffer<TexturedVertex>,
    indices: TypedBuffer<u32>,
    units: [Option<TextureId>; TEXTURE_UNITS],
    blend: BlendState,
    blend_color: Vec4,
    program: Option<ProgramId>,
    standard: Option<ProgramId>,
    offscreen: Option<RenderTarget>,
    frame: Option<Frame>,
    errors: Arc<Mutex<VecDeque<DriverError>>>,
}

impl WgpuDriver {
    /// Driver presenting into a window surface.
    ///
    /// # Errors
    ///
    /// [`RenderContextError`] if no adapter, device or surface is
    /// available.
    pub fn windowed(
        window: impl Into<wgpu::SurfaceTarget<'static>>,
        size: (u32, u32),
        vsync: bool,
    ) -> Result<Self, RenderContextError> {
        let rc = pollster::block_on(RenderContext::new(window, size, vsync))?;
        Self::from_render_context(rc, BackendKind::Windowed)
    }

    /// Driver rendering into an offscreen target of `size`.
    ///
    /// # Errors
    ///
    /// [`RenderContextError`] if the size is empty or no adapter or device
    /// is available.
    pub fn offscreen(
        size: (u32, u32),
        format: wgpu::TextureFormat,
    ) -> Result<Self, RenderContextError> {
        let rc = pollster::block_on(RenderContext::offscreen(size, format))?;
        Self::from_render_context(rc, BackendKind::Offscreen)
    }

    fn from_render_context(
        rc: RenderContext,
        kind: BackendKind,
    ) -> Result<Self, RenderContextError> {
        let composer =
            ShaderComposer::new().map_err(|e| RenderContextError::ShaderModules(e.to_string()))?;

        let errors = Arc::new(Mutex::new(VecDeque::new()));
        let sink = Arc::clone(&errors);
        rc.device.on_uncaptured_error(Box::new(move |error| {
            log::warn!("uncaptured wgpu error: {error}");
            if let Ok(mut queue) = sink.lock() {
                queue.push_back(map_wgpu_error(&error));
            }
        }));

        let device = &rc.device;
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Tile Bind Group Layout"),
            entries: &[
                uniform_buffer(0),
                filtering_sampler(1),
                texture_2d(2),
                texture_2d(3),
                texture_2d(4),
            ],
        });
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Tile Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let sampler = linear_sampler(device, "Tile Sampler");
        let placeholder = device
            .create_texture(&wgpu::TextureDescriptor {
                label: Some("Unbound Unit"),
                size: extent(IVec2::ONE),
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::R8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING,
                view_formats: &[],
            })
            .create_view(&wgpu::TextureViewDescriptor::default());
        let uniforms = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Tile Uniforms"),
            size: TileUniforms::min_size().get(),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let vertices =
            TypedBuffer::with_capacity(device, "Tile Vertices", 256, wgpu::BufferUsages::VERTEX);
        let indices =
            TypedBuffer::with_capacity(device, "Tile Indices", 384, wgpu::BufferUsages::INDEX);
        let offscreen = (kind == BackendKind::Offscreen).then(|| {
            let (width, height) = rc.size();
            RenderTarget::new(device, "Offscreen Frame", width, height, rc.format())
        });

        let info = rc.adapter.get_info();
        log::info!("wgpu {kind} driver on {} ({:?})", info.name, info.backend);

        Ok(Self {
            rc,
            kind,
            ids: IdAllocator::default(),
            composer,
            textures: FxHashMap::default(),
            buffers: FxHashMap::default(),
            render_targets: FxHashMap::default(),
            programs: FxHashMap::default(),
            pipelines: FxHashMap::default(),
            bind_group_layout,
            pipeline_layout,
            sampler,
            placeholder,
            uniforms,
            vertices,
            indices,
            units: [None; TEXTURE_UNITS],
            blend: BlendState::new(BlendMode::Blend, false),
            blend_color: Vec4::ZERO,
            program: None,
            standard: None,
            offscreen,
            frame: None,
            errors,
        })
    }

    /// The wgpu objects behind this driver.
    #[must_use]
    pub fn render_context(&self) -> &RenderContext {
        &self.rc
    }

    /// Follow a window resize.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.rc.resize(width, height);
        if self.kind == BackendKind::Offscreen && width > 0 && height > 0 {
            self.offscreen = Some(RenderTarget::new(
                &self.rc.device,
                "Offscreen Frame",
                width,
                height,
                self.rc.format(),
            ));
        }
    }

    /// The offscreen frame, when rendering without a surface.
    #[must_use]
    pub fn offscreen_target(&self) -> Option<&RenderTarget> {
        self.offscreen.as_ref()
    }

    fn texture(&self, id: TextureId) -> Result<&GpuTexture, DriverError> {
        self.textures
            .get(&id)
            .ok_or_else(|| DriverError::InvalidOperation(format!("unknown texture {}", id.raw())))
    }

    fn acquire_frame(&mut self) -> Result<(), DriverError> {
        if self.frame.is_some() {
            return Ok(());
        }
        let surface = if self.rc.has_surface() {
            let texture = match self.rc.get_next_frame() {
                Err(wgpu::SurfaceError::Outdated) => {
                    let (width, height) = self.rc.size();
                    self.rc.resize(width, height);
                    self.rc.get_next_frame()
                }
                other => other,
            }
            .map_err(map_surface_error)?;
            let view = texture
                .texture
                .create_view(&wgpu::TextureViewDescriptor::default());
            Some((texture, view))
        } else {
            None
        };
        self.frame = Some(Frame {
            surface,
            cleared: false,
        });
        Ok(())
    }

    fn standard_program(&mut self) -> Result<ProgramId, DriverError> {
        match self.standard {
            Some(program) => Ok(program),
            None => {
                let program = self.compile_program(ShaderKind::Standard)?;
                self.standard = Some(program);
                Ok(program)
            }
        }
    }

    fn ensure_pipeline(&mut self, program: ProgramId) -> Result<(), DriverError> {
        let key = (program, self.blend);
        if self.pipelines.contains_key(&key) {
            return Ok(());
        }
        let (kind, module) = self
            .programs
            .get(&program)
            .ok_or_else(|| DriverError::InvalidOperation(format!("unknown program {}", program.raw())))?;
        let pipeline = checked(&self.rc.device, || {
            create_tile_pipeline(
                &self.rc.device,
                kind.name(),
                module,
                self.rc.format(),
                self.blend.to_wgpu(),
                &self.pipeline_layout,
            )
        })?;
        log::debug!("built {kind} pipeline for {:?}", self.blend);
        let _ = self.pipelines.insert(key, pipeline);
        Ok(())
    }

    fn unit_view(&self, unit: usize) -> &wgpu::TextureView {
        self.units[unit]
            .and_then(|id| self.textures.get(&id))
            .map_or(&self.placeholder, |tex| &tex.view)
    }

    fn write_uniforms(&self, swizzle: u32) -> Result<(), DriverError> {
        let (width, height) = self.rc.size();
        let mut bytes = encase::UniformBuffer::new(Vec::new());
        bytes
            .write(&TileUniforms {
                viewport: Vec2::new(width as f32, height as f32),
                swizzle,
            })
            .map_err(|e| DriverError::InvalidOperation(e.to_string()))?;
        self.rc
            .queue
            .write_buffer(&self.uniforms, 0, &bytes.into_inner());
        Ok(())
    }

    /// Uniforms, sampler and the first three texture units.
    fn bind_group(&self) -> wgpu::BindGroup {
        let view = |binding: u32, unit: usize| wgpu::BindGroupEntry {
            binding,
            resource: wgpu::BindingResource::TextureView(self.unit_view(unit)),
        };
        self.rc.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Tile Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.uniforms.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
                view(2, 0),
                view(3, 1),
                view(4, 2),
            ],
        })
    }
}

impl GpuDriver for WgpuDriver {
    fn backend(&self) -> BackendKind {
        self.kind
    }

    fn make_current(&mut self) -> Result<(), DriverError> {
        Ok(())
    }

    fn swap_buffers(&mut self) -> Result<(), DriverError> {
        if let Some(frame) = self.frame.take() {
            if let Some((texture, _)) = frame.surface {
                texture.present();
            }
        }
        Ok(())
    }

    fn query_limits(&mut self) -> DriverLimits {
        let limits = self.rc.device.limits();
        let info = self.rc.adapter.get_info();
        DriverLimits {
            max_texture_size: limits.max_texture_dimension_2d,
            requires_pot: false,
            supports_float: self
                .rc
                .device
                .features()
                .contains(wgpu::Features::FLOAT32_FILTERABLE),
            supports_pixel_buffers: true,
            profile: if info.backend == wgpu::Backend::Gl {
                ApiProfile::Embedded
            } else {
                ApiProfile::Desktop
            },
            memory_info: false,
            video_mem_installed: None,
            min_max_blend: true,
            sample_counts: self.rc.sample_counts(),
            pack_row_alignment: wgpu::COPY_BYTES_PER_ROW_ALIGNMENT as usize,
            vendor: info.name,
            version: format!("{} {}", info.driver, info.driver_info),
        }
    }

    fn video_mem_used(&mut self) -> Option<u64> {
        None
    }

    fn create_texture(&mut self, desc: &TextureDesc<'_>) -> Result<TextureId, DriverError> {
        let max = self.rc.device.limits().max_texture_dimension_2d as i32;
        let size = desc.size;
        if size.x <= 0 || size.y <= 0 || size.x > max || size.y > max {
            return Err(DriverError::InvalidValue(format!(
                "texture size {}x{} outside 1..={max}",
                size.x, size.y
            )));
        }
        let device_format =
            device_format(desc.pf, desc.format.format, desc.format.internal_format);
        let device = &self.rc.device;
        let texture = checked(device, || {
            device.create_texture(&wgpu::TextureDescriptor {
                label: Some(desc.label),
                size: extent(size),
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: device_format.format,
                usage: wgpu::TextureUsages::TEXTURE_BINDING
                    | wgpu::TextureUsages::COPY_DST
                    | wgpu::TextureUsages::COPY_SRC,
                view_formats: &[],
            })
        })?;
        if desc.clear {
            let bpp = device_format.upload_pf.bytes_per_pixel();
            let row = size.x as usize * bpp;
            let zeros = vec![0u8; row * size.y as usize];
            self.rc.queue.write_texture(
                texture.as_image_copy(),
                &zeros,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(row as u32),
                    rows_per_image: Some(size.y as u32),
                },
                extent(size),
            );
        }
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let id = TextureId::from_raw(self.ids.allocate());
        let _ = self.textures.insert(
            id,
            GpuTexture {
                texture,
                view,
                size,
                device: device_format,
            },
        );
        Ok(id)
    }

    fn write_texture(&mut self, write: &TextureWrite<'_>) -> Result<(), DriverError> {
        let tex = self.texture(write.texture)?;
        if !rect_inside(write.origin, write.size, tex.size) {
            return Err(DriverError::InvalidValue(format!(
                "write of {}x{} at ({}, {}) leaves texture",
                write.size.x, write.size.y, write.origin.x, write.origin.y
            )));
        }
        if write.row_length < write.size.x as usize {
            return Err(DriverError::InvalidValue("row length shorter than rect".to_owned()));
        }
        if write.size.x == 0 || write.size.y == 0 {
            return Ok(());
        }
        let src_bpp = write.pf.bytes_per_pixel();
        let width = write.size.x as usize;
        let rows = write.size.y as usize;
        let span = ((rows - 1) * write.row_length + width) * src_bpp;
        let source: &[u8] = match write.source {
            UploadSource::Memory(bytes) => bytes,
            UploadSource::Buffer { buffer, offset } => match self.buffers.get(&buffer) {
                Some(PixelBuffer::Unpack(data)) => data.get(offset..).unwrap_or_default(),
                _ => {
                    return Err(DriverError::InvalidOperation(format!(
                        "buffer {} is not a pixel-unpack buffer",
                        buffer.raw()
                    )))
                }
            },
        };
        let source = source
            .get(..span)
            .ok_or_else(|| DriverError::InvalidOperation("upload source too short".to_owned()))?;

        let upload_pf = tex.device.upload_pf;
        let converted;
        let (data, bytes_per_row) = if write.pf == upload_pf {
            (source, write.row_length * src_bpp)
        } else {
            let dst_row = width * upload_pf.bytes_per_pixel();
            let mut out = vec![0u8; dst_row * rows];
            for (row, dst) in out.chunks_exact_mut(dst_row).enumerate() {
                let from = row * write.row_length * src_bpp;
                convert_row(write.pf, &source[from..from + width * src_bpp], upload_pf, dst)
                    .map_err(|e| DriverError::InvalidOperation(e.to_string()))?;
            }
            converted = out;
            (converted.as_slice(), dst_row)
        };

        let queue = &self.rc.queue;
        checked(&self.rc.device, || {
            queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &tex.texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d {
                        x: write.origin.x as u32,
                        y: write.origin.y as u32,
                        z: 0,
                    },
                    aspect: wgpu::TextureAspect::All,
                },
                data,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row as u32),
                    rows_per_image: Some(rows as u32),
                },
                extent(write.size),
            );
        })
    }

    fn read_texture(
        &mut self,
        texture: TextureId,
        rect: IntRect,
        buffer: BufferId,
    ) -> Result<(), DriverError> {
        let tex = self.texture(texture)?;
        if !rect_inside(rect.tl, rect.size(), tex.size) {
            return Err(DriverError::InvalidValue(format!("readback of {rect} leaves texture")));
        }
        let Some(PixelBuffer::Pack(target)) = self.buffers.get(&buffer) else {
            return Err(DriverError::InvalidOperation(format!(
                "buffer {} is not a pixel-pack buffer",
                buffer.raw()
            )));
        };
        let row_bytes = rect.width() as usize * tex.device.upload_pf.bytes_per_pixel();
        let pitch = row_bytes.next_multiple_of(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT as usize);
        if (target.size() as usize) < pitch * rect.height() as usize {
            return Err(DriverError::InvalidOperation("pack buffer too small".to_owned()));
        }
        let mut encoder = self.rc.create_encoder("Texture Readback");
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &tex.texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: rect.tl.x as u32,
                    y: rect.tl.y as u32,
                    z: 0,
                },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: target,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(pitch as u32),
                    rows_per_image: Some(rect.height() as u32),
                },
            },
            extent(rect.size()),
        );
        checked(&self.rc.device, || self.rc.submit(encoder))
    }

    fn delete_texture(&mut self, texture: TextureId) {
        if let Some(tex) = self.textures.remove(&texture) {
            tex.texture.destroy();
            for unit in &mut self.units {
                if *unit == Some(texture) {
                    *unit = None;
                }
            }
        }
    }

    fn bind_texture(
        &mut self,
        unit: usize,
        texture: Option<TextureId>,
    ) -> Result<(), DriverError> {
        if unit >= TEXTURE_UNITS {
            return Err(DriverError::InvalidValue(format!("texture unit {unit}")));
        }
        if let Some(id) = texture {
            let _ = self.texture(id)?;
        }
        self.units[unit] = texture;
        Ok(())
    }

    fn set_blend(&mut self, state: BlendState) -> Result<(), DriverError> {
        self.blend = state;
        Ok(())
    }

    fn set_blend_color(&mut self, color: Vec4) -> Result<(), DriverError> {
        self.blend_color = color;
        Ok(())
    }

    fn create_buffer(&mut self, kind: BufferKind, size: usize) -> Result<BufferId, DriverError> {
        let buffer = match kind {
            BufferKind::PixelUnpack => PixelBuffer::Unpack(vec![0; size]),
            BufferKind::PixelPack => {
                let device = &self.rc.device;
                let size = (size as u64).next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT);
                PixelBuffer::Pack(checked(device, || {
                    device.create_buffer(&wgpu::BufferDescriptor {
                        label: Some("Pixel Pack Buffer"),
                        size,
                        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
                        mapped_at_creation: false,
                    })
                })?)
            }
        };
        let id = BufferId::from_raw(self.ids.allocate());
        let _ = self.buffers.insert(id, buffer);
        Ok(id)
    }

    fn write_buffer(
        &mut self,
        buffer: BufferId,
        offset: usize,
        data: &[u8],
    ) -> Result<(), DriverError> {
        match self.buffers.get_mut(&buffer) {
            Some(PixelBuffer::Unpack(stored)) => {
                let dest = stored
                    .get_mut(offset..offset + data.len())
                    .ok_or_else(|| {
                        DriverError::InvalidValue("buffer write overruns buffer".to_owned())
                    })?;
                dest.copy_from_slice(data);
                Ok(())
            }
            Some(PixelBuffer::Pack(_)) => Err(DriverError::InvalidOperation(format!(
                "buffer {} is a pixel-pack buffer",
                buffer.raw()
            ))),
            None => Err(DriverError::InvalidOperation(format!(
                "unknown buffer {}",
                buffer.raw()
            ))),
        }
    }

    fn read_buffer(&mut self, buffer: BufferId, len: usize) -> Result<Vec<u8>, DriverError> {
        let stored = match self.buffers.get(&buffer) {
            Some(PixelBuffer::Unpack(data)) => {
                return data.get(..len).map(<[u8]>::to_vec).ok_or_else(|| {
                    DriverError::InvalidValue("buffer read overruns buffer".to_owned())
                })
            }
            Some(PixelBuffer::Pack(stored)) => stored,
            None => {
                return Err(DriverError::InvalidOperation(format!(
                    "unknown buffer {}",
                    buffer.raw()
                )))
            }
        };
        if len as u64 > stored.size() {
            return Err(DriverError::InvalidValue("buffer read overruns buffer".to_owned()));
        }

        let slice = stored.slice(..);
        let (sender, receiver) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        let _ = self
            .rc
            .device
            .poll(wgpu::PollType::Wait)
            .map_err(|e| DriverError::Validation(e.to_string()))?;
        receiver
            .recv()
            .map_err(|_| DriverError::ContextLost)?
            .map_err(|e| DriverError::Validation(e.to_string()))?;

        let bytes = {
            let mapped = slice.get_mapped_range();
            mapped[..len].to_vec()
        };
        stored.unmap();
        Ok(bytes)
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        if let Some(PixelBuffer::Pack(stored)) = self.buffers.remove(&buffer) {
            stored.destroy();
        }
    }

    fn create_render_target(&mut self, size: IVec2) -> Result<RenderTargetId, DriverError> {
        if size.cmple(IVec2::ZERO).any() {
            return Err(DriverError::InvalidValue(format!(
                "render target size {}x{}",
                size.x, size.y
            )));
        }
        let device = &self.rc.device;
        let format = self.rc.format();
        let target = checked(device, || {
            RenderTarget::new(device, "Render Target", size.x as u32, size.y as u32, format)
        })?;
        let id = RenderTargetId::from_raw(self.ids.allocate());
        let _ = self.render_targets.insert(id, target);
        Ok(id)
    }

    fn delete_render_target(&mut self, target: RenderTargetId) {
        if let Some(target) = self.render_targets.remove(&target) {
            target.texture.destroy();
        }
    }

    fn compile_program(&mut self, kind: ShaderKind) -> Result<ProgramId, DriverError> {
        let device = &self.rc.device;
        let composer = &mut self.composer;
        let module = checked(device, || composer.compose(device, kind))?
            .map_err(|e| DriverError::Validation(format!("{kind}: {e}")))?;
        let id = ProgramId::from_raw(self.ids.allocate());
        let _ = self.programs.insert(id, (kind, module));
        Ok(id)
    }

    fn use_program(&mut self, program: Option<ProgramId>) -> Result<(), DriverError> {
        if let Some(id) = program {
            if !self.programs.contains_key(&id) {
                return Err(DriverError::InvalidOperation(format!("unknown program {}", id.raw())));
            }
        }
        self.program = program;
        Ok(())
    }

    fn delete_program(&mut self, program: ProgramId) {
        if self.programs.remove(&program).is_some() {
            self.pipelines.retain(|(id, _), _| *id != program);
            if self.program == Some(program) {
                self.program = None;
            }
            if self.standard == Some(program) {
                self.standard = None;
            }
        }
    }

    fn draw_indexed(
        &mut self,
        vertices: &[TexturedVertex],
        indices: &[u32],
    ) -> Result<(), DriverError> {
        let Some(base) = self.units[0] else {
            return Err(DriverError::InvalidOperation("no texture bound to unit 0".to_owned()));
        };
        if indices.iter().any(|&i| i as usize >= vertices.len()) {
            return Err(DriverError::InvalidValue("index past end of vertex data".to_owned()));
        }
        if indices.is_empty() {
            return Ok(());
        }
        let swizzle = self.texture(base)?.device.swizzle;
        let program = match self.program {
            Some(program) => program,
            None => self.standard_program()?,
        };
        self.ensure_pipeline(program)?;
        self.acquire_frame()?;

        self.write_uniforms(swizzle)?;
        let _ = self.vertices.write(&self.rc.device, &self.rc.queue, vertices);
        let _ = self.indices.write(&self.rc.device, &self.rc.queue, indices);
        let bind_group = self.bind_group();

        let Some(pipeline) = self.pipelines.get(&(program, self.blend)) else {
            return Err(DriverError::InvalidOperation("pipeline missing".to_owned()));
        };
        let Some(frame) = self.frame.as_ref() else {
            return Err(DriverError::InvalidOperation("no frame in flight".to_owned()));
        };
        let target = match (&frame.surface, &self.offscreen) {
            (Some((_, view)), _) => view,
            (None, Some(offscreen)) => &offscreen.view,
            (None, None) => return Err(DriverError::ContextLost),
        };
        let load = if frame.cleared {
            wgpu::LoadOp::Load
        } else {
            wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT)
        };

        let mut encoder = self.rc.create_encoder("Tile Draw");
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Tile Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.set_vertex_buffer(0, self.vertices.buffer().slice(..));
            pass.set_index_buffer(self.indices.buffer().slice(..), wgpu::IndexFormat::Uint32);
            pass.set_blend_constant(wgpu::Color {
                r: f64::from(self.blend_color.x),
                g: f64::from(self.blend_color.y),
                b: f64::from(self.blend_color.z),
                a: f64::from(self.blend_color.w),
            });
            pass.draw_indexed(0..indices.len() as u32, 0, 0..1);
        }
        checked(&self.rc.device, || self.rc.submit(encoder))?;
        if let Some(frame) = self.frame.as_mut() {
            frame.cleared = true;
        }
        Ok(())
    }

    fn take_error(&mut self) -> Option<DriverError> {
        self.errors.lock().ok()?.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixel::format::api_format;

    fn storage(pf: PixelFormat) -> DeviceFormat {
        let api = api_format(pf, ApiProfile::Desktop).unwrap();
        device_format(pf, api.format, api.internal_format)
    }

    #[test]
    fn single_channel_formats_swizzle_in_the_shader() {
        let luma = storage(PixelFormat::I8);
        assert_eq!(luma.format, wgpu::TextureFormat::R8Unorm);
        assert_eq!(luma.swizzle, SWIZZLE_LUMINANCE);
        assert_eq!(storage(PixelFormat::A8).swizzle, SWIZZLE_ALPHA);
        assert_eq!(storage(PixelFormat::R8).swizzle, SWIZZLE_RGBA);
        assert_eq!(storage(PixelFormat::I32F).format, wgpu::TextureFormat::R32Float);
    }

    #[test]
    fn three_channel_formats_are_widened() {
        for pf in [PixelFormat::R8G8B8, PixelFormat::B5G6R5, PixelFormat::R8G8B8X8] {
            let stored = storage(pf);
            assert_eq!(stored.format, wgpu::TextureFormat::Rgba8Unorm, "{pf}");
            assert_eq!(stored.upload_pf, PixelFormat::R8G8B8A8, "{pf}");
        }
    }

    #[test]
    fn bgra_keeps_its_byte_order() {
        let stored = storage(PixelFormat::B8G8R8X8);
        assert_eq!(stored.format, wgpu::TextureFormat::Bgra8Unorm);
        assert_eq!(stored.upload_pf, PixelFormat::B8G8R8A8);
    }

    #[test]
    fn rect_must_stay_inside_bounds() {
        let bounds = IVec2::new(4, 4);
        assert!(rect_inside(IVec2::new(2, 2), IVec2::new(2, 2), bounds));
        assert!(!rect_inside(IVec2::new(3, 2), IVec2::new(2, 2), bounds));
        assert!(!rect_inside(IVec2::new(-1, 0), IVec2::ONE, bounds));
    }
}
