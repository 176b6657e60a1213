//! Software driver that keeps every object in memory.
//!
//! Textures and buffers hold real bytes, so uploads and readback behave
//! like a GPU's, but nothing is rasterised: draws are recorded. A
//! [`HeadlessProbe`] shares the driver's state so callers can inspect what
//! reached the "hardware" after the driver has been boxed into a context,
//! and can inject failures.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use glam::{IVec2, Vec4};
use rustc_hash::FxHashMap;

use crate::geometry::IntRect;
use crate::gpu::driver::{
    BackendKind, BufferId, BufferKind, DriverError, DriverLimits, GpuDriver, IdAllocator,
    ProgramId, RenderTargetId, TextureDesc, TextureId, TextureWrite, UploadSource,
};
use crate::gpu::shader_registry::ShaderKind;
use crate::gpu::state::{BlendState, TEXTURE_UNITS};
use crate::pixel::format::{ApiProfile, PixelFormat};
use crate::texture::vertex_array::TexturedVertex;

/// Capabilities the headless driver reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadlessLimits {
    /// Largest texture dimension.
    pub max_texture_size: u32,
    /// Refuse non-power-of-two textures.
    pub requires_pot: bool,
    /// Allow float textures.
    pub supports_float: bool,
    /// Report the embedded API profile.
    pub embedded: bool,
    /// Allow pixel transfer buffers.
    pub supports_pixel_buffers: bool,
    /// Allow min/max blending.
    pub min_max_blend: bool,
    /// Report used video memory.
    pub memory_info: bool,
    /// Row alignment of texture readback.
    pub pack_row_alignment: usize,
}

impl Default for HeadlessLimits {
    fn default() -> Self {
        Self {
            max_texture_size: 4096,
            requires_pot: false,
            supports_float: true,
            embedded: false,
            supports_pixel_buffers: true,
            min_max_blend: true,
            memory_info: true,
            pack_row_alignment: 1,
        }
    }
}

impl HeadlessLimits {
    /// Full capability record for these settings.
    #[must_use]
    pub fn to_driver_limits(&self) -> DriverLimits {
        DriverLimits {
            max_texture_size: self.max_texture_size,
            requires_pot: self.requires_pot,
            supports_float: self.supports_float,
            supports_pixel_buffers: self.supports_pixel_buffers,
            profile: if self.embedded {
                ApiProfile::Embedded
            } else {
                ApiProfile::Desktop
            },
            memory_info: self.memory_info,
            video_mem_installed: Some(256 << 20),
            min_max_blend: self.min_max_blend,
            sample_counts: vec![1, 2, 4, 8],
            pack_row_alignment: self.pack_row_alignment.max(1),
            vendor: "Tessera Software".to_owned(),
            version: env!("CARGO_PKG_VERSION").to_owned(),
        }
    }
}

/// Driver calls that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeadlessOp {
    /// [`GpuDriver::make_current`].
    MakeCurrent,
    /// [`GpuDriver::create_texture`].
    CreateTexture,
    /// [`GpuDriver::write_texture`].
    WriteTexture,
    /// [`GpuDriver::read_texture`].
    ReadTexture,
    /// [`GpuDriver::bind_texture`].
    BindTexture,
    /// [`GpuDriver::set_blend`].
    SetBlend,
    /// [`GpuDriver::set_blend_color`].
    SetBlendColor,
    /// [`GpuDriver::create_buffer`].
    CreateBuffer,
    /// [`GpuDriver::create_render_target`].
    CreateRenderTarget,
    /// [`GpuDriver::compile_program`].
    CompileProgram,
    /// [`GpuDriver::use_program`].
    UseProgram,
    /// [`GpuDriver::draw_indexed`].
    Draw,
}

/// One accepted texture write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRecord {
    /// Destination.
    pub texture: TextureId,
    /// Top-left texel.
    pub origin: IVec2,
    /// Extent.
    pub size: IVec2,
    /// Source row length in pixels.
    pub row_length: usize,
    /// Staged through a pixel-unpack buffer.
    pub from_buffer: bool,
}

/// One accepted draw.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawRecord {
    /// Vertex data.
    pub vertices: Vec<TexturedVertex>,
    /// Triangle list indices.
    pub indices: Vec<u32>,
    /// Textures bound to units 0 to 2.
    pub textures: [Option<TextureId>; 3],
    /// Program in use.
    pub program: Option<ProgramId>,
    /// Blend state in effect.
    pub blend: Option<BlendState>,
}

#[derive(Debug)]
struct StoredTexture {
    size: IVec2,
    pf: PixelFormat,
    pixels: Vec<u8>,
}

#[derive(Debug, Default)]
struct Counters {
    activations: usize,
    limits_queries: usize,
    blend_changes: usize,
    blend_color_changes: usize,
    texture_binds: usize,
    program_changes: usize,
    swaps: usize,
    textures_created: Vec<IVec2>,
    buffers_created: usize,
    render_targets_created: usize,
    programs_compiled: Vec<ShaderKind>,
}

#[derive(Debug)]
struct ArmedFailure {
    op: HeadlessOp,
    skip: usize,
    error: DriverError,
}

#[derive(Debug)]
struct HeadlessState {
    limits: HeadlessLimits,
    ids: IdAllocator,
    textures: FxHashMap<TextureId, StoredTexture>,
    buffers: FxHashMap<BufferId, (BufferKind, Vec<u8>)>,
    render_targets: FxHashMap<RenderTargetId, IVec2>,
    programs: FxHashMap<ProgramId, ShaderKind>,
    units: [Option<TextureId>; TEXTURE_UNITS],
    blend: Option<BlendState>,
    blend_color: Vec4,
    program: Option<ProgramId>,
    counters: Counters,
    uploads: Vec<UploadRecord>,
    draws: Vec<DrawRecord>,
    pending_errors: VecDeque<DriverError>,
    failures: Vec<ArmedFailure>,
    video_mem_used: u64,
}

impl HeadlessState {
    fn fail_if_armed(&mut self, op: HeadlessOp) -> Result<(), DriverError> {
        let Some(index) = self.failures.iter().position(|armed| armed.op == op) else {
            return Ok(());
        };
        if self.failures[index].skip > 0 {
            self.failures[index].skip -= 1;
            return Ok(());
        }
        Err(self.failures.remove(index).error)
    }

    fn texture(&self, id: TextureId) -> Result<&StoredTexture, DriverError> {
        self.textures
            .get(&id)
            .ok_or_else(|| DriverError::InvalidOperation(format!("unknown texture {}", id.raw())))
    }
}

fn rect_inside(origin: IVec2, size: IVec2, bounds: IVec2) -> bool {
    origin.x >= 0
        && origin.y >= 0
        && size.x >= 0
        && size.y >= 0
        && origin.x + size.x <= bounds.x
        && origin.y + size.y <= bounds.y
}

/// Bytes a `size` rectangle spans in a source with `row_length` pixels per
/// row.
fn source_span(size: IVec2, row_length: usize, bpp: usize) -> usize {
    if size.x <= 0 || size.y <= 0 {
        return 0;
    }
    ((size.y as usize - 1) * row_length + size.x as usize) * bpp
}

/// In-memory [`GpuDriver`].
#[derive(Debug)]
pub struct HeadlessDriver {
    state: Rc<RefCell<HeadlessState>>,
}

impl HeadlessDriver {
    /// Driver reporting `limits`.
    #[must_use]
    pub fn new(limits: HeadlessLimits) -> Self {
        let state = HeadlessState {
            limits,
            ids: IdAllocator::default(),
            textures: FxHashMap::default(),
            buffers: FxHashMap::default(),
            render_targets: FxHashMap::default(),
            programs: FxHashMap::default(),
            units: [None; TEXTURE_UNITS],
            blend: None,
            blend_color: Vec4::ZERO,
            program: None,
            counters: Counters::default(),
            uploads: Vec::new(),
            draws: Vec::new(),
            pending_errors: VecDeque::new(),
            failures: Vec::new(),
            video_mem_used: 0,
        };
        Self {
            state: Rc::new(RefCell::new(state)),
        }
    }

    /// Handle onto this driver's state that outlives boxing.
    #[must_use]
    pub fn probe(&self) -> HeadlessProbe {
        HeadlessProbe {
            state: Rc::clone(&self.state),
        }
    }
}

impl GpuDriver for HeadlessDriver {
    fn backend(&self) -> BackendKind {
        BackendKind::Headless
    }

    fn make_current(&mut self) -> Result<(), DriverError> {
        let mut state = self.state.borrow_mut();
        state.fail_if_armed(HeadlessOp::MakeCurrent)?;
        state.counters.activations += 1;
        Ok(())
    }

    fn swap_buffers(&mut self) -> Result<(), DriverError> {
        self.state.borrow_mut().counters.swaps += 1;
        Ok(())
    }

    fn query_limits(&mut self) -> DriverLimits {
        let mut state = self.state.borrow_mut();
        state.counters.limits_queries += 1;
        state.limits.to_driver_limits()
    }

    fn video_mem_used(&mut self) -> Option<u64> {
        let state = self.state.borrow();
        state.limits.memory_info.then_some(state.video_mem_used)
    }

    fn create_texture(&mut self, desc: &TextureDesc<'_>) -> Result<TextureId, DriverError> {
        let mut state = self.state.borrow_mut();
        state.fail_if_armed(HeadlessOp::CreateTexture)?;
        let max = state.limits.max_texture_size as i32;
        let size = desc.size;
        if size.x <= 0 || size.y <= 0 || size.x > max || size.y > max {
            return Err(DriverError::InvalidValue(format!(
                "texture size {}x{} outside 1..={max}",
                size.x, size.y
            )));
        }
        let pot = (size.x as u32).is_power_of_two() && (size.y as u32).is_power_of_two();
        if state.limits.requires_pot && !pot {
            return Err(DriverError::InvalidValue(format!(
                "non-power-of-two texture {}x{}",
                size.x, size.y
            )));
        }
        let id = TextureId::from_raw(state.ids.allocate());
        let bytes = size.x as usize * size.y as usize * desc.pf.bytes_per_pixel();
        let _ = state.textures.insert(
            id,
            StoredTexture {
                size,
                pf: desc.pf,
                pixels: vec![0; bytes],
            },
        );
        state.counters.textures_created.push(size);
        Ok(id)
    }

    fn write_texture(&mut self, write: &TextureWrite<'_>) -> Result<(), DriverError> {
        let mut state = self.state.borrow_mut();
        state.fail_if_armed(HeadlessOp::WriteTexture)?;
        let tex = state.texture(write.texture)?;
        let bpp = tex.pf.bytes_per_pixel();
        if write.pf.bytes_per_pixel() != bpp {
            return Err(DriverError::InvalidOperation(format!(
                "{} data written into {} texture",
                write.pf, tex.pf
            )));
        }
        if !rect_inside(write.origin, write.size, tex.size) {
            return Err(DriverError::InvalidValue(format!(
                "write of {}x{} at ({}, {}) leaves texture",
                write.size.x, write.size.y, write.origin.x, write.origin.y
            )));
        }
        if write.row_length < write.size.x as usize {
            return Err(DriverError::InvalidValue("row length shorter than rect".to_owned()));
        }
        let tex_width = tex.size.x as usize;
        let span = source_span(write.size, write.row_length, bpp);
        let src: Vec<u8> = match write.source {
            UploadSource::Memory(bytes) => bytes.get(..span).map(<[u8]>::to_vec),
            UploadSource::Buffer { buffer, offset } => match state.buffers.get(&buffer) {
                Some((BufferKind::PixelUnpack, data)) => {
                    data.get(offset..offset + span).map(<[u8]>::to_vec)
                }
                _ => {
                    return Err(DriverError::InvalidOperation(format!(
                        "buffer {} is not a pixel-unpack buffer",
                        buffer.raw()
                    )))
                }
            },
        }
        .ok_or_else(|| DriverError::InvalidOperation("upload source too short".to_owned()))?;

        let row_bytes = write.size.x as usize * bpp;
        let texture = write.texture;
        if let Some(tex) = state.textures.get_mut(&texture) {
            for row in 0..write.size.y as usize {
                let from = row * write.row_length * bpp;
                let to = ((write.origin.y as usize + row) * tex_width + write.origin.x as usize)
                    * bpp;
                tex.pixels[to..to + row_bytes].copy_from_slice(&src[from..from + row_bytes]);
            }
        }
        state.uploads.push(UploadRecord {
            texture,
            origin: write.origin,
            size: write.size,
            row_length: write.row_length,
            from_buffer: matches!(write.source, UploadSource::Buffer { .. }),
        });
        Ok(())
    }

    fn read_texture(
        &mut self,
        texture: TextureId,
        rect: IntRect,
        buffer: BufferId,
    ) -> Result<(), DriverError> {
        let mut state = self.state.borrow_mut();
        state.fail_if_armed(HeadlessOp::ReadTexture)?;
        let alignment = state.limits.pack_row_alignment.max(1);
        let tex = state.texture(texture)?;
        if !rect_inside(rect.tl, rect.size(), tex.size) {
            return Err(DriverError::InvalidValue(format!("readback of {rect} leaves texture")));
        }
        let bpp = tex.pf.bytes_per_pixel();
        let row_bytes = rect.width() as usize * bpp;
        let pitch = row_bytes.next_multiple_of(alignment);
        let tex_width = tex.size.x as usize;
        let rows: Vec<Vec<u8>> = (0..rect.height() as usize)
            .map(|row| {
                let from = ((rect.tl.y as usize + row) * tex_width + rect.tl.x as usize) * bpp;
                tex.pixels[from..from + row_bytes].to_vec()
            })
            .collect();
        match state.buffers.get_mut(&buffer) {
            Some((BufferKind::PixelPack, data)) if data.len() >= pitch * rows.len() => {
                for (index, row) in rows.iter().enumerate() {
                    data[index * pitch..index * pitch + row_bytes].copy_from_slice(row);
                }
                Ok(())
            }
            Some((BufferKind::PixelPack, _)) => {
                Err(DriverError::InvalidOperation("pack buffer too small".to_owned()))
            }
            _ => Err(DriverError::InvalidOperation(format!(
                "buffer {} is not a pixel-pack buffer",
                buffer.raw()
            ))),
        }
    }

    fn delete_texture(&mut self, texture: TextureId) {
        let mut state = self.state.borrow_mut();
        if state.textures.remove(&texture).is_some() {
            for unit in &mut state.units {
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
        let mut state = self.state.borrow_mut();
        state.fail_if_armed(HeadlessOp::BindTexture)?;
        if let Some(id) = texture {
            let _ = state.texture(id)?;
        }
        state.units[unit] = texture;
        state.counters.texture_binds += 1;
        Ok(())
    }

    fn set_blend(&mut self, blend: BlendState) -> Result<(), DriverError> {
        let mut state = self.state.borrow_mut();
        state.fail_if_armed(HeadlessOp::SetBlend)?;
        if blend.mode.needs_min_max() && !state.limits.min_max_blend {
            return Err(DriverError::InvalidOperation(format!(
                "{} blending not available",
                blend.mode
            )));
        }
        state.blend = Some(blend);
        state.counters.blend_changes += 1;
        Ok(())
    }

    fn set_blend_color(&mut self, color: Vec4) -> Result<(), DriverError> {
        let mut state = self.state.borrow_mut();
        state.fail_if_armed(HeadlessOp::SetBlendColor)?;
        state.blend_color = color;
        state.counters.blend_color_changes += 1;
        Ok(())
    }

    fn create_buffer(&mut self, kind: BufferKind, size: usize) -> Result<BufferId, DriverError> {
        let mut state = self.state.borrow_mut();
        state.fail_if_armed(HeadlessOp::CreateBuffer)?;
        if !state.limits.supports_pixel_buffers {
            return Err(DriverError::InvalidOperation("pixel buffers not supported".to_owned()));
        }
        let id = BufferId::from_raw(state.ids.allocate());
        let _ = state.buffers.insert(id, (kind, vec![0; size]));
        state.counters.buffers_created += 1;
        Ok(id)
    }

    fn write_buffer(
        &mut self,
        buffer: BufferId,
        offset: usize,
        data: &[u8],
    ) -> Result<(), DriverError> {
        let mut state = self.state.borrow_mut();
        let (_, stored) = state
            .buffers
            .get_mut(&buffer)
            .ok_or_else(|| DriverError::InvalidOperation(format!("unknown buffer {}", buffer.raw())))?;
        let dest = stored
            .get_mut(offset..offset + data.len())
            .ok_or_else(|| DriverError::InvalidValue("buffer write overruns buffer".to_owned()))?;
        dest.copy_from_slice(data);
        Ok(())
    }

    fn read_buffer(&mut self, buffer: BufferId, len: usize) -> Result<Vec<u8>, DriverError> {
        let state = self.state.borrow();
        let (_, stored) = state
            .buffers
            .get(&buffer)
            .ok_or_else(|| DriverError::InvalidOperation(format!("unknown buffer {}", buffer.raw())))?;
        stored
            .get(..len)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| DriverError::InvalidValue("buffer read overruns buffer".to_owned()))
    }

    fn delete_buffer(&mut self, buffer: BufferId) {
        let _ = self.state.borrow_mut().buffers.remove(&buffer);
    }

    fn create_render_target(&mut self, size: IVec2) -> Result<RenderTargetId, DriverError> {
        let mut state = self.state.borrow_mut();
        state.fail_if_armed(HeadlessOp::CreateRenderTarget)?;
        let id = RenderTargetId::from_raw(state.ids.allocate());
        let _ = state.render_targets.insert(id, size);
        state.counters.render_targets_created += 1;
        Ok(id)
    }

    fn delete_render_target(&mut self, target: RenderTargetId) {
        let _ = self.state.borrow_mut().render_targets.remove(&target);
    }

    fn compile_program(&mut self, kind: ShaderKind) -> Result<ProgramId, DriverError> {
        let mut state = self.state.borrow_mut();
        state.fail_if_armed(HeadlessOp::CompileProgram)?;
        let id = ProgramId::from_raw(state.ids.allocate());
        let _ = state.programs.insert(id, kind);
        state.counters.programs_compiled.push(kind);
        Ok(id)
    }

    fn use_program(&mut self, program: Option<ProgramId>) -> Result<(), DriverError> {
        let mut state = self.state.borrow_mut();
        state.fail_if_armed(HeadlessOp::UseProgram)?;
        if let Some(id) = program {
            if !state.programs.contains_key(&id) {
                return Err(DriverError::InvalidOperation(format!("unknown program {}", id.raw())));
            }
        }
        state.program = program;
        state.counters.program_changes += 1;
        Ok(())
    }

    fn delete_program(&mut self, program: ProgramId) {
        let mut state = self.state.borrow_mut();
        if state.programs.remove(&program).is_some() && state.program == Some(program) {
            state.program = None;
        }
    }

    fn draw_indexed(
        &mut self,
        vertices: &[TexturedVertex],
        indices: &[u32],
    ) -> Result<(), DriverError> {
        let mut state = self.state.borrow_mut();
        state.fail_if_armed(HeadlessOp::Draw)?;
        if state.units[0].is_none() {
            return Err(DriverError::InvalidOperation("no texture bound to unit 0".to_owned()));
        }
        if indices.iter().any(|&i| i as usize >= vertices.len()) {
            return Err(DriverError::InvalidValue("index past end of vertex data".to_owned()));
        }
        let record = DrawRecord {
            vertices: vertices.to_vec(),
            indices: indices.to_vec(),
            textures: [state.units[0], state.units[1], state.units[2]],
            program: state.program,
            blend: state.blend,
        };
        state.draws.push(record);
        Ok(())
    }

    fn take_error(&mut self) -> Option<DriverError> {
        self.state.borrow_mut().pending_errors.pop_front()
    }
}

/// Shared view of a [`HeadlessDriver`]'s state.
#[derive(Debug, Clone)]
pub struct HeadlessProbe {
    state: Rc<RefCell<HeadlessState>>,
}

impl HeadlessProbe {
    /// Times the driver was made current.
    #[must_use]
    pub fn activations(&self) -> usize {
        self.state.borrow().counters.activations
    }

    /// Times capabilities were queried.
    #[must_use]
    pub fn limits_queries(&self) -> usize {
        self.state.borrow().counters.limits_queries
    }

    /// Blend state changes that reached the driver.
    #[must_use]
    pub fn blend_changes(&self) -> usize {
        self.state.borrow().counters.blend_changes
    }

    /// Blend colour changes that reached the driver.
    #[must_use]
    pub fn blend_color_changes(&self) -> usize {
        self.state.borrow().counters.blend_color_changes
    }

    /// Texture binds that reached the driver.
    #[must_use]
    pub fn texture_binds(&self) -> usize {
        self.state.borrow().counters.texture_binds
    }

    /// Program changes that reached the driver.
    #[must_use]
    pub fn program_changes(&self) -> usize {
        self.state.borrow().counters.program_changes
    }

    /// Frames presented.
    #[must_use]
    pub fn swaps(&self) -> usize {
        self.state.borrow().counters.swaps
    }

    /// Sizes of every texture ever created, in creation order.
    #[must_use]
    pub fn textures_created(&self) -> Vec<IVec2> {
        self.state.borrow().counters.textures_created.clone()
    }

    /// Textures currently alive.
    #[must_use]
    pub fn live_textures(&self) -> usize {
        self.state.borrow().textures.len()
    }

    /// Stored bytes of a live texture.
    #[must_use]
    pub fn texture_pixels(&self, texture: TextureId) -> Option<Vec<u8>> {
        self.state.borrow().textures.get(&texture).map(|t| t.pixels.clone())
    }

    /// Pixel buffers ever created.
    #[must_use]
    pub fn buffers_created(&self) -> usize {
        self.state.borrow().counters.buffers_created
    }

    /// Pixel buffers currently alive.
    #[must_use]
    pub fn live_buffers(&self) -> usize {
        self.state.borrow().buffers.len()
    }

    /// Render targets ever created.
    #[must_use]
    pub fn render_targets_created(&self) -> usize {
        self.state.borrow().counters.render_targets_created
    }

    /// Render targets currently alive.
    #[must_use]
    pub fn live_render_targets(&self) -> usize {
        self.state.borrow().render_targets.len()
    }

    /// Programs compiled, in order.
    #[must_use]
    pub fn programs_compiled(&self) -> Vec<ShaderKind> {
        self.state.borrow().counters.programs_compiled.clone()
    }

    /// Programs currently alive.
    #[must_use]
    pub fn live_programs(&self) -> usize {
        self.state.borrow().programs.len()
    }

    /// Texture bound to `unit` on the driver side.
    #[must_use]
    pub fn bound_texture(&self, unit: usize) -> Option<TextureId> {
        self.state.borrow().units[unit]
    }

    /// Program current on the driver side.
    #[must_use]
    pub fn current_program(&self) -> Option<ProgramId> {
        self.state.borrow().program
    }

    /// Blend state current on the driver side.
    #[must_use]
    pub fn current_blend(&self) -> Option<BlendState> {
        self.state.borrow().blend
    }

    /// Every accepted texture write.
    #[must_use]
    pub fn uploads(&self) -> Vec<UploadRecord> {
        self.state.borrow().uploads.clone()
    }

    /// Every accepted draw.
    #[must_use]
    pub fn draws(&self) -> Vec<DrawRecord> {
        self.state.borrow().draws.clone()
    }

    /// Make the next call of `op` fail with `error`.
    pub fn fail_next(&self, op: HeadlessOp, error: DriverError) {
        self.fail_nth(op, 0, error);
    }

    /// Let `skip` calls of `op` succeed, then fail the next one with `error`.
    pub fn fail_nth(&self, op: HeadlessOp, skip: usize, error: DriverError) {
        self.state
            .borrow_mut()
            .failures
            .push(ArmedFailure { op, skip, error });
    }

    /// Queue an asynchronous error for [`GpuDriver::take_error`].
    pub fn push_error(&self, error: DriverError) {
        self.state.borrow_mut().pending_errors.push_back(error);
    }

    /// Set the used video memory the driver reports.
    pub fn set_video_mem_used(&self, bytes: u64) {
        self.state.borrow_mut().video_mem_used = bytes;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixel::format::api_format;

    fn rgba_desc(size: IVec2) -> TextureDesc<'static> {
        TextureDesc {
            label: "test",
            size,
            pf: PixelFormat::R8G8B8A8,
            format: api_format(PixelFormat::R8G8B8A8, ApiProfile::Desktop).unwrap(),
            clear: false,
        }
    }

    #[test]
    fn writes_land_at_the_right_offset() {
        let mut driver = HeadlessDriver::new(HeadlessLimits::default());
        let probe = driver.probe();
        let tex = driver.create_texture(&rgba_desc(IVec2::new(4, 4))).unwrap();
        let src: Vec<u8> = (0..64).collect();
        driver
            .write_texture(&TextureWrite {
                texture: tex,
                origin: IVec2::new(1, 2),
                size: IVec2::new(2, 2),
                row_length: 4,
                pf: PixelFormat::R8G8B8A8,
                source: UploadSource::Memory(&src),
            })
            .unwrap();
        let pixels = probe.texture_pixels(tex).unwrap();
        let at = |x: usize, y: usize| &pixels[(y * 4 + x) * 4..(y * 4 + x) * 4 + 4];
        assert_eq!(at(1, 2), &src[0..4]);
        assert_eq!(at(2, 3), &src[20..24]);
        assert_eq!(at(0, 0), &[0, 0, 0, 0]);
    }

    #[test]
    fn out_of_bounds_write_is_rejected() {
        let mut driver = HeadlessDriver::new(HeadlessLimits::default());
        let tex = driver.create_texture(&rgba_desc(IVec2::new(4, 4))).unwrap();
        let src = vec![0; 64];
        let result = driver.write_texture(&TextureWrite {
            texture: tex,
            origin: IVec2::new(3, 0),
            size: IVec2::new(2, 1),
            row_length: 2,
            pf: PixelFormat::R8G8B8A8,
            source: UploadSource::Memory(&src),
        });
        assert!(matches!(result, Err(DriverError::InvalidValue(_))));
    }

    #[test]
    fn pot_only_hardware_refuses_npot() {
        let mut driver = HeadlessDriver::new(HeadlessLimits {
            requires_pot: true,
            ..HeadlessLimits::default()
        });
        assert!(driver.create_texture(&rgba_desc(IVec2::new(100, 64))).is_err());
        assert!(driver.create_texture(&rgba_desc(IVec2::new(128, 64))).is_ok());
    }

    #[test]
    fn armed_failure_fires_once() {
        let mut driver = HeadlessDriver::new(HeadlessLimits::default());
        let probe = driver.probe();
        probe.fail_next(HeadlessOp::CreateBuffer, DriverError::OutOfMemory);
        assert_eq!(
            driver.create_buffer(BufferKind::PixelUnpack, 16),
            Err(DriverError::OutOfMemory)
        );
        assert!(driver.create_buffer(BufferKind::PixelUnpack, 16).is_ok());
        assert_eq!(probe.buffers_created(), 1);
    }

    #[test]
    fn deleting_a_bound_texture_unbinds_it() {
        let mut driver = HeadlessDriver::new(HeadlessLimits::default());
        let probe = driver.probe();
        let tex = driver.create_texture(&rgba_desc(IVec2::new(2, 2))).unwrap();
        driver.bind_texture(0, Some(tex)).unwrap();
        driver.delete_texture(tex);
        assert_eq!(probe.bound_texture(0), None);
        assert_eq!(probe.live_textures(), 0);
    }
}
