//! The per-thread graphics context.
//!
//! A [`GraphicsContext`] owns one [`GpuDriver`] and everything that must not
//! outlive it: the mirror of driver state, the object pools, the compiled
//! shader programs and the capability record. Every state change the
//! texture layer makes goes through here so redundant driver calls are
//! filtered out and failures surface as typed errors.
//!
//! Contexts are shared as `Rc<GraphicsContext>` and are therefore confined
//! to the thread that created them. Activating a context registers it as the
//! thread's current one; dependent objects still receive the context
//! explicitly and use [`GraphicsContext::current`] only for lookups and
//! assertions.

use std::cell::{Cell, OnceCell, RefCell, RefMut};
use std::rc::{Rc, Weak};

use glam::{IVec2, Vec4};

use crate::error::{ConfigError, Result, TesseraError};
use crate::geometry::IntRect;
use crate::gpu::capabilities::Capabilities;
use crate::gpu::driver::{
    BackendKind, BufferId, BufferKind, DriverError, DriverLimits, GpuDriver, ProgramId,
    RenderTargetId, TextureDesc, TextureId, TextureWrite,
};
use crate::gpu::error_check;
use crate::gpu::object_cache::{BufferKey, BufferPool, RenderTargetPool};
use crate::gpu::profiling;
use crate::gpu::shader_registry::{ShaderKind, ShaderRegistry};
use crate::gpu::state::{BlendMode, BlendState, StateCache};
use crate::options::{GpuOptions, ShaderUsage};
use crate::pixel::bitmap::Bitmap;
use crate::pixel::format::{ApiProfile, PixelFormat};
use crate::texture::vertex_array::VertexArray;

thread_local! {
    static CURRENT: RefCell<Weak<GraphicsContext>> = RefCell::new(Weak::new());
}

/// How pixel data travels to the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryMode {
    /// Straight from client memory.
    Main,
    /// Staged through pooled pixel-unpack buffers.
    Pbo,
}

/// Object counts of one pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PoolStats {
    /// Objects created and not yet destroyed.
    pub allocated: usize,
    /// Objects currently handed out.
    pub in_use: usize,
    /// Objects waiting for reuse.
    pub free: usize,
}

/// A graphics context bound to one driver backend.
pub struct GraphicsContext {
    driver: RefCell<Box<dyn GpuDriver>>,
    options: GpuOptions,
    caps: Capabilities,
    state: RefCell<StateCache>,
    buffers: RefCell<BufferPool>,
    render_targets: RefCell<RenderTargetPool>,
    shaders: RefCell<ShaderRegistry>,
    memory_mode: OnceCell<MemoryMode>,
    activated: Cell<bool>,
    torn_down: Cell<bool>,
}

impl std::fmt::Debug for GraphicsContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphicsContext")
            .field("backend", &self.backend())
            .field("activated", &self.activated.get())
            .field("torn_down", &self.torn_down.get())
            .finish_non_exhaustive()
    }
}

fn driver_error(label: &'static str) -> impl FnOnce(DriverError) -> TesseraError {
    move |source| TesseraError::Driver { label, source }
}

fn allocation_error(label: &'static str) -> impl FnOnce(DriverError) -> TesseraError {
    move |source| TesseraError::Allocation { label, source }
}

fn upload_error(label: &'static str) -> impl FnOnce(DriverError) -> TesseraError {
    move |source| TesseraError::Upload { label, source }
}

impl GraphicsContext {
    /// Context over `driver`, configured by `options`.
    ///
    /// The debug section of `options` is applied to the process-wide error
    /// switches. The context is not current until [`Self::activate`].
    ///
    /// # Errors
    ///
    /// [`TesseraError::Config`] for option values no context can honour.
    pub fn new(driver: Box<dyn GpuDriver>, options: GpuOptions) -> Result<Rc<Self>> {
        if options.render.multisample_samples == 0 {
            return Err(ConfigError::OptionsParse(
                "render.multisample_samples must be at least 1".to_owned(),
            )
            .into());
        }
        if let Some(enable) = options.debug.error_checks {
            error_check::enable_error_checks(enable);
        }
        error_check::enable_error_log(options.debug.error_log);
        log::debug!("creating {} graphics context", driver.backend());
        Ok(Rc::new(Self {
            driver: RefCell::new(driver),
            options,
            caps: Capabilities::default(),
            state: RefCell::new(StateCache::default()),
            buffers: RefCell::new(BufferPool::default()),
            render_targets: RefCell::new(RenderTargetPool::default()),
            shaders: RefCell::new(ShaderRegistry::default()),
            memory_mode: OnceCell::new(),
            activated: Cell::new(false),
            torn_down: Cell::new(false),
        }))
    }

    /// Make this context current on the calling thread.
    ///
    /// The first activation logs the capabilities if configured to and
    /// applies the configured default blend mode.
    ///
    /// # Errors
    ///
    /// [`TesseraError::ContextTornDown`] after teardown,
    /// [`TesseraError::Driver`] if the backend cannot make itself current.
    pub fn activate(self: &Rc<Self>) -> Result<()> {
        self.ensure_alive()?;
        self.driver()
            .make_current()
            .map_err(driver_error("activate"))?;
        CURRENT.with(|current| *current.borrow_mut() = Rc::downgrade(self));
        if !self.activated.replace(true) {
            if self.options.debug.log_config {
                self.log_config();
            }
            self.set_blend_mode(self.options.render.default_blend_mode, false)?;
        }
        Ok(())
    }

    /// The context most recently activated on this thread, if it is alive.
    #[must_use]
    pub fn current() -> Option<Rc<Self>> {
        CURRENT.with(|current| current.borrow().upgrade())
    }

    /// Whether this context is the thread's current one.
    #[must_use]
    pub fn is_current(&self) -> bool {
        CURRENT.with(|current| std::ptr::eq(current.borrow().as_ptr(), self))
    }

    /// How the backend reaches the hardware.
    #[must_use]
    pub fn backend(&self) -> BackendKind {
        self.driver.borrow().backend()
    }

    /// Options this context was created with.
    #[must_use]
    pub const fn options(&self) -> &GpuOptions {
        &self.options
    }

    /// Present the finished frame.
    ///
    /// # Errors
    ///
    /// [`TesseraError::ContextTornDown`] after teardown,
    /// [`TesseraError::Driver`] if presentation fails.
    pub fn swap_buffers(&self) -> Result<()> {
        self.ensure_alive()?;
        self.driver()
            .swap_buffers()
            .map_err(driver_error("swap_buffers"))
    }

    // -- State cache ---------------------------------------------------

    /// Select how fragments combine with the framebuffer. Does nothing if
    /// the mode is already current.
    ///
    /// # Errors
    ///
    /// [`TesseraError::UnsupportedBlendMode`] if the hardware lacks the
    /// equation; the cached state is untouched.
    /// [`TesseraError::Driver`] if the driver rejects the change.
    pub fn set_blend_mode(&self, mode: BlendMode, premultiplied: bool) -> Result<()> {
        self.ensure_alive()?;
        if !self.is_blend_mode_supported(mode) {
            return Err(TesseraError::UnsupportedBlendMode(mode));
        }
        let changed = self
            .state
            .borrow_mut()
            .set_blend(BlendState::new(mode, premultiplied), |blend| {
                self.driver().set_blend(blend)
            })
            .map_err(driver_error("set_blend_mode"))?;
        if changed {
            self.check_error("set_blend_mode")?;
        }
        Ok(())
    }

    /// Whether `mode` can be selected on this hardware.
    #[must_use]
    pub fn is_blend_mode_supported(&self, mode: BlendMode) -> bool {
        !mode.needs_min_max() || self.limits().min_max_blend
    }

    /// Set the constant blend colour. Does nothing if already current.
    ///
    /// # Errors
    ///
    /// [`TesseraError::Driver`] if the driver rejects the change.
    pub fn set_blend_color(&self, color: Vec4) -> Result<()> {
        self.ensure_alive()?;
        let changed = self
            .state
            .borrow_mut()
            .set_blend_color(color, |c| self.driver().set_blend_color(c))
            .map_err(driver_error("set_blend_color"))?;
        if changed {
            self.check_error("set_blend_color")?;
        }
        Ok(())
    }

    /// Bind `texture` to `unit`. Does nothing if already bound.
    ///
    /// # Errors
    ///
    /// [`TesseraError::Driver`] if the driver rejects the bind.
    ///
    /// # Panics
    ///
    /// If `unit` is not below [`TEXTURE_UNITS`](crate::gpu::state::TEXTURE_UNITS).
    pub fn bind_texture(&self, unit: usize, texture: Option<TextureId>) -> Result<()> {
        self.ensure_alive()?;
        let changed = self
            .state
            .borrow_mut()
            .bind_texture(unit, texture, |u, t| self.driver().bind_texture(u, t))
            .map_err(driver_error("bind_texture"))?;
        if changed {
            self.check_error("bind_texture")?;
        }
        Ok(())
    }

    /// Make `program` current; `None` selects the standard textured program.
    ///
    /// # Errors
    ///
    /// [`TesseraError::Driver`] if the driver rejects the program.
    pub fn use_program(&self, program: Option<ProgramId>) -> Result<()> {
        self.ensure_alive()?;
        let changed = self
            .state
            .borrow_mut()
            .use_program(program, |p| self.driver().use_program(p))
            .map_err(driver_error("use_program"))?;
        if changed {
            self.check_error("use_program")?;
        }
        Ok(())
    }

    /// Current blend state as last accepted by the driver.
    #[must_use]
    pub fn blend_state(&self) -> Option<BlendState> {
        self.state.borrow().blend()
    }

    /// Texture the cache believes is bound to `unit`.
    #[must_use]
    pub fn bound_texture(&self, unit: usize) -> Option<TextureId> {
        self.state.borrow().texture(unit)
    }

    // -- Shader programs -----------------------------------------------

    /// Program for `kind`, compiled on first request.
    ///
    /// # Errors
    ///
    /// [`TesseraError::UnsupportedFeature`] if the configured shader usage
    /// excludes colour conversion, [`TesseraError::Allocation`] if the
    /// driver cannot compile it.
    pub fn shader_program(&self, kind: ShaderKind) -> Result<ProgramId> {
        self.ensure_alive()?;
        if kind.is_planar() && !self.use_gpu_yuv_conversion() {
            return Err(TesseraError::UnsupportedFeature(format!(
                "{kind} program needs colour conversion shaders"
            )));
        }
        let program = self
            .shaders
            .borrow_mut()
            .get_or_compile(kind, |k| self.driver().compile_program(k))
            .map_err(allocation_error("compile_program"))?;
        self.check_error("compile_program")?;
        Ok(program)
    }

    /// Configured shader pipeline level.
    #[must_use]
    pub const fn shader_usage(&self) -> ShaderUsage {
        self.options.render.shader_usage
    }

    /// Whether planar formats are converted to RGB on the GPU.
    #[must_use]
    pub fn use_gpu_yuv_conversion(&self) -> bool {
        self.shader_usage() != ShaderUsage::Minimal
    }

    /// Fail unless the full shader pipeline is enabled.
    ///
    /// # Errors
    ///
    /// [`TesseraError::UnsupportedFeature`] naming `label`.
    pub fn ensure_full_shaders(&self, label: &str) -> Result<()> {
        if self.shader_usage() == ShaderUsage::Full {
            Ok(())
        } else {
            Err(TesseraError::UnsupportedFeature(format!(
                "{label} requires full shader support (configured: {})",
                self.shader_usage()
            )))
        }
    }

    // -- Object pools --------------------------------------------------

    /// A pixel buffer of at least `size_hint` bytes, reused when possible.
    ///
    /// # Errors
    ///
    /// [`TesseraError::Allocation`] if a new buffer cannot be created.
    pub fn acquire_buffer_object(&self, kind: BufferKind, size_hint: usize) -> Result<BufferId> {
        self.ensure_alive()?;
        let key = BufferKey::for_request(kind, size_hint);
        let buffer = self
            .buffers
            .borrow_mut()
            .acquire(key, |k| self.driver().create_buffer(k.kind, k.capacity))
            .map_err(allocation_error("acquire_buffer_object"))?;
        Ok(buffer)
    }

    /// Return a buffer obtained from [`Self::acquire_buffer_object`].
    ///
    /// # Panics
    ///
    /// In debug builds, if `buffer` is not currently handed out. Releases
    /// after teardown are ignored.
    pub fn release_buffer_object(&self, buffer: BufferId) {
        if self.is_torn_down() {
            return;
        }
        let released = self.buffers.borrow_mut().release(buffer);
        debug_assert!(released, "buffer {} released twice", buffer.raw());
    }

    /// Bytes usable in a buffer that is currently handed out.
    #[must_use]
    pub fn buffer_capacity(&self, buffer: BufferId) -> Option<usize> {
        self.buffers.borrow().key_of(buffer).map(|key| key.capacity)
    }

    /// A pooled buffer released when the guard drops.
    ///
    /// # Errors
    ///
    /// As [`Self::acquire_buffer_object`].
    pub fn scoped_buffer_object(
        &self,
        kind: BufferKind,
        size_hint: usize,
    ) -> Result<ScopedBufferObject<'_>> {
        let id = self.acquire_buffer_object(kind, size_hint)?;
        Ok(ScopedBufferObject { ctx: self, id })
    }

    /// A render target of exactly `size`, reused when possible.
    ///
    /// # Errors
    ///
    /// [`TesseraError::Allocation`] if a new target cannot be created.
    pub fn acquire_render_target(&self, size: IVec2) -> Result<RenderTargetId> {
        self.ensure_alive()?;
        self.render_targets
            .borrow_mut()
            .acquire(size, |s| self.driver().create_render_target(s))
            .map_err(allocation_error("acquire_render_target"))
    }

    /// Return a target obtained from [`Self::acquire_render_target`].
    ///
    /// # Panics
    ///
    /// In debug builds, if `target` is not currently handed out. Releases
    /// after teardown are ignored.
    pub fn release_render_target(&self, target: RenderTargetId) {
        if self.is_torn_down() {
            return;
        }
        let released = self.render_targets.borrow_mut().release(target);
        debug_assert!(released, "render target {} released twice", target.raw());
    }

    /// Pixel buffer pool counts.
    #[must_use]
    pub fn buffer_pool_stats(&self) -> PoolStats {
        let pool = self.buffers.borrow();
        PoolStats {
            allocated: pool.allocated(),
            in_use: pool.in_use(),
            free: pool.free(),
        }
    }

    /// Render target pool counts.
    #[must_use]
    pub fn render_target_pool_stats(&self) -> PoolStats {
        let pool = self.render_targets.borrow();
        PoolStats {
            allocated: pool.allocated(),
            in_use: pool.in_use(),
            free: pool.free(),
        }
    }

    // -- Capabilities --------------------------------------------------

    /// Full capability record, queried on first use.
    #[must_use]
    pub fn limits(&self) -> &DriverLimits {
        self.caps.limits(&self.driver)
    }

    /// Largest texture dimension.
    #[must_use]
    pub fn max_texture_size(&self) -> u32 {
        self.limits().max_texture_size
    }

    /// Whether textures must have power-of-two dimensions.
    #[must_use]
    pub fn uses_pot_textures(&self) -> bool {
        self.limits().requires_pot
    }

    /// Whether float textures can be created.
    #[must_use]
    pub fn supports_float_format(&self) -> bool {
        self.limits().supports_float
    }

    /// Whether pixel transfer buffers exist.
    #[must_use]
    pub fn supports_pixel_buffers(&self) -> bool {
        self.limits().supports_pixel_buffers
    }

    /// Whether the API family is the embedded one.
    #[must_use]
    pub fn is_embedded(&self) -> bool {
        self.limits().is_embedded()
    }

    /// API family.
    #[must_use]
    pub fn profile(&self) -> ApiProfile {
        self.limits().profile
    }

    /// Installed video memory in bytes, if known.
    #[must_use]
    pub fn video_mem_installed(&self) -> Option<u64> {
        self.limits().video_mem_installed
    }

    /// Used video memory in bytes, queried anew on every call.
    #[must_use]
    pub fn video_mem_used(&self) -> Option<u64> {
        self.caps.video_mem_used(&self.driver)
    }

    /// Whether `wanted` occurs in the vendor string, ignoring case.
    #[must_use]
    pub fn is_vendor(&self, wanted: &str) -> bool {
        self.limits().is_vendor(wanted)
    }

    /// Next supported multisample count after `current`.
    #[must_use]
    pub fn next_multisample_value(&self, current: u32) -> u32 {
        self.limits().next_multisample_value(current)
    }

    /// Upload path for this context.
    #[must_use]
    pub fn memory_mode(&self) -> MemoryMode {
        *self.memory_mode.get_or_init(|| {
            let mode = if self.supports_pixel_buffers() && self.options.texture.use_pixel_buffers
            {
                MemoryMode::Pbo
            } else {
                MemoryMode::Main
            };
            log::debug!("texture memory mode: {mode:?}");
            mode
        })
    }

    /// Log capabilities and configuration at info level.
    pub fn log_config(&self) {
        log::info!("graphics backend: {}", self.backend());
        self.limits().log();
        log::info!("memory mode: {:?}", self.memory_mode());
        log::info!("shader usage: {}", self.shader_usage());
        log::info!("texture compression: {}", self.options.texture.compression);
        log::info!("error checks: {}", error_check::error_checks_enabled());
    }

    // -- Objects and drawing ---------------------------------------------

    /// Allocate a texture.
    ///
    /// # Errors
    ///
    /// [`TesseraError::Allocation`] if the driver refuses.
    pub fn create_texture(&self, desc: &TextureDesc<'_>) -> Result<TextureId> {
        self.ensure_alive()?;
        let texture = self
            .driver()
            .create_texture(desc)
            .map_err(allocation_error("create_texture"))?;
        log::trace!("created {} texture {}x{}", desc.pf, desc.size.x, desc.size.y);
        if let Err(e) = self.check_error("create_texture") {
            self.driver().delete_texture(texture);
            return Err(e);
        }
        Ok(texture)
    }

    /// Write pixels into a texture, timed in the texture download zone.
    ///
    /// # Errors
    ///
    /// [`TesseraError::Upload`] labelled `label` if the driver refuses.
    pub fn write_texture(&self, write: &TextureWrite<'_>, label: &'static str) -> Result<()> {
        self.ensure_alive()?;
        let _timer = profiling::TEXTURE_DOWNLOAD.scope();
        self.driver().write_texture(write).map_err(upload_error(label))?;
        if error_check::error_checks_enabled() {
            if let Some(source) = self.take_errors(label) {
                return Err(TesseraError::Upload { label, source });
            }
        }
        Ok(())
    }

    /// Fill part of a pixel-unpack buffer.
    ///
    /// # Errors
    ///
    /// [`TesseraError::Upload`] labelled `label` if the driver refuses.
    pub fn write_buffer(
        &self,
        buffer: BufferId,
        offset: usize,
        data: &[u8],
        label: &'static str,
    ) -> Result<()> {
        self.ensure_alive()?;
        self.driver()
            .write_buffer(buffer, offset, data)
            .map_err(upload_error(label))
    }

    /// Release a texture. Legal after teardown.
    pub fn delete_texture(&self, texture: TextureId) {
        self.state.borrow_mut().forget_texture(texture);
        self.driver().delete_texture(texture);
    }

    /// Draw the geometry with the current bindings, program and blend state.
    ///
    /// # Errors
    ///
    /// [`TesseraError::Driver`] if the driver rejects the draw.
    pub fn draw(&self, geometry: &VertexArray) -> Result<()> {
        self.ensure_alive()?;
        debug_assert!(self.is_current(), "drawing with a context that is not current");
        if geometry.is_empty() {
            return Ok(());
        }
        self.driver()
            .draw_indexed(geometry.vertices(), geometry.indices())
            .map_err(driver_error("draw"))?;
        self.check_error("draw")
    }

    /// Read `rect` of `texture` back into client memory.
    ///
    /// `pf` is the format the texture was created with; formats the
    /// hardware stores in a different layout (`R8G8B8`, `B5G6R5`, planar)
    /// cannot be read back.
    ///
    /// # Errors
    ///
    /// [`TesseraError::UnsupportedFormat`] for such formats,
    /// [`TesseraError::Allocation`] if no pack buffer is available,
    /// [`TesseraError::Driver`] if the copy fails.
    pub fn read_texture(&self, texture: TextureId, rect: IntRect, pf: PixelFormat) -> Result<Bitmap> {
        self.ensure_alive()?;
        if matches!(pf, PixelFormat::R8G8B8 | PixelFormat::B8G8R8 | PixelFormat::B5G6R5)
            || pf.is_planar()
        {
            return Err(TesseraError::UnsupportedFormat(format!(
                "{pf} textures cannot be read back"
            )));
        }
        let _timer = profiling::TEXTURE_READBACK.scope();
        let alignment = self.limits().pack_row_alignment.max(1);
        let pitch = (rect.width().max(0) as usize * pf.bytes_per_pixel()).next_multiple_of(alignment);
        let len = pitch * rect.height().max(0) as usize;
        let buffer = self.scoped_buffer_object(BufferKind::PixelPack, len)?;
        self.driver()
            .read_texture(texture, rect, buffer.id())
            .map_err(driver_error("read_texture"))?;
        self.check_error("read_texture")?;
        let pixels = self
            .driver()
            .read_buffer(buffer.id(), len)
            .map_err(driver_error("read_texture"))?;
        Bitmap::from_pixels(rect.size(), pitch, pf, pixels)
    }

    // -- Error checks ----------------------------------------------------

    /// Check for pending driver errors if error checks are enabled.
    ///
    /// # Errors
    ///
    /// [`TesseraError::Driver`] labelled `label` with the first pending
    /// error.
    pub fn check_error(&self, label: &'static str) -> Result<()> {
        if error_check::error_checks_enabled() {
            self.mandatory_check_error(label)
        } else {
            Ok(())
        }
    }

    /// Check for pending driver errors regardless of the process switch.
    ///
    /// # Errors
    ///
    /// [`TesseraError::Driver`] labelled `label` with the first pending
    /// error.
    pub fn mandatory_check_error(&self, label: &'static str) -> Result<()> {
        match self.take_errors(label) {
            Some(source) => Err(TesseraError::Driver { label, source }),
            None => Ok(()),
        }
    }

    /// Drain every pending error, logging each; returns the first.
    fn take_errors(&self, label: &str) -> Option<DriverError> {
        let mut driver = self.driver();
        let first = driver.take_error()?;
        let log_errors = error_check::error_log_enabled();
        if log_errors {
            log::error!("driver error in {label}: {first}");
        }
        while let Some(more) = driver.take_error() {
            if log_errors {
                log::error!("driver error in {label}: {more}");
            }
        }
        Some(first)
    }

    // -- Teardown ------------------------------------------------------

    /// Destroy every pooled object and compiled program. Later calls that
    /// need the driver fail with [`TesseraError::ContextTornDown`].
    /// Repeated calls do nothing.
    pub fn delete_objects(&self) {
        if self.torn_down.replace(true) {
            return;
        }
        let buffers = self.buffers.borrow_mut().drain();
        let targets = self.render_targets.borrow_mut().drain();
        let programs = self.shaders.borrow_mut().drain();
        log::debug!(
            "tearing down context: {} buffers, {} render targets, {} programs",
            buffers.len(),
            targets.len(),
            programs.len()
        );
        let mut driver = self.driver();
        for buffer in buffers {
            driver.delete_buffer(buffer);
        }
        for target in targets {
            driver.delete_render_target(target);
        }
        let mut state = self.state.borrow_mut();
        for program in programs {
            state.forget_program(program);
            driver.delete_program(program);
        }
    }

    /// Whether [`Self::delete_objects`] ran.
    #[must_use]
    pub fn is_torn_down(&self) -> bool {
        self.torn_down.get()
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.torn_down.get() {
            Err(TesseraError::ContextTornDown)
        } else {
            Ok(())
        }
    }

    fn driver(&self) -> RefMut<'_, Box<dyn GpuDriver>> {
        self.driver.borrow_mut()
    }
}

impl Drop for GraphicsContext {
    fn drop(&mut self) {
        self.delete_objects();
    }
}

/// Pooled pixel buffer returned to its context on drop.
#[derive(Debug)]
pub struct ScopedBufferObject<'a> {
    ctx: &'a GraphicsContext,
    id: BufferId,
}

impl ScopedBufferObject<'_> {
    /// The buffer.
    #[must_use]
    pub const fn id(&self) -> BufferId {
        self.id
    }

    /// Usable bytes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.ctx.buffer_capacity(self.id).unwrap_or(0)
    }
}

impl Drop for ScopedBufferObject<'_> {
    fn drop(&mut self) {
        if !self.ctx.is_torn_down() {
            self.ctx.release_buffer_object(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::driver::UploadSource;
    use crate::gpu::headless::{HeadlessDriver, HeadlessLimits, HeadlessOp, HeadlessProbe};
    use crate::pixel::format::api_format;

    fn setup_with(limits: HeadlessLimits, options: GpuOptions) -> (Rc<GraphicsContext>, HeadlessProbe) {
        let _ = env_logger::builder().is_test(true).try_init();
        let driver = HeadlessDriver::new(limits);
        let probe = driver.probe();
        let ctx = GraphicsContext::new(Box::new(driver), options).unwrap();
        ctx.activate().unwrap();
        (ctx, probe)
    }

    fn setup() -> (Rc<GraphicsContext>, HeadlessProbe) {
        setup_with(HeadlessLimits::default(), GpuOptions::default())
    }

    #[test]
    fn activation_registers_current_context() {
        let (a, probe) = setup();
        assert!(a.is_current());
        assert!(Rc::ptr_eq(&GraphicsContext::current().unwrap(), &a));
        assert_eq!(probe.activations(), 1);

        let (b, _) = setup();
        assert!(b.is_current());
        assert!(!a.is_current());
        drop(b);
        assert!(GraphicsContext::current().is_none());
    }

    #[test]
    fn repeated_blend_mode_reaches_driver_once() {
        let (ctx, probe) = setup();
        // first activation applies the default mode
        assert_eq!(probe.blend_changes(), 1);
        for _ in 0..5 {
            ctx.set_blend_mode(BlendMode::Blend, false).unwrap();
        }
        assert_eq!(probe.blend_changes(), 1);
        ctx.set_blend_mode(BlendMode::Add, false).unwrap();
        ctx.set_blend_mode(BlendMode::Add, false).unwrap();
        ctx.set_blend_mode(BlendMode::Add, true).unwrap();
        assert_eq!(probe.blend_changes(), 3);
        assert_eq!(ctx.blend_state(), Some(BlendState::new(BlendMode::Add, true)));
    }

    #[test]
    fn unsupported_blend_mode_fails_without_touching_state() {
        let (ctx, probe) = setup_with(
            HeadlessLimits {
                min_max_blend: false,
                ..HeadlessLimits::default()
            },
            GpuOptions::default(),
        );
        assert!(!ctx.is_blend_mode_supported(BlendMode::Max));
        assert!(ctx.is_blend_mode_supported(BlendMode::Copy));
        let result = ctx.set_blend_mode(BlendMode::Max, false);
        assert!(matches!(result, Err(TesseraError::UnsupportedBlendMode(BlendMode::Max))));
        assert_eq!(ctx.blend_state(), Some(BlendState::new(BlendMode::Blend, false)));
        assert_eq!(probe.blend_changes(), 1);
    }

    #[test]
    fn rejected_state_change_is_not_cached() {
        let (ctx, probe) = setup();
        probe.fail_next(HeadlessOp::SetBlend, DriverError::InvalidOperation("lost".to_owned()));
        assert!(matches!(
            ctx.set_blend_mode(BlendMode::Copy, false),
            Err(TesseraError::Driver { label: "set_blend_mode", .. })
        ));
        assert_eq!(ctx.blend_state(), Some(BlendState::new(BlendMode::Blend, false)));
        ctx.set_blend_mode(BlendMode::Copy, false).unwrap();
        assert_eq!(probe.current_blend(), Some(BlendState::new(BlendMode::Copy, false)));
    }

    #[test]
    fn blend_color_and_binds_are_cached() {
        let (ctx, probe) = setup();
        let color = Vec4::new(0.5, 0.5, 0.5, 1.0);
        ctx.set_blend_color(color).unwrap();
        ctx.set_blend_color(color).unwrap();
        assert_eq!(probe.blend_color_changes(), 1);

        let pf = PixelFormat::R8G8B8A8;
        let desc = TextureDesc {
            label: "bind",
            size: IVec2::new(8, 8),
            pf,
            format: api_format(pf, ApiProfile::Desktop).unwrap(),
            clear: false,
        };
        let tex = ctx.create_texture(&desc).unwrap();
        ctx.bind_texture(0, Some(tex)).unwrap();
        ctx.bind_texture(0, Some(tex)).unwrap();
        assert_eq!(probe.texture_binds(), 1);
        ctx.delete_texture(tex);
        assert_eq!(ctx.bound_texture(0), None);
    }

    #[test]
    fn buffers_are_pooled_by_kind_and_class() {
        let (ctx, probe) = setup();
        let a = ctx.acquire_buffer_object(BufferKind::PixelUnpack, 40_000).unwrap();
        assert!(ctx.buffer_capacity(a).unwrap() >= 40_000);
        ctx.release_buffer_object(a);
        let b = ctx.acquire_buffer_object(BufferKind::PixelUnpack, 33_000).unwrap();
        assert_eq!(a, b);
        let c = ctx.acquire_buffer_object(BufferKind::PixelPack, 33_000).unwrap();
        assert_ne!(b, c);
        assert_eq!(probe.buffers_created(), 2);
        assert_eq!(
            ctx.buffer_pool_stats(),
            PoolStats {
                allocated: 2,
                in_use: 2,
                free: 0
            }
        );
    }

    #[test]
    fn scoped_buffer_is_released_on_early_return() {
        let (ctx, _) = setup();
        let failing = || -> Result<()> {
            let buffer = ctx.scoped_buffer_object(BufferKind::PixelUnpack, 100)?;
            assert!(buffer.capacity() >= 100);
            Err(TesseraError::ContextTornDown)
        };
        assert!(failing().is_err());
        assert_eq!(ctx.buffer_pool_stats().in_use, 0);
        assert_eq!(ctx.buffer_pool_stats().free, 1);
    }

    #[test]
    fn render_targets_are_pooled_by_size() {
        let (ctx, probe) = setup();
        let size = IVec2::new(640, 480);
        let a = ctx.acquire_render_target(size).unwrap();
        ctx.release_render_target(a);
        assert_eq!(ctx.acquire_render_target(size).unwrap(), a);
        let b = ctx.acquire_render_target(IVec2::new(320, 240)).unwrap();
        assert_ne!(a, b);
        assert_eq!(probe.render_targets_created(), 2);
    }

    #[test]
    fn allocation_failure_is_typed_and_leaves_pool_empty() {
        let (ctx, probe) = setup();
        probe.fail_next(HeadlessOp::CreateBuffer, DriverError::OutOfMemory);
        assert!(matches!(
            ctx.acquire_buffer_object(BufferKind::PixelUnpack, 10),
            Err(TesseraError::Allocation { source: DriverError::OutOfMemory, .. })
        ));
        assert_eq!(ctx.buffer_pool_stats(), PoolStats::default());
    }

    #[test]
    fn teardown_destroys_everything_once() {
        let (ctx, probe) = setup();
        let held = ctx.acquire_buffer_object(BufferKind::PixelUnpack, 10).unwrap();
        let freed = ctx.acquire_buffer_object(BufferKind::PixelPack, 10).unwrap();
        ctx.release_buffer_object(freed);
        let _ = ctx.acquire_render_target(IVec2::splat(32)).unwrap();
        let _ = ctx.shader_program(ShaderKind::Standard).unwrap();
        let _ = ctx.shader_program(ShaderKind::YCbCr420p).unwrap();
        assert_eq!(probe.live_buffers(), 2);
        assert_eq!(probe.live_programs(), 2);

        ctx.delete_objects();
        assert_eq!(probe.live_buffers(), 0);
        assert_eq!(probe.live_render_targets(), 0);
        assert_eq!(probe.live_programs(), 0);
        assert!(ctx.is_torn_down());
        ctx.delete_objects();

        assert!(matches!(
            ctx.acquire_buffer_object(BufferKind::PixelUnpack, 10),
            Err(TesseraError::ContextTornDown)
        ));
        assert!(matches!(
            ctx.set_blend_mode(BlendMode::Add, false),
            Err(TesseraError::ContextTornDown)
        ));
        assert!(matches!(ctx.activate(), Err(TesseraError::ContextTornDown)));
        let _ = held;
    }

    #[test]
    fn releasing_after_teardown_is_ignored() {
        let (ctx, probe) = setup();
        let buffer = ctx.acquire_buffer_object(BufferKind::PixelUnpack, 64).unwrap();
        let target = ctx.acquire_render_target(IVec2::splat(16)).unwrap();
        ctx.delete_objects();

        ctx.release_buffer_object(buffer);
        ctx.release_render_target(target);
        assert_eq!(ctx.buffer_pool_stats().free, 0);
        assert_eq!(ctx.render_target_pool_stats().free, 0);
        assert_eq!(probe.live_buffers(), 0);
    }

    #[test]
    fn programs_are_compiled_once_per_kind() {
        let (ctx, probe) = setup();
        let a = ctx.shader_program(ShaderKind::YCbCrJ420p).unwrap();
        let b = ctx.shader_program(ShaderKind::YCbCrJ420p).unwrap();
        assert_eq!(a, b);
        assert_eq!(probe.programs_compiled(), vec![ShaderKind::YCbCrJ420p]);
    }

    #[test]
    fn minimal_shader_usage_refuses_conversion() {
        let mut options = GpuOptions::default();
        options.render.shader_usage = ShaderUsage::Minimal;
        let (ctx, _) = setup_with(HeadlessLimits::default(), options);
        assert!(!ctx.use_gpu_yuv_conversion());
        assert!(matches!(
            ctx.ensure_full_shaders("video"),
            Err(TesseraError::UnsupportedFeature(msg)) if msg.contains("video")
        ));
        assert!(matches!(
            ctx.shader_program(ShaderKind::YCbCr420p),
            Err(TesseraError::UnsupportedFeature(_))
        ));
        assert!(ctx.shader_program(ShaderKind::Standard).is_ok());
    }

    #[test]
    fn mandatory_check_reports_pending_errors() {
        let (ctx, probe) = setup();
        assert!(ctx.mandatory_check_error("idle").is_ok());
        probe.push_error(DriverError::Validation("bad bind group".to_owned()));
        probe.push_error(DriverError::OutOfMemory);
        assert!(matches!(
            ctx.mandatory_check_error("frame"),
            Err(TesseraError::Driver {
                label: "frame",
                source: DriverError::Validation(_)
            })
        ));
        // all pending errors were drained
        assert!(ctx.mandatory_check_error("frame").is_ok());
    }

    #[test]
    fn error_check_switch_gates_optional_checks() {
        let (ctx, probe) = setup();
        let before = error_check::error_checks_enabled();
        error_check::enable_error_checks(false);
        probe.push_error(DriverError::OutOfMemory);
        assert!(ctx.check_error("quiet").is_ok());
        error_check::enable_error_checks(true);
        assert!(ctx.check_error("loud").is_err());
        error_check::enable_error_checks(before);
    }

    #[test]
    fn capabilities_are_queried_once() {
        let (ctx, probe) = setup();
        for _ in 0..3 {
            let _ = ctx.max_texture_size();
            let _ = ctx.uses_pot_textures();
            let _ = ctx.supports_float_format();
            let _ = ctx.is_embedded();
            let _ = ctx.video_mem_installed();
        }
        assert_eq!(probe.limits_queries(), 1);
        probe.set_video_mem_used(4096);
        assert_eq!(ctx.video_mem_used(), Some(4096));
        assert!(ctx.is_vendor("software"));
        assert_eq!(ctx.next_multisample_value(2), 4);
    }

    #[test]
    fn memory_mode_follows_capabilities_and_options() {
        let (ctx, _) = setup();
        assert_eq!(ctx.memory_mode(), MemoryMode::Pbo);

        let mut options = GpuOptions::default();
        options.texture.use_pixel_buffers = false;
        let (ctx, _) = setup_with(HeadlessLimits::default(), options);
        assert_eq!(ctx.memory_mode(), MemoryMode::Main);

        let (ctx, _) = setup_with(
            HeadlessLimits {
                supports_pixel_buffers: false,
                ..HeadlessLimits::default()
            },
            GpuOptions::default(),
        );
        assert_eq!(ctx.memory_mode(), MemoryMode::Main);
    }

    #[test]
    fn zero_samples_is_a_config_error() {
        let mut options = GpuOptions::default();
        options.render.multisample_samples = 0;
        let driver = HeadlessDriver::new(HeadlessLimits::default());
        assert!(matches!(
            GraphicsContext::new(Box::new(driver), options),
            Err(TesseraError::Config(_))
        ));
    }

    #[test]
    fn readback_strips_row_padding() {
        let (ctx, _) = setup_with(
            HeadlessLimits {
                pack_row_alignment: 8,
                ..HeadlessLimits::default()
            },
            GpuOptions::default(),
        );
        let pf = PixelFormat::I8;
        let tex = ctx
            .create_texture(&TextureDesc {
                label: "readback",
                size: IVec2::new(5, 3),
                pf,
                format: api_format(pf, ApiProfile::Desktop).unwrap(),
                clear: true,
            })
            .unwrap();
        let src: Vec<u8> = (1..=15).collect();
        ctx.write_texture(
            &TextureWrite {
                texture: tex,
                origin: IVec2::ZERO,
                size: IVec2::new(5, 3),
                row_length: 5,
                pf,
                source: UploadSource::Memory(&src),
            },
            "readback",
        )
        .unwrap();
        let rect = IntRect::new(IVec2::new(1, 1), IVec2::new(4, 3));
        let bmp = ctx.read_texture(tex, rect, pf).unwrap();
        assert_eq!(bmp.stride(), 8);
        assert_eq!(&bmp.pixels()[0..3], &[7, 8, 9]);
        assert_eq!(&bmp.pixels()[8..11], &[12, 13, 14]);
        assert_eq!(ctx.buffer_pool_stats().in_use, 0);

        assert!(matches!(
            ctx.read_texture(tex, rect, PixelFormat::B5G6R5),
            Err(TesseraError::UnsupportedFormat(_))
        ));
    }
}
