//! Graphics context, driver backends and the wgpu plumbing behind them.
//!
//! [`context::GraphicsContext`] is what the texture layer talks to. It
//! owns a boxed [`driver::GpuDriver`], caches capabilities and state, and
//! pools transfer buffers and render targets. Two drivers ship: the wgpu
//! backend and a headless one that keeps everything in memory.

/// Hardware capabilities and the memory mode they imply.
pub mod capabilities;
/// The graphics context: activation, state caching, pooling and teardown.
pub mod context;
/// The imperative driver interface backends implement.
pub mod driver;
/// Growable GPU buffers with automatic reallocation.
pub mod dynamic_buffer;
/// Process-wide switches for driver error checking.
pub mod error_check;
/// In-memory driver for tests and GPU-less hosts.
pub mod headless;
/// Reusable GPU objects kept on free lists.
pub mod object_cache;
/// Shared wgpu boilerplate for the tile pipelines.
pub mod pipeline_helpers;
/// Upload timing.
pub mod profiling;
/// wgpu device, surface, and queue initialization.
pub mod render_context;
/// Offscreen colour targets.
pub mod render_target;
/// WGSL shader composition with `#import` support via naga-oil.
pub mod shader_composer;
/// Compiled shader programs per context.
pub mod shader_registry;
/// Blend modes and cached driver state.
pub mod state;
/// The wgpu driver.
pub mod wgpu_driver;
