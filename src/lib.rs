// -- Lint policy ---------------------------------------------------------
// This is the single source of truth for crate-wide lints.

// Broad lint groups
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(clippy::nursery)]
// Documentation
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]
#![deny(rustdoc::bare_urls)]
// No panicking in library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
// No debug/print artifacts
#![deny(clippy::dbg_macro)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]
// Import hygiene
#![deny(clippy::wildcard_imports)]
// Complexity limits (thresholds in clippy.toml)
#![deny(clippy::cognitive_complexity)]
#![deny(clippy::too_many_lines)]
#![deny(clippy::excessive_nesting)]
// Function signature hygiene
#![deny(clippy::too_many_arguments)]
#![deny(clippy::fn_params_excessive_bools)]
// Clone / pass-by-value hygiene
#![deny(clippy::needless_pass_by_value)]
#![deny(clippy::implicit_clone)]
// String hygiene
#![deny(clippy::inefficient_to_string)]
#![deny(clippy::redundant_closure_for_method_calls)]
#![deny(clippy::manual_string_new)]
#![deny(clippy::str_to_string)]
// Cargo lints (warn, not deny since cargo lints can be noisy)
#![warn(clippy::cargo)]
// Unused / redundant code
#![deny(unused_results)]
#![deny(unused_qualifications)]
// Cast hygiene
#![deny(trivial_casts)]
#![deny(trivial_numeric_casts)]

//! Tiled GPU textures for 2D image display, built on wgpu.
//!
//! Large images are cut into fixed-size tiles; each tile is a
//! [`texture::tiled::TiledTexture`] holding one GPU texture per plane.
//! Pixel formats map onto what the hardware can store (with 4:2:0 planar
//! YCbCr converted in a shader), uploads can stage through pooled pixel
//! buffers, and all driver state goes through a caching
//! [`gpu::context::GraphicsContext`].
//!
//! # Key entry points
//!
//! - [`gpu::context::GraphicsContext`] - per-window context, activation,
//!   blend state, object pools
//! - [`texture::tiled::TiledTexture`] - a tile's plane textures and
//!   geometry
//! - [`pixel::format::PixelFormat`] - supported pixel layouts
//! - [`options::GpuOptions`] - TOML-configurable policy
//!
//! # Backends
//!
//! [`gpu::wgpu_driver::WgpuDriver`] drives real hardware, windowed or
//! offscreen. [`gpu::headless::HeadlessDriver`] keeps textures in memory
//! and records draws, which is what the tests run against.

pub mod error;
pub mod geometry;
pub mod gpu;
pub mod options;
pub mod pixel;
pub mod texture;
