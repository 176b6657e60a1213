//! Pixel formats, CPU-side bitmaps and texture descriptors.

/// CPU-side pixel buffers.
pub mod bitmap;
/// Per-row conversion between byte formats.
pub mod convert;
/// The pixel format enumeration and its driver triples.
pub mod format;
/// Validated texture requests.
pub mod tex_info;
