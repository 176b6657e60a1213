//! Tiled textures and the geometry used to draw them.

/// Texture coordinates of tile boundaries.
pub mod tex_coords;
/// One logical image as one or three GPU textures.
pub mod tiled;
/// Quad geometry with texture coordinates.
pub mod vertex_array;
