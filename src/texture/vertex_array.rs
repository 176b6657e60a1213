//! Textured triangle geometry for tile grids.

use bytemuck::{Pod, Zeroable};
use glam::Vec2;

/// Screen position plus texture coordinate.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct TexturedVertex {
    /// Pixel position, top-left origin.
    pub position: [f32; 2],
    /// Normalised texture coordinate.
    pub tex_coord: [f32; 2],
}

impl TexturedVertex {
    const ATTRIBUTES: [wgpu::VertexAttribute; 2] =
        wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2];

    /// Vertex with the given position and texture coordinate.
    #[must_use]
    pub fn new(position: Vec2, tex_coord: Vec2) -> Self {
        Self {
            position: position.to_array(),
            tex_coord: tex_coord.to_array(),
        }
    }

    /// Vertex buffer layout matching `tessera::tile::VertexInput`.
    #[must_use]
    pub const fn buffer_layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: size_of::<Self>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

/// Indexed triangle list built one quad at a time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VertexArray {
    vertices: Vec<TexturedVertex>,
    indices: Vec<u32>,
}

impl VertexArray {
    /// Drop all geometry, keeping the allocations.
    pub fn reset(&mut self) {
        self.vertices.clear();
        self.indices.clear();
    }

    /// Append a quad given clockwise from top-left: top-left, top-right,
    /// bottom-right, bottom-left. Emits triangles `(0, 1, 2)` and
    /// `(0, 2, 3)`.
    pub fn append_quad(&mut self, corners: [Vec2; 4], tex_coords: [Vec2; 4]) {
        let base = self.vertices.len() as u32;
        self.vertices.extend(
            corners
                .iter()
                .zip(tex_coords.iter())
                .map(|(&pos, &tc)| TexturedVertex::new(pos, tc)),
        );
        self.indices
            .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    /// Vertex data.
    #[must_use]
    pub fn vertices(&self) -> &[TexturedVertex] {
        &self.vertices
    }

    /// Triangle list indices.
    #[must_use]
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Number of quads appended since the last reset.
    #[must_use]
    pub fn quad_count(&self) -> usize {
        self.vertices.len() / 4
    }

    /// Whether there is nothing to draw.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signed_area(a: Vec2, b: Vec2, c: Vec2) -> f32 {
        (b - a).perp_dot(c - a)
    }

    #[test]
    fn quads_share_one_winding() {
        let mut va = VertexArray::default();
        let square = [
            Vec2::new(0.0, 0.0),
            Vec2::new(10.0, 0.0),
            Vec2::new(10.0, 10.0),
            Vec2::new(0.0, 10.0),
        ];
        va.append_quad(square, square.map(|p| p / 10.0));
        va.append_quad(square.map(|p| p + Vec2::X * 10.0), square.map(|p| p / 10.0));
        assert_eq!(va.quad_count(), 2);
        assert_eq!(va.indices().len(), 12);

        let pos = |i: u32| Vec2::from_array(va.vertices()[i as usize].position);
        let first = signed_area(pos(0), pos(1), pos(2));
        for tri in va.indices().chunks_exact(3) {
            let area = signed_area(pos(tri[0]), pos(tri[1]), pos(tri[2]));
            assert_eq!(area.signum(), first.signum());
        }
    }

    #[test]
    fn reset_clears_geometry() {
        let mut va = VertexArray::default();
        va.append_quad([Vec2::ZERO; 4], [Vec2::ZERO; 4]);
        va.reset();
        assert!(va.is_empty());
        assert_eq!(va.quad_count(), 0);
    }
}
