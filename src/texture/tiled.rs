//! One logical image as a set of GPU textures drawn as a tile grid.
//!
//! Single-plane formats are backed by one texture. Planar 4:2:0 formats are
//! backed by three `I8` textures: luma at full size and two chroma planes at
//! half size per axis, combined by a colour-conversion program at draw time.

use std::rc::Rc;

use glam::IVec2;

use crate::error::{Result, TesseraError};
use crate::geometry::{IntRect, PositionGrid};
use crate::gpu::context::{GraphicsContext, MemoryMode};
use crate::gpu::driver::{BufferKind, DriverError, TextureDesc, TextureId, TextureWrite, UploadSource};
use crate::gpu::shader_registry::ShaderKind;
use crate::pixel::bitmap::Bitmap;
use crate::pixel::format::PixelFormat;
use crate::pixel::tex_info::TexInfo;
use crate::texture::tex_coords::TexCoordGrid;
use crate::texture::vertex_array::VertexArray;

#[derive(Debug)]
struct Plane {
    id: TextureId,
    info: TexInfo,
}

/// Textures plus tessellated geometry for one image.
#[derive(Debug)]
pub struct TiledTexture {
    ctx: Rc<GraphicsContext>,
    extent: IntRect,
    texture_size: IVec2,
    tile_size: IVec2,
    tile_index_extent: IntRect,
    pf: PixelFormat,
    planes: Vec<Plane>,
    tex_coords: TexCoordGrid,
    vertices: VertexArray,
}

impl TiledTexture {
    /// Allocate the textures for `extent` of the source image.
    ///
    /// `texture_size` is the size backing the extent, `tile_size` the
    /// subdivision of the extent in texels, and `tile_index_extent` the
    /// range of tiles this texture covers in the caller's position grid.
    ///
    /// # Errors
    ///
    /// [`TesseraError::UnsupportedSize`] or [`TesseraError::UnsupportedFormat`]
    /// if any plane fails validation; nothing is allocated in that case.
    /// [`TesseraError::Allocation`] if the driver refuses a texture; planes
    /// allocated before the failure are released.
    pub fn new(
        ctx: &Rc<GraphicsContext>,
        extent: IntRect,
        texture_size: IVec2,
        tile_size: IVec2,
        tile_index_extent: IntRect,
        pf: PixelFormat,
    ) -> Result<Self> {
        let planes = create_textures(ctx, texture_size, pf)?;
        let mut tex = Self {
            ctx: Rc::clone(ctx),
            extent,
            texture_size,
            tile_size,
            tile_index_extent,
            pf,
            planes,
            tex_coords: TexCoordGrid::default(),
            vertices: VertexArray::default(),
        };
        tex.calc_tex_coords();
        Ok(tex)
    }

    /// Reallocate every plane for new dimensions.
    ///
    /// The replacement textures are allocated before the old ones are
    /// released, so a failed resize leaves the texture as it was.
    ///
    /// # Errors
    ///
    /// As [`Self::new`].
    pub fn resize(&mut self, extent: IntRect, texture_size: IVec2, tile_size: IVec2) -> Result<()> {
        let planes = create_textures(&self.ctx, texture_size, self.pf)?;
        self.delete_textures();
        self.planes = planes;
        self.extent = extent;
        self.texture_size = texture_size;
        self.tile_size = tile_size;
        self.calc_tex_coords();
        Ok(())
    }

    /// Upload the extent of `bitmap` into plane `plane` without reallocating.
    ///
    /// `stride` is the source row length in pixels of the full-resolution
    /// plane; chroma planes of planar formats halve it along with the
    /// extent. A bitmap in a different byte format is converted first.
    ///
    /// # Errors
    ///
    /// [`TesseraError::Upload`] if the bitmap does not cover the extent or
    /// the driver rejects the transfer, [`TesseraError::UnsupportedFormat`]
    /// if the bitmap cannot be converted.
    ///
    /// # Panics
    ///
    /// If `plane` is not below the plane count of the format.
    pub fn download(
        &self,
        plane: usize,
        bitmap: &Bitmap,
        stride: usize,
        memory_mode: MemoryMode,
    ) -> Result<()> {
        assert!(
            plane < self.planes.len(),
            "plane {plane} out of range for {} texture",
            self.pf
        );
        let pf = self.pf.plane_format();
        let converted;
        let bitmap = if bitmap.pixel_format() == pf {
            bitmap
        } else {
            converted = bitmap.converted(pf)?;
            &converted
        };

        let (extent, stride) = if plane == 0 {
            (self.extent, stride)
        } else {
            (self.extent.halved(), stride / 2)
        };
        let bpp = pf.bytes_per_pixel();
        let size = extent.size();
        let start = (extent.tl.y.max(0) as usize * stride + extent.tl.x.max(0) as usize) * bpp;
        let span = if size.x > 0 && size.y > 0 {
            ((size.y as usize - 1) * stride + size.x as usize) * bpp
        } else {
            0
        };
        let Some(source) = bitmap.pixels().get(start..start + span) else {
            return Err(TesseraError::Upload {
                label: "download",
                source: DriverError::InvalidValue(format!(
                    "{}x{} bitmap does not cover extent {extent}",
                    bitmap.size().x,
                    bitmap.size().y
                )),
            });
        };

        let texture = self.planes[plane].id;
        match memory_mode {
            MemoryMode::Main => self.ctx.write_texture(
                &TextureWrite {
                    texture,
                    origin: IVec2::ZERO,
                    size,
                    row_length: stride,
                    pf,
                    source: UploadSource::Memory(source),
                },
                "download",
            ),
            MemoryMode::Pbo => {
                let buffer = self.ctx.scoped_buffer_object(BufferKind::PixelUnpack, span)?;
                self.ctx.write_buffer(buffer.id(), 0, source, "download")?;
                self.ctx.write_texture(
                    &TextureWrite {
                        texture,
                        origin: IVec2::ZERO,
                        size,
                        row_length: stride,
                        pf,
                        source: UploadSource::Buffer {
                            buffer: buffer.id(),
                            offset: 0,
                        },
                    },
                    "download",
                )
            }
        }
    }

    fn calc_tex_coords(&mut self) {
        let allocated = self
            .planes
            .first()
            .map_or(self.texture_size, |plane| plane.info.padded_size());
        self.tex_coords = TexCoordGrid::compute(
            self.tile_index_extent.size(),
            self.tile_size,
            self.extent.size(),
            allocated,
        );
    }

    /// Texture coordinates of the tile boundaries.
    #[must_use]
    pub const fn tex_coords(&self) -> &TexCoordGrid {
        &self.tex_coords
    }

    /// Rebuild the geometry from `grid` and draw it.
    ///
    /// `grid` holds on-screen corners for the caller's full tile grid; this
    /// texture reads the corners of its own tile index range.
    ///
    /// # Errors
    ///
    /// [`TesseraError::ContextTornDown`] after context teardown,
    /// [`TesseraError::Driver`] if `grid` lacks a corner of the tile index
    /// range (the previous geometry is kept), or a bind or the draw fails.
    pub fn draw(&mut self, grid: &PositionGrid) -> Result<()> {
        let corner = |x: i32, y: i32| {
            grid.corner(x, y).ok_or_else(|| TesseraError::Driver {
                label: "draw",
                source: DriverError::InvalidValue(format!(
                    "position grid has no corner ({x}, {y})"
                )),
            })
        };
        let tiles = self.tile_index_extent;
        let mut vertices = VertexArray::default();
        for y in tiles.tl.y..tiles.br.y {
            for x in tiles.tl.x..tiles.br.x {
                let tx = (x - tiles.tl.x) as usize;
                let ty = (y - tiles.tl.y) as usize;
                let tc = &self.tex_coords;
                vertices.append_quad(
                    [
                        corner(x, y)?,
                        corner(x + 1, y)?,
                        corner(x + 1, y + 1)?,
                        corner(x, y + 1)?,
                    ],
                    [
                        tc.get(tx, ty),
                        tc.get(tx + 1, ty),
                        tc.get(tx + 1, ty + 1),
                        tc.get(tx, ty + 1),
                    ],
                );
            }
        }
        self.vertices = vertices;
        self.redraw()
    }

    /// Draw the geometry built by the last [`Self::draw`] again.
    ///
    /// # Errors
    ///
    /// As [`Self::draw`].
    pub fn redraw(&self) -> Result<()> {
        let ctx = &self.ctx;
        match self.fragment_shader() {
            Some(kind) => {
                let program = ctx.shader_program(kind)?;
                for (unit, plane) in self.planes.iter().enumerate() {
                    ctx.bind_texture(unit, Some(plane.id))?;
                }
                ctx.use_program(Some(program))?;
            }
            None => {
                ctx.bind_texture(0, Some(self.planes[0].id))?;
                ctx.use_program(None)?;
            }
        }
        let drawn = ctx.draw(&self.vertices);
        if self.pf.is_planar() {
            let unbound = ctx
                .bind_texture(1, None)
                .and_then(|()| ctx.bind_texture(2, None))
                .and_then(|()| ctx.use_program(None));
            drawn?;
            return unbound;
        }
        drawn
    }

    /// Colour-conversion program this texture draws with, if any.
    #[must_use]
    pub const fn fragment_shader(&self) -> Option<ShaderKind> {
        if self.pf.is_planar() {
            Some(ShaderKind::for_pixel_format(self.pf))
        } else {
            None
        }
    }

    /// Bytes of texture memory the image needs.
    #[must_use]
    pub fn required_memory(&self) -> usize {
        let texels = self.texture_size.x.max(0) as usize * self.texture_size.y.max(0) as usize;
        if self.pf.is_planar() {
            texels * 3 / 2
        } else {
            texels * self.pf.bytes_per_pixel()
        }
    }

    /// Texture backing plane `plane`.
    ///
    /// # Panics
    ///
    /// If `plane` is not below the plane count of the format.
    #[must_use]
    pub fn texture_id(&self, plane: usize) -> TextureId {
        self.planes[plane].id
    }

    /// Number of textures backing the image.
    #[must_use]
    pub fn plane_count(&self) -> usize {
        self.planes.len()
    }

    /// Range of tiles covered.
    #[must_use]
    pub const fn tile_index_extent(&self) -> IntRect {
        self.tile_index_extent
    }

    /// Extent of the source image this texture holds.
    #[must_use]
    pub const fn extent(&self) -> IntRect {
        self.extent
    }

    /// Requested texture size.
    #[must_use]
    pub const fn texture_size(&self) -> IVec2 {
        self.texture_size
    }

    /// Pixel format of the image.
    #[must_use]
    pub const fn pixel_format(&self) -> PixelFormat {
        self.pf
    }

    fn delete_textures(&mut self) {
        for plane in self.planes.drain(..) {
            self.ctx.delete_texture(plane.id);
        }
    }
}

impl Drop for TiledTexture {
    fn drop(&mut self) {
        self.delete_textures();
    }
}

/// Validate and allocate every plane for `pf` at `size`.
fn create_textures(ctx: &GraphicsContext, size: IVec2, pf: PixelFormat) -> Result<Vec<Plane>> {
    let texture = &ctx.options().texture;
    let use_mipmap = texture.use_mipmaps;
    let use_pot = TexInfo::should_use_pot(ctx, texture.force_pot, use_mipmap);
    let plane_pf = pf.plane_format();
    let sizes: &[IVec2] = if pf.is_planar() {
        &[size, size / 2, size / 2]
    } else {
        &[size]
    };

    let mut infos = Vec::with_capacity(sizes.len());
    for &plane_size in sizes {
        let info = TexInfo::new(ctx, plane_size, plane_pf, use_mipmap, use_pot, 0)?;
        let format = info.api_format(ctx)?;
        infos.push((info, format));
    }

    let mut planes: Vec<Plane> = Vec::with_capacity(infos.len());
    for (info, format) in infos {
        info.dump();
        let desc = TextureDesc {
            label: "tiled texture",
            size: info.padded_size(),
            pf: plane_pf,
            format,
            clear: info.use_pot(),
        };
        match ctx.create_texture(&desc) {
            Ok(id) => planes.push(Plane { id, info }),
            Err(e) => {
                for plane in planes {
                    ctx.delete_texture(plane.id);
                }
                return Err(e);
            }
        }
    }
    Ok(planes)
}
