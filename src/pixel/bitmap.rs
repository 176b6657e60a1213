//! CPU-side pixel buffers handed over by the bitmap source.

use glam::IVec2;

use crate::error::{Result, TesseraError};
use crate::pixel::convert;
use crate::pixel::format::PixelFormat;

/// A row-major pixel buffer with an explicit stride.
///
/// Planar images are passed one plane at a time; each plane is an
/// [`PixelFormat::I8`] bitmap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    size: IVec2,
    stride: usize,
    pf: PixelFormat,
    pixels: Vec<u8>,
}

impl Bitmap {
    /// Zero-filled bitmap with a tightly packed stride.
    #[must_use]
    pub fn new(size: IVec2, pf: PixelFormat) -> Self {
        let stride = size.x.max(0) as usize * pf.bytes_per_pixel();
        let pixels = vec![0; stride * size.y.max(0) as usize];
        Self {
            size,
            stride,
            pf,
            pixels,
        }
    }

    /// Wrap existing pixel data.
    ///
    /// # Errors
    ///
    /// [`TesseraError::UnsupportedFormat`] if `stride` is shorter than a row or
    /// `pixels` does not cover `size.y` rows.
    pub fn from_pixels(
        size: IVec2,
        stride: usize,
        pf: PixelFormat,
        pixels: Vec<u8>,
    ) -> Result<Self> {
        let row = size.x.max(0) as usize * pf.bytes_per_pixel();
        let rows = size.y.max(0) as usize;
        if stride < row || pixels.len() < stride * rows {
            return Err(TesseraError::UnsupportedFormat(format!(
                "bitmap {}x{} {pf} with stride {stride} needs {} bytes, got {}",
                size.x,
                size.y,
                stride * rows,
                pixels.len()
            )));
        }
        Ok(Self {
            size,
            stride,
            pf,
            pixels,
        })
    }

    /// Fill every pixel with the same encoded value.
    #[must_use]
    pub fn filled(size: IVec2, pf: PixelFormat, pixel: &[u8]) -> Self {
        let mut bmp = Self::new(size, pf);
        for chunk in bmp.pixels.chunks_exact_mut(pf.bytes_per_pixel()) {
            chunk.copy_from_slice(&pixel[..pf.bytes_per_pixel()]);
        }
        bmp
    }

    /// Dimensions in pixels.
    #[must_use]
    pub const fn size(&self) -> IVec2 {
        self.size
    }

    /// Bytes per row.
    #[must_use]
    pub const fn stride(&self) -> usize {
        self.stride
    }

    /// Row length in pixels.
    #[must_use]
    pub fn stride_pixels(&self) -> usize {
        self.stride / self.pf.bytes_per_pixel()
    }

    /// Pixel format.
    #[must_use]
    pub const fn pixel_format(&self) -> PixelFormat {
        self.pf
    }

    /// Raw pixel bytes.
    #[must_use]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Mutable raw pixel bytes.
    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    /// Copy of this bitmap in another format.
    ///
    /// The row length in pixels is preserved, so offsets computed from
    /// [`Self::stride_pixels`] stay valid.
    ///
    /// # Errors
    ///
    /// [`TesseraError::UnsupportedFormat`] if no conversion exists.
    pub fn converted(&self, pf: PixelFormat) -> Result<Self> {
        if pf == self.pf {
            return Ok(self.clone());
        }
        let row_pixels = self.stride_pixels();
        let src_row = row_pixels * self.pf.bytes_per_pixel();
        let dest_row = row_pixels * pf.bytes_per_pixel();
        let rows = self.size.y.max(0) as usize;
        let mut pixels = vec![0; dest_row * rows];
        for y in 0..rows {
            let src = &self.pixels[y * self.stride..y * self.stride + src_row];
            let dst = &mut pixels[y * dest_row..(y + 1) * dest_row];
            convert::convert_row(self.pf, src, pf, dst)?;
        }
        Ok(Self {
            size: self.size,
            stride: dest_row,
            pf,
            pixels,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_short_buffers() {
        let result =
            Bitmap::from_pixels(IVec2::new(4, 4), 16, PixelFormat::R8G8B8A8, vec![0; 60]);
        assert!(result.is_err());
        let result =
            Bitmap::from_pixels(IVec2::new(4, 4), 8, PixelFormat::R8G8B8A8, vec![0; 64]);
        assert!(result.is_err());
    }

    #[test]
    fn converts_rgb_to_565() {
        let bmp = Bitmap::filled(IVec2::new(3, 2), PixelFormat::R8G8B8, &[255, 0, 0]);
        let packed = bmp.converted(PixelFormat::B5G6R5).unwrap();
        assert_eq!(packed.stride(), 6);
        assert_eq!(&packed.pixels()[..2], &0xF800_u16.to_le_bytes());
    }

    #[test]
    fn conversion_keeps_row_length() {
        let bmp = Bitmap::from_pixels(IVec2::new(2, 2), 16, PixelFormat::R8G8B8A8, vec![9; 32])
            .unwrap();
        let gray = bmp.converted(PixelFormat::A8).unwrap();
        assert_eq!(gray.stride_pixels(), 4);
        assert_eq!(gray.pixels(), &[9; 8]);
    }
}
