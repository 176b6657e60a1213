//! Per-row pixel format conversion.
//!
//! Covers the 8-bit-per-channel formats plus `B5G6R5`: every such pixel
//! decodes to RGBA8 and re-encodes into the target layout. Float and planar
//! formats only convert to themselves.

use crate::error::{Result, TesseraError};
use crate::pixel::format::PixelFormat;

/// Whether a pixel of `pf` can be decoded to and encoded from RGBA8.
fn is_byte_format(pf: PixelFormat) -> bool {
    !pf.is_float() && !pf.is_planar()
}

/// Whether `src` rows can be converted into `dst` rows.
#[must_use]
pub fn can_convert(src: PixelFormat, dst: PixelFormat) -> bool {
    src == dst || (is_byte_format(src) && is_byte_format(dst))
}

fn expand5(v: u16) -> u8 {
    let v = (v & 0x1f) as u8;
    (v << 3) | (v >> 2)
}

fn expand6(v: u16) -> u8 {
    let v = (v & 0x3f) as u8;
    (v << 2) | (v >> 4)
}

fn decode(pf: PixelFormat, px: &[u8]) -> [u8; 4] {
    match pf {
        PixelFormat::I8 => [px[0], px[0], px[0], 255],
        PixelFormat::A8 => [0, 0, 0, px[0]],
        PixelFormat::R8 => [px[0], 0, 0, 255],
        PixelFormat::R8G8B8 => [px[0], px[1], px[2], 255],
        PixelFormat::B8G8R8 => [px[2], px[1], px[0], 255],
        PixelFormat::R8G8B8A8 => [px[0], px[1], px[2], px[3]],
        PixelFormat::R8G8B8X8 => [px[0], px[1], px[2], 255],
        PixelFormat::B8G8R8A8 => [px[2], px[1], px[0], px[3]],
        PixelFormat::B8G8R8X8 => [px[2], px[1], px[0], 255],
        PixelFormat::B5G6R5 => {
            let v = u16::from_le_bytes([px[0], px[1]]);
            [expand5(v >> 11), expand6(v >> 5), expand5(v), 255]
        }
        PixelFormat::R32G32B32A32F
        | PixelFormat::I32F
        | PixelFormat::YCbCr420p
        | PixelFormat::YCbCrJ420p => [0; 4],
    }
}

fn luminance([r, g, b, _]: [u8; 4]) -> u8 {
    ((u32::from(r) * 54 + u32::from(g) * 183 + u32::from(b) * 19) >> 8) as u8
}

fn encode(pf: PixelFormat, rgba: [u8; 4], out: &mut [u8]) {
    let [r, g, b, a] = rgba;
    match pf {
        PixelFormat::I8 => out[0] = luminance(rgba),
        PixelFormat::A8 => out[0] = a,
        PixelFormat::R8 => out[0] = r,
        PixelFormat::R8G8B8 => out.copy_from_slice(&[r, g, b]),
        PixelFormat::B8G8R8 => out.copy_from_slice(&[b, g, r]),
        PixelFormat::R8G8B8A8 => out.copy_from_slice(&rgba),
        PixelFormat::R8G8B8X8 => out.copy_from_slice(&[r, g, b, 255]),
        PixelFormat::B8G8R8A8 => out.copy_from_slice(&[b, g, r, a]),
        PixelFormat::B8G8R8X8 => out.copy_from_slice(&[b, g, r, 255]),
        PixelFormat::B5G6R5 => {
            let v = (u16::from(r >> 3) << 11) | (u16::from(g >> 2) << 5) | u16::from(b >> 3);
            out.copy_from_slice(&v.to_le_bytes());
        }
        PixelFormat::R32G32B32A32F
        | PixelFormat::I32F
        | PixelFormat::YCbCr420p
        | PixelFormat::YCbCrJ420p => {}
    }
}

/// Convert one row of `src_pf` pixels into `dst`.
///
/// Both slices must hold the same number of pixels.
///
/// # Errors
///
/// [`TesseraError::UnsupportedFormat`] if no conversion between the two
/// formats exists or the slices disagree on the pixel count.
pub fn convert_row(src_pf: PixelFormat, src: &[u8], dst_pf: PixelFormat, dst: &mut [u8]) -> Result<()> {
    if !can_convert(src_pf, dst_pf) {
        return Err(TesseraError::UnsupportedFormat(format!(
            "no conversion from {src_pf} to {dst_pf}"
        )));
    }
    let (src_bpp, dst_bpp) = (src_pf.bytes_per_pixel(), dst_pf.bytes_per_pixel());
    if src.len() % src_bpp != 0 || src.len() / src_bpp != dst.len() / dst_bpp {
        return Err(TesseraError::UnsupportedFormat(format!(
            "row of {} {src_pf} bytes does not match {} {dst_pf} bytes",
            src.len(),
            dst.len()
        )));
    }
    if src_pf == dst_pf {
        dst.copy_from_slice(src);
        return Ok(());
    }
    for (from, to) in src.chunks_exact(src_bpp).zip(dst.chunks_exact_mut(dst_bpp)) {
        encode(dst_pf, decode(src_pf, from), to);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_primary_colours_into_565() {
        let src = [255, 0, 0, 0, 255, 0, 0, 0, 255];
        let mut dst = [0; 6];
        convert_row(PixelFormat::R8G8B8, &src, PixelFormat::B5G6R5, &mut dst).unwrap();
        assert_eq!(&dst[0..2], &0xF800_u16.to_le_bytes());
        assert_eq!(&dst[2..4], &0x07E0_u16.to_le_bytes());
        assert_eq!(&dst[4..6], &0x001F_u16.to_le_bytes());
    }

    #[test]
    fn bgrx_and_rgb_agree_on_565() {
        let mut from_rgb = [0; 2];
        let mut from_bgrx = [0; 2];
        convert_row(PixelFormat::R8G8B8, &[200, 100, 50], PixelFormat::B5G6R5, &mut from_rgb)
            .unwrap();
        convert_row(
            PixelFormat::B8G8R8X8,
            &[50, 100, 200, 0],
            PixelFormat::B5G6R5,
            &mut from_bgrx,
        )
        .unwrap();
        assert_eq!(from_rgb, from_bgrx);
    }

    #[test]
    fn expands_565_to_full_range() {
        let mut dst = [0; 4];
        convert_row(
            PixelFormat::B5G6R5,
            &0xFFFF_u16.to_le_bytes(),
            PixelFormat::R8G8B8A8,
            &mut dst,
        )
        .unwrap();
        assert_eq!(dst, [255, 255, 255, 255]);
    }

    #[test]
    fn swaps_channel_order() {
        let mut dst = [0; 8];
        convert_row(PixelFormat::B8G8R8, &[1, 2, 3, 4, 5, 6], PixelFormat::R8G8B8A8, &mut dst)
            .unwrap();
        assert_eq!(dst, [3, 2, 1, 255, 6, 5, 4, 255]);
    }

    #[test]
    fn refuses_float_and_planar() {
        let mut dst = [0; 4];
        assert!(convert_row(PixelFormat::I32F, &[0; 4], PixelFormat::R8G8B8A8, &mut dst).is_err());
        assert!(!can_convert(PixelFormat::YCbCr420p, PixelFormat::I8));
        assert!(can_convert(PixelFormat::I32F, PixelFormat::I32F));
    }

    #[test]
    fn refuses_mismatched_rows() {
        let mut dst = [0; 8];
        assert!(convert_row(PixelFormat::R8G8B8, &[0; 9], PixelFormat::R8G8B8A8, &mut dst).is_err());
    }
}
