//! Payload decoding for processed (ISP) streams

use jpeg_decoder::{Decoder, PixelFormat as JpegFormat};

use super::frame::{Frame, PixelFormat};
use crate::display::DisplayImage;
use crate::error::ClassifyError;

pub fn decode_frame(frame: &Frame) -> Result<DisplayImage, ClassifyError> {
    let meta = &frame.meta;
    let (width, height) = (meta.width, meta.height);
    let data = &frame.data[..];

    if let Some(expected) = meta.format.frame_len(width, height) {
        if data.len() < expected {
            return Err(ClassifyError::ShortPayload {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }
    }

    let px = width as usize * height as usize;
    match meta.format {
        PixelFormat::Bgr24 => Ok(DisplayImage::bgr(width, height, data[..px * 3].to_vec())),
        PixelFormat::Gray8 | PixelFormat::Raw8 => {
            Ok(DisplayImage::gray(width, height, data[..px].to_vec()))
        }
        PixelFormat::Nv12 => Ok(DisplayImage::bgr(width, height, nv12_to_bgr(data, width, height))),
        PixelFormat::Yuv420p => Ok(DisplayImage::bgr(
            width,
            height,
            i420_to_bgr(data, width, height),
        )),
        PixelFormat::Yuyv4 => Ok(DisplayImage::bgr(width, height, yuyv_to_bgr(data, width, height))),
        PixelFormat::Mjpeg => {
            let mut decoder = Decoder::new(data);
            let pixels = decoder.decode()?;
            let info = decoder
                .info()
                .ok_or(ClassifyError::UnsupportedFormat(meta.format))?;
            let (w, h) = (info.width as u32, info.height as u32);
            match info.pixel_format {
                JpegFormat::RGB24 => Ok(DisplayImage::bgr(
                    w,
                    h,
                    pixels.chunks_exact(3).flat_map(|p| [p[2], p[1], p[0]]).collect(),
                )),
                JpegFormat::L8 => Ok(DisplayImage::gray(w, h, pixels)),
                _ => Err(ClassifyError::UnsupportedFormat(meta.format)),
            }
        }
        other => Err(ClassifyError::UnsupportedFormat(other)),
    }
}

/// BT.601 limited-range YUV to BGR
#[inline]
fn yuv_to_bgr(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = (y as i32 - 16).max(0) * 298;
    let d = u as i32 - 128;
    let e = v as i32 - 128;
    let r = (c + 409 * e + 128) >> 8;
    let g = (c - 100 * d - 208 * e + 128) >> 8;
    let b = (c + 516 * d + 128) >> 8;
    [
        b.clamp(0, 255) as u8,
        g.clamp(0, 255) as u8,
        r.clamp(0, 255) as u8,
    ]
}

fn nv12_to_bgr(data: &[u8], width: u32, height: u32) -> Vec<u8> {
    let (w, h) = (width as usize, height as usize);
    // interleaved UV row covers ceil(w / 2) pairs
    let stride = 2 * w.div_ceil(2);
    let (luma, chroma) = data.split_at(w * h);
    let mut out = Vec::with_capacity(w * h * 3);
    for row in 0..h {
        for col in 0..w {
            let uv = (row / 2) * stride + (col / 2) * 2;
            out.extend_from_slice(&yuv_to_bgr(
                luma[row * w + col],
                chroma[uv],
                chroma[uv + 1],
            ));
        }
    }
    out
}

fn i420_to_bgr(data: &[u8], width: u32, height: u32) -> Vec<u8> {
    let (w, h) = (width as usize, height as usize);
    let cw = w.div_ceil(2);
    let ch = h.div_ceil(2);
    let (luma, rest) = data.split_at(w * h);
    let (u_plane, v_plane) = rest.split_at(cw * ch);
    let mut out = Vec::with_capacity(w * h * 3);
    for row in 0..h {
        for col in 0..w {
            let c = (row / 2) * cw + col / 2;
            out.extend_from_slice(&yuv_to_bgr(luma[row * w + col], u_plane[c], v_plane[c]));
        }
    }
    out
}

fn yuyv_to_bgr(data: &[u8], width: u32, height: u32) -> Vec<u8> {
    let (w, h) = (width as usize, height as usize);
    let stride = w.div_ceil(2) * 4;
    let mut out = Vec::with_capacity(w * h * 3);
    for line in data[..stride * h].chunks_exact(stride) {
        let start = out.len();
        for quad in line.chunks_exact(4) {
            let (y0, u, y1, v) = (quad[0], quad[1], quad[2], quad[3]);
            out.extend_from_slice(&yuv_to_bgr(y0, u, v));
            out.extend_from_slice(&yuv_to_bgr(y1, u, v));
        }
        // odd width: drop the padding pixel
        out.truncate(start + w * 3);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::frame::FrameMetadata;
    use std::time::Duration;

    fn frame(format: PixelFormat, width: u32, height: u32, data: Vec<u8>) -> Frame {
        Frame::new(
            data,
            FrameMetadata {
                stream: "rgb".into(),
                sequence: 1,
                width,
                height,
                format,
                device_timestamp: Duration::ZERO,
                exposure: Duration::from_micros(20_000),
                sensitivity_iso: 800,
                lens_position: 150,
                color_temperature_k: 5000,
            },
        )
    }

    #[test]
    fn neutral_nv12_decodes_to_gray_bgr() {
        // 2x2 luma at mid grey plus one neutral chroma pair
        let f = frame(PixelFormat::Nv12, 2, 2, vec![126, 126, 126, 126, 128, 128]);
        let img = decode_frame(&f).unwrap();
        assert_eq!(img.data.len(), 12);
        assert!(img.data.iter().all(|&c| c == img.data[0]));
    }

    #[test]
    fn short_payload_is_rejected() {
        let f = frame(PixelFormat::Bgr24, 4, 4, vec![0; 10]);
        assert!(matches!(
            decode_frame(&f),
            Err(ClassifyError::ShortPayload { expected: 48, .. })
        ));
    }

    #[test]
    fn odd_sized_i420_needs_rounded_chroma() {
        let short = frame(PixelFormat::Yuv420p, 3, 3, vec![128; 13]);
        assert!(matches!(
            decode_frame(&short),
            Err(ClassifyError::ShortPayload { expected: 17, actual: 13, .. })
        ));

        let full = frame(PixelFormat::Yuv420p, 3, 3, vec![128; 17]);
        assert_eq!(decode_frame(&full).unwrap().data.len(), 27);
    }

    #[test]
    fn odd_width_nv12_uses_padded_chroma_stride() {
        let short = frame(PixelFormat::Nv12, 3, 2, vec![128; 9]);
        assert!(matches!(
            decode_frame(&short),
            Err(ClassifyError::ShortPayload { expected: 10, .. })
        ));

        // right-hand pair tints the third column only
        let mut data = vec![126; 6];
        data.extend_from_slice(&[128, 128, 0, 255]);
        let img = decode_frame(&frame(PixelFormat::Nv12, 3, 2, data)).unwrap();
        assert_eq!(img.data.len(), 18);
        assert_eq!(img.data[0..3], img.data[3..6]);
        assert_ne!(img.data[3..6], img.data[6..9]);
        assert_eq!(img.data[6..9], img.data[15..18]);
    }

    #[test]
    fn odd_width_yuyv_drops_row_padding() {
        let short = frame(PixelFormat::Yuyv4, 3, 1, vec![128; 6]);
        assert!(decode_frame(&short).is_err());

        let img = decode_frame(&frame(PixelFormat::Yuyv4, 3, 2, vec![128; 16])).unwrap();
        assert_eq!(img.data.len(), 18);
    }

    #[test]
    fn gray_passes_through() {
        let f = frame(PixelFormat::Gray8, 2, 1, vec![3, 250]);
        assert_eq!(decode_frame(&f).unwrap().data, vec![3, 250]);
    }
}
