use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Frame data with zero-copy semantics
#[derive(Clone)]
pub struct Frame {
    /// Immutable payload exactly as the device produced it
    pub data: Bytes,

    /// Frame metadata
    pub meta: Arc<FrameMetadata>,
}

impl Frame {
    pub fn new(data: impl Into<Bytes>, meta: FrameMetadata) -> Self {
        Self {
            data: data.into(),
            meta: Arc::new(meta),
        }
    }

    /// Payload as little-endian 16-bit samples. A trailing odd byte is ignored.
    pub fn samples_u16(&self) -> Vec<u16> {
        self.data
            .chunks_exact(2)
            .map(|b| u16::from_le_bytes([b[0], b[1]]))
            .collect()
    }

    pub fn pixel_count(&self) -> usize {
        self.meta.width as usize * self.meta.height as usize
    }
}

/// Frame metadata, as reported by the device alongside each payload
#[derive(Debug, Clone, PartialEq)]
pub struct FrameMetadata {
    pub stream: String,
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Device clock at start of exposure
    pub device_timestamp: Duration,
    pub exposure: Duration,
    pub sensitivity_iso: u32,
    pub lens_position: u32,
    pub color_temperature_k: u32,
}

/// Pixel formats the device can emit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    /// Interleaved 8-bit BGR
    Bgr24,
    Gray8,
    Nv12,
    /// Planar YUV 4:2:0
    Yuv420p,
    Yuyv4,
    Mjpeg,
    Raw8,
    /// Unpacked, one little-endian u16 per pixel
    Raw10,
    Raw12,
    Raw16,
    /// Unsigned 16-bit depth, little-endian
    Depth16,
}

/// Significant bits per sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BitDepth {
    Eight = 8,
    Ten = 10,
    Twelve = 12,
    Sixteen = 16,
}

impl BitDepth {
    pub fn bits(self) -> u32 {
        self as u32
    }

    /// Shift that left-justifies a sample into the 16-bit range.
    pub fn justify_shift(self) -> u32 {
        16 - self.bits()
    }
}

impl PixelFormat {
    pub fn bit_depth(self) -> BitDepth {
        match self {
            PixelFormat::Raw10 => BitDepth::Ten,
            PixelFormat::Raw12 => BitDepth::Twelve,
            PixelFormat::Raw16 | PixelFormat::Depth16 => BitDepth::Sixteen,
            _ => BitDepth::Eight,
        }
    }

    /// Bytes of a full frame, `None` for compressed payloads.
    ///
    /// Subsampled chroma rounds up, so odd sizes carry a partial block at the
    /// right and bottom edges. YUYV rows are padded to a whole macropixel.
    pub fn frame_len(self, width: u32, height: u32) -> Option<usize> {
        let (w, h) = (width as usize, height as usize);
        let px = w * h;
        match self {
            PixelFormat::Bgr24 => Some(px * 3),
            PixelFormat::Gray8 | PixelFormat::Raw8 => Some(px),
            PixelFormat::Nv12 | PixelFormat::Yuv420p => {
                Some(px + 2 * w.div_ceil(2) * h.div_ceil(2))
            }
            PixelFormat::Yuyv4 => Some(w.div_ceil(2) * 4 * h),
            PixelFormat::Raw10 | PixelFormat::Raw12 | PixelFormat::Raw16 | PixelFormat::Depth16 => {
                Some(px * 2)
            }
            PixelFormat::Mjpeg => None,
        }
    }

    /// File suffix used when the encoded payload of a processed stream is archived.
    pub fn payload_suffix(self) -> &'static str {
        match self {
            PixelFormat::Nv12 => "_NV12.yuv",
            PixelFormat::Yuv420p => "_P420.yuv",
            PixelFormat::Yuyv4 => "_YUYV.yuv",
            PixelFormat::Mjpeg => ".jpg",
            PixelFormat::Bgr24 => "_BGR.bgr",
            PixelFormat::Gray8 => "_GRAY8.raw",
            PixelFormat::Raw8 => "_8bit.bw",
            PixelFormat::Raw10 => "_10bit.bw",
            PixelFormat::Raw12 => "_12bit.bw",
            PixelFormat::Raw16 | PixelFormat::Depth16 => "_16bit.bw",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_formats_report_their_depth() {
        assert_eq!(PixelFormat::Raw10.bit_depth(), BitDepth::Ten);
        assert_eq!(PixelFormat::Raw10.bit_depth().justify_shift(), 6);
        assert_eq!(PixelFormat::Raw12.bit_depth().justify_shift(), 4);
        assert_eq!(PixelFormat::Raw8.bit_depth().justify_shift(), 8);
        assert_eq!(PixelFormat::Depth16.bit_depth().justify_shift(), 0);
    }

    #[test]
    fn samples_are_little_endian() {
        let meta = FrameMetadata {
            stream: "raw_rgb".into(),
            sequence: 0,
            width: 2,
            height: 1,
            format: PixelFormat::Raw10,
            device_timestamp: Duration::ZERO,
            exposure: Duration::ZERO,
            sensitivity_iso: 100,
            lens_position: 0,
            color_temperature_k: 0,
        };
        let frame = Frame::new(vec![0x01, 0x02, 0xff, 0x03], meta);
        assert_eq!(frame.samples_u16(), vec![0x0201, 0x03ff]);
    }

    #[test]
    fn odd_sizes_round_chroma_up() {
        assert_eq!(PixelFormat::Nv12.frame_len(2, 2), Some(6));
        assert_eq!(PixelFormat::Yuv420p.frame_len(3, 3), Some(17));
        assert_eq!(PixelFormat::Nv12.frame_len(3, 2), Some(10));
        assert_eq!(PixelFormat::Yuyv4.frame_len(4, 2), Some(16));
        assert_eq!(PixelFormat::Yuyv4.frame_len(3, 1), Some(8));
    }
}
