//! One-shot multi-stream snapshot: arming, deterministic naming, writing.

use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;

use image::ColorType;
use tracing::{info, instrument};

use super::classify::RawPayload;
use crate::device::FrameMetadata;
use crate::display::{DisplayImage, Layout};
use crate::error::CaptureError;

/// Pending snapshot: each armed stream saves its next frame, then disarms.
#[derive(Debug, Default, Clone)]
pub struct CaptureRequest {
    armed: BTreeSet<String>,
    tag: String,
}

impl CaptureRequest {
    /// Arm every stream in `streams` under one shared time tag. Re-arming
    /// replaces any batch still pending.
    pub fn arm<I, S>(&mut self, streams: I, tag: impl Into<String>)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.armed = streams.into_iter().map(Into::into).collect();
        self.tag = tag.into();
        info!("Capture armed for {} stream(s), tag {}", self.armed.len(), self.tag);
    }

    pub fn is_armed(&self, stream: &str) -> bool {
        self.armed.contains(stream)
    }

    /// Disarm `stream`, returning the batch tag if it was armed.
    pub fn take(&mut self, stream: &str) -> Option<&str> {
        self.armed.remove(stream).then_some(self.tag.as_str())
    }

    pub fn is_idle(&self) -> bool {
        self.armed.is_empty()
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }
}

/// `capture_<stream>_<sensor>_<W>x<H>_exp_<us>_iso_<iso>_lens_<pos>_<tag>_<seq>`
///
/// `stream` is the name the capture was armed under, not the label the
/// device put in the metadata.
pub fn capture_basename(stream: &str, sensor_name: &str, meta: &FrameMetadata, tag: &str) -> String {
    format!(
        "capture_{}_{}_{}x{}_exp_{}_iso_{}_lens_{}_{}_{}",
        stream,
        sensor_name,
        meta.width,
        meta.height,
        meta.exposure.as_micros(),
        meta.sensitivity_iso,
        meta.lens_position,
        tag,
        meta.sequence
    )
}

/// Writes capture artifacts under one directory
#[derive(Debug, Clone)]
pub struct CaptureWriter {
    dir: PathBuf,
}

impl CaptureWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Verbatim payload bytes, `<basename><suffix>`
    #[instrument(skip(self, payload), fields(bytes = payload.bytes.len()))]
    pub fn write_payload(&self, basename: &str, payload: &RawPayload) -> Result<PathBuf, CaptureError> {
        let path = self.dir.join(format!("{basename}{}", payload.suffix));
        info!("Saving: {}", path.display());
        fs::write(&path, &payload.bytes).map_err(|source| CaptureError::Io {
            path: path.clone(),
            source,
        })?;
        metrics::counter!("captures_written").increment(1);
        Ok(path)
    }

    /// Display image as lossless PNG, `<basename>.png`
    #[instrument(skip(self, image))]
    pub fn write_png(&self, basename: &str, image: &DisplayImage) -> Result<PathBuf, CaptureError> {
        let path = self.dir.join(format!("{basename}.png"));
        info!("Saving: {}", path.display());
        let (buf, color) = match image.layout {
            Layout::Gray8 => (image.data.clone(), ColorType::L8),
            Layout::Bgr24 => (image.to_rgb(), ColorType::Rgb8),
        };
        image::save_buffer(&path, &buf, image.width, image.height, color).map_err(|source| {
            CaptureError::Encode {
                path: path.clone(),
                source,
            }
        })?;
        metrics::counter!("captures_written").increment(1);
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::PixelFormat;
    use std::time::Duration;

    fn meta(stream: &str, sequence: u64) -> FrameMetadata {
        FrameMetadata {
            stream: stream.into(),
            sequence,
            width: 1920,
            height: 1080,
            format: PixelFormat::Nv12,
            device_timestamp: Duration::from_secs(3),
            exposure: Duration::from_micros(19_987),
            sensitivity_iso: 800,
            lens_position: 150,
            color_temperature_k: 5200,
        }
    }

    #[test]
    fn arm_then_take_each_stream_once() {
        let mut req = CaptureRequest::default();
        assert!(req.is_idle());
        req.arm(["rgb", "left"], "20240101_120000");
        assert!(req.is_armed("rgb"));
        assert_eq!(req.take("rgb"), Some("20240101_120000"));
        assert_eq!(req.take("rgb"), None);
        assert_eq!(req.take("right"), None);
        assert_eq!(req.take("left"), Some("20240101_120000"));
        assert!(req.is_idle());
    }

    #[test]
    fn names_share_the_tag() {
        let tag = "20240101_120000";
        let a = capture_basename("rgb", "IMX378", &meta("isp", 5), tag);
        let b = capture_basename("left", "OV9282", &meta("left", 9), tag);
        assert_eq!(
            a,
            "capture_rgb_IMX378_1920x1080_exp_19987_iso_800_lens_150_20240101_120000_5"
        );
        assert_ne!(a, b);
        assert!(b.contains(tag));
    }

    #[test]
    fn writes_png_and_payload() {
        let dir = tempfile::tempdir().unwrap();
        let writer = CaptureWriter::new(dir.path());
        let img = DisplayImage::bgr(2, 1, vec![0, 0, 255, 255, 0, 0]);
        let png = writer.write_png("shot", &img).unwrap();
        assert!(png.ends_with("shot.png"));
        let decoded = image::open(&png).unwrap().to_rgb8();
        assert_eq!(decoded.get_pixel(0, 0).0, [255, 0, 0]);

        let payload = RawPayload {
            bytes: bytes::Bytes::from_static(&[1, 2, 3]),
            suffix: "_10bit.bw",
        };
        let raw = writer.write_payload("shot", &payload).unwrap();
        assert_eq!(fs::read(raw).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn unwritable_directory_reports_error() {
        let writer = CaptureWriter::new("/nonexistent/camtest/captures");
        let img = DisplayImage::gray(1, 1, vec![0]);
        assert!(writer.write_png("shot", &img).is_err());
    }
}
