//! Frame classifier: turns a device frame into something displayable, and
//! picks out the bytes worth archiving when a capture is armed.

use bytes::Bytes;

use super::bayer::{demosaic, BayerPattern};
use super::colormap::ColorLut;
use crate::device::{decoder, BitDepth, Frame, PixelFormat, StreamKind};
use crate::display::DisplayImage;
use crate::error::ClassifyError;

/// Every nth row feeds the stereo percentile scan
pub const STEREO_ROW_STRIDE: usize = 4;
const STEREO_LOW_PERCENTILE: f64 = 1.0;
const STEREO_HIGH_PERCENTILE: f64 = 99.0;

/// Colour-filter order of the colour sensors' raw output
pub const RAW_BAYER_ORDER: BayerPattern = BayerPattern::Grbg;

/// Operator-selected rendering switches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DisplayModes {
    /// Show ToF depth as centimetres saturating at 255
    pub tof_cm: bool,
    /// Raw streams are enabled, so processed payloads get archived alongside
    pub raw_enabled: bool,
}

/// Bytes to archive verbatim, with the file suffix they go under
#[derive(Debug, Clone, PartialEq)]
pub struct RawPayload {
    pub bytes: Bytes,
    pub suffix: &'static str,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Classified {
    /// Nothing to render this time (e.g. an all-zero depth frame)
    Skip,
    Ready {
        display: DisplayImage,
        archive: Option<RawPayload>,
    },
}

/// Lookup tables built once per run
pub struct Classifier {
    modes: DisplayModes,
    hot: ColorLut,
    jet: ColorLut,
}

impl Classifier {
    pub fn new(modes: DisplayModes) -> Self {
        Self {
            modes,
            hot: ColorLut::hot(),
            jet: ColorLut::jet_zero_black(),
        }
    }

    /// `archive` is set when a capture is armed for the frame's stream.
    pub fn classify(
        &self,
        frame: &Frame,
        kind: StreamKind,
        archive: bool,
    ) -> Result<Classified, ClassifyError> {
        let meta = &frame.meta;
        let (width, height) = (meta.width, meta.height);

        match kind {
            StreamKind::StereoDepth => {
                let depth = checked_samples(frame)?;
                let Some((min, max)) = stereo_range(&depth, width as usize) else {
                    return Ok(Classified::Skip);
                };
                let gray = rescale(&depth, min, max);
                Ok(Classified::Ready {
                    display: DisplayImage::bgr(width, height, self.hot.apply(&gray)),
                    archive: None,
                })
            }
            StreamKind::ToFDepth => {
                let depth = checked_samples(frame)?;
                let display = if self.modes.tof_cm {
                    DisplayImage::gray(width, height, depth_cm(&depth))
                } else {
                    let gray = normalize_min_max(&depth);
                    DisplayImage::bgr(width, height, self.jet.apply(&gray))
                };
                Ok(Classified::Ready {
                    display,
                    archive: None,
                })
            }
            _ if kind.is_raw() => {
                let samples = raw_samples(frame)?;
                let justified = left_justify(&samples, meta.format.bit_depth());
                let display = if kind == StreamKind::RawBayer {
                    let bgr = demosaic(&justified, width as usize, height as usize, RAW_BAYER_ORDER);
                    DisplayImage::bgr(width, height, high_byte(&bgr))
                } else {
                    DisplayImage::gray(width, height, high_byte(&justified))
                };
                Ok(Classified::Ready {
                    display,
                    archive: archive.then(|| RawPayload {
                        bytes: frame.data.clone(),
                        suffix: meta.format.payload_suffix(),
                    }),
                })
            }
            // processed colour and mono
            _ => {
                let display = decoder::decode_frame(frame)?;
                Ok(Classified::Ready {
                    display,
                    archive: (archive && self.modes.raw_enabled).then(|| RawPayload {
                        bytes: frame.data.clone(),
                        suffix: meta.format.payload_suffix(),
                    }),
                })
            }
        }
    }
}

fn checked_samples(frame: &Frame) -> Result<Vec<u16>, ClassifyError> {
    let expected = frame.pixel_count() * 2;
    if frame.data.len() < expected {
        return Err(ClassifyError::ShortPayload {
            width: frame.meta.width,
            height: frame.meta.height,
            expected,
            actual: frame.data.len(),
        });
    }
    let mut samples = frame.samples_u16();
    samples.truncate(frame.pixel_count());
    Ok(samples)
}

fn raw_samples(frame: &Frame) -> Result<Vec<u16>, ClassifyError> {
    match frame.meta.format {
        PixelFormat::Raw8 | PixelFormat::Gray8 => {
            let px = frame.pixel_count();
            if frame.data.len() < px {
                return Err(ClassifyError::ShortPayload {
                    width: frame.meta.width,
                    height: frame.meta.height,
                    expected: px,
                    actual: frame.data.len(),
                });
            }
            Ok(frame.data[..px].iter().map(|&b| b as u16).collect())
        }
        PixelFormat::Raw10 | PixelFormat::Raw12 | PixelFormat::Raw16 | PixelFormat::Depth16 => {
            checked_samples(frame)
        }
        other => Err(ClassifyError::UnsupportedFormat(other)),
    }
}

/// Multiply each sample by `2^(16 - bits)` so it spans the 16-bit range.
pub fn left_justify(samples: &[u16], depth: BitDepth) -> Vec<u16> {
    let shift = depth.justify_shift();
    samples
        .iter()
        .map(|&v| ((v as u32) << shift).min(u16::MAX as u32) as u16)
        .collect()
}

fn high_byte(samples: &[u16]) -> Vec<u8> {
    samples.iter().map(|&v| (v >> 8) as u8).collect()
}

/// Linear-interpolated percentile, `p` in `[0, 100]`. `None` for no input.
pub fn percentile(values: &mut [u16], p: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let rank = (p / 100.0).clamp(0.0, 1.0) * (values.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let frac = rank - lo as f64;
    let (_, nth, above) = values.select_nth_unstable(lo);
    let a = *nth as f64;
    // next rank up is the smallest value above the partition point
    let b = if frac > 0.0 {
        above.iter().min().map_or(a, |&v| v as f64)
    } else {
        a
    };
    Some(a + (b - a) * frac)
}

/// Robust `[min, max]` of a depth frame from every [`STEREO_ROW_STRIDE`]th
/// row: low percentile over valid (nonzero) depth, high percentile over all
/// samples. `None` when the subsample holds no valid depth.
pub fn stereo_range(depth: &[u16], width: usize) -> Option<(f64, f64)> {
    if width == 0 {
        return None;
    }
    let mut all: Vec<u16> = depth
        .chunks(width)
        .step_by(STEREO_ROW_STRIDE)
        .flatten()
        .copied()
        .collect();
    let mut valid: Vec<u16> = all.iter().copied().filter(|&v| v != 0).collect();
    let min = percentile(&mut valid, STEREO_LOW_PERCENTILE)?;
    let max = percentile(&mut all, STEREO_HIGH_PERCENTILE)?;
    Some((min, max))
}

/// Map `[min, max]` onto `[0, 255]`, clamping outside, truncating to u8.
pub fn rescale(depth: &[u16], min: f64, max: f64) -> Vec<u8> {
    let span = max - min;
    depth
        .iter()
        .map(|&v| {
            let v = v as f64;
            if span <= 0.0 {
                if v > min {
                    255
                } else {
                    0
                }
            } else {
                ((v - min) / span * 255.0).clamp(0.0, 255.0) as u8
            }
        })
        .collect()
}

/// Millimetre depth shown as centimetres, saturating at 255
pub fn depth_cm(depth: &[u16]) -> Vec<u8> {
    depth.iter().map(|&v| (v / 10).min(255) as u8).collect()
}

/// Reinterpret as signed 16-bit and stretch the frame's own min..max onto
/// 0..255. A flat frame maps to all zeros.
pub fn normalize_min_max(depth: &[u16]) -> Vec<u8> {
    let signed = depth.iter().map(|&v| v as i16 as f64);
    let (min, max) = signed
        .clone()
        .fold((f64::MAX, f64::MIN), |(lo, hi), v| (lo.min(v), hi.max(v)));
    let scale = if max - min > f64::EPSILON {
        255.0 / (max - min)
    } else {
        0.0
    };
    signed
        .map(|v| ((v - min) * scale).round().clamp(0.0, 255.0) as u8)
        .collect()
}
