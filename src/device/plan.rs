//! Declarative pipeline definition: which streams the device should produce
//! for a camera selection.

use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{CameraFeatures, CameraSocket, SensorType, StereoCalibration, Stream, StreamKind};
use crate::control::{MedianFilter, ToFConfig};
use crate::error::DeviceError;

pub const STEREO_STREAM: &str = "stereo_depth";
pub const RAW_PREFIX: &str = "raw_";
pub const TOF_AMPLITUDE_PREFIX: &str = "tof_amplitude_";

/// Widest input the stereo engine accepts without ISP downscaling
const STEREO_MAX_WIDTH: u32 = 1280;

/// One `socket,type` entry, e.g. `rgb,c`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraSelection {
    /// Name as given, used as the stream name
    pub name: String,
    pub socket: CameraSocket,
    pub sensor: SensorType,
}

impl FromStr for CameraSelection {
    type Err = DeviceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, kind) = s
            .split_once(',')
            .ok_or_else(|| DeviceError::InvalidSelection(s.into(), "expected <socket>,<type>"))?;
        let name = name.trim();
        let socket = name
            .parse::<CameraSocket>()
            .map_err(|_| DeviceError::InvalidSelection(s.into(), "unknown socket"))?;
        let sensor = match kind.trim() {
            "c" | "color" => SensorType::Color,
            "m" | "mono" => SensorType::Mono,
            "t" | "tof" => SensorType::Tof,
            _ => return Err(DeviceError::InvalidSelection(s.into(), "type must be c, m or t")),
        };
        Ok(Self {
            name: name.to_string(),
            socket,
            sensor,
        })
    }
}

/// Colour sensor output size. Accepts the names `720`, `800`, `1080`,
/// `1200`, `4k`, `5mp`, `12mp`, `13mp` and `48mp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ColorResolution {
    P720,
    P800,
    P1080,
    P1200,
    K4,
    Mp5,
    Mp12,
    Mp13,
    Mp48,
}

impl ColorResolution {
    const NAMES: [(ColorResolution, &'static str); 9] = [
        (ColorResolution::P720, "720"),
        (ColorResolution::P800, "800"),
        (ColorResolution::P1080, "1080"),
        (ColorResolution::P1200, "1200"),
        (ColorResolution::K4, "4k"),
        (ColorResolution::Mp5, "5mp"),
        (ColorResolution::Mp12, "12mp"),
        (ColorResolution::Mp13, "13mp"),
        (ColorResolution::Mp48, "48mp"),
    ];

    pub fn name(self) -> &'static str {
        Self::NAMES
            .iter()
            .find(|(r, _)| *r == self)
            .map_or("1080", |(_, n)| n)
    }

    pub fn size(self) -> (u32, u32) {
        match self {
            ColorResolution::P720 => (1280, 720),
            ColorResolution::P800 => (1280, 800),
            ColorResolution::P1080 => (1920, 1080),
            ColorResolution::P1200 => (1920, 1200),
            ColorResolution::K4 => (3840, 2160),
            ColorResolution::Mp5 => (2592, 1944),
            ColorResolution::Mp12 => (4056, 3040),
            ColorResolution::Mp13 => (4208, 3120),
            ColorResolution::Mp48 => (8000, 6000),
        }
    }
}

impl TryFrom<String> for ColorResolution {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        let key = s.trim().to_lowercase();
        Self::NAMES
            .iter()
            .find(|(_, n)| *n == key)
            .map(|(r, _)| *r)
            .ok_or_else(|| format!("unknown colour resolution '{s}'"))
    }
}

impl From<ColorResolution> for String {
    fn from(r: ColorResolution) -> String {
        r.name().to_string()
    }
}

/// Which sensors get their image turned 180 degrees
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rotation {
    #[default]
    None,
    All,
    /// Colour sockets, CAM_A and CAM_D
    Rgb,
    /// Every other socket
    Mono,
}

impl Rotation {
    pub fn applies_to(self, socket: CameraSocket) -> bool {
        let colour_socket = matches!(socket, CameraSocket::CamA | CameraSocket::CamD);
        match self {
            Rotation::None => false,
            Rotation::All => true,
            Rotation::Rgb => colour_socket,
            Rotation::Mono => !colour_socket,
        }
    }
}

/// Fixed size of the colour `preview` output
pub const PREVIEW_SIZE: (u32, u32) = (300, 300);

/// Mono sensor resolution by height
pub fn mono_size(height: u32) -> (u32, u32) {
    match height {
        400 => (640, 400),
        480 => (640, 480),
        720 => (1280, 720),
        1200 => (1920, 1200),
        _ => (1280, 800),
    }
}

/// Knobs that shape the stream plan
#[derive(Debug, Clone)]
pub struct PlanOptions {
    pub mono_resolution: u32,
    pub color_resolution: ColorResolution,
    pub isp_downscale: u32,
    pub enable_raw: bool,
    pub tof_raw: bool,
    pub tof_amplitude: bool,
    pub tof_median: MedianFilter,
    pub no_stereo: bool,
    pub rotate: Rotation,
    /// Show the small colour preview instead of the full ISP output
    pub rgb_preview: bool,
    /// Rate of the auto exposure/focus/white-balance loop, `None` runs it every frame
    pub isp3a_fps: Option<u32>,
    pub camera_tuning: Option<PathBuf>,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            mono_resolution: 800,
            color_resolution: ColorResolution::P1080,
            isp_downscale: 1,
            enable_raw: false,
            tof_raw: false,
            tof_amplitude: false,
            tof_median: MedianFilter::Kernel5x5,
            no_stereo: false,
            rotate: Rotation::None,
            rgb_preview: false,
            isp3a_fps: None,
            camera_tuning: None,
        }
    }
}

/// The resolved set of streams a run will consume
#[derive(Debug, Clone)]
pub struct StreamPlan {
    pub cameras: Vec<CameraSelection>,
    pub streams: Vec<Stream>,
    /// Initial ToF configuration, present when a ToF depth node exists
    pub tof: Option<ToFConfig>,
    pub fps: f32,
    pub isp3a_fps: Option<u32>,
    /// Tuning database the device loads before starting
    pub camera_tuning: Option<PathBuf>,
}

impl StreamPlan {
    pub fn build(
        selection: &[CameraSelection],
        features: &[CameraFeatures],
        calibration: Result<StereoCalibration, DeviceError>,
        opts: &PlanOptions,
        fps: f32,
    ) -> Result<Self, DeviceError> {
        let cameras: Vec<CameraSelection> = if selection.is_empty() {
            features
                .iter()
                .map(|f| CameraSelection {
                    name: f.socket.option_name(),
                    socket: f.socket,
                    sensor: f.primary_type(),
                })
                .collect()
        } else {
            selection.to_vec()
        };

        let mut streams = Vec::new();
        let mut tof = None;
        let downscale = opts.isp_downscale.max(1);

        info!("Enabled cameras:");
        for cam in &cameras {
            let feat = features
                .iter()
                .find(|f| f.socket == cam.socket)
                .ok_or(DeviceError::NotConnected(cam.socket))?;
            info!("{:>7} : {:?}", cam.name, cam.sensor);

            let stream = |name: String, kind, (width, height): (u32, u32)| Stream {
                name,
                kind,
                socket: cam.socket,
                sensor_name: feat.sensor_name.clone(),
                width,
                height,
                rotated: opts.rotate.applies_to(cam.socket),
            };
            let raw_name = format!("{RAW_PREFIX}{}", cam.name);

            match cam.sensor {
                SensorType::Tof => {
                    let size = (feat.width, feat.height);
                    if opts.tof_raw {
                        streams.push(stream(raw_name, StreamKind::RawMono, size));
                        continue;
                    }
                    streams.push(stream(cam.name.clone(), StreamKind::ToFDepth, size));
                    tof = Some(ToFConfig::initial(opts.tof_median));
                    if opts.tof_amplitude {
                        streams.push(stream(
                            format!("{TOF_AMPLITUDE_PREFIX}{}", cam.name),
                            StreamKind::ToFAmplitude,
                            size,
                        ));
                    }
                }
                SensorType::Color => {
                    let (w, h) = opts.color_resolution.size();
                    let shown = if opts.rgb_preview {
                        PREVIEW_SIZE
                    } else {
                        (w / downscale, h / downscale)
                    };
                    streams.push(stream(cam.name.clone(), StreamKind::Color, shown));
                    if opts.enable_raw {
                        streams.push(stream(raw_name, StreamKind::RawBayer, (w, h)));
                    }
                }
                SensorType::Mono => {
                    let size = mono_size(opts.mono_resolution);
                    streams.push(stream(cam.name.clone(), StreamKind::Mono, size));
                    if opts.enable_raw {
                        streams.push(stream(raw_name, StreamKind::RawMono, size));
                    }
                }
            }
        }

        if opts.no_stereo {
            info!("no_stereo specified, skipping stereo depth creation");
        } else {
            match stereo_stream(&cameras, &streams, features, calibration, downscale) {
                Ok(Some(s)) => {
                    info!("Device is calibrated and has a stereo pair, creating stereo depth");
                    streams.push(s);
                }
                Ok(None) => debug!("stereo pair not part of the selection"),
                Err(e) => warn!("Couldn't create depth: {}", e),
            }
        }

        if let Some(path) = &opts.camera_tuning {
            info!("Camera tuning database: {}", path.display());
        }

        Ok(Self {
            cameras,
            streams,
            tof,
            fps,
            isp3a_fps: opts.isp3a_fps.filter(|&f| f > 0),
            camera_tuning: opts.camera_tuning.clone(),
        })
    }

    pub fn stream(&self, name: &str) -> Option<&Stream> {
        self.streams.iter().find(|s| s.name == name)
    }

    pub fn has_tof(&self) -> bool {
        self.tof.is_some()
    }
}

fn stereo_stream(
    cameras: &[CameraSelection],
    streams: &[Stream],
    features: &[CameraFeatures],
    calibration: Result<StereoCalibration, DeviceError>,
    downscale: u32,
) -> Result<Option<Stream>, DeviceError> {
    let calib = calibration
        .map_err(|e| DeviceError::StereoUnavailable(format!("device is not calibrated ({e})")))?;

    let left = cameras.iter().find(|c| c.socket == calib.left);
    let right = cameras.iter().find(|c| c.socket == calib.right);
    let (Some(left), Some(_right)) = (left, right) else {
        return Ok(None);
    };

    for socket in [calib.left, calib.right] {
        let width = features
            .iter()
            .find(|f| f.socket == socket)
            .map(|f| f.width)
            .unwrap_or(0);
        if width > STEREO_MAX_WIDTH && downscale == 1 {
            return Err(DeviceError::StereoUnavailable(format!(
                "{socket} width {width} > {STEREO_MAX_WIDTH}, set an ISP downscale"
            )));
        }
    }

    let source = streams
        .iter()
        .find(|s| s.name == left.name)
        .ok_or_else(|| DeviceError::StereoUnavailable(format!("no output for {}", left.name)))?;

    Ok(Some(Stream {
        name: STEREO_STREAM.to_string(),
        kind: StreamKind::StereoDepth,
        socket: left.socket,
        sensor_name: source.sensor_name.clone(),
        width: source.width,
        height: source.height,
        rotated: source.rotated,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features() -> Vec<CameraFeatures> {
        vec![
            CameraFeatures {
                socket: CameraSocket::CamA,
                sensor_name: "IMX378".into(),
                width: 4056,
                height: 3040,
                has_autofocus: true,
                supported_types: vec![SensorType::Color],
            },
            CameraFeatures {
                socket: CameraSocket::CamB,
                sensor_name: "OV9282".into(),
                width: 1280,
                height: 800,
                has_autofocus: false,
                supported_types: vec![SensorType::Mono],
            },
            CameraFeatures {
                socket: CameraSocket::CamC,
                sensor_name: "OV9282".into(),
                width: 1280,
                height: 800,
                has_autofocus: false,
                supported_types: vec![SensorType::Mono],
            },
        ]
    }

    fn calib() -> Result<StereoCalibration, DeviceError> {
        Ok(StereoCalibration {
            left: CameraSocket::CamB,
            right: CameraSocket::CamC,
        })
    }

    fn names(plan: &StreamPlan) -> Vec<&str> {
        plan.streams.iter().map(|s| s.name.as_str()).collect()
    }

    #[test]
    fn parses_selection() {
        let sel: CameraSelection = "rgb,c".parse().unwrap();
        assert_eq!(sel.socket, CameraSocket::CamA);
        assert_eq!(sel.sensor, SensorType::Color);
        let sel: CameraSelection = "camd,tof".parse().unwrap();
        assert_eq!(sel.sensor, SensorType::Tof);
        assert!("rgb".parse::<CameraSelection>().is_err());
        assert!("rgb,x".parse::<CameraSelection>().is_err());
        assert!("foo,c".parse::<CameraSelection>().is_err());
    }

    #[test]
    fn empty_selection_uses_all_connected_cameras() {
        let plan =
            StreamPlan::build(&[], &features(), calib(), &PlanOptions::default(), 30.0).unwrap();
        assert_eq!(names(&plan), vec!["cama", "camb", "camc", STEREO_STREAM]);
        assert_eq!(plan.streams[0].kind, StreamKind::Color);
        assert_eq!(plan.streams[3].sensor_name, "OV9282");
    }

    #[test]
    fn raw_streams_follow_sensor_type() {
        let sel: Vec<CameraSelection> = ["rgb,c", "left,m"]
            .iter()
            .map(|s| s.parse().unwrap())
            .collect();
        let opts = PlanOptions {
            enable_raw: true,
            ..Default::default()
        };
        let plan = StreamPlan::build(&sel, &features(), calib(), &opts, 30.0).unwrap();
        assert_eq!(names(&plan), vec!["rgb", "raw_rgb", "left", "raw_left"]);
        assert_eq!(plan.streams[1].kind, StreamKind::RawBayer);
        assert_eq!(plan.streams[3].kind, StreamKind::RawMono);
    }

    #[test]
    fn missing_calibration_degrades_to_no_stereo() {
        let sel: Vec<CameraSelection> = ["left,m", "right,m"]
            .iter()
            .map(|s| s.parse().unwrap())
            .collect();
        let plan = StreamPlan::build(
            &sel,
            &features(),
            Err(DeviceError::StereoUnavailable("no eeprom".into())),
            &PlanOptions::default(),
            30.0,
        )
        .unwrap();
        assert_eq!(names(&plan), vec!["left", "right"]);
    }

    #[test]
    fn wide_stereo_pair_needs_downscale() {
        let mut feats = features();
        feats[1].width = 1920;
        let sel: Vec<CameraSelection> = ["left,m", "right,m"]
            .iter()
            .map(|s| s.parse().unwrap())
            .collect();
        let plan =
            StreamPlan::build(&sel, &feats, calib(), &PlanOptions::default(), 30.0).unwrap();
        assert!(plan.stream(STEREO_STREAM).is_none());

        let opts = PlanOptions {
            isp_downscale: 2,
            ..Default::default()
        };
        let plan = StreamPlan::build(&sel, &feats, calib(), &opts, 30.0).unwrap();
        assert!(plan.stream(STEREO_STREAM).is_some());
    }

    #[test]
    fn tof_streams() {
        let mut feats = features();
        feats.push(CameraFeatures {
            socket: CameraSocket::CamD,
            sensor_name: "33D".into(),
            width: 640,
            height: 480,
            has_autofocus: false,
            supported_types: vec![SensorType::Tof],
        });
        let sel = vec!["camd,t".parse().unwrap()];
        let opts = PlanOptions {
            tof_amplitude: true,
            ..Default::default()
        };
        let plan = StreamPlan::build(&sel, &feats, calib(), &opts, 30.0).unwrap();
        assert_eq!(names(&plan), vec!["camd", "tof_amplitude_camd"]);
        assert!(plan.has_tof());

        let opts = PlanOptions {
            tof_raw: true,
            ..Default::default()
        };
        let plan = StreamPlan::build(&sel, &feats, calib(), &opts, 30.0).unwrap();
        assert_eq!(names(&plan), vec!["raw_camd"]);
        assert!(!plan.has_tof());
    }

    #[test]
    fn unconnected_socket_is_an_error() {
        let sel = vec!["camh,m".parse().unwrap()];
        assert!(matches!(
            StreamPlan::build(&sel, &features(), calib(), &PlanOptions::default(), 30.0),
            Err(DeviceError::NotConnected(CameraSocket::CamH))
        ));
    }

    #[test]
    fn colour_resolution_names() {
        assert_eq!(ColorResolution::try_from("4K".to_string()), Ok(ColorResolution::K4));
        assert_eq!(ColorResolution::try_from("1080".to_string()).map(|r| r.size()), Ok((1920, 1080)));
        assert!(ColorResolution::try_from("9000".to_string()).is_err());
        assert_eq!(String::from(ColorResolution::Mp12), "12mp");
    }

    #[test]
    fn rotation_follows_socket_groups() {
        let sel: Vec<CameraSelection> = ["rgb,c", "left,m", "right,m"]
            .iter()
            .map(|s| s.parse().unwrap())
            .collect();
        let rotated = |rotate| {
            let opts = PlanOptions {
                rotate,
                ..Default::default()
            };
            let plan = StreamPlan::build(&sel, &features(), calib(), &opts, 30.0).unwrap();
            plan.streams
                .iter()
                .filter(|s| s.rotated)
                .map(|s| s.name.clone())
                .collect::<Vec<_>>()
        };
        assert!(rotated(Rotation::None).is_empty());
        assert_eq!(rotated(Rotation::Rgb), vec!["rgb"]);
        assert_eq!(rotated(Rotation::Mono), vec!["left", "right", STEREO_STREAM]);
        assert_eq!(rotated(Rotation::All).len(), 4);
        assert!(Rotation::Rgb.applies_to(CameraSocket::CamD));
    }

    #[test]
    fn preview_replaces_isp_size() {
        let sel = vec!["rgb,c".parse().unwrap()];
        let opts = PlanOptions {
            rgb_preview: true,
            isp_downscale: 2,
            enable_raw: true,
            isp3a_fps: Some(0),
            camera_tuning: Some(PathBuf::from("tuning.bin")),
            ..Default::default()
        };
        let plan = StreamPlan::build(&sel, &features(), calib(), &opts, 30.0).unwrap();
        let rgb = plan.stream("rgb").unwrap();
        assert_eq!((rgb.width, rgb.height), PREVIEW_SIZE);
        let raw = plan.stream("raw_rgb").unwrap();
        assert_eq!((raw.width, raw.height), (1920, 1080));
        assert_eq!(plan.isp3a_fps, None);
        assert_eq!(plan.camera_tuning, Some(PathBuf::from("tuning.bin")));
    }
}
