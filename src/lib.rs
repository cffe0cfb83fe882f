//! Multi-camera diagnostic harness: live streams, interactive sensor tuning,
//! FPS feedback and one-shot multi-stream captures.

pub mod control;
pub mod device;
pub mod display;
pub mod error;
pub mod pipeline;
pub mod utils;

use std::path::{Path, PathBuf};
use std::time::Duration;

use color_eyre::Result;
use serde::{Deserialize, Serialize};
use tracing::info;

use control::MedianFilter;
use device::plan::{ColorResolution, PlanOptions, Rotation};
use device::{CameraSelection, CameraSocket, Device, SensorType, SyntheticDevice};
use error::DeviceError;
use pipeline::{DisplayModes, LoopOptions};

pub const DEFAULT_CONFIG_FILE: &str = "camtest.toml";
pub const CONFIG_PATH_VAR: &str = "CAMTEST_CONFIG";
pub const ENV_PREFIX: &str = "CAMTEST";

/// Harness configuration, read once at startup
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub device: DeviceConfig,
    pub display: DisplayConfig,
    pub capture: CaptureConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceBackend {
    Synthetic,
    V4l2,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub backend: DeviceBackend,
    /// `socket,type` entries; empty selects every connected camera
    pub cameras: Vec<String>,
    pub mono_resolution: u32,
    pub color_resolution: ColorResolution,
    pub fps: f32,
    pub isp_downscale: u32,
    pub enable_raw: bool,
    pub tof_raw: bool,
    pub tof_amplitude: bool,
    pub tof_cm: bool,
    pub tof_median: MedianFilter,
    pub no_stereo: bool,
    /// `none`, `all`, `rgb` or `mono`
    pub rotate: Rotation,
    pub rgb_preview: bool,
    /// 0 leaves the 3A rate at the sensor FPS
    pub isp3a_fps: u32,
    pub camera_tuning: Option<PathBuf>,
    pub v4l2_path: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            backend: DeviceBackend::Synthetic,
            cameras: Vec::new(),
            mono_resolution: 800,
            color_resolution: ColorResolution::P1080,
            fps: 30.0,
            isp_downscale: 1,
            enable_raw: false,
            tof_raw: false,
            tof_amplitude: false,
            tof_cm: false,
            tof_median: MedianFilter::Kernel5x5,
            no_stereo: false,
            rotate: Rotation::None,
            rgb_preview: false,
            isp3a_fps: 0,
            camera_tuning: None,
            v4l2_path: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayBackend {
    Sdl,
    Headless,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub width: u32,
    pub height: u32,
    /// Open windows at `width`x`height` and let the operator resize them
    pub resizable: bool,
    pub backend: DisplayBackend,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 800,
            resizable: false,
            backend: if cfg!(feature = "sdl-display") {
                DisplayBackend::Sdl
            } else {
                DisplayBackend::Headless
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub output_dir: PathBuf,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub queue_depth: usize,
    pub fps_window: usize,
    pub status_interval_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_depth: 4,
            fps_window: pipeline::fps::DEFAULT_WINDOW,
            status_interval_ms: 1000,
        }
    }
}

impl Config {
    /// Defaults, then the TOML file (`path`, else `$CAMTEST_CONFIG`, else
    /// `camtest.toml`; missing is fine), then `CAMTEST__SECTION__KEY`
    /// environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_PATH_VAR).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_path()).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(";")
                    .with_list_parse_key("device.cameras")
                    .try_parsing(true),
            )
            .build()?;
        let config: Config = settings.try_deserialize()?;
        info!("Configuration loaded ({})", path.display());
        Ok(config)
    }

    pub fn loop_options(&self) -> LoopOptions {
        LoopOptions {
            modes: self.device.display_modes(),
            output_dir: self.capture.output_dir.clone(),
            fps_window: self.pipeline.fps_window,
            status_interval: Duration::from_millis(self.pipeline.status_interval_ms),
        }
    }
}

impl DeviceConfig {
    pub fn selection(&self) -> Result<Vec<CameraSelection>, DeviceError> {
        self.cameras.iter().map(|c| c.parse()).collect()
    }

    pub fn plan_options(&self) -> PlanOptions {
        PlanOptions {
            mono_resolution: self.mono_resolution,
            color_resolution: self.color_resolution,
            isp_downscale: self.isp_downscale,
            enable_raw: self.enable_raw,
            tof_raw: self.tof_raw,
            tof_amplitude: self.tof_amplitude,
            tof_median: self.tof_median,
            no_stereo: self.no_stereo,
            rotate: self.rotate,
            rgb_preview: self.rgb_preview,
            isp3a_fps: Some(self.isp3a_fps).filter(|&f| f > 0),
            camera_tuning: self.camera_tuning.clone(),
        }
    }

    pub fn display_modes(&self) -> DisplayModes {
        DisplayModes {
            tof_cm: self.tof_cm,
            raw_enabled: self.enable_raw,
        }
    }

    /// Open the configured backend. The synthetic device grows a ToF module
    /// on every socket the selection asks a ToF camera of.
    pub fn open_device(&self, selection: &[CameraSelection]) -> Result<Box<dyn Device>> {
        match self.backend {
            DeviceBackend::Synthetic => {
                let tof_sockets: Vec<CameraSocket> = selection
                    .iter()
                    .filter(|c| c.sensor == SensorType::Tof)
                    .map(|c| c.socket)
                    .collect();
                let device = tof_sockets
                    .into_iter()
                    .fold(SyntheticDevice::new(), SyntheticDevice::with_tof);
                Ok(Box::new(device))
            }
            #[cfg(feature = "v4l2")]
            DeviceBackend::V4l2 => Ok(Box::new(device::V4l2Device::open(&self.v4l2_path)?)),
            #[cfg(not(feature = "v4l2"))]
            DeviceBackend::V4l2 => Err(color_eyre::eyre::eyre!("built without the `v4l2` feature")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn defaults_without_file() {
        let cfg = Config::load(Some(Path::new("/nonexistent/camtest.toml"))).unwrap();
        assert_eq!(cfg.pipeline.queue_depth, 4);
        assert_eq!(cfg.pipeline.fps_window, 30);
        assert_eq!(cfg.device.backend, DeviceBackend::Synthetic);
        assert!(cfg.device.cameras.is_empty());
        assert_eq!(cfg.device.plan_options().isp3a_fps, None);
    }

    #[test]
    fn file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("camtest.toml");
        fs::write(
            &path,
            r#"
[device]
cameras = ["rgb,c", "left,m"]
color_resolution = "4k"
tof_median = 7
enable_raw = true
rotate = "mono"
isp3a_fps = 10
camera_tuning = "/opt/tuning_color.bin"

[capture]
output_dir = "/tmp/shots"
"#,
        )
        .unwrap();
        let cfg = Config::load(Some(&path)).unwrap();
        assert_eq!(cfg.device.color_resolution, ColorResolution::K4);
        assert_eq!(cfg.device.tof_median, MedianFilter::Kernel7x7);
        assert_eq!(cfg.capture.output_dir, PathBuf::from("/tmp/shots"));
        assert_eq!(cfg.device.mono_resolution, 800);
        let sel = cfg.device.selection().unwrap();
        assert_eq!(sel.len(), 2);
        assert_eq!(sel[0].socket, CameraSocket::CamA);
        assert!(cfg.loop_options().modes.raw_enabled);
        let opts = cfg.device.plan_options();
        assert_eq!(opts.rotate, Rotation::Mono);
        assert_eq!(opts.isp3a_fps, Some(10));
        assert_eq!(opts.camera_tuning, Some(PathBuf::from("/opt/tuning_color.bin")));
        assert!(!opts.rgb_preview);
    }

    #[test]
    fn bad_selection_is_reported() {
        let cfg = DeviceConfig {
            cameras: vec!["rgb".into()],
            ..Default::default()
        };
        assert!(cfg.selection().is_err());
    }

    #[test]
    fn synthetic_device_gets_requested_tof() {
        let cfg = DeviceConfig::default();
        let sel = vec!["camd,t".parse().unwrap()];
        let dev = cfg.open_device(&sel).unwrap();
        let cams = dev.connected_cameras();
        assert!(cams
            .iter()
            .any(|c| c.socket == CameraSocket::CamD && c.supported_types == [SensorType::Tof]));
    }
}
