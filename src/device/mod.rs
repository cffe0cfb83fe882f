//! Device Interface: camera enumeration, stream plan, frame queues and
//! control sinks.

pub mod decoder;
pub mod frame;
pub mod plan;
pub mod synthetic;
#[cfg(feature = "v4l2")]
pub mod v4l2;

use std::fmt;
use std::str::FromStr;

use flume::{Receiver, Sender, TryRecvError, TrySendError};
use serde::{Deserialize, Serialize};

use crate::control::{ControlCommand, ToFConfig};
use crate::error::DeviceError;

pub use frame::{BitDepth, Frame, FrameMetadata, PixelFormat};
pub use plan::{CameraSelection, StreamPlan};
pub use synthetic::SyntheticDevice;
#[cfg(feature = "v4l2")]
pub use v4l2::V4l2Device;

/// Physical camera connector on the board
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CameraSocket {
    CamA,
    CamB,
    CamC,
    CamD,
    CamE,
    CamF,
    CamG,
    CamH,
}

impl CameraSocket {
    pub const ALL: [CameraSocket; 8] = [
        CameraSocket::CamA,
        CameraSocket::CamB,
        CameraSocket::CamC,
        CameraSocket::CamD,
        CameraSocket::CamE,
        CameraSocket::CamF,
        CameraSocket::CamG,
        CameraSocket::CamH,
    ];

    /// Board name, e.g. `CAM_A`
    pub fn board_name(self) -> &'static str {
        match self {
            CameraSocket::CamA => "CAM_A",
            CameraSocket::CamB => "CAM_B",
            CameraSocket::CamC => "CAM_C",
            CameraSocket::CamD => "CAM_D",
            CameraSocket::CamE => "CAM_E",
            CameraSocket::CamF => "CAM_F",
            CameraSocket::CamG => "CAM_G",
            CameraSocket::CamH => "CAM_H",
        }
    }

    /// Selection name, e.g. `cama`
    pub fn option_name(self) -> String {
        self.board_name().replace('_', "").to_lowercase()
    }

    /// Legacy alias for the first three sockets
    pub fn alias(self) -> Option<&'static str> {
        match self {
            CameraSocket::CamA => Some("rgb"),
            CameraSocket::CamB => Some("left"),
            CameraSocket::CamC => Some("right"),
            _ => None,
        }
    }
}

impl fmt::Display for CameraSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.board_name())
    }
}

impl FromStr for CameraSocket {
    type Err = DeviceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rgb" | "cama" => Ok(CameraSocket::CamA),
            "left" | "camb" => Ok(CameraSocket::CamB),
            "right" | "camc" => Ok(CameraSocket::CamC),
            "camd" => Ok(CameraSocket::CamD),
            "came" => Ok(CameraSocket::CamE),
            "camf" => Ok(CameraSocket::CamF),
            "camg" => Ok(CameraSocket::CamG),
            "camh" => Ok(CameraSocket::CamH),
            _ => Err(DeviceError::InvalidSelection(s.into(), "unknown socket")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SensorType {
    Color,
    Mono,
    Tof,
}

/// Static description of a connected camera, queried once at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraFeatures {
    pub socket: CameraSocket,
    pub sensor_name: String,
    pub width: u32,
    pub height: u32,
    pub has_autofocus: bool,
    pub supported_types: Vec<SensorType>,
}

impl CameraFeatures {
    pub fn primary_type(&self) -> SensorType {
        self.supported_types.first().copied().unwrap_or(SensorType::Mono)
    }
}

/// Left/right sockets of the factory-calibrated stereo pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StereoCalibration {
    pub left: CameraSocket,
    pub right: CameraSocket,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamKind {
    Color,
    Mono,
    ToFDepth,
    ToFAmplitude,
    RawBayer,
    RawMono,
    StereoDepth,
}

impl StreamKind {
    /// Raw streams are archived unscaled and displayed left-justified.
    pub fn is_raw(self) -> bool {
        matches!(
            self,
            StreamKind::ToFAmplitude | StreamKind::RawBayer | StreamKind::RawMono
        )
    }
}

/// One named output channel of the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stream {
    pub name: String,
    pub kind: StreamKind,
    pub socket: CameraSocket,
    pub sensor_name: String,
    pub width: u32,
    pub height: u32,
    /// Sensor image turned 180 degrees before it leaves the device
    pub rotated: bool,
}

/// Output side of one stream: bounded, non-blocking.
pub trait FrameSource {
    /// `Ok(None)` when nothing is queued; an error means the queue is gone.
    fn try_receive(&self) -> Result<Option<Frame>, DeviceError>;
}

/// Named flume receiver acting as a device output queue
pub struct OutputQueue {
    pub name: String,
    pub rx: Receiver<Frame>,
}

impl FrameSource for OutputQueue {
    fn try_receive(&self) -> Result<Option<Frame>, DeviceError> {
        match self.rx.try_recv() {
            Ok(frame) => Ok(Some(frame)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(DeviceError::QueueClosed(self.name.clone())),
        }
    }
}

/// Device-level illumination calls (not queued)
pub trait IrDriver {
    fn set_dot_projector(&self, milliamps: u32) -> Result<(), DeviceError>;
    fn set_flood_light(&self, milliamps: u32) -> Result<(), DeviceError>;
}

/// Input queues of a running pipeline
#[derive(Clone)]
pub struct ControlSinks {
    pub control: Sender<ControlCommand>,
    pub tof_config: Sender<ToFConfig>,
}

impl ControlSinks {
    pub fn send_control(&self, cmd: ControlCommand) -> Result<(), DeviceError> {
        send_nonblocking(&self.control, cmd, "control")
    }

    pub fn send_tof_config(&self, cfg: ToFConfig) -> Result<(), DeviceError> {
        send_nonblocking(&self.tof_config, cfg, "tofConfig")
    }
}

fn send_nonblocking<T>(tx: &Sender<T>, item: T, name: &'static str) -> Result<(), DeviceError> {
    match tx.try_send(item) {
        Ok(()) => Ok(()),
        Err(TrySendError::Full(_)) => {
            tracing::warn!("{} queue full, command dropped", name);
            Ok(())
        }
        Err(TrySendError::Disconnected(_)) => Err(DeviceError::SinkClosed(name)),
    }
}

/// Everything the poll loop needs from a started device
pub struct DeviceSession {
    pub outputs: Vec<OutputQueue>,
    pub sinks: ControlSinks,
    pub ir: Box<dyn IrDriver>,
}

/// A camera device that can run a stream plan
pub trait Device {
    fn connected_cameras(&self) -> Vec<CameraFeatures>;

    /// Stereo calibration, if the device carries one
    fn calibration(&self) -> Result<StereoCalibration, DeviceError>;

    /// Start producing frames for every stream in `plan`.
    fn start(&mut self, plan: &StreamPlan, queue_depth: usize) -> Result<DeviceSession, DeviceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_names_round_trip() {
        for socket in CameraSocket::ALL {
            assert_eq!(socket.option_name().parse::<CameraSocket>().unwrap(), socket);
        }
        assert_eq!("rgb".parse::<CameraSocket>().unwrap(), CameraSocket::CamA);
        assert_eq!(CameraSocket::CamC.option_name(), "camc");
        assert!("camz".parse::<CameraSocket>().is_err());
    }

    #[test]
    fn disconnected_queue_is_fatal() {
        let (tx, rx) = flume::bounded::<Frame>(4);
        let q = OutputQueue {
            name: "rgb".into(),
            rx,
        };
        assert!(q.try_receive().unwrap().is_none());
        drop(tx);
        assert!(matches!(q.try_receive(), Err(DeviceError::QueueClosed(n)) if n == "rgb"));
    }
}
