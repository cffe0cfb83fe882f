//! V4L2 device backend: every capture node is treated as a colour camera on
//! consecutive sockets.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use flume::{Receiver, RecvTimeoutError, Sender, TrySendError};
use tracing::{debug, info, instrument, warn};
use v4l::buffer::Type;
use v4l::capability::Flags;
use v4l::control::{Control, Value};
use v4l::io::traits::CaptureStream;
use v4l::prelude::MmapStream;
use v4l::video::Capture;
use v4l::FourCC;

use super::frame::{Frame, FrameMetadata, PixelFormat};
use super::{
    CameraFeatures, CameraSocket, ControlSinks, Device, DeviceSession, IrDriver, OutputQueue,
    SensorType, StereoCalibration, Stream, StreamKind, StreamPlan,
};
use crate::control::{AntiBandingMode, AutoFocusMode, ControlCommand, ToFConfig};
use crate::error::DeviceError;

const CID_BRIGHTNESS: u32 = 0x0098_0900;
const CID_CONTRAST: u32 = 0x0098_0901;
const CID_SATURATION: u32 = 0x0098_0902;
const CID_AUTO_WHITE_BALANCE: u32 = 0x0098_090c;
const CID_POWER_LINE_FREQUENCY: u32 = 0x0098_0918;
const CID_SHARPNESS: u32 = 0x0098_091b;
const CID_HFLIP: u32 = 0x0098_0914;
const CID_VFLIP: u32 = 0x0098_0915;
const CID_EXPOSURE_AUTO: u32 = 0x009a_0901;
const CID_EXPOSURE_ABSOLUTE: u32 = 0x009a_0902;
const CID_FOCUS_ABSOLUTE: u32 = 0x009a_090a;
const CID_FOCUS_AUTO: u32 = 0x009a_090c;
const CID_ISO_SENSITIVITY: u32 = 0x009a_0917;

const BUFFER_COUNT: u32 = 4;

/// Detected capture node
#[derive(Debug, Clone)]
pub struct FoundDevice {
    pub path: String,
    pub card: String,
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
}

/// Probe `/dev/video0..9` for capture nodes offering MJPEG or YUYV
pub fn auto_detect_devices() -> Vec<FoundDevice> {
    info!("Auto-detecting capture devices...");
    let mut found = Vec::new();

    for i in 0..10 {
        let path = format!("/dev/video{}", i);
        if !Path::new(&path).exists() {
            continue;
        }
        let Ok(dev) = v4l::Device::with_path(&path) else {
            continue;
        };
        let Ok(caps) = dev.query_caps() else { continue };
        if !caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
            continue;
        }
        let Ok(formats) = dev.enum_formats() else { continue };
        let format = formats.iter().find_map(|f| {
            if f.fourcc == FourCC::new(b"MJPG") {
                Some(PixelFormat::Mjpeg)
            } else if f.fourcc == FourCC::new(b"YUYV") {
                Some(PixelFormat::Yuyv4)
            } else {
                None
            }
        });
        let (Some(format), Ok(current)) = (format, dev.format()) else {
            continue;
        };
        info!("Found {:?} device: {} - {}", format, path, caps.card);
        found.push(FoundDevice {
            path,
            card: caps.card,
            format,
            width: current.width,
            height: current.height,
        });
    }
    found
}

pub struct V4l2Device {
    nodes: Vec<FoundDevice>,
    running: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
}

impl V4l2Device {
    /// Use an explicit node, or every detected one when `path` is empty.
    pub fn open(path: &str) -> Result<Self, DeviceError> {
        let mut nodes = auto_detect_devices();
        if !path.is_empty() {
            nodes.retain(|n| n.path == path);
        }
        if nodes.is_empty() {
            return Err(DeviceError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no suitable capture device found",
            )));
        }
        nodes.truncate(CameraSocket::ALL.len());
        Ok(Self {
            nodes,
            running: Arc::new(AtomicBool::new(false)),
            workers: Vec::new(),
        })
    }

    fn node_for(&self, socket: CameraSocket) -> Option<&FoundDevice> {
        CameraSocket::ALL
            .iter()
            .position(|s| *s == socket)
            .and_then(|i| self.nodes.get(i))
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

impl Drop for V4l2Device {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Device for V4l2Device {
    fn connected_cameras(&self) -> Vec<CameraFeatures> {
        self.nodes
            .iter()
            .zip(CameraSocket::ALL)
            .map(|(node, socket)| CameraFeatures {
                socket,
                sensor_name: node.card.clone(),
                width: node.width,
                height: node.height,
                has_autofocus: false,
                supported_types: vec![SensorType::Color],
            })
            .collect()
    }

    fn calibration(&self) -> Result<StereoCalibration, DeviceError> {
        Err(DeviceError::StereoUnavailable(
            "V4L2 nodes carry no stereo calibration".into(),
        ))
    }

    #[instrument(skip(self, plan), fields(streams = plan.streams.len()))]
    fn start(&mut self, plan: &StreamPlan, queue_depth: usize) -> Result<DeviceSession, DeviceError> {
        if let Some(path) = &plan.camera_tuning {
            warn!("Camera tuning is not supported over V4L2, {} ignored", path.display());
        }
        if let Some(fps) = plan.isp3a_fps {
            warn!("3A rate is fixed by the driver, {} fps ignored", fps);
        }
        self.stop();
        self.running.store(true, Ordering::SeqCst);
        let epoch = Instant::now();

        let mut outputs = Vec::new();
        for stream in &plan.streams {
            if stream.kind != StreamKind::Color {
                warn!("{}: {:?} streams are not available over V4L2", stream.name, stream.kind);
                continue;
            }
            let node = self
                .node_for(stream.socket)
                .ok_or(DeviceError::NotConnected(stream.socket))?
                .clone();
            let (tx, rx) = flume::bounded(queue_depth.max(1));
            outputs.push(OutputQueue {
                name: stream.name.clone(),
                rx,
            });
            let running = Arc::clone(&self.running);
            let stream = stream.clone();
            let handle = thread::Builder::new()
                .name(format!("v4l2-{}", stream.name))
                .spawn(move || {
                    if let Err(e) = capture_loop(&node, &stream, tx, running, epoch) {
                        warn!("{}: capture stopped: {}", stream.name, e);
                    }
                })?;
            self.workers.push(handle);
        }

        let (control_tx, control_rx) = flume::bounded(16);
        let (tof_tx, tof_rx) = flume::bounded(4);
        let paths: Vec<String> = self.nodes.iter().map(|n| n.path.clone()).collect();
        let running = Arc::clone(&self.running);
        let handle = thread::Builder::new()
            .name("v4l2-control".into())
            .spawn(move || control_loop(&paths, control_rx, tof_rx, running))?;
        self.workers.push(handle);

        Ok(DeviceSession {
            outputs,
            sinks: ControlSinks {
                control: control_tx,
                tof_config: tof_tx,
            },
            ir: Box::new(NoIr),
        })
    }
}

fn capture_loop(
    node: &FoundDevice,
    stream: &Stream,
    tx: Sender<Frame>,
    running: Arc<AtomicBool>,
    epoch: Instant,
) -> Result<(), DeviceError> {
    let dev = v4l::Device::with_path(&node.path)?;
    let mut fmt = dev.format()?;
    fmt.width = stream.width;
    fmt.height = stream.height;
    fmt.fourcc = match node.format {
        PixelFormat::Mjpeg => FourCC::new(b"MJPG"),
        _ => FourCC::new(b"YUYV"),
    };
    let fmt = dev.set_format(&fmt)?;
    for ctrl in orientation_controls(stream.rotated) {
        if let Err(e) = dev.set_control(ctrl) {
            warn!("{}: cannot set orientation: {}", stream.name, e);
        }
    }
    info!(
        "{}: capturing {}x{} {} from {}",
        stream.name, fmt.width, fmt.height, fmt.fourcc, node.path
    );

    let mut mmap = MmapStream::with_buffers(&dev, Type::VideoCapture, BUFFER_COUNT)?;
    let mut sequence = 0u64;
    while running.load(Ordering::SeqCst) {
        let (buf, meta) = mmap.next()?;
        let device_timestamp = Duration::from_secs(meta.timestamp.sec.max(0) as u64)
            + Duration::from_micros(meta.timestamp.usec.max(0) as u64);
        let frame = Frame::new(
            bytes::Bytes::copy_from_slice(&buf[..meta.bytesused as usize]),
            FrameMetadata {
                stream: stream.name.clone(),
                sequence,
                width: fmt.width,
                height: fmt.height,
                format: node.format,
                device_timestamp: if device_timestamp.is_zero() {
                    epoch.elapsed()
                } else {
                    device_timestamp
                },
                exposure: Duration::ZERO,
                sensitivity_iso: 0,
                lens_position: 0,
                color_temperature_k: 0,
            },
        );
        sequence += 1;
        match tx.try_send(frame) {
            Ok(()) | Err(TrySendError::Full(_)) => {}
            Err(TrySendError::Disconnected(_)) => break,
        }
    }
    Ok(())
}

/// 180 degrees is a horizontal plus a vertical flip
fn orientation_controls(rotated: bool) -> [Control; 2] {
    let flip = Value::Boolean(rotated);
    [
        Control {
            id: CID_HFLIP,
            value: flip.clone(),
        },
        Control {
            id: CID_VFLIP,
            value: flip,
        },
    ]
}

/// V4L2 control writes for one command; empty when nothing maps
fn v4l2_controls(cmd: &ControlCommand) -> Vec<Control> {
    let int = |id, v: i64| Control {
        id,
        value: Value::Integer(v),
    };
    match *cmd {
        ControlCommand::ManualExposure { exposure_us, iso } => vec![
            // manual mode
            int(CID_EXPOSURE_AUTO, 1),
            // 100 µs units
            int(CID_EXPOSURE_ABSOLUTE, (exposure_us / 100).max(1) as i64),
            int(CID_ISO_SENSITIVITY, iso as i64),
        ],
        ControlCommand::ManualFocus { lens_position } => vec![
            int(CID_FOCUS_AUTO, 0),
            int(CID_FOCUS_ABSOLUTE, lens_position as i64),
        ],
        ControlCommand::AutoFocus { mode, .. } => {
            vec![int(CID_FOCUS_AUTO, (mode != AutoFocusMode::Off) as i64)]
        }
        ControlCommand::AutoExposureEnable => vec![int(CID_EXPOSURE_AUTO, 3)],
        ControlCommand::AutoWhiteBalanceLock(lock) => vec![int(CID_AUTO_WHITE_BALANCE, (!lock) as i64)],
        ControlCommand::AntiBandingMode(mode) => vec![int(
            CID_POWER_LINE_FREQUENCY,
            match mode {
                AntiBandingMode::Off => 0,
                AntiBandingMode::Mains50Hz => 1,
                AntiBandingMode::Mains60Hz => 2,
                AntiBandingMode::Auto => 3,
            },
        )],
        ControlCommand::Brightness(v) => vec![int(CID_BRIGHTNESS, v as i64)],
        ControlCommand::Contrast(v) => vec![int(CID_CONTRAST, v as i64)],
        ControlCommand::Saturation(v) => vec![int(CID_SATURATION, v as i64)],
        ControlCommand::Sharpness(v) => vec![int(CID_SHARPNESS, v as i64)],
        _ => Vec::new(),
    }
}

fn control_loop(
    paths: &[String],
    control: Receiver<ControlCommand>,
    tof: Receiver<ToFConfig>,
    running: Arc<AtomicBool>,
) {
    let devices: Vec<v4l::Device> = paths
        .iter()
        .filter_map(|p| v4l::Device::with_path(p).ok())
        .collect();
    while running.load(Ordering::SeqCst) {
        match control.recv_timeout(Duration::from_millis(50)) {
            Ok(cmd) => {
                let writes = v4l2_controls(&cmd);
                if writes.is_empty() {
                    info!("{:?} has no V4L2 equivalent, ignored", cmd);
                }
                for dev in &devices {
                    for ctrl in &writes {
                        if let Err(e) = dev.set_control(ctrl.clone()) {
                            debug!("control {:#x} rejected: {}", ctrl.id, e);
                        }
                    }
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        while tof.try_recv().is_ok() {
            info!("ToF configuration is not supported over V4L2");
        }
    }
}

struct NoIr;

impl IrDriver for NoIr {
    fn set_dot_projector(&self, milliamps: u32) -> Result<(), DeviceError> {
        info!("No IR dot projector on V4L2 devices ({} mA ignored)", milliamps);
        Ok(())
    }

    fn set_flood_light(&self, milliamps: u32) -> Result<(), DeviceError> {
        info!("No IR flood light on V4L2 devices ({} mA ignored)", milliamps);
        Ok(())
    }
}
