//! Simulated multi-camera device
//!
//! Produces test patterns for every stream in a plan on one generator thread
//! per stream, and feeds manual exposure/focus commands back into the
//! metadata of later frames.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use flume::{Receiver, RecvTimeoutError, Sender, TrySendError};
use tracing::{debug, info, instrument, warn};

use super::frame::{Frame, FrameMetadata, PixelFormat};
use super::{
    CameraFeatures, CameraSocket, ControlSinks, Device, DeviceSession, IrDriver, OutputQueue,
    SensorType, StereoCalibration, Stream, StreamKind, StreamPlan,
};
use crate::control::{ControlCommand, ToFConfig};
use crate::error::DeviceError;

/// Sensor state the control thread mutates and generators read
#[derive(Debug, Clone, Copy)]
struct SensorState {
    exposure_us: u32,
    iso: u32,
    lens_position: u32,
    color_temperature_k: u32,
}

impl Default for SensorState {
    fn default() -> Self {
        Self {
            exposure_us: 20_000,
            iso: 800,
            lens_position: 150,
            color_temperature_k: 5000,
        }
    }
}

pub struct SyntheticDevice {
    cameras: Vec<CameraFeatures>,
    calibration: Option<StereoCalibration>,
    running: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
}

impl Default for SyntheticDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl SyntheticDevice {
    /// OAK-D style board: colour centre camera and a calibrated mono pair
    pub fn new() -> Self {
        let mono = |socket| CameraFeatures {
            socket,
            sensor_name: "OV9282".into(),
            width: 1280,
            height: 800,
            has_autofocus: false,
            supported_types: vec![SensorType::Mono],
        };
        Self::with_cameras(
            vec![
                CameraFeatures {
                    socket: CameraSocket::CamA,
                    sensor_name: "IMX378".into(),
                    width: 4056,
                    height: 3040,
                    has_autofocus: true,
                    supported_types: vec![SensorType::Color],
                },
                mono(CameraSocket::CamB),
                mono(CameraSocket::CamC),
            ],
            Some(StereoCalibration {
                left: CameraSocket::CamB,
                right: CameraSocket::CamC,
            }),
        )
    }

    pub fn with_cameras(cameras: Vec<CameraFeatures>, calibration: Option<StereoCalibration>) -> Self {
        Self {
            cameras,
            calibration,
            running: Arc::new(AtomicBool::new(false)),
            workers: Vec::new(),
        }
    }

    /// Add a ToF module on `socket`
    pub fn with_tof(mut self, socket: CameraSocket) -> Self {
        self.cameras.retain(|c| c.socket != socket);
        self.cameras.push(CameraFeatures {
            socket,
            sensor_name: "33D".into(),
            width: 640,
            height: 480,
            has_autofocus: false,
            supported_types: vec![SensorType::Tof],
        });
        self
    }

    #[instrument(skip(self))]
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

impl Drop for SyntheticDevice {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Device for SyntheticDevice {
    fn connected_cameras(&self) -> Vec<CameraFeatures> {
        self.cameras.clone()
    }

    fn calibration(&self) -> Result<StereoCalibration, DeviceError> {
        self.calibration
            .ok_or_else(|| DeviceError::StereoUnavailable("no calibration in EEPROM".into()))
    }

    #[instrument(skip(self, plan), fields(streams = plan.streams.len()))]
    fn start(&mut self, plan: &StreamPlan, queue_depth: usize) -> Result<DeviceSession, DeviceError> {
        if let Some(path) = &plan.camera_tuning {
            if !path.is_file() {
                return Err(DeviceError::TuningUnreadable(path.clone()));
            }
            info!("Loading camera tuning from {}", path.display());
        }

        self.stop();
        self.running.store(true, Ordering::SeqCst);

        let state = Arc::new(Mutex::new(SensorState::default()));
        let epoch = Instant::now();
        let period = Duration::from_secs_f32(1.0 / plan.fps.max(1.0));

        let mut outputs = Vec::with_capacity(plan.streams.len());
        for stream in &plan.streams {
            let (tx, rx) = flume::bounded(queue_depth.max(1));
            outputs.push(OutputQueue {
                name: stream.name.clone(),
                rx,
            });
            let generator = Generator {
                stream: stream.clone(),
                tx,
                state: Arc::clone(&state),
                running: Arc::clone(&self.running),
                epoch,
                period,
            };
            let handle = thread::Builder::new()
                .name(format!("gen-{}", stream.name))
                .spawn(move || generator.run())?;
            self.workers.push(handle);
        }

        // 3A settles control changes once per tick
        let tick = match plan.isp3a_fps {
            Some(fps) => {
                info!("3A running at {} fps", fps);
                Duration::from_secs_f32(1.0 / fps.max(1) as f32)
            }
            None => Duration::from_millis(50),
        };
        let (control_tx, control_rx) = flume::bounded(16);
        let (tof_tx, tof_rx) = flume::bounded(4);
        let running = Arc::clone(&self.running);
        let handle = thread::Builder::new()
            .name("synthetic-control".into())
            .spawn(move || control_loop(control_rx, tof_rx, state, running, tick))?;
        self.workers.push(handle);

        info!("Synthetic pipeline started with {} streams", outputs.len());
        Ok(DeviceSession {
            outputs,
            sinks: ControlSinks {
                control: control_tx,
                tof_config: tof_tx,
            },
            ir: Box::new(SyntheticIr),
        })
    }
}

struct SyntheticIr;

impl IrDriver for SyntheticIr {
    fn set_dot_projector(&self, milliamps: u32) -> Result<(), DeviceError> {
        info!("IR dot projector set to {} mA", milliamps);
        Ok(())
    }

    fn set_flood_light(&self, milliamps: u32) -> Result<(), DeviceError> {
        info!("IR flood light set to {} mA", milliamps);
        Ok(())
    }
}

fn control_loop(
    control: Receiver<ControlCommand>,
    tof: Receiver<ToFConfig>,
    state: Arc<Mutex<SensorState>>,
    running: Arc<AtomicBool>,
    tick: Duration,
) {
    while running.load(Ordering::SeqCst) {
        match control.recv_timeout(tick) {
            Ok(cmd) => {
                debug!(?cmd, "control received");
                let Ok(mut s) = state.lock() else { break };
                match cmd {
                    ControlCommand::ManualExposure { exposure_us, iso } => {
                        s.exposure_us = exposure_us;
                        s.iso = iso;
                    }
                    ControlCommand::ManualFocus { lens_position } => s.lens_position = lens_position,
                    ControlCommand::AutoWhiteBalanceMode(_) => {
                        s.color_temperature_k = 2800 + (s.color_temperature_k + 700) % 4200;
                    }
                    _ => {}
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        while let Ok(cfg) = tof.try_recv() {
            debug!(?cfg, "ToF config received");
        }
    }
}

struct Generator {
    stream: Stream,
    tx: Sender<Frame>,
    state: Arc<Mutex<SensorState>>,
    running: Arc<AtomicBool>,
    epoch: Instant,
    period: Duration,
}

impl Generator {
    fn run(self) {
        let mut sequence = 0u64;
        let mut dropped = 0u64;
        while self.running.load(Ordering::SeqCst) {
            let started = Instant::now();
            let Ok(sensor) = self.state.lock().map(|s| *s) else {
                break;
            };
            let device_timestamp = self.epoch.elapsed();
            let (format, mut data) = pattern(&self.stream, sequence);
            if self.stream.rotated {
                rotate_180(format, &mut data, self.stream.width, self.stream.height);
            }
            let frame = Frame::new(
                data,
                FrameMetadata {
                    stream: self.stream.name.clone(),
                    sequence,
                    width: self.stream.width,
                    height: self.stream.height,
                    format,
                    device_timestamp,
                    exposure: Duration::from_micros(sensor.exposure_us as u64),
                    sensitivity_iso: sensor.iso,
                    lens_position: sensor.lens_position,
                    color_temperature_k: sensor.color_temperature_k,
                },
            );
            match self.tx.try_send(frame) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => dropped += 1,
                Err(TrySendError::Disconnected(_)) => break,
            }
            sequence += 1;
            if let Some(rest) = self.period.checked_sub(started.elapsed()) {
                thread::sleep(rest);
            }
        }
        if dropped > 0 {
            warn!("{}: dropped {} frames on a full queue", self.stream.name, dropped);
        }
    }
}

/// Moving test pattern for one frame of `stream`
fn pattern(stream: &Stream, sequence: u64) -> (PixelFormat, Vec<u8>) {
    let (w, h) = (stream.width as usize, stream.height as usize);
    let shift = (sequence * 4) as usize;
    match stream.kind {
        StreamKind::Color => {
            let mut data = Vec::with_capacity(w * h * 3 / 2);
            for y in 0..h {
                data.extend((0..w).map(|x| ((x + y + shift) & 0xff) as u8));
            }
            for y in 0..h.div_ceil(2) {
                data.extend(
                    (0..w.div_ceil(2)).flat_map(|x| [(x * 2 & 0xff) as u8, (y * 2 & 0xff) as u8]),
                );
            }
            (PixelFormat::Nv12, data)
        }
        StreamKind::Mono => {
            let data = (0..h)
                .flat_map(|y| (0..w).map(move |x| ((x + shift) ^ y) as u8))
                .collect();
            (PixelFormat::Gray8, data)
        }
        StreamKind::RawBayer | StreamKind::RawMono => {
            let data = (0..h)
                .flat_map(|y| (0..w).map(move |x| (((x + shift) * 1023 / w.max(1)) as u16 ^ (y as u16 & 0x3f)) & 0x3ff))
                .flat_map(u16::to_le_bytes)
                .collect();
            (PixelFormat::Raw10, data)
        }
        StreamKind::ToFAmplitude => {
            let data = (0..w * h)
                .map(|i| ((i + shift) % 4096) as u16)
                .flat_map(u16::to_le_bytes)
                .collect();
            (PixelFormat::Raw12, data)
        }
        StreamKind::ToFDepth | StreamKind::StereoDepth => {
            // Depth in mm rising left to right, with an invalid band at the border
            let data = (0..h)
                .flat_map(|y| {
                    (0..w).map(move |x| {
                        if x < w / 16 || y < h / 32 {
                            0u16
                        } else {
                            (300 + ((x + shift) % w) * 4000 / w.max(1) + y) as u16
                        }
                    })
                })
                .flat_map(u16::to_le_bytes)
                .collect();
            (PixelFormat::Depth16, data)
        }
    }
}

/// Turn a row-major payload upside down in place. Planes are reversed in
/// units of one sample, NV12 chroma in units of one UV pair.
fn rotate_180(format: PixelFormat, data: &mut [u8], width: u32, height: u32) {
    let px = width as usize * height as usize;
    match format {
        PixelFormat::Nv12 => {
            let (luma, chroma) = data.split_at_mut(px.min(data.len()));
            luma.reverse();
            reverse_units(chroma, 2);
        }
        PixelFormat::Gray8 | PixelFormat::Raw8 => data.reverse(),
        PixelFormat::Raw10 | PixelFormat::Raw12 | PixelFormat::Raw16 | PixelFormat::Depth16 => {
            reverse_units(data, 2)
        }
        PixelFormat::Bgr24 => reverse_units(data, 3),
        other => debug!(?other, "rotation not simulated"),
    }
}

fn reverse_units(data: &mut [u8], unit: usize) {
    let n = data.len() / unit;
    for i in 0..n / 2 {
        let j = n - 1 - i;
        for k in 0..unit {
            data.swap(i * unit + k, j * unit + k);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::plan::PlanOptions;
    use crate::device::FrameSource;

    #[test]
    fn patterns_have_full_length() {
        for kind in [
            StreamKind::Color,
            StreamKind::Mono,
            StreamKind::RawBayer,
            StreamKind::ToFAmplitude,
            StreamKind::StereoDepth,
        ] {
            let stream = Stream {
                name: "s".into(),
                kind,
                socket: CameraSocket::CamA,
                sensor_name: "X".into(),
                width: 63,
                height: 47,
                rotated: false,
            };
            let (format, data) = pattern(&stream, 3);
            assert_eq!(Some(data.len()), format.frame_len(63, 47), "{kind:?}");
        }
    }

    #[test]
    fn rotation_turns_the_pattern_around() {
        let stream = Stream {
            name: "left".into(),
            kind: StreamKind::RawMono,
            socket: CameraSocket::CamB,
            sensor_name: "OV9282".into(),
            width: 4,
            height: 2,
            rotated: true,
        };
        let (format, upright) = pattern(&stream, 1);
        let mut turned = upright.clone();
        rotate_180(format, &mut turned, 4, 2);

        let samples = |d: &[u8]| -> Vec<u16> {
            d.chunks_exact(2).map(|b| u16::from_le_bytes([b[0], b[1]])).collect()
        };
        let mut expected = samples(&upright);
        expected.reverse();
        assert_eq!(samples(&turned), expected);
    }

    #[test]
    fn rotated_nv12_keeps_chroma_pairs() {
        // 2x2 luma, one UV pair per block, two blocks side by side
        let mut data = vec![1, 2, 3, 4, 5, 6, 7, 8, 10, 11, 20, 21];
        rotate_180(PixelFormat::Nv12, &mut data, 4, 2);
        assert_eq!(data, vec![8, 7, 6, 5, 4, 3, 2, 1, 20, 21, 10, 11]);
    }

    #[test]
    fn missing_tuning_file_refuses_to_start() {
        let mut dev = SyntheticDevice::new();
        let sel = vec!["rgb,c".parse().unwrap()];
        let opts = PlanOptions {
            camera_tuning: Some("/nonexistent/tuning.bin".into()),
            ..Default::default()
        };
        let plan = StreamPlan::build(&sel, &dev.connected_cameras(), dev.calibration(), &opts, 30.0)
            .unwrap();
        assert!(matches!(
            dev.start(&plan, 4),
            Err(DeviceError::TuningUnreadable(_))
        ));
    }

    #[test]
    fn started_device_delivers_frames() {
        let mut dev = SyntheticDevice::new();
        let sel = vec!["left,m".parse().unwrap()];
        let opts = PlanOptions {
            mono_resolution: 400,
            no_stereo: true,
            rotate: crate::device::plan::Rotation::Mono,
            isp3a_fps: Some(15),
            ..Default::default()
        };
        let plan = StreamPlan::build(&sel, &dev.connected_cameras(), dev.calibration(), &opts, 60.0)
            .unwrap();
        let session = dev.start(&plan, 4).unwrap();
        let deadline = Instant::now() + Duration::from_secs(2);
        let frame = loop {
            if let Some(f) = session.outputs[0].try_receive().unwrap() {
                break f;
            }
            assert!(Instant::now() < deadline, "no frame within 2s");
            thread::sleep(Duration::from_millis(5));
        };
        assert_eq!(frame.meta.stream, "left");
        assert_eq!((frame.meta.width, frame.meta.height), (640, 400));
        dev.stop();
    }
}
