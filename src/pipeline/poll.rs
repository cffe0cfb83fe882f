//! Poll Loop
//!
//! Single-threaded and cooperative. Each step pulls at most one frame per
//! stream, then reads at most one key. All mutable state (control session,
//! capture request, FPS windows) lives here and is touched only by the
//! thread running the loop.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, instrument, warn};

use super::capture::{capture_basename, CaptureRequest, CaptureWriter};
use super::classify::{Classified, Classifier, DisplayModes};
use super::fps::{FpsWindow, DEFAULT_WINDOW};
use crate::control::{action_for, ControlSession, DeviceAction, KeyAction};
use crate::device::{
    ControlSinks, DeviceSession, Frame, FrameSource, IrDriver, OutputQueue, Stream, StreamPlan,
};
use crate::display::DisplaySurface;
use crate::error::DeviceError;
use crate::utils::capture_time_tag;

const IDLE_SLEEP: Duration = Duration::from_millis(1);

#[derive(Debug, Clone)]
pub struct LoopOptions {
    pub modes: DisplayModes,
    pub output_dir: PathBuf,
    pub fps_window: usize,
    pub status_interval: Duration,
}

impl Default for LoopOptions {
    fn default() -> Self {
        Self {
            modes: DisplayModes::default(),
            output_dir: PathBuf::from("."),
            fps_window: DEFAULT_WINDOW,
            status_interval: Duration::from_secs(1),
        }
    }
}

/// What the caller should do after a step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

struct StreamSlot {
    stream: Stream,
    queue: OutputQueue,
    host_fps: FpsWindow,
    capture_fps: FpsWindow,
}

pub struct PollLoop<D: DisplaySurface> {
    slots: Vec<StreamSlot>,
    session: ControlSession,
    capture: CaptureRequest,
    writer: CaptureWriter,
    classifier: Classifier,
    display: D,
    sinks: ControlSinks,
    ir: Box<dyn IrDriver>,
    print_settings: bool,
    frames_last_step: usize,
    status_interval: Duration,
    last_status: Instant,
}

impl<D: DisplaySurface> PollLoop<D> {
    /// Pair each device output with its stream in `plan`. Outputs the plan
    /// does not know about are ignored.
    pub fn new(plan: &StreamPlan, device: DeviceSession, display: D, opts: LoopOptions) -> Self {
        let DeviceSession { outputs, sinks, ir } = device;
        let window = opts.fps_window.max(2);
        let slots = outputs
            .into_iter()
            .filter_map(|queue| match plan.stream(&queue.name) {
                Some(stream) => Some(StreamSlot {
                    stream: stream.clone(),
                    queue,
                    host_fps: FpsWindow::new(window),
                    capture_fps: FpsWindow::new(window),
                }),
                None => {
                    warn!("output '{}' is not part of the stream plan, ignored", queue.name);
                    None
                }
            })
            .collect();

        Self {
            slots,
            session: ControlSession::new(plan.tof),
            capture: CaptureRequest::default(),
            writer: CaptureWriter::new(opts.output_dir),
            classifier: Classifier::new(opts.modes),
            display,
            sinks,
            ir,
            print_settings: false,
            frames_last_step: 0,
            status_interval: opts.status_interval,
            last_status: Instant::now(),
        }
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn display_mut(&mut self) -> &mut D {
        &mut self.display
    }

    pub fn session(&self) -> &ControlSession {
        &self.session
    }

    pub fn capture_request(&self) -> &CaptureRequest {
        &self.capture
    }

    pub fn print_settings(&self) -> bool {
        self.print_settings
    }

    /// Host and capture rates of `stream`
    pub fn fps(&self, stream: &str) -> Option<(f64, f64)> {
        self.slots
            .iter()
            .find(|s| s.stream.name == stream)
            .map(|s| (s.host_fps.get(), s.capture_fps.get()))
    }

    /// Arm a capture of every active stream under `tag`.
    pub fn arm_capture(&mut self, tag: impl Into<String>) {
        let names: Vec<String> = self.slots.iter().map(|s| s.stream.name.clone()).collect();
        self.capture.arm(names, tag);
    }

    /// One iteration. Only a dead device queue or control sink is an error.
    pub fn step(&mut self) -> Result<Flow, DeviceError> {
        self.frames_last_step = 0;
        for i in 0..self.slots.len() {
            if let Some(frame) = self.slots[i].queue.try_receive()? {
                self.frames_last_step += 1;
                self.process_frame(i, frame);
            }
        }

        match self.display.poll_key() {
            Ok(Some(key)) => self.handle_key(key),
            Ok(None) => Ok(Flow::Continue),
            Err(e) => {
                warn!("Reading input failed: {}", e);
                Ok(Flow::Continue)
            }
        }
    }

    /// Step until quit, a fatal device error, or `shutdown` is raised.
    #[instrument(skip_all)]
    pub fn run(&mut self, shutdown: &AtomicBool) -> Result<(), DeviceError> {
        info!("Poll loop running with {} streams", self.slots.len());
        while !shutdown.load(Ordering::SeqCst) {
            if self.step()? == Flow::Quit {
                info!("Quit requested");
                return Ok(());
            }
            if self.last_status.elapsed() >= self.status_interval {
                self.report_status();
            }
            if self.frames_last_step == 0 {
                thread::sleep(IDLE_SLEEP);
            }
        }
        info!("Interrupted, shutting down");
        Ok(())
    }

    fn process_frame(&mut self, index: usize, frame: Frame) {
        let slot = &mut self.slots[index];
        let name = slot.stream.name.as_str();
        metrics::counter!("frames_received", "stream" => name.to_string()).increment(1);

        slot.host_fps.update();
        slot.capture_fps
            .update_at(frame.meta.device_timestamp.as_secs_f64());

        if self.print_settings {
            let m = &frame.meta;
            info!(
                "[{}] seq {}: exposure {:.3} ms, iso {}, lens {}, {} K",
                name,
                m.sequence,
                m.exposure.as_secs_f64() * 1000.0,
                m.sensitivity_iso,
                m.lens_position,
                m.color_temperature_k
            );
        }

        let armed = self.capture.is_armed(name);
        let classified = match self.classifier.classify(&frame, slot.stream.kind, armed) {
            Ok(c) => c,
            Err(e) => {
                warn!("{}: frame {} dropped: {}", name, frame.meta.sequence, e);
                metrics::counter!("frames_skipped").increment(1);
                return;
            }
        };
        let Classified::Ready { display, archive } = classified else {
            debug!("{}: frame {} has nothing to show", name, frame.meta.sequence);
            metrics::counter!("frames_skipped").increment(1);
            return;
        };

        if let Some(tag) = self.capture.take(name) {
            let basename = capture_basename(name, &slot.stream.sensor_name, &frame.meta, tag);
            if let Some(payload) = &archive {
                if let Err(e) = self.writer.write_payload(&basename, payload) {
                    error!("{}", e);
                }
            }
            if let Err(e) = self.writer.write_png(&basename, &display) {
                error!("{}", e);
            }
        }

        if let Err(e) = self.display.show(name, &display) {
            warn!("{}: display failed: {}", name, e);
        }
    }

    fn handle_key(&mut self, key: char) -> Result<Flow, DeviceError> {
        let Some(action) = action_for(key) else {
            debug!("Unbound key {:?}", key);
            return Ok(Flow::Continue);
        };
        match action {
            KeyAction::Quit => return Ok(Flow::Quit),
            KeyAction::ToggleSettingsPrint => {
                self.print_settings = !self.print_settings;
                info!("Printing camera settings: {}", self.print_settings);
            }
            KeyAction::Capture => self.arm_capture(capture_time_tag()),
            other => match self.session.handle(other) {
                Ok(Some(directive)) => self.dispatch(directive)?,
                Ok(None) => {}
                Err(e) => warn!("{}", e),
            },
        }
        Ok(Flow::Continue)
    }

    fn dispatch(&self, directive: DeviceAction) -> Result<(), DeviceError> {
        match directive {
            DeviceAction::Control(cmd) => self.sinks.send_control(cmd)?,
            DeviceAction::ToF(cfg) => self.sinks.send_tof_config(cfg)?,
            DeviceAction::DotProjector(ma) => {
                if let Err(e) = self.ir.set_dot_projector(ma) {
                    warn!("Dot projector: {}", e);
                }
            }
            DeviceAction::FloodLight(ma) => {
                if let Err(e) = self.ir.set_flood_light(ma) {
                    warn!("Flood light: {}", e);
                }
            }
        }
        Ok(())
    }

    fn report_status(&mut self) {
        self.last_status = Instant::now();
        let line = self
            .slots
            .iter()
            .map(|s| {
                let (host, capture) = (s.host_fps.get(), s.capture_fps.get());
                metrics::gauge!("fps_host", "stream" => s.stream.name.clone()).set(host);
                metrics::gauge!("fps_capture", "stream" => s.stream.name.clone()).set(capture);
                format!("{} {:6.2}|{:6.2}", s.stream.name, host, capture)
            })
            .collect::<Vec<_>>()
            .join("  ");
        info!("FPS: {}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{CameraSocket, FrameMetadata, PixelFormat, StreamKind};
    use crate::display::headless::HeadlessDisplay;
    use flume::Sender;

    struct NullIr;

    impl IrDriver for NullIr {
        fn set_dot_projector(&self, _: u32) -> Result<(), DeviceError> {
            Ok(())
        }
        fn set_flood_light(&self, _: u32) -> Result<(), DeviceError> {
            Ok(())
        }
    }

    fn mono_plan() -> StreamPlan {
        StreamPlan {
            cameras: Vec::new(),
            streams: vec![Stream {
                name: "left".into(),
                kind: StreamKind::Mono,
                socket: CameraSocket::CamB,
                sensor_name: "OV9282".into(),
                width: 2,
                height: 2,
                rotated: false,
            }],
            tof: None,
            fps: 30.0,
            isp3a_fps: None,
            camera_tuning: None,
        }
    }

    fn frame(seq: u64, ts: f64) -> Frame {
        Frame::new(
            vec![1u8, 2, 3, 4],
            FrameMetadata {
                stream: "left".into(),
                sequence: seq,
                width: 2,
                height: 2,
                format: PixelFormat::Gray8,
                device_timestamp: Duration::from_secs_f64(ts),
                exposure: Duration::from_micros(20_000),
                sensitivity_iso: 800,
                lens_position: 0,
                color_temperature_k: 0,
            },
        )
    }

    fn setup() -> (PollLoop<HeadlessDisplay>, Sender<Frame>, Sender<char>) {
        let (frame_tx, frame_rx) = flume::bounded(4);
        let (ctl_tx, _ctl_rx) = flume::bounded(4);
        let (tof_tx, _tof_rx) = flume::bounded(4);
        let (key_tx, key_rx) = flume::unbounded();
        let device = DeviceSession {
            outputs: vec![OutputQueue {
                name: "left".into(),
                rx: frame_rx,
            }],
            sinks: ControlSinks {
                control: ctl_tx,
                tof_config: tof_tx,
            },
            ir: Box::new(NullIr),
        };
        let lp = PollLoop::new(
            &mono_plan(),
            device,
            HeadlessDisplay::with_keys(key_rx),
            LoopOptions::default(),
        );
        (lp, frame_tx, key_tx)
    }

    #[test]
    fn capture_fps_follows_device_clock() {
        let (mut lp, frames, _keys) = setup();
        for (seq, ts) in [(0, 10.0), (1, 10.1), (2, 10.2)] {
            frames.send(frame(seq, ts)).unwrap();
            lp.step().unwrap();
        }
        let (_, capture) = lp.fps("left").unwrap();
        assert!((capture - 10.0).abs() < 1e-6, "{capture}");
        assert_eq!(lp.display().shown("left"), 3);
    }

    #[test]
    fn settings_toggle_and_quit() {
        let (mut lp, _frames, keys) = setup();
        keys.send('/').unwrap();
        assert_eq!(lp.step().unwrap(), Flow::Continue);
        assert!(lp.print_settings());
        keys.send('q').unwrap();
        assert_eq!(lp.step().unwrap(), Flow::Quit);
    }

    #[test]
    fn shutdown_flag_stops_run() {
        let (mut lp, _frames, _keys) = setup();
        let stop = AtomicBool::new(true);
        assert!(lp.run(&stop).is_ok());
    }
}
