//! Frame processing core: classification, FPS, capture and the poll loop.

pub mod bayer;
pub mod capture;
pub mod classify;
pub mod colormap;
pub mod fps;
pub mod poll;

pub use capture::{capture_basename, CaptureRequest, CaptureWriter};
pub use classify::{Classified, Classifier, DisplayModes, RawPayload};
pub use fps::FpsWindow;
pub use poll::{Flow, LoopOptions, PollLoop};
