//! Error taxonomy of the harness core.
//!
//! Only [`DeviceError::QueueClosed`] is fatal to the poll loop; every other
//! variant is logged where it happens and the loop keeps running.

use std::path::PathBuf;

use thiserror::Error;

use crate::device::CameraSocket;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("output queue '{0}' disconnected")]
    QueueClosed(String),

    #[error("input queue '{0}' disconnected")]
    SinkClosed(&'static str),

    #[error("stereo depth unavailable: {0}")]
    StereoUnavailable(String),

    #[error("camera socket {0} is not connected")]
    NotConnected(CameraSocket),

    #[error("invalid camera selection '{0}': {1}")]
    InvalidSelection(String, &'static str),

    #[error("camera tuning database {} is not readable", .0.display())]
    TuningUnreadable(PathBuf),

    #[error("device I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("payload of {actual} bytes is shorter than the {expected} bytes a {width}x{height} frame needs")]
    ShortPayload {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("{0:?} payload cannot be displayed")]
    UnsupportedFormat(crate::device::PixelFormat),

    #[error("jpeg decode failed: {0}")]
    Jpeg(#[from] jpeg_decoder::Error),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ControlError {
    #[error("select a control first using keys 3..9 0 [ ] p")]
    NoControlSelected,

    #[error("no ToF camera in the pipeline")]
    NoToF,
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}
