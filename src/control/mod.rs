pub mod command;
pub mod keys;
pub mod session;

pub use command::{
    AntiBandingMode, AutoFocusMode, AwbMode, ControlCommand, DeviceAction, EffectMode, FreqMod,
    MedianFilter, ToFConfig,
};
pub use keys::{action_for, KeyAction};
pub use session::{ControlSession, Cycle, Direction, NumericControl, SelectedControl};
