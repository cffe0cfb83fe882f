//! Directives handed to the device

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AutoFocusMode {
    Off,
    Auto,
    Macro,
    ContinuousVideo,
    ContinuousPicture,
    Edof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AwbMode {
    Off,
    Auto,
    Incandescent,
    Fluorescent,
    WarmFluorescent,
    Daylight,
    CloudyDaylight,
    Twilight,
    Shade,
}

impl AwbMode {
    pub const ALL: &'static [AwbMode] = &[
        AwbMode::Off,
        AwbMode::Auto,
        AwbMode::Incandescent,
        AwbMode::Fluorescent,
        AwbMode::WarmFluorescent,
        AwbMode::Daylight,
        AwbMode::CloudyDaylight,
        AwbMode::Twilight,
        AwbMode::Shade,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AntiBandingMode {
    Off,
    Mains50Hz,
    Mains60Hz,
    Auto,
}

impl AntiBandingMode {
    pub const ALL: &'static [AntiBandingMode] = &[
        AntiBandingMode::Off,
        AntiBandingMode::Mains50Hz,
        AntiBandingMode::Mains60Hz,
        AntiBandingMode::Auto,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EffectMode {
    Off,
    Mono,
    Negative,
    Solarize,
    Sepia,
    Posterize,
    Whiteboard,
    Blackboard,
    Aqua,
}

impl EffectMode {
    pub const ALL: &'static [EffectMode] = &[
        EffectMode::Off,
        EffectMode::Mono,
        EffectMode::Negative,
        EffectMode::Solarize,
        EffectMode::Sepia,
        EffectMode::Posterize,
        EffectMode::Whiteboard,
        EffectMode::Blackboard,
        EffectMode::Aqua,
    ];
}

/// Camera control directive, complete in itself
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ControlCommand {
    ManualExposure { exposure_us: u32, iso: u32 },
    ManualFocus { lens_position: u32 },
    AutoFocus { mode: AutoFocusMode, trigger: bool },
    AutoExposureEnable,
    AutoExposureLock(bool),
    AutoExposureCompensation(i32),
    AutoWhiteBalanceLock(bool),
    AutoWhiteBalanceMode(AwbMode),
    AntiBandingMode(AntiBandingMode),
    EffectMode(EffectMode),
    Brightness(i32),
    Contrast(i32),
    Saturation(i32),
    Sharpness(i32),
    LumaDenoise(i32),
    ChromaDenoise(i32),
}

/// ToF modulation frequency selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FreqMod {
    Min,
    Max,
}

impl FreqMod {
    pub fn toggled(self) -> Self {
        match self {
            FreqMod::Min => FreqMod::Max,
            FreqMod::Max => FreqMod::Min,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum MedianFilter {
    Off,
    Kernel3x3,
    Kernel5x5,
    Kernel7x7,
}

impl TryFrom<u8> for MedianFilter {
    type Error = String;

    fn try_from(size: u8) -> Result<Self, Self::Error> {
        match size {
            0 => Ok(MedianFilter::Off),
            3 => Ok(MedianFilter::Kernel3x3),
            5 => Ok(MedianFilter::Kernel5x5),
            7 => Ok(MedianFilter::Kernel7x7),
            other => Err(format!("median kernel must be 0, 3, 5 or 7, got {other}")),
        }
    }
}

impl From<MedianFilter> for u8 {
    fn from(m: MedianFilter) -> u8 {
        match m {
            MedianFilter::Off => 0,
            MedianFilter::Kernel3x3 => 3,
            MedianFilter::Kernel5x5 => 5,
            MedianFilter::Kernel7x7 => 7,
        }
    }
}

/// Full ToF depth configuration; always sent whole, never as a delta
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToFConfig {
    pub freq_mod: FreqMod,
    pub avg_phase_shuffle: bool,
    pub minimum_amplitude: f32,
    pub median: MedianFilter,
}

impl ToFConfig {
    pub const MIN_AMPLITUDE_RANGE: (f32, f32) = (0.0, 50.0);

    pub fn initial(median: MedianFilter) -> Self {
        Self {
            freq_mod: FreqMod::Min,
            avg_phase_shuffle: false,
            minimum_amplitude: 3.0,
            median,
        }
    }
}

/// What a key press asks of the device
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceAction {
    Control(ControlCommand),
    ToF(ToFConfig),
    DotProjector(u32),
    FloodLight(u32),
}
