//! Interactive control state machine

use tracing::info;

use super::command::{
    AntiBandingMode, AutoFocusMode, AwbMode, ControlCommand, DeviceAction, EffectMode, ToFConfig,
};
use super::keys::KeyAction;
use crate::error::ControlError;
use crate::utils::clamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn sign(self) -> i32 {
        match self {
            Direction::Up => 1,
            Direction::Down => -1,
        }
    }
}

/// Target of the `+`/`-` keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectedControl {
    #[default]
    None,
    AwbMode,
    AeCompensation,
    AntiBanding,
    Effect,
    Brightness,
    Contrast,
    Saturation,
    Sharpness,
    LumaDenoise,
    ChromaDenoise,
    ToFMinAmplitude,
}

/// Bounded integer setting; every mutation clamps into `[min, max]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumericControl {
    value: i32,
    min: i32,
    max: i32,
    step: i32,
}

impl NumericControl {
    pub const fn new(value: i32, min: i32, max: i32, step: i32) -> Self {
        Self {
            value,
            min,
            max,
            step,
        }
    }

    pub fn value(&self) -> i32 {
        self.value
    }

    pub fn range(&self) -> (i32, i32) {
        (self.min, self.max)
    }

    pub fn adjust(&mut self, dir: Direction) -> i32 {
        self.value = clamp(
            self.value.saturating_add(dir.sign() * self.step),
            self.min,
            self.max,
        );
        self.value
    }
}

/// Forward-only cursor over a fixed ordered set
#[derive(Debug, Clone, Copy)]
pub struct Cycle<T: 'static> {
    items: &'static [T],
    next: usize,
}

impl<T: Copy> Cycle<T> {
    pub const fn new(items: &'static [T]) -> Self {
        Self { items, next: 0 }
    }

    /// Yield the element under the cursor and step past it, wrapping at the end.
    pub fn advance(&mut self) -> T {
        let item = self.items[self.next];
        self.next = (self.next + 1) % self.items.len();
        item
    }

    /// Index of the element the next advance yields
    pub fn position(&self) -> usize {
        self.next
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

const EXPOSURE_STEP_US: i32 = 500;
const ISO_STEP: i32 = 50;
const LENS_STEP: i32 = 3;
const DOT_STEP: i32 = 100;
const FLOOD_STEP: i32 = 100;
const DOT_MAX: i32 = 1200;
const FLOOD_MAX: i32 = 1500;

/// Everything the operator has dialled in during this run
#[derive(Debug, Clone)]
pub struct ControlSession {
    selected: SelectedControl,

    pub brightness: NumericControl,
    pub contrast: NumericControl,
    pub saturation: NumericControl,
    pub sharpness: NumericControl,
    pub luma_denoise: NumericControl,
    pub chroma_denoise: NumericControl,
    pub ae_compensation: NumericControl,

    pub awb_mode: Cycle<AwbMode>,
    pub anti_banding: Cycle<AntiBandingMode>,
    pub effect: Cycle<EffectMode>,

    pub awb_lock: bool,
    pub ae_lock: bool,

    pub exposure_us: NumericControl,
    pub iso: NumericControl,
    pub lens_position: NumericControl,

    pub dot_projector: NumericControl,
    pub flood_light: NumericControl,

    tof: Option<ToFConfig>,
}

impl Default for ControlSession {
    fn default() -> Self {
        Self::new(None)
    }
}

impl ControlSession {
    /// `tof` is the initial ToF configuration when the plan has a ToF depth node.
    pub fn new(tof: Option<ToFConfig>) -> Self {
        Self {
            selected: SelectedControl::None,
            brightness: NumericControl::new(0, -10, 10, 1),
            contrast: NumericControl::new(0, -10, 10, 1),
            saturation: NumericControl::new(0, -10, 10, 1),
            sharpness: NumericControl::new(0, 0, 4, 1),
            luma_denoise: NumericControl::new(0, 0, 4, 1),
            chroma_denoise: NumericControl::new(0, 0, 4, 1),
            ae_compensation: NumericControl::new(0, -9, 9, 1),
            awb_mode: Cycle::new(AwbMode::ALL),
            anti_banding: Cycle::new(AntiBandingMode::ALL),
            effect: Cycle::new(EffectMode::ALL),
            awb_lock: false,
            ae_lock: false,
            exposure_us: NumericControl::new(20_000, 1, 33_000, EXPOSURE_STEP_US),
            iso: NumericControl::new(800, 100, 1600, ISO_STEP),
            lens_position: NumericControl::new(150, 0, 255, LENS_STEP),
            dot_projector: NumericControl::new(0, 0, DOT_MAX, DOT_STEP),
            flood_light: NumericControl::new(0, 0, FLOOD_MAX, FLOOD_STEP),
            tof,
        }
    }

    pub fn selected(&self) -> SelectedControl {
        self.selected
    }

    pub fn tof_config(&self) -> Option<&ToFConfig> {
        self.tof.as_ref()
    }

    /// Apply one key action. At most one directive comes back; the caller
    /// forwards it without waiting on the device.
    pub fn handle(&mut self, action: KeyAction) -> Result<Option<DeviceAction>, ControlError> {
        let cmd = match action {
            // Owned by the poll loop
            KeyAction::Quit | KeyAction::ToggleSettingsPrint | KeyAction::Capture => return Ok(None),

            KeyAction::Select(control) => {
                self.selected = control;
                info!("Selected control: {:?}", control);
                return Ok(None);
            }
            KeyAction::Adjust(dir) => return self.adjust_selected(dir),

            KeyAction::AutoFocusTrigger => {
                info!("Autofocus trigger (and disable continuous)");
                ControlCommand::AutoFocus {
                    mode: AutoFocusMode::Auto,
                    trigger: true,
                }
            }
            KeyAction::AutoFocusContinuous => {
                info!("Autofocus enable, continuous");
                ControlCommand::AutoFocus {
                    mode: AutoFocusMode::ContinuousVideo,
                    trigger: false,
                }
            }
            KeyAction::AutoExposureEnable => {
                info!("Autoexposure enable");
                ControlCommand::AutoExposureEnable
            }
            KeyAction::Lens(dir) => {
                let lens_position = self.lens_position.adjust(dir) as u32;
                info!("Setting manual focus, lens position: {}", lens_position);
                ControlCommand::ManualFocus { lens_position }
            }
            KeyAction::ExposureTime(dir) => {
                self.exposure_us.adjust(dir);
                self.manual_exposure()
            }
            KeyAction::Sensitivity(dir) => {
                self.iso.adjust(dir);
                self.manual_exposure()
            }
            KeyAction::ToggleAwbLock => {
                self.awb_lock = !self.awb_lock;
                info!("Auto white balance lock: {}", self.awb_lock);
                ControlCommand::AutoWhiteBalanceLock(self.awb_lock)
            }
            KeyAction::ToggleAeLock => {
                self.ae_lock = !self.ae_lock;
                info!("Auto exposure lock: {}", self.ae_lock);
                ControlCommand::AutoExposureLock(self.ae_lock)
            }

            KeyAction::DotProjector(dir) => {
                let ma = self.dot_projector.adjust(dir) as u32;
                info!("Setting dot projector brightness: {}", ma);
                return Ok(Some(DeviceAction::DotProjector(ma)));
            }
            KeyAction::FloodLight(dir) => {
                let ma = self.flood_light.adjust(dir) as u32;
                info!("Setting flood light brightness: {}", ma);
                return Ok(Some(DeviceAction::FloodLight(ma)));
            }

            KeyAction::ToggleToFFreqMod => {
                let tof = self.tof.as_mut().ok_or(ControlError::NoToF)?;
                tof.freq_mod = tof.freq_mod.toggled();
                info!("ToF toggling f_mod value to: {:?}", tof.freq_mod);
                return Ok(Some(DeviceAction::ToF(*tof)));
            }
            KeyAction::ToggleToFPhaseShuffle => {
                let tof = self.tof.as_mut().ok_or(ControlError::NoToF)?;
                tof.avg_phase_shuffle = !tof.avg_phase_shuffle;
                info!(
                    "ToF toggling avgPhaseShuffle value to: {}",
                    tof.avg_phase_shuffle
                );
                return Ok(Some(DeviceAction::ToF(*tof)));
            }
        };
        Ok(Some(DeviceAction::Control(cmd)))
    }

    fn manual_exposure(&self) -> ControlCommand {
        let (exposure_us, iso) = (self.exposure_us.value() as u32, self.iso.value() as u32);
        info!("Setting manual exposure, time: {} iso: {}", exposure_us, iso);
        ControlCommand::ManualExposure { exposure_us, iso }
    }

    fn adjust_selected(&mut self, dir: Direction) -> Result<Option<DeviceAction>, ControlError> {
        let cmd = match self.selected {
            SelectedControl::None => return Err(ControlError::NoControlSelected),
            SelectedControl::AeCompensation => {
                let v = self.ae_compensation.adjust(dir);
                info!("Auto exposure compensation: {}", v);
                ControlCommand::AutoExposureCompensation(v)
            }
            // Enumerated modes only ever step forward, whichever key was used
            SelectedControl::AwbMode => {
                let mode = self.awb_mode.advance();
                info!("Auto white balance mode: {:?}", mode);
                ControlCommand::AutoWhiteBalanceMode(mode)
            }
            SelectedControl::AntiBanding => {
                let mode = self.anti_banding.advance();
                info!("Anti-banding mode: {:?}", mode);
                ControlCommand::AntiBandingMode(mode)
            }
            SelectedControl::Effect => {
                let mode = self.effect.advance();
                info!("Effect mode: {:?}", mode);
                ControlCommand::EffectMode(mode)
            }
            SelectedControl::Brightness => {
                let v = self.brightness.adjust(dir);
                info!("Brightness: {}", v);
                ControlCommand::Brightness(v)
            }
            SelectedControl::Contrast => {
                let v = self.contrast.adjust(dir);
                info!("Contrast: {}", v);
                ControlCommand::Contrast(v)
            }
            SelectedControl::Saturation => {
                let v = self.saturation.adjust(dir);
                info!("Saturation: {}", v);
                ControlCommand::Saturation(v)
            }
            SelectedControl::Sharpness => {
                let v = self.sharpness.adjust(dir);
                info!("Sharpness: {}", v);
                ControlCommand::Sharpness(v)
            }
            SelectedControl::LumaDenoise => {
                let v = self.luma_denoise.adjust(dir);
                info!("Luma denoise: {}", v);
                ControlCommand::LumaDenoise(v)
            }
            SelectedControl::ChromaDenoise => {
                let v = self.chroma_denoise.adjust(dir);
                info!("Chroma denoise: {}", v);
                ControlCommand::ChromaDenoise(v)
            }
            SelectedControl::ToFMinAmplitude => {
                let tof = self.tof.as_mut().ok_or(ControlError::NoToF)?;
                let (lo, hi) = ToFConfig::MIN_AMPLITUDE_RANGE;
                tof.minimum_amplitude = clamp(tof.minimum_amplitude + dir.sign() as f32, lo, hi);
                info!(
                    "Setting min amplitude(confidence) to: {}",
                    tof.minimum_amplitude
                );
                return Ok(Some(DeviceAction::ToF(*tof)));
            }
        };
        Ok(Some(DeviceAction::Control(cmd)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_control_clamps_at_both_ends() {
        let mut c = NumericControl::new(3, 0, 4, 1);
        assert_eq!(c.adjust(Direction::Up), 4);
        assert_eq!(c.adjust(Direction::Up), 4);
        for _ in 0..10 {
            c.adjust(Direction::Down);
        }
        assert_eq!(c.value(), 0);
    }

    #[test]
    fn cycle_wraps_to_start() {
        let mut c = Cycle::new(AntiBandingMode::ALL);
        let start = c.position();
        let seen: Vec<_> = (0..c.len()).map(|_| c.advance()).collect();
        assert_eq!(seen, AntiBandingMode::ALL);
        assert_eq!(c.position(), start);
        assert_eq!(c.advance(), AntiBandingMode::Off);
    }

    #[test]
    fn exposure_keys_send_both_values() {
        let mut s = ControlSession::default();
        let out = s.handle(KeyAction::Sensitivity(Direction::Up)).unwrap();
        assert_eq!(
            out,
            Some(DeviceAction::Control(ControlCommand::ManualExposure {
                exposure_us: 20_000,
                iso: 850
            }))
        );
        assert_eq!(s.selected(), SelectedControl::None);
    }

    #[test]
    fn exposure_time_stays_in_range() {
        let mut s = ControlSession::default();
        for _ in 0..100 {
            s.handle(KeyAction::ExposureTime(Direction::Down)).unwrap();
        }
        assert_eq!(s.exposure_us.value(), 1);
        for _ in 0..100 {
            s.handle(KeyAction::ExposureTime(Direction::Up)).unwrap();
        }
        assert_eq!(s.exposure_us.value(), 33_000);
    }
}
