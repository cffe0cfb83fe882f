//! Keyboard bindings

use super::session::{Direction, SelectedControl};

/// Operator intent decoded from one key press
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Quit,
    ToggleSettingsPrint,
    Capture,
    AutoFocusTrigger,
    AutoFocusContinuous,
    AutoExposureEnable,
    Lens(Direction),
    ExposureTime(Direction),
    Sensitivity(Direction),
    ToggleAwbLock,
    ToggleAeLock,
    DotProjector(Direction),
    FloodLight(Direction),
    ToggleToFFreqMod,
    ToggleToFPhaseShuffle,
    Select(SelectedControl),
    Adjust(Direction),
}

pub fn action_for(key: char) -> Option<KeyAction> {
    use Direction::{Down, Up};
    use KeyAction::*;

    let action = match key {
        'q' => Quit,
        '/' => ToggleSettingsPrint,
        'c' => Capture,
        't' => AutoFocusTrigger,
        'f' => AutoFocusContinuous,
        'e' => AutoExposureEnable,
        ',' => Lens(Down),
        '.' => Lens(Up),
        'i' => ExposureTime(Down),
        'o' => ExposureTime(Up),
        'k' => Sensitivity(Down),
        'l' => Sensitivity(Up),
        '1' => ToggleAwbLock,
        '2' => ToggleAeLock,
        'a' => DotProjector(Down),
        'd' => DotProjector(Up),
        'w' => FloodLight(Up),
        's' => FloodLight(Down),
        'g' => ToggleToFFreqMod,
        'h' => ToggleToFPhaseShuffle,
        '3' => Select(SelectedControl::AwbMode),
        '4' => Select(SelectedControl::AeCompensation),
        '5' => Select(SelectedControl::AntiBanding),
        '6' => Select(SelectedControl::Effect),
        '7' => Select(SelectedControl::Brightness),
        '8' => Select(SelectedControl::Contrast),
        '9' => Select(SelectedControl::Saturation),
        '0' => Select(SelectedControl::Sharpness),
        '[' => Select(SelectedControl::LumaDenoise),
        ']' => Select(SelectedControl::ChromaDenoise),
        'p' => Select(SelectedControl::ToFMinAmplitude),
        '-' | '_' => Adjust(Down),
        '+' | '=' => Adjust(Up),
        _ => return None,
    };
    Some(action)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_plus_keys_increase() {
        assert_eq!(action_for('+'), Some(KeyAction::Adjust(Direction::Up)));
        assert_eq!(action_for('='), Some(KeyAction::Adjust(Direction::Up)));
        assert_eq!(action_for('_'), Some(KeyAction::Adjust(Direction::Down)));
    }

    #[test]
    fn unbound_keys_are_ignored() {
        assert_eq!(action_for('z'), None);
        assert_eq!(action_for(' '), None);
    }
}
