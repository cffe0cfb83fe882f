use chrono::{DateTime, Local};

/// Clamp `value` into `[lo, hi]`. Values already in range come back unchanged.
pub fn clamp<T: PartialOrd>(value: T, lo: T, hi: T) -> T {
    if value < lo {
        lo
    } else if value > hi {
        hi
    } else {
        value
    }
}

/// Second-resolution wall-clock tag shared by every file of one capture
pub fn capture_time_tag() -> String {
    time_tag(Local::now())
}

pub fn time_tag(at: DateTime<Local>) -> String {
    at.format("%Y%m%d_%H%M%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn clamp_keeps_in_range_values() {
        for x in -20..=20 {
            let c = clamp(x, -10, 10);
            assert!((-10..=10).contains(&c));
            if (-10..=10).contains(&x) {
                assert_eq!(c, x);
            }
        }
        assert_eq!(clamp(60.0, 0.0, 50.0), 50.0);
    }

    #[test]
    fn tag_format() {
        let at = Local.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        assert_eq!(time_tag(at), "20240101_120000");
    }
}
