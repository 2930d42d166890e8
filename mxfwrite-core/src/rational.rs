//! Rational edit rates and the position/duration conversion algebra.
//!
//! Positions and durations move between timelines running at different edit
//! rates (material package, file package, essence container). All of those
//! conversions reduce to one integer computation with an explicit rounding
//! mode; `Auto` picks the direction that keeps a position covered by complete
//! edit units at the other rate.

use serde::{Deserialize, Serialize};
use std::fmt;

const MAX_FACTOR: i64 = i32::MAX as i64;

/// A rational number used for edit rates and sample rates.
///
/// Equality is structural: `25/1` and `50/2` are different values. Edit rates
/// are never reduced so that the exact numerator/denominator pair survives
/// into the file.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rational {
    /// Numerator
    pub num: i32,
    /// Denominator
    pub den: i32,
}

impl Rational {
    /// 25 fps (PAL)
    pub const FPS_25: Rational = Rational { num: 25, den: 1 };
    /// 50 fps (PAL progressive)
    pub const FPS_50: Rational = Rational { num: 50, den: 1 };
    /// 29.97 fps (NTSC)
    pub const FPS_2997: Rational = Rational { num: 30000, den: 1001 };
    /// 59.94 fps (NTSC progressive)
    pub const FPS_5994: Rational = Rational { num: 60000, den: 1001 };
    /// 48 kHz audio sampling rate
    pub const SR_48K: Rational = Rational { num: 48000, den: 1 };

    /// Create a new rational.
    pub const fn new(num: i32, den: i32) -> Self {
        Rational { num, den }
    }

    /// Convert to f64.
    pub fn to_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }
}

impl Default for Rational {
    fn default() -> Self {
        Rational { num: 0, den: 1 }
    }
}

impl fmt::Debug for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rational({}/{})", self.num, self.den)
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.den == 1 {
            write!(f, "{}", self.num)
        } else {
            write!(f, "{}/{}", self.num, self.den)
        }
    }
}

impl From<(i32, i32)> for Rational {
    fn from((num, den): (i32, i32)) -> Self {
        Rational::new(num, den)
    }
}

/// Rounding mode for position and duration conversions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    /// Round towards negative infinity.
    Down,
    /// Round towards positive infinity.
    Up,
    /// Round to the nearest edit unit.
    Nearest,
    /// Direction depends on whether the conversion goes to a higher or lower
    /// rate, and differs between positions and durations.
    Auto,
}

/// Convert a position by the factor `factor_top / factor_bottom`.
///
/// `Auto` rounds up when converting to a lower rate so that the returned
/// position covers the input position completely.
pub fn convert_position(
    in_position: i64,
    factor_top: i64,
    factor_bottom: i64,
    rounding: Rounding,
) -> i64 {
    if in_position == 0 || factor_top == factor_bottom {
        return in_position;
    }

    if in_position < 0 {
        return -convert_position(-in_position, factor_top, factor_bottom, rounding);
    }

    // factors are expected to be small, e.g. 25, 30000, 48000
    if factor_top > MAX_FACTOR || factor_bottom > MAX_FACTOR {
        log::warn!("Convert position calculation may overflow");
    }

    let round_num = match rounding {
        Rounding::Up => factor_bottom - 1,
        Rounding::Auto if factor_top < factor_bottom => factor_bottom - 1,
        Rounding::Nearest => factor_bottom / 2,
        _ => 0,
    };

    if in_position <= MAX_FACTOR {
        // no chance of overflow, assuming a result that fits into i64 exists
        (in_position * factor_top + round_num) / factor_bottom
    } else {
        // a*b/c = (a/c)*b + (a%c)*b/c avoids the overflowing a*b product
        (in_position / factor_bottom) * factor_top
            + ((in_position % factor_bottom) * factor_top + round_num) / factor_bottom
    }
}

/// Convert a position from one edit rate to another.
pub fn convert_position_rate(
    in_edit_rate: Rational,
    in_position: i64,
    out_edit_rate: Rational,
    rounding: Rounding,
) -> i64 {
    convert_position(
        in_position,
        out_edit_rate.num as i64 * in_edit_rate.den as i64,
        out_edit_rate.den as i64 * in_edit_rate.num as i64,
        rounding,
    )
}

/// Convert a duration by the factor `factor_top / factor_bottom`.
///
/// `Auto` rounds down when converting to a lower rate: the returned duration
/// only counts complete edit units at the output rate.
pub fn convert_duration(
    in_duration: i64,
    factor_top: i64,
    factor_bottom: i64,
    rounding: Rounding,
) -> i64 {
    let rounding = match rounding {
        Rounding::Auto if factor_top < factor_bottom => Rounding::Down,
        Rounding::Auto => Rounding::Up,
        other => other,
    };
    convert_position(in_duration, factor_top, factor_bottom, rounding)
}

/// Convert a duration from one edit rate to another.
pub fn convert_duration_rate(
    in_edit_rate: Rational,
    in_duration: i64,
    out_edit_rate: Rational,
    rounding: Rounding,
) -> i64 {
    convert_duration(
        in_duration,
        out_edit_rate.num as i64 * in_edit_rate.den as i64,
        out_edit_rate.den as i64 * in_edit_rate.num as i64,
        rounding,
    )
}

/// The rounded integer timecode base for an edit rate, e.g. 30 for 30000/1001.
pub fn rounded_tc_base(rate: Rational) -> u16 {
    (rate.num as f64 / rate.den as f64 + 0.5) as u16
}

/// Format a duration as a generic `HH:MM:SS.ss` string.
pub fn generic_duration_string(count: i64, rate: Rational) -> String {
    if count <= 0 || rate.num == 0 || rate.den == 0 {
        return String::from("00:00:00.00");
    }

    let msec = convert_position_rate(rate, count, Rational::new(1000, 1), Rounding::Down);
    let mut sec = msec / 1000;
    let mut min = sec / 60;
    sec %= 60;
    let hour = min / 60;
    min %= 60;
    let sec_frac = 100 * (msec % 1000) / 1000;

    format!("{:02}:{:02}:{:02}.{:02}", hour, min, sec, sec_frac)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_rational_structural_equality() {
        assert_eq!(Rational::new(25, 1), Rational::new(25, 1));
        assert_ne!(Rational::new(25, 1), Rational::new(50, 2));
    }

    #[test]
    fn test_rational_display() {
        assert_eq!(Rational::FPS_25.to_string(), "25");
        assert_eq!(Rational::FPS_2997.to_string(), "30000/1001");
    }

    #[test]
    fn test_convert_position_identity() {
        assert_eq!(convert_position(100, 25, 25, Rounding::Auto), 100);
        assert_eq!(convert_position(0, 48000, 25, Rounding::Auto), 0);
    }

    #[test]
    fn test_convert_position_rounding() {
        // 25 fps -> 48 kHz: factor 48000/25 = 1920
        assert_eq!(convert_position(1, 48000, 25, Rounding::Down), 1920);
        // 48 kHz -> 25 fps: position 1 covers part of frame 0, Auto rounds up
        assert_eq!(convert_position(1, 25, 48000, Rounding::Auto), 1);
        assert_eq!(convert_position(1, 25, 48000, Rounding::Down), 0);
        assert_eq!(convert_position(1919, 25, 48000, Rounding::Nearest), 1);
        assert_eq!(convert_position(500, 25, 48000, Rounding::Nearest), 0);
    }

    #[test]
    fn test_convert_position_negative() {
        assert_eq!(convert_position(-1, 25, 48000, Rounding::Auto), -1);
        assert_eq!(convert_position(-1920, 25, 48000, Rounding::Down), -1);
    }

    #[test]
    fn test_convert_position_large_input() {
        // beyond 2^31 the split computation must produce the same result
        let pos = 3_000_000_000_i64;
        let expected = pos / 1001 * 30000 + pos % 1001 * 30000 / 1001;
        assert_eq!(convert_position(pos, 30000, 1001, Rounding::Down), expected);
    }

    #[test]
    fn test_convert_duration_auto_rounds_down() {
        // 30 samples at 48 kHz are less than one complete frame at 25 fps
        assert_eq!(convert_duration(30, 25, 48000, Rounding::Auto), 0);
        // but a position 30 is covered by frame 1
        assert_eq!(convert_position(30, 25, 48000, Rounding::Auto), 1);
        // to a higher rate Auto rounds up
        assert_eq!(convert_duration(1, 48000, 25, Rounding::Auto), 1920);
    }

    #[test]
    fn test_convert_rate_round_trip() {
        let rates = [
            Rational::FPS_25,
            Rational::FPS_50,
            Rational::FPS_2997,
            Rational::FPS_5994,
            Rational::SR_48K,
        ];
        for &r1 in &rates {
            for &r2 in &rates {
                // a position at the lower rate survives a trip through the
                // higher rate; the other direction loses sub-unit detail
                if r1.to_f64() > r2.to_f64() {
                    continue;
                }
                for p in [0_i64, 1, 7, 24, 1001, 90_000] {
                    let out = convert_position_rate(r1, p, r2, Rounding::Auto);
                    let back = convert_position_rate(r2, out, r1, Rounding::Auto);
                    assert!(
                        (back - p).abs() <= 1,
                        "round trip {} -> {} for {} gave {}",
                        r1,
                        r2,
                        p,
                        back
                    );
                }
            }
        }
    }

    #[test]
    fn test_convert_monotonic_rounding() {
        for p in [0_i64, 1, 13, 1001, 48_000] {
            let down = convert_position_rate(Rational::SR_48K, p, Rational::FPS_2997, Rounding::Down);
            let nearest =
                convert_position_rate(Rational::SR_48K, p, Rational::FPS_2997, Rounding::Nearest);
            let up = convert_position_rate(Rational::SR_48K, p, Rational::FPS_2997, Rounding::Up);
            assert!(down <= nearest && nearest <= up);
        }
    }

    #[test]
    fn test_rounded_tc_base() {
        assert_eq!(rounded_tc_base(Rational::FPS_25), 25);
        assert_eq!(rounded_tc_base(Rational::FPS_2997), 30);
        assert_eq!(rounded_tc_base(Rational::FPS_5994), 60);
        assert_eq!(rounded_tc_base(Rational::SR_48K), 48000);
    }

    #[test]
    fn test_generic_duration_string() {
        assert_eq!(generic_duration_string(0, Rational::FPS_25), "00:00:00.00");
        assert_eq!(generic_duration_string(25, Rational::FPS_25), "00:00:01.00");
        assert_eq!(
            generic_duration_string(90_000, Rational::FPS_25),
            "01:00:00.00"
        );
        assert_eq!(generic_duration_string(30, Rational::FPS_25), "00:00:01.20");
    }

    #[test]
    fn test_rational_serde() {
        let r = Rational::FPS_2997;
        let json = serde_json::to_string(&r).unwrap();
        let decoded: Rational = serde_json::from_str(&json).unwrap();
        assert_eq!(r, decoded);
    }
}
