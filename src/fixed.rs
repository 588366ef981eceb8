//! Q16.16 fixed-point helpers shared by the PID and controller modules.
//!
//! Control values travel as plain `i32`. Gains are Q16.16 (65536 = 1.0),
//! voltages are signed 16-bit fractions of the bus (32767 = full forward),
//! and currents, temperatures and bus voltages are 8.8 fixed-point.
//!
//! # Example
//!
//! ```rust
//! use bdc_controller::fixed::{mul16x16, div16x16};
//!
//! assert_eq!(mul16x16(3 << 16, 2 << 16), 6 << 16);
//! assert_eq!(div16x16(1, 2), 32768);
//! ```

/// Largest voltage command (full forward).
pub const VOLTAGE_MAX: i32 = 32767;

/// Smallest voltage command (full reverse).
pub const VOLTAGE_MIN: i32 = -32768;

/// Multiply two Q16.16 values, rounding to nearest.
#[inline]
pub fn mul16x16(a: i32, b: i32) -> i32 {
    saturate(((a as i64 * b as i64) + 0x8000) >> 16)
}

/// Divide two Q16.16 values.
///
/// Returns 0 for a zero divisor.
#[inline]
pub fn div16x16(a: i32, b: i32) -> i32 {
    if b == 0 {
        return 0;
    }
    saturate(((a as i64) << 16) / b as i64)
}

/// Clamp a wide value into the signed 16-bit voltage range.
#[inline]
pub fn clamp_voltage(v: i64) -> i32 {
    v.clamp(VOLTAGE_MIN as i64, VOLTAGE_MAX as i64) as i32
}

/// Saturate a wide value to `i32`.
#[inline]
pub fn saturate(v: i64) -> i32 {
    v.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mul_identity() {
        assert_eq!(mul16x16(65536, 12345), 12345);
        assert_eq!(mul16x16(65536, -12345), -12345);
    }

    #[test]
    fn mul_rounds_half_up() {
        // 0.5 * 1 (raw) = 0.5 raw, rounds to 1
        assert_eq!(mul16x16(32768, 1), 1);
        assert_eq!(mul16x16(32767, 1), 0);
    }

    #[test]
    fn mul_saturates() {
        assert_eq!(mul16x16(i32::MAX, i32::MAX), i32::MAX);
        assert_eq!(mul16x16(i32::MAX, i32::MIN), i32::MIN);
        assert_eq!(mul16x16(1 << 24, 1 << 24), i32::MAX);
    }

    #[test]
    fn div_basic() {
        assert_eq!(div16x16(3, 4), 49152);
        assert_eq!(div16x16(32767 * 256, 65536), 32767 * 256);
    }

    #[test]
    fn div_by_zero_is_zero() {
        assert_eq!(div16x16(100, 0), 0);
    }

    #[test]
    fn clamp_voltage_bounds() {
        assert_eq!(clamp_voltage(100_000), VOLTAGE_MAX);
        assert_eq!(clamp_voltage(-100_000), VOLTAGE_MIN);
        assert_eq!(clamp_voltage(-5), -5);
    }
}
