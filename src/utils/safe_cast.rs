//! Saturating float conversions for pixel coordinates and histogram counts

/// Round and clamp a float to a pixel coordinate in `[min, max]`
///
/// Non-finite values map to `min`.
#[must_use]
#[allow(clippy::cast_precision_loss)] // Coordinates are far below 2^52
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // Clamped before the cast
pub fn f64_to_usize_clamp(value: f64, min: usize, max: usize) -> usize {
    let (min, max) = if min <= max { (min, max) } else { (max, min) };

    if !value.is_finite() {
        return min;
    }

    let clamped = value.round().clamp(min as f64, max as f64);
    (clamped as usize).clamp(min, max)
}

/// Round a float to the nearest 8-bit channel value, saturating at 0 and 255
///
/// NaN maps to 0.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // Clamped before the cast
pub fn f64_to_u8_saturate(value: f64) -> u8 {
    if value.is_nan() {
        return 0;
    }
    value.round().clamp(0.0, 255.0) as u8
}

/// Truncate a non-negative float to a histogram count, saturating at `u32::MAX`
///
/// NaN and negative values map to 0.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)] // Clamped before the cast
pub fn f64_to_count(value: f64) -> u32 {
    if value.is_nan() || value <= 0.0 {
        return 0;
    }
    value.floor().min(f64::from(u32::MAX)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_f64_to_usize_clamp() {
        assert_eq!(f64_to_usize_clamp(50.4, 0, 100), 50);
        assert_eq!(f64_to_usize_clamp(50.6, 0, 100), 51);
        assert_eq!(f64_to_usize_clamp(-10.0, 0, 100), 0);
        assert_eq!(f64_to_usize_clamp(150.0, 0, 100), 100);
        assert_eq!(f64_to_usize_clamp(f64::NAN, 3, 100), 3);
        assert_eq!(f64_to_usize_clamp(f64::INFINITY, 3, 100), 3);
    }

    #[test]
    fn test_f64_to_usize_clamp_swapped_bounds() {
        assert_eq!(f64_to_usize_clamp(50.0, 100, 0), 50);
        assert_eq!(f64_to_usize_clamp(500.0, 100, 0), 100);
    }

    #[test]
    fn test_f64_to_u8_saturate() {
        assert_eq!(f64_to_u8_saturate(127.4), 127);
        assert_eq!(f64_to_u8_saturate(127.6), 128);
        assert_eq!(f64_to_u8_saturate(-3.0), 0);
        assert_eq!(f64_to_u8_saturate(300.0), 255);
        assert_eq!(f64_to_u8_saturate(f64::NAN), 0);
        assert_eq!(f64_to_u8_saturate(f64::NEG_INFINITY), 0);
        assert_eq!(f64_to_u8_saturate(f64::INFINITY), 255);
    }

    #[test]
    fn test_f64_to_count() {
        assert_eq!(f64_to_count(12.9), 12);
        assert_eq!(f64_to_count(-1.0), 0);
        assert_eq!(f64_to_count(f64::NAN), 0);
        assert_eq!(f64_to_count(1e20), u32::MAX);
    }

    proptest! {
        #[test]
        fn prop_usize_clamp_always_within_bounds(
            value in any::<f64>(),
            min in 0usize..10_000,
            max in 0usize..10_000
        ) {
            let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
            let result = f64_to_usize_clamp(value, min, max);
            prop_assert!(result >= lo);
            prop_assert!(result <= hi);
        }

        #[test]
        fn prop_u8_saturate_matches_rounding_in_range(value in 0.0f64..255.0) {
            let result = f64_to_u8_saturate(value);
            prop_assert!((f64::from(result) - value).abs() <= 0.5);
        }

        #[test]
        fn prop_count_never_exceeds_value(value in 0.0f64..1e9) {
            prop_assert!(f64::from(f64_to_count(value)) <= value);
        }
    }
}
