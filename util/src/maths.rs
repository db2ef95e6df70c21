//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

/// Limit a value to the closed range `[min, max]`.
pub fn clamp<T>(value: &T, min: &T, max: &T) -> T
where
    T: Float,
{
    let mut ret = *value;

    if ret > *max {
        ret = *max
    }
    if ret < *min {
        ret = *min
    }

    ret
}

/// Raise the magnitude of `value` to `exp`, keeping the sign of `value`.
///
/// Used to give response curves which are gentle near zero and steep at
/// full deflection.
pub fn signed_pow<T>(value: T, exp: T) -> T
where
    T: Float,
{
    value.signum() * value.abs().powf(exp)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_clamp() {
        assert_eq!(clamp(&1.5f64, &-1.0, &1.0), 1.0);
        assert_eq!(clamp(&-7.0f64, &-1.0, &1.0), -1.0);
        assert_eq!(clamp(&0.25f64, &-1.0, &1.0), 0.25);
    }

    #[test]
    fn test_signed_pow() {
        assert_eq!(signed_pow(1f64, 1.2), 1.0);
        assert_eq!(signed_pow(-1f64, 1.2), -1.0);
        assert_eq!(signed_pow(0f64, 1.2), 0.0);
        assert!(signed_pow(0.5f64, 1.2) < 0.5);
        assert!(signed_pow(-0.5f64, 1.2) > -0.5);
    }
}
