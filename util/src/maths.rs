//! Utility maths functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use num_traits::Float;

/// Map a value from one range into another.
pub fn lin_map<T>(source_range: (T, T), target_range: (T, T), value: T) -> T
where
    T: Float
{
    target_range.0
        + ((value - source_range.0)
        * (target_range.1 - target_range.0)
        / (source_range.1 - source_range.0))
}

/// Clamp a value between a minimum and a maximum.
pub fn clamp<T>(value: &T, min: &T, max: &T) -> T
where
    T: Float + std::ops::Mul + std::ops::Add + std::ops::AddAssign
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

/// Half-cosine blend between 0 and 1.
///
/// Maps a fraction in [0, 1] onto [0, 1] with zero slope at both ends.
/// Fractions outside [0, 1] are clamped before blending, so the blend
/// saturates at 1 for inputs beyond the end of the range.
pub fn cos_blend<T>(fraction: T) -> T
where
    T: Float + std::ops::AddAssign
{
    let zero = T::from(0.0).unwrap();
    let one = T::from(1.0).unwrap();
    let half = T::from(0.5).unwrap();
    let pi = T::from(std::f64::consts::PI).unwrap();

    let f = clamp(&fraction, &zero, &one);

    half * (one - (pi * f).cos())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_lin_map() {
        // Joint position normalisation case, [min, max] onto [-1, 1]
        assert_eq!(lin_map((-2f64, 2f64), (-1f64, 1f64), 0f64), 0f64);
        assert_eq!(lin_map((-2f64, 2f64), (-1f64, 1f64), 2f64), 1f64);
        assert_eq!(lin_map((-2f64, 2f64), (-1f64, 1f64), -2f64), -1f64);
        assert_eq!(lin_map((0f64, 10f64), (0f64, 1f64), 5f64), 0.5f64);
    }

    #[test]
    fn test_cos_blend() {
        assert!(cos_blend(0f64).abs() < 1e-12);
        assert!((cos_blend(1f64) - 1f64).abs() < 1e-12);
        assert!((cos_blend(0.5f64) - 0.5f64).abs() < 1e-12);

        // Saturates outside the range
        assert!((cos_blend(2.5f64) - 1f64).abs() < 1e-12);
        assert!(cos_blend(-1f64).abs() < 1e-12);

        // Monotone over the blend range
        let mut prev = 0f64;
        for i in 1..=100 {
            let v = cos_blend(i as f64 / 100f64);
            assert!(v >= prev);
            prev = v;
        }
    }
}
