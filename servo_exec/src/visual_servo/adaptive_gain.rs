//! Adaptive control gain
//!
//! The gain decays exponentially with the task error norm:
//!
//! ```text
//!     lambda(x) = (l0 - linf) * exp(-s * x / (l0 - linf)) + linf
//! ```
//!
//! so `lambda(0) = l0`, `lambda(inf) = linf` and the slope at zero is `-s`.
//! A high gain near convergence keeps the final approach brisk while the
//! lower far-field gain avoids large joint rates on initial acquisition.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use super::VisualServoError;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Adaptive gain law. Monotone non-increasing in the error norm and bounded
/// in `[gain_inf, gain_zero]`.
#[derive(Debug, Default, Clone, Copy)]
pub struct AdaptiveGain {
    gain_zero: f64,
    gain_inf: f64,
    slope: f64,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl AdaptiveGain {
    /// Build a new gain law, validating the parameters.
    pub fn new(gain_zero: f64, gain_inf: f64, slope: f64) -> Result<Self, VisualServoError> {
        if !(gain_zero > gain_inf && gain_inf > 0.0 && slope > 0.0) {
            return Err(VisualServoError::InvalidGains {
                gain_zero,
                gain_inf,
                slope,
            });
        }

        Ok(Self {
            gain_zero,
            gain_inf,
            slope,
        })
    }

    /// Evaluate the gain for the given task error norm.
    pub fn value(&self, err_norm: f64) -> f64 {
        let spread = self.gain_zero - self.gain_inf;

        spread * (-self.slope * err_norm / spread).exp() + self.gain_inf
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_bounds() {
        let gain = AdaptiveGain::new(0.8, 0.06, 8.0).unwrap();

        assert!((gain.value(0.0) - 0.8).abs() < 1e-12);

        // Tends to the far-field gain for large errors
        assert!((gain.value(1e6) - 0.06).abs() < 1e-9);

        // Bounded for all error norms
        for i in 0..1000 {
            let v = gain.value(i as f64 * 0.01);
            assert!(v <= 0.8 && v >= 0.06);
        }
    }

    #[test]
    fn test_monotone_non_increasing() {
        let gain = AdaptiveGain::new(0.8, 0.06, 8.0).unwrap();

        let mut prev = gain.value(0.0);
        for i in 1..1000 {
            let v = gain.value(i as f64 * 0.01);
            assert!(v <= prev);
            prev = v;
        }
    }

    #[test]
    fn test_invalid_gains_rejected() {
        assert!(AdaptiveGain::new(0.06, 0.8, 8.0).is_err());
        assert!(AdaptiveGain::new(0.8, -0.1, 8.0).is_err());
        assert!(AdaptiveGain::new(0.8, 0.06, 0.0).is_err());
    }
}
