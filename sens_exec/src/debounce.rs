//! # Hysteresis debouncer
//!
//! Turns a stream of noisy instantaneous readings into a stable unsafe/safe state. Entering the
//! unsafe state takes `unsafe_consecutive` unsafe samples in a row, leaving it takes
//! `safe_consecutive` samples which clear the threshold by an extra margin. Samples between the
//! threshold and the margin (the grey zone) leave the counters untouched.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Deserialize;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Debouncer state machine.
#[derive(Debug, Clone)]
pub struct HysteresisDebouncer {
    unsafe_count: u32,
    safe_count: u32,
    stable_unsafe: bool,

    unsafe_consecutive: u32,
    safe_consecutive: u32,
}

/// Debounce parameters.
#[derive(Deserialize, Debug, Clone, Copy)]
#[serde(default)]
pub struct DebounceParams {
    /// Number of consecutive unsafe samples needed to enter the unsafe state.
    pub unsafe_consecutive: u32,

    /// Number of consecutive clear samples needed to leave the unsafe state.
    pub safe_consecutive: u32,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Classification of one instantaneous reading.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Sample {
    /// Past the danger threshold
    Unsafe,

    /// Clear of the threshold by at least the margin
    Clear,

    /// Between the threshold and the margin
    Grey,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for DebounceParams {
    fn default() -> Self {
        Self {
            unsafe_consecutive: 3,
            safe_consecutive: 5,
        }
    }
}

impl Sample {
    /// Classify a reading which is unsafe when it falls below `threshold`.
    pub fn below(value: f64, threshold: f64, margin: f64) -> Self {
        if value < threshold {
            Sample::Unsafe
        } else if value > threshold + margin {
            Sample::Clear
        } else {
            Sample::Grey
        }
    }
}

impl HysteresisDebouncer {
    pub fn new(params: &DebounceParams) -> Self {
        Self {
            unsafe_count: 0,
            safe_count: 0,
            stable_unsafe: false,
            unsafe_consecutive: params.unsafe_consecutive.max(1),
            safe_consecutive: params.safe_consecutive.max(1),
        }
    }

    /// Feed one sample and return the stable state, `true` meaning unsafe.
    pub fn update(&mut self, sample: Sample) -> bool {
        match sample {
            Sample::Unsafe => {
                self.unsafe_count = self.unsafe_count.saturating_add(1);
                self.safe_count = 0;
            }
            Sample::Clear => {
                self.safe_count = self.safe_count.saturating_add(1);
                self.unsafe_count = 0;
            }
            Sample::Grey => (),
        }

        if !self.stable_unsafe && self.unsafe_count >= self.unsafe_consecutive {
            self.stable_unsafe = true;
        } else if self.stable_unsafe && self.safe_count >= self.safe_consecutive {
            self.stable_unsafe = false;
        }

        self.stable_unsafe
    }

    pub fn is_unsafe(&self) -> bool {
        self.stable_unsafe
    }

    /// Return to the initial safe state.
    pub fn reset(&mut self) {
        self.unsafe_count = 0;
        self.safe_count = 0;
        self.stable_unsafe = false;
    }
}

impl Default for HysteresisDebouncer {
    fn default() -> Self {
        Self::new(&DebounceParams::default())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(Sample::below(19.9, 20.0, 5.0), Sample::Unsafe);
        assert_eq!(Sample::below(20.0, 20.0, 5.0), Sample::Grey);
        assert_eq!(Sample::below(25.0, 20.0, 5.0), Sample::Grey);
        assert_eq!(Sample::below(25.1, 20.0, 5.0), Sample::Clear);
    }

    #[test]
    fn test_single_transient_ignored() {
        let mut d = HysteresisDebouncer::default();

        for _ in 0..10 {
            assert!(!d.update(Sample::Clear));
        }
        assert!(!d.update(Sample::Unsafe));
        for _ in 0..10 {
            assert!(!d.update(Sample::Clear));
        }

        // Two unsafe then a clear resets the count
        d.update(Sample::Unsafe);
        d.update(Sample::Unsafe);
        d.update(Sample::Clear);
        assert!(!d.update(Sample::Unsafe));
    }

    #[test]
    fn test_exact_counts() {
        let mut d = HysteresisDebouncer::default();

        assert!(!d.update(Sample::Unsafe));
        assert!(!d.update(Sample::Unsafe));
        assert!(d.update(Sample::Unsafe));

        for _ in 0..4 {
            assert!(d.update(Sample::Clear));
        }
        assert!(!d.update(Sample::Clear));
    }

    #[test]
    fn test_grey_zone_holds_counters() {
        let mut d = HysteresisDebouncer::default();

        d.update(Sample::Unsafe);
        d.update(Sample::Unsafe);
        assert!(!d.update(Sample::Grey));
        assert!(d.update(Sample::Unsafe));

        // Grey samples never clear the state
        for _ in 0..20 {
            assert!(d.update(Sample::Grey));
        }

        for _ in 0..3 {
            d.update(Sample::Clear);
        }
        d.update(Sample::Grey);
        d.update(Sample::Clear);
        assert!(!d.update(Sample::Clear));

        d.reset();
        assert!(!d.is_unsafe());
    }
}
