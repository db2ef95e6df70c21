//! # Ultrasonic rangers
//!
//! Distance sensors used for obstacle detection. Readings that fail, time out or fall outside the
//! usable range of the sensor are replaced with the maximum range, so a missing echo looks like
//! open space rather than a fault.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// HC-SR04 ranger on the Raspberry Pi GPIO pins.
#[cfg(feature = "hw")]
pub mod hcsr04;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::trace;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::error::SensorError;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Closest distance the rangers can resolve.
///
/// Units: centimeters
pub const MIN_RANGE_CM: f64 = 2.0;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// A sensor measuring the distance to the nearest object.
pub trait DistanceSensor {
    /// Take one measurement.
    ///
    /// Units: centimeters
    fn measure(&mut self) -> Result<f64, SensorError>;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Distance sensor replaying scripted readings.
///
/// Queued readings are returned first, after which the sensor keeps returning the resting value.
/// A `None` reading is returned as an echo timeout. Clones share the same script.
#[derive(Clone)]
pub struct SimDistanceSensor {
    inner: Arc<Mutex<SimInner>>,
}

struct SimInner {
    queue: VecDeque<Option<f64>>,
    resting_cm: f64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SimDistanceSensor {
    pub fn new(resting_cm: f64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SimInner {
                queue: VecDeque::new(),
                resting_cm,
            })),
        }
    }

    /// Queue a reading, `None` being a timeout.
    pub fn push(&self, reading: Option<f64>) {
        if let Ok(mut i) = self.inner.lock() {
            i.queue.push_back(reading);
        }
    }

    /// Change the value returned once the queue is empty.
    pub fn set_resting(&self, resting_cm: f64) {
        if let Ok(mut i) = self.inner.lock() {
            i.resting_cm = resting_cm;
        }
    }
}

impl DistanceSensor for SimDistanceSensor {
    fn measure(&mut self) -> Result<f64, SensorError> {
        let mut inner = self.inner.lock().map_err(|_| SensorError::Simulated)?;

        match inner.queue.pop_front() {
            Some(Some(d)) => Ok(d),
            Some(None) => Err(SensorError::EchoTimeout(0)),
            None => Ok(inner.resting_cm),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Read a sensor, mapping every failure or out of range value to `max_range_cm`.
pub fn read_or_sentinel<S: DistanceSensor + ?Sized>(sensor: &mut S, max_range_cm: f64) -> f64 {
    match sensor.measure() {
        Ok(d) if (MIN_RANGE_CM..=max_range_cm).contains(&d) => d,
        Ok(d) => {
            trace!("Range {:.2} cm outside of the sensor limits", d);
            max_range_cm
        }
        Err(e) => {
            trace!("Range read failed: {}", e);
            max_range_cm
        }
    }
}

/// Convert an echo pulse length into a distance, rounded to 0.01 cm.
pub fn echo_to_cm(pulse_s: f64) -> f64 {
    (pulse_s * 17150.0 * 100.0).round() / 100.0
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_sentinel() {
        let mut s = SimDistanceSensor::new(150.0);
        s.push(Some(12.5));
        s.push(None);
        s.push(Some(1.5));
        s.push(Some(401.0));
        s.push(Some(f64::NAN));
        s.push(Some(2.0));

        assert_eq!(read_or_sentinel(&mut s, 400.0), 12.5);
        assert_eq!(read_or_sentinel(&mut s, 400.0), 400.0);
        assert_eq!(read_or_sentinel(&mut s, 400.0), 400.0);
        assert_eq!(read_or_sentinel(&mut s, 400.0), 400.0);
        assert_eq!(read_or_sentinel(&mut s, 400.0), 400.0);
        assert_eq!(read_or_sentinel(&mut s, 400.0), 2.0);
        assert_eq!(read_or_sentinel(&mut s, 400.0), 150.0);
    }

    #[test]
    fn test_echo_to_cm() {
        // 1 ms of echo is 17.15 cm
        assert_eq!(echo_to_cm(0.001), 17.15);
        assert_eq!(echo_to_cm(0.0005831), 10.0);
    }
}
