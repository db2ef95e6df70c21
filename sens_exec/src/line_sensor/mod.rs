//! # Infrared line sensor
//!
//! The sensor array gives one 10-bit reflectance value per channel. Readings are normalised
//! against a calibration to `0..=1000`, where 1000 is the darkest surface the channel has seen,
//! and combined into a line position from `0` (under the first channel) to `(n - 1) * 1000`.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// TLC1543 ADC read over the Raspberry Pi GPIO pins.
#[cfg(feature = "hw")]
pub mod tlc1543;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::error::SensorError;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Largest raw reading.
pub const RAW_MAX: u16 = 1023;

/// Largest calibrated reading.
pub const CAL_MAX: u16 = 1000;

/// Calibrated value above which a channel is on the line.
const ON_LINE_THRESHOLD: u16 = 200;

/// Calibrated value below which a channel is treated as noise in the position average.
const NOISE_THRESHOLD: u16 = 50;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

pub trait LineSensor {
    /// Read the raw value of every channel.
    fn read_raw(&mut self) -> Result<Vec<u16>, SensorError>;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Per channel calibration limits.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Calibration {
    pub min: Vec<u16>,
    pub max: Vec<u16>,
}

/// Tracks the line position, remembering which side the line was lost on.
#[derive(Debug, Clone)]
pub struct LineTracker {
    num_channels: usize,
    last_position: u32,
    white_line: bool,
}

/// Line sensor replaying scripted frames, holding the last one once the script runs out.
#[derive(Clone)]
pub struct SimLineSensor {
    inner: Arc<Mutex<SimInner>>,
}

struct SimInner {
    queue: VecDeque<Vec<u16>>,
    resting: Vec<u16>,
    fail: bool,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Calibration {
    /// Uncalibrated limits, the full raw range.
    pub fn new(num_channels: usize) -> Self {
        Self {
            min: vec![0; num_channels],
            max: vec![RAW_MAX; num_channels],
        }
    }

    /// Take `reads` readings and tighten the limits with them.
    ///
    /// The minimum of each channel can only go up and the maximum can only go down.
    pub fn calibrate<S: LineSensor + ?Sized>(
        &mut self,
        sensor: &mut S,
        reads: u32,
    ) -> Result<(), SensorError> {
        let n = self.min.len();
        let mut pass_min = vec![RAW_MAX; n];
        let mut pass_max = vec![0; n];

        for _ in 0..reads.max(1) {
            let raw = read_checked(sensor, n)?;

            for (i, v) in raw.iter().enumerate() {
                pass_min[i] = pass_min[i].min(*v);
                pass_max[i] = pass_max[i].max(*v);
            }
        }

        for i in 0..n {
            self.min[i] = self.min[i].max(pass_min[i]);
            self.max[i] = self.max[i].min(pass_max[i]);
        }

        Ok(())
    }

    /// Normalise a raw frame to `0..=1000`.
    ///
    /// Channels without a usable range read 0.
    pub fn apply(&self, raw: &[u16]) -> Vec<u16> {
        raw.iter()
            .zip(self.min.iter().zip(self.max.iter()))
            .map(|(v, (min, max))| {
                if max <= min {
                    return 0;
                }

                let value = (*v as i32 - *min as i32) * CAL_MAX as i32 / (*max as i32 - *min as i32);
                value.clamp(0, CAL_MAX as i32) as u16
            })
            .collect()
    }

    /// True if no channel saw any variation.
    pub fn is_suspicious(&self) -> bool {
        self.min.iter().all(|m| *m == 0) || self.max.iter().all(|m| *m == RAW_MAX)
    }
}

impl LineTracker {
    pub fn new(num_channels: usize, white_line: bool) -> Self {
        Self {
            num_channels,
            last_position: 0,
            white_line,
        }
    }

    /// Update the position from a calibrated frame.
    pub fn update(&mut self, calibrated: &[u16]) -> u32 {
        let mut on_line = false;
        let mut weighted: u64 = 0;
        let mut sum: u64 = 0;

        for (i, v) in calibrated.iter().enumerate() {
            let v = if self.white_line {
                CAL_MAX.saturating_sub(*v)
            } else {
                *v
            };

            if v > ON_LINE_THRESHOLD {
                on_line = true;
            }

            if v > NOISE_THRESHOLD {
                weighted += v as u64 * i as u64 * 1000;
                sum += v as u64;
            }
        }

        let max_position = self.max_position();

        self.last_position = if on_line && sum > 0 {
            (weighted / sum) as u32
        } else if self.last_position < max_position / 2 {
            0
        } else {
            max_position
        };

        self.last_position
    }

    pub fn position(&self) -> u32 {
        self.last_position
    }

    /// Position of the line under the last channel.
    pub fn max_position(&self) -> u32 {
        self.num_channels.saturating_sub(1) as u32 * 1000
    }
}

impl SimLineSensor {
    pub fn new(resting: Vec<u16>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SimInner {
                queue: VecDeque::new(),
                resting,
                fail: false,
            })),
        }
    }

    pub fn push(&self, frame: Vec<u16>) {
        if let Ok(mut i) = self.inner.lock() {
            i.queue.push_back(frame);
        }
    }

    pub fn set_resting(&self, frame: Vec<u16>) {
        if let Ok(mut i) = self.inner.lock() {
            i.resting = frame;
        }
    }

    pub fn set_failing(&self, fail: bool) {
        if let Ok(mut i) = self.inner.lock() {
            i.fail = fail;
        }
    }
}

impl LineSensor for SimLineSensor {
    fn read_raw(&mut self) -> Result<Vec<u16>, SensorError> {
        let mut inner = self.inner.lock().map_err(|_| SensorError::Simulated)?;

        if inner.fail {
            return Err(SensorError::Simulated);
        }

        match inner.queue.pop_front() {
            Some(f) => {
                inner.resting = f.clone();
                Ok(f)
            }
            None => Ok(inner.resting.clone()),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Read a frame and check it has the expected number of channels.
pub fn read_checked<S: LineSensor + ?Sized>(
    sensor: &mut S,
    num_channels: usize,
) -> Result<Vec<u16>, SensorError> {
    let raw = sensor.read_raw()?;

    if raw.len() != num_channels {
        return Err(SensorError::ChannelCount {
            expected: num_channels,
            actual: raw.len(),
        });
    }

    Ok(raw)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_calibration() {
        let mut cal = Calibration::new(5);
        assert!(cal.is_suspicious());

        let mut s = SimLineSensor::new(vec![500; 5]);
        s.push(vec![100, 200, 300, 400, 500]);
        s.push(vec![900, 800, 700, 600, 500]);

        cal.calibrate(&mut s, 10).unwrap();
        assert_eq!(cal.min, vec![100, 200, 300, 400, 500]);
        assert_eq!(cal.max, vec![900, 800, 700, 600, 500]);
        assert!(!cal.is_suspicious());

        // Limits only ever narrow
        s.push(vec![50, 250, 300, 400, 500]);
        s.push(vec![950, 750, 700, 600, 500]);
        cal.calibrate(&mut s, 2).unwrap();
        assert_eq!(cal.min, vec![100, 250, 300, 400, 500]);
        assert_eq!(cal.max, vec![900, 750, 700, 600, 500]);

        assert_eq!(
            cal.apply(&[500, 500, 0, 1023, 500]),
            vec![500, 500, 0, 1000, 0]
        );
    }

    #[test]
    fn test_channel_count() {
        let mut cal = Calibration::new(5);
        let mut s = SimLineSensor::new(vec![500; 4]);

        assert_eq!(
            cal.calibrate(&mut s, 1),
            Err(SensorError::ChannelCount {
                expected: 5,
                actual: 4
            })
        );
    }

    #[test]
    fn test_position() {
        let mut t = LineTracker::new(5, false);

        assert_eq!(t.update(&[0, 0, 1000, 0, 0]), 2000);
        assert_eq!(t.update(&[0, 0, 500, 500, 0]), 2500);
        assert_eq!(t.update(&[1000, 40, 0, 0, 0]), 0);

        // Lost on the left then on the right
        assert_eq!(t.update(&[100, 100, 100, 100, 100]), 0);
        assert_eq!(t.update(&[0, 0, 0, 300, 300]), 3500);
        assert_eq!(t.update(&[0; 5]), 4000);

        let mut t = LineTracker::new(5, true);
        assert_eq!(t.update(&[1000, 1000, 0, 1000, 1000]), 2000);
    }
}
