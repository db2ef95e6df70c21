//! # HC-SR04 driver
//!
//! The echo is polled with a bounded wait, a missing or overlong echo becomes
//! [`SensorError::EchoTimeout`].

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use rppal::gpio::{Gpio, InputPin, OutputPin};
use std::thread;
use std::time::{Duration, Instant};

use super::{echo_to_cm, DistanceSensor};
use crate::error::SensorError;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Length of the trigger pulse.
const TRIGGER_PULSE: Duration = Duration::from_micros(10);

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct HcSr04 {
    trig: OutputPin,
    echo: InputPin,

    /// Longest wait for the whole echo, from the end of the trigger pulse
    timeout: Duration,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl HcSr04 {
    pub fn new(gpio: &Gpio, trig_pin: u8, echo_pin: u8, timeout: Duration) -> Result<Self, SensorError> {
        let trig = gpio
            .get(trig_pin)
            .map_err(|e| SensorError::Gpio(e.to_string()))?
            .into_output_low();
        let echo = gpio
            .get(echo_pin)
            .map_err(|e| SensorError::Gpio(e.to_string()))?
            .into_input();

        Ok(Self {
            trig,
            echo,
            timeout,
        })
    }

    fn timed_out(&self, start: Instant) -> Result<(), SensorError> {
        if start.elapsed() > self.timeout {
            Err(SensorError::EchoTimeout(self.timeout.as_millis() as u64))
        } else {
            Ok(())
        }
    }
}

impl DistanceSensor for HcSr04 {
    fn measure(&mut self) -> Result<f64, SensorError> {
        self.trig.set_high();
        thread::sleep(TRIGGER_PULSE);
        self.trig.set_low();

        let start = Instant::now();

        while self.echo.is_low() {
            self.timed_out(start)?;
        }
        let pulse_start = Instant::now();

        while self.echo.is_high() {
            self.timed_out(start)?;
        }

        Ok(echo_to_cm(pulse_start.elapsed().as_secs_f64()))
    }
}
