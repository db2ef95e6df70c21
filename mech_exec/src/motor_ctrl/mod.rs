//! # Motor Controller Module
//!
//! Unified interface to the H-bridge which drives the two wheel motors, plus a simulated driver
//! used when no hardware is available.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// [`MotorDriver`] implementation using the Raspberry Pi GPIO pins.
#[cfg(feature = "hw")]
pub mod gpio;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::eqpt::mech::{Wheel, WheelDem};
use log::trace;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Trait to provide a unified API for the wheel motor driver.
pub trait MotorDriver {
    /// Apply a demand to one wheel.
    fn set_wheel(&mut self, wheel: Wheel, dem: WheelDem) -> Result<(), MotorError>;

    /// Stop the motors and release the outputs, called once at shutdown.
    fn release(&mut self) -> Result<(), MotorError> {
        self.set_wheel(Wheel::Left, WheelDem::STOP)?;
        self.set_wheel(Wheel::Right, WheelDem::STOP)
    }
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Motor driver which records demands instead of driving hardware.
///
/// Clones share the same history, so a test can keep one clone while the equipment service owns
/// the other.
#[derive(Clone, Default)]
pub struct SimMotorDriver {
    history: Arc<Mutex<Vec<(Wheel, WheelDem)>>>,
    fail: Arc<AtomicBool>,
    released: Arc<AtomicBool>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(thiserror::Error, Debug)]
pub enum MotorError {
    #[error("Could not access the GPIO peripheral: {0}")]
    Gpio(String),

    #[error("Could not set the PWM output: {0}")]
    Pwm(String),

    #[error("Simulated motor fault")]
    Simulated,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SimMotorDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// All demands applied so far, oldest first.
    pub fn history(&self) -> Vec<(Wheel, WheelDem)> {
        self.history.lock().map(|h| h.clone()).unwrap_or_default()
    }

    /// The most recent demand applied to a wheel.
    pub fn last(&self, wheel: Wheel) -> Option<WheelDem> {
        self.history()
            .into_iter()
            .rev()
            .find(|(w, _)| *w == wheel)
            .map(|(_, d)| d)
    }

    /// Signed demand currently applied to both wheels, `(left, right)`.
    pub fn current(&self) -> (i32, i32) {
        (
            self.last(Wheel::Left).map(|d| d.signed()).unwrap_or(0),
            self.last(Wheel::Right).map(|d| d.signed()).unwrap_or(0),
        )
    }

    pub fn num_writes(&self) -> usize {
        self.history.lock().map(|h| h.len()).unwrap_or(0)
    }

    /// Make every following write fail.
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::Relaxed);
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Relaxed)
    }
}

impl MotorDriver for SimMotorDriver {
    fn set_wheel(&mut self, wheel: Wheel, dem: WheelDem) -> Result<(), MotorError> {
        if self.fail.load(Ordering::Relaxed) {
            return Err(MotorError::Simulated);
        }

        trace!("Sim motor {:?}: {:?} at {}%", wheel, dem.dir, dem.duty_pct);

        self.history
            .lock()
            .map_err(|_| MotorError::Simulated)?
            .push((wheel, dem));

        Ok(())
    }

    fn release(&mut self) -> Result<(), MotorError> {
        self.set_wheel(Wheel::Left, WheelDem::STOP)?;
        self.set_wheel(Wheel::Right, WheelDem::STOP)?;
        self.released.store(true, Ordering::Relaxed);
        Ok(())
    }
}
