//! # Servo Controller Module
//!
//! This module provides a unified servo control interface which can abstract over different types
//! of servo driver boards.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// [`ServoDriver`] implementation for the PCA9685 16 channel servo driver board.
pub mod pca9685;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::trace;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

/// Trait to provide a unified API for accessing servo driver boards.
pub trait ServoDriver {
    /// The type that the underlying driver uses for channel identification
    type Channel: Copy + std::fmt::Debug;

    /// Set the pulse width output on a channel.
    ///
    /// ## Arguments
    /// - `channel` - The channel to set the pulse width for
    /// - `pulse_us` - The high time of each PWM period in microseconds
    fn set_pulse_width(&mut self, channel: Self::Channel, pulse_us: u16) -> Result<(), ServoError>;

    /// Stop driving a channel, the servo holds its position by friction only.
    fn set_off(&mut self, channel: Self::Channel) -> Result<(), ServoError>;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Servo driver which records outputs instead of driving hardware.
#[derive(Clone, Default)]
pub struct SimServoDriver {
    history: Arc<Mutex<Vec<ServoOutput>>>,
    fail: Arc<AtomicBool>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(thiserror::Error, Debug)]
pub enum ServoError {
    #[error("An I2C error occured")]
    I2c,

    #[error("Invalid channel or pulse width")]
    InvalidInput,

    #[error("Simulated servo fault")]
    Simulated,
}

/// A single output recorded by the [`SimServoDriver`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ServoOutput {
    Pulse { channel: u8, pulse_us: u16 },
    Off { channel: u8 },
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SimServoDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> Vec<ServoOutput> {
        self.history.lock().map(|h| h.clone()).unwrap_or_default()
    }

    pub fn clear_history(&self) {
        if let Ok(mut h) = self.history.lock() {
            h.clear();
        }
    }

    /// Last pulse width sent to a channel.
    pub fn last_pulse(&self, channel: u8) -> Option<u16> {
        self.history().into_iter().rev().find_map(|o| match o {
            ServoOutput::Pulse {
                channel: c,
                pulse_us,
            } if c == channel => Some(pulse_us),
            _ => None,
        })
    }

    /// Make every following write fail.
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::Relaxed);
    }

    fn record(&self, output: ServoOutput) -> Result<(), ServoError> {
        if self.fail.load(Ordering::Relaxed) {
            return Err(ServoError::Simulated);
        }

        trace!("Sim servo {:?}", output);

        self.history
            .lock()
            .map_err(|_| ServoError::Simulated)?
            .push(output);

        Ok(())
    }
}

impl ServoDriver for SimServoDriver {
    type Channel = u8;

    fn set_pulse_width(&mut self, channel: u8, pulse_us: u16) -> Result<(), ServoError> {
        self.record(ServoOutput::Pulse { channel, pulse_us })
    }

    fn set_off(&mut self, channel: u8) -> Result<(), ServoError> {
        self.record(ServoOutput::Off { channel })
    }
}
