//! [`MotorDriver`] implementation for a TB6612-style H-bridge wired to the Raspberry Pi GPIO

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::eqpt::mech::{Direction, Wheel, WheelDem};
use log::debug;
use rppal::gpio::{Gpio, OutputPin};

use super::{MotorDriver, MotorError};
use crate::params::DriveParams;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// One motor channel: two direction pins and a software PWM enable pin.
struct MotorPins {
    in1: OutputPin,
    in2: OutputPin,
    pwm: OutputPin,
}

pub struct GpioMotorDriver {
    left: MotorPins,
    right: MotorPins,
    pwm_freq_hz: f64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl GpioMotorDriver {
    /// Acquire the motor pins and start both motors stopped.
    pub fn new(params: &DriveParams) -> Result<Self, MotorError> {
        let gpio = Gpio::new().map_err(|e| MotorError::Gpio(e.to_string()))?;

        let mut driver = Self {
            left: MotorPins::new(&gpio, params.left_pins)?,
            right: MotorPins::new(&gpio, params.right_pins)?,
            pwm_freq_hz: params.pwm_freq_hz,
        };

        driver.set_wheel(Wheel::Left, WheelDem::STOP)?;
        driver.set_wheel(Wheel::Right, WheelDem::STOP)?;

        debug!(
            "GPIO motor driver ready, left pins {:?}, right pins {:?}",
            params.left_pins, params.right_pins
        );

        Ok(driver)
    }
}

impl MotorPins {
    fn new(gpio: &Gpio, pins: [u8; 3]) -> Result<Self, MotorError> {
        let get = |n: u8| -> Result<OutputPin, MotorError> {
            Ok(gpio
                .get(n)
                .map_err(|e| MotorError::Gpio(format!("pin {}: {}", n, e)))?
                .into_output_low())
        };

        Ok(Self {
            in1: get(pins[0])?,
            in2: get(pins[1])?,
            pwm: get(pins[2])?,
        })
    }
}

impl MotorDriver for GpioMotorDriver {
    fn set_wheel(&mut self, wheel: Wheel, dem: WheelDem) -> Result<(), MotorError> {
        let pins = match wheel {
            Wheel::Left => &mut self.left,
            Wheel::Right => &mut self.right,
        };

        match dem.dir {
            Direction::Forward => {
                pins.in1.set_high();
                pins.in2.set_low();
            }
            Direction::Reverse => {
                pins.in1.set_low();
                pins.in2.set_high();
            }
            Direction::Brake => {
                pins.in1.set_low();
                pins.in2.set_low();
            }
        }

        let duty = match dem.dir {
            Direction::Brake => 0.0,
            _ => dem.duty_pct as f64 / 100.0,
        };

        pins.pwm
            .set_pwm_frequency(self.pwm_freq_hz, duty)
            .map_err(|e| MotorError::Pwm(e.to_string()))
    }

    fn release(&mut self) -> Result<(), MotorError> {
        for pins in [&mut self.left, &mut self.right] {
            pins.pwm
                .clear_pwm()
                .map_err(|e| MotorError::Pwm(e.to_string()))?;
            pins.pwm.set_low();
            pins.in1.set_low();
            pins.in2.set_low();
        }

        Ok(())
    }
}
