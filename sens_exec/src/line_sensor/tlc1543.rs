//! # TLC1543 line sensor ADC
//!
//! Bit-banged serial interface. Each conversion clocks out the address of the next channel while
//! clocking in the result of the previous one, so one extra conversion is made and the first
//! result discarded.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use rppal::gpio::{Gpio, InputPin, OutputPin};
use std::thread;
use std::time::Duration;

use super::LineSensor;
use crate::error::SensorError;
use crate::params::LineSensorParams;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Conversion time before chip select is released.
const CONVERSION_TIME: Duration = Duration::from_micros(100);

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct Tlc1543 {
    cs: OutputPin,
    clock: OutputPin,
    address: OutputPin,
    data_out: InputPin,
    num_channels: usize,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Tlc1543 {
    pub fn new(gpio: &Gpio, params: &LineSensorParams) -> Result<Self, SensorError> {
        let out = |pin: u8| {
            gpio.get(pin)
                .map(|p| p.into_output_low())
                .map_err(|e| SensorError::Gpio(e.to_string()))
        };

        Ok(Self {
            cs: out(params.cs_pin)?,
            clock: out(params.clock_pin)?,
            address: out(params.address_pin)?,
            data_out: gpio
                .get(params.data_out_pin)
                .map_err(|e| SensorError::Gpio(e.to_string()))?
                .into_input_pullup(),
            num_channels: params.num_channels,
        })
    }

    fn clock_bit(&mut self, value: &mut u16) {
        *value <<= 1;
        if self.data_out.is_high() {
            *value |= 0x01;
        }
        self.clock.set_high();
        self.clock.set_low();
    }
}

impl LineSensor for Tlc1543 {
    fn read_raw(&mut self) -> Result<Vec<u16>, SensorError> {
        let mut values = vec![0u16; self.num_channels + 1];

        for j in 0..=self.num_channels {
            self.cs.set_low();

            // Four address bits out while the first bits of the previous result come in
            for i in 0..8 {
                if i < 4 && (j >> (3 - i)) & 0x01 == 1 {
                    self.address.set_high();
                } else {
                    self.address.set_low();
                }
                self.clock_bit(&mut values[j]);
            }
            for _ in 0..4 {
                self.clock_bit(&mut values[j]);
            }

            thread::sleep(CONVERSION_TIME);
            self.cs.set_high();
        }

        Ok(values.into_iter().skip(1).map(|v| v >> 2).collect())
    }
}
