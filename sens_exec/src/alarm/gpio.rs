//! # GPIO buzzer

use rppal::gpio::{Gpio, OutputPin};

use super::{Buzzer, BuzzerError};

/// Passive buzzer driven with software PWM at a fixed tone.
pub struct GpioBuzzer {
    pin: OutputPin,
    tone_hz: f64,
}

impl GpioBuzzer {
    pub fn new(gpio: &Gpio, pin: u8, tone_hz: f64) -> Result<Self, BuzzerError> {
        let pin = gpio
            .get(pin)
            .map_err(|e| BuzzerError::Gpio(e.to_string()))?
            .into_output_low();

        Ok(Self { pin, tone_hz })
    }
}

impl Buzzer for GpioBuzzer {
    fn set_on(&mut self, on: bool) -> Result<(), BuzzerError> {
        if on {
            self.pin
                .set_pwm_frequency(self.tone_hz, 0.5)
                .map_err(|e| BuzzerError::Pwm(e.to_string()))
        } else {
            self.pin
                .clear_pwm()
                .map_err(|e| BuzzerError::Pwm(e.to_string()))?;
            self.pin.set_low();
            Ok(())
        }
    }
}
