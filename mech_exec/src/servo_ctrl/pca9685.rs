//! [`ServoDriver`] implementation for the PCA9685 driver

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use embedded_hal::blocking::i2c::{Write, WriteRead};
use pwm_pca9685::{Address, Channel, Pca9685};

use super::{ServoDriver, ServoError};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Number of counts in one PWM period
const MAX_PWM: u16 = 4096;

/// Frequency of the board's internal oscillator.
///
/// Units: Hertz
const OSC_FREQ_HZ: f64 = 25_000_000.0;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A PCA9685 board together with its output frequency.
pub struct Pca9685Servo<I2C> {
    pwm: Pca9685<I2C>,

    /// Length of one PWM period.
    ///
    /// Units: microseconds
    period_us: f64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<I2C, E> Pca9685Servo<I2C>
where
    I2C: Write<Error = E> + WriteRead<Error = E>,
{
    /// Configure the board at `address` for the given output frequency and enable it.
    pub fn new(i2c: I2C, address: u8, freq_hz: f64) -> Result<Self, ServoError> {
        let mut pwm = Pca9685::new(i2c, Address::from(address)).map_err(map_err)?;

        pwm.set_prescale(prescale(freq_hz)?).map_err(map_err)?;
        pwm.enable().map_err(map_err)?;

        Ok(Self {
            pwm,
            period_us: 1e6 / freq_hz,
        })
    }

    /// Release the underlying I2C bus.
    pub fn destroy(self) -> I2C {
        self.pwm.destroy()
    }
}

impl<I2C, E> ServoDriver for Pca9685Servo<I2C>
where
    I2C: Write<Error = E> + WriteRead<Error = E>,
{
    type Channel = Channel;

    fn set_pulse_width(&mut self, channel: Self::Channel, pulse_us: u16) -> Result<(), ServoError> {
        let ticks = pulse_ticks(pulse_us, self.period_us);

        self.pwm
            .set_channel_on_off(channel, 0, ticks)
            .map_err(map_err)
    }

    fn set_off(&mut self, channel: Self::Channel) -> Result<(), ServoError> {
        self.pwm.set_channel_on_off(channel, 0, 0).map_err(map_err)
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Get the board channel from its index.
pub fn channel_from_index(index: u8) -> Result<Channel, ServoError> {
    Ok(match index {
        0 => Channel::C0,
        1 => Channel::C1,
        2 => Channel::C2,
        3 => Channel::C3,
        4 => Channel::C4,
        5 => Channel::C5,
        6 => Channel::C6,
        7 => Channel::C7,
        8 => Channel::C8,
        9 => Channel::C9,
        10 => Channel::C10,
        11 => Channel::C11,
        12 => Channel::C12,
        13 => Channel::C13,
        14 => Channel::C14,
        15 => Channel::C15,
        _ => return Err(ServoError::InvalidInput),
    })
}

/// Prescale register value for an output frequency.
fn prescale(freq_hz: f64) -> Result<u8, ServoError> {
    let value = (OSC_FREQ_HZ / (MAX_PWM as f64 * freq_hz)).round() - 1.0;

    // The board only accepts prescales of 3 and above
    if !(3.0..=255.0).contains(&value) {
        return Err(ServoError::InvalidInput);
    }

    Ok(value as u8)
}

/// Number of counts of the period a pulse stays high for, truncated.
fn pulse_ticks(pulse_us: u16, period_us: f64) -> u16 {
    let ticks = (pulse_us as f64 * MAX_PWM as f64 / period_us) as u16;
    ticks.min(MAX_PWM - 1)
}

fn map_err<E>(e: pwm_pca9685::Error<E>) -> ServoError {
    match e {
        pwm_pca9685::Error::I2C(_) => ServoError::I2c,
        _ => ServoError::InvalidInput,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    /// I2C bus which records every write.
    #[derive(Default)]
    struct MockI2c {
        writes: Vec<(u8, Vec<u8>)>,
    }

    impl Write for MockI2c {
        type Error = ();

        fn write(&mut self, address: u8, bytes: &[u8]) -> Result<(), ()> {
            self.writes.push((address, bytes.to_vec()));
            Ok(())
        }
    }

    impl WriteRead for MockI2c {
        type Error = ();

        fn write_read(&mut self, _address: u8, _bytes: &[u8], buffer: &mut [u8]) -> Result<(), ()> {
            for b in buffer.iter_mut() {
                *b = 0;
            }
            Ok(())
        }
    }

    #[test]
    fn test_prescale() {
        assert_eq!(prescale(50.0).unwrap(), 121);
        assert!(prescale(10_000.0).is_err());
    }

    #[test]
    fn test_pulse_ticks() {
        // 50 Hz gives a 20 ms period
        assert_eq!(pulse_ticks(1100, 20_000.0), 225);
        assert_eq!(pulse_ticks(900, 20_000.0), 184);
        assert_eq!(pulse_ticks(20_000, 20_000.0), 4095);
    }

    #[test]
    fn test_pulse_write() {
        let mut servo = Pca9685Servo::new(MockI2c::default(), 0x40, 50.0).unwrap();

        servo
            .set_pulse_width(channel_from_index(1).unwrap(), 1100)
            .unwrap();
        servo.set_off(channel_from_index(1).unwrap()).unwrap();

        let i2c = servo.destroy();

        assert!(i2c.writes.iter().all(|(addr, _)| *addr == 0x40));

        // LED1_ON_L is register 0x0A, on = 0 and off = 225
        let n = i2c.writes.len();
        assert_eq!(i2c.writes[n - 2].1, vec![0x0A, 0, 0, 225, 0]);
        assert_eq!(i2c.writes[n - 1].1, vec![0x0A, 0, 0, 0, 0]);
    }

    #[test]
    fn test_channel_from_index() {
        assert!(matches!(channel_from_index(0), Ok(Channel::C0)));
        assert!(matches!(channel_from_index(15), Ok(Channel::C15)));
        assert!(channel_from_index(16).is_err());
    }
}
