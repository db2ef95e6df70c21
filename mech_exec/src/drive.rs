//! # Drive mixing
//!
//! Converts a normalised joystick intent into a pair of signed wheel demands using tank (skid
//! steer) mixing, and applies those demands to the motor driver.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::eqpt::mech::{Wheel, WheelDem, MAX_WHEEL_DEM};
use log::trace;

use crate::motor_ctrl::{MotorDriver, MotorError};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Default wheel deadzone.
///
/// Units: percent duty
pub const DEADZONE_PCT: f64 = 5.0;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Owner of the motor driver, remembering the last demand to skip redundant writes.
pub struct DriveCtrl<M> {
    driver: M,

    deadzone_pct: f64,

    /// Last signed demands written, `None` if unknown (startup or after a fault)
    last: Option<(i32, i32)>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<M: MotorDriver> DriveCtrl<M> {
    pub fn new(driver: M, deadzone_pct: f64) -> Self {
        Self {
            driver,
            deadzone_pct,
            last: None,
        }
    }

    /// Mix an intent into wheel demands using this controller's deadzone.
    pub fn mix(&self, x: f64, y: f64) -> (i32, i32) {
        mix_tank(x, y, self.deadzone_pct)
    }

    /// Apply signed wheel demands.
    ///
    /// Returns `true` if the driver was written to, `false` if the demands matched the last ones.
    pub fn set(&mut self, left: i32, right: i32) -> Result<bool, MotorError> {
        if self.last == Some((left, right)) {
            return Ok(false);
        }

        trace!("Drive demands: left {}, right {}", left, right);

        self.write(WheelDem::from_signed(left), WheelDem::from_signed(right))?;
        self.last = Some((left, right));

        Ok(true)
    }

    /// Brake both wheels. Always writes to the driver.
    pub fn stop(&mut self) -> Result<(), MotorError> {
        self.write(WheelDem::STOP, WheelDem::STOP)?;
        self.last = Some((0, 0));
        Ok(())
    }

    /// True if the last written demand is non-zero, or unknown.
    pub fn is_active(&self) -> bool {
        self.last != Some((0, 0))
    }

    /// Stop the motors and release the driver outputs.
    pub fn release(&mut self) -> Result<(), MotorError> {
        self.last = None;
        self.driver.release()?;
        self.last = Some((0, 0));
        Ok(())
    }

    fn write(&mut self, left: WheelDem, right: WheelDem) -> Result<(), MotorError> {
        // Forget the last demand until both wheels are known to be written
        self.last = None;

        self.driver.set_wheel(Wheel::Left, left)?;
        self.driver.set_wheel(Wheel::Right, right)
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Convert joystick axes into signed `(left, right)` wheel demands in percent.
///
/// `x` is the turn demand (right positive) and `y` the forward demand, both in `[-1, 1]`.
pub fn joystick_to_motors(x: f64, y: f64) -> (i32, i32) {
    mix_tank(x, y, DEADZONE_PCT)
}

/// Tank mixing with an explicit deadzone.
///
/// Each side is clamped to `[-100, 100]`, zeroed if its magnitude is below the deadzone, then
/// truncated toward zero.
pub fn mix_tank(x: f64, y: f64, deadzone_pct: f64) -> (i32, i32) {
    let max = MAX_WHEEL_DEM as f64;

    let forward = y * max;
    let turn = x * max;

    let side = |v: f64| -> i32 {
        let v = util::maths::clamp(&v, &-max, &max);

        if v.abs() < deadzone_pct || !v.is_finite() {
            0
        } else {
            v as i32
        }
    };

    (side(forward + turn), side(forward - turn))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::motor_ctrl::SimMotorDriver;
    use comms_if::eqpt::mech::Direction;

    #[test]
    fn test_joystick_to_motors() {
        assert_eq!(joystick_to_motors(0.0, 1.0), (100, 100));
        assert_eq!(joystick_to_motors(0.0, -1.0), (-100, -100));
        assert_eq!(joystick_to_motors(1.0, 0.0), (100, -100));
        assert_eq!(joystick_to_motors(-1.0, 0.0), (-100, 100));
        assert_eq!(joystick_to_motors(0.0, 0.0), (0, 0));

        // Saturation
        assert_eq!(joystick_to_motors(1.0, 1.0), (100, 0));
        assert_eq!(joystick_to_motors(0.5, 1.0), (100, 50));

        // Truncation and deadzone
        assert_eq!(joystick_to_motors(0.0, 0.057), (5, 5));
        assert_eq!(joystick_to_motors(0.0, 0.049), (0, 0));
        assert_eq!(joystick_to_motors(0.25, 0.25), (50, 0));
    }

    #[test]
    fn test_mix_bounds() {
        let steps: Vec<f64> = (-10..=10).map(|i| i as f64 / 10.0).collect();

        for &x in steps.iter() {
            for &y in steps.iter() {
                let (l, r) = joystick_to_motors(x, y);
                assert!((-100..=100).contains(&l));
                assert!((-100..=100).contains(&r));
                assert!(l == 0 || l.abs() >= 5);
                assert!(r == 0 || r.abs() >= 5);

                if x == 0.0 {
                    assert_eq!(l, r);
                }
            }
        }
    }

    #[test]
    fn test_drive_ctrl_skips_redundant() {
        let sim = SimMotorDriver::new();
        let mut drive = DriveCtrl::new(sim.clone(), DEADZONE_PCT);

        assert!(drive.is_active());
        assert!(drive.set(50, -20).unwrap());
        assert!(!drive.set(50, -20).unwrap());
        assert_eq!(sim.num_writes(), 2);
        assert_eq!(sim.current(), (50, -20));
        assert_eq!(sim.last(Wheel::Right).unwrap().dir, Direction::Reverse);

        // Stop always writes
        drive.stop().unwrap();
        drive.stop().unwrap();
        assert_eq!(sim.num_writes(), 6);
        assert_eq!(sim.last(Wheel::Left), Some(WheelDem::STOP));
        assert!(!drive.is_active());
    }

    #[test]
    fn test_drive_ctrl_fault_forgets_last() {
        let sim = SimMotorDriver::new();
        let mut drive = DriveCtrl::new(sim.clone(), DEADZONE_PCT);

        drive.set(30, 30).unwrap();
        sim.set_failing(true);
        assert!(drive.set(0, 0).is_err());
        assert!(drive.is_active());

        // Retried once the fault clears even though the demand matches
        sim.set_failing(false);
        assert!(drive.set(0, 0).unwrap());
        assert!(!drive.is_active());
    }
}
