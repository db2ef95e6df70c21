//! # Mechanisms Equipment Demands

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Maximum magnitude of a signed wheel demand, in percent duty.
pub const MAX_WHEEL_DEM: i32 = 100;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Demand sent to a single drive wheel.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
pub struct WheelDem {
    /// Which way the H-bridge drives the motor
    pub dir: Direction,

    /// The PWM duty cycle to apply.
    ///
    /// Units: percent, 0 to 100
    pub duty_pct: u8,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// IDs of the drive wheels.
#[derive(Serialize, Deserialize, Debug, Hash, Eq, PartialEq, Copy, Clone)]
pub enum Wheel {
    /// Motor A on the driver board
    Left,

    /// Motor B on the driver board
    Right,
}

/// H-bridge direction of a drive motor.
#[derive(Serialize, Deserialize, Debug, Hash, Eq, PartialEq, Copy, Clone)]
pub enum Direction {
    Forward,
    Reverse,

    /// Both direction pins low, the motor is shorted and stops.
    Brake,
}

/// IDs of the camera gimbal axes.
#[derive(Serialize, Deserialize, Debug, Hash, Eq, PartialEq, Copy, Clone)]
pub enum CamAxis {
    Pan,
    Tilt,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl WheelDem {
    /// The stopped wheel: brake with zero duty.
    pub const STOP: WheelDem = WheelDem {
        dir: Direction::Brake,
        duty_pct: 0,
    };

    /// Convert a signed percentage demand into a direction and duty.
    ///
    /// Values outside of `[-100, 100]` are saturated.
    pub fn from_signed(value: i32) -> Self {
        let duty_pct = value.abs().min(MAX_WHEEL_DEM) as u8;

        match value.signum() {
            1 => WheelDem {
                dir: Direction::Forward,
                duty_pct,
            },
            -1 => WheelDem {
                dir: Direction::Reverse,
                duty_pct,
            },
            _ => WheelDem::STOP,
        }
    }

    /// Signed percentage equivalent of this demand.
    pub fn signed(&self) -> i32 {
        match self.dir {
            Direction::Forward => self.duty_pct as i32,
            Direction::Reverse => -(self.duty_pct as i32),
            Direction::Brake => 0,
        }
    }
}

impl CamAxis {
    pub const ALL: [CamAxis; 2] = [CamAxis::Pan, CamAxis::Tilt];

    /// Index of the axis into per-axis arrays.
    pub fn index(&self) -> usize {
        match self {
            CamAxis::Pan => 0,
            CamAxis::Tilt => 1,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_wheel_dem_from_signed() {
        assert_eq!(
            WheelDem::from_signed(42),
            WheelDem {
                dir: Direction::Forward,
                duty_pct: 42
            }
        );
        assert_eq!(
            WheelDem::from_signed(-100),
            WheelDem {
                dir: Direction::Reverse,
                duty_pct: 100
            }
        );
        assert_eq!(WheelDem::from_signed(0), WheelDem::STOP);
        assert_eq!(WheelDem::from_signed(250).duty_pct, 100);
        assert_eq!(WheelDem::from_signed(-37).signed(), -37);
    }
}
