//! # Mechanisms Executable Parameters

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::net::NetParams;
use serde::Deserialize;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct MechExecParams {
    /// Command server network parameters
    pub net: NetParams,

    pub watchdog: WatchdogParams,

    pub drive: DriveParams,

    pub cam: CamParams,
}

/// Safety watchdog parameters.
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct WatchdogParams {
    /// Time without an accepted command after which the drive is stopped.
    ///
    /// Units: milliseconds
    pub timeout_ms: u64,

    /// Period at which the watchdog checks the deadline.
    ///
    /// Units: milliseconds
    pub poll_period_ms: u64,
}

/// Drive motor parameters.
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct DriveParams {
    /// Wheel demands with a smaller magnitude than this are zeroed.
    ///
    /// Units: percent duty
    pub deadzone_pct: f64,

    /// Software PWM frequency of the enable pins.
    ///
    /// Units: Hertz
    pub pwm_freq_hz: f64,

    /// BCM pin numbers of the left motor (motor A): `[IN1, IN2, PWM]`
    pub left_pins: [u8; 3],

    /// BCM pin numbers of the right motor (motor B): `[IN1, IN2, PWM]`
    pub right_pins: [u8; 3],

    /// How long a server waits for the equipment service to confirm a stop.
    ///
    /// Units: milliseconds
    pub stop_ack_timeout_ms: u64,
}

/// Camera gimbal parameters.
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct CamParams {
    /// If false the camera is never initialised and reported as not available.
    pub enabled: bool,

    /// I2C address of the PCA9685 servo board.
    pub i2c_address: u8,

    /// Servo PWM frequency.
    ///
    /// Units: Hertz
    pub pwm_freq_hz: f64,

    /// Board channel of the pan servo
    pub pan_channel: u8,

    /// Board channel of the tilt servo
    pub tilt_channel: u8,

    /// Units: microseconds
    pub min_pulse_us: f64,

    /// Units: microseconds
    pub max_pulse_us: f64,

    /// Centre pulse widths, `[pan, tilt]`.
    ///
    /// Units: microseconds
    pub center_us: [f64; 2],

    /// Velocity inputs with both axes below this magnitude stop the camera.
    pub deadzone: f64,

    /// Pulse width change at full velocity for one update.
    ///
    /// Units: microseconds
    pub base_speed_us: f64,

    /// Exponent of the velocity response curve.
    pub curve_exp: f64,

    /// Weight of the new target when smoothing the position, in `[0, 1]`.
    pub smoothing: f64,

    /// Smallest change in pulse width which is sent to a servo.
    ///
    /// Units: microseconds
    pub min_movement_us: i32,

    /// Delay between the camera stopping and the servos being de-energized.
    ///
    /// Units: milliseconds
    pub idle_grace_ms: u64,

    /// Time allowed for the servos to reach the centre before de-energizing.
    ///
    /// Units: milliseconds
    pub center_settle_ms: u64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for WatchdogParams {
    fn default() -> Self {
        Self {
            timeout_ms: 500,
            poll_period_ms: 100,
        }
    }
}

impl Default for DriveParams {
    fn default() -> Self {
        Self {
            deadzone_pct: 5.0,
            pwm_freq_hz: 1000.0,
            left_pins: [12, 13, 6],
            right_pins: [20, 21, 26],
            stop_ack_timeout_ms: 250,
        }
    }
}

impl Default for CamParams {
    fn default() -> Self {
        Self {
            enabled: true,
            i2c_address: 0x40,
            pwm_freq_hz: 50.0,
            pan_channel: 0,
            tilt_channel: 1,
            min_pulse_us: 200.0,
            max_pulse_us: 1600.0,
            center_us: [900.0, 1100.0],
            deadzone: 0.05,
            base_speed_us: 22.0,
            curve_exp: 1.2,
            smoothing: 0.75,
            min_movement_us: 2,
            idle_grace_ms: 50,
            center_settle_ms: 300,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_shipped_params() {
        let p: MechExecParams = util::params::load_from(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/../params/mech_exec.toml"
        ))
        .unwrap();

        assert_eq!(p.net.port, 5555);
        assert_eq!(p.watchdog.timeout_ms, 500);
        assert_eq!(p.cam.i2c_address, 0x40);
        assert_eq!(p.cam.center_us, [900.0, 1100.0]);
    }
}
