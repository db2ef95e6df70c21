//! # Sensors Executable Parameters

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::net::NetParams;
use mech_lib::params::DriveParams;
use serde::Deserialize;

use crate::debounce::DebounceParams;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct SensExecParams {
    pub obstacle: ObstacleParams,

    pub alarm: AlarmParams,

    pub line_sensor: LineSensorParams,

    pub line_follow: LineFollowParams,

    /// Line follow command server network parameters
    pub net: NetParams,

    /// Drive motors used by the line follower
    pub drive: DriveParams,

    /// Number of pixels in the status LED strip
    pub num_leds: usize,
}

/// Obstacle monitor parameters.
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ObstacleParams {
    /// Readings closer than this are obstacles.
    ///
    /// Units: centimeters
    pub danger_cm: f64,

    /// Extra distance beyond `danger_cm` a reading must reach to count as clear.
    ///
    /// Units: centimeters
    pub clear_margin_cm: f64,

    /// Reported distance for failed, timed out or out of range readings.
    ///
    /// Units: centimeters
    pub max_range_cm: f64,

    /// Period of the sampling loop.
    ///
    /// Units: milliseconds
    pub cycle_ms: u64,

    /// Pause between the left and right readings, so one ranger does not hear the other.
    ///
    /// Units: milliseconds
    pub inter_sensor_ms: u64,

    /// Longest wait for an echo.
    ///
    /// Units: milliseconds
    pub echo_timeout_ms: u64,

    /// BCM pins of the left ranger: `[TRIG, ECHO]`
    pub left_pins: [u8; 2],

    /// BCM pins of the right ranger: `[TRIG, ECHO]`
    pub right_pins: [u8; 2],

    pub debounce: DebounceParams,
}

/// Obstacle alarm parameters.
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct AlarmParams {
    /// BCM pin of the buzzer
    pub buzzer_pin: u8,

    /// Buzzer tone.
    ///
    /// Units: Hertz
    pub tone_hz: f64,

    /// Length of each beep.
    ///
    /// Units: milliseconds
    pub beep_ms: u64,

    /// Silence after each beep.
    ///
    /// Units: milliseconds
    pub silence_ms: u64,

    /// Granularity at which the silence checks for the obstacle clearing.
    ///
    /// Units: milliseconds
    pub silence_step_ms: u64,
}

/// Infrared line sensor parameters.
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct LineSensorParams {
    /// Number of infrared channels
    pub num_channels: usize,

    /// BCM pins of the TLC1543 ADC
    pub cs_pin: u8,
    pub clock_pin: u8,
    pub address_pin: u8,
    pub data_out_pin: u8,

    /// Follow a light line on a dark floor.
    pub white_line: bool,
}

/// Line follower parameters.
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct LineFollowParams {
    /// Base speed at startup.
    ///
    /// Units: percent duty
    pub default_speed: u8,

    /// Limits on the base speed.
    ///
    /// Units: percent duty
    pub min_speed: u8,
    pub max_speed: u8,

    /// The line is lost when every calibrated channel reads above this.
    pub lost_threshold: u16,

    /// The line is found again when any channel reads below `lost_threshold - lost_margin`.
    pub lost_margin: u16,

    pub debounce: DebounceParams,

    /// Number of steps in the calibration spin
    pub calibration_steps: u32,

    /// Length of each calibration step.
    ///
    /// Units: milliseconds
    pub calibration_step_ms: u64,

    /// Wheel duty during the calibration spin.
    ///
    /// Units: percent duty
    pub calibration_duty: u8,

    /// Sensor reads per calibration step
    pub calibration_reads: u32,

    /// Update period while following.
    ///
    /// Units: milliseconds
    pub follow_period_ms: u64,

    /// Update period while idle.
    ///
    /// Units: milliseconds
    pub idle_period_ms: u64,

    /// Log the position every this many updates
    pub log_every: u64,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Default for SensExecParams {
    fn default() -> Self {
        Self {
            obstacle: ObstacleParams::default(),
            alarm: AlarmParams::default(),
            line_sensor: LineSensorParams::default(),
            line_follow: LineFollowParams::default(),
            net: NetParams {
                port: 5003,
                ..NetParams::default()
            },
            drive: DriveParams::default(),
            num_leds: 4,
        }
    }
}

impl Default for ObstacleParams {
    fn default() -> Self {
        Self {
            danger_cm: 20.0,
            clear_margin_cm: 5.0,
            max_range_cm: 400.0,
            cycle_ms: 50,
            inter_sensor_ms: 10,
            echo_timeout_ms: 30,
            left_pins: [22, 27],
            right_pins: [23, 24],
            debounce: DebounceParams::default(),
        }
    }
}

impl Default for AlarmParams {
    fn default() -> Self {
        Self {
            buzzer_pin: 4,
            tone_hz: 1000.0,
            beep_ms: 500,
            silence_ms: 1000,
            silence_step_ms: 100,
        }
    }
}

impl Default for LineSensorParams {
    fn default() -> Self {
        Self {
            num_channels: 5,
            cs_pin: 5,
            clock_pin: 25,
            address_pin: 24,
            data_out_pin: 23,
            white_line: false,
        }
    }
}

impl Default for LineFollowParams {
    fn default() -> Self {
        Self {
            default_speed: 35,
            min_speed: 10,
            max_speed: 100,
            lost_threshold: 900,
            lost_margin: 100,
            debounce: DebounceParams::default(),
            calibration_steps: 100,
            calibration_step_ms: 10,
            calibration_duty: 30,
            calibration_reads: 10,
            follow_period_ms: 10,
            idle_period_ms: 100,
            log_every: 20,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_partial_params() {
        let p: SensExecParams = toml::from_str(
            r#"
            num_leds = 2

            [obstacle]
            danger_cm = 10.0

            [net]
            port = 6000
            "#,
        )
        .unwrap();

        assert_eq!(p.num_leds, 2);
        assert_eq!(p.obstacle.danger_cm, 10.0);
        assert_eq!(p.obstacle.clear_margin_cm, 5.0);
        assert_eq!(p.net.port, 6000);
        assert_eq!(p.line_follow.default_speed, 35);
        assert_eq!(SensExecParams::default().net.port, 5003);
    }

    #[test]
    fn test_shipped_params() {
        let p: SensExecParams = util::params::load_from(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/../params/sens_exec.toml"
        ))
        .unwrap();

        assert_eq!(p.net.port, 5003);
        assert_eq!(p.obstacle.right_pins, [23, 24]);
        assert_eq!(p.line_follow.debounce.safe_consecutive, 5);
        assert_eq!(p.drive.pwm_freq_hz, 500.0);
    }
}
