//! # Line follower
//!
//! Follows a dark line with the infrared sensor array using a banded steering law: the further the
//! line is from the centre of the array, the more the wheel on the inside of the turn is slowed.
//! If every channel sees the floor for long enough the line is considered lost and the wheels are
//! braked until it is found again.
//!
//! The follower must be calibrated, by spinning over the line, before it can start.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::eqpt::mech::{Direction, Wheel, WheelDem};
use log::{debug, info, warn};
use mech_lib::motor_ctrl::{MotorDriver, MotorError};
use serde::Serialize;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::debounce::{HysteresisDebouncer, Sample};
use crate::error::SensorError;
use crate::leds::{show_rainbow, LedMode, StatusLeds};
use crate::line_sensor::{read_checked, Calibration, LineSensor, LineTracker};
use crate::params::{LineFollowParams, LineSensorParams};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Rainbow step after which the animation wraps.
const RAINBOW_STEPS: u32 = 256 * 4;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Status reported to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LfStatus {
    pub is_calibrated: bool,
    pub is_following: bool,
    pub speed: u8,
    pub position: u32,
    pub line_lost: bool,
}

pub struct LineFollower<M, S, L>
where
    M: MotorDriver,
    S: LineSensor,
    L: StatusLeds,
{
    motors: M,
    sensor: S,
    leds: L,

    calibration: Calibration,
    tracker: LineTracker,
    lost: HysteresisDebouncer,
    num_channels: usize,

    calibrated: bool,
    following: bool,

    /// Base speed.
    ///
    /// Units: percent duty
    speed: u8,

    position: u32,

    rainbow_step: u32,
    num_updates: u64,

    params: LineFollowParams,
}

/// Handle to the thread which updates the follower.
pub struct FollowLoop {
    shutdown: Arc<AtomicBool>,
    join_handle: Option<JoinHandle<()>>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(thiserror::Error, Debug)]
pub enum LineFollowError {
    #[error("Calibrate first")]
    NotCalibrated,

    #[error("Stop following before calibrating")]
    Following,

    #[error("Line sensor error: {0}")]
    Sensor(#[from] SensorError),

    #[error("Motor error: {0}")]
    Motor(#[from] MotorError),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<M, S, L> LineFollower<M, S, L>
where
    M: MotorDriver,
    S: LineSensor,
    L: StatusLeds,
{
    pub fn new(
        motors: M,
        sensor: S,
        leds: L,
        sensor_params: &LineSensorParams,
        params: &LineFollowParams,
    ) -> Result<Self, LineFollowError> {
        let n = sensor_params.num_channels;

        let mut lf = Self {
            motors,
            sensor,
            leds,
            calibration: Calibration::new(n),
            tracker: LineTracker::new(n, sensor_params.white_line),
            lost: HysteresisDebouncer::new(&params.debounce),
            num_channels: n,
            calibrated: false,
            following: false,
            speed: params.default_speed,
            position: (n.saturating_sub(1) * 500) as u32,
            rainbow_step: 0,
            num_updates: 0,
            params: params.clone(),
        };

        lf.brake()?;
        lf.leds.set_all(LedMode::Ready.colour());

        Ok(lf)
    }

    /// Spin on the spot over the line, calibrating the sensor at every step.
    pub fn calibrate(&mut self) -> Result<String, LineFollowError> {
        if self.following {
            return Err(LineFollowError::Following);
        }

        info!("Calibrating the line sensor");
        self.leds.set_all(LedMode::Calibrating.colour());

        match self.calibration_spin() {
            Ok(()) => {
                self.brake()?;

                info!(
                    "Calibration complete, min {:?}, max {:?}",
                    self.calibration.min, self.calibration.max
                );
                if self.calibration.is_suspicious() {
                    warn!("No variation seen during calibration, is the robot over the line?");
                }

                self.calibrated = true;
                self.leds.set_all(LedMode::Ready.colour());

                Ok("Calibration complete".into())
            }
            Err(e) => {
                warn!("Calibration failed: {}", e);
                self.brake().ok();
                self.leds.set_all(LedMode::Stopped.colour());
                Err(e)
            }
        }
    }

    pub fn start(&mut self) -> Result<String, LineFollowError> {
        if !self.calibrated {
            return Err(LineFollowError::NotCalibrated);
        }
        if self.following {
            return Ok("Already following the line".into());
        }

        info!("Starting line following at speed {}", self.speed);

        self.following = true;
        self.lost.reset();
        self.num_updates = 0;
        self.leds.set_all(LedMode::Following.colour());

        Ok("Line following started".into())
    }

    pub fn stop(&mut self) -> Result<String, LineFollowError> {
        if !self.following {
            return Ok("Was not following the line".into());
        }

        info!("Stopping line following");

        self.following = false;
        self.leds.set_all(LedMode::Stopped.colour());
        self.brake()?;

        Ok("Line following stopped".into())
    }

    /// Set the base speed, clamped to the speed limits.
    pub fn set_speed(&mut self, speed: i64) -> String {
        self.speed = speed.clamp(self.params.min_speed as i64, self.params.max_speed as i64) as u8;
        info!("Speed set to {}", self.speed);
        format!("Speed: {}", self.speed)
    }

    pub fn status(&self) -> LfStatus {
        LfStatus {
            is_calibrated: self.calibrated,
            is_following: self.following,
            speed: self.speed,
            position: self.position,
            line_lost: self.lost.is_unsafe(),
        }
    }

    pub fn is_following(&self) -> bool {
        self.following
    }

    /// One step of the control loop, does nothing unless following.
    pub fn update(&mut self) -> Result<(), LineFollowError> {
        if !self.following {
            return Ok(());
        }

        let raw = read_checked(&mut self.sensor, self.num_channels)?;
        let values = self.calibration.apply(&raw);
        self.position = self.tracker.update(&values);

        self.num_updates += 1;
        let log_now = self.params.log_every > 0 && self.num_updates % self.params.log_every == 0;

        if log_now {
            debug!("Position {:4} | channels {:?}", self.position, values);
        }

        let lost = self.lost.update(classify_line(
            &values,
            self.params.lost_threshold,
            self.params.lost_margin,
        ));

        if lost {
            if log_now {
                warn!("Line lost");
            }
            return self.brake();
        }

        let (left, right) = speed_law(self.position, self.speed as f64);
        self.motors.set_wheel(Wheel::Left, forward(left))?;
        self.motors.set_wheel(Wheel::Right, forward(right))?;

        show_rainbow(&mut self.leds, self.rainbow_step);
        self.rainbow_step += 1;
        if self.rainbow_step > RAINBOW_STEPS {
            self.rainbow_step = 0;
        }

        Ok(())
    }

    /// Stop following after a fault, best effort.
    pub fn abort(&mut self) {
        self.following = false;
        if let Err(e) = self.brake() {
            warn!("Could not brake the motors: {}", e);
        }
        self.leds.set_all(LedMode::Stopped.colour());
    }

    fn calibration_spin(&mut self) -> Result<(), LineFollowError> {
        let steps = self.params.calibration_steps;
        let duty = self.params.calibration_duty;
        let step = Duration::from_millis(self.params.calibration_step_ms);

        for i in 0..steps {
            // Right for the first and last quarters, left in the middle
            let (left, right) = if i < steps / 4 || i >= steps * 3 / 4 {
                (Direction::Forward, Direction::Reverse)
            } else {
                (Direction::Reverse, Direction::Forward)
            };

            self.motors.set_wheel(Wheel::Left, WheelDem { dir: left, duty_pct: duty })?;
            self.motors.set_wheel(Wheel::Right, WheelDem { dir: right, duty_pct: duty })?;

            self.calibration
                .calibrate(&mut self.sensor, self.params.calibration_reads)?;

            thread::sleep(step);
        }

        Ok(())
    }

    fn brake(&mut self) -> Result<(), LineFollowError> {
        self.motors.set_wheel(Wheel::Left, WheelDem::STOP)?;
        self.motors.set_wheel(Wheel::Right, WheelDem::STOP)?;
        Ok(())
    }
}

impl<M, S, L> Drop for LineFollower<M, S, L>
where
    M: MotorDriver,
    S: LineSensor,
    L: StatusLeds,
{
    fn drop(&mut self) {
        if let Err(e) = self.motors.release() {
            warn!("Could not release the motors: {}", e);
        }
        self.leds.set_all(LedMode::Off.colour());
    }
}

impl FollowLoop {
    /// Start updating the follower, fast while following and slowly otherwise.
    pub fn start<M, S, L>(
        follower: Arc<Mutex<LineFollower<M, S, L>>>,
        params: &LineFollowParams,
    ) -> std::io::Result<Self>
    where
        M: MotorDriver + Send + 'static,
        S: LineSensor + Send + 'static,
        L: StatusLeds + Send + 'static,
    {
        let shutdown = Arc::new(AtomicBool::new(false));
        let thread_shutdown = shutdown.clone();

        let follow_period = Duration::from_millis(params.follow_period_ms);
        let idle_period = Duration::from_millis(params.idle_period_ms);

        let join_handle = thread::Builder::new()
            .name("line_follow".into())
            .spawn(move || {
                while !thread_shutdown.load(Ordering::Relaxed) {
                    let following = match follower.lock() {
                        Ok(mut f) => {
                            if let Err(e) = f.update() {
                                warn!("Line follow update failed: {}, stopping", e);
                                f.abort();
                            }
                            f.is_following()
                        }
                        Err(_) => {
                            warn!("Line follower poisoned, stopping the update loop");
                            break;
                        }
                    };

                    thread::sleep(if following { follow_period } else { idle_period });
                }
            })?;

        Ok(Self {
            shutdown,
            join_handle: Some(join_handle),
        })
    }

    pub fn stop(mut self) {
        self.halt();
    }

    fn halt(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);

        if let Some(h) = self.join_handle.take() {
            if h.join().is_err() {
                warn!("Line follow thread panicked");
            }
        }
    }
}

impl Drop for FollowLoop {
    fn drop(&mut self) {
        self.halt();
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Wheel speeds `(left, right)` for a line position and base speed.
///
/// Positions run from 0 (line under the leftmost channel) to 4000, centre at 2000.
pub fn speed_law(position: u32, base: f64) -> (f64, f64) {
    match position {
        p if p < 1500 => (base, base * 0.3),
        p if p < 1900 => (base, base * 0.7),
        p if p < 2100 => (base, base),
        p if p < 2500 => (base * 0.7, base),
        _ => (base * 0.3, base),
    }
}

/// Classify a calibrated frame for the line lost debouncer.
///
/// Unsafe when every channel is above `threshold`, clear when any is below `threshold - margin`.
pub fn classify_line(values: &[u16], threshold: u16, margin: u16) -> Sample {
    if values.iter().all(|v| *v > threshold) {
        Sample::Unsafe
    } else if values.iter().any(|v| *v < threshold.saturating_sub(margin)) {
        Sample::Clear
    } else {
        Sample::Grey
    }
}

fn forward(duty: f64) -> WheelDem {
    WheelDem {
        dir: Direction::Forward,
        duty_pct: duty.round().clamp(0.0, 100.0) as u8,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::leds::{Rgb, SimLeds};
    use crate::line_sensor::SimLineSensor;
    use mech_lib::motor_ctrl::SimMotorDriver;

    type SimFollower = LineFollower<SimMotorDriver, SimLineSensor, SimLeds>;

    fn follower() -> (SimFollower, SimMotorDriver, SimLineSensor, SimLeds) {
        let motors = SimMotorDriver::new();
        let sensor = SimLineSensor::new(vec![500; 5]);
        let leds = SimLeds::new(4);

        let params = LineFollowParams {
            calibration_step_ms: 0,
            ..LineFollowParams::default()
        };

        let lf = LineFollower::new(
            motors.clone(),
            sensor.clone(),
            leds.clone(),
            &LineSensorParams::default(),
            &params,
        )
        .unwrap();

        (lf, motors, sensor, leds)
    }

    /// Calibrate with every pass seeing 0 and 1000, so calibrated values equal raw values.
    fn calibrate(lf: &mut SimFollower, sensor: &SimLineSensor) {
        for _ in 0..500 {
            sensor.push(vec![0; 5]);
            sensor.push(vec![1000; 5]);
        }
        lf.calibrate().unwrap();
    }

    #[test]
    fn test_speed_law() {
        assert_eq!(speed_law(0, 50.0), (50.0, 15.0));
        assert_eq!(speed_law(1499, 50.0), (50.0, 15.0));
        assert_eq!(speed_law(1500, 50.0), (50.0, 35.0));
        assert_eq!(speed_law(2000, 50.0), (50.0, 50.0));
        assert_eq!(speed_law(2100, 50.0), (35.0, 50.0));
        assert_eq!(speed_law(2499, 50.0), (35.0, 50.0));
        assert_eq!(speed_law(4000, 50.0), (15.0, 50.0));
    }

    #[test]
    fn test_classify_line() {
        assert_eq!(classify_line(&[950; 5], 900, 100), Sample::Unsafe);
        assert_eq!(classify_line(&[950, 950, 850, 950, 950], 900, 100), Sample::Grey);
        assert_eq!(classify_line(&[950, 950, 700, 950, 950], 900, 100), Sample::Clear);
    }

    #[test]
    fn test_commands() {
        let (mut lf, motors, sensor, leds) = follower();

        assert_eq!(leds.shown(), vec![LedMode::Ready.colour(); 4]);
        assert!(matches!(lf.start(), Err(LineFollowError::NotCalibrated)));
        assert_eq!(lf.stop().unwrap(), "Was not following the line");

        assert_eq!(lf.set_speed(500), "Speed: 100");
        assert_eq!(lf.set_speed(-5), "Speed: 10");
        assert_eq!(lf.set_speed(40), "Speed: 40");

        calibrate(&mut lf, &sensor);
        assert_eq!(motors.current(), (0, 0));
        assert!(lf.status().is_calibrated);

        assert_eq!(lf.start().unwrap(), "Line following started");
        assert_eq!(lf.start().unwrap(), "Already following the line");
        assert!(matches!(lf.calibrate(), Err(LineFollowError::Following)));
        assert_eq!(leds.shown(), vec![LedMode::Following.colour(); 4]);

        assert_eq!(lf.stop().unwrap(), "Line following stopped");
        assert_eq!(leds.shown(), vec![LedMode::Stopped.colour(); 4]);
        assert_eq!(motors.current(), (0, 0));
    }

    #[test]
    fn test_calibration_spin() {
        let (mut lf, motors, sensor, _leds) = follower();
        calibrate(&mut lf, &sensor);

        // Spin right, left, right then brake
        let h = motors.history();
        assert_eq!(h.len(), 2 + 200 + 2);
        assert_eq!(h[2].1.signed(), 30);
        assert_eq!(h[3].1.signed(), -30);
        assert_eq!(h[2 + 50].1.signed(), -30);
        assert_eq!(h[2 + 51].1.signed(), 30);
        assert_eq!(h[2 + 150].1.signed(), 30);
        assert_eq!(h[2 + 151].1.signed(), -30);
        assert_eq!(h[202].1, WheelDem::STOP);
    }

    #[test]
    fn test_failed_calibration() {
        let (mut lf, motors, sensor, leds) = follower();
        sensor.set_failing(true);

        assert!(matches!(lf.calibrate(), Err(LineFollowError::Sensor(_))));
        assert!(!lf.status().is_calibrated);
        assert_eq!(motors.current(), (0, 0));
        assert_eq!(leds.shown(), vec![LedMode::Stopped.colour(); 4]);
    }

    #[test]
    fn test_following() {
        let (mut lf, motors, sensor, leds) = follower();
        calibrate(&mut lf, &sensor);
        lf.set_speed(50);

        // Not following, nothing moves
        sensor.set_resting(vec![0, 0, 1000, 0, 0]);
        lf.update().unwrap();
        assert_eq!(motors.current(), (0, 0));

        lf.start().unwrap();

        lf.update().unwrap();
        assert_eq!(lf.status().position, 2000);
        assert_eq!(motors.current(), (50, 50));
        assert_ne!(leds.shown(), vec![LedMode::Following.colour(); 4]);

        // Line off to the left, turn towards it
        sensor.set_resting(vec![1000, 0, 0, 0, 0]);
        lf.update().unwrap();
        assert_eq!(motors.current(), (50, 15));

        sensor.set_resting(vec![0, 0, 0, 600, 400]);
        lf.update().unwrap();
        assert_eq!(lf.status().position, 3400);
        assert_eq!(motors.current(), (15, 50));
    }

    #[test]
    fn test_line_lost() {
        let (mut lf, motors, sensor, _leds) = follower();
        calibrate(&mut lf, &sensor);
        lf.set_speed(50);
        lf.start().unwrap();

        sensor.set_resting(vec![0, 0, 1000, 0, 0]);
        lf.update().unwrap();
        assert_eq!(motors.current(), (50, 50));

        // Two lost frames are not enough
        sensor.set_resting(vec![950; 5]);
        lf.update().unwrap();
        lf.update().unwrap();
        assert!(!lf.status().line_lost);
        assert_ne!(motors.current(), (0, 0));

        lf.update().unwrap();
        assert!(lf.status().line_lost);
        assert_eq!(motors.current(), (0, 0));

        // A faint reading is in the grey zone, still lost
        sensor.set_resting(vec![950, 950, 850, 950, 950]);
        for _ in 0..10 {
            lf.update().unwrap();
        }
        assert!(lf.status().line_lost);

        sensor.set_resting(vec![0, 0, 1000, 0, 0]);
        for _ in 0..4 {
            lf.update().unwrap();
            assert_eq!(motors.current(), (0, 0));
        }
        lf.update().unwrap();
        assert!(!lf.status().line_lost);
        assert_eq!(motors.current(), (50, 50));
    }

    #[test]
    fn test_update_loop_aborts_on_fault() {
        let (mut lf, motors, sensor, leds) = follower();
        calibrate(&mut lf, &sensor);
        lf.start().unwrap();

        let lf = Arc::new(Mutex::new(lf));
        let params = LineFollowParams {
            follow_period_ms: 1,
            idle_period_ms: 5,
            ..LineFollowParams::default()
        };
        let follow_loop = FollowLoop::start(lf.clone(), &params).unwrap();

        sensor.set_failing(true);
        thread::sleep(Duration::from_millis(100));

        assert!(!lf.lock().unwrap().is_following());
        assert_eq!(motors.current(), (0, 0));
        assert_eq!(leds.shown(), vec![Rgb(100, 0, 0); 4]);

        follow_loop.stop();
    }
}
