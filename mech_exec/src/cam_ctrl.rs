//! # Camera gimbal control
//!
//! The pan/tilt camera is driven in velocity mode: every update moves the demanded servo position
//! by an amount depending on the joystick deflection, so holding the stick keeps the camera
//! turning and releasing it leaves the camera where it is.
//!
//! Each update runs the following law per axis:
//!
//! 1. `delta = sign(v) * |v|^k * base_speed`, with the tilt axis inverted
//! 2. `target = clamp(position + delta, min_pulse, max_pulse)`
//! 3. `position = position * (1 - a) + target * a`
//! 4. `round(position)` is sent only if it differs from the last sent value by at least
//!    `min_movement`
//!
//! When both axes are inside the deadzone the servos are de-energized after a short grace time,
//! cheap hobby servos buzz when held. The grace and centring delays are not slept here: the owner
//! calls [`CamCtrl::poll`] at or after [`CamCtrl::next_deadline`].

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::eqpt::mech::CamAxis;
use log::{debug, trace};
use std::time::{Duration, Instant};
use util::maths::{clamp, signed_pow};

use crate::params::CamParams;
use crate::servo_ctrl::{ServoDriver, ServoError};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct CamCtrl<D: ServoDriver> {
    driver: D,

    /// Servo channels, indexed by [`CamAxis::index`]
    channels: [D::Channel; 2],

    params: CamParams,

    /// Current smoothed pulse width of each axis.
    ///
    /// Units: microseconds
    pos_us: [f64; 2],

    /// Pulse width last sent to each servo, `None` until the first output
    last_sent_us: [Option<i32>; 2],

    /// True between a non-idle update and the following idle one
    moving: bool,

    /// Pending de-energize of both servos
    off_at: Option<Instant>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<D: ServoDriver> CamCtrl<D> {
    /// Create the controller, starting at the centre without driving the servos.
    pub fn new(driver: D, channels: [D::Channel; 2], params: CamParams) -> Self {
        Self {
            driver,
            channels,
            pos_us: params.center_us,
            params,
            last_sent_us: [None, None],
            moving: false,
            off_at: None,
        }
    }

    /// Current demanded position, `[pan, tilt]`.
    ///
    /// Units: microseconds
    pub fn position(&self) -> [f64; 2] {
        self.pos_us
    }

    /// Apply one velocity update.
    pub fn update(&mut self, vx: f64, vy: f64, now: Instant) -> Result<(), ServoError> {
        let dz = self.params.deadzone;

        if vx.abs() < dz && vy.abs() < dz {
            if self.moving {
                self.moving = false;
                self.off_at = Some(now + Duration::from_millis(self.params.idle_grace_ms));
                trace!("Camera idle, de-energizing in {} ms", self.params.idle_grace_ms);
            }
            return Ok(());
        }

        self.moving = true;
        self.off_at = None;

        // Up on the stick is a smaller tilt pulse
        let deltas = [self.curve(vx), self.curve(-vy)];

        for axis in CamAxis::ALL.iter() {
            let i = axis.index();

            let target = clamp(
                &(self.pos_us[i] + deltas[i]),
                &self.params.min_pulse_us,
                &self.params.max_pulse_us,
            );

            let a = self.params.smoothing;
            self.pos_us[i] = self.pos_us[i] * (1.0 - a) + target * a;

            let out = self.pos_us[i].round() as i32;

            let significant = match self.last_sent_us[i] {
                Some(last) => (out - last).abs() >= self.params.min_movement_us,
                None => true,
            };

            if significant {
                self.send(*axis, out)?;
            }
        }

        Ok(())
    }

    /// Move both servos to the centre. They are de-energized once the settle time has passed.
    pub fn center(&mut self, now: Instant) -> Result<(), ServoError> {
        debug!("Centring camera");

        self.pos_us = self.params.center_us;
        self.moving = false;
        self.off_at = Some(now + Duration::from_millis(self.params.center_settle_ms));

        for axis in CamAxis::ALL.iter() {
            self.send(*axis, self.pos_us[axis.index()].round() as i32)?;
        }

        Ok(())
    }

    /// Centre the camera and wait for it to settle before de-energizing. Used at shutdown.
    pub fn center_blocking(&mut self) -> Result<(), ServoError> {
        self.center(Instant::now())?;
        std::thread::sleep(Duration::from_millis(self.params.center_settle_ms));
        self.off_at = None;
        self.de_energize()
    }

    /// Time at which [`CamCtrl::poll`] next has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.off_at
    }

    /// Perform any pending de-energize that is due.
    pub fn poll(&mut self, now: Instant) -> Result<(), ServoError> {
        match self.off_at {
            Some(t) if t <= now => {
                self.off_at = None;
                self.de_energize()
            }
            _ => Ok(()),
        }
    }

    fn de_energize(&mut self) -> Result<(), ServoError> {
        trace!("Camera servos off");

        for ch in self.channels.iter() {
            self.driver.set_off(*ch)?;
        }

        Ok(())
    }

    fn send(&mut self, axis: CamAxis, pulse_us: i32) -> Result<(), ServoError> {
        let i = axis.index();

        // Positions are clamped to the servo range so this always fits
        let pulse = pulse_us.max(0).min(u16::MAX as i32) as u16;

        self.driver.set_pulse_width(self.channels[i], pulse)?;
        self.last_sent_us[i] = Some(pulse_us);

        Ok(())
    }

    fn curve(&self, v: f64) -> f64 {
        signed_pow(v, self.params.curve_exp) * self.params.base_speed_us
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::servo_ctrl::{ServoOutput, SimServoDriver};

    fn cam() -> (CamCtrl<SimServoDriver>, SimServoDriver) {
        let sim = SimServoDriver::new();
        (
            CamCtrl::new(sim.clone(), [0, 1], CamParams::default()),
            sim,
        )
    }

    fn num_offs(sim: &SimServoDriver) -> usize {
        sim.history()
            .iter()
            .filter(|o| matches!(o, ServoOutput::Off { .. }))
            .count()
    }

    #[test]
    fn test_first_update_emits() {
        let (mut cam, sim) = cam();

        cam.update(1.0, 0.0, Instant::now()).unwrap();

        // 900 + 22 smoothed by 0.75 gives 916.5, rounded to 917. Tilt did not move but has never
        // been sent so it is emitted too.
        assert_eq!(sim.last_pulse(0), Some(917));
        assert_eq!(sim.last_pulse(1), Some(1100));
    }

    #[test]
    fn test_moves_monotonically_to_max() {
        let (mut cam, sim) = cam();
        let now = Instant::now();

        let mut last = 0;
        for _ in 0..200 {
            cam.update(1.0, 0.0, now).unwrap();
            let p = sim.last_pulse(0).unwrap();
            assert!(p >= last);
            last = p;
        }

        assert_eq!(sim.last_pulse(0), Some(1600));
        assert!(cam.position()[0] <= 1600.0);

        // Tilt only sent once
        let tilt_writes = sim
            .history()
            .iter()
            .filter(|o| matches!(o, ServoOutput::Pulse { channel: 1, .. }))
            .count();
        assert_eq!(tilt_writes, 1);
    }

    #[test]
    fn test_tilt_inverted() {
        let (mut cam, sim) = cam();

        cam.update(0.0, 1.0, Instant::now()).unwrap();

        assert!(sim.last_pulse(1).unwrap() < 1100);
        assert!(cam.position()[1] < 1100.0);
    }

    #[test]
    fn test_small_changes_suppressed() {
        let (mut cam, sim) = cam();
        let now = Instant::now();

        cam.update(1.0, 0.0, now).unwrap();
        sim.clear_history();

        // 0.06^1.2 * 22 * 0.75 is well under 2 us
        cam.update(0.06, 0.0, now).unwrap();
        assert!(sim.history().is_empty());
    }

    #[test]
    fn test_idle_de_energizes_once() {
        let (mut cam, sim) = cam();
        let t0 = Instant::now();

        cam.update(1.0, 0.0, t0).unwrap();
        cam.update(1.0, 0.0, t0).unwrap();
        let pos = cam.position();

        cam.update(0.0, 0.0, t0).unwrap();
        assert_eq!(cam.next_deadline(), Some(t0 + Duration::from_millis(50)));

        // Not due yet
        cam.poll(t0 + Duration::from_millis(10)).unwrap();
        assert_eq!(num_offs(&sim), 0);

        cam.poll(t0 + Duration::from_millis(50)).unwrap();
        assert_eq!(num_offs(&sim), 2);
        assert_eq!(cam.next_deadline(), None);

        // Repeated idle commands do nothing
        let writes = sim.history().len();
        for _ in 0..10 {
            cam.update(0.0, 0.0, t0).unwrap();
            cam.poll(t0 + Duration::from_secs(1)).unwrap();
        }
        assert_eq!(sim.history().len(), writes);

        // Position is held
        assert_eq!(cam.position(), pos);
    }

    #[test]
    fn test_move_cancels_pending_off() {
        let (mut cam, sim) = cam();
        let t0 = Instant::now();

        cam.update(1.0, 0.0, t0).unwrap();
        cam.update(0.01, 0.01, t0).unwrap();
        cam.update(1.0, 0.0, t0).unwrap();
        cam.poll(t0 + Duration::from_secs(1)).unwrap();

        assert_eq!(num_offs(&sim), 0);
    }

    #[test]
    fn test_center() {
        let (mut cam, sim) = cam();
        let t0 = Instant::now();

        for _ in 0..20 {
            cam.update(-1.0, -1.0, t0).unwrap();
        }

        cam.center(t0).unwrap();
        assert_eq!(cam.position(), [900.0, 1100.0]);
        assert_eq!(sim.last_pulse(0), Some(900));
        assert_eq!(sim.last_pulse(1), Some(1100));
        assert_eq!(cam.next_deadline(), Some(t0 + Duration::from_millis(300)));

        cam.poll(t0 + Duration::from_millis(300)).unwrap();
        assert_eq!(num_offs(&sim), 2);
    }

    #[test]
    fn test_fault_reported() {
        let (mut cam, sim) = cam();
        sim.set_failing(true);

        assert!(cam.update(1.0, 0.0, Instant::now()).is_err());
    }
}
