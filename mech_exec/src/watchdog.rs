//! # Safety watchdog
//!
//! The command server refreshes a shared [`Deadline`] every time it accepts a drive or camera
//! command. A background thread checks the deadline at a fixed period and stops the drive if the
//! motors are running and no command has been accepted within the timeout. A stop that fails is
//! sent again every period until the drive reads inactive.
//!
//! The watchdog only needs the deadline and the equipment handle, so it keeps working whatever
//! the command server is doing (blocked on a read, handling a slow client, etc.). It never touches
//! the camera.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{debug, warn};
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::eqpt_service::{EqptCmd, EqptHandle};
use crate::params::WatchdogParams;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Time of the last accepted command, shared between the server and the watchdog.
pub struct Deadline {
    epoch: Instant,

    /// Microseconds from `epoch` to the last refresh
    last_us: AtomicU64,
}

/// Handle to the running watchdog thread.
pub struct Watchdog {
    join_handle: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    num_timeouts: Arc<AtomicU64>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Deadline {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            last_us: AtomicU64::new(0),
        }
    }

    /// Mark a command as accepted now.
    pub fn refresh(&self) {
        self.last_us.store(self.now_us(), Ordering::SeqCst);
    }

    /// Opaque stamp of the last refresh, changes every time the deadline is refreshed.
    pub fn stamp(&self) -> u64 {
        self.last_us.load(Ordering::SeqCst)
    }

    /// Time since the last refresh.
    pub fn elapsed(&self) -> Duration {
        Duration::from_micros(self.now_us().saturating_sub(self.stamp()))
    }

    fn now_us(&self) -> u64 {
        // Stamps are kept distinct from the initial zero
        (self.epoch.elapsed().as_micros() as u64).max(1)
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Self::new()
    }
}

impl Watchdog {
    /// Start the watchdog thread.
    pub fn start(
        deadline: Arc<Deadline>,
        eqpt: EqptHandle,
        params: &WatchdogParams,
    ) -> std::io::Result<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let num_timeouts = Arc::new(AtomicU64::new(0));

        let timeout = Duration::from_millis(params.timeout_ms);
        let period = Duration::from_millis(params.poll_period_ms);

        let thread_shutdown = shutdown.clone();
        let thread_timeouts = num_timeouts.clone();

        let join_handle = thread::Builder::new()
            .name("watchdog".into())
            .spawn(move || {
                watchdog_loop(
                    deadline,
                    eqpt,
                    timeout,
                    period,
                    thread_shutdown,
                    thread_timeouts,
                )
            })?;

        debug!(
            "Watchdog started, timeout {} ms, period {} ms",
            params.timeout_ms, params.poll_period_ms
        );

        Ok(Self {
            join_handle: Some(join_handle),
            shutdown,
            num_timeouts,
        })
    }

    /// Number of times the watchdog has stopped the drive.
    pub fn num_timeouts(&self) -> u64 {
        self.num_timeouts.load(Ordering::Relaxed)
    }

    /// Stop the watchdog thread and wait for it to exit.
    pub fn stop(mut self) {
        self.halt();
    }

    fn halt(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);

        if let Some(h) = self.join_handle.take() {
            if h.join().is_err() {
                warn!("Watchdog thread panicked");
            }
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.halt();
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn watchdog_loop(
    deadline: Arc<Deadline>,
    eqpt: EqptHandle,
    timeout: Duration,
    period: Duration,
    shutdown: Arc<AtomicBool>,
    num_timeouts: Arc<AtomicU64>,
) {
    // Stamp of the deadline that last triggered a stop, so one silence counts as one event
    let mut fired_stamp = None;

    while !shutdown.load(Ordering::Relaxed) {
        thread::sleep(period);

        let stamp = deadline.stamp();
        let elapsed = deadline.elapsed();

        if !eqpt.drive_active() || elapsed <= timeout {
            continue;
        }

        // The stop is re-issued every period until the drive reads inactive
        let retry = fired_stamp == Some(stamp);

        if retry {
            warn!("Drive still active after a watchdog stop, stopping motors again");
        } else {
            warn!(
                "No command for {} ms while driving, stopping motors",
                elapsed.as_millis()
            );
        }

        match eqpt.send(EqptCmd::Timeout { stamp }) {
            Ok(_) => {
                if !retry {
                    fired_stamp = Some(stamp);
                    num_timeouts.fetch_add(1, Ordering::Relaxed);
                }
            }
            Err(e) => {
                warn!("Watchdog could not reach the equipment service: {}", e);
                break;
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cam_ctrl::CamCtrl;
    use crate::drive::DriveCtrl;
    use crate::eqpt_service::EqptService;
    use crate::motor_ctrl::SimMotorDriver;
    use crate::servo_ctrl::SimServoDriver;

    #[test]
    fn test_stop_retried_after_motor_fault() {
        let motors = SimMotorDriver::new();
        let deadline = Arc::new(Deadline::new());

        let service = EqptService::start(
            DriveCtrl::new(motors.clone(), 5.0),
            None::<CamCtrl<SimServoDriver>>,
            deadline.clone(),
        )
        .unwrap();
        let h = service.handle();

        let params = WatchdogParams {
            timeout_ms: 100,
            poll_period_ms: 20,
        };
        let watchdog = Watchdog::start(deadline.clone(), service.handle(), &params).unwrap();

        deadline.refresh();
        h.send_wait(EqptCmd::Drive { left: 100, right: -100 }, Duration::from_secs(1))
            .unwrap();
        assert_eq!(motors.current(), (100, -100));

        // Every stop fails while the fault lasts, well past the timeout
        motors.set_failing(true);
        thread::sleep(Duration::from_millis(400));
        assert_eq!(motors.current(), (100, -100));
        assert!(h.drive_active());

        // No client, fault cleared: the watchdog must still stop the drive
        motors.set_failing(false);
        thread::sleep(Duration::from_millis(200));
        assert_eq!(motors.current(), (0, 0));
        assert!(!h.drive_active());

        // Retries belong to the same silence
        assert_eq!(watchdog.num_timeouts(), 1);

        watchdog.stop();
        service.shutdown();
    }

    #[test]
    fn test_deadline() {
        let d = Deadline::new();
        let s0 = d.stamp();

        thread::sleep(Duration::from_millis(20));
        assert!(d.elapsed() >= Duration::from_millis(20));

        d.refresh();
        assert_ne!(d.stamp(), s0);
        assert!(d.elapsed() < Duration::from_millis(20));
    }
}
