//! # Equipment service
//!
//! A single thread owns the motor driver and the camera controller. Everything else (command
//! server, watchdog, shutdown) reaches the hardware by sending [`EqptCmd`]s through an
//! [`EqptHandle`], so two writers can never interleave on the physical pins.
//!
//! The service also publishes two flags which can be read without going through the queue:
//! whether the drive is running and whether the camera is available. A servo fault clears the
//! camera flag for the rest of the session, the drive keeps working.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{debug, error, info, warn};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    mpsc::{self, Receiver, RecvTimeoutError, Sender},
    Arc,
};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::cam_ctrl::CamCtrl;
use crate::drive::DriveCtrl;
use crate::motor_ctrl::MotorDriver;
use crate::servo_ctrl::{ServoDriver, ServoError};
use crate::watchdog::Deadline;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Time allowed for the service to release the hardware at shutdown, which includes centring
/// the camera.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Cloneable handle used to send commands to the equipment service.
#[derive(Clone)]
pub struct EqptHandle {
    tx: Sender<Request>,
    state: Arc<EqptState>,
}

/// The running equipment service. Dropping it releases the hardware and joins the thread.
pub struct EqptService {
    handle: EqptHandle,
    join_handle: Option<JoinHandle<()>>,
}

/// Flags published by the service.
struct EqptState {
    drive_active: AtomicBool,
    cam_available: AtomicBool,
}

struct Request {
    cmd: EqptCmd,
    ack: Option<Sender<()>>,
}

/// The hardware owned by the service thread.
///
/// Releases the outputs when dropped, so the motors stop even if the thread unwinds.
struct Hardware<M: MotorDriver, D: ServoDriver> {
    drive: DriveCtrl<M>,
    cam: Option<CamCtrl<D>>,
    state: Arc<EqptState>,
    deadline: Arc<Deadline>,
    released: bool,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Commands accepted by the equipment service.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum EqptCmd {
    /// Signed wheel demands in percent
    Drive { left: i32, right: i32 },

    /// Brake both wheels
    Stop,

    /// Watchdog expiry, carrying the deadline stamp the watchdog saw.
    ///
    /// Ignored if a command has been accepted since.
    Timeout { stamp: u64 },

    /// Camera velocity update
    Camera { vx: f64, vy: f64 },

    /// Centre the camera
    CamCenter,

    /// Stop everything, centre the camera and exit the service
    Shutdown,
}

#[derive(thiserror::Error, Debug)]
pub enum EqptError {
    #[error("The equipment service is not running")]
    NotRunning,

    #[error("The equipment service did not acknowledge the command in time")]
    AckTimeout,

    #[error("Could not start the equipment service thread: {0}")]
    SpawnError(std::io::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl EqptService {
    /// Start the service, taking ownership of the drive and (optionally) the camera.
    pub fn start<M, D>(
        drive: DriveCtrl<M>,
        cam: Option<CamCtrl<D>>,
        deadline: Arc<Deadline>,
    ) -> Result<Self, EqptError>
    where
        M: MotorDriver + Send + 'static,
        D: ServoDriver + Send + 'static,
        D::Channel: Send,
    {
        let state = Arc::new(EqptState {
            drive_active: AtomicBool::new(false),
            cam_available: AtomicBool::new(cam.is_some()),
        });

        let (tx, rx) = mpsc::channel();

        let hw = Hardware {
            drive,
            cam,
            state: state.clone(),
            deadline,
            released: false,
        };

        let join_handle = thread::Builder::new()
            .name("eqpt_service".into())
            .spawn(move || service_loop(hw, rx))
            .map_err(EqptError::SpawnError)?;

        Ok(Self {
            handle: EqptHandle { tx, state },
            join_handle: Some(join_handle),
        })
    }

    pub fn handle(&self) -> EqptHandle {
        self.handle.clone()
    }

    /// Release the hardware and wait for the service thread to exit.
    pub fn shutdown(mut self) {
        self.halt();
    }

    fn halt(&mut self) {
        let join_handle = match self.join_handle.take() {
            Some(h) => h,
            None => return,
        };

        info!("Shutting down equipment");

        if let Err(e) = self.handle.send_wait(EqptCmd::Shutdown, SHUTDOWN_TIMEOUT) {
            warn!("Equipment shutdown not acknowledged: {}", e);
        }

        if join_handle.join().is_err() {
            error!("Equipment service thread panicked");
        }
    }
}

impl Drop for EqptService {
    fn drop(&mut self) {
        self.halt();
    }
}

impl EqptHandle {
    /// Queue a command without waiting for it to be executed.
    pub fn send(&self, cmd: EqptCmd) -> Result<(), EqptError> {
        self.tx
            .send(Request { cmd, ack: None })
            .map_err(|_| EqptError::NotRunning)
    }

    /// Queue a command and wait until the service has executed it.
    pub fn send_wait(&self, cmd: EqptCmd, timeout: Duration) -> Result<(), EqptError> {
        let (ack_tx, ack_rx) = mpsc::channel();

        self.tx
            .send(Request {
                cmd,
                ack: Some(ack_tx),
            })
            .map_err(|_| EqptError::NotRunning)?;

        match ack_rx.recv_timeout(timeout) {
            Ok(_) => Ok(()),
            Err(RecvTimeoutError::Timeout) => Err(EqptError::AckTimeout),
            Err(RecvTimeoutError::Disconnected) => Err(EqptError::NotRunning),
        }
    }

    /// True while the last drive demand is non-zero (or unknown after a fault).
    pub fn drive_active(&self) -> bool {
        self.state.drive_active.load(Ordering::SeqCst)
    }

    /// False once the camera has faulted, or if there is no camera.
    pub fn cam_available(&self) -> bool {
        self.state.cam_available.load(Ordering::SeqCst)
    }
}

impl<M: MotorDriver, D: ServoDriver> Hardware<M, D> {
    fn handle(&mut self, cmd: EqptCmd) {
        let now = Instant::now();

        match cmd {
            EqptCmd::Drive { left, right } => {
                if let Err(e) = self.drive.set(left, right) {
                    error!("Could not set drive demands: {}", e);
                }
            }
            EqptCmd::Stop => self.stop_drive(),
            EqptCmd::Timeout { stamp } => {
                if self.deadline.stamp() == stamp {
                    self.stop_drive();
                } else {
                    debug!("Watchdog stop superseded by a newer command");
                }
            }
            EqptCmd::Camera { vx, vy } => {
                let res = match self.cam.as_mut() {
                    Some(c) => c.update(vx, vy, now),
                    None => Ok(()),
                };
                self.check_cam(res);
            }
            EqptCmd::CamCenter => {
                let res = match self.cam.as_mut() {
                    Some(c) => c.center(now),
                    None => Ok(()),
                };
                self.check_cam(res);
            }
            EqptCmd::Shutdown => self.release(),
        }

        self.publish();
    }

    fn poll_cam(&mut self) {
        let res = match self.cam.as_mut() {
            Some(c) => c.poll(Instant::now()),
            None => Ok(()),
        };
        self.check_cam(res);
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.cam.as_ref().and_then(|c| c.next_deadline())
    }

    fn stop_drive(&mut self) {
        if let Err(e) = self.drive.stop() {
            error!("Could not stop the drive: {}", e);
        }
    }

    /// Move the camera into degraded mode after a servo fault.
    fn check_cam(&mut self, res: Result<(), ServoError>) {
        if let Err(e) = res {
            error!("Camera servo fault, camera no longer available: {}", e);
            self.cam = None;
            self.publish();
        }
    }

    fn publish(&self) {
        self.state
            .drive_active
            .store(self.drive.is_active(), Ordering::SeqCst);
        self.state
            .cam_available
            .store(self.cam.is_some(), Ordering::SeqCst);
    }

    /// Stop the motors, release their outputs and park the camera.
    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        if let Err(e) = self.drive.release() {
            error!("Could not release the drive: {}", e);
        }

        if let Some(c) = self.cam.as_mut() {
            if let Err(e) = c.center_blocking() {
                error!("Could not centre the camera: {}", e);
            }
        }

        self.publish();
        info!("Equipment released");
    }
}

impl<M: MotorDriver, D: ServoDriver> Drop for Hardware<M, D> {
    fn drop(&mut self) {
        self.release();
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn service_loop<M: MotorDriver, D: ServoDriver>(mut hw: Hardware<M, D>, rx: Receiver<Request>) {
    debug!("Equipment service started");

    loop {
        // Wake for the camera's next pending action, or wait for a command
        let req = match hw.next_deadline() {
            Some(t) => match rx.recv_timeout(t.saturating_duration_since(Instant::now())) {
                Ok(r) => Some(r),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => break,
            },
            None => match rx.recv() {
                Ok(r) => Some(r),
                Err(_) => break,
            },
        };

        if let Some(req) = req {
            let exit = req.cmd == EqptCmd::Shutdown;

            hw.handle(req.cmd);

            if let Some(ack) = req.ack {
                ack.send(()).ok();
            }

            if exit {
                break;
            }
        }

        hw.poll_cam();
    }

    debug!("Equipment service exiting");
}
