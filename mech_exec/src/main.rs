//! # Mechanisms Control Executable
//!
//! This executable is responsible for controlling the mechanisms of the robot:
//! - The two drive motors
//! - The pan/tilt camera gimbal
//!
//! Operator commands arrive on the command server, the drive is stopped by the watchdog if they
//! stop arriving.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Result};
use log::{info, warn};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

// Internal
use mech_lib::{
    drive::DriveCtrl,
    eqpt_service::EqptService,
    mech_server::MechServer,
    params::MechExecParams,
    watchdog::{Deadline, Watchdog},
};
use util::{
    host,
    logger::{logger_init, LevelFilter},
    session::Session,
};

// ------------------------------------------------------------------------------------------------
// MAIN
// ------------------------------------------------------------------------------------------------

fn main() -> Result<()> {
    // ---- EARLY INITIALISATION ----

    // Initialise session
    let session = Session::new("mech_exec", "sessions").wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Trace, &session).wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("Mechanisms Control Executable\n");
    info!(
        "Running on: {:#?}",
        host::get_uname().wrap_err("Failed to get host information")?
    );
    info!("Session directory: {:?}\n", session.session_root);

    info!("Initialising...");

    // ---- LOAD PARAMETERS ----

    let params: MechExecParams =
        util::params::load("mech_exec.toml").wrap_err("Failed to load parameters")?;

    info!("Parameters loaded");

    // ---- SHUTDOWN HANDLING ----

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || {
            info!("Shutdown requested");
            shutdown.store(true, Ordering::Relaxed);
        })
        .wrap_err("Failed to set the shutdown handler")?;
    }

    // ---- EQUIPMENT INITIALISATION ----

    // Without the drive there is nothing to do, so this is fatal
    let motors = hw::init_motors(&params).wrap_err("Failed to initialise the drive motors")?;
    let drive = DriveCtrl::new(motors, params.drive.deadzone_pct);

    // The camera is optional
    let cam = if params.cam.enabled {
        match hw::init_cam(&params) {
            Ok(c) => {
                info!("Camera gimbal initialised");
                Some(c)
            }
            Err(e) => {
                warn!("Camera not available: {}", e);
                None
            }
        }
    } else {
        info!("Camera disabled in parameters");
        None
    };

    let deadline = Arc::new(Deadline::new());

    let service = EqptService::start(drive, cam, deadline.clone())
        .wrap_err("Failed to start the equipment service")?;

    info!("Equipment initialised");

    // ---- SAFETY WATCHDOG ----

    let watchdog = Watchdog::start(deadline.clone(), service.handle(), &params.watchdog)
        .wrap_err("Failed to start the watchdog")?;

    // ---- SERVER INITIALISATION ----

    let mut server = MechServer::new(
        &params.net,
        service.handle(),
        deadline,
        shutdown,
        params.drive.deadzone_pct,
        Duration::from_millis(params.drive.stop_ack_timeout_ms),
    )
    .wrap_err("Failed to initialise server")?;

    info!("Server initialised");

    // ---- MAIN LOOP ----

    info!("Initialisation complete, entering main loop");

    let res = server.run().wrap_err("Command server failed");

    // ---- SHUTDOWN ----

    info!("Watchdog stopped the drive {} times", watchdog.num_timeouts());

    watchdog.stop();
    service.shutdown();

    info!("End of execution");

    res
}

// ------------------------------------------------------------------------------------------------
// HARDWARE SELECTION
// ------------------------------------------------------------------------------------------------

/// Real drivers on the robot.
#[cfg(feature = "hw")]
mod hw {
    use mech_lib::{
        cam_ctrl::CamCtrl,
        motor_ctrl::{gpio::GpioMotorDriver, MotorError},
        params::MechExecParams,
        servo_ctrl::{
            pca9685::{channel_from_index, Pca9685Servo},
            ServoError,
        },
    };
    use rppal::i2c::I2c;

    pub fn init_motors(params: &MechExecParams) -> Result<GpioMotorDriver, MotorError> {
        GpioMotorDriver::new(&params.drive)
    }

    pub fn init_cam(params: &MechExecParams) -> Result<CamCtrl<Pca9685Servo<I2c>>, ServoError> {
        let p = &params.cam;

        let i2c = I2c::new().map_err(|_| ServoError::I2c)?;
        let servo = Pca9685Servo::new(i2c, p.i2c_address, p.pwm_freq_hz)?;
        let channels = [
            channel_from_index(p.pan_channel)?,
            channel_from_index(p.tilt_channel)?,
        ];

        Ok(CamCtrl::new(servo, channels, p.clone()))
    }
}

/// Simulated drivers, which log their outputs.
#[cfg(not(feature = "hw"))]
mod hw {
    use log::warn;
    use mech_lib::{
        cam_ctrl::CamCtrl,
        motor_ctrl::{MotorError, SimMotorDriver},
        params::MechExecParams,
        servo_ctrl::{ServoError, SimServoDriver},
    };

    pub fn init_motors(_params: &MechExecParams) -> Result<SimMotorDriver, MotorError> {
        warn!("Built without the `hw` feature, using simulated motors");
        Ok(SimMotorDriver::new())
    }

    pub fn init_cam(params: &MechExecParams) -> Result<CamCtrl<SimServoDriver>, ServoError> {
        let p = &params.cam;
        Ok(CamCtrl::new(
            SimServoDriver::new(),
            [p.pan_channel, p.tilt_channel],
            p.clone(),
        ))
    }
}
