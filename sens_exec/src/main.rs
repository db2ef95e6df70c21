//! # Sensors Executable
//!
//! Runs one of the sensor driven behaviours of the robot:
//! - `obstacle`: monitor the ultrasonic rangers and sound the alarm while an obstacle is close
//! - `line-follow`: serve line following commands and run the line follower
//!
//! The line sensor ADC shares GPIO pins with the right ranger, so only one mode runs at a time.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

// External
use color_eyre::{eyre::WrapErr, Result};
use log::{debug, info};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use std::thread;
use std::time::Duration;
use structopt::StructOpt;

// Internal
use sens_lib::{
    alarm::Alarm,
    lf_server::LfServer,
    line_follow::{FollowLoop, LineFollower},
    obstacle::ObstacleMonitor,
    params::SensExecParams,
};
use util::{
    host,
    logger::{logger_init, LevelFilter},
    session::Session,
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Period at which the obstacle mode checks for shutdown and logs the ranges.
const OBSTACLE_MAIN_PERIOD: Duration = Duration::from_millis(500);

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, StructOpt)]
#[structopt(name = "sens_exec", about = "Sensor driven behaviours")]
enum Mode {
    /// Obstacle detection with the audible alarm.
    #[structopt(name = "obstacle")]
    Obstacle,

    /// Line following, controlled over TCP.
    #[structopt(name = "line-follow")]
    LineFollow,
}

// ------------------------------------------------------------------------------------------------
// MAIN
// ------------------------------------------------------------------------------------------------

fn main() -> Result<()> {
    let mode = Mode::from_args();

    // ---- EARLY INITIALISATION ----

    let session = Session::new("sens_exec", "sessions").wrap_err("Failed to create the session")?;

    logger_init(LevelFilter::Trace, &session).wrap_err("Failed to initialise logging")?;

    info!("Sensors Executable\n");
    info!(
        "Running on: {:#?}",
        host::get_uname().wrap_err("Failed to get host information")?
    );
    info!("Session directory: {:?}\n", session.session_root);
    info!("Mode: {:?}", mode);

    // ---- LOAD PARAMETERS ----

    let params: SensExecParams =
        util::params::load("sens_exec.toml").wrap_err("Failed to load parameters")?;

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

    let res = match mode {
        Mode::Obstacle => run_obstacle(&params, &shutdown),
        Mode::LineFollow => run_line_follow(&params, shutdown),
    };

    info!("End of execution");

    res
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn run_obstacle(params: &SensExecParams, shutdown: &AtomicBool) -> Result<()> {
    let (left, right, buzzer) =
        hw::init_obstacle(params).wrap_err("Failed to initialise the obstacle sensors")?;

    info!(
        "Alarm distance {} cm, beep {} ms / silence {} ms",
        params.obstacle.danger_cm, params.alarm.beep_ms, params.alarm.silence_ms
    );

    let monitor = ObstacleMonitor::start(left, right, &params.obstacle)
        .wrap_err("Failed to start the obstacle monitor")?;

    let view = monitor.view();
    let alarm = Alarm::start(buzzer, move || view.obstacle_detected(), &params.alarm)
        .wrap_err("Failed to start the alarm")?;

    info!("Initialisation complete, monitoring obstacles");

    while !shutdown.load(Ordering::Relaxed) {
        thread::sleep(OBSTACLE_MAIN_PERIOD);

        if let Some(s) = monitor.status() {
            debug!(
                "Left {:6.1} cm | Right {:6.1} cm | {}",
                s.left_cm,
                s.right_cm,
                if s.safe_to_move { "clear" } else { "OBSTACLE" }
            );
        }
    }

    alarm.stop();
    monitor.stop();

    Ok(())
}

fn run_line_follow(params: &SensExecParams, shutdown: Arc<AtomicBool>) -> Result<()> {
    let (motors, sensor, leds) =
        hw::init_line_follow(params).wrap_err("Failed to initialise the line follow equipment")?;

    let follower = LineFollower::new(
        motors,
        sensor,
        leds,
        &params.line_sensor,
        &params.line_follow,
    )
    .wrap_err("Failed to initialise the line follower")?;
    let follower = Arc::new(Mutex::new(follower));

    let follow_loop = FollowLoop::start(follower.clone(), &params.line_follow)
        .wrap_err("Failed to start the line follow loop")?;

    let mut server = LfServer::new(&params.net, follower, shutdown)
        .wrap_err("Failed to initialise the line follow server")?;

    info!("Initialisation complete, entering main loop");

    let res = server.run().wrap_err("Line follow server failed");

    follow_loop.stop();

    res
}

// ------------------------------------------------------------------------------------------------
// HARDWARE SELECTION
// ------------------------------------------------------------------------------------------------

/// Real sensors and actuators on the robot.
#[cfg(feature = "hw")]
mod hw {
    use color_eyre::{eyre::WrapErr, Result};
    use log::warn;
    use mech_lib::motor_ctrl::gpio::GpioMotorDriver;
    use rppal::gpio::Gpio;
    use sens_lib::{
        alarm::gpio::GpioBuzzer, leds::SimLeds, line_sensor::tlc1543::Tlc1543,
        params::SensExecParams, ultrasonic::hcsr04::HcSr04,
    };
    use std::time::Duration;

    pub fn init_obstacle(params: &SensExecParams) -> Result<(HcSr04, HcSr04, GpioBuzzer)> {
        let gpio = Gpio::new().wrap_err("Could not open the GPIO peripheral")?;
        let p = &params.obstacle;
        let timeout = Duration::from_millis(p.echo_timeout_ms);

        let left = HcSr04::new(&gpio, p.left_pins[0], p.left_pins[1], timeout)?;
        let right = HcSr04::new(&gpio, p.right_pins[0], p.right_pins[1], timeout)?;
        let buzzer = GpioBuzzer::new(&gpio, params.alarm.buzzer_pin, params.alarm.tone_hz)?;

        Ok((left, right, buzzer))
    }

    pub fn init_line_follow(
        params: &SensExecParams,
    ) -> Result<(GpioMotorDriver, Tlc1543, SimLeds)> {
        let gpio = Gpio::new().wrap_err("Could not open the GPIO peripheral")?;

        let motors = GpioMotorDriver::new(&params.drive)?;
        let sensor = Tlc1543::new(&gpio, &params.line_sensor)?;

        warn!("No LED strip driver, status LEDs are logged only");

        Ok((motors, sensor, SimLeds::new(params.num_leds)))
    }
}

/// Simulated sensors and actuators.
#[cfg(not(feature = "hw"))]
mod hw {
    use color_eyre::Result;
    use log::warn;
    use mech_lib::motor_ctrl::SimMotorDriver;
    use sens_lib::{
        alarm::SimBuzzer,
        leds::SimLeds,
        line_sensor::SimLineSensor,
        params::SensExecParams,
        ultrasonic::SimDistanceSensor,
    };

    pub fn init_obstacle(
        params: &SensExecParams,
    ) -> Result<(SimDistanceSensor, SimDistanceSensor, SimBuzzer)> {
        warn!("Built without the `hw` feature, using simulated rangers");

        let max = params.obstacle.max_range_cm;
        Ok((
            SimDistanceSensor::new(max),
            SimDistanceSensor::new(max),
            SimBuzzer::new(),
        ))
    }

    pub fn init_line_follow(
        params: &SensExecParams,
    ) -> Result<(SimMotorDriver, SimLineSensor, SimLeds)> {
        warn!("Built without the `hw` feature, using a simulated line sensor and motors");

        Ok((
            SimMotorDriver::new(),
            SimLineSensor::new(vec![0; params.line_sensor.num_channels]),
            SimLeds::new(params.num_leds),
        ))
    }
}
