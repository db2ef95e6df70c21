//! # Line Follow Server Module
//!
//! TCP server for the line follower. Every client gets its own thread, commands from all clients
//! act on the same follower.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::{
    net::{LineConn, LineEvent, NetError, NetParams},
    tc::line_follow::{LfResponse, LfTc},
};
use log::{debug, info, trace, warn};
use mech_lib::motor_ctrl::MotorDriver;
use std::io;
use std::net::{SocketAddr, TcpListener};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::leds::StatusLeds;
use crate::line_follow::LineFollower;
use crate::line_sensor::LineSensor;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

const ACCEPT_POLL_PERIOD: Duration = Duration::from_millis(50);

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

pub struct LfServer<M, S, L>
where
    M: MotorDriver,
    S: LineSensor,
    L: StatusLeds,
{
    listener: TcpListener,
    read_timeout: Duration,
    follower: Arc<Mutex<LineFollower<M, S, L>>>,
    shutdown: Arc<AtomicBool>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(thiserror::Error, Debug)]
pub enum LfServerError {
    #[error("Could not bind the server socket: {0}")]
    BindError(io::Error),

    #[error("Could not accept a connection: {0}")]
    AcceptError(io::Error),

    #[error("Could not start a client thread: {0}")]
    SpawnError(io::Error),

    #[error("Network error: {0}")]
    NetError(#[from] NetError),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl<M, S, L> LfServer<M, S, L>
where
    M: MotorDriver + Send + 'static,
    S: LineSensor + Send + 'static,
    L: StatusLeds + Send + 'static,
{
    pub fn new(
        params: &NetParams,
        follower: Arc<Mutex<LineFollower<M, S, L>>>,
        shutdown: Arc<AtomicBool>,
    ) -> Result<Self, LfServerError> {
        let listener = TcpListener::bind(params.endpoint()).map_err(LfServerError::BindError)?;
        listener
            .set_nonblocking(true)
            .map_err(LfServerError::BindError)?;

        Ok(Self {
            listener,
            read_timeout: params.read_timeout(),
            follower,
            shutdown,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept clients until the shutdown flag is set, then wait for their threads to finish.
    pub fn run(&mut self) -> Result<(), LfServerError> {
        info!(
            "Line follow server listening on {:?}",
            self.listener.local_addr().ok()
        );

        let mut clients: Vec<JoinHandle<()>> = Vec::new();

        while !self.shutdown.load(Ordering::Relaxed) {
            let (stream, addr) = match self.listener.accept() {
                Ok(s) => s,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    clients.retain(|c| !c.is_finished());
                    thread::sleep(ACCEPT_POLL_PERIOD);
                    continue;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(LfServerError::AcceptError(e)),
            };

            info!("Line follow client connected from {}", addr);

            let conn = match stream
                .set_nonblocking(false)
                .map_err(NetError::SocketOptionError)
                .and_then(|_| LineConn::new(stream, Some(self.read_timeout)))
            {
                Ok(c) => c,
                Err(e) => {
                    warn!("Could not set up client {}: {}", addr, e);
                    continue;
                }
            };

            let follower = self.follower.clone();
            let shutdown = self.shutdown.clone();

            let handle = thread::Builder::new()
                .name(format!("lf_client_{}", addr))
                .spawn(move || match serve_client(conn, &follower, &shutdown) {
                    Ok(()) => info!("Line follow client {} disconnected", addr),
                    Err(e) => warn!("Fault while serving line follow client {}: {}", addr, e),
                })
                .map_err(LfServerError::SpawnError)?;

            clients.push(handle);
        }

        for c in clients {
            if c.join().is_err() {
                warn!("Line follow client thread panicked");
            }
        }

        info!("Line follow server stopped");

        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn serve_client<M, S, L>(
    mut conn: LineConn,
    follower: &Mutex<LineFollower<M, S, L>>,
    shutdown: &AtomicBool,
) -> Result<(), LfServerError>
where
    M: MotorDriver,
    S: LineSensor,
    L: StatusLeds,
{
    loop {
        let line = match conn.recv()? {
            LineEvent::Line(l) => l,
            LineEvent::Timeout => {
                if shutdown.load(Ordering::Relaxed) {
                    conn.close();
                    return Ok(());
                }
                continue;
            }
            LineEvent::Closed => return Ok(()),
        };

        if line.trim().is_empty() {
            continue;
        }

        trace!("Line follow command \"{}\"", line);

        let response = match line.parse::<LfTc>() {
            Ok(tc) => handle_tc(follower, tc),
            Err(e) => LfResponse::from(e),
        };

        debug!("Line follow reply \"{}\"", response);

        conn.send_line(&response.to_string())?;
    }
}

/// Execute one command against the follower.
pub fn handle_tc<M, S, L>(follower: &Mutex<LineFollower<M, S, L>>, tc: LfTc) -> LfResponse
where
    M: MotorDriver,
    S: LineSensor,
    L: StatusLeds,
{
    let mut lf = match follower.lock() {
        Ok(lf) => lf,
        Err(_) => return LfResponse::Error("Line follower unavailable".into()),
    };

    let result = match tc {
        LfTc::Calibrate => lf.calibrate(),
        LfTc::Start => lf.start(),
        LfTc::Stop => lf.stop(),
        LfTc::Speed(s) => Ok(lf.set_speed(s)),
        LfTc::Status => {
            return match serde_json::to_string(&lf.status()) {
                Ok(s) => LfResponse::Ok(s),
                Err(e) => LfResponse::Error(e.to_string()),
            }
        }
    };

    match result {
        Ok(m) => LfResponse::Ok(m),
        Err(e) => LfResponse::Error(e.to_string()),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::leds::SimLeds;
    use crate::line_sensor::SimLineSensor;
    use crate::params::{LineFollowParams, LineSensorParams};
    use mech_lib::motor_ctrl::SimMotorDriver;

    type SimFollower = LineFollower<SimMotorDriver, SimLineSensor, SimLeds>;

    struct Fixture {
        addr: SocketAddr,
        sensor: SimLineSensor,
        shutdown: Arc<AtomicBool>,
        server: Option<JoinHandle<()>>,
    }

    impl Fixture {
        fn new() -> Self {
            let sensor = SimLineSensor::new(vec![500; 5]);

            let params = LineFollowParams {
                calibration_step_ms: 0,
                ..LineFollowParams::default()
            };
            let follower: SimFollower = LineFollower::new(
                SimMotorDriver::new(),
                sensor.clone(),
                SimLeds::new(4),
                &LineSensorParams::default(),
                &params,
            )
            .unwrap();

            let shutdown = Arc::new(AtomicBool::new(false));
            let net = NetParams {
                bind_addr: "127.0.0.1".into(),
                port: 0,
                read_timeout_ms: 20,
            };

            let mut server =
                LfServer::new(&net, Arc::new(Mutex::new(follower)), shutdown.clone()).unwrap();
            let addr = server.local_addr().unwrap();
            let server = thread::spawn(move || server.run().unwrap());

            Self {
                addr,
                sensor,
                shutdown,
                server: Some(server),
            }
        }

        fn connect(&self) -> LineConn {
            LineConn::connect(self.addr, Duration::from_secs(1), Some(Duration::from_secs(2)))
                .unwrap()
        }
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            self.shutdown.store(true, Ordering::Relaxed);
            if let Some(s) = self.server.take() {
                s.join().ok();
            }
        }
    }

    fn cmd(conn: &mut LineConn, line: &str) -> String {
        conn.send_line(line).unwrap();
        match conn.recv().unwrap() {
            LineEvent::Line(l) => l,
            e => panic!("Expected a reply to {}, got {:?}", line, e),
        }
    }

    #[test]
    fn test_commands() {
        let f = Fixture::new();
        let mut conn = f.connect();

        assert_eq!(cmd(&mut conn, "start"), "ERROR:Calibrate first");
        assert_eq!(cmd(&mut conn, "stop"), "OK:Was not following the line");
        assert_eq!(cmd(&mut conn, "SPEED:250"), "OK:Speed: 100");
        assert_eq!(
            cmd(&mut conn, "speed:fast"),
            "ERROR:Invalid speed format: invalid digit found in string"
        );
        assert_eq!(cmd(&mut conn, "jump"), "ERROR:Unknown command: jump");

        assert_eq!(cmd(&mut conn, "calibrate"), "OK:Calibration complete");
        assert_eq!(cmd(&mut conn, "start"), "OK:Line following started");
        assert_eq!(cmd(&mut conn, "start"), "OK:Already following the line");

        let status = cmd(&mut conn, "status");
        let json: serde_json::Value =
            serde_json::from_str(status.strip_prefix("OK:").unwrap()).unwrap();
        assert_eq!(json["is_calibrated"], true);
        assert_eq!(json["is_following"], true);
        assert_eq!(json["speed"], 100);

        assert_eq!(cmd(&mut conn, "stop"), "OK:Line following stopped");
    }

    #[test]
    fn test_clients_share_follower() {
        let f = Fixture::new();
        let mut a = f.connect();
        let mut b = f.connect();

        assert_eq!(cmd(&mut a, "speed:42"), "OK:Speed: 42");
        assert!(cmd(&mut b, "status").contains("\"speed\":42"));

        drop(a);
        assert!(cmd(&mut b, "status").starts_with("OK:"));

        f.sensor.set_failing(true);
        assert!(cmd(&mut b, "calibrate").starts_with("ERROR:Line sensor error"));
    }
}
