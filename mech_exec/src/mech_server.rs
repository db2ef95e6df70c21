//! # Mechanisms Server Module
//!
//! This module abstracts over the networking side of the mechanisms executable. The server accepts
//! one operator connection at a time on a TCP port, reads newline-delimited telecommands and
//! forwards them to the equipment service, replying with one line per command.
//!
//! Further connections wait in the listen backlog until the current client disconnects. Whatever
//! the reason a client goes away (QUIT, disconnect, socket fault) the drive is stopped and the
//! camera centred before the next client is accepted.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::{
    net::{LineConn, LineEvent, NetError, NetParams},
    tc::{Tc, TcParseError, TcResponse},
};
use log::{debug, info, trace, warn};
use std::io;
use std::net::{SocketAddr, TcpListener};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread;
use std::time::Duration;

use crate::drive::mix_tank;
use crate::eqpt_service::{EqptCmd, EqptError, EqptHandle};
use crate::watchdog::Deadline;

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Period at which the accept loop checks for shutdown while no client is connected.
const ACCEPT_POLL_PERIOD: Duration = Duration::from_millis(50);

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// The operator command server.
pub struct MechServer {
    listener: TcpListener,

    read_timeout: Duration,

    eqpt: EqptHandle,

    deadline: Arc<Deadline>,

    shutdown: Arc<AtomicBool>,

    /// Wheel deadzone used when mixing drive commands.
    ///
    /// Units: percent duty
    deadzone_pct: f64,

    /// Time to wait for the equipment service to confirm a stop
    stop_ack_timeout: Duration,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Errors which can occur in the [`MechServer`]
#[derive(thiserror::Error, Debug)]
pub enum MechServerError {
    #[error("Could not bind the server socket: {0}")]
    BindError(io::Error),

    #[error("Could not accept a connection: {0}")]
    AcceptError(io::Error),

    #[error("Network error: {0}")]
    NetError(#[from] NetError),

    #[error("Equipment error: {0}")]
    EqptError(#[from] EqptError),
}

/// How a client session ended.
#[derive(Debug, PartialEq, Eq)]
enum ClientExit {
    /// The client sent QUIT, equipment already stopped
    Quit,

    /// The client went away or the server is shutting down
    Disconnected,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl MechServer {
    /// Create a new instance of the server, bound to the endpoint in the parameters.
    ///
    /// This function will not wait for a connection from the client before returning.
    pub fn new(
        params: &NetParams,
        eqpt: EqptHandle,
        deadline: Arc<Deadline>,
        shutdown: Arc<AtomicBool>,
        deadzone_pct: f64,
        stop_ack_timeout: Duration,
    ) -> Result<Self, MechServerError> {
        let listener = TcpListener::bind(params.endpoint()).map_err(MechServerError::BindError)?;

        // Non-blocking accept so the shutdown flag is observed between clients
        listener
            .set_nonblocking(true)
            .map_err(MechServerError::BindError)?;

        Ok(Self {
            listener,
            read_timeout: params.read_timeout(),
            eqpt,
            deadline,
            shutdown,
            deadzone_pct,
            stop_ack_timeout,
        })
    }

    /// Address the server is listening on.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve clients until the shutdown flag is set.
    pub fn run(&mut self) -> Result<(), MechServerError> {
        info!(
            "Command server listening on {:?}",
            self.listener.local_addr().ok()
        );

        while !self.shutdown.load(Ordering::Relaxed) {
            let (stream, addr) = match self.listener.accept() {
                Ok(s) => s,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL_PERIOD);
                    continue;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(MechServerError::AcceptError(e)),
            };

            info!("Client connected from {}", addr);

            let exit = stream
                .set_nonblocking(false)
                .map_err(NetError::SocketOptionError)
                .and_then(|_| LineConn::new(stream, Some(self.read_timeout)))
                .map_err(MechServerError::from)
                .and_then(|conn| self.serve_client(conn));

            match exit {
                Ok(ClientExit::Quit) => info!("Client {} quit", addr),
                Ok(ClientExit::Disconnected) => {
                    info!("Client {} disconnected, stopping", addr);
                    self.safe_stop()?;
                }
                Err(MechServerError::EqptError(e)) => return Err(e.into()),
                Err(e) => {
                    warn!("Fault while serving client {}: {}, stopping", addr, e);
                    self.safe_stop()?;
                }
            }
        }

        info!("Command server stopped");

        Ok(())
    }

    /// Handle one client's commands until it quits or goes away.
    fn serve_client(&self, mut conn: LineConn) -> Result<ClientExit, MechServerError> {
        loop {
            let line = match conn.recv()? {
                LineEvent::Line(l) => l,
                LineEvent::Timeout => {
                    if self.shutdown.load(Ordering::Relaxed) {
                        conn.close();
                        return Ok(ClientExit::Disconnected);
                    }
                    continue;
                }
                LineEvent::Closed => return Ok(ClientExit::Disconnected),
            };

            if line.trim().is_empty() {
                continue;
            }

            trace!("Received \"{}\"", line);

            let (response, quit) = self.handle_line(&line)?;

            conn.send_line(response.as_str())?;

            if response.is_error() {
                debug!("Rejected \"{}\": {}", line, response);
            }

            if quit {
                conn.close();
                return Ok(ClientExit::Quit);
            }
        }
    }

    /// Execute one telecommand line, returning the response and whether to close the connection.
    pub fn handle_line(&self, line: &str) -> Result<(TcResponse, bool), MechServerError> {
        let tc = match Tc::parse(line) {
            Ok(tc) => tc,
            // The camera being unavailable takes precedence over bad values
            Err(TcParseError::InvalidCameraValues) if !self.eqpt.cam_available() => {
                return Ok((TcResponse::CameraNotAvailable, false))
            }
            Err(e) => return Ok((TcResponse::from(&e), false)),
        };

        Ok(match tc {
            Tc::Move(i) => {
                let (left, right) = mix_tank(i.x, i.y, self.deadzone_pct);

                self.deadline.refresh();
                self.eqpt.send(EqptCmd::Drive { left, right })?;

                (TcResponse::Ok, false)
            }
            Tc::Camera(i) => {
                if !self.eqpt.cam_available() {
                    return Ok((TcResponse::CameraNotAvailable, false));
                }

                self.deadline.refresh();
                self.eqpt.send(EqptCmd::Camera { vx: i.x, vy: i.y })?;

                (TcResponse::Ok, false)
            }
            Tc::Stop => {
                self.safe_stop()?;
                (TcResponse::Stopped, false)
            }
            Tc::Quit => {
                self.safe_stop()?;
                (TcResponse::Bye, true)
            }
        })
    }

    /// Stop the drive, waiting for confirmation, and start centring the camera.
    fn safe_stop(&self) -> Result<(), MechServerError> {
        self.eqpt.send_wait(EqptCmd::Stop, self.stop_ack_timeout)?;
        self.eqpt.send(EqptCmd::CamCenter)?;
        Ok(())
    }
}
