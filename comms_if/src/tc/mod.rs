//! # Telecommand module
//!
//! Telecommands are the newline-delimited ASCII commands sent by the operator to
//! the robot's command server. Each command gets exactly one reply line.
//!
//! | Command           | Reply                                           |
//! |-------------------|-------------------------------------------------|
//! | `MOVE <x> <y>`    | `OK` or `ERROR: Invalid values`                 |
//! | `<x> <y>`         | as `MOVE`                                       |
//! | `CAMERA <x> <y>`  | `OK`, `ERROR: Invalid camera values` or `ERROR: Camera not available` |
//! | `STOP`            | `STOPPED`                                       |
//! | `QUIT`            | `BYE`, then the connection is closed            |
//!
//! Keywords are case-insensitive. Axis values are clamped into `[-1, 1]`.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::{Deserialize, Serialize};
use std::fmt;
use structopt::StructOpt;
use thiserror::Error;

// ---------------------------------------------------------------------------
// MODULES
// ---------------------------------------------------------------------------

pub mod line_follow;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Normalised two axis operator intent.
///
/// Both axes are always within `[-1, 1]`.
#[derive(Debug, Copy, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Intent {
    /// Right is positive
    pub x: f64,

    /// Forward (or up) is positive
    pub y: f64,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// A telecommand received by the command server.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub enum Tc {
    /// Drive with the given intent
    Move(Intent),

    /// Move the camera with the given velocity intent
    Camera(Intent),

    /// Stop the drive and centre the camera
    Stop,

    /// Stop everything and close the connection
    Quit,
}

/// Reply sent back for each received telecommand.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TcResponse {
    Ok,
    Stopped,
    Bye,
    InvalidValues,
    InvalidCameraValues,
    CameraNotAvailable,
    UnknownCommand,
}

/// Possible parsing errors.
#[derive(Debug, Error, PartialEq)]
pub enum TcParseError {
    #[error("Drive values are not valid numbers")]
    InvalidValues,

    #[error("Camera values are not valid numbers")]
    InvalidCameraValues,

    #[error("Unrecognised command \"{0}\"")]
    UnknownCommand(String),
}

/// Telecommands as typed into the console client.
#[derive(Debug, Copy, Clone, StructOpt)]
pub enum TcCmd {
    /// Drive the robot.
    ///
    /// Both axes are in the range [-1, 1].
    #[structopt(name = "move")]
    Move {
        /// Turn demand, positive is right
        #[structopt(allow_hyphen_values = true)]
        x: f64,

        /// Forward demand, positive is forwards
        #[structopt(allow_hyphen_values = true)]
        y: f64,
    },

    /// Move the camera gimbal at a rate.
    #[structopt(name = "cam")]
    Camera {
        /// Pan rate, positive is right
        #[structopt(allow_hyphen_values = true)]
        x: f64,

        /// Tilt rate, positive is up
        #[structopt(allow_hyphen_values = true)]
        y: f64,
    },

    /// Stop the drive and centre the camera.
    #[structopt(name = "stop")]
    Stop,

    /// Stop and disconnect.
    #[structopt(name = "quit")]
    Quit,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Intent {
    /// Build a new intent, clamping both axes into `[-1, 1]`.
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x: x.max(-1.0).min(1.0),
            y: y.max(-1.0).min(1.0),
        }
    }

    /// Parse an intent from two tokens.
    ///
    /// Non-finite values (`nan`, `inf`) are rejected.
    fn parse(x: &str, y: &str) -> Option<Self> {
        let x: f64 = x.parse().ok()?;
        let y: f64 = y.parse().ok()?;

        if !x.is_finite() || !y.is_finite() {
            return None;
        }

        Some(Self::new(x, y))
    }
}

impl Tc {
    /// Parse a telecommand from a single line, without its line terminator.
    pub fn parse(line: &str) -> Result<Self, TcParseError> {
        let parts: Vec<&str> = line.split_whitespace().collect();

        match parts.as_slice() {
            [kw, x, y] if kw.eq_ignore_ascii_case("MOVE") => Intent::parse(x, y)
                .map(Tc::Move)
                .ok_or(TcParseError::InvalidValues),
            [kw, x, y] if kw.eq_ignore_ascii_case("CAMERA") => Intent::parse(x, y)
                .map(Tc::Camera)
                .ok_or(TcParseError::InvalidCameraValues),
            [x, y] => Intent::parse(x, y)
                .map(Tc::Move)
                .ok_or(TcParseError::InvalidValues),
            [kw] if kw.eq_ignore_ascii_case("STOP") => Ok(Tc::Stop),
            [kw] if kw.eq_ignore_ascii_case("QUIT") => Ok(Tc::Quit),
            _ => Err(TcParseError::UnknownCommand(line.trim().to_string())),
        }
    }
}

impl fmt::Display for Tc {
    /// Format the telecommand in its wire form.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tc::Move(i) => write!(f, "MOVE {} {}", i.x, i.y),
            Tc::Camera(i) => write!(f, "CAMERA {} {}", i.x, i.y),
            Tc::Stop => write!(f, "STOP"),
            Tc::Quit => write!(f, "QUIT"),
        }
    }
}

impl From<TcCmd> for Tc {
    fn from(cmd: TcCmd) -> Self {
        match cmd {
            TcCmd::Move { x, y } => Tc::Move(Intent::new(x, y)),
            TcCmd::Camera { x, y } => Tc::Camera(Intent::new(x, y)),
            TcCmd::Stop => Tc::Stop,
            TcCmd::Quit => Tc::Quit,
        }
    }
}

impl From<&TcParseError> for TcResponse {
    fn from(e: &TcParseError) -> Self {
        match e {
            TcParseError::InvalidValues => TcResponse::InvalidValues,
            TcParseError::InvalidCameraValues => TcResponse::InvalidCameraValues,
            TcParseError::UnknownCommand(_) => TcResponse::UnknownCommand,
        }
    }
}

impl TcResponse {
    const ALL: [TcResponse; 7] = [
        TcResponse::Ok,
        TcResponse::Stopped,
        TcResponse::Bye,
        TcResponse::InvalidValues,
        TcResponse::InvalidCameraValues,
        TcResponse::CameraNotAvailable,
        TcResponse::UnknownCommand,
    ];

    /// The wire text of this response, without line terminator.
    pub fn as_str(&self) -> &'static str {
        match self {
            TcResponse::Ok => "OK",
            TcResponse::Stopped => "STOPPED",
            TcResponse::Bye => "BYE",
            TcResponse::InvalidValues => "ERROR: Invalid values",
            TcResponse::InvalidCameraValues => "ERROR: Invalid camera values",
            TcResponse::CameraNotAvailable => "ERROR: Camera not available",
            TcResponse::UnknownCommand => "ERROR: Unknown command",
        }
    }

    /// Parse a response line received from the server.
    pub fn from_line(line: &str) -> Option<Self> {
        let line = line.trim();
        Self::ALL.iter().copied().find(|r| r.as_str() == line)
    }

    /// True for the `ERROR: ...` responses.
    pub fn is_error(&self) -> bool {
        self.as_str().starts_with("ERROR")
    }
}

impl fmt::Display for TcResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_move() {
        assert_eq!(Tc::parse("MOVE 0.5 -0.25"), Ok(Tc::Move(Intent::new(0.5, -0.25))));
        assert_eq!(Tc::parse("move 1 1"), Ok(Tc::Move(Intent::new(1.0, 1.0))));

        // Legacy bare pair
        assert_eq!(Tc::parse("0.1 0.2"), Ok(Tc::Move(Intent::new(0.1, 0.2))));

        // Clamped
        assert_eq!(Tc::parse("MOVE 3 -7"), Ok(Tc::Move(Intent { x: 1.0, y: -1.0 })));
    }

    #[test]
    fn test_parse_invalid_values() {
        assert_eq!(Tc::parse("MOVE a 0"), Err(TcParseError::InvalidValues));
        assert_eq!(Tc::parse("MOVE nan 0"), Err(TcParseError::InvalidValues));
        assert_eq!(Tc::parse("MOVE 0 inf"), Err(TcParseError::InvalidValues));
        assert_eq!(Tc::parse("CAMERA x y"), Err(TcParseError::InvalidCameraValues));

        // Two tokens are always a legacy move
        assert_eq!(Tc::parse("MOVE 1"), Err(TcParseError::InvalidValues));
    }

    #[test]
    fn test_parse_keywords() {
        assert_eq!(Tc::parse("STOP"), Ok(Tc::Stop));
        assert_eq!(Tc::parse("  stop \r"), Ok(Tc::Stop));
        assert_eq!(Tc::parse("Quit"), Ok(Tc::Quit));
        assert_eq!(Tc::parse("CAMERA -1 0"), Ok(Tc::Camera(Intent::new(-1.0, 0.0))));
        assert!(matches!(Tc::parse("JUMP"), Err(TcParseError::UnknownCommand(_))));
        assert!(matches!(Tc::parse("MOVE 1 2 3"), Err(TcParseError::UnknownCommand(_))));
    }

    #[test]
    fn test_wire_form() {
        let tc = Tc::from(TcCmd::Move { x: -0.5, y: 2.0 });
        assert_eq!(tc.to_string(), "MOVE -0.5 1");
        assert_eq!(Tc::parse(&tc.to_string()), Ok(tc));

        assert_eq!(TcResponse::from_line("ERROR: Camera not available\n"), Some(TcResponse::CameraNotAvailable));
        assert_eq!(TcResponse::from_line("OK"), Some(TcResponse::Ok));
        assert_eq!(TcResponse::from_line("WHAT"), None);
        assert!(TcResponse::UnknownCommand.is_error());
        assert!(!TcResponse::Stopped.is_error());
    }
}
