//! # Line following telecommands
//!
//! The line follow server accepts lower-case keyword commands, one per line,
//! and replies `OK:<message>` or `ERROR:<message>`.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// A command for the line follower.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LfTc {
    /// Run the sensor calibration spin
    Calibrate,

    /// Start following the line
    Start,

    /// Stop following and brake
    Stop,

    /// Set the base speed, in percent duty (clamped by the follower)
    Speed(i64),

    /// Report the follower status
    Status,
}

/// Reply to a line follow command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LfResponse {
    Ok(String),
    Error(String),
}

/// Errors parsing a line follow command.
#[derive(Debug, Error, PartialEq)]
pub enum LfTcParseError {
    #[error("Invalid speed format: {0}")]
    InvalidSpeed(String),

    #[error("Unknown command: {0}")]
    UnknownCommand(String),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl FromStr for LfTc {
    type Err = LfTcParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let cmd = s.trim().to_lowercase();

        if let Some(speed) = cmd.strip_prefix("speed:") {
            return speed
                .trim()
                .parse()
                .map(LfTc::Speed)
                .map_err(|e| LfTcParseError::InvalidSpeed(format!("{}", e)));
        }

        match cmd.as_str() {
            "calibrate" => Ok(LfTc::Calibrate),
            "start" => Ok(LfTc::Start),
            "stop" => Ok(LfTc::Stop),
            "status" => Ok(LfTc::Status),
            _ => Err(LfTcParseError::UnknownCommand(cmd)),
        }
    }
}

impl fmt::Display for LfResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LfResponse::Ok(m) => write!(f, "OK:{}", m),
            LfResponse::Error(m) => write!(f, "ERROR:{}", m),
        }
    }
}

impl From<LfTcParseError> for LfResponse {
    fn from(e: LfTcParseError) -> Self {
        LfResponse::Error(e.to_string())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!("calibrate".parse::<LfTc>(), Ok(LfTc::Calibrate));
        assert_eq!(" START\n".parse::<LfTc>(), Ok(LfTc::Start));
        assert_eq!("speed:55".parse::<LfTc>(), Ok(LfTc::Speed(55)));
        assert_eq!("Speed:-3".parse::<LfTc>(), Ok(LfTc::Speed(-3)));
        assert!(matches!("speed:fast".parse::<LfTc>(), Err(LfTcParseError::InvalidSpeed(_))));
        assert!(matches!("speed".parse::<LfTc>(), Err(LfTcParseError::UnknownCommand(_))));
        assert_eq!(
            "dance".parse::<LfTc>(),
            Err(LfTcParseError::UnknownCommand("dance".into()))
        );
    }

    #[test]
    fn test_response_format() {
        assert_eq!(LfResponse::Ok("Speed: 40".into()).to_string(), "OK:Speed: 40");
        assert_eq!(
            LfResponse::from(LfTcParseError::UnknownCommand("x".into())).to_string(),
            "ERROR:Unknown command: x"
        );
    }
}
