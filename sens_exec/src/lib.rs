//! # Sensors Library
//!
//! Obstacle detection with the ultrasonic rangers, the obstacle alarm, and line following with
//! the infrared line sensor array.

pub mod alarm;
pub mod debounce;
pub mod error;
pub mod leds;
pub mod lf_server;
pub mod line_follow;
pub mod line_sensor;
pub mod obstacle;
pub mod params;
pub mod ultrasonic;
