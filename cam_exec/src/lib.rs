//! # Camera Library
//!
//! Captures JPEG frames and streams them to any number of HTTP clients as MJPEG.

pub mod params;
pub mod relay;
pub mod source;
pub mod stream;
