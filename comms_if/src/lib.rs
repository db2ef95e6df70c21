//! # Communications interface crate.
//!
//! Provides all common communications interfaces for the software: the
//! telecommand line protocols, equipment demand types and the line-framed
//! TCP connection used by the servers and the console client.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

pub mod tc;

/// Demand definitions for equipment (motors and servos)
pub mod eqpt;

/// Network module
pub mod net;
