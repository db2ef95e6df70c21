//! # Mechanisms Library
//!
//! Motion and safety core of the robot: drive mixing, camera gimbal control, the equipment
//! service owning the actuators, the safety watchdog and the operator command server.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// Camera gimbal velocity control.
pub mod cam_ctrl;

/// Tank mixing of joystick intent into wheel demands.
pub mod drive;

/// Single owner of the actuators, reached through a command queue.
pub mod eqpt_service;

/// Operator command server.
pub mod mech_server;

/// Drivers used to control the wheel motors.
pub mod motor_ctrl;

/// Parameters for the mechanisms executable.
pub mod params;

/// Drivers used to control servos.
pub mod servo_ctrl;

/// Command timeout safety watchdog.
pub mod watchdog;
