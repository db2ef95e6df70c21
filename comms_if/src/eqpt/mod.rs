//! # Equipment Interface
//!
//! This module defines the demand structures which are sent to the equipment drivers.

// -----------------------------------------------------------------------------------------------
// MODULES
// -----------------------------------------------------------------------------------------------

pub mod mech;
