//! Commands - CLI Command Implementations
//!
//! This module contains the implementations for all CLI commands.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

pub mod calibrate;
pub mod inspect;
pub mod quantize;
pub mod repack;
pub mod verify;

pub(crate) mod utils;
