//! CAN protocol support for VESC motor controllers.
//!
//! Decodes the status frames a controller broadcasts, encodes setpoint
//! commands, and correlates command replies through a fixed-size table of
//! pending requests. Everything is non-blocking and allocation free, so the
//! crate runs from a bare-metal polling loop.

#![cfg_attr(not(test), no_std)]

// Must come first so its macros are visible in every other module
mod fmt;

pub mod codec;
mod command;
mod config;
mod controller;
mod frame;
mod registry;
mod status;
mod telemetry;
mod transport;

/// Milliseconds from a free-running, wrapping clock supplied by the host
pub type Millis = u32;

pub use command::*;
pub use config::*;
pub use controller::*;
pub use frame::*;
pub use registry::*;
pub use status::*;
pub use telemetry::*;
pub use transport::*;

pub use embedded_can::{ExtendedId, Id, StandardId};
