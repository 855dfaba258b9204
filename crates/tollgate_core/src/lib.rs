//! Core runtime types for the Tollgate admission core.
//!
//! This crate provides the pieces every other Tollgate crate builds on: the
//! caller's cancellation scope for blocking waits, a wall clock for
//! calendar-aligned quotas, and tracing initialization.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod clock;
mod context;
mod telemetry;

pub use clock::{ManualClock, SystemClock, WallClock};
pub use context::WaitContext;
pub use telemetry::{LOG_FORMAT_ENV, init_telemetry, shutdown_telemetry};
