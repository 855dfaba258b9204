//! Error types for the Tollgate admission core.
//!
//! This crate provides the foundation error types used throughout the Tollgate workspace.
//!
//! # Error Hierarchy
//!
//! All errors follow the `ErrorKind` + wrapper struct pattern for clean error handling:
//! - `*ErrorKind` enum defines specific error conditions
//! - `*Error` struct wraps the kind with source location tracking
//! - All errors use `#[track_caller]` for automatic location capture
//!
//! # Examples
//!
//! ```
//! use tollgate_error::{AdmissionError, AdmissionErrorKind, TollgateResult};
//!
//! fn reserve_huge() -> TollgateResult<()> {
//!     Err(AdmissionError::new(AdmissionErrorKind::QuotaUnsatisfiable {
//!         requested: 500,
//!         capacity: 100,
//!     }))?
//! }
//!
//! match reserve_huge() {
//!     Ok(()) => println!("Reserved"),
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod admission;
mod config;
mod error;
mod retry;

pub use admission::{AdmissionError, AdmissionErrorKind, AdmissionResult};
pub use config::ConfigError;
pub use error::{TollgateError, TollgateErrorKind, TollgateResult};
pub use retry::RetryableError;
