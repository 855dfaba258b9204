//! Quota limiters and the reservation protocol.
//!
//! This crate provides the admission side of the gateway: every limiter
//! speaks the same non-blocking reserve/wait/settle protocol, so the caller
//! can combine heterogeneous quotas and roll them back uniformly.
//!
//! ## Strategies
//!
//! - [`ConcurrencyLimiter`] - requests in flight, backed by a Tokio semaphore
//! - [`TokenBucketLimiter`] - RPM and TPM, continuously refilling
//! - [`DailyQuotaLimiter`] - RPD and TPD, reset at local midnight
//!
//! [`ModelLimiter`] bundles the per-minute and per-day quotas configured for
//! one model and admits requests against all of them at once.

mod admission;
mod concurrency;
mod config;
mod daily;
mod model;
mod reservation;
mod token_bucket;

pub use admission::Admission;
pub use concurrency::{ConcurrencyLimiter, ConcurrencyReservation, MAX_CONCURRENCY};
pub use config::{GatewayConfig, ModelLimits, UpstreamConfig};
pub use daily::{DAILY_POLL_INTERVAL, DailyQuotaLimiter, DailyReservation, next_midnight};
pub use model::ModelLimiter;
pub use reservation::{INF_DURATION, RequestLimiter, Reservation, TokenLimiter, TokenReservation};
pub use token_bucket::{BucketReservation, TokenBucketLimiter};

pub use tollgate_error::RetryableError;
