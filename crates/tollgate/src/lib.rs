//! Tollgate - admission control for multi-provider LLM gateways
//!
//! Tollgate decides, for every inbound chat or embedding request, which
//! upstream provider may serve it and when the request is allowed to proceed
//! under the configured rate and quota limits.
//!
//! # Features
//!
//! - **Reservation protocol**: probe, reserve, wait, then complete or cancel
//! - **Concurrency caps**: per upstream and per model, backed by semaphores
//! - **Per-minute quotas**: RPM and TPM token buckets with refunds
//! - **Daily quotas**: RPD and TPD counters reset at local midnight
//! - **Election**: random, non-blocking choice among upstreams serving a model
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tollgate::{CandidatePool, GatewayConfig, SystemClock, TokenReservation, WaitContext};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = GatewayConfig::load()?;
//!     let pool = CandidatePool::from_config(&config, Arc::new(SystemClock))?;
//!
//!     let ctx = WaitContext::with_timeout(std::time::Duration::from_secs(30));
//!     let elected = pool.elect("gpt-4o-mini", &ctx).await?;
//!     let mut admission = elected.admit(1_200, &ctx).await?;
//!
//!     // ... call elected.upstream() ...
//!
//!     admission.complete_with_actual(950);
//!     Ok(())
//! }
//! ```
//!
//! # Cargo Features
//!
//! - `observability` - Export spans through OpenTelemetry
//!
//! # Architecture
//!
//! Tollgate is organized as a workspace with focused crates:
//!
//! - `tollgate_error` - Error types
//! - `tollgate_core` - Wait context, wall clock and tracing setup
//! - `tollgate_rate_limit` - Reservation protocol, limiters and configuration
//! - `tollgate_election` - Candidates, election and the candidate pool
//!
//! This crate (`tollgate`) re-exports everything for convenience.

pub use tollgate_core::*;
pub use tollgate_election::*;
pub use tollgate_error::*;
pub use tollgate_rate_limit::*;
