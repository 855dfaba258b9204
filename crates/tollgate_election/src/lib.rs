//! Upstream election for the Tollgate gateway.
//!
//! A model may be served by several upstreams. Each (upstream, model) pair is
//! a [`Candidate`], gated by an optional upstream-wide concurrency cap and an
//! optional per-model cap. Election picks a candidate whose gates can both be
//! taken right now, in random order to spread load, and only blocks when
//! every candidate is saturated.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tollgate_core::{SystemClock, WaitContext};
//! use tollgate_election::CandidatePool;
//! use tollgate_rate_limit::GatewayConfig;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = GatewayConfig::load()?;
//! let pool = CandidatePool::from_config(&config, Arc::new(SystemClock))?;
//!
//! let ctx = WaitContext::background();
//! let elected = pool.elect("gpt-4o-mini", &ctx).await?;
//! let admission = elected.admit(1_200, &ctx).await?;
//! println!("Routing to {}", elected.upstream());
//! # drop(admission);
//! # Ok(())
//! # }
//! ```

mod acquire;
mod candidate;
mod election;
mod pool;

pub use acquire::{HeldGates, acquire_ordered, try_acquire_ordered};
pub use candidate::Candidate;
pub use election::{Elected, elect_from_candidates};
pub use pool::CandidatePool;
