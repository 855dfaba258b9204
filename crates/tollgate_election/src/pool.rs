//! Candidates built from gateway configuration.

use std::collections::BTreeMap;
use std::sync::Arc;

use tollgate_core::{WaitContext, WallClock};
use tollgate_error::{AdmissionResult, ConfigError};
use tollgate_rate_limit::{ConcurrencyLimiter, GatewayConfig, ModelLimiter};
use tracing::{debug, instrument};

use crate::{Candidate, Elected, elect_from_candidates};

/// Every candidate known to the gateway, grouped by model name.
///
/// Built once at startup and shared by all request workers. Candidates of
/// the same upstream share one upstream gate, so the upstream-wide cap holds
/// across models.
#[derive(Debug, Clone, Default)]
pub struct CandidatePool {
    by_model: BTreeMap<String, Vec<Arc<Candidate>>>,
}

impl CandidatePool {
    /// Build the pool described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if a model's limits cannot be turned into limiters
    /// (for example, an unknown timezone).
    #[instrument(skip_all, fields(upstreams = config.upstreams.len()))]
    pub fn from_config(
        config: &GatewayConfig,
        clock: Arc<dyn WallClock>,
    ) -> Result<Self, ConfigError> {
        let mut pool = Self::default();

        for (upstream, upstream_config) in &config.upstreams {
            let upstream_gate = upstream_config
                .max_concurrency
                .and_then(ConcurrencyLimiter::new);

            for model in upstream_config.models.keys() {
                let Some(limits) = config.limits_for(upstream, model) else {
                    continue;
                };
                let limiter = ModelLimiter::from_limits(model, &limits, Arc::clone(&clock))
                    .map_err(|e| ConfigError::new(format!("{}/{}: {}", upstream, model, e.message)))?;

                let candidate = Candidate::new(upstream, model, Arc::new(limiter))
                    .with_upstream_gate(upstream_gate.clone())
                    .with_model_gate(limits.max_concurrency.and_then(ConcurrencyLimiter::new));
                pool.insert(candidate);
            }
        }

        debug!(models = pool.by_model.len(), "Built candidate pool");
        Ok(pool)
    }

    /// Add a candidate for its model.
    pub fn insert(&mut self, candidate: Candidate) {
        self.by_model
            .entry(candidate.model().clone())
            .or_default()
            .push(Arc::new(candidate));
    }

    /// Candidates serving `model`, empty if none.
    pub fn candidates(&self, model: &str) -> &[Arc<Candidate>] {
        self.by_model.get(model).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Model names with at least one candidate.
    pub fn models(&self) -> impl Iterator<Item = &str> {
        self.by_model.keys().map(String::as_str)
    }

    /// Elect a candidate for `model`.
    ///
    /// # Errors
    ///
    /// `NoUpstreamAvailable` if no upstream serves the model, or the
    /// context's error if every candidate stays saturated until it finishes.
    pub async fn elect(&self, model: &str, ctx: &WaitContext) -> AdmissionResult<Elected> {
        elect_from_candidates(model, self.candidates(model), ctx).await
    }
}
