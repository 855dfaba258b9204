//! An (upstream, model) pair eligible to serve requests.

use std::sync::Arc;
use std::time::Duration;

use derive_getters::Getters;
use tollgate_rate_limit::{ConcurrencyLimiter, ModelLimiter, RequestLimiter};

/// One upstream serving one model.
///
/// A candidate is gated by up to two concurrency caps: one shared by every
/// model of the upstream and one for this model alone. Either may be absent,
/// meaning unlimited. The gates are always taken upstream first.
#[derive(Debug, Clone, Getters)]
pub struct Candidate {
    /// Upstream provider name
    upstream: String,
    /// Model name
    model: String,
    /// Cap shared by every model of the upstream
    upstream_gate: Option<ConcurrencyLimiter>,
    /// Cap for this model on this upstream
    model_gate: Option<ConcurrencyLimiter>,
    /// Per-minute and per-day quotas of the model
    limiter: Arc<ModelLimiter>,
}

impl Candidate {
    /// A candidate without concurrency caps.
    pub fn new(
        upstream: impl Into<String>,
        model: impl Into<String>,
        limiter: Arc<ModelLimiter>,
    ) -> Self {
        Self {
            upstream: upstream.into(),
            model: model.into(),
            upstream_gate: None,
            model_gate: None,
            limiter,
        }
    }

    /// Set the upstream-wide cap. Clones of one limiter share its slots.
    pub fn with_upstream_gate(mut self, gate: Option<ConcurrencyLimiter>) -> Self {
        self.upstream_gate = gate;
        self
    }

    /// Set the per-model cap.
    pub fn with_model_gate(mut self, gate: Option<ConcurrencyLimiter>) -> Self {
        self.model_gate = gate;
        self
    }

    /// Configured gates in acquisition order.
    pub fn gates(&self) -> Vec<&dyn RequestLimiter> {
        [self.upstream_gate.as_ref(), self.model_gate.as_ref()]
            .into_iter()
            .flatten()
            .map(|gate| gate as &dyn RequestLimiter)
            .collect()
    }

    /// True when some gate has no free slot right now.
    pub fn is_saturated(&self) -> bool {
        self.gates().iter().any(|gate| gate.probe() != Duration::ZERO)
    }
}
