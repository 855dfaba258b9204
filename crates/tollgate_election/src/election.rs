//! Candidate election.

use std::sync::Arc;

use rand::seq::SliceRandom;
use tollgate_core::WaitContext;
use tollgate_error::{AdmissionError, AdmissionErrorKind, AdmissionResult};
use tollgate_rate_limit::{Admission, ModelLimiter};
use tracing::{debug, instrument};

use crate::{Candidate, HeldGates, acquire_ordered, try_acquire_ordered};

/// The outcome of an election: a candidate plus the concurrency slots taken
/// on it.
///
/// The slots are held until the value is dropped or
/// [`release`](Elected::release)d.
#[derive(Debug)]
pub struct Elected {
    candidate: Arc<Candidate>,
    gates: HeldGates,
    waited: bool,
}

impl Elected {
    /// The elected candidate.
    pub fn candidate(&self) -> &Arc<Candidate> {
        &self.candidate
    }

    /// Upstream name of the elected candidate.
    pub fn upstream(&self) -> &str {
        self.candidate.upstream()
    }

    /// Model name of the elected candidate.
    pub fn model(&self) -> &str {
        self.candidate.model()
    }

    /// Quota limiters of the elected candidate.
    pub fn limiter(&self) -> &ModelLimiter {
        self.candidate.limiter()
    }

    /// True when every candidate was saturated and election had to block.
    pub fn waited(&self) -> bool {
        self.waited
    }

    /// Admit a request of `tokens` against the elected model's quotas.
    ///
    /// # Errors
    ///
    /// See [`ModelLimiter::admit`].
    pub async fn admit(&self, tokens: u64, ctx: &WaitContext) -> AdmissionResult<Admission> {
        self.candidate.limiter().admit(tokens, ctx).await
    }

    /// Give the concurrency slots back.
    pub fn release(self) {
        debug!(upstream = %self.candidate.upstream(), "Releasing elected candidate");
        self.gates.release();
    }
}

/// Pick a candidate for `model` and take its concurrency slots.
///
/// Candidates are tried in uniformly shuffled order without blocking; the
/// first whose upstream and model gates can both be taken wins. When every
/// candidate is saturated, election blocks on the first shuffled candidate
/// until its gates free up or `ctx` is done.
///
/// # Errors
///
/// - `NoUpstreamAvailable` if `candidates` is empty
/// - the context's error if it finishes while blocked
#[instrument(skip(candidates, ctx), fields(candidates = candidates.len()))]
pub async fn elect_from_candidates(
    model: &str,
    candidates: &[Arc<Candidate>],
    ctx: &WaitContext,
) -> AdmissionResult<Elected> {
    let mut shuffled = candidates.to_vec();
    shuffled.shuffle(&mut rand::thread_rng());

    let Some(first) = shuffled.first().cloned() else {
        return Err(AdmissionError::new(AdmissionErrorKind::NoUpstreamAvailable(
            model.to_string(),
        )));
    };

    for candidate in shuffled {
        let acquired = try_acquire_ordered(&candidate.gates())?;
        if let Some(gates) = acquired {
            debug!(upstream = %candidate.upstream(), "Elected candidate");
            return Ok(Elected {
                candidate,
                gates,
                waited: false,
            });
        }
    }

    debug!(
        upstream = %first.upstream(),
        deadline = ?ctx.deadline(),
        "Every candidate saturated, waiting for a slot"
    );
    let gates = acquire_ordered(&first.gates(), ctx).await?;
    debug!(upstream = %first.upstream(), "Elected candidate after waiting");
    Ok(Elected {
        candidate: first,
        gates,
        waited: true,
    })
}
