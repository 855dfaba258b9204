//! The set of quota limiters configured for one model.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tollgate_core::{WaitContext, WallClock};
use tollgate_error::{AdmissionError, AdmissionResult, ConfigError};
use tracing::{debug, instrument, warn};

use crate::{
    Admission, DailyQuotaLimiter, ModelLimits, RequestLimiter, Reservation, RetryableError,
    TokenBucketLimiter, TokenLimiter, TokenReservation,
};

/// Rate and quota limiter for one model on one upstream.
///
/// This limiter coordinates multiple quota types:
/// - **RPM** (requests per minute): token bucket
/// - **TPM** (tokens per minute): token bucket
/// - **RPD** (requests per day): daily quota
/// - **TPD** (tokens per day): daily quota
///
/// Concurrency is not part of this set; it is enforced when the model is
/// elected (see the `tollgate_election` crate), so that a saturated model can
/// be skipped in favour of another upstream instead of queued on.
///
/// # Example
///
/// ```rust,ignore
/// use tollgate_rate_limit::{ModelLimiter, ModelLimits, Reservation, TokenReservation};
///
/// let limiter = ModelLimiter::from_limits("gpt-4o-mini", &limits, clock)?;
///
/// // Reserve an estimated 1200 tokens and wait for every quota to clear.
/// let mut admission = limiter.admit(1200, &ctx).await?;
/// let response = upstream.send(&request).await?;
/// admission.complete_with_actual(response.usage.total_tokens);
/// ```
#[derive(Debug, Clone)]
pub struct ModelLimiter {
    model: String,

    // RPM limiter (requests per minute)
    rpm: Option<TokenBucketLimiter>,

    // TPM limiter (tokens per minute)
    tpm: Option<TokenBucketLimiter>,

    // RPD limiter (requests per day)
    rpd: Option<DailyQuotaLimiter>,

    // TPD limiter (tokens per day)
    tpd: Option<DailyQuotaLimiter>,
}

impl ModelLimiter {
    /// Create the limiter set described by `limits`.
    ///
    /// Dimensions with a missing or non-positive limit are unlimited.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured timezone is unknown.
    #[instrument(skip(model, limits, clock), fields(model = %model.as_ref()))]
    pub fn from_limits(
        model: impl AsRef<str>,
        limits: &ModelLimits,
        clock: Arc<dyn WallClock>,
    ) -> Result<Self, ConfigError> {
        let location = limits.location()?;
        let limiter = Self {
            model: model.as_ref().to_string(),
            rpm: limits.rpm.and_then(TokenBucketLimiter::per_minute),
            tpm: limits.tpm.and_then(TokenBucketLimiter::per_minute),
            rpd: limits
                .rpd
                .and_then(|rpd| DailyQuotaLimiter::with_clock(rpd, location, Arc::clone(&clock))),
            tpd: limits
                .tpd
                .and_then(|tpd| DailyQuotaLimiter::with_clock(tpd, location, Arc::clone(&clock))),
        };
        debug!(
            rpm = limiter.rpm.is_some(),
            tpm = limiter.tpm.is_some(),
            rpd = limiter.rpd.is_some(),
            tpd = limiter.tpd.is_some(),
            "Created model limiter"
        );
        Ok(limiter)
    }

    /// A limiter set with no quotas at all.
    pub fn unlimited(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            rpm: None,
            tpm: None,
            rpd: None,
            tpd: None,
        }
    }

    /// Model name.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// True when no quota is configured.
    pub fn is_unlimited(&self) -> bool {
        self.rpm.is_none() && self.tpm.is_none() && self.rpd.is_none() && self.tpd.is_none()
    }

    /// Read-only estimate of the wait before a request of `tokens` could
    /// proceed: the longest wait over all configured quotas.
    pub fn probe(&self, tokens: u64) -> Duration {
        [
            self.rpm.as_ref().map(RequestLimiter::probe),
            self.tpm.as_ref().map(|tpm| tpm.probe_tokens(tokens)),
            self.rpd.as_ref().map(RequestLimiter::probe),
            self.tpd.as_ref().map(|tpd| tpd.probe_tokens(tokens)),
        ]
        .into_iter()
        .flatten()
        .max()
        .unwrap_or(Duration::ZERO)
    }

    /// Reserve one request and `tokens` tokens on every configured quota.
    ///
    /// All or nothing: if any quota rejects the request as unsatisfiable,
    /// the reservations already taken are cancelled in reverse order.
    ///
    /// # Errors
    ///
    /// Returns `QuotaUnsatisfiable` if `tokens` exceeds the TPM burst or
    /// the TPD limit.
    #[instrument(skip(self), fields(model = %self.model))]
    pub fn reserve(&self, tokens: u64) -> AdmissionResult<Admission> {
        let mut admission = Admission::new(&self.model, tokens);

        if let Some(rpm) = &self.rpm {
            admission.push_request("rpm", rpm.reserve()?);
        }
        if let Some(tpm) = &self.tpm {
            admission.push_tokens("tpm", tpm.reserve_tokens(tokens)?);
        }
        if let Some(rpd) = &self.rpd {
            admission.push_request("rpd", rpd.reserve()?);
        }
        if let Some(tpd) = &self.tpd {
            admission.push_tokens("tpd", tpd.reserve_tokens(tokens)?);
        }

        debug!(pending = ?admission.pending(), "Reserved admission");
        Ok(admission)
    }

    /// Reserve and wait until every quota allows the request.
    ///
    /// # Errors
    ///
    /// Returns `QuotaUnsatisfiable` immediately for oversize requests, or the
    /// context's error if it finishes first (every member is cancelled).
    pub async fn admit(&self, tokens: u64, ctx: &WaitContext) -> AdmissionResult<Admission> {
        let mut admission = self.reserve(tokens)?;
        admission.wait(ctx).await?;
        Ok(admission)
    }

    /// Execute an upstream call under admission control with automatic retry.
    ///
    /// For each attempt:
    /// 1. Admits the request (waits for quota if needed)
    /// 2. Executes the operation, which returns its value and the actual
    ///    token usage
    /// 3. On success, settles the admission with the actual usage
    /// 4. On a transient error, cancels the admission and retries with
    ///    exponential backoff; on a permanent error, cancels and returns
    ///
    /// Admission failures (oversize request, cancelled context) are never
    /// retried here.
    ///
    /// The retry strategy uses:
    /// - Initial backoff: 2 seconds
    /// - Backoff multiplier: 2x per attempt
    /// - Maximum backoff: 60 seconds
    /// - Jitter: Random variation to prevent thundering herd
    /// - Maximum retries: 5 attempts
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let text = limiter.execute(1000, &ctx, || async {
    ///     let response = client.chat(&request).await?;
    ///     Ok((response.text, response.usage.total_tokens))
    /// }).await?;
    /// ```
    pub async fn execute<F, Fut, R, E>(
        &self,
        estimated_tokens: u64,
        ctx: &WaitContext,
        operation: F,
    ) -> Result<R, E>
    where
        F: Fn() -> Fut + Sync,
        Fut: Future<Output = Result<(R, u64), E>>,
        E: RetryableError + From<AdmissionError> + std::fmt::Display,
    {
        use tokio_retry2::{Retry, RetryError, strategy::ExponentialBackoff, strategy::jitter};

        // Configure retry strategy
        let retry_strategy = ExponentialBackoff::from_millis(2000)
            .factor(2)
            .max_delay(Duration::from_secs(60))
            .map(jitter)
            .take(5);

        let operation = &operation;
        Retry::spawn(retry_strategy, || async move {
            let mut admission = match self.admit(estimated_tokens, ctx).await {
                Ok(admission) => admission,
                Err(err) => {
                    if err.is_wait_interrupted() {
                        debug!(model = %self.model, "Admission wait interrupted: {}", err);
                    } else {
                        warn!(model = %self.model, "Admission failed: {}", err);
                    }
                    return Err(RetryError::Permanent(E::from(err)));
                }
            };

            match operation().await {
                Ok((value, actual)) => {
                    admission.complete_with_actual(actual);
                    Ok(value)
                }
                Err(e) => {
                    admission.cancel();
                    if e.is_retryable() {
                        warn!(model = %self.model, "Transient error, will retry: {}", e);
                        Err(RetryError::Transient {
                            err: e,
                            retry_after: None,
                        })
                    } else {
                        warn!(model = %self.model, "Permanent error, failing immediately: {}", e);
                        Err(RetryError::Permanent(e))
                    }
                }
            }
        })
        .await
    }
}
