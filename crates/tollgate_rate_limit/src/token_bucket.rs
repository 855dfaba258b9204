//! Continuously refilling token bucket backing per-minute quotas.
//!
//! The bucket holds at most `burst` units and refills at `rate` units per
//! second. Reservations debit optimistically: the balance may go negative,
//! and that debt is what later reservations wait out. Refunds (cancellation,
//! overestimated token counts) credit the bucket again, capped at `burst`.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tollgate_core::WaitContext;
use tollgate_error::{AdmissionError, AdmissionErrorKind, AdmissionResult};
use tracing::{debug, instrument, trace};

use crate::{INF_DURATION, RequestLimiter, Reservation, TokenLimiter, TokenReservation};

/// Stand-in for a `ready_at` that does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_update: Instant,
}

#[derive(Debug)]
struct Bucket {
    rate: f64,
    burst: f64,
    state: Mutex<BucketState>,
}

impl Bucket {
    fn lock(&self) -> MutexGuard<'_, BucketState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn refilled(&self, state: &BucketState, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(state.last_update).as_secs_f64();
        (state.tokens + elapsed * self.rate).min(self.burst)
    }

    fn fill(&self, state: &mut BucketState, now: Instant) {
        state.tokens = self.refilled(state, now);
        state.last_update = now;
    }

    /// Time for refill to pay off `deficit` units, saturating at
    /// [`INF_DURATION`] for debts too large to represent.
    fn payoff(&self, deficit: f64) -> Duration {
        Duration::try_from_secs_f64(deficit / self.rate).unwrap_or(INF_DURATION)
    }

    fn adjust(&self, delta: f64) {
        let mut state = self.lock();
        self.fill(&mut state, Instant::now());
        state.tokens = (state.tokens + delta).min(self.burst);
        trace!(delta, tokens = state.tokens, "Adjusted token bucket");
    }
}

/// Token bucket limiter for RPM and TPM quotas.
///
/// Configured with a per-minute limit `L`: the bucket refills at `L / 60`
/// units per second and holds at most `L` units, so a full minute's quota
/// can be spent in a burst.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use tollgate_rate_limit::{Reservation, TokenBucketLimiter, TokenLimiter, TokenReservation};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let tpm = TokenBucketLimiter::per_minute(1_000).unwrap();
/// let mut reservation = tpm.reserve_tokens(400).unwrap();
/// assert_eq!(reservation.delay(), Duration::ZERO);
///
/// // The upstream reported 250 tokens; the other 150 go back to the bucket.
/// reservation.complete_with_actual(250);
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct TokenBucketLimiter {
    bucket: Arc<Bucket>,
}

impl TokenBucketLimiter {
    /// Create a bucket for `limit` units per minute, starting full.
    ///
    /// Returns `None` for non-positive limits, which mean "unlimited".
    #[instrument]
    pub fn per_minute(limit: i64) -> Option<Self> {
        if limit <= 0 {
            return None;
        }
        let burst = limit as f64;
        debug!(burst, rate = burst / 60.0, "Creating token bucket limiter");
        Some(Self {
            bucket: Arc::new(Bucket {
                rate: burst / 60.0,
                burst,
                state: Mutex::new(BucketState {
                    tokens: burst,
                    last_update: Instant::now(),
                }),
            }),
        })
    }

    /// Refill rate in units per second.
    pub fn rate(&self) -> f64 {
        self.bucket.rate
    }

    /// Maximum fill, and the largest single request that can ever succeed.
    pub fn burst(&self) -> f64 {
        self.bucket.burst
    }

    fn probe_cost(&self, cost: u64) -> Duration {
        let cost = cost as f64;
        if cost >= self.bucket.burst {
            return INF_DURATION;
        }

        let state = self.bucket.lock();
        let remaining = self.bucket.refilled(&state, Instant::now()) - cost;
        drop(state);

        if remaining >= 0.0 {
            Duration::ZERO
        } else {
            self.bucket.payoff(-remaining)
        }
    }

    fn reserve_cost(&self, cost: u64) -> AdmissionResult<BucketReservation> {
        if cost as f64 > self.bucket.burst {
            return Err(AdmissionError::new(AdmissionErrorKind::QuotaUnsatisfiable {
                requested: cost,
                capacity: self.bucket.burst as u64,
            }));
        }

        let now = Instant::now();
        let mut state = self.bucket.lock();
        self.bucket.fill(&mut state, now);
        state.tokens -= cost as f64;
        let debt = (-state.tokens).max(0.0);
        let tokens = state.tokens;
        drop(state);

        let wait = self.bucket.payoff(debt);
        debug!(cost, tokens, wait_ms = wait.as_millis() as u64, "Reserved from token bucket");

        Ok(BucketReservation {
            bucket: Arc::clone(&self.bucket),
            cost,
            ready_at: now.checked_add(wait).unwrap_or_else(|| now + FAR_FUTURE),
            acquired: wait.is_zero(),
            released: false,
        })
    }
}

impl RequestLimiter for TokenBucketLimiter {
    fn probe(&self) -> Duration {
        self.probe_cost(1)
    }

    fn reserve(&self) -> AdmissionResult<Box<dyn Reservation>> {
        Ok(Box::new(self.reserve_cost(1)?))
    }
}

impl TokenLimiter for TokenBucketLimiter {
    fn probe_tokens(&self, tokens: u64) -> Duration {
        self.probe_cost(tokens)
    }

    fn reserve_tokens(&self, tokens: u64) -> AdmissionResult<Box<dyn TokenReservation>> {
        Ok(Box::new(self.reserve_cost(tokens)?))
    }
}

/// A debit against a token bucket.
///
/// The units are taken from the bucket when the reservation is created;
/// [`delay`](Reservation::delay) is the time until the debt they caused is
/// paid off by refill.
#[derive(Debug)]
pub struct BucketReservation {
    bucket: Arc<Bucket>,
    cost: u64,
    ready_at: Instant,
    acquired: bool,
    released: bool,
}

impl BucketReservation {
    fn settle(&mut self) {
        self.acquired = self.is_acquired();
        self.released = true;
    }
}

#[async_trait]
impl Reservation for BucketReservation {
    fn is_acquired(&self) -> bool {
        !self.released && (self.acquired || self.ready_at <= Instant::now())
    }

    fn delay(&self) -> Duration {
        if self.acquired {
            return Duration::ZERO;
        }
        self.ready_at.saturating_duration_since(Instant::now())
    }

    async fn wait(&mut self, ctx: &WaitContext) -> AdmissionResult<()> {
        if self.released && !self.acquired {
            return Err(AdmissionError::new(AdmissionErrorKind::ReservationReleased));
        }
        if self.acquired {
            return Ok(());
        }

        // Best effort: the delay is sampled once, later debt from other
        // reservations does not extend this sleep.
        let delay = self.delay();
        if !delay.is_zero() {
            tokio::select! {
                biased;
                err = ctx.done() => return Err(err),
                _ = tokio::time::sleep(delay) => {}
            }
        }
        self.acquired = true;
        Ok(())
    }

    fn cancel(&mut self) {
        if self.released {
            return;
        }
        self.settle();
        self.bucket.adjust(self.cost as f64);
    }

    fn complete(&mut self) {
        if !self.released {
            self.settle();
        }
    }
}

impl TokenReservation for BucketReservation {
    fn reserved(&self) -> u64 {
        self.cost
    }

    fn complete_with_actual(&mut self, actual: u64) {
        if self.released {
            return;
        }
        self.settle();
        let diff = self.cost as f64 - actual as f64;
        if diff != 0.0 {
            self.bucket.adjust(diff);
        }
    }
}

impl Drop for BucketReservation {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(limiter: &TokenBucketLimiter) -> f64 {
        limiter.bucket.lock().tokens
    }

    #[tokio::test(start_paused = true)]
    async fn reserve_then_cancel_restores_fill() {
        let limiter = TokenBucketLimiter::per_minute(600).unwrap();
        let mut warmup = limiter.reserve_tokens(100).unwrap();
        warmup.complete();
        let before = tokens(&limiter);

        let mut reservation = limiter.reserve_tokens(250).unwrap();
        assert!((tokens(&limiter) - (before - 250.0)).abs() < 1e-9);
        reservation.cancel();
        assert!((tokens(&limiter) - before).abs() < 1e-9);

        reservation.cancel();
        assert!((tokens(&limiter) - before).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn complete_with_actual_settles_to_actual_usage() {
        for (estimated, actual) in [(100u64, 40u64), (100, 100), (100, 150)] {
            let limiter = TokenBucketLimiter::per_minute(1_000).unwrap();
            let mut reservation = limiter.reserve_tokens(estimated).unwrap();
            reservation.complete_with_actual(actual);

            let consumed = 1_000.0 - tokens(&limiter);
            assert!(
                (consumed - actual as f64).abs() < 1e-9,
                "estimated {estimated}, actual {actual}, consumed {consumed}"
            );

            // Settling again changes nothing.
            reservation.complete_with_actual(0);
            reservation.cancel();
            assert!((1_000.0 - tokens(&limiter) - actual as f64).abs() < 1e-9);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn shortfall_debit_is_not_floored() {
        let limiter = TokenBucketLimiter::per_minute(100).unwrap();
        let mut reservation = limiter.reserve_tokens(100).unwrap();
        reservation.complete_with_actual(400);
        assert!((tokens(&limiter) + 300.0).abs() < 1e-9);
        // Paying off 300 units of debt at 100/60 per second, plus one unit.
        let wait = limiter.probe_tokens(1);
        assert!((wait.as_secs_f64() - 301.0 * 0.6).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_debt_saturates_the_wait() {
        let limiter = TokenBucketLimiter::per_minute(1).unwrap();
        let mut reservation = limiter.reserve_tokens(1).unwrap();
        reservation.complete_with_actual(u64::MAX);

        assert_eq!(limiter.probe_tokens(0), INF_DURATION);
        assert_eq!(limiter.probe(), INF_DURATION);

        let mut pending = limiter.reserve().unwrap();
        assert!(!pending.is_acquired());
        assert!(pending.delay() >= FAR_FUTURE - Duration::from_secs(1));

        let ctx = WaitContext::with_timeout(Duration::from_secs(5));
        let err = pending.wait(&ctx).await.unwrap_err();
        assert_eq!(err.kind(), &AdmissionErrorKind::WaitTimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_after_cancelling_pending_reservation_fails() {
        let limiter = TokenBucketLimiter::per_minute(1).unwrap();
        let mut first = limiter.reserve().unwrap();
        let mut second = limiter.reserve().unwrap();
        assert!(first.is_acquired());
        assert!(!second.is_acquired());

        second.cancel();
        let err = second.wait(&WaitContext::background()).await.unwrap_err();
        assert_eq!(err.kind(), &AdmissionErrorKind::ReservationReleased);

        first.complete();
        assert!(first.wait(&WaitContext::background()).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn refund_is_capped_at_burst() {
        let limiter = TokenBucketLimiter::per_minute(60).unwrap();
        let mut reservation = limiter.reserve_tokens(10).unwrap();
        tokio::time::advance(Duration::from_secs(30)).await;
        reservation.cancel();
        assert!((tokens(&limiter) - 60.0).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn complete_is_a_noop_for_the_bucket() {
        let limiter = TokenBucketLimiter::per_minute(60).unwrap();
        let mut reservation = limiter.reserve().unwrap();
        reservation.complete();
        drop(reservation);
        assert!((tokens(&limiter) - 59.0).abs() < 1e-9);
    }
}
