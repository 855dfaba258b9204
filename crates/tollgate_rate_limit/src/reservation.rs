//! The reservation protocol shared by every limiter strategy.
//!
//! A caller first [`probe`](RequestLimiter::probe)s or directly
//! [`reserve`](RequestLimiter::reserve)s quota. Reserving never blocks: it
//! returns a handle that is either already acquired or describes how long
//! the caller would have to [`wait`](Reservation::wait). Once the upstream
//! call finishes the caller settles the handle with exactly one of
//! [`complete`](Reservation::complete),
//! [`complete_with_actual`](TokenReservation::complete_with_actual) or
//! [`cancel`](Reservation::cancel). Settling twice is a no-op, and dropping an
//! unsettled handle cancels it.

use std::time::Duration;

use async_trait::async_trait;
use tollgate_core::WaitContext;
use tollgate_error::AdmissionResult;

/// Sentinel duration for "this will never become available by waiting" or
/// "no predictable wait exists".
pub const INF_DURATION: Duration = Duration::MAX;

/// A (possibly pending) claim on one unit of quota.
#[async_trait]
pub trait Reservation: Send {
    /// Whether the quota is held right now.
    fn is_acquired(&self) -> bool;

    /// Time remaining until the reservation is usable.
    ///
    /// `Duration::ZERO` once acquired, [`INF_DURATION`] when no prediction
    /// is possible.
    fn delay(&self) -> Duration;

    /// Block until the reservation is acquired or `ctx` is done.
    ///
    /// Returns immediately if already acquired. On cancellation or deadline
    /// the context's error is returned unchanged and no further quota is
    /// consumed.
    ///
    /// # Errors
    ///
    /// Fails with `ReservationReleased` if the reservation was cancelled or
    /// completed while still pending; it holds no quota and never will.
    async fn wait(&mut self, ctx: &WaitContext) -> AdmissionResult<()>;

    /// Return any quota held to the pool. Idempotent.
    fn cancel(&mut self);

    /// Finalize consumption as exactly the reserved amount. Idempotent.
    fn complete(&mut self);
}

/// A reservation for an estimated number of tokens.
pub trait TokenReservation: Reservation {
    /// The estimated token count this reservation was made for.
    fn reserved(&self) -> u64;

    /// Finalize with the true consumption, refunding a surplus or debiting a
    /// shortfall relative to [`reserved`](TokenReservation::reserved).
    /// Idempotent.
    fn complete_with_actual(&mut self, actual: u64);
}

/// A limiter counting requests.
pub trait RequestLimiter: Send + Sync {
    /// Read-only estimate of the wait for one more request.
    fn probe(&self) -> Duration;

    /// Claim one request without blocking.
    ///
    /// # Errors
    ///
    /// Fails only when a single request can never fit the limiter.
    fn reserve(&self) -> AdmissionResult<Box<dyn Reservation>>;
}

/// A limiter counting tokens.
pub trait TokenLimiter: Send + Sync {
    /// Read-only estimate of the wait for `tokens` more tokens.
    fn probe_tokens(&self, tokens: u64) -> Duration;

    /// Claim `tokens` without blocking.
    ///
    /// # Errors
    ///
    /// Fails with `QuotaUnsatisfiable` when `tokens` exceeds the hard capacity
    /// of the limiter, regardless of current usage.
    fn reserve_tokens(&self, tokens: u64) -> AdmissionResult<Box<dyn TokenReservation>>;
}
