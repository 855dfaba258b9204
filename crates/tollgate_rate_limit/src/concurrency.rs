//! Concurrency limiter backed by a Tokio semaphore.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tollgate_core::WaitContext;
use tollgate_error::{AdmissionError, AdmissionErrorKind, AdmissionResult};
use tracing::{debug, instrument, trace};

use crate::{INF_DURATION, RequestLimiter, Reservation};

/// Largest number of slots a single limiter can hold.
pub const MAX_CONCURRENCY: usize = Semaphore::MAX_PERMITS;

/// Caps the number of requests in flight.
///
/// Slots are fungible, so completing and cancelling a reservation are the
/// same operation: the slot goes back to the semaphore. Concurrency has no
/// predictable wait, so an unavailable slot is reported as [`INF_DURATION`].
///
/// # Example
///
/// ```
/// use tollgate_rate_limit::{ConcurrencyLimiter, RequestLimiter, Reservation};
///
/// let limiter = ConcurrencyLimiter::new(1).unwrap();
/// let mut first = limiter.reserve().unwrap();
/// let second = limiter.reserve().unwrap();
/// assert!(first.is_acquired());
/// assert!(!second.is_acquired());
/// first.complete();
/// ```
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl ConcurrencyLimiter {
    /// Create a limiter allowing `max_concurrency` requests at once.
    ///
    /// Returns `None` for non-positive values, which mean "unlimited".
    /// Values above [`MAX_CONCURRENCY`] are clamped to it.
    #[instrument]
    pub fn new(max_concurrency: i64) -> Option<Self> {
        let capacity = usize::try_from(max_concurrency)
            .ok()
            .filter(|n| *n > 0)?
            .min(MAX_CONCURRENCY);
        debug!(capacity, "Creating concurrency limiter");
        Some(Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        })
    }

    /// Configured number of slots.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots free right now.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    fn reserve_slot(&self) -> ConcurrencyReservation {
        let permit = self.semaphore.clone().try_acquire_owned().ok();
        trace!(acquired = permit.is_some(), "Concurrency reservation");
        ConcurrencyReservation {
            semaphore: Arc::clone(&self.semaphore),
            permit,
            granted: false,
            released: false,
        }
    }
}

impl RequestLimiter for ConcurrencyLimiter {
    fn probe(&self) -> Duration {
        if self.semaphore.available_permits() > 0 {
            Duration::ZERO
        } else {
            INF_DURATION
        }
    }

    fn reserve(&self) -> AdmissionResult<Box<dyn Reservation>> {
        Ok(Box::new(self.reserve_slot()))
    }
}

/// A claim on one concurrency slot.
#[derive(Debug)]
pub struct ConcurrencyReservation {
    semaphore: Arc<Semaphore>,
    permit: Option<OwnedSemaphorePermit>,
    /// Whether a slot was held at the time of release.
    granted: bool,
    released: bool,
}

impl ConcurrencyReservation {
    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.granted = self.permit.take().is_some();
        if self.granted {
            trace!("Released concurrency slot");
        }
    }
}

#[async_trait]
impl Reservation for ConcurrencyReservation {
    fn is_acquired(&self) -> bool {
        self.permit.is_some()
    }

    fn delay(&self) -> Duration {
        if self.permit.is_some() {
            Duration::ZERO
        } else {
            INF_DURATION
        }
    }

    async fn wait(&mut self, ctx: &WaitContext) -> AdmissionResult<()> {
        if self.released {
            return if self.granted {
                Ok(())
            } else {
                Err(AdmissionError::new(AdmissionErrorKind::ReservationReleased))
            };
        }
        if self.permit.is_some() {
            return Ok(());
        }

        let semaphore = Arc::clone(&self.semaphore);
        tokio::select! {
            biased;
            err = ctx.done() => Err(err),
            permit = semaphore.acquire_owned() => {
                // The semaphore is never closed while a limiter exists; a closed
                // semaphore can only mean shutdown.
                let permit = permit
                    .map_err(|_| AdmissionError::new(AdmissionErrorKind::WaitCancelled))?;
                self.permit = Some(permit);
                Ok(())
            }
        }
    }

    fn cancel(&mut self) {
        self.release();
    }

    fn complete(&mut self) {
        self.release();
    }
}

impl Drop for ConcurrencyReservation {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_positive_capacity_means_unlimited() {
        assert!(ConcurrencyLimiter::new(0).is_none());
        assert!(ConcurrencyLimiter::new(-3).is_none());
        assert_eq!(ConcurrencyLimiter::new(4).map(|l| l.capacity()), Some(4));
    }

    #[test]
    fn oversized_capacity_is_clamped() {
        let limiter = ConcurrencyLimiter::new(i64::MAX).unwrap();
        assert_eq!(limiter.capacity(), MAX_CONCURRENCY);
        assert_eq!(limiter.available(), MAX_CONCURRENCY);
    }

    #[test]
    fn probe_does_not_hold_a_slot() {
        let limiter = ConcurrencyLimiter::new(1).unwrap();
        assert_eq!(limiter.probe(), Duration::ZERO);
        assert_eq!(limiter.probe(), Duration::ZERO);
        assert_eq!(limiter.available(), 1);

        let held = limiter.reserve().unwrap();
        assert_eq!(limiter.probe(), INF_DURATION);
        drop(held);
        assert_eq!(limiter.probe(), Duration::ZERO);
    }

    #[test]
    fn cancel_and_complete_are_idempotent() {
        let limiter = ConcurrencyLimiter::new(2).unwrap();
        let mut a = limiter.reserve().unwrap();
        let _b = limiter.reserve().unwrap();
        assert_eq!(limiter.available(), 0);

        a.cancel();
        a.cancel();
        a.complete();
        assert_eq!(limiter.available(), 1);
    }

    #[test]
    fn cancelling_unacquired_reservation_frees_nothing() {
        let limiter = ConcurrencyLimiter::new(1).unwrap();
        let _held = limiter.reserve().unwrap();
        let mut pending = limiter.reserve().unwrap();
        assert!(!pending.is_acquired());

        pending.cancel();
        assert_eq!(limiter.available(), 0);
    }

    #[tokio::test]
    async fn wait_after_cancelling_pending_reservation_fails() {
        let limiter = ConcurrencyLimiter::new(1).unwrap();
        let mut held = limiter.reserve().unwrap();
        let mut pending = limiter.reserve().unwrap();

        pending.cancel();
        held.complete();
        let err = pending.wait(&WaitContext::background()).await.unwrap_err();
        assert_eq!(err.kind(), &AdmissionErrorKind::ReservationReleased);
        assert!(!pending.is_acquired());
        assert_eq!(limiter.available(), 1);

        // A slot held until completion stays a successful wait.
        assert!(held.wait(&WaitContext::background()).await.is_ok());
    }
}
