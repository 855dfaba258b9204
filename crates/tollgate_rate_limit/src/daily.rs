//! Calendar-aligned daily quota backing RPD and TPD limits.
//!
//! Usage accumulates in a plain counter that is zeroed at the next local
//! midnight of a configured timezone. Every read or write first "flushes"
//! the state: if the wall clock has passed the reset instant, usage starts
//! over and the reset moves to the following midnight.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;
use tollgate_core::{SystemClock, WaitContext, WallClock};
use tollgate_error::{AdmissionError, AdmissionErrorKind, AdmissionResult};
use tracing::{debug, instrument, trace};

use crate::{INF_DURATION, RequestLimiter, Reservation, TokenLimiter, TokenReservation};

/// Longest single sleep of a waiting daily reservation.
///
/// Waiters re-check the quota at least this often, so usage released by
/// cancelled reservations is picked up before the reset.
pub const DAILY_POLL_INTERVAL: Duration = Duration::from_secs(1);

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// First local midnight strictly after `now`, in UTC.
///
/// Where a DST transition skips midnight the reset happens at the first
/// existing local instant of the day.
pub fn next_midnight(now: DateTime<Utc>, location: Tz) -> DateTime<Utc> {
    let tomorrow = now
        .with_timezone(&location)
        .date_naive()
        .succ_opt()
        .unwrap_or(NaiveDate::MAX);
    let midnight = tomorrow.and_time(NaiveTime::MIN);

    location
        .from_local_datetime(&midnight)
        .earliest()
        .or_else(|| {
            location
                .from_local_datetime(&(midnight + TimeDelta::hours(1)))
                .earliest()
        })
        .map(|reset| reset.with_timezone(&Utc))
        .unwrap_or_else(|| now + TimeDelta::days(1))
}

#[derive(Debug)]
struct DailyState {
    used: u64,
    reset_time: DateTime<Utc>,
}

#[derive(Debug)]
struct Quota {
    limit: u64,
    location: Tz,
    clock: Arc<dyn WallClock>,
    state: Mutex<DailyState>,
}

impl Quota {
    /// Lock the state and roll it over if the reset instant has passed.
    fn flushed(&self) -> (MutexGuard<'_, DailyState>, DateTime<Utc>) {
        let now = self.clock.now();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if now > state.reset_time {
            debug!(
                used = state.used,
                reset_time = %state.reset_time,
                "Daily quota reset"
            );
            state.used = 0;
            state.reset_time = next_midnight(now, self.location);
        }
        (state, now)
    }

    fn fits(&self, state: &DailyState, tokens: u64) -> bool {
        state.used.saturating_add(tokens) <= self.limit
    }

    fn until_reset(state: &DailyState, now: DateTime<Utc>) -> Duration {
        (state.reset_time - now).to_std().unwrap_or(Duration::ZERO)
    }

    fn unsatisfiable(&self, tokens: u64) -> AdmissionError {
        AdmissionError::new(AdmissionErrorKind::QuotaUnsatisfiable {
            requested: tokens,
            capacity: self.limit,
        })
    }
}

/// Daily quota limiter for RPD and TPD limits.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use tollgate_rate_limit::{DailyQuotaLimiter, Reservation, TokenLimiter};
///
/// let tpd = DailyQuotaLimiter::new(100, chrono_tz::UTC).unwrap();
/// let first = tpd.reserve_tokens(60).unwrap();
/// assert_eq!(first.delay(), Duration::ZERO);
///
/// // Only 40 tokens remain until midnight.
/// let second = tpd.reserve_tokens(50).unwrap();
/// assert!(second.delay() > Duration::ZERO);
/// ```
#[derive(Debug, Clone)]
pub struct DailyQuotaLimiter {
    quota: Arc<Quota>,
}

impl DailyQuotaLimiter {
    /// Create a quota of `limit` units per day resetting at midnight in
    /// `location`, reading the system clock.
    ///
    /// Returns `None` for non-positive limits, which mean "unlimited".
    pub fn new(limit: i64, location: Tz) -> Option<Self> {
        Self::with_clock(limit, location, Arc::new(SystemClock))
    }

    /// Create a quota reading time from `clock`.
    #[instrument(skip(clock))]
    pub fn with_clock(limit: i64, location: Tz, clock: Arc<dyn WallClock>) -> Option<Self> {
        let limit = u64::try_from(limit).ok().filter(|n| *n > 0)?;
        let reset_time = next_midnight(clock.now(), location);
        debug!(limit, %reset_time, "Creating daily quota limiter");
        Some(Self {
            quota: Arc::new(Quota {
                limit,
                location,
                clock,
                state: Mutex::new(DailyState {
                    used: 0,
                    reset_time,
                }),
            }),
        })
    }

    /// Units allowed per day.
    pub fn limit(&self) -> u64 {
        self.quota.limit
    }

    /// Timezone whose midnight resets the quota.
    pub fn location(&self) -> Tz {
        self.quota.location
    }

    /// The next reset instant.
    pub fn reset_time(&self) -> DateTime<Utc> {
        self.quota.flushed().0.reset_time
    }

    fn probe_units(&self, tokens: u64) -> Duration {
        if tokens > self.quota.limit {
            return INF_DURATION;
        }
        let (state, now) = self.quota.flushed();
        if self.quota.fits(&state, tokens) {
            Duration::ZERO
        } else {
            Quota::until_reset(&state, now)
        }
    }

    fn reserve_units(&self, tokens: u64) -> AdmissionResult<DailyReservation> {
        if tokens > self.quota.limit {
            return Err(self.quota.unsatisfiable(tokens));
        }

        let (mut state, _) = self.quota.flushed();
        let acquired = self.quota.fits(&state, tokens);
        if acquired {
            state.used += tokens;
        }
        debug!(tokens, acquired, used = state.used, "Reserved from daily quota");
        drop(state);

        Ok(DailyReservation {
            quota: Arc::clone(&self.quota),
            reserved: tokens,
            acquired,
            released: false,
        })
    }
}

impl RequestLimiter for DailyQuotaLimiter {
    fn probe(&self) -> Duration {
        self.probe_units(1)
    }

    fn reserve(&self) -> AdmissionResult<Box<dyn Reservation>> {
        Ok(Box::new(self.reserve_units(1)?))
    }
}

impl TokenLimiter for DailyQuotaLimiter {
    fn probe_tokens(&self, tokens: u64) -> Duration {
        self.probe_units(tokens)
    }

    fn reserve_tokens(&self, tokens: u64) -> AdmissionResult<Box<dyn TokenReservation>> {
        Ok(Box::new(self.reserve_units(tokens)?))
    }
}

/// A claim on a daily quota.
///
/// Unlike a bucket debit, nothing is counted until the reservation is
/// acquired, so cancelling an unacquired one is free.
#[derive(Debug)]
pub struct DailyReservation {
    quota: Arc<Quota>,
    reserved: u64,
    acquired: bool,
    released: bool,
}

impl DailyReservation {
    /// Commit if the quota fits now; otherwise report how long to sleep.
    fn try_commit(&mut self) -> Result<(), Duration> {
        let (mut state, now) = self.quota.flushed();
        if self.quota.fits(&state, self.reserved) {
            state.used += self.reserved;
            self.acquired = true;
            trace!(used = state.used, "Committed daily reservation after wait");
            Ok(())
        } else {
            Err(Quota::until_reset(&state, now))
        }
    }
}

#[async_trait]
impl Reservation for DailyReservation {
    fn is_acquired(&self) -> bool {
        self.acquired && !self.released
    }

    fn delay(&self) -> Duration {
        if self.acquired {
            return Duration::ZERO;
        }
        let (state, now) = self.quota.flushed();
        if self.quota.fits(&state, self.reserved) {
            Duration::ZERO
        } else {
            Quota::until_reset(&state, now)
        }
    }

    async fn wait(&mut self, ctx: &WaitContext) -> AdmissionResult<()> {
        if self.acquired {
            return Ok(());
        }
        if self.released {
            return Err(AdmissionError::new(AdmissionErrorKind::ReservationReleased));
        }

        loop {
            let pause = match self.try_commit() {
                Ok(()) => return Ok(()),
                Err(until_reset) => until_reset.clamp(MIN_POLL_INTERVAL, DAILY_POLL_INTERVAL),
            };

            tokio::select! {
                biased;
                err = ctx.done() => return Err(err),
                _ = tokio::time::sleep(pause) => {}
            }
        }
    }

    fn cancel(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if self.acquired {
            let (mut state, _) = self.quota.flushed();
            state.used = state.used.saturating_sub(self.reserved);
            trace!(used = state.used, "Refunded daily reservation");
        }
    }

    fn complete(&mut self) {
        self.released = true;
    }
}

impl TokenReservation for DailyReservation {
    fn reserved(&self) -> u64 {
        self.reserved
    }

    fn complete_with_actual(&mut self, actual: u64) {
        if self.released {
            return;
        }
        self.released = true;
        if self.acquired {
            let (mut state, _) = self.quota.flushed();
            state.used = state
                .used
                .saturating_add(actual)
                .saturating_sub(self.reserved);
            trace!(actual, used = state.used, "Settled daily reservation");
        }
    }
}

impl Drop for DailyReservation {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tollgate_core::ManualClock;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn used(limiter: &DailyQuotaLimiter) -> u64 {
        limiter.quota.flushed().0.used
    }

    #[test]
    fn next_midnight_in_utc() {
        assert_eq!(
            next_midnight(at(2025, 6, 10, 15, 30), chrono_tz::UTC),
            at(2025, 6, 11, 0, 0)
        );
        // Exactly at midnight the next reset is a full day away.
        assert_eq!(
            next_midnight(at(2025, 6, 11, 0, 0), chrono_tz::UTC),
            at(2025, 6, 12, 0, 0)
        );
    }

    #[test]
    fn next_midnight_follows_local_calendar() {
        // 20:00 UTC is already the next day in Shanghai (UTC+8).
        assert_eq!(
            next_midnight(at(2025, 6, 10, 20, 0), chrono_tz::Asia::Shanghai),
            at(2025, 6, 11, 16, 0)
        );
        // New York is UTC-4 in June.
        assert_eq!(
            next_midnight(at(2025, 6, 10, 2, 0), chrono_tz::America::New_York),
            at(2025, 6, 10, 4, 0)
        );
    }

    #[test]
    fn next_midnight_skipped_by_dst() {
        // Santiago springs forward at 00:00 local on 2024-09-08.
        let reset = next_midnight(at(2024, 9, 7, 12, 0), chrono_tz::America::Santiago);
        assert_eq!(reset, at(2024, 9, 8, 4, 0));
    }

    #[test]
    fn complete_with_actual_adjusts_usage() {
        let clock = Arc::new(ManualClock::new(at(2025, 1, 1, 9, 0)));
        let limiter = DailyQuotaLimiter::with_clock(1_000, chrono_tz::UTC, clock).unwrap();

        let mut over = limiter.reserve_tokens(100).unwrap();
        over.complete_with_actual(30);
        assert_eq!(used(&limiter), 30);

        let mut under = limiter.reserve_tokens(100).unwrap();
        under.complete_with_actual(250);
        assert_eq!(used(&limiter), 280);

        under.complete_with_actual(1);
        under.cancel();
        assert_eq!(used(&limiter), 280);
    }

    #[test]
    fn cancel_refunds_only_acquired_usage() {
        let clock = Arc::new(ManualClock::new(at(2025, 1, 1, 9, 0)));
        let limiter = DailyQuotaLimiter::with_clock(10, chrono_tz::UTC, clock).unwrap();

        let mut held = limiter.reserve_tokens(8).unwrap();
        let mut pending = limiter.reserve_tokens(5).unwrap();
        assert!(!pending.is_acquired());

        pending.cancel();
        assert_eq!(used(&limiter), 8);
        held.cancel();
        assert_eq!(used(&limiter), 0);
    }

    #[tokio::test]
    async fn wait_after_cancelling_pending_reservation_fails() {
        let clock = Arc::new(ManualClock::new(at(2025, 1, 1, 9, 0)));
        let limiter = DailyQuotaLimiter::with_clock(10, chrono_tz::UTC, clock).unwrap();

        let _held = limiter.reserve_tokens(8).unwrap();
        let mut pending = limiter.reserve_tokens(5).unwrap();
        pending.cancel();

        let err = pending.wait(&WaitContext::background()).await.unwrap_err();
        assert_eq!(err.kind(), &AdmissionErrorKind::ReservationReleased);
        assert_eq!(used(&limiter), 8);
    }

    #[test]
    fn cancel_after_reset_never_goes_negative() {
        let clock = Arc::new(ManualClock::new(at(2025, 1, 1, 23, 0)));
        let limiter =
            DailyQuotaLimiter::with_clock(10, chrono_tz::UTC, clock.clone()).unwrap();

        let mut yesterday = limiter.reserve_tokens(7).unwrap();
        clock.advance(TimeDelta::hours(2));
        let _today = limiter.reserve_tokens(3).unwrap();

        yesterday.cancel();
        assert_eq!(used(&limiter), 0);
    }
}
