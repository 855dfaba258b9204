//! Cancellation scope for blocking admission calls.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tollgate_error::{AdmissionError, AdmissionErrorKind};

/// The caller's cancellation scope for a blocking wait.
///
/// A `WaitContext` combines an explicit cancellation signal with an optional
/// deadline. Every blocking operation in Tollgate (`Reservation::wait`,
/// blocking election) races its own progress against [`WaitContext::done`]
/// and returns the error it yields, so callers can tell an explicit
/// cancellation ([`AdmissionErrorKind::WaitCancelled`]) from an expired
/// deadline ([`AdmissionErrorKind::WaitTimedOut`]).
///
/// Clones share the same cancellation signal.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use tollgate_core::WaitContext;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let ctx = WaitContext::with_timeout(Duration::from_secs(5));
/// assert!(ctx.err().is_none());
///
/// ctx.cancel();
/// assert!(ctx.err().is_some());
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct WaitContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl WaitContext {
    /// A context that is never done unless cancelled explicitly.
    pub fn background() -> Self {
        Self::default()
    }

    /// A context that expires `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// A context that expires at `deadline`.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Some(deadline),
        }
    }

    /// A context driven by an existing cancellation token.
    pub fn from_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Derive a context that is cancelled with this one but can also be
    /// cancelled on its own. The deadline is inherited.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// The deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// The underlying cancellation token.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Cancel this context and every child derived from it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Report synchronously whether the context is already done.
    ///
    /// Cancellation takes precedence over an expired deadline.
    #[track_caller]
    pub fn err(&self) -> Option<AdmissionError> {
        if self.token.is_cancelled() {
            return Some(AdmissionError::new(AdmissionErrorKind::WaitCancelled));
        }
        match self.deadline {
            Some(deadline) if deadline <= Instant::now() => {
                Some(AdmissionError::new(AdmissionErrorKind::WaitTimedOut))
            }
            _ => None,
        }
    }

    /// Resolve once the context is cancelled or its deadline passes.
    pub async fn done(&self) -> AdmissionError {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    biased;
                    _ = self.token.cancelled() => {
                        AdmissionError::new(AdmissionErrorKind::WaitCancelled)
                    }
                    _ = tokio::time::sleep_until(deadline) => {
                        AdmissionError::new(AdmissionErrorKind::WaitTimedOut)
                    }
                }
            }
            None => {
                self.token.cancelled().await;
                AdmissionError::new(AdmissionErrorKind::WaitCancelled)
            }
        }
    }
}
