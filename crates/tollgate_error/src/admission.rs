//! Admission errors raised by quota limiters and upstream election.

/// Specific admission failure conditions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::Display)]
pub enum AdmissionErrorKind {
    /// A single request asks for more than the limiter can ever hold.
    ///
    /// Returned synchronously from `reserve`; retrying with the same size
    /// will fail the same way.
    #[display("Requested {} exceeds hard capacity {}", requested, capacity)]
    QuotaUnsatisfiable {
        /// Units (requests or tokens) asked for
        requested: u64,
        /// Burst size or daily limit of the limiter
        capacity: u64,
    },
    /// The caller cancelled while the reservation was waiting.
    #[display("Wait cancelled")]
    WaitCancelled,
    /// The caller's deadline passed while the reservation was waiting.
    #[display("Wait deadline exceeded")]
    WaitTimedOut,
    /// `wait` was called on a reservation settled before it was acquired.
    #[display("Reservation settled before it was acquired")]
    ReservationReleased,
    /// No candidate upstream could be elected for the model.
    #[display("No upstream available for model '{}'", _0)]
    NoUpstreamAvailable(String),
}

impl AdmissionErrorKind {
    /// Check if the same request may succeed when attempted again later.
    pub fn is_retryable(&self) -> bool {
        match self {
            AdmissionErrorKind::QuotaUnsatisfiable { .. } => false,
            AdmissionErrorKind::WaitCancelled => true,
            AdmissionErrorKind::WaitTimedOut => true,
            AdmissionErrorKind::ReservationReleased => false,
            AdmissionErrorKind::NoUpstreamAvailable(_) => true,
        }
    }
}

/// Admission error with location tracking.
///
/// # Examples
///
/// ```
/// use tollgate_error::{AdmissionError, AdmissionErrorKind};
///
/// let err = AdmissionError::new(AdmissionErrorKind::WaitTimedOut);
/// assert_eq!(err.kind(), &AdmissionErrorKind::WaitTimedOut);
/// assert!(err.is_retryable());
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Admission Error: {} at line {} in {}", kind, line, file)]
pub struct AdmissionError {
    kind: AdmissionErrorKind,
    line: u32,
    file: &'static str,
}

impl AdmissionError {
    /// Create a new admission error with caller location tracking.
    #[track_caller]
    pub fn new(kind: AdmissionErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }

    /// Get the error kind.
    pub fn kind(&self) -> &AdmissionErrorKind {
        &self.kind
    }

    /// Check if the request may succeed when attempted again later.
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    /// True when the error came from a cancelled or expired wait.
    pub fn is_wait_interrupted(&self) -> bool {
        matches!(
            self.kind,
            AdmissionErrorKind::WaitCancelled | AdmissionErrorKind::WaitTimedOut
        )
    }
}

impl From<AdmissionErrorKind> for AdmissionError {
    #[track_caller]
    fn from(kind: AdmissionErrorKind) -> Self {
        Self::new(kind)
    }
}

/// Result type for admission operations.
pub type AdmissionResult<T> = std::result::Result<T, AdmissionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_context_errors_interrupt_a_wait() {
        assert!(AdmissionError::new(AdmissionErrorKind::WaitCancelled).is_wait_interrupted());
        assert!(AdmissionError::new(AdmissionErrorKind::WaitTimedOut).is_wait_interrupted());

        let released = AdmissionError::new(AdmissionErrorKind::ReservationReleased);
        assert!(!released.is_wait_interrupted());
        assert!(!released.is_retryable());

        let oversize = AdmissionError::from(AdmissionErrorKind::QuotaUnsatisfiable {
            requested: 10,
            capacity: 5,
        });
        assert!(!oversize.is_wait_interrupted());
    }
}
