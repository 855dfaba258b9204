//! Classification of errors into transient and permanent failures.

use crate::{AdmissionError, TollgateError, TollgateErrorKind};

/// Trait for errors that can be classified as retryable or permanent.
///
/// Admission control uses this to decide whether a failed upstream call
/// should be attempted again with exponential backoff, or fail immediately.
///
/// # Example
///
/// ```
/// use tollgate_error::RetryableError;
///
/// #[derive(Debug)]
/// enum UpstreamError {
///     Overloaded,
///     InvalidApiKey,
/// }
///
/// impl RetryableError for UpstreamError {
///     fn is_retryable(&self) -> bool {
///         matches!(self, UpstreamError::Overloaded)
///     }
/// }
///
/// assert!(UpstreamError::Overloaded.is_retryable());
/// assert!(!UpstreamError::InvalidApiKey.is_retryable());
/// ```
pub trait RetryableError {
    /// Returns true if this error should trigger a retry.
    ///
    /// Transient errors like 503 (service unavailable), 429 (rate limit),
    /// or network timeouts should return true. Permanent errors like 401
    /// (unauthorized) or 400 (bad request) should return false.
    fn is_retryable(&self) -> bool;
}

impl RetryableError for AdmissionError {
    fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

impl RetryableError for TollgateError {
    fn is_retryable(&self) -> bool {
        match self.kind() {
            TollgateErrorKind::Config(_) => false,
            TollgateErrorKind::Admission(e) => e.kind().is_retryable(),
        }
    }
}
