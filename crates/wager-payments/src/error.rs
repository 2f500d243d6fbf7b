//! Payment provider errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PaymentError {
    /// Timeout, 5xx, or transport failure. The caller should retry on the
    /// next tick rather than treat the operation as failed.
    #[error("transient provider failure: {0}")]
    Transient(String),

    /// The provider answered but rejected the call (`ok: false`).
    #[error("provider rejected {method}: {message}")]
    Rejected { method: String, message: String },

    #[error("unexpected provider response: {0}")]
    InvalidResponse(String),

    #[error("provider credentials not configured")]
    Unauthenticated,
}

pub type PaymentResult<T> = Result<T, PaymentError>;

impl From<reqwest::Error> for PaymentError {
    fn from(e: reqwest::Error) -> Self {
        PaymentError::Transient(e.to_string())
    }
}
