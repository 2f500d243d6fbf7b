//! Engine-level errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Storage(#[from] wager_storage::StorageError),

    #[error(transparent)]
    Payment(#[from] wager_payments::PaymentError),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
