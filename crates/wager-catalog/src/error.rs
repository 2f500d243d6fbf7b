//! Catalog sync errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("fetching catalog source failed: {0}")]
    Fetch(String),

    #[error("catalog row missing identity field: {0}")]
    InvalidRow(String),

    #[error(transparent)]
    Storage(#[from] wager_storage::StorageError),
}

pub type CatalogResult<T> = Result<T, CatalogError>;
