use chrono::NaiveDate;
use thiserror::Error;

use crate::models::Nutrient;

pub type Result<T, E = LedgerError> = std::result::Result<T, E>;

/// Everything that can go wrong between a raw request and the ledger table.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Invalid date '{0}'. Use YYYY-MM-DD")]
    InvalidDate(String),

    #[error("Invalid {field} value '{value}'. Expected a finite number")]
    InvalidNutrient { field: Nutrient, value: String },

    #[error("No entry for {0}")]
    NotFound(NaiveDate),

    /// The change would push a total below zero or past the largest finite value.
    #[error("Totals for {0} would leave the valid range (negative or not finite)")]
    OutOfRange(NaiveDate),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl LedgerError {
    /// True for failures caused by the caller's input rather than the store.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            Self::InvalidDate(_) | Self::InvalidNutrient { .. } | Self::OutOfRange(_)
        )
    }
}

/// Backend failures. Never shown to HTTP clients verbatim.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("connection pool: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl From<rusqlite::Error> for LedgerError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(StorageError::Sqlite(err))
    }
}

impl From<r2d2::Error> for LedgerError {
    fn from(err: r2d2::Error) -> Self {
        Self::Storage(StorageError::Pool(err))
    }
}
