use vitrine_core::chrono::{DateTime, Utc};
use vitrine_core::StoreError;

pub mod catalog;
pub mod interaction;

pub use catalog::SqlCatalogStore;
pub use interaction::SqlInteractionStore;

/// `Unavailable` carries everything the search router treats as recoverable;
/// constraint hits become `Duplicate` so callers can answer with a conflict.
pub(crate) fn store_error(error: sqlx::Error) -> StoreError {
    match &error {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Duplicate(error.to_string())
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Unavailable(error.to_string())
        }
        _ => StoreError::Backend(error.to_string()),
    }
}

pub(crate) fn decode_error(message: impl Into<String>) -> StoreError {
    StoreError::Backend(message.into())
}

pub(crate) fn parse_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| decode_error(format!("invalid timestamp in `{column}`: {e}")))
}
