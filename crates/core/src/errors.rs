use thiserror::Error;

use crate::discovery::store::StoreError;

/// Error taxonomy for discovery operations.
///
/// `InvalidInput` is rejected before any store access. Primary-path search
/// outages never appear here: the router consumes them and falls back, so a
/// caller only ever sees `ServiceUnavailable` when both paths are down.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum DiscoveryError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl DiscoveryError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Boundary-safe text for response bodies. The detailed cause stays in logs.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "The request could not be processed. Check inputs and try again.",
            Self::NotFound { .. } => "The requested resource does not exist.",
            Self::Conflict(_) => "The request conflicts with the current state.",
            Self::ServiceUnavailable(_) => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal(_) => "An unexpected internal error occurred.",
        }
    }
}

impl From<StoreError> for DiscoveryError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Unavailable(message) => Self::ServiceUnavailable(message),
            StoreError::Duplicate(message) => Self::Conflict(message),
            StoreError::Backend(message) => Self::Internal(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::DiscoveryError;
    use crate::discovery::store::StoreError;

    #[test]
    fn store_errors_map_to_discovery_kinds() {
        assert!(matches!(
            DiscoveryError::from(StoreError::Unavailable("index down".to_string())),
            DiscoveryError::ServiceUnavailable(_)
        ));
        assert!(matches!(
            DiscoveryError::from(StoreError::Duplicate("favorite exists".to_string())),
            DiscoveryError::Conflict(_)
        ));
        assert!(matches!(
            DiscoveryError::from(StoreError::Backend("disk io".to_string())),
            DiscoveryError::Internal(_)
        ));
    }

    #[test]
    fn user_messages_do_not_leak_causes() {
        let error = DiscoveryError::Internal("constraint violated on products.rowid".to_string());
        assert!(!error.user_message().contains("rowid"));

        let error = DiscoveryError::ServiceUnavailable("fts5 module missing".to_string());
        assert!(!error.user_message().contains("fts5"));
    }
}
