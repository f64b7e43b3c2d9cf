use thiserror::Error;

/// Store-level failure, classified the way the backing store reports it.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("request throttled by the store")]
    Throttled,
    #[error("document already exists")]
    Conflict,
    #[error("document not found")]
    NotFound,
    #[error("invalid document: {0}")]
    InvalidDocument(String),
    #[error("document serialization failed")]
    Serialization(#[from] serde_json::Error),
    #[error("store backend error ({status}): {message}")]
    Backend { status: u16, message: String },
}

impl StoreError {
    /// Status code the store associates with this failure.
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            Self::Throttled => 429,
            Self::Conflict => 409,
            Self::NotFound => 404,
            Self::InvalidDocument(_) | Self::Serialization(_) => 400,
            Self::Backend { status, .. } => *status,
        }
    }

    #[must_use]
    pub fn is_throttled(&self) -> bool {
        matches!(self, Self::Throttled)
    }

    pub(crate) fn backend(status: u16, message: impl Into<String>) -> Self {
        Self::Backend {
            status,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_preserves_classification() {
        assert_eq!(StoreError::Throttled.status(), 429);
        assert_eq!(StoreError::Conflict.status(), 409);
        assert_eq!(StoreError::NotFound.status(), 404);
        assert_eq!(StoreError::InvalidDocument("x".into()).status(), 400);
        assert_eq!(StoreError::backend(503, "down").status(), 503);
        assert!(StoreError::Throttled.is_throttled());
        assert!(!StoreError::Conflict.is_throttled());
    }
}
