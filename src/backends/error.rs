//! Backend Errors
//!
//! Failures raised by any store or queue variant. Callers above the backend
//! layer translate these into their own taxonomy.

/// Errors that can occur inside a storage or queue backend
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Conditional write lost against a concurrent writer
    #[error("Version conflict for {key}: expected version {expected}")]
    VersionConflict { key: String, expected: i64 },

    /// Backend reachable but refused or failed the operation
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Stored data could not be decoded
    #[error("Invalid stored data: {0}")]
    InvalidData(String),
}

impl BackendError {
    /// Check if this error is an optimistic-lock conflict
    pub fn is_version_conflict(&self) -> bool {
        matches!(self, BackendError::VersionConflict { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_conflict_detection() {
        let conflict = BackendError::VersionConflict {
            key: "alice".to_string(),
            expected: 3,
        };
        assert!(conflict.is_version_conflict());
        assert!(conflict.to_string().contains("alice"));

        assert!(!BackendError::Unavailable("down".to_string()).is_version_conflict());
    }
}
