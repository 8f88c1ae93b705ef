use std::error::Error;
use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by storage backends regardless of the underlying database.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend cannot be reached.
    #[error("storage unavailable: {message}")]
    Unavailable {
        /// What was being attempted.
        message: String,
        /// Backend failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// No answer within the allotted time.
    #[error("storage operation `{operation}` timed out")]
    Timeout {
        /// Operation that timed out.
        operation: String,
    },
    /// Another writer updated the document between our read and our write.
    #[error("concurrent update on room `{room_id}`")]
    Conflict {
        /// Contended room.
        room_id: String,
    },
    /// A batch guard did not hold; nothing was written.
    #[error(
        "precondition failed on room `{room_id}`: `{path}` expected {expected}, found {actual}"
    )]
    PreconditionFailed {
        /// Guarded room.
        room_id: String,
        /// Guarded field.
        path: String,
        /// Required value, as JSON.
        expected: String,
        /// Stored value, as JSON.
        actual: String,
    },
    /// No document for this room.
    #[error("room `{room_id}` not found")]
    RoomNotFound {
        /// Requested room.
        room_id: String,
    },
    /// The room code is taken.
    #[error("room `{room_id}` already exists")]
    RoomExists {
        /// Requested room.
        room_id: String,
    },
    /// A patch does not fit the document's shape.
    #[error("invalid patch on room `{room_id}` at `{path}`: {reason}")]
    InvalidPatch {
        /// Patched room.
        room_id: String,
        /// Offending path.
        path: String,
        /// What did not fit.
        reason: String,
    },
    /// The stored document does not decode into a room.
    #[error("room `{room_id}` holds an undecodable document")]
    Corrupt {
        /// Affected room.
        room_id: String,
        /// Decoding failure.
        #[source]
        source: serde_json::Error,
    },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }

    /// Whether retrying the same call may succeed (timeouts, outages, revision races).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StorageError::Unavailable { .. }
                | StorageError::Timeout { .. }
                | StorageError::Conflict { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_failures_are_retryable() {
        let outage = StorageError::unavailable(
            "offline".into(),
            std::io::Error::new(std::io::ErrorKind::NotConnected, "down"),
        );
        assert!(outage.is_retryable());
        assert!(
            StorageError::Timeout {
                operation: "update".into()
            }
            .is_retryable()
        );
        assert!(
            StorageError::Conflict {
                room_id: "ABCD".into()
            }
            .is_retryable()
        );
    }

    #[test]
    fn logical_failures_are_fatal() {
        assert!(
            !StorageError::RoomNotFound {
                room_id: "ABCD".into()
            }
            .is_retryable()
        );
        assert!(
            !StorageError::PreconditionFailed {
                room_id: "ABCD".into(),
                path: "status".into(),
                expected: "\"game\"".into(),
                actual: "\"result\"".into(),
            }
            .is_retryable()
        );
    }
}
