//! Error types shared by the CouchDB storage implementation.

use reqwest::StatusCode;
use thiserror::Error;

use crate::dao::storage::StorageError;

/// Convenient result alias returning [`CouchDaoError`] failures.
pub type CouchResult<T> = Result<T, CouchDaoError>;

/// Failures that can occur while interacting with CouchDB.
#[derive(Debug, Error)]
pub enum CouchDaoError {
    /// Required environment variable is missing.
    #[error("missing CouchDB environment variable `{var}`")]
    MissingEnvVar {
        /// Name of the variable.
        var: &'static str,
    },
    /// Building the HTTP client failed (invalid TLS setup, etc).
    #[error("failed to build CouchDB client")]
    ClientBuilder {
        /// Underlying failure.
        #[source]
        source: reqwest::Error,
    },
    /// CouchDB rejected a GET against the target database.
    #[error("failed to query CouchDB database `{database}`")]
    DatabaseQuery {
        /// Database name.
        database: String,
        /// Underlying failure.
        #[source]
        source: reqwest::Error,
    },
    /// CouchDB rejected a database creation request.
    #[error("failed to create CouchDB database `{database}`")]
    DatabaseCreate {
        /// Database name.
        database: String,
        /// Underlying failure.
        #[source]
        source: reqwest::Error,
    },
    /// CouchDB returned an unexpected status code for a database operation.
    #[error("unexpected CouchDB database response status {status} for `{database}`")]
    DatabaseStatus {
        /// Database name.
        database: String,
        /// Status returned by CouchDB.
        status: StatusCode,
    },
    /// A request to a document endpoint could not be sent.
    #[error("failed to send CouchDB request to `{path}`")]
    RequestSend {
        /// Request path relative to the database.
        path: String,
        /// Underlying failure.
        #[source]
        source: reqwest::Error,
    },
    /// CouchDB returned an unexpected status code for a document endpoint.
    #[error("unexpected CouchDB response status {status} for `{path}`")]
    RequestStatus {
        /// Request path relative to the database.
        path: String,
        /// Status returned by CouchDB.
        status: StatusCode,
    },
    /// CouchDB refused a write because the revision we read is no longer current.
    #[error("revision conflict on `{path}`")]
    RevisionConflict {
        /// Request path relative to the database.
        path: String,
    },
    /// Response payload could not be parsed into JSON.
    #[error("failed to decode CouchDB response for `{path}`")]
    DecodeResponse {
        /// Request path relative to the database.
        path: String,
        /// Underlying failure.
        #[source]
        source: reqwest::Error,
    },
    /// Decoding a JSON value into the expected model failed.
    #[error("failed to deserialize CouchDB value for `{path}`")]
    DeserializeValue {
        /// Request path relative to the database.
        path: String,
        /// Underlying failure.
        #[source]
        source: serde_json::Error,
    },
}

impl From<CouchDaoError> for StorageError {
    fn from(err: CouchDaoError) -> Self {
        match err {
            CouchDaoError::RevisionConflict { path } => StorageError::Conflict { room_id: path },
            CouchDaoError::RequestSend { ref source, .. } if source.is_timeout() => {
                StorageError::Timeout {
                    operation: err.to_string(),
                }
            }
            CouchDaoError::DeserializeValue { path, source } => StorageError::Corrupt {
                room_id: path,
                source,
            },
            other => StorageError::unavailable(other.to_string(), other),
        }
    }
}
