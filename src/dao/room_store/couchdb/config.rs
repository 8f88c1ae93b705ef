use std::time::Duration;

use super::error::{CouchDaoError, CouchResult};

/// Long-poll window requested from the `_changes` endpoint.
const DEFAULT_CHANGES_TIMEOUT: Duration = Duration::from_secs(25);

/// Runtime configuration describing how to connect to CouchDB.
#[derive(Debug, Clone)]
pub struct CouchConfig {
    /// Server URL without the database segment.
    pub base_url: String,
    /// Database holding one document per room.
    pub database: String,
    /// Basic-auth user, used together with `password`.
    pub username: Option<String>,
    /// Basic-auth password.
    pub password: Option<String>,
    /// How long a single `_changes` long-poll may hang before CouchDB answers empty.
    pub changes_timeout: Duration,
}

impl CouchConfig {
    /// Construct a configuration from explicit base URL and database name.
    pub fn new(base_url: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            database: database.into(),
            username: None,
            password: None,
            changes_timeout: DEFAULT_CHANGES_TIMEOUT,
        }
    }

    /// Attach basic-auth credentials to the configuration.
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Whether the environment selects the CouchDB backend at all.
    pub fn is_configured() -> bool {
        std::env::var_os("COUCH_BASE_URL").is_some()
    }

    /// Build a configuration by reading the expected environment variables.
    pub fn from_env() -> CouchResult<Self> {
        let base_url =
            std::env::var("COUCH_BASE_URL").map_err(|_| CouchDaoError::MissingEnvVar {
                var: "COUCH_BASE_URL",
            })?;
        let database = std::env::var("COUCH_DB")
            .map_err(|_| CouchDaoError::MissingEnvVar { var: "COUCH_DB" })?;

        let mut config = Self::new(base_url, database);

        if let (Some(username), Some(password)) = (
            std::env::var("COUCH_USERNAME").ok(),
            std::env::var("COUCH_PASSWORD").ok(),
        ) {
            config = config.with_credentials(username, password);
        }

        Ok(config)
    }
}
