//! Server configuration read from the environment.

use leasehold_event_store::{ConfigError, PostgresSettings};

/// Which recorder backs the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Infrastructure {
    /// `PostgreSQL` through `PgRecorder`.
    Postgres,
    /// A process-local in-memory recorder. Nothing survives a restart.
    Memory,
}

/// Everything the server needs at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Interface to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
    /// Events between snapshots; 0 disables snapshots.
    pub snapshot_interval: i64,
    /// Recorder backend.
    pub infrastructure: Infrastructure,
    /// Database settings, used when `infrastructure` is `Postgres`.
    pub postgres: PostgresSettings,
}

impl AppConfig {
    /// Reads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is present but malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads configuration through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is present but malformed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_owned());
        let port = match lookup("PORT") {
            Some(value) => value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue { name: "PORT", value })?,
            None => 8000,
        };
        let snapshot_interval = match lookup("SNAPSHOT_INTERVAL") {
            Some(value) => value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue {
                    name: "SNAPSHOT_INTERVAL",
                    value,
                })?,
            None => 0,
        };
        let infrastructure = match lookup("INFRASTRUCTURE") {
            None => Infrastructure::Postgres,
            Some(value) => match value.trim().to_ascii_lowercase().as_str() {
                "postgres" | "postgresql" => Infrastructure::Postgres,
                "memory" => Infrastructure::Memory,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        name: "INFRASTRUCTURE",
                        value,
                    });
                }
            },
        };
        let postgres = PostgresSettings::from_lookup(lookup)?;

        Ok(Self {
            host,
            port,
            snapshot_interval,
            infrastructure,
            postgres,
        })
    }
}
