//! Leasehold Event Store — `PostgreSQL` recorder.
//!
//! Persists events, snapshots and projection positions, and serves the
//! notification log, behind the `Recorder` and `TrackingRecorder` traits
//! from `leasehold-core`.

pub mod config;
pub mod pg_recorder;
pub mod schema;

pub use config::{ConfigError, PostgresSettings};
pub use pg_recorder::PgRecorder;
