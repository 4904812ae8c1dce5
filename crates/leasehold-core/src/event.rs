//! Domain event abstractions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::Clock;

/// Metadata attached to every domain event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Aggregate this event belongs to.
    pub originator_id: Uuid,
    /// Position of the event in the aggregate's history, starting at 1.
    pub originator_version: i64,
    /// Timestamp of event creation.
    pub timestamp: DateTime<Utc>,
}

impl EventMetadata {
    /// Builds metadata for the event following `version`.
    ///
    /// The timestamp never goes backwards relative to `last_timestamp`, so
    /// timestamps are monotonic per aggregate even if the clock is not.
    #[must_use]
    pub fn next(
        originator_id: Uuid,
        version: i64,
        last_timestamp: Option<DateTime<Utc>>,
        clock: &dyn Clock,
    ) -> Self {
        let now = clock.now();
        let timestamp = match last_timestamp {
            Some(last) if last > now => last,
            _ => now,
        };
        Self {
            originator_id,
            originator_version: version + 1,
            timestamp,
        }
    }
}

/// Trait that all domain events implement.
pub trait DomainEvent: Send + Sync + std::fmt::Debug {
    /// Returns the topic naming this event's type (used for decoding).
    fn topic(&self) -> &'static str;

    /// Encodes the event-specific payload.
    ///
    /// # Errors
    ///
    /// Returns the serializer error if the payload cannot be encoded.
    fn to_state(&self) -> Result<serde_json::Value, serde_json::Error>;

    /// Returns the metadata for this event.
    fn metadata(&self) -> &EventMetadata;
}
