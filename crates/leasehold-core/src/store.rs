//! Event store: (de)serialization of domain events on top of a `Recorder`.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::error::DomainError;
use crate::event::{DomainEvent, EventMetadata};
use crate::recorder::{EventSelection, Recorder, StoredEvent};

/// Typed constructor for one topic.
pub type DecodeFn<E> = fn(EventMetadata, serde_json::Value) -> Result<E, serde_json::Error>;

/// Static mapping from topic to decoder, populated at startup.
pub struct TopicRegistry<E> {
    decoders: HashMap<&'static str, DecodeFn<E>>,
}

impl<E> TopicRegistry<E> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// Registers `decode` for `topic`, replacing any earlier registration.
    #[must_use]
    pub fn with(mut self, topic: &'static str, decode: DecodeFn<E>) -> Self {
        self.decoders.insert(topic, decode);
        self
    }

    /// Returns `true` if `topic` has a decoder.
    #[must_use]
    pub fn contains(&self, topic: &str) -> bool {
        self.decoders.contains_key(topic)
    }

    /// Registered topics, sorted.
    #[must_use]
    pub fn topics(&self) -> Vec<&'static str> {
        let mut topics: Vec<_> = self.decoders.keys().copied().collect();
        topics.sort_unstable();
        topics
    }

    /// Decodes a stored event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::UnknownEventType` for an unregistered topic and
    /// `DomainError::Infrastructure` for a malformed payload.
    pub fn decode(&self, stored: StoredEvent) -> Result<E, DomainError> {
        let decode = self
            .decoders
            .get(stored.topic.as_str())
            .ok_or_else(|| DomainError::UnknownEventType(stored.topic.clone()))?;
        let metadata = EventMetadata {
            originator_id: stored.originator_id,
            originator_version: stored.originator_version,
            timestamp: stored.timestamp,
        };
        decode(metadata, stored.state).map_err(|e| {
            DomainError::Infrastructure(format!(
                "failed to decode {} v{} ({}): {e}",
                stored.originator_id, stored.originator_version, stored.topic
            ))
        })
    }
}

impl<E> Default for TopicRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> std::fmt::Debug for TopicRegistry<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TopicRegistry")
            .field("topics", &self.topics())
            .finish()
    }
}

/// Encodes a domain event into its stored form.
///
/// # Errors
///
/// Returns `DomainError::Infrastructure` if the payload cannot be encoded.
pub fn encode<E: DomainEvent>(event: &E) -> Result<StoredEvent, DomainError> {
    let metadata = event.metadata();
    let state = event.to_state().map_err(|e| {
        DomainError::Infrastructure(format!("failed to encode {}: {e}", event.topic()))
    })?;
    Ok(StoredEvent {
        originator_id: metadata.originator_id,
        originator_version: metadata.originator_version,
        topic: event.topic().to_owned(),
        state,
        timestamp: metadata.timestamp,
    })
}

/// Event store for one event type.
pub struct EventStore<E> {
    recorder: Arc<dyn Recorder>,
    registry: Arc<TopicRegistry<E>>,
}

impl<E> Clone for EventStore<E> {
    fn clone(&self) -> Self {
        Self {
            recorder: Arc::clone(&self.recorder),
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<E> std::fmt::Debug for EventStore<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStore")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl<E: DomainEvent> EventStore<E> {
    /// Creates a new `EventStore`.
    #[must_use]
    pub fn new(recorder: Arc<dyn Recorder>, registry: TopicRegistry<E>) -> Self {
        Self {
            recorder,
            registry: Arc::new(registry),
        }
    }

    /// The underlying recorder.
    #[must_use]
    pub fn recorder(&self) -> &Arc<dyn Recorder> {
        &self.recorder
    }

    /// The topic registry.
    #[must_use]
    pub fn registry(&self) -> &TopicRegistry<E> {
        &self.registry
    }

    /// Loads and decodes an aggregate's events in version order.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::UnknownEventType` if a stored topic is not
    /// registered, or any recorder error.
    pub async fn get(
        &self,
        originator_id: Uuid,
        selection: EventSelection,
    ) -> Result<Vec<E>, DomainError> {
        let stored = self
            .recorder
            .select_events(originator_id, selection)
            .await?;
        debug!(%originator_id, count = stored.len(), "loaded stored events");
        self.decode_all(stored)
    }

    /// Decodes already-selected stored events, preserving their order.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::UnknownEventType` if a topic is not registered.
    pub fn decode_all(&self, stored: Vec<StoredEvent>) -> Result<Vec<E>, DomainError> {
        stored
            .into_iter()
            .map(|event| self.registry.decode(event))
            .collect()
    }

    /// Encodes and appends pending events, returning their notification ids.
    ///
    /// # Errors
    ///
    /// Propagates `DomainError::ConcurrencyConflict` unchanged when
    /// `expected_version` is stale.
    pub async fn put(
        &self,
        originator_id: Uuid,
        expected_version: i64,
        events: &[E],
    ) -> Result<Vec<i64>, DomainError> {
        let stored = events.iter().map(encode).collect::<Result<Vec<_>, _>>()?;
        self.recorder
            .insert_events(originator_id, expected_version, &stored)
            .await
    }
}
