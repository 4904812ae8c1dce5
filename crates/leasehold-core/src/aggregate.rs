//! Aggregate root abstraction.

use uuid::Uuid;

use crate::event::DomainEvent;

/// Trait for aggregate roots that reconstitute from event history.
///
/// An aggregate's state is a pure fold of its events in version order:
/// `apply` must be deterministic and free of side effects.
pub trait AggregateRoot: Send + Sync + Sized {
    /// The event type this aggregate produces and consumes.
    type Event: DomainEvent;

    /// Stable type name, used as the snapshot topic.
    const TYPE_NAME: &'static str;

    /// Returns an aggregate at version 0 with no applied events.
    fn blank(id: Uuid) -> Self;

    /// Returns the aggregate identifier.
    fn aggregate_id(&self) -> Uuid;

    /// Returns the version of the last applied event (pending included).
    fn version(&self) -> i64;

    /// Apply an event to mutate internal state and advance the version.
    fn apply(&mut self, event: &Self::Event);

    /// Returns uncommitted events produced by command handling.
    fn uncommitted_events(&self) -> &[Self::Event];

    /// Clears uncommitted events after persistence.
    fn clear_uncommitted_events(&mut self);
}
