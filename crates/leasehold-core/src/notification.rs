//! Notification log: the globally ordered event sequence, read in sections.

use std::sync::Arc;

use serde::Serialize;

use crate::error::DomainError;
use crate::recorder::{Notification, Recorder};

/// Default number of notifications per section.
pub const DEFAULT_SECTION_SIZE: i64 = 10;

/// Largest section a reader may request.
pub const MAX_SECTION_SIZE: i64 = 1000;

/// A contiguous run of notifications.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Section {
    /// `"first,last"` ids of the returned items, `None` when empty.
    pub id: Option<String>,
    /// Notifications in ascending id order.
    pub items: Vec<Notification>,
    /// Where to resume reading, `None` once the reader has caught up with
    /// the current commit horizon.
    pub next_id: Option<i64>,
}

/// Pull-based reader over a recorder's notifications. Holds no subscriber
/// state: each consumer stores its own position and resumes from it.
#[derive(Clone)]
pub struct NotificationLog {
    recorder: Arc<dyn Recorder>,
    max_section_size: i64,
}

impl std::fmt::Debug for NotificationLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationLog")
            .field("max_section_size", &self.max_section_size)
            .finish_non_exhaustive()
    }
}

impl NotificationLog {
    /// Creates a new `NotificationLog`.
    #[must_use]
    pub fn new(recorder: Arc<dyn Recorder>) -> Self {
        Self {
            recorder,
            max_section_size: MAX_SECTION_SIZE,
        }
    }

    /// Caps the number of notifications a single section may hold.
    #[must_use]
    pub fn with_max_section_size(mut self, size: i64) -> Self {
        self.max_section_size = size.max(1);
        self
    }

    /// Returns the notifications with ids in `[start, start + limit)`,
    /// optionally restricted to `topics`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if `start < 1`, `limit < 1`, or
    /// `limit` exceeds the maximum section size.
    pub async fn select(
        &self,
        start: i64,
        limit: i64,
        topics: &[String],
    ) -> Result<Section, DomainError> {
        if start < 1 {
            return Err(DomainError::Validation(format!(
                "section start must be at least 1, got {start}"
            )));
        }
        if !(1..=self.max_section_size).contains(&limit) {
            return Err(DomainError::Validation(format!(
                "section limit must be between 1 and {}, got {limit}",
                self.max_section_size
            )));
        }
        let stop = start.saturating_add(limit - 1);
        let items = self
            .recorder
            .select_notifications(start, limit, Some(stop), topics)
            .await?;
        // Read the horizon after the items so it covers all of them.
        let horizon = self.recorder.max_notification_id().await?;

        let id = match (items.first(), items.last()) {
            (Some(first), Some(last)) => Some(format!("{},{}", first.id, last.id)),
            _ => None,
        };
        let next_id = (stop < horizon).then_some(stop + 1);
        Ok(Section { id, items, next_id })
    }

    /// Returns the section addressed as `"first,last"` (inclusive).
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` for a malformed section id.
    pub async fn section(
        &self,
        section_id: &str,
        topics: &[String],
    ) -> Result<Section, DomainError> {
        let (start, last) = parse_section_id(section_id)?;
        self.select(start, last - start + 1, topics).await
    }

    /// The current commit horizon.
    ///
    /// # Errors
    ///
    /// Returns any recorder error.
    pub async fn max_notification_id(&self) -> Result<i64, DomainError> {
        self.recorder.max_notification_id().await
    }
}

fn parse_section_id(section_id: &str) -> Result<(i64, i64), DomainError> {
    let invalid = || DomainError::Validation(format!("invalid section id: {section_id:?}"));
    let (first, last) = section_id.split_once(',').ok_or_else(invalid)?;
    let first: i64 = first.trim().parse().map_err(|_| invalid())?;
    let last: i64 = last.trim().parse().map_err(|_| invalid())?;
    if last < first {
        return Err(invalid());
    }
    Ok((first, last))
}
