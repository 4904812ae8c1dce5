//! Projection runner: pulls the notification log and feeds a projection,
//! recording its position as it goes.
//!
//! Delivery is at-least-once. A crash between processing a notification and
//! recording its id replays that notification on restart, so projections
//! must apply updates idempotently.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::DomainError;
use crate::notification::{DEFAULT_SECTION_SIZE, NotificationLog};
use crate::recorder::{Notification, TrackingRecorder};

/// A read model built from notifications.
#[async_trait]
pub trait Projection: Send + Sync {
    /// Name under which the read position is tracked.
    fn name(&self) -> &str;

    /// Topics this projection consumes. Empty means every topic.
    fn topics(&self) -> Vec<String> {
        Vec::new()
    }

    /// Applies one notification.
    async fn process(&self, notification: &Notification) -> Result<(), DomainError>;
}

/// Drives one projection from the notification log.
pub struct ProjectionRunner<P> {
    log: NotificationLog,
    tracking: Arc<dyn TrackingRecorder>,
    projection: Arc<P>,
    section_size: i64,
    poll_interval: Duration,
}

impl<P> Clone for ProjectionRunner<P> {
    fn clone(&self) -> Self {
        Self {
            log: self.log.clone(),
            tracking: Arc::clone(&self.tracking),
            projection: Arc::clone(&self.projection),
            section_size: self.section_size,
            poll_interval: self.poll_interval,
        }
    }
}

impl<P: Projection> ProjectionRunner<P> {
    /// Creates a new `ProjectionRunner`.
    #[must_use]
    pub fn new(
        log: NotificationLog,
        tracking: Arc<dyn TrackingRecorder>,
        projection: Arc<P>,
    ) -> Self {
        Self {
            log,
            tracking,
            projection,
            section_size: DEFAULT_SECTION_SIZE,
            poll_interval: Duration::from_secs(1),
        }
    }

    /// Sets how many notifications are pulled per section.
    #[must_use]
    pub fn with_section_size(mut self, size: i64) -> Self {
        self.section_size = size.max(1);
        self
    }

    /// Sets the delay between polls in `run_until`.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// The projection being driven.
    #[must_use]
    pub fn projection(&self) -> &Arc<P> {
        &self.projection
    }

    /// Processes everything committed up to now. Returns the number of
    /// notifications applied.
    ///
    /// # Errors
    ///
    /// Stops at the first failing notification and returns its error; the
    /// position stays just before it.
    pub async fn run_once(&self) -> Result<usize, DomainError> {
        let name = self.projection.name().to_owned();
        let topics = self.projection.topics();
        let mut position = self.tracking.max_tracking_id(&name).await?;
        let mut processed = 0;

        loop {
            let section = self
                .log
                .select(position + 1, self.section_size, &topics)
                .await?;
            for notification in &section.items {
                self.projection.process(notification).await?;
                self.tracking.insert_tracking(&name, notification.id).await?;
                position = notification.id;
                processed += 1;
            }
            match section.next_id {
                Some(next_id) => {
                    // Filtered sections may skip ids; record that we looked.
                    if next_id - 1 > position {
                        position = next_id - 1;
                        self.tracking.insert_tracking(&name, position).await?;
                    }
                }
                None => break,
            }
        }

        if processed > 0 {
            debug!(projection = %name, processed, position, "projection caught up");
        }
        Ok(processed)
    }

    /// Polls until `shutdown` resolves. Errors are logged and retried on the
    /// next poll.
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()> + Send,
    {
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tokio::pin!(shutdown);
        info!(projection = %self.projection.name(), "projection runner started");
        loop {
            tokio::select! {
                () = &mut shutdown => break,
                _ = interval.tick() => {
                    if let Err(err) = self.run_once().await {
                        warn!(
                            projection = %self.projection.name(),
                            error = %err,
                            "projection poll failed"
                        );
                    }
                }
            }
        }
        info!(projection = %self.projection.name(), "projection runner stopped");
    }
}
