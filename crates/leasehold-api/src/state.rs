//! Shared application state.

use std::sync::Arc;

use leasehold_core::clock::Clock;
use leasehold_core::notification::NotificationLog;
use leasehold_core::projection::ProjectionRunner;
use leasehold_core::recorder::Recorder;
use leasehold_core::snapshot::SnapshotPolicy;
use leasehold_rentals::application::command_handlers::RentalRepositories;
use leasehold_rentals::application::directory::RentalDirectory;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Repositories for units, tenants and leases.
    pub repos: RentalRepositories,
    /// Runner feeding the rental directory.
    pub directory: ProjectionRunner<RentalDirectory>,
    /// The global notification log.
    pub log: NotificationLog,
    /// Time source for new events.
    pub clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("repos", &self.repos)
            .field("log", &self.log)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Create new application state over `recorder`.
    #[must_use]
    pub fn new(
        recorder: Arc<dyn Recorder>,
        snapshot_policy: SnapshotPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let log = NotificationLog::new(Arc::clone(&recorder));
        Self {
            repos: RentalRepositories::new(recorder, snapshot_policy),
            directory: RentalDirectory::runner(log.clone()),
            log,
            clock,
        }
    }
}
