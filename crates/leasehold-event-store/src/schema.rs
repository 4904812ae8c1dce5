//! Event store database schema.

/// SQL to create the events, snapshots and tracking tables.
///
/// `(originator_id, originator_version)` is the primary key, which backs the
/// optimistic concurrency check. `notification_id` is assigned by the
/// recorder under a table lock, so it is gap-free and follows commit order.
pub const CREATE_TABLES: &str = r"
CREATE TABLE IF NOT EXISTS stored_events (
    originator_id      UUID NOT NULL,
    originator_version BIGINT NOT NULL CHECK (originator_version > 0),
    topic              TEXT NOT NULL,
    state              JSONB NOT NULL,
    created_at         TIMESTAMPTZ NOT NULL,
    notification_id    BIGINT NOT NULL,
    PRIMARY KEY (originator_id, originator_version)
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_stored_events_notification_id
    ON stored_events (notification_id);

CREATE INDEX IF NOT EXISTS idx_stored_events_topic_notification_id
    ON stored_events (topic, notification_id);

CREATE TABLE IF NOT EXISTS snapshots (
    originator_id      UUID NOT NULL,
    originator_version BIGINT NOT NULL,
    topic              TEXT NOT NULL,
    state              JSONB NOT NULL,
    created_at         TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (originator_id, originator_version)
);

CREATE TABLE IF NOT EXISTS projection_tracking (
    projection_name TEXT PRIMARY KEY,
    notification_id BIGINT NOT NULL
);
";

/// SQL to drop every table created by [`CREATE_TABLES`].
pub const DROP_TABLES: &str = r"
DROP TABLE IF EXISTS projection_tracking;
DROP TABLE IF EXISTS snapshots;
DROP TABLE IF EXISTS stored_events;
";
