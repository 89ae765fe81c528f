use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id              TEXT PRIMARY KEY,
            username        TEXT NOT NULL UNIQUE,
            password        TEXT NOT NULL,
            is_site_owner   INTEGER NOT NULL DEFAULT 0,
            created_at      TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS timelines (
            id                  TEXT PRIMARY KEY,
            name                TEXT NOT NULL UNIQUE,
            description         TEXT NOT NULL DEFAULT '',
            visibility          TEXT NOT NULL DEFAULT 'public',
            requires_approval   INTEGER NOT NULL DEFAULT 0,
            created_by          TEXT NOT NULL REFERENCES users(id),
            created_at          TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- Membership rows are history: state flags flip, rows are never deleted.
        -- A member is never both active and blocked.
        CREATE TABLE IF NOT EXISTS memberships (
            timeline_id     TEXT NOT NULL REFERENCES timelines(id),
            user_id         TEXT NOT NULL REFERENCES users(id),
            role            TEXT NOT NULL DEFAULT 'member',
            is_active       INTEGER NOT NULL DEFAULT 0,
            is_blocked      INTEGER NOT NULL DEFAULT 0,
            joined_at       TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (timeline_id, user_id),
            CHECK (NOT (is_active = 1 AND is_blocked = 1))
        );

        CREATE INDEX IF NOT EXISTS idx_memberships_user
            ON memberships(user_id);

        -- One row per user: the serialized cross-device membership snapshot.
        CREATE TABLE IF NOT EXISTS passports (
            user_id             TEXT PRIMARY KEY REFERENCES users(id),
            memberships_json    TEXT NOT NULL DEFAULT '[]',
            last_updated        TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS events (
            id              TEXT PRIMARY KEY,
            timeline_id     TEXT NOT NULL REFERENCES timelines(id),
            created_by      TEXT NOT NULL REFERENCES users(id),
            title           TEXT NOT NULL,
            body            TEXT NOT NULL DEFAULT '',
            created_at      TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- Cross-timeline associations, including the home link written at
        -- event creation.
        CREATE TABLE IF NOT EXISTS event_timeline_links (
            event_id        TEXT NOT NULL REFERENCES events(id),
            timeline_id     TEXT NOT NULL REFERENCES timelines(id),
            shared_by       TEXT NOT NULL REFERENCES users(id),
            shared_at       TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE (event_id, timeline_id)
        );

        CREATE INDEX IF NOT EXISTS idx_links_timeline
            ON event_timeline_links(timeline_id);

        CREATE TABLE IF NOT EXISTS event_tags (
            event_id        TEXT NOT NULL REFERENCES events(id),
            tag             TEXT NOT NULL,
            UNIQUE (event_id, tag)
        );

        -- Events moderated out of a single timeline land here; listings
        -- filter against it.
        CREATE TABLE IF NOT EXISTS timeline_exclusions (
            timeline_id     TEXT NOT NULL REFERENCES timelines(id),
            event_id        TEXT NOT NULL,
            UNIQUE (timeline_id, event_id)
        );

        CREATE TABLE IF NOT EXISTS reports (
            id              TEXT PRIMARY KEY,
            timeline_id     TEXT NOT NULL REFERENCES timelines(id),
            event_id        TEXT NOT NULL,
            reporter_id     TEXT REFERENCES users(id),
            reason          TEXT NOT NULL DEFAULT '',
            status          TEXT NOT NULL DEFAULT 'pending',
            resolution      TEXT,
            verdict         TEXT,
            created_at      TEXT NOT NULL DEFAULT (datetime('now')),
            resolved_at     TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_reports_timeline
            ON reports(timeline_id, status);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
