use crate::models::{EventRow, TimelineRow, UserRow};
use crate::{Database, OptionalExt, now_text};
use anyhow::Result;
use chronik_types::models::Role;
use rusqlite::Connection;

impl Database {
    // -- Users --

    pub fn create_user(&self, id: &str, username: &str, password_hash: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, password, created_at) VALUES (?1, ?2, ?3, ?4)",
                (id, username, password_hash, now_text()),
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username", username))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    /// The site-owner capability, resolved once per request rather than
    /// inferred from a hard-coded identity.
    pub fn is_site_owner(&self, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let flag: Option<bool> = conn
                .query_row(
                    "SELECT is_site_owner FROM users WHERE id = ?1",
                    [user_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(flag.unwrap_or(false))
        })
    }

    pub fn set_site_owner(&self, user_id: &str, grant: bool) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET is_site_owner = ?1 WHERE id = ?2",
                (grant, user_id),
            )?;
            Ok(())
        })
    }

    // -- Timelines --

    /// Creates the timeline and its creator membership in one transaction.
    pub fn create_timeline(
        &self,
        id: &str,
        name: &str,
        description: &str,
        visibility: &str,
        requires_approval: bool,
        created_by: &str,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            let now = now_text();
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO timelines (id, name, description, visibility, requires_approval, created_by, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![id, name, description, visibility, requires_approval, created_by, now],
            )?;
            tx.execute(
                "INSERT INTO memberships (timeline_id, user_id, role, is_active, is_blocked, joined_at)
                 VALUES (?1, ?2, ?3, 1, 0, ?4)",
                rusqlite::params![id, created_by, Role::Creator.as_str(), now],
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    pub fn get_timeline(&self, id: &str) -> Result<Option<TimelineRow>> {
        self.with_conn(|conn| query_timeline(conn, id))
    }

    pub fn update_timeline_settings(
        &self,
        id: &str,
        visibility: Option<&str>,
        requires_approval: Option<bool>,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let mut changed = 0;
            if let Some(v) = visibility {
                changed += conn.execute(
                    "UPDATE timelines SET visibility = ?1 WHERE id = ?2",
                    (v, id),
                )?;
            }
            if let Some(r) = requires_approval {
                changed += conn.execute(
                    "UPDATE timelines SET requires_approval = ?1 WHERE id = ?2",
                    (r, id),
                )?;
            }
            Ok(changed > 0)
        })
    }

    // -- Events --

    /// Creates the event, its home-timeline link, and its tags atomically.
    pub fn create_event(
        &self,
        id: &str,
        timeline_id: &str,
        created_by: &str,
        title: &str,
        body: &str,
        tags: &[String],
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            let now = now_text();
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO events (id, timeline_id, created_by, title, body, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![id, timeline_id, created_by, title, body, now],
            )?;
            tx.execute(
                "INSERT INTO event_timeline_links (event_id, timeline_id, shared_by, shared_at)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![id, timeline_id, created_by, now],
            )?;
            for tag in tags {
                tx.execute(
                    "INSERT OR IGNORE INTO event_tags (event_id, tag) VALUES (?1, ?2)",
                    rusqlite::params![id, tag],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
    }

    pub fn get_event(&self, id: &str) -> Result<Option<EventRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, timeline_id, created_by, title, body, created_at
                 FROM events WHERE id = ?1",
            )?;
            let row = stmt
                .query_row([id], |row| {
                    Ok(EventRow {
                        id: row.get(0)?,
                        timeline_id: row.get(1)?,
                        created_by: row.get(2)?,
                        title: row.get(3)?,
                        body: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                })
                .optional()?;
            Ok(row)
        })
    }

    pub fn get_event_tags(&self, event_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT tag FROM event_tags WHERE event_id = ?1 ORDER BY tag")?;
            let tags = stmt
                .query_map([event_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(tags)
        })
    }

    /// Returns false if the event was already shared to the timeline.
    pub fn share_event(&self, event_id: &str, timeline_id: &str, shared_by: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO event_timeline_links (event_id, timeline_id, shared_by, shared_at)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![event_id, timeline_id, shared_by, now_text()],
            )?;
            Ok(inserted > 0)
        })
    }

    /// Drop the link between an event and a timeline. Returns false when
    /// no such link exists.
    pub fn unshare_event(&self, event_id: &str, timeline_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM event_timeline_links WHERE event_id = ?1 AND timeline_id = ?2",
                rusqlite::params![event_id, timeline_id],
            )?;
            Ok(removed > 0)
        })
    }

    /// Events visible on a timeline: linked, minus the exclusion list.
    pub fn list_timeline_events(&self, timeline_id: &str, limit: u32) -> Result<Vec<EventRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT e.id, e.timeline_id, e.created_by, e.title, e.body, e.created_at
                 FROM events e
                 JOIN event_timeline_links l ON l.event_id = e.id
                 WHERE l.timeline_id = ?1
                   AND NOT EXISTS (
                       SELECT 1 FROM timeline_exclusions x
                       WHERE x.timeline_id = l.timeline_id AND x.event_id = e.id
                   )
                 ORDER BY e.created_at DESC
                 LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(rusqlite::params![timeline_id, limit], |row| {
                    Ok(EventRow {
                        id: row.get(0)?,
                        timeline_id: row.get(1)?,
                        created_by: row.get(2)?,
                        title: row.get(3)?,
                        body: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    // `column` is a fixed identifier supplied by this module, never user input.
    let sql = format!(
        "SELECT id, username, password, is_site_owner, created_at FROM users WHERE {} = ?1",
        column
    );
    let mut stmt = conn.prepare(&sql)?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                password: row.get(2)?,
                is_site_owner: row.get(3)?,
                created_at: row.get(4)?,
            })
        })
        .optional()?;

    Ok(row)
}

pub(crate) fn query_timeline(conn: &Connection, id: &str) -> Result<Option<TimelineRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, description, visibility, requires_approval, created_by, created_at
         FROM timelines WHERE id = ?1",
    )?;

    let row = stmt
        .query_row([id], |row| {
            Ok(TimelineRow {
                id: row.get(0)?,
                name: row.get(1)?,
                description: row.get(2)?,
                visibility: row.get(3)?,
                requires_approval: row.get(4)?,
                created_by: row.get(5)?,
                created_at: row.get(6)?,
            })
        })
        .optional()?;

    Ok(row)
}

#[cfg(test)]
mod tests {
    use crate::Database;

    #[test]
    fn timeline_creation_writes_creator_membership() {
        let db = Database::open_in_memory().unwrap();
        db.create_user("u1", "alice", "hash").unwrap();
        db.create_timeline("t1", "history", "", "public", false, "u1")
            .unwrap();

        let membership = db.get_membership("t1", "u1").unwrap().unwrap();
        assert_eq!(membership.role, "creator");
        assert!(membership.is_active);
        assert!(!membership.is_blocked);
    }

    #[test]
    fn excluded_events_disappear_from_listing_only() {
        let db = Database::open_in_memory().unwrap();
        db.create_user("u1", "alice", "hash").unwrap();
        db.create_timeline("t1", "history", "", "public", false, "u1")
            .unwrap();
        db.create_timeline("t2", "art", "", "public", false, "u1")
            .unwrap();
        db.create_event("e1", "t1", "u1", "event", "", &[]).unwrap();
        assert!(db.share_event("e1", "t2", "u1").unwrap());

        db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO timeline_exclusions (timeline_id, event_id) VALUES ('t1', 'e1')",
                [],
            )?;
            Ok(())
        })
        .unwrap();

        assert!(db.list_timeline_events("t1", 50).unwrap().is_empty());
        assert_eq!(db.list_timeline_events("t2", 50).unwrap().len(), 1);
    }

    #[test]
    fn unshare_removes_the_event_from_one_timeline_only() {
        let db = Database::open_in_memory().unwrap();
        db.create_user("u1", "alice", "hash").unwrap();
        db.create_timeline("t1", "history", "", "public", false, "u1")
            .unwrap();
        db.create_timeline("t2", "art", "", "public", false, "u1")
            .unwrap();
        db.create_event("e1", "t1", "u1", "event", "", &[]).unwrap();
        db.share_event("e1", "t2", "u1").unwrap();

        assert!(db.unshare_event("e1", "t2").unwrap());
        assert!(db.list_timeline_events("t2", 50).unwrap().is_empty());
        assert_eq!(db.list_timeline_events("t1", 50).unwrap().len(), 1);

        // Already gone.
        assert!(!db.unshare_event("e1", "t2").unwrap());
    }

    #[test]
    fn share_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        db.create_user("u1", "alice", "hash").unwrap();
        db.create_timeline("t1", "history", "", "public", false, "u1")
            .unwrap();
        db.create_timeline("t2", "art", "", "public", false, "u1")
            .unwrap();
        db.create_event("e1", "t1", "u1", "event", "", &[]).unwrap();

        assert!(db.share_event("e1", "t2", "u1").unwrap());
        assert!(!db.share_event("e1", "t2", "u1").unwrap());
    }
}
