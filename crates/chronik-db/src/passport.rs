use crate::{Database, now_text};
use anyhow::Result;
use chronik_types::models::{PassportEntry, Role, Visibility};
use rusqlite::Connection;
use tracing::warn;
use uuid::Uuid;

impl Database {
    /// Fetch the stored passport, creating an empty one on first access.
    /// Returns the entries plus the last-updated timestamp.
    pub fn get_passport(&self, user_id: &str) -> Result<(Vec<PassportEntry>, String)> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO passports (user_id, memberships_json, last_updated)
                 VALUES (?1, '[]', ?2)",
                rusqlite::params![user_id, now_text()],
            )?;

            let (json, last_updated): (String, String) = conn.query_row(
                "SELECT memberships_json, last_updated FROM passports WHERE user_id = ?1",
                [user_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;

            let entries: Vec<PassportEntry> = serde_json::from_str(&json).unwrap_or_else(|e| {
                warn!("Corrupt passport for user {}: {}", user_id, e);
                Vec::new()
            });
            Ok((entries, last_updated))
        })
    }

    /// Rebuild the passport from scratch and overwrite the stored snapshot.
    ///
    /// The snapshot is the union of explicit active memberships, implicit
    /// creator entries, and (for holders of the site-owner capability)
    /// an entry for every remaining timeline. Order is deterministic so two
    /// syncs with no intervening change produce identical output.
    pub fn sync_passport(&self, user_id: &str, site_owner: bool) -> Result<Vec<PassportEntry>> {
        self.with_conn(|conn| {
            let mut entries = Vec::new();

            // Explicit active memberships.
            let mut stmt = conn.prepare(
                "SELECT m.timeline_id, t.name, t.visibility, m.role, m.joined_at
                 FROM memberships m
                 JOIN timelines t ON t.id = m.timeline_id
                 WHERE m.user_id = ?1 AND m.is_active = 1",
            )?;
            let rows = stmt
                .query_map([user_id], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            for (timeline_id, name, visibility, role, joined_at) in rows {
                entries.push(PassportEntry {
                    timeline_id: parse_id(&timeline_id),
                    timeline_name: name,
                    visibility: parse_visibility(&visibility),
                    role: parse_role(&role),
                    is_active_member: true,
                    joined_at: Some(joined_at),
                    is_creator: false,
                    is_site_owner: false,
                });
            }

            // Timelines the user created but has no stored row for.
            let mut stmt = conn.prepare(
                "SELECT id, name, visibility, created_at FROM timelines
                 WHERE created_by = ?1 AND id NOT IN (
                     SELECT timeline_id FROM memberships WHERE user_id = ?1
                 )",
            )?;
            let rows = stmt
                .query_map([user_id], map_timeline_entry)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            for (timeline_id, name, visibility, created_at) in rows {
                entries.push(PassportEntry {
                    timeline_id: parse_id(&timeline_id),
                    timeline_name: name,
                    visibility: parse_visibility(&visibility),
                    role: Role::Creator,
                    is_active_member: true,
                    joined_at: Some(created_at),
                    is_creator: true,
                    is_site_owner: false,
                });
            }

            // Site-owner capability: every timeline not already covered.
            // A stored row always wins over the sweep, so an owner who was
            // kicked or blocked on a timeline gets no entry for it until
            // that row changes.
            if site_owner {
                let mut stmt = conn.prepare(
                    "SELECT id, name, visibility, created_at FROM timelines
                     WHERE id NOT IN (
                         SELECT timeline_id FROM memberships WHERE user_id = ?1
                     ) AND created_by <> ?1",
                )?;
                let rows = stmt
                    .query_map([user_id], map_timeline_entry)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                for (timeline_id, name, visibility, created_at) in rows {
                    entries.push(PassportEntry {
                        timeline_id: parse_id(&timeline_id),
                        timeline_name: name,
                        visibility: parse_visibility(&visibility),
                        role: Role::SiteOwner,
                        is_active_member: true,
                        joined_at: Some(created_at),
                        is_creator: false,
                        is_site_owner: true,
                    });
                }
            }

            entries.sort_by(|a, b| a.timeline_id.cmp(&b.timeline_id));

            upsert_passport(conn, user_id, &entries)?;
            Ok(entries)
        })
    }
}

fn upsert_passport(conn: &Connection, user_id: &str, entries: &[PassportEntry]) -> Result<()> {
    let json = serde_json::to_string(entries)?;
    conn.execute(
        "INSERT INTO passports (user_id, memberships_json, last_updated)
         VALUES (?1, ?2, ?3)
         ON CONFLICT (user_id) DO UPDATE SET
             memberships_json = excluded.memberships_json,
             last_updated = excluded.last_updated",
        rusqlite::params![user_id, json, now_text()],
    )?;
    Ok(())
}

fn map_timeline_entry(
    row: &rusqlite::Row<'_>,
) -> std::result::Result<(String, String, String, String), rusqlite::Error> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn parse_id(raw: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt timeline id '{}': {}", raw, e);
        Uuid::default()
    })
}

fn parse_role(raw: &str) -> Role {
    Role::parse(raw).unwrap_or_else(|| {
        warn!("Unknown stored role '{}', treating as member", raw);
        Role::Member
    })
}

fn parse_visibility(raw: &str) -> Visibility {
    Visibility::parse(raw).unwrap_or_else(|| {
        warn!("Unknown visibility '{}', treating as public", raw);
        Visibility::Public
    })
}

#[cfg(test)]
mod tests {
    use crate::Database;
    use chronik_types::models::Role;

    // Uuid-shaped ids so passport entries survive the parse.
    const T1: &str = "00000000-0000-0000-0000-0000000000a1";
    const T2: &str = "00000000-0000-0000-0000-0000000000a2";

    fn setup() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.create_user("creator", "alice", "hash").unwrap();
        db.create_user("u2", "bob", "hash").unwrap();
        db.create_user("owner", "root", "hash").unwrap();
        db.set_site_owner("owner", true).unwrap();
        db.create_timeline(T1, "history", "", "public", false, "creator")
            .unwrap();
        db.create_timeline(T2, "art", "", "private", false, "creator")
            .unwrap();
        db
    }

    #[test]
    fn passport_contains_explicit_active_memberships_only() {
        let db = setup();
        let t1 = db.get_timeline(T1).unwrap().unwrap();
        let t2 = db.get_timeline(T2).unwrap().unwrap();
        db.join_timeline(&t1, "u2").unwrap();
        db.join_timeline(&t2, "u2").unwrap();
        db.remove_member(T2, "u2").unwrap();

        let entries = db.sync_passport("u2", false).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].timeline_id.to_string(), T1);
        assert_eq!(entries[0].role, Role::Member);
        assert!(entries[0].is_active_member);
    }

    #[test]
    fn creator_without_stored_row_gets_implicit_entry() {
        let db = setup();
        // Simulate a legacy timeline created before membership rows existed.
        db.with_conn(|conn| {
            conn.execute(
                "DELETE FROM memberships WHERE timeline_id = ?1 AND user_id = 'creator'",
                [T1],
            )?;
            Ok(())
        })
        .unwrap();

        let entries = db.sync_passport("creator", false).unwrap();
        let implicit = entries
            .iter()
            .find(|e| e.timeline_id.to_string() == T1)
            .unwrap();
        assert_eq!(implicit.role, Role::Creator);
        assert!(implicit.is_creator);
        assert!(implicit.is_active_member);
    }

    #[test]
    fn site_owner_sees_every_timeline_with_zero_rows() {
        let db = setup();
        let entries = db.sync_passport("owner", true).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.role == Role::SiteOwner));
        assert!(entries.iter().all(|e| e.is_active_member));
        assert!(entries.iter().all(|e| e.is_site_owner));
    }

    #[test]
    fn site_owner_sweep_defers_to_stored_rows() {
        let db = setup();
        let t1 = db.get_timeline(T1).unwrap().unwrap();
        db.join_timeline(&t1, "owner").unwrap();
        db.block_member(T1, "owner").unwrap();

        let entries = db.sync_passport("owner", true).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].timeline_id.to_string(), T2);
    }

    #[test]
    fn sync_is_idempotent() {
        let db = setup();
        let t1 = db.get_timeline(T1).unwrap().unwrap();
        db.join_timeline(&t1, "u2").unwrap();

        let first = db.sync_passport("u2", false).unwrap();
        let second = db.sync_passport("u2", false).unwrap();
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn sync_overwrites_rather_than_merges() {
        let db = setup();
        let t1 = db.get_timeline(T1).unwrap().unwrap();
        db.join_timeline(&t1, "u2").unwrap();
        db.sync_passport("u2", false).unwrap();

        db.remove_member(T1, "u2").unwrap();
        db.sync_passport("u2", false).unwrap();

        let (entries, _) = db.get_passport("u2").unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn fetch_creates_an_empty_passport() {
        let db = setup();
        let (entries, _) = db.get_passport("u2").unwrap();
        assert!(entries.is_empty());
    }
}
