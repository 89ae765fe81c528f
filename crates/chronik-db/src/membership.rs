use crate::models::{MemberListRow, MembershipRow, TimelineRow};
use crate::{Database, OptionalExt, now_text};
use anyhow::Result;
use chronik_types::models::Role;
use rusqlite::Connection;

/// Outcome of a self-service join attempt.
pub enum JoinOutcome {
    /// Immediately active (timeline does not require approval), or already
    /// an active member.
    Active(MembershipRow),
    /// Waiting on an admin decision.
    Pending(MembershipRow),
    /// Blocked users cannot rejoin until explicitly unblocked.
    Blocked,
}

impl Database {
    pub fn get_membership(&self, timeline_id: &str, user_id: &str) -> Result<Option<MembershipRow>> {
        self.with_conn(|conn| query_membership(conn, timeline_id, user_id))
    }

    /// Join, honoring the timeline's current approval requirement.
    ///
    /// Idempotent: an already-active member keeps their state; rejoining
    /// after a kick resets the row to the same initial state as a fresh
    /// join would produce today.
    pub fn join_timeline(&self, timeline: &TimelineRow, user_id: &str) -> Result<JoinOutcome> {
        self.with_conn(|conn| {
            if let Some(existing) = query_membership(conn, &timeline.id, user_id)? {
                if existing.is_blocked {
                    return Ok(JoinOutcome::Blocked);
                }
                if existing.is_active {
                    return Ok(JoinOutcome::Active(existing));
                }
            }

            let (role, active) = if timeline.requires_approval {
                (Role::Pending, false)
            } else {
                (Role::Member, true)
            };

            conn.execute(
                "INSERT INTO memberships (timeline_id, user_id, role, is_active, is_blocked, joined_at)
                 VALUES (?1, ?2, ?3, ?4, 0, ?5)
                 ON CONFLICT (timeline_id, user_id) DO UPDATE SET
                     role = excluded.role,
                     is_active = excluded.is_active,
                     is_blocked = 0,
                     joined_at = excluded.joined_at",
                rusqlite::params![timeline.id, user_id, role.as_str(), active, now_text()],
            )?;

            let row = query_membership(conn, &timeline.id, user_id)?
                .ok_or_else(|| anyhow::anyhow!("membership vanished after upsert"))?;
            Ok(if active {
                JoinOutcome::Active(row)
            } else {
                JoinOutcome::Pending(row)
            })
        })
    }

    /// Promote a pending membership to an active member. Idempotent on an
    /// already-active member; returns false when no row exists. Blocked rows
    /// are not approvable; unblocking is its own rank-checked action.
    pub fn approve_member(&self, timeline_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let Some(existing) = query_membership(conn, timeline_id, user_id)? else {
                return Ok(false);
            };
            if existing.is_blocked {
                return Ok(false);
            }
            if existing.is_active {
                return Ok(true);
            }
            conn.execute(
                "UPDATE memberships SET role = ?1, is_active = 1
                 WHERE timeline_id = ?2 AND user_id = ?3",
                rusqlite::params![Role::Member.as_str(), timeline_id, user_id],
            )?;
            Ok(true)
        })
    }

    /// Assign a new role to an active member. Pending and blocked rows are
    /// not eligible; activation goes through approve/unblock first.
    pub fn set_member_role(&self, timeline_id: &str, user_id: &str, role: Role) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE memberships SET role = ?1
                 WHERE timeline_id = ?2 AND user_id = ?3 AND is_active = 1",
                rusqlite::params![role.as_str(), timeline_id, user_id],
            )?;
            Ok(changed > 0)
        })
    }

    /// Kick: inactive but not banned. Reversible only via rejoin.
    pub fn remove_member(&self, timeline_id: &str, user_id: &str) -> Result<bool> {
        self.set_member_flags(timeline_id, user_id, false, false)
    }

    /// Block: inactive and barred from rejoining.
    pub fn block_member(&self, timeline_id: &str, user_id: &str) -> Result<bool> {
        self.set_member_flags(timeline_id, user_id, false, true)
    }

    /// Unblock: restored to active membership.
    pub fn unblock_member(&self, timeline_id: &str, user_id: &str) -> Result<bool> {
        self.set_member_flags(timeline_id, user_id, true, false)
    }

    fn set_member_flags(
        &self,
        timeline_id: &str,
        user_id: &str,
        active: bool,
        blocked: bool,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE memberships SET is_active = ?1, is_blocked = ?2
                 WHERE timeline_id = ?3 AND user_id = ?4",
                rusqlite::params![active, blocked, timeline_id, user_id],
            )?;
            Ok(changed > 0)
        })
    }

    /// Every non-blocked member, plus synthesized entries for the creator
    /// and any site owner who has no stored row.
    pub fn list_members(&self, timeline: &TimelineRow) -> Result<Vec<MemberListRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.timeline_id, m.user_id, u.username, m.role, m.is_active, m.is_blocked, m.joined_at
                 FROM memberships m
                 JOIN users u ON u.id = m.user_id
                 WHERE m.timeline_id = ?1 AND m.is_blocked = 0
                 ORDER BY m.joined_at",
            )?;
            let mut rows = stmt
                .query_map([&timeline.id], map_member_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            if !rows.iter().any(|r| r.user_id == timeline.created_by) {
                let creator_name: Option<String> = conn
                    .query_row(
                        "SELECT username FROM users WHERE id = ?1",
                        [&timeline.created_by],
                        |row| row.get(0),
                    )
                    .optional()?;
                if let Some(username) = creator_name {
                    rows.push(MemberListRow {
                        timeline_id: timeline.id.clone(),
                        user_id: timeline.created_by.clone(),
                        username,
                        role: Role::Creator.as_str().to_string(),
                        is_active: true,
                        is_blocked: false,
                        joined_at: timeline.created_at.clone(),
                    });
                }
            }

            let mut owner_stmt = conn.prepare(
                "SELECT id, username FROM users
                 WHERE is_site_owner = 1
                   AND id NOT IN (SELECT user_id FROM memberships WHERE timeline_id = ?1)",
            )?;
            let owners = owner_stmt
                .query_map([&timeline.id], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            for (user_id, username) in owners {
                if rows.iter().any(|r| r.user_id == user_id) {
                    continue;
                }
                rows.push(MemberListRow {
                    timeline_id: timeline.id.clone(),
                    user_id,
                    username,
                    role: Role::SiteOwner.as_str().to_string(),
                    is_active: true,
                    is_blocked: false,
                    joined_at: timeline.created_at.clone(),
                });
            }

            Ok(rows)
        })
    }

    pub fn list_blocked_members(&self, timeline_id: &str) -> Result<Vec<MemberListRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.timeline_id, m.user_id, u.username, m.role, m.is_active, m.is_blocked, m.joined_at
                 FROM memberships m
                 JOIN users u ON u.id = m.user_id
                 WHERE m.timeline_id = ?1 AND m.is_blocked = 1
                 ORDER BY m.joined_at",
            )?;
            let rows = stmt
                .query_map([timeline_id], map_member_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn map_member_row(row: &rusqlite::Row<'_>) -> std::result::Result<MemberListRow, rusqlite::Error> {
    Ok(MemberListRow {
        timeline_id: row.get(0)?,
        user_id: row.get(1)?,
        username: row.get(2)?,
        role: row.get(3)?,
        is_active: row.get(4)?,
        is_blocked: row.get(5)?,
        joined_at: row.get(6)?,
    })
}

fn query_membership(
    conn: &Connection,
    timeline_id: &str,
    user_id: &str,
) -> Result<Option<MembershipRow>> {
    let mut stmt = conn.prepare(
        "SELECT timeline_id, user_id, role, is_active, is_blocked, joined_at
         FROM memberships WHERE timeline_id = ?1 AND user_id = ?2",
    )?;

    let row = stmt
        .query_row([timeline_id, user_id], |row| {
            Ok(MembershipRow {
                timeline_id: row.get(0)?,
                user_id: row.get(1)?,
                role: row.get(2)?,
                is_active: row.get(3)?,
                is_blocked: row.get(4)?,
                joined_at: row.get(5)?,
            })
        })
        .optional()?;

    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::JoinOutcome;
    use crate::Database;
    use chronik_types::models::Role;

    fn setup(requires_approval: bool) -> Database {
        let db = Database::open_in_memory().unwrap();
        db.create_user("creator", "alice", "hash").unwrap();
        db.create_user("u2", "bob", "hash").unwrap();
        db.create_user("u3", "carol", "hash").unwrap();
        db.create_timeline("t1", "history", "", "public", requires_approval, "creator")
            .unwrap();
        db
    }

    #[test]
    fn open_join_is_immediately_active() {
        let db = setup(false);
        let timeline = db.get_timeline("t1").unwrap().unwrap();
        match db.join_timeline(&timeline, "u2").unwrap() {
            JoinOutcome::Active(row) => {
                assert_eq!(row.role, "member");
                assert!(row.is_active);
            }
            _ => panic!("expected active membership"),
        }
    }

    #[test]
    fn approval_required_join_is_pending_until_approved() {
        let db = setup(true);
        let timeline = db.get_timeline("t1").unwrap().unwrap();
        match db.join_timeline(&timeline, "u2").unwrap() {
            JoinOutcome::Pending(row) => {
                assert_eq!(row.role, "pending");
                assert!(!row.is_active);
            }
            _ => panic!("expected pending membership"),
        }

        assert!(db.approve_member("t1", "u2").unwrap());
        let row = db.get_membership("t1", "u2").unwrap().unwrap();
        assert_eq!(row.role, "member");
        assert!(row.is_active);
    }

    #[test]
    fn approval_toggle_affects_later_joins_only() {
        // B joins while approval is off, C joins after it is turned on.
        let db = setup(false);
        let timeline = db.get_timeline("t1").unwrap().unwrap();
        assert!(matches!(
            db.join_timeline(&timeline, "u2").unwrap(),
            JoinOutcome::Active(_)
        ));

        db.update_timeline_settings("t1", None, Some(true)).unwrap();
        let timeline = db.get_timeline("t1").unwrap().unwrap();
        assert!(matches!(
            db.join_timeline(&timeline, "u3").unwrap(),
            JoinOutcome::Pending(_)
        ));

        // B stayed active.
        assert!(db.get_membership("t1", "u2").unwrap().unwrap().is_active);
    }

    #[test]
    fn blocked_member_cannot_rejoin_until_unblocked() {
        let db = setup(false);
        let timeline = db.get_timeline("t1").unwrap().unwrap();
        db.join_timeline(&timeline, "u2").unwrap();

        assert!(db.block_member("t1", "u2").unwrap());
        let row = db.get_membership("t1", "u2").unwrap().unwrap();
        assert!(row.is_blocked);
        assert!(!row.is_active);

        assert!(matches!(
            db.join_timeline(&timeline, "u2").unwrap(),
            JoinOutcome::Blocked
        ));

        assert!(db.unblock_member("t1", "u2").unwrap());
        let row = db.get_membership("t1", "u2").unwrap().unwrap();
        assert!(row.is_active);
        assert!(!row.is_blocked);
    }

    #[test]
    fn rejoin_after_kick_matches_fresh_join() {
        let db = setup(false);
        let timeline = db.get_timeline("t1").unwrap().unwrap();
        db.join_timeline(&timeline, "u2").unwrap();
        assert!(db.remove_member("t1", "u2").unwrap());

        let row = db.get_membership("t1", "u2").unwrap().unwrap();
        assert!(!row.is_active);
        assert!(!row.is_blocked);

        // Approval got switched on in the meantime: the rejoin respects the
        // timeline's current setting, exactly like a fresh join.
        db.update_timeline_settings("t1", None, Some(true)).unwrap();
        let timeline = db.get_timeline("t1").unwrap().unwrap();
        match db.join_timeline(&timeline, "u2").unwrap() {
            JoinOutcome::Pending(row) => assert_eq!(row.role, "pending"),
            _ => panic!("expected pending rejoin"),
        }
    }

    #[test]
    fn repeated_admin_actions_have_no_extra_effect() {
        let db = setup(false);
        let timeline = db.get_timeline("t1").unwrap().unwrap();
        db.join_timeline(&timeline, "u2").unwrap();

        assert!(db.block_member("t1", "u2").unwrap());
        assert!(db.block_member("t1", "u2").unwrap());
        let row = db.get_membership("t1", "u2").unwrap().unwrap();
        assert!(row.is_blocked && !row.is_active);

        assert!(db.remove_member("t1", "u2").unwrap());
        assert!(db.remove_member("t1", "u2").unwrap());
        let row = db.get_membership("t1", "u2").unwrap().unwrap();
        assert!(!row.is_blocked && !row.is_active);
    }

    #[test]
    fn role_assignment_applies_to_active_members_only() {
        let db = setup(true);
        let timeline = db.get_timeline("t1").unwrap().unwrap();
        db.join_timeline(&timeline, "u2").unwrap();

        // Still pending: not eligible for a role change.
        assert!(!db.set_member_role("t1", "u2", Role::Moderator).unwrap());

        db.approve_member("t1", "u2").unwrap();
        assert!(db.set_member_role("t1", "u2", Role::Moderator).unwrap());
        let row = db.get_membership("t1", "u2").unwrap().unwrap();
        assert_eq!(row.role, "moderator");

        db.block_member("t1", "u2").unwrap();
        assert!(!db.set_member_role("t1", "u2", Role::Admin).unwrap());
    }

    #[test]
    fn blocked_members_appear_only_in_the_blocked_list() {
        let db = setup(false);
        let timeline = db.get_timeline("t1").unwrap().unwrap();
        db.join_timeline(&timeline, "u2").unwrap();
        db.block_member("t1", "u2").unwrap();

        let members = db.list_members(&timeline).unwrap();
        assert!(!members.iter().any(|m| m.user_id == "u2"));

        let blocked = db.list_blocked_members("t1").unwrap();
        assert_eq!(blocked.len(), 1);
        assert_eq!(blocked[0].user_id, "u2");
    }

    #[test]
    fn site_owner_is_synthesized_into_member_listing() {
        let db = setup(false);
        db.create_user("owner", "root", "hash").unwrap();
        db.set_site_owner("owner", true).unwrap();

        let timeline = db.get_timeline("t1").unwrap().unwrap();
        let members = db.list_members(&timeline).unwrap();
        let owner = members.iter().find(|m| m.user_id == "owner").unwrap();
        assert_eq!(owner.role, "site_owner");
        assert!(owner.is_active);
    }
}
