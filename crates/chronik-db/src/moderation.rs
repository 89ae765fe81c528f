use crate::models::ReportRow;
use crate::{Database, OptionalExt, now_text};
use anyhow::Result;
use chronik_types::api::{ReportCounts, ResolutionCounts};
use chronik_types::models::{ReportStatus, ResolutionAction};
use rusqlite::Connection;

pub enum AcceptOutcome {
    Accepted(ReportRow),
    AlreadyReviewing(ReportRow),
    AlreadyResolved,
    NotFound,
}

pub enum ResolveOutcome {
    Resolved {
        report: ReportRow,
        counts: ResolutionCounts,
    },
    /// The event exists nowhere else and has at most one tag: removing it
    /// from this timeline would orphan it, so the caller must use delete.
    FullDeleteRequired,
    AlreadyResolved,
    NotFound,
}

impl Database {
    pub fn submit_report(
        &self,
        id: &str,
        timeline_id: &str,
        event_id: &str,
        reporter_id: Option<&str>,
        reason: &str,
    ) -> Result<ReportRow> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO reports (id, timeline_id, event_id, reporter_id, reason, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    id,
                    timeline_id,
                    event_id,
                    reporter_id,
                    reason,
                    ReportStatus::Pending.as_str(),
                    now_text()
                ],
            )?;
            query_report(conn, id)?.ok_or_else(|| anyhow::anyhow!("report vanished after insert"))
        })
    }

    pub fn get_report(&self, id: &str) -> Result<Option<ReportRow>> {
        self.with_conn(|conn| query_report(conn, id))
    }

    pub fn list_reports(
        &self,
        timeline_id: &str,
        status: Option<ReportStatus>,
    ) -> Result<(Vec<ReportRow>, ReportCounts)> {
        self.with_conn(|conn| {
            let mut items = Vec::new();
            let mut stmt = conn.prepare(
                "SELECT id, timeline_id, event_id, reporter_id, reason, status, resolution, verdict, created_at, resolved_at
                 FROM reports
                 WHERE timeline_id = ?1 AND (?2 IS NULL OR status = ?2)
                 ORDER BY created_at DESC",
            )?;
            let rows = stmt.query_map(
                rusqlite::params![timeline_id, status.map(|s| s.as_str())],
                map_report_row,
            )?;
            for row in rows {
                items.push(row?);
            }

            let mut counts = ReportCounts::default();
            let mut stmt = conn.prepare(
                "SELECT status, COUNT(*) FROM reports WHERE timeline_id = ?1 GROUP BY status",
            )?;
            let rows = stmt
                .query_map([timeline_id], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            for (status, n) in rows {
                counts.all += n;
                match ReportStatus::parse(&status) {
                    Some(ReportStatus::Pending) => counts.pending = n,
                    Some(ReportStatus::Reviewing) => counts.reviewing = n,
                    Some(ReportStatus::Resolved) => counts.resolved = n,
                    None => {}
                }
            }

            Ok((items, counts))
        })
    }

    /// pending -> reviewing. Idempotent on a report already under review;
    /// resolved reports are terminal.
    pub fn accept_report(&self, id: &str) -> Result<AcceptOutcome> {
        self.with_conn(|conn| {
            let Some(report) = query_report(conn, id)? else {
                return Ok(AcceptOutcome::NotFound);
            };
            match ReportStatus::parse(&report.status) {
                Some(ReportStatus::Resolved) => Ok(AcceptOutcome::AlreadyResolved),
                Some(ReportStatus::Reviewing) => Ok(AcceptOutcome::AlreadyReviewing(report)),
                _ => {
                    conn.execute(
                        "UPDATE reports SET status = ?1 WHERE id = ?2",
                        rusqlite::params![ReportStatus::Reviewing.as_str(), id],
                    )?;
                    let report = query_report(conn, id)?
                        .ok_or_else(|| anyhow::anyhow!("report vanished during accept"))?;
                    Ok(AcceptOutcome::Accepted(report))
                }
            }
        })
    }

    /// Apply one of the three mutually exclusive resolutions inside a single
    /// transaction. A partial cascade is never observable: either every
    /// affected row is gone and the report is resolved, or nothing changed.
    pub fn resolve_report(
        &self,
        id: &str,
        action: ResolutionAction,
        verdict: &str,
    ) -> Result<ResolveOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let Some(report) = query_report(&tx, id)? else {
                return Ok(ResolveOutcome::NotFound);
            };
            if ReportStatus::parse(&report.status) == Some(ReportStatus::Resolved) {
                return Ok(ResolveOutcome::AlreadyResolved);
            }

            let mut counts = ResolutionCounts::default();
            match action {
                ResolutionAction::Remove => {
                    let other_links: u64 = tx.query_row(
                        "SELECT COUNT(*) FROM event_timeline_links
                         WHERE event_id = ?1 AND timeline_id <> ?2",
                        rusqlite::params![report.event_id, report.timeline_id],
                        |row| row.get(0),
                    )?;
                    let tags: u64 = tx.query_row(
                        "SELECT COUNT(*) FROM event_tags WHERE event_id = ?1",
                        [&report.event_id],
                        |row| row.get(0),
                    )?;
                    // Either condition keeps the event meaningful elsewhere;
                    // both are independently sufficient.
                    if other_links == 0 && tags <= 1 {
                        return Ok(ResolveOutcome::FullDeleteRequired);
                    }

                    counts.links_removed = tx.execute(
                        "DELETE FROM event_timeline_links WHERE event_id = ?1 AND timeline_id = ?2",
                        rusqlite::params![report.event_id, report.timeline_id],
                    )? as u64;
                    counts.exclusions_added = tx.execute(
                        "INSERT OR IGNORE INTO timeline_exclusions (timeline_id, event_id) VALUES (?1, ?2)",
                        rusqlite::params![report.timeline_id, report.event_id],
                    )? as u64;
                }
                ResolutionAction::Delete => {
                    counts.links_removed = execute_or_zero(
                        &tx,
                        "DELETE FROM event_timeline_links WHERE event_id = ?1",
                        &report.event_id,
                    )?;
                    counts.tags_removed = execute_or_zero(
                        &tx,
                        "DELETE FROM event_tags WHERE event_id = ?1",
                        &report.event_id,
                    )?;
                    counts.exclusions_removed = execute_or_zero(
                        &tx,
                        "DELETE FROM timeline_exclusions WHERE event_id = ?1",
                        &report.event_id,
                    )?;
                    counts.events_removed = execute_or_zero(
                        &tx,
                        "DELETE FROM events WHERE id = ?1",
                        &report.event_id,
                    )?;
                }
                ResolutionAction::Safeguard => {}
            }

            tx.execute(
                "UPDATE reports SET status = ?1, resolution = ?2, verdict = ?3, resolved_at = ?4
                 WHERE id = ?5",
                rusqlite::params![
                    ReportStatus::Resolved.as_str(),
                    action.as_str(),
                    verdict,
                    now_text(),
                    id
                ],
            )?;

            let report = query_report(&tx, id)?
                .ok_or_else(|| anyhow::anyhow!("report vanished during resolve"))?;
            tx.commit()?;
            Ok(ResolveOutcome::Resolved { report, counts })
        })
    }
}

/// A DELETE against a cleanup table that may not be provisioned yet.
/// Absence means nothing to clean up, not a failure.
fn execute_or_zero(conn: &Connection, sql: &str, event_id: &str) -> Result<u64> {
    match conn.execute(sql, [event_id]) {
        Ok(n) => Ok(n as u64),
        Err(rusqlite::Error::SqliteFailure(_, Some(ref msg))) if msg.contains("no such table") => {
            Ok(0)
        }
        Err(e) => Err(e.into()),
    }
}

fn map_report_row(row: &rusqlite::Row<'_>) -> std::result::Result<ReportRow, rusqlite::Error> {
    Ok(ReportRow {
        id: row.get(0)?,
        timeline_id: row.get(1)?,
        event_id: row.get(2)?,
        reporter_id: row.get(3)?,
        reason: row.get(4)?,
        status: row.get(5)?,
        resolution: row.get(6)?,
        verdict: row.get(7)?,
        created_at: row.get(8)?,
        resolved_at: row.get(9)?,
    })
}

fn query_report(conn: &Connection, id: &str) -> Result<Option<ReportRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, timeline_id, event_id, reporter_id, reason, status, resolution, verdict, created_at, resolved_at
         FROM reports WHERE id = ?1",
    )?;
    let row = stmt.query_row([id], map_report_row).optional()?;
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::{AcceptOutcome, ResolveOutcome};
    use crate::Database;
    use chronik_types::models::{ReportStatus, ResolutionAction};

    fn setup() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.create_user("u1", "alice", "hash").unwrap();
        db.create_timeline("t1", "history", "", "public", false, "u1")
            .unwrap();
        db.create_timeline("t2", "art", "", "public", false, "u1")
            .unwrap();
        db
    }

    fn report_for(db: &Database, event_id: &str) -> String {
        let id = format!("r-{}", event_id);
        db.submit_report(&id, "t1", event_id, Some("u1"), "spam")
            .unwrap();
        id
    }

    #[test]
    fn accept_moves_pending_to_reviewing_once() {
        let db = setup();
        db.create_event("e1", "t1", "u1", "event", "", &[]).unwrap();
        let rid = report_for(&db, "e1");

        match db.accept_report(&rid).unwrap() {
            AcceptOutcome::Accepted(r) => assert_eq!(r.status, "reviewing"),
            _ => panic!("expected accept"),
        }
        assert!(matches!(
            db.accept_report(&rid).unwrap(),
            AcceptOutcome::AlreadyReviewing(_)
        ));
    }

    #[test]
    fn remove_escalates_when_event_exists_nowhere_else() {
        let db = setup();
        db.create_event("e1", "t1", "u1", "event", "", &["war".into()])
            .unwrap();
        let rid = report_for(&db, "e1");

        assert!(matches!(
            db.resolve_report(&rid, ResolutionAction::Remove, "offensive")
                .unwrap(),
            ResolveOutcome::FullDeleteRequired
        ));
        // The report is untouched and still resolvable.
        let report = db.get_report(&rid).unwrap().unwrap();
        assert_eq!(report.status, "pending");
        assert!(report.resolution.is_none());
    }

    #[test]
    fn remove_succeeds_when_shared_to_another_timeline() {
        let db = setup();
        db.create_event("e1", "t1", "u1", "event", "", &[]).unwrap();
        db.share_event("e1", "t2", "u1").unwrap();
        let rid = report_for(&db, "e1");

        match db
            .resolve_report(&rid, ResolutionAction::Remove, "off-topic here")
            .unwrap()
        {
            ResolveOutcome::Resolved { report, counts } => {
                assert_eq!(report.status, "resolved");
                assert_eq!(report.resolution.as_deref(), Some("remove"));
                assert_eq!(counts.links_removed, 1);
                assert_eq!(counts.exclusions_added, 1);
            }
            _ => panic!("expected resolution"),
        }

        // Gone from the reported timeline, still visible on the other.
        assert!(db.list_timeline_events("t1", 50).unwrap().is_empty());
        assert_eq!(db.list_timeline_events("t2", 50).unwrap().len(), 1);
    }

    #[test]
    fn multiple_tags_alone_permit_remove() {
        let db = setup();
        db.create_event("e1", "t1", "u1", "event", "", &["a".into(), "b".into()])
            .unwrap();
        let rid = report_for(&db, "e1");

        assert!(matches!(
            db.resolve_report(&rid, ResolutionAction::Remove, "verdict")
                .unwrap(),
            ResolveOutcome::Resolved { .. }
        ));
    }

    #[test]
    fn delete_cascades_everywhere() {
        let db = setup();
        db.create_event("e1", "t1", "u1", "event", "", &["a".into(), "b".into()])
            .unwrap();
        db.share_event("e1", "t2", "u1").unwrap();
        let rid = report_for(&db, "e1");

        match db
            .resolve_report(&rid, ResolutionAction::Delete, "beyond saving")
            .unwrap()
        {
            ResolveOutcome::Resolved { counts, .. } => {
                assert_eq!(counts.links_removed, 2);
                assert_eq!(counts.tags_removed, 2);
                assert_eq!(counts.events_removed, 1);
            }
            _ => panic!("expected resolution"),
        }

        assert!(db.get_event("e1").unwrap().is_none());
        assert!(db.list_timeline_events("t1", 50).unwrap().is_empty());
        assert!(db.list_timeline_events("t2", 50).unwrap().is_empty());
    }

    #[test]
    fn safeguard_touches_nothing_but_the_report() {
        let db = setup();
        db.create_event("e1", "t1", "u1", "event", "", &["a".into()])
            .unwrap();
        let rid = report_for(&db, "e1");

        match db
            .resolve_report(&rid, ResolutionAction::Safeguard, "content is fine")
            .unwrap()
        {
            ResolveOutcome::Resolved { report, counts } => {
                assert_eq!(report.status, "resolved");
                assert_eq!(report.verdict.as_deref(), Some("content is fine"));
                assert_eq!(counts, Default::default());
            }
            _ => panic!("expected resolution"),
        }

        assert!(db.get_event("e1").unwrap().is_some());
        assert_eq!(db.list_timeline_events("t1", 50).unwrap().len(), 1);
    }

    #[test]
    fn second_resolution_sees_a_stale_state_conflict() {
        let db = setup();
        db.create_event("e1", "t1", "u1", "event", "", &[]).unwrap();
        let rid = report_for(&db, "e1");

        assert!(matches!(
            db.resolve_report(&rid, ResolutionAction::Safeguard, "ok")
                .unwrap(),
            ResolveOutcome::Resolved { .. }
        ));
        assert!(matches!(
            db.resolve_report(&rid, ResolutionAction::Delete, "changed my mind")
                .unwrap(),
            ResolveOutcome::AlreadyResolved
        ));
        assert!(matches!(
            db.accept_report(&rid).unwrap(),
            AcceptOutcome::AlreadyResolved
        ));
    }

    #[test]
    fn delete_tolerates_unprovisioned_cleanup_tables() {
        let db = setup();
        db.create_event("e1", "t1", "u1", "event", "", &[]).unwrap();
        let rid = report_for(&db, "e1");

        db.with_conn(|conn| {
            conn.execute_batch("DROP TABLE timeline_exclusions; DROP TABLE event_tags;")?;
            Ok(())
        })
        .unwrap();

        match db
            .resolve_report(&rid, ResolutionAction::Delete, "verdict")
            .unwrap()
        {
            ResolveOutcome::Resolved { counts, .. } => {
                assert_eq!(counts.exclusions_removed, 0);
                assert_eq!(counts.tags_removed, 0);
                assert_eq!(counts.events_removed, 1);
            }
            _ => panic!("expected resolution"),
        }
    }

    #[test]
    fn list_reports_filters_and_counts_by_status() {
        let db = setup();
        db.create_event("e1", "t1", "u1", "event", "", &[]).unwrap();
        db.create_event("e2", "t1", "u1", "event two", "", &[])
            .unwrap();
        let r1 = report_for(&db, "e1");
        let _r2 = report_for(&db, "e2");

        db.resolve_report(&r1, ResolutionAction::Safeguard, "fine")
            .unwrap();

        let (all, counts) = db.list_reports("t1", None).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(counts.all, 2);
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.resolved, 1);

        let (pending, _) = db.list_reports("t1", Some(ReportStatus::Pending)).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].event_id, "e2");
    }
}
