/// Database row types mapping directly to SQLite rows.
/// Distinct from chronik-types API models to keep the DB layer independent.

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub is_site_owner: bool,
    pub created_at: String,
}

pub struct TimelineRow {
    pub id: String,
    pub name: String,
    pub description: String,
    pub visibility: String,
    pub requires_approval: bool,
    pub created_by: String,
    pub created_at: String,
}

pub struct MembershipRow {
    pub timeline_id: String,
    pub user_id: String,
    pub role: String,
    pub is_active: bool,
    pub is_blocked: bool,
    pub joined_at: String,
}

/// Membership joined with the user's name for listings. Rows synthesized for
/// implicit members (creator, site owner) carry no stored membership.
pub struct MemberListRow {
    pub timeline_id: String,
    pub user_id: String,
    pub username: String,
    pub role: String,
    pub is_active: bool,
    pub is_blocked: bool,
    pub joined_at: String,
}

pub struct EventRow {
    pub id: String,
    pub timeline_id: String,
    pub created_by: String,
    pub title: String,
    pub body: String,
    pub created_at: String,
}

pub struct ReportRow {
    pub id: String,
    pub timeline_id: String,
    pub event_id: String,
    pub reporter_id: Option<String>,
    pub reason: String,
    pub status: String,
    pub resolution: Option<String>,
    pub verdict: Option<String>,
    pub created_at: String,
    pub resolved_at: Option<String>,
}
