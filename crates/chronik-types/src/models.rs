use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

/// Membership role within one timeline. Stored as lowercase text in the
/// database and always parsed back through this enum; role checks never
/// compare raw strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Pending,
    Member,
    Moderator,
    Admin,
    Creator,
    SiteOwner,
}

impl Role {
    /// Total order used by every permission comparison:
    /// SiteOwner > Creator = Admin > Moderator > Member > Pending.
    pub fn rank(self) -> u8 {
        match self {
            Role::Pending => 0,
            Role::Member => 1,
            Role::Moderator => 2,
            Role::Admin | Role::Creator => 3,
            Role::SiteOwner => 4,
        }
    }

    pub fn outranks(self, other: Role) -> bool {
        self.rank() > other.rank()
    }

    pub fn at_least_moderator(self) -> bool {
        self.rank() >= Role::Moderator.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Pending => "pending",
            Role::Member => "member",
            Role::Moderator => "moderator",
            Role::Admin => "admin",
            Role::Creator => "creator",
            Role::SiteOwner => "site_owner",
        }
    }

    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "pending" => Some(Role::Pending),
            "member" => Some(Role::Member),
            "moderator" => Some(Role::Moderator),
            "admin" => Some(Role::Admin),
            "creator" => Some(Role::Creator),
            "site_owner" => Some(Role::SiteOwner),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
}

impl Visibility {
    pub fn as_str(self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
        }
    }

    pub fn parse(s: &str) -> Option<Visibility> {
        match s {
            "public" => Some(Visibility::Public),
            "private" => Some(Visibility::Private),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Pending,
    Reviewing,
    Resolved,
}

impl ReportStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::Reviewing => "reviewing",
            ReportStatus::Resolved => "resolved",
        }
    }

    pub fn parse(s: &str) -> Option<ReportStatus> {
        match s {
            "pending" => Some(ReportStatus::Pending),
            "reviewing" => Some(ReportStatus::Reviewing),
            "resolved" => Some(ReportStatus::Resolved),
            _ => None,
        }
    }
}

/// The three mutually exclusive report resolutions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionAction {
    /// Unshare the event from the report's timeline only.
    Remove,
    /// Permanently delete the event and every association, everywhere.
    Delete,
    /// Resolve the report without touching the event.
    Safeguard,
}

impl ResolutionAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ResolutionAction::Remove => "remove",
            ResolutionAction::Delete => "delete",
            ResolutionAction::Safeguard => "safeguard",
        }
    }
}

/// One entry in a user's passport: their standing on a single timeline plus
/// enough timeline metadata for a client to render it without extra fetches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassportEntry {
    pub timeline_id: Uuid,
    pub timeline_name: String,
    pub visibility: Visibility,
    pub role: Role,
    pub is_active_member: bool,
    pub joined_at: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_creator: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_site_owner: bool,
}

/// Parse a stored timestamp. We write RFC 3339, but SQLite column defaults
/// produce "YYYY-MM-DD HH:MM:SS" without a timezone, so accept both.
pub fn parse_utc(raw: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}': {}", raw, e);
            DateTime::default()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rank_order_is_total_and_matches_policy() {
        assert!(Role::SiteOwner.outranks(Role::Creator));
        assert!(Role::SiteOwner.outranks(Role::Admin));
        assert!(Role::Admin.outranks(Role::Moderator));
        assert!(Role::Creator.outranks(Role::Moderator));
        assert!(Role::Moderator.outranks(Role::Member));
        assert!(Role::Member.outranks(Role::Pending));

        // Creator and Admin are peers: neither dominates the other.
        assert!(!Role::Admin.outranks(Role::Creator));
        assert!(!Role::Creator.outranks(Role::Admin));
    }

    #[test]
    fn equal_rank_never_outranks() {
        for role in [
            Role::Pending,
            Role::Member,
            Role::Moderator,
            Role::Admin,
            Role::Creator,
            Role::SiteOwner,
        ] {
            assert!(!role.outranks(role));
        }
    }

    #[test]
    fn role_text_round_trips() {
        for role in [
            Role::Pending,
            Role::Member,
            Role::Moderator,
            Role::Admin,
            Role::Creator,
            Role::SiteOwner,
        ] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("SiteOwner"), None);
        assert_eq!(Role::parse(""), None);
    }

    #[test]
    fn parse_utc_accepts_sqlite_default_format() {
        let ts = parse_utc("2025-06-01 12:30:00");
        assert_eq!(ts.to_rfc3339(), "2025-06-01T12:30:00+00:00");
    }
}
