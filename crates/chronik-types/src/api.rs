use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{PassportEntry, ReportStatus, ResolutionAction, Role, Visibility};

// -- JWT Claims --

/// JWT claims shared between the REST middleware and the auth handlers.
/// Canonical definition lives here in chronik-types to eliminate duplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub token: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub username: String,
    pub token: String,
}

// -- Timelines --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateTimelineRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_visibility")]
    pub visibility: Visibility,
    #[serde(default)]
    pub requires_approval: bool,
}

fn default_visibility() -> Visibility {
    Visibility::Public
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateTimelineRequest {
    pub visibility: Option<Visibility>,
    pub requires_approval: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct TimelineResponse {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub visibility: Visibility,
    pub requires_approval: bool,
    pub created_by: Uuid,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

// -- Members --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateMemberRoleRequest {
    pub role: Role,
}

#[derive(Debug, Serialize)]
pub struct MemberResponse {
    pub timeline_id: Uuid,
    pub user_id: Uuid,
    pub username: String,
    pub role: Role,
    pub is_active_member: bool,
    pub is_blocked: bool,
    pub joined_at: chrono::DateTime<chrono::Utc>,
}

// -- Passport --

#[derive(Debug, Serialize)]
pub struct PassportResponse {
    pub memberships: Vec<PassportEntry>,
    pub last_updated: chrono::DateTime<chrono::Utc>,
}

// -- Events --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateEventRequest {
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct EventResponse {
    pub id: Uuid,
    pub timeline_id: Uuid,
    pub created_by: Uuid,
    pub title: String,
    pub body: String,
    pub tags: Vec<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

// -- Reports --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubmitReportRequest {
    pub event_id: Uuid,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct ReportResponse {
    pub id: Uuid,
    pub timeline_id: Uuid,
    pub event_id: Uuid,
    pub reporter_id: Option<Uuid>,
    pub reason: String,
    pub status: ReportStatus,
    pub resolution: Option<ResolutionAction>,
    pub verdict: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub resolved_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Serialize)]
pub struct ReportListResponse {
    pub items: Vec<ReportResponse>,
    pub counts: ReportCounts,
}

#[derive(Debug, Default, Serialize)]
pub struct ReportCounts {
    pub all: u64,
    pub pending: u64,
    pub reviewing: u64,
    pub resolved: u64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResolveReportRequest {
    pub action: ResolutionAction,
    pub verdict: String,
}

/// Per-category affected-row counts. There is no separate audit-log entity;
/// these counts plus the verdict text on the report are the audit trail.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionCounts {
    pub links_removed: u64,
    pub tags_removed: u64,
    pub exclusions_removed: u64,
    pub exclusions_added: u64,
    pub events_removed: u64,
}

#[derive(Debug, Serialize)]
pub struct ResolveReportResponse {
    pub report_id: Uuid,
    pub action: ResolutionAction,
    pub status: ReportStatus,
    pub affected: ResolutionCounts,
}
