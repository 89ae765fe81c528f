use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

use chronik_db::models::ReportRow;
use chronik_db::moderation::{AcceptOutcome, ResolveOutcome};
use chronik_types::api::{
    Claims, ReportListResponse, ReportResponse, ResolveReportRequest, ResolveReportResponse,
    SubmitReportRequest,
};
use chronik_types::models::{ReportStatus, parse_utc};

use crate::access;
use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiError;
use crate::timelines::parse_id;

/// Flag an event on a timeline for moderator review.
pub async fn submit_report(
    State(state): State<AppState>,
    Path(timeline_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SubmitReportRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let report_id = Uuid::new_v4();
    let report = blocking(move || {
        let tid = timeline_id.to_string();
        state.db.get_timeline(&tid)?.ok_or(ApiError::NotFound("timeline"))?;
        state
            .db
            .get_event(&req.event_id.to_string())?
            .ok_or(ApiError::NotFound("event"))?;

        Ok(state.db.submit_report(
            &report_id.to_string(),
            &tid,
            &req.event_id.to_string(),
            Some(&claims.sub.to_string()),
            req.reason.trim(),
        )?)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(report_response(report))))
}

#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    pub status: Option<String>,
}

/// Moderator view of a timeline's reports, with per-status tab counts.
pub async fn list_reports(
    State(state): State<AppState>,
    Path(timeline_id): Path<Uuid>,
    Query(query): Query<ReportQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let status = match query.status.as_deref() {
        None | Some("all") => None,
        Some(raw) => Some(
            ReportStatus::parse(raw)
                .ok_or_else(|| ApiError::BadRequest(format!("unknown status '{}'", raw)))?,
        ),
    };

    let (items, counts) = blocking(move || {
        let tid = timeline_id.to_string();
        let timeline = state.db.get_timeline(&tid)?.ok_or(ApiError::NotFound("timeline"))?;

        let actor = access::resolve_actor(&state.db, &timeline, claims.sub)?;
        access::require_moderator(&actor)?;

        Ok(state.db.list_reports(&tid, status)?)
    })
    .await?;

    Ok(Json(ReportListResponse {
        items: items.into_iter().map(report_response).collect(),
        counts,
    }))
}

/// Take a pending report into review.
pub async fn accept_report(
    State(state): State<AppState>,
    Path((timeline_id, report_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let report = blocking(move || {
        let timeline = state
            .db
            .get_timeline(&timeline_id.to_string())?
            .ok_or(ApiError::NotFound("timeline"))?;

        let actor = access::resolve_actor(&state.db, &timeline, claims.sub)?;
        access::require_moderator(&actor)?;

        let report = load_report_for(&state.db, &report_id.to_string(), &timeline.id)?;
        match state.db.accept_report(&report.id)? {
            AcceptOutcome::Accepted(r) | AcceptOutcome::AlreadyReviewing(r) => Ok(r),
            AcceptOutcome::AlreadyResolved => Err(ApiError::AlreadyResolved),
            AcceptOutcome::NotFound => Err(ApiError::NotFound("report")),
        }
    })
    .await?;

    Ok(Json(report_response(report)))
}

/// Apply one of the three mutually exclusive resolutions.
pub async fn resolve_report(
    State(state): State<AppState>,
    Path((timeline_id, report_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ResolveReportRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let verdict = req.verdict.trim().to_string();
    if verdict.is_empty() {
        return Err(ApiError::VerdictRequired);
    }
    let action = req.action;

    let (_report, counts) = blocking(move || {
        let timeline = state
            .db
            .get_timeline(&timeline_id.to_string())?
            .ok_or(ApiError::NotFound("timeline"))?;

        let actor = access::resolve_actor(&state.db, &timeline, claims.sub)?;
        access::require_moderator(&actor)?;

        let report = load_report_for(&state.db, &report_id.to_string(), &timeline.id)?;
        match state.db.resolve_report(&report.id, action, &verdict)? {
            ResolveOutcome::Resolved { report, counts } => Ok((report, counts)),
            ResolveOutcome::FullDeleteRequired => Err(ApiError::FullDeleteRequired),
            ResolveOutcome::AlreadyResolved => Err(ApiError::AlreadyResolved),
            ResolveOutcome::NotFound => Err(ApiError::NotFound("report")),
        }
    })
    .await?;

    Ok(Json(ResolveReportResponse {
        report_id,
        action,
        status: ReportStatus::Resolved,
        affected: counts,
    }))
}

/// A report belongs to one timeline; acting on it through another
/// timeline's URL is a 404, not a permission question.
fn load_report_for(
    db: &chronik_db::Database,
    report_id: &str,
    timeline_id: &str,
) -> Result<ReportRow, ApiError> {
    let report = db.get_report(report_id)?.ok_or(ApiError::NotFound("report"))?;
    if report.timeline_id != timeline_id {
        return Err(ApiError::NotFound("report"));
    }
    Ok(report)
}

fn report_response(row: ReportRow) -> ReportResponse {
    ReportResponse {
        id: parse_id(&row.id),
        timeline_id: parse_id(&row.timeline_id),
        event_id: parse_id(&row.event_id),
        reporter_id: row.reporter_id.as_deref().map(parse_id),
        reason: row.reason,
        status: ReportStatus::parse(&row.status).unwrap_or(ReportStatus::Pending),
        resolution: row.resolution.as_deref().and_then(parse_resolution),
        verdict: row.verdict,
        created_at: parse_utc(&row.created_at),
        resolved_at: row.resolved_at.as_deref().map(parse_utc),
    }
}

fn parse_resolution(raw: &str) -> Option<chronik_types::models::ResolutionAction> {
    use chronik_types::models::ResolutionAction;
    match raw {
        "remove" => Some(ResolutionAction::Remove),
        "delete" => Some(ResolutionAction::Delete),
        "safeguard" => Some(ResolutionAction::Safeguard),
        _ => None,
    }
}
