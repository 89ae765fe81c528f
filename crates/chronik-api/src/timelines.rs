use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use chronik_db::models::{EventRow, TimelineRow};
use chronik_types::api::{
    Claims, CreateEventRequest, CreateTimelineRequest, EventResponse, TimelineResponse,
    UpdateTimelineRequest,
};
use chronik_types::models::{Visibility, parse_utc};

use crate::access;
use crate::auth::AppState;
use crate::blocking;
use crate::error::{ApiError, conflict_on_unique};

pub async fn create_timeline(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateTimelineRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = req.name.trim().to_string();
    if name.is_empty() || name.len() > 100 {
        return Err(ApiError::BadRequest(
            "timeline name must be 1-100 characters".into(),
        ));
    }

    let timeline_id = Uuid::new_v4();
    let timeline = blocking(move || {
        state
            .db
            .create_timeline(
                &timeline_id.to_string(),
                &name,
                &req.description,
                req.visibility.as_str(),
                req.requires_approval,
                &claims.sub.to_string(),
            )
            .map_err(|e| conflict_on_unique(e, "timeline name already exists"))?;
        let row = state
            .db
            .get_timeline(&timeline_id.to_string())?
            .ok_or(ApiError::NotFound("timeline"))?;
        Ok(row)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(timeline_response(timeline))))
}

pub async fn get_timeline(
    State(state): State<AppState>,
    Path(timeline_id): Path<Uuid>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let timeline = blocking(move || {
        state
            .db
            .get_timeline(&timeline_id.to_string())?
            .ok_or(ApiError::NotFound("timeline"))
    })
    .await?;

    Ok(Json(timeline_response(timeline)))
}

pub async fn update_timeline(
    State(state): State<AppState>,
    Path(timeline_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateTimelineRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let timeline = blocking(move || {
        let tid = timeline_id.to_string();
        let timeline = state.db.get_timeline(&tid)?.ok_or(ApiError::NotFound("timeline"))?;

        let actor = access::resolve_actor(&state.db, &timeline, claims.sub)?;
        access::require_admin(&actor)?;

        state.db.update_timeline_settings(
            &tid,
            req.visibility.map(Visibility::as_str),
            req.requires_approval,
        )?;
        state.db.get_timeline(&tid)?.ok_or(ApiError::NotFound("timeline"))
    })
    .await?;

    Ok(Json(timeline_response(timeline)))
}

pub async fn create_event(
    State(state): State<AppState>,
    Path(timeline_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateEventRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let title = req.title.trim().to_string();
    if title.is_empty() {
        return Err(ApiError::BadRequest("event title is required".into()));
    }

    let event_id = Uuid::new_v4();
    let (event, tags) = blocking(move || {
        let tid = timeline_id.to_string();
        let timeline = state.db.get_timeline(&tid)?.ok_or(ApiError::NotFound("timeline"))?;

        // Pending members resolve with no role, so this also keeps them out.
        let actor = access::resolve_actor(&state.db, &timeline, claims.sub)?;
        if actor.role.is_none() && !actor.site_owner {
            return Err(ApiError::NotAMember);
        }

        state.db.create_event(
            &event_id.to_string(),
            &tid,
            &claims.sub.to_string(),
            &title,
            &req.body,
            &req.tags,
        )?;
        let event = state
            .db
            .get_event(&event_id.to_string())?
            .ok_or(ApiError::NotFound("event"))?;
        let tags = state.db.get_event_tags(&event_id.to_string())?;
        Ok((event, tags))
    })
    .await?;

    Ok((StatusCode::CREATED, Json(event_response(event, tags))))
}

pub async fn share_event(
    State(state): State<AppState>,
    Path((timeline_id, event_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let (event, tags) = blocking(move || {
        let tid = timeline_id.to_string();
        let eid = event_id.to_string();
        let timeline = state.db.get_timeline(&tid)?.ok_or(ApiError::NotFound("timeline"))?;
        let event = state.db.get_event(&eid)?.ok_or(ApiError::NotFound("event"))?;

        let actor = access::resolve_actor(&state.db, &timeline, claims.sub)?;
        if actor.role.is_none() && !actor.site_owner {
            return Err(ApiError::NotAMember);
        }

        if !state.db.share_event(&eid, &tid, &claims.sub.to_string())? {
            return Err(ApiError::Conflict(
                "event is already shared to this timeline".into(),
            ));
        }
        let tags = state.db.get_event_tags(&eid)?;
        Ok((event, tags))
    })
    .await?;

    Ok((StatusCode::CREATED, Json(event_response(event, tags))))
}

/// Pull an event off a timeline. Moderators and the event's author may
/// unshare; anyone else is denied.
pub async fn unshare_event(
    State(state): State<AppState>,
    Path((timeline_id, event_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    blocking(move || {
        let tid = timeline_id.to_string();
        let eid = event_id.to_string();
        let timeline = state.db.get_timeline(&tid)?.ok_or(ApiError::NotFound("timeline"))?;
        let event = state.db.get_event(&eid)?.ok_or(ApiError::NotFound("event"))?;

        let actor = access::resolve_actor(&state.db, &timeline, claims.sub)?;
        if let Err(deny) = access::require_moderator(&actor) {
            if event.created_by != claims.sub.to_string() {
                return Err(deny.into());
            }
        }

        if !state.db.unshare_event(&eid, &tid)? {
            return Err(ApiError::NotFound("share"));
        }
        Ok(())
    })
    .await?;

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct EventQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    50
}

pub async fn list_events(
    State(state): State<AppState>,
    Path(timeline_id): Path<Uuid>,
    Query(query): Query<EventQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = query.limit.min(200);

    let events = blocking(move || {
        let tid = timeline_id.to_string();
        let timeline = state.db.get_timeline(&tid)?.ok_or(ApiError::NotFound("timeline"))?;

        let actor = access::resolve_actor(&state.db, &timeline, claims.sub)?;
        if !access::can_view(&actor, &timeline) {
            return Err(ApiError::NotAMember);
        }

        let rows = state.db.list_timeline_events(&tid, limit)?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let tags = state.db.get_event_tags(&row.id)?;
            out.push(event_response(row, tags));
        }
        Ok(out)
    })
    .await?;

    Ok(Json(events))
}

pub(crate) fn timeline_response(row: TimelineRow) -> TimelineResponse {
    TimelineResponse {
        id: parse_id(&row.id),
        name: row.name,
        description: row.description,
        visibility: Visibility::parse(&row.visibility).unwrap_or(Visibility::Public),
        requires_approval: row.requires_approval,
        created_by: parse_id(&row.created_by),
        created_at: parse_utc(&row.created_at),
    }
}

fn event_response(row: EventRow, tags: Vec<String>) -> EventResponse {
    EventResponse {
        id: parse_id(&row.id),
        timeline_id: parse_id(&row.timeline_id),
        created_by: parse_id(&row.created_by),
        title: row.title,
        body: row.body,
        tags,
        created_at: parse_utc(&row.created_at),
    }
}

pub(crate) fn parse_id(raw: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt id '{}': {}", raw, e);
        Uuid::default()
    })
}
