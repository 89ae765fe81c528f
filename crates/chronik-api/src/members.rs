use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use chronik_db::Database;
use chronik_db::membership::JoinOutcome;
use chronik_db::models::{MemberListRow, MembershipRow, TimelineRow};
use chronik_types::api::{Claims, MemberResponse, UpdateMemberRoleRequest};
use chronik_types::models::{Role, parse_utc};

use crate::access;
use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiError;
use crate::timelines::parse_id;

/// Self-service join. The outcome depends on the timeline's current
/// approval setting; a blocked user is rejected outright.
pub async fn join_timeline(
    State(state): State<AppState>,
    Path(timeline_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let username = claims.username.clone();
    let row = blocking(move || {
        let tid = timeline_id.to_string();
        let timeline = state.db.get_timeline(&tid)?.ok_or(ApiError::NotFound("timeline"))?;

        match state.db.join_timeline(&timeline, &claims.sub.to_string())? {
            JoinOutcome::Active(row) | JoinOutcome::Pending(row) => Ok(row),
            JoinOutcome::Blocked => Err(ApiError::Blocked),
        }
    })
    .await?;

    Ok((StatusCode::CREATED, Json(member_response(row, username))))
}

/// Promote a pending membership. Moderator or better.
pub async fn approve_member(
    State(state): State<AppState>,
    Path((timeline_id, user_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    admin_action(state, timeline_id, user_id, claims, |db, tid, uid| {
        db.approve_member(tid, uid)
    })
    .await
}

/// Kick: revoke active membership without banning.
pub async fn remove_member(
    State(state): State<AppState>,
    Path((timeline_id, user_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    admin_action(state, timeline_id, user_id, claims, |db, tid, uid| {
        db.remove_member(tid, uid)
    })
    .await
}

/// Block: revoke active membership and bar rejoining.
pub async fn block_member(
    State(state): State<AppState>,
    Path((timeline_id, user_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    admin_action(state, timeline_id, user_id, claims, |db, tid, uid| {
        db.block_member(tid, uid)
    })
    .await
}

pub async fn unblock_member(
    State(state): State<AppState>,
    Path((timeline_id, user_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    admin_action(state, timeline_id, user_id, claims, |db, tid, uid| {
        db.unblock_member(tid, uid)
    })
    .await
}

/// Assign member, moderator or admin to an active member. Admin or better;
/// creator and site-owner standing are never assigned this way, and pending
/// applicants go through approval first.
pub async fn update_member_role(
    State(state): State<AppState>,
    Path((timeline_id, user_id)): Path<(Uuid, Uuid)>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateMemberRoleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if !matches!(req.role, Role::Member | Role::Moderator | Role::Admin) {
        return Err(ApiError::BadRequest(
            "role must be member, moderator or admin".into(),
        ));
    }
    if claims.sub == user_id {
        return Err(ApiError::SelfAction);
    }

    let (row, username) = blocking(move || {
        let tid = timeline_id.to_string();
        let uid = user_id.to_string();
        let timeline = state.db.get_timeline(&tid)?.ok_or(ApiError::NotFound("timeline"))?;
        load_target(&state.db, &timeline, &uid)?;

        let actor = access::resolve_actor(&state.db, &timeline, claims.sub)?;
        access::require_admin(&actor)?;

        if !state.db.set_member_role(&tid, &uid, req.role)? {
            return Err(ApiError::NotFound("member"));
        }

        let row = state
            .db
            .get_membership(&tid, &uid)?
            .ok_or(ApiError::NotFound("member"))?;
        let username = state
            .db
            .get_user_by_id(&uid)?
            .map(|u| u.username)
            .unwrap_or_else(|| "unknown".to_string());
        Ok((row, username))
    })
    .await?;

    Ok(Json(member_response(row, username)))
}

/// Shared shape of every admin membership mutation: load, authorize via the
/// rank check, mutate, return the refreshed state.
async fn admin_action<F>(
    state: AppState,
    timeline_id: Uuid,
    user_id: Uuid,
    claims: Claims,
    mutate: F,
) -> Result<(StatusCode, Json<MemberResponse>), ApiError>
where
    F: FnOnce(&Database, &str, &str) -> anyhow::Result<bool> + Send + 'static,
{
    let (row, username) = blocking(move || {
        let tid = timeline_id.to_string();
        let uid = user_id.to_string();
        let timeline = state.db.get_timeline(&tid)?.ok_or(ApiError::NotFound("timeline"))?;

        let target = load_target(&state.db, &timeline, &uid)?;
        let target_role = Role::parse(&target.role).unwrap_or(Role::Member);

        let actor = access::resolve_actor(&state.db, &timeline, claims.sub)?;
        access::check_admin_action(&actor, user_id, target_role)?;

        if !mutate(&state.db, &tid, &uid)? {
            return Err(ApiError::NotFound("member"));
        }

        let row = state
            .db
            .get_membership(&tid, &uid)?
            .ok_or(ApiError::NotFound("member"))?;
        let username = state
            .db
            .get_user_by_id(&uid)?
            .map(|u| u.username)
            .unwrap_or_else(|| "unknown".to_string());
        Ok((row, username))
    })
    .await?;

    Ok((StatusCode::OK, Json(member_response(row, username))))
}

fn load_target(
    db: &Database,
    timeline: &TimelineRow,
    user_id: &str,
) -> Result<MembershipRow, ApiError> {
    db.get_membership(&timeline.id, user_id)?
        .ok_or(ApiError::NotFound("member"))
}

pub async fn list_members(
    State(state): State<AppState>,
    Path(timeline_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let members = blocking(move || {
        let tid = timeline_id.to_string();
        let timeline = state.db.get_timeline(&tid)?.ok_or(ApiError::NotFound("timeline"))?;

        let actor = access::resolve_actor(&state.db, &timeline, claims.sub)?;
        if !access::can_view(&actor, &timeline) {
            return Err(ApiError::NotAMember);
        }

        let rows = state.db.list_members(&timeline)?;
        Ok(rows.into_iter().map(member_list_response).collect::<Vec<_>>())
    })
    .await?;

    Ok(Json(members))
}

/// The blocked list is privileged: moderator or better.
pub async fn list_blocked_members(
    State(state): State<AppState>,
    Path(timeline_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let members = blocking(move || {
        let tid = timeline_id.to_string();
        let timeline = state.db.get_timeline(&tid)?.ok_or(ApiError::NotFound("timeline"))?;

        let actor = access::resolve_actor(&state.db, &timeline, claims.sub)?;
        access::require_moderator(&actor)?;

        let rows = state.db.list_blocked_members(&tid)?;
        Ok(rows.into_iter().map(member_list_response).collect::<Vec<_>>())
    })
    .await?;

    Ok(Json(members))
}

fn member_response(row: MembershipRow, username: String) -> MemberResponse {
    MemberResponse {
        timeline_id: parse_id(&row.timeline_id),
        user_id: parse_id(&row.user_id),
        username,
        role: Role::parse(&row.role).unwrap_or(Role::Member),
        is_active_member: row.is_active,
        is_blocked: row.is_blocked,
        joined_at: parse_utc(&row.joined_at),
    }
}

fn member_list_response(row: MemberListRow) -> MemberResponse {
    MemberResponse {
        timeline_id: parse_id(&row.timeline_id),
        user_id: parse_id(&row.user_id),
        username: row.username,
        role: Role::parse(&row.role).unwrap_or(Role::Member),
        is_active_member: row.is_active,
        is_blocked: row.is_blocked,
        joined_at: parse_utc(&row.joined_at),
    }
}
