use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::error;

use crate::access::Deny;

/// Error surface for every handler. Authorization and precondition failures
/// carry a reason the client can branch on; only infrastructure failures
/// map to a 500.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("insufficient rank for this action")]
    InsufficientRank,

    #[error("you cannot perform this action on yourself")]
    SelfAction,

    #[error("not a member of this timeline")]
    NotAMember,

    #[error("blocked from this timeline")]
    Blocked,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("report is already resolved")]
    AlreadyResolved,

    #[error("a non-empty verdict is required to resolve a report")]
    VerdictRequired,

    #[error("event is not shared anywhere else; resolve with the delete action")]
    FullDeleteRequired,

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error("internal server error")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::InsufficientRank
            | ApiError::SelfAction
            | ApiError::NotAMember
            | ApiError::Blocked => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::AlreadyResolved | ApiError::FullDeleteRequired | ApiError::Conflict(_) => {
                StatusCode::CONFLICT
            }
            ApiError::VerdictRequired => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(e) => {
                error!("Internal error: {:#}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        // `full_delete_required` is a distinct field so the client can offer
        // escalation to delete instead of just showing the message.
        let body = if matches!(self, ApiError::FullDeleteRequired) {
            Json(json!({ "error": self.to_string(), "full_delete_required": true }))
        } else {
            Json(json!({ "error": self.to_string() }))
        };

        (status, body).into_response()
    }
}

impl From<Deny> for ApiError {
    fn from(deny: Deny) -> Self {
        match deny {
            Deny::InsufficientRank => ApiError::InsufficientRank,
            Deny::SelfAction => ApiError::SelfAction,
            Deny::NotAMember => ApiError::NotAMember,
        }
    }
}

/// Map a unique-constraint violation to a conflict, anything else to a 500.
pub(crate) fn conflict_on_unique(e: anyhow::Error, message: &str) -> ApiError {
    if chronik_db::is_unique_violation(&e) {
        ApiError::Conflict(message.to_string())
    } else {
        ApiError::Internal(e)
    }
}
