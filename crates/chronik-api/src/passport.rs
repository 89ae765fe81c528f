use axum::{Extension, Json, extract::State, response::IntoResponse};

use chronik_types::api::{Claims, PassportResponse};
use chronik_types::models::parse_utc;

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiError;

/// Fetch the stored snapshot. Clients call this on login from any device.
pub async fn get_passport(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let (memberships, last_updated) =
        blocking(move || Ok(state.db.get_passport(&claims.sub.to_string())?)).await?;

    Ok(Json(PassportResponse {
        memberships,
        last_updated: parse_utc(&last_updated),
    }))
}

/// Rebuild and overwrite the snapshot. Clients call this after any
/// membership change and before trusting cached state; running it
/// redundantly is safe.
pub async fn sync_passport(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let (memberships, last_updated) = blocking(move || {
        let uid = claims.sub.to_string();
        let site_owner = state.db.is_site_owner(&uid)?;
        state.db.sync_passport(&uid, site_owner)?;
        Ok(state.db.get_passport(&uid)?)
    })
    .await?;

    Ok(Json(PassportResponse {
        memberships,
        last_updated: parse_utc(&last_updated),
    }))
}
