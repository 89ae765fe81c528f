pub mod access;
pub mod auth;
pub mod error;
pub mod members;
pub mod middleware;
pub mod passport;
pub mod reports;
pub mod timelines;

use error::ApiError;
use tracing::error;

/// Run blocking DB work off the async runtime, per handler call.
pub(crate) async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ApiError::Internal(anyhow::anyhow!("blocking task failed: {}", e))
    })?
}
