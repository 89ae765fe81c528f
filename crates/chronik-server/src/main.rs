use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{delete, get, post, put},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use chronik_api::auth::{self, AppState, AppStateInner};
use chronik_api::members;
use chronik_api::middleware::require_auth;
use chronik_api::passport;
use chronik_api::reports;
use chronik_api::timelines;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chronik=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret =
        std::env::var("CHRONIK_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("CHRONIK_DB_PATH").unwrap_or_else(|_| "chronik.db".into());
    let host = std::env::var("CHRONIK_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("CHRONIK_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;

    // Init database
    let db = chronik_db::Database::open(&PathBuf::from(&db_path))?;

    // Shared state
    let app_state: AppState = Arc::new(AppStateInner { db, jwt_secret });

    // Routes
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .with_state(app_state.clone());

    let protected_routes = Router::new()
        .route("/timelines", post(timelines::create_timeline))
        .route("/timelines/{timeline_id}", get(timelines::get_timeline))
        .route("/timelines/{timeline_id}", put(timelines::update_timeline))
        .route("/timelines/{timeline_id}/events", get(timelines::list_events))
        .route("/timelines/{timeline_id}/events", post(timelines::create_event))
        .route(
            "/timelines/{timeline_id}/events/{event_id}/share",
            post(timelines::share_event),
        )
        .route(
            "/timelines/{timeline_id}/events/{event_id}/share",
            delete(timelines::unshare_event),
        )
        .route("/timelines/{timeline_id}/members", get(members::list_members))
        .route("/timelines/{timeline_id}/members", post(members::join_timeline))
        .route(
            "/timelines/{timeline_id}/members/blocked",
            get(members::list_blocked_members),
        )
        .route(
            "/timelines/{timeline_id}/members/{user_id}",
            delete(members::remove_member),
        )
        .route(
            "/timelines/{timeline_id}/members/{user_id}/approve",
            put(members::approve_member),
        )
        .route(
            "/timelines/{timeline_id}/members/{user_id}/role",
            put(members::update_member_role),
        )
        .route(
            "/timelines/{timeline_id}/members/{user_id}/block",
            post(members::block_member),
        )
        .route(
            "/timelines/{timeline_id}/members/{user_id}/unblock",
            post(members::unblock_member),
        )
        .route("/user/passport", get(passport::get_passport))
        .route("/user/passport/sync", post(passport::sync_passport))
        .route("/timelines/{timeline_id}/reports", get(reports::list_reports))
        .route("/timelines/{timeline_id}/reports", post(reports::submit_report))
        .route(
            "/timelines/{timeline_id}/reports/{report_id}/accept",
            post(reports::accept_report),
        )
        .route(
            "/timelines/{timeline_id}/reports/{report_id}/resolve",
            post(reports::resolve_report),
        )
        .layer(middleware::from_fn(require_auth))
        .with_state(app_state);

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Chronik server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
