pub mod auth;
pub mod cli;
pub mod config;
pub mod dates;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
pub mod store;

use axum::{routing::get, Router};
use time::Duration;
use tower_http::trace::{DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;
use tower_sessions::{cookie::SameSite, Expiry, SessionManagerLayer};
use tower_sessions_sqlx_store::SqliteStore;

use crate::store::Store;

#[derive(Clone)]
pub struct AppState {
    pub store: Store,
}

async fn health() -> &'static str {
    "ok"
}

/// Build the full Axum application router.
///
/// Caller is responsible for running database migrations on the store's pool
/// beforehand. This function sets up the session store (and migrates its
/// table), then assembles all route modules, middleware, and state.
pub async fn build_app(store: Store, secure_cookies: bool) -> Result<Router, sqlx::Error> {
    let session_store = SqliteStore::new(store.pool().clone());
    session_store.migrate().await?;

    let session_layer = SessionManagerLayer::new(session_store)
        .with_expiry(Expiry::OnInactivity(Duration::days(30)))
        .with_secure(secure_cookies)
        .with_http_only(true)
        .with_same_site(SameSite::Lax);

    let state = AppState { store };

    Ok(Router::new()
        .route("/health", get(health))
        .merge(routes::auth::router())
        .merge(routes::teams::router())
        .merge(routes::logs::router())
        .merge(routes::notifications::router())
        .merge(routes::invitations::router())
        .layer(session_layer)
        .layer(
            TraceLayer::new_for_http()
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .with_state(state))
}
