//! peal-ui library - attendance tracker web interface
//!
//! Server-rendered pages over the configured [`Storage`] backend. Every page
//! except the login form and the health endpoint requires a session.

use axum::Router;
use peal_common::auth::{SessionStore, SharedSecret};
use peal_common::Storage;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod html;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Backend chosen at startup
    pub storage: Arc<dyn Storage>,
    pub sessions: SessionStore,
    pub secret: SharedSecret,
}

impl AppState {
    pub fn new(storage: Arc<dyn Storage>, secret: SharedSecret) -> Self {
        Self::with_sessions(storage, secret, SessionStore::new())
    }

    pub fn with_sessions(
        storage: Arc<dyn Storage>,
        secret: SharedSecret,
        sessions: SessionStore,
    ) -> Self {
        Self {
            storage,
            sessions,
            secret,
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;
    use axum::routing::{get, post};

    // Protected routes (require a live session)
    let protected = Router::new()
        .route("/", get(api::dashboard))
        .route("/logout", post(api::logout))
        .merge(api::employee_routes())
        .merge(api::practice_routes())
        .merge(api::method_routes())
        .merge(api::touch_routes())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::auth_middleware,
        ));

    // Public routes
    let public = Router::new()
        .route("/login", get(api::login_page).post(api::login))
        .merge(api::health_routes());

    Router::new()
        .merge(protected)
        .merge(public)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
