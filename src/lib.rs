pub mod appresult;
pub mod auth;
pub mod backend;
pub mod config;
pub mod gate;
pub mod index;
pub mod intents;
pub mod models;
pub mod res;
pub mod rooms;
pub mod session;
pub mod sync;

use std::sync::Arc;

use axum::{Router, extract::FromRef, routing::get};
use tower_http::{services::ServeDir, trace::TraceLayer};
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer, cookie::SameSite};

pub use appresult::{AppError, AppResult};
pub use backend::{Auth, Backend, SqliteBackend};
pub use config::Config;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub backend: Arc<SqliteBackend>,
    pub config: Arc<Config>,
}

pub fn app(state: AppState) -> Router {
    let session_layer = SessionManagerLayer::new(MemoryStore::default())
        .with_secure(false)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(state.config.session_idle));
    let files = ServeDir::new(state.backend.bucket().root());

    Router::new()
        .route("/", get(index::index))
        .merge(auth::router())
        .nest("/r", rooms::router())
        .nest_service("/files", files)
        .with_state(state)
        .layer(session_layer)
        .layer(TraceLayer::new_for_http())
}
