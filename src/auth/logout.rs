use std::sync::Arc;

use axum::{debug_handler, extract::State, response::Redirect};
use tower_sessions::Session;
use tracing::error;

use crate::{
    AppResult,
    backend::{Auth, SqliteBackend},
    session::ACCESS_TOKEN,
};

#[debug_handler(state = crate::AppState)]
pub(crate) async fn logout(
    State(backend): State<Arc<SqliteBackend>>,
    session: Session,
) -> AppResult<Redirect> {
    if let Some(access_token) = session.get::<String>(ACCESS_TOKEN).await? {
        // live chat views on this token are told to leave by the auth-state channel
        if let Err(err) = backend.sign_out(&access_token).await {
            error!("error signing out: {err:#}");
        }
    }
    session.clear().await;
    Ok(Redirect::to("/login"))
}
