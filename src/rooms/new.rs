use std::sync::Arc;

use axum::{Form, debug_handler, extract::State, response::{IntoResponse, Redirect, Response}};
use serde::Deserialize;
use tower_sessions::Session;

use crate::{AppResult, auth, backend::SqliteBackend, intents::Intents};

#[derive(Debug, Deserialize)]
pub(crate) struct NewRoomQuery {
    name: String,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn new_room(
    State(backend): State<Arc<SqliteBackend>>,
    session: Session,

    Form(NewRoomQuery { name }): Form<NewRoomQuery>,
) -> AppResult<Response> {
    let Some((access_token, _)) = auth::current_user(&session, &*backend).await? else {
        return Ok(Redirect::to("/login").into_response());
    };

    let intents = Intents::new(backend.clone(), backend, access_token);
    let Some(room) = intents.create_room(&name).await else {
        return Ok(Redirect::to("/").into_response());
    };

    Ok(Redirect::to(
        &format!("/r/{}", room.id)
    ).into_response())
}
