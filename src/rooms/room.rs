use std::sync::Arc;

use axum::{
    debug_handler,
    extract::{Path, State},
    response::{Html, IntoResponse, Redirect, Response},
};
use tower_sessions::Session;
use uuid::Uuid;

use crate::{
    AppResult, auth, include_res, res,
    backend::{Backend, SqliteBackend},
    res::escape,
};

/// Page shell of the chat view; the message list itself arrives over the socket.
#[debug_handler(state = crate::AppState)]
pub(crate) async fn room(
    State(backend): State<Arc<SqliteBackend>>,
    session: Session,
    Path(room_id): Path<Uuid>,
) -> AppResult<Response> {
    let Some((_, user)) = auth::current_user(&session, &*backend).await? else {
        return Ok(Redirect::to(&format!("/login?return_url=/r/{room_id}")).into_response());
    };

    let Some(room) = backend.select_room(room_id).await? else {
        return res::sorry("room");
    };

    let body = include_res!(str, "/pages/rooms/room.html")
        .replace("{room_id}", &room.id.to_string())
        .replace("{email}", &escape(&user.email))
        .replace("{room_name}", &escape(&room.name));

    Ok(Html(body).into_response())
}
