use std::sync::Arc;

use axum::{debug_handler, extract::State, response::{Html, IntoResponse, Redirect, Response}};
use tower_sessions::Session;

use crate::{
    AppResult, auth, include_res,
    backend::{Backend, SqliteBackend},
    res::escape,
};

/// The shell: signed-out visitors go to the sign-in page, everyone else gets
/// the room list and the create-room form.
#[debug_handler(state = crate::AppState)]
pub async fn index(
    State(backend): State<Arc<SqliteBackend>>,
    session: Session,
) -> AppResult<Response> {
    let Some((_, user)) = auth::current_user(&session, &*backend).await? else {
        return Ok(
            Redirect::to("/login")
                .into_response()
        );
    };

    let mut room_items = String::new();
    for room in backend.select_rooms().await? {
        room_items += &include_res!(str, "/pages/room_item.html")
            .replace("{id}", &room.id.to_string())
            .replace("{name}", &escape(&room.name));
    }

    Ok(
        Html(
            include_res!(str, "/pages/index.html")
                .replace("{email}", &escape(&user.email))
                .replace("{room_items}", &room_items)
        ).into_response()
    )
}
