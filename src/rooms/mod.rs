mod msg;
mod new;
mod room;
mod ws;

use axum::{Router, routing::{get, post}};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/new", post(new::new_room))
        .route("/{room_id}", get(room::room))
        .route("/{room_id}/ws", get(ws::room_ws))
}
