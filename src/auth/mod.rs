mod login;
mod logout;

use axum::{Router, routing::{get, post}};
use tower_sessions::Session;

use crate::{AppResult, AppState, backend::Auth, models::User, session::ACCESS_TOKEN};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", get(login::login_page).post(login::login))
        .route("/signup", post(login::signup))
        .route("/logout", get(logout::logout))
}

/// Access token and user of this browser session, if the token is still live.
pub(crate) async fn current_user(
    session: &Session,
    auth: &dyn Auth,
) -> AppResult<Option<(String, User)>> {
    let Some(access_token) = session.get::<String>(ACCESS_TOKEN).await? else {
        return Ok(None);
    };

    Ok(auth.get_user(&access_token).await?.map(|user| (access_token, user)))
}

/// Only same-site paths are accepted as post-login destinations.
pub(crate) fn safe_return_url(url: &str) -> Option<&str> {
    (url.starts_with('/') && !url.starts_with("//")).then_some(url)
}
