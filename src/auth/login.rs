use std::sync::Arc;

use axum::{
    Form, debug_handler,
    extract::{Query, State},
    response::{Html, IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::info;

use crate::{
    AppError, AppResult, include_res,
    backend::{Auth, AuthError, SqliteBackend},
    res::escape,
    session::{ACCESS_TOKEN, RETURN_URL},
};

use super::safe_return_url;

#[derive(Deserialize)]
pub(crate) struct LoginQuery {
    pub(crate) return_url: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct Credentials {
    email: String,
    password: String,
}

fn login_html(error: Option<&str>, notice: Option<&str>) -> Html<String> {
    let banner = |class: &str, text: Option<&str>| {
        text.map(|text| format!("<p class='{class}'>{}</p>", escape(text)))
            .unwrap_or_default()
    };

    Html(
        include_res!(str, "/pages/login.html")
            .replace("{error}", &banner("error", error))
            .replace("{notice}", &banner("notice", notice)),
    )
}

#[debug_handler]
pub(crate) async fn login_page(
    Query(LoginQuery { return_url }): Query<LoginQuery>,
    session: Session,
) -> AppResult<Response> {
    if let Some(return_url) = return_url.as_deref().and_then(safe_return_url) {
        session.insert(RETURN_URL, return_url).await?;
    }

    Ok(login_html(None, None).into_response())
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn login(
    State(backend): State<Arc<SqliteBackend>>,
    session: Session,
    Form(Credentials { email, password }): Form<Credentials>,
) -> AppResult<Response> {
    match backend.sign_in(&email, &password).await {
        Ok(signed_in) => {
            session.cycle_id().await?;
            session.insert(ACCESS_TOKEN, &signed_in.access_token).await?;

            let return_url: String = session
                .remove::<String>(RETURN_URL)
                .await?
                .unwrap_or_else(|| "/".to_owned());
            Ok(Redirect::to(&return_url).into_response())
        }
        Err(AuthError::Internal(err)) => Err(AppError(err)),
        Err(err) => Ok(login_html(Some(&err.to_string()), None).into_response()),
    }
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn signup(
    State(backend): State<Arc<SqliteBackend>>,
    Form(Credentials { email, password }): Form<Credentials>,
) -> AppResult<Response> {
    match backend.sign_up(&email, &password).await {
        Ok(user) => {
            info!(user_id = %user.id, "account created");
            let notice = format!("Account created for {}. Sign in to continue.", user.email);
            Ok(login_html(None, Some(&notice)).into_response())
        }
        Err(AuthError::Internal(err)) => Err(AppError(err)),
        Err(err) => Ok(login_html(Some(&err.to_string()), None).into_response()),
    }
}
