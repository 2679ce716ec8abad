//! Login gate
//!
//! A correct shared password starts a session whose id is carried in the
//! `peal_session` cookie. The middleware redirects every protected request
//! without a live session to `/login`.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
    Form,
};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::html;
use crate::AppState;

pub const SESSION_COOKIE: &str = "peal_session";

/// Session id from the request's `Cookie` headers, if present and well formed
pub fn session_from_headers(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .and_then(|(_, value)| Uuid::parse_str(value.trim()).ok())
}

fn session_cookie(session: Uuid, max_age: Duration) -> String {
    format!(
        "{}={}; HttpOnly; SameSite=Strict; Path=/; Max-Age={}",
        SESSION_COOKIE,
        session,
        max_age.as_secs()
    )
}

fn expired_cookie() -> String {
    format!(
        "{}=; HttpOnly; SameSite=Strict; Path=/; Max-Age=0",
        SESSION_COOKIE
    )
}

/// Authentication middleware for protected routes
pub async fn auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let authenticated = match session_from_headers(request.headers()) {
        Some(session) => state.sessions.is_authenticated(session).await,
        None => false,
    };

    if authenticated {
        return next.run(request).await;
    }
    debug!("No live session for {}; redirecting to login", request.uri().path());
    Redirect::to("/login").into_response()
}

fn login_form(error: Option<&str>) -> String {
    format!(
        r#"{}
<form method="post" action="/login">
    <label for="password">Password</label>
    <input type="password" id="password" name="password" autofocus required>
    <p><button type="submit">Log in</button></p>
</form>"#,
        error.map(html::error_box).unwrap_or_default(),
    )
}

/// GET /login
pub async fn login_page(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(session) = session_from_headers(&headers) {
        if state.sessions.is_authenticated(session).await {
            return Redirect::to("/").into_response();
        }
    }
    html::bare_page("Log in", &login_form(None)).into_response()
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    password: String,
}

/// POST /login
pub async fn login(State(state): State<AppState>, Form(form): Form<LoginForm>) -> Response {
    match state.sessions.login(&state.secret, &form.password).await {
        Some(session) => {
            info!("Login succeeded");
            (
                [(header::SET_COOKIE, session_cookie(session, state.sessions.ttl()))],
                Redirect::to("/"),
            )
                .into_response()
        }
        None => {
            warn!("Login rejected: wrong password");
            (
                StatusCode::UNAUTHORIZED,
                html::bare_page("Log in", &login_form(Some("Incorrect password."))),
            )
                .into_response()
        }
    }
}

/// POST /logout
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(session) = session_from_headers(&headers) {
        if state.sessions.logout(session).await {
            info!("Logged out");
        }
    }
    (
        [(header::SET_COOKIE, expired_cookie())],
        Redirect::to("/login"),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_session_from_headers() {
        let id = Uuid::new_v4();
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_str(&format!("theme=dark; {}={}", SESSION_COOKIE, id)).unwrap(),
        );
        assert_eq!(session_from_headers(&headers), Some(id));
    }

    #[test]
    fn test_malformed_session_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("peal_session=abc"));
        assert_eq!(session_from_headers(&headers), None);
        assert_eq!(session_from_headers(&HeaderMap::new()), None);
    }
}
