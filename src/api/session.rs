use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use uuid::Uuid;

use super::AppState;
use crate::error::AppError;

/// Cookie holding the session ID
pub const SESSION_COOKIE: &str = "session_id";

/// The logged-in user behind a request.
///
/// Extracting it rejects requests without a live session with 401.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub session_id: Uuid,
    pub user_id: i64,
    pub username: String,
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let unauthorized = || AppError::Unauthorized("Please log in to access this page".to_string());

        let jar = CookieJar::from_headers(&parts.headers);
        let session_id = session_id_from_jar(&jar).ok_or_else(unauthorized)?;
        let session = state
            .sessions
            .get(&session_id)
            .await
            .ok_or_else(unauthorized)?;

        Ok(Self {
            session_id,
            user_id: session.user_id,
            username: session.username,
        })
    }
}

/// Reads the session ID from the request's cookies
pub fn session_id_from_jar(jar: &CookieJar) -> Option<Uuid> {
    jar.get(SESSION_COOKIE)
        .and_then(|cookie| Uuid::parse_str(cookie.value()).ok())
}

/// Cookie opening a session
pub fn session_cookie(session_id: Uuid) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, session_id.to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

/// Cookie matching the session cookie's path, for removal
pub fn session_cookie_removal() -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE).path("/").build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{header, HeaderMap, HeaderValue};

    fn jar_with(cookie: &'static str) -> CookieJar {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static(cookie));
        CookieJar::from_headers(&headers)
    }

    #[test]
    fn test_session_id_from_cookie_header() {
        let id = Uuid::new_v4();
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_str(&format!("theme=dark; session_id={id}; lang=en")).unwrap(),
        );

        assert_eq!(
            session_id_from_jar(&CookieJar::from_headers(&headers)),
            Some(id)
        );
    }

    #[test]
    fn test_missing_or_garbled_cookie() {
        assert_eq!(session_id_from_jar(&CookieJar::new()), None);
        assert_eq!(session_id_from_jar(&jar_with("session_id=nope")), None);
        assert_eq!(session_id_from_jar(&jar_with("other_session_id=x")), None);
    }

    #[test]
    fn test_session_cookie_attributes() {
        let id = Uuid::new_v4();
        let cookie = session_cookie(id);

        assert_eq!(cookie.value(), id.to_string());
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
    }

    #[test]
    fn test_removal_expires_the_cookie() {
        let jar = jar_with("session_id=7d1e9c2a-2f4b-4a1e-9a55-0b9d7c1f3e11");
        let jar = jar.remove(session_cookie_removal());

        assert!(session_id_from_jar(&jar).is_none());
    }
}
