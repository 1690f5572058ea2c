use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap, StatusCode},
};
use crate::model::UserContext;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_EMAIL_HEADER: &str = "x-user-email";
pub const USER_NAME_HEADER: &str = "x-user-name";

/// Axum extractor for UserContext from request headers
///
/// - X-User-Id: user identifier, substituted for `$user` in tab filters
/// - X-User-Email: optional
/// - X-User-Name: optional, shown in mutation logs
///
/// Without an X-User-Id header the development default user is returned.
#[async_trait]
impl<S> FromRequestParts<S> for UserContext
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(user_from_headers(&parts.headers))
    }
}

pub fn user_from_headers(headers: &HeaderMap) -> UserContext {
    match extract_header_value(headers, USER_ID_HEADER) {
        Some(user_id) => UserContext::with_details(
            user_id,
            extract_header_value(headers, USER_EMAIL_HEADER),
            extract_header_value(headers, USER_NAME_HEADER),
        ),
        None => UserContext::default_user(),
    }
}

/// Trimmed header value, `None` when missing, blank or not valid text
fn extract_header_value(headers: &HeaderMap, header_name: &str) -> Option<String> {
    headers
        .get(header_name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}
