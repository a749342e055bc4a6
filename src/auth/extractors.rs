use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, FromRequestParts, Request},
    http::{header::AUTHORIZATION, request::Parts},
    Json,
};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::error::AuthError;
use super::validation::ValidationErrors;

/// JSON request body whose rejections (wrong content type, malformed JSON,
/// wrongly typed fields) surface as `AuthError::Validation` under `body`.
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBody(value)),
            Err(rejection) => Err(rejection_to_validation(rejection)),
        }
    }
}

fn rejection_to_validation(rejection: JsonRejection) -> AuthError {
    debug!(status = %rejection.status(), "json body rejected");
    let mut errors = ValidationErrors::default();
    errors.add("body", rejection.body_text());
    AuthError::Validation(errors)
}

/// Raw bearer token from the `Authorization` header. Not validated here;
/// handlers pass it on to `AuthService` explicitly.
pub struct BearerToken(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or_else(|| {
                debug!("missing Authorization header");
                AuthError::Unauthorized
            })?;

        parse_bearer(header).map(|t| BearerToken(t.to_string())).ok_or_else(|| {
            debug!("invalid auth scheme");
            AuthError::Unauthorized
        })
    }
}

/// Expect "Bearer <token>", scheme matched case-insensitively.
fn parse_bearer(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::parse_bearer;

    #[test]
    fn parses_bearer_scheme() {
        assert_eq!(parse_bearer("Bearer abc"), Some("abc"));
        assert_eq!(parse_bearer("bearer abc"), Some("abc"));
        assert_eq!(parse_bearer("BEARER  abc "), Some("abc"));
    }

    #[test]
    fn rejects_other_schemes_and_empty_tokens() {
        assert_eq!(parse_bearer("Basic abc"), None);
        assert_eq!(parse_bearer("Bearer"), None);
        assert_eq!(parse_bearer("Bearer   "), None);
        assert_eq!(parse_bearer("abc"), None);
    }
}
