//! Bearer token verification. Tokens are minted by an external auth
//! collaborator (spec §1); this crate only verifies the signature and
//! extracts the subject claim.

use crate::models::{AuthenticatedUser, Claims};
use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    middleware::Next,
    response::Response,
    Json,
};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde_json::json;
use std::sync::Arc;

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<serde_json::Value>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let claims = parts.extensions.get::<Claims>().ok_or_else(|| {
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "unauthenticated", "message": "missing bearer token" })),
            )
        })?;

        let id = claims.user_id().map_err(|_| {
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "unauthenticated", "message": "token subject is not a uuid" })),
            )
        })?;

        Ok(AuthenticatedUser { id })
    }
}

fn extract_bearer(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
}

/// Verifies the bearer token's signature and expiry, then stashes `Claims`
/// in request extensions for the `AuthenticatedUser` extractor.
pub async fn auth_middleware(
    State(jwt_secret): State<Arc<String>>,
    mut request: Request,
    next: Next,
) -> Result<Response, (StatusCode, Json<serde_json::Value>)> {
    let token = extract_bearer(&request).ok_or_else(|| {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "unauthenticated", "message": "authorization header required" })),
        )
    })?;

    let claims = decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "unauthenticated", "message": "invalid or expired token" })),
        )
    })?;

    if claims.is_expired() {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "unauthenticated", "message": "token expired" })),
        ));
    }

    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}

/// Used by handlers that need the raw claims rather than the extractor
/// (e.g. to check `exp` without failing the request).
pub fn extract_claims(request: &Request) -> Option<&Claims> {
    request.extensions().get::<Claims>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;

    #[test]
    fn test_extract_bearer_strips_prefix() {
        let request = HttpRequest::builder()
            .header(AUTHORIZATION, "Bearer abc.def.ghi")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract_bearer(&request), Some("abc.def.ghi"));
    }

    #[test]
    fn test_extract_bearer_rejects_missing_scheme() {
        let request = HttpRequest::builder()
            .header(AUTHORIZATION, "abc.def.ghi")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract_bearer(&request), None);
    }
}
