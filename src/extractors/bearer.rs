//! Bearer token from the `Authorization` header.

use crate::error::AppError;
use crate::state::AppState;
use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

/// Non-empty token of an `Authorization: Bearer <token>` header. Rejects with 401 otherwise.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BearerToken(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or_else(|| AppError::Unauthorized("missing Authorization header".into()))?
            .to_str()
            .map_err(|_| AppError::Unauthorized("malformed Authorization header".into()))?;
        let (scheme, token) = header.trim().split_once(' ').unwrap_or((header.trim(), ""));
        if !scheme.eq_ignore_ascii_case("bearer") {
            return Err(AppError::Unauthorized("expected a Bearer token".into()));
        }
        let token = token.trim();
        if token.is_empty() {
            return Err(AppError::Unauthorized("empty Bearer token".into()));
        }
        Ok(BearerToken(token.to_string()))
    }
}

/// Who is calling, as far as the token tells. Put into request extensions by [`require_bearer`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Caller {
    pub user_id: Option<Uuid>,
}

/// Route layer for `/api`: a bearer token is required and, when tokens are configured, must be one of them.
pub async fn require_bearer(
    State(state): State<AppState>,
    BearerToken(token): BearerToken,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user_id = match state.api_tokens.get(&token) {
        Some(user) => *user,
        None if state.api_tokens.is_empty() => None,
        None => {
            tracing::debug!(path = %request.uri().path(), "rejected unknown token");
            return Err(AppError::Unauthorized("invalid token".into()));
        }
    };
    request.extensions_mut().insert(Caller { user_id });
    Ok(next.run(request).await)
}
