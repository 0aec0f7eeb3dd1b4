//! Request authentication.
//!
//! `X-Api-Key` is tried first, then `Authorization: Bearer <jwt>`. The
//! resulting [`Principal`] is stored as a request extension.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use kiln_auth::{AuthError, Principal};
use kiln_core::{AppContext, KilnError, KilnResult};
use tracing::debug;

use crate::error::ApiError;
use crate::state::AppState;

pub const API_KEY_HEADER: &str = "x-api-key";

pub async fn authenticate(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let ctx = state.context();
    let principal = principal_from_headers(&state, &ctx, request.headers()).await?;
    debug!(principal = %principal, path = %request.uri().path(), "Authenticated request");
    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}

async fn principal_from_headers(
    state: &AppState,
    ctx: &AppContext,
    headers: &HeaderMap,
) -> KilnResult<Principal> {
    if let Some(value) = headers.get(API_KEY_HEADER) {
        let plaintext = value.to_str().map_err(|_| AuthError::ApiKeyInvalid)?;
        let key = state.api_keys.validate(ctx, plaintext.trim()).await?;
        return Ok(Principal::ApiKey {
            tenant_id: key.tenant_id,
            key_id: key.id,
        });
    }

    let token = bearer_token(headers).ok_or_else(|| KilnError::AuthenticationFailed {
        reason: "missing credentials".into(),
    })?;
    Ok(state.auth.validate_bearer(token)?)
}

/// The token of an `Authorization: Bearer` header, if any.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}
