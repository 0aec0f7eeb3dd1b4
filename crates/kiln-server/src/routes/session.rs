//! `/v1/auth`: login, refresh and logout.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Extension, State};
use axum::http::StatusCode;
use kiln_auth::{LoginInput, Principal, TokenPair};
use kiln_core::KilnError;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub tenant_id: Uuid,
    pub refresh_token: String,
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(input): Json<LoginInput>,
) -> Result<Json<TokenPair>, ApiError> {
    let ctx = state.context();
    Ok(Json(state.auth.login(&ctx, input).await?))
}

pub async fn refresh(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<TokenPair>, ApiError> {
    let ctx = state.context();
    let pair = state
        .auth
        .refresh(&ctx, request.tenant_id, &request.refresh_token)
        .await?;
    Ok(Json(pair))
}

pub async fn logout(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> Result<StatusCode, ApiError> {
    let Principal::User { tenant_id, user_id } = principal else {
        return Err(KilnError::validation("only user sessions can log out").into());
    };
    let ctx = state.context();
    state.auth.logout(&ctx, tenant_id, user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
