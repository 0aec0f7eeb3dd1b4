//! `/v1/apikeys`

use std::sync::Arc;

use axum::Json;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use kiln_auth::{NewApiKey, Principal};
use kiln_core::models::api_key::ApiKey;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::authorize;
use crate::error::ApiError;
use crate::state::AppState;

const CREATE: &str = "identity::api_keys::create";
const REVOKE: &str = "identity::api_keys::revoke";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateApiKeyRequest {
    #[serde(default)]
    pub tenant_id: Option<Uuid>,
    #[serde(flatten)]
    pub key: NewApiKey,
}

/// The only response that ever contains the plaintext key.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedApiKeyResponse {
    pub api_key: ApiKey,
    pub key: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RevokeRequest {
    pub tenant_id: Option<Uuid>,
    pub reason: Option<String>,
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Json(request): Json<CreateApiKeyRequest>,
) -> Result<(StatusCode, Json<CreatedApiKeyResponse>), ApiError> {
    let ctx = state.context();
    let tenant_id = request.tenant_id.unwrap_or_else(|| principal.tenant_id());
    let issuer = authorize(&state, &ctx, principal, CREATE, tenant_id).await?;

    let created = state
        .api_keys
        .create(&ctx, tenant_id, request.key, &issuer)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(CreatedApiKeyResponse {
            api_key: created.api_key,
            key: created.plaintext,
        }),
    ))
}

pub async fn revoke(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    body: Option<Json<RevokeRequest>>,
) -> Result<Json<ApiKey>, ApiError> {
    let request = body.map(|Json(request)| request).unwrap_or_default();
    let ctx = state.context();
    let tenant_id = request.tenant_id.unwrap_or_else(|| principal.tenant_id());
    authorize(&state, &ctx, principal, REVOKE, tenant_id).await?;

    let api_key = state
        .api_keys
        .revoke(&ctx, tenant_id, id, principal, request.reason)
        .await?;
    Ok(Json(api_key))
}
