//! `/v1/certificates`

use std::sync::Arc;

use axum::Json;
use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use kiln_auth::Principal;
use kiln_core::Diagnostics;
use kiln_core::KilnError;
use kiln_core::models::certificate::{Certificate, CertificateFilter, CertificateType};
use kiln_pki::IssueCertificate;
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use super::{Page, authorize, pagination};
use crate::error::ApiError;
use crate::state::AppState;

const READ: &str = "pki::certificates::read";
const CREATE: &str = "pki::certificates::create";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub tenant_id: Option<Uuid>,
    #[serde(rename = "type")]
    pub certificate_type: Option<String>,
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantQuery {
    pub tenant_id: Option<Uuid>,
}

/// Issuance request; the tenant defaults to the caller's.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCertificateRequest {
    #[serde(default)]
    pub tenant_id: Option<Uuid>,
    #[serde(flatten)]
    pub certificate: IssueCertificate,
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Page<Certificate>>, ApiError> {
    let ctx = state.context();
    let tenant_id = query.tenant_id.unwrap_or_else(|| principal.tenant_id());
    authorize(&state, &ctx, principal, READ, tenant_id).await?;

    let certificate_type = query
        .certificate_type
        .as_deref()
        .map(|raw| {
            CertificateType::parse(raw).ok_or_else(|| KilnError::Validation {
                message: format!("unknown certificate type '{raw}'"),
                details: Some(serde_json::json!({
                    "field": "type",
                    "allowed": ["root", "intermediate", "end_entity"],
                })),
            })
        })
        .transpose()?;
    let (page, page_size, window) = pagination(query.page, query.page_size)?;

    let result = state
        .certificates
        .list(
            &ctx,
            CertificateFilter {
                tenant_id: Some(tenant_id),
                certificate_type,
            },
            window,
        )
        .await?;

    Ok(Json(Page {
        items: result.items,
        total: result.total,
        page,
        page_size,
    }))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Json(request): Json<CreateCertificateRequest>,
) -> Result<(StatusCode, Json<Certificate>), ApiError> {
    let ctx = state.context();
    let tenant_id = request.tenant_id.unwrap_or_else(|| principal.tenant_id());
    authorize(&state, &ctx, principal, CREATE, tenant_id).await?;

    let mut diagnostics = Diagnostics::new("issue certificate");
    let issued = state
        .certificates
        .issue_end_entity(&ctx, tenant_id, request.certificate, &mut diagnostics)
        .await;
    diagnostics.complete();
    if diagnostics.has_errors() {
        warn!(
            tenant_id = %tenant_id,
            diagnostics = %diagnostics.to_json(),
            "Certificate issuance reported problems"
        );
    }

    Ok((StatusCode::CREATED, Json(issued?)))
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(id_or_slug): Path<String>,
    Query(query): Query<TenantQuery>,
) -> Result<Json<Certificate>, ApiError> {
    let ctx = state.context();
    let tenant_id = query.tenant_id.unwrap_or_else(|| principal.tenant_id());
    authorize(&state, &ctx, principal, READ, tenant_id).await?;

    let certificate = state.certificates.get(&ctx, tenant_id, &id_or_slug).await?;
    Ok(Json(certificate))
}
