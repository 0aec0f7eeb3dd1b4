//! Route handlers.

pub mod api_keys;
pub mod certificates;
pub mod health;
pub mod session;
pub mod users;

use kiln_auth::{Principal, Requirement, ResolvedPrincipal};
use kiln_core::models::claim::ClaimPattern;
use kiln_core::repository::Pagination;
use kiln_core::{AppContext, KilnError, KilnResult};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::state::AppState;

const DEFAULT_PAGE_SIZE: u64 = 50;
const MAX_PAGE_SIZE: u64 = 500;

/// Deny unless `principal` holds `claim` in `tenant_id`. Returns the
/// resolved principal for handlers that check more than one thing.
pub(crate) async fn authorize(
    state: &AppState,
    ctx: &AppContext,
    principal: Principal,
    claim: &str,
    tenant_id: Uuid,
) -> KilnResult<ResolvedPrincipal> {
    let requirement = Requirement::new(ClaimPattern::parse(claim)?).in_tenant(tenant_id);
    let resolved = state.authorizer.resolve(ctx, principal).await?;
    let decision = resolved.decide(&requirement);
    debug!(
        principal = %principal,
        required = claim,
        allowed = decision.is_allowed(),
        "Authorization decision"
    );
    decision.ensure(claim)?;
    Ok(resolved)
}

/// One page of a listing.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
}

/// 1-based `page` and `pageSize` to an offset window.
pub(crate) fn pagination(page: Option<u64>, page_size: Option<u64>) -> KilnResult<(u64, u64, Pagination)> {
    let page = page.unwrap_or(1);
    let page_size = page_size.unwrap_or(DEFAULT_PAGE_SIZE);
    if page == 0 {
        return Err(KilnError::validation("page starts at 1"));
    }
    if page_size == 0 || page_size > MAX_PAGE_SIZE {
        return Err(KilnError::validation(format!(
            "pageSize must be between 1 and {MAX_PAGE_SIZE}"
        )));
    }
    Ok((
        page,
        page_size,
        Pagination {
            offset: (page - 1) * page_size,
            limit: page_size,
        },
    ))
}
