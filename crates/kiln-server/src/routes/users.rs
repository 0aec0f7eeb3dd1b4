//! `/v1/tenants/:tenant_id/users`

use std::sync::Arc;

use axum::Json;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use kiln_auth::Principal;
use kiln_auth::password::check_policy;
use kiln_core::KilnError;
use kiln_core::models::user::{CreateUser, User, UserStatus};
use kiln_core::repository::{RoleRepository, Store, TenantRepository, UserRepository};
use serde::Deserialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use super::authorize;
use crate::error::ApiError;
use crate::state::AppState;

const CREATE: &str = "identity::users::create";
const DEFAULT_ROLE: &str = "user";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
    pub email: String,
    #[serde(default)]
    pub name: String,
    /// Role slug, e.g. `manager`.
    #[serde(default)]
    pub role: Option<String>,
}

fn invalid(field: &str, message: &str) -> KilnError {
    KilnError::Validation {
        message: message.to_string(),
        details: Some(json!({ "field": field })),
    }
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(tenant_id): Path<Uuid>,
    Json(request): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let ctx = state.context();
    let resolved = authorize(&state, &ctx, principal, CREATE, tenant_id).await?;

    let username = request.username.trim().to_string();
    if username.is_empty() {
        return Err(invalid("username", "username must not be empty").into());
    }
    let email = request.email.trim().to_string();
    if !email.contains('@') {
        return Err(invalid("email", "email must be an address").into());
    }
    check_policy(&request.password, state.auth.config().min_password_length)?;

    ctx.run(state.store.tenants().get_by_id(tenant_id)).await?;
    let slug = request.role.as_deref().unwrap_or(DEFAULT_ROLE);
    let role = match ctx.run(state.store.roles().get_by_slug(slug)).await {
        Ok(role) => role,
        Err(err) if err.is_not_found() => {
            return Err(invalid("role", &format!("unknown role '{slug}'")).into());
        }
        Err(err) => return Err(err.into()),
    };
    if role.grants_superuser() && !resolved.is_superuser() {
        return Err(KilnError::AuthorizationDenied {
            reason: "only superusers may grant the superuser role".into(),
        }
        .into());
    }

    let name = if request.name.trim().is_empty() {
        username.clone()
    } else {
        request.name.trim().to_string()
    };
    let user = ctx
        .run(state.store.users().create(CreateUser {
            id: None,
            tenant_id,
            username,
            name,
            email,
            password: request.password,
            roles: vec![role.id],
            claims: Vec::new(),
            status: Some(UserStatus::Active),
            metadata: None,
            created_by: principal.actor_id(),
        }))
        .await?;

    info!(
        tenant_id = %tenant_id,
        user_id = %user.id,
        role = %role.slug,
        created_by = %principal,
        "User created"
    );
    Ok((StatusCode::CREATED, Json(user)))
}
