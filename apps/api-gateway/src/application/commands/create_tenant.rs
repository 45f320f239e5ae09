use crate::{ApiResult, AppState, ensure_persistence, map_core_error};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use vysion_core::{CoreError, TenantRepository, domain::tenant::Tenant};

pub struct CreateTenantHandler {
    tenant_repository: Arc<dyn TenantRepository>,
}

impl CreateTenantHandler {
    pub fn new(tenant_repository: Arc<dyn TenantRepository>) -> Self {
        Self { tenant_repository }
    }

    /// Signup: claim a slug. The slug becomes the tenant's subdomain.
    pub async fn handle(&self, command: CreateTenantDto) -> Result<Tenant, CoreError> {
        let tenant = Tenant::new(&command.slug, &command.name, Utc::now())?;
        self.tenant_repository.create(&tenant).await?;
        info!(tenant = %tenant.slug, "Tenant created");
        Ok(tenant)
    }
}

#[derive(Deserialize, Debug)]
pub struct CreateTenantDto {
    pub slug: String,
    pub name: String,
}

// --- Axum Route Handler ---

pub async fn handle_create_tenant_request(
    State(state): State<AppState>,
    Json(payload): Json<CreateTenantDto>,
) -> ApiResult<impl IntoResponse> {
    let persistence = ensure_persistence(&state)?;
    let handler = CreateTenantHandler::new(persistence.tenants.clone());
    let tenant = handler.handle(payload).await.map_err(map_core_error)?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "slug": tenant.slug,
            "name": tenant.name,
            "status": tenant.status.as_str(),
        })),
    ))
}
