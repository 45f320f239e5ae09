use crate::{ApiResult, AppState, ensure_persistence, map_core_error};
use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use vysion_core::{CoreError, TenantRepository, domain::tenant::TenantSettings};

pub struct SaveSettingsHandler {
    tenant_repository: Arc<dyn TenantRepository>,
}

impl SaveSettingsHandler {
    pub fn new(tenant_repository: Arc<dyn TenantRepository>) -> Self {
        Self { tenant_repository }
    }

    /// Validates the VAT rate here so the archiver never meets a rate
    /// it has no bracket for.
    pub async fn handle(
        &self,
        tenant_slug: &str,
        command: SaveSettingsDto,
    ) -> Result<TenantSettings, CoreError> {
        let settings = TenantSettings::validated(
            tenant_slug,
            command.vat_percentage,
            &command.business_name,
            command.address.as_deref().unwrap_or_default(),
            command.vat_number.as_deref(),
        )?;
        self.tenant_repository.save_settings(&settings).await?;
        info!(tenant = %tenant_slug, vat = settings.vat_percentage, "Tenant settings saved");
        Ok(settings)
    }
}

#[derive(Deserialize, Debug)]
pub struct SaveSettingsDto {
    pub vat_percentage: i32,
    pub business_name: String,
    pub address: Option<String>,
    pub vat_number: Option<String>,
}

pub async fn handle_save_settings_request(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    Json(payload): Json<SaveSettingsDto>,
) -> ApiResult<impl IntoResponse> {
    let persistence = ensure_persistence(&state)?;
    let handler = SaveSettingsHandler::new(persistence.tenants.clone());
    let settings = handler
        .handle(&tenant, payload)
        .await
        .map_err(map_core_error)?;
    Ok(Json(settings))
}
