use axum::{
    Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;
use vysion_core::CoreError;

use crate::{ApiResult, AppState, ensure_persistence, map_core_error};

#[derive(Debug, Deserialize)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct StorefrontPath {
    pub tenant: String,
    pub page: Option<String>,
}

// GET /api/admin/{tenant}/z-reports?from&to
pub async fn handle_list_z_reports(
    State(app_state): State<AppState>,
    Path(tenant): Path<String>,
    Query(range): Query<DateRange>,
) -> ApiResult<impl IntoResponse> {
    let persistence = ensure_persistence(&app_state)?;
    if persistence
        .tenants
        .find_by_slug(&tenant)
        .await
        .map_err(map_core_error)?
        .is_none()
    {
        return Err(map_core_error(CoreError::NotFound(format!("Tenant {}", tenant))));
    }
    let reports = persistence
        .z_reports
        .list_for_tenant(&tenant, range.from, range.to)
        .await
        .map_err(map_core_error)?;
    debug!(tenant = %tenant, count = reports.len(), "Listed Z-reports");
    Ok(Json(json!({ "data": reports })))
}

// GET /shop/{tenant} and /shop/{tenant}/{*page}
pub async fn handle_storefront(
    State(app_state): State<AppState>,
    Path(path): Path<StorefrontPath>,
) -> ApiResult<impl IntoResponse> {
    let persistence = ensure_persistence(&app_state)?;
    let tenant = persistence
        .tenants
        .find_by_slug(&path.tenant)
        .await
        .map_err(map_core_error)?
        .filter(|t| t.is_active())
        .ok_or_else(|| map_core_error(CoreError::NotFound(format!("Storefront {}", path.tenant))))?;

    let page = format!("/{}", path.page.unwrap_or_default());
    Ok(Json(json!({
        "tenant": tenant.slug,
        "name": tenant.name,
        "page": page,
    })))
}
