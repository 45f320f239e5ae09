use axum::{
    Json,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};
use vysion_core::archive::{ArchivalRunResult, ArchiveError, Archiver};

use super::middleware::authorize_cron;
use crate::{ApiResult, AppState, api_error, ensure_persistence};

#[derive(Debug, Deserialize)]
pub struct CronParams {
    /// RFC 3339 instant to archive the previous civil day of. Defaults to now.
    pub as_of: Option<String>,
}

// GET /api/cron/z-reports
pub async fn handle_z_report_cron(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<CronParams>,
) -> ApiResult<Json<ArchivalRunResult>> {
    authorize_cron(
        state.config.environment,
        state.config.cron_secret.as_deref(),
        &headers,
    )
    .map_err(|e| api_error(StatusCode::UNAUTHORIZED, e.to_string()))?;

    let persistence = ensure_persistence(&state)?.clone();

    let as_of = match params.as_of.as_deref() {
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                api_error(
                    StatusCode::BAD_REQUEST,
                    format!("Invalid as_of {:?}: {}", raw, e),
                )
            })?,
        None => Utc::now(),
    };
    info!(as_of = %as_of, "Z-report archival triggered over HTTP");

    let archiver = Archiver::new(persistence, state.config.reference_tz)
        .with_publisher(state.event_bus.clone());

    match archiver.run(as_of).await {
        Ok(result) => Ok(Json(result)),
        Err(ArchiveError::OrderFetch { start, end, source }) => {
            error!(start = %start, end = %end, error = %source, "Archival aborted");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "Failed to fetch completed orders",
                    "window_start": start,
                    "window_end": end,
                })),
            ))
        }
        Err(e @ ArchiveError::Timezone(_)) => {
            error!("Archival aborted: {}", e);
            Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}
