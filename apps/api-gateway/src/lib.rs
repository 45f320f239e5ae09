use axum::{
    Json, Router,
    middleware,
    response::IntoResponse,
    routing::{get, patch, post, put},
};
use http::{StatusCode, Uri};
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, warn};
use vysion_core::{CoreError, EventPublisher, Persistence};

pub mod application;
pub mod config;

use application::{
    commands::{
        create_order::handle_create_order_request, create_tenant::handle_create_tenant_request,
        save_settings::handle_save_settings_request,
        update_order_status::handle_update_order_status_request,
    },
    cron::handle_z_report_cron,
    middleware::{admin_key_auth, tenant_routing},
    query::{handle_list_z_reports, handle_storefront},
};
use config::GatewayConfig;

/// Error half of every handler result: a status and a `{"error": ...}` body.
pub type ApiError = (StatusCode, Json<Value>);
pub type ApiResult<T> = Result<T, ApiError>;

pub fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(json!({ "error": message.into() })))
}

// Holds shared dependencies
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    /// `None` when no database is configured; store-backed routes answer 503.
    pub persistence: Option<Persistence>,
    pub event_bus: Arc<dyn EventPublisher>,
}

/// Build the gateway. Tenant routing wraps the whole router so a rewritten
/// path is what the inner routes match against.
pub fn create_app(app_state: AppState) -> Router {
    let admin_routes = Router::new()
        .route("/api/tenants", post(handle_create_tenant_request))
        .route(
            "/api/admin/{tenant}/settings",
            put(handle_save_settings_request),
        )
        .route(
            "/api/admin/{tenant}/orders/{order_id}/status",
            patch(handle_update_order_status_request),
        )
        .route("/api/admin/{tenant}/z-reports", get(handle_list_z_reports))
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            admin_key_auth,
        ));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let routes = Router::new()
        .route("/api/health", get(health))
        .route("/api/cron/z-reports", get(handle_z_report_cron))
        .route("/api/shop/{tenant}/orders", post(handle_create_order_request))
        .route("/shop/{tenant}", get(handle_storefront))
        .route("/shop/{tenant}/{*page}", get(handle_storefront))
        .merge(admin_routes)
        .fallback(not_found)
        .layer(cors)
        .with_state(app_state.clone());

    Router::new()
        .fallback_service(routes)
        .layer(middleware::from_fn_with_state(app_state, tenant_routing))
}

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn not_found(uri: Uri) -> ApiError {
    api_error(StatusCode::NOT_FOUND, format!("No route for {}", uri.path()))
}

/// The store, or 503 when the gateway runs without one.
pub fn ensure_persistence(state: &AppState) -> ApiResult<&Persistence> {
    state.persistence.as_ref().ok_or_else(|| {
        warn!("Store-backed route called without a configured database");
        api_error(StatusCode::SERVICE_UNAVAILABLE, "Store not configured")
    })
}

pub fn map_core_error(err: CoreError) -> ApiError {
    let status = match &err {
        CoreError::NotFound(_) => StatusCode::NOT_FOUND,
        CoreError::Validation(_) => StatusCode::BAD_REQUEST,
        CoreError::AlreadyExists(_) | CoreError::Conflict(_) => StatusCode::CONFLICT,
        CoreError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        CoreError::Configuration(_) => StatusCode::SERVICE_UNAVAILABLE,
        CoreError::Serialization(_) | CoreError::Infrastructure(_) | CoreError::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    if status.is_server_error() {
        error!("CoreError occurred: {:?}", err);
    } else {
        warn!("Request rejected: {}", err);
    }
    api_error(status, err.to_string())
}
