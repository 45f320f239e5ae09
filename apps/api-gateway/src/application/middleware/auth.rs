use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode, header},
    middleware::Next,
    response::Response,
};
use tracing::{error, info, warn};
use vysion_core::config::Environment;

use crate::{ApiError, AppState, api_error};

/// The token of an `Authorization: Bearer <token>` header, if present.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Middleware guarding platform administration routes with the static admin key.
pub async fn admin_key_auth(
    State(app_state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected) = app_state.config.admin_api_key.as_deref() else {
        warn!("Admin route called but ADMIN_API_KEY is not configured");
        return Err(api_error(StatusCode::UNAUTHORIZED, "Unauthorized"));
    };

    match bearer_token(req.headers()) {
        Some(key) if key == expected => Ok(next.run(req).await),
        Some(_) => {
            warn!("Admin authentication failed: wrong key");
            Err(api_error(StatusCode::UNAUTHORIZED, "Unauthorized"))
        }
        None => {
            warn!("Admin authentication failed: missing or malformed Authorization header");
            Err(api_error(StatusCode::UNAUTHORIZED, "Unauthorized"))
        }
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum CronAuthError {
    #[error("No cron secret is configured")]
    SecretNotConfigured,
    #[error("Missing or invalid cron credentials")]
    InvalidCredentials,
}

/// Gate for the archival trigger. Production requires the configured secret
/// and refuses everything when none is set; other environments let every
/// call through.
pub fn authorize_cron(
    environment: Environment,
    secret: Option<&str>,
    headers: &HeaderMap,
) -> Result<(), CronAuthError> {
    if !environment.is_production() {
        warn!("Cron authorization skipped outside production");
        return Ok(());
    }
    let Some(secret) = secret else {
        error!("CRON_SECRET is not configured in production, refusing cron call");
        return Err(CronAuthError::SecretNotConfigured);
    };
    match bearer_token(headers) {
        Some(token) if token == secret => {
            info!("Cron call authorized");
            Ok(())
        }
        _ => {
            warn!("Cron call rejected: invalid credentials");
            Err(CronAuthError::InvalidCredentials)
        }
    }
}
