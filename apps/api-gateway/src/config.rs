use chrono_tz::Tz;
use std::net::SocketAddr;
use vysion_core::config::{
    DEFAULT_REFERENCE_TIMEZONE, Environment, optional_var, reference_timezone_from_env,
};
use vysion_core::routing::RoutingConfig;

use crate::application::ApplicationError;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

/// Gateway settings, read once at startup.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub environment: Environment,
    pub bind_addr: SocketAddr,
    /// Shared secret the scheduler presents on `/api/cron/z-reports`.
    pub cron_secret: Option<String>,
    /// Bearer key for `/api/tenants` and `/api/admin/*`. No key, no access.
    pub admin_api_key: Option<String>,
    pub reference_tz: Tz,
    pub routing: RoutingConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            cron_secret: None,
            admin_api_key: None,
            reference_tz: DEFAULT_REFERENCE_TIMEZONE,
            routing: RoutingConfig::default(),
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ApplicationError> {
        let raw_addr = optional_var("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = raw_addr.parse::<SocketAddr>().map_err(|e| {
            ApplicationError::Configuration(format!("Invalid BIND_ADDR {:?}: {}", raw_addr, e))
        })?;

        Ok(Self {
            environment: Environment::from_env(),
            bind_addr,
            cron_secret: optional_var("CRON_SECRET"),
            admin_api_key: optional_var("ADMIN_API_KEY"),
            reference_tz: reference_timezone_from_env()?,
            routing: RoutingConfig::default(),
        })
    }
}
