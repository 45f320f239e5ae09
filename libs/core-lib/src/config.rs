//! Settings shared by the gateway and the worker, sourced from the environment.

use chrono_tz::Tz;
use std::env;

use crate::CoreError;

pub const DEFAULT_REFERENCE_TIMEZONE: Tz = chrono_tz::Europe::Brussels;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        }
    }

    /// `APP_ENV`, defaulting to development.
    pub fn from_env() -> Self {
        env::var("APP_ENV")
            .map(|v| Self::parse(&v))
            .unwrap_or(Environment::Development)
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

pub fn parse_timezone(name: &str) -> Result<Tz, CoreError> {
    name.trim()
        .parse::<Tz>()
        .map_err(|e| CoreError::Configuration(format!("Invalid timezone {:?}: {}", name, e)))
}

/// `REFERENCE_TIMEZONE` as an IANA name, defaulting to Europe/Brussels.
pub fn reference_timezone_from_env() -> Result<Tz, CoreError> {
    match env::var("REFERENCE_TIMEZONE") {
        Ok(name) if !name.trim().is_empty() => parse_timezone(&name),
        _ => Ok(DEFAULT_REFERENCE_TIMEZONE),
    }
}

/// Optional, non-empty environment variable.
pub fn optional_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}
