use vysion_core::CoreError;

pub mod commands;
pub mod cron;
pub mod middleware;
pub mod query;

/// Errors that stop the gateway from starting.
#[derive(thiserror::Error, Debug)]
pub enum ApplicationError {
    #[error("Core Error: {0}")]
    Core(#[from] CoreError),

    #[error("Configuration Error: {0}")]
    Configuration(String),

    #[error("Startup Error: {0}")]
    Startup(String),
}
