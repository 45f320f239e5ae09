use chrono::NaiveTime;
use chrono_tz::Tz;
use vysion_core::{
    CoreError,
    config::{optional_var, reference_timezone_from_env},
};

const DEFAULT_ARCHIVE_AT: &str = "00:05";
const DEFAULT_POOL_SIZE: u32 = 5;

#[derive(thiserror::Error, Debug)]
pub enum WorkerError {
    #[error("{0} must be set")]
    MissingVar(&'static str),
    #[error("Invalid {key}: {reason}")]
    InvalidVar { key: &'static str, reason: String },
    #[error(transparent)]
    Core(#[from] CoreError),
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    pub redis_url: Option<String>,
    pub reference_tz: Tz,
    /// Local wall time of the daily run, in the reference timezone.
    pub archive_at: NaiveTime,
    pub run_on_start: bool,
    pub pool_size: u32,
}

pub fn parse_archive_at(raw: &str) -> Result<NaiveTime, WorkerError> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M").map_err(|e| WorkerError::InvalidVar {
        key: "ARCHIVE_AT",
        reason: format!("{:?} is not HH:MM ({})", raw, e),
    })
}

fn parse_flag(raw: &str) -> bool {
    matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self, WorkerError> {
        let database_url =
            optional_var("DATABASE_URL").ok_or(WorkerError::MissingVar("DATABASE_URL"))?;
        let archive_at = parse_archive_at(
            &optional_var("ARCHIVE_AT").unwrap_or_else(|| DEFAULT_ARCHIVE_AT.to_string()),
        )?;
        let pool_size = match optional_var("DATABASE_POOL_SIZE") {
            Some(raw) => raw.trim().parse().map_err(|_| WorkerError::InvalidVar {
                key: "DATABASE_POOL_SIZE",
                reason: format!("{:?} is not a positive integer", raw),
            })?,
            None => DEFAULT_POOL_SIZE,
        };

        Ok(Self {
            database_url,
            redis_url: optional_var("REDIS_URL"),
            reference_tz: reference_timezone_from_env()?,
            archive_at,
            run_on_start: optional_var("ARCHIVER_RUN_ON_START")
                .map(|v| parse_flag(&v))
                .unwrap_or(false),
            pool_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_archive_at() {
        assert_eq!(
            parse_archive_at("00:05").unwrap(),
            NaiveTime::from_hms_opt(0, 5, 0).unwrap()
        );
        assert_eq!(
            parse_archive_at(" 23:30 ").unwrap(),
            NaiveTime::from_hms_opt(23, 30, 0).unwrap()
        );
        assert!(parse_archive_at("midnight").is_err());
        assert!(parse_archive_at("25:00").is_err());
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("true"));
        assert!(parse_flag(" YES "));
        assert!(!parse_flag("false"));
        assert!(!parse_flag(""));
    }
}
