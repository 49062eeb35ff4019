//! Generic environment variable loader with type conversion, used to
//! build [`crate::CrawlerConfig`] (§6).

use std::env;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EnvError {
    #[error("environment variable not found: {var}")]
    NotFound { var: String },

    #[error("invalid value for {var}: {reason}")]
    InvalidValue { var: String, reason: String },
}

/// Reads environment variables with a fallback default and basic type
/// conversions (int, bool, duration, comma-separated list).
pub struct EnvConfigLoader;

impl EnvConfigLoader {
    pub fn get(var: &str, default: &str) -> String {
        env::var(var).unwrap_or_else(|_| default.to_string())
    }

    pub fn get_required(var: &str) -> Result<String, EnvError> {
        env::var(var).map_err(|_| EnvError::NotFound {
            var: var.to_string(),
        })
    }

    pub fn get_u32(var: &str, default: u32) -> Result<u32, EnvError> {
        match env::var(var) {
            Ok(v) => v.parse().map_err(|_| EnvError::InvalidValue {
                var: var.to_string(),
                reason: format!("cannot parse '{v}' as u32"),
            }),
            Err(_) => Ok(default),
        }
    }

    pub fn get_u64(var: &str, default: u64) -> Result<u64, EnvError> {
        match env::var(var) {
            Ok(v) => v.parse().map_err(|_| EnvError::InvalidValue {
                var: var.to_string(),
                reason: format!("cannot parse '{v}' as u64"),
            }),
            Err(_) => Ok(default),
        }
    }

    pub fn get_bool(var: &str, default: bool) -> Result<bool, EnvError> {
        match env::var(var) {
            Ok(v) => match v.to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Ok(true),
                "false" | "0" | "no" | "off" => Ok(false),
                other => Err(EnvError::InvalidValue {
                    var: var.to_string(),
                    reason: format!("invalid boolean value: {other}"),
                }),
            },
            Err(_) => Ok(default),
        }
    }

    pub fn get_duration(var: &str, default: &str) -> Result<Duration, EnvError> {
        let raw = env::var(var).unwrap_or_else(|_| default.to_string());
        parse_duration(&raw).map_err(|reason| EnvError::InvalidValue {
            var: var.to_string(),
            reason,
        })
    }

    pub fn get_list(var: &str, default: &str) -> Vec<String> {
        let raw = env::var(var).unwrap_or_else(|_| default.to_string());
        raw.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

/// Parses `"30s"`, `"5m"`, `"1h"`, `"500ms"`, or a bare integer
/// (interpreted as seconds).
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim().to_lowercase();

    if let Some(num) = s.strip_suffix("ms") {
        let n: u64 = num
            .parse()
            .map_err(|e| format!("invalid milliseconds: {e}"))?;
        Ok(Duration::from_millis(n))
    } else if let Some(num) = s.strip_suffix('s') {
        let n: u64 = num.parse().map_err(|e| format!("invalid seconds: {e}"))?;
        Ok(Duration::from_secs(n))
    } else if let Some(num) = s.strip_suffix('m') {
        let n: u64 = num.parse().map_err(|e| format!("invalid minutes: {e}"))?;
        Ok(Duration::from_secs(n * 60))
    } else if let Some(num) = s.strip_suffix('h') {
        let n: u64 = num.parse().map_err(|e| format!("invalid hours: {e}"))?;
        Ok(Duration::from_secs(n * 3600))
    } else if let Ok(n) = s.parse::<u64>() {
        Ok(Duration::from_secs(n))
    } else {
        Err(format!("invalid duration format: {s}"))
    }
}
