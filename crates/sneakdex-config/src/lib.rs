//! Environment-variable configuration for the SneakDex crawler (§6).
//!
//! Loaded once at startup by the Orchestrator and validated before any
//! subsystem is constructed, following `riptide-config`'s env-loader
//! shape.

pub mod env;

pub use env::EnvError;

use sneakdex_types::SneakdexError;
use std::time::Duration;

/// Fully-resolved crawler configuration (§6).
#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    pub kafka_brokers: Vec<String>,
    pub kafka_topic_html: String,
    pub kafka_retry_max: u32,

    pub redis_host: String,
    pub redis_port: u16,
    pub redis_db: u32,
    pub redis_password: Option<String>,
    pub redis_timeout: Duration,
    pub redis_retry_max: u32,

    pub start_urls: Vec<String>,
    pub crawl_depth: u32,
    pub max_pages: u64,

    pub url_whitelist: Vec<String>,
    pub url_blacklist: Vec<String>,

    pub max_concurrency: usize,
    pub request_timeout: Duration,
    pub request_delay: Duration,
    pub max_content_size: usize,

    pub log_level: String,
    pub user_agent: String,
    pub enable_debug: bool,
    pub monitor_port: u16,
}

const DEFAULT_START_URLS: &str = "https://example.com";

impl CrawlerConfig {
    /// Loads configuration from the process environment, applying the
    /// defaults documented in §6.
    pub fn from_env() -> Result<Self, SneakdexError> {
        use env::EnvConfigLoader as L;

        let cfg = Self {
            kafka_brokers: L::get_list("KAFKA_BROKERS", "kafka:9092"),
            kafka_topic_html: L::get("KAFKA_TOPIC_HTML", "raw-html"),
            kafka_retry_max: L::get_u32("KAFKA_RETRY_MAX", 3)
                .map_err(|e| SneakdexError::Configuration(e.to_string()))?,

            redis_host: L::get("REDIS_HOST", "redis"),
            redis_port: L::get_u32("REDIS_PORT", 6379)
                .map_err(|e| SneakdexError::Configuration(e.to_string()))? as u16,
            redis_db: L::get_u32("REDIS_DB", 0)
                .map_err(|e| SneakdexError::Configuration(e.to_string()))?,
            redis_password: std::env::var("REDIS_PASSWORD").ok(),
            redis_timeout: L::get_duration("REDIS_TIMEOUT", "60s")
                .map_err(|e| SneakdexError::Configuration(e.to_string()))?,
            redis_retry_max: L::get_u32("REDIS_RETRY_MAX", 3)
                .map_err(|e| SneakdexError::Configuration(e.to_string()))?,

            start_urls: L::get_list("START_URLS", DEFAULT_START_URLS),
            crawl_depth: L::get_u32("CRAWL_DEPTH", 3)
                .map_err(|e| SneakdexError::Configuration(e.to_string()))?,
            max_pages: L::get_u64("MAX_PAGES", 10_000)
                .map_err(|e| SneakdexError::Configuration(e.to_string()))?,

            url_whitelist: L::get_list("URL_WHITELIST", ""),
            url_blacklist: L::get_list("URL_BLACKLIST", ""),

            max_concurrency: L::get_u32("MAX_CONCURRENCY", 50)
                .map_err(|e| SneakdexError::Configuration(e.to_string()))? as usize,
            request_timeout: L::get_duration("REQUEST_TIMEOUT", "30s")
                .map_err(|e| SneakdexError::Configuration(e.to_string()))?,
            request_delay: L::get_duration("REQUEST_DELAY", "100ms")
                .map_err(|e| SneakdexError::Configuration(e.to_string()))?,
            max_content_size: L::get_u64("MAX_CONTENT_SIZE", 2_621_440)
                .map_err(|e| SneakdexError::Configuration(e.to_string()))? as usize,

            log_level: L::get("LOG_LEVEL", "info"),
            user_agent: L::get("USER_AGENT", "SneakdexCrawler/1.0"),
            enable_debug: L::get_bool("ENABLE_DEBUG", false)
                .map_err(|e| SneakdexError::Configuration(e.to_string()))?,
            monitor_port: L::get_u32("MONITOR_PORT", 8080)
                .map_err(|e| SneakdexError::Configuration(e.to_string()))? as u16,
        };

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn redis_url(&self) -> String {
        match &self.redis_password {
            Some(password) => format!(
                "redis://:{password}@{}:{}/{}",
                self.redis_host, self.redis_port, self.redis_db
            ),
            None => format!("redis://{}:{}/{}", self.redis_host, self.redis_port, self.redis_db),
        }
    }

    /// Range validation per §6: ports in [1,65535]; `CrawlDepth >= 1`;
    /// `MaxPages` in [1, 1_000_000]; `MaxConcurrency` in [1, 1000]; all
    /// timeouts positive; `MaxContentSize > 0`.
    pub fn validate(&self) -> Result<(), SneakdexError> {
        if self.monitor_port == 0 {
            return Err(SneakdexError::Configuration(
                "MONITOR_PORT must be in [1, 65535]".into(),
            ));
        }
        if self.redis_port == 0 {
            return Err(SneakdexError::Configuration(
                "REDIS_PORT must be in [1, 65535]".into(),
            ));
        }
        if self.crawl_depth < 1 {
            return Err(SneakdexError::Configuration(
                "CRAWL_DEPTH must be >= 1".into(),
            ));
        }
        if self.max_pages < 1 || self.max_pages > 1_000_000 {
            return Err(SneakdexError::Configuration(
                "MAX_PAGES must be in [1, 1_000_000]".into(),
            ));
        }
        if self.max_concurrency < 1 || self.max_concurrency > 1000 {
            return Err(SneakdexError::Configuration(
                "MAX_CONCURRENCY must be in [1, 1000]".into(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(SneakdexError::Configuration(
                "REQUEST_TIMEOUT must be positive".into(),
            ));
        }
        if self.redis_timeout.is_zero() {
            return Err(SneakdexError::Configuration(
                "REDIS_TIMEOUT must be positive".into(),
            ));
        }
        if self.max_content_size == 0 {
            return Err(SneakdexError::Configuration(
                "MAX_CONTENT_SIZE must be > 0".into(),
            ));
        }
        if self.start_urls.is_empty() {
            return Err(SneakdexError::Configuration(
                "START_URLS must not be empty".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> CrawlerConfig {
        CrawlerConfig {
            kafka_brokers: vec!["kafka:9092".into()],
            kafka_topic_html: "raw-html".into(),
            kafka_retry_max: 3,
            redis_host: "redis".into(),
            redis_port: 6379,
            redis_db: 0,
            redis_password: None,
            redis_timeout: Duration::from_secs(60),
            redis_retry_max: 3,
            start_urls: vec!["https://a.test".into()],
            crawl_depth: 3,
            max_pages: 10_000,
            url_whitelist: vec![],
            url_blacklist: vec![],
            max_concurrency: 50,
            request_timeout: Duration::from_secs(30),
            request_delay: Duration::from_millis(100),
            max_content_size: 2_621_440,
            log_level: "info".into(),
            user_agent: "SneakdexCrawler/1.0".into(),
            enable_debug: false,
            monitor_port: 8080,
        }
    }

    #[test]
    fn default_shaped_config_validates() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn rejects_zero_crawl_depth() {
        let mut cfg = base_config();
        cfg.crawl_depth = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_oversized_max_pages() {
        let mut cfg = base_config();
        cfg.max_pages = 2_000_000;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_excess_concurrency() {
        let mut cfg = base_config();
        cfg.max_concurrency = 5000;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn redis_url_includes_password_when_present() {
        let mut cfg = base_config();
        cfg.redis_password = Some("secret".into());
        assert_eq!(cfg.redis_url(), "redis://:secret@redis:6379/0");
    }

    #[test]
    fn redis_url_without_password() {
        let cfg = base_config();
        assert_eq!(cfg.redis_url(), "redis://redis:6379/0");
    }
}
