//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration files (config/default.toml, then config/local.toml)
//! 3. Environment variables (override)

use std::time::Duration;

use serde::Deserialize;

use crate::session::ReconcilePolicy;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub authority: AuthorityConfig,
    pub session: SessionConfig,
    pub logging: LoggingConfig,
}

/// Remote identity authority configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorityConfig {
    /// Backend base URL (e.g., "https://social.example.com")
    pub base_url: String,
    /// Path of the current-identity endpoint (default: "/api/auth/me")
    #[serde(default = "default_identity_path")]
    pub identity_path: String,
    /// Path of the logout endpoint (default: "/api/auth/logout")
    #[serde(default = "default_logout_path")]
    pub logout_path: String,
    /// Upper bound for a single identity check in milliseconds (default: 10000)
    pub timeout_ms: u64,
}

impl AuthorityConfig {
    /// Bounded wait applied to every authority request
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// True when a non-local authority is reached without TLS
    pub fn is_plain_http_remote(&self) -> bool {
        url::Url::parse(&self.base_url)
            .map(|url| url.scheme() == "http" && !is_local_host(&url))
            .unwrap_or(false)
    }
}

fn default_identity_path() -> String {
    "/api/auth/me".to_string()
}

fn default_logout_path() -> String {
    "/api/auth/logout".to_string()
}

/// Session behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// What `reconcile()` does when already authenticated
    #[serde(default)]
    pub policy: ReconcilePolicy,
    /// Background recheck interval in seconds (0 disables it)
    pub recheck_interval_seconds: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl LoggingConfig {
    /// Default filter directive when `RUST_LOG` is not set
    pub fn filter_directive(&self) -> String {
        format!("authsession={}", self.level.to_ascii_lowercase())
    }

    pub fn is_json(&self) -> bool {
        self.format == "json"
    }
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (AUTHSESSION_*)
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            .set_default("authority.base_url", "http://127.0.0.1:8000")?
            .set_default("authority.identity_path", "/api/auth/me")?
            .set_default("authority.logout_path", "/api/auth/logout")?
            .set_default("authority.timeout_ms", 10_000)?
            .set_default("session.policy", "trust_authenticated")?
            .set_default("session.recheck_interval_seconds", 0)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix("AUTHSESSION")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let app_config: Self = config.try_deserialize()?;
        app_config.validate()?;
        Ok(app_config)
    }

    fn validate(&self) -> Result<(), crate::error::AppError> {
        use crate::error::AppError;

        let base = url::Url::parse(&self.authority.base_url)?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(AppError::Config(format!(
                "authority.base_url must use http or https, got {}",
                base.scheme()
            )));
        }

        for (key, path) in [
            ("authority.identity_path", &self.authority.identity_path),
            ("authority.logout_path", &self.authority.logout_path),
        ] {
            if !path.starts_with('/') {
                return Err(AppError::Config(format!("{key} must start with '/'")));
            }
        }

        if self.authority.timeout_ms == 0 {
            return Err(AppError::Config(
                "authority.timeout_ms must be greater than 0".to_string(),
            ));
        }

        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(AppError::Config(format!(
                "logging.format must be \"pretty\" or \"json\", got {:?}",
                self.logging.format
            )));
        }

        if !matches!(
            self.logging.level.to_ascii_lowercase().as_str(),
            "trace" | "debug" | "info" | "warn" | "error"
        ) {
            return Err(AppError::Config(format!(
                "logging.level must be one of trace, debug, info, warn, error, got {:?}",
                self.logging.level
            )));
        }

        Ok(())
    }
}

fn is_local_host(url: &url::Url) -> bool {
    match url.host() {
        Some(url::Host::Domain(domain)) => {
            domain == "localhost" || domain.ends_with(".localhost")
        }
        Some(url::Host::Ipv4(ip)) => ip.is_loopback() || ip.is_unspecified(),
        Some(url::Host::Ipv6(ip)) => ip.is_loopback() || ip.is_unspecified(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> AppConfig {
        AppConfig {
            authority: AuthorityConfig {
                base_url: "http://localhost:8000".to_string(),
                identity_path: default_identity_path(),
                logout_path: default_logout_path(),
                timeout_ms: 10_000,
            },
            session: SessionConfig {
                policy: ReconcilePolicy::TrustAuthenticated,
                recheck_interval_seconds: 0,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }

    #[test]
    fn validate_accepts_http_on_localhost() {
        let config = valid_config();
        assert!(config.validate().is_ok());
        assert_eq!(config.authority.timeout(), Duration::from_secs(10));
    }

    #[test]
    fn validate_rejects_zero_timeout() {
        let mut config = valid_config();
        config.authority.timeout_ms = 0;

        let error = config
            .validate()
            .expect_err("zero timeout would leave checks unbounded");
        assert!(matches!(
            error,
            crate::error::AppError::Config(message)
                if message.contains("authority.timeout_ms")
        ));
    }

    #[test]
    fn validate_rejects_non_http_scheme() {
        let mut config = valid_config();
        config.authority.base_url = "ftp://social.example.com".to_string();

        let error = config.validate().expect_err("ftp is not an authority");
        assert!(matches!(
            error,
            crate::error::AppError::Config(message) if message.contains("http or https")
        ));
    }

    #[test]
    fn validate_rejects_unparsable_base_url() {
        let mut config = valid_config();
        config.authority.base_url = "not a url".to_string();

        assert!(matches!(
            config.validate(),
            Err(crate::error::AppError::InvalidUrl(_))
        ));
    }

    #[test]
    fn validate_rejects_relative_endpoint_path() {
        let mut config = valid_config();
        config.authority.identity_path = "api/auth/me".to_string();

        let error = config.validate().expect_err("paths must be absolute");
        assert!(matches!(
            error,
            crate::error::AppError::Config(message)
                if message.contains("authority.identity_path")
        ));
    }

    #[test]
    fn validate_rejects_unknown_log_level() {
        let mut config = valid_config();
        config.logging.level = "verbose".to_string();

        let error = config.validate().expect_err("unknown level");
        assert!(matches!(
            error,
            crate::error::AppError::Config(message) if message.contains("logging.level")
        ));
    }

    #[test]
    fn logging_settings_drive_subscriber() {
        let mut config = valid_config();
        config.logging.level = "DEBUG".to_string();
        config.logging.format = "json".to_string();

        assert!(config.validate().is_ok());
        assert_eq!(config.logging.filter_directive(), "authsession=debug");
        assert!(config.logging.is_json());
    }

    #[test]
    fn plain_http_is_flagged_only_for_remote_hosts() {
        let mut config = valid_config();
        assert!(!config.authority.is_plain_http_remote());

        config.authority.base_url = "http://social.example.com".to_string();
        assert!(config.authority.is_plain_http_remote());

        config.authority.base_url = "https://social.example.com".to_string();
        assert!(!config.authority.is_plain_http_remote());
    }

    #[test]
    fn validate_rejects_unknown_log_format() {
        let mut config = valid_config();
        config.logging.format = "xml".to_string();

        assert!(config.validate().is_err());
    }

    #[test]
    fn policy_deserializes_from_snake_case() {
        let policy: ReconcilePolicy = serde_json::from_str("\"revalidate\"").unwrap();
        assert_eq!(policy, ReconcilePolicy::Revalidate);
    }
}
