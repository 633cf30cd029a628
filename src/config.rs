//! Process configuration, read once at startup.
//!
//! Values come from the environment (after an optional `.env` file is loaded
//! with dotenvy) and are handed explicitly to the token issuer, the access
//! gate and the storage layer. Nothing in the crate reads the environment
//! after this point.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

/// Default lifetime of a session token: two hours.
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 2 * 60 * 60;
/// Upper bound on the session token lifetime: thirty days.
pub const MAX_TOKEN_TTL_SECS: u64 = 30 * 24 * 60 * 60;
pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_DATA_DIR: &str = "skm_data";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Log output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Compact,
    Json,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub format: LogFormat,
    /// Env-filter directives, taken from `RUST_LOG`.
    pub filter: String,
    /// Directory for daily-rolling log files; stdout only when `None`.
    pub dir: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
            filter: "info".to_string(),
            dir: None,
        }
    }
}

/// Everything the server needs, constructed once and passed down.
#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub data_dir: PathBuf,
    /// Symmetric HS256 secret. Never logged.
    pub jwt_secret: String,
    pub token_ttl_secs: u64,
    pub bcrypt_cost: u32,
    /// `*` or a comma-separated origin list.
    pub cors_allowed_origins: String,
    pub log: LogConfig,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("data_dir", &self.data_dir)
            .field("jwt_secret", &"<redacted>")
            .field("token_ttl_secs", &self.token_ttl_secs)
            .field("bcrypt_cost", &self.bcrypt_cost)
            .field("cors_allowed_origins", &self.cors_allowed_origins)
            .field("log", &self.log)
            .finish()
    }
}

impl AppConfig {
    /// Load `.env` (if present) and build the configuration from the process
    /// environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        // A missing .env file is normal in production.
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. `from_env` is the production entry
    /// point; tests pass a map.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let jwt_secret = lookup("JWT_SECRET")
            .filter(|s| !s.trim().is_empty())
            .ok_or(ConfigError::Missing("JWT_SECRET"))?;

        let mut bind_addr: SocketAddr = parse_var(&lookup, "BIND_ADDR")?
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)));
        if let Some(port) = parse_var::<u16, _>(&lookup, "PORT")? {
            bind_addr.set_port(port);
        }

        let token_ttl_secs = parse_var(&lookup, "TOKEN_TTL_SECS")?.unwrap_or(DEFAULT_TOKEN_TTL_SECS);
        if !(1..=MAX_TOKEN_TTL_SECS).contains(&token_ttl_secs) {
            return Err(ConfigError::Invalid {
                name: "TOKEN_TTL_SECS",
                reason: format!("must be between 1 and {MAX_TOKEN_TTL_SECS}"),
            });
        }

        let bcrypt_cost = parse_var(&lookup, "BCRYPT_COST")?.unwrap_or(bcrypt::DEFAULT_COST);
        if !(4..=31).contains(&bcrypt_cost) {
            return Err(ConfigError::Invalid {
                name: "BCRYPT_COST",
                reason: format!("{bcrypt_cost} is outside 4..=31"),
            });
        }

        let format = match lookup("LOG_FORMAT").as_deref() {
            None | Some("pretty") => LogFormat::Pretty,
            Some("compact") => LogFormat::Compact,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "LOG_FORMAT",
                    reason: format!("unknown format {other:?}"),
                })
            }
        };

        Ok(Self {
            bind_addr,
            data_dir: lookup("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
            jwt_secret,
            token_ttl_secs,
            bcrypt_cost,
            cors_allowed_origins: lookup("CORS_ALLOWED_ORIGINS").unwrap_or_else(|| "*".to_string()),
            log: LogConfig {
                format,
                filter: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
                dir: lookup("LOG_DIR").map(PathBuf::from),
            },
        })
    }
}

fn parse_var<T, F>(lookup: &F, name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::Invalid {
                name,
                reason: e.to_string(),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_with_only_secret() {
        let config = AppConfig::from_lookup(lookup_from(&[("JWT_SECRET", "s3cret")])).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:5000".parse::<SocketAddr>().unwrap());
        assert_eq!(config.token_ttl_secs, 7200);
        assert_eq!(config.bcrypt_cost, bcrypt::DEFAULT_COST);
        assert_eq!(config.cors_allowed_origins, "*");
        assert_eq!(config.log.format, LogFormat::Pretty);
        assert!(config.log.dir.is_none());
    }

    #[test]
    fn test_secret_is_required() {
        let err = AppConfig::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("JWT_SECRET")));

        let err = AppConfig::from_lookup(lookup_from(&[("JWT_SECRET", "  ")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("JWT_SECRET")));
    }

    #[test]
    fn test_port_overrides_bind_addr_port() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("JWT_SECRET", "x"),
            ("BIND_ADDR", "127.0.0.1:8080"),
            ("PORT", "9000"),
        ]))
        .unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:9000".parse::<SocketAddr>().unwrap());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let err = AppConfig::from_lookup(lookup_from(&[("JWT_SECRET", "x"), ("PORT", "http")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "PORT", .. }));

        let err = AppConfig::from_lookup(lookup_from(&[("JWT_SECRET", "x"), ("BCRYPT_COST", "2")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "BCRYPT_COST", .. }));

        let err = AppConfig::from_lookup(lookup_from(&[("JWT_SECRET", "x"), ("LOG_FORMAT", "xml")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "LOG_FORMAT", .. }));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = AppConfig::from_lookup(lookup_from(&[("JWT_SECRET", "topsecret")])).unwrap();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("topsecret"));
    }
}
