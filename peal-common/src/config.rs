//! Configuration loading
//!
//! Resolution priority (highest first):
//! 1. Command-line arguments (applied by the binary)
//! 2. Environment variables (`PEAL_*`)
//! 3. TOML config file
//! 4. Compiled defaults
//!
//! A missing TOML file is not an error: defaults are used and a warning is
//! logged. Secrets (the login password, the database URL and its host, name,
//! role and password components) are wrapped in [`Secret`] so they never show
//! up in `Debug` output or logs.

use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use url::Url;

use crate::{Error, Result};

/// Environment variable naming an explicit config file
pub const ENV_CONFIG: &str = "PEAL_CONFIG";
pub const ENV_BIND: &str = "PEAL_BIND";
pub const ENV_PORT: &str = "PEAL_PORT";
/// Boolean-like flag selecting the relational backend
pub const ENV_USE_RELATIONAL: &str = "PEAL_USE_RELATIONAL";
pub const ENV_DATA_FILE: &str = "PEAL_DATA_FILE";
pub const ENV_DATABASE_URL: &str = "PEAL_DATABASE_URL";
pub const ENV_PASSWORD: &str = "PEAL_PASSWORD";
pub const ENV_SESSION_TTL_MINUTES: &str = "PEAL_SESSION_TTL_MINUTES";

// Remote database components, used when no full URL is given
pub const ENV_DB_HOST: &str = "PEAL_DB_HOST";
pub const ENV_DB_PORT: &str = "PEAL_DB_PORT";
pub const ENV_DB_NAME: &str = "PEAL_DB_NAME";
pub const ENV_DB_ROLE: &str = "PEAL_DB_ROLE";
pub const ENV_DB_PASSWORD: &str = "PEAL_DB_PASSWORD";
pub const ENV_DB_SSL_MODE: &str = "PEAL_DB_SSL_MODE";

/// A configured secret; `Debug` never prints the value
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

/// Complete application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 5780,
        }
    }
}

/// Backend selection and backend parameters
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// `false` selects the JSON file backend
    pub use_relational: bool,
    pub json_path: PathBuf,
    /// `sqlite:` or `postgres://` URL; takes precedence over the components below
    pub database_url: Option<Secret>,
    pub database_host: Option<Secret>,
    pub database_port: Option<u16>,
    pub database_name: Option<Secret>,
    pub database_role: Option<Secret>,
    pub database_password: Option<Secret>,
    /// Postgres `sslmode`, e.g. `require`
    pub database_ssl_mode: Option<String>,
    pub pool_min_connections: u32,
    pub pool_max_connections: u32,
    /// Bounds connection establishment and pool acquisition
    pub acquire_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            use_relational: false,
            json_path: default_data_file(),
            database_url: None,
            database_host: None,
            database_port: None,
            database_name: None,
            database_role: None,
            database_password: None,
            database_ssl_mode: None,
            pool_min_connections: 1,
            pool_max_connections: 10,
            acquire_timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Shared login password
    pub password: Option<Secret>,
    /// Minutes a session stays valid after login
    pub session_ttl_minutes: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            password: None,
            session_ttl_minutes: 12 * 60,
        }
    }
}

impl AuthConfig {
    pub fn session_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.session_ttl_minutes.saturating_mul(60))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

fn present(value: &Option<Secret>) -> Option<&str> {
    value.as_ref().filter(|v| !v.is_blank()).map(|v| v.expose().trim())
}

// Never carries the offending value: any of the parts may be secret
fn invalid_connection_settings() -> Error {
    Error::Config("invalid database connection settings".to_string())
}

impl StorageConfig {
    /// Connection string for the relational backend
    ///
    /// `database_url` wins. Otherwise a `postgres://` URL is assembled from
    /// the host, port, name, role and password components, percent-encoding
    /// each part.
    pub fn connection_url(&self) -> Result<Secret> {
        if let Some(url) = present(&self.database_url) {
            return Ok(Secret::new(url));
        }
        let Some(host) = present(&self.database_host) else {
            return Err(Error::Config(format!(
                "relational backend selected but no database configured: set {} or {}",
                ENV_DATABASE_URL, ENV_DB_HOST
            )));
        };

        let mut url =
            Url::parse("postgres://localhost").map_err(|_| invalid_connection_settings())?;
        url.set_host(Some(host))
            .map_err(|_| invalid_connection_settings())?;
        url.set_port(self.database_port)
            .map_err(|_| invalid_connection_settings())?;
        if let Some(role) = present(&self.database_role) {
            url.set_username(role)
                .map_err(|_| invalid_connection_settings())?;
        }
        if let Some(password) = self.database_password.as_ref().filter(|p| !p.is_blank()) {
            url.set_password(Some(password.expose()))
                .map_err(|_| invalid_connection_settings())?;
        }
        if let Some(name) = present(&self.database_name) {
            url.path_segments_mut()
                .map_err(|_| invalid_connection_settings())?
                .clear()
                .push(name);
        }
        if let Some(mode) = self.database_ssl_mode.as_deref().map(str::trim) {
            if !mode.is_empty() {
                url.query_pairs_mut().append_pair("sslmode", mode);
            }
        }
        Ok(Secret::new(String::from(url)))
    }
}

/// `<data dir>/peal/data.json`, or `data/data.json` when the platform has no data dir
fn default_data_file() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("peal").join("data.json"))
        .unwrap_or_else(|| PathBuf::from("data").join("data.json"))
}

/// `<config dir>/peal/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("peal").join("config.toml"))
}

/// Accepts 1/0, true/false, yes/no, on/off (any case)
pub fn parse_flag(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(Error::Config(format!("'{}' is not a boolean flag", other))),
    }
}

impl Config {
    /// Parse a TOML document; absent sections take defaults
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Load the TOML file (if any) and apply environment overrides
    ///
    /// `explicit` comes from the command line; an explicit path that does not
    /// exist is an error, a missing default file is not.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var(ENV_CONFIG).ok().map(PathBuf::from);
        let (path, required) = match (explicit, env_path) {
            (Some(p), _) => (Some(p.to_path_buf()), true),
            (None, Some(p)) => (Some(p), true),
            (None, None) => (default_config_path(), false),
        };

        let mut config = match path {
            Some(path) if path.exists() => {
                let content = std::fs::read_to_string(&path).map_err(|e| {
                    Error::Config(format!("Read {} failed: {}", path.display(), e))
                })?;
                info!("Loaded configuration from {}", path.display());
                Self::from_toml_str(&content)?
            }
            Some(path) if required => {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            Some(path) => {
                warn!(
                    "No config file at {}; using defaults and environment",
                    path.display()
                );
                Self::default()
            }
            None => {
                warn!("Could not determine config directory; using defaults and environment");
                Self::default()
            }
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `PEAL_*` overrides from `lookup` (the process environment in production)
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(bind) = lookup(ENV_BIND) {
            self.server.bind = bind;
        }
        if let Some(port) = lookup(ENV_PORT) {
            self.server.port = port
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("{} must be a port number", ENV_PORT)))?;
        }
        if let Some(flag) = lookup(ENV_USE_RELATIONAL) {
            self.storage.use_relational = parse_flag(&flag)?;
        }
        if let Some(path) = lookup(ENV_DATA_FILE) {
            self.storage.json_path = PathBuf::from(path);
        }
        if let Some(url) = lookup(ENV_DATABASE_URL) {
            self.storage.database_url = Some(Secret::new(url));
        }
        if let Some(host) = lookup(ENV_DB_HOST) {
            self.storage.database_host = Some(Secret::new(host));
        }
        if let Some(port) = lookup(ENV_DB_PORT) {
            self.storage.database_port = Some(
                port.trim()
                    .parse()
                    .map_err(|_| Error::Config(format!("{} must be a port number", ENV_DB_PORT)))?,
            );
        }
        if let Some(name) = lookup(ENV_DB_NAME) {
            self.storage.database_name = Some(Secret::new(name));
        }
        if let Some(role) = lookup(ENV_DB_ROLE) {
            self.storage.database_role = Some(Secret::new(role));
        }
        if let Some(password) = lookup(ENV_DB_PASSWORD) {
            self.storage.database_password = Some(Secret::new(password));
        }
        if let Some(mode) = lookup(ENV_DB_SSL_MODE) {
            self.storage.database_ssl_mode = Some(mode);
        }
        if let Some(password) = lookup(ENV_PASSWORD) {
            self.auth.password = Some(Secret::new(password));
        }
        if let Some(minutes) = lookup(ENV_SESSION_TTL_MINUTES) {
            self.auth.session_ttl_minutes = minutes.trim().parse().map_err(|_| {
                Error::Config(format!("{} must be a whole number", ENV_SESSION_TTL_MINUTES))
            })?;
        }
        Ok(())
    }

    /// Check cross-field requirements before anything is opened
    pub fn validate(&self) -> Result<()> {
        match &self.auth.password {
            Some(p) if !p.is_blank() => {}
            _ => {
                return Err(Error::Config(format!(
                    "no login password configured: set {} or auth.password",
                    ENV_PASSWORD
                )))
            }
        }

        if self.storage.use_relational {
            self.storage.connection_url()?;
        }

        if self.auth.session_ttl_minutes == 0 {
            return Err(Error::Config(
                "auth.session_ttl_minutes must be at least 1".to_string(),
            ));
        }

        if self.storage.pool_max_connections == 0
            || self.storage.pool_min_connections > self.storage.pool_max_connections
        {
            return Err(Error::Config(
                "pool_min_connections must not exceed pool_max_connections (> 0)".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 5780);
        assert!(!config.storage.use_relational);
        assert!(config.storage.json_path.ends_with("data.json"));
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            [storage]
            use_relational = true
            database_url = "sqlite://peal.db"
            "#,
        )
        .unwrap();
        assert!(config.storage.use_relational);
        assert_eq!(config.storage.pool_max_connections, 10);
        assert_eq!(config.server.bind, "127.0.0.1");
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let result = Config::from_toml_str("[server\nport = 1");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_env_overrides_toml() {
        let mut config = Config::from_toml_str("[server]\nport = 9000\n").unwrap();
        config
            .apply_overrides(lookup(&[
                (ENV_PORT, "9100"),
                (ENV_USE_RELATIONAL, "Yes"),
                (ENV_DATABASE_URL, "sqlite://x.db"),
                (ENV_PASSWORD, "hunter2"),
            ]))
            .unwrap();
        assert_eq!(config.server.port, 9100);
        assert!(config.storage.use_relational);
        assert_eq!(config.auth.password.as_ref().unwrap().expose(), "hunter2");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bad_flag_rejected() {
        let mut config = Config::default();
        let result = config.apply_overrides(lookup(&[(ENV_USE_RELATIONAL, "maybe")]));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_requires_password() {
        let config = Config::default();
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_requires_url_for_relational() {
        let mut config = Config::default();
        config.auth.password = Some(Secret::new("pw"));
        config.storage.use_relational = true;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_secrets_redacted_in_debug() {
        let mut config = Config::default();
        config.auth.password = Some(Secret::new("hunter2"));
        config.storage.database_url = Some(Secret::new("postgres://role:pw@host/db"));
        let printed = format!("{:?}", config);
        assert!(!printed.contains("hunter2"));
        assert!(!printed.contains("role:pw"));
    }

    #[test]
    fn test_connection_url_prefers_full_url() {
        let mut storage = StorageConfig::default();
        storage.database_url = Some(Secret::new("sqlite://local.db"));
        storage.database_host = Some(Secret::new("db.example.net"));
        assert_eq!(storage.connection_url().unwrap().expose(), "sqlite://local.db");
    }

    #[test]
    fn test_connection_url_from_components() {
        let mut config = Config::default();
        config
            .apply_overrides(lookup(&[
                (ENV_DB_HOST, "ep-quiet-bell.eu-west-2.aws.neon.tech"),
                (ENV_DB_PORT, "5433"),
                (ENV_DB_NAME, "ringing"),
                (ENV_DB_ROLE, "tower"),
                (ENV_DB_PASSWORD, "p@ss:w/rd"),
                (ENV_DB_SSL_MODE, "require"),
            ]))
            .unwrap();

        let url = config.storage.connection_url().unwrap();
        assert!(!url.expose().contains("p@ss"));

        let parsed = Url::parse(url.expose()).unwrap();
        assert_eq!(parsed.scheme(), "postgres");
        assert_eq!(parsed.host_str(), Some("ep-quiet-bell.eu-west-2.aws.neon.tech"));
        assert_eq!(parsed.port(), Some(5433));
        assert_eq!(parsed.username(), "tower");
        assert_eq!(parsed.password(), Some("p%40ss%3Aw%2Frd"));
        assert_eq!(parsed.path(), "/ringing");
        assert_eq!(parsed.query(), Some("sslmode=require"));

        let printed = format!("{:?} {:?}", config, url);
        assert!(!printed.contains("p@ss"));
        assert!(!printed.contains("tower"));
        assert!(!printed.contains("neon.tech"));
    }

    #[test]
    fn test_relational_accepts_components_without_url() {
        let mut config = Config::default();
        config.auth.password = Some(Secret::new("pw"));
        config.storage.use_relational = true;
        config.storage.database_host = Some(Secret::new("db.example.net"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_session_ttl_override() {
        let mut config = Config::default();
        assert_eq!(config.auth.session_ttl().as_secs(), 12 * 60 * 60);
        config
            .apply_overrides(lookup(&[(ENV_SESSION_TTL_MINUTES, "30")]))
            .unwrap();
        assert_eq!(config.auth.session_ttl().as_secs(), 30 * 60);
        let result = config.apply_overrides(lookup(&[(ENV_SESSION_TTL_MINUTES, "soon")]));
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
