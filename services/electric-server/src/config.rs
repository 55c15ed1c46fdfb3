//! Server configuration loading.
//!
//! TOML is the sole config source; no environment variable overrides
//! except `LOG_LEVEL`, read directly in `main.rs` like the rest of this
//! workspace. Default config path: `/etc/electric/server.toml`.
//!
//! # Required fields
//! - `schema_version = 1`
//! - `server.bind`

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct ElectricServerConfig {
    pub schema_version: u32,
    pub server: ServerConfig,
    pub replication: ReplicationConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Client id -> expected bearer token, checked by `StaticTokenAuthVerifier`.
    pub tokens: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub ws_path: String,
}

#[derive(Debug, Clone)]
pub struct ReplicationConfig {
    /// Max rows a single shape's initial snapshot may contain before
    /// `ShapeSizeLimitExceeded` is raised (`spec.md` §4.7).
    pub max_shape_rows: u32,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    schema_version: Option<u32>,
    server: Option<RawServerConfig>,
    replication: Option<RawReplicationConfig>,
    auth: Option<RawAuthConfig>,
}

#[derive(Debug, Deserialize)]
struct RawAuthConfig {
    tokens: Option<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct RawServerConfig {
    bind: Option<String>,
    ws_path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawReplicationConfig {
    max_shape_rows: Option<u32>,
}

pub fn load_config_from_path(path: &Path) -> Result<ElectricServerConfig, ConfigError> {
    let toml_str = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(format!("reading config file '{}': {e}", path.display())))?;
    load_config_from_str(&toml_str)
}

pub fn load_config() -> Result<ElectricServerConfig, ConfigError> {
    load_config_from_path(Path::new("/etc/electric/server.toml"))
}

pub fn load_config_from_str(toml_str: &str) -> Result<ElectricServerConfig, ConfigError> {
    let raw: RawConfig = toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))?;

    let schema_version = raw
        .schema_version
        .ok_or_else(|| ConfigError::MissingField("schema_version".to_owned()))?;
    if schema_version != 1 {
        return Err(ConfigError::InvalidValue(format!(
            "schema_version must be 1, got {schema_version}"
        )));
    }

    let raw_server = raw.server.ok_or_else(|| ConfigError::MissingField("server".to_owned()))?;
    let bind = raw_server
        .bind
        .ok_or_else(|| ConfigError::MissingField("server.bind".to_owned()))?;
    let ws_path = raw_server.ws_path.unwrap_or_else(|| "/electric/v1".to_owned());

    let replication = match raw.replication {
        Some(r) => ReplicationConfig { max_shape_rows: r.max_shape_rows.unwrap_or(100_000) },
        None => ReplicationConfig { max_shape_rows: 100_000 },
    };

    let auth = AuthConfig { tokens: raw.auth.and_then(|a| a.tokens).unwrap_or_default() };

    Ok(ElectricServerConfig {
        schema_version,
        server: ServerConfig { bind, ws_path },
        replication,
        auth,
    })
}

#[derive(Debug)]
pub enum ConfigError {
    Io(String),
    Parse(String),
    MissingField(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(s) => write!(f, "IO error: {s}"),
            ConfigError::Parse(s) => write!(f, "parse error: {s}"),
            ConfigError::MissingField(s) => write!(f, "missing required field: {s}"),
            ConfigError::InvalidValue(s) => write!(f, "invalid config value: {s}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_fills_in_defaults() {
        let cfg = load_config_from_str(
            r#"
            schema_version = 1
            [server]
            bind = "0.0.0.0:5433"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.server.bind, "0.0.0.0:5433");
        assert_eq!(cfg.server.ws_path, "/electric/v1");
        assert_eq!(cfg.replication.max_shape_rows, 100_000);
        assert!(cfg.auth.tokens.is_empty());
    }

    #[test]
    fn missing_bind_is_an_error() {
        let err = load_config_from_str("schema_version = 1\n[server]\n").unwrap_err();
        assert!(matches!(err, ConfigError::MissingField(_)));
    }

    #[test]
    fn wrong_schema_version_is_rejected() {
        let err = load_config_from_str("schema_version = 2\n[server]\nbind = \"x\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_)));
    }
}
