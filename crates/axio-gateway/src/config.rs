//! Configuration management
//!
//! Settings are read in this order of priority:
//! 1. Environment variables (`AXIO_*`)
//! 2. `axio-gateway.toml`
//! 3. Defaults
//!
//! `${VAR_NAME}` inside the TOML file expands to the environment value.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use axio_bridge::ContextPolicy;
use axio_server::Options;
use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, Result};

/// File looked up in the working directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "axio-gateway.toml";

/// HTTP listener settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
    /// Path prefix the realtime server is mounted on
    pub path: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            path: "/socket.io".to_string(),
        }
    }
}

/// Realtime engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub ping_interval_ms: u64,
    pub ping_timeout_ms: u64,
    pub max_payload: usize,
    pub write_buffer: usize,
    pub accept_backlog: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let options = Options::default();
        Self {
            ping_interval_ms: options.ping_interval.as_millis() as u64,
            ping_timeout_ms: options.ping_timeout.as_millis() as u64,
            max_payload: options.max_payload,
            write_buffer: options.write_buffer,
            accept_backlog: options.accept_backlog,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub context_policy: ContextPolicy,
}

/// Main configuration for axio-gateway
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub http: HttpConfig,
    pub engine: EngineConfig,
    pub bridge: BridgeConfig,
}

/// File layout; every key is optional
#[derive(Debug, Default, Deserialize)]
struct TomlConfig {
    http: Option<TomlHttp>,
    engine: Option<TomlEngine>,
    bridge: Option<TomlBridge>,
}

#[derive(Debug, Default, Deserialize)]
struct TomlHttp {
    host: Option<String>,
    port: Option<u16>,
    path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TomlEngine {
    ping_interval_ms: Option<u64>,
    ping_timeout_ms: Option<u64>,
    max_payload: Option<usize>,
    write_buffer: Option<usize>,
    accept_backlog: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct TomlBridge {
    context_policy: Option<ContextPolicy>,
}

impl Config {
    /// Load from `path` if given, else from `axio-gateway.toml` when present,
    /// else from the environment alone
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_toml_file(path),
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_toml_file(DEFAULT_CONFIG_FILE)
            }
            None => Self::from_env(),
        }
    }

    /// Defaults overridden by the environment
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_overrides(env_lookup)?;
        Ok(config)
    }

    /// Read a TOML file, then apply environment overrides
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            GatewayError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let mut config = Self::from_toml_str(&content, env_lookup)?;
        config.apply_overrides(env_lookup)?;
        Ok(config)
    }

    /// Parse TOML text, expanding `${VAR}` through `lookup`
    pub fn from_toml_str<F>(content: &str, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let expanded = expand_vars(content, lookup);
        let file: TomlConfig = toml::from_str(&expanded)
            .map_err(|e| GatewayError::Config(format!("Failed to parse TOML: {}", e)))?;

        let mut config = Self::default();

        let http = file.http.unwrap_or_default();
        config.http.host = http.host.unwrap_or(config.http.host);
        config.http.port = http.port.unwrap_or(config.http.port);
        config.http.path = http.path.unwrap_or(config.http.path);

        let engine = file.engine.unwrap_or_default();
        let defaults = &mut config.engine;
        defaults.ping_interval_ms = engine.ping_interval_ms.unwrap_or(defaults.ping_interval_ms);
        defaults.ping_timeout_ms = engine.ping_timeout_ms.unwrap_or(defaults.ping_timeout_ms);
        defaults.max_payload = engine.max_payload.unwrap_or(defaults.max_payload);
        defaults.write_buffer = engine.write_buffer.unwrap_or(defaults.write_buffer);
        defaults.accept_backlog = engine.accept_backlog.unwrap_or(defaults.accept_backlog);

        if let Some(policy) = file.bridge.and_then(|b| b.context_policy) {
            config.bridge.context_policy = policy;
        }

        config.validate()?;
        Ok(config)
    }

    /// Apply `AXIO_*` overrides read through `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("AXIO_HOST") {
            self.http.host = host;
        }
        if let Some(port) = parse_var(&lookup, "AXIO_PORT")? {
            self.http.port = port;
        }
        if let Some(path) = lookup("AXIO_PATH") {
            self.http.path = path;
        }
        if let Some(ms) = parse_var(&lookup, "AXIO_PING_INTERVAL_MS")? {
            self.engine.ping_interval_ms = ms;
        }
        if let Some(ms) = parse_var(&lookup, "AXIO_PING_TIMEOUT_MS")? {
            self.engine.ping_timeout_ms = ms;
        }
        if let Some(size) = parse_var(&lookup, "AXIO_MAX_PAYLOAD")? {
            self.engine.max_payload = size;
        }
        if let Some(size) = parse_var(&lookup, "AXIO_WRITE_BUFFER")? {
            self.engine.write_buffer = size;
        }
        if let Some(size) = parse_var(&lookup, "AXIO_ACCEPT_BACKLOG")? {
            self.engine.accept_backlog = size;
        }
        if let Some(policy) = lookup("AXIO_CONTEXT_POLICY") {
            self.bridge.context_policy = match policy.to_lowercase().as_str() {
                "latest" => ContextPolicy::Latest,
                "per_connection" | "per-connection" => ContextPolicy::PerConnection,
                other => {
                    return Err(GatewayError::Config(format!(
                        "Unknown context policy: {}",
                        other
                    )));
                }
            };
        }

        self.validate()
    }

    fn validate(&self) -> Result<()> {
        if !self.http.path.starts_with('/') {
            return Err(GatewayError::Config(format!(
                "http.path must start with '/': {}",
                self.http.path
            )));
        }
        if self.engine.ping_interval_ms == 0 || self.engine.ping_timeout_ms == 0 {
            return Err(GatewayError::Config(
                "ping interval and timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Address to bind
    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.http.host, self.http.port)
            .parse()
            .map_err(|e| GatewayError::Config(format!("Invalid listen address: {}", e)))
    }

    /// Engine options for the realtime server
    pub fn options(&self) -> Options {
        Options::default()
            .ping_interval(Duration::from_millis(self.engine.ping_interval_ms))
            .ping_timeout(Duration::from_millis(self.engine.ping_timeout_ms))
            .max_payload(self.engine.max_payload)
            .write_buffer(self.engine.write_buffer)
            .accept_backlog(self.engine.accept_backlog)
    }
}

fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|e| GatewayError::Config(format!("Invalid {}: {}", name, e)))
        })
        .transpose()
}

/// Replace `${VAR}` with the looked-up value; unknown variables expand to
/// the empty string
fn expand_vars<F>(content: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut result = String::with_capacity(content.len());
    let mut rest = content;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                if let Some(value) = lookup(&after[..end]) {
                    result.push_str(&value);
                }
                rest = &after[end + 1..];
            }
            None => {
                // Unterminated; keep as is
                result.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    result.push_str(rest);

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.http.port, 3000);
        assert_eq!(config.http.path, "/socket.io");
        assert_eq!(config.engine.ping_interval_ms, 25_000);
        assert_eq!(config.engine.ping_timeout_ms, 20_000);
        assert_eq!(config.bridge.context_policy, ContextPolicy::Latest);
        assert_eq!(config.addr().unwrap(), "0.0.0.0:3000".parse().unwrap());
    }

    #[test]
    fn test_toml_config_parsing() {
        let content = r#"
[http]
host = "127.0.0.1"
port = 8080
path = "/rt"

[engine]
ping_interval_ms = 1000
max_payload = 4096

[bridge]
context_policy = "per_connection"
"#;
        let config = Config::from_toml_str(content, vars(&[])).unwrap();

        assert_eq!(config.http.host, "127.0.0.1");
        assert_eq!(config.http.port, 8080);
        assert_eq!(config.http.path, "/rt");
        assert_eq!(config.engine.ping_interval_ms, 1000);
        // Unset keys keep their defaults
        assert_eq!(config.engine.ping_timeout_ms, 20_000);
        assert_eq!(config.engine.max_payload, 4096);
        assert_eq!(config.bridge.context_policy, ContextPolicy::PerConnection);

        let options = config.options();
        assert_eq!(options.ping_interval, Duration::from_secs(1));
        assert_eq!(options.max_payload, 4096);
    }

    #[test]
    fn test_example_file_matches_defaults() {
        let content = include_str!("../axio-gateway.toml.example");
        assert_eq!(Config::from_toml_str(content, vars(&[])).unwrap(), Config::default());
    }

    #[test]
    fn test_env_var_expansion() {
        let content = r#"
[http]
host = "${BIND_HOST}"
path = "/${PREFIX}/io"
"#;
        let lookup = vars(&[("BIND_HOST", "10.1.2.3"), ("PREFIX", "api")]);
        let config = Config::from_toml_str(content, lookup).unwrap();
        assert_eq!(config.http.host, "10.1.2.3");
        assert_eq!(config.http.path, "/api/io");
    }

    #[test]
    fn test_expand_vars_edge_cases() {
        let lookup = vars(&[("A", "1")]);
        assert_eq!(expand_vars("x${A}y${MISSING}z", &lookup), "x1yz");
        assert_eq!(expand_vars("cost $5 ${A", &lookup), "cost $5 ${A");
    }

    #[test]
    fn test_env_overrides_win() {
        let mut config = Config::from_toml_str("[http]\nport = 8080\n", vars(&[])).unwrap();
        config
            .apply_overrides(vars(&[
                ("AXIO_PORT", "9090"),
                ("AXIO_PING_TIMEOUT_MS", "500"),
                ("AXIO_CONTEXT_POLICY", "per-connection"),
            ]))
            .unwrap();

        assert_eq!(config.http.port, 9090);
        assert_eq!(config.engine.ping_timeout_ms, 500);
        assert_eq!(config.bridge.context_policy, ContextPolicy::PerConnection);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let mut config = Config::default();
        assert!(config.apply_overrides(vars(&[("AXIO_PORT", "http")])).is_err());

        let mut config = Config::default();
        assert!(config
            .apply_overrides(vars(&[("AXIO_CONTEXT_POLICY", "sticky")]))
            .is_err());

        assert!(Config::from_toml_str("[http]\npath = \"rt\"\n", vars(&[])).is_err());
        assert!(Config::from_toml_str("[engine]\nping_timeout_ms = 0\n", vars(&[])).is_err());
        assert!(Config::from_toml_str("[http\n", vars(&[])).is_err());
    }

    #[test]
    fn test_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[http]\npath = \"/live\"").unwrap();

        let config = Config::from_toml_file(file.path()).unwrap();
        // AXIO_PATH is not expected in the test environment
        if std::env::var("AXIO_PATH").is_err() {
            assert_eq!(config.http.path, "/live");
        }

        let missing = Config::from_toml_file("/nonexistent/axio-gateway.toml");
        assert!(matches!(missing, Err(GatewayError::Config(_))));
    }
}
