//! Configuration loading with env-var overrides.
//!
//! Reads `config/default.toml` (or the path given with `-f`), then applies
//! env overrides. The raw TOML shapes below are private; callers only see
//! the resolved [`Config`].

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::error::AppError;
use crate::logger;
use crate::supervisor::endpoint::{DEFAULT_PATH, DEFAULT_PORT};

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Real-time link settings (`[realtime]`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealtimeConfig {
    /// Origin of the page the client runs under; decides `ws` vs `wss` and
    /// supplies the host.
    pub origin: String,
    pub port: u16,
    pub path: String,
    /// Identity sent as `?user_id=` on connect.
    pub user_id: Option<u64>,
    pub base_delay_ms: u64,
    pub max_attempts: u32,
    pub command_buffer: usize,
}

/// REST backend settings (`[api]`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub base_url: String,
    /// Where the bearer token is persisted between runs.
    pub token_file: Option<PathBuf>,
    /// Token from `API_AUTH_TOKEN`. Never sourced from TOML.
    pub auth_token: Option<String>,
}

/// Reverse proxy settings (`[proxy]`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    pub enabled: bool,
    pub bind: String,
    pub backend_url: String,
    /// Path prefix forwarded to the backend, e.g. `/api`.
    pub prefix: String,
}

/// Fully-resolved client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub log_level: String,
    /// Append logs here instead of stderr (already expanded, no `~`).
    pub log_file: Option<PathBuf>,
    pub realtime: RealtimeConfig,
    pub api: ApiConfig,
    pub proxy: ProxyConfig,
}

/// Values taken from the environment. Tests build this directly instead of
/// mutating process env.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub log_level: Option<String>,
    pub origin: Option<String>,
    pub user_id: Option<String>,
    pub api_base_url: Option<String>,
    pub backend_url: Option<String>,
    pub auth_token: Option<String>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        Self {
            log_level: env::var("QUADRANT_LOG_LEVEL").ok(),
            origin: env::var("QUADRANT_ORIGIN").ok(),
            user_id: env::var("QUADRANT_USER_ID").ok(),
            api_base_url: env::var("PUBLIC_API_URL").ok(),
            backend_url: env::var("BACKEND_URL_INTERNAL").ok(),
            auth_token: env::var("API_AUTH_TOKEN").ok(),
        }
    }
}

// ── raw TOML shape ────────────────────────────────────────────────────────────

#[derive(Deserialize, Default)]
struct RawConfig {
    #[serde(default)]
    client: RawClient,
    #[serde(default)]
    realtime: RawRealtime,
    #[serde(default)]
    api: RawApi,
    #[serde(default)]
    proxy: RawProxy,
}

#[derive(Deserialize)]
struct RawClient {
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default)]
    log_file: Option<String>,
}

#[derive(Deserialize)]
struct RawRealtime {
    #[serde(default = "default_origin")]
    origin: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_path")]
    path: String,
    #[serde(default)]
    user_id: Option<u64>,
    #[serde(default = "default_base_delay_ms")]
    base_delay_ms: u64,
    #[serde(default = "default_max_attempts")]
    max_attempts: u32,
    #[serde(default = "default_command_buffer")]
    command_buffer: usize,
}

#[derive(Deserialize)]
struct RawApi {
    #[serde(default = "default_api_base_url")]
    base_url: String,
    #[serde(default)]
    token_file: Option<String>,
}

#[derive(Deserialize)]
struct RawProxy {
    /// Defaults to `false`: the proxy must be explicitly enabled.
    #[serde(default)]
    enabled: bool,
    #[serde(default = "default_proxy_bind")]
    bind: String,
    #[serde(default = "default_backend_url")]
    backend_url: String,
    #[serde(default = "default_proxy_prefix")]
    prefix: String,
}

impl Default for RawClient {
    fn default() -> Self {
        Self { log_level: default_log_level(), log_file: None }
    }
}

impl Default for RawRealtime {
    fn default() -> Self {
        Self {
            origin: default_origin(),
            port: default_port(),
            path: default_path(),
            user_id: None,
            base_delay_ms: default_base_delay_ms(),
            max_attempts: default_max_attempts(),
            command_buffer: default_command_buffer(),
        }
    }
}

impl Default for RawApi {
    fn default() -> Self {
        Self { base_url: default_api_base_url(), token_file: None }
    }
}

impl Default for RawProxy {
    fn default() -> Self {
        Self {
            enabled: false,
            bind: default_proxy_bind(),
            backend_url: default_backend_url(),
            prefix: default_proxy_prefix(),
        }
    }
}

fn default_log_level() -> String { "info".to_string() }
fn default_origin() -> String { "http://localhost".to_string() }
fn default_port() -> u16 { DEFAULT_PORT }
fn default_path() -> String { DEFAULT_PATH.to_string() }
fn default_base_delay_ms() -> u64 { 2000 }
fn default_max_attempts() -> u32 { 5 }
fn default_command_buffer() -> usize { 32 }
fn default_api_base_url() -> String { "http://localhost:8080/api".to_string() }
fn default_proxy_bind() -> String { "127.0.0.1:3000".to_string() }
fn default_backend_url() -> String { "http://backend:8080".to_string() }
fn default_proxy_prefix() -> String { "/api".to_string() }

// ── loading ───────────────────────────────────────────────────────────────────

/// Load config from `path` (or the default location), then apply env
/// overrides.
pub fn load(path: Option<&str>) -> Result<Config, AppError> {
    load_from(Path::new(path.unwrap_or(DEFAULT_CONFIG_PATH)), &EnvOverrides::from_env())
}

pub fn load_from(path: &Path, overrides: &EnvOverrides) -> Result<Config, AppError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;
    parse(&raw, overrides)
        .map_err(|e| AppError::Config(format!("{e} (in {})", path.display())))
}

/// Resolve TOML text plus overrides into a [`Config`].
pub fn parse(text: &str, overrides: &EnvOverrides) -> Result<Config, String> {
    let parsed: RawConfig = toml::from_str(text).map_err(|e| format!("parse error: {e}"))?;

    let user_id = match overrides.user_id.as_deref() {
        Some(raw) => Some(
            raw.trim()
                .parse::<u64>()
                .map_err(|e| format!("invalid QUADRANT_USER_ID '{raw}': {e}"))?,
        ),
        None => parsed.realtime.user_id,
    };

    let log_level = overrides.log_level.clone().unwrap_or(parsed.client.log_level);
    // Full filter directives are checked by the logger itself.
    if !log_level.contains(['=', ',']) {
        logger::parse_level(&log_level).map_err(|e| e.to_string())?;
    }

    let prefix = parsed.proxy.prefix;
    if !prefix.starts_with('/') {
        return Err(format!("proxy prefix must start with '/': '{prefix}'"));
    }

    Ok(Config {
        log_level,
        log_file: parsed.client.log_file.as_deref().map(expand_home),
        realtime: RealtimeConfig {
            origin: overrides.origin.clone().unwrap_or(parsed.realtime.origin),
            port: parsed.realtime.port,
            path: parsed.realtime.path,
            user_id,
            base_delay_ms: parsed.realtime.base_delay_ms,
            max_attempts: parsed.realtime.max_attempts,
            command_buffer: parsed.realtime.command_buffer,
        },
        api: ApiConfig {
            base_url: overrides.api_base_url.clone().unwrap_or(parsed.api.base_url),
            token_file: parsed.api.token_file.as_deref().map(expand_home),
            auth_token: overrides.auth_token.clone(),
        },
        proxy: ProxyConfig {
            enabled: parsed.proxy.enabled,
            bind: parsed.proxy.bind,
            backend_url: overrides.backend_url.clone().unwrap_or(parsed.proxy.backend_url),
            prefix: prefix.trim_end_matches('/').to_string(),
        },
    })
}

/// Expand a leading `~` to the user's home directory.
/// Absolute or relative paths without `~` are returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const FULL_TOML: &str = r#"
[client]
log_level = "debug"
log_file = "~/.quadrant/live.log"

[realtime]
origin = "https://tasks.example.com"
port = 9000
path = "/live"
user_id = 12
base_delay_ms = 500
max_attempts = 3

[api]
base_url = "https://tasks.example.com/api"
token_file = "/tmp/quadrant-token"

[proxy]
enabled = true
bind = "0.0.0.0:8000"
backend_url = "http://127.0.0.1:8080"
prefix = "/api/"
"#;

    fn write_toml(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn empty_file_uses_defaults() {
        let cfg = parse("", &EnvOverrides::default()).unwrap();
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.realtime.port, 50002);
        assert_eq!(cfg.realtime.path, "/ws");
        assert_eq!(cfg.realtime.base_delay_ms, 2000);
        assert_eq!(cfg.realtime.max_attempts, 5);
        assert_eq!(cfg.realtime.user_id, None);
        assert!(!cfg.proxy.enabled);
        assert_eq!(cfg.proxy.prefix, "/api");
        assert_eq!(cfg.api.auth_token, None);
    }

    #[test]
    fn parse_full_config() {
        let f = write_toml(FULL_TOML);
        let cfg = load_from(f.path(), &EnvOverrides::default()).unwrap();
        assert_eq!(cfg.log_level, "debug");
        assert!(cfg.log_file.unwrap().ends_with(".quadrant/live.log"));
        assert_eq!(cfg.realtime.origin, "https://tasks.example.com");
        assert_eq!(cfg.realtime.port, 9000);
        assert_eq!(cfg.realtime.user_id, Some(12));
        assert_eq!(cfg.realtime.max_attempts, 3);
        assert_eq!(cfg.api.token_file, Some(PathBuf::from("/tmp/quadrant-token")));
        assert!(cfg.proxy.enabled);
        assert_eq!(cfg.proxy.prefix, "/api");
    }

    #[test]
    fn env_overrides_win() {
        let overrides = EnvOverrides {
            log_level: Some("trace".into()),
            origin: Some("http://10.0.0.2".into()),
            user_id: Some("99".into()),
            api_base_url: Some("http://api.local".into()),
            backend_url: Some("http://other:8080".into()),
            auth_token: Some("secret".into()),
        };
        let cfg = parse(FULL_TOML, &overrides).unwrap();
        assert_eq!(cfg.log_level, "trace");
        assert_eq!(cfg.realtime.origin, "http://10.0.0.2");
        assert_eq!(cfg.realtime.user_id, Some(99));
        assert_eq!(cfg.api.base_url, "http://api.local");
        assert_eq!(cfg.proxy.backend_url, "http://other:8080");
        assert_eq!(cfg.api.auth_token.as_deref(), Some("secret"));
    }

    #[test]
    fn bad_user_id_override_errors() {
        let overrides = EnvOverrides { user_id: Some("abc".into()), ..Default::default() };
        let err = parse("", &overrides).unwrap_err();
        assert!(err.contains("QUADRANT_USER_ID"));
    }

    #[test]
    fn unknown_log_level_errors() {
        let err = parse("[client]\nlog_level = \"loud\"\n", &EnvOverrides::default()).unwrap_err();
        assert!(err.contains("loud"));
        assert!(parse("[client]\nlog_level = \"quadrant_live=debug\"\n", &EnvOverrides::default()).is_ok());
    }

    #[test]
    fn relative_prefix_errors() {
        let err = parse("[proxy]\nprefix = \"api\"\n", &EnvOverrides::default()).unwrap_err();
        assert!(err.contains("prefix"));
    }

    #[test]
    fn missing_file_errors() {
        let result = load_from(Path::new("/nonexistent/config.toml"), &EnvOverrides::default());
        let msg = result.unwrap_err().to_string();
        assert!(msg.contains("config error"));
    }

    #[test]
    fn malformed_toml_errors() {
        let f = write_toml("[realtime\nport = ");
        let msg = load_from(f.path(), &EnvOverrides::default()).unwrap_err().to_string();
        assert!(msg.contains("parse error"));
    }

    #[test]
    fn tilde_expands_to_home() {
        let home = dirs::home_dir().expect("home dir must exist in test env");
        let expanded = expand_home("~/.quadrant");
        assert!(expanded.starts_with(&home));
        assert!(expanded.ends_with(".quadrant"));
    }

    #[test]
    fn absolute_path_unchanged() {
        assert_eq!(expand_home("/absolute/path"), PathBuf::from("/absolute/path"));
    }
}
