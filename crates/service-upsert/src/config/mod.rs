use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use toml::Value;

use crate::api::DEFAULT_ENDPOINT;
use crate::cloner::RoutingConfig;
use crate::error::{Error, Result};
use crate::logging::LoggingConfig;
use crate::naming::DEFAULT_PLACEHOLDER;
use crate::registry_auth::RegistryAuth;

pub const CONFIG_ENV: &str = "SVC_UPSERT_CONFIG";

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.into()
}

fn default_http_timeout() -> u64 {
    30
}

fn default_program() -> String {
    "docker".into()
}

fn default_daemon_timeout() -> u64 {
    300
}

fn default_placeholder() -> String {
    DEFAULT_PLACEHOLDER.into()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ManagementConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    pub endpoint_env: Option<String>,
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,
}

impl Default for ManagementConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            endpoint_env: None,
            timeout_secs: default_http_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    #[serde(default = "default_program")]
    pub program: String,
    /// Placed before `service update`, e.g. `["--context", "prod"]`.
    pub args: Vec<String>,
    #[serde(default = "default_daemon_timeout")]
    pub timeout_secs: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: Vec::new(),
            timeout_secs: default_daemon_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub auth: Option<String>,
    pub auth_env: Option<String>,
    pub username: Option<String>,
    pub username_env: Option<String>,
    pub password: Option<String>,
    pub password_env: Option<String>,
    pub server_address: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NamingConfig {
    #[serde(default = "default_placeholder")]
    pub placeholder: String,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            placeholder: default_placeholder(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub management: ManagementConfig,
    pub daemon: DaemonConfig,
    pub routing: RoutingConfig,
    pub registry: RegistryConfig,
    pub naming: NamingConfig,
    pub logging: LoggingConfig,
}

impl Settings {
    /// CLI flag, then `endpoint_env`, then the file value.
    pub fn endpoint(&self, cli: Option<&str>) -> String {
        let cli = cli.map(str::trim).filter(|s| !s.is_empty());
        resolve_string_field(cli, self.management.endpoint_env.as_deref())
            .unwrap_or_else(|| self.management.endpoint.clone())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.management.timeout_secs.max(1))
    }

    pub fn daemon_timeout(&self) -> Duration {
        Duration::from_secs(self.daemon.timeout_secs.max(1))
    }

    /// CLI token wins. Otherwise a configured token (literal or env), then
    /// username/password credentials. Half-configured credentials are an error.
    pub fn registry_auth(&self, cli_token: Option<&str>) -> Result<Option<RegistryAuth>> {
        if let Some(auth) = cli_token.and_then(RegistryAuth::token) {
            return Ok(Some(auth));
        }
        let reg = &self.registry;
        if let Some(token) = resolve_string_field(reg.auth.as_deref(), reg.auth_env.as_deref()) {
            return Ok(RegistryAuth::token(token));
        }
        let username = resolve_string_field(reg.username.as_deref(), reg.username_env.as_deref());
        let password = resolve_string_field(reg.password.as_deref(), reg.password_env.as_deref());
        match (username, password) {
            (None, None) => Ok(None),
            (Some(username), Some(password)) => Ok(Some(RegistryAuth::Credentials {
                username,
                password,
                server_address: reg
                    .server_address
                    .as_deref()
                    .map(str::trim)
                    .unwrap_or_default()
                    .to_string(),
            })),
            (Some(_), None) => Err(Error::config("registry.username is set but no password")),
            (None, Some(_)) => Err(Error::config("registry.password is set but no username")),
        }
    }
}

fn resolve_env_ref(env_key: Option<&str>) -> Option<String> {
    env_key
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|k| std::env::var(k).ok())
        .map(|v| v.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn resolve_string_field(literal: Option<&str>, env_key: Option<&str>) -> Option<String> {
    let direct = literal
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned);
    direct.or_else(|| resolve_env_ref(env_key))
}

fn merge_values(base: &mut Value, child: Value) {
    match (base, child) {
        (Value::Table(base_tbl), Value::Table(child_tbl)) => {
            for (k, v) in child_tbl {
                match base_tbl.get_mut(&k) {
                    Some(existing) => merge_values(existing, v),
                    None => {
                        base_tbl.insert(k, v);
                    }
                }
            }
        }
        (base_slot, child_val) => {
            *base_slot = child_val;
        }
    }
}

fn resolve_ref_path(from_file: &Path, reference: &str) -> PathBuf {
    let p = PathBuf::from(reference);
    if p.is_absolute() {
        p
    } else {
        from_file.parent().unwrap_or_else(|| Path::new(".")).join(p)
    }
}

fn load_value_inner(path: &Path, stack: &mut HashSet<PathBuf>) -> Result<Value> {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    if !stack.insert(canonical.clone()) {
        return Err(Error::config(format!(
            "config extends cycle detected at {}",
            canonical.display()
        )));
    }

    let data = fs::read_to_string(path)
        .map_err(|e| Error::config(format!("failed to read config {}: {e}", path.display())))?;
    let mut value: Value = toml::from_str(&data)
        .map_err(|e| Error::config(format!("TOML parse error in {}: {e}", path.display())))?;

    let mut out = Value::Table(Default::default());
    if let Some(ext) = value.get("extends").and_then(Value::as_str) {
        let base_path = resolve_ref_path(path, ext);
        out = load_value_inner(&base_path, stack)?;
    }
    if let Some(tbl) = value.as_table_mut() {
        tbl.remove("extends");
    }
    merge_values(&mut out, value);

    stack.remove(&canonical);
    Ok(out)
}

/// Reads a settings file, following a root-level `extends = "base.toml"`.
pub fn load(path: &Path) -> Result<Settings> {
    let mut stack = HashSet::<PathBuf>::new();
    let value = load_value_inner(path, &mut stack)?;
    value
        .try_into()
        .map_err(|e| Error::config(format!("invalid settings in {}: {e}", path.display())))
}

/// An explicit path must exist. Without one, `SVC_UPSERT_CONFIG` is consulted
/// and built-in defaults are used when nothing is configured.
pub fn load_or_default(explicit: Option<&Path>) -> Result<Settings> {
    if let Some(p) = explicit {
        return load(p);
    }
    match resolve_env_ref(Some(CONFIG_ENV)) {
        Some(p) => load(Path::new(&p)),
        None => Ok(Settings::default()),
    }
}
