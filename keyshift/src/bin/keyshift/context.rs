use anyhow::{Context, Result};
use keyshift::{
    KeySpace,
    admin::{CA_FILE, CERT_FILE, CredentialPaths, KEY_FILE},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_DIR: &str = ".keyshift";
pub const CONFIG_FILE: &str = "config.toml";

/// Project context for keyshift operations
pub struct ProjectContext {
    /// Directory holding `.keyshift/` (or the current directory when absent)
    pub project_root: PathBuf,
    /// Path to config file
    pub config_path: PathBuf,
    /// Loaded configuration, defaults when the file is absent
    pub config: KeyshiftConfig,
}

/// Configuration stored in .keyshift/config.toml
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyshiftConfig {
    #[serde(default)]
    pub keyshift: KeyshiftSettings,
    #[serde(default)]
    pub redis: RedisSettings,
    #[serde(default)]
    pub control: ControlSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyshiftSettings {
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Overrides `<namespace>.RedisMigrations`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ledger_key: Option<String>,
}

impl Default for KeyshiftSettings {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            ledger_key: None,
        }
    }
}

fn default_namespace() -> String {
    keyshift::DEFAULT_NAMESPACE.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedisSettings {
    #[serde(default = "default_redis_url")]
    pub url: String,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
        }
    }
}

fn default_redis_url() -> String {
    "${REDIS_URL}".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlSettings {
    /// `host:port` of the host's control channel
    #[serde(default = "default_control_host")]
    pub host: String,
    /// Overrides `<namespace>.Control`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue: Option<String>,
    #[serde(default = "default_credentials_dir")]
    pub credentials_dir: String,
    #[serde(default = "default_cert_file")]
    pub cert_file: String,
    #[serde(default = "default_key_file")]
    pub key_file: String,
    #[serde(default = "default_ca_file")]
    pub ca_file: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self {
            host: default_control_host(),
            queue: None,
            credentials_dir: default_credentials_dir(),
            cert_file: default_cert_file(),
            key_file: default_key_file(),
            ca_file: default_ca_file(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_control_host() -> String {
    "localhost:2613".to_string()
}

fn default_credentials_dir() -> String {
    "~/.grpc".to_string()
}

fn default_cert_file() -> String {
    CERT_FILE.to_string()
}

fn default_key_file() -> String {
    KEY_FILE.to_string()
}

fn default_ca_file() -> String {
    CA_FILE.to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

impl ProjectContext {
    /// Find and load project context from current directory or ancestors
    pub fn find() -> Result<Self> {
        let current_dir = std::env::current_dir().context("Failed to get current directory")?;
        Self::find_from(&current_dir)
    }

    /// Find project context starting from the given directory
    pub fn find_from(start: &Path) -> Result<Self> {
        let project_root = Self::find_project_root(start).unwrap_or_else(|| start.to_path_buf());
        Self::from_root(project_root)
    }

    /// Create context from a known project root
    pub fn from_root(project_root: PathBuf) -> Result<Self> {
        let config_path = project_root.join(CONFIG_DIR).join(CONFIG_FILE);

        let config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read {}", config_path.display()))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse {}", config_path.display()))?
        } else {
            KeyshiftConfig::default()
        };

        Ok(Self {
            project_root,
            config_path,
            config,
        })
    }

    /// Nearest ancestor containing `.keyshift/config.toml`
    fn find_project_root(start: &Path) -> Option<PathBuf> {
        start
            .ancestors()
            .find(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE).is_file())
            .map(Path::to_path_buf)
    }

    pub fn is_initialized(&self) -> bool {
        self.config_path.exists()
    }

    pub fn key_space(&self) -> KeySpace {
        KeySpace::new(self.config.keyshift.namespace.clone())
    }

    pub fn ledger_key(&self) -> Result<String> {
        match &self.config.keyshift.ledger_key {
            Some(key) => expand_env(key),
            None => Ok(self.key_space().ledger()),
        }
    }

    /// Get the Redis URL, expanding environment variables
    pub fn redis_url(&self) -> Result<String> {
        expand_env(&self.config.redis.url)
    }

    pub fn control_host(&self) -> Result<String> {
        expand_env(&self.config.control.host)
    }

    pub fn control_queue(&self) -> Result<String> {
        match &self.config.control.queue {
            Some(queue) => expand_env(queue),
            None => Ok(self.key_space().control_queue()),
        }
    }

    pub fn control_timeout(&self) -> Duration {
        Duration::from_secs(self.config.control.timeout_secs)
    }

    pub fn credential_paths(&self) -> Result<CredentialPaths> {
        let control = &self.config.control;
        let dir = expand_env(&control.credentials_dir)?;
        let dir = match dir.strip_prefix("~/") {
            Some(rest) => home_dir()?.join(rest),
            None => PathBuf::from(dir),
        };
        Ok(CredentialPaths::with_files(
            dir,
            &control.cert_file,
            &control.key_file,
            &control.ca_file,
        ))
    }
}

fn home_dir() -> Result<PathBuf> {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .context("HOME is not set; use an absolute credentials_dir")
}

/// Expand every `${VAR}` in `value`
pub fn expand_env(value: &str) -> Result<String> {
    let mut expanded = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        expanded.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find('}')
            .with_context(|| format!("Unterminated variable reference in '{value}'"))?;
        let var_name = &after[..end];
        let var_value = std::env::var(var_name)
            .with_context(|| format!("Environment variable {var_name} not set"))?;
        expanded.push_str(&var_value);
        rest = &after[end + 1..];
    }

    expanded.push_str(rest);
    Ok(expanded)
}
