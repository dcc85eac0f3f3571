use crate::auth::password::DEFAULT_HASH_ROUNDS;
use crate::auth::{DEFAULT_ADMIN_PASSWORD, DEFAULT_TOKEN_TTL_SECS};
use crate::store::{Database, DEFAULT_POOL_SIZE};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Env var overriding `auth.signing_key`.
pub const ENV_SIGNING_KEY: &str = "CLASSDESK_SIGNING_KEY";
/// Env var overriding `auth.admin_password`.
pub const ENV_ADMIN_PASSWORD: &str = "CLASSDESK_ADMIN_PASSWORD";
/// Env var overriding `store.path`.
pub const ENV_DB_PATH: &str = "CLASSDESK_DB_PATH";

/// Top-level configuration, loaded from `config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub gateway: GatewayConfig,
    pub store: StoreConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    /// Origins allowed to call the API from a browser. Empty disables CORS;
    /// `"*"` allows any origin.
    pub cors_origins: Vec<String>,
    /// Reject non-admin callers on administrative routes.
    pub enforce_admin_role: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8000,
            cors_origins: vec!["http://localhost:3000".into()],
            enforce_admin_role: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database file. `~` is expanded.
    pub path: String,
    pub pool_size: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: "classdesk.db".into(),
            pool_size: DEFAULT_POOL_SIZE,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC key for bearer tokens. When unset a random key is generated per process.
    pub signing_key: Option<String>,
    pub token_ttl_secs: u64,
    pub hash_rounds: u32,
    /// Password given to the bootstrap `admin` account.
    pub admin_password: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            signing_key: None,
            token_ttl_secs: DEFAULT_TOKEN_TTL_SECS,
            hash_rounds: DEFAULT_HASH_ROUNDS,
            admin_password: DEFAULT_ADMIN_PASSWORD.into(),
        }
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("signing_key", &self.signing_key.as_ref().map(|_| "<redacted>"))
            .field("token_ttl_secs", &self.token_ttl_secs)
            .field("hash_rounds", &self.hash_rounds)
            .field("admin_password", &"<redacted>")
            .finish()
    }
}

impl Config {
    /// Read `path` if it exists, otherwise start from defaults. Environment
    /// overrides are applied either way.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            toml::from_str(&raw)
                .with_context(|| format!("Failed to parse config: {}", path.display()))?
        } else {
            tracing::info!(
                "No config file at {}, using defaults",
                path.display()
            );
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Default config location: `<platform config dir>/classdesk/config.toml`,
    /// falling back to `./config.toml`.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("", "", "classdesk")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }

    /// Priority: environment variable > config file.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |name: &str| {
            lookup(name).and_then(|value| {
                let value = value.trim();
                (!value.is_empty()).then(|| value.to_owned())
            })
        };

        if let Some(key) = non_empty(ENV_SIGNING_KEY) {
            self.auth.signing_key = Some(key);
        }
        if let Some(password) = non_empty(ENV_ADMIN_PASSWORD) {
            self.auth.admin_password = password;
        }
        if let Some(path) = non_empty(ENV_DB_PATH) {
            self.store.path = path;
        }
    }

    /// Database path with `~` and `$VAR` expanded.
    pub fn database_path(&self) -> Result<PathBuf> {
        let expanded = shellexpand::full(&self.store.path)
            .with_context(|| format!("Failed to expand store path: {}", self.store.path))?;
        Ok(PathBuf::from(expanded.as_ref()))
    }

    /// Open (and migrate) the configured database, creating parent
    /// directories as needed.
    pub fn open_database(&self) -> Result<Database> {
        let path = self.database_path()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        Database::open(&path, self.store.pool_size)
            .with_context(|| format!("Failed to open database: {}", path.display()))
    }
}
