//! Layered configuration for the Freelancie server.
//!
//! Values are resolved in order, later layers winning:
//! built-in defaults → `freelancie.toml` → `.env` / process environment →
//! command-line flags (applied by the `serve` command).
//!
//! # Configuration File Format
//!
//! ```toml
//! environment = "development"
//!
//! [server]
//! host = "127.0.0.1"
//! port = 5000
//! dev_mode = false
//! static_dir = "frontend/dist"
//!
//! [database]
//! path = "data/freelancie.db"
//!
//! [auth]
//! jwt_secret = "change-me"
//! token_ttl_hours = 168
//! reset_ttl_minutes = 60
//!
//! [auth.argon2]
//! memory_kib = 19456
//! iterations = 2
//! parallelism = 1
//!
//! [logging]
//! level = "info"
//! json = false
//! dir = "logs"
//! ```
//!
//! Recognised environment variables: `PORT`, `HOST`, `DATABASE_PATH`,
//! `JWT_SECRET`, `APP_ENV`, `STATIC_DIR`, `LOG_LEVEL`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::errors::MarketError;
use crate::market::auth::{AuthConfig, DEV_JWT_SECRET, HashParams};
use crate::market::server::ServerConfig;

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "freelancie.toml";

/// Secrets shorter than this draw a validation warning.
const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Production => write!(f, "production"),
        }
    }
}

impl std::str::FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            _ => anyhow::bail!(
                "Invalid environment '{}'. Valid values: development, production",
                s
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
    /// Permissive CORS for a frontend dev server on another origin.
    pub dev_mode: bool,
    pub static_dir: Option<PathBuf>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            dev_mode: false,
            static_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    pub path: PathBuf,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/freelancie.db"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSection {
    /// Required in production.
    pub jwt_secret: Option<String>,
    pub token_ttl_hours: u32,
    pub reset_ttl_minutes: u32,
    pub argon2: HashParams,
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            token_ttl_hours: 7 * 24,
            reset_ttl_minutes: 60,
            argon2: HashParams::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Default `EnvFilter` directive; `RUST_LOG` takes precedence.
    pub level: String,
    /// Emit console records as JSON.
    pub json: bool,
    /// Directory for daily-rolling JSON log files. Disabled when unset.
    pub dir: Option<PathBuf>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            dir: None,
        }
    }
}

/// Root of `freelancie.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub environment: Environment,
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub database: DatabaseSection,
    #[serde(default)]
    pub auth: AuthSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse freelancie.toml")
    }

    /// Returns default configuration if the file doesn't exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize freelancie.toml")?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// File layer plus `.env` and process environment.
    ///
    /// An explicitly given `path` must exist; otherwise `freelancie.toml` in
    /// the working directory is used when present.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        // A missing .env is normal.
        let _ = dotenvy::dotenv();

        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::load_or_default(Path::new(CONFIG_FILE))?,
        };
        config.apply_env()?;
        Ok(config)
    }

    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Apply environment overrides read through `lookup`. Empty values are ignored.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(port) = get("PORT") {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("Invalid PORT '{}'", port))?;
        }
        if let Some(host) = get("HOST") {
            self.server.host = host;
        }
        if let Some(path) = get("DATABASE_PATH") {
            self.database.path = PathBuf::from(path);
        }
        if let Some(secret) = get("JWT_SECRET") {
            self.auth.jwt_secret = Some(secret);
        }
        if let Some(env) = get("APP_ENV") {
            self.environment = env.parse()?;
        }
        if let Some(dir) = get("STATIC_DIR") {
            self.server.static_dir = Some(PathBuf::from(dir));
        }
        if let Some(level) = get("LOG_LEVEL") {
            self.logging.level = level;
        }
        Ok(())
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.server.port == 0 {
            warnings.push("server.port is 0: the OS will pick a random port".to_string());
        }
        match &self.auth.jwt_secret {
            None => warnings.push(format!(
                "auth.jwt_secret is not set: using the development secret ({})",
                if self.environment == Environment::Production {
                    "refused in production"
                } else {
                    "development only"
                }
            )),
            Some(secret) if secret.len() < MIN_SECRET_LEN => warnings.push(format!(
                "auth.jwt_secret is shorter than {} characters",
                MIN_SECRET_LEN
            )),
            Some(_) => {}
        }
        if self.auth.token_ttl_hours == 0 {
            warnings.push("auth.token_ttl_hours is 0: issued tokens expire immediately".into());
        }
        if self.auth.reset_ttl_minutes == 0 {
            warnings.push("auth.reset_ttl_minutes is 0: reset tokens are unusable".into());
        }
        if let Some(dir) = &self.server.static_dir
            && !dir.join("index.html").is_file()
        {
            warnings.push(format!(
                "server.static_dir '{}' has no index.html",
                dir.display()
            ));
        }
        if self.environment == Environment::Production && self.server.dev_mode {
            warnings.push("server.dev_mode enables permissive CORS in production".into());
        }

        warnings
    }

    /// Build the auth settings, refusing to run production without a secret.
    pub fn auth_config(&self) -> Result<AuthConfig, MarketError> {
        let jwt_secret = match (&self.auth.jwt_secret, self.environment) {
            (Some(secret), _) => secret.clone(),
            (None, Environment::Production) => {
                return Err(MarketError::Config(
                    "JWT_SECRET must be set when APP_ENV=production".into(),
                ));
            }
            (None, Environment::Development) => {
                tracing::warn!("JWT_SECRET not set, using the development secret");
                DEV_JWT_SECRET.to_string()
            }
        };
        Ok(AuthConfig {
            jwt_secret,
            token_ttl_secs: i64::from(self.auth.token_ttl_hours) * 60 * 60,
            reset_ttl_secs: i64::from(self.auth.reset_ttl_minutes) * 60,
            hash_params: self.auth.argon2,
        })
    }

    pub fn server_config(&self) -> Result<ServerConfig, MarketError> {
        Ok(ServerConfig {
            host: self.server.host.clone(),
            port: self.server.port,
            db_path: self.database.path.clone(),
            dev_mode: self.server.dev_mode,
            static_dir: self.server.static_dir.clone(),
            auth: self.auth_config()?,
        })
    }
}
