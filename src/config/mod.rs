//! Configuration management
//!
//! This module provides YAML-based configuration management with support for:
//! - Environment variable overrides
//! - Multiple configuration file locations
//! - Default values for all settings
//! - Identity provider, session and webhook secrets

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Identity provider Backend API
    #[serde(default)]
    pub identity: IdentityConfig,
    /// Verification of provider-issued session tokens
    #[serde(default)]
    pub session: SessionConfig,
    /// Per-category webhook signing secrets
    #[serde(default)]
    pub webhooks: WebhookConfig,
    #[serde(default)]
    pub sync_cache: SyncCacheConfig,
    #[serde(default)]
    pub admin: AdminConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5060
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_connect_timeout() -> u64 {
    30
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    /// Log output target (console, file or both)
    #[serde(default)]
    pub target: LogTarget,
    /// Directory for log files (used when target is "file" or "both")
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// Log file name prefix
    #[serde(default = "default_log_prefix")]
    pub log_prefix: String,
    /// Enable daily log rotation
    #[serde(default = "default_log_rotation")]
    pub daily_rotation: bool,
}

/// Log output target
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogTarget {
    #[default]
    Console,
    File,
    Both,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("/var/log/equiptrack")
}

fn default_log_prefix() -> String {
    "equiptrack".to_string()
}

fn default_log_rotation() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            target: LogTarget::default(),
            log_dir: default_log_dir(),
            log_prefix: default_log_prefix(),
            daily_rotation: default_log_rotation(),
        }
    }
}

/// Identity provider Backend API configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IdentityConfig {
    #[serde(default = "default_identity_api_url")]
    pub api_url: String,
    /// Backend secret key (sent as a bearer token)
    #[serde(default)]
    pub secret_key: String,
    #[serde(default = "default_identity_timeout")]
    pub timeout_secs: u64,
    /// Page size used by batch reconciliation
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_identity_api_url() -> String {
    "https://api.clerk.com/v1".to_string()
}

fn default_identity_timeout() -> u64 {
    15
}

fn default_page_size() -> u32 {
    100
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            api_url: default_identity_api_url(),
            secret_key: String::new(),
            timeout_secs: default_identity_timeout(),
            page_size: default_page_size(),
        }
    }
}

/// Session token verification.
///
/// Exactly one of `jwt_public_key` (RS256 PEM) or `jwt_secret` (HS256) is used;
/// the public key wins when both are set.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub jwt_public_key: Option<String>,
    #[serde(default)]
    pub jwt_secret: Option<String>,
    /// Accepted `azp` values; empty accepts any
    #[serde(default)]
    pub authorized_parties: Vec<String>,
    #[serde(default = "default_session_cookie")]
    pub cookie_name: String,
}

fn default_session_cookie() -> String {
    "__session".to_string()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            jwt_public_key: None,
            jwt_secret: None,
            authorized_parties: vec![],
            cookie_name: default_session_cookie(),
        }
    }
}

/// Webhook signing secrets, one per event category
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebhookConfig {
    #[serde(default)]
    pub organizations_secret: Option<String>,
    #[serde(default)]
    pub memberships_secret: Option<String>,
    #[serde(default)]
    pub users_secret: Option<String>,
    /// Accepted clock skew for the signature timestamp
    #[serde(default = "default_webhook_tolerance")]
    pub tolerance_secs: i64,
}

fn default_webhook_tolerance() -> i64 {
    300
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            organizations_secret: None,
            memberships_secret: None,
            users_secret: None,
            tolerance_secs: default_webhook_tolerance(),
        }
    }
}

/// Sync result cache configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SyncCacheConfig {
    #[serde(default = "default_sync_cache_enabled")]
    pub enabled: bool,
    /// Entry lifetime in seconds
    #[serde(default = "default_sync_cache_ttl")]
    pub ttl_secs: u64,
    /// Integrity key; a random per-process key is used when unset
    #[serde(default)]
    pub secret: Option<String>,
}

fn default_sync_cache_enabled() -> bool {
    true
}

fn default_sync_cache_ttl() -> u64 {
    120 // 2 minutes
}

impl Default for SyncCacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_sync_cache_enabled(),
            ttl_secs: default_sync_cache_ttl(),
            secret: None,
        }
    }
}

/// Operator access to maintenance endpoints
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct AdminConfig {
    /// Static key accepted in the `X-API-Key` header
    #[serde(default)]
    pub internal_api_key: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: default_host(),
                port: default_port(),
                request_timeout_secs: None,
            },
            database: DatabaseConfig {
                url: "sqlite://./data/equiptrack.db".to_string(),
                max_connections: default_max_connections(),
                min_connections: default_min_connections(),
                connect_timeout_secs: default_connect_timeout(),
            },
            logging: LoggingConfig::default(),
            identity: IdentityConfig::default(),
            session: SessionConfig {
                jwt_secret: Some("change-me-in-production-minimum-32-characters-long".to_string()),
                ..SessionConfig::default()
            },
            webhooks: WebhookConfig::default(),
            sync_cache: SyncCacheConfig::default(),
            admin: AdminConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded in the following order (later overrides earlier):
    /// 1. Default values
    /// 2. Configuration file (YAML)
    /// 3. Environment variables
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let config_path = std::env::var("EQUIPTRACK_CONFIG")
            .map(PathBuf::from)
            .ok()
            .or_else(Self::find_config_file);

        let mut config = match config_path {
            Some(ref path) if path.exists() => {
                eprintln!("[CONFIG] Loading configuration from: {:?}", path);
                let contents = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file: {:?}", path))?;
                serde_norway::from_str::<AppConfig>(&contents)
                    .with_context(|| format!("Failed to parse config file: {:?}", path))?
            }
            Some(ref path) => {
                eprintln!("[CONFIG] Config file not found: {:?}", path);
                AppConfig::default()
            }
            None => {
                eprintln!("[CONFIG] No config file found, using defaults");
                AppConfig::default()
            }
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Find the configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let paths = [
            PathBuf::from("config.yaml"),
            PathBuf::from("config/config.yaml"),
            PathBuf::from("/etc/equiptrack/config.yaml"),
            dirs::config_dir()
                .map(|p| p.join("equiptrack/config.yaml"))
                .unwrap_or_default(),
        ];

        paths.into_iter().find(|p| p.exists())
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("EQUIPTRACK_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("EQUIPTRACK_PORT") {
            if let Ok(p) = port.parse() {
                self.server.port = p;
            }
        }

        if let Ok(url) = std::env::var("DATABASE_URL") {
            self.database.url = url;
        }

        if let Ok(level) = std::env::var("RUST_LOG") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("EQUIPTRACK_LOG_FORMAT") {
            self.logging.format = match format.to_lowercase().as_str() {
                "json" => LogFormat::Json,
                "compact" => LogFormat::Compact,
                _ => LogFormat::Pretty,
            };
        }
        if let Ok(target) = std::env::var("EQUIPTRACK_LOG_TARGET") {
            self.logging.target = match target.to_lowercase().as_str() {
                "file" => LogTarget::File,
                "both" => LogTarget::Both,
                _ => LogTarget::Console,
            };
        }
        if let Ok(dir) = std::env::var("EQUIPTRACK_LOG_DIR") {
            self.logging.log_dir = PathBuf::from(dir);
        }

        if let Ok(url) = std::env::var("CLERK_API_URL") {
            self.identity.api_url = url;
        }
        if let Ok(key) = std::env::var("CLERK_SECRET_KEY") {
            self.identity.secret_key = key;
        }

        if let Ok(pem) = std::env::var("CLERK_JWT_KEY") {
            self.session.jwt_public_key = Some(pem);
        }
        if let Ok(secret) = std::env::var("SESSION_JWT_SECRET") {
            self.session.jwt_secret = Some(secret);
        }

        if let Ok(secret) = std::env::var("CLERK_WEBHOOK_SECRET_ORGANIZATIONS") {
            self.webhooks.organizations_secret = Some(secret);
        }
        if let Ok(secret) = std::env::var("CLERK_WEBHOOK_SECRET_MEMBERSHIPS") {
            self.webhooks.memberships_secret = Some(secret);
        }
        if let Ok(secret) = std::env::var("CLERK_WEBHOOK_SECRET_USERS") {
            self.webhooks.users_secret = Some(secret);
        }

        if let Ok(secret) = std::env::var("SYNC_CACHE_SECRET") {
            self.sync_cache.secret = Some(secret);
        }
        if let Ok(ttl) = std::env::var("SYNC_CACHE_TTL_SECS") {
            if let Ok(t) = ttl.parse() {
                self.sync_cache.ttl_secs = t;
            }
        }

        if let Ok(key) = std::env::var("INTERNAL_API_KEY") {
            self.admin.internal_api_key = Some(key);
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port cannot be 0");
        }

        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        match (&self.session.jwt_public_key, &self.session.jwt_secret) {
            (Some(pem), _) if !pem.contains("BEGIN PUBLIC KEY") => {
                anyhow::bail!("Session public key must be a PEM encoded public key");
            }
            (None, Some(secret)) if secret.len() < 32 => {
                anyhow::bail!("Session JWT secret must be at least 32 characters long");
            }
            (None, None) => {
                anyhow::bail!("Either session.jwt_public_key or session.jwt_secret must be set");
            }
            _ => {}
        }

        for (category, secret) in [
            ("organizations", &self.webhooks.organizations_secret),
            ("memberships", &self.webhooks.memberships_secret),
            ("users", &self.webhooks.users_secret),
        ] {
            if let Some(secret) = secret {
                if !secret.starts_with("whsec_") {
                    anyhow::bail!("Webhook secret for {} must start with 'whsec_'", category);
                }
            }
        }

        if let Some(ref secret) = self.sync_cache.secret {
            if secret.len() < 16 {
                anyhow::bail!("Sync cache secret must be at least 16 characters long");
            }
        }

        if self.sync_cache.ttl_secs == 0 {
            anyhow::bail!("Sync cache TTL cannot be 0");
        }

        if self.identity.page_size == 0 || self.identity.page_size > 500 {
            anyhow::bail!("Identity page size must be between 1 and 500");
        }

        if self.identity.secret_key.is_empty() {
            tracing::warn!("Identity provider secret key is empty; provider calls will be rejected");
        }

        Ok(())
    }
}
