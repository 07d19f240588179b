use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    pub server: ServerConfig,

    pub session: SessionConfig,

    pub security: SecurityConfig,

    pub tokens: TokenConfig,

    pub events: EventsConfig,

    pub uploads: UploadConfig,

    pub scheduler: SchedulerConfig,

    pub mail: MailConfig,

    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub database_path: String,

    pub log_level: String,

    /// `pretty` or `json`
    pub log_format: String,

    /// Number of tokio worker threads (default: 2)
    /// Set to 0 to use the number of CPU cores
    pub worker_threads: usize,

    pub max_db_connections: u32,

    pub min_db_connections: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            database_path: "sqlite:data/eventdesk.db".to_string(),
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            worker_threads: 2,
            max_db_connections: 5,
            min_db_connections: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub enabled: bool,

    pub port: u16,

    /// Whether to set the Secure flag on cookies. Leave off for plain HTTP.
    pub secure_cookies: bool,

    pub static_path: String,

    /// Base URL used in mailed links. Derived from the request when unset.
    pub public_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8080,
            secure_cookies: false,
            static_path: "static".to_string(),
            public_url: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionBackend {
    Memory,
    Database,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub backend: SessionBackend,

    pub ttl_seconds: u64,

    pub cookie_name: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            backend: SessionBackend::Memory,
            ttl_seconds: 3600,
            cookie_name: "session_token".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Argon2 memory cost in KiB (default: 8192 = 8MB)
    pub argon2_memory_cost_kib: u32,

    /// Argon2 time cost (iterations)
    pub argon2_time_cost: u32,

    pub argon2_parallelism: u32,

    pub min_password_length: usize,

    /// How many past passwords to check for reuse. `None` checks all of them.
    pub password_history_depth: Option<u64>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            argon2_memory_cost_kib: 8192,
            argon2_time_cost: 3,
            argon2_parallelism: 1,
            min_password_length: 6,
            password_history_depth: None,
        }
    }
}

/// Lifetimes of mailed one-time tokens. `None` keeps them valid until used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    pub verification_ttl_hours: Option<u64>,

    pub reset_ttl_hours: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    pub page_size: u64,

    pub description_preview_length: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            page_size: 4,
            description_preview_length: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub root_path: String,

    pub events_dir: String,

    pub max_upload_bytes: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            root_path: "uploads".to_string(),
            events_dir: "events".to_string(),
            max_upload_bytes: 5 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,

    pub sweep_interval_seconds: u64,

    /// Six-field cron expression; overrides the interval when set.
    pub cron_expression: Option<String>,

    pub kv_purge_interval_minutes: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sweep_interval_seconds: 60,
            cron_expression: None,
            kv_purge_interval_minutes: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailTransport {
    Log,
    Webhook,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    pub transport: MailTransport,

    pub webhook_url: Option<String>,

    pub sender: String,

    pub timeout_seconds: u64,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            transport: MailTransport::Log,
            webhook_url: None,
            sender: "no-reply@eventdesk.local".to_string(),
            timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: true,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let paths = Self::config_paths();

        let mut config = Self::default();
        let mut found = false;
        for path in &paths {
            if path.exists() {
                info!("Loading config from: {}", path.display());
                config = Self::load_from_path(path)?;
                found = true;
                break;
            }
        }
        if !found {
            info!("No config file found, using defaults");
        }

        config.apply_env_overrides()?;
        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// `EVENTDESK_DATABASE_URL` and `EVENTDESK_PORT` win over the file.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("EVENTDESK_DATABASE_URL")
            && !url.trim().is_empty()
        {
            self.general.database_path = url;
        }

        if let Ok(port) = std::env::var("EVENTDESK_PORT") {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("Invalid EVENTDESK_PORT: {port}"))?;
        }

        Ok(())
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Config saved to: {}", path.display());
        Ok(())
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("config.toml")];

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("eventdesk").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".eventdesk").join("config.toml"));
        }

        paths
    }

    fn default_config_path() -> PathBuf {
        PathBuf::from("config.toml")
    }

    pub fn create_default_if_missing() -> Result<bool> {
        let path = Self::default_config_path();
        if path.exists() {
            Ok(false)
        } else {
            let config = Self::default();
            config.save_to_path(&path)?;
            info!("Created default config file: {}", path.display());
            Ok(true)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.session.ttl_seconds == 0 {
            anyhow::bail!("Session TTL must be > 0");
        }

        if self.session.cookie_name.trim().is_empty() {
            anyhow::bail!("Session cookie name cannot be empty");
        }

        if self.events.page_size == 0 {
            anyhow::bail!("Event page size must be > 0");
        }

        if self.tokens.verification_ttl_hours == Some(0) || self.tokens.reset_ttl_hours == Some(0) {
            anyhow::bail!("Token TTLs must be > 0 when set");
        }

        if self.mail.transport == MailTransport::Webhook
            && self
                .mail
                .webhook_url
                .as_deref()
                .is_none_or(|u| u.trim().is_empty())
        {
            anyhow::bail!("Mail webhook URL cannot be empty when the webhook transport is enabled");
        }

        if self.scheduler.enabled
            && self.scheduler.sweep_interval_seconds == 0
            && self.scheduler.cron_expression.is_none()
        {
            anyhow::bail!("Sweep interval must be > 0 or cron expression must be set");
        }

        if let Some(url) = &self.server.public_url {
            url::Url::parse(url).with_context(|| format!("Invalid public_url: {url}"))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.session.ttl_seconds, 3600);
        assert_eq!(config.session.cookie_name, "session_token");
        assert_eq!(config.session.backend, SessionBackend::Memory);
        assert_eq!(config.security.min_password_length, 6);
        assert!(config.security.password_history_depth.is_none());
        assert_eq!(config.events.page_size, 4);
        assert_eq!(config.events.description_preview_length, 50);
        assert!(config.tokens.reset_ttl_hours.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[session]"));
        assert!(toml_str.contains("[scheduler]"));
    }

    #[test]
    fn test_config_deserialization() {
        let toml_str = r#"
            [general]
            log_level = "debug"

            [session]
            backend = "database"

            [tokens]
            reset_ttl_hours = 2
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.session.backend, SessionBackend::Database);
        assert_eq!(config.tokens.reset_ttl_hours, Some(2));
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn test_validate_rejects_bad_settings() {
        let mut config = Config::default();
        config.events.page_size = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.mail.transport = MailTransport::Webhook;
        assert!(config.validate().is_err());
        config.mail.webhook_url = Some("http://localhost:9000/mail".to_string());
        assert!(config.validate().is_ok());

        let mut config = Config::default();
        config.tokens.verification_ttl_hours = Some(0);
        assert!(config.validate().is_err());
    }
}
