// Configuration management with layered configuration (file, env)

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main settings structure containing all configuration options
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub store: StoreConfig,
    pub database: DatabaseConfig,
    pub provider: ProviderConfig,
    pub scheduler: SchedulerConfig,
    pub worker: WorkerConfig,
    pub notifier: NotifierConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// JSON file with users to load into the memory backend at startup
    pub seed_path: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            seed_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost/pricewatch".to_string(),
            max_connections: 10,
            min_connections: 2,
            connect_timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    pub timeout_seconds: u64,
    pub max_pages: usize,
    pub user_agent: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.wallapop.com/api/v3".to_string(),
            timeout_seconds: 5,
            max_pages: 8,
            user_agent: "pricewatch/0.1".to_string(),
        }
    }
}

impl ProviderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub refill_interval_seconds: u64,
    pub backlog_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            refill_interval_seconds: 30 * 60,
            backlog_capacity: 128,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub concurrency: usize,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 2,
            min_delay_ms: 10_000,
            max_delay_ms: 15_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    Log,
    Telegram,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    pub sink: SinkKind,
    pub queue_capacity: usize,
    pub item_link_base: String,
    pub telegram: TelegramConfig,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            sink: SinkKind::Log,
            queue_capacity: 64,
            item_link_base: "https://es.wallapop.com/item/".to_string(),
            telegram: TelegramConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub token: Option<String>,
    pub api_base: String,
    pub timeout_seconds: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_base: "https://api.telegram.org".to_string(),
            timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub metrics_port: u16,
    pub metrics_interval_seconds: u64,
    pub tracing_endpoint: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_port: 9090,
            metrics_interval_seconds: 20,
            tracing_endpoint: None,
        }
    }
}

impl Settings {
    /// Load configuration with layered precedence: defaults → file → env
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("config")
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Start with default configuration
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Add local configuration (not committed to git)
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), String> {
        // Validate store config
        if self.store.backend == StoreBackend::Postgres {
            if self.database.url.is_empty() {
                return Err("Database URL cannot be empty for the postgres backend".to_string());
            }
            if self.database.max_connections == 0 {
                return Err("Database max_connections must be greater than 0".to_string());
            }
        }

        // Validate provider config
        if self.provider.base_url.is_empty() {
            return Err("Provider base_url cannot be empty".to_string());
        }
        if self.provider.timeout_seconds == 0 {
            return Err("Provider timeout_seconds must be greater than 0".to_string());
        }
        if self.provider.max_pages == 0 {
            return Err("Provider max_pages must be greater than 0".to_string());
        }

        // Validate scheduler config
        if self.scheduler.refill_interval_seconds == 0 {
            return Err("Scheduler refill_interval_seconds must be greater than 0".to_string());
        }
        if self.scheduler.backlog_capacity == 0 {
            return Err("Scheduler backlog_capacity must be greater than 0".to_string());
        }

        // Validate worker config
        if self.worker.concurrency == 0 {
            return Err("Worker concurrency must be greater than 0".to_string());
        }
        if self.worker.min_delay_ms > self.worker.max_delay_ms {
            return Err("Worker min_delay_ms cannot exceed max_delay_ms".to_string());
        }

        // Validate notifier config
        if self.notifier.queue_capacity == 0 {
            return Err("Notifier queue_capacity must be greater than 0".to_string());
        }
        if self.notifier.sink == SinkKind::Telegram
            && self
                .notifier
                .telegram
                .token
                .as_deref()
                .map_or(true, str::is_empty)
        {
            return Err("Telegram token required when notifier sink is 'telegram'".to_string());
        }

        if self.observability.metrics_interval_seconds == 0 {
            return Err("Observability metrics_interval_seconds must be greater than 0".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_settings_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.scheduler.backlog_capacity, 128);
        assert_eq!(settings.scheduler.refill_interval_seconds, 1800);
        assert_eq!(settings.worker.concurrency, 2);
        assert_eq!(settings.provider.max_pages, 8);
    }

    #[test]
    fn test_validation_catches_empty_database_url_for_postgres() {
        let mut settings = Settings::default();
        settings.database.url = String::new();
        assert!(settings.validate().is_ok());

        settings.store.backend = StoreBackend::Postgres;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validation_catches_zero_backlog_capacity() {
        let mut settings = Settings::default();
        settings.scheduler.backlog_capacity = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validation_catches_inverted_delay_range() {
        let mut settings = Settings::default();
        settings.worker.min_delay_ms = 20_000;
        settings.worker.max_delay_ms = 10_000;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validation_catches_telegram_sink_without_token() {
        let mut settings = Settings::default();
        settings.notifier.sink = SinkKind::Telegram;
        assert!(settings.validate().is_err());

        settings.notifier.telegram.token = Some("123:abc".to_string());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_load_from_path_merges_file_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("default.toml")).unwrap();
        writeln!(
            file,
            "[scheduler]\nrefill_interval_seconds = 60\n\n[notifier]\nsink = \"telegram\"\n\n[notifier.telegram]\ntoken = \"t\""
        )
        .unwrap();

        let settings = Settings::load_from_path(dir.path()).unwrap();
        assert_eq!(settings.scheduler.refill_interval_seconds, 60);
        assert_eq!(settings.scheduler.backlog_capacity, 128);
        assert_eq!(settings.notifier.sink, SinkKind::Telegram);
        assert_eq!(settings.notifier.telegram.token.as_deref(), Some("t"));
    }
}
