use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub amazon: AmazonConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub path: String,
}

/// Подключение к Amazon Selling Partner API
#[derive(Debug, Deserialize, Clone)]
pub struct AmazonConfig {
    #[serde(default = "default_amazon_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub merchant_id: String,
    #[serde(default)]
    pub marketplace_id: String,
    /// Токен доступа; OAuth-обмен живёт во внешнем сервисе
    #[serde(default)]
    pub api_token: String,
}

impl Default for AmazonConfig {
    fn default() -> Self {
        Self {
            endpoint: default_amazon_endpoint(),
            merchant_id: String::new(),
            marketplace_id: String::new(),
            api_token: String::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    /// Шаг тика фонового воркера опроса фидов
    #[serde(default = "default_worker_interval")]
    pub worker_interval_seconds: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            worker_interval_seconds: default_worker_interval(),
        }
    }
}

fn default_amazon_endpoint() -> String {
    "https://sellingpartnerapi-eu.amazon.com".to_string()
}

fn default_worker_interval() -> u64 {
    5
}

/// Default configuration embedded in the binary
const DEFAULT_CONFIG: &str = r#"
[database]
path = "target/db/app.db"

[amazon]
endpoint = "https://sellingpartnerapi-eu.amazon.com"

[sync]
worker_interval_seconds = 5
"#;

/// Load configuration from config.toml file
///
/// Search order:
/// 1. Next to the executable (for production)
/// 2. Falls back to embedded default config
pub fn load_config() -> anyhow::Result<Config> {
    // Try to find config.toml next to the executable
    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            let config_path = exe_dir.join("config.toml");

            if config_path.exists() {
                tracing::info!("Loading config from: {}", config_path.display());
                let contents = std::fs::read_to_string(&config_path)?;
                let config: Config = toml::from_str(&contents)?;
                return Ok(config);
            } else {
                tracing::warn!("config.toml not found at: {}", config_path.display());
            }
        }
    }

    // Fall back to default config
    tracing::info!("Using default embedded configuration");
    let config: Config = toml::from_str(DEFAULT_CONFIG)?;
    Ok(config)
}

/// Get the database file path from configuration
/// Resolves relative paths relative to the executable directory
pub fn get_database_path(config: &Config) -> anyhow::Result<PathBuf> {
    let db_path_str = &config.database.path;
    let db_path = Path::new(db_path_str);

    // If absolute path, use as is
    if db_path.is_absolute() {
        return Ok(db_path.to_path_buf());
    }

    // If relative path, resolve it relative to the executable directory
    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            let resolved_path = exe_dir.join(db_path);
            return Ok(resolved_path);
        }
    }

    // Fallback: use relative to current directory
    Ok(PathBuf::from(db_path_str))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_loads() {
        let config: Result<Config, _> = toml::from_str(DEFAULT_CONFIG);
        assert!(config.is_ok());
        let config = config.unwrap();
        assert_eq!(config.database.path, "target/db/app.db");
        assert_eq!(config.sync.worker_interval_seconds, 5);
    }

    #[test]
    fn test_amazon_section_is_optional() {
        let config: Config = toml::from_str("[database]\npath = \"x.db\"\n").unwrap();
        assert!(config.amazon.merchant_id.is_empty());
        assert_eq!(
            config.amazon.endpoint,
            "https://sellingpartnerapi-eu.amazon.com"
        );
    }
}
