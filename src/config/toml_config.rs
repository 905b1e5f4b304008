use crate::utils::error::{Result, SlotError};
use crate::utils::validation::{self, Validate};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_BIND: &str = "127.0.0.1:8080";
pub const DEFAULT_DATABASE_PATH: &str = "./listings.db";
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 2_000;
pub const DEFAULT_MAX_RETRIES: u32 = 2;
pub const DEFAULT_RETRY_BACKOFF_MS: u64 = 25;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub featured: FeaturedConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: Option<String>,
    pub busy_timeout_ms: Option<u64>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: Some(DEFAULT_DATABASE_PATH.to_string()),
            busy_timeout_ms: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeaturedConfig {
    /// Extra attempts after a transaction conflict.
    pub max_retries: Option<u32>,
    pub retry_backoff_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: Option<String>,
    pub json: Option<bool>,
}

impl TomlConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(SlotError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| SlotError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// Replace `${VAR}` with the value of the environment variable, leaving
    /// unknown variables untouched.
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| SlotError::ConfigError {
            message: e.to_string(),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn validate_config(&self) -> Result<()> {
        validation::validate_socket_addr("server.bind", &self.server.bind)?;

        let path = validation::validate_required_field("database.path", &self.database.path)?;
        validation::validate_non_empty_string("database.path", path)?;
        validation::validate_path("database.path", path)?;

        if let Some(timeout) = self.database.busy_timeout_ms {
            validation::validate_range("database.busy_timeout_ms", timeout, 1, 60_000)?;
        }
        if let Some(retries) = self.featured.max_retries {
            validation::validate_range("featured.max_retries", retries, 0, 10)?;
        }
        if let Some(backoff) = self.featured.retry_backoff_ms {
            validation::validate_range("featured.retry_backoff_ms", backoff, 0, 5_000)?;
        }
        if let Some(level) = &self.logging.level {
            validation::validate_log_level("logging.level", level)?;
        }

        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        validation::validate_socket_addr("server.bind", &self.server.bind)
    }

    pub fn database_path(&self) -> &str {
        self.database
            .path
            .as_deref()
            .unwrap_or(DEFAULT_DATABASE_PATH)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(
            self.database
                .busy_timeout_ms
                .unwrap_or(DEFAULT_BUSY_TIMEOUT_MS),
        )
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.featured.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            backoff: Duration::from_millis(
                self.featured
                    .retry_backoff_ms
                    .unwrap_or(DEFAULT_RETRY_BACKOFF_MS),
            ),
        }
    }

    pub fn json_logs(&self) -> bool {
        self.logging.json.unwrap_or(false)
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

/// How often a conflicting transaction is retried and how long to wait between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (starting at 1).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff * attempt
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff: Duration::from_millis(DEFAULT_RETRY_BACKOFF_MS),
        }
    }
}
