pub mod toml_config;

pub use toml_config::{RetryPolicy, TomlConfig};

#[cfg(feature = "cli")]
use crate::utils::error::Result;
#[cfg(feature = "cli")]
use clap::Parser;
#[cfg(feature = "cli")]
use serde::{Deserialize, Serialize};

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Serialize, Deserialize, Parser)]
#[command(name = "featured-slots")]
#[command(about = "Admin API for featured listing slots")]
pub struct CliConfig {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    pub config: Option<String>,

    /// Address to listen on, overrides server.bind
    #[arg(long)]
    pub bind: Option<String>,

    /// SQLite database path, overrides database.path
    #[arg(long)]
    pub database: Option<String>,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Emit logs as JSON")]
    pub json_logs: bool,
}

#[cfg(feature = "cli")]
impl CliConfig {
    /// Load the TOML file if one was given and apply CLI overrides on top.
    pub fn resolve(&self) -> Result<TomlConfig> {
        let mut config = match &self.config {
            Some(path) => TomlConfig::from_file(path)?,
            None => TomlConfig::default(),
        };

        if let Some(bind) = &self.bind {
            config.server.bind = bind.clone();
        }
        if let Some(database) = &self.database {
            config.database.path = Some(database.clone());
        }
        if self.json_logs {
            config.logging.json = Some(true);
        }

        Ok(config)
    }
}

#[cfg(all(test, feature = "cli"))]
mod tests {
    use super::*;
    use crate::utils::validation::Validate;

    #[test]
    fn test_cli_overrides_defaults() {
        let cli = CliConfig::parse_from([
            "featured-slots",
            "--bind",
            "0.0.0.0:8181",
            "--database",
            ":memory:",
            "--json-logs",
        ]);

        let config = cli.resolve().unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.bind, "0.0.0.0:8181");
        assert_eq!(config.database_path(), ":memory:");
        assert!(config.json_logs());
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let cli = CliConfig::parse_from(["featured-slots", "--config", "/nonexistent/slots.toml"]);
        assert!(cli.resolve().is_err());
    }
}
