//! Configuration management for the farm operations server
//!
//! Supports hierarchical configuration loading:
//! 1. Default values in code
//! 2. Configuration files (config/development.toml, config/production.toml)
//! 3. Environment variable overrides with GREENS_ prefix

use config::{ConfigError, Environment, File};
use serde::Deserialize;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Current environment (development, production, test)
    pub environment: String,

    /// Server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Log output configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Stock and reservation settings
    #[serde(default)]
    pub inventory: InventoryConfig,

    /// Crop lifecycle settings
    #[serde(default)]
    pub crops: CropsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server port
    pub port: u16,

    /// Server host
    pub host: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of human readable output
    pub json: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InventoryConfig {
    /// Hours before an unconfirmed reservation lapses
    pub reservation_ttl_hours: i64,

    /// Reorder threshold given to new products when none is supplied
    pub default_low_stock_threshold: rust_decimal::Decimal,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CropsConfig {
    /// Write stage tasks when crops are created
    pub schedule_tasks: bool,
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let environment = std::env::var("GREENS_ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let config = config::Config::builder()
            // Start with default values
            .set_default("environment", environment.clone())?
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("logging.json", false)?
            .set_default("inventory.reservation_ttl_hours", 24)?
            .set_default("inventory.default_low_stock_threshold", "10")?
            .set_default("crops.schedule_tasks", environment != "test")?
            // Load environment-specific config file
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Override with environment variables (GREENS_ prefix)
            .add_source(
                Environment::with_prefix("GREENS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            host: "0.0.0.0".to_string(),
        }
    }
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            reservation_ttl_hours: shared::DEFAULT_RESERVATION_TTL_HOURS,
            default_low_stock_threshold: rust_decimal::Decimal::from(10),
        }
    }
}

impl Default for CropsConfig {
    fn default() -> Self {
        Self { schedule_tasks: true }
    }
}
