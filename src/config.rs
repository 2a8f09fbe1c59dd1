use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::time::Duration as StdDuration;
use tracing::info;

const CONFIG_DIR: &str = "config";
const DEFAULT_ENV: &str = "development";

/// Application configuration
///
/// Loaded once at process start and passed into constructors; nothing in
/// the crate reads configuration from ambient global state.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub environment: String,

    // Database pool tuning
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_connect_timeout_secs: u64,
    pub db_acquire_timeout_secs: u64,
    pub db_idle_timeout_secs: u64,

    /// Apply embedded migrations on startup.
    pub auto_migrate: bool,

    /// Idle duration after which a pending cart becomes eligible for the
    /// expiry sweep.
    pub cart_idle_minutes: i64,
    /// Interval at which the binary runs the sweep.
    pub sweep_interval_secs: u64,
}

impl AppConfig {
    /// Convenience constructor used by tests and tooling; mirrors the
    /// defaults `load_config` applies.
    pub fn new(database_url: String, environment: String) -> Self {
        Self {
            database_url,
            environment,
            db_max_connections: 10,
            db_min_connections: 1,
            db_connect_timeout_secs: 30,
            db_acquire_timeout_secs: 8,
            db_idle_timeout_secs: 600,
            auto_migrate: false,
            cart_idle_minutes: 60,
            sweep_interval_secs: 300,
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn cart_idle(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.cart_idle_minutes)
    }

    pub fn sweep_interval(&self) -> StdDuration {
        StdDuration::from_secs(self.sweep_interval_secs)
    }
}

/// Loads configuration from `config/default`, an environment profile file,
/// and `STOCKROOM__`-prefixed environment variables, in that order.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());

    info!("Loading configuration for environment: {}", run_env);

    let config = Config::builder()
        .set_default("database_url", "sqlite://stockroom.db?mode=rwc")?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("db_max_connections", 10)?
        .set_default("db_min_connections", 1)?
        .set_default("db_connect_timeout_secs", 30)?
        .set_default("db_acquire_timeout_secs", 8)?
        .set_default("db_idle_timeout_secs", 600)?
        .set_default("auto_migrate", true)?
        .set_default("cart_idle_minutes", 60)?
        .set_default("sweep_interval_secs", 300)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("STOCKROOM").separator("__"))
        .build()?;

    config.try_deserialize()
}
