use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgConnectOptions;
use std::fmt;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

/// Day-ahead price API configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_market")]
    pub market: String,

    #[serde(default = "default_currency")]
    pub currency: String,

    #[serde(default = "default_resolution_minutes")]
    pub resolution_minutes: u32,

    /// Unset keeps the HTTP client's own default.
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// PostgreSQL connection settings
#[derive(Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_user")]
    pub user: String,

    #[serde(default, skip_serializing)]
    pub password: String,

    #[serde(default = "default_db_host")]
    pub host: String,

    #[serde(default = "default_db_port")]
    pub port: u16,

    #[serde(default = "default_db_name")]
    pub name: String,

    /// How long to keep dialling before giving up on the server.
    #[serde(default = "default_db_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

/// Gap-detection configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SyncConfig {
    /// First delivery date the table is expected to cover.
    #[serde(default = "default_start_date")]
    pub start_date: NaiveDate,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_base_url() -> String {
    "https://dataportal-api.nordpoolgroup.com/api/DayAheadPriceIndices".to_string()
}
fn default_market() -> String {
    "DayAhead".to_string()
}
fn default_currency() -> String {
    "EUR".to_string()
}
fn default_resolution_minutes() -> u32 {
    15
}
fn default_user_agent() -> String {
    concat!("nordpool-prices/", env!("CARGO_PKG_VERSION")).to_string()
}
fn default_db_user() -> String {
    "postgres".to_string()
}
fn default_db_host() -> String {
    "localhost".to_string()
}
fn default_db_port() -> u16 {
    5432
}
fn default_db_name() -> String {
    "postgres".to_string()
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 8, 1).unwrap_or(NaiveDate::MIN)
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            market: default_market(),
            currency: default_currency(),
            resolution_minutes: default_resolution_minutes(),
            timeout_secs: None,
            user_agent: default_user_agent(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            user: default_db_user(),
            password: String::new(),
            host: default_db_host(),
            port: default_db_port(),
            name: default_db_name(),
            connect_timeout_secs: default_db_connect_timeout_secs(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            start_date: default_start_date(),
        }
    }
}

impl DatabaseConfig {
    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.name)
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("name", &self.name)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

// ── Loader ───────────────────────────────────────────────────────────────────

/// Credential variables read as-is, without the `NORDPOOL__` prefix.
const DB_ENV_VARS: [(&str, &str); 5] = [
    ("database.user", "DB_USER"),
    ("database.password", "DB_PASSWORD"),
    ("database.host", "DB_HOST"),
    ("database.port", "DB_PORT"),
    ("database.name", "DB_NAME"),
];

impl AppConfig {
    /// Load configuration from files + environment overrides.
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let mut builder = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(config::Environment::with_prefix("NORDPOOL").separator("__"));

        for (key, var) in DB_ENV_VARS {
            builder = builder
                .set_override_option(key, std::env::var(var).ok())
                .with_context(|| format!("Invalid override for {}", var))?;
        }

        builder
            .build()
            .context("Failed to assemble configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}
