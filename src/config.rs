use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError};

use crate::services::shipping::ShippingRate;

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 1024;
const DEFAULT_STALE_UNPAID_MINUTES: i64 = 60;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;
const DEFAULT_SESSION_IDLE_MINUTES: i64 = 120;

/// Card payment gateway settings.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct PaymentGatewayConfig {
    /// Base URL of the charge API; `/charges` is appended
    #[validate(url)]
    pub base_url: String,

    /// Secret key sent as a bearer token
    #[serde(default)]
    pub api_key: String,

    /// Hard timeout for a single charge call
    #[serde(default = "default_gateway_timeout_secs")]
    #[validate(range(min = 1, max = 120))]
    pub timeout_secs: u64,

    /// ISO currency code sent with each charge
    #[serde(default = "default_currency")]
    #[validate(length(equal = 3))]
    pub currency: String,
}

impl Default for PaymentGatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9090".to_string(),
            api_key: String::new(),
            timeout_secs: default_gateway_timeout_secs(),
            currency: default_currency(),
        }
    }
}

/// Transactional email settings. Without an endpoint, emails are only logged.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct MailerConfig {
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_from_address")]
    #[validate(email)]
    pub from_address: String,

    #[serde(default = "default_store_name")]
    pub store_name: String,

    #[serde(default = "default_mailer_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for MailerConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            from_address: default_from_address(),
            store_name: default_store_name(),
            timeout_secs: default_mailer_timeout_secs(),
        }
    }
}

/// Checkout behaviour and the shipping rate table.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct CheckoutConfig {
    /// Hosted payment page for `external_redirect` orders
    #[validate(url)]
    pub redirect_base_url: String,

    /// Unpaid card orders older than this are cancelled by the sweep
    #[serde(default = "default_stale_unpaid_minutes")]
    #[validate(range(min = 1))]
    pub stale_unpaid_after_minutes: i64,

    /// How often the server runs the unpaid-order sweep (0 disables it)
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Checkout sessions untouched for this long are evicted by the sweep
    #[serde(default = "default_session_idle_minutes")]
    #[validate(range(min = 1))]
    pub session_idle_minutes: i64,

    #[serde(default = "default_order_number_prefix")]
    #[validate(length(min = 1, max = 8))]
    pub order_number_prefix: String,

    #[serde(default)]
    #[validate(custom = "validate_shipping_rates")]
    pub shipping_rates: Vec<ShippingRate>,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            redirect_base_url: "http://localhost:9091/pay".to_string(),
            stale_unpaid_after_minutes: default_stale_unpaid_minutes(),
            sweep_interval_secs: default_sweep_interval_secs(),
            session_idle_minutes: default_session_idle_minutes(),
            order_number_prefix: default_order_number_prefix(),
            shipping_rates: Vec::new(),
        }
    }
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    #[validate(length(min = 1))]
    pub database_url: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    #[validate(length(min = 1))]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// CORS: comma-separated list of allowed origins; empty allows any
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    #[validate(range(min = 1))]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB connect timeout (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,

    /// Per-request timeout applied by the HTTP layer (seconds)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Bounded capacity of the domain event channel
    #[serde(default = "default_event_channel_capacity")]
    #[validate(range(min = 1, max = 1_000_000))]
    pub event_channel_capacity: usize,

    #[serde(default)]
    #[validate]
    pub payment_gateway: PaymentGatewayConfig,

    #[serde(default)]
    #[validate]
    pub mailer: MailerConfig,

    #[serde(default)]
    #[validate]
    pub checkout: CheckoutConfig,
}

impl AppConfig {
    /// Builds a configuration with defaults for everything but the database.
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            environment: DEFAULT_ENV.to_string(),
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            cors_allowed_origins: None,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            payment_gateway: PaymentGatewayConfig::default(),
            mailer: MailerConfig::default(),
            checkout: CheckoutConfig::default(),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Parsed CORS origins; empty when unset.
    pub fn cors_origins(&self) -> Vec<String> {
        self.cors_allowed_origins
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_db_max_connections() -> u32 {
    10
}
fn default_db_min_connections() -> u32 {
    1
}
fn default_db_connect_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_event_channel_capacity() -> usize {
    DEFAULT_EVENT_CHANNEL_CAPACITY
}

fn default_gateway_timeout_secs() -> u64 {
    15
}

fn default_currency() -> String {
    "PEN".to_string()
}

fn default_from_address() -> String {
    "orders@example.com".to_string()
}

fn default_store_name() -> String {
    "Storefront".to_string()
}

fn default_mailer_timeout_secs() -> u64 {
    10
}

fn default_stale_unpaid_minutes() -> i64 {
    DEFAULT_STALE_UNPAID_MINUTES
}

fn default_sweep_interval_secs() -> u64 {
    DEFAULT_SWEEP_INTERVAL_SECS
}

fn default_session_idle_minutes() -> i64 {
    DEFAULT_SESSION_IDLE_MINUTES
}

fn default_order_number_prefix() -> String {
    "ORD".to_string()
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

/// Rate ids must be unique and costs non-negative.
fn validate_shipping_rates(rates: &Vec<ShippingRate>) -> Result<(), ValidationError> {
    let mut seen = std::collections::HashSet::new();
    for rate in rates {
        if rate.id.trim().is_empty() || !seen.insert(rate.id.as_str()) {
            let mut err = ValidationError::new("shipping_rates");
            err.message = Some(format!("Duplicate or empty shipping rate id '{}'", rate.id).into());
            return Err(err);
        }
        if rate.cost.is_sign_negative() {
            let mut err = ValidationError::new("shipping_rates");
            err.message = Some(format!("Shipping rate '{}' has a negative cost", rate.id).into());
            return Err(err);
        }
    }
    Ok(())
}

pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default_directive = format!("storefront_orders={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .json()
            .try_init();
    } else {
        let _ = fmt()
            .with_env_filter(EnvFilter::new(filter_directive))
            .try_init();
    }
}

/// Loads `config/default.toml`, `config/{RUN_ENV}.toml` and `APP__*` overrides.
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    load_config_from(Path::new(CONFIG_DIR))
}

pub fn load_config_from(dir: &Path) -> Result<AppConfig, AppConfigError> {
    // Support both RUN_ENV and APP_ENV for selecting config profile
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !dir.exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            dir.display()
        );
    }

    let config = Config::builder()
        .set_default("database_url", "sqlite://storefront.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::from(dir.join("default")).required(false))
        .add_source(File::from(dir.join(&run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}
