use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_STORE_NAME: &str = "Elegance Sarees";
const DEFAULT_SUPPORT_EMAIL: &str = "admin@elegancesarees.com";
const DEFAULT_STORE_PHONE: &str = "+91 98765 43210";
const DEFAULT_CART_BACKEND: &str = "in-memory";
const DEV_DEFAULT_JWT_SECRET: &str =
    "this_is_a_development_secret_key_that_is_at_least_64_characters_long_for_testing";

/// Store identity, UPI payee and checkout pricing
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    #[serde(default = "default_store_name")]
    #[validate(length(min = 1))]
    pub name: String,

    #[serde(default = "default_support_email")]
    pub support_email: String,

    #[serde(default = "default_store_phone")]
    pub phone: String,

    /// Public storefront URL used in message links
    #[serde(default = "default_site_url")]
    pub site_url: String,

    /// UPI virtual payment address that receives customer transfers
    #[serde(default = "default_upi_id")]
    #[validate(custom = "validate_upi_id")]
    pub upi_id: String,

    /// Payee name shown by UPI apps; falls back to `name`
    #[serde(default)]
    pub upi_payee_name: Option<String>,

    #[serde(default = "default_currency")]
    pub currency: String,

    #[serde(default = "default_free_shipping_threshold")]
    pub free_shipping_threshold: Decimal,

    #[serde(default = "default_shipping_fee")]
    pub shipping_fee: Decimal,

    /// Tax rate as a fraction (0.18 = 18%)
    #[serde(default = "default_tax_rate")]
    pub tax_rate: Decimal,

    /// Minutes a UPI order may stay unpaid before the cron job cancels it
    #[serde(default = "default_pending_order_timeout_mins")]
    #[validate(range(min = 1))]
    pub pending_order_timeout_mins: i64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            name: default_store_name(),
            support_email: default_support_email(),
            phone: default_store_phone(),
            site_url: default_site_url(),
            upi_id: default_upi_id(),
            upi_payee_name: None,
            currency: default_currency(),
            free_shipping_threshold: default_free_shipping_threshold(),
            shipping_fee: default_shipping_fee(),
            tax_rate: default_tax_rate(),
            pending_order_timeout_mins: default_pending_order_timeout_mins(),
        }
    }
}

impl StoreConfig {
    pub fn payee_name(&self) -> &str {
        self.upi_payee_name.as_deref().unwrap_or(&self.name)
    }
}

/// WhatsApp Business Cloud API credentials
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct WhatsAppConfig {
    /// Graph API base, overridable for tests
    #[serde(default = "default_whatsapp_api_base_url")]
    pub api_base_url: String,

    #[serde(default)]
    pub access_token: Option<String>,

    #[serde(default)]
    pub phone_number_id: Option<String>,

    /// Token Meta echoes back during the webhook subscription handshake
    #[serde(default)]
    pub webhook_verify_token: Option<String>,
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_whatsapp_api_base_url(),
            access_token: None,
            phone_number_id: None,
            webhook_verify_token: None,
        }
    }
}

impl WhatsAppConfig {
    pub fn is_configured(&self) -> bool {
        non_empty(&self.access_token) && non_empty(&self.phone_number_id)
    }
}

/// Razorpay gateway credentials
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct PaymentsConfig {
    #[serde(default = "default_razorpay_api_base_url")]
    pub razorpay_api_base_url: String,

    #[serde(default)]
    pub razorpay_key_id: Option<String>,

    #[serde(default)]
    pub razorpay_key_secret: Option<String>,

    /// Shared secret for `x-razorpay-signature` verification
    #[serde(default)]
    pub razorpay_webhook_secret: Option<String>,

    /// Seconds a processed webhook event id is remembered in Redis
    #[serde(default = "default_webhook_dedupe_ttl_secs")]
    pub webhook_dedupe_ttl_secs: u64,
}

impl Default for PaymentsConfig {
    fn default() -> Self {
        Self {
            razorpay_api_base_url: default_razorpay_api_base_url(),
            razorpay_key_id: None,
            razorpay_key_secret: None,
            razorpay_webhook_secret: None,
            webhook_dedupe_ttl_secs: default_webhook_dedupe_ttl_secs(),
        }
    }
}

/// Transactional email (Resend)
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct EmailConfig {
    #[serde(default = "default_email_api_base_url")]
    pub api_base_url: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default)]
    pub from_address: Option<String>,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_email_api_base_url(),
            api_key: None,
            from_address: None,
        }
    }
}

/// Object storage for customer uploads (Supabase Storage API)
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Project URL; objects live under `{api_base_url}/storage/v1`
    #[serde(default)]
    pub api_base_url: Option<String>,

    #[serde(default)]
    pub service_key: Option<String>,

    #[serde(default = "default_payment_proof_bucket")]
    #[validate(length(min = 1))]
    pub payment_proof_bucket: String,

    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            api_base_url: None,
            service_key: None,
            payment_proof_bucket: default_payment_proof_bucket(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

/// Cart abandonment tracker tuning
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct CartTrackingConfig {
    #[serde(default = "default_true_bool")]
    pub enabled: bool,

    /// "in-memory" or "redis"
    #[serde(default = "default_cart_backend")]
    #[validate(custom = "validate_cart_backend")]
    pub backend: String,

    #[serde(default = "default_abandonment_threshold_mins")]
    #[validate(range(min = 1))]
    pub abandonment_threshold_mins: i64,

    #[serde(default = "default_max_reminders")]
    pub max_reminders: u32,

    #[serde(default = "default_sweep_interval_secs")]
    #[validate(range(min = 1))]
    pub sweep_interval_secs: u64,

    #[serde(default = "default_eviction_hours")]
    #[validate(range(min = 1))]
    pub eviction_hours: i64,

    #[serde(default = "default_cart_namespace")]
    pub redis_namespace: String,
}

impl Default for CartTrackingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: default_cart_backend(),
            abandonment_threshold_mins: default_abandonment_threshold_mins(),
            max_reminders: default_max_reminders(),
            sweep_interval_secs: default_sweep_interval_secs(),
            eviction_hours: default_eviction_hours(),
            redis_namespace: default_cart_namespace(),
        }
    }
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Redis connection URL; enables webhook de-duplication and the redis cart store
    #[serde(default)]
    pub redis_url: Option<String>,

    /// JWT secret shared with the identity provider that issues session tokens
    #[validate(length(min = 64), custom = "validate_jwt_secret")]
    pub jwt_secret: String,

    /// Expected `iss` claim, if any
    #[serde(default)]
    pub jwt_issuer: Option<String>,

    /// Server host address
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    pub environment: String,

    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// CORS: comma-separated list of allowed origins (production)
    #[serde(default)]
    pub cors_allowed_origins: Option<String>,

    #[serde(default)]
    pub cors_allow_any_origin: bool,

    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_idle_timeout_secs")]
    pub db_idle_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Bearer secret expected by the cron endpoints
    #[serde(default)]
    pub cron_secret: Option<String>,

    #[serde(default = "default_event_channel_capacity")]
    #[validate(range(min = 1))]
    pub event_channel_capacity: usize,

    /// Timeout applied to outbound provider calls
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    #[serde(default)]
    #[validate]
    pub store: StoreConfig,

    #[serde(default)]
    #[validate]
    pub whatsapp: WhatsAppConfig,

    #[serde(default)]
    #[validate]
    pub payments: PaymentsConfig,

    #[serde(default)]
    #[validate]
    pub email: EmailConfig,

    #[serde(default)]
    #[validate]
    pub storage: StorageConfig,

    #[serde(default)]
    #[validate]
    pub cart_tracking: CartTrackingConfig,
}

impl AppConfig {
    /// Creates a configuration with defaults for everything but the essentials
    pub fn new(database_url: String, jwt_secret: String, environment: String) -> Self {
        Self {
            database_url,
            redis_url: None,
            jwt_secret,
            jwt_issuer: None,
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: false,
            cors_allowed_origins: None,
            cors_allow_any_origin: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_idle_timeout_secs: default_db_idle_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            cron_secret: None,
            event_channel_capacity: default_event_channel_capacity(),
            http_timeout_secs: default_http_timeout_secs(),
            store: StoreConfig::default(),
            whatsapp: WhatsAppConfig::default(),
            payments: PaymentsConfig::default(),
            email: EmailConfig::default(),
            storage: StorageConfig::default(),
            cart_tracking: CartTrackingConfig::default(),
        }
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
            || self.environment.eq_ignore_ascii_case("test")
    }

    /// Returns true if explicit CORS origins are configured
    pub fn has_cors_allowed_origins(&self) -> bool {
        self.cors_allowed_origins
            .as_ref()
            .map(|raw| raw.split(',').any(|origin| !origin.trim().is_empty()))
            .unwrap_or(false)
    }

    pub fn should_allow_permissive_cors(&self) -> bool {
        self.is_development() || self.cors_allow_any_origin
    }

    pub fn http_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.http_timeout_secs)
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if !self.should_allow_permissive_cors() && !self.has_cors_allowed_origins() {
            let mut err = ValidationError::new("cors_allowed_origins_required");
            err.message = Some(
                "Set APP__CORS_ALLOWED_ORIGINS for non-development environments or explicitly opt-in via APP__CORS_ALLOW_ANY_ORIGIN=true".into(),
            );
            errors.add("cors_allowed_origins", err);
        }

        if !self.is_development() && self.jwt_secret.trim() == DEV_DEFAULT_JWT_SECRET {
            let mut err = ValidationError::new("jwt_secret_default_dev");
            err.message = Some(
                "The bundled development JWT secret must not be used outside development. Set APP__JWT_SECRET to a unique, secure value."
                    .into(),
            );
            errors.add("jwt_secret", err);
        }

        if self.cart_tracking.backend.eq_ignore_ascii_case("redis") && self.redis_url.is_none() {
            let mut err = ValidationError::new("cart_tracking_redis_url");
            err.message = Some("cart_tracking.backend = \"redis\" requires APP__REDIS_URL".into());
            errors.add("redis_url", err);
        }

        if self.store.free_shipping_threshold < Decimal::ZERO
            || self.store.shipping_fee < Decimal::ZERO
            || self.store.tax_rate < Decimal::ZERO
            || self.store.tax_rate > Decimal::ONE
        {
            let mut err = ValidationError::new("store_pricing");
            err.message = Some(
                "shipping amounts must be non-negative and tax_rate must lie between 0 and 1"
                    .into(),
            );
            errors.add("store", err);
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn non_empty(value: &Option<String>) -> bool {
    value.as_deref().map(|v| !v.trim().is_empty()).unwrap_or(false)
}

/// Default value functions
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_true_bool() -> bool {
    true
}

fn default_db_max_connections() -> u32 {
    16
}
fn default_db_min_connections() -> u32 {
    2
}
fn default_db_connect_timeout_secs() -> u64 {
    30
}
fn default_db_idle_timeout_secs() -> u64 {
    600
}
fn default_db_acquire_timeout_secs() -> u64 {
    8
}

fn default_event_channel_capacity() -> usize {
    1024
}

fn default_http_timeout_secs() -> u64 {
    15
}

fn default_store_name() -> String {
    DEFAULT_STORE_NAME.to_string()
}

fn default_support_email() -> String {
    DEFAULT_SUPPORT_EMAIL.to_string()
}

fn default_store_phone() -> String {
    DEFAULT_STORE_PHONE.to_string()
}

fn default_site_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_upi_id() -> String {
    "elegancesarees@upi".to_string()
}

fn default_currency() -> String {
    "INR".to_string()
}

fn default_free_shipping_threshold() -> Decimal {
    dec!(999)
}

fn default_shipping_fee() -> Decimal {
    dec!(99)
}

fn default_tax_rate() -> Decimal {
    dec!(0.18)
}

fn default_pending_order_timeout_mins() -> i64 {
    30
}

fn default_whatsapp_api_base_url() -> String {
    "https://graph.facebook.com/v18.0".to_string()
}

fn default_razorpay_api_base_url() -> String {
    "https://api.razorpay.com/v1".to_string()
}

fn default_webhook_dedupe_ttl_secs() -> u64 {
    86_400
}

fn default_email_api_base_url() -> String {
    "https://api.resend.com".to_string()
}

fn default_payment_proof_bucket() -> String {
    "payment-proofs".to_string()
}

fn default_max_upload_bytes() -> usize {
    5 * 1024 * 1024
}

fn default_cart_backend() -> String {
    DEFAULT_CART_BACKEND.to_string()
}

fn default_abandonment_threshold_mins() -> i64 {
    30
}

fn default_max_reminders() -> u32 {
    3
}

fn default_sweep_interval_secs() -> u64 {
    300
}

fn default_eviction_hours() -> i64 {
    24
}

fn default_cart_namespace() -> String {
    "storefront:cart-session".to_string()
}

fn validate_cart_backend(value: &str) -> Result<(), ValidationError> {
    match value.to_ascii_lowercase().as_str() {
        "in-memory" | "redis" => Ok(()),
        _ => {
            let mut err = ValidationError::new("cart_tracking_backend");
            err.message = Some("Must be one of: in-memory, redis".into());
            Err(err)
        }
    }
}

fn validate_upi_id(value: &str) -> Result<(), ValidationError> {
    match value.split_once('@') {
        Some((handle, bank)) if !handle.is_empty() && !bank.is_empty() => Ok(()),
        _ => {
            let mut err = ValidationError::new("upi_id");
            err.message = Some("UPI id must look like handle@bank".into());
            Err(err)
        }
    }
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

fn validate_jwt_secret(secret: &str) -> Result<(), ValidationError> {
    let trimmed = secret.trim();

    if trimmed.len() < 64 {
        let mut err = ValidationError::new("jwt_secret");
        err.message =
            Some("JWT secret must be at least 64 characters for adequate security".into());
        return Err(err);
    }

    if let Some(first) = trimmed.chars().next() {
        if trimmed.chars().all(|c| c == first) {
            let mut err = ValidationError::new("jwt_secret");
            err.message = Some("JWT secret cannot be a repeated character sequence".into());
            return Err(err);
        }
    }

    let lower = trimmed.to_ascii_lowercase();
    let weak_fragments = ["changeme", "password", "12345", "abcdef"];
    if weak_fragments.iter().any(|pattern| lower.contains(pattern)) {
        let mut err = ValidationError::new("jwt_secret");
        err.message = Some(
            "JWT secret appears to be weak; use a cryptographically strong random string".into(),
        );
        return Err(err);
    }

    let unique_chars: std::collections::HashSet<char> = trimmed.chars().collect();
    if unique_chars.len() < 10 {
        let mut err = ValidationError::new("jwt_secret");
        err.message =
            Some("JWT secret must have at least 10 unique characters for adequate entropy".into());
        return Err(err);
    }

    Ok(())
}

/// Initializes tracing using the provided log level as the default filter
pub fn init_tracing(level: &str, json: bool) {
    use tracing_subscriber::fmt;

    let default_directive = format!("saree_storefront={},tower_http=debug", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    if json {
        let _ = fmt().with_env_filter(filter_directive).json().try_init();
    } else {
        let _ = fmt().with_env_filter(filter_directive).try_init();
    }
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    // jwt_secret has no default and must come from a file or APP__JWT_SECRET.
    let config = Config::builder()
        .set_default("database_url", "sqlite://storefront.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", run_env.as_str())?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    if config.get_string("jwt_secret").is_err() {
        error!("JWT secret is not configured. Set APP__JWT_SECRET (minimum 64 characters).");
        return Err(AppConfigError::Load(ConfigError::NotFound(
            "jwt_secret is required but not configured. Set APP__JWT_SECRET environment variable."
                .into(),
        )));
    }

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    app_config.validate_additional_constraints().map_err(|e| {
        error!("Configuration security validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}

#[cfg(test)]
mod validation_tests {
    use super::*;

    const SECRET: &str =
        "k7Gq2vNw9xRt4LmZp8YcHs3BfJd6UeQa1WoTiKnXgVbRyMzPl5CuEhSjDk0AqFwN8";

    fn base_config() -> AppConfig {
        AppConfig::new(
            "sqlite://storefront.db?mode=memory".into(),
            SECRET.into(),
            "production".into(),
        )
    }

    #[test]
    fn defaults_pass_field_validation() {
        let cfg = base_config();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.store.free_shipping_threshold, dec!(999));
        assert_eq!(cfg.store.shipping_fee, dec!(99));
        assert_eq!(cfg.store.payee_name(), "Elegance Sarees");
    }

    #[test]
    fn non_dev_requires_cors_origins() {
        let cfg = base_config();
        assert!(cfg.validate_additional_constraints().is_err());
    }

    #[test]
    fn non_dev_with_origins_passes() {
        let mut cfg = base_config();
        cfg.cors_allowed_origins = Some("https://elegancesarees.com".into());
        assert!(cfg.validate_additional_constraints().is_ok());
    }

    #[test]
    fn redis_cart_backend_requires_redis_url() {
        let mut cfg = base_config();
        cfg.environment = "development".into();
        cfg.cart_tracking.backend = "redis".into();
        let errors = cfg.validate_additional_constraints().unwrap_err();
        assert!(errors.field_errors().contains_key("redis_url"));

        cfg.redis_url = Some("redis://127.0.0.1:6379".into());
        assert!(cfg.validate_additional_constraints().is_ok());
    }

    #[test]
    fn rejects_unknown_cart_backend_and_bad_upi_id() {
        let mut cfg = base_config();
        cfg.cart_tracking.backend = "memcached".into();
        cfg.store.upi_id = "not-a-vpa".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_weak_jwt_secret() {
        assert!(validate_jwt_secret(&"a".repeat(80)).is_err());
        assert!(validate_jwt_secret("short").is_err());
        assert!(validate_jwt_secret(SECRET).is_ok());
    }

    #[test]
    fn tax_rate_above_one_is_rejected() {
        let mut cfg = base_config();
        cfg.environment = "development".into();
        cfg.store.tax_rate = dec!(18);
        assert!(cfg.validate_additional_constraints().is_err());
    }

    #[test]
    fn whatsapp_configured_requires_token_and_number() {
        let mut cfg = base_config();
        assert!(!cfg.whatsapp.is_configured());
        cfg.whatsapp.access_token = Some("token".into());
        assert!(!cfg.whatsapp.is_configured());
        cfg.whatsapp.phone_number_id = Some("1234".into());
        assert!(cfg.whatsapp.is_configured());
    }
}
