use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use vesta_pricing::markup::MarkupConfig;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub kafka: KafkaConfig,
    pub auth: AuthConfig,
    pub pricing: PricingRules,
    pub payment: PaymentRules,
    pub commission: CommissionRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_expiration_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PricingRules {
    /// Percentage applied to the first confirmed booking of a referred
    /// guest, on top of any code-based discount rules.
    #[serde(default)]
    pub referral_first_booking_pct: f64,
    /// Fallback market rates keyed "BASE:TARGET", used when no live feed
    /// is wired in. See [`crate::fx::ConfigRateSource`].
    #[serde(default)]
    pub fx_rates: HashMap<String, f64>,
    #[serde(default = "default_fx_ttl")]
    pub fx_cache_ttl_seconds: u64,
    /// Markup bands and role percentages for the pricing engine. Falls
    /// back to the built-in curve when the section is absent.
    #[serde(default)]
    pub markup: MarkupConfig,
}

fn default_fx_ttl() -> u64 {
    300
}

#[derive(Debug, Deserialize, Clone)]
pub struct PaymentRules {
    pub provider: String,
    pub webhook_secret: String,
    /// Absolute minor-unit slack allowed between the settled amount and the
    /// expected charge.
    #[serde(default = "default_tolerance")]
    pub settlement_tolerance_minor: i64,
    /// Inventory kinds (wire names) that hold at PENDING after capture
    /// until an operator confirms.
    #[serde(default = "default_manual_gate")]
    pub manual_confirmation_kinds: Vec<String>,
    #[serde(default = "default_supplier_timeout")]
    pub supplier_timeout_seconds: u64,
}

fn default_tolerance() -> i64 {
    1
}

fn default_manual_gate() -> Vec<String> {
    vec!["HOME".to_string()]
}

fn default_supplier_timeout() -> u64 {
    20
}

#[derive(Debug, Deserialize, Clone)]
pub struct CommissionRules {
    pub rate_pct: f64,
    pub cap_amount: f64,
    pub cap_currency: String,
    /// Days after checkout before a held commission becomes eligible.
    pub hold_days: i64,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment file, optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides, not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg. `VESTA__SERVER__PORT=8080`
            .add_source(config::Environment::with_prefix("VESTA").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
