use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::coordination::BackoffPolicy;
use crate::supervisor::ResourceMonitorConfig;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub supervisor: SupervisorSettings,
    #[serde(default)]
    pub resources: ResourceSettings,
    pub indexer: IndexerSettings,
    pub predictor: PredictorSettings,
    /// One agent is constructed per entry, in listed order
    pub markets: Vec<MarketSettings>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Scheduling-loop and failure-recovery settings
#[derive(Debug, Clone, Deserialize)]
pub struct SupervisorSettings {
    /// Seconds between tick boundaries
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,
    /// Per-agent budget within one tick; a timeout counts as a transient
    /// failure
    #[serde(default = "default_agent_timeout")]
    pub agent_timeout_secs: u64,
    /// How long in-flight work may drain after a shutdown signal
    #[serde(default = "default_drain_grace")]
    pub drain_grace_secs: u64,
    /// Consecutive failures before a collaborator circuit opens
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
    /// Backoff floor for circuit recovery
    #[serde(default = "default_backoff_base")]
    pub backoff_base_secs: u64,
    /// Backoff ceiling for circuit recovery
    #[serde(default = "default_backoff_max")]
    pub backoff_max_secs: u64,
}

fn default_tick_interval() -> u64 {
    15
}

fn default_agent_timeout() -> u64 {
    10
}

fn default_drain_grace() -> u64 {
    30
}

fn default_max_consecutive_failures() -> u32 {
    5
}

fn default_backoff_base() -> u64 {
    5
}

fn default_backoff_max() -> u64 {
    300
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval(),
            agent_timeout_secs: default_agent_timeout(),
            drain_grace_secs: default_drain_grace(),
            max_consecutive_failures: default_max_consecutive_failures(),
            backoff_base_secs: default_backoff_base(),
            backoff_max_secs: default_backoff_max(),
        }
    }
}

impl SupervisorSettings {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn agent_timeout(&self) -> Duration {
        Duration::from_secs(self.agent_timeout_secs)
    }

    pub fn drain_grace(&self) -> Duration {
        Duration::from_secs(self.drain_grace_secs)
    }

    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            Duration::from_secs(self.backoff_base_secs),
            Duration::from_secs(self.backoff_max_secs),
        )
    }
}

/// Resource monitor thresholds
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceSettings {
    #[serde(default = "default_memory_warning_mb")]
    pub memory_warning_mb: u64,
    #[serde(default = "default_memory_ceiling_mb")]
    pub memory_ceiling_mb: u64,
    #[serde(default = "default_sample_retention")]
    pub sample_retention: usize,
    #[serde(default = "default_baseline_ticks")]
    pub baseline_ticks: usize,
    #[serde(default = "default_degradation_factor")]
    pub degradation_factor: f64,
}

fn default_memory_warning_mb() -> u64 {
    1000
}

fn default_memory_ceiling_mb() -> u64 {
    4096
}

fn default_sample_retention() -> usize {
    100
}

fn default_baseline_ticks() -> usize {
    10
}

fn default_degradation_factor() -> f64 {
    2.0
}

impl Default for ResourceSettings {
    fn default() -> Self {
        Self {
            memory_warning_mb: default_memory_warning_mb(),
            memory_ceiling_mb: default_memory_ceiling_mb(),
            sample_retention: default_sample_retention(),
            baseline_ticks: default_baseline_ticks(),
            degradation_factor: default_degradation_factor(),
        }
    }
}

impl ResourceSettings {
    pub fn monitor_config(&self) -> ResourceMonitorConfig {
        ResourceMonitorConfig {
            warning_threshold_mb: self.memory_warning_mb,
            ceiling_mb: self.memory_ceiling_mb,
            retention: self.sample_retention,
            baseline_ticks: self.baseline_ticks,
            degradation_factor: self.degradation_factor,
        }
    }
}

/// Blockchain indexer endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct IndexerSettings {
    pub base_url: String,
    #[serde(default = "default_network")]
    pub network: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Trailing window of history fetched for volatility estimation
    #[serde(default = "default_history_lookback")]
    pub history_lookback_secs: u64,
}

fn default_network() -> String {
    "mainnet".to_string()
}

fn default_request_timeout() -> u64 {
    10
}

fn default_history_lookback() -> u64 {
    3600
}

impl IndexerSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn history_lookback(&self) -> Duration {
        Duration::from_secs(self.history_lookback_secs)
    }
}

/// Prediction service endpoint and gating
#[derive(Debug, Clone, Deserialize)]
pub struct PredictorSettings {
    pub base_url: String,
    pub model_id: String,
    /// Bearer token; prefer `HELMSMAN_PREDICTOR__API_KEY` over config files
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_horizon")]
    pub horizon_secs: u64,
    /// Predictions below this confidence are ignored
    #[serde(default = "default_min_confidence")]
    pub min_confidence: Decimal,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_horizon() -> u64 {
    300
}

fn default_min_confidence() -> Decimal {
    Decimal::new(6, 1) // 0.6
}

impl PredictorSettings {
    pub fn horizon(&self) -> Duration {
        Duration::from_secs(self.horizon_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Per-market agent settings
#[derive(Debug, Clone, Deserialize)]
pub struct MarketSettings {
    pub id: String,
    pub min_trade_size: Decimal,
    pub max_trade_size: Decimal,
    /// Taker fee as a fraction of notional
    #[serde(default = "default_fee_rate")]
    pub fee_rate: Decimal,
    /// Minimum net edge required to act
    #[serde(default = "default_min_edge")]
    pub min_edge: Decimal,
    pub risk: RiskParameters,
}

fn default_fee_rate() -> Decimal {
    Decimal::new(1, 3) // 0.001
}

fn default_min_edge() -> Decimal {
    Decimal::new(5, 3) // 0.005
}

/// Risk limits for one market. Immutable after load; shared read-only
/// between the agent and the supervisor.
#[derive(Debug, Clone, Deserialize)]
pub struct RiskParameters {
    /// Largest position (base units) the agent may hold
    pub max_position_size: Decimal,
    /// Worst acceptable fill as a fraction away from mid
    pub max_slippage: Decimal,
    /// Stop distance as a fraction of entry price
    pub stop_loss: Decimal,
    #[serde(default = "default_max_daily_trades")]
    pub max_daily_trades: u32,
    /// Trading pause after a loss streak
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    /// Losses in a row before the cooldown engages
    #[serde(default = "default_max_consecutive_losses")]
    pub max_consecutive_losses: u32,
}

fn default_max_daily_trades() -> u32 {
    10
}

fn default_cooldown_secs() -> u64 {
    300
}

fn default_max_consecutive_losses() -> u32 {
    3
}

impl RiskParameters {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
    /// Directory for rotated log files; console-only when unset
    #[serde(default)]
    pub directory: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g. config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("HELMSMAN_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (HELMSMAN_INDEXER__BASE_URL, etc.)
            .add_source(
                Environment::with_prefix("HELMSMAN")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.supervisor.tick_interval_secs == 0 {
            errors.push("tick_interval_secs must be positive".to_string());
        }

        if self.supervisor.backoff_base_secs > self.supervisor.backoff_max_secs {
            errors.push("backoff_base_secs must not exceed backoff_max_secs".to_string());
        }

        if self.resources.memory_warning_mb > self.resources.memory_ceiling_mb {
            errors.push("memory_warning_mb must not exceed memory_ceiling_mb".to_string());
        }

        if self.indexer.base_url.is_empty() {
            errors.push("indexer.base_url is required".to_string());
        }

        if self.predictor.base_url.is_empty() {
            errors.push("predictor.base_url is required".to_string());
        }

        if self.predictor.model_id.is_empty() {
            errors.push("predictor.model_id is required".to_string());
        }

        if self.predictor.api_key.is_empty() {
            errors.push(
                "predictor API key is required (set HELMSMAN_PREDICTOR__API_KEY)".to_string(),
            );
        }

        if self.predictor.min_confidence <= Decimal::ZERO
            || self.predictor.min_confidence > Decimal::ONE
        {
            errors.push("predictor.min_confidence must be in (0, 1]".to_string());
        }

        if self.markets.is_empty() {
            errors.push("at least one market must be configured".to_string());
        }

        for market in &self.markets {
            let id = &market.id;

            if market.min_trade_size > market.max_trade_size {
                errors.push(format!("{id}: min_trade_size exceeds max_trade_size"));
            }

            if market.risk.max_position_size <= Decimal::ZERO {
                errors.push(format!("{id}: max_position_size must be positive"));
            }

            if market.risk.max_slippage < Decimal::ZERO || market.risk.max_slippage >= Decimal::ONE
            {
                errors.push(format!("{id}: max_slippage must be in [0, 1)"));
            }

            if market.risk.stop_loss <= Decimal::ZERO || market.risk.stop_loss >= Decimal::ONE {
                errors.push(format!("{id}: stop_loss must be in (0, 1)"));
            }

            if market.risk.max_daily_trades == 0 {
                errors.push(format!("{id}: max_daily_trades must be positive"));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    pub(crate) fn sample_market(id: &str) -> MarketSettings {
        MarketSettings {
            id: id.to_string(),
            min_trade_size: dec!(0.1),
            max_trade_size: dec!(5),
            fee_rate: default_fee_rate(),
            min_edge: default_min_edge(),
            risk: RiskParameters {
                max_position_size: dec!(10),
                max_slippage: dec!(0.01),
                stop_loss: dec!(0.05),
                max_daily_trades: 10,
                cooldown_secs: 300,
                max_consecutive_losses: 3,
            },
        }
    }

    fn sample_config() -> AppConfig {
        AppConfig {
            supervisor: SupervisorSettings::default(),
            resources: ResourceSettings::default(),
            indexer: IndexerSettings {
                base_url: "https://indexer.example".to_string(),
                network: default_network(),
                request_timeout_secs: default_request_timeout(),
                history_lookback_secs: default_history_lookback(),
            },
            predictor: PredictorSettings {
                base_url: "https://api.allora.example".to_string(),
                model_id: "model-7".to_string(),
                api_key: "key".to_string(),
                horizon_secs: default_horizon(),
                min_confidence: default_min_confidence(),
                request_timeout_secs: default_request_timeout(),
            },
            markets: vec![sample_market("inj-usdt")],
            logging: LoggingConfig::default(),
        }
    }

    #[test]
    fn test_sample_config_is_valid() {
        assert!(sample_config().validate().is_ok());
    }

    #[test]
    fn test_validation_collects_all_errors() {
        let mut config = sample_config();
        config.markets.clear();
        config.predictor.api_key.clear();
        config.supervisor.backoff_base_secs = 600;

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn test_market_risk_validation() {
        let mut config = sample_config();
        config.markets[0].risk.max_position_size = dec!(0);
        config.markets[0].risk.stop_loss = dec!(1.5);

        let errors = config.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("max_position_size")));
        assert!(errors.iter().any(|e| e.contains("stop_loss")));
    }

    #[test]
    fn test_supervisor_durations() {
        let settings = SupervisorSettings::default();
        assert_eq!(settings.tick_interval(), Duration::from_secs(15));
        assert_eq!(settings.backoff().base_delay(), Duration::from_secs(5));
        assert_eq!(settings.backoff().max_delay(), Duration::from_secs(300));
    }
}
