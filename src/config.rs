use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Environment variables consulted when the config carries no credentials
pub const API_KEY_ENV: &str = "BINANCE_API_KEY";
pub const API_SECRET_ENV: &str = "BINANCE_API_SECRET";

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub exchange: ExchangeConfig,
    pub trading: TradingConfig,
    #[serde(default)]
    pub risk_management: RiskManagementConfig,
    #[serde(default)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub loops: LoopConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    /// Liquidate every open position when the circuit breaker pauses trading
    #[serde(default)]
    pub close_on_pause: bool,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Clone, Deserialize)]
pub struct ExchangeConfig {
    /// Exchange identifier (e.g., "binance")
    pub name: String,
    #[serde(default)]
    pub testnet: bool,
    /// API key; falls back to `BINANCE_API_KEY` when empty
    #[serde(default)]
    pub api_key: String,
    /// API secret; falls back to `BINANCE_API_SECRET` when empty
    #[serde(default)]
    pub api_secret: String,
    /// Skip the network handshake entirely (test setups)
    #[serde(default)]
    pub skip_connection: bool,
}

/// Resolved exchange credentials, wiped from memory on drop
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
}

impl Credentials {
    pub fn is_empty(&self) -> bool {
        self.api_key.is_empty() || self.api_secret.is_empty()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &if self.api_key.is_empty() { "<empty>" } else { "<redacted>" })
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

impl std::fmt::Debug for ExchangeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeConfig")
            .field("name", &self.name)
            .field("testnet", &self.testnet)
            .field("credentials", &self.credentials())
            .field("skip_connection", &self.skip_connection)
            .finish()
    }
}

impl ExchangeConfig {
    /// Credentials from config, with environment fallback per field
    pub fn credentials(&self) -> Credentials {
        let api_key = if self.api_key.is_empty() {
            std::env::var(API_KEY_ENV).unwrap_or_default()
        } else {
            self.api_key.clone()
        };
        let api_secret = if self.api_secret.is_empty() {
            std::env::var(API_SECRET_ENV).unwrap_or_default()
        } else {
            self.api_secret.clone()
        };
        Credentials { api_key, api_secret }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TradingConfig {
    /// Symbols subscribed and tracked from startup
    pub pairs: Vec<String>,
    /// Minimum 24h quote volume for the watchlist scanner
    #[serde(default = "default_min_volume")]
    pub min_volume_usdt: Decimal,
    /// Maximum number of symbols on the watchlist
    #[serde(default = "default_max_pairs")]
    pub max_pairs: usize,
    /// Market scanner interval in seconds
    #[serde(default = "default_scan_interval")]
    pub scan_interval_secs: u64,
    /// Capital the risk engine measures drawdown against
    pub initial_balance: Decimal,
}

fn default_min_volume() -> Decimal {
    dec!(1_000_000)
}

fn default_max_pairs() -> usize {
    10
}

fn default_scan_interval() -> u64 {
    300
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RiskManagementConfig {
    /// Drawdown ratio that only logs a warning (e.g., 0.15 = 15%)
    pub max_drawdown_warning: Decimal,
    /// Drawdown ratio that pauses trading (e.g., 0.20 = 20%)
    pub max_drawdown_critical: Decimal,
    /// Daily loss ratio that logs a warning (e.g., 0.05 = 5%)
    pub max_daily_loss: Decimal,
    /// Distance of the trailing stop from the best price seen
    pub trailing_stop_pct: Decimal,
}

impl Default for RiskManagementConfig {
    fn default() -> Self {
        Self {
            max_drawdown_warning: dec!(0.15),
            max_drawdown_critical: dec!(0.20),
            max_daily_loss: dec!(0.05),
            trailing_stop_pct: dec!(0.02),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    pub name: String,
    /// Strategy execution loop interval in seconds
    pub interval_secs: u64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            name: "multi_signal".to_string(),
            interval_secs: 60,
        }
    }
}

/// Cadence and error backoff of the periodic control loops
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    pub scanner_backoff_secs: u64,
    pub strategy_backoff_secs: u64,
    pub risk_interval_secs: u64,
    pub risk_backoff_secs: u64,
    pub performance_interval_secs: u64,
    pub health_interval_secs: u64,
    /// Upper bound on any single collaborator call
    pub call_timeout_secs: u64,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            scanner_backoff_secs: 60,
            strategy_backoff_secs: 10,
            risk_interval_secs: 30,
            risk_backoff_secs: 60,
            performance_interval_secs: 300,
            health_interval_secs: 60,
            call_timeout_secs: 30,
        }
    }
}

impl LoopConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Write a snapshot on every performance tracker cycle
    pub save_state: bool,
    pub state_file: String,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            save_state: true,
            state_file: "data/bot_state.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
    /// Directory for the daily rolling log file
    #[serde(default)]
    pub dir: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            dir: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from `config/default.toml` and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration from an explicit file (required) or the default
    /// location (optional), then apply `VIGIL_*` environment overrides.
    pub fn load_from(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(p) => File::from(p).required(true),
            None => File::from(Path::new("config/default.toml")).required(false),
        };

        let builder = Config::builder()
            // Start with default values
            .set_default("exchange.name", "binance")?
            .set_default("exchange.testnet", true)?
            .set_default("trading.pairs", Vec::<String>::new())?
            .set_default("trading.initial_balance", 10_000)?
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .add_source(file)
            // Override with environment variables (VIGIL_EXCHANGE__TESTNET, etc.)
            .add_source(
                Environment::with_prefix("VIGIL")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("trading.pairs")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Create a default configuration for paper runs and tests
    pub fn default_config(pairs: &[&str]) -> Self {
        Self {
            exchange: ExchangeConfig {
                name: "binance".to_string(),
                testnet: true,
                api_key: String::new(),
                api_secret: String::new(),
                skip_connection: false,
            },
            trading: TradingConfig {
                pairs: pairs.iter().map(|p| p.to_string()).collect(),
                min_volume_usdt: default_min_volume(),
                max_pairs: default_max_pairs(),
                scan_interval_secs: default_scan_interval(),
                initial_balance: dec!(10_000),
            },
            risk_management: RiskManagementConfig::default(),
            strategy: StrategyConfig::default(),
            loops: LoopConfig::default(),
            persistence: PersistenceConfig::default(),
            close_on_pause: false,
            logging: LoggingConfig::default(),
        }
    }

    /// Validate configuration values
    pub fn validate(&self, paper_trading: bool) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.exchange.name.trim().is_empty() {
            errors.push("exchange.name must not be empty".to_string());
        }

        if self.trading.pairs.is_empty() {
            errors.push("trading.pairs must list at least one symbol".to_string());
        }

        if self.trading.initial_balance <= Decimal::ZERO {
            errors.push("trading.initial_balance must be positive".to_string());
        }

        let risk = &self.risk_management;
        for (name, value) in [
            ("max_drawdown_warning", risk.max_drawdown_warning),
            ("max_drawdown_critical", risk.max_drawdown_critical),
            ("max_daily_loss", risk.max_daily_loss),
        ] {
            if value <= Decimal::ZERO || value >= Decimal::ONE {
                errors.push(format!("risk_management.{name} must be between 0 and 1"));
            }
        }
        if risk.max_drawdown_warning >= risk.max_drawdown_critical {
            errors.push(
                "risk_management.max_drawdown_warning must be below max_drawdown_critical"
                    .to_string(),
            );
        }

        let loops = &self.loops;
        if self.trading.scan_interval_secs == 0
            || self.strategy.interval_secs == 0
            || loops.risk_interval_secs == 0
            || loops.performance_interval_secs == 0
            || loops.health_interval_secs == 0
            || loops.call_timeout_secs == 0
        {
            errors.push("loop intervals and call timeout must be positive".to_string());
        }
        if loops.scanner_backoff_secs == 0
            || loops.strategy_backoff_secs == 0
            || loops.risk_backoff_secs == 0
        {
            errors.push("loop backoffs must be positive".to_string());
        }

        if !paper_trading && !self.exchange.skip_connection && self.exchange.credentials().is_empty()
        {
            errors.push(format!(
                "live trading requires exchange credentials (config or {API_KEY_ENV}/{API_SECRET_ENV})"
            ));
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

    #[test]
    fn test_default_config_is_valid_for_paper() {
        let config = AppConfig::default_config(&["BTC/USDT"]);
        assert!(config.validate(true).is_ok());
    }

    #[test]
    fn test_validate_collects_every_violation() {
        let mut config = AppConfig::default_config(&[]);
        config.trading.initial_balance = Decimal::ZERO;
        config.risk_management.max_drawdown_warning = dec!(0.30);

        let errors = config.validate(true).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("trading.pairs")));
        assert!(errors.iter().any(|e| e.contains("initial_balance")));
        assert!(errors.iter().any(|e| e.contains("below max_drawdown_critical")));
    }

    #[test]
    fn test_zero_backoff_is_rejected() {
        let mut config = AppConfig::default_config(&["BTC/USDT"]);
        config.loops.risk_backoff_secs = 0;

        let errors = config.validate(true).unwrap_err();
        assert_eq!(errors, vec!["loop backoffs must be positive".to_string()]);
    }

    #[test]
    fn test_env_overrides_single_underscore_after_prefix() {
        let dir = std::env::temp_dir().join(format!("vigil-config-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("bot.toml");
        std::fs::write(
            &path,
            "[exchange]\nname = \"binance\"\n\n[trading]\npairs = [\"BTC/USDT\"]\ninitial_balance = 5000\n",
        )
        .unwrap();

        std::env::set_var("VIGIL_EXCHANGE__NAME", "kraken");
        std::env::set_var("VIGIL_TRADING__PAIRS", "SOL/USDT,ADA/USDT");
        let loaded = AppConfig::load_from(Some(&path));
        std::env::remove_var("VIGIL_EXCHANGE__NAME");
        std::env::remove_var("VIGIL_TRADING__PAIRS");
        let _ = std::fs::remove_dir_all(&dir);

        let config = loaded.unwrap();
        assert_eq!(config.exchange.name, "kraken");
        assert_eq!(config.trading.pairs, vec!["SOL/USDT", "ADA/USDT"]);
        assert_eq!(config.trading.initial_balance, dec!(5000));
    }

    #[test]
    fn test_configured_credentials_take_precedence() {
        let mut config = AppConfig::default_config(&["BTC/USDT"]);
        config.exchange.api_key = "key".to_string();
        config.exchange.api_secret = "secret".to_string();

        let creds = config.exchange.credentials();
        assert_eq!(creds.api_key, "key");
        assert_eq!(creds.api_secret, "secret");
        assert!(!format!("{creds:?}").contains("\"secret\""));
        assert!(!format!("{config:?}").contains("\"secret\""));
    }

    #[test]
    fn test_live_mode_with_connection_requires_credentials() {
        let mut config = AppConfig::default_config(&["BTC/USDT"]);
        config.exchange.skip_connection = false;
        config.exchange.api_key = "key".to_string();
        config.exchange.api_secret = "secret".to_string();
        assert!(config.validate(false).is_ok());
    }
}
