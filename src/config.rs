//! Application configuration loaded from environment variables.

use rust_decimal::Decimal;
use serde::Deserialize;
use strum::{Display, EnumString};

use crate::error::ConfigError;
use crate::market::DiscoverySettings;
use crate::orderbook::ReconnectConfig;

/// Operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Display, EnumString, Default)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Mode {
    /// Replay historical data. Not supported, rejected at startup.
    Backtest,
    /// Live market data, simulated position book.
    #[default]
    Simulate,
    /// Live market data with exchange credentials.
    Trade,
}

/// Which decision logic drives the pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Display, EnumString, Default)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StrategyKind {
    /// Open, grow and close hedged pairs on funding and spread signals.
    #[default]
    FundingRateArbitrage,
    /// Track funding and report, never change a position.
    Observe,
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // === Identity & Credentials ===
    /// Name reports are addressed to.
    #[serde(default = "default_owner")]
    pub bot_owner: String,

    /// Exchange API key.
    #[serde(default)]
    pub exchange_api_key: Option<String>,

    /// Exchange API secret.
    #[serde(default)]
    pub exchange_api_secret: Option<String>,

    /// Exchange subaccount name.
    #[serde(default)]
    pub exchange_subaccount: Option<String>,

    // === Operation Modes ===
    /// backtest, simulate or trade.
    #[serde(default)]
    pub mode: Mode,

    /// funding_rate_arbitrage or observe.
    #[serde(default)]
    pub strategy: StrategyKind,

    // === Strategy Parameters ===
    /// Leverage applied across both legs.
    #[serde(default = "default_leverage")]
    pub leverage: Decimal,

    /// Open a pair when the next-rate APR is at least this.
    #[serde(default = "default_start_apr")]
    pub start_apr_threshold: Decimal,

    /// Close a pair when its signed next-rate APR falls below this.
    #[serde(default = "default_stop_apr")]
    pub stop_apr_threshold: Decimal,

    /// Minimum inner spread to open a pair.
    #[serde(default = "default_start_spread")]
    pub start_future_spot_spread_rate: Decimal,

    /// Maximum outer spread to close a pair.
    #[serde(default)]
    pub stop_future_spot_spread_rate: Decimal,

    /// Inner spread gain over the entry spread needed to add size.
    #[serde(default = "default_increase_threshold")]
    pub increase_size_threshold: Decimal,

    /// Days of funding history in each window.
    #[serde(default = "default_prev_rate_days")]
    pub prev_rate_days: u32,

    /// Minimum USD per pair in one allocation batch.
    #[serde(default = "default_min_amount")]
    pub min_amount: Decimal,

    /// Share of the free balance handed out per batch.
    #[serde(default = "default_allocate_rate")]
    pub free_balance_allocate_rate: Decimal,

    /// Suffix of the quarterly contract in use.
    #[serde(default = "default_quarter")]
    pub quarter_contract_name: String,

    /// Comma-separated base assets never traded.
    #[serde(default)]
    pub blacklist: String,

    /// Taker fee rate per leg.
    #[serde(default = "default_fee_rate")]
    pub fee_rate: Decimal,

    // === Capital ===
    /// Free balance available for allocation at start.
    #[serde(default = "default_free_balance")]
    pub initial_free_balance: Decimal,

    /// Balance ROI is measured against.
    #[serde(default = "default_init_balance")]
    pub init_balance: Decimal,

    // === Schedules ===
    /// Pause between signal cycles in milliseconds.
    #[serde(default = "default_signal_interval")]
    pub signal_interval_ms: u64,

    /// Seconds before each hour the funding refresh runs.
    #[serde(default = "default_refresh_offset")]
    pub funding_refresh_offset_s: u64,

    /// Next-rate poll period in seconds.
    #[serde(default = "default_poll")]
    pub next_rate_poll_s: u64,

    /// Report period in seconds.
    #[serde(default = "default_report_interval")]
    pub report_interval_s: u64,

    // === Exchange Endpoints ===
    /// REST base URL.
    #[serde(default = "default_rest_url")]
    pub exchange_rest_url: String,

    /// WebSocket URL.
    #[serde(default = "default_ws_url")]
    pub exchange_ws_url: String,

    /// Maximum reconnect backoff in seconds.
    #[serde(default = "default_reconnect_max")]
    pub ws_reconnect_max_delay_s: u64,

    /// Ping interval in seconds.
    #[serde(default = "default_heartbeat")]
    pub ws_heartbeat_interval_s: u64,

    // === Notifications ===
    /// Telegram bot token. Reports go to the log when unset.
    #[serde(default)]
    pub telegram_token: Option<String>,

    /// Telegram chat receiving reports.
    #[serde(default)]
    pub telegram_chat_id: Option<String>,

    // === Server Configuration ===
    /// HTTP server port for health/status endpoints.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Prometheus exporter port.
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub rust_log: String,

    /// Enable verbose logging.
    #[serde(default)]
    pub verbose: bool,
}

fn default_owner() -> String {
    "owner".to_string()
}

fn default_leverage() -> Decimal {
    Decimal::new(5, 0)
}

fn default_start_apr() -> Decimal {
    Decimal::new(2, 0)
}

fn default_stop_apr() -> Decimal {
    Decimal::ONE
}

fn default_start_spread() -> Decimal {
    Decimal::new(3, 3) // 0.003
}

fn default_increase_threshold() -> Decimal {
    Decimal::new(5, 4) // 0.0005
}

fn default_prev_rate_days() -> u32 {
    7
}

fn default_min_amount() -> Decimal {
    Decimal::new(10, 0)
}

fn default_allocate_rate() -> Decimal {
    Decimal::new(2, 1) // 0.2
}

fn default_quarter() -> String {
    "0326".to_string()
}

fn default_fee_rate() -> Decimal {
    Decimal::new(7, 4) // 0.0007
}

fn default_free_balance() -> Decimal {
    Decimal::new(10_000, 0)
}

fn default_init_balance() -> Decimal {
    Decimal::new(1_000_000, 0)
}

fn default_signal_interval() -> u64 {
    1000
}

fn default_refresh_offset() -> u64 {
    30
}

fn default_poll() -> u64 {
    30
}

fn default_report_interval() -> u64 {
    3600
}

fn default_rest_url() -> String {
    "https://ftx.com".to_string()
}

fn default_ws_url() -> String {
    "wss://ftx.com/ws".to_string()
}

fn default_reconnect_max() -> u64 {
    30
}

fn default_heartbeat() -> u64 {
    15
}

fn default_port() -> u16 {
    8080
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Parameters the signal engine and allocator read on every cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyParams {
    /// Decision logic.
    pub kind: StrategyKind,
    /// Leverage applied across both legs.
    pub leverage: Decimal,
    /// Minimum next-rate APR to open or grow a pair.
    pub start_apr_threshold: Decimal,
    /// Signed APR below which an open pair may close.
    pub stop_apr_threshold: Decimal,
    /// Minimum inner spread to open.
    pub start_future_spot_spread_rate: Decimal,
    /// Maximum outer spread to close.
    pub stop_future_spot_spread_rate: Decimal,
    /// Inner minus entry spread needed to grow.
    pub increase_size_threshold: Decimal,
    /// Minimum USD per pair in a batch.
    pub min_amount: Decimal,
    /// Share of free balance allocated per batch.
    pub free_balance_allocate_rate: Decimal,
    /// Taker fee per leg.
    pub fee_rate: Decimal,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            kind: StrategyKind::default(),
            leverage: default_leverage(),
            start_apr_threshold: default_start_apr(),
            stop_apr_threshold: default_stop_apr(),
            start_future_spot_spread_rate: default_start_spread(),
            stop_future_spot_spread_rate: Decimal::ZERO,
            increase_size_threshold: default_increase_threshold(),
            min_amount: default_min_amount(),
            free_balance_allocate_rate: default_allocate_rate(),
            fee_rate: default_fee_rate(),
        }
    }
}

impl Config {
    /// Load configuration from environment, reading .env file first.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Ok(envy::from_env()?)
    }

    /// Check if the configuration is valid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mode == Mode::Backtest {
            return Err(ConfigError::invalid(
                "MODE",
                "backtesting is not supported, use simulate or trade",
            ));
        }

        if self.mode == Mode::Trade
            && (self.exchange_api_key.is_none() || self.exchange_api_secret.is_none())
        {
            return Err(ConfigError::invalid(
                "EXCHANGE_API_KEY",
                "trade mode requires EXCHANGE_API_KEY and EXCHANGE_API_SECRET",
            ));
        }

        if self.leverage <= Decimal::ZERO {
            return Err(ConfigError::invalid("LEVERAGE", "must be positive"));
        }

        if self.free_balance_allocate_rate <= Decimal::ZERO
            || self.free_balance_allocate_rate > Decimal::ONE
        {
            return Err(ConfigError::invalid(
                "FREE_BALANCE_ALLOCATE_RATE",
                "must be in (0, 1]",
            ));
        }

        if self.prev_rate_days == 0 {
            return Err(ConfigError::invalid("PREV_RATE_DAYS", "must be at least 1"));
        }

        if self.min_amount < Decimal::ZERO {
            return Err(ConfigError::invalid("MIN_AMOUNT", "must not be negative"));
        }

        if self.fee_rate < Decimal::ZERO || self.fee_rate >= Decimal::ONE {
            return Err(ConfigError::invalid("FEE_RATE", "must be in [0, 1)"));
        }

        if self.initial_free_balance < Decimal::ZERO {
            return Err(ConfigError::invalid(
                "INITIAL_FREE_BALANCE",
                "must not be negative",
            ));
        }

        if self.init_balance <= Decimal::ZERO {
            return Err(ConfigError::invalid("INIT_BALANCE", "must be positive"));
        }

        if self.signal_interval_ms == 0 || self.next_rate_poll_s == 0 || self.report_interval_s == 0
        {
            return Err(ConfigError::invalid(
                "SIGNAL_INTERVAL_MS",
                "schedule periods must be positive",
            ));
        }

        if self.ws_heartbeat_interval_s == 0 {
            return Err(ConfigError::invalid(
                "WS_HEARTBEAT_INTERVAL_S",
                "must be at least 1",
            ));
        }

        if self.ws_reconnect_max_delay_s == 0 {
            return Err(ConfigError::invalid(
                "WS_RECONNECT_MAX_DELAY_S",
                "must be at least 1",
            ));
        }

        if self.funding_refresh_offset_s >= 3600 {
            return Err(ConfigError::invalid(
                "FUNDING_REFRESH_OFFSET_S",
                "must be under one hour",
            ));
        }

        for (field, value, schemes) in [
            ("EXCHANGE_REST_URL", &self.exchange_rest_url, ["http", "https"]),
            ("EXCHANGE_WS_URL", &self.exchange_ws_url, ["ws", "wss"]),
        ] {
            let url = url::Url::parse(value)
                .map_err(|e| ConfigError::invalid(field, e.to_string()))?;
            if !schemes.contains(&url.scheme()) {
                return Err(ConfigError::invalid(
                    field,
                    format!("unsupported scheme {}", url.scheme()),
                ));
            }
        }

        if self.telegram_token.is_some() != self.telegram_chat_id.is_some() {
            return Err(ConfigError::invalid(
                "TELEGRAM_CHAT_ID",
                "TELEGRAM_TOKEN and TELEGRAM_CHAT_ID must be set together",
            ));
        }

        Ok(())
    }

    /// Blacklisted base assets.
    pub fn blacklist(&self) -> Vec<String> {
        self.blacklist
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Parameters for the signal engine.
    pub fn strategy_params(&self) -> StrategyParams {
        StrategyParams {
            kind: self.strategy,
            leverage: self.leverage,
            start_apr_threshold: self.start_apr_threshold,
            stop_apr_threshold: self.stop_apr_threshold,
            start_future_spot_spread_rate: self.start_future_spot_spread_rate,
            stop_future_spot_spread_rate: self.stop_future_spot_spread_rate,
            increase_size_threshold: self.increase_size_threshold,
            min_amount: self.min_amount,
            free_balance_allocate_rate: self.free_balance_allocate_rate,
            fee_rate: self.fee_rate,
        }
    }

    /// Parameters for pair discovery.
    pub fn discovery_settings(&self) -> DiscoverySettings {
        DiscoverySettings {
            quarter_contract_name: self.quarter_contract_name.clone(),
            blacklist: self.blacklist(),
            prev_rate_days: self.prev_rate_days,
        }
    }

    /// Feed reconnect policy.
    pub fn reconnect_config(&self) -> ReconnectConfig {
        ReconnectConfig::from_config(self.ws_reconnect_max_delay_s, self.ws_heartbeat_interval_s)
    }
}
