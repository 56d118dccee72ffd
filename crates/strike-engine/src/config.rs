//! Session configuration.
//!
//! Loaded once from TOML with environment variable overrides and immutable
//! for the life of the session.

use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use strike_common::{FeeSchedule, MarketIdent};

use crate::engine::ExecutorConfig;
use crate::risk::RiskLimits;

/// Top-level session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Market the session trades.
    pub market: MarketConfig,

    /// Risk limits and reconciliation tolerances.
    pub risk: RiskConfig,

    /// Session lifecycle parameters.
    pub session: SessionParams,

    /// Signal channels the strategy subscribes to.
    pub signals: SignalsConfig,

    /// Exchange fee rates.
    pub fees: FeesConfig,
}

/// Identity of the traded market.
#[derive(Debug, Clone)]
pub struct MarketConfig {
    pub ticker: String,
    pub strike_price: Decimal,
    pub expiry: DateTime<Utc>,
}

/// Risk limits and drift tolerances.
#[derive(Debug, Clone)]
pub struct RiskConfig {
    /// Maximum absolute position (contracts).
    pub max_position: i64,

    /// Maximum contracts per order.
    pub max_order_contracts: i64,

    /// Maximum committed capital (dollars).
    pub max_notional: Decimal,

    /// Reconcile fails the session below this balance.
    pub minimum_balance: Decimal,

    /// Position drift beyond this is logged as a discrepancy.
    pub max_position_deviation: i64,

    /// Balance drift beyond this is logged as a discrepancy.
    pub max_balance_deviation: Decimal,
}

/// Session lifecycle parameters.
#[derive(Debug, Clone)]
pub struct SessionParams {
    /// Hard deadline after which only flattening orders are allowed.
    pub terminal_exit: DateTime<Utc>,

    /// Balance assumed until the first reconcile.
    pub starting_balance: Decimal,

    /// Flatten attempts before failing with a residual position.
    pub flatten_retries: u32,

    /// Seconds between periodic reconciles.
    pub reconcile_interval_secs: u64,

    /// Horizon of the realized-volatility window (seconds).
    pub volatility_window_secs: u64,
}

/// Signal subscription configuration.
#[derive(Debug, Clone, Default)]
pub struct SignalsConfig {
    /// Channel names, e.g. `deribit.btc.index`.
    pub channels: Vec<String>,
}

/// Fee rates, defaulting to the standard binary-exchange schedule.
#[derive(Debug, Clone)]
pub struct FeesConfig {
    pub taker_rate: Decimal,
    pub maker_rate: Decimal,
}

impl SessionConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: TomlConfig = toml::from_str(content).context("Failed to parse TOML config")?;
        Self::try_from(file)
    }

    /// Apply environment variable overrides.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(ticker) = std::env::var("STRIKE_TICKER") {
            self.market.ticker = ticker;
        }
        if let Ok(raw) = std::env::var("STRIKE_MAX_POSITION") {
            self.risk.max_position = raw
                .parse()
                .context("STRIKE_MAX_POSITION must be an integer")?;
        }
        if let Ok(raw) = std::env::var("STRIKE_TERMINAL_EXIT") {
            self.session.terminal_exit = parse_rfc3339(&raw, "STRIKE_TERMINAL_EXIT")?;
        }
        Ok(())
    }

    /// Validate configuration and return errors for invalid values.
    pub fn validate(&self) -> Result<()> {
        if self.market.ticker.is_empty() {
            bail!("market.ticker must not be empty");
        }
        if self.risk.max_position <= 0 {
            bail!("risk.max_position must be positive");
        }
        if self.risk.max_order_contracts <= 0 {
            bail!("risk.max_order_contracts must be positive");
        }
        if self.risk.max_notional <= Decimal::ZERO {
            bail!("risk.max_notional must be positive");
        }
        if self.risk.minimum_balance < Decimal::ZERO {
            bail!("risk.minimum_balance must not be negative");
        }
        if self.session.starting_balance < self.risk.minimum_balance {
            bail!("session.starting_balance below risk.minimum_balance");
        }
        if self.session.terminal_exit > self.market.expiry {
            bail!("session.terminal_exit must not be after market expiry");
        }
        if self.session.volatility_window_secs == 0 {
            bail!("session.volatility_window_secs must be positive");
        }
        for rate in [self.fees.taker_rate, self.fees.maker_rate] {
            if rate < Decimal::ZERO || rate >= Decimal::ONE {
                bail!("fee rates must be in [0, 1)");
            }
        }
        Ok(())
    }

    pub fn market_ident(&self) -> MarketIdent {
        MarketIdent::new(
            self.market.ticker.clone(),
            self.market.strike_price,
            self.market.expiry,
        )
    }

    pub fn risk_limits(&self) -> RiskLimits {
        RiskLimits {
            max_position: self.risk.max_position,
            max_order_contracts: self.risk.max_order_contracts,
            max_notional: self.risk.max_notional,
            terminal_exit: self.session.terminal_exit,
        }
    }

    pub fn fee_schedule(&self) -> FeeSchedule {
        FeeSchedule::new(self.fees.taker_rate, self.fees.maker_rate)
    }

    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            ticker: self.market.ticker.clone(),
            limits: self.risk_limits(),
            fees: self.fee_schedule(),
            starting_balance: self.session.starting_balance,
            minimum_balance: self.risk.minimum_balance,
            max_position_deviation: self.risk.max_position_deviation,
            max_balance_deviation: self.risk.max_balance_deviation,
            flatten_retries: self.session.flatten_retries,
        }
    }
}

// ============================================================================
// TOML deserialization structures
// ============================================================================

#[derive(Debug, Deserialize)]
struct TomlConfig {
    market: MarketToml,
    #[serde(default)]
    risk: RiskToml,
    session: SessionToml,
    #[serde(default)]
    signals: SignalsToml,
    #[serde(default)]
    fees: FeesToml,
}

#[derive(Debug, Deserialize)]
struct MarketToml {
    ticker: String,
    strike_price: f64,
    expiry: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RiskToml {
    max_position: i64,
    max_order_contracts: i64,
    max_notional: f64,
    minimum_balance: f64,
    max_position_deviation: i64,
    max_balance_deviation: f64,
}

impl Default for RiskToml {
    fn default() -> Self {
        Self {
            max_position: 100,
            max_order_contracts: 50,
            max_notional: 100.0,
            minimum_balance: 0.0,
            max_position_deviation: 0,
            max_balance_deviation: 1.0,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SessionToml {
    terminal_exit: String,
    starting_balance: f64,
    #[serde(default = "default_flatten_retries")]
    flatten_retries: u32,
    #[serde(default = "default_reconcile_interval_secs")]
    reconcile_interval_secs: u64,
    #[serde(default = "default_volatility_window_secs")]
    volatility_window_secs: u64,
}

fn default_flatten_retries() -> u32 {
    3
}

fn default_reconcile_interval_secs() -> u64 {
    30
}

fn default_volatility_window_secs() -> u64 {
    300
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct SignalsToml {
    channels: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct FeesToml {
    taker_rate: f64,
    maker_rate: f64,
}

impl Default for FeesToml {
    fn default() -> Self {
        Self {
            taker_rate: 0.07,
            maker_rate: 0.0175,
        }
    }
}

fn f64_to_decimal(val: f64) -> Decimal {
    Decimal::try_from(val).unwrap_or(Decimal::ZERO)
}

fn parse_rfc3339(raw: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("{field} must be an RFC 3339 timestamp, got {raw:?}"))
}

impl TryFrom<TomlConfig> for SessionConfig {
    type Error = anyhow::Error;

    fn try_from(toml: TomlConfig) -> Result<Self> {
        Ok(Self {
            market: MarketConfig {
                ticker: toml.market.ticker,
                strike_price: f64_to_decimal(toml.market.strike_price),
                expiry: parse_rfc3339(&toml.market.expiry, "market.expiry")?,
            },
            risk: RiskConfig {
                max_position: toml.risk.max_position,
                max_order_contracts: toml.risk.max_order_contracts,
                max_notional: f64_to_decimal(toml.risk.max_notional),
                minimum_balance: f64_to_decimal(toml.risk.minimum_balance),
                max_position_deviation: toml.risk.max_position_deviation,
                max_balance_deviation: f64_to_decimal(toml.risk.max_balance_deviation),
            },
            session: SessionParams {
                terminal_exit: parse_rfc3339(&toml.session.terminal_exit, "session.terminal_exit")?,
                starting_balance: f64_to_decimal(toml.session.starting_balance),
                flatten_retries: toml.session.flatten_retries,
                reconcile_interval_secs: toml.session.reconcile_interval_secs,
                volatility_window_secs: toml.session.volatility_window_secs,
            },
            signals: SignalsConfig {
                channels: toml.signals.channels,
            },
            fees: FeesConfig {
                taker_rate: f64_to_decimal(toml.fees.taker_rate),
                maker_rate: f64_to_decimal(toml.fees.maker_rate),
            },
        })
    }
}
