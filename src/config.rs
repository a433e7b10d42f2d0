//! Environment-based configuration.
//!
//! Credentials and strategy defaults come from environment variables (a
//! `.env` file is honored via dotenvy in the entry point). The strategy
//! defaults are carried as an explicit struct handed to the scheduler, not
//! read from ambient state.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::env;
use std::path::PathBuf;

/// Defaults applied when the CLI omits ladder parameters.
#[derive(Debug, Clone)]
pub struct StrategyDefaults {
    pub order_count: u32,
    pub start_quantity: u32,
    /// Step between consecutive rungs, in percent.
    pub price_decrease_percent: Decimal,
    /// First GTT rung's discount below base when the market is closed.
    pub first_gtt_discount_percent: Decimal,
    pub max_quantity: u32,
}

impl Default for StrategyDefaults {
    fn default() -> Self {
        Self {
            order_count: 10,
            start_quantity: 1,
            price_decrease_percent: dec!(0.4),
            first_gtt_discount_percent: dec!(0.25),
            max_quantity: 100,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub kite_api_key: String,
    pub kite_access_token: String,
    pub kite_base_url: String,
    pub exchange: String,
    pub strategy: StrategyDefaults,
    pub orders_dir: PathBuf,
    pub logs_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let defaults = StrategyDefaults::default();

        let strategy = StrategyDefaults {
            order_count: parse_u32("ORDER_COUNT", defaults.order_count)?,
            start_quantity: parse_u32("START_QUANTITY", defaults.start_quantity)?,
            price_decrease_percent: parse_decimal(
                "PRICE_DECREASE_PERCENT",
                defaults.price_decrease_percent,
            )?,
            first_gtt_discount_percent: parse_decimal(
                "FIRST_GTT_DISCOUNT_PCT",
                defaults.first_gtt_discount_percent,
            )?,
            max_quantity: parse_u32("MAX_QUANTITY", defaults.max_quantity)?,
        };

        let workdir =
            PathBuf::from(env::var("WORKDIR").unwrap_or_else(|_| "workdir".to_string()));

        Ok(Self {
            kite_api_key: env::var("KITE_API_KEY").unwrap_or_default(),
            kite_access_token: env::var("KITE_ACCESS_TOKEN").unwrap_or_default(),
            kite_base_url: env::var("KITE_BASE_URL")
                .unwrap_or_else(|_| "https://api.kite.trade".to_string()),
            exchange: env::var("KITE_EXCHANGE").unwrap_or_else(|_| "NSE".to_string()),
            strategy,
            orders_dir: workdir.join("orders"),
            logs_dir: workdir.join("logs"),
        })
    }

    /// Placement and deletion both need live credentials; fail early with a
    /// pointer at the missing variable instead of a broker 403 later.
    pub fn require_credentials(&self) -> Result<()> {
        if self.kite_api_key.is_empty() {
            anyhow::bail!("KITE_API_KEY is not set");
        }
        if self.kite_access_token.is_empty() {
            anyhow::bail!("KITE_ACCESS_TOKEN is not set");
        }
        Ok(())
    }
}

fn parse_u32(key: &str, default: u32) -> Result<u32> {
    match env::var(key) {
        Ok(raw) => raw
            .parse::<u32>()
            .with_context(|| format!("Failed to parse {key}: {raw:?} is not a positive integer")),
        Err(_) => Ok(default),
    }
}

fn parse_decimal(key: &str, default: Decimal) -> Result<Decimal> {
    match env::var(key) {
        Ok(raw) => raw
            .parse::<Decimal>()
            .with_context(|| format!("Failed to parse {key}: {raw:?} is not a decimal number")),
        Err(_) => Ok(default),
    }
}
