use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use rustgtt::application::deleter::GttDeleter;
use rustgtt::application::scheduler::{LadderScheduler, ScheduleRequest};
use rustgtt::application::sell::{SellRequest, SellScheduler};
use rustgtt::config::Config;
use rustgtt::domain::ports::{BrokerClient, ConfirmationGate};
use rustgtt::infrastructure::console::{AutoConfirm, StdinConfirmation};
use rustgtt::infrastructure::kite::KiteBrokerClient;
use rustgtt::infrastructure::persistence::JsonSummarySink;
use std::sync::Arc;
use tracing::{Level, info};
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(name = "rustgtt", about = "Schedule and manage GTT order ladders on Kite")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Place a ladder of GTT orders below a base price.
    ///
    /// Numeric arguments are positional: one means the base price, two mean
    /// order count then base price, three mean order count, base price and
    /// max quantity. A base price of 0 fetches the live quote instead.
    Schedule {
        symbol: String,
        /// [order_count] <base_price> [max_quantity]
        #[arg(value_name = "NUM", num_args = 1..=3)]
        numbers: Vec<Decimal>,
        /// Quantity for the first rung.
        #[arg(long = "startq")]
        start_quantity: Option<u32>,
        /// Skip the confirmation prompt.
        #[arg(long = "yes")]
        yes: bool,
    },
    /// Place one GTT sell order that nets a target profit % after charges.
    Sell {
        symbol: String,
        /// Target net profit percentage, e.g. 2.5.
        net_profit_percent: Decimal,
        /// Quantity to sell (default: all holdings).
        #[arg(long, short)]
        quantity: Option<u32>,
        /// Skip the confirmation prompt.
        #[arg(long = "yes")]
        yes: bool,
    },
    /// Delete every active GTT order for a symbol.
    Delete {
        symbol: String,
        /// Skip the confirmation prompt.
        #[arg(long = "yes")]
        yes: bool,
    },
}

/// Resolved positional numbers for the schedule command.
#[derive(Debug, PartialEq)]
struct ScheduleArgs {
    order_count: Option<u32>,
    base_price: Decimal,
    max_quantity: Option<u32>,
}

fn parse_schedule_numbers(numbers: &[Decimal]) -> Result<ScheduleArgs> {
    let as_u32 = |d: Decimal, what: &str| -> Result<u32> {
        use rust_decimal::prelude::ToPrimitive;
        if d.fract() != Decimal::ZERO || d.is_sign_negative() {
            bail!("{what} must be a non-negative integer, got {d}");
        }
        d.to_u32()
            .with_context(|| format!("{what} out of range: {d}"))
    };
    match numbers {
        [price] => Ok(ScheduleArgs {
            order_count: None,
            base_price: *price,
            max_quantity: None,
        }),
        [count, price] => Ok(ScheduleArgs {
            order_count: Some(as_u32(*count, "order count")?),
            base_price: *price,
            max_quantity: None,
        }),
        [count, price, max_qty] => Ok(ScheduleArgs {
            order_count: Some(as_u32(*count, "order count")?),
            base_price: *price,
            max_quantity: Some(as_u32(*max_qty, "max quantity")?),
        }),
        _ => bail!("Expected 1 to 3 numeric arguments: [order_count] <base_price> [max_quantity]"),
    }
}

fn init_logging(config: &Config) -> Result<()> {
    std::fs::create_dir_all(&config.logs_dir).with_context(|| {
        format!("Failed to create logs directory {}", config.logs_dir.display())
    })?;
    let log_path = config
        .logs_dir
        .join(format!("gtt_orders_{}.log", chrono::Utc::now().format("%Y%m%d")));
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .without_time();
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(Arc::new(log_file))
        .with_ansi(false)
        .with_target(false);

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(stdout_layer)
        .with(file_layer)
        .init();
    Ok(())
}

fn gate_for(yes: bool) -> Arc<dyn ConfirmationGate> {
    if yes {
        Arc::new(AutoConfirm)
    } else {
        Arc::new(StdinConfirmation)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = Config::from_env()?;
    init_logging(&config)?;
    config.require_credentials()?;

    let broker: Arc<dyn BrokerClient> = Arc::new(KiteBrokerClient::new(
        config.kite_base_url.clone(),
        config.kite_api_key.clone(),
        config.kite_access_token.clone(),
        config.exchange.clone(),
    ));
    let sink = Arc::new(JsonSummarySink::new(config.orders_dir.clone()));

    match cli.command {
        Command::Schedule {
            symbol,
            numbers,
            start_quantity,
            yes,
        } => {
            let args = parse_schedule_numbers(&numbers)?;
            let base_price = if args.base_price.is_zero() {
                let ltp = broker
                    .last_price(&symbol.to_uppercase())
                    .await
                    .context("Failed to fetch current price")?;
                info!("Using live quote as base price: {ltp}");
                ltp
            } else {
                args.base_price
            };

            let scheduler =
                LadderScheduler::new(broker, gate_for(yes), sink, config.strategy.clone());
            let summary = scheduler
                .schedule(ScheduleRequest {
                    symbol,
                    base_price,
                    order_count: args.order_count,
                    start_quantity,
                    max_quantity: args.max_quantity,
                })
                .await?;
            info!(
                "Done: {} placed, {} failed, {} skipped",
                summary.placed_count, summary.failed_count, summary.skipped_count
            );
        }
        Command::Sell {
            symbol,
            net_profit_percent,
            quantity,
            yes,
        } => {
            let scheduler = SellScheduler::new(broker, gate_for(yes), sink);
            let summary = scheduler
                .sell(SellRequest {
                    symbol,
                    target_net_profit_percent: net_profit_percent,
                    quantity,
                })
                .await?;
            info!(
                "Done: {} {} x {} (status {:?})",
                summary.symbol, summary.quantity, summary.sell_price, summary.status
            );
        }
        Command::Delete { symbol, yes } => {
            let deleter = GttDeleter::new(broker, gate_for(yes), sink);
            let summary = deleter.delete_all(&symbol).await?;
            info!(
                "Done: {} deleted, {} failed",
                summary.succeeded.len(),
                summary.failed.len()
            );
        }
    }

    Ok(())
}
