//! Charge-aware GTT sell orchestrator.
//!
//! Aggregates the current position, derives the sell price that nets the
//! requested profit percentage after delivery charges, and places a single
//! GTT sell trigger behind an explicit confirmation.

use crate::domain::charges::{ProfitAnalysis, profit_with_charges, target_sell_price};
use crate::domain::errors::LadderError;
use crate::domain::ladder::round_price;
use crate::domain::ports::{BrokerClient, ConfirmationGate, SummarySink};
use crate::domain::types::{HoldingLot, SellOutcome, SellSummary, Side};
use anyhow::{Context, Result, bail};
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{info, warn};

/// Sell trigger fires on the way up: 0.1% above the limit price.
const SELL_TRIGGER_MARGIN: Decimal = dec!(1.001);

#[derive(Debug, Clone)]
pub struct SellRequest {
    pub symbol: String,
    /// Desired net profit after all charges, in percent.
    pub target_net_profit_percent: Decimal,
    /// Quantity to sell; defaults to the whole position.
    pub quantity: Option<u32>,
}

pub struct SellScheduler {
    broker: Arc<dyn BrokerClient>,
    gate: Arc<dyn ConfirmationGate>,
    sink: Arc<dyn SummarySink>,
}

impl SellScheduler {
    pub fn new(
        broker: Arc<dyn BrokerClient>,
        gate: Arc<dyn ConfirmationGate>,
        sink: Arc<dyn SummarySink>,
    ) -> Self {
        Self { broker, gate, sink }
    }

    /// Run one sell pass. Returns `Err` for invalid parameters, a missing
    /// position, or a broker rejection of the single order; a declined
    /// confirmation is not an error and still records the computed plan.
    pub async fn sell(&self, request: SellRequest) -> Result<SellSummary> {
        if request.target_net_profit_percent <= Decimal::ZERO {
            return Err(LadderError::invalid("net profit percent must be positive").into());
        }
        if request.quantity == Some(0) {
            return Err(LadderError::invalid("sell quantity must be at least 1").into());
        }
        let symbol = request.symbol.to_uppercase();

        let lots = self
            .broker
            .holdings(&symbol)
            .await
            .context("Failed to retrieve holdings")?;
        let (total_quantity, average_price) = aggregate_position(&lots);
        if total_quantity == 0 {
            bail!("No holdings found for {symbol}");
        }
        info!("Position in {symbol}: {total_quantity} shares at average {average_price}");

        let quantity = match request.quantity {
            Some(requested) if requested > total_quantity => {
                warn!(
                    "Requested quantity {requested} exceeds holdings {total_quantity}, \
                     selling {total_quantity}"
                );
                total_quantity
            }
            Some(requested) => requested,
            None => total_quantity,
        };

        let sell_price = target_sell_price(
            average_price,
            quantity,
            request.target_net_profit_percent,
        );
        let trigger_price = round_price(sell_price * SELL_TRIGGER_MARGIN);
        let analysis = profit_with_charges(average_price, sell_price, quantity);

        let prompt = render_plan(
            &symbol,
            quantity,
            average_price,
            sell_price,
            trigger_price,
            request.target_net_profit_percent,
            &analysis,
        );
        let confirmed = match self.gate.confirm(&prompt).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!("Confirmation failed, treating as refusal: {e:#}");
                false
            }
        };
        if !confirmed {
            info!("GTT sell order cancelled by user, keeping the computed plan");
            let summary = self.summary(
                &symbol,
                &request,
                quantity,
                average_price,
                sell_price,
                trigger_price,
                analysis,
                None,
            );
            self.persist(&summary).await;
            return Ok(summary);
        }

        let trigger_id = self
            .broker
            .place_gtt_order(&symbol, quantity, sell_price, trigger_price, Side::Sell)
            .await
            .context("Failed to place GTT sell order")?;
        info!(
            "GTT sell placed for {symbol}: trigger id {trigger_id}, \
             {quantity} x {sell_price} (trigger {trigger_price})"
        );

        let summary = self.summary(
            &symbol,
            &request,
            quantity,
            average_price,
            sell_price,
            trigger_price,
            analysis,
            Some(trigger_id),
        );
        self.persist(&summary).await;
        Ok(summary)
    }

    #[allow(clippy::too_many_arguments)]
    fn summary(
        &self,
        symbol: &str,
        request: &SellRequest,
        quantity: u32,
        average_buy_price: Decimal,
        sell_price: Decimal,
        trigger_price: Decimal,
        profit: ProfitAnalysis,
        trigger_id: Option<u64>,
    ) -> SellSummary {
        SellSummary {
            symbol: symbol.to_string(),
            status: if trigger_id.is_some() {
                SellOutcome::Placed
            } else {
                SellOutcome::Calculated
            },
            quantity,
            average_buy_price,
            sell_price,
            trigger_price,
            target_net_profit_percent: request.target_net_profit_percent,
            profit,
            trigger_id,
            timestamp: Utc::now(),
        }
    }

    async fn persist(&self, summary: &SellSummary) {
        if let Err(e) = self.sink.write_sell_summary(summary).await {
            warn!("Failed to persist sell summary: {e:#}");
        }
    }
}

/// Total quantity and value-weighted average price over all lots. Lots
/// without a reported price add quantity but no value.
fn aggregate_position(lots: &[HoldingLot]) -> (u32, Decimal) {
    let mut total_quantity = 0u32;
    let mut total_value = Decimal::ZERO;
    for lot in lots {
        total_quantity = total_quantity.saturating_add(lot.quantity);
        if lot.average_price > Decimal::ZERO {
            total_value += Decimal::from(lot.quantity) * lot.average_price;
        }
    }
    let average = if total_quantity > 0 {
        round_price(total_value / Decimal::from(total_quantity))
    } else {
        Decimal::ZERO
    };
    (total_quantity, average)
}

fn render_plan(
    symbol: &str,
    quantity: u32,
    average_price: Decimal,
    sell_price: Decimal,
    trigger_price: Decimal,
    target_pct: Decimal,
    analysis: &ProfitAnalysis,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "GTT sell order for {symbol}:");
    let _ = writeln!(out, "  Quantity:       {quantity} (avg buy {average_price})");
    let _ = writeln!(out, "  Sell price:     {sell_price} (trigger {trigger_price})");
    let _ = writeln!(out, "  Target net:     {target_pct}%");
    let _ = writeln!(
        out,
        "  Gross profit:   {:.2} ({:.2}%)",
        analysis.gross_profit, analysis.gross_profit_percent
    );
    let _ = writeln!(
        out,
        "  Total charges:  {:.2} ({:.2}%)",
        analysis.charges.total, analysis.charges_percent
    );
    let _ = writeln!(
        out,
        "  Net profit:     {:.2} ({:.2}%)",
        analysis.net_profit, analysis.net_profit_percent
    );
    let _ = writeln!(out, "  Break-even:     {:.2}", analysis.break_even_price);
    let _ = write!(
        out,
        "Do you want to proceed with placing this GTT sell order? (yes/no): "
    );
    out
}
