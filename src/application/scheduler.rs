//! GTT scheduling orchestrator.
//!
//! Drives the ladder sequencer, gates placement behind an explicit
//! confirmation, submits each rung through the broker port, tracks
//! outcomes in the order registry and produces the filtered, renumbered
//! summary artifact.

use crate::config::StrategyDefaults;
use crate::domain::ladder::{LadderParams, build_ladder};
use crate::domain::ports::{BrokerClient, ConfirmationGate, SummarySink};
use crate::domain::registry::{OrderRegistry, RecordOutcome, RegistrySnapshot};
use crate::domain::types::{
    LadderSummary, OrderKind, OrderSpec, OrderStatus, ScheduleOutcome, Side, SummaryRung,
};
use anyhow::Result;
use chrono::Utc;
use rust_decimal::Decimal;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{error, info, warn};

const DUPLICATE_REASON: &str = "DUPLICATE";

/// One scheduling request. Omitted fields resolve from [`StrategyDefaults`].
#[derive(Debug, Clone)]
pub struct ScheduleRequest {
    pub symbol: String,
    pub base_price: Decimal,
    pub order_count: Option<u32>,
    pub start_quantity: Option<u32>,
    pub max_quantity: Option<u32>,
}

pub struct LadderScheduler {
    broker: Arc<dyn BrokerClient>,
    gate: Arc<dyn ConfirmationGate>,
    sink: Arc<dyn SummarySink>,
    defaults: StrategyDefaults,
}

impl LadderScheduler {
    pub fn new(
        broker: Arc<dyn BrokerClient>,
        gate: Arc<dyn ConfirmationGate>,
        sink: Arc<dyn SummarySink>,
        defaults: StrategyDefaults,
    ) -> Self {
        Self {
            broker,
            gate,
            sink,
            defaults,
        }
    }

    /// Run one scheduling pass.
    ///
    /// Returns `Err` only for parameter validation failures, which are
    /// surfaced before the confirmation prompt. Everything after the gate
    /// (broker rejections, duplicates) is recorded in the summary and never
    /// aborts the remaining ladder.
    pub async fn schedule(&self, request: ScheduleRequest) -> Result<LadderSummary> {
        let symbol = request.symbol.to_uppercase();
        let order_count = request.order_count.unwrap_or(self.defaults.order_count);
        let start_quantity = request
            .start_quantity
            .unwrap_or(self.defaults.start_quantity);
        let max_quantity = request.max_quantity.unwrap_or(self.defaults.max_quantity);

        info!(
            "Scheduling {} rungs for {} from base price {}",
            order_count, symbol, request.base_price
        );

        // Any failure to determine market state counts as closed.
        let market_open = match self.broker.is_market_open().await {
            Ok(open) => open,
            Err(e) => {
                warn!("Could not determine market state, assuming closed: {e:#}");
                false
            }
        };
        info!(
            "Market is {} - first rung will be {}",
            if market_open { "open" } else { "closed" },
            if market_open { "a MARKET order" } else { "skipped (AMO not supported)" }
        );

        let params = LadderParams {
            symbol: symbol.clone(),
            base_price: request.base_price,
            count: order_count,
            decrease_pct: self.defaults.price_decrease_percent,
            first_gtt_discount_pct: self.defaults.first_gtt_discount_percent,
            start_quantity,
            max_quantity,
            market_open,
        };
        let mut ladder = build_ladder(&params)?;

        let prompt = render_preview(&symbol, &ladder, market_open);
        let confirmed = match self.gate.confirm(&prompt).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!("Confirmation failed, treating as refusal: {e:#}");
                false
            }
        };
        if !confirmed {
            info!("Order placement cancelled by user");
            return Ok(empty_summary(&symbol, &params, market_open));
        }

        let mut registry = OrderRegistry::new();
        let mut skipped_count = 0u32;
        for rung in &mut ladder {
            if rung.order_kind == OrderKind::Skipped {
                info!(
                    "Order {}: skipped (market closed - AMO not supported)",
                    rung.sequence_number
                );
                skipped_count += 1;
                continue;
            }
            self.place_rung(rung, &mut registry).await;
        }

        let summary = build_summary(
            &symbol,
            &params,
            market_open,
            skipped_count,
            &registry.snapshot(),
        );
        info!(
            "Ladder complete for {}: {} placed, {} failed, {} skipped",
            symbol, summary.placed_count, summary.failed_count, summary.skipped_count
        );

        if let Err(e) = self.sink.write_schedule_summary(&summary).await {
            warn!("Failed to persist order summary: {e:#}");
        }

        Ok(summary)
    }

    async fn place_rung(&self, rung: &mut OrderSpec, registry: &mut OrderRegistry) {
        registry.enqueue(rung.clone());

        if registry.is_duplicate(rung) {
            warn!(
                "Order {}: identical order already placed ({} x{} @ {}), not resubmitting",
                rung.sequence_number, rung.symbol, rung.quantity, rung.price
            );
            rung.status = OrderStatus::Failed;
            rung.failure_reason = Some(DUPLICATE_REASON.to_string());
            registry.record(rung.clone(), RecordOutcome::Failed);
            return;
        }

        let result = match rung.order_kind {
            OrderKind::Market => self
                .broker
                .place_market_order(&rung.symbol, rung.quantity, Side::Buy)
                .await
                .map(|order_id| rung.broker_order_id = Some(order_id)),
            OrderKind::Gtt => {
                // Trigger price is always present on GTT rungs.
                let trigger = rung.trigger_price.unwrap_or(rung.price);
                self.broker
                    .place_gtt_order(&rung.symbol, rung.quantity, rung.price, trigger, Side::Buy)
                    .await
                    .map(|trigger_id| rung.trigger_id = Some(trigger_id))
            }
            OrderKind::Skipped => unreachable!("skipped rungs are filtered by the caller"),
        };

        match result {
            Ok(()) => {
                rung.status = OrderStatus::Placed;
                info!(
                    "Order {} ({}) placed: {} x{} @ {}",
                    rung.sequence_number, rung.order_kind, rung.symbol, rung.quantity, rung.price
                );
                registry.record(rung.clone(), RecordOutcome::Placed);
            }
            Err(e) => {
                error!(
                    "Failed to place order {} ({}): {e:#}",
                    rung.sequence_number, rung.order_kind
                );
                rung.status = OrderStatus::Failed;
                rung.failure_reason = Some(format!("{e:#}"));
                registry.record(rung.clone(), RecordOutcome::Failed);
            }
        }
    }
}

/// Full-ladder preview shown at the confirmation gate. SKIPPED rows are
/// included for transparency even though they never reach the broker.
fn render_preview(symbol: &str, ladder: &[OrderSpec], market_open: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "GTT order ladder for {symbol}:");
    for rung in ladder {
        match rung.order_kind {
            OrderKind::Skipped => {
                let _ = writeln!(
                    out,
                    "  {:>2}. SKIPPED (market closed - AMO not supported)",
                    rung.sequence_number
                );
            }
            OrderKind::Market => {
                let _ = writeln!(
                    out,
                    "  {:>2}. MARKET  qty {:>4} @ ~{}",
                    rung.sequence_number, rung.quantity, rung.price
                );
            }
            OrderKind::Gtt => {
                let _ = writeln!(
                    out,
                    "  {:>2}. GTT     qty {:>4} @ {} (trigger {})",
                    rung.sequence_number,
                    rung.quantity,
                    rung.price,
                    rung.trigger_price.unwrap_or(rung.price)
                );
            }
        }
    }
    if !market_open {
        let _ = writeln!(out, "Market is closed: the first rung will not be placed.");
    }
    let _ = write!(out, "Do you want to proceed with placing these orders? (yes/no): ");
    out
}

fn empty_summary(symbol: &str, params: &LadderParams, market_open: bool) -> LadderSummary {
    LadderSummary {
        symbol: symbol.to_string(),
        status: ScheduleOutcome::Aborted,
        market_was_open: market_open,
        order_count: params.count,
        start_quantity: params.start_quantity,
        price_decrease_percent: params.decrease_pct,
        total_attempted: 0,
        placed_count: 0,
        failed_count: 0,
        skipped_count: 0,
        total_quantity: 0,
        total_value: Decimal::ZERO,
        rungs: Vec::new(),
        timestamp: Utc::now(),
    }
}

/// Build the summary from the registry snapshot: `placed` and `failed`
/// hold every attempted rung (SKIPPED rungs are never recorded), merged
/// back into ladder order and renumbered contiguously from 1 while keeping
/// the original sequence number for traceability.
fn build_summary(
    symbol: &str,
    params: &LadderParams,
    market_open: bool,
    skipped_count: u32,
    snapshot: &RegistrySnapshot,
) -> LadderSummary {
    let mut recorded: Vec<&OrderSpec> = snapshot
        .placed
        .iter()
        .chain(snapshot.failed.iter())
        .collect();
    recorded.sort_by_key(|rung| rung.sequence_number);

    let mut rungs = Vec::with_capacity(recorded.len());
    let mut placed_count = 0u32;
    let mut failed_count = 0u32;
    let mut total_quantity = 0u64;
    let mut total_value = Decimal::ZERO;

    for rung in recorded {
        match rung.status {
            OrderStatus::Placed => placed_count += 1,
            OrderStatus::Failed => failed_count += 1,
            _ => {}
        }
        total_quantity += u64::from(rung.quantity);
        total_value += rung.total_value();
        rungs.push(SummaryRung {
            display_number: rungs.len() as u32 + 1,
            original_sequence_number: rung.sequence_number,
            quantity: rung.quantity,
            price: rung.price,
            trigger_price: rung.trigger_price,
            order_kind: rung.order_kind,
            status: rung.status,
            broker_order_id: rung.broker_order_id.clone(),
            trigger_id: rung.trigger_id,
            failure_reason: rung.failure_reason.clone(),
        });
    }

    LadderSummary {
        symbol: symbol.to_string(),
        status: ScheduleOutcome::Completed,
        market_was_open: market_open,
        order_count: params.count,
        start_quantity: params.start_quantity,
        price_decrease_percent: params.decrease_pct,
        total_attempted: rungs.len() as u32,
        placed_count,
        failed_count,
        skipped_count,
        total_quantity,
        total_value,
        rungs,
        timestamp: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::mock::{MemorySink, MockBrokerClient, ScriptedConfirmation};
    use rust_decimal_macros::dec;

    fn scheduler(
        broker: Arc<MockBrokerClient>,
        confirm: bool,
    ) -> (LadderScheduler, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let defaults = StrategyDefaults {
            price_decrease_percent: dec!(0.3),
            ..StrategyDefaults::default()
        };
        (
            LadderScheduler::new(
                broker,
                Arc::new(ScriptedConfirmation::answering(confirm)),
                sink.clone(),
                defaults,
            ),
            sink,
        )
    }

    fn request() -> ScheduleRequest {
        ScheduleRequest {
            symbol: "itc".to_string(),
            base_price: dec!(450.00),
            order_count: Some(10),
            start_quantity: Some(1),
            max_quantity: Some(100),
        }
    }

    #[tokio::test]
    async fn test_open_market_places_market_then_gtt_rungs() {
        let broker = Arc::new(MockBrokerClient::new(true));
        let (scheduler, sink) = scheduler(broker.clone(), true);

        let summary = scheduler.schedule(request()).await.unwrap();

        assert_eq!(summary.status, ScheduleOutcome::Completed);
        assert!(summary.market_was_open);
        assert_eq!(summary.placed_count, 10);
        assert_eq!(summary.skipped_count, 0);
        assert_eq!(broker.market_orders().await.len(), 1);
        assert_eq!(broker.gtt_orders_placed().await.len(), 9);
        assert_eq!(sink.schedule_summaries().await.len(), 1);
        // Symbol is uppercased before it reaches the broker.
        assert_eq!(broker.market_orders().await[0].symbol, "ITC");
    }

    #[tokio::test]
    async fn test_closed_market_skips_rung_one_and_renumbers() {
        let broker = Arc::new(MockBrokerClient::new(false));
        let (scheduler, _sink) = scheduler(broker.clone(), true);

        let summary = scheduler.schedule(request()).await.unwrap();

        assert_eq!(summary.skipped_count, 1);
        assert_eq!(summary.total_attempted, 9);
        assert!(broker.market_orders().await.is_empty());
        let display: Vec<u32> = summary.rungs.iter().map(|r| r.display_number).collect();
        assert_eq!(display, (1..=9).collect::<Vec<u32>>());
        let original: Vec<u32> = summary
            .rungs
            .iter()
            .map(|r| r.original_sequence_number)
            .collect();
        assert_eq!(original, (2..=10).collect::<Vec<u32>>());
        // First active rung anchors 0.25% below base.
        assert_eq!(summary.rungs[0].price, dec!(448.88));
    }

    #[tokio::test]
    async fn test_refusal_aborts_without_placement_calls() {
        let broker = Arc::new(MockBrokerClient::new(true));
        let (scheduler, sink) = scheduler(broker.clone(), false);

        let summary = scheduler.schedule(request()).await.unwrap();

        assert_eq!(summary.status, ScheduleOutcome::Aborted);
        assert_eq!(summary.total_attempted, 0);
        assert!(summary.rungs.is_empty());
        assert!(broker.market_orders().await.is_empty());
        assert!(broker.gtt_orders_placed().await.is_empty());
        // Aborted runs are not persisted.
        assert!(sink.schedule_summaries().await.is_empty());
    }

    #[tokio::test]
    async fn test_broker_failure_does_not_abort_remaining_rungs() {
        let broker = Arc::new(MockBrokerClient::new(true));
        broker.fail_gtt_at_price(dec!(448.65), "Rate limit exceeded").await;
        let (scheduler, _sink) = scheduler(broker.clone(), true);

        let summary = scheduler.schedule(request()).await.unwrap();

        assert_eq!(summary.failed_count, 1);
        assert_eq!(summary.placed_count, 9);
        let failed: Vec<_> = summary
            .rungs
            .iter()
            .filter(|r| r.status == OrderStatus::Failed)
            .collect();
        assert_eq!(failed.len(), 1);
        assert!(failed[0]
            .failure_reason
            .as_deref()
            .unwrap()
            .contains("Rate limit"));
        // Rungs after the failure were still attempted.
        assert_eq!(broker.gtt_orders_placed().await.len(), 8);
    }

    #[tokio::test]
    async fn test_duplicate_rung_fails_without_network_call() {
        let broker = Arc::new(MockBrokerClient::new(false));

        // Flat ladder with fixed quantity: both GTT rungs share the dedup key.
        let defaults = StrategyDefaults {
            price_decrease_percent: dec!(0),
            ..StrategyDefaults::default()
        };
        let scheduler = LadderScheduler::new(
            broker.clone(),
            Arc::new(ScriptedConfirmation::answering(true)),
            Arc::new(MemorySink::new()),
            defaults,
        );
        let summary = scheduler
            .schedule(ScheduleRequest {
                symbol: "ITC".to_string(),
                base_price: dec!(450.00),
                order_count: Some(3),
                start_quantity: Some(5),
                max_quantity: Some(5),
            })
            .await
            .unwrap();

        // Rung 1 is skipped (market closed). Rung 2 places the only GTT;
        // rung 3 has the same price and quantity and is pre-empted before
        // any network call.
        assert_eq!(summary.placed_count, 1);
        assert_eq!(summary.failed_count, 1);
        let duplicate = summary
            .rungs
            .iter()
            .find(|r| r.failure_reason.as_deref() == Some(DUPLICATE_REASON))
            .unwrap();
        assert_eq!(duplicate.original_sequence_number, 3);
        assert_eq!(broker.gtt_orders_placed().await.len(), 1);
    }

    #[tokio::test]
    async fn test_single_skipped_rung_reports_zero_orders_not_error() {
        let broker = Arc::new(MockBrokerClient::new(false));
        let (scheduler, _sink) = scheduler(broker.clone(), true);

        let summary = scheduler
            .schedule(ScheduleRequest {
                order_count: Some(1),
                ..request()
            })
            .await
            .unwrap();

        assert_eq!(summary.status, ScheduleOutcome::Completed);
        assert_eq!(summary.total_attempted, 0);
        assert_eq!(summary.skipped_count, 1);
        assert!(summary.rungs.is_empty());
    }

    #[tokio::test]
    async fn test_validation_error_is_fatal_before_confirmation() {
        let broker = Arc::new(MockBrokerClient::new(true));
        let gate = Arc::new(ScriptedConfirmation::answering(true));
        let scheduler = LadderScheduler::new(
            broker.clone(),
            gate.clone(),
            Arc::new(MemorySink::new()),
            StrategyDefaults::default(),
        );

        let result = scheduler
            .schedule(ScheduleRequest {
                base_price: dec!(-1),
                ..request()
            })
            .await;

        assert!(result.is_err());
        // The gate was never consulted.
        assert!(gate.prompts().await.is_empty());
    }

    #[tokio::test]
    async fn test_summary_rows_reflect_recorded_outcomes_in_ladder_order() {
        let broker = Arc::new(MockBrokerClient::new(true));
        // Rung 3 (447.30) is rejected; placed and failed rungs must merge
        // back into one list ordered by the original sequence.
        broker.fail_gtt_at_price(dec!(447.30), "Rejected").await;
        let (scheduler, _sink) = scheduler(broker.clone(), true);

        let summary = scheduler
            .schedule(ScheduleRequest {
                order_count: Some(5),
                ..request()
            })
            .await
            .unwrap();

        let original: Vec<u32> = summary
            .rungs
            .iter()
            .map(|r| r.original_sequence_number)
            .collect();
        assert_eq!(original, vec![1, 2, 3, 4, 5]);
        let statuses: Vec<OrderStatus> = summary.rungs.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![
                OrderStatus::Placed,
                OrderStatus::Placed,
                OrderStatus::Failed,
                OrderStatus::Placed,
                OrderStatus::Placed,
            ]
        );
        // Recorded broker ids survive into the summary rows.
        assert!(summary.rungs[0].broker_order_id.is_some());
        assert!(summary.rungs[1].trigger_id.is_some());
        assert!(summary.rungs[2].trigger_id.is_none());
        assert_eq!(summary.rungs[2].failure_reason.as_deref(), Some("Rejected"));
    }

    #[tokio::test]
    async fn test_sink_failure_is_not_fatal() {
        let broker = Arc::new(MockBrokerClient::new(true));
        let sink = Arc::new(MemorySink::failing());
        let scheduler = LadderScheduler::new(
            broker,
            Arc::new(ScriptedConfirmation::answering(true)),
            sink,
            StrategyDefaults::default(),
        );

        let summary = scheduler.schedule(request()).await.unwrap();
        assert_eq!(summary.status, ScheduleOutcome::Completed);
    }

    #[tokio::test]
    async fn test_preview_includes_skipped_rows() {
        let broker = Arc::new(MockBrokerClient::new(false));
        let gate = Arc::new(ScriptedConfirmation::answering(false));
        let scheduler = LadderScheduler::new(
            broker,
            gate.clone(),
            Arc::new(MemorySink::new()),
            StrategyDefaults::default(),
        );

        scheduler.schedule(request()).await.unwrap();

        let prompts = gate.prompts().await;
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("SKIPPED"));
        assert!(prompts[0].contains("GTT"));
    }
}
