//! GTT deletion orchestrator.
//!
//! Fetches every GTT trigger on the account, filters to the requested
//! symbol's active triggers, and bulk-deletes them behind an explicit
//! confirmation. Each deletion is independent; one failure never blocks
//! the rest of the batch.

use crate::domain::ports::{BrokerClient, ConfirmationGate, SummarySink};
use crate::domain::registry::{OrderRegistry, RecordOutcome};
use crate::domain::types::{
    DeletionOutcome, DeletionSummary, FailedDeletion, ListedGtt, OrderKind, OrderSpec,
    OrderStatus,
};
use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};

pub struct GttDeleter {
    broker: Arc<dyn BrokerClient>,
    gate: Arc<dyn ConfirmationGate>,
    sink: Arc<dyn SummarySink>,
}

impl GttDeleter {
    pub fn new(
        broker: Arc<dyn BrokerClient>,
        gate: Arc<dyn ConfirmationGate>,
        sink: Arc<dyn SummarySink>,
    ) -> Self {
        Self { broker, gate, sink }
    }

    /// Delete every active GTT trigger for `symbol`.
    ///
    /// Orders in any non-active status (triggered, completed, cancelled,
    /// rejected, deleted, or anything unrecognized) are excluded before the
    /// confirmation step. Malformed listing rows are skipped with a
    /// warning, never treated as fatal.
    pub async fn delete_all(&self, symbol: &str) -> Result<DeletionSummary> {
        let symbol = symbol.to_uppercase();

        let all = self
            .broker
            .list_gtt_orders()
            .await
            .context("Failed to retrieve GTT orders")?;
        info!("Retrieved {} total GTT orders", all.len());

        let targets = filter_active(&symbol, &all);
        if targets.is_empty() {
            info!("No active GTT orders found for {symbol}");
            return Ok(DeletionSummary::empty(&symbol, DeletionOutcome::Completed));
        }

        let prompt = format!(
            "Found {} active GTT orders for {symbol}.\n\
             WARNING: this will permanently delete all of them!\n\
             Do you want to proceed? (yes/no): ",
            targets.len()
        );
        let confirmed = match self.gate.confirm(&prompt).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!("Confirmation failed, treating as refusal: {e:#}");
                false
            }
        };
        if !confirmed {
            info!("GTT order deletion cancelled by user");
            return Ok(DeletionSummary::empty(
                &symbol,
                DeletionOutcome::CancelledByUser,
            ));
        }

        // Registry scoped to the broker-side GTT orders of this run: the
        // targets start out placed and move to cancelled as deletions land.
        let mut registry = OrderRegistry::new();
        for (position, (trigger_id, gtt)) in targets.iter().enumerate() {
            registry.record(
                lifecycle_spec(position as u32 + 1, &symbol, gtt, *trigger_id),
                RecordOutcome::Placed,
            );
        }

        let mut succeeded = Vec::new();
        let mut failed = Vec::new();
        for (trigger_id, gtt) in &targets {
            info!(
                "Deleting GTT order {trigger_id} ({} x{} @ {})",
                symbol,
                gtt.quantity.unwrap_or(0),
                gtt.price.unwrap_or_default()
            );
            match self.broker.delete_gtt_order(*trigger_id).await {
                Ok(()) => {
                    succeeded.push(*trigger_id);
                    registry.mark_cancelled(*trigger_id);
                }
                Err(e) => {
                    error!("Failed to delete GTT order {trigger_id}: {e:#}");
                    failed.push(FailedDeletion {
                        trigger_id: *trigger_id,
                        reason: format!("{e:#}"),
                    });
                }
            }
        }

        let summary = DeletionSummary {
            symbol: symbol.clone(),
            status: DeletionOutcome::Completed,
            attempted: targets.len() as u32,
            succeeded,
            failed,
            timestamp: Utc::now(),
        };
        let remaining = registry.snapshot();
        info!(
            "Deletion complete for {}: {} deleted, {} still placed at the broker",
            symbol,
            summary.succeeded.len(),
            remaining.placed.len()
        );

        if let Err(e) = self.sink.write_deletion_summary(&summary).await {
            warn!("Failed to persist deletion summary: {e:#}");
        }

        Ok(summary)
    }
}

/// Registry entry for a broker-side GTT order about to be deleted. The
/// price falls back to the trigger value when the listing omits it so the
/// dedup identity stays distinct per order.
fn lifecycle_spec(position: u32, symbol: &str, gtt: &ListedGtt, trigger_id: u64) -> OrderSpec {
    OrderSpec {
        sequence_number: position,
        symbol: symbol.to_string(),
        quantity: gtt.quantity.unwrap_or(0),
        price: gtt.price.or(gtt.trigger_price).unwrap_or_default(),
        trigger_price: gtt.trigger_price,
        order_kind: OrderKind::Gtt,
        status: OrderStatus::Placed,
        broker_order_id: None,
        trigger_id: Some(trigger_id),
        failure_reason: None,
    }
}

/// Symbol match is case-insensitive and exact; only active-side statuses
/// survive. Rows without a trigger id or status are malformed.
fn filter_active<'a>(symbol: &str, all: &'a [ListedGtt]) -> Vec<(u64, &'a ListedGtt)> {
    let mut targets = Vec::new();
    for gtt in all {
        let (Some(trigger_id), Some(status)) = (gtt.id, gtt.gtt_status()) else {
            warn!("Skipping malformed GTT listing entry: {gtt:?}");
            continue;
        };
        let Some(listed_symbol) = gtt.symbol() else {
            warn!("Skipping GTT order {trigger_id} with no trading symbol");
            continue;
        };
        if !listed_symbol.eq_ignore_ascii_case(symbol) {
            continue;
        }
        if status.is_active() {
            targets.push((trigger_id, gtt));
        } else {
            info!(
                "Ignoring {listed_symbol} order {trigger_id} in status {status:?} (not active)"
            );
        }
    }
    targets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::mock::{MemorySink, MockBrokerClient, ScriptedConfirmation};
    use crate::domain::types::GttCondition;

    fn listed(id: u64, symbol: &str, status: &str) -> ListedGtt {
        ListedGtt {
            id: Some(id),
            status: Some(status.to_string()),
            tradingsymbol: Some(symbol.to_string()),
            quantity: Some(1),
            price: Some(rust_decimal::Decimal::from(400 + id)),
            ..Default::default()
        }
    }

    fn deleter(
        broker: Arc<MockBrokerClient>,
        confirm: bool,
    ) -> (GttDeleter, Arc<ScriptedConfirmation>, Arc<MemorySink>) {
        let gate = Arc::new(ScriptedConfirmation::answering(confirm));
        let sink = Arc::new(MemorySink::new());
        (
            GttDeleter::new(broker, gate.clone(), sink.clone()),
            gate,
            sink,
        )
    }

    #[tokio::test]
    async fn test_deletes_only_active_matching_orders() {
        let broker = Arc::new(MockBrokerClient::new(true));
        broker
            .set_listed_gtts(vec![
                listed(1, "ITC", "active"),
                listed(2, "ITC", "TRIGGERED"),
                listed(3, "RELIANCE", "ACTIVE"),
                listed(4, "itc", "PENDING"),
                listed(5, "ITC", "something-new"),
            ])
            .await;
        let (deleter, _gate, sink) = deleter(broker.clone(), true);

        let summary = deleter.delete_all("ITC").await.unwrap();

        assert_eq!(summary.attempted, 2);
        assert_eq!(summary.succeeded, vec![1, 4]);
        assert!(summary.failed.is_empty());
        assert_eq!(broker.deleted_trigger_ids().await, vec![1, 4]);
        assert_eq!(sink.deletion_summaries().await.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_filtered_set_skips_confirmation() {
        let broker = Arc::new(MockBrokerClient::new(true));
        broker
            .set_listed_gtts(vec![listed(1, "XYZ", "COMPLETED")])
            .await;
        let (deleter, gate, _sink) = deleter(broker.clone(), true);

        let summary = deleter.delete_all("XYZ").await.unwrap();

        assert_eq!(summary.attempted, 0);
        assert_eq!(summary.status, DeletionOutcome::Completed);
        assert!(gate.prompts().await.is_empty());
        assert!(broker.deleted_trigger_ids().await.is_empty());
    }

    #[tokio::test]
    async fn test_refusal_cancels_without_deletions() {
        let broker = Arc::new(MockBrokerClient::new(true));
        broker.set_listed_gtts(vec![listed(1, "ITC", "ACTIVE")]).await;
        let (deleter, _gate, sink) = deleter(broker.clone(), false);

        let summary = deleter.delete_all("ITC").await.unwrap();

        assert_eq!(summary.status, DeletionOutcome::CancelledByUser);
        assert_eq!(summary.attempted, 0);
        assert!(broker.deleted_trigger_ids().await.is_empty());
        assert!(sink.deletion_summaries().await.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_rows_are_skipped_not_fatal() {
        let broker = Arc::new(MockBrokerClient::new(true));
        broker
            .set_listed_gtts(vec![
                ListedGtt::default(), // no id, no status
                ListedGtt {
                    id: Some(7),
                    status: None,
                    tradingsymbol: Some("ITC".into()),
                    ..Default::default()
                },
                ListedGtt {
                    id: Some(8),
                    status: Some("ACTIVE".into()),
                    condition: Some(GttCondition {
                        tradingsymbol: Some("ITC".into()),
                        trigger_values: vec![],
                    }),
                    ..Default::default()
                },
            ])
            .await;
        let (deleter, _gate, _sink) = deleter(broker.clone(), true);

        let summary = deleter.delete_all("ITC").await.unwrap();

        // Only the well-formed row (symbol nested in the condition) counts.
        assert_eq!(summary.attempted, 1);
        assert_eq!(summary.succeeded, vec![8]);
    }

    #[test]
    fn test_lifecycle_entry_price_falls_back_to_trigger_value() {
        use rust_decimal_macros::dec;

        let gtt = ListedGtt {
            id: Some(5),
            status: Some("ACTIVE".into()),
            tradingsymbol: Some("ITC".into()),
            trigger_price: Some(dec!(448.20)),
            ..Default::default()
        };
        let spec = lifecycle_spec(1, "ITC", &gtt, 5);
        assert_eq!(spec.price, dec!(448.20));
        assert_eq!(spec.status, OrderStatus::Placed);
        assert_eq!(spec.trigger_id, Some(5));
    }

    #[tokio::test]
    async fn test_one_failure_does_not_block_subsequent_deletions() {
        let broker = Arc::new(MockBrokerClient::new(true));
        broker
            .set_listed_gtts(vec![
                listed(1, "ITC", "ACTIVE"),
                listed(2, "ITC", "ACTIVE"),
                listed(3, "ITC", "ACTIVE"),
            ])
            .await;
        broker.fail_delete_of(2, "already triggered").await;
        let (deleter, _gate, _sink) = deleter(broker.clone(), true);

        let summary = deleter.delete_all("ITC").await.unwrap();

        assert_eq!(summary.attempted, 3);
        assert_eq!(summary.succeeded, vec![1, 3]);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].trigger_id, 2);
        assert!(summary.failed[0].reason.contains("already triggered"));
    }
}
