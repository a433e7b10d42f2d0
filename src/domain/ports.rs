use crate::domain::types::{
    DeletionSummary, HoldingLot, LadderSummary, ListedGtt, SellSummary, Side,
};
use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;

// Need async_trait for async functions in traits
#[async_trait]
pub trait BrokerClient: Send + Sync {
    async fn is_market_open(&self) -> Result<bool>;

    /// Place an immediate market order. Returns the broker order id.
    async fn place_market_order(&self, symbol: &str, quantity: u32, side: Side)
    -> Result<String>;

    /// Place a single-leg GTT trigger. Returns the trigger id.
    async fn place_gtt_order(
        &self,
        symbol: &str,
        quantity: u32,
        price: Decimal,
        trigger_price: Decimal,
        side: Side,
    ) -> Result<u64>;

    /// All GTT triggers on the account, every symbol and status.
    async fn list_gtt_orders(&self) -> Result<Vec<ListedGtt>>;

    async fn delete_gtt_order(&self, trigger_id: u64) -> Result<()>;

    /// All lots held for a symbol: the holdings book plus today's net buys.
    async fn holdings(&self, symbol: &str) -> Result<Vec<HoldingLot>>;

    /// Last traded price for a symbol.
    async fn last_price(&self, symbol: &str) -> Result<Decimal>;
}

/// Human-in-the-loop gate in front of every state-mutating batch.
/// Injected so automated callers can supply a deterministic answer.
#[async_trait]
pub trait ConfirmationGate: Send + Sync {
    async fn confirm(&self, prompt: &str) -> Result<bool>;
}

/// Fire-and-forget artifact writer. Orchestrators log failures from this
/// sink but never fail the run on them.
#[async_trait]
pub trait SummarySink: Send + Sync {
    async fn write_schedule_summary(&self, summary: &LadderSummary) -> Result<()>;
    async fn write_deletion_summary(&self, summary: &DeletionSummary) -> Result<()>;
    async fn write_sell_summary(&self, summary: &SellSummary) -> Result<()>;
}
