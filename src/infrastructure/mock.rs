//! Test doubles for the broker, confirmation and persistence ports.
//!
//! Used by unit and integration tests; also handy for dry-running the
//! orchestrators without a live Kite session.

use crate::domain::ports::{BrokerClient, ConfirmationGate, SummarySink};
use crate::domain::types::{
    DeletionSummary, HoldingLot, LadderSummary, ListedGtt, SellSummary, Side,
};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
pub struct CapturedMarketOrder {
    pub symbol: String,
    pub quantity: u32,
    pub side: Side,
}

#[derive(Debug, Clone)]
pub struct CapturedGtt {
    pub symbol: String,
    pub quantity: u32,
    pub price: Decimal,
    pub trigger_price: Decimal,
    pub side: Side,
}

pub struct MockBrokerClient {
    market_open: bool,
    last_price: RwLock<Decimal>,
    listed: RwLock<Vec<ListedGtt>>,
    held: RwLock<Vec<HoldingLot>>,
    market_orders: RwLock<Vec<CapturedMarketOrder>>,
    gtt_orders: RwLock<Vec<CapturedGtt>>,
    deleted: RwLock<Vec<u64>>,
    gtt_failures: RwLock<HashMap<Decimal, String>>,
    delete_failures: RwLock<HashMap<u64, String>>,
    market_order_failure: RwLock<Option<String>>,
    next_trigger_id: AtomicU64,
}

impl MockBrokerClient {
    pub fn new(market_open: bool) -> Self {
        Self {
            market_open,
            last_price: RwLock::new(dec!(100)),
            listed: RwLock::new(Vec::new()),
            held: RwLock::new(Vec::new()),
            market_orders: RwLock::new(Vec::new()),
            gtt_orders: RwLock::new(Vec::new()),
            deleted: RwLock::new(Vec::new()),
            gtt_failures: RwLock::new(HashMap::new()),
            delete_failures: RwLock::new(HashMap::new()),
            market_order_failure: RwLock::new(None),
            next_trigger_id: AtomicU64::new(1000),
        }
    }

    pub async fn set_last_price(&self, price: Decimal) {
        *self.last_price.write().await = price;
    }

    pub async fn set_listed_gtts(&self, gtts: Vec<ListedGtt>) {
        *self.listed.write().await = gtts;
    }

    pub async fn set_holdings(&self, lots: Vec<HoldingLot>) {
        *self.held.write().await = lots;
    }

    /// Reject the GTT rung at exactly this limit price.
    pub async fn fail_gtt_at_price(&self, price: Decimal, reason: &str) {
        self.gtt_failures.write().await.insert(price, reason.to_string());
    }

    pub async fn fail_delete_of(&self, trigger_id: u64, reason: &str) {
        self.delete_failures
            .write()
            .await
            .insert(trigger_id, reason.to_string());
    }

    pub async fn fail_market_orders(&self, reason: &str) {
        *self.market_order_failure.write().await = Some(reason.to_string());
    }

    pub async fn market_orders(&self) -> Vec<CapturedMarketOrder> {
        self.market_orders.read().await.clone()
    }

    pub async fn gtt_orders_placed(&self) -> Vec<CapturedGtt> {
        self.gtt_orders.read().await.clone()
    }

    pub async fn deleted_trigger_ids(&self) -> Vec<u64> {
        self.deleted.read().await.clone()
    }
}

#[async_trait]
impl BrokerClient for MockBrokerClient {
    async fn is_market_open(&self) -> Result<bool> {
        Ok(self.market_open)
    }

    async fn place_market_order(
        &self,
        symbol: &str,
        quantity: u32,
        side: Side,
    ) -> Result<String> {
        if let Some(reason) = self.market_order_failure.read().await.clone() {
            return Err(anyhow!(reason));
        }
        let id = self.next_trigger_id.fetch_add(1, Ordering::SeqCst);
        self.market_orders.write().await.push(CapturedMarketOrder {
            symbol: symbol.to_string(),
            quantity,
            side,
        });
        Ok(format!("mock-order-{id}"))
    }

    async fn place_gtt_order(
        &self,
        symbol: &str,
        quantity: u32,
        price: Decimal,
        trigger_price: Decimal,
        side: Side,
    ) -> Result<u64> {
        if let Some(reason) = self.gtt_failures.read().await.get(&price) {
            return Err(anyhow!(reason.clone()));
        }
        let id = self.next_trigger_id.fetch_add(1, Ordering::SeqCst);
        self.gtt_orders.write().await.push(CapturedGtt {
            symbol: symbol.to_string(),
            quantity,
            price,
            trigger_price,
            side,
        });
        Ok(id)
    }

    async fn list_gtt_orders(&self) -> Result<Vec<ListedGtt>> {
        Ok(self.listed.read().await.clone())
    }

    async fn delete_gtt_order(&self, trigger_id: u64) -> Result<()> {
        if let Some(reason) = self.delete_failures.read().await.get(&trigger_id) {
            return Err(anyhow!(reason.clone()));
        }
        self.deleted.write().await.push(trigger_id);
        Ok(())
    }

    async fn holdings(&self, _symbol: &str) -> Result<Vec<HoldingLot>> {
        Ok(self.held.read().await.clone())
    }

    async fn last_price(&self, _symbol: &str) -> Result<Decimal> {
        Ok(*self.last_price.read().await)
    }
}

/// Confirmation gate with a fixed answer, recording every prompt it sees.
pub struct ScriptedConfirmation {
    answer: bool,
    fail: bool,
    prompts: Arc<RwLock<Vec<String>>>,
}

impl ScriptedConfirmation {
    pub fn answering(answer: bool) -> Self {
        Self {
            answer,
            fail: false,
            prompts: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// A gate whose confirm call itself errors (e.g. closed stdin).
    pub fn failing() -> Self {
        Self {
            answer: false,
            fail: true,
            prompts: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub async fn prompts(&self) -> Vec<String> {
        self.prompts.read().await.clone()
    }
}

#[async_trait]
impl ConfirmationGate for ScriptedConfirmation {
    async fn confirm(&self, prompt: &str) -> Result<bool> {
        if self.fail {
            return Err(anyhow!("confirmation input unavailable"));
        }
        self.prompts.write().await.push(prompt.to_string());
        Ok(self.answer)
    }
}

/// Sink that keeps artifacts in memory, optionally failing every write.
pub struct MemorySink {
    fail: bool,
    schedules: RwLock<Vec<LadderSummary>>,
    deletions: RwLock<Vec<DeletionSummary>>,
    sells: RwLock<Vec<SellSummary>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self {
            fail: false,
            schedules: RwLock::new(Vec::new()),
            deletions: RwLock::new(Vec::new()),
            sells: RwLock::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            schedules: RwLock::new(Vec::new()),
            deletions: RwLock::new(Vec::new()),
            sells: RwLock::new(Vec::new()),
        }
    }

    pub async fn schedule_summaries(&self) -> Vec<LadderSummary> {
        self.schedules.read().await.clone()
    }

    pub async fn deletion_summaries(&self) -> Vec<DeletionSummary> {
        self.deletions.read().await.clone()
    }

    pub async fn sell_summaries(&self) -> Vec<SellSummary> {
        self.sells.read().await.clone()
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SummarySink for MemorySink {
    async fn write_schedule_summary(&self, summary: &LadderSummary) -> Result<()> {
        if self.fail {
            return Err(anyhow!("disk full"));
        }
        self.schedules.write().await.push(summary.clone());
        Ok(())
    }

    async fn write_deletion_summary(&self, summary: &DeletionSummary) -> Result<()> {
        if self.fail {
            return Err(anyhow!("disk full"));
        }
        self.deletions.write().await.push(summary.clone());
        Ok(())
    }

    async fn write_sell_summary(&self, summary: &SellSummary) -> Result<()> {
        if self.fail {
            return Err(anyhow!("disk full"));
        }
        self.sells.write().await.push(summary.clone());
        Ok(())
    }
}
