//! In-memory order state store.
//!
//! Owns the `pending` / `placed` / `failed` / `history` lists for one
//! scheduling run. `history` is append-only and never pruned. Callers go
//! through the explicit transition operations; the raw lists are never
//! handed out mutably.

use crate::domain::ladder::round_price;
use crate::domain::types::{OrderSpec, OrderStatus};

/// Identity of an order for duplicate detection: uppercased symbol,
/// price rounded to the broker tick, and quantity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    symbol: String,
    price: String,
    quantity: u32,
}

impl DedupKey {
    pub fn of(spec: &OrderSpec) -> Self {
        Self {
            symbol: spec.symbol.to_uppercase(),
            price: round_price(spec.price).to_string(),
            quantity: spec.quantity,
        }
    }
}

/// Outcome of a broker call for one rung.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Placed,
    Failed,
}

/// Read-only view over all four lists, used to build summaries.
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    pub pending: Vec<OrderSpec>,
    pub placed: Vec<OrderSpec>,
    pub failed: Vec<OrderSpec>,
    pub history: Vec<OrderSpec>,
}

#[derive(Debug, Default)]
pub struct OrderRegistry {
    pending: Vec<OrderSpec>,
    placed: Vec<OrderSpec>,
    failed: Vec<OrderSpec>,
    history: Vec<OrderSpec>,
}

impl OrderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, spec: OrderSpec) {
        self.pending.push(spec);
    }

    /// True iff an order with the same dedup key is already in `placed`.
    pub fn is_duplicate(&self, spec: &OrderSpec) -> bool {
        let key = DedupKey::of(spec);
        self.placed.iter().any(|o| DedupKey::of(o) == key)
    }

    /// Record the outcome of a broker call: the order moves out of `pending`
    /// into `placed` or `failed` and is appended to `history`.
    ///
    /// Idempotent under retry: recording the same dedup key twice updates
    /// the existing entries in place instead of duplicating them.
    pub fn record(&mut self, spec: OrderSpec, outcome: RecordOutcome) {
        let key = DedupKey::of(&spec);
        self.pending.retain(|o| DedupKey::of(o) != key);

        let target = match outcome {
            RecordOutcome::Placed => &mut self.placed,
            RecordOutcome::Failed => &mut self.failed,
        };
        match target.iter_mut().find(|o| DedupKey::of(o) == key) {
            Some(existing) => *existing = spec.clone(),
            None => target.push(spec.clone()),
        }

        match self.history.iter_mut().find(|o| DedupKey::of(o) == key) {
            Some(existing) => *existing = spec,
            None => self.history.push(spec),
        }
    }

    /// Remove a placed order whose broker-side status later changed
    /// (e.g. its trigger was deleted). `history` keeps the row, with the
    /// status updated.
    pub fn mark_cancelled(&mut self, trigger_id: u64) {
        if let Some(pos) = self.placed.iter().position(|o| o.trigger_id == Some(trigger_id)) {
            let mut spec = self.placed.remove(pos);
            spec.status = OrderStatus::Cancelled;
            let key = DedupKey::of(&spec);
            if let Some(existing) = self.history.iter_mut().find(|o| DedupKey::of(o) == key) {
                *existing = spec;
            }
        }
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            pending: self.pending.clone(),
            placed: self.placed.clone(),
            failed: self.failed.clone(),
            history: self.history.clone(),
        }
    }
}
