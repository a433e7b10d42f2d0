use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// How a rung is executed at the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderKind {
    /// Immediate market order; only ever the first rung, and only when the
    /// market is open.
    Market,
    /// Good-Till-Triggered conditional order.
    Gtt,
    /// First rung when the market is closed (AMO not supported).
    Skipped,
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderKind::Market => write!(f, "MARKET"),
            OrderKind::Gtt => write!(f, "GTT"),
            OrderKind::Skipped => write!(f, "SKIPPED"),
        }
    }
}

/// Lifecycle of a rung. Mutated only by the orchestrators after a broker
/// call returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    Pending,
    Placed,
    Failed,
    Cancelled,
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderStatus::Pending => write!(f, "PENDING"),
            OrderStatus::Placed => write!(f, "PLACED"),
            OrderStatus::Failed => write!(f, "FAILED"),
            OrderStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// One rung of the ladder.
///
/// `sequence_number` is the 1-based position in the original, unfiltered
/// ladder and never changes. `display_number` is assigned at summary time,
/// after SKIPPED rungs are filtered out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderSpec {
    pub sequence_number: u32,
    pub symbol: String,
    pub quantity: u32,
    pub price: Decimal,
    pub trigger_price: Option<Decimal>,
    pub order_kind: OrderKind,
    pub status: OrderStatus,
    pub broker_order_id: Option<String>,
    pub trigger_id: Option<u64>,
    pub failure_reason: Option<String>,
}

impl OrderSpec {
    pub fn total_value(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}

/// Status of a GTT trigger as reported by the broker.
///
/// The broker sends free-form strings; unrecognized values map to `Unknown`
/// and are treated as inactive, never as an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GttStatus {
    Active,
    Pending,
    Open,
    Triggered,
    Completed,
    Cancelled,
    Rejected,
    Deleted,
    Unknown,
}

impl GttStatus {
    pub fn from_raw(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "ACTIVE" => GttStatus::Active,
            "PENDING" => GttStatus::Pending,
            "OPEN" => GttStatus::Open,
            "TRIGGERED" => GttStatus::Triggered,
            "COMPLETED" => GttStatus::Completed,
            "CANCELLED" => GttStatus::Cancelled,
            "REJECTED" => GttStatus::Rejected,
            "DELETED" => GttStatus::Deleted,
            _ => GttStatus::Unknown,
        }
    }

    /// Only active-side triggers are eligible for bulk deletion.
    pub fn is_active(&self) -> bool {
        matches!(self, GttStatus::Active | GttStatus::Pending | GttStatus::Open)
    }
}

/// One GTT trigger as returned by the broker listing endpoint.
///
/// The symbol appears either top-level or nested under `condition`
/// depending on API version. Rows missing `id` or `status` are malformed
/// and are skipped by the deleter with a warning.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListedGtt {
    pub id: Option<u64>,
    pub status: Option<String>,
    #[serde(default)]
    pub tradingsymbol: Option<String>,
    #[serde(default)]
    pub condition: Option<GttCondition>,
    #[serde(default)]
    pub quantity: Option<u32>,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub trigger_price: Option<Decimal>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GttCondition {
    #[serde(default)]
    pub tradingsymbol: Option<String>,
    #[serde(default)]
    pub trigger_values: Vec<Decimal>,
}

impl ListedGtt {
    pub fn symbol(&self) -> Option<&str> {
        self.tradingsymbol
            .as_deref()
            .or_else(|| self.condition.as_ref().and_then(|c| c.tradingsymbol.as_deref()))
    }

    pub fn gtt_status(&self) -> Option<GttStatus> {
        self.status.as_deref().map(GttStatus::from_raw)
    }
}

/// Terminal state of a scheduling run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScheduleOutcome {
    Completed,
    Aborted,
}

/// One row of the filtered, renumbered summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryRung {
    pub display_number: u32,
    pub original_sequence_number: u32,
    pub quantity: u32,
    pub price: Decimal,
    pub trigger_price: Option<Decimal>,
    pub order_kind: OrderKind,
    pub status: OrderStatus,
    pub broker_order_id: Option<String>,
    pub trigger_id: Option<u64>,
    pub failure_reason: Option<String>,
}

/// Artifact produced by every scheduling run, aborted or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LadderSummary {
    pub symbol: String,
    pub status: ScheduleOutcome,
    pub market_was_open: bool,
    pub order_count: u32,
    pub start_quantity: u32,
    pub price_decrease_percent: Decimal,
    pub total_attempted: u32,
    pub placed_count: u32,
    pub failed_count: u32,
    pub skipped_count: u32,
    pub total_quantity: u64,
    pub total_value: Decimal,
    pub rungs: Vec<SummaryRung>,
    pub timestamp: DateTime<Utc>,
}

/// One lot of an existing position: quantity held and the average price it
/// was bought at. A zero `average_price` means the broker did not report
/// one for the lot (e.g. same-day T1 stock).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoldingLot {
    pub quantity: u32,
    pub average_price: Decimal,
}

/// Terminal state of a sell run. A declined confirmation still records the
/// computed plan as `Calculated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SellOutcome {
    Placed,
    Calculated,
}

/// Artifact produced by a charge-aware sell run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SellSummary {
    pub symbol: String,
    pub status: SellOutcome,
    pub quantity: u32,
    pub average_buy_price: Decimal,
    pub sell_price: Decimal,
    pub trigger_price: Decimal,
    pub target_net_profit_percent: Decimal,
    pub profit: crate::domain::charges::ProfitAnalysis,
    pub trigger_id: Option<u64>,
    pub timestamp: DateTime<Utc>,
}

/// Terminal state of a deletion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeletionOutcome {
    Completed,
    CancelledByUser,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedDeletion {
    pub trigger_id: u64,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletionSummary {
    pub symbol: String,
    pub status: DeletionOutcome,
    pub attempted: u32,
    pub succeeded: Vec<u64>,
    pub failed: Vec<FailedDeletion>,
    pub timestamp: DateTime<Utc>,
}

impl DeletionSummary {
    pub fn empty(symbol: &str, status: DeletionOutcome) -> Self {
        Self {
            symbol: symbol.to_uppercase(),
            status,
            attempted: 0,
            succeeded: Vec::new(),
            failed: Vec::new(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gtt_status_mapping_is_case_insensitive() {
        assert_eq!(GttStatus::from_raw("active"), GttStatus::Active);
        assert_eq!(GttStatus::from_raw("Triggered"), GttStatus::Triggered);
        assert_eq!(GttStatus::from_raw(" OPEN "), GttStatus::Open);
    }

    #[test]
    fn test_unrecognized_status_maps_to_unknown_and_inactive() {
        let status = GttStatus::from_raw("PARTIALLY_TRIGGERED");
        assert_eq!(status, GttStatus::Unknown);
        assert!(!status.is_active());
    }

    #[test]
    fn test_listed_gtt_symbol_falls_back_to_condition() {
        let gtt = ListedGtt {
            id: Some(1),
            status: Some("active".into()),
            condition: Some(GttCondition {
                tradingsymbol: Some("ITC".into()),
                trigger_values: vec![],
            }),
            ..Default::default()
        };
        assert_eq!(gtt.symbol(), Some("ITC"));
    }
}
