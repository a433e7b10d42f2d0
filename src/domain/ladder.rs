//! Price/quantity sequencer for the cost-averaging ladder.
//!
//! Pure computation: turns a base price, a market-state flag and the
//! strategy parameters into the full, unfiltered rung list. No I/O.

use crate::domain::errors::LadderError;
use crate::domain::types::{OrderKind, OrderSpec, OrderStatus};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

/// Trigger sits exactly 0.1% below the rung's limit price.
const TRIGGER_MARGIN: Decimal = dec!(0.999);

/// NSE quotes in paise, so prices are rounded to two decimal places.
const PRICE_DP: u32 = 2;

#[derive(Debug, Clone)]
pub struct LadderParams {
    pub symbol: String,
    pub base_price: Decimal,
    pub count: u32,
    /// Percentage step between consecutive rungs, e.g. 0.3 for 0.3%.
    pub decrease_pct: Decimal,
    /// Discount of the first GTT rung below base price when the market is
    /// closed and no market order anchors the ladder. Policy constant,
    /// default 0.25%.
    pub first_gtt_discount_pct: Decimal,
    pub start_quantity: u32,
    pub max_quantity: u32,
    pub market_open: bool,
}

pub fn round_price(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(PRICE_DP, RoundingStrategy::MidpointAwayFromZero)
}

/// Build the full `count`-length ladder.
///
/// Rung 1 is a MARKET order when the market is open, SKIPPED otherwise
/// (AMO is not supported). All later rungs are GTT. When the market is
/// closed the first GTT rung anchors at `first_gtt_discount_pct` below the
/// base price and subsequent rungs step by `decrease_pct` from there;
/// skipping rung 1 never collapses the ladder's numbering.
pub fn build_ladder(params: &LadderParams) -> Result<Vec<OrderSpec>, LadderError> {
    validate(params)?;

    let mut rungs = Vec::with_capacity(params.count as usize);
    let hundred = dec!(100);

    for i in 1..=params.count {
        // Saturate so env-sourced start quantities near u32::MAX cannot
        // overflow before the clamp.
        let quantity = params.start_quantity.saturating_add(i - 1).min(params.max_quantity);

        let decrease_pct = if i == 1 {
            Decimal::ZERO
        } else if params.market_open {
            params.decrease_pct * Decimal::from(i - 1)
        } else {
            params.first_gtt_discount_pct + params.decrease_pct * Decimal::from(i - 2)
        };

        let price = round_price(params.base_price * (Decimal::ONE - decrease_pct / hundred));
        if price <= Decimal::ZERO {
            return Err(LadderError::NonPositivePrice {
                sequence_number: i,
                price,
                decrease_pct: params.decrease_pct,
                count: params.count,
            });
        }

        let order_kind = match (i, params.market_open) {
            (1, true) => OrderKind::Market,
            (1, false) => OrderKind::Skipped,
            _ => OrderKind::Gtt,
        };

        let trigger_price = match order_kind {
            OrderKind::Gtt => Some(round_price(price * TRIGGER_MARGIN)),
            OrderKind::Market | OrderKind::Skipped => None,
        };

        rungs.push(OrderSpec {
            sequence_number: i,
            symbol: params.symbol.clone(),
            quantity,
            price,
            trigger_price,
            order_kind,
            status: OrderStatus::Pending,
            broker_order_id: None,
            trigger_id: None,
            failure_reason: None,
        });
    }

    Ok(rungs)
}

fn validate(params: &LadderParams) -> Result<(), LadderError> {
    if params.count < 1 {
        return Err(LadderError::invalid("order count must be at least 1"));
    }
    if params.base_price <= Decimal::ZERO {
        return Err(LadderError::invalid(format!(
            "base price must be positive, got {}",
            params.base_price
        )));
    }
    if params.start_quantity < 1 {
        return Err(LadderError::invalid("start quantity must be at least 1"));
    }
    if params.max_quantity < params.start_quantity {
        return Err(LadderError::invalid(format!(
            "max quantity {} is below start quantity {}",
            params.max_quantity, params.start_quantity
        )));
    }
    if params.decrease_pct < Decimal::ZERO {
        return Err(LadderError::invalid("price decrease percent cannot be negative"));
    }
    if params.first_gtt_discount_pct < Decimal::ZERO {
        return Err(LadderError::invalid("first GTT discount percent cannot be negative"));
    }
    Ok(())
}
