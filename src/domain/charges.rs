//! Zerodha equity-delivery sell-side charge model.
//!
//! Pure arithmetic over `Decimal`: charge breakdown for a sell, profit
//! analysis after charges, and the sell price needed to net a target
//! profit percentage. No I/O.

use crate::domain::ladder::round_price;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// STT on delivery sells: 0.1% of sell value.
const STT_RATE: Decimal = dec!(0.001);
/// NSE exchange transaction charges: 0.00345% of sell value.
const EXCHANGE_RATE: Decimal = dec!(0.0000345);
/// SEBI turnover fees: 0.0001% of sell value.
const SEBI_RATE: Decimal = dec!(0.000001);
/// DP charges per sell, flat: 13.5 + 18% GST.
const DP_CHARGES: Decimal = dec!(15.93);
/// GST on exchange charges and SEBI fees.
const GST_RATE: Decimal = dec!(0.18);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargeBreakdown {
    pub brokerage: Decimal,
    pub stt: Decimal,
    pub exchange_charges: Decimal,
    pub sebi_fees: Decimal,
    pub dp_charges: Decimal,
    pub gst: Decimal,
    pub total: Decimal,
    pub per_share: Decimal,
}

/// All charges on one delivery sell. Brokerage is zero for delivery.
pub fn sell_charges(sell_value: Decimal, quantity: u32) -> ChargeBreakdown {
    let brokerage = Decimal::ZERO;
    let stt = sell_value * STT_RATE;
    let exchange_charges = sell_value * EXCHANGE_RATE;
    let sebi_fees = sell_value * SEBI_RATE;
    let gst = (exchange_charges + sebi_fees) * GST_RATE;
    let total = brokerage + stt + exchange_charges + sebi_fees + DP_CHARGES + gst;
    let per_share = if quantity > 0 {
        total / Decimal::from(quantity)
    } else {
        Decimal::ZERO
    };
    ChargeBreakdown {
        brokerage,
        stt,
        exchange_charges,
        sebi_fees,
        dp_charges: DP_CHARGES,
        gst,
        total,
        per_share,
    }
}

/// Profit picture for selling `quantity` shares bought at `buy_price`.
/// Percentages are relative to the buy value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfitAnalysis {
    pub buy_value: Decimal,
    pub sell_value: Decimal,
    pub gross_profit: Decimal,
    pub gross_profit_percent: Decimal,
    pub charges: ChargeBreakdown,
    pub charges_percent: Decimal,
    pub net_profit: Decimal,
    pub net_profit_percent: Decimal,
    pub break_even_price: Decimal,
}

pub fn profit_with_charges(
    buy_price: Decimal,
    sell_price: Decimal,
    quantity: u32,
) -> ProfitAnalysis {
    let qty = Decimal::from(quantity);
    let buy_value = buy_price * qty;
    let sell_value = sell_price * qty;
    let gross_profit = sell_value - buy_value;

    let charges = sell_charges(sell_value, quantity);
    let net_profit = gross_profit - charges.total;

    let hundred = dec!(100);
    let pct = |value: Decimal| {
        if buy_value > Decimal::ZERO {
            value / buy_value * hundred
        } else {
            Decimal::ZERO
        }
    };
    let break_even_price = if quantity > 0 {
        buy_price + charges.total / qty
    } else {
        buy_price
    };

    ProfitAnalysis {
        buy_value,
        sell_value,
        gross_profit,
        gross_profit_percent: pct(gross_profit),
        charges_percent: pct(charges.total),
        net_profit,
        net_profit_percent: pct(net_profit),
        charges,
        break_even_price,
    }
}

const MAX_ITERATIONS: u32 = 50;
/// Convergence tolerance, in net-profit percentage points.
const TOLERANCE: Decimal = dec!(0.01);
/// Per-iteration price step, 0.1%.
const STEP_UP: Decimal = dec!(1.001);
const STEP_DOWN: Decimal = dec!(0.999);

/// Sell price at which the position nets `target_pct` percent after
/// charges. Starts at the gross target and walks the price in 0.1% steps
/// until the net percentage converges (or the iteration budget runs out,
/// leaving the price within one step of the target).
pub fn target_sell_price(buy_price: Decimal, quantity: u32, target_pct: Decimal) -> Decimal {
    let hundred = dec!(100);
    let mut sell_price = buy_price * (Decimal::ONE + target_pct / hundred);

    for _ in 0..MAX_ITERATIONS {
        let analysis = profit_with_charges(buy_price, sell_price, quantity);
        let diff = analysis.net_profit_percent - target_pct;
        if diff.abs() <= TOLERANCE {
            break;
        }
        sell_price *= if diff < Decimal::ZERO { STEP_UP } else { STEP_DOWN };
    }

    round_price(sell_price)
}
