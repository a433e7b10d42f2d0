use rust_decimal::Decimal;
use thiserror::Error;

/// Fatal validation failures raised before the confirmation gate.
///
/// Per-rung broker rejections and duplicate detections are recorded in the
/// summary instead of being raised; only parameter problems abort a run.
#[derive(Debug, Error)]
pub enum LadderError {
    #[error("Invalid parameter: {reason}")]
    InvalidParameter { reason: String },

    #[error(
        "Ladder price for rung {sequence_number} is non-positive ({price}): \
         decrease of {decrease_pct}% per rung is too steep for {count} rungs"
    )]
    NonPositivePrice {
        sequence_number: u32,
        price: Decimal,
        decrease_pct: Decimal,
        count: u32,
    },
}

impl LadderError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        LadderError::InvalidParameter {
            reason: reason.into(),
        }
    }
}
