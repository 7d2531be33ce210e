use super::price::PriceError;
use chrono::{DateTime, FixedOffset, NaiveDate};
use rust_decimal::Decimal;

/// Failures that abort a single asset's matching run
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("no usable price for {asset} on {day} (event at {timestamp}): {source}")]
    MissingPrice {
        asset: String,
        day: NaiveDate,
        timestamp: DateTime<FixedOffset>,
        #[source]
        source: PriceError,
    },
    #[error("events out of order for {asset}: event {id} at {current} follows {previous}")]
    OutOfOrderInput {
        asset: String,
        id: usize,
        previous: DateTime<FixedOffset>,
        current: DateTime<FixedOffset>,
    },
    #[error("event {id} belongs to {found}, not {expected}")]
    AssetMismatch {
        id: usize,
        expected: String,
        found: String,
    },
    #[error("event {id} for {asset} has negative quantity {quantity}")]
    InvalidQuantity {
        id: usize,
        asset: String,
        quantity: Decimal,
    },
    #[error("arithmetic overflow for {asset} at {timestamp}")]
    Overflow {
        asset: String,
        timestamp: DateTime<FixedOffset>,
    },
}

impl EngineError {
    /// Timestamp of the event that triggered the failure, when there is one.
    pub fn timestamp(&self) -> Option<DateTime<FixedOffset>> {
        match self {
            EngineError::MissingPrice { timestamp, .. } => Some(*timestamp),
            EngineError::OutOfOrderInput { current, .. } => Some(*current),
            EngineError::Overflow { timestamp, .. } => Some(*timestamp),
            EngineError::AssetMismatch { .. } | EngineError::InvalidQuantity { .. } => None,
        }
    }
}
