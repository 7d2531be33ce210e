use super::error::EngineError;
use chrono::{DateTime, FixedOffset, NaiveDate};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

/// Whether an event adds to or removes from a holding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Acquire,
    Dispose,
}

impl Direction {
    pub fn display(&self) -> &'static str {
        match self {
            Direction::Acquire => "in",
            Direction::Dispose => "out",
        }
    }
}

/// A single fungible-asset movement fed to the matching engines
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    /// Discovery sequence number assigned during normalization
    pub id: usize,
    #[serde(rename = "timestamp")]
    pub datetime: DateTime<FixedOffset>,
    pub direction: Direction,
    pub asset: String,
    pub quantity: Decimal,
    /// Operation hash of the originating record, if known
    pub op_hash: Option<String>,
}

impl Event {
    /// Calendar day used for pricing and same-day matching
    pub fn date(&self) -> NaiveDate {
        self.datetime.date_naive()
    }

    pub fn is_acquisition(&self) -> bool {
        self.direction == Direction::Acquire
    }
}

/// Reject a per-asset sequence that the engines cannot process as given.
///
/// Events must all belong to `asset`, carry non-negative quantities and be in
/// non-decreasing timestamp order. Nothing is re-sorted here.
pub fn validate_sequence(asset: &str, events: &[Event]) -> Result<(), EngineError> {
    let mut previous: Option<&Event> = None;
    for event in events {
        if event.asset != asset {
            return Err(EngineError::AssetMismatch {
                id: event.id,
                expected: asset.to_string(),
                found: event.asset.clone(),
            });
        }
        if event.quantity < Decimal::ZERO {
            return Err(EngineError::InvalidQuantity {
                id: event.id,
                asset: asset.to_string(),
                quantity: event.quantity,
            });
        }
        if let Some(prev) = previous {
            if event.datetime < prev.datetime {
                return Err(EngineError::OutOfOrderInput {
                    asset: asset.to_string(),
                    id: event.id,
                    previous: prev.datetime,
                    current: event.datetime,
                });
            }
        }
        previous = Some(event);
    }
    Ok(())
}

/// Split a mixed stream into per-asset streams, preserving relative order
pub fn group_by_asset(events: &[Event]) -> BTreeMap<String, Vec<Event>> {
    let mut groups: BTreeMap<String, Vec<Event>> = BTreeMap::new();
    for event in events {
        groups
            .entry(event.asset.clone())
            .or_default()
            .push(event.clone());
    }
    groups
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use chrono::NaiveDateTime;

    /// Build an event from "YYYY-MM-DD" or "YYYY-MM-DDTHH:MM:SS" (UTC)
    pub fn event(id: usize, when: &str, direction: Direction, quantity: Decimal) -> Event {
        let naive = NaiveDateTime::parse_from_str(when, "%Y-%m-%dT%H:%M:%S")
            .or_else(|_| {
                NaiveDate::parse_from_str(when, "%Y-%m-%d").map(|d| d.and_hms_opt(0, 0, 0).unwrap())
            })
            .unwrap();
        Event {
            id,
            datetime: naive.and_utc().fixed_offset(),
            direction,
            asset: "XTZ".to_string(),
            quantity,
            op_hash: Some(format!("op{id}")),
        }
    }

    pub fn acq(id: usize, when: &str, quantity: Decimal) -> Event {
        event(id, when, Direction::Acquire, quantity)
    }

    pub fn disp(id: usize, when: &str, quantity: Decimal) -> Event {
        event(id, when, Direction::Dispose, quantity)
    }
}
