//! First-in-first-out lot matching.
//!
//! Every acquisition opens a lot priced at the acquisition day's unit price.
//! Disposals consume open lots strictly oldest-first, splitting the last lot
//! touched when it is only partially used. Proceeds are always valued at the
//! disposal day's price.

use super::disposal::{DisposalBuilder, DisposalRecord, LotSource, MatchingRule};
use super::error::EngineError;
use super::events::{validate_sequence, Direction, Event};
use super::lots::{is_exhausted, take_from, Arena, LotId};
use super::price::{price_for, PriceSource};
use chrono::{DateTime, FixedOffset};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::VecDeque;

/// An acquisition lot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Lot {
    pub event_id: usize,
    pub acquired_at: DateTime<FixedOffset>,
    pub op_hash: Option<String>,
    pub quantity: Decimal,
    pub remaining_quantity: Decimal,
    pub unit_cost: Decimal,
}

impl Lot {
    fn source(&self) -> LotSource {
        LotSource {
            event_id: self.event_id,
            acquired_at: self.acquired_at,
            op_hash: self.op_hash.clone(),
        }
    }
}

/// Lot queue for a single asset
#[derive(Debug)]
pub struct FifoEngine {
    asset: String,
    lots: Arena<Lot>,
    open: VecDeque<LotId>,
    /// Total ever acquired; bounds every sum over open lots
    acquired: Decimal,
}

impl FifoEngine {
    pub fn new(asset: impl Into<String>) -> Self {
        FifoEngine {
            asset: asset.into(),
            lots: Arena::new(),
            open: VecDeque::new(),
            acquired: Decimal::ZERO,
        }
    }

    /// Open a new lot at the tail of the queue
    pub fn acquire(&mut self, event: &Event, unit_cost: Decimal) -> Result<LotId, EngineError> {
        self.acquired = self
            .acquired
            .checked_add(event.quantity)
            .ok_or_else(|| EngineError::Overflow {
                asset: self.asset.clone(),
                timestamp: event.datetime,
            })?;
        let id = self.lots.push(Lot {
            event_id: event.id,
            acquired_at: event.datetime,
            op_hash: event.op_hash.clone(),
            quantity: event.quantity,
            remaining_quantity: event.quantity,
            unit_cost,
        });
        self.open.push_back(id);
        log::debug!(
            "FIFO {} LOT: qty={}, unit_cost={}. Open lots: {}",
            self.asset,
            event.quantity,
            unit_cost,
            self.open.len()
        );
        Ok(id)
    }

    /// Match a disposal against open lots, oldest first
    pub fn dispose(
        &mut self,
        event: &Event,
        unit_price: Decimal,
    ) -> Result<DisposalRecord, EngineError> {
        let mut disposal = DisposalBuilder::new(event, unit_price);
        let mut remaining = event.quantity;

        while !is_exhausted(remaining) {
            let Some(&id) = self.open.front() else {
                break;
            };
            let lot = &mut self.lots[id];
            let take = take_from(&mut lot.remaining_quantity, remaining);
            remaining -= take;
            disposal.matched(MatchingRule::Fifo, Some(lot.source()), take, lot.unit_cost)?;
            log::debug!(
                "FIFO {} TAKE: qty={} from lot acquired {} at {}. Lot remaining: {}",
                self.asset,
                take,
                lot.acquired_at,
                lot.unit_cost,
                lot.remaining_quantity
            );

            if is_exhausted(lot.remaining_quantity) {
                self.open.pop_front();
            } else {
                break;
            }
        }

        disposal.unmatched(MatchingRule::Fifo, remaining);
        disposal.finish(None)
    }

    /// Lots still holding quantity, oldest first
    pub fn open_lots(&self) -> impl Iterator<Item = &Lot> {
        self.open.iter().map(|id| &self.lots[*id])
    }

    pub fn remaining_quantity(&self) -> Decimal {
        self.open_lots().map(|lot| lot.remaining_quantity).sum()
    }
}

/// Result of a FIFO run over one asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FifoReport {
    pub asset: String,
    pub disposals: Vec<DisposalRecord>,
    pub open_lots: Vec<Lot>,
}

/// Run FIFO matching over a chronologically sorted event sequence for one asset.
///
/// Zero-quantity events are skipped. Ordering, asset and price failures abort
/// the run; over-disposals are recorded on the affected disposal.
pub fn calculate_fifo<P: PriceSource>(
    asset: &str,
    events: &[Event],
    prices: &mut P,
) -> Result<FifoReport, EngineError> {
    validate_sequence(asset, events)?;

    let mut engine = FifoEngine::new(asset);
    let mut disposals = Vec::new();

    for event in events.iter().filter(|e| !e.quantity.is_zero()) {
        let price = price_for(prices, event)?;
        match event.direction {
            Direction::Acquire => {
                engine.acquire(event, price)?;
            }
            Direction::Dispose => disposals.push(engine.dispose(event, price)?),
        }
    }

    log::info!(
        "FIFO {}: {} disposals, {} units left in {} open lots",
        asset,
        disposals.len(),
        engine.remaining_quantity(),
        engine.open.len()
    );

    Ok(FifoReport {
        asset: asset.to_string(),
        disposals,
        open_lots: engine.open_lots().cloned().collect(),
    })
}
