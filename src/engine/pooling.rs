//! UK share-matching: same-day, then 30-day forward, then pooled average cost.
//!
//! All acquisitions are priced and indexed before the first disposal is
//! matched, because a disposal may be matched against acquisitions that occur
//! later in the stream. The pool itself only changes as the chronological pass
//! reaches each event.

use super::disposal::{DisposalBuilder, DisposalRecord, LotSource, MatchingRule, PoolSnapshot};
use super::error::EngineError;
use super::events::{validate_sequence, Direction, Event};
use super::lots::{is_exhausted, take_from, Arena, LotId};
use super::price::{price_for, PriceSource};
use chrono::{DateTime, Duration, FixedOffset, NaiveDate};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

/// Calendar days after a disposal in which acquisitions are matched
pub const FORWARD_WINDOW_DAYS: i64 = 30;

/// How acquisitions reach the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PoolingPolicy {
    /// Every acquisition is credited in full when reached. Same-day and 30-day
    /// matches never touch the pool; only a disposal's unmatched residual is
    /// debited. Deviates from HMRC pooling, which never pools matched quantity.
    #[default]
    CreditOnAcquisition,
    /// Quantity matched under the same-day or 30-day rule is kept out of the pool.
    ExcludeMatched,
}

/// Aggregated holding valued at average cost
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Pool {
    pub quantity: Decimal,
    pub cost: Decimal,
}

impl Pool {
    /// Credit the pool; `None` leaves it untouched when a total would overflow
    pub fn add(&mut self, quantity: Decimal, cost: Decimal) -> Option<()> {
        let new_quantity = self.quantity.checked_add(quantity)?;
        let new_cost = self.cost.checked_add(cost)?;
        self.quantity = new_quantity;
        self.cost = new_cost;
        Some(())
    }

    /// Average cost per unit, undefined for an empty pool
    pub fn average_cost(&self) -> Option<Decimal> {
        if is_exhausted(self.quantity) {
            None
        } else {
            self.cost.checked_div(self.quantity)
        }
    }

    /// Remove `quantity` at average cost, returning the cost removed.
    /// Removing the whole pool (within tolerance) empties it exactly.
    pub fn remove(&mut self, quantity: Decimal) -> Decimal {
        let Some(average) = self.average_cost() else {
            return Decimal::ZERO;
        };
        if is_exhausted(self.quantity - quantity) {
            let cost = self.cost;
            self.quantity = Decimal::ZERO;
            self.cost = Decimal::ZERO;
            cost
        } else {
            let cost = quantity
                .checked_mul(average)
                .map_or(self.cost, |cost| cost.min(self.cost));
            self.quantity -= quantity;
            self.cost = (self.cost - cost).max(Decimal::ZERO);
            cost
        }
    }

    /// Take back quantity previously credited at a known cost
    fn withdraw(&mut self, quantity: Decimal, cost: Decimal) {
        self.quantity = (self.quantity - quantity).max(Decimal::ZERO);
        self.cost = (self.cost - cost).max(Decimal::ZERO);
        if is_exhausted(self.quantity) {
            self.quantity = Decimal::ZERO;
            self.cost = Decimal::ZERO;
        }
    }

    fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            quantity: self.quantity,
            cost: self.cost,
        }
    }
}

/// An acquisition available to same-day and 30-day matching
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Acquisition {
    pub event_id: usize,
    pub acquired_at: DateTime<FixedOffset>,
    pub op_hash: Option<String>,
    pub quantity: Decimal,
    pub remaining_quantity: Decimal,
    pub unit_cost: Decimal,
    /// Whether the chronological pass has credited this acquisition to the pool
    pub pooled: bool,
}

impl Acquisition {
    pub fn date(&self) -> NaiveDate {
        self.acquired_at.date_naive()
    }

    fn source(&self) -> LotSource {
        LotSource {
            event_id: self.event_id,
            acquired_at: self.acquired_at,
            op_hash: self.op_hash.clone(),
        }
    }
}

/// Matching state for a single asset
#[derive(Debug)]
pub struct UkEngine {
    asset: String,
    policy: PoolingPolicy,
    /// Chronological; also serves as the 30-day lookahead list
    acquisitions: Arena<Acquisition>,
    by_day: BTreeMap<NaiveDate, Vec<LotId>>,
    pool: Pool,
}

impl UkEngine {
    pub fn new(asset: impl Into<String>, policy: PoolingPolicy) -> Self {
        UkEngine {
            asset: asset.into(),
            policy,
            acquisitions: Arena::new(),
            by_day: BTreeMap::new(),
            pool: Pool::default(),
        }
    }

    /// Register an acquisition for matching. Must be called in chronological order
    /// for every acquisition before any disposal is matched.
    pub fn index_acquisition(&mut self, event: &Event, unit_cost: Decimal) -> LotId {
        let id = self.acquisitions.push(Acquisition {
            event_id: event.id,
            acquired_at: event.datetime,
            op_hash: event.op_hash.clone(),
            quantity: event.quantity,
            remaining_quantity: event.quantity,
            unit_cost,
            pooled: false,
        });
        self.by_day.entry(event.date()).or_default().push(id);
        id
    }

    fn overflow(&self, timestamp: DateTime<FixedOffset>) -> EngineError {
        EngineError::Overflow {
            asset: self.asset.clone(),
            timestamp,
        }
    }

    /// Credit an indexed acquisition to the pool as the chronological pass reaches it
    pub fn credit_pool(&mut self, id: LotId) -> Result<(), EngineError> {
        let acquisition = &mut self.acquisitions[id];
        if acquisition.pooled {
            return Ok(());
        }
        acquisition.pooled = true;
        let quantity = match self.policy {
            PoolingPolicy::CreditOnAcquisition => acquisition.quantity,
            PoolingPolicy::ExcludeMatched => acquisition.remaining_quantity,
        };
        if is_exhausted(quantity) {
            return Ok(());
        }
        let acquired_at = acquisition.acquired_at;
        let credited = quantity
            .checked_mul(acquisition.unit_cost)
            .and_then(|cost| self.pool.add(quantity, cost).map(|()| cost));
        let Some(cost) = credited else {
            return Err(self.overflow(acquired_at));
        };
        log::debug!(
            "Pool {} ADD: qty={}, cost={}. New total: qty={}, cost={}",
            self.asset,
            quantity,
            cost,
            self.pool.quantity,
            self.pool.cost
        );
        Ok(())
    }

    /// Match a disposal: same-day, then 30-day forward, then pool
    pub fn dispose(
        &mut self,
        event: &Event,
        unit_price: Decimal,
    ) -> Result<DisposalRecord, EngineError> {
        let mut disposal = DisposalBuilder::new(event, unit_price);
        let mut remaining = event.quantity;

        if let Some(bucket) = self.by_day.get(&event.date()) {
            let bucket = bucket.clone();
            remaining = self.consume(bucket, remaining, MatchingRule::SameDay, &mut disposal)?;
        }

        if !is_exhausted(remaining) {
            let start = self
                .acquisitions
                .partition_point(|a| a.acquired_at <= event.datetime);
            let last_day = event.date() + Duration::days(FORWARD_WINDOW_DAYS);
            let window: Vec<LotId> = self
                .acquisitions
                .ids_from(start)
                .take_while(|id| self.acquisitions[*id].date() <= last_day)
                .collect();
            remaining = self.consume(window, remaining, MatchingRule::ThirtyDay, &mut disposal)?;
        }

        if !is_exhausted(remaining) {
            if let Some(average) = self.pool.average_cost() {
                let taken = remaining.min(self.pool.quantity);
                let cost = self.pool.remove(taken);
                disposal.matched_at_cost(MatchingRule::Pool, None, taken, average, cost)?;
                remaining -= taken;
                log::debug!(
                    "Pool {} REMOVE: qty={}, cost={}. Remaining: qty={}, cost={}",
                    self.asset,
                    taken,
                    cost,
                    self.pool.quantity,
                    self.pool.cost
                );
            }
            disposal.unmatched(MatchingRule::Pool, remaining);
        }

        disposal.finish(Some(self.pool.snapshot()))
    }

    /// Consume acquisitions in the given order until `wanted` is covered
    fn consume(
        &mut self,
        ids: Vec<LotId>,
        wanted: Decimal,
        rule: MatchingRule,
        disposal: &mut DisposalBuilder<'_>,
    ) -> Result<Decimal, EngineError> {
        let mut remaining = wanted;
        for id in ids {
            if is_exhausted(remaining) {
                break;
            }
            let acquisition = &mut self.acquisitions[id];
            if is_exhausted(acquisition.remaining_quantity) {
                continue;
            }
            let take = take_from(&mut acquisition.remaining_quantity, remaining);
            remaining -= take;
            let Some(cost) = take.checked_mul(acquisition.unit_cost) else {
                let acquired_at = acquisition.acquired_at;
                return Err(self.overflow(acquired_at));
            };
            disposal.matched_at_cost(
                rule,
                Some(acquisition.source()),
                take,
                acquisition.unit_cost,
                cost,
            )?;
            log::debug!(
                "{} match: {} {} acquired {} at {}",
                rule,
                take,
                self.asset,
                acquisition.acquired_at,
                acquisition.unit_cost
            );

            if self.policy == PoolingPolicy::ExcludeMatched && acquisition.pooled {
                self.pool.withdraw(take, cost);
            }
        }
        Ok(remaining)
    }
}

/// Result of a UK matching run over one asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UkReport {
    pub asset: String,
    pub policy: PoolingPolicy,
    pub disposals: Vec<DisposalRecord>,
    pub pool: Pool,
}

/// Run UK matching over a chronologically sorted event sequence for one asset.
pub fn calculate_uk<P: PriceSource>(
    asset: &str,
    events: &[Event],
    prices: &mut P,
    policy: PoolingPolicy,
) -> Result<UkReport, EngineError> {
    validate_sequence(asset, events)?;

    let mut engine = UkEngine::new(asset, policy);
    let events: Vec<&Event> = events.iter().filter(|e| !e.quantity.is_zero()).collect();

    // First pass: index every acquisition so 30-day matching can look ahead
    let mut indexed = Vec::new();
    for event in events.iter().filter(|e| e.is_acquisition()) {
        let unit_cost = price_for(prices, event)?;
        indexed.push(engine.index_acquisition(event, unit_cost));
    }

    // Second pass: chronological, crediting the pool as acquisitions are reached
    let mut pending = indexed.into_iter();
    let mut disposals = Vec::new();
    for event in events {
        match event.direction {
            Direction::Acquire => {
                if let Some(id) = pending.next() {
                    engine.credit_pool(id)?;
                }
            }
            Direction::Dispose => {
                let unit_price = price_for(prices, event)?;
                disposals.push(engine.dispose(event, unit_price)?);
            }
        }
    }

    log::info!(
        "UK {}: {} disposals, pool qty={}, cost={}",
        asset,
        disposals.len(),
        engine.pool.quantity,
        engine.pool.cost
    );

    Ok(UkReport {
        asset: asset.to_string(),
        policy,
        disposals,
        pool: engine.pool,
    })
}
