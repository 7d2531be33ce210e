use super::error::EngineError;
use super::events::Event;
use super::lots::is_exhausted;
use super::warnings::Warning;
use chrono::{DateTime, FixedOffset, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Rule under which a quantity was matched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchingRule {
    #[serde(rename = "FIFO")]
    Fifo,
    #[serde(rename = "SAME-DAY")]
    SameDay,
    #[serde(rename = "30-DAY")]
    ThirtyDay,
    #[serde(rename = "POOL")]
    Pool,
}

impl MatchingRule {
    pub fn display(&self) -> &'static str {
        match self {
            MatchingRule::Fifo => "FIFO",
            MatchingRule::SameDay => "SAME-DAY",
            MatchingRule::ThirtyDay => "30-DAY",
            MatchingRule::Pool => "POOL",
        }
    }
}

impl std::fmt::Display for MatchingRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}

/// The acquisition a matched quantity was taken from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LotSource {
    pub event_id: usize,
    pub acquired_at: DateTime<FixedOffset>,
    pub op_hash: Option<String>,
}

/// One line of a disposal's matching breakdown
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchEntry {
    pub rule: MatchingRule,
    /// `None` for pool matches and for unmatched shortfall
    pub source: Option<LotSource>,
    pub quantity: Decimal,
    pub unit_cost: Decimal,
    /// Cost attributed to this line; what the pool lost for POOL matches
    pub cost: Decimal,
}

/// Pool state captured after a disposal (UK matching only)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolSnapshot {
    pub quantity: Decimal,
    pub cost: Decimal,
}

/// A matched disposal with proceeds, cost basis and gain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisposalRecord {
    pub event_id: usize,
    #[serde(rename = "timestamp")]
    pub datetime: DateTime<FixedOffset>,
    pub asset: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub proceeds: Decimal,
    pub cost_basis: Decimal,
    pub gain: Decimal,
    pub op_hash: Option<String>,
    pub matching: Vec<MatchEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<Warning>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pool_after: Option<PoolSnapshot>,
}

impl DisposalRecord {
    pub fn date(&self) -> NaiveDate {
        self.datetime.date_naive()
    }

    /// Sum of quantities across the matching breakdown
    #[cfg(test)]
    pub fn matched_quantity(&self) -> Decimal {
        self.matching.iter().map(|m| m.quantity).sum()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn is_over_disposal(&self) -> bool {
        self.warnings
            .iter()
            .any(|w| matches!(w, Warning::OverDisposal { .. }))
    }
}

/// Accumulates matches for one disposal event
#[derive(Debug)]
pub(crate) struct DisposalBuilder<'a> {
    event: &'a Event,
    unit_price: Decimal,
    cost_basis: Decimal,
    matching: Vec<MatchEntry>,
    warnings: Vec<Warning>,
}

impl<'a> DisposalBuilder<'a> {
    pub fn new(event: &'a Event, unit_price: Decimal) -> Self {
        let mut warnings = Vec::new();
        if unit_price.is_zero() {
            warnings.push(Warning::ZeroPrice { day: event.date() });
        }
        DisposalBuilder {
            event,
            unit_price,
            cost_basis: Decimal::ZERO,
            matching: Vec::new(),
            warnings,
        }
    }

    fn overflow(&self) -> EngineError {
        EngineError::Overflow {
            asset: self.event.asset.clone(),
            timestamp: self.event.datetime,
        }
    }

    /// Record `quantity` taken at `unit_cost` per unit
    pub fn matched(
        &mut self,
        rule: MatchingRule,
        source: Option<LotSource>,
        quantity: Decimal,
        unit_cost: Decimal,
    ) -> Result<(), EngineError> {
        let cost = quantity
            .checked_mul(unit_cost)
            .ok_or_else(|| self.overflow())?;
        self.matched_at_cost(rule, source, quantity, unit_cost, cost)
    }

    /// Record `quantity` taken for an already known total `cost`
    pub fn matched_at_cost(
        &mut self,
        rule: MatchingRule,
        source: Option<LotSource>,
        quantity: Decimal,
        unit_cost: Decimal,
        cost: Decimal,
    ) -> Result<(), EngineError> {
        let cost_basis = self
            .cost_basis
            .checked_add(cost)
            .ok_or_else(|| self.overflow())?;
        self.cost_basis = cost_basis;
        self.matching.push(MatchEntry {
            rule,
            source,
            quantity,
            unit_cost,
            cost,
        });
        Ok(())
    }

    /// Record quantity no acquisition could cover. It carries zero cost.
    pub fn unmatched(&mut self, rule: MatchingRule, quantity: Decimal) {
        if is_exhausted(quantity) {
            return;
        }
        log::warn!(
            "Over-disposal of {} {} at {}: {} units have no cost basis",
            self.event.quantity,
            self.event.asset,
            self.event.datetime,
            quantity
        );
        self.matching.push(MatchEntry {
            rule,
            source: None,
            quantity,
            unit_cost: Decimal::ZERO,
            cost: Decimal::ZERO,
        });
        self.warnings.push(Warning::OverDisposal {
            required: self.event.quantity,
            unmatched: quantity,
        });
    }

    pub fn finish(self, pool_after: Option<PoolSnapshot>) -> Result<DisposalRecord, EngineError> {
        let proceeds = self
            .event
            .quantity
            .checked_mul(self.unit_price)
            .ok_or_else(|| self.overflow())?;
        let gain = proceeds
            .checked_sub(self.cost_basis)
            .ok_or_else(|| self.overflow())?;
        Ok(DisposalRecord {
            event_id: self.event.id,
            datetime: self.event.datetime,
            asset: self.event.asset.clone(),
            quantity: self.event.quantity,
            unit_price: self.unit_price,
            proceeds,
            cost_basis: self.cost_basis,
            gain,
            op_hash: self.event.op_hash.clone(),
            matching: self.matching,
            warnings: self.warnings,
            pool_after,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::events::test_support::disp;
    use rust_decimal_macros::dec;

    #[test]
    fn builder_sums_costs_and_gain() {
        let event = disp(1, "2025-02-01", dec!(5));
        let mut builder = DisposalBuilder::new(&event, dec!(4));
        builder.matched(MatchingRule::SameDay, None, dec!(2), dec!(1)).unwrap();
        builder.matched(MatchingRule::Pool, None, dec!(3), dec!(2)).unwrap();
        let record = builder.finish(None).unwrap();

        assert_eq!(record.proceeds, dec!(20));
        assert_eq!(record.cost_basis, dec!(8));
        assert_eq!(record.gain, dec!(12));
        assert_eq!(record.matched_quantity(), dec!(5));
        assert!(!record.has_warnings());
    }

    #[test]
    fn unmatched_adds_zero_cost_entry_and_warning() {
        let event = disp(1, "2025-02-01", dec!(5));
        let mut builder = DisposalBuilder::new(&event, dec!(2));
        builder.matched(MatchingRule::Fifo, None, dec!(1), dec!(1)).unwrap();
        builder.unmatched(MatchingRule::Fifo, dec!(4));
        let record = builder.finish(None).unwrap();

        assert_eq!(record.matching.len(), 2);
        assert_eq!(record.matching[1].unit_cost, Decimal::ZERO);
        assert_eq!(record.matching[1].cost, Decimal::ZERO);
        assert!(record.matching[1].source.is_none());
        assert_eq!(record.cost_basis, dec!(1));
        assert!(record.is_over_disposal());
        assert_eq!(
            record.warnings,
            vec![Warning::OverDisposal {
                required: dec!(5),
                unmatched: dec!(4),
            }]
        );
    }

    #[test]
    fn unmatched_dust_is_ignored() {
        let event = disp(1, "2025-02-01", dec!(1));
        let mut builder = DisposalBuilder::new(&event, dec!(1));
        builder.unmatched(MatchingRule::Pool, dec!(0.0000000000001));
        let record = builder.finish(None).unwrap();
        assert!(record.matching.is_empty());
        assert!(!record.is_over_disposal());
    }

    #[test]
    fn zero_price_is_flagged() {
        let event = disp(1, "2025-02-01", dec!(1));
        let record = DisposalBuilder::new(&event, Decimal::ZERO).finish(None).unwrap();
        assert_eq!(
            record.warnings,
            vec![Warning::ZeroPrice {
                day: event.date()
            }]
        );
    }

    #[test]
    fn pool_line_keeps_the_cost_actually_removed() {
        let event = disp(1, "2025-02-01", dec!(3));
        let mut builder = DisposalBuilder::new(&event, dec!(1));
        builder
            .matched_at_cost(MatchingRule::Pool, None, dec!(3), dec!(3.3333), dec!(10))
            .unwrap();
        let record = builder.finish(None).unwrap();
        assert_eq!(record.matching[0].cost, dec!(10));
        assert_eq!(record.cost_basis, dec!(10));
    }

    #[test]
    fn overflowing_amounts_are_errors() {
        let event = disp(7, "2025-02-01", dec!(10000000000000000000000));
        let overflow = EngineError::Overflow {
            asset: event.asset.clone(),
            timestamp: event.datetime,
        };

        let mut builder = DisposalBuilder::new(&event, dec!(1));
        let err = builder
            .matched(MatchingRule::Fifo, None, event.quantity, dec!(100000000))
            .unwrap_err();
        assert_eq!(err, overflow);
        assert!(builder.matching.is_empty());

        let err = DisposalBuilder::new(&event, dec!(100000000)).finish(None).unwrap_err();
        assert_eq!(err, overflow);
    }

    #[test]
    fn rule_tags_serialize() {
        assert_eq!(serde_json::to_string(&MatchingRule::ThirtyDay).unwrap(), "\"30-DAY\"");
        assert_eq!(MatchingRule::SameDay.to_string(), "SAME-DAY");
    }
}
