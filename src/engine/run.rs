//! Per-asset orchestration. Each asset gets its own engine instance; a failed
//! asset run is reported alongside the others rather than aborting them.

use super::disposal::DisposalRecord;
use super::error::EngineError;
use super::events::{group_by_asset, Event};
use super::fifo::{calculate_fifo, FifoReport};
use super::pooling::{calculate_uk, PoolingPolicy, UkReport};
use super::price::PriceSource;
use serde::Serialize;

/// Accounting policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    /// First-in-first-out lots
    Fifo,
    /// Same-day, 30-day, then pooled average cost
    Uk,
}

impl Method {
    pub fn display(&self) -> &'static str {
        match self {
            Method::Fifo => "FIFO",
            Method::Uk => "UK",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Outcome {
    Fifo(FifoReport),
    Uk(UkReport),
}

impl Outcome {
    pub fn disposals(&self) -> &[DisposalRecord] {
        match self {
            Outcome::Fifo(report) => &report.disposals,
            Outcome::Uk(report) => &report.disposals,
        }
    }
}

/// Result of running one method over one asset
#[derive(Debug)]
pub struct AssetRun {
    pub asset: String,
    pub method: Method,
    pub outcome: Result<Outcome, EngineError>,
}

impl AssetRun {
    /// Disposals of a successful run; empty when the run failed
    pub fn disposals(&self) -> &[DisposalRecord] {
        match &self.outcome {
            Ok(outcome) => outcome.disposals(),
            Err(_) => &[],
        }
    }

    pub fn error(&self) -> Option<&EngineError> {
        self.outcome.as_ref().err()
    }
}

/// Run `method` over a single asset's sequence
pub fn run_asset<P: PriceSource>(
    asset: &str,
    events: &[Event],
    prices: &mut P,
    method: Method,
    policy: PoolingPolicy,
) -> AssetRun {
    let outcome = match method {
        Method::Fifo => calculate_fifo(asset, events, prices).map(Outcome::Fifo),
        Method::Uk => calculate_uk(asset, events, prices, policy).map(Outcome::Uk),
    };
    if let Err(err) = &outcome {
        log::warn!("{} run for {} failed: {}", method.display(), asset, err);
    }
    AssetRun {
        asset: asset.to_string(),
        method,
        outcome,
    }
}

/// Run `method` over every asset in a mixed, chronologically ordered stream.
/// Runs are returned in asset order.
pub fn run_all<P: PriceSource>(
    events: &[Event],
    prices: &mut P,
    method: Method,
    policy: PoolingPolicy,
) -> Vec<AssetRun> {
    group_by_asset(events)
        .iter()
        .map(|(asset, events)| run_asset(asset, events, prices, method, policy))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::events::test_support::{acq, disp};
    use crate::engine::price::{PriceError, PriceTable};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn token(mut event: Event) -> Event {
        event.asset = "USDt:KT1:0:fa1.2".to_string();
        event
    }

    #[test]
    fn failed_asset_does_not_stop_others() {
        let events = vec![
            acq(1, "2025-01-01", dec!(10)),
            token(acq(2, "2025-01-01", dec!(5))),
            disp(3, "2025-01-02", dec!(4)),
            token(disp(4, "2025-01-03", dec!(1))),
        ];
        let mut table = PriceTable::new();
        table.insert("XTZ", day("2025-01-01"), dec!(2));
        table.insert("XTZ", day("2025-01-02"), dec!(5));

        for method in [Method::Fifo, Method::Uk] {
            let runs = run_all(&events, &mut table, method, PoolingPolicy::default());
            assert_eq!(runs.len(), 2);

            let token_run = &runs[0];
            assert_eq!(token_run.asset, "USDt:KT1:0:fa1.2");
            assert!(matches!(
                token_run.error(),
                Some(EngineError::MissingPrice { .. })
            ));
            assert!(token_run.disposals().is_empty());

            let xtz = &runs[1];
            assert_eq!(xtz.asset, "XTZ");
            assert_eq!(xtz.method, method);
            assert_eq!(xtz.disposals().len(), 1);
            assert_eq!(xtz.disposals()[0].gain, dec!(12));
        }
    }

    #[test]
    fn methods_produce_their_own_reports() {
        let events = vec![acq(1, "2025-01-01", dec!(1)), disp(2, "2025-01-01", dec!(1))];
        let mut flat = |_: &str, _: NaiveDate| Ok::<_, PriceError>(dec!(1));

        let fifo = run_asset("XTZ", &events, &mut flat, Method::Fifo, PoolingPolicy::default());
        assert!(matches!(fifo.outcome, Ok(Outcome::Fifo(_))));

        let uk = run_asset("XTZ", &events, &mut flat, Method::Uk, PoolingPolicy::default());
        assert!(matches!(uk.outcome, Ok(Outcome::Uk(_))));
    }
}
