//! Daily unit prices.
//!
//! Engines ask a [`PriceSource`] for the price of an asset on a calendar day.
//! An unavailable price is always an explicit [`PriceError`], never zero.

use super::error::EngineError;
use super::events::Event;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Read;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum PriceError {
    #[error("no price for {asset} on {day}")]
    NotFound { asset: String, day: NaiveDate },
    #[error("negative price {price} for {asset} on {day}")]
    Negative {
        asset: String,
        day: NaiveDate,
        price: Decimal,
    },
}

/// Unit value of an asset on a calendar day
pub trait PriceSource {
    fn price_of(&mut self, asset: &str, day: NaiveDate) -> Result<Decimal, PriceError>;
}

impl<F> PriceSource for F
where
    F: FnMut(&str, NaiveDate) -> Result<Decimal, PriceError>,
{
    fn price_of(&mut self, asset: &str, day: NaiveDate) -> Result<Decimal, PriceError> {
        self(asset, day)
    }
}

/// Look up the price for an event's day, attaching the event context on failure.
pub fn price_for<P: PriceSource>(prices: &mut P, event: &Event) -> Result<Decimal, EngineError> {
    let day = event.date();
    let price = prices
        .price_of(&event.asset, day)
        .map_err(|source| EngineError::MissingPrice {
            asset: event.asset.clone(),
            day,
            timestamp: event.datetime,
            source,
        })?;
    if price < Decimal::ZERO {
        return Err(EngineError::MissingPrice {
            asset: event.asset.clone(),
            day,
            timestamp: event.datetime,
            source: PriceError::Negative {
                asset: event.asset.clone(),
                day,
                price,
            },
        });
    }
    Ok(price)
}

/// CSV row of a price file: `asset,date,price`
#[derive(Debug, Serialize, Deserialize)]
struct PriceRecord {
    asset: String,
    date: NaiveDate,
    price: Decimal,
}

/// Fixed table of daily prices, keyed by asset and day
#[derive(Debug, Clone, Default)]
pub struct PriceTable {
    prices: HashMap<(String, NaiveDate), Decimal>,
}

impl PriceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, asset: impl Into<String>, day: NaiveDate, price: Decimal) {
        self.prices.insert((asset.into(), day), price);
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    /// Read a price table from CSV. Conflicting prices for the same day are rejected.
    pub fn read_csv<R: Read>(reader: R) -> anyhow::Result<Self> {
        let mut rdr = csv::Reader::from_reader(reader);
        let mut table = PriceTable::new();
        for record in rdr.deserialize::<PriceRecord>() {
            let record = record?;
            if record.price < Decimal::ZERO {
                anyhow::bail!(
                    "negative price {} for {} on {}",
                    record.price,
                    record.asset,
                    record.date
                );
            }
            let key = (record.asset.clone(), record.date);
            match table.prices.get(&key) {
                Some(existing) if *existing != record.price => anyhow::bail!(
                    "conflicting prices for {} on {}: {} and {}",
                    record.asset,
                    record.date,
                    existing,
                    record.price
                ),
                _ => {
                    table.prices.insert(key, record.price);
                }
            }
        }
        log::info!("{} daily prices loaded", table.len());
        Ok(table)
    }
}

impl PriceSource for PriceTable {
    fn price_of(&mut self, asset: &str, day: NaiveDate) -> Result<Decimal, PriceError> {
        self.prices
            .get(&(asset.to_string(), day))
            .copied()
            .ok_or_else(|| PriceError::NotFound {
                asset: asset.to_string(),
                day,
            })
    }
}

/// Memoizes an underlying source per (asset, day). Failures are not cached.
#[derive(Debug)]
pub struct CachedPrices<S> {
    source: S,
    cache: HashMap<(String, NaiveDate), Decimal>,
    misses: usize,
}

impl<S: PriceSource> CachedPrices<S> {
    pub fn new(source: S) -> Self {
        CachedPrices {
            source,
            cache: HashMap::new(),
            misses: 0,
        }
    }

    /// Number of lookups that reached the underlying source
    pub fn misses(&self) -> usize {
        self.misses
    }
}

impl<S: PriceSource> PriceSource for CachedPrices<S> {
    fn price_of(&mut self, asset: &str, day: NaiveDate) -> Result<Decimal, PriceError> {
        let key = (asset.to_string(), day);
        if let Some(price) = self.cache.get(&key) {
            return Ok(*price);
        }
        self.misses += 1;
        let price = self.source.price_of(asset, day)?;
        log::debug!("Price {} on {}: {}", asset, day, price);
        self.cache.insert(key, price);
        Ok(price)
    }
}
