pub mod disposals;
pub mod ledger;
pub mod scan;
pub mod schema;
pub mod validate;

use crate::engine::normalize::{engine_events, read_raw_json, LedgerEntry, Normalizer, RawInput};
use crate::engine::{CachedPrices, Event, Method, PriceTable};
use clap::Args;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

/// Input selection shared by every command that reads wallet activity
#[derive(Args, Debug)]
pub struct InputArgs {
    /// Exported activity JSON. Reads from stdin if not specified.
    #[arg(default_value = "-")]
    file: PathBuf,

    /// Address the activity belongs to (overrides the address in the file)
    #[arg(long)]
    address: Option<String>,

    /// Calendar year to keep (e.g. 2025)
    #[arg(short, long)]
    year: Option<i32>,
}

/// Currency labels and an optional separate price table for UK matching
#[derive(Args, Debug)]
pub struct CurrencyArgs {
    /// Currency of the --prices table
    #[arg(long, default_value = "USD")]
    currency: String,

    /// Price table (asset,date,price) for UK matching instead of --prices
    #[arg(long)]
    uk_prices: Option<PathBuf>,

    /// Currency of UK prices [default: GBP with --uk-prices, otherwise --currency]
    #[arg(long)]
    uk_currency: Option<String>,
}

/// Price tables for each accounting method
#[derive(Debug)]
pub struct PriceBook {
    base: CachedPrices<PriceTable>,
    uk: Option<CachedPrices<PriceTable>>,
    currency: String,
    uk_currency: String,
}

impl PriceBook {
    pub fn load(prices: &Path, args: &CurrencyArgs) -> anyhow::Result<Self> {
        let base = load_prices(prices)?;
        let uk = match &args.uk_prices {
            Some(path) => Some(load_prices(path)?),
            None => None,
        };
        let uk_currency = match (&args.uk_currency, &uk) {
            (Some(currency), _) => currency.clone(),
            (None, Some(_)) => "GBP".to_string(),
            (None, None) => args.currency.clone(),
        };
        Ok(PriceBook {
            base,
            uk,
            currency: args.currency.clone(),
            uk_currency,
        })
    }

    /// Prices used by `method`
    pub fn prices(&mut self, method: Method) -> &mut CachedPrices<PriceTable> {
        match (method, self.uk.as_mut()) {
            (Method::Uk, Some(uk)) => uk,
            _ => &mut self.base,
        }
    }

    pub fn currency(&self, method: Method) -> &str {
        match method {
            Method::Fifo => &self.currency,
            Method::Uk => &self.uk_currency,
        }
    }

    /// Lookups that reached a price table across both tables
    pub fn misses(&self) -> usize {
        self.base.misses() + self.uk.as_ref().map_or(0, |uk| uk.misses())
    }
}

/// Normalized activity for one address
#[derive(Debug)]
pub struct Ledger {
    pub address: String,
    pub year: Option<i32>,
    pub entries: Vec<LedgerEntry>,
}

impl Ledger {
    /// Fungible engine events, optionally restricted to one asset
    pub fn events(&self, asset: Option<&str>) -> anyhow::Result<Vec<Event>> {
        let events = engine_events(&self.entries);
        match asset {
            None => Ok(events),
            Some(asset) => {
                let selected: Vec<Event> = events.into_iter().filter(|e| e.asset == asset).collect();
                if selected.is_empty() {
                    anyhow::bail!("No events found for asset '{}'", asset);
                }
                Ok(selected)
            }
        }
    }
}

impl InputArgs {
    pub fn load(&self) -> anyhow::Result<Ledger> {
        let raw = read_input(&self.file)?;
        let address = self.address.clone().unwrap_or_else(|| raw.address.clone());
        if address.trim().is_empty() {
            anyhow::bail!("No address given. Set \"address\" in the input or pass --address.");
        }
        let mut normalizer = Normalizer::new(&address);
        if let Some(year) = self.year {
            normalizer = normalizer.with_year(year)?;
        }
        let entries = normalizer.normalize(&raw)?;
        Ok(Ledger {
            address,
            year: self.year,
            entries,
        })
    }
}

/// Read the raw input document from a file (or stdin with "-")
pub fn read_input(path: &Path) -> anyhow::Result<RawInput> {
    if path.as_os_str() == "-" {
        read_from_stdin()
    } else {
        let file = File::open(path)?;
        read_raw_json(BufReader::new(file))
    }
}

fn read_from_stdin() -> anyhow::Result<RawInput> {
    let stdin = io::stdin();
    let mut reader = BufReader::new(stdin.lock());

    let mut buffer = Vec::new();
    reader.read_to_end(&mut buffer)?;

    if buffer.is_empty() {
        anyhow::bail!("No input received. Provide a file or pipe data to stdin.");
    }

    read_raw_json(io::Cursor::new(buffer))
}

/// Load a daily price table (`asset,date,price`) behind a per-day cache
pub fn load_prices(path: &Path) -> anyhow::Result<CachedPrices<PriceTable>> {
    let file = File::open(path)?;
    let table = PriceTable::read_csv(BufReader::new(file))?;
    if table.is_empty() {
        log::warn!("Price table {} is empty", path.display());
    }
    Ok(CachedPrices::new(table))
}
