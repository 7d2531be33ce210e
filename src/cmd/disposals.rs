//! Disposals command - matched disposals for one accounting method

use super::{CurrencyArgs, InputArgs, PriceBook};
use crate::engine::{run_all, AssetRun, Method, PoolingPolicy};
use crate::report::{disposal_csv_rows, format_money, print_table, total, write_csv, DisposalRow};
use clap::Args;
use std::io;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct DisposalsCommand {
    #[command(flatten)]
    input: InputArgs,

    /// Daily price table CSV (asset,date,price)
    #[arg(short, long)]
    prices: PathBuf,

    #[command(flatten)]
    pricing: CurrencyArgs,

    /// Accounting method
    #[arg(short, long, value_enum, default_value_t = Method::Uk)]
    method: Method,

    /// Filter by asset (e.g. XTZ)
    #[arg(short, long)]
    asset: Option<String>,

    /// Keep same-day and 30-day matched quantity out of the UK pool
    #[arg(long)]
    strict_pooling: bool,

    /// Output as CSV instead of formatted table
    #[arg(long)]
    csv: bool,

    /// Output as JSON instead of formatted table
    #[arg(long, conflicts_with = "csv")]
    json: bool,
}

impl DisposalsCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        let ledger = self.input.load()?;
        let events = ledger.events(self.asset.as_deref())?;
        let mut book = PriceBook::load(&self.prices, &self.pricing)?;
        let policy = pooling_policy(self.strict_pooling);

        let runs = run_all(&events, book.prices(self.method), self.method, policy);
        let currency = book.currency(self.method);

        if self.json {
            self.print_json(&runs)?;
        } else if self.csv {
            write_csv(&disposal_csv_rows(&runs, &ledger.entries, currency)?, io::stdout())?;
        } else {
            self.print_table(&runs, currency);
        }

        let failures: Vec<_> = runs.iter().filter_map(|r| r.error().map(|e| (r, e))).collect();
        for (run, err) in &failures {
            eprintln!("{} {}: {}", run.method.display(), run.asset, err);
        }
        if !failures.is_empty() && failures.len() == runs.len() {
            anyhow::bail!("Every asset run failed");
        }
        Ok(())
    }

    fn print_table(&self, runs: &[AssetRun], currency: &str) {
        let mut records: Vec<_> = runs.iter().flat_map(|r| r.disposals()).collect();
        if records.is_empty() {
            println!("No disposals found matching filters");
            return;
        }
        records.sort_by_key(|d| d.datetime);

        println!();
        println!("DISPOSALS ({})", self.method.display());
        println!();
        print_table(records.iter().map(|d| DisposalRow::from(*d)).collect());

        let money = |amount: Option<_>| amount.map_or_else(|| "overflow".to_string(), format_money);
        println!();
        println!(
            "Total ({}) proceeds {}  cost basis {}  gain {}",
            currency,
            money(total(records.iter().map(|d| d.proceeds))),
            money(total(records.iter().map(|d| d.cost_basis))),
            money(total(records.iter().map(|d| d.gain)))
        );
    }

    fn print_json(&self, runs: &[AssetRun]) -> anyhow::Result<()> {
        let outcomes: Vec<_> = runs.iter().filter_map(|r| r.outcome.as_ref().ok()).collect();
        println!("{}", serde_json::to_string_pretty(&outcomes)?);
        Ok(())
    }
}

pub fn pooling_policy(strict: bool) -> PoolingPolicy {
    if strict {
        PoolingPolicy::ExcludeMatched
    } else {
        PoolingPolicy::CreditOnAcquisition
    }
}
