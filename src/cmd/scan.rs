//! Scan command - full run writing ledger, disposal files and a summary

use super::disposals::pooling_policy;
use super::{CurrencyArgs, InputArgs, PriceBook};
use crate::engine::{run_all, Method};
use crate::report::{disposal_csv_rows, ledger_rows, write_csv, Summary};
use clap::Args;
use std::fs::{self, File};
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct ScanCommand {
    #[command(flatten)]
    input: InputArgs,

    /// Daily price table CSV (asset,date,price)
    #[arg(short, long, required_unless_present = "no_prices")]
    prices: Option<PathBuf>,

    #[command(flatten)]
    pricing: CurrencyArgs,

    /// Output directory
    #[arg(short, long, default_value = "out")]
    out: PathBuf,

    /// Only write the ledger and summary; skip gain calculations
    #[arg(long)]
    no_prices: bool,

    /// Keep same-day and 30-day matched quantity out of the UK pool
    #[arg(long)]
    strict_pooling: bool,
}

impl ScanCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        let ledger = self.input.load()?;
        let events = ledger.events(None)?;
        fs::create_dir_all(&self.out)?;

        write_csv(&ledger_rows(&ledger.entries), self.create("events.csv")?)?;
        let mut written = vec!["events.csv"];

        let mut summary = Summary::new(
            &ledger.address,
            ledger.year,
            ledger.entries.len(),
            events.len(),
        );

        match &self.prices {
            Some(path) if !self.no_prices => {
                let mut book = PriceBook::load(path, &self.pricing)?;
                let policy = pooling_policy(self.strict_pooling);

                for (method, file) in [
                    (Method::Fifo, "disposals_fifo.csv"),
                    (Method::Uk, "disposals_uk.csv"),
                ] {
                    let runs = run_all(&events, book.prices(method), method, policy);
                    let currency = book.currency(method);
                    write_csv(
                        &disposal_csv_rows(&runs, &ledger.entries, currency)?,
                        self.create(file)?,
                    )?;
                    summary.add_method(method, currency, &runs);
                    written.push(file);
                }
                summary.note_policy(policy);
                log::info!("{} price lookups reached the price tables", book.misses());
            }
            _ => summary.note("Run without prices: no disposals were calculated."),
        }

        let summary_file = self.create("summary.json")?;
        serde_json::to_writer_pretty(summary_file, &summary)?;
        written.push("summary.json");

        println!("Outputs in {}/", self.out.display());
        for file in written {
            println!("  - {}", file);
        }
        Ok(())
    }

    fn create(&self, name: &str) -> anyhow::Result<File> {
        let path = self.out.join(name);
        log::info!("Writing {}", path.display());
        Ok(File::create(path)?)
    }
}
