//! Ledger command - normalized activity with tags and confidence

use super::InputArgs;
use crate::report::{ledger_rows, print_table, write_csv};
use clap::Args;
use std::io;

#[derive(Args, Debug)]
pub struct LedgerCommand {
    #[command(flatten)]
    input: InputArgs,

    /// Output as CSV instead of formatted table
    #[arg(long)]
    csv: bool,

    /// Output as JSON instead of formatted table
    #[arg(long, conflicts_with = "csv")]
    json: bool,
}

impl LedgerCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        let ledger = self.input.load()?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&ledger.entries)?);
            return Ok(());
        }

        let rows = ledger_rows(&ledger.entries);
        if self.csv {
            return write_csv(&rows, io::stdout());
        }

        if rows.is_empty() {
            println!("No ledger entries for {}", ledger.address);
            return Ok(());
        }
        println!();
        println!("LEDGER {}", ledger.address);
        println!();
        print_table(rows);
        Ok(())
    }
}
