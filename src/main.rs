use clap::{Parser, Subcommand};

mod cmd;
mod engine;
mod report;

#[derive(Parser, Debug)]
#[command(name = "lotmatch", version, about = "Realized gains with FIFO and UK share matching")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Normalize exported activity into a tagged ledger
    Ledger(cmd::ledger::LedgerCommand),
    /// Match disposals under one accounting method
    Disposals(cmd::disposals::DisposalsCommand),
    /// Full run writing ledger, disposals and summary files
    Scan(cmd::scan::ScanCommand),
    /// Report over-disposals and failed asset runs
    Validate(cmd::validate::ValidateCommand),
    /// Print expected input formats
    Schema(cmd::schema::SchemaCommand),
}

fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();

    let cli = Cli::parse();
    match cli.command {
        Command::Ledger(cmd) => cmd.exec(),
        Command::Disposals(cmd) => cmd.exec(),
        Command::Scan(cmd) => cmd.exec(),
        Command::Validate(cmd) => cmd.exec(),
        Command::Schema(cmd) => cmd.exec(),
    }
}
