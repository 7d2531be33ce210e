//! Validate command - surface data quality issues without writing reports

use super::disposals::pooling_policy;
use super::{CurrencyArgs, InputArgs, PriceBook};
use crate::engine::{run_all, AssetRun, Method};
use crate::report::{format_money, format_quantity, format_timestamp};
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct ValidateCommand {
    #[command(flatten)]
    input: InputArgs,

    /// Daily price table CSV (asset,date,price)
    #[arg(short, long)]
    prices: PathBuf,

    #[command(flatten)]
    pricing: CurrencyArgs,

    /// Keep same-day and 30-day matched quantity out of the UK pool
    #[arg(long)]
    strict_pooling: bool,

    /// Output as JSON instead of formatted text
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Serialize)]
struct ValidationIssue {
    #[serde(rename = "type")]
    issue_type: String,
    method: &'static str,
    asset: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    quantity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    proceeds: Option<String>,
    message: String,
}

#[derive(Debug, Serialize)]
struct ValidationOutput {
    address: String,
    issue_count: usize,
    issues: Vec<ValidationIssue>,
}

impl ValidateCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        let ledger = self.input.load()?;
        let events = ledger.events(None)?;
        let mut book = PriceBook::load(&self.prices, &self.pricing)?;
        let policy = pooling_policy(self.strict_pooling);

        let mut issues = Vec::new();
        for method in [Method::Fifo, Method::Uk] {
            let runs = run_all(&events, book.prices(method), method, policy);
            issues.extend(collect_issues(&runs));
        }

        if self.json {
            let output = ValidationOutput {
                address: ledger.address.clone(),
                issue_count: issues.len(),
                issues: issues.clone(),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            print_text(&ledger.address, &issues);
        }

        // Exit with code 1 if issues found
        if !issues.is_empty() {
            std::process::exit(1);
        }
        Ok(())
    }
}

fn collect_issues(runs: &[AssetRun]) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    for run in runs {
        if let Some(err) = run.error() {
            issues.push(ValidationIssue {
                issue_type: "FailedRun".to_string(),
                method: run.method.display(),
                asset: run.asset.clone(),
                timestamp: err.timestamp().map(|t| format_timestamp(&t)),
                quantity: None,
                proceeds: None,
                message: err.to_string(),
            });
        }
        for disposal in run.disposals().iter().filter(|d| d.has_warnings()) {
            for warning in &disposal.warnings {
                issues.push(ValidationIssue {
                    issue_type: warning.name().to_string(),
                    method: run.method.display(),
                    asset: disposal.asset.clone(),
                    timestamp: Some(format_timestamp(&disposal.datetime)),
                    quantity: Some(format_quantity(disposal.quantity)),
                    proceeds: Some(format_money(disposal.proceeds)),
                    message: warning.message(),
                });
            }
        }
    }
    issues
}

fn print_text(address: &str, issues: &[ValidationIssue]) {
    println!();
    println!("VALIDATION RESULTS ({})", address);
    println!();

    if issues.is_empty() {
        println!("\u{2713} No issues found.");
        return;
    }

    println!("\u{26A0} {} issue(s) found:", issues.len());
    println!();
    for (i, issue) in issues.iter().enumerate() {
        let when = issue.timestamp.as_deref().unwrap_or("-");
        match (&issue.quantity, &issue.proceeds) {
            (Some(quantity), Some(proceeds)) => println!(
                "  {}. [{}/{}] {} Disposal of {} {} for {}",
                i + 1,
                issue.method,
                issue.issue_type,
                when,
                quantity,
                issue.asset,
                proceeds
            ),
            _ => println!(
                "  {}. [{}/{}] {} {}",
                i + 1,
                issue.method,
                issue.issue_type,
                when,
                issue.asset
            ),
        }
        println!("     {}", issue.message);
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::events::test_support::{acq, disp};
    use crate::engine::{PoolingPolicy, PriceTable};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    #[test]
    fn issues_from_warnings_and_failed_runs() {
        let mut token = acq(3, "2025-01-01", dec!(1));
        token.asset = "TOKEN:KT1:0:fa1.2".to_string();
        let events = vec![disp(1, "2025-01-01", dec!(2)), token];
        let mut table = PriceTable::new();
        table.insert("XTZ", NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(), dec!(3));

        let runs = run_all(&events, &mut table, Method::Fifo, PoolingPolicy::default());
        let issues = collect_issues(&runs);
        let kinds: Vec<_> = issues.iter().map(|i| i.issue_type.as_str()).collect();
        assert_eq!(kinds, vec!["FailedRun", "OverDisposal"]);
        assert_eq!(issues[1].proceeds.as_deref(), Some("6.00"));
        assert_eq!(issues[1].message, "No acquisitions available for 2 units - cost basis is 0");
    }
}
