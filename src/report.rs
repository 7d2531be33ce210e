//! Report assembly: CSV rows, terminal tables and the run summary.
//!
//! Writers only format fields the engines already computed.

use crate::engine::disposal::MatchEntry;
use crate::engine::normalize::LedgerEntry;
use crate::engine::pooling::PoolingPolicy;
use crate::engine::{AssetRun, DisposalRecord, Method, TaxYear};
use chrono::{DateTime, FixedOffset, SecondsFormat};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::io::Write;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

/// Decimal places kept in CSV and JSON summaries
const DP: u32 = 8;

pub fn write_csv<T, W>(rows: &[T], writer: W) -> anyhow::Result<()>
where
    T: Serialize,
    W: Write,
{
    let mut wtr = csv::Writer::from_writer(writer);
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn print_table<T: Tabled>(rows: Vec<T>) {
    let table = Table::new(rows)
        .with(Style::rounded())
        .with(Modify::new(Rows::new(1..)).with(Alignment::right()))
        .to_string();
    println!("{}", table);
}

pub fn round(amount: Decimal) -> Decimal {
    amount.round_dp(DP).normalize()
}

pub fn format_quantity(qty: Decimal) -> String {
    let s = format!("{:.8}", qty);
    let trimmed = s.trim_end_matches('0').trim_end_matches('.');
    trimmed.to_string()
}

/// Checked sum; `None` on overflow
pub fn total(values: impl IntoIterator<Item = Decimal>) -> Option<Decimal> {
    values
        .into_iter()
        .try_fold(Decimal::ZERO, |sum, value| sum.checked_add(value))
}

pub fn format_money(amount: Decimal) -> String {
    format!("{:.2}", amount)
}

pub fn format_timestamp(timestamp: &DateTime<FixedOffset>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Ledger row, shared by the CSV writer and the terminal table
#[derive(Debug, Clone, Serialize, Tabled)]
pub struct LedgerRow {
    #[tabled(rename = "Timestamp")]
    pub timestamp: String,
    #[tabled(rename = "Level")]
    pub level: u64,
    #[tabled(rename = "Op Hash")]
    pub op_hash: String,
    #[tabled(rename = "Kind")]
    pub kind: String,
    #[tabled(rename = "Dir")]
    pub direction: String,
    #[tabled(rename = "Counterparty")]
    pub counterparty: String,
    #[tabled(rename = "Asset")]
    pub asset: String,
    #[tabled(rename = "Quantity")]
    pub quantity: String,
    #[tabled(rename = "Fee")]
    pub fee_xtz: String,
    #[tabled(rename = "Tags")]
    pub tags: String,
    #[tabled(rename = "Confidence")]
    pub confidence: String,
}

impl From<&LedgerEntry> for LedgerRow {
    fn from(entry: &LedgerEntry) -> Self {
        LedgerRow {
            timestamp: format_timestamp(&entry.timestamp),
            level: entry.level,
            op_hash: entry.op_hash.clone().unwrap_or_default(),
            kind: entry.kind.display().to_string(),
            direction: entry.direction.display().to_string(),
            counterparty: entry.counterparty.clone(),
            asset: entry.asset.asset_id().to_string(),
            quantity: format_quantity(entry.quantity),
            fee_xtz: format_quantity(entry.fee),
            tags: entry.tags_display(),
            confidence: entry.confidence.display().to_string(),
        }
    }
}

pub fn ledger_rows(entries: &[LedgerEntry]) -> Vec<LedgerRow> {
    entries.iter().map(LedgerRow::from).collect()
}

/// One breakdown line as embedded in the disposal CSV
#[derive(Debug, Serialize)]
struct BreakdownItem {
    rule: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    acquired_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    op_hash: Option<String>,
    quantity: Decimal,
    unit_cost: Decimal,
    cost: Decimal,
}

impl From<&MatchEntry> for BreakdownItem {
    fn from(entry: &MatchEntry) -> Self {
        BreakdownItem {
            rule: entry.rule.display(),
            acquired_at: entry.source.as_ref().map(|s| format_timestamp(&s.acquired_at)),
            op_hash: entry.source.as_ref().and_then(|s| s.op_hash.clone()),
            quantity: round(entry.quantity),
            unit_cost: round(entry.unit_cost),
            cost: round(entry.cost),
        }
    }
}

/// Disposal CSV row
#[derive(Debug, Clone, Serialize)]
pub struct DisposalCsvRow {
    pub timestamp: String,
    /// UK tax year, empty for FIFO
    pub tax_year: Option<TaxYear>,
    pub asset: String,
    pub method: &'static str,
    pub currency: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub proceeds: Decimal,
    pub cost_basis: Decimal,
    pub gain: Decimal,
    pub fee_xtz: Decimal,
    pub op_hash: String,
    pub breakdown_json: String,
    pub warnings: String,
}

impl DisposalCsvRow {
    fn new(
        record: &DisposalRecord,
        method: Method,
        currency: &str,
        fee: Decimal,
    ) -> anyhow::Result<Self> {
        let breakdown: Vec<BreakdownItem> = record.matching.iter().map(BreakdownItem::from).collect();
        Ok(DisposalCsvRow {
            timestamp: format_timestamp(&record.datetime),
            tax_year: match method {
                Method::Uk => Some(TaxYear::from_date(record.date())),
                Method::Fifo => None,
            },
            asset: record.asset.clone(),
            method: method.display(),
            currency: currency.to_string(),
            quantity: round(record.quantity),
            unit_price: round(record.unit_price),
            proceeds: round(record.proceeds),
            cost_basis: round(record.cost_basis),
            gain: round(record.gain),
            fee_xtz: round(fee),
            op_hash: record.op_hash.clone().unwrap_or_default(),
            breakdown_json: serde_json::to_string(&breakdown)?,
            warnings: record
                .warnings
                .iter()
                .map(|w| w.message())
                .collect::<Vec<_>>()
                .join("; "),
        })
    }
}

/// Disposal CSV rows for every successful run, with fees looked up from the ledger.
/// `currency` labels the prices the runs were valued in.
pub fn disposal_csv_rows(
    runs: &[AssetRun],
    ledger: &[LedgerEntry],
    currency: &str,
) -> anyhow::Result<Vec<DisposalCsvRow>> {
    let fees: HashMap<usize, Decimal> = ledger.iter().map(|e| (e.id, e.fee)).collect();
    let mut records: Vec<(&DisposalRecord, Method)> = runs
        .iter()
        .flat_map(|run| run.disposals().iter().map(move |d| (d, run.method)))
        .collect();
    records.sort_by_key(|(d, _)| d.datetime);
    records
        .into_iter()
        .map(|(record, method)| {
            let fee = fees.get(&record.event_id).copied().unwrap_or_default();
            DisposalCsvRow::new(record, method, currency, fee)
        })
        .collect()
}

/// Terminal table row for a disposal
#[derive(Debug, Clone, Tabled)]
pub struct DisposalRow {
    #[tabled(rename = "Date")]
    pub date: String,
    #[tabled(rename = "Asset")]
    pub asset: String,
    #[tabled(rename = "Quantity")]
    pub quantity: String,
    #[tabled(rename = "Price")]
    pub unit_price: String,
    #[tabled(rename = "Proceeds")]
    pub proceeds: String,
    #[tabled(rename = "Cost")]
    pub cost_basis: String,
    #[tabled(rename = "Gain/Loss")]
    pub gain: String,
    #[tabled(rename = "Matched")]
    pub rules: String,
    #[tabled(rename = "Warnings")]
    pub warnings: String,
}

impl From<&DisposalRecord> for DisposalRow {
    fn from(record: &DisposalRecord) -> Self {
        let mut rules: Vec<&str> = Vec::new();
        for entry in &record.matching {
            let rule = entry.rule.display();
            if !rules.contains(&rule) {
                rules.push(rule);
            }
        }
        DisposalRow {
            date: record.date().format("%Y-%m-%d").to_string(),
            asset: record.asset.clone(),
            quantity: format_quantity(record.quantity),
            unit_price: format_quantity(record.unit_price),
            proceeds: format_money(record.proceeds),
            cost_basis: format_money(record.cost_basis),
            gain: format_money(record.gain),
            rules: rules.join("+"),
            warnings: record
                .warnings
                .iter()
                .map(|w| w.name())
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

/// An asset run that aborted
#[derive(Debug, Clone, Serialize)]
pub struct FailedRun {
    pub asset: String,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

/// Totals for one accounting method
#[derive(Debug, Clone, Serialize)]
pub struct MethodSummary {
    pub method: Method,
    pub currency: String,
    pub disposal_count: usize,
    /// `None` when a total does not fit in a `Decimal`
    pub proceeds: Option<Decimal>,
    pub cost_basis: Option<Decimal>,
    pub gain: Option<Decimal>,
    pub over_disposal_count: usize,
    pub failed: Vec<FailedRun>,
}

impl MethodSummary {
    pub fn from_runs(method: Method, currency: &str, runs: &[AssetRun]) -> Self {
        let disposals: Vec<&DisposalRecord> = runs.iter().flat_map(|r| r.disposals()).collect();
        let failed = runs
            .iter()
            .filter_map(|run| {
                run.error().map(|err| FailedRun {
                    asset: run.asset.clone(),
                    error: err.to_string(),
                    timestamp: err.timestamp().map(|t| format_timestamp(&t)),
                })
            })
            .collect();
        MethodSummary {
            method,
            currency: currency.to_string(),
            disposal_count: disposals.len(),
            proceeds: total(disposals.iter().map(|d| d.proceeds)).map(round),
            cost_basis: total(disposals.iter().map(|d| d.cost_basis)).map(round),
            gain: total(disposals.iter().map(|d| d.gain)).map(round),
            over_disposal_count: disposals.iter().filter(|d| d.is_over_disposal()).count(),
            failed,
        }
    }
}

/// Contents of summary.json
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    pub ledger_entry_count: usize,
    pub event_count: usize,
    pub methods: Vec<MethodSummary>,
    pub notes: Vec<String>,
}

impl Summary {
    pub fn new(address: &str, year: Option<i32>, ledger_entry_count: usize, event_count: usize) -> Self {
        Summary {
            address: address.to_string(),
            year,
            ledger_entry_count,
            event_count,
            methods: Vec::new(),
            notes: standard_notes(),
        }
    }

    pub fn add_method(&mut self, method: Method, currency: &str, runs: &[AssetRun]) {
        self.methods.push(MethodSummary::from_runs(method, currency, runs));
    }

    pub fn note_policy(&mut self, policy: PoolingPolicy) {
        if policy == PoolingPolicy::CreditOnAcquisition {
            self.notes.push(
                "UK pool is credited with every acquisition; quantity matched same-day or within 30 days stays in the pool (use --strict-pooling to exclude it)."
                    .to_string(),
            );
        }
    }

    pub fn note(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
    }
}

fn standard_notes() -> Vec<String> {
    vec![
        "Likely NFTs are listed in the ledger but never matched; tokens without prices fail their own asset run only.".to_string(),
        "Delegation payouts look like ordinary incoming transfers and are treated as acquisitions; review receipts.".to_string(),
        "Prices are daily values per calendar day, not execution prices.".to_string(),
    ]
}
