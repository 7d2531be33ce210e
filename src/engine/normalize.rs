//! Raw indexer records to ledger entries and engine events.
//!
//! The input document mirrors the indexer's export: native transactions with
//! amounts in mutez, and token transfers with raw integer amounts plus token
//! metadata. Every record becomes a [`LedgerEntry`]; only fungible movements
//! that change the holding become engine [`Event`]s.

use super::events::{Direction, Event};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::str::FromStr;

/// Asset identifier of the chain's native currency
pub const NATIVE_ASSET: &str = "XTZ";

/// Native amounts are reported in mutez
const MUTEZ_PER_UNIT: i64 = 1_000_000;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("invalid timestamp '{value}' in operation {op_hash}")]
    InvalidTimestamp { op_hash: String, value: String },
    #[error("invalid amount '{value}' in operation {op_hash}")]
    InvalidAmount { op_hash: String, value: String },
    #[error("year {0} is out of range")]
    InvalidYear(i32),
}

/// Input root: an address and its exported activity
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RawInput {
    /// Address the activity belongs to
    pub address: String,
    #[serde(default)]
    pub transactions: Vec<RawTransaction>,
    #[serde(default)]
    pub token_transfers: Vec<RawTokenTransfer>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct RawAccount {
    #[serde(default)]
    pub address: Option<String>,
}

/// Amount as exported: JSON number or numeric string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum RawAmount {
    Integer(u64),
    Float(f64),
    Text(String),
}

impl Default for RawAmount {
    fn default() -> Self {
        RawAmount::Integer(0)
    }
}

impl RawAmount {
    fn to_decimal(&self) -> Option<Decimal> {
        match self {
            RawAmount::Integer(n) => Some(Decimal::from(*n)),
            RawAmount::Float(f) => Decimal::try_from(*f).ok(),
            RawAmount::Text(s) => {
                let s = s.trim();
                Decimal::from_str(s)
                    .or_else(|_| Decimal::from_scientific(s))
                    .ok()
            }
        }
    }

    fn describe(&self) -> String {
        match self {
            RawAmount::Integer(n) => n.to_string(),
            RawAmount::Float(f) => f.to_string(),
            RawAmount::Text(s) => s.clone(),
        }
    }
}

/// Native currency transaction
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RawTransaction {
    /// RFC3339 timestamp; records without one are skipped
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub level: u64,
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub sender: Option<RawAccount>,
    #[serde(default)]
    pub target: Option<RawAccount>,
    /// Amount in mutez
    #[serde(default)]
    pub amount: RawAmount,
    /// Fee in mutez
    #[serde(default)]
    pub fee: RawAmount,
    /// Present when the transaction called a contract entrypoint
    #[serde(default)]
    pub parameter: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct RawTokenMetadata {
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub decimals: Option<RawAmount>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RawToken {
    #[serde(default)]
    pub contract: Option<RawAccount>,
    #[serde(default)]
    pub token_id: Option<String>,
    #[serde(default)]
    pub standard: Option<String>,
    #[serde(default)]
    pub metadata: Option<RawTokenMetadata>,
}

/// FA1.2 / FA2 token transfer
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RawTokenTransfer {
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub level: u64,
    #[serde(default)]
    pub transaction_hash: Option<String>,
    #[serde(default)]
    pub from: Option<RawAccount>,
    #[serde(default)]
    pub to: Option<RawAccount>,
    /// Raw integer amount before applying token decimals
    #[serde(default)]
    pub amount: RawAmount,
    #[serde(default)]
    pub token: Option<RawToken>,
}

/// Read the raw input document
pub fn read_raw_json<R: Read>(reader: R) -> anyhow::Result<RawInput> {
    let input: RawInput = serde_json::from_reader(reader)?;
    Ok(input)
}

/// What an entry moves
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AssetRef {
    Native,
    Token {
        id: String,
        standard: String,
        /// Single-unit FA2 transfer without decimals
        likely_nft: bool,
    },
}

impl AssetRef {
    pub fn asset_id(&self) -> &str {
        match self {
            AssetRef::Native => NATIVE_ASSET,
            AssetRef::Token { id, .. } => id,
        }
    }

    pub fn is_fungible(&self) -> bool {
        match self {
            AssetRef::Native => true,
            AssetRef::Token { likely_nft, .. } => !likely_nft,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    XtzTransfer,
    TokenTransfer,
}

impl EntryKind {
    pub fn display(&self) -> &'static str {
        match self {
            EntryKind::XtzTransfer => "xtz_transfer",
            EntryKind::TokenTransfer => "token_transfer",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Note {
    Transfer,
    ContractCall,
    TokenTransfer,
}

impl Note {
    pub fn display(&self) -> &'static str {
        match self {
            Note::Transfer => "transfer",
            Note::ContractCall => "contract_call",
            Note::TokenTransfer => "token_transfer",
        }
    }
}

/// Classification hint attached during normalization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tag {
    Receipt,
    PaymentOrDisposal,
    SelfTransfer,
    TokenTransfer,
    LikelyNft,
}

impl Tag {
    pub fn display(&self) -> &'static str {
        match self {
            Tag::Receipt => "receipt",
            Tag::PaymentOrDisposal => "payment_or_disposal",
            Tag::SelfTransfer => "self_transfer",
            Tag::TokenTransfer => "token_transfer",
            Tag::LikelyNft => "likely_nft",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    #[default]
    Medium,
    High,
}

impl Confidence {
    pub fn display(&self) -> &'static str {
        match self {
            Confidence::Medium => "medium",
            Confidence::High => "high",
        }
    }
}

/// One normalized ledger row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    /// Discovery order: native transactions first, then token transfers
    pub id: usize,
    pub timestamp: DateTime<FixedOffset>,
    pub level: u64,
    pub op_hash: Option<String>,
    pub kind: EntryKind,
    pub direction: Direction,
    pub counterparty: String,
    pub asset: AssetRef,
    pub quantity: Decimal,
    /// Native-currency fee; token transfers carry none
    pub fee: Decimal,
    pub note: Note,
    pub tags: Vec<Tag>,
    pub confidence: Confidence,
}

impl LedgerEntry {
    pub fn has_tag(&self, tag: Tag) -> bool {
        self.tags.contains(&tag)
    }

    /// Pipe-separated tag list
    pub fn tags_display(&self) -> String {
        self.tags
            .iter()
            .map(|t| t.display())
            .collect::<Vec<_>>()
            .join("|")
    }

    /// Engine event for this entry, if it moves a fungible holding
    pub fn to_event(&self) -> Option<Event> {
        if self.quantity <= Decimal::ZERO
            || !self.asset.is_fungible()
            || self.has_tag(Tag::SelfTransfer)
        {
            return None;
        }
        Some(Event {
            id: self.id,
            datetime: self.timestamp,
            direction: self.direction,
            asset: self.asset.asset_id().to_string(),
            quantity: self.quantity,
            op_hash: self.op_hash.clone(),
        })
    }
}

/// Engine events from a normalized ledger, preserving ledger order
pub fn engine_events(entries: &[LedgerEntry]) -> Vec<Event> {
    entries.iter().filter_map(LedgerEntry::to_event).collect()
}

/// Converts raw records for one address into ledger entries
#[derive(Debug, Clone)]
pub struct Normalizer {
    address: String,
    window: Option<(DateTime<FixedOffset>, DateTime<FixedOffset>)>,
}

impl Normalizer {
    pub fn new(address: &str) -> Self {
        Normalizer {
            address: address.to_lowercase(),
            window: None,
        }
    }

    /// Keep only records inside the calendar year (UTC)
    pub fn with_year(mut self, year: i32) -> Result<Self, NormalizeError> {
        let start = year_start(year).ok_or(NormalizeError::InvalidYear(year))?;
        let end = year
            .checked_add(1)
            .and_then(year_start)
            .ok_or(NormalizeError::InvalidYear(year))?;
        self.window = Some((start, end));
        Ok(self)
    }

    fn is_own(&self, address: &str) -> bool {
        address.to_lowercase() == self.address
    }

    fn in_window(&self, timestamp: &DateTime<FixedOffset>) -> bool {
        match &self.window {
            Some((start, end)) => timestamp >= start && timestamp < end,
            None => true,
        }
    }

    /// Normalize every record, sorted by timestamp with discovery order kept for ties
    pub fn normalize(&self, input: &RawInput) -> Result<Vec<LedgerEntry>, NormalizeError> {
        let mut entries = Vec::new();
        for tx in &input.transactions {
            let id = entries.len();
            if let Some(entry) = self.native_entry(id, tx)? {
                entries.push(entry);
            }
        }
        for tr in &input.token_transfers {
            let id = entries.len();
            if let Some(entry) = self.token_entry(id, tr)? {
                entries.push(entry);
            }
        }
        entries.sort_by_key(|e| e.timestamp);
        log::info!(
            "{} ledger entries from {} transactions and {} token transfers",
            entries.len(),
            input.transactions.len(),
            input.token_transfers.len()
        );
        Ok(entries)
    }

    fn native_entry(
        &self,
        id: usize,
        tx: &RawTransaction,
    ) -> Result<Option<LedgerEntry>, NormalizeError> {
        let op_hash = tx.hash.clone().unwrap_or_default();
        let Some(ts) = tx.timestamp.as_deref() else {
            log::debug!("Skipping transaction {} without timestamp", op_hash);
            return Ok(None);
        };
        let timestamp = parse_timestamp(ts, &op_hash)?;
        if !self.in_window(&timestamp) {
            return Ok(None);
        }

        let amount = parse_amount(&tx.amount, &op_hash)? / Decimal::from(MUTEZ_PER_UNIT);
        let fee = parse_amount(&tx.fee, &op_hash)? / Decimal::from(MUTEZ_PER_UNIT);
        if amount.is_zero() && fee.is_zero() {
            return Ok(None);
        }

        let sender = account_address(&tx.sender);
        let target = account_address(&tx.target);
        let own_sender = self.is_own(&sender);
        let own_target = self.is_own(&target);

        let direction = if own_target && !own_sender {
            Direction::Acquire
        } else {
            Direction::Dispose
        };
        let counterparty = match direction {
            Direction::Acquire => sender,
            Direction::Dispose => target,
        };

        let mut tags = Vec::new();
        let mut confidence = Confidence::Medium;
        if amount > Decimal::ZERO {
            tags.push(match direction {
                Direction::Acquire => Tag::Receipt,
                Direction::Dispose => Tag::PaymentOrDisposal,
            });
        }
        if own_sender && own_target {
            tags.push(Tag::SelfTransfer);
            confidence = Confidence::High;
        }

        let note = match &tx.parameter {
            Some(p) if !p.is_null() => Note::ContractCall,
            _ => Note::Transfer,
        };

        Ok(Some(LedgerEntry {
            id,
            timestamp,
            level: tx.level,
            op_hash: tx.hash.clone(),
            kind: EntryKind::XtzTransfer,
            direction,
            counterparty,
            asset: AssetRef::Native,
            quantity: amount.max(Decimal::ZERO),
            fee: fee.max(Decimal::ZERO),
            note,
            tags,
            confidence,
        }))
    }

    fn token_entry(
        &self,
        id: usize,
        tr: &RawTokenTransfer,
    ) -> Result<Option<LedgerEntry>, NormalizeError> {
        let op_hash = tr.transaction_hash.clone().unwrap_or_default();
        let Some(ts) = tr.timestamp.as_deref() else {
            log::debug!("Skipping token transfer {} without timestamp", op_hash);
            return Ok(None);
        };
        let timestamp = parse_timestamp(ts, &op_hash)?;
        if !self.in_window(&timestamp) {
            return Ok(None);
        }

        let from = account_address(&tr.from);
        let to = account_address(&tr.to);
        let (direction, counterparty) = if self.is_own(&to) {
            (Direction::Acquire, from)
        } else {
            (Direction::Dispose, to)
        };

        let token = tr.token.clone().unwrap_or_default();
        let metadata = token.metadata.clone().unwrap_or_default();
        let contract = account_address(&token.contract);
        let token_id = token.token_id.clone().unwrap_or_default();
        let standard = token.standard.clone().unwrap_or_default();
        let decimals = match &metadata.decimals {
            Some(d) => Some(parse_decimals(d, &op_hash)?),
            None => None,
        };

        let Some(quantity) = token_quantity(&tr.amount, decimals, &op_hash)? else {
            log::warn!(
                "Skipping token transfer {}: amount {} is out of range",
                op_hash,
                tr.amount.describe()
            );
            return Ok(None);
        };

        let symbol = metadata
            .symbol
            .filter(|s| !s.is_empty())
            .or(metadata.name.filter(|s| !s.is_empty()))
            .unwrap_or_else(|| "TOKEN".to_string());
        let asset_id = format!("{}:{}:{}:{}", symbol, contract, token_id, standard);

        let mut tags = vec![Tag::TokenTransfer];
        let mut confidence = Confidence::Medium;
        let likely_nft = standard.eq_ignore_ascii_case("fa2")
            && matches!(decimals, None | Some(0))
            && tr.amount.to_decimal() == Some(Decimal::ONE);
        if likely_nft {
            tags.push(Tag::LikelyNft);
            confidence = Confidence::High;
        }

        Ok(Some(LedgerEntry {
            id,
            timestamp,
            level: tr.level,
            op_hash: tr.transaction_hash.clone(),
            kind: EntryKind::TokenTransfer,
            direction,
            counterparty,
            asset: AssetRef::Token {
                id: asset_id,
                standard,
                likely_nft,
            },
            quantity: quantity.max(Decimal::ZERO),
            fee: Decimal::ZERO,
            note: Note::TokenTransfer,
            tags,
            confidence,
        }))
    }
}

fn year_start(year: i32) -> Option<DateTime<FixedOffset>> {
    let date = NaiveDate::from_ymd_opt(year, 1, 1)?;
    let midnight = date.and_hms_opt(0, 0, 0)?;
    Some(Utc.from_utc_datetime(&midnight).fixed_offset())
}

fn account_address(account: &Option<RawAccount>) -> String {
    account
        .as_ref()
        .and_then(|a| a.address.clone())
        .unwrap_or_default()
}

fn parse_timestamp(value: &str, op_hash: &str) -> Result<DateTime<FixedOffset>, NormalizeError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S") {
        return Ok(dt.and_utc().fixed_offset());
    }
    Err(NormalizeError::InvalidTimestamp {
        op_hash: op_hash.to_string(),
        value: value.to_string(),
    })
}

fn parse_amount(amount: &RawAmount, op_hash: &str) -> Result<Decimal, NormalizeError> {
    amount
        .to_decimal()
        .ok_or_else(|| NormalizeError::InvalidAmount {
            op_hash: op_hash.to_string(),
            value: amount.describe(),
        })
}

fn parse_decimals(decimals: &RawAmount, op_hash: &str) -> Result<u32, NormalizeError> {
    let value = parse_amount(decimals, op_hash)?;
    u32::try_from(value.trunc().mantissa())
        .ok()
        .filter(|_| value.fract().is_zero() && value >= Decimal::ZERO)
        .ok_or_else(|| NormalizeError::InvalidAmount {
            op_hash: op_hash.to_string(),
            value: decimals.describe(),
        })
}

/// Largest scale a `Decimal` can carry
const MAX_SCALE: usize = 28;

/// Token quantity after applying `decimals`. `None` when the amount is numeric
/// but cannot be represented.
fn token_quantity(
    amount: &RawAmount,
    decimals: Option<u32>,
    op_hash: &str,
) -> Result<Option<Decimal>, NormalizeError> {
    if let Some(digits) = integer_text(amount) {
        return Ok(shift_decimal_point(&digits, decimals.unwrap_or(0)));
    }
    match amount.to_decimal() {
        Some(raw) => Ok(match decimals {
            Some(d) => scale_down(raw, d),
            None => Some(raw),
        }),
        None if matches!(amount, RawAmount::Float(_)) => Ok(None),
        None => Err(NormalizeError::InvalidAmount {
            op_hash: op_hash.to_string(),
            value: amount.describe(),
        }),
    }
}

/// Integer amounts as text, with an optional leading minus
fn integer_text(amount: &RawAmount) -> Option<String> {
    match amount {
        RawAmount::Integer(n) => Some(n.to_string()),
        RawAmount::Text(s) => {
            let s = s.trim();
            let digits = s.strip_prefix('-').unwrap_or(s);
            (!digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
                .then(|| s.to_string())
        }
        RawAmount::Float(_) => None,
    }
}

/// Place the decimal point `decimals` digits from the right before parsing, so
/// raw amounts wider than `Decimal` still parse once scaled.
fn shift_decimal_point(text: &str, decimals: u32) -> Option<Decimal> {
    let (sign, digits) = match text.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", text),
    };
    let decimals = usize::try_from(decimals).ok()?;
    if decimals > digits.len() + MAX_SCALE {
        return None;
    }
    let padded = format!("{:0>width$}", digits, width = decimals + 1);
    let (int_part, frac_part) = padded.split_at(padded.len() - decimals);
    let int_part = match int_part.trim_start_matches('0') {
        "" => "0",
        trimmed => trimmed,
    };
    let frac_part = frac_part.trim_end_matches('0');
    let shifted = if frac_part.is_empty() {
        format!("{}{}", sign, int_part)
    } else {
        format!("{}{}.{}", sign, int_part, frac_part)
    };
    Decimal::from_str(&shifted).ok()
}

/// Divide by 10^decimals, `None` when the scale is unrepresentable.
fn scale_down(raw: Decimal, decimals: u32) -> Option<Decimal> {
    let mut scaled = raw;
    let scale = scaled.scale().checked_add(decimals)?;
    scaled.set_scale(scale).ok()?;
    Some(scaled.normalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const ME: &str = "tz1Me";

    fn input(json: &str) -> RawInput {
        read_raw_json(json.as_bytes()).unwrap()
    }

    fn normalize(json: &str) -> Vec<LedgerEntry> {
        let raw = input(json);
        Normalizer::new(&raw.address).normalize(&raw).unwrap()
    }

    #[test]
    fn native_receipt_and_payment() {
        let entries = normalize(
            r#"{
                "address": "tz1Me",
                "transactions": [
                    {"timestamp": "2025-01-02T10:00:00Z", "level": 10, "hash": "opA",
                     "sender": {"address": "tz1Other"}, "target": {"address": "tz1Me"},
                     "amount": 2500000, "fee": 0},
                    {"timestamp": "2025-01-03T10:00:00Z", "level": 11, "hash": "opB",
                     "sender": {"address": "TZ1ME"}, "target": {"address": "KT1Shop"},
                     "amount": "1000000", "fee": 1420, "parameter": {"entrypoint": "buy"}}
                ]
            }"#,
        );

        assert_eq!(entries.len(), 2);
        let receipt = &entries[0];
        assert_eq!(receipt.direction, Direction::Acquire);
        assert_eq!(receipt.counterparty, "tz1Other");
        assert_eq!(receipt.quantity, dec!(2.5));
        assert_eq!(receipt.tags, vec![Tag::Receipt]);
        assert_eq!(receipt.note, Note::Transfer);
        assert_eq!(receipt.confidence, Confidence::Medium);

        let payment = &entries[1];
        assert_eq!(payment.direction, Direction::Dispose);
        assert_eq!(payment.counterparty, "KT1Shop");
        assert_eq!(payment.quantity, dec!(1));
        assert_eq!(payment.fee, dec!(0.00142));
        assert_eq!(payment.tags, vec![Tag::PaymentOrDisposal]);
        assert_eq!(payment.note, Note::ContractCall);
    }

    #[test]
    fn fee_only_transaction_is_kept_without_quantity_tag() {
        let entries = normalize(
            r#"{"address": "tz1Me", "transactions": [
                {"timestamp": "2025-02-01T00:00:00Z", "hash": "opC",
                 "sender": {"address": "tz1Me"}, "target": {"address": "KT1Dex"},
                 "amount": 0, "fee": 2000, "parameter": {"entrypoint": "claim"}}
            ]}"#,
        );
        assert_eq!(entries.len(), 1);
        assert!(entries[0].tags.is_empty());
        assert_eq!(entries[0].quantity, Decimal::ZERO);
        assert!(entries[0].to_event().is_none());
    }

    #[test]
    fn empty_and_undated_records_are_skipped() {
        let entries = normalize(
            r#"{"address": "tz1Me", "transactions": [
                {"timestamp": "2025-02-01T00:00:00Z", "hash": "opD",
                 "sender": {"address": "tz1Me"}, "target": {"address": "tz1X"},
                 "amount": 0, "fee": 0},
                {"hash": "opE", "sender": {"address": "tz1X"}, "target": {"address": "tz1Me"},
                 "amount": 5}
            ]}"#,
        );
        assert!(entries.is_empty());
    }

    #[test]
    fn self_transfer_is_tagged_and_excluded_from_engine() {
        let entries = normalize(
            r#"{"address": "tz1Me", "transactions": [
                {"timestamp": "2025-02-01T00:00:00Z", "hash": "opF",
                 "sender": {"address": "tz1Me"}, "target": {"address": "tz1me"},
                 "amount": 3000000, "fee": 500}
            ]}"#,
        );
        let entry = &entries[0];
        assert_eq!(entry.direction, Direction::Dispose);
        assert_eq!(entry.tags, vec![Tag::PaymentOrDisposal, Tag::SelfTransfer]);
        assert_eq!(entry.confidence, Confidence::High);
        assert!(entry.to_event().is_none());
    }

    #[test]
    fn token_transfer_scaled_by_decimals() {
        let entries = normalize(
            r#"{"address": "tz1Me", "token_transfers": [
                {"timestamp": "2025-03-01T12:00:00Z", "level": 20, "transactionHash": "opG",
                 "from": {"address": "tz1Other"}, "to": {"address": "tz1Me"},
                 "amount": "1234500",
                 "token": {"contract": {"address": "KT1Usd"}, "tokenId": "0", "standard": "fa1.2",
                           "metadata": {"symbol": "USDt", "decimals": "6"}}}
            ]}"#,
        );
        let entry = &entries[0];
        assert_eq!(entry.quantity, dec!(1.2345));
        assert_eq!(entry.direction, Direction::Acquire);
        assert_eq!(entry.asset.asset_id(), "USDt:KT1Usd:0:fa1.2");
        assert_eq!(entry.tags, vec![Tag::TokenTransfer]);
        assert_eq!(entry.note, Note::TokenTransfer);

        let event = entry.to_event().unwrap();
        assert_eq!(event.asset, "USDt:KT1Usd:0:fa1.2");
        assert_eq!(event.op_hash.as_deref(), Some("opG"));
    }

    #[test]
    fn single_fa2_unit_without_decimals_is_likely_nft() {
        let entries = normalize(
            r#"{"address": "tz1Me", "token_transfers": [
                {"timestamp": "2025-03-02T12:00:00Z", "transactionHash": "opH",
                 "from": {"address": "tz1Me"}, "to": {"address": "tz1Buyer"},
                 "amount": "1",
                 "token": {"contract": {"address": "KT1Art"}, "tokenId": "42", "standard": "fa2",
                           "metadata": {"name": "Sunset"}}}
            ]}"#,
        );
        let entry = &entries[0];
        assert_eq!(entry.direction, Direction::Dispose);
        assert_eq!(entry.counterparty, "tz1Buyer");
        assert_eq!(entry.asset.asset_id(), "Sunset:KT1Art:42:fa2");
        assert!(!entry.asset.is_fungible());
        assert_eq!(entry.tags, vec![Tag::TokenTransfer, Tag::LikelyNft]);
        assert_eq!(entry.confidence, Confidence::High);
        assert!(entry.to_event().is_none());
    }

    #[test]
    fn token_without_metadata_uses_placeholder_symbol() {
        let entries = normalize(
            r#"{"address": "tz1Me", "token_transfers": [
                {"timestamp": "2025-03-02T12:00:00Z", "transactionHash": "opI",
                 "from": {"address": "tz1X"}, "to": {"address": "tz1Me"}, "amount": "7",
                 "token": {"contract": {"address": "KT1Z"}, "tokenId": "3", "standard": "fa1.2"}}
            ]}"#,
        );
        assert_eq!(entries[0].asset.asset_id(), "TOKEN:KT1Z:3:fa1.2");
        assert_eq!(entries[0].quantity, dec!(7));
    }

    #[test]
    fn sorted_stably_with_native_first_on_ties() {
        let entries = normalize(
            r#"{"address": "tz1Me",
                "transactions": [
                    {"timestamp": "2025-01-05T00:00:00Z", "hash": "late",
                     "sender": {"address": "tz1X"}, "target": {"address": "tz1Me"}, "amount": 1},
                    {"timestamp": "2025-01-01T00:00:00Z", "hash": "tie",
                     "sender": {"address": "tz1X"}, "target": {"address": "tz1Me"}, "amount": 1}
                ],
                "token_transfers": [
                    {"timestamp": "2025-01-01T00:00:00Z", "transactionHash": "tieToken",
                     "from": {"address": "tz1X"}, "to": {"address": "tz1Me"}, "amount": "5",
                     "token": {"contract": {"address": "KT1"}, "tokenId": "0", "standard": "fa1.2"}}
                ]}"#,
        );
        let hashes: Vec<_> = entries.iter().map(|e| e.op_hash.clone().unwrap()).collect();
        assert_eq!(hashes, vec!["tie", "tieToken", "late"]);
        let ids: Vec<_> = entries.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 2, 0]);
    }

    #[test]
    fn year_window_is_half_open() {
        let raw = input(
            r#"{"address": "tz1Me", "transactions": [
                {"timestamp": "2024-12-31T23:59:59Z", "hash": "a",
                 "sender": {"address": "tz1X"}, "target": {"address": "tz1Me"}, "amount": 1},
                {"timestamp": "2025-01-01T00:00:00Z", "hash": "b",
                 "sender": {"address": "tz1X"}, "target": {"address": "tz1Me"}, "amount": 1},
                {"timestamp": "2026-01-01T00:00:00Z", "hash": "c",
                 "sender": {"address": "tz1X"}, "target": {"address": "tz1Me"}, "amount": 1}
            ]}"#,
        );
        let entries = Normalizer::new(ME).with_year(2025).unwrap().normalize(&raw).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].op_hash.as_deref(), Some("b"));
    }

    #[test]
    fn invalid_values_are_errors() {
        let raw = input(
            r#"{"address": "tz1Me", "transactions": [
                {"timestamp": "yesterday", "hash": "opX", "amount": 1}
            ]}"#,
        );
        assert_eq!(
            Normalizer::new(ME).normalize(&raw),
            Err(NormalizeError::InvalidTimestamp {
                op_hash: "opX".to_string(),
                value: "yesterday".to_string(),
            })
        );

        let raw = input(
            r#"{"address": "tz1Me", "transactions": [
                {"timestamp": "2025-01-01T00:00:00Z", "hash": "opY", "amount": "lots"}
            ]}"#,
        );
        assert!(matches!(
            Normalizer::new(ME).normalize(&raw),
            Err(NormalizeError::InvalidAmount { .. })
        ));

        assert_eq!(
            Normalizer::new(ME).with_year(i32::MAX).unwrap_err(),
            NormalizeError::InvalidYear(i32::MAX)
        );
    }

    #[test]
    fn engine_events_keep_ledger_order() {
        let entries = normalize(
            r#"{"address": "tz1Me", "transactions": [
                {"timestamp": "2025-01-01T00:00:00Z", "hash": "in",
                 "sender": {"address": "tz1X"}, "target": {"address": "tz1Me"}, "amount": 4000000},
                {"timestamp": "2025-01-02T00:00:00Z", "hash": "out",
                 "sender": {"address": "tz1Me"}, "target": {"address": "tz1Y"}, "amount": 1000000}
            ]}"#,
        );
        let events = engine_events(&entries);
        assert_eq!(events.len(), 2);
        assert!(events[0].is_acquisition());
        assert_eq!(events[1].direction, Direction::Dispose);
        assert_eq!(events[1].quantity, dec!(1));
    }

    #[test]
    fn scale_down_handles_large_decimals() {
        assert_eq!(scale_down(dec!(1000000000000000000), 18), Some(dec!(1)));
        assert_eq!(scale_down(dec!(2.5), 2), Some(dec!(0.025)));
        assert_eq!(scale_down(dec!(5), 40), None);
    }

    #[test]
    fn shift_decimal_point_places_digits() {
        assert_eq!(shift_decimal_point("1234500", 6), Some(dec!(1.2345)));
        assert_eq!(shift_decimal_point("5", 3), Some(dec!(0.005)));
        assert_eq!(shift_decimal_point("-42", 0), Some(dec!(-42)));
        assert_eq!(shift_decimal_point("000700", 2), Some(dec!(7)));
        assert_eq!(shift_decimal_point("1", 200), None);
    }

    #[test]
    fn wide_token_amount_is_scaled_before_parsing() {
        let entries = normalize(
            r#"{"address": "tz1Me",
                "transactions": [
                    {"timestamp": "2025-01-01T00:00:00Z", "hash": "opXtz",
                     "sender": {"address": "tz1X"}, "target": {"address": "tz1Me"}, "amount": 3000000}
                ],
                "token_transfers": [
                    {"timestamp": "2025-01-02T00:00:00Z", "transactionHash": "opMeme",
                     "from": {"address": "tz1X"}, "to": {"address": "tz1Me"},
                     "amount": "100000000000000000000000000000",
                     "token": {"contract": {"address": "KT1Meme"}, "tokenId": "0", "standard": "fa1.2",
                               "metadata": {"symbol": "MEME", "decimals": "18"}}}
                ]}"#,
        );
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].quantity, dec!(3));
        assert_eq!(entries[1].asset.asset_id(), "MEME:KT1Meme:0:fa1.2");
        assert_eq!(entries[1].quantity, dec!(100000000000));
    }

    #[test]
    fn unrepresentable_token_amount_skips_only_that_transfer() {
        let entries = normalize(
            r#"{"address": "tz1Me",
                "transactions": [
                    {"timestamp": "2025-01-01T00:00:00Z", "hash": "opXtz",
                     "sender": {"address": "tz1X"}, "target": {"address": "tz1Me"}, "amount": 3000000}
                ],
                "token_transfers": [
                    {"timestamp": "2025-01-02T00:00:00Z", "transactionHash": "opHuge",
                     "from": {"address": "tz1X"}, "to": {"address": "tz1Me"},
                     "amount": "100000000000000000000000000000000000",
                     "token": {"contract": {"address": "KT1Huge"}, "tokenId": "0", "standard": "fa1.2"}}
                ]}"#,
        );
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].op_hash.as_deref(), Some("opXtz"));
    }
}
