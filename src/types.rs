//! Reporting engine wire types
//!
//! Row types returned by the reporting backend, plus the `Page` / `Total`
//! shapes every report is reshaped into before it reaches a view.

use alloy_primitives::{Address, U256};
use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Summary of a transaction sent to (or internally calling) a contract.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionSummary {
    pub hash: String,
    pub from: Option<String>,
    pub to: Option<String>,
    pub block_number: Option<u64>,
    pub parsed_transaction: ParsedCall,
    pub parsed_events: Vec<Value>,
    pub internal_calls: Value,
}

/// Decoded call data of a transaction.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedCall {
    pub tx_sig: Option<String>,
    pub func4_bytes: Option<String>,
    pub parsed_data: Option<Value>,
}

/// Transaction as returned by `reporting.GetTransaction`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedTransaction {
    #[serde(default)]
    pub tx_sig: Option<String>,
    #[serde(default)]
    pub func4_bytes: Option<String>,
    #[serde(default)]
    pub parsed_data: Option<Value>,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub parsed_events: Vec<Value>,

    /// Raw transaction fields (hash, from, to, blockNumber, internalCalls, ...)
    #[serde(default)]
    pub raw_transaction: serde_json::Map<String, Value>,
}

impl ParsedTransaction {
    /// Reshape into the row shown by transaction reports.
    pub fn summarize(&self) -> Result<TransactionSummary> {
        let raw = &self.raw_transaction;
        let hash = raw
            .get("hash")
            .and_then(Value::as_str)
            .context("Transaction missing 'hash' field")?
            .to_string();

        Ok(TransactionSummary {
            hash,
            from: raw.get("from").and_then(Value::as_str).map(str::to_string),
            to: raw.get("to").and_then(Value::as_str).map(str::to_string),
            block_number: raw.get("blockNumber").and_then(Value::as_u64),
            parsed_transaction: ParsedCall {
                tx_sig: self.tx_sig.clone(),
                func4_bytes: self.func4_bytes.clone(),
                parsed_data: self.parsed_data.clone(),
            },
            parsed_events: self.parsed_events.clone(),
            internal_calls: raw.get("internalCalls").cloned().unwrap_or(Value::Null),
        })
    }

    /// Parsed fields merged over the raw transaction, for single-transaction views.
    pub fn flatten(&self) -> Value {
        let mut merged = self.raw_transaction.clone();
        merged.insert("txSig".into(), json_or_null(&self.tx_sig));
        merged.insert("func4Bytes".into(), json_or_null(&self.func4_bytes));
        merged.insert(
            "parsedData".into(),
            self.parsed_data.clone().unwrap_or(Value::Null),
        );
        merged.insert("parsedEvents".into(), Value::Array(self.parsed_events.clone()));
        Value::Object(merged)
    }
}

fn json_or_null(s: &Option<String>) -> Value {
    s.as_ref().map(|s| Value::String(s.clone())).unwrap_or(Value::Null)
}

/// Event as returned inside `reporting.GetAllEventsFromAddress`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedEvent {
    #[serde(default)]
    pub event_sig: Option<String>,
    #[serde(default)]
    pub parsed_data: Option<Value>,
    pub raw_event: RawEvent,
}

/// Raw log fields of an event.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEvent {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub topics: Vec<String>,
    #[serde(default)]
    pub transaction_hash: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub block_number: Option<u64>,
}

/// Row shown by the events report.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSummary {
    pub topic: Option<String>,
    pub tx_hash: Option<String>,
    pub address: Option<String>,
    pub block_number: Option<u64>,
    pub parsed_event: ParsedEventData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedEventData {
    pub event_sig: Option<String>,
    pub parsed_data: Option<Value>,
}

impl From<ParsedEvent> for EventSummary {
    fn from(event: ParsedEvent) -> Self {
        let raw = event.raw_event;
        Self {
            topic: raw.topics.into_iter().next(),
            tx_hash: raw.transaction_hash,
            address: raw.address,
            block_number: raw.block_number,
            parsed_event: ParsedEventData {
                event_sig: event.event_sig,
                parsed_data: event.parsed_data,
            },
        }
    }
}

/// Token holder paired with a value.
///
/// The value is the ERC20 balance, the ERC721 token count, or the token id,
/// depending on which holder report produced the row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HolderValue {
    #[serde(serialize_with = "serialize_address")]
    pub holder: Address,
    pub value: Option<String>,
}

/// ERC20 balance of one holder at one block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceAtBlock {
    pub block: u64,
    #[serde(serialize_with = "serialize_u256_decimal")]
    pub balance: U256,
}

/// ERC721 token ownership record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Erc721Token {
    #[serde(deserialize_with = "deserialize_address", serialize_with = "serialize_address")]
    pub contract: Address,
    #[serde(deserialize_with = "deserialize_address", serialize_with = "serialize_address")]
    pub holder: Address,
    #[serde(deserialize_with = "deserialize_decimal_string")]
    pub token: String,
    pub held_from: u64,
    #[serde(default)]
    pub held_until: Option<u64>,
}

/// One tracked storage variable within a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageItem {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub changed: bool,
}

/// All tracked storage values of a contract at one block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageSnapshot {
    pub block_number: u64,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub historic_storage: Vec<StorageItem>,
}

/// Block range of the storage history holding `result_count` snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeResult {
    pub start: u64,
    pub end: u64,
    pub result_count: u64,
}

/// Registered contract with its template details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractInfo {
    #[serde(serialize_with = "serialize_address")]
    pub address: Address,
    pub abi: String,
    pub storage_layout: String,
    /// Template name; empty when none is assigned.
    pub name: String,
}

/// Template definition (ABI + storage layout).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateArgs {
    pub name: String,
    pub abi: String,
    pub storage_layout: String,
}

/// Template to assign when registering a contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateChoice {
    Existing(String),
    New(TemplateArgs),
}

/// Contract registration request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewContract {
    pub address: Address,
    pub template: TemplateChoice,
}

/// One row of any report page.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ReportRow {
    Transaction(TransactionSummary),
    Event(EventSummary),
    Holder(HolderValue),
    Balance(BalanceAtBlock),
    Token(Erc721Token),
    Snapshot(StorageSnapshot),
}

impl ReportRow {
    /// Value the backend expects as `after` when this row ends a page.
    ///
    /// Only holder and token listings are cursor-paged; other rows page by
    /// page number and yield `None`.
    pub fn cursor(&self) -> Option<String> {
        match self {
            ReportRow::Holder(row) => Some(format!("0x{:x}", row.holder)),
            ReportRow::Token(row) => Some(row.token.clone()),
            _ => None,
        }
    }
}

/// Total row count of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Total {
    Known(u64),
    /// Not the last page, but the backend cannot cheaply count.
    #[default]
    Unknown,
}

impl Total {
    /// Wire/display form: the count, or `-1` when unknown.
    pub fn as_i64(&self) -> i64 {
        match self {
            Total::Known(n) => i64::try_from(*n).unwrap_or(i64::MAX),
            Total::Unknown => -1,
        }
    }
}

impl Serialize for Total {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.as_i64())
    }
}

/// One page of report rows.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Page {
    pub data: Vec<ReportRow>,
    pub total: Total,
}

/// Paging request for one report page.
#[derive(Debug, Clone, PartialEq)]
pub struct PagingOptions {
    /// Zero-based page index
    pub page_number: u64,
    /// Rows per page (> 0)
    pub page_size: u64,
    /// Last row of the previous page, absent for the first page
    pub after: Option<ReportRow>,
}

impl PagingOptions {
    pub fn first(page_size: u64) -> Self {
        Self {
            page_number: 0,
            page_size,
            after: None,
        }
    }

    /// Options object sent to the backend.
    pub fn to_wire(&self) -> Value {
        let mut options = serde_json::Map::new();
        options.insert("pageNumber".into(), Value::from(self.page_number));
        options.insert("pageSize".into(), Value::from(self.page_size));
        if let Some(after) = self.after.as_ref().and_then(ReportRow::cursor) {
            options.insert("after".into(), Value::String(after));
        }
        Value::Object(options)
    }
}

// Hex helpers

/// Pad an odd-length hex string with a leading zero.
pub fn pad_hex_string(s: &str) -> String {
    if s.is_empty() {
        return s.to_string();
    }
    if s.len() % 2 == 1 {
        format!("0{}", s)
    } else {
        s.to_string()
    }
}

/// Parse an address from a hex string.
///
/// Accepts addresses with or without 0x prefix.
pub fn parse_address(s: &str) -> Result<Address> {
    let s = s.trim();
    let s = s.strip_prefix("0x").unwrap_or(s);
    let s = pad_hex_string(s);
    let bytes = hex::decode(&s).with_context(|| format!("Invalid hex address: {}", s))?;

    if bytes.len() != 20 {
        anyhow::bail!(
            "Address must be 20 bytes (40 hex chars), got {} bytes",
            bytes.len()
        );
    }

    Ok(Address::from_slice(&bytes))
}

/// Parse an integer given either as a JSON number or a decimal/0x string.
pub fn parse_u256(value: &Value) -> Result<U256> {
    match value {
        Value::Number(n) => n
            .to_string()
            .parse::<U256>()
            .with_context(|| format!("Invalid integer: {}", n)),
        Value::String(s) if s.is_empty() => Ok(U256::ZERO),
        Value::String(s) => s
            .parse::<U256>()
            .with_context(|| format!("Invalid integer: {}", s)),
        other => anyhow::bail!("Expected integer, got {}", other),
    }
}

/// Render an address the way the backend expects it.
pub fn format_address(address: &Address) -> String {
    format!("0x{:x}", address)
}

fn serialize_address<S: Serializer>(address: &Address, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_address(address))
}

fn serialize_u256_decimal<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

fn deserialize_address<'de, D>(deserializer: D) -> Result<Address, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_address(&s).map_err(serde::de::Error::custom)
}

/// Token ids arrive as strings or (big) JSON numbers.
fn deserialize_decimal_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "Expected token id, got {}",
            other
        ))),
    }
}

/// Go encodes empty slices as `null`.
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Decode a list result, treating `null` as empty.
pub fn decode_list<T>(value: Value) -> Result<Vec<T>>
where
    T: serde::de::DeserializeOwned,
{
    if value.is_null() {
        return Ok(Vec::new());
    }
    serde_json::from_value(value).context("Failed to deserialize list result")
}
