//! JSON-RPC client for the reporting engine
//!
//! Provides a typed interface to the `reporting.*` and `token.*` methods.
//! Requests are JSON-RPC 2.0 POSTs with a locally incrementing id; a
//! `{error: {message}}` reply becomes an error carrying that message.

use crate::types::{
    decode_list, format_address, parse_address, parse_u256, BalanceAtBlock, Erc721Token,
    PagingOptions, ParsedEvent, ParsedTransaction, RangeResult, StorageSnapshot, TemplateArgs,
};
use alloy_primitives::Address;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Default reporting engine endpoint.
pub const DEFAULT_RPC_URL: &str = "http://localhost:4000";

/// Something that can carry one JSON-RPC call to the backend.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    /// Send `method` with `params` and return the `result` value.
    async fn call(&self, method: &str, params: Value) -> Result<Value>;

    /// Endpoint description for logs.
    fn endpoint(&self) -> &str;
}

/// Pull `result` out of a JSON-RPC response envelope.
pub fn extract_result(response: Value) -> Result<Value> {
    // Check for RPC error
    if let Some(error) = response.get("error").filter(|e| !e.is_null()) {
        match error.get("message").and_then(Value::as_str) {
            Some(message) => anyhow::bail!("RPC error: {}", message),
            None => anyhow::bail!("RPC error: {}", error),
        }
    }

    response
        .get("result")
        .cloned()
        .context("RPC response missing 'result' field")
}

/// JSON-RPC over HTTP POST.
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl HttpTransport {
    pub fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
            next_id: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": id,
        });
        debug!(method, id, url = %self.url, "sending RPC request");

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .context("Failed to send RPC request")?;

        let json: Value = response
            .json()
            .await
            .context("Failed to parse RPC response")?;

        extract_result(json)
    }

    fn endpoint(&self) -> &str {
        &self.url
    }
}

/// Reply of `reporting.GetAllTransactionsToAddress` and friends.
#[derive(Debug, Clone, Deserialize)]
pub struct TransactionsResp {
    #[serde(default)]
    pub transactions: Option<Vec<String>>,
    #[serde(default)]
    pub total: u64,
}

/// Reply of `reporting.GetAllEventsFromAddress`.
#[derive(Debug, Clone, Deserialize)]
pub struct EventsResp {
    #[serde(default)]
    pub events: Option<Vec<ParsedEvent>>,
    #[serde(default)]
    pub total: u64,
}

#[derive(Debug, Clone, Deserialize)]
struct RangesResp {
    #[serde(default)]
    ranges: Option<Vec<RangeResult>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StorageHistoryResp {
    #[serde(default)]
    historic_state: Option<Vec<StorageSnapshot>>,
}

/// Page of one storage-history range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageHistoryQuery {
    pub page_size: u64,
    pub page_number: u64,
    pub begin_block_number: u64,
    pub end_block_number: u64,
}

/// Typed client for the reporting engine.
#[derive(Clone)]
pub struct RpcClient {
    transport: Arc<dyn RpcTransport>,
}

impl RpcClient {
    /// Create a client talking HTTP to `url`.
    pub fn new(url: String) -> Self {
        Self::with_transport(Arc::new(HttpTransport::new(url)))
    }

    pub fn with_transport(transport: Arc<dyn RpcTransport>) -> Self {
        Self { transport }
    }

    pub fn endpoint(&self) -> &str {
        self.transport.endpoint()
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        self.transport.call(method, params).await
    }

    async fn call_typed<T>(&self, method: &str, params: Value) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let result = self.call(method, params).await?;
        serde_json::from_value(result)
            .with_context(|| format!("Failed to deserialize {} result", method))
    }

    // ─────────────────────────────────────────────────────────────────
    // Registry
    // ─────────────────────────────────────────────────────────────────

    pub async fn get_last_persisted_block_number(&self) -> Result<u64> {
        self.call_typed("reporting.GetLastPersistedBlockNumber", json!([]))
            .await
    }

    pub async fn get_addresses(&self) -> Result<Vec<Address>> {
        let result = self.call("reporting.GetAddresses", json!([])).await?;
        let raw: Vec<String> = decode_list(result)?;
        raw.iter().map(|s| parse_address(s)).collect()
    }

    pub async fn add_address(&self, address: Address) -> Result<()> {
        self.call(
            "reporting.AddAddress",
            json!([{ "address": format_address(&address) }]),
        )
        .await?;
        Ok(())
    }

    pub async fn delete_address(&self, address: Address) -> Result<()> {
        self.call("reporting.DeleteAddress", json!([format_address(&address)]))
            .await?;
        Ok(())
    }

    pub async fn get_templates(&self) -> Result<Vec<String>> {
        let result = self.call("reporting.GetTemplates", json!([])).await?;
        decode_list(result)
    }

    pub async fn add_template(&self, template: &TemplateArgs) -> Result<()> {
        self.call(
            "reporting.AddTemplate",
            json!([{
                "name": template.name,
                "abi": template.abi,
                "storageLayout": template.storage_layout,
            }]),
        )
        .await?;
        Ok(())
    }

    pub async fn assign_template(&self, address: Address, template_name: &str) -> Result<()> {
        self.call(
            "reporting.AssignTemplate",
            json!([{ "address": format_address(&address), "data": template_name }]),
        )
        .await?;
        Ok(())
    }

    pub async fn get_contract_template(&self, address: Address) -> Result<String> {
        self.string_for_address("reporting.GetContractTemplate", address)
            .await
    }

    pub async fn get_abi(&self, address: Address) -> Result<String> {
        self.string_for_address("reporting.GetABI", address).await
    }

    pub async fn get_storage_abi(&self, address: Address) -> Result<String> {
        self.string_for_address("reporting.GetStorageABI", address)
            .await
    }

    async fn string_for_address(&self, method: &str, address: Address) -> Result<String> {
        let result = self.call(method, json!([format_address(&address)])).await?;
        Ok(result.as_str().unwrap_or_default().to_string())
    }

    // ─────────────────────────────────────────────────────────────────
    // Chain data
    // ─────────────────────────────────────────────────────────────────

    pub async fn get_contract_creation_transaction(&self, address: Address) -> Result<String> {
        let result = self
            .call(
                "reporting.GetContractCreationTransaction",
                json!([format_address(&address)]),
            )
            .await?;
        result
            .as_str()
            .map(str::to_string)
            .context("Contract creation transaction is not a string")
    }

    pub async fn get_all_transactions_to_address(
        &self,
        address: Address,
        options: &PagingOptions,
    ) -> Result<TransactionsResp> {
        self.call_typed(
            "reporting.GetAllTransactionsToAddress",
            address_with_options(address, options),
        )
        .await
    }

    pub async fn get_all_transactions_internal_to_address(
        &self,
        address: Address,
        options: &PagingOptions,
    ) -> Result<TransactionsResp> {
        self.call_typed(
            "reporting.GetAllTransactionsInternalToAddress",
            address_with_options(address, options),
        )
        .await
    }

    pub async fn get_all_events_from_address(
        &self,
        address: Address,
        options: &PagingOptions,
    ) -> Result<EventsResp> {
        self.call_typed(
            "reporting.GetAllEventsFromAddress",
            address_with_options(address, options),
        )
        .await
    }

    pub async fn get_block(&self, block_number: u64) -> Result<Value> {
        self.call("reporting.GetBlock", json!([block_number])).await
    }

    pub async fn get_transaction(&self, tx_hash: &str) -> Result<ParsedTransaction> {
        self.call_typed("reporting.GetTransaction", json!([tx_hash]))
            .await
    }

    // ─────────────────────────────────────────────────────────────────
    // Storage history
    // ─────────────────────────────────────────────────────────────────

    pub async fn get_storage_history(
        &self,
        address: Address,
        query: &StorageHistoryQuery,
    ) -> Result<Vec<StorageSnapshot>> {
        let resp: StorageHistoryResp = self
            .call_typed(
                "reporting.GetStorageHistory",
                json!([{
                    "address": format_address(&address),
                    "options": {
                        "pageSize": query.page_size,
                        "pageNumber": query.page_number,
                        "beginBlockNumber": query.begin_block_number,
                        "endBlockNumber": query.end_block_number,
                    },
                }]),
            )
            .await?;
        Ok(resp.historic_state.unwrap_or_default())
    }

    pub async fn get_storage_history_count(
        &self,
        address: Address,
        start_block: u64,
        end_block: u64,
    ) -> Result<Vec<RangeResult>> {
        let resp: RangesResp = self
            .call_typed(
                "reporting.GetStorageHistoryCount",
                json!([{
                    "address": format_address(&address),
                    "options": {
                        "beginBlockNumber": start_block,
                        "endBlockNumber": end_block,
                    },
                }]),
            )
            .await?;
        Ok(resp.ranges.unwrap_or_default())
    }

    // ─────────────────────────────────────────────────────────────────
    // Tokens
    // ─────────────────────────────────────────────────────────────────

    pub async fn get_erc20_token_holders_at_block(
        &self,
        contract: Address,
        block: u64,
        options: &PagingOptions,
    ) -> Result<Vec<Address>> {
        let result = self
            .call(
                "token.GetERC20TokenHoldersAtBlock",
                json!([{
                    "contract": format_address(&contract),
                    "block": block,
                    "options": options.to_wire(),
                }]),
            )
            .await?;
        parse_address_list(result)
    }

    /// Balance history of `holder`, one entry per block in backend order.
    ///
    /// Always pages by page number; `after` is never sent. Without
    /// `options` the backend default page applies.
    pub async fn get_erc20_token_balance(
        &self,
        contract: Address,
        holder: Address,
        start_block: u64,
        end_block: u64,
        options: Option<&PagingOptions>,
    ) -> Result<Vec<BalanceAtBlock>> {
        let mut wire = serde_json::Map::new();
        if let Some(options) = options {
            wire.insert("pageNumber".into(), Value::from(options.page_number));
            wire.insert("pageSize".into(), Value::from(options.page_size));
        }
        wire.insert("beginBlockNumber".into(), json!(start_block));
        wire.insert("endBlockNumber".into(), json!(end_block));

        let result = self
            .call(
                "token.GetERC20TokenBalance",
                json!([{
                    "contract": format_address(&contract),
                    "holder": format_address(&holder),
                    "options": wire,
                }]),
            )
            .await?;

        let entries = match result {
            Value::Null => return Ok(Vec::new()),
            Value::Object(entries) => entries,
            other => anyhow::bail!("Balance response is not an object: {}", other),
        };

        entries
            .into_iter()
            .map(|(block, balance)| {
                let block = block
                    .parse::<u64>()
                    .with_context(|| format!("Invalid block number key: {}", block))?;
                let balance = parse_u256(&balance).context("Failed to parse balance")?;
                Ok(BalanceAtBlock { block, balance })
            })
            .collect()
    }

    pub async fn all_erc721_holders_at_block(
        &self,
        contract: Address,
        block: u64,
        options: &PagingOptions,
    ) -> Result<Vec<Address>> {
        let result = self
            .call(
                "token.AllERC721HoldersAtBlock",
                json!([{
                    "contract": format_address(&contract),
                    "block": block,
                    "options": options.to_wire(),
                }]),
            )
            .await?;
        parse_address_list(result)
    }

    pub async fn all_erc721_tokens_at_block(
        &self,
        contract: Address,
        block: u64,
        options: &PagingOptions,
    ) -> Result<Vec<Erc721Token>> {
        let result = self
            .call(
                "token.AllERC721TokensAtBlock",
                json!([{
                    "contract": format_address(&contract),
                    "block": block,
                    "options": options.to_wire(),
                }]),
            )
            .await?;
        decode_list(result)
    }

    pub async fn erc721_tokens_for_account_at_block(
        &self,
        contract: Address,
        holder: Address,
        block: u64,
        options: &PagingOptions,
    ) -> Result<Vec<Erc721Token>> {
        let result = self
            .call(
                "token.ERC721TokensForAccountAtBlock",
                json!([{
                    "contract": format_address(&contract),
                    "holder": format_address(&holder),
                    "block": block,
                    "options": options.to_wire(),
                }]),
            )
            .await?;
        decode_list(result)
    }

    /// Raw holder string; some backends double the `0x` prefix.
    pub async fn get_holder_for_erc721_token_at_block(
        &self,
        contract: Address,
        token_id: &str,
        block: u64,
    ) -> Result<String> {
        let result = self
            .call(
                "token.GetHolderForERC721TokenAtBlock",
                json!([{
                    "contract": format_address(&contract),
                    "tokenId": token_id_value(token_id)?,
                    "block": block,
                }]),
            )
            .await?;
        result
            .as_str()
            .map(str::to_string)
            .context("Token holder response is not a string")
    }
}

fn address_with_options(address: Address, options: &PagingOptions) -> Value {
    json!([{
        "address": format_address(&address),
        "options": options.to_wire(),
    }])
}

fn parse_address_list(result: Value) -> Result<Vec<Address>> {
    let raw: Vec<String> = decode_list(result)?;
    raw.iter().map(|s| parse_address(s)).collect()
}

/// Token ids go over the wire as (possibly big) JSON numbers.
pub fn token_id_value(token_id: &str) -> Result<Value> {
    let token_id = token_id.trim();
    if token_id.is_empty() || !token_id.bytes().all(|b| b.is_ascii_digit()) {
        anyhow::bail!("Token id must be a decimal integer, got '{}'", token_id);
    }
    serde_json::from_str(token_id).context("Failed to encode token id")
}
