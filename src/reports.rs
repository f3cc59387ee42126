//! Report catalog
//!
//! Every report kind a contract can be viewed through, which inputs it
//! needs, which kinds apply to which contract template, and how one page
//! of each kind is fetched and reshaped from the backend.

use crate::rpc::{RpcClient, StorageHistoryQuery};
use crate::storage_diff::diff_snapshots;
use crate::types::{
    parse_address, BalanceAtBlock, EventSummary, HolderValue, Page, PagingOptions, ReportRow,
    Total, TransactionSummary,
};
use alloy_primitives::Address;
use anyhow::{Context, Result};
use futures::future::try_join_all;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Snapshots per storage-history range reported by `GetStorageHistoryCount`.
pub const STORAGE_RANGE_SIZE: u64 = 1000;

/// Page size used when counting a holder's ERC721 tokens.
const HOLDINGS_PAGE_SIZE: u64 = 100;

/// Rows the token backend will page through (`from + size` must stay within it).
const HOLDINGS_SCAN_LIMIT: u64 = 1000;

/// Report kinds known to the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportKind {
    Erc20TokenHolders,
    Erc20TokenBalance,
    Erc721Tokens,
    Erc721Holders,
    Erc721TokensForAccount,
    Erc721HolderForToken,
    ToTxs,
    InternalToTxs,
    Events,
    GenerateReport,
    ContractCreationTx,
}

/// Input a report can take besides the contract address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Account,
    TokenId,
    Block,
    StartBlock,
    EndBlock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    Required,
    Optional,
}

/// Static description of one report kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportDescriptor {
    pub kind: ReportKind,
    pub label: &'static str,
    pub fields: &'static [(Field, Requirement)],
}

impl ReportDescriptor {
    pub fn required_fields(&self) -> impl Iterator<Item = Field> + '_ {
        self.fields
            .iter()
            .filter(|(_, req)| *req == Requirement::Required)
            .map(|(field, _)| *field)
    }

    pub fn optional_fields(&self) -> impl Iterator<Item = Field> + '_ {
        self.fields
            .iter()
            .filter(|(_, req)| *req == Requirement::Optional)
            .map(|(field, _)| *field)
    }
}

impl ReportKind {
    pub const ALL: [ReportKind; 11] = [
        ReportKind::Erc20TokenHolders,
        ReportKind::Erc20TokenBalance,
        ReportKind::Erc721Tokens,
        ReportKind::Erc721Holders,
        ReportKind::Erc721TokensForAccount,
        ReportKind::Erc721HolderForToken,
        ReportKind::ToTxs,
        ReportKind::InternalToTxs,
        ReportKind::Events,
        ReportKind::GenerateReport,
        ReportKind::ContractCreationTx,
    ];

    /// Stable identifier, as used on the command line.
    pub fn name(&self) -> &'static str {
        match self {
            ReportKind::Erc20TokenHolders => "ERC20TokenHolders",
            ReportKind::Erc20TokenBalance => "ERC20TokenBalance",
            ReportKind::Erc721Tokens => "ERC721Tokens",
            ReportKind::Erc721Holders => "ERC721Holders",
            ReportKind::Erc721TokensForAccount => "ERC721TokensForAccount",
            ReportKind::Erc721HolderForToken => "ERC721HolderForToken",
            ReportKind::ToTxs => "ToTxs",
            ReportKind::InternalToTxs => "InternalToTxs",
            ReportKind::Events => "Events",
            ReportKind::GenerateReport => "GenerateReport",
            ReportKind::ContractCreationTx => "ContractCreationTx",
        }
    }

    pub fn descriptor(&self) -> ReportDescriptor {
        use Field::*;
        use Requirement::*;

        let (label, fields): (&'static str, &'static [(Field, Requirement)]) = match self {
            ReportKind::Erc20TokenHolders => ("ERC20 Token Holders", &[(Block, Optional)]),
            ReportKind::Erc20TokenBalance => (
                "ERC20 Token Balance",
                &[(Account, Required), (StartBlock, Optional), (EndBlock, Optional)],
            ),
            ReportKind::Erc721Tokens => ("ERC721 Tokens", &[(Block, Optional)]),
            ReportKind::Erc721Holders => ("ERC721 Token Holders", &[(Block, Optional)]),
            ReportKind::Erc721TokensForAccount => (
                "ERC721 Tokens for Account",
                &[(Account, Required), (Block, Optional)],
            ),
            ReportKind::Erc721HolderForToken => (
                "Holder for ERC721",
                &[(TokenId, Required), (Block, Optional)],
            ),
            ReportKind::ToTxs => ("Transactions To Contract", &[]),
            ReportKind::InternalToTxs => ("Internal Transactions to Contract", &[]),
            ReportKind::Events => ("Contract Events", &[]),
            ReportKind::GenerateReport => (
                "Full Report",
                &[(StartBlock, Optional), (EndBlock, Optional)],
            ),
            ReportKind::ContractCreationTx => ("Contract Creation Tx", &[]),
        };
        ReportDescriptor {
            kind: *self,
            label,
            fields,
        }
    }

    pub fn label(&self) -> &'static str {
        self.descriptor().label
    }

    /// Whether pages after the first need the previous page's last row.
    pub fn is_cursor_paged(&self) -> bool {
        matches!(
            self,
            ReportKind::Erc20TokenHolders
                | ReportKind::Erc721Tokens
                | ReportKind::Erc721Holders
                | ReportKind::Erc721TokensForAccount
        )
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ReportKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        ReportKind::ALL
            .iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s))
            .copied()
            .with_context(|| format!("Unknown report kind: {}", s))
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Field::Account => "account",
            Field::TokenId => "tokenId",
            Field::Block => "block",
            Field::StartBlock => "startBlock",
            Field::EndBlock => "endBlock",
        };
        f.write_str(name)
    }
}

/// Report kinds offered for a contract with the given template.
pub fn reports_for_template(template_name: &str) -> Vec<ReportKind> {
    let common = [ReportKind::ToTxs, ReportKind::InternalToTxs, ReportKind::Events];
    let mut kinds = match template_name {
        "ERC20" => vec![ReportKind::Erc20TokenHolders, ReportKind::Erc20TokenBalance],
        "ERC721" => vec![
            ReportKind::Erc721Tokens,
            ReportKind::Erc721Holders,
            ReportKind::Erc721TokensForAccount,
            ReportKind::Erc721HolderForToken,
        ],
        _ => Vec::new(),
    };
    kinds.extend(common);
    if !matches!(template_name, "ERC20" | "ERC721") {
        kinds.push(ReportKind::GenerateReport);
    }
    kinds
}

/// Report pre-selected when a contract is opened.
pub fn default_report_for_template(template_name: &str) -> ReportKind {
    reports_for_template(template_name)[0]
}

/// Caller-supplied report filters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportParams {
    pub account: Option<Address>,
    pub token_id: Option<String>,
    pub at_block: Option<u64>,
    pub start_block: Option<u64>,
    pub end_block: Option<u64>,
}

impl ReportParams {
    fn has(&self, field: Field) -> bool {
        match field {
            Field::Account => self.account.is_some(),
            Field::TokenId => self.token_id.as_deref().is_some_and(|t| !t.trim().is_empty()),
            Field::Block => self.at_block.is_some(),
            Field::StartBlock => self.start_block.is_some(),
            Field::EndBlock => self.end_block.is_some(),
        }
    }
}

/// Check required inputs before any request is made.
pub fn validate_params(kind: ReportKind, params: &ReportParams) -> Result<()> {
    let missing: Vec<String> = kind
        .descriptor()
        .required_fields()
        .filter(|field| !params.has(*field))
        .map(|field| field.to_string())
        .collect();

    if !missing.is_empty() {
        anyhow::bail!(
            "{} requires missing field(s): {}",
            kind.label(),
            missing.join(", ")
        );
    }
    Ok(())
}

/// Total for endpoints that cannot count: a short page is the last one.
pub fn calculate_total(rows: usize, options: &PagingOptions) -> Result<Total> {
    let rows = rows as u64;
    if rows >= options.page_size {
        return Ok(Total::Unknown);
    }
    let total = options
        .page_size
        .checked_mul(options.page_number)
        .and_then(|skipped| skipped.checked_add(rows));
    match total {
        Some(total) => Ok(Total::Known(total)),
        None => anyhow::bail!(
            "Page {} of size {} is out of range",
            options.page_number,
            options.page_size
        ),
    }
}

/// Block for point-in-time reports: the given block, else the range end,
/// else the last persisted block.
async fn resolve_at_block(client: &RpcClient, params: &ReportParams) -> Result<u64> {
    match params.at_block.or(params.end_block) {
        Some(block) => Ok(block),
        None => last_persisted_block(client).await,
    }
}

/// Block range for history reports, defaulting to block 1 through the last
/// persisted block.
async fn resolve_range(client: &RpcClient, params: &ReportParams) -> Result<(u64, u64)> {
    let end = match params.end_block {
        Some(block) => block,
        None => last_persisted_block(client).await?,
    };
    Ok((params.start_block.unwrap_or(1), end))
}

async fn last_persisted_block(client: &RpcClient) -> Result<u64> {
    client
        .get_last_persisted_block_number()
        .await
        .context("Failed to resolve default block")
}

/// A report kind bound to a contract and its filters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportTarget {
    pub kind: ReportKind,
    pub address: Address,
    pub params: ReportParams,
}

impl ReportTarget {
    pub fn new(kind: ReportKind, address: Address, params: ReportParams) -> Self {
        Self {
            kind,
            address,
            params,
        }
    }

    pub async fn fetch_page(&self, client: &RpcClient, options: &PagingOptions) -> Result<Page> {
        fetch_page(client, self.kind, self.address, &self.params, options).await
    }
}

/// Fetch and reshape one page of `kind` for the contract at `address`.
pub async fn fetch_page(
    client: &RpcClient,
    kind: ReportKind,
    address: Address,
    params: &ReportParams,
    options: &PagingOptions,
) -> Result<Page> {
    validate_params(kind, params)?;
    debug!(
        report = %kind,
        address = %address,
        page = options.page_number,
        page_size = options.page_size,
        "fetching report page"
    );

    match kind {
        ReportKind::Erc20TokenHolders => {
            let block = resolve_at_block(client, params).await?;
            erc20_holders(client, address, block, options).await
        }
        ReportKind::Erc20TokenBalance => {
            let account = params.account.context("account is required")?;
            let range = resolve_range(client, params).await?;
            erc20_balance(client, address, account, range, options).await
        }
        ReportKind::Erc721Tokens => {
            let block = resolve_at_block(client, params).await?;
            let tokens = client
                .all_erc721_tokens_at_block(address, block, options)
                .await?;
            let total = calculate_total(tokens.len(), options)?;
            Ok(Page {
                data: tokens.into_iter().map(ReportRow::Token).collect(),
                total,
            })
        }
        ReportKind::Erc721Holders => {
            let block = resolve_at_block(client, params).await?;
            erc721_holders(client, address, block, options).await
        }
        ReportKind::Erc721TokensForAccount => {
            let account = params.account.context("account is required")?;
            let block = resolve_at_block(client, params).await?;
            let tokens = client
                .erc721_tokens_for_account_at_block(address, account, block, options)
                .await?;
            let total = calculate_total(tokens.len(), options)?;
            Ok(Page {
                data: tokens.into_iter().map(ReportRow::Token).collect(),
                total,
            })
        }
        ReportKind::Erc721HolderForToken => {
            let token_id = params.token_id.as_deref().context("tokenId is required")?;
            let block = resolve_at_block(client, params).await?;
            let raw = client
                .get_holder_for_erc721_token_at_block(address, token_id, block)
                .await?;
            let holder = parse_address(&raw.replacen("0x0x", "0x", 1))?;
            Ok(Page {
                data: vec![ReportRow::Holder(HolderValue {
                    holder,
                    value: Some(token_id.trim().to_string()),
                })],
                total: Total::Known(1),
            })
        }
        ReportKind::ToTxs => {
            let resp = client
                .get_all_transactions_to_address(address, options)
                .await?;
            let data = transaction_rows(client, resp.transactions.unwrap_or_default()).await?;
            Ok(Page {
                data,
                total: Total::Known(resp.total),
            })
        }
        ReportKind::InternalToTxs => {
            let resp = client
                .get_all_transactions_internal_to_address(address, options)
                .await?;
            let data = transaction_rows(client, resp.transactions.unwrap_or_default()).await?;
            Ok(Page {
                data,
                total: Total::Known(resp.total),
            })
        }
        ReportKind::Events => {
            let resp = client.get_all_events_from_address(address, options).await?;
            Ok(Page {
                data: resp
                    .events
                    .unwrap_or_default()
                    .into_iter()
                    .map(|event| ReportRow::Event(EventSummary::from(event)))
                    .collect(),
                total: Total::Known(resp.total),
            })
        }
        ReportKind::GenerateReport => {
            let range = resolve_range(client, params).await?;
            storage_report(client, address, range, options).await
        }
        ReportKind::ContractCreationTx => {
            let hash = client.get_contract_creation_transaction(address).await?;
            let summary = transaction_summary(client, &hash).await?;
            Ok(Page {
                data: vec![ReportRow::Transaction(summary)],
                total: Total::Known(1),
            })
        }
    }
}

async fn erc20_holders(
    client: &RpcClient,
    contract: Address,
    at_block: u64,
    options: &PagingOptions,
) -> Result<Page> {
    let holders = client
        .get_erc20_token_holders_at_block(contract, at_block, options)
        .await?;
    let total = calculate_total(holders.len(), options)?;

    let lookups = holders.iter().map(|holder| async move {
        let mut balances = client
            .get_erc20_token_balance(contract, *holder, at_block, at_block, None)
            .await?;
        latest_first(&mut balances);
        Ok::<_, anyhow::Error>(ReportRow::Holder(HolderValue {
            holder: *holder,
            value: balances.first().map(|b| b.balance.to_string()),
        }))
    });

    Ok(Page {
        data: try_join_all(lookups).await?,
        total,
    })
}

async fn erc721_holders(
    client: &RpcClient,
    contract: Address,
    at_block: u64,
    options: &PagingOptions,
) -> Result<Page> {
    let holders = client
        .all_erc721_holders_at_block(contract, at_block, options)
        .await?;
    let total = calculate_total(holders.len(), options)?;

    let lookups = holders.iter().map(|holder| async move {
        let count = count_holdings(client, contract, *holder, at_block).await?;
        Ok::<_, anyhow::Error>(ReportRow::Holder(HolderValue {
            holder: *holder,
            value: Some(count.to_string()),
        }))
    });

    Ok(Page {
        data: try_join_all(lookups).await?,
        total,
    })
}

/// Number of tokens `holder` owns at `block`, counted page by page.
///
/// Each request carries both the page number and the last token seen, so
/// page-number and cursor paged backends both advance. Counting stops at
/// the first short page or at the backend's pagination window.
async fn count_holdings(
    client: &RpcClient,
    contract: Address,
    holder: Address,
    block: u64,
) -> Result<u64> {
    let mut options = PagingOptions::first(HOLDINGS_PAGE_SIZE);
    let mut count = 0u64;

    loop {
        let tokens = client
            .erc721_tokens_for_account_at_block(contract, holder, block, &options)
            .await?;
        count += tokens.len() as u64;

        let Some(last) = tokens.last() else { break };
        if (tokens.len() as u64) < HOLDINGS_PAGE_SIZE {
            break;
        }
        if count + HOLDINGS_PAGE_SIZE > HOLDINGS_SCAN_LIMIT {
            debug!(holder = %holder, count, "holding count reached the backend pagination limit");
            break;
        }
        options = PagingOptions {
            page_number: options.page_number + 1,
            page_size: HOLDINGS_PAGE_SIZE,
            after: Some(ReportRow::Token(last.clone())),
        };
    }
    Ok(count)
}

async fn erc20_balance(
    client: &RpcClient,
    contract: Address,
    account: Address,
    (start_block, end_block): (u64, u64),
    options: &PagingOptions,
) -> Result<Page> {
    let mut balances = client
        .get_erc20_token_balance(contract, account, start_block, end_block, Some(options))
        .await?;
    latest_first(&mut balances);
    let total = calculate_total(balances.len(), options)?;

    Ok(Page {
        data: balances.into_iter().map(ReportRow::Balance).collect(),
        total,
    })
}

/// Balance rows are shown newest block first.
fn latest_first(balances: &mut [BalanceAtBlock]) {
    balances.sort_by(|a, b| b.block.cmp(&a.block));
}

async fn storage_report(
    client: &RpcClient,
    contract: Address,
    (start_block, end_block): (u64, u64),
    options: &PagingOptions,
) -> Result<Page> {
    let ranges = client
        .get_storage_history_count(contract, start_block, end_block)
        .await?;
    let total = Total::Known(ranges.iter().map(|r| r.result_count).sum());

    // Ranges are paged independently; the last page of each range may be short
    let pages_per_range = STORAGE_RANGE_SIZE.div_ceil(options.page_size.max(1));
    let range_index = options.page_number / pages_per_range;
    let range = usize::try_from(range_index)
        .ok()
        .and_then(|index| ranges.get(index));
    let Some(range) = range else {
        debug!(range_index, ranges = ranges.len(), "page is past the last storage range");
        return Ok(Page {
            data: Vec::new(),
            total,
        });
    };

    let query = StorageHistoryQuery {
        page_size: options.page_size,
        page_number: options.page_number % pages_per_range,
        begin_block_number: range.start,
        end_block_number: range.end,
    };
    let snapshots = client.get_storage_history(contract, &query).await?;

    Ok(Page {
        data: diff_snapshots(snapshots)
            .into_iter()
            .map(ReportRow::Snapshot)
            .collect(),
        total,
    })
}

/// Detail lookups for a page of transaction hashes, in hash order.
async fn transaction_rows(client: &RpcClient, hashes: Vec<String>) -> Result<Vec<ReportRow>> {
    let lookups = hashes.iter().map(|hash| async move {
        transaction_summary(client, hash)
            .await
            .map(ReportRow::Transaction)
    });
    try_join_all(lookups).await
}

async fn transaction_summary(client: &RpcClient, hash: &str) -> Result<TransactionSummary> {
    client
        .get_transaction(hash)
        .await
        .with_context(|| format!("Failed to fetch transaction {}", hash))?
        .summarize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::mock::MockTransport;
    use crate::types::format_address;
    use serde_json::{json, Value};
    use std::time::Duration;

    fn addr(n: u8) -> Address {
        let mut bytes = [0u8; 20];
        bytes[19] = n;
        Address::from_slice(&bytes)
    }

    fn token_json(holder: u8, token: u64) -> Value {
        json!({
            "contract": format_address(&addr(1)),
            "holder": format_address(&addr(holder)),
            "token": token.to_string(),
            "heldFrom": 3,
            "heldUntil": null,
        })
    }

    #[test]
    fn test_reports_for_erc20() {
        assert_eq!(
            reports_for_template("ERC20"),
            vec![
                ReportKind::Erc20TokenHolders,
                ReportKind::Erc20TokenBalance,
                ReportKind::ToTxs,
                ReportKind::InternalToTxs,
                ReportKind::Events,
            ]
        );
    }

    #[test]
    fn test_reports_for_erc721() {
        assert_eq!(
            reports_for_template("ERC721"),
            vec![
                ReportKind::Erc721Tokens,
                ReportKind::Erc721Holders,
                ReportKind::Erc721TokensForAccount,
                ReportKind::Erc721HolderForToken,
                ReportKind::ToTxs,
                ReportKind::InternalToTxs,
                ReportKind::Events,
            ]
        );
    }

    #[test]
    fn test_reports_for_unknown_template() {
        let expected = vec![
            ReportKind::ToTxs,
            ReportKind::InternalToTxs,
            ReportKind::Events,
            ReportKind::GenerateReport,
        ];
        assert_eq!(reports_for_template("Unknown"), expected);
        assert_eq!(reports_for_template(""), expected);
    }

    #[test]
    fn test_default_report() {
        assert_eq!(default_report_for_template("ERC20"), ReportKind::Erc20TokenHolders);
        assert_eq!(default_report_for_template("ERC721"), ReportKind::Erc721Tokens);
        assert_eq!(default_report_for_template("custom"), ReportKind::ToTxs);
    }

    #[test]
    fn test_kind_names_roundtrip() {
        for kind in ReportKind::ALL {
            assert_eq!(kind.name().parse::<ReportKind>().unwrap(), kind);
            assert_eq!(kind.descriptor().kind, kind);
        }
        assert_eq!("erc20tokenholders".parse::<ReportKind>().unwrap(), ReportKind::Erc20TokenHolders);
        assert!("Nope".parse::<ReportKind>().is_err());
    }

    #[test]
    fn test_calculate_total_boundary() {
        for page_size in [1u64, 10, 25] {
            for page_number in [0u64, 3] {
                let options = PagingOptions {
                    page_number,
                    page_size,
                    after: None,
                };
                for rows in 0..page_size {
                    assert_eq!(
                        calculate_total(rows as usize, &options).unwrap(),
                        Total::Known(page_number * page_size + rows)
                    );
                }
                assert_eq!(
                    calculate_total(page_size as usize, &options).unwrap().as_i64(),
                    -1
                );
            }
        }
    }

    #[test]
    fn test_calculate_total_rejects_overflow() {
        let options = PagingOptions {
            page_number: u64::MAX,
            page_size: 10,
            after: None,
        };
        let err = calculate_total(3, &options).unwrap_err();
        assert!(err.to_string().contains("out of range"));

        // A full page never needs the product
        assert_eq!(calculate_total(10, &options).unwrap(), Total::Unknown);
    }

    #[test]
    fn test_validate_params() {
        let err = validate_params(ReportKind::Erc20TokenBalance, &ReportParams::default())
            .unwrap_err();
        assert!(err.to_string().contains("account"));

        let params = ReportParams {
            account: Some(addr(2)),
            ..Default::default()
        };
        assert!(validate_params(ReportKind::Erc20TokenBalance, &params).is_ok());
        assert!(validate_params(ReportKind::Events, &ReportParams::default()).is_ok());

        let blank_token = ReportParams {
            token_id: Some("  ".into()),
            ..Default::default()
        };
        assert!(validate_params(ReportKind::Erc721HolderForToken, &blank_token).is_err());
    }

    #[tokio::test]
    async fn test_validation_happens_before_network() {
        let mock = MockTransport::new();
        let client = RpcClient::with_transport(mock.clone());

        let result = fetch_page(
            &client,
            ReportKind::Erc721TokensForAccount,
            addr(1),
            &ReportParams::default(),
            &PagingOptions::first(10),
        )
        .await;
        assert!(result.is_err());
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_holder_rows_follow_holder_order() {
        let mock = MockTransport::new();
        mock.on(
            "token.GetERC20TokenHoldersAtBlock",
            json!([
                format_address(&addr(0x11)),
                format_address(&addr(0x12)),
                format_address(&addr(0x13)),
            ]),
        );

        // Replies resolve H3, then H1, then H2
        let delays = [(0x11u8, 40u64, "100"), (0x12, 80, "200"), (0x13, 5, "300")];
        for (holder, delay, balance) in delays {
            let holder_hex = format_address(&addr(holder));
            mock.on_when(
                "token.GetERC20TokenBalance",
                move |params| params[0]["holder"] == json!(holder_hex),
                json!({ "50": balance }),
                Some(Duration::from_millis(delay)),
            );
        }

        let client = RpcClient::with_transport(mock.clone());
        let params = ReportParams {
            at_block: Some(50),
            ..Default::default()
        };
        let page = fetch_page(
            &client,
            ReportKind::Erc20TokenHolders,
            addr(1),
            &params,
            &PagingOptions::first(3),
        )
        .await
        .unwrap();

        let completed: Vec<Value> = mock
            .completed()
            .into_iter()
            .filter(|(m, _)| m == "token.GetERC20TokenBalance")
            .map(|(_, p)| p[0]["holder"].clone())
            .collect();
        assert_eq!(completed[0], json!(format_address(&addr(0x13))));

        assert_eq!(
            page.data,
            vec![
                ReportRow::Holder(HolderValue { holder: addr(0x11), value: Some("100".into()) }),
                ReportRow::Holder(HolderValue { holder: addr(0x12), value: Some("200".into()) }),
                ReportRow::Holder(HolderValue { holder: addr(0x13), value: Some("300".into()) }),
            ]
        );
        // Full page: more may follow
        assert_eq!(page.total, Total::Unknown);

        let balance_params = &mock.calls_to("token.GetERC20TokenBalance")[0][0]["options"];
        assert_eq!(balance_params["beginBlockNumber"], json!(50));
        assert_eq!(balance_params["endBlockNumber"], json!(50));
        assert!(mock.calls_to("reporting.GetLastPersistedBlockNumber").is_empty());
    }

    #[tokio::test]
    async fn test_missing_block_uses_last_persisted() {
        let mock = MockTransport::new();
        mock.on("reporting.GetLastPersistedBlockNumber", json!(77));
        mock.on(
            "token.GetERC20TokenHoldersAtBlock",
            json!([format_address(&addr(0x11))]),
        );
        mock.on("token.GetERC20TokenBalance", json!({ "77": "5" }));
        let client = RpcClient::with_transport(mock.clone());

        fetch_page(
            &client,
            ReportKind::Erc20TokenHolders,
            addr(1),
            &ReportParams::default(),
            &PagingOptions::first(10),
        )
        .await
        .unwrap();

        let holders = &mock.calls_to("token.GetERC20TokenHoldersAtBlock")[0][0];
        assert_eq!(holders["block"], json!(77));
        let balance = &mock.calls_to("token.GetERC20TokenBalance")[0][0]["options"];
        assert_eq!(balance["beginBlockNumber"], json!(77));
        assert_eq!(balance["endBlockNumber"], json!(77));
    }

    #[tokio::test]
    async fn test_end_block_stands_in_for_missing_block() {
        let mock = MockTransport::new();
        mock.on("token.AllERC721TokensAtBlock", json!([]));
        let client = RpcClient::with_transport(mock.clone());
        let params = ReportParams {
            end_block: Some(64),
            ..Default::default()
        };

        fetch_page(
            &client,
            ReportKind::Erc721Tokens,
            addr(1),
            &params,
            &PagingOptions::first(10),
        )
        .await
        .unwrap();

        assert_eq!(mock.calls_to("token.AllERC721TokensAtBlock")[0][0]["block"], json!(64));
        assert!(mock.calls_to("reporting.GetLastPersistedBlockNumber").is_empty());
    }

    #[tokio::test]
    async fn test_missing_block_fails_when_backend_is_down() {
        let mock = MockTransport::new();
        mock.on_error("reporting.GetLastPersistedBlockNumber", "unavailable");
        let client = RpcClient::with_transport(mock.clone());

        let err = fetch_page(
            &client,
            ReportKind::Erc721Holders,
            addr(1),
            &ReportParams::default(),
            &PagingOptions::first(10),
        )
        .await
        .unwrap_err();
        assert!(format!("{:#}", err).contains("unavailable"));
        assert!(mock.calls_to("token.AllERC721HoldersAtBlock").is_empty());
    }

    #[tokio::test]
    async fn test_erc721_holders_count_tokens() {
        let mock = MockTransport::new();
        mock.on("reporting.GetLastPersistedBlockNumber", json!(40));
        mock.on(
            "token.AllERC721HoldersAtBlock",
            json!([format_address(&addr(0x21))]),
        );
        mock.on(
            "token.ERC721TokensForAccountAtBlock",
            json!([token_json(0x21, 1), token_json(0x21, 2)]),
        );
        let client = RpcClient::with_transport(mock.clone());

        let page = fetch_page(
            &client,
            ReportKind::Erc721Holders,
            addr(1),
            &ReportParams::default(),
            &PagingOptions::first(10),
        )
        .await
        .unwrap();

        assert_eq!(
            page.data,
            vec![ReportRow::Holder(HolderValue { holder: addr(0x21), value: Some("2".into()) })]
        );
        assert_eq!(page.total, Total::Known(1));

        let lookup = &mock.calls_to("token.ERC721TokensForAccountAtBlock")[0][0];
        assert_eq!(lookup["block"], json!(40));
        assert_eq!(lookup["options"]["pageSize"], json!(HOLDINGS_PAGE_SIZE));
    }

    #[tokio::test]
    async fn test_erc721_holder_count_spans_pages() {
        let mock = MockTransport::new();
        mock.on(
            "token.AllERC721HoldersAtBlock",
            json!([format_address(&addr(0x21))]),
        );
        let first: Vec<Value> = (1..=100).map(|t| token_json(0x21, t)).collect();
        let second: Vec<Value> = (101..=120).map(|t| token_json(0x21, t)).collect();
        mock.on_when(
            "token.ERC721TokensForAccountAtBlock",
            |params| params[0]["options"]["pageNumber"] == json!(0),
            json!(first),
            None,
        );
        mock.on_when(
            "token.ERC721TokensForAccountAtBlock",
            |params| params[0]["options"]["pageNumber"] == json!(1),
            json!(second),
            None,
        );
        let client = RpcClient::with_transport(mock.clone());
        let params = ReportParams {
            at_block: Some(12),
            ..Default::default()
        };

        let page = fetch_page(
            &client,
            ReportKind::Erc721Holders,
            addr(1),
            &params,
            &PagingOptions::first(10),
        )
        .await
        .unwrap();

        assert_eq!(
            page.data,
            vec![ReportRow::Holder(HolderValue { holder: addr(0x21), value: Some("120".into()) })]
        );
        let lookups = mock.calls_to("token.ERC721TokensForAccountAtBlock");
        assert_eq!(lookups.len(), 2);
        assert!(lookups[0][0]["options"].get("after").is_none());
        assert_eq!(lookups[1][0]["options"]["after"], json!("100"));
    }

    #[tokio::test]
    async fn test_erc20_balance_sorted_latest_first() {
        let mock = MockTransport::new();
        mock.on("reporting.GetLastPersistedBlockNumber", json!(25));
        mock.on(
            "token.GetERC20TokenBalance",
            json!({"5": 10, "20": 30, "12": 20}),
        );
        let client = RpcClient::with_transport(mock.clone());
        let params = ReportParams {
            account: Some(addr(9)),
            ..Default::default()
        };

        let page = fetch_page(
            &client,
            ReportKind::Erc20TokenBalance,
            addr(1),
            &params,
            &PagingOptions::first(10),
        )
        .await
        .unwrap();

        let blocks: Vec<u64> = page
            .data
            .iter()
            .map(|row| match row {
                ReportRow::Balance(b) => b.block,
                other => panic!("unexpected row {:?}", other),
            })
            .collect();
        assert_eq!(blocks, vec![20, 12, 5]);
        assert_eq!(page.total, Total::Known(3));

        let range = &mock.calls_to("token.GetERC20TokenBalance")[0][0]["options"];
        assert_eq!(range["beginBlockNumber"], json!(1));
        assert_eq!(range["endBlockNumber"], json!(25));
    }

    #[tokio::test]
    async fn test_holder_for_token_strips_double_prefix() {
        let mock = MockTransport::new();
        mock.on(
            "token.GetHolderForERC721TokenAtBlock",
            json!(format!("0x{}", format_address(&addr(0x44)))),
        );
        let client = RpcClient::with_transport(mock.clone());
        let params = ReportParams {
            token_id: Some("77".into()),
            at_block: Some(9),
            ..Default::default()
        };

        let page = fetch_page(
            &client,
            ReportKind::Erc721HolderForToken,
            addr(1),
            &params,
            &PagingOptions::first(10),
        )
        .await
        .unwrap();

        assert_eq!(
            page.data,
            vec![ReportRow::Holder(HolderValue { holder: addr(0x44), value: Some("77".into()) })]
        );
        assert_eq!(page.total, Total::Known(1));
        assert_eq!(
            mock.calls_to("token.GetHolderForERC721TokenAtBlock")[0][0]["tokenId"],
            json!(77)
        );
    }

    #[tokio::test]
    async fn test_to_txs_keeps_backend_order_and_total() {
        let mock = MockTransport::new();
        mock.on(
            "reporting.GetAllTransactionsToAddress",
            json!({"transactions": ["0xaa", "0xbb"], "total": 42}),
        );
        for (hash, delay) in [("0xaa", 30u64), ("0xbb", 1)] {
            mock.on_when(
                "reporting.GetTransaction",
                move |params| params[0] == json!(hash),
                json!({
                    "txSig": null,
                    "func4Bytes": "0x",
                    "parsedData": null,
                    "parsedEvents": [],
                    "rawTransaction": {"hash": hash, "from": "0x01", "to": "0x02", "blockNumber": 8}
                }),
                Some(Duration::from_millis(delay)),
            );
        }
        let client = RpcClient::with_transport(mock);

        let page = fetch_page(
            &client,
            ReportKind::ToTxs,
            addr(1),
            &ReportParams::default(),
            &PagingOptions::first(2),
        )
        .await
        .unwrap();

        let hashes: Vec<&str> = page
            .data
            .iter()
            .map(|row| match row {
                ReportRow::Transaction(tx) => tx.hash.as_str(),
                other => panic!("unexpected row {:?}", other),
            })
            .collect();
        assert_eq!(hashes, vec!["0xaa", "0xbb"]);
        assert_eq!(page.total, Total::Known(42));
    }

    #[tokio::test]
    async fn test_events_reshaped() {
        let mock = MockTransport::new();
        mock.on(
            "reporting.GetAllEventsFromAddress",
            json!({
                "events": [{
                    "eventSig": "Transfer(address,address,uint256)",
                    "parsedData": {"value": 1},
                    "rawEvent": {
                        "topics": ["0xddf2", "0x01"],
                        "transactionHash": "0xabc",
                        "address": "0x01",
                        "blockNumber": 77
                    }
                }],
                "total": 1
            }),
        );
        let client = RpcClient::with_transport(mock);

        let page = fetch_page(
            &client,
            ReportKind::Events,
            addr(1),
            &ReportParams::default(),
            &PagingOptions::first(10),
        )
        .await
        .unwrap();

        match &page.data[0] {
            ReportRow::Event(event) => {
                assert_eq!(event.topic.as_deref(), Some("0xddf2"));
                assert_eq!(event.tx_hash.as_deref(), Some("0xabc"));
                assert_eq!(event.block_number, Some(77));
                assert_eq!(
                    event.parsed_event.event_sig.as_deref(),
                    Some("Transfer(address,address,uint256)")
                );
            }
            other => panic!("unexpected row {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_full_report_maps_page_into_range() {
        let mock = MockTransport::new();
        mock.on("reporting.GetLastPersistedBlockNumber", json!(4000));
        mock.on(
            "reporting.GetStorageHistoryCount",
            json!({"ranges": [
                {"start": 2001, "end": 4000, "resultCount": 1000},
                {"start": 1, "end": 2000, "resultCount": 300}
            ]}),
        );
        mock.on(
            "reporting.GetStorageHistory",
            json!({"address": format_address(&addr(1)), "historicState": [
                {"blockNumber": 30, "historicStorage": [{"name": "a", "type": "uint256", "value": 2}]},
                {"blockNumber": 20, "historicStorage": [{"name": "a", "type": "uint256", "value": 2}]},
                {"blockNumber": 10, "historicStorage": [{"name": "a", "type": "uint256", "value": 1}]}
            ]}),
        );
        let client = RpcClient::with_transport(mock.clone());

        // Page 41 of 25 rows lands in the second range, page 1 within it
        let options = PagingOptions {
            page_number: 41,
            page_size: 25,
            after: None,
        };
        let page = fetch_page(
            &client,
            ReportKind::GenerateReport,
            addr(1),
            &ReportParams::default(),
            &options,
        )
        .await
        .unwrap();

        assert_eq!(page.total, Total::Known(1300));
        let blocks: Vec<u64> = page
            .data
            .iter()
            .map(|row| match row {
                ReportRow::Snapshot(s) => s.block_number,
                other => panic!("unexpected row {:?}", other),
            })
            .collect();
        assert_eq!(blocks, vec![30, 10]);

        let query = &mock.calls_to("reporting.GetStorageHistory")[0][0]["options"];
        assert_eq!(query["pageNumber"], json!(1));
        assert_eq!(query["beginBlockNumber"], json!(1));
        assert_eq!(query["endBlockNumber"], json!(2000));

        let count = &mock.calls_to("reporting.GetStorageHistoryCount")[0][0]["options"];
        assert_eq!(count["beginBlockNumber"], json!(1));
        assert_eq!(count["endBlockNumber"], json!(4000));
    }

    #[tokio::test]
    async fn test_full_report_pages_each_range_to_its_end() {
        let mock = MockTransport::new();
        mock.on(
            "reporting.GetStorageHistoryCount",
            json!({"ranges": [
                {"start": 1001, "end": 2000, "resultCount": 1000},
                {"start": 1, "end": 1000, "resultCount": 1000}
            ]}),
        );
        mock.on(
            "reporting.GetStorageHistory",
            json!({"address": format_address(&addr(1)), "historicState": []}),
        );
        let client = RpcClient::with_transport(mock.clone());
        let params = ReportParams {
            start_block: Some(1),
            end_block: Some(2000),
            ..Default::default()
        };

        // 30 rows per page: the first range needs 34 pages, the last one short
        for page_number in [32u64, 33, 34] {
            let options = PagingOptions {
                page_number,
                page_size: 30,
                after: None,
            };
            fetch_page(&client, ReportKind::GenerateReport, addr(1), &params, &options)
                .await
                .unwrap();
        }

        let queries: Vec<(Value, Value)> = mock
            .calls_to("reporting.GetStorageHistory")
            .iter()
            .map(|p| {
                let options = &p[0]["options"];
                (options["beginBlockNumber"].clone(), options["pageNumber"].clone())
            })
            .collect();
        assert_eq!(
            queries,
            vec![
                (json!(1001), json!(32)),
                (json!(1001), json!(33)),
                (json!(1), json!(0)),
            ]
        );
    }

    #[tokio::test]
    async fn test_full_report_past_last_range() {
        let mock = MockTransport::new();
        mock.on("reporting.GetLastPersistedBlockNumber", json!(10));
        mock.on("reporting.GetStorageHistoryCount", json!({"ranges": []}));
        let client = RpcClient::with_transport(mock.clone());

        let page = fetch_page(
            &client,
            ReportKind::GenerateReport,
            addr(1),
            &ReportParams::default(),
            &PagingOptions::first(10),
        )
        .await
        .unwrap();
        assert!(page.data.is_empty());
        assert_eq!(page.total, Total::Known(0));
        assert!(mock.calls_to("reporting.GetStorageHistory").is_empty());
    }

    #[tokio::test]
    async fn test_protocol_error_rejects_page() {
        let mock = MockTransport::new();
        mock.on_error("reporting.GetAllEventsFromAddress", "boom");
        let client = RpcClient::with_transport(mock);

        let err = fetch_page(
            &client,
            ReportKind::Events,
            addr(1),
            &ReportParams::default(),
            &PagingOptions::first(10),
        )
        .await
        .unwrap_err();
        assert!(format!("{:#}", err).contains("boom"));
    }
}
