//! CLI implementation for reportctl
//!
//! Command-line front end for the reporting engine: contract registry,
//! report catalog and paged report fetches. All commands output pretty JSON.

use crate::config::{load_contract_list, Config};
use crate::contracts;
use crate::cursor::PaginatedCursor;
use crate::reports::{default_report_for_template, reports_for_template, ReportKind, ReportParams, ReportTarget};
use crate::rpc::RpcClient;
use crate::session::SessionState;
use crate::types::{format_address, parse_address, NewContract, TemplateArgs, TemplateChoice};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::{json, Value};
use std::fs;
use std::path::PathBuf;
use tracing::debug;

/// Reporting engine CLI tool
#[derive(Parser)]
#[command(name = "reportctl")]
#[command(about = "Query reports and manage contracts on a reporting engine")]
pub struct Cli {
    /// Path to a TOML config file (falls back to $REPORTS_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Reporting engine endpoint, overrides the config file
    #[arg(short, long)]
    rpc_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Get the last persisted block number
    BlockNumber,
    /// List registered contracts with their templates
    Contracts,
    /// Register a contract and assign a template
    AddContract {
        /// Contract address (hex, with or without 0x prefix)
        address: String,
        #[command(flatten)]
        template: TemplateOpts,
    },
    /// Register every contract listed in a file (one address per line)
    ImportContracts {
        /// Path to the contract list
        file: PathBuf,
        #[command(flatten)]
        template: TemplateOpts,
    },
    /// Remove a contract from the registry
    DeleteContract {
        /// Contract address (hex, with or without 0x prefix)
        address: String,
    },
    /// List known templates
    Templates,
    /// List the reports available for a contract
    Reports {
        /// Contract address (hex, with or without 0x prefix)
        address: String,
    },
    /// Fetch one page of a report
    Report {
        /// Contract address (hex, with or without 0x prefix)
        address: String,
        /// Report kind (e.g. ToTxs, ERC20TokenHolders, GenerateReport)
        kind: String,
        /// Zero-based page number
        #[arg(long, default_value_t = 0)]
        page: usize,
        /// Rows per page, overrides the config file
        #[arg(long)]
        page_size: Option<u64>,
        /// Account address filter
        #[arg(long)]
        account: Option<String>,
        /// Token id filter (decimal)
        #[arg(long)]
        token_id: Option<String>,
        /// Block to report at
        #[arg(long)]
        block: Option<u64>,
        /// First block of a block range
        #[arg(long)]
        start_block: Option<u64>,
        /// Last block of a block range
        #[arg(long)]
        end_block: Option<u64>,
    },
    /// Get a block
    Block {
        /// Block number
        number: u64,
    },
    /// Get a decoded transaction
    Tx {
        /// Transaction hash
        hash: String,
    },
}

/// Template selection for contract registration.
#[derive(Args)]
pub struct TemplateOpts {
    /// Existing template name
    #[arg(long, conflicts_with = "new_template")]
    template: Option<String>,
    /// Name of a new template to create
    #[arg(long, requires_all = ["abi", "storage_layout"])]
    new_template: Option<String>,
    /// Path to the ABI JSON for a new template
    #[arg(long)]
    abi: Option<PathBuf>,
    /// Path to the storage layout JSON for a new template
    #[arg(long)]
    storage_layout: Option<PathBuf>,
}

impl TemplateOpts {
    fn choice(&self) -> Result<TemplateChoice> {
        match (&self.template, &self.new_template) {
            (Some(name), None) => Ok(TemplateChoice::Existing(name.clone())),
            (None, Some(name)) => {
                let abi = read_optional(self.abi.as_ref(), "abi")?;
                let storage_layout = read_optional(self.storage_layout.as_ref(), "storage-layout")?;
                Ok(TemplateChoice::New(TemplateArgs {
                    name: name.clone(),
                    abi,
                    storage_layout,
                }))
            }
            _ => anyhow::bail!("Specify either --template or --new-template"),
        }
    }
}

fn read_optional(path: Option<&PathBuf>, flag: &str) -> Result<String> {
    let path = path.with_context(|| format!("--{} is required for a new template", flag))?;
    fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))
}

/// Run the CLI command and print JSON output.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref()).context("Failed to load config")?;
    if let Some(url) = cli.rpc_url {
        config.rpc_endpoint = url;
    }
    debug!(endpoint = %config.rpc_endpoint, page_size = config.page_size, "loaded config");
    let client = RpcClient::new(config.rpc_endpoint.clone());

    let result = match cli.command {
        Commands::BlockNumber => {
            let block = contracts::get_block_number(&client).await?;
            json!({ "last_persisted_block": block })
        }
        Commands::Contracts => serde_json::to_value(contracts::get_contracts(&client).await?)?,
        Commands::AddContract { address, template } => {
            let contract = NewContract {
                address: parse_address(&address)?,
                template: template.choice()?,
            };
            contracts::add_contract(&client, &contract).await?;
            json!({ "status": "ok", "address": format_address(&contract.address) })
        }
        Commands::ImportContracts { file, template } => {
            let addresses = load_contract_list(&file)?;
            contracts::import_contracts(&client, &addresses, template.choice()?).await?;
            json!({ "status": "ok", "imported": addresses.len() })
        }
        Commands::DeleteContract { address } => {
            let address = parse_address(&address)?;
            contracts::delete_contract(&client, address).await?;
            json!({ "status": "ok", "address": format_address(&address) })
        }
        Commands::Templates => json!(contracts::get_templates(&client).await?),
        Commands::Reports { address } => {
            let address = parse_address(&address)?;
            let template = client.get_contract_template(address).await?;
            report_catalog(&template)
        }
        Commands::Report {
            address,
            kind,
            page,
            page_size,
            account,
            token_id,
            block,
            start_block,
            end_block,
        } => {
            let kind: ReportKind = kind.parse()?;
            let params = ReportParams {
                account: account.as_deref().map(parse_address).transpose()?,
                token_id,
                at_block: block,
                start_block,
                end_block,
            };
            let target = ReportTarget::new(kind, parse_address(&address)?, params);

            let mut session = SessionState::new(&config);
            if let Some(page_size) = page_size {
                session.set_page_size(page_size);
            }
            fetch_report_page(&client, &session, target, page).await?
        }
        Commands::Block { number } => contracts::get_single_block(&client, number).await?,
        Commands::Tx { hash } => contracts::get_single_transaction(&client, &hash).await?,
    };

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn report_catalog(template: &str) -> Value {
    let reports: Vec<Value> = reports_for_template(template)
        .into_iter()
        .map(|kind| {
            let descriptor = kind.descriptor();
            json!({
                "kind": kind.name(),
                "label": descriptor.label,
                "required": descriptor.required_fields().map(|f| f.to_string()).collect::<Vec<_>>(),
                "optional": descriptor.optional_fields().map(|f| f.to_string()).collect::<Vec<_>>(),
            })
        })
        .collect();

    json!({
        "template": template,
        "default": default_report_for_template(template).name(),
        "reports": reports,
    })
}

/// Load `page` of a report.
///
/// Cursor-paged reports are walked from page 0 so each request carries the
/// previous page's last row.
async fn fetch_report_page(
    client: &RpcClient,
    session: &SessionState,
    target: ReportTarget,
    page: usize,
) -> Result<Value> {
    let kind = target.kind;
    let mut cursor = PaginatedCursor::new(target, session.page_size());
    cursor.sync_page_size(session);

    let first = if kind.is_cursor_paged() { 0 } else { page };
    for n in first..=page {
        cursor.load_page(client, n).await?;
        if n < page && !cursor.has_next_page() {
            anyhow::bail!(
                "Page {} is past the end of the report ({} rows)",
                page,
                cursor.total().as_i64()
            );
        }
    }

    Ok(json!({
        "report": kind.name(),
        "label": kind.label(),
        "page": cursor.page(),
        "page_size": cursor.page_size(),
        "total": cursor.total(),
        "has_next_page": cursor.has_next_page(),
        "data": cursor.rows(),
    }))
}
