//! Configuration and contract list loading
//!
//! Settings come from an optional TOML file; missing keys fall back to
//! the defaults below. Contract lists for bulk registration hold one
//! address per line.

use crate::rpc::DEFAULT_RPC_URL;
use crate::types::parse_address;
use alloy_primitives::Address;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Rows per page when nothing else is configured.
pub const DEFAULT_PAGE_SIZE: u64 = 25;

/// Connectivity poll period in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "REPORTS_CONFIG";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct Config {
    pub rpc_endpoint: String,
    pub page_size: u64,
    pub poll_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc_endpoint: DEFAULT_RPC_URL.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl Config {
    /// Load from `path`, else from `$REPORTS_CONFIG`, else defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));

        let config = match path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&contents).with_context(|| format!("Invalid config file: {:?}", path))
    }

    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            anyhow::bail!("page_size must be greater than zero");
        }
        if self.rpc_endpoint.trim().is_empty() {
            anyhow::bail!("rpc_endpoint must not be empty");
        }
        Ok(())
    }
}

/// Load a contract list from a file.
///
/// Each line should contain one contract address in hex format (with or without 0x prefix).
/// Empty lines and lines starting with '#' are ignored.
pub fn load_contract_list(path: &Path) -> Result<Vec<Address>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read contract list file: {:?}", path))?;

    let mut addresses = Vec::new();
    for (line_num, line) in contents.lines().enumerate() {
        let line = line.trim();

        // Skip empty lines and comments
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let addr = parse_address(line)
            .with_context(|| format!("Invalid address on line {}: {}", line_num + 1, line))?;

        addresses.push(addr);
    }

    if addresses.is_empty() {
        anyhow::bail!("Contract list is empty (no valid addresses found)");
    }

    Ok(addresses)
}
