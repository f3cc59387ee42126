//! Session state
//!
//! Connection status, selected endpoint, last seen block, shared page size
//! and the registered contracts. Owned by the application and handed to
//! whatever needs it; every change goes through an update method.

use crate::config::Config;
use crate::types::ContractInfo;
use alloy_primitives::Address;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Session state shared between tasks.
pub type SharedSession = Arc<RwLock<SessionState>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    rpc_endpoint: String,
    is_connected: bool,
    last_persisted_block: Option<u64>,
    page_size: u64,
    contracts: Vec<ContractInfo>,
    selected_contract: Option<Address>,
}

impl SessionState {
    pub fn new(config: &Config) -> Self {
        Self {
            rpc_endpoint: config.rpc_endpoint.clone(),
            is_connected: false,
            last_persisted_block: None,
            page_size: config.page_size,
            contracts: Vec::new(),
            selected_contract: None,
        }
    }

    pub fn shared(self) -> SharedSession {
        Arc::new(RwLock::new(self))
    }

    pub fn rpc_endpoint(&self) -> &str {
        &self.rpc_endpoint
    }

    pub fn is_connected(&self) -> bool {
        self.is_connected
    }

    pub fn last_persisted_block(&self) -> Option<u64> {
        self.last_persisted_block
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    pub fn contracts(&self) -> &[ContractInfo] {
        &self.contracts
    }

    pub fn selected_contract(&self) -> Option<&ContractInfo> {
        let selected = self.selected_contract?;
        self.contracts.iter().find(|c| c.address == selected)
    }

    pub fn connect(&mut self) {
        if !self.is_connected {
            info!(endpoint = %self.rpc_endpoint, "connected to reporting engine");
        }
        self.is_connected = true;
    }

    pub fn disconnect(&mut self) {
        if self.is_connected {
            info!(endpoint = %self.rpc_endpoint, "lost connection to reporting engine");
        }
        self.is_connected = false;
    }

    /// Switch endpoints; connection state starts over.
    pub fn set_endpoint(&mut self, endpoint: String) {
        self.rpc_endpoint = endpoint;
        self.is_connected = false;
        self.last_persisted_block = None;
    }

    pub fn set_last_persisted_block(&mut self, block: Option<u64>) {
        self.last_persisted_block = block;
    }

    /// Change the shared page size. Zero is ignored.
    ///
    /// Views compare against this value before each load and drop their
    /// cursors when it moved.
    pub fn set_page_size(&mut self, page_size: u64) {
        if page_size > 0 {
            self.page_size = page_size;
        }
    }

    pub fn set_contracts(&mut self, contracts: Vec<ContractInfo>) {
        if let Some(selected) = self.selected_contract {
            if !contracts.iter().any(|c| c.address == selected) {
                self.selected_contract = None;
            }
        }
        self.contracts = contracts;
    }

    pub fn select_contract(&mut self, address: Option<Address>) {
        self.selected_contract = address;
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new(&Config::default())
    }
}
