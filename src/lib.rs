//! Quorum reports - client for a blockchain reporting engine
//!
//! Report catalog, paginated fetching, storage-diff reports, contract
//! registry calls and a connectivity monitor over the engine's JSON-RPC API.

pub mod cli;
pub mod config;
pub mod contracts;
pub mod cursor;
pub mod monitor;
pub mod reports;
pub mod rpc;
pub mod session;
pub mod storage_diff;
pub mod types;

// Re-export the main types for convenience
pub use cursor::{LoadOutcome, PageRequest, PaginatedCursor};
pub use reports::{ReportKind, ReportParams, ReportTarget};
pub use rpc::{RpcClient, RpcTransport};
pub use session::{SessionState, SharedSession};
pub use types::{Page, PagingOptions, ReportRow, Total};
