//! Paginated fetch cursor
//!
//! Drives one report view through its pages. The last row of every loaded
//! page is remembered so the next page can be requested with `after` set,
//! which cursor-paged backend endpoints need instead of an offset.
//!
//! Each load carries a generation number. Only the reply to the most
//! recently issued load is applied; replies that arrive after a newer load
//! was started (or after the target or page size changed) are discarded.

use crate::reports::ReportTarget;
use crate::rpc::RpcClient;
use crate::session::SessionState;
use crate::types::{Page, PagingOptions, ReportRow, Total};
use anyhow::Result;
use tracing::debug;

/// A load that has been started but not yet applied.
#[derive(Debug, Clone, PartialEq)]
pub struct PageRequest {
    pub page: usize,
    pub generation: u64,
    pub options: PagingOptions,
}

/// What happened to a finished load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Applied,
    /// A newer load superseded this one.
    Stale,
}

#[derive(Debug, Clone)]
pub struct PaginatedCursor {
    target: ReportTarget,
    page: usize,
    page_size: u64,
    last_item_per_page: Vec<Option<ReportRow>>,
    rows: Vec<ReportRow>,
    total: Total,
    loading: bool,
    error: Option<String>,
    generation: u64,
}

impl PaginatedCursor {
    pub fn new(target: ReportTarget, page_size: u64) -> Self {
        Self {
            target,
            page: 0,
            page_size: page_size.max(1),
            last_item_per_page: Vec::new(),
            rows: Vec::new(),
            total: Total::Known(0),
            loading: false,
            error: None,
            generation: 0,
        }
    }

    pub fn target(&self) -> &ReportTarget {
        &self.target
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    pub fn rows(&self) -> &[ReportRow] {
        &self.rows
    }

    pub fn total(&self) -> Total {
        self.total
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Cursor row recorded for `page`, if that page has been loaded.
    pub fn last_item(&self, page: usize) -> Option<&ReportRow> {
        self.last_item_per_page.get(page).and_then(Option::as_ref)
    }

    /// Whether a following page may exist.
    pub fn has_next_page(&self) -> bool {
        match self.total {
            Total::Unknown => true,
            Total::Known(total) => (self.page as u64)
                .checked_add(1)
                .and_then(|pages| pages.checked_mul(self.page_size))
                .is_some_and(|seen| seen < total),
        }
    }

    /// Point the view at a different report, contract or filter set.
    pub fn retarget(&mut self, target: ReportTarget) {
        if target != self.target {
            self.target = target;
            self.reset();
        }
    }

    /// Cursors computed under the old page size are meaningless under a new one.
    pub fn set_page_size(&mut self, page_size: u64) {
        let page_size = page_size.max(1);
        if page_size != self.page_size {
            debug!(old = self.page_size, new = page_size, "page size changed, dropping cursors");
            self.page_size = page_size;
            self.reset();
        }
    }

    /// Follow the shared page size held by the session.
    pub fn sync_page_size(&mut self, session: &SessionState) {
        self.set_page_size(session.page_size());
    }

    fn reset(&mut self) {
        self.page = 0;
        self.last_item_per_page.clear();
        self.rows.clear();
        self.total = Total::Known(0);
        self.loading = false;
        self.error = None;
        // Anything in flight belongs to the old view
        self.generation += 1;
    }

    /// Start loading page `page`.
    pub fn begin_load(&mut self, page: usize) -> PageRequest {
        self.generation += 1;
        self.page = page;
        self.loading = true;

        let after = match page {
            0 => None,
            n => self.last_item(n - 1).cloned(),
        };
        PageRequest {
            page,
            generation: self.generation,
            options: PagingOptions {
                page_number: page as u64,
                page_size: self.page_size,
                after,
            },
        }
    }

    /// Apply the outcome of `request`.
    ///
    /// On failure the displayed rows are cleared and the error recorded;
    /// recorded cursors and the total are left as they were.
    pub fn finish_load(&mut self, request: PageRequest, result: Result<Page>) -> Result<LoadOutcome> {
        if request.generation != self.generation {
            debug!(
                page = request.page,
                generation = request.generation,
                current = self.generation,
                "discarding stale page response"
            );
            return Ok(LoadOutcome::Stale);
        }
        self.loading = false;

        match result {
            Ok(page) => {
                if self.last_item_per_page.len() <= request.page {
                    self.last_item_per_page.resize(request.page + 1, None);
                }
                self.last_item_per_page[request.page] = page.data.last().cloned();
                self.total = page.total;
                self.rows = page.data;
                self.error = None;
                Ok(LoadOutcome::Applied)
            }
            Err(e) => {
                self.rows.clear();
                self.error = Some(format!("{:#}", e));
                Err(e)
            }
        }
    }

    /// Fetch page `page` and apply it.
    pub async fn load_page(&mut self, client: &RpcClient, page: usize) -> Result<LoadOutcome> {
        let request = self.begin_load(page);
        let result = self.target.fetch_page(client, &request.options).await;
        self.finish_load(request, result)
    }
}
