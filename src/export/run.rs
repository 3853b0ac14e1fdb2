//! Working state for one export run.
//!
//! Owned and mutated exclusively by the orchestrator while it is `Running`;
//! constructed at run start and consumed into the final report. Between
//! iterations `completed + failed == current_index` always holds, and
//! `current_index` only moves forward, resetting solely on a page change.

use chrono::{DateTime, Utc};

use crate::accounts::Selection;
use crate::models::{Account, DateRange, FailedAccount};

#[derive(Debug)]
pub struct ExportRun {
    /// Work queue for the current page, in extraction order.
    pub accounts: Vec<Account>,
    /// Cursor into `accounts`; equal to its length once the page is done.
    pub current_index: usize,
    /// Confirmed downloads, across all pages of the run.
    pub completed: Vec<Account>,
    /// Per-account failures, across all pages of the run.
    pub failed: Vec<FailedAccount>,
    pub date_range: DateRange,
    pub is_selective: bool,
    pub started_at: DateTime<Utc>,
    /// Processed count carried over from earlier pages.
    prior_pages: usize,
}

impl ExportRun {
    pub fn new(selection: Selection, date_range: DateRange, started_at: DateTime<Utc>) -> Self {
        Self {
            accounts: selection.accounts,
            current_index: 0,
            completed: Vec::new(),
            failed: Vec::new(),
            date_range,
            is_selective: selection.is_selective,
            started_at,
            prior_pages: 0,
        }
    }

    pub fn page_exhausted(&self) -> bool {
        self.current_index >= self.accounts.len()
    }

    pub fn current_account(&self) -> Option<&Account> {
        self.accounts.get(self.current_index)
    }

    /// Accounts on the current page that were never dispatched.
    pub fn remaining_on_page(&self) -> usize {
        self.accounts.len().saturating_sub(self.current_index)
    }

    pub fn record_success(&mut self, account: Account) {
        tracing::info!(account = %account.number, "export confirmed");
        self.completed.push(account);
        self.advance();
    }

    pub fn record_failure(&mut self, account: Account, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::warn!(account = %account.number, %reason, "export failed");
        self.failed.push(FailedAccount { account, reason });
        self.advance();
    }

    fn advance(&mut self) {
        self.current_index += 1;
        debug_assert_eq!(
            self.completed.len() + self.failed.len(),
            self.prior_pages + self.current_index,
        );
    }

    /// Swap in the next page's work queue and rewind the cursor.
    pub fn begin_page(&mut self, accounts: Vec<Account>) {
        self.prior_pages += self.current_index;
        self.accounts = accounts;
        self.current_index = 0;
    }
}
