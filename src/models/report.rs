use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Account, DateRange};

/// An account whose export step failed, with the reason recorded for the run
/// summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedAccount {
    pub account: Account,
    pub reason: String,
}

/// Final report of one export run, produced at `Completed` or `Cancelled`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportReport {
    pub date_range: DateRange,
    pub completed: Vec<Account>,
    pub failed: Vec<FailedAccount>,
    /// Accounts that were never dispatched because the run was cancelled.
    pub remaining: usize,
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
}

impl ExportReport {
    /// Accounts that reached a terminal per-account state.
    pub fn processed(&self) -> usize {
        self.completed.len() + self.failed.len()
    }

    /// Total accounts the run took on, processed or not.
    pub fn total_accounts(&self) -> usize {
        self.processed() + self.remaining
    }
}

/// Compact failed-account record kept in the persisted run history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedEntry {
    pub number: String,
    pub reason: String,
}

impl std::fmt::Display for FailedEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.number, self.reason)
    }
}

/// One persisted run-history record. Created at run end, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportLogEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub date_range: DateRange,
    pub total_accounts: usize,
    pub completed: usize,
    pub failed: Vec<FailedEntry>,
    pub cancelled: bool,
    pub duration_ms: u64,
}

impl ExportLogEntry {
    pub fn from_report(report: &ExportReport) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: report.started_at,
            date_range: report.date_range.clone(),
            total_accounts: report.total_accounts(),
            completed: report.completed.len(),
            failed: report
                .failed
                .iter()
                .map(|f| FailedEntry {
                    number: f.account.number.clone(),
                    reason: f.reason.clone(),
                })
                .collect(),
            cancelled: report.cancelled,
            duration_ms: report.duration.as_millis() as u64,
        }
    }
}
