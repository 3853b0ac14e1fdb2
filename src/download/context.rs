//! The pending download-context slot.
//!
//! Exactly one context may be pending at a time: it is published immediately
//! before an export is triggered and names the download the trigger is about
//! to produce. The download side owns the slot; the orchestrator only ever
//! publishes into it and learns the outcome through the event broadcast.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::clock::Clock;
use crate::models::{Account, DateRange};

/// Correlation token linking an in-flight export to the download it will
/// produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadContext {
    pub account_number: String,
    pub account_title: String,
    pub currency: String,
    /// Filename-safe `dd-mm-yyyy`.
    pub date_from: String,
    pub date_to: String,
    pub created_at: DateTime<Utc>,
}

impl DownloadContext {
    pub fn new(account: &Account, range: &DateRange, clock: &dyn Clock) -> Self {
        Self {
            account_number: account.number.clone(),
            account_title: account.title.clone(),
            currency: account.currency.clone(),
            date_from: range.from_for_filename(),
            date_to: range.to_for_filename(),
            created_at: clock.now(),
        }
    }
}

/// Single-occupancy slot with a freshness bound.
///
/// Publishing replaces any prior occupant: an unconsumed predecessor is
/// presumed abandoned. A context that sits unconsumed for the TTL no longer
/// matches anything, so a later unrelated download cannot be misattributed.
pub struct ContextSlot {
    pending: Mutex<Option<DownloadContext>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl ContextSlot {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            pending: Mutex::new(None),
            ttl,
            clock,
        }
    }

    pub fn publish(&self, context: DownloadContext) {
        let mut pending = self.pending.lock().unwrap();
        if let Some(old) = pending.replace(context) {
            tracing::debug!(
                account = %old.account_number,
                "replaced stale download context"
            );
        }
    }

    /// The pending context, if one is set and still fresh. Does not consume.
    pub fn peek(&self) -> Option<DownloadContext> {
        let mut pending = self.pending.lock().unwrap();
        self.drop_if_expired(&mut pending);
        pending.clone()
    }

    /// Consume the pending context for a matching completed download.
    pub fn take(&self) -> Option<DownloadContext> {
        let mut pending = self.pending.lock().unwrap();
        self.drop_if_expired(&mut pending);
        pending.take()
    }

    fn drop_if_expired(&self, pending: &mut Option<DownloadContext>) {
        let Some(context) = pending.as_ref() else {
            return;
        };
        let age = self
            .clock
            .now()
            .signed_duration_since(context.created_at)
            .to_std()
            .unwrap_or_default();
        if age >= self.ttl {
            tracing::debug!(account = %context.account_number, "download context expired");
            *pending = None;
        }
    }
}
