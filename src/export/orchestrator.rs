//! The export-all state machine.
//!
//! Strictly sequential by design: the portal has a single export control and
//! one set of date fields, so exactly one account is ever in flight. Each
//! account fully resolves (confirmed, failed, or timed out) before the next
//! is dispatched, and cancellation is cooperative, observed only at iteration
//! boundaries.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::broadcast;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::accounts::{extract_accounts, select_accounts};
use crate::clock::{Clock, SystemClock};
use crate::config::Timeouts;
use crate::dom::Dom;
use crate::download::{ContextSlot, DownloadContext, DownloadEvent, DownloadEvents};
use crate::error::AutomationError;
use crate::models::{Account, DateRange, ExportReport};
use crate::selectors;
use crate::settle;

use super::ExportRun;

/// Result of asking for an export run.
#[derive(Debug)]
pub enum ExportOutcome {
    Report(ExportReport),
    /// No selected accounts on the page.
    NothingToExport,
    /// Another run holds the orchestrator; the request is a no-op, not queued.
    AlreadyRunning,
}

/// Result of a single-account export on an open details page.
#[derive(Debug, PartialEq, Eq)]
pub enum SingleExportOutcome {
    Confirmed,
    AlreadyRunning,
}

pub struct ExportOrchestrator {
    dom: Arc<dyn Dom>,
    slot: Arc<ContextSlot>,
    events: DownloadEvents,
    clock: Arc<dyn Clock>,
    timeouts: Timeouts,
    running: AtomicBool,
}

impl ExportOrchestrator {
    pub fn new(
        dom: Arc<dyn Dom>,
        slot: Arc<ContextSlot>,
        events: DownloadEvents,
        timeouts: Timeouts,
    ) -> Self {
        Self {
            dom,
            slot,
            events,
            clock: Arc::new(SystemClock),
            timeouts,
            running: AtomicBool::new(false),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Export statements for every selected account on the list page,
    /// continuing across pages unless the selection was filtered.
    ///
    /// Run-level failures (the accounts list never resolves) abort early with
    /// an error; per-account failures are recorded and never abort the run.
    pub async fn export_all(
        &self,
        date_range: DateRange,
        cancel: &CancellationToken,
    ) -> Result<ExportOutcome> {
        let Some(_guard) = RunGuard::acquire(&self.running) else {
            tracing::warn!("export already running, ignoring request");
            return Ok(ExportOutcome::AlreadyRunning);
        };

        settle::await_appearance(
            self.dom.as_ref(),
            selectors::ACCOUNTS_TABLE,
            self.timeouts.table_wait,
        )
        .await?;

        let rows = self.dom.account_table_rows().await?;
        let states = self.dom.selection_states().await?;
        let selection = select_accounts(extract_accounts(&rows), states.as_deref());

        if selection.accounts.is_empty() {
            tracing::info!("nothing to export");
            return Ok(ExportOutcome::NothingToExport);
        }

        tracing::info!(
            accounts = selection.accounts.len(),
            selective = selection.is_selective,
            range = %date_range,
            "starting export run"
        );

        let mut run = ExportRun::new(selection, date_range, self.clock.now());
        let range = run.date_range.clone();
        let mut cancelled = false;

        'run: loop {
            while !run.page_exhausted() {
                if cancel.is_cancelled() {
                    cancelled = true;
                    break 'run;
                }
                let Some(account) = run.current_account().cloned() else {
                    break;
                };
                tracing::info!(
                    index = run.current_index + 1,
                    total = run.accounts.len(),
                    account = %account.number,
                    title = %account.title,
                    "exporting"
                );
                self.process_account(&mut run, account, &range).await;
            }

            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            // A filtered selection is page-scoped; walking on would widen it.
            if run.is_selective {
                break;
            }
            if !self.open_next_page(&mut run).await {
                break;
            }
        }

        let report = self.build_report(run, cancelled);
        tracing::info!(
            completed = report.completed.len(),
            failed = report.failed.len(),
            remaining = report.remaining,
            cancelled = report.cancelled,
            "export run finished"
        );
        Ok(ExportOutcome::Report(report))
    }

    /// Drive the export flow for the account whose details page is already
    /// open. No context is published, so the download keeps the portal's own
    /// filename.
    pub async fn export_current(&self, date_range: &DateRange) -> Result<SingleExportOutcome> {
        let Some(_guard) = RunGuard::acquire(&self.running) else {
            tracing::warn!("export already running, ignoring request");
            return Ok(SingleExportOutcome::AlreadyRunning);
        };

        settle::await_appearance(
            self.dom.as_ref(),
            selectors::EXPORT_TRIGGER,
            self.timeouts.details_wait,
        )
        .await?;

        let mut confirmations = self.events.subscribe();
        self.trigger_export(date_range).await?;
        self.await_confirmation(&mut confirmations, None).await?;
        Ok(SingleExportOutcome::Confirmed)
    }

    /// One full per-account iteration: resolve, export, recover, advance.
    async fn process_account(&self, run: &mut ExportRun, account: Account, range: &DateRange) {
        match self.dom.click_account_row(&account.number).await {
            // A missing row is not a navigation error: nothing moved, so no
            // recovery navigation is attempted.
            Ok(false) => run.record_failure(account, "row not found"),
            Ok(true) => {
                let result = self.drive_details_export(&account, range).await;
                match result {
                    Ok(()) => run.record_success(account),
                    Err(err) => run.record_failure(account, format!("{err:#}")),
                }
                self.recover_to_list().await;
            }
            Err(err) => {
                run.record_failure(account, format!("{err:#}"));
                self.recover_to_list().await;
            }
        }
    }

    /// Steps on the details view: publish the context, trigger the portal's
    /// export, and wait for the download signal naming this account.
    async fn drive_details_export(&self, account: &Account, range: &DateRange) -> Result<()> {
        settle::await_appearance(
            self.dom.as_ref(),
            selectors::EXPORT_TRIGGER,
            self.timeouts.details_wait,
        )
        .await?;
        sleep(self.timeouts.row_settle_pause).await;

        // Subscribe before anything can produce a signal.
        let mut confirmations = self.events.subscribe();
        self.slot
            .publish(DownloadContext::new(account, range, self.clock.as_ref()));

        self.trigger_export(range).await?;
        self.await_confirmation(&mut confirmations, Some(&account.number))
            .await
    }

    /// Set the date filter and click through the portal's export dropdown.
    async fn trigger_export(&self, range: &DateRange) -> Result<()> {
        let dom = self.dom.as_ref();

        if !dom.exists(selectors::START_DATE_INPUT).await?
            || !dom.exists(selectors::END_DATE_INPUT).await?
        {
            return Err(AutomationError::not_found("date filter inputs").into());
        }
        dom.set_value(selectors::START_DATE_INPUT, &range.from).await?;
        dom.set_value(selectors::END_DATE_INPUT, &range.to).await?;

        // The reload after a date change has no completion event of its own.
        settle::await_quiescence(
            dom,
            selectors::TRANSACTIONS_TABLE,
            self.timeouts.quiet_window,
            self.timeouts.settle_cap,
        )
        .await?;

        if !dom.exists(selectors::EXPORT_TRIGGER).await? {
            return Err(AutomationError::not_found("export control").into());
        }
        dom.click(selectors::EXPORT_TRIGGER).await?;
        sleep(self.timeouts.menu_pause).await;

        settle::await_text_state(
            dom,
            selectors::EXPORT_MENU,
            "Excel",
            self.timeouts.excel_option_wait,
        )
        .await?;
        if dom.exists(selectors::EXPORT_EXCEL_OPTION).await? {
            dom.click(selectors::EXPORT_EXCEL_OPTION).await?;
        } else if !dom.click_by_text("span", "Excel").await? {
            return Err(AutomationError::not_found("Excel export option").into());
        }

        Ok(())
    }

    /// Wait for a download-start signal. With `expected` set, only a signal
    /// carrying that account number counts; stale or out-of-order signals
    /// (a prior overlapping run, a context-free download) are ignored rather
    /// than misattributed.
    async fn await_confirmation(
        &self,
        confirmations: &mut broadcast::Receiver<DownloadEvent>,
        expected: Option<&str>,
    ) -> Result<()> {
        let wait = async {
            loop {
                match confirmations.recv().await {
                    Ok(DownloadEvent::Started { account }) => match (&account, expected) {
                        (_, None) => return Ok(()),
                        (Some(started), Some(number)) if started.number == number => {
                            return Ok(())
                        }
                        _ => {
                            tracing::warn!(
                                ?account,
                                expected,
                                "ignoring download signal for a different account"
                            );
                        }
                    },
                    Ok(DownloadEvent::Completed { .. }) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "download signals lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        anyhow::bail!("download signal channel closed")
                    }
                }
            }
        };

        match tokio::time::timeout(self.timeouts.confirm_wait, wait).await {
            Ok(result) => result,
            Err(_) => Err(AutomationError::timeout(
                "download confirmation",
                self.timeouts.confirm_wait,
            )
            .into()),
        }
    }

    /// Best-effort return to the accounts list. Failures are logged and
    /// swallowed: the export may already have succeeded, and the loop must
    /// not stall on a navigation hiccup.
    async fn recover_to_list(&self) {
        if let Err(err) = self.try_return_to_list().await {
            tracing::warn!(error = %err, "failed to return to the accounts list");
        }
    }

    async fn try_return_to_list(&self) -> Result<()> {
        if self.dom.exists(selectors::BACK_TO_LIST).await? {
            self.dom.click(selectors::BACK_TO_LIST).await?;
        }
        settle::await_appearance(
            self.dom.as_ref(),
            selectors::ACCOUNTS_TABLE,
            self.timeouts.table_wait,
        )
        .await?;
        sleep(self.timeouts.table_populate_pause).await;
        Ok(())
    }

    /// Advance to the next page if one is reachable. Any pagination problem
    /// ends the run normally rather than failing it.
    async fn open_next_page(&self, run: &mut ExportRun) -> bool {
        match self.load_next_page().await {
            Ok(Some(accounts)) => {
                tracing::info!(accounts = accounts.len(), "continuing on next page");
                run.begin_page(accounts);
                true
            }
            Ok(None) => false,
            Err(err) => {
                tracing::warn!(error = %err, "pagination failed");
                false
            }
        }
    }

    async fn load_next_page(&self) -> Result<Option<Vec<Account>>> {
        if !self.dom.exists(selectors::NEXT_PAGE).await? {
            return Ok(None);
        }
        self.dom.click(selectors::NEXT_PAGE).await?;
        settle::await_appearance(
            self.dom.as_ref(),
            selectors::ACCOUNTS_TABLE,
            self.timeouts.table_wait,
        )
        .await?;
        sleep(self.timeouts.table_populate_pause).await;

        let rows = self.dom.account_table_rows().await?;
        let accounts = extract_accounts(&rows);
        Ok((!accounts.is_empty()).then_some(accounts))
    }

    fn build_report(&self, run: ExportRun, cancelled: bool) -> ExportReport {
        let duration = self
            .clock
            .now()
            .signed_duration_since(run.started_at)
            .to_std()
            .unwrap_or_default();
        ExportReport {
            remaining: if cancelled { run.remaining_on_page() } else { 0 },
            date_range: run.date_range,
            completed: run.completed,
            failed: run.failed,
            cancelled,
            started_at: run.started_at,
            duration,
        }
    }
}

/// Clears the running flag on every exit path, so at most one run object can
/// exist at a time.
struct RunGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
            .then_some(Self { flag })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}
