//! Command implementations: wiring between the browser session, the
//! orchestrator, the download side, persistence, and terminal output.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use crate::browser::BrowserSession;
use crate::clock::{Clock, SystemClock};
use crate::config::ResolvedConfig;
use crate::download::{run_log_path, write_run_log, ContextSlot, DownloadEvents, DownloadWatcher};
use crate::duration::format_elapsed;
use crate::export::{ExportOrchestrator, ExportOutcome, SingleExportOutcome};
use crate::history::HistoryStore;
use crate::models::{DateRange, ExportLogEntry, ExportReport};
use crate::recon::{ReconBridge, ReconOptions};
use crate::selectors;
use crate::settle;

/// Cap on error text shown inline; the persisted log keeps the full message.
const DISPLAY_ERROR_LIMIT: usize = 300;

fn resolve_range(
    from: Option<String>,
    to: Option<String>,
    default: DateRange,
) -> Result<DateRange> {
    match (from, to) {
        (None, None) => Ok(default),
        (Some(from), Some(to)) => DateRange::new(from, to),
        (Some(single), None) | (None, Some(single)) => DateRange::new(single.clone(), single),
    }
}

/// Everything a live automation command needs wired together.
struct Session {
    browser: BrowserSession,
    orchestrator: ExportOrchestrator,
    watcher_cancel: CancellationToken,
    clock: Arc<SystemClock>,
}

impl Session {
    async fn start(config: &ResolvedConfig) -> Result<Self> {
        let clock = Arc::new(SystemClock);

        let browser = BrowserSession::launch(&config.browser, &config.portal_url).await?;
        browser.stage_downloads_to(&config.staging_dir).await?;

        let slot = Arc::new(ContextSlot::new(
            config.timeouts.context_ttl,
            clock.clone() as Arc<dyn Clock>,
        ));
        let events = DownloadEvents::new();

        let watcher = DownloadWatcher::new(
            config.staging_dir.clone(),
            config.download_root.clone(),
            slot.clone(),
            events.clone(),
            clock.clone() as Arc<dyn Clock>,
        );
        let watcher_cancel = CancellationToken::new();
        let watch_token = watcher_cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = watcher.run(watch_token).await {
                tracing::error!(error = %err, "download watcher stopped");
            }
        });

        let orchestrator =
            ExportOrchestrator::new(browser.dom(), slot, events, config.timeouts.clone())
                .with_clock(clock.clone() as Arc<dyn Clock>);

        Ok(Self {
            browser,
            orchestrator,
            watcher_cancel,
            clock,
        })
    }

    async fn shutdown(self) -> Result<()> {
        self.watcher_cancel.cancel();
        self.browser.close().await
    }
}

/// A cancellation token that trips on Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trip = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("\nCancelling: the in-flight account will finish first.");
            trip.cancel();
        }
    });
    token
}

pub async fn export_all(
    config: &ResolvedConfig,
    from: Option<String>,
    to: Option<String>,
) -> Result<()> {
    let session = Session::start(config).await?;
    let range = resolve_range(from, to, DateRange::yesterday(session.clock.as_ref()))?;

    println!("Log in to the portal and open the accounts list.");
    println!("The export starts as soon as the table is visible. Ctrl-C cancels.\n");
    settle::await_appearance(
        session.browser.dom().as_ref(),
        selectors::ACCOUNTS_TABLE,
        config.timeouts.login_wait,
    )
    .await
    .context("Never saw the accounts list; is the login complete?")?;

    let cancel = cancel_on_ctrl_c();
    let outcome = session.orchestrator.export_all(range, &cancel).await?;

    match outcome {
        ExportOutcome::Report(report) => {
            render_report(&report);

            let entry = ExportLogEntry::from_report(&report);
            let log_path = run_log_path(&config.download_root, session.clock.today());
            write_run_log(&log_path, &entry).await?;
            HistoryStore::new(&config.data_dir).append(entry).await?;
            println!("Run report written to {}", log_path.display());
        }
        ExportOutcome::NothingToExport => println!("Nothing to export."),
        ExportOutcome::AlreadyRunning => println!("An export is already running."),
    }

    session.shutdown().await
}

pub async fn export_account(
    config: &ResolvedConfig,
    from: Option<String>,
    to: Option<String>,
) -> Result<()> {
    let session = Session::start(config).await?;
    let range = resolve_range(from, to, DateRange::month_to_date(session.clock.as_ref()))?;

    println!("Log in and open the account's details page.");
    println!("The export runs once the page's export control is visible.\n");

    match session.orchestrator.export_current(&range).await? {
        SingleExportOutcome::Confirmed => println!("Export confirmed: download started."),
        SingleExportOutcome::AlreadyRunning => println!("An export is already running."),
    }

    session.shutdown().await
}

fn render_report(report: &ExportReport) {
    println!("\n========== Export run ==========");
    println!("Range:     {}", report.date_range);
    println!("Completed: {}", report.completed.len());
    println!("Failed:    {}", report.failed.len());
    if report.cancelled {
        println!("Cancelled with {} account(s) remaining", report.remaining);
    }
    println!("Duration:  {}", format_elapsed(report.duration));

    for failure in &report.failed {
        println!(
            "  ✗ {} {} - {}",
            failure.account.number, failure.account.title, failure.reason
        );
    }
}

pub async fn show_history(config: &ResolvedConfig) -> Result<()> {
    let entries = HistoryStore::new(&config.data_dir).list().await?;
    if entries.is_empty() {
        println!("No exports yet.");
        return Ok(());
    }

    for entry in entries {
        let status = if entry.cancelled {
            " [cancelled]"
        } else if !entry.failed.is_empty() {
            " [with failures]"
        } else {
            ""
        };
        println!(
            "{}  {}  ✓ {}/{}  ⏱ {}{}",
            entry.timestamp.format("%d %b %H:%M"),
            entry.date_range,
            entry.completed,
            entry.total_accounts,
            format_elapsed(std::time::Duration::from_millis(entry.duration_ms)),
            status,
        );
        for failed in &entry.failed {
            println!("    ✗ {failed}");
        }
    }
    Ok(())
}

pub async fn clear_history(config: &ResolvedConfig) -> Result<()> {
    HistoryStore::new(&config.data_dir).clear().await?;
    println!("Export history cleared.");
    Ok(())
}

pub async fn recon_check(config: &ResolvedConfig) -> Result<()> {
    let bridge = ReconBridge::new(config.recon.clone(), config.bank.clone());
    let availability = bridge.check_availability().await;

    if availability.available {
        println!(
            "Reconciliation host available (version {})",
            availability.version.as_deref().unwrap_or("unknown"),
        );
        if let Some(checks) = &availability.checks {
            println!("{}", serde_json::to_string_pretty(checks)?);
        }
    } else {
        println!(
            "Reconciliation host NOT available: {}",
            availability
                .detail
                .as_deref()
                .unwrap_or("no detail provided"),
        );
    }
    Ok(())
}

pub async fn recon_run(config: &ResolvedConfig, options: ReconOptions) -> Result<()> {
    let bridge = ReconBridge::new(config.recon.clone(), config.bank.clone());
    println!("Running reconciliation; this can take a while.");
    let result = bridge.run(&options).await;

    // Full result goes to disk; the console gets the short version.
    let result_path = config.data_dir.join("last_reconciliation.json");
    if let Some(parent) = result_path.parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }
    tokio::fs::write(
        &result_path,
        serde_json::to_string_pretty(&serde_json::json!({
            "success": result.success,
            "error": &result.error,
            "errorCode": &result.error_code,
            "reply": &result.raw,
        }))?,
    )
    .await
    .with_context(|| format!("Failed to write {}", result_path.display()))?;

    if result.success {
        println!("Reconciliation succeeded.");
        if let Some(counts) = &result.reconciliation {
            println!(
                "  matched: {}  unmatched: {}",
                counts.matched.map_or("?".to_string(), |n| n.to_string()),
                counts.unmatched.map_or("?".to_string(), |n| n.to_string()),
            );
        }
    } else {
        let error = result.error.as_deref().unwrap_or("unknown error");
        println!("Reconciliation FAILED: {}", truncate_for_display(error));
        if let Some(code) = &result.error_code {
            println!("  code: {code}");
        }
        println!("  full result: {}", result_path.display());
    }
    Ok(())
}

fn truncate_for_display(text: &str) -> String {
    if text.chars().count() <= DISPLAY_ERROR_LIMIT {
        return text.to_string();
    }
    let truncated: String = text.chars().take(DISPLAY_ERROR_LIMIT).collect();
    format!("{truncated}…")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_resolve_range_defaults() {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2024, 3, 2, 8, 0, 0).unwrap());
        let range = resolve_range(None, None, DateRange::yesterday(&clock)).unwrap();
        assert_eq!(range.from, "01/03/2024");
        assert_eq!(range.to, "01/03/2024");
    }

    #[test]
    fn test_resolve_range_single_bound_covers_one_day() {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2024, 3, 2, 8, 0, 0).unwrap());
        let range = resolve_range(
            Some("15/02/2024".to_string()),
            None,
            DateRange::yesterday(&clock),
        )
        .unwrap();
        assert_eq!(range.from, "15/02/2024");
        assert_eq!(range.to, "15/02/2024");
    }

    #[test]
    fn test_truncate_for_display() {
        let short = "boom";
        assert_eq!(truncate_for_display(short), "boom");

        let long = "x".repeat(DISPLAY_ERROR_LIMIT + 10);
        let shown = truncate_for_display(&long);
        assert_eq!(shown.chars().count(), DISPLAY_ERROR_LIMIT + 1);
        assert!(shown.ends_with('…'));
    }
}
