//! Bounded waits over the page seam.
//!
//! The portal raises no events of its own when its export dropdown or a
//! date-filtered reload finishes, so every synchronization point here is
//! inferred from DOM shape or content changes and bounded by a timeout. No
//! wait in this module can block forever.
//!
//! Single-resolution and cleanup fall out of the future model: each wait is a
//! poll loop raced against `tokio::time::timeout`, so exactly one of the two
//! completes and dropping the loser cancels it. The page-side mutation
//! observers live behind [`Dom::mutation_count`] and are keyed per selector,
//! so the loops themselves hold no page state on either exit path.

use std::time::Duration;

use anyhow::Result;
use tokio::time::{sleep, Instant};

use crate::dom::Dom;
use crate::error::AutomationError;

/// Cadence for re-testing a selector after mutation activity.
const MUTATION_POLL: Duration = Duration::from_millis(200);

/// Cadence for text-state polling.
const TEXT_POLL: Duration = Duration::from_millis(500);

/// Wait for `selector` to match something.
///
/// Returns immediately when it already does; otherwise re-tests whenever
/// mutation activity is observed, and fails with
/// [`AutomationError::Timeout`] once `timeout` elapses.
pub async fn await_appearance(dom: &dyn Dom, selector: &str, timeout: Duration) -> Result<()> {
    match tokio::time::timeout(timeout, appearance_loop(dom, selector)).await {
        Ok(result) => result,
        Err(_) => Err(AutomationError::timeout(selector.to_string(), timeout).into()),
    }
}

async fn appearance_loop(dom: &dyn Dom, selector: &str) -> Result<()> {
    if dom.exists(selector).await? {
        return Ok(());
    }

    let mut last_seen = dom.mutation_count("body").await?;
    loop {
        sleep(MUTATION_POLL).await;
        let count = dom.mutation_count("body").await?;
        if count != last_seen {
            last_seen = count;
            if dom.exists(selector).await? {
                return Ok(());
            }
        }
    }
}

/// Wait for the element at `selector` to contain `needle` in its visible text.
///
/// Polls at a fixed 500ms cadence; the first check is immediate. Used to read
/// a control's label as a completion proxy when the page offers no event.
pub async fn await_text_state(
    dom: &dyn Dom,
    selector: &str,
    needle: &str,
    timeout: Duration,
) -> Result<()> {
    match tokio::time::timeout(timeout, text_state_loop(dom, selector, needle)).await {
        Ok(result) => result,
        Err(_) => Err(AutomationError::timeout(
            format!("\"{needle}\" in {selector}"),
            timeout,
        )
        .into()),
    }
}

async fn text_state_loop(dom: &dyn Dom, selector: &str, needle: &str) -> Result<()> {
    loop {
        if let Some(text) = dom.text(selector).await? {
            if text.contains(needle) {
                return Ok(());
            }
        }
        sleep(TEXT_POLL).await;
    }
}

/// Wait for mutation activity under `selector` to settle.
///
/// Resolves when (a) mutations were observed and then `quiet_window` passes
/// without another, (b) nothing mutated at all for twice the quiet window
/// (the reload was a no-op), or (c) `hard_cap` elapses. All three outcomes are
/// success: the caller only needs to know the region is done changing.
pub async fn await_quiescence(
    dom: &dyn Dom,
    selector: &str,
    quiet_window: Duration,
    hard_cap: Duration,
) -> Result<()> {
    let started = Instant::now();
    let mut last_seen = dom.mutation_count(selector).await?;
    let mut last_change = started;
    let mut has_mutated = false;

    loop {
        sleep(MUTATION_POLL).await;
        let now = Instant::now();

        let count = dom.mutation_count(selector).await?;
        if count != last_seen {
            last_seen = count;
            last_change = now;
            has_mutated = true;
        }

        if has_mutated && now.duration_since(last_change) > quiet_window {
            tracing::debug!(selector, "settled");
            return Ok(());
        }
        if !has_mutated && now.duration_since(last_change) > quiet_window * 2 {
            tracing::debug!(selector, "no changes detected");
            return Ok(());
        }
        if now.duration_since(started) >= hard_cap {
            tracing::debug!(selector, "settle wait hit hard cap");
            return Ok(());
        }
    }
}
