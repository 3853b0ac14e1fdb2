mod support;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;

use hsbc_exporter::dom::{Dom, TableRow};
use hsbc_exporter::selectors;
use hsbc_exporter::settle;

use support::{FakeDom, PageSpec};

fn single_page_dom() -> Arc<FakeDom> {
    FakeDom::new(vec![PageSpec::of(vec![TableRow::data("001", "Acme")])])
}

#[tokio::test]
async fn appearance_resolves_immediately_when_present() -> Result<()> {
    let dom = single_page_dom();
    let started = Instant::now();
    settle::await_appearance(
        dom.as_ref(),
        selectors::ACCOUNTS_TABLE,
        Duration::from_secs(5),
    )
    .await?;
    assert!(started.elapsed() < Duration::from_millis(100));
    Ok(())
}

#[tokio::test]
async fn appearance_times_out_when_absent() {
    let dom = single_page_dom();
    let result = settle::await_appearance(
        dom.as_ref(),
        selectors::EXPORT_MENU,
        Duration::from_millis(150),
    )
    .await;

    let err = result.expect_err("menu never appears on the list view");
    assert!(err.to_string().contains("timed out"), "got: {err}");
}

#[tokio::test]
async fn appearance_resolves_when_the_element_arrives() -> Result<()> {
    let dom = single_page_dom();
    // Navigate away so the list table is gone, then let it come back from a
    // background task the way a page navigation would.
    assert!(dom.click_account_row("001").await?);
    assert!(!dom.exists(selectors::ACCOUNTS_TABLE).await?);

    let back = dom.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        back.click(selectors::BACK_TO_LIST).await.ok();
    });

    settle::await_appearance(
        dom.as_ref(),
        selectors::ACCOUNTS_TABLE,
        Duration::from_secs(5),
    )
    .await?;
    assert!(dom.exists(selectors::ACCOUNTS_TABLE).await?);
    Ok(())
}

#[tokio::test]
async fn text_state_sees_the_label() -> Result<()> {
    let dom = single_page_dom();
    assert!(dom.click_account_row("001").await?);
    dom.click(selectors::EXPORT_TRIGGER).await?;

    settle::await_text_state(
        dom.as_ref(),
        selectors::EXPORT_MENU,
        "Excel",
        Duration::from_secs(1),
    )
    .await
}

#[tokio::test]
async fn text_state_times_out_without_the_label() {
    let dom = single_page_dom();
    let result = settle::await_text_state(
        dom.as_ref(),
        selectors::EXPORT_MENU,
        "Excel",
        Duration::from_millis(150),
    )
    .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn quiescence_with_no_activity_resolves() -> Result<()> {
    let dom = single_page_dom();
    // Nothing mutates: the no-change grace period applies and this still
    // succeeds, never errors.
    settle::await_quiescence(
        dom.as_ref(),
        selectors::TRANSACTIONS_TABLE,
        Duration::from_millis(10),
        Duration::from_secs(2),
    )
    .await
}

#[tokio::test]
async fn quiescence_under_constant_churn_hits_the_hard_cap() -> Result<()> {
    let dom = single_page_dom();
    let churn = dom.clone();
    let writer = tokio::spawn(async move {
        // Keep mutating well past the hard cap.
        for _ in 0..40 {
            churn
                .set_value(selectors::START_DATE_INPUT, "01/01/2024")
                .await
                .ok();
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    });

    let started = Instant::now();
    settle::await_quiescence(
        dom.as_ref(),
        selectors::TRANSACTIONS_TABLE,
        Duration::from_millis(400),
        Duration::from_millis(800),
    )
    .await?;
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(700), "returned too early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(2), "hard cap ignored: {elapsed:?}");

    writer.abort();
    Ok(())
}

#[tokio::test]
async fn quiescence_settles_after_activity_stops() -> Result<()> {
    let dom = single_page_dom();
    let churn = dom.clone();
    tokio::spawn(async move {
        for _ in 0..3 {
            churn
                .set_value(selectors::START_DATE_INPUT, "01/01/2024")
                .await
                .ok();
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    });

    let started = Instant::now();
    settle::await_quiescence(
        dom.as_ref(),
        selectors::TRANSACTIONS_TABLE,
        Duration::from_millis(300),
        Duration::from_secs(10),
    )
    .await?;
    // Resolved long before the hard cap: the churn stopped and the quiet
    // window elapsed.
    assert!(started.elapsed() < Duration::from_secs(5));
    Ok(())
}
