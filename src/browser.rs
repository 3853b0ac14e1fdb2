//! Browser session management and the CDP-backed page seam.
//!
//! The portal requires an interactive login (password + 2FA), so the browser
//! is launched headful and the tool waits until the user has reached the
//! accounts list before any automation starts.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::{
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::Page;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;

use crate::config::BrowserSettings;
use crate::dom::{Dom, TableRow};
use crate::selectors;

/// Find a Chrome/Chromium executable.
fn find_chrome() -> Option<PathBuf> {
    for name in ["google-chrome", "chromium"] {
        if let Ok(output) = std::process::Command::new("which").arg(name).output() {
            if output.status.success() {
                let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !path.is_empty() {
                    return Some(PathBuf::from(path));
                }
            }
        }
    }

    let candidates = [
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/snap/bin/chromium",
        // NixOS
        "/run/current-system/sw/bin/google-chrome",
        "/run/current-system/sw/bin/chromium",
        // macOS
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
    ];
    candidates
        .iter()
        .map(PathBuf::from)
        .find(|candidate| candidate.exists())
}

/// A running browser with one portal page.
pub struct BrowserSession {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
}

impl BrowserSession {
    /// Launch the browser and open the portal entry page.
    pub async fn launch(settings: &BrowserSettings, portal_url: &str) -> Result<Self> {
        let chrome = match &settings.chrome_path {
            Some(path) => path.clone(),
            None => find_chrome()
                .context("Chrome/Chromium not found. Install it or set browser.chrome_path")?,
        };
        tracing::info!(browser = %chrome.display(), "launching browser");

        let mut config = BrowserConfig::builder()
            .chrome_executable(chrome)
            .viewport(None)
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-infobars")
            .arg("--no-first-run")
            .arg("--no-default-browser-check");
        if !settings.headless {
            config = config.with_head();
        }
        let config = config
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to configure browser: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("Failed to launch browser")?;
        let handler = tokio::spawn(async move { while (handler.next().await).is_some() {} });

        let page = browser
            .new_page(portal_url)
            .await
            .context("Failed to open portal page")?;

        Ok(Self {
            browser,
            page,
            handler,
        })
    }

    /// Point the browser's downloads at the staging directory.
    pub async fn stage_downloads_to(&self, staging_dir: &std::path::Path) -> Result<()> {
        std::fs::create_dir_all(staging_dir)
            .context("Failed to create staging directory")?;

        let params = SetDownloadBehaviorParams::builder()
            .behavior(SetDownloadBehaviorBehavior::Allow)
            .download_path(staging_dir.display().to_string())
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build download params: {e}"))?;
        self.page.execute(params).await?;

        tracing::debug!(dir = %staging_dir.display(), "downloads staged");
        Ok(())
    }

    pub fn dom(&self) -> Arc<dyn Dom> {
        Arc::new(CdpDom::new(self.page.clone()))
    }

    pub async fn close(mut self) -> Result<()> {
        self.browser.close().await.ok();
        self.handler.abort();
        Ok(())
    }
}

/// Production [`Dom`]: every operation is a JavaScript evaluation against the
/// live page, so nothing survives a navigation.
pub struct CdpDom {
    page: Page,
}

impl CdpDom {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    async fn eval<T: DeserializeOwned>(&self, script: String) -> Result<T> {
        let result = self
            .page
            .evaluate(script)
            .await
            .context("Script evaluation failed")?;
        result.into_value().context("Unexpected script result")
    }

    fn quote(s: &str) -> String {
        serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
    }
}

/// Shape of one scanned table row as the in-page script reports it.
#[derive(Debug, serde::Deserialize)]
struct RawRow {
    kind: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    number: String,
    #[serde(default)]
    title: String,
}

#[async_trait]
impl Dom for CdpDom {
    async fn exists(&self, selector: &str) -> Result<bool> {
        let sel = Self::quote(selector);
        self.eval(format!("document.querySelector({sel}) !== null"))
            .await
    }

    async fn text(&self, selector: &str) -> Result<Option<String>> {
        let sel = Self::quote(selector);
        self.eval(format!(
            "(() => {{ const el = document.querySelector({sel}); \
             return el ? el.textContent : null; }})()"
        ))
        .await
    }

    async fn click(&self, selector: &str) -> Result<()> {
        let sel = Self::quote(selector);
        let clicked: bool = self
            .eval(format!(
                "(() => {{ const el = document.querySelector({sel}); \
                 if (!el) return false; el.click(); return true; }})()"
            ))
            .await?;
        if !clicked {
            anyhow::bail!("nothing to click at {selector}");
        }
        Ok(())
    }

    async fn click_by_text(&self, selector: &str, text: &str) -> Result<bool> {
        let sel = Self::quote(selector);
        let needle = Self::quote(text);
        self.eval(format!(
            "(() => {{ \
               for (const el of document.querySelectorAll({sel})) {{ \
                 if (el.textContent.trim() === {needle} && el.offsetParent !== null) {{ \
                   el.click(); return true; \
                 }} \
               }} \
               return false; \
             }})()"
        ))
        .await
    }

    async fn set_value(&self, selector: &str, value: &str) -> Result<()> {
        let sel = Self::quote(selector);
        let val = Self::quote(value);
        // Go through the prototype setter and fire the events the page's
        // framework listens for. The site may reformat the value afterwards;
        // its formatter is trusted.
        let set: bool = self
            .eval(format!(
                "(() => {{ \
                   const el = document.querySelector({sel}); \
                   if (!el) return false; \
                   const proto = Object.getPrototypeOf(el); \
                   const setter = Object.getOwnPropertyDescriptor(proto, 'value')?.set; \
                   if (setter) {{ setter.call(el, {val}); }} else {{ el.value = {val}; }} \
                   el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
                   el.dispatchEvent(new Event('change', {{ bubbles: true }})); \
                   el.dispatchEvent(new Event('blur', {{ bubbles: true }})); \
                   el.dispatchEvent(new KeyboardEvent('keydown', \
                     {{ key: 'Enter', code: 'Enter', bubbles: true }})); \
                   return true; \
                 }})()"
            ))
            .await?;
        if !set {
            anyhow::bail!("no input at {selector}");
        }
        Ok(())
    }

    async fn mutation_count(&self, selector: &str) -> Result<u64> {
        let sel = Self::quote(selector);
        // One persistent observer per selector, installed on first use and
        // keyed on the window so it survives across calls.
        self.eval(format!(
            "(() => {{ \
               const key = {sel}; \
               window.__exportWatch = window.__exportWatch || {{}}; \
               let watch = window.__exportWatch[key]; \
               if (!watch) {{ \
                 const target = document.querySelector(key) || document.body; \
                 watch = {{ count: 0 }}; \
                 new MutationObserver(() => {{ watch.count += 1; }}) \
                   .observe(target, {{ childList: true, subtree: true }}); \
                 window.__exportWatch[key] = watch; \
               }} \
               return watch.count; \
             }})()"
        ))
        .await
    }

    async fn account_table_rows(&self) -> Result<Vec<TableRow>> {
        let rows_sel = Self::quote(selectors::TABLE_BODY_ROWS);
        let header_class = Self::quote(selectors::CURRENCY_HEADER_ROW_CLASS);
        let header_cell = Self::quote(selectors::CURRENCY_HEADER_CELL);
        let row_class = Self::quote(selectors::ACCOUNT_ROW_CLASS);
        let number_cell = Self::quote(selectors::ACCOUNT_NUMBER_CELL);
        let title_cell = Self::quote(selectors::ACCOUNT_TITLE_CELL);

        let raw: Vec<RawRow> = self
            .eval(format!(
                "(() => {{ \
                   const rows = []; \
                   for (const row of document.querySelectorAll({rows_sel})) {{ \
                     if (row.classList.contains({header_class})) {{ \
                       const cell = row.querySelector({header_cell}); \
                       rows.push({{ kind: 'header', text: cell ? cell.textContent : '' }}); \
                     }} else if (row.classList.contains({row_class})) {{ \
                       const number = row.querySelector({number_cell}); \
                       const title = row.querySelector({title_cell}); \
                       rows.push({{ kind: 'data', \
                         number: number ? number.textContent : '', \
                         title: title ? title.textContent : '' }}); \
                     }} \
                   }} \
                   return rows; \
                 }})()"
            ))
            .await?;

        Ok(raw
            .into_iter()
            .map(|row| match row.kind.as_str() {
                "header" => TableRow::CurrencyHeader { text: row.text },
                _ => TableRow::Data {
                    number: row.number,
                    title: row.title,
                },
            })
            .collect())
    }

    async fn selection_states(&self) -> Result<Option<Vec<bool>>> {
        let sel = Self::quote(selectors::ROW_CHECKBOX);
        self.eval(format!(
            "(() => {{ \
               const boxes = document.querySelectorAll({sel}); \
               if (boxes.length === 0) return null; \
               return Array.from(boxes, b => b.checked); \
             }})()"
        ))
        .await
    }

    async fn click_account_row(&self, number: &str) -> Result<bool> {
        let rows_sel = Self::quote(selectors::TABLE_BODY_ROWS);
        let row_class = Self::quote(selectors::ACCOUNT_ROW_CLASS);
        let number_cell = Self::quote(selectors::ACCOUNT_NUMBER_CELL);
        let needle = Self::quote(number);

        self.eval(format!(
            "(() => {{ \
               for (const row of document.querySelectorAll({rows_sel})) {{ \
                 if (!row.classList.contains({row_class})) continue; \
                 const cell = row.querySelector({number_cell}); \
                 if (cell && cell.textContent.trim() === {needle}) {{ \
                   row.click(); return true; \
                 }} \
               }} \
               return false; \
             }})()"
        ))
        .await
    }
}
