//! Scripted page fake for driving the orchestrator without a browser.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use hsbc_exporter::clock::SystemClock;
use hsbc_exporter::config::Timeouts;
use hsbc_exporter::dom::{Dom, TableRow};
use hsbc_exporter::download::{ContextSlot, DownloadAccount, DownloadEvent, DownloadEvents};
use hsbc_exporter::selectors;

/// Timeouts shrunk so failure paths resolve in milliseconds.
pub fn test_timeouts() -> Timeouts {
    Timeouts {
        login_wait: Duration::from_millis(500),
        table_wait: Duration::from_millis(500),
        details_wait: Duration::from_millis(500),
        confirm_wait: Duration::from_millis(300),
        context_ttl: Duration::from_secs(60),
        quiet_window: Duration::from_millis(10),
        settle_cap: Duration::from_millis(50),
        menu_pause: Duration::from_millis(1),
        row_settle_pause: Duration::from_millis(1),
        table_populate_pause: Duration::from_millis(1),
        excel_option_wait: Duration::from_millis(500),
    }
}

/// What the fake portal does when the Excel option is clicked.
#[derive(Debug, Clone)]
pub enum ExportBehavior {
    /// A download begins and the signal carries the pending context, the way
    /// the real download watcher reports it.
    Confirm,
    /// No download ever starts.
    Silent,
    /// A stale signal naming some other account arrives instead.
    ConfirmAs(String),
    /// Confirm, but trip the token first (cancel lands mid-flight).
    ConfirmAndCancel(CancellationToken),
}

/// One page of the accounts list.
pub struct PageSpec {
    pub rows: Vec<TableRow>,
    pub selection: Option<Vec<bool>>,
}

impl PageSpec {
    pub fn of(rows: Vec<TableRow>) -> Self {
        Self {
            rows,
            selection: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum View {
    List,
    Details(String),
}

struct FakeState {
    page_index: usize,
    view: View,
    menu_open: bool,
    mutations: u64,
    /// Account numbers in the order their exports were dispatched.
    dispatches: Vec<String>,
    /// (selector, value) pairs from date input writes.
    date_writes: Vec<(String, String)>,
}

pub struct FakeDom {
    pages: Vec<PageSpec>,
    state: Mutex<FakeState>,
    behaviors: Mutex<HashMap<String, ExportBehavior>>,
    /// Rows that still render in the table but no longer resolve to a
    /// clickable row (the page re-sorted or dropped them mid-run).
    vanished: Mutex<HashSet<String>>,
    pub slot: Arc<ContextSlot>,
    pub events: DownloadEvents,
}

impl FakeDom {
    pub fn new(pages: Vec<PageSpec>) -> Arc<Self> {
        let slot = Arc::new(ContextSlot::new(
            Duration::from_secs(60),
            Arc::new(SystemClock),
        ));
        let events = DownloadEvents::new();
        Self::with_slot(pages, slot, events)
    }

    pub fn with_slot(
        pages: Vec<PageSpec>,
        slot: Arc<ContextSlot>,
        events: DownloadEvents,
    ) -> Arc<Self> {
        Arc::new(Self {
            pages,
            state: Mutex::new(FakeState {
                page_index: 0,
                view: View::List,
                menu_open: false,
                mutations: 0,
                dispatches: Vec::new(),
                date_writes: Vec::new(),
            }),
            behaviors: Mutex::new(HashMap::new()),
            vanished: Mutex::new(HashSet::new()),
            slot,
            events,
        })
    }

    /// Make `click_account_row` stop finding this number.
    pub fn vanish_row(&self, number: &str) {
        self.vanished.lock().unwrap().insert(number.to_string());
    }

    /// Default behavior for unscripted accounts is `Confirm`.
    pub fn set_behavior(&self, number: &str, behavior: ExportBehavior) {
        self.behaviors
            .lock()
            .unwrap()
            .insert(number.to_string(), behavior);
    }

    pub fn dispatches(&self) -> Vec<String> {
        self.state.lock().unwrap().dispatches.clone()
    }

    pub fn date_writes(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().date_writes.clone()
    }

    fn handle_export_click(&self, number: String) {
        let behavior = self
            .behaviors
            .lock()
            .unwrap()
            .get(&number)
            .cloned()
            .unwrap_or(ExportBehavior::Confirm);
        self.state.lock().unwrap().dispatches.push(number);

        match behavior {
            ExportBehavior::Confirm => self.emit_started(),
            ExportBehavior::Silent => {}
            ExportBehavior::ConfirmAs(other) => {
                self.events.emit(DownloadEvent::Started {
                    account: Some(DownloadAccount {
                        number: other,
                        title: "Stale".to_string(),
                    }),
                });
            }
            ExportBehavior::ConfirmAndCancel(token) => {
                token.cancel();
                self.emit_started();
            }
        }
    }

    /// Consume the context and broadcast, the way the watcher does when it
    /// sees a matching download begin.
    fn emit_started(&self) {
        let account = self.slot.take().map(|context| DownloadAccount {
            number: context.account_number,
            title: context.account_title,
        });
        self.events.emit(DownloadEvent::Started { account });
    }

    fn current_page(&self) -> &PageSpec {
        let index = self.state.lock().unwrap().page_index;
        &self.pages[index]
    }
}

#[async_trait]
impl Dom for FakeDom {
    async fn exists(&self, selector: &str) -> Result<bool> {
        let state = self.state.lock().unwrap();
        let present = match selector {
            selectors::ACCOUNTS_TABLE => state.view == View::List,
            selectors::EXPORT_TRIGGER
            | selectors::START_DATE_INPUT
            | selectors::END_DATE_INPUT
            | selectors::BACK_TO_LIST => matches!(state.view, View::Details(_)),
            selectors::EXPORT_MENU | selectors::EXPORT_EXCEL_OPTION => state.menu_open,
            selectors::NEXT_PAGE => {
                state.view == View::List && state.page_index + 1 < self.pages.len()
            }
            _ => false,
        };
        Ok(present)
    }

    async fn text(&self, selector: &str) -> Result<Option<String>> {
        let state = self.state.lock().unwrap();
        if selector == selectors::EXPORT_MENU && state.menu_open {
            return Ok(Some("CSV PDF Excel".to_string()));
        }
        Ok(None)
    }

    async fn click(&self, selector: &str) -> Result<()> {
        let view = {
            let mut state = self.state.lock().unwrap();
            state.mutations += 1;
            match selector {
                selectors::EXPORT_TRIGGER => {
                    state.menu_open = true;
                    return Ok(());
                }
                selectors::BACK_TO_LIST => {
                    state.view = View::List;
                    state.menu_open = false;
                    return Ok(());
                }
                selectors::NEXT_PAGE => {
                    if state.page_index + 1 >= self.pages.len() {
                        anyhow::bail!("no next page");
                    }
                    state.page_index += 1;
                    return Ok(());
                }
                selectors::EXPORT_EXCEL_OPTION if state.menu_open => state.view.clone(),
                _ => anyhow::bail!("nothing to click at {selector}"),
            }
        };

        match view {
            View::Details(number) => self.handle_export_click(number),
            View::List => anyhow::bail!("export option clicked outside a details view"),
        }
        Ok(())
    }

    async fn click_by_text(&self, _selector: &str, text: &str) -> Result<bool> {
        if text != "Excel" {
            return Ok(false);
        }
        let view = {
            let state = self.state.lock().unwrap();
            if !state.menu_open {
                return Ok(false);
            }
            state.view.clone()
        };
        if let View::Details(number) = view {
            self.handle_export_click(number);
            return Ok(true);
        }
        Ok(false)
    }

    async fn set_value(&self, selector: &str, value: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.mutations += 1;
        state
            .date_writes
            .push((selector.to_string(), value.to_string()));
        Ok(())
    }

    async fn mutation_count(&self, _selector: &str) -> Result<u64> {
        Ok(self.state.lock().unwrap().mutations)
    }

    async fn account_table_rows(&self) -> Result<Vec<TableRow>> {
        Ok(self.current_page().rows.clone())
    }

    async fn selection_states(&self) -> Result<Option<Vec<bool>>> {
        Ok(self.current_page().selection.clone())
    }

    async fn click_account_row(&self, number: &str) -> Result<bool> {
        if self.vanished.lock().unwrap().contains(number) {
            return Ok(false);
        }
        let found = self.current_page().rows.iter().any(|row| {
            matches!(row, TableRow::Data { number: n, .. } if n.trim() == number)
        });
        if found {
            let mut state = self.state.lock().unwrap();
            state.view = View::Details(number.to_string());
            state.menu_open = false;
            state.mutations += 1;
        }
        Ok(found)
    }
}
