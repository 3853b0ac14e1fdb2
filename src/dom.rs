use anyhow::Result;
use async_trait::async_trait;

/// A raw row scanned from the accounts table, before extraction rules apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableRow {
    /// A currency group header, e.g. "AED (UAE Dirham)".
    CurrencyHeader { text: String },
    /// A clickable account row. Fields are untrimmed cell text.
    Data { number: String, title: String },
}

impl TableRow {
    pub fn header(text: impl Into<String>) -> Self {
        Self::CurrencyHeader { text: text.into() }
    }

    pub fn data(number: impl Into<String>, title: impl Into<String>) -> Self {
        Self::Data {
            number: number.into(),
            title: title.into(),
        }
    }
}

/// Seam to the rendered portal page.
///
/// The production implementation evaluates JavaScript in the live page over
/// CDP; tests drive a scripted fake. No method hands out an element handle:
/// navigation invalidates the underlying nodes, so every operation re-queries
/// the document at call time.
#[async_trait]
pub trait Dom: Send + Sync {
    /// Whether the selector currently matches anything.
    async fn exists(&self, selector: &str) -> Result<bool>;

    /// Visible text of the first match, or `None` when absent.
    async fn text(&self, selector: &str) -> Result<Option<String>>;

    async fn click(&self, selector: &str) -> Result<()>;

    /// Click the first visible element matching `selector` whose trimmed text
    /// equals `text`. Returns false when nothing matched.
    async fn click_by_text(&self, selector: &str, text: &str) -> Result<bool>;

    /// Set an input's value the way the page expects it (through the native
    /// value setter, followed by input/change events).
    async fn set_value(&self, selector: &str, value: &str) -> Result<()>;

    /// Monotonic count of mutations observed under the subtree matched by
    /// `selector` (falling back to the document body when it matches nothing).
    async fn mutation_count(&self, selector: &str) -> Result<u64>;

    /// Scan the accounts table in document order.
    async fn account_table_rows(&self) -> Result<Vec<TableRow>>;

    /// Positional checked-states of the per-row selection checkboxes, or
    /// `None` when the page renders no selection controls at all.
    async fn selection_states(&self) -> Result<Option<Vec<bool>>>;

    /// Re-resolve the row whose number cell matches `number` and activate it.
    /// Returns false when no such row exists on the current page.
    async fn click_account_row(&self, number: &str) -> Result<bool>;
}
