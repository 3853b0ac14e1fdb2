//! CSS selectors for the HSBCnet accounts pages.
//!
//! Hard-coded to this one portal's DOM on purpose: the tool automates a single
//! target page, so a selector abstraction layer would buy nothing.

/// The accounts list table.
pub const ACCOUNTS_TABLE: &str = "table.accounts-table";

/// Every row in the list table body: currency group headers and account rows.
pub const TABLE_BODY_ROWS: &str = "tbody.table__body tr";

pub const CURRENCY_HEADER_ROW_CLASS: &str = "table__row--title";
pub const CURRENCY_HEADER_CELL: &str = "td.presentation-unit__name";

pub const ACCOUNT_ROW_CLASS: &str = "table__row--clickable";
pub const ACCOUNT_NUMBER_CELL: &str = "td.table__cell--sorted span";
pub const ACCOUNT_TITLE_CELL: &str = "td.table__cell__at span";

/// Per-row selection checkboxes. Not every deployment renders these.
pub const ROW_CHECKBOX: &str =
    "tbody.table__body tr.table__row--clickable input[type=\"checkbox\"]";

/// Date filter inputs on the account details page.
pub const START_DATE_INPUT: &str = "#filter__startDate";
pub const END_DATE_INPUT: &str = "#filter__endDate";

/// Container that reloads when the date filter changes.
pub const TRANSACTIONS_TABLE: &str = ".account-transactions-table";

/// The page's own export control on the details view.
pub const EXPORT_TRIGGER: &str = "#export-dropdown-trigger";
pub const EXPORT_MENU: &str = "#export-dropdown";
pub const EXPORT_EXCEL_OPTION: &str = "#export-dropdown > li:nth-child(3) > span";

/// Back link from a details view to the accounts list.
pub const BACK_TO_LIST: &str = "a.detail-header__info-back";

/// Next-page control. The portal renders an anchor only while the control is
/// enabled (a span otherwise), so presence implies usability.
pub const NEXT_PAGE: &str = "a.pagination__link--arrow[aria-label=\"Go to next page\"]";
