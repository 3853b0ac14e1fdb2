//! Reading the accounts list: table extraction and the selection layer.

use crate::dom::TableRow;
use crate::models::Account;

/// Currency assigned to rows that appear before any group header.
pub const UNKNOWN_CURRENCY: &str = "UNKNOWN";

/// Fold raw table rows into accounts, top to bottom.
///
/// Currency group headers update an accumulator (first whitespace-delimited
/// token of the header text) and contribute no account. Data rows with an
/// empty number or title after trimming are decorative or malformed and are
/// skipped silently.
pub fn extract_accounts(rows: &[TableRow]) -> Vec<Account> {
    let mut current_currency = UNKNOWN_CURRENCY.to_string();
    let mut accounts = Vec::new();

    for row in rows {
        match row {
            TableRow::CurrencyHeader { text } => {
                if let Some(code) = text.split_whitespace().next() {
                    current_currency = code.to_string();
                }
            }
            TableRow::Data { number, title } => {
                let number = number.trim();
                let title = title.trim();
                if number.is_empty() || title.is_empty() {
                    continue;
                }
                accounts.push(Account::new(number, title, current_currency.clone()));
            }
        }
    }

    accounts
}

/// The accounts a run will process, with the pagination-governing flag.
#[derive(Debug, Clone)]
pub struct Selection {
    pub accounts: Vec<Account>,
    /// True iff the user deselected at least one account on this page. A
    /// selective run never paginates: the filter is page-scoped, and walking
    /// onto unfiltered pages would silently widen it.
    pub is_selective: bool,
}

/// Apply checkbox state to the extracted accounts.
///
/// Selection is opt-in UI: with no controls on the page (`states` is `None`)
/// everything is selected. Otherwise the i-th control gates the i-th account;
/// accounts beyond the rendered controls are left selected.
pub fn select_accounts(accounts: Vec<Account>, states: Option<&[bool]>) -> Selection {
    let Some(states) = states else {
        return Selection {
            accounts,
            is_selective: false,
        };
    };

    let total = accounts.len();
    let selected: Vec<Account> = accounts
        .into_iter()
        .enumerate()
        .filter(|(i, _)| states.get(*i).copied().unwrap_or(true))
        .map(|(_, account)| account)
        .collect();

    Selection {
        is_selective: selected.len() < total,
        accounts: selected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::TableRow;

    #[test]
    fn test_extract_groups_by_currency_header() {
        let rows = vec![
            TableRow::header("AED (UAE Dirham)"),
            TableRow::data("010", "X"),
            TableRow::header("USD (US Dollar)"),
            TableRow::data("011", "Y"),
        ];
        let accounts = extract_accounts(&rows);
        assert_eq!(
            accounts,
            vec![
                Account::new("010", "X", "AED"),
                Account::new("011", "Y", "USD"),
            ]
        );
    }

    #[test]
    fn test_extract_skips_malformed_rows() {
        let rows = vec![
            TableRow::header("AED (UAE Dirham)"),
            TableRow::data("010", "X"),
            TableRow::data("", "Y"),
            TableRow::data("012", "   "),
        ];
        let accounts = extract_accounts(&rows);
        assert_eq!(accounts, vec![Account::new("010", "X", "AED")]);
    }

    #[test]
    fn test_extract_without_header_uses_sentinel() {
        let rows = vec![TableRow::data(" 001 ", " Acme ")];
        let accounts = extract_accounts(&rows);
        assert_eq!(accounts, vec![Account::new("001", "Acme", UNKNOWN_CURRENCY)]);
    }

    #[test]
    fn test_extract_empty_header_keeps_previous_currency() {
        let rows = vec![
            TableRow::header("EUR (Euro)"),
            TableRow::header("   "),
            TableRow::data("001", "Acme"),
        ];
        let accounts = extract_accounts(&rows);
        assert_eq!(accounts[0].currency, "EUR");
    }

    #[test]
    fn test_no_selection_controls_selects_all() {
        let accounts = vec![
            Account::new("001", "Acme", "USD"),
            Account::new("002", "Beta", "USD"),
        ];
        let selection = select_accounts(accounts.clone(), None);
        assert_eq!(selection.accounts, accounts);
        assert!(!selection.is_selective);
    }

    #[test]
    fn test_positional_selection() {
        let accounts = vec![
            Account::new("001", "Acme", "USD"),
            Account::new("002", "Beta", "USD"),
            Account::new("003", "Gamma", "EUR"),
        ];
        let selection = select_accounts(accounts, Some(&[true, false, true]));
        assert_eq!(selection.accounts.len(), 2);
        assert_eq!(selection.accounts[0].number, "001");
        assert_eq!(selection.accounts[1].number, "003");
        assert!(selection.is_selective);
    }

    #[test]
    fn test_all_checked_is_not_selective() {
        let accounts = vec![
            Account::new("001", "Acme", "USD"),
            Account::new("002", "Beta", "USD"),
        ];
        let selection = select_accounts(accounts, Some(&[true, true]));
        assert_eq!(selection.accounts.len(), 2);
        assert!(!selection.is_selective);
    }

    #[test]
    fn test_accounts_past_rendered_controls_stay_selected() {
        let accounts = vec![
            Account::new("001", "Acme", "USD"),
            Account::new("002", "Beta", "USD"),
        ];
        let selection = select_accounts(accounts, Some(&[false]));
        assert_eq!(selection.accounts.len(), 1);
        assert_eq!(selection.accounts[0].number, "002");
        assert!(selection.is_selective);
    }
}
