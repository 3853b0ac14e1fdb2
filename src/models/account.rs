use anyhow::{Context, Result};
use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::clock::Clock;

/// One account as rendered on the accounts list page.
///
/// The account number is the business key: rows are always re-resolved by
/// number after navigation, never through a retained page handle. Accounts are
/// produced fresh on every table scan and are not cached beyond one scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub number: String,
    pub title: String,
    /// Currency group the row appeared under, e.g. "AED". "UNKNOWN" when the
    /// table showed no group header above the row.
    pub currency: String,
}

impl Account {
    pub fn new(
        number: impl Into<String>,
        title: impl Into<String>,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            number: number.into(),
            title: title.into(),
            currency: currency.into(),
        }
    }
}

/// Statement date range, fixed for a whole export run.
///
/// Dates are kept in the portal's own `dd/mm/yyyy` input format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: String,
    pub to: String,
}

const PORTAL_DATE_FORMAT: &str = "%d/%m/%Y";

impl DateRange {
    /// Build a range from two `dd/mm/yyyy` strings, validating both.
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Result<Self> {
        let from = from.into();
        let to = to.into();
        let start = parse_portal_date(&from)?;
        let end = parse_portal_date(&to)?;
        if end < start {
            anyhow::bail!("date range ends ({to}) before it starts ({from})");
        }
        Ok(Self { from, to })
    }

    /// Yesterday, both ends. The default for bulk exports.
    pub fn yesterday(clock: &dyn Clock) -> Self {
        let date = clock
            .today()
            .checked_sub_days(Days::new(1))
            .unwrap_or_else(|| clock.today());
        let formatted = date.format(PORTAL_DATE_FORMAT).to_string();
        Self {
            from: formatted.clone(),
            to: formatted,
        }
    }

    /// First of the current month through today. The default for a single
    /// account export.
    pub fn month_to_date(clock: &dyn Clock) -> Self {
        let today = clock.today();
        let first = today.with_day(1).unwrap_or(today);
        Self {
            from: first.format(PORTAL_DATE_FORMAT).to_string(),
            to: today.format(PORTAL_DATE_FORMAT).to_string(),
        }
    }

    /// The range in filename-safe form (`dd-mm-yyyy`).
    pub fn from_for_filename(&self) -> String {
        self.from.replace('/', "-")
    }

    pub fn to_for_filename(&self) -> String {
        self.to.replace('/', "-")
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.from == self.to {
            write!(f, "{}", self.from)
        } else {
            write!(f, "{} → {}", self.from, self.to)
        }
    }
}

fn parse_portal_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), PORTAL_DATE_FORMAT)
        .with_context(|| format!("invalid date '{s}', expected dd/mm/yyyy"))
}
