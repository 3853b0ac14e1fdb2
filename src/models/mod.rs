mod account;
mod report;

pub use account::{Account, DateRange};
pub use report::{ExportLogEntry, ExportReport, FailedAccount, FailedEntry};
