//! Final names and locations for exported statements.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use tokio::fs;

use crate::models::ExportLogEntry;

use super::DownloadContext;

/// Extension the portal's Excel export produces.
pub const EXPORT_EXTENSION: &str = "xlsx";

/// Per-run JSON report dropped next to the statements.
pub const RUN_LOG_FILENAME: &str = "HSBC_Export_Log.json";

const INVALID_FILENAME_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Replace filesystem-hostile characters with underscores, preserving spaces.
pub fn sanitize_title(title: &str) -> String {
    title
        .chars()
        .map(|c| if INVALID_FILENAME_CHARS.contains(&c) { '_' } else { c })
        .collect()
}

/// Whether a candidate filename looks like one of our exports.
pub fn is_export_download(filename: &str) -> bool {
    Path::new(&filename.to_lowercase())
        .extension()
        .is_some_and(|ext| ext == EXPORT_EXTENSION)
}

/// `Title_Number_Currency_From_TO_To.xlsx`
pub fn statement_filename(context: &DownloadContext) -> String {
    format!(
        "{}_{}_{}_{}_TO_{}.{}",
        sanitize_title(&context.account_title),
        context.account_number,
        context.currency,
        context.date_from,
        context.date_to,
        EXPORT_EXTENSION,
    )
}

/// Downloads land under one folder per calendar day of the run.
pub fn date_folder(root: &Path, today: NaiveDate) -> PathBuf {
    root.join(today.format("%Y-%m-%d").to_string())
}

pub fn statement_path(root: &Path, today: NaiveDate, context: &DownloadContext) -> PathBuf {
    date_folder(root, today).join(statement_filename(context))
}

pub fn run_log_path(root: &Path, today: NaiveDate) -> PathBuf {
    date_folder(root, today).join(RUN_LOG_FILENAME)
}

/// Write the run's JSON report into the date folder.
pub async fn write_run_log(path: &Path, entry: &ExportLogEntry) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .context("Failed to create report directory")?;
    }
    let content = serde_json::to_string_pretty(entry).context("Failed to serialize run report")?;
    fs::write(path, content)
        .await
        .with_context(|| format!("Failed to write run report to {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::models::{Account, DateRange};
    use chrono::{TimeZone, Utc};

    fn sample_context(title: &str) -> DownloadContext {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap());
        DownloadContext::new(
            &Account::new("0123456", title, "AED"),
            &DateRange::new("01/05/2024", "31/05/2024").unwrap(),
            &clock,
        )
    }

    #[test]
    fn test_sanitize_replaces_each_invalid_char() {
        assert_eq!(sanitize_title(r#"a/b\c:d*e?f"g<h>i|j"#), "a_b_c_d_e_f_g_h_i_j");
    }

    #[test]
    fn test_sanitize_preserves_spaces() {
        assert_eq!(sanitize_title("Main Operating Account"), "Main Operating Account");
    }

    #[test]
    fn test_statement_filename() {
        let context = sample_context("Ops: Main");
        assert_eq!(
            statement_filename(&context),
            "Ops_ Main_0123456_AED_01-05-2024_TO_31-05-2024.xlsx"
        );
    }

    #[test]
    fn test_is_export_download() {
        assert!(is_export_download("statement.xlsx"));
        assert!(is_export_download("STATEMENT.XLSX"));
        assert!(!is_export_download("statement.csv"));
        assert!(!is_export_download("statement.xlsx.crdownload"));
        assert!(!is_export_download("xlsx"));
    }

    #[test]
    fn test_paths_share_date_folder() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let root = Path::new("/exports");
        let context = sample_context("Acme");

        let statement = statement_path(root, today, &context);
        let log = run_log_path(root, today);

        assert_eq!(statement.parent(), log.parent());
        assert_eq!(log, Path::new("/exports/2024-06-01/HSBC_Export_Log.json"));
    }
}
