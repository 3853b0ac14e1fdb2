mod context;
mod events;
mod path;
mod watcher;

pub use context::{ContextSlot, DownloadContext};
pub use events::{DownloadAccount, DownloadEvent, DownloadEvents};
pub use path::{
    date_folder, is_export_download, run_log_path, sanitize_title, statement_filename,
    statement_path, write_run_log, EXPORT_EXTENSION, RUN_LOG_FILENAME,
};
pub use watcher::DownloadWatcher;
