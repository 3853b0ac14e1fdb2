use std::time::Duration;

/// Failure modes of the page automation itself.
///
/// Per-account failures are recorded and the run moves on; only run-level
/// problems (no accounts table at all) abort a run.
#[derive(Debug, thiserror::Error)]
pub enum AutomationError {
    #[error("timed out after {timeout:?} waiting for {what}")]
    Timeout { what: String, timeout: Duration },

    #[error("{what} not found")]
    NotFound { what: String },

    #[error("cancelled")]
    Cancelled,
}

impl AutomationError {
    pub fn timeout(what: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            what: what.into(),
            timeout,
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }
}
