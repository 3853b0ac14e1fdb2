//! Bridge to the external reconciliation host.
//!
//! The host is an opaque process speaking the Chrome native-messaging framing
//! on stdin/stdout: it reads one command, replies once, and exits. Every
//! failure mode here maps to a structured result for the caller; the bridge
//! never throws at the UI. One invocation at a time is the caller's
//! responsibility; the bridge itself does not serialize calls.

mod protocol;

pub use protocol::{read_message, write_message};

use std::process::Stdio;
use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Value};
use tokio::process::Command;

use crate::config::ReconSettings;

/// Why an invocation never produced a reply.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("reconciliation host is not configured")]
    NotConfigured,

    #[error("failed to start reconciliation host: {0}")]
    Unavailable(String),

    #[error("reconciliation host disconnected before replying")]
    Disconnected,

    #[error("reconciliation host timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to talk to reconciliation host: {0}")]
    Io(String),
}

impl HostError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotConfigured => "HOST_NOT_CONFIGURED",
            Self::Unavailable(_) => "HOST_UNAVAILABLE",
            Self::Disconnected => "HOST_DISCONNECTED",
            Self::Timeout(_) => "HOST_TIMEOUT",
            Self::Io(_) => "HOST_IO_ERROR",
        }
    }
}

/// Outcome of the availability probe. Never an error: any way the probe can
/// go wrong is just "not available".
#[derive(Debug, Clone)]
pub struct Availability {
    pub available: bool,
    pub version: Option<String>,
    /// Host self-checks, passed through verbatim.
    pub checks: Option<Value>,
    /// Why the host is unavailable, when it is.
    pub detail: Option<String>,
}

/// Flags passed through to the host's reconciliation engine.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconOptions {
    pub skip_cashbook: bool,
    pub skip_distribution: bool,
    pub skip_bnp_distribution: bool,
    pub force_reconsolidate: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub month: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
}

/// Match/failure counts under the reply's `steps.reconciliation` path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconCounts {
    pub matched: Option<i64>,
    pub unmatched: Option<i64>,
}

/// Structured reconciliation result. The reply is otherwise opaque: only
/// `success`, `error`/`errorCode`, and the step counts are contractually read,
/// with the full reply kept in `raw` for the persisted log.
#[derive(Debug, Clone)]
pub struct ReconResult {
    pub success: bool,
    pub error: Option<String>,
    pub error_code: Option<String>,
    pub reconciliation: Option<ReconCounts>,
    pub raw: Value,
}

impl ReconResult {
    fn from_reply(raw: Value) -> Self {
        let success = raw.get("success").and_then(Value::as_bool).unwrap_or(false);
        let error = raw
            .get("error")
            .and_then(Value::as_str)
            .map(str::to_owned);
        let error_code = raw
            .get("errorCode")
            .and_then(Value::as_str)
            .map(str::to_owned);
        let reconciliation = raw.pointer("/steps/reconciliation").map(|step| ReconCounts {
            matched: step
                .get("matched")
                .or_else(|| step.get("matches"))
                .and_then(Value::as_i64),
            unmatched: step
                .get("unmatched")
                .or_else(|| step.get("failures"))
                .and_then(Value::as_i64),
        });

        Self {
            success,
            error,
            error_code,
            reconciliation,
            raw,
        }
    }

    fn from_failure(failure: HostError) -> Self {
        Self {
            success: false,
            error: Some(failure.to_string()),
            error_code: Some(failure.code().to_string()),
            reconciliation: None,
            raw: Value::Null,
        }
    }
}

pub struct ReconBridge {
    settings: ReconSettings,
    bank: String,
}

impl ReconBridge {
    pub fn new(settings: ReconSettings, bank: String) -> Self {
        Self { settings, bank }
    }

    /// Lightweight health probe with a short deadline.
    pub async fn check_availability(&self) -> Availability {
        match self
            .invoke(json!({"command": "ping"}), self.settings.ping_timeout)
            .await
        {
            Ok(reply) => Availability {
                available: reply
                    .get("success")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
                version: reply
                    .get("version")
                    .and_then(Value::as_str)
                    .map(str::to_owned),
                checks: reply.get("checks").cloned(),
                detail: reply
                    .get("error")
                    .or_else(|| reply.get("message"))
                    .and_then(Value::as_str)
                    .map(str::to_owned),
            },
            Err(failure) => {
                tracing::debug!(error = %failure, "reconciliation host unavailable");
                Availability {
                    available: false,
                    version: None,
                    checks: None,
                    detail: Some(failure.to_string()),
                }
            }
        }
    }

    /// Run reconciliation. Long timeout: this is a genuinely long batch job.
    pub async fn run(&self, options: &ReconOptions) -> ReconResult {
        let request = json!({
            "command": "run_reconciliation",
            "bank": self.bank,
            "options": options,
        });

        match self.invoke(request, self.settings.run_timeout).await {
            Ok(reply) => ReconResult::from_reply(reply),
            Err(failure) => {
                tracing::warn!(error = %failure, "reconciliation failed to run");
                ReconResult::from_failure(failure)
            }
        }
    }

    /// Spawn the host, send one request, and read the single reply.
    async fn invoke(&self, request: Value, timeout: Duration) -> Result<Value, HostError> {
        let Some(command) = &self.settings.host_command else {
            return Err(HostError::NotConfigured);
        };

        let mut child = Command::new(command)
            .args(&self.settings.host_args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| HostError::Unavailable(e.to_string()))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| HostError::Io("host stdin unavailable".to_string()))?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| HostError::Io("host stdout unavailable".to_string()))?;

        let exchange = async {
            protocol::write_message(&mut stdin, &request)
                .await
                .map_err(|e| HostError::Io(format!("{e:#}")))?;
            match protocol::read_message(&mut stdout).await {
                Ok(Some(reply)) => Ok(reply),
                Ok(None) => Err(HostError::Disconnected),
                Err(e) => Err(HostError::Io(format!("{e:#}"))),
            }
        };

        match tokio::time::timeout(timeout, exchange).await {
            Ok(result) => result,
            Err(_) => {
                let _ = child.start_kill();
                Err(HostError::Timeout(timeout))
            }
        }
    }
}
