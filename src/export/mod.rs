mod orchestrator;
mod run;

pub use orchestrator::{ExportOrchestrator, ExportOutcome, SingleExportOutcome};
pub use run::ExportRun;
