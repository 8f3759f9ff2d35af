// PD Services Sync - Core Library
// Finds player accounts whose status fields drifted apart and computes the fix

pub mod error;
pub mod player;         // Account record + status triple
pub mod rules;          // Drift table (first match wins)
pub mod reconciliation; // Batch pass + reporting sinks
pub mod extract;        // DEL/CSV extract reading
pub mod apply;          // SQL template + statement runners
pub mod db2;            // DB2 CLP subprocess
pub mod config;
pub mod pipeline;

// Re-export commonly used types
pub use error::{SyncError, SyncResult};
pub use player::{
    EmailVerification, LifecycleState, PlayerAccount, ServiceStatus, StatusTriple,
    parse_number,
};
pub use rules::{
    CorrectionOutcome, RuleAction, SyncRule, SyncRuleTable, UnverifiedSuspendedPolicy,
};
pub use reconciliation::{
    BatchEntry, BatchReconciler, BatchSummary, LogSink, MemorySink, ReconciliationReport,
    RecordDecision, ReportSink,
};
pub use extract::{
    Extract, archive_previous_extract, prepare_export_sql, read_extract,
    read_extract_from_reader,
};
pub use apply::{Applier, RecordingRunner, SqlTemplate, SqliteRunner, StatementRunner};
pub use db2::{Db2Clp, inspect_hadr_snapshot};
pub use config::{ConfigOverrides, RunMode, SyncConfig};
pub use pipeline::{dry_run, sync_extract};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
