// 🔁 Pipeline - reconcile an extract, then hand corrections to an applier

use crate::apply::{Applier, StatementRunner};
use crate::error::SyncResult;
use crate::extract::Extract;
use crate::reconciliation::{BatchEntry, BatchReconciler, BatchSummary, ReportSink};
use crate::rules::SyncRuleTable;

/// Report what a run would do. Nothing is applied.
pub fn dry_run<S: ReportSink + ?Sized>(
    extract: Extract,
    table: &SyncRuleTable,
    sink: &mut S,
) -> BatchSummary {
    BatchReconciler::new(table)
        .reconcile_and_report(extract.rows, sink)
        .summary
}

/// Reconcile and apply every correction, in input order.
///
/// Each record is reported after its update ran. A failed update is counted
/// and the batch moves on, unless `fail_fast` is set, in which case the
/// failure ends the run.
pub fn sync_extract<R, S>(
    extract: Extract,
    table: &SyncRuleTable,
    applier: &mut Applier<R>,
    sink: &mut S,
    fail_fast: bool,
) -> SyncResult<BatchSummary>
where
    R: StatementRunner,
    S: ReportSink + ?Sized,
{
    let report = BatchReconciler::new(table).reconcile(extract.rows);
    let mut summary = report.summary;

    for entry in &report.entries {
        match entry {
            BatchEntry::Malformed { index, total, error } => sink.malformed(*index, *total, error),
            BatchEntry::Decided(decision) => {
                if !decision.is_corrected() {
                    sink.decision(decision);
                    continue;
                }

                match applier.apply(decision.resolved()) {
                    Ok(()) => {
                        summary.applied += 1;
                        sink.decision(decision);
                    }
                    Err(error) => {
                        summary.apply_failed += 1;
                        sink.apply_failed(decision, &error);
                        if fail_fast {
                            sink.summary(&summary);
                            return Err(error);
                        }
                    }
                }
            }
        }
    }

    sink.summary(&summary);
    Ok(summary)
}

// ============================================================================
// TESTS
// ============================================================================
