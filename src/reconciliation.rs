// ⚖️ Batch Reconciler - one pass over a nightly extract
//
// Feeds every extracted row through the sync rule table, in input order, and
// records what it decided. It never writes anywhere: a corrected record that
// differs from the original is the signal that an update is due, and the
// caller decides whether to apply it.

use crate::error::SyncError;
use crate::player::PlayerAccount;
use crate::rules::{CorrectionOutcome, SyncRuleTable};
use serde::{Deserialize, Serialize};

// ============================================================================
// PER-RECORD DECISION
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct RecordDecision {
    /// 1-based position among data rows
    pub index: usize,
    pub total: usize,
    pub original: PlayerAccount,
    pub outcome: CorrectionOutcome,
    /// Rule that fired; `None` for an unrecognized combination
    pub rule: Option<u8>,
}

impl RecordDecision {
    pub fn is_corrected(&self) -> bool {
        self.outcome.is_corrected()
    }

    pub fn resolved(&self) -> &PlayerAccount {
        self.outcome.resolve(&self.original)
    }

    pub fn verb(&self) -> &'static str {
        if self.is_corrected() {
            "synced "
        } else {
            "skipped"
        }
    }

    /// Operator-facing line, e.g. `  3/120 synced  ID-1, 1234, 1, 3, 3, a@b.com`
    pub fn report_line(&self) -> String {
        format!(
            "{} {} {}",
            progress(self.index, self.total),
            self.verb(),
            self.resolved()
        )
    }
}

#[derive(Debug)]
pub enum BatchEntry {
    Decided(RecordDecision),
    Malformed {
        index: usize,
        total: usize,
        error: SyncError,
    },
}

fn progress(index: usize, total: usize) -> String {
    format!("{:>3}/{}", index, total)
}

// ============================================================================
// SUMMARY
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Rows that parsed into a record
    pub processed: usize,
    pub corrected: usize,
    pub unchanged: usize,
    /// Subset of `unchanged` that matched no rule
    pub unrecognized: usize,
    /// Malformed rows, skipped
    pub errored: usize,
    pub applied: usize,
    pub apply_failed: usize,
}

impl BatchSummary {
    pub fn total_rows(&self) -> usize {
        self.processed + self.errored
    }

    pub fn has_errors(&self) -> bool {
        self.errored > 0 || self.apply_failed > 0
    }

    pub fn summary(&self) -> String {
        format!(
            "Processed {} of {} rows: {} synced, {} skipped ({} unrecognized), {} malformed, {} applied, {} apply failures",
            self.processed,
            self.total_rows(),
            self.corrected,
            self.unchanged,
            self.unrecognized,
            self.errored,
            self.applied,
            self.apply_failed
        )
    }
}

// ============================================================================
// REPORTING SINK
// ============================================================================

/// Where per-record report lines go. Injected into the batch pass.
pub trait ReportSink {
    fn decision(&mut self, decision: &RecordDecision);

    fn malformed(&mut self, index: usize, total: usize, error: &SyncError);

    fn apply_failed(&mut self, decision: &RecordDecision, error: &SyncError);

    fn summary(&mut self, summary: &BatchSummary);
}

/// Forwards report lines to the `log` facade.
#[derive(Debug, Default)]
pub struct LogSink;

impl ReportSink for LogSink {
    fn decision(&mut self, decision: &RecordDecision) {
        if decision.rule.is_none() {
            log::info!(
                "{} no rule for {}, left as-is",
                progress(decision.index, decision.total),
                decision.original.status()
            );
        }
        log::info!("{}", decision.report_line());
    }

    fn malformed(&mut self, index: usize, total: usize, error: &SyncError) {
        log::warn!("{} malformed {}", progress(index, total), error);
    }

    fn apply_failed(&mut self, decision: &RecordDecision, error: &SyncError) {
        log::error!("{} failed  {}: {}", progress(decision.index, decision.total), decision.resolved(), error);
    }

    fn summary(&mut self, summary: &BatchSummary) {
        log::info!("{}", summary.summary());
    }
}

/// Keeps every line in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub lines: Vec<String>,
}

impl ReportSink for MemorySink {
    fn decision(&mut self, decision: &RecordDecision) {
        self.lines.push(decision.report_line());
    }

    fn malformed(&mut self, index: usize, total: usize, error: &SyncError) {
        self.lines.push(format!("{} malformed {}", progress(index, total), error));
    }

    fn apply_failed(&mut self, decision: &RecordDecision, error: &SyncError) {
        self.lines.push(format!(
            "{} failed  {}: {}",
            progress(decision.index, decision.total),
            decision.resolved(),
            error
        ));
    }

    fn summary(&mut self, summary: &BatchSummary) {
        self.lines.push(summary.summary());
    }
}

// ============================================================================
// RECONCILIATION REPORT
// ============================================================================

#[derive(Debug, Default)]
pub struct ReconciliationReport {
    pub entries: Vec<BatchEntry>,
    pub summary: BatchSummary,
}

impl ReconciliationReport {
    pub fn decisions(&self) -> impl Iterator<Item = &RecordDecision> {
        self.entries.iter().filter_map(|entry| match entry {
            BatchEntry::Decided(decision) => Some(decision),
            BatchEntry::Malformed { .. } => None,
        })
    }

    pub fn corrections(&self) -> impl Iterator<Item = &RecordDecision> {
        self.decisions().filter(|d| d.is_corrected())
    }

    /// Replay every entry and the summary into a sink, in input order
    pub fn report_to<S: ReportSink + ?Sized>(&self, sink: &mut S) {
        for entry in &self.entries {
            match entry {
                BatchEntry::Decided(decision) => sink.decision(decision),
                BatchEntry::Malformed { index, total, error } => sink.malformed(*index, *total, error),
            }
        }
        sink.summary(&self.summary);
    }
}

// ============================================================================
// BATCH RECONCILER
// ============================================================================

pub struct BatchReconciler<'a> {
    table: &'a SyncRuleTable,
}

impl<'a> BatchReconciler<'a> {
    pub fn new(table: &'a SyncRuleTable) -> Self {
        BatchReconciler { table }
    }

    /// Decide one record
    pub fn decide(&self, index: usize, total: usize, player: PlayerAccount) -> RecordDecision {
        let rule = self.table.matching_rule(&player.status()).map(|r| r.id);
        let outcome = self.table.correct(&player);

        RecordDecision {
            index,
            total,
            original: player,
            outcome,
            rule,
        }
    }

    /// Run the whole batch. Malformed rows are kept as entries and counted;
    /// they never stop the pass.
    pub fn reconcile<I>(&self, rows: I) -> ReconciliationReport
    where
        I: IntoIterator<Item = Result<PlayerAccount, SyncError>>,
    {
        let rows: Vec<_> = rows.into_iter().collect();
        let total = rows.len();

        let mut report = ReconciliationReport {
            entries: Vec::with_capacity(total),
            summary: BatchSummary::default(),
        };

        for (i, row) in rows.into_iter().enumerate() {
            let index = i + 1;

            match row {
                Ok(player) => {
                    let decision = self.decide(index, total, player);

                    report.summary.processed += 1;
                    if decision.is_corrected() {
                        report.summary.corrected += 1;
                    } else {
                        report.summary.unchanged += 1;
                        if decision.rule.is_none() {
                            report.summary.unrecognized += 1;
                        }
                    }

                    report.entries.push(BatchEntry::Decided(decision));
                }
                Err(error) => {
                    report.summary.errored += 1;
                    report.entries.push(BatchEntry::Malformed { index, total, error });
                }
            }
        }

        log::debug!("Reconciled batch: {}", report.summary.summary());

        report
    }

    /// `reconcile`, then replay the result into `sink`
    pub fn reconcile_and_report<I, S>(&self, rows: I, sink: &mut S) -> ReconciliationReport
    where
        I: IntoIterator<Item = Result<PlayerAccount, SyncError>>,
        S: ReportSink + ?Sized,
    {
        let report = self.reconcile(rows);
        report.report_to(sink);
        report
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::{EmailVerification::*, ServiceStatus::*, StatusTriple};
    use crate::rules::UnverifiedSuspendedPolicy;

    fn player(id: u64, triple: StatusTriple) -> PlayerAccount {
        PlayerAccount::new(format!("ID-{id}"), format!("p{id}@example.com"), id, triple)
    }

    fn sample_rows() -> Vec<Result<PlayerAccount, SyncError>> {
        vec![
            Ok(player(1, StatusTriple::new(Verified, Preactive, Preactive))), // rule 1
            Ok(player(2, StatusTriple::new(Verified, Suspended, Suspended))), // rule 10
            Err(SyncError::malformed(4, "expected 8 tokens, found 3")),
            Ok(player(3, StatusTriple::new(Verified, Active, Active))), // unrecognized
            Ok(player(4, StatusTriple::new(NotVerified, Active, Active))), // rule 9
        ]
    }

    #[test]
    fn test_batch_counts() {
        let table = SyncRuleTable::new(UnverifiedSuspendedPolicy::Leave);
        let report = BatchReconciler::new(&table).reconcile(sample_rows());

        assert_eq!(report.entries.len(), 5);
        assert_eq!(
            report.summary,
            BatchSummary {
                processed: 4,
                corrected: 2,
                unchanged: 2,
                unrecognized: 1,
                errored: 1,
                applied: 0,
                apply_failed: 0,
            }
        );
        assert!(report.summary.has_errors());
        assert_eq!(report.summary.total_rows(), 5);

        println!("✅ {}", report.summary.summary());
    }

    #[test]
    fn test_malformed_row_does_not_abort() {
        let table = SyncRuleTable::new(UnverifiedSuspendedPolicy::Leave);
        let report = BatchReconciler::new(&table).reconcile(sample_rows());

        // rows after the malformed one are still decided
        let indexes: Vec<usize> = report.decisions().map(|d| d.index).collect();
        assert_eq!(indexes, vec![1, 2, 4, 5]);

        match &report.entries[2] {
            BatchEntry::Malformed { index, total, error } => {
                assert_eq!(*index, 3);
                assert_eq!(*total, 5);
                assert!(error.is_row_level());
            }
            other => panic!("expected malformed entry, got {other:?}"),
        }
    }

    #[test]
    fn test_decisions_keep_original() {
        let table = SyncRuleTable::new(UnverifiedSuspendedPolicy::Leave);
        let report = BatchReconciler::new(&table).reconcile(sample_rows());

        let first = report.decisions().next().unwrap();
        assert_eq!(first.rule, Some(1));
        assert_eq!(first.original.status(), StatusTriple::new(Verified, Preactive, Preactive));
        assert_eq!(first.resolved().status(), StatusTriple::new(Verified, Suspended, Suspended));
        assert_ne!(first.resolved(), &first.original);

        let corrected: Vec<u64> = report.corrections().map(|d| d.original.contract_id()).collect();
        assert_eq!(corrected, vec![1, 4]);
    }

    #[test]
    fn test_report_lines() {
        let table = SyncRuleTable::new(UnverifiedSuspendedPolicy::Leave);
        let mut sink = MemorySink::default();
        BatchReconciler::new(&table).reconcile_and_report(sample_rows(), &mut sink);

        assert_eq!(sink.lines.len(), 6);
        assert_eq!(sink.lines[0], "  1/5 synced  ID-1, 1, 1, 3, 3, p1@example.com");
        assert_eq!(sink.lines[1], "  2/5 skipped ID-2, 2, 1, 3, 3, p2@example.com");
        assert!(sink.lines[2].starts_with("  3/5 malformed"));
        assert_eq!(sink.lines[4], "  5/5 synced  ID-4, 4, 0, 1, 1, p4@example.com");
        assert!(sink.lines[5].starts_with("Processed 4 of 5 rows"));
    }

    #[test]
    fn test_policy_changes_counts() {
        let rows = || vec![Ok(player(9, StatusTriple::new(NotVerified, Suspended, Suspended)))];

        let leave = SyncRuleTable::new(UnverifiedSuspendedPolicy::Leave);
        let report = BatchReconciler::new(&leave).reconcile(rows());
        assert_eq!(report.summary.corrected, 0);
        assert_eq!(report.summary.unrecognized, 0);

        let promote = SyncRuleTable::new(UnverifiedSuspendedPolicy::Promote);
        let report = BatchReconciler::new(&promote).reconcile(rows());
        assert_eq!(report.summary.corrected, 1);
    }

    #[test]
    fn test_empty_batch() {
        let table = SyncRuleTable::new(UnverifiedSuspendedPolicy::Leave);
        let report = BatchReconciler::new(&table).reconcile(Vec::new());

        assert!(report.entries.is_empty());
        assert_eq!(report.summary, BatchSummary::default());
        assert!(!report.summary.has_errors());
    }
}
