//! Run report: one entry per planned operation, machine-readable.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::core::IssueKey;
use crate::plan::{OpId, Phase, PlanWarning};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum OpOutcome {
    /// The mutation landed. `created` carries the assigned key for creates.
    Applied {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        created: Option<IssueKey>,
    },
    /// Listed only; no tracker call was made.
    DryRun,
    /// The operator answered the prompt with skip.
    Declined,
    Failed {
        error: String,
        /// Whether retrying later could succeed.
        transient: bool,
        /// Whether the mutation may have partially landed.
        effect: String,
    },
    /// An operation this one depends on did not produce its issue.
    SkippedDependency { on: OpId },
    /// The operator aborted the run before this operation was reached.
    SkippedAborted,
}

impl OpOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, OpOutcome::Failed { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            OpOutcome::Applied { .. } => "applied",
            OpOutcome::DryRun => "dry-run",
            OpOutcome::Declined => "declined",
            OpOutcome::Failed { .. } => "failed",
            OpOutcome::SkippedDependency { .. } => "skipped (dependency)",
            OpOutcome::SkippedAborted => "skipped (aborted)",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpEntry {
    pub op: OpId,
    pub phase: Phase,
    pub story: String,
    pub summary: String,
    #[serde(flatten)]
    pub outcome: OpOutcome,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunReport {
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    pub duration_ms: u64,
    pub dry_run: bool,
    pub entries: Vec<OpEntry>,
    /// Planning warnings carried through so one artifact tells the whole
    /// story.
    pub warnings: Vec<PlanWarning>,
}

impl RunReport {
    /// Clean run: nothing failed and nothing was unreachable at plan time.
    pub fn success(&self) -> bool {
        self.warnings.is_empty() && !self.entries.iter().any(|e| e.outcome.is_failure())
    }

    pub fn applied(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.outcome, OpOutcome::Applied { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.entries.iter().filter(|e| e.outcome.is_failure()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(outcome: OpOutcome) -> OpEntry {
        OpEntry {
            op: OpId(0),
            phase: Phase::Stories,
            story: "US-001".into(),
            summary: "test".into(),
            outcome,
        }
    }

    fn report(entries: Vec<OpEntry>, warnings: Vec<PlanWarning>) -> RunReport {
        RunReport {
            started_at: OffsetDateTime::UNIX_EPOCH,
            duration_ms: 0,
            dry_run: false,
            entries,
            warnings,
        }
    }

    #[test]
    fn success_requires_no_failures_and_no_warnings() {
        assert!(report(vec![entry(OpOutcome::Applied { created: None })], vec![]).success());
        assert!(
            !report(
                vec![entry(OpOutcome::Failed {
                    error: "boom".into(),
                    transient: false,
                    effect: "none".into(),
                })],
                vec![],
            )
            .success()
        );
        assert!(
            !report(
                vec![],
                vec![PlanWarning {
                    story: "US-001".into(),
                    reason: "unreachable".into(),
                }],
            )
            .success()
        );
    }

    #[test]
    fn declined_and_skipped_do_not_fail_the_run() {
        let r = report(
            vec![
                entry(OpOutcome::Declined),
                entry(OpOutcome::SkippedAborted),
                entry(OpOutcome::SkippedDependency { on: OpId(1) }),
            ],
            vec![],
        );
        assert!(r.success());
        assert_eq!(r.applied(), 0);
    }
}
