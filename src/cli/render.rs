//! Human renderer for CLI outputs.
//!
//! Pure formatting; the driver gathers the data. `--json` bypasses all of
//! this.

use crate::core::EpicDocument;
use crate::exec::{OpOutcome, RunReport};
use crate::parse::{FormatError, ParseWarning};
use crate::plan::{Phase, SyncPlan};

pub fn render_parse_failure(error: &FormatError) -> String {
    format!("✗ document rejected: {error}")
}

pub fn render_parse_warnings(warnings: &[ParseWarning]) -> String {
    let mut out = String::new();
    for warning in warnings {
        out.push_str(&format!("⚠ line {}: {}\n", warning.line, warning.reason));
    }
    out
}

pub fn render_validation(document: &EpicDocument, warnings: &[ParseWarning]) -> String {
    let mut out = String::new();
    let epic = document
        .key
        .as_ref()
        .map(|k| k.as_str().to_string())
        .unwrap_or_else(|| "(unlinked)".into());
    out.push_str(&format!("✓ parsed epic {epic}: {}\n", document.title));
    out.push_str(&format!(
        "  {} stories, {} subtasks, {} commit references\n",
        document.stories.len(),
        document
            .stories
            .iter()
            .map(|s| s.subtasks.len())
            .sum::<usize>(),
        document
            .stories
            .iter()
            .map(|s| s.commits.len())
            .sum::<usize>(),
    ));
    if warnings.is_empty() {
        out.push_str("  no warnings");
    } else {
        out.push_str(&format!("  {} warning(s), see above", warnings.len()));
    }
    out
}

pub fn render_plan(plan: &SyncPlan) -> String {
    if plan.is_empty() && plan.warnings.is_empty() {
        return "✨ Nothing to do; local and remote already match".into();
    }

    let mut out = format!("📋 Plan: {} operation(s)\n", plan.len());
    for phase in Phase::ALL {
        let ops: Vec<_> = plan.phase_ops(phase).collect();
        if ops.is_empty() {
            continue;
        }
        out.push_str(&format!("\nPhase {} ({phase}):\n", phase.number()));
        for op in ops {
            out.push_str(&format!("  - {}\n", op.summary));
        }
    }
    if !plan.warnings.is_empty() {
        out.push('\n');
        for warning in &plan.warnings {
            out.push_str(&format!("⚠ {warning}\n"));
        }
    }
    out.trim_end().into()
}

pub fn render_report(report: &RunReport) -> String {
    if report.entries.is_empty() && report.warnings.is_empty() {
        return "✨ Nothing to do; local and remote already match".into();
    }

    let mut out = String::new();
    if report.dry_run {
        out.push_str("🔍 Dry run; no changes were made\n\n");
    }
    for entry in &report.entries {
        let mark = match &entry.outcome {
            OpOutcome::Applied { .. } => "✓",
            OpOutcome::DryRun => "·",
            OpOutcome::Declined => "∅",
            OpOutcome::Failed { .. } => "✗",
            OpOutcome::SkippedDependency { .. } | OpOutcome::SkippedAborted => "⏭",
        };
        out.push_str(&format!("{mark} [{}] {}", entry.outcome.label(), entry.summary));
        match &entry.outcome {
            OpOutcome::Applied { created: Some(key) } => {
                out.push_str(&format!(" → {key}"));
            }
            OpOutcome::Failed { error, .. } => {
                out.push_str(&format!(": {error}"));
            }
            _ => {}
        }
        out.push('\n');
    }
    for warning in &report.warnings {
        out.push_str(&format!("⚠ {warning}\n"));
    }

    let failed = report.failed();
    out.push('\n');
    if report.dry_run {
        out.push_str(&format!(
            "{} operation(s) would be applied\n",
            report.entries.len()
        ));
    } else if failed == 0 && report.warnings.is_empty() {
        out.push_str(&format!("✅ {} applied, all clean\n", report.applied()));
    } else {
        out.push_str(&format!(
            "❌ {} applied, {} failed, {} warning(s)\n",
            report.applied(),
            failed,
            report.warnings.len()
        ));
    }
    out.trim_end().into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{OpId, PlanWarning};
    use time::OffsetDateTime;

    #[test]
    fn empty_plan_renders_clean_message() {
        let plan = SyncPlan::default();
        assert!(render_plan(&plan).contains("Nothing to do"));
    }

    #[test]
    fn report_lists_outcomes_and_footer() {
        let report = RunReport {
            started_at: OffsetDateTime::UNIX_EPOCH,
            duration_ms: 5,
            dry_run: false,
            entries: vec![
                crate::exec::OpEntry {
                    op: OpId(0),
                    phase: Phase::Stories,
                    story: "US-001".into(),
                    summary: "US-001: create story".into(),
                    outcome: OpOutcome::Applied { created: None },
                },
                crate::exec::OpEntry {
                    op: OpId(1),
                    phase: Phase::Subtasks,
                    story: "US-001".into(),
                    summary: "US-001: create subtask #1".into(),
                    outcome: OpOutcome::Failed {
                        error: "authentication rejected".into(),
                        transient: false,
                        effect: "none".into(),
                    },
                },
            ],
            warnings: vec![PlanWarning {
                story: "US-002".into(),
                reason: "status unreachable".into(),
            }],
        };
        let rendered = render_report(&report);
        assert!(rendered.contains("[applied]"));
        assert!(rendered.contains("[failed]"));
        assert!(rendered.contains("authentication rejected"));
        assert!(rendered.contains("1 applied, 1 failed, 1 warning(s)"));
    }

    #[test]
    fn dry_run_report_never_claims_changes() {
        let report = RunReport {
            started_at: OffsetDateTime::UNIX_EPOCH,
            duration_ms: 0,
            dry_run: true,
            entries: vec![crate::exec::OpEntry {
                op: OpId(0),
                phase: Phase::Stories,
                story: "US-001".into(),
                summary: "US-001: create story".into(),
                outcome: OpOutcome::DryRun,
            }],
            warnings: vec![],
        };
        let rendered = render_report(&report);
        assert!(rendered.contains("Dry run"));
        assert!(rendered.contains("1 operation(s) would be applied"));
    }
}
