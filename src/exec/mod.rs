//! Phased plan executor.
//!
//! Applies a `SyncPlan` against a `TrackerApi` in phase order. Within a
//! phase, operations have no dependencies on each other and run on a
//! bounded worker pool; across phases, created issue keys feed forward into
//! pending targets. Transient tracker errors retry with exponential
//! backoff; terminal errors fail the operation and skip its dependents.

pub mod report;

pub use report::{OpEntry, OpOutcome, RunReport};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::core::IssueKey;
use crate::plan::{OpId, OpKind, Phase, SyncOperation, SyncPlan, Target};
use crate::tracker::{ApiError, TrackerApi};

// =============================================================================
// Modes and prompts
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecMode {
    /// List operations, touch nothing. The default.
    DryRun,
    /// Apply, prompting per operation.
    Confirm,
    /// Apply without prompting.
    NoConfirm,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Answer {
    Apply,
    Skip,
    Abort,
}

/// Per-operation gate. The terminal prompt lives in the CLI; tests inject
/// scripted answers.
pub trait Confirmer: Send + Sync {
    fn confirm(&self, op: &SyncOperation) -> Answer;
}

/// Answers apply to everything. Used for `NoConfirm` runs.
pub struct AutoApply;

impl Confirmer for AutoApply {
    fn confirm(&self, _: &SyncOperation) -> Answer {
        Answer::Apply
    }
}

// =============================================================================
// Retry
// =============================================================================

/// Deterministic exponential backoff for transient tracker errors.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based): base * 2^(attempt-1),
    /// capped.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

// =============================================================================
// Executor
// =============================================================================

pub struct Executor<'a> {
    tracker: &'a dyn TrackerApi,
    confirmer: &'a dyn Confirmer,
    mode: ExecMode,
    retry: RetryPolicy,
    workers: usize,
}

impl<'a> Executor<'a> {
    pub fn new(tracker: &'a dyn TrackerApi, mode: ExecMode, confirmer: &'a dyn Confirmer) -> Self {
        Self {
            tracker,
            confirmer,
            mode,
            retry: RetryPolicy::default(),
            workers: 4,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn run(&self, plan: &SyncPlan) -> RunReport {
        let started_at = OffsetDateTime::now_utc();
        let started = Instant::now();
        let mut outcomes: HashMap<OpId, OpOutcome> = HashMap::new();

        if self.mode == ExecMode::DryRun {
            for op in &plan.operations {
                outcomes.insert(op.id, OpOutcome::DryRun);
            }
        } else {
            self.apply_phases(plan, &mut outcomes);
        }

        let entries = plan
            .operations
            .iter()
            .filter_map(|op| {
                outcomes.remove(&op.id).map(|outcome| OpEntry {
                    op: op.id,
                    phase: op.phase,
                    story: op.story.as_str().to_string(),
                    summary: op.summary.clone(),
                    outcome,
                })
            })
            .collect();

        RunReport {
            started_at,
            duration_ms: started.elapsed().as_millis() as u64,
            dry_run: self.mode == ExecMode::DryRun,
            entries,
            warnings: plan.warnings.clone(),
        }
    }

    fn apply_phases(&self, plan: &SyncPlan, outcomes: &mut HashMap<OpId, OpOutcome>) {
        let mut created: HashMap<OpId, IssueKey> = HashMap::new();
        let mut aborted = false;

        for phase in Phase::ALL {
            let ops: Vec<&SyncOperation> = plan.phase_ops(phase).collect();
            if ops.is_empty() {
                continue;
            }
            if aborted {
                for op in ops {
                    outcomes.insert(op.id, OpOutcome::SkippedAborted);
                }
                continue;
            }
            tracing::info!(%phase, ops = ops.len(), "executing phase");

            // Resolve each operation's target key, or park it if the create
            // it depends on did not produce one.
            let mut runnable: Vec<(&SyncOperation, IssueKey)> = Vec::new();
            for op in ops {
                match self.resolve_target(op, &created) {
                    Ok(key) => runnable.push((op, key)),
                    Err(dep) => {
                        outcomes.insert(op.id, OpOutcome::SkippedDependency { on: dep });
                    }
                }
            }

            if self.mode == ExecMode::Confirm {
                // Prompts force serial execution.
                let mut remaining = runnable.into_iter();
                for (op, key) in remaining.by_ref() {
                    match self.confirmer.confirm(op) {
                        Answer::Skip => {
                            outcomes.insert(op.id, OpOutcome::Declined);
                        }
                        Answer::Abort => {
                            aborted = true;
                            outcomes.insert(op.id, OpOutcome::SkippedAborted);
                            break;
                        }
                        Answer::Apply => {
                            let (outcome, new_key) = self.apply(op, &key);
                            if let Some(k) = new_key {
                                created.insert(op.id, k);
                            }
                            outcomes.insert(op.id, outcome);
                        }
                    }
                }
                for (op, _) in remaining {
                    outcomes.insert(op.id, OpOutcome::SkippedAborted);
                }
            } else {
                for (id, outcome, new_key) in self.apply_pooled(runnable) {
                    if let Some(k) = new_key {
                        created.insert(id, k);
                    }
                    outcomes.insert(id, outcome);
                }
            }
        }
    }

    /// Fan a phase's operations out over scoped worker threads.
    fn apply_pooled(
        &self,
        runnable: Vec<(&SyncOperation, IssueKey)>,
    ) -> Vec<(OpId, OpOutcome, Option<IssueKey>)> {
        let pool = self.workers.min(runnable.len().max(1));
        let (job_tx, job_rx) = crossbeam::channel::unbounded::<(&SyncOperation, IssueKey)>();
        let (out_tx, out_rx) = crossbeam::channel::unbounded();
        let expected = runnable.len();

        std::thread::scope(|scope| {
            for _ in 0..pool {
                let job_rx = job_rx.clone();
                let out_tx = out_tx.clone();
                scope.spawn(move || {
                    while let Ok((op, key)) = job_rx.recv() {
                        let (outcome, new_key) = self.apply(op, &key);
                        if out_tx.send((op.id, outcome, new_key)).is_err() {
                            return;
                        }
                    }
                });
            }
            drop(job_rx);
            drop(out_tx);
            for job in runnable {
                // Receivers only close if a worker panicked.
                if job_tx.send(job).is_err() {
                    break;
                }
            }
            drop(job_tx);
            out_rx.iter().take(expected).collect()
        })
    }

    fn resolve_target(
        &self,
        op: &SyncOperation,
        created: &HashMap<OpId, IssueKey>,
    ) -> Result<IssueKey, OpId> {
        let target = match &op.kind {
            OpKind::CreateSubtask { parent, .. } => parent,
            _ => &op.target,
        };
        match target {
            Target::Existing { key } => Ok(key.clone()),
            Target::Pending { op: dep } => created.get(dep).cloned().ok_or(*dep),
        }
    }

    /// Apply one operation against its resolved target key. Returns the
    /// outcome plus the created key for create operations.
    fn apply(&self, op: &SyncOperation, key: &IssueKey) -> (OpOutcome, Option<IssueKey>) {
        tracing::debug!(op = %op.id, target = %key, "applying {}", op.kind.verb());
        match &op.kind {
            OpKind::CreateStory {
                fields,
                post_transitions,
            } => {
                let new_key = match self.call(|| self.tracker.create_story(key, fields)) {
                    Ok(k) => k,
                    Err(e) => return (failed(&e), None),
                };
                for name in post_transitions {
                    if let Err(e) = self.call(|| self.tracker.transition(&new_key, name)) {
                        // The issue exists; dependents may still proceed.
                        return (failed(&e), Some(new_key));
                    }
                }
                (
                    OpOutcome::Applied {
                        created: Some(new_key.clone()),
                    },
                    Some(new_key),
                )
            }
            OpKind::CreateSubtask { fields, .. } => {
                match self.call(|| self.tracker.create_subtask(key, fields)) {
                    Ok(k) => (
                        OpOutcome::Applied {
                            created: Some(k.clone()),
                        },
                        Some(k),
                    ),
                    Err(e) => (failed(&e), None),
                }
            }
            OpKind::UpdateDescription { body } => {
                self.simple(self.call(|| self.tracker.update_description(key, body)))
            }
            OpKind::UpdateField { value } => {
                self.simple(self.call(|| self.tracker.update_field(key, value)))
            }
            OpKind::TransitionStatus { path, .. } => {
                for name in path {
                    if let Err(e) = self.call(|| self.tracker.transition(key, name)) {
                        return (failed(&e), None);
                    }
                }
                (OpOutcome::Applied { created: None }, None)
            }
            OpKind::AddCommitComment { body, .. } => {
                self.simple(self.call(|| self.tracker.add_comment(key, body)))
            }
        }
    }

    fn simple(&self, result: Result<(), ApiError>) -> (OpOutcome, Option<IssueKey>) {
        match result {
            Ok(()) => (OpOutcome::Applied { created: None }, None),
            Err(e) => (failed(&e), None),
        }
    }

    /// One tracker call with bounded retry on transient errors.
    fn call<T>(&self, f: impl Fn() -> Result<T, ApiError>) -> Result<T, ApiError> {
        let mut attempt = 1;
        loop {
            match f() {
                Ok(v) => return Ok(v),
                Err(e) if e.transience().is_retryable() && attempt < self.retry.max_attempts => {
                    let delay = match &e {
                        ApiError::RateLimited {
                            retry_after: Some(d),
                        } => (*d).max(self.retry.delay(attempt)),
                        _ => self.retry.delay(attempt),
                    };
                    tracing::warn!(error = %e, attempt, ?delay, "transient failure, retrying");
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn failed(e: &ApiError) -> OpOutcome {
    OpOutcome::Failed {
        error: e.to_string(),
        transient: e.transience().is_retryable(),
        effect: e.effect().as_str().to_string(),
    }
}

// =============================================================================
// Snapshot export
// =============================================================================

/// On-disk form of an exported remote tree.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(with = "time::serde::rfc3339")]
    pub exported_at: OffsetDateTime,
    pub tree: crate::tracker::RemoteEpic,
}

/// Fetch the remote tree and write it next to `dir` as pretty JSON. Called
/// before any mutation when export is requested.
pub fn export_snapshot(
    tracker: &dyn TrackerApi,
    epic: &IssueKey,
    dir: &Path,
) -> crate::Result<PathBuf> {
    let tree = tracker.fetch_tree(epic).map_err(crate::Error::Api)?;
    let exported_at = OffsetDateTime::now_utc();
    let stamp_format = time::macros::format_description!(
        "[year][month][day]_[hour][minute][second]"
    );
    let stamp = exported_at
        .format(&stamp_format)
        .unwrap_or_else(|_| "unknown".to_string());
    let path = dir.join(format!("mdsync_export_{}_{stamp}.json", epic.as_str()));
    let snapshot = Snapshot { exported_at, tree };
    let body = serde_json::to_string_pretty(&snapshot).map_err(|e| {
        crate::Error::io(
            "failed to serialize snapshot",
            std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        )
    })?;
    std::fs::write(&path, body)
        .map_err(|e| crate::Error::io(format!("failed to write {}", path.display()), e))?;
    tracing::info!(path = %path.display(), "exported remote tree");
    Ok(path)
}
