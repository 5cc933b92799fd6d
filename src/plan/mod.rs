//! Reconciliation engine.
//!
//! Compares the parsed document against the fetched remote tree and emits
//! an ordered, phased operation plan. Pure: no network, no clock, no
//! side effects. Local state is authoritative for every compared field, and
//! nothing is ever deleted remotely.

pub mod op;
pub mod transitions;

pub use op::{OpId, OpKind, Phase, PlanWarning, SyncOperation, SyncPlan, Target};
pub use transitions::{TransitionEdge, TransitionGraph};

use thiserror::Error;

use crate::adf;
use crate::core::{EpicDocument, Story, Subtask, normalize_title};
use crate::tracker::{FieldValue, RemoteEpic, RemoteStory, StoryFields, SubtaskFields};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PlanError {
    #[error("no transition path from status {from:?} to {to:?}")]
    UnreachableStatus { from: String, to: String },
}

/// Knobs from the command surface that narrow the plan.
#[derive(Clone, Debug, Default)]
pub struct PlanOptions {
    /// Keep only this phase's operations.
    pub phase: Option<Phase>,
    /// Keep only the story whose local id or tracker key matches,
    /// case-insensitively.
    pub story: Option<String>,
    /// Repair mode: unconditional description re-render for every matched
    /// story, nothing else.
    pub fix_descriptions: bool,
    /// Only status transitions.
    pub status_only: bool,
}

/// Build the operation plan for one document against one remote tree.
pub fn plan(
    local: &EpicDocument,
    remote: &RemoteEpic,
    graph: &TransitionGraph,
    options: &PlanOptions,
) -> SyncPlan {
    Planner {
        remote,
        graph,
        options,
        next_id: 0,
        plan: SyncPlan::default(),
    }
    .run(local)
}

struct Planner<'a> {
    remote: &'a RemoteEpic,
    graph: &'a TransitionGraph,
    options: &'a PlanOptions,
    next_id: u32,
    plan: SyncPlan,
}

impl<'a> Planner<'a> {
    fn run(mut self, local: &EpicDocument) -> SyncPlan {
        for story in &local.stories {
            if !self.story_selected(story) {
                continue;
            }
            match self.match_story(story) {
                Some(remote_story) => self.plan_matched(story, remote_story),
                None => self.plan_create(story),
            }
        }
        self.finish()
    }

    fn story_selected(&self, story: &Story) -> bool {
        let Some(filter) = &self.options.story else {
            return true;
        };
        let f = filter.to_lowercase();
        story.id.as_str().to_lowercase() == f
            || story
                .id
                .key()
                .is_some_and(|k| k.as_str().to_lowercase() == f)
    }

    /// Tracker key first, exact normalized-title second. The fallback keeps
    /// re-planning idempotent after a create, before the author writes the
    /// assigned key back into the document.
    fn match_story(&self, story: &Story) -> Option<&'a RemoteStory> {
        if let Some(key) = story.id.key() {
            if let Some(found) = self.remote.story(key) {
                return Some(found);
            }
        }
        let wanted = story.normalized_title();
        self.remote
            .stories
            .iter()
            .find(|r| normalize_title(&r.summary) == wanted)
    }

    fn alloc(&mut self) -> OpId {
        let id = OpId(self.next_id);
        self.next_id += 1;
        id
    }

    fn push(&mut self, story: &Story, phase: Phase, target: Target, kind: OpKind, summary: String) {
        let id = self.alloc();
        self.plan.operations.push(SyncOperation {
            id,
            story: story.id.clone(),
            phase,
            target,
            kind,
            summary,
        });
    }

    fn warn(&mut self, story: &Story, reason: String) {
        tracing::warn!(story = story.id.as_str(), %reason, "operation skipped");
        self.plan.warnings.push(PlanWarning {
            story: story.id.as_str().to_string(),
            reason,
        });
    }

    // -------------------------------------------------------------------------
    // Unmatched story: create, with subtasks and comments chained behind it
    // -------------------------------------------------------------------------

    fn plan_create(&mut self, story: &Story) {
        if self.options.fix_descriptions || self.options.status_only {
            return;
        }
        let post_transitions = match self.graph.path_from_initial(story.status) {
            Ok(path) => path,
            Err(PlanError::UnreachableStatus { from, to }) => {
                self.warn(
                    story,
                    format!("status {to:?} unreachable from initial {from:?}"),
                );
                Vec::new()
            }
        };

        let create_id = self.alloc();
        self.plan.operations.push(SyncOperation {
            id: create_id,
            story: story.id.clone(),
            phase: Phase::Stories,
            target: Target::Existing {
                key: self.remote.key.clone(),
            },
            kind: OpKind::CreateStory {
                fields: story_fields(story),
                post_transitions,
            },
            summary: format!("{}: create story {:?}", story.id, story.title),
        });

        for subtask in &story.subtasks {
            self.push(
                story,
                Phase::Subtasks,
                Target::Pending { op: create_id },
                OpKind::CreateSubtask {
                    parent: Target::Pending { op: create_id },
                    seq: subtask.seq,
                    fields: subtask_fields(subtask),
                },
                format!("{}: create subtask #{} {:?}", story.id, subtask.seq, subtask.title),
            );
        }

        if !story.commits.is_empty() {
            let hashes: Vec<_> = story.commits.iter().map(|c| c.hash.clone()).collect();
            self.push(
                story,
                Phase::Comments,
                Target::Pending { op: create_id },
                OpKind::AddCommitComment {
                    body: adf::commits_table(&story.commits),
                    hashes,
                },
                format!("{}: record {} commit(s)", story.id, story.commits.len()),
            );
        }
    }

    // -------------------------------------------------------------------------
    // Matched story: field-level diff
    // -------------------------------------------------------------------------

    fn plan_matched(&mut self, story: &Story, remote: &RemoteStory) {
        let target = Target::Existing {
            key: remote.key.clone(),
        };

        if self.options.fix_descriptions {
            self.push(
                story,
                Phase::Stories,
                target,
                OpKind::UpdateDescription {
                    body: adf::to_rich_text(&story.render_description()),
                },
                format!("{}: re-render description of {}", story.id, remote.key),
            );
            return;
        }

        if !self.options.status_only {
            self.diff_description(story, remote, &target);
            self.diff_fields(story, remote, &target);
        }
        self.diff_status(story, remote, &target);
        if self.options.status_only {
            return;
        }
        self.diff_subtasks(story, remote, &target);
        self.diff_commits(story, remote, &target);
    }

    fn diff_description(&mut self, story: &Story, remote: &RemoteStory, target: &Target) {
        let rendered = story.render_description();
        let remote_text = remote
            .description
            .as_ref()
            .map(adf::from_rich_text)
            .unwrap_or_default();
        if normalized_lines(&rendered) != normalized_lines(&remote_text) {
            self.push(
                story,
                Phase::Stories,
                target.clone(),
                OpKind::UpdateDescription {
                    body: adf::to_rich_text(&rendered),
                },
                format!("{}: update description of {}", story.id, remote.key),
            );
        }
    }

    fn diff_fields(&mut self, story: &Story, remote: &RemoteStory, target: &Target) {
        if story.title != remote.summary {
            self.push(
                story,
                Phase::Stories,
                target.clone(),
                OpKind::UpdateField {
                    value: FieldValue::Summary {
                        value: story.title.clone(),
                    },
                },
                format!("{}: retitle {} to {:?}", story.id, remote.key, story.title),
            );
        }
        if remote.priority != Some(story.priority) {
            self.push(
                story,
                Phase::Stories,
                target.clone(),
                OpKind::UpdateField {
                    value: FieldValue::Priority {
                        value: story.priority,
                    },
                },
                format!("{}: set priority {}", story.id, story.priority.as_str()),
            );
        }
        // Local None means "not tracked here", not "clear remotely".
        if let Some(points) = story.story_points {
            if remote.story_points != Some(points) {
                self.push(
                    story,
                    Phase::Stories,
                    target.clone(),
                    OpKind::UpdateField {
                        value: FieldValue::StoryPoints {
                            value: Some(points),
                        },
                    },
                    format!("{}: set story points {points}", story.id),
                );
            }
        }
    }

    fn diff_status(&mut self, story: &Story, remote: &RemoteStory, target: &Target) {
        let desired = story.status.tracker_status();
        match self.graph.resolve(&remote.status, desired) {
            Ok(path) if path.is_empty() => {}
            Ok(path) => self.push(
                story,
                Phase::Stories,
                target.clone(),
                OpKind::TransitionStatus {
                    path,
                    to: desired.to_string(),
                },
                format!("{}: move {} to {desired}", story.id, remote.key),
            ),
            Err(PlanError::UnreachableStatus { from, to }) => {
                self.warn(story, format!("status {to:?} unreachable from {from:?}"));
            }
        }
    }

    fn diff_subtasks(&mut self, story: &Story, remote: &RemoteStory, story_target: &Target) {
        for subtask in &story.subtasks {
            match remote.subtasks.iter().find(|r| r.seq == subtask.seq) {
                None => self.push(
                    story,
                    Phase::Subtasks,
                    story_target.clone(),
                    OpKind::CreateSubtask {
                        parent: story_target.clone(),
                        seq: subtask.seq,
                        fields: subtask_fields(subtask),
                    },
                    format!(
                        "{}: create subtask #{} {:?}",
                        story.id, subtask.seq, subtask.title
                    ),
                ),
                Some(remote_sub) => {
                    let sub_target = Target::Existing {
                        key: remote_sub.key.clone(),
                    };
                    if subtask.title != remote_sub.summary {
                        self.push(
                            story,
                            Phase::Subtasks,
                            sub_target.clone(),
                            OpKind::UpdateField {
                                value: FieldValue::Summary {
                                    value: subtask.title.clone(),
                                },
                            },
                            format!(
                                "{}: retitle subtask #{} to {:?}",
                                story.id, subtask.seq, subtask.title
                            ),
                        );
                    }
                    let desired = subtask.status.tracker_status();
                    match self.graph.resolve(&remote_sub.status, desired) {
                        Ok(path) if path.is_empty() => {}
                        Ok(path) => self.push(
                            story,
                            Phase::Subtasks,
                            sub_target,
                            OpKind::TransitionStatus {
                                path,
                                to: desired.to_string(),
                            },
                            format!(
                                "{}: move subtask #{} to {desired}",
                                story.id, subtask.seq
                            ),
                        ),
                        Err(PlanError::UnreachableStatus { from, to }) => self.warn(
                            story,
                            format!(
                                "subtask #{} status {to:?} unreachable from {from:?}",
                                subtask.seq
                            ),
                        ),
                    }
                }
            }
        }
    }

    /// Commit references already present in any remote comment body (exact
    /// hash containment) are settled; only the rest get a comment.
    fn diff_commits(&mut self, story: &Story, remote: &RemoteStory, target: &Target) {
        let fresh: Vec<_> = story
            .commits
            .iter()
            .filter(|c| {
                !remote
                    .comments
                    .iter()
                    .any(|comment| comment.body.contains(c.hash.as_str()))
            })
            .cloned()
            .collect();
        if fresh.is_empty() {
            return;
        }
        let hashes: Vec<_> = fresh.iter().map(|c| c.hash.clone()).collect();
        let count = fresh.len();
        self.push(
            story,
            Phase::Comments,
            target.clone(),
            OpKind::AddCommitComment {
                body: adf::commits_table(&fresh),
                hashes,
            },
            format!("{}: record {count} commit(s) on {}", story.id, remote.key),
        );
    }

    // -------------------------------------------------------------------------
    // Filters
    // -------------------------------------------------------------------------

    /// Phase filtering happens after generation so dependency structure is
    /// known: a kept operation whose pending dependency was filtered away is
    /// dropped with a warning instead of being left unrunnable.
    fn finish(mut self) -> SyncPlan {
        let Some(phase) = self.options.phase else {
            return self.plan;
        };
        let kept_ids: std::collections::HashSet<OpId> = self
            .plan
            .operations
            .iter()
            .filter(|o| o.phase == phase)
            .map(|o| o.id)
            .collect();
        let mut dropped_deps = Vec::new();
        self.plan.operations.retain(|o| {
            if o.phase != phase {
                return false;
            }
            match o.depends_on() {
                Some(dep) if !kept_ids.contains(&dep) => {
                    dropped_deps.push((o.story.as_str().to_string(), o.summary.clone()));
                    false
                }
                _ => true,
            }
        });
        for (story, summary) in dropped_deps {
            self.plan.warnings.push(PlanWarning {
                story,
                reason: format!("{summary}: depends on an operation outside phase {phase}"),
            });
        }
        self.plan
    }
}

/// Description equality ignores blank-line layout: the rich-text form does
/// not preserve it, so comparing raw text would re-update forever.
fn normalized_lines(text: &str) -> Vec<&str> {
    text.lines()
        .map(str::trim_end)
        .filter(|l| !l.is_empty())
        .collect()
}

fn story_fields(story: &Story) -> StoryFields {
    StoryFields {
        summary: story.title.clone(),
        description: adf::to_rich_text(&story.render_description()),
        priority: story.priority,
        story_points: story.story_points,
    }
}

fn subtask_fields(subtask: &Subtask) -> SubtaskFields {
    SubtaskFields {
        summary: subtask.title.clone(),
        description: adf::to_rich_text(&subtask.render_description()),
        story_points: subtask.story_points,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        AcceptanceCriterion, CommitHash, IssueKey, Priority, StoryId, StoryStatus,
    };
    use crate::tracker::{RemoteComment, RemoteSubtask};

    fn local_story(id: &str, title: &str) -> Story {
        Story {
            id: StoryId::parse(id).unwrap(),
            title: title.into(),
            description: "**As a** dev\n**I want** sync\n**So that** boards match".into(),
            technical_notes: String::new(),
            status: StoryStatus::InProgress,
            priority: Priority::High,
            story_points: Some(5),
            acceptance: vec![AcceptanceCriterion {
                text: "plan is empty when converged".into(),
                checked: false,
            }],
            subtasks: vec![],
            commits: vec![],
        }
    }

    fn remote_from(story: &Story, key: &str) -> RemoteStory {
        RemoteStory {
            key: IssueKey::parse(key).unwrap(),
            summary: story.title.clone(),
            description: Some(adf::to_rich_text(&story.render_description())),
            status: story.status.tracker_status().into(),
            priority: Some(story.priority),
            story_points: story.story_points,
            updated: None,
            subtasks: vec![],
            comments: vec![],
        }
    }

    fn epic(stories: Vec<Story>) -> EpicDocument {
        EpicDocument {
            key: Some(IssueKey::parse("PROJ-1").unwrap()),
            title: "Epic".into(),
            stories,
        }
    }

    fn remote_epic(stories: Vec<RemoteStory>) -> RemoteEpic {
        RemoteEpic {
            key: IssueKey::parse("PROJ-1").unwrap(),
            summary: "Epic".into(),
            status: "Open".into(),
            updated: None,
            stories,
        }
    }

    fn subtask(seq: u32, title: &str, status: StoryStatus) -> Subtask {
        Subtask {
            seq,
            title: title.into(),
            description: format!("{title} work"),
            story_points: Some(1),
            status,
        }
    }

    fn remote_subtask(seq: u32, key: &str, title: &str, status: &str) -> RemoteSubtask {
        RemoteSubtask {
            key: IssueKey::parse(key).unwrap(),
            seq,
            summary: title.into(),
            status: status.into(),
            story_points: Some(1),
        }
    }

    #[test]
    fn converged_tree_plans_nothing() {
        let story = local_story("PROJ-2", "Sync engine");
        let remote = remote_epic(vec![remote_from(&story, "PROJ-2")]);
        let p = plan(
            &epic(vec![story]),
            &remote,
            &TransitionGraph::default(),
            &PlanOptions::default(),
        );
        assert!(p.is_empty(), "expected empty plan, got {:?}", p.operations);
        assert!(p.warnings.is_empty());
    }

    #[test]
    fn unmatched_story_becomes_create_with_pending_subtask() {
        let mut story = local_story("US-001", "Setup pipeline");
        story.subtasks = vec![subtask(1, "Setup", StoryStatus::Planned)];
        let p = plan(
            &epic(vec![story]),
            &remote_epic(vec![]),
            &TransitionGraph::default(),
            &PlanOptions::default(),
        );

        assert_eq!(p.len(), 2);
        let create = &p.operations[0];
        assert_eq!(create.phase, Phase::Stories);
        match &create.kind {
            OpKind::CreateStory {
                post_transitions, ..
            } => assert_eq!(post_transitions, &vec!["Start Progress".to_string()]),
            other => panic!("expected CreateStory, got {other:?}"),
        }
        let sub = &p.operations[1];
        assert_eq!(sub.phase, Phase::Subtasks);
        assert_eq!(sub.depends_on(), Some(create.id));
    }

    #[test]
    fn description_content_change_is_a_diff() {
        let story = local_story("PROJ-2", "Sync engine");
        let mut remote_story = remote_from(&story, "PROJ-2");
        remote_story.description = Some(adf::to_rich_text("**As a** dev\n**I want** nothing"));
        let p = plan(
            &epic(vec![story]),
            &remote_epic(vec![remote_story]),
            &TransitionGraph::default(),
            &PlanOptions::default(),
        );
        assert_eq!(p.len(), 1);
        assert!(matches!(p.operations[0].kind, OpKind::UpdateDescription { .. }));
    }

    #[test]
    fn title_fallback_match_avoids_duplicate_create() {
        // Story has no tracker key yet, but the remote summary matches.
        let story = local_story("US-007", "Sync engine");
        let remote_story = remote_from(&story, "PROJ-9");
        let p = plan(
            &epic(vec![story]),
            &remote_epic(vec![remote_story]),
            &TransitionGraph::default(),
            &PlanOptions::default(),
        );
        assert!(p.is_empty());
    }

    #[test]
    fn three_local_subtasks_against_two_remote_yields_one_create() {
        let mut story = local_story("PROJ-2", "Sync engine");
        story.subtasks = vec![
            subtask(1, "One", StoryStatus::Planned),
            subtask(2, "Two", StoryStatus::Planned),
            subtask(3, "Three", StoryStatus::Planned),
        ];
        let mut remote_story = remote_from(&story, "PROJ-2");
        remote_story.subtasks = vec![
            remote_subtask(1, "PROJ-3", "One", "Open"),
            remote_subtask(2, "PROJ-4", "Two", "Open"),
        ];
        let p = plan(
            &epic(vec![story]),
            &remote_epic(vec![remote_story]),
            &TransitionGraph::default(),
            &PlanOptions::default(),
        );

        assert_eq!(p.len(), 1);
        match &p.operations[0].kind {
            OpKind::CreateSubtask { seq, .. } => assert_eq!(*seq, 3),
            other => panic!("expected CreateSubtask, got {other:?}"),
        }
    }

    #[test]
    fn applied_commit_comment_is_not_replanned() {
        let mut story = local_story("PROJ-2", "Sync engine");
        story.commits = vec![
            crate::core::CommitReference {
                hash: CommitHash::parse("abc1234").unwrap(),
                message: "first".into(),
            },
            crate::core::CommitReference {
                hash: CommitHash::parse("def5678").unwrap(),
                message: "second".into(),
            },
        ];
        let mut remote_story = remote_from(&story, "PROJ-2");
        remote_story.comments = vec![RemoteComment {
            id: "10001".into(),
            body: "Related Commits abc1234 first".into(),
        }];
        let p = plan(
            &epic(vec![story]),
            &remote_epic(vec![remote_story]),
            &TransitionGraph::default(),
            &PlanOptions::default(),
        );

        assert_eq!(p.len(), 1);
        match &p.operations[0].kind {
            OpKind::AddCommitComment { hashes, .. } => {
                assert_eq!(hashes.len(), 1);
                assert_eq!(hashes[0].as_str(), "def5678");
            }
            other => panic!("expected AddCommitComment, got {other:?}"),
        }
    }

    #[test]
    fn status_drift_resolves_through_graph() {
        let mut story = local_story("PROJ-2", "Sync engine");
        story.status = StoryStatus::Done;
        let mut remote_story = remote_from(&story, "PROJ-2");
        remote_story.status = "Open".into();
        let p = plan(
            &epic(vec![story]),
            &remote_epic(vec![remote_story]),
            &TransitionGraph::default(),
            &PlanOptions::default(),
        );

        assert_eq!(p.len(), 1);
        match &p.operations[0].kind {
            OpKind::TransitionStatus { path, to } => {
                assert_eq!(path, &vec!["Start Progress".to_string(), "Resolve".to_string()]);
                assert_eq!(to, "Resolved");
            }
            other => panic!("expected TransitionStatus, got {other:?}"),
        }
    }

    #[test]
    fn unreachable_status_warns_and_continues() {
        let mut story = local_story("PROJ-2", "Sync engine");
        story.status = StoryStatus::Planned;
        story.story_points = Some(8);
        let mut remote_story = remote_from(&story, "PROJ-2");
        remote_story.status = "Resolved".into();
        remote_story.story_points = Some(5);
        let p = plan(
            &epic(vec![story]),
            &remote_epic(vec![remote_story]),
            &TransitionGraph::default(),
            &PlanOptions::default(),
        );

        // The points update survives; the impossible transition is a warning.
        assert_eq!(p.len(), 1);
        assert!(matches!(
            p.operations[0].kind,
            OpKind::UpdateField {
                value: FieldValue::StoryPoints { value: Some(8) }
            }
        ));
        assert_eq!(p.warnings.len(), 1);
        assert!(p.warnings[0].reason.contains("unreachable"));
    }

    #[test]
    fn fix_descriptions_rerenders_unconditionally() {
        let story = local_story("PROJ-2", "Sync engine");
        let remote = remote_epic(vec![remote_from(&story, "PROJ-2")]);
        let opts = PlanOptions {
            fix_descriptions: true,
            ..Default::default()
        };
        let p = plan(&epic(vec![story]), &remote, &TransitionGraph::default(), &opts);
        assert_eq!(p.len(), 1);
        assert!(matches!(p.operations[0].kind, OpKind::UpdateDescription { .. }));
    }

    #[test]
    fn status_only_drops_everything_else() {
        let mut story = local_story("PROJ-2", "Sync engine");
        story.status = StoryStatus::Done;
        story.story_points = Some(13);
        let mut remote_story = remote_from(&story, "PROJ-2");
        remote_story.status = "In Progress".into();
        remote_story.story_points = Some(5);
        let opts = PlanOptions {
            status_only: true,
            ..Default::default()
        };
        let p = plan(
            &epic(vec![story]),
            &remote_epic(vec![remote_story]),
            &TransitionGraph::default(),
            &opts,
        );
        assert_eq!(p.len(), 1);
        assert!(matches!(p.operations[0].kind, OpKind::TransitionStatus { .. }));
    }

    #[test]
    fn story_filter_is_case_insensitive() {
        let a = local_story("US-001", "First");
        let b = local_story("US-002", "Second");
        let opts = PlanOptions {
            story: Some("us-002".into()),
            ..Default::default()
        };
        let p = plan(
            &epic(vec![a, b]),
            &remote_epic(vec![]),
            &TransitionGraph::default(),
            &opts,
        );
        assert_eq!(p.len(), 1);
        assert_eq!(p.operations[0].story.as_str(), "US-002");
    }

    #[test]
    fn phase_filter_drops_orphaned_dependents_with_warning() {
        let mut story = local_story("US-001", "Setup pipeline");
        story.subtasks = vec![subtask(1, "Setup", StoryStatus::Planned)];
        let opts = PlanOptions {
            phase: Some(Phase::Subtasks),
            ..Default::default()
        };
        let p = plan(
            &epic(vec![story]),
            &remote_epic(vec![]),
            &TransitionGraph::default(),
            &opts,
        );
        // The subtask create depends on the story create, which phase
        // filtering removed.
        assert!(p.is_empty());
        assert_eq!(p.warnings.len(), 1);
    }
}
