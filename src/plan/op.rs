//! Plan vocabulary: operations, phases, and targets.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::adf::AdfNode;
use crate::core::{CommitHash, IssueKey, StoryId};
use crate::tracker::{FieldValue, StoryFields, SubtaskFields};

/// Stable handle for an operation within one plan. Lets later operations
/// depend on issues that do not exist yet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OpId(pub u32);

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op#{}", self.0)
    }
}

/// Execution phases, run strictly in order. Creations and story-level
/// updates first so subtasks have a parent key; comments last so they
/// reference settled issues.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Stories,
    Subtasks,
    Comments,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::Stories, Phase::Subtasks, Phase::Comments];

    pub fn number(self) -> u8 {
        match self {
            Phase::Stories => 1,
            Phase::Subtasks => 2,
            Phase::Comments => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Stories => "stories",
            Phase::Subtasks => "subtasks",
            Phase::Comments => "comments",
        }
    }

    pub fn parse(raw: &str) -> Option<Phase> {
        match raw.trim().to_lowercase().as_str() {
            "1" | "stories" | "descriptions" => Some(Phase::Stories),
            "2" | "subtasks" => Some(Phase::Subtasks),
            "3" | "comments" | "commits" => Some(Phase::Comments),
            _ => None,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The issue an operation acts on. `Pending` points at an earlier create
/// in the same plan whose key is only known at run time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Target {
    Existing { key: IssueKey },
    Pending { op: OpId },
}

impl Target {
    pub fn pending_on(&self) -> Option<OpId> {
        match self {
            Target::Pending { op } => Some(*op),
            Target::Existing { .. } => None,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Existing { key } => write!(f, "{key}"),
            Target::Pending { op } => write!(f, "<{op}>"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum OpKind {
    CreateStory {
        fields: StoryFields,
        /// Transition names to apply right after creation so the new issue
        /// lands in the document's status.
        post_transitions: Vec<String>,
    },
    CreateSubtask {
        parent: Target,
        seq: u32,
        fields: SubtaskFields,
    },
    UpdateDescription {
        body: AdfNode,
    },
    UpdateField {
        value: FieldValue,
    },
    TransitionStatus {
        /// Transition names, applied in order.
        path: Vec<String>,
        to: String,
    },
    AddCommitComment {
        body: AdfNode,
        hashes: Vec<CommitHash>,
    },
}

impl OpKind {
    pub fn verb(&self) -> &'static str {
        match self {
            OpKind::CreateStory { .. } => "create story",
            OpKind::CreateSubtask { .. } => "create subtask",
            OpKind::UpdateDescription { .. } => "update description",
            OpKind::UpdateField { .. } => "update field",
            OpKind::TransitionStatus { .. } => "transition",
            OpKind::AddCommitComment { .. } => "add commit comment",
        }
    }
}

/// One planned mutation against the tracker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SyncOperation {
    pub id: OpId,
    /// Document story this operation serves. Diagnostics only.
    pub story: StoryId,
    pub phase: Phase,
    pub target: Target,
    pub kind: OpKind,
    /// One-line human summary for plan listings and confirm prompts.
    pub summary: String,
}

impl SyncOperation {
    /// Operation this one cannot run before, if any.
    pub fn depends_on(&self) -> Option<OpId> {
        match &self.kind {
            OpKind::CreateSubtask { parent, .. } => parent.pending_on(),
            _ => self.target.pending_on(),
        }
    }
}

/// Non-fatal conditions discovered while planning. The plan is still
/// runnable; the affected operations were dropped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanWarning {
    pub story: String,
    pub reason: String,
}

impl fmt::Display for PlanWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.story, self.reason)
    }
}

/// Ordered set of operations for one document/tracker pair.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncPlan {
    pub operations: Vec<SyncOperation>,
    pub warnings: Vec<PlanWarning>,
}

impl SyncPlan {
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Operations for one phase, in plan order.
    pub fn phase_ops(&self, phase: Phase) -> impl Iterator<Item = &SyncOperation> {
        self.operations.iter().filter(move |op| op.phase == phase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_ordering_matches_numbers() {
        assert!(Phase::Stories < Phase::Subtasks);
        assert!(Phase::Subtasks < Phase::Comments);
        assert_eq!(Phase::Stories.number(), 1);
        assert_eq!(Phase::Comments.number(), 3);
    }

    #[test]
    fn phase_parse_accepts_numbers_and_names() {
        assert_eq!(Phase::parse("1"), Some(Phase::Stories));
        assert_eq!(Phase::parse("Subtasks"), Some(Phase::Subtasks));
        assert_eq!(Phase::parse("commits"), Some(Phase::Comments));
        assert_eq!(Phase::parse("4"), None);
    }

    #[test]
    fn pending_target_reports_dependency() {
        let t = Target::Pending { op: OpId(3) };
        assert_eq!(t.pending_on(), Some(OpId(3)));
        assert_eq!(t.to_string(), "<op#3>");
    }
}
