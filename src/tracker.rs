//! Tracker capability boundary.
//!
//! The remote tree mirror types, the `TrackerApi` trait the executor calls,
//! and the error taxonomy with transience/effect classification. Wire-level
//! HTTP adapters live out of tree behind the trait; this module ships a
//! caching decorator and a read-only snapshot adapter for offline analysis.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

use crate::adf::AdfNode;
use crate::cache::{Clock, SystemClock, TtlCache};
use crate::core::{IssueKey, Priority};
use crate::error::{Effect, Transience};

// =============================================================================
// Remote tree mirror
// =============================================================================

/// Tracker-side view of the epic and everything under it. Comparison target
/// only; never mutated locally.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RemoteEpic {
    pub key: IssueKey,
    pub summary: String,
    pub status: String,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub updated: Option<OffsetDateTime>,
    pub stories: Vec<RemoteStory>,
}

impl RemoteEpic {
    pub fn story(&self, key: &IssueKey) -> Option<&RemoteStory> {
        self.stories.iter().find(|s| &s.key == key)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RemoteStory {
    pub key: IssueKey,
    pub summary: String,
    #[serde(default)]
    pub description: Option<AdfNode>,
    /// Workflow status name as the tracker reports it.
    pub status: String,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub story_points: Option<u32>,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub updated: Option<OffsetDateTime>,
    #[serde(default)]
    pub subtasks: Vec<RemoteSubtask>,
    #[serde(default)]
    pub comments: Vec<RemoteComment>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RemoteSubtask {
    pub key: IssueKey,
    /// Position in the parent's subtask table, 1-based. Assigned by the
    /// fetcher from the tracker's ordering.
    pub seq: u32,
    pub summary: String,
    pub status: String,
    #[serde(default)]
    pub story_points: Option<u32>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RemoteComment {
    pub id: String,
    /// Flattened text of the comment body; enough for containment checks.
    pub body: String,
}

// =============================================================================
// Capability trait + payloads
// =============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoryFields {
    pub summary: String,
    pub description: AdfNode,
    pub priority: Priority,
    pub story_points: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubtaskFields {
    pub summary: String,
    pub description: AdfNode,
    pub story_points: Option<u32>,
}

/// One scalar field mutation. Field-level, so unrelated concurrent remote
/// edits are not clobbered.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "field", rename_all = "snake_case")]
pub enum FieldValue {
    Priority { value: Priority },
    StoryPoints { value: Option<u32> },
    Summary { value: String },
}

impl FieldValue {
    pub fn name(&self) -> &'static str {
        match self {
            FieldValue::Priority { .. } => "priority",
            FieldValue::StoryPoints { .. } => "story_points",
            FieldValue::Summary { .. } => "summary",
        }
    }
}

/// What the executor needs from a tracker vendor.
pub trait TrackerApi: Send + Sync {
    fn fetch_tree(&self, epic: &IssueKey) -> Result<RemoteEpic, ApiError>;
    fn create_story(&self, epic: &IssueKey, fields: &StoryFields) -> Result<IssueKey, ApiError>;
    fn create_subtask(&self, parent: &IssueKey, fields: &SubtaskFields)
    -> Result<IssueKey, ApiError>;
    fn update_field(&self, id: &IssueKey, value: &FieldValue) -> Result<(), ApiError>;
    fn update_description(&self, id: &IssueKey, body: &AdfNode) -> Result<(), ApiError>;
    fn transition(&self, id: &IssueKey, transition: &str) -> Result<(), ApiError>;
    fn add_comment(&self, id: &IssueKey, body: &AdfNode) -> Result<(), ApiError>;
}

// =============================================================================
// Errors
// =============================================================================

/// Tracker call failures.
#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum ApiError {
    #[error("rate limited{}", retry_after_suffix(.retry_after))]
    RateLimited { retry_after: Option<Duration> },

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("tracker returned {status}: {body}")]
    Http { status: u16, body: String },

    #[error("issue not found: {0}")]
    NotFound(IssueKey),

    #[error("authentication rejected")]
    Auth,

    #[error("operation not supported by this adapter: {0}")]
    Unsupported(&'static str),
}

fn retry_after_suffix(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(d) => format!(" (retry after {d:?})"),
        None => String::new(),
    }
}

impl ApiError {
    pub fn transience(&self) -> Transience {
        match self {
            ApiError::RateLimited { .. } | ApiError::Timeout(_) => Transience::Retryable,
            ApiError::Http { status, .. } if *status >= 500 => Transience::Retryable,
            ApiError::Http { .. } | ApiError::NotFound(_) | ApiError::Auth => Transience::Permanent,
            ApiError::Unsupported(_) => Transience::Permanent,
        }
    }

    pub fn effect(&self) -> Effect {
        match self {
            // A timeout may have landed on the server before the deadline.
            ApiError::Timeout(_) => Effect::Unknown,
            ApiError::Http { status, .. } if *status >= 500 => Effect::Unknown,
            _ => Effect::None,
        }
    }
}

// =============================================================================
// Caching decorator
// =============================================================================

/// Memoizes `fetch_tree` behind an explicit TTL. Mutations pass through and
/// invalidate the cached tree for the touched epic's project.
pub struct CachedTracker<T> {
    inner: T,
    clock: Arc<dyn Clock>,
    trees: TtlCache<IssueKey, RemoteEpic>,
}

impl<T: TrackerApi> CachedTracker<T> {
    pub fn new(inner: T, ttl: Duration) -> Self {
        Self::with_clock(inner, ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(inner: T, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner,
            clock,
            trees: TtlCache::new(ttl),
        }
    }

    fn invalidate_all(&self) {
        // Any mutation invalidates; epics are few, correctness beats reuse.
        self.trees.clear();
    }
}

impl<T: TrackerApi> TrackerApi for CachedTracker<T> {
    fn fetch_tree(&self, epic: &IssueKey) -> Result<RemoteEpic, ApiError> {
        if let Some(tree) = self.trees.get(epic, self.clock.as_ref()) {
            tracing::debug!(%epic, "fetch_tree served from cache");
            return Ok(tree);
        }
        let tree = self.inner.fetch_tree(epic)?;
        self.trees.insert(epic.clone(), tree.clone(), self.clock.as_ref());
        Ok(tree)
    }

    fn create_story(&self, epic: &IssueKey, fields: &StoryFields) -> Result<IssueKey, ApiError> {
        self.trees.invalidate(epic);
        self.inner.create_story(epic, fields)
    }

    fn create_subtask(
        &self,
        parent: &IssueKey,
        fields: &SubtaskFields,
    ) -> Result<IssueKey, ApiError> {
        self.invalidate_all();
        self.inner.create_subtask(parent, fields)
    }

    fn update_field(&self, id: &IssueKey, value: &FieldValue) -> Result<(), ApiError> {
        self.invalidate_all();
        self.inner.update_field(id, value)
    }

    fn update_description(&self, id: &IssueKey, body: &AdfNode) -> Result<(), ApiError> {
        self.invalidate_all();
        self.inner.update_description(id, body)
    }

    fn transition(&self, id: &IssueKey, transition: &str) -> Result<(), ApiError> {
        self.invalidate_all();
        self.inner.transition(id, transition)
    }

    fn add_comment(&self, id: &IssueKey, body: &AdfNode) -> Result<(), ApiError> {
        self.invalidate_all();
        self.inner.add_comment(id, body)
    }
}

// =============================================================================
// Snapshot adapter (read-only)
// =============================================================================

/// Serves a previously exported snapshot as the remote tree. Lets analyze
/// and dry-run work without network or credentials; every mutating call is
/// rejected.
pub struct SnapshotTracker {
    tree: RemoteEpic,
}

impl SnapshotTracker {
    pub fn new(tree: RemoteEpic) -> Self {
        Self { tree }
    }

    /// Accepts either an export wrapper (`{ exported_at, tree }`) or a bare
    /// remote tree.
    pub fn load(path: &Path) -> crate::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::io(format!("failed to read {}", path.display()), e))?;
        if let Ok(snapshot) = serde_json::from_str::<crate::exec::Snapshot>(&raw) {
            return Ok(Self {
                tree: snapshot.tree,
            });
        }
        let tree: RemoteEpic = serde_json::from_str(&raw).map_err(|e| {
            crate::Error::Api(ApiError::Http {
                status: 0,
                body: format!("snapshot {} is not a remote tree: {e}", path.display()),
            })
        })?;
        Ok(Self { tree })
    }
}

impl TrackerApi for SnapshotTracker {
    fn fetch_tree(&self, epic: &IssueKey) -> Result<RemoteEpic, ApiError> {
        if &self.tree.key != epic {
            return Err(ApiError::NotFound(epic.clone()));
        }
        Ok(self.tree.clone())
    }

    fn create_story(&self, _: &IssueKey, _: &StoryFields) -> Result<IssueKey, ApiError> {
        Err(ApiError::Unsupported("create_story"))
    }

    fn create_subtask(&self, _: &IssueKey, _: &SubtaskFields) -> Result<IssueKey, ApiError> {
        Err(ApiError::Unsupported("create_subtask"))
    }

    fn update_field(&self, _: &IssueKey, _: &FieldValue) -> Result<(), ApiError> {
        Err(ApiError::Unsupported("update_field"))
    }

    fn update_description(&self, _: &IssueKey, _: &AdfNode) -> Result<(), ApiError> {
        Err(ApiError::Unsupported("update_description"))
    }

    fn transition(&self, _: &IssueKey, _: &str) -> Result<(), ApiError> {
        Err(ApiError::Unsupported("transition"))
    }

    fn add_comment(&self, _: &IssueKey, _: &AdfNode) -> Result<(), ApiError> {
        Err(ApiError::Unsupported("add_comment"))
    }
}
