//! Document model: one epic, its stories, and everything hanging off them.
//!
//! identity: validated key/hash newtypes
//! domain: status + priority vocabularies
//! document: the parsed tree itself

mod document;
mod domain;
mod error;
mod identity;

pub use document::{
    AcceptanceCriterion, CommitReference, EpicDocument, Story, Subtask, normalize_title,
};
pub use domain::{Priority, StoryStatus};
pub use error::CoreError;
pub use identity::{CommitHash, IssueKey, StoryId};
