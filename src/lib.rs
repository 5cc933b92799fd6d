#![forbid(unsafe_code)]

pub mod adf;
pub mod cache;
pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod exec;
pub mod parse;
pub mod plan;
pub mod telemetry;
pub mod tracker;

pub use error::{Effect, Error, Transience};
pub type Result<T> = std::result::Result<T, Error>;

// Re-export core types at crate root for convenience
pub use crate::core::{
    AcceptanceCriterion, CommitHash, CommitReference, EpicDocument, IssueKey, Priority, Story,
    StoryId, StoryStatus, Subtask,
};
pub use crate::exec::{Answer, Confirmer, ExecMode, RunReport};
pub use crate::plan::{Phase, SyncOperation, SyncPlan};
pub use crate::tracker::{RemoteEpic, RemoteStory, RemoteSubtask, TrackerApi};
