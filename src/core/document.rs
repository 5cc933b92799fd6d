//! The parsed document tree.
//!
//! One epic per document; stories own their acceptance criteria, subtasks,
//! and commit references in document order. Built fresh from a markdown
//! snapshot on every run and discarded after planning.

use serde::{Deserialize, Serialize};

use super::domain::{Priority, StoryStatus};
use super::identity::{CommitHash, IssueKey, StoryId};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EpicDocument {
    /// Tracker key from the epic header. Absent = epic not created yet.
    pub key: Option<IssueKey>,
    pub title: String,
    pub stories: Vec<Story>,
}

impl EpicDocument {
    pub fn story(&self, id: &str) -> Option<&Story> {
        self.stories.iter().find(|s| s.id.as_str() == id)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Story {
    pub id: StoryId,
    pub title: String,
    /// Free-form role/want/benefit block, markdown preserved.
    pub description: String,
    /// Free-form notes block, appended to the rendered description.
    pub technical_notes: String,
    pub status: StoryStatus,
    pub priority: Priority,
    pub story_points: Option<u32>,
    pub acceptance: Vec<AcceptanceCriterion>,
    pub subtasks: Vec<Subtask>,
    pub commits: Vec<CommitReference>,
}

impl Story {
    pub fn is_linked(&self) -> bool {
        self.id.key().is_some()
    }

    /// Render the tracker-facing description as a markdown fragment:
    /// the role/want/benefit block, then acceptance criteria as a task
    /// list, then technical notes.
    pub fn render_description(&self) -> String {
        let mut parts: Vec<String> = Vec::new();
        if !self.description.is_empty() {
            parts.push(self.description.clone());
        }
        if !self.acceptance.is_empty() {
            let mut block = String::from("## Acceptance Criteria\n");
            for ac in &self.acceptance {
                let mark = if ac.checked { 'x' } else { ' ' };
                block.push_str(&format!("- [{mark}] {}\n", ac.text));
            }
            parts.push(block.trim_end().to_string());
        }
        if !self.technical_notes.is_empty() {
            parts.push(format!("## Technical Notes\n{}", self.technical_notes));
        }
        parts.join("\n\n")
    }

    /// Normalized title for fallback matching against tracker summaries:
    /// lowercase, punctuation stripped, whitespace collapsed.
    pub fn normalized_title(&self) -> String {
        normalize_title(&self.title)
    }
}

pub fn normalize_title(title: &str) -> String {
    let lowered = title.to_lowercase();
    let stripped: String = lowered
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// One checkbox line under `Acceptance Criteria`. Position is display
/// order, not identity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptanceCriterion {
    pub text: String,
    pub checked: bool,
}

/// One row of the subtask table. `seq` is 1-based and unique within the
/// story; renumbering is a rename, not a move.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Subtask {
    pub seq: u32,
    pub title: String,
    pub description: String,
    pub story_points: Option<u32>,
    pub status: StoryStatus,
}

impl Subtask {
    pub fn render_description(&self) -> String {
        match self.story_points {
            Some(sp) => format!("{}\n\nStory Points: {sp}", self.description),
            None => self.description.clone(),
        }
    }
}

/// One row of the commit table. Immutable once recorded; new commits are
/// appended, never rewritten.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitReference {
    pub hash: CommitHash,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn story() -> Story {
        Story {
            id: StoryId::parse("US-001").unwrap(),
            title: "Login flow".into(),
            description: "**As a** user\n**I want** to log in\n**So that** I see my data".into(),
            technical_notes: String::new(),
            status: StoryStatus::Planned,
            priority: Priority::Medium,
            story_points: Some(3),
            acceptance: vec![
                AcceptanceCriterion {
                    text: "form validates".into(),
                    checked: true,
                },
                AcceptanceCriterion {
                    text: "session persists".into(),
                    checked: false,
                },
            ],
            subtasks: vec![],
            commits: vec![],
        }
    }

    #[test]
    fn description_render_includes_acceptance() {
        let rendered = story().render_description();
        assert!(rendered.starts_with("**As a** user"));
        assert!(rendered.contains("## Acceptance Criteria"));
        assert!(rendered.contains("- [x] form validates"));
        assert!(rendered.contains("- [ ] session persists"));
    }

    #[test]
    fn description_render_appends_notes() {
        let mut s = story();
        s.technical_notes = "uses OAuth".into();
        let rendered = s.render_description();
        assert!(rendered.ends_with("## Technical Notes\nuses OAuth"));
    }

    #[test]
    fn title_normalization() {
        assert_eq!(normalize_title("Login  Flow! (Future)"), "login flow future");
        assert_eq!(normalize_title("API: v2"), "api v2");
    }

    #[test]
    fn subtask_description_carries_points() {
        let st = Subtask {
            seq: 1,
            title: "Setup".into(),
            description: "scaffold".into(),
            story_points: Some(2),
            status: StoryStatus::Planned,
        };
        assert_eq!(st.render_description(), "scaffold\n\nStory Points: 2");
    }
}
