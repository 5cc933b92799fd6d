//! Domain vocabularies.
//!
//! StoryStatus: planned, in_progress, done (document side)
//! Priority: critical, high, medium, low
//!
//! Documents write these with an emoji-or-word vocabulary (`✅ Done`,
//! `🔄 In Progress`, `📋 Planned`, `🔴 Critical`, ...). Decoding is
//! tolerant of either form; unknown values are rejected by the parser.

use serde::{Deserialize, Serialize};

/// Story/subtask completion state on the document side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoryStatus {
    Planned,
    InProgress,
    Done,
}

impl StoryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planned => "planned",
            Self::InProgress => "in_progress",
            Self::Done => "done",
        }
    }

    /// Decode the document vocabulary. `None` for anything unrecognized.
    pub fn decode(raw: &str) -> Option<Self> {
        let s = raw.trim();
        let lower = s.to_lowercase();
        if s.contains('✅') || lower.contains("done") || lower.contains("complete") {
            return Some(Self::Done);
        }
        if s.contains('🔄') || lower.contains("progress") {
            return Some(Self::InProgress);
        }
        if s.contains('📋') || lower.contains("planned") || lower.contains("todo") {
            return Some(Self::Planned);
        }
        None
    }

    /// The tracker workflow status this state maps to.
    pub fn tracker_status(&self) -> &'static str {
        match self {
            Self::Planned => "Open",
            Self::InProgress => "In Progress",
            Self::Done => "Resolved",
        }
    }
}

impl Default for StoryStatus {
    fn default() -> Self {
        Self::Planned
    }
}

/// Story priority.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    /// Tracker-facing display name.
    pub fn tracker_name(&self) -> &'static str {
        match self {
            Self::Critical => "Critical",
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
        }
    }

    /// Decode the document vocabulary. Both Medium and Low share the 🟢
    /// emoji, so the word disambiguates. `None` for anything unrecognized.
    pub fn decode(raw: &str) -> Option<Self> {
        let s = raw.trim();
        let lower = s.to_lowercase();
        if s.contains('🔴') || lower.contains("critical") {
            return Some(Self::Critical);
        }
        if s.contains('🟡') || lower.contains("high") {
            return Some(Self::High);
        }
        if lower.contains("low") {
            return Some(Self::Low);
        }
        if s.contains('🟢') || lower.contains("medium") || lower.contains("med") {
            return Some(Self::Medium);
        }
        None
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::Medium
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_decodes_emoji_and_words() {
        assert_eq!(StoryStatus::decode("✅ Done"), Some(StoryStatus::Done));
        assert_eq!(
            StoryStatus::decode("🔄 In Progress"),
            Some(StoryStatus::InProgress)
        );
        assert_eq!(StoryStatus::decode("📋 Planned"), Some(StoryStatus::Planned));
        assert_eq!(StoryStatus::decode("done"), Some(StoryStatus::Done));
        assert_eq!(StoryStatus::decode("wip-ish"), None);
    }

    #[test]
    fn priority_green_disambiguated_by_word() {
        assert_eq!(Priority::decode("🟢 Medium"), Some(Priority::Medium));
        assert_eq!(Priority::decode("🟢 Low"), Some(Priority::Low));
        assert_eq!(Priority::decode("🔴 Critical"), Some(Priority::Critical));
        assert_eq!(Priority::decode("🟡 High"), Some(Priority::High));
        assert_eq!(Priority::decode("urgent"), None);
    }

    #[test]
    fn status_maps_to_tracker_workflow() {
        assert_eq!(StoryStatus::Planned.tracker_status(), "Open");
        assert_eq!(StoryStatus::InProgress.tracker_status(), "In Progress");
        assert_eq!(StoryStatus::Done.tracker_status(), "Resolved");
    }
}
