//! Identity newtypes.
//!
//! IssueKey: tracker key, `PROJ-123` shape, validated at construction
//! StoryId: tracker key or local placeholder (not yet created remotely)
//! CommitHash: abbreviated or full git hash, lowercase hex

use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::CoreError;

/// Tracker issue key: one or more uppercase ASCII letters, a dash, digits.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IssueKey(String);

impl IssueKey {
    pub fn parse(raw: impl AsRef<str>) -> Result<Self, CoreError> {
        let raw = raw.as_ref().trim();
        if Self::is_valid(raw) {
            Ok(Self(raw.to_string()))
        } else {
            Err(CoreError::InvalidKey {
                raw: raw.to_string(),
                reason: "expected uppercase project slug, dash, number (e.g. PROJ-123)".into(),
            })
        }
    }

    pub fn is_valid(raw: &str) -> bool {
        let Some((project, num)) = raw.split_once('-') else {
            return false;
        };
        !project.is_empty()
            && project.bytes().all(|b| b.is_ascii_uppercase())
            && !num.is_empty()
            && num.bytes().all(|b| b.is_ascii_digit())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Project slug, the part before the dash.
    pub fn project(&self) -> &str {
        self.0.split_once('-').map(|(p, _)| p).unwrap_or(&self.0)
    }
}

impl fmt::Display for IssueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for IssueKey {
    type Error = CoreError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        IssueKey::parse(s)
    }
}

impl From<IssueKey> for String {
    fn from(k: IssueKey) -> String {
        k.0
    }
}

/// Story identifier as written in the document.
///
/// Any token with the tracker key shape parses as `Key`; whether it actually
/// names a remote issue is the reconciliation engine's call, not ours.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoryId {
    Key(IssueKey),
    Local(String),
}

impl StoryId {
    pub fn parse(raw: impl AsRef<str>) -> Result<Self, CoreError> {
        let raw = raw.as_ref().trim();
        if raw.is_empty() {
            return Err(CoreError::InvalidStoryId {
                raw: raw.to_string(),
                reason: "empty identifier".into(),
            });
        }
        if IssueKey::is_valid(raw) {
            return Ok(StoryId::Key(IssueKey::parse(raw)?));
        }
        if raw.contains(char::is_whitespace) || raw.contains('|') {
            return Err(CoreError::InvalidStoryId {
                raw: raw.to_string(),
                reason: "identifier may not contain whitespace or pipes".into(),
            });
        }
        Ok(StoryId::Local(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        match self {
            StoryId::Key(k) => k.as_str(),
            StoryId::Local(s) => s,
        }
    }

    /// The tracker key this story claims to be linked to, if any.
    pub fn key(&self) -> Option<&IssueKey> {
        match self {
            StoryId::Key(k) => Some(k),
            StoryId::Local(_) => None,
        }
    }
}

impl fmt::Display for StoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Abbreviated or full git commit hash, 7 to 40 lowercase hex characters.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CommitHash(String);

impl CommitHash {
    pub fn parse(raw: impl AsRef<str>) -> Result<Self, CoreError> {
        let raw = raw.as_ref().trim();
        let len_ok = (7..=40).contains(&raw.len());
        let hex_ok = raw
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if len_ok && hex_ok {
            Ok(Self(raw.to_string()))
        } else {
            Err(CoreError::InvalidHash {
                raw: raw.to_string(),
                reason: "expected 7-40 lowercase hex characters".into(),
            })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommitHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for CommitHash {
    type Error = CoreError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        CommitHash::parse(s)
    }
}

impl From<CommitHash> for String {
    fn from(h: CommitHash) -> String {
        h.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_key_parse_valid() {
        let key = IssueKey::parse("PROJ-123").unwrap();
        assert_eq!(key.as_str(), "PROJ-123");
        assert_eq!(key.project(), "PROJ");

        let key = IssueKey::parse("  AB-1  ").unwrap();
        assert_eq!(key.as_str(), "AB-1");
    }

    #[test]
    fn issue_key_rejects_invalid() {
        assert!(IssueKey::parse("proj-123").is_err());
        assert!(IssueKey::parse("PROJ123").is_err());
        assert!(IssueKey::parse("PROJ-").is_err());
        assert!(IssueKey::parse("-123").is_err());
        assert!(IssueKey::parse("PROJ-12a").is_err());
        assert!(IssueKey::parse("").is_err());
    }

    #[test]
    fn story_id_classifies_key_shape() {
        assert!(matches!(StoryId::parse("US-001").unwrap(), StoryId::Key(_)));
        assert!(matches!(
            StoryId::parse("story-one").unwrap(),
            StoryId::Local(_)
        ));
        assert!(StoryId::parse("two words").is_err());
        assert!(StoryId::parse("").is_err());
    }

    #[test]
    fn commit_hash_bounds() {
        assert!(CommitHash::parse("abc1234").is_ok());
        assert!(CommitHash::parse(&"a".repeat(40)).is_ok());
        assert!(CommitHash::parse("abc123").is_err());
        assert!(CommitHash::parse(&"a".repeat(41)).is_err());
        assert!(CommitHash::parse("ABC1234").is_err());
        assert!(CommitHash::parse("xyz1234").is_err());
    }
}
