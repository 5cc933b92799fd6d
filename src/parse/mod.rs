//! Line-oriented epic document parser.
//!
//! Structure, not markdown: the epic header is the first level-1 heading,
//! stories are level-3 headings, and `####` headings open named subsections
//! scoped to the enclosing story. Tables are parsed by fixed column order.
//!
//! Failure policy: a malformed epic/story header or unknown status/priority
//! vocabulary is fatal (`FormatError` with the line number); a malformed
//! table row is skipped with a recorded warning so one bad row cannot lose
//! the rest of the document.

use thiserror::Error;

use crate::core::{
    AcceptanceCriterion, CommitHash, CommitReference, EpicDocument, IssueKey, Priority, Story,
    StoryId, StoryStatus, Subtask,
};

/// The document does not match the expected structure. Always fatal before
/// any network call.
#[derive(Debug, Error, Clone)]
#[non_exhaustive]
pub enum FormatError {
    #[error("no epic header found (expected a `# ` heading)")]
    MissingEpicHeader,

    #[error("line {line}: malformed story header `{text}` (expected `### [emoji] ID: Title`)")]
    BadStoryHeader { line: usize, text: String },

    #[error("line {line}: unknown status value `{value}`")]
    UnknownStatus { line: usize, value: String },

    #[error("line {line}: unknown priority value `{value}`")]
    UnknownPriority { line: usize, value: String },

    #[error("line {line}: duplicate subtask number {seq}")]
    DuplicateSubtaskSeq { line: usize, seq: u32 },
}

/// A recoverable oddity: the offending line was skipped, everything else
/// parsed normally.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ParseWarning {
    pub line: usize,
    pub reason: String,
}

impl std::fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {}", self.line, self.reason)
    }
}

#[derive(Debug, Clone)]
pub struct Parsed {
    pub document: EpicDocument,
    pub warnings: Vec<ParseWarning>,
}

/// Story subsections, introduced by `#### ` headings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Description,
    Acceptance,
    Subtasks,
    Commits,
    TechnicalNotes,
    Unknown,
}

impl Section {
    fn from_heading(name: &str) -> Section {
        match name.trim().to_lowercase().as_str() {
            "description" => Section::Description,
            "acceptance criteria" => Section::Acceptance,
            "subtasks" => Section::Subtasks,
            "related commits" => Section::Commits,
            "technical notes" => Section::TechnicalNotes,
            _ => Section::Unknown,
        }
    }
}

/// Parse markdown text into an epic document.
pub fn parse(text: &str) -> Result<Parsed, FormatError> {
    Parser::new(text).run()
}

struct Parser<'a> {
    lines: Vec<&'a str>,
    warnings: Vec<ParseWarning>,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            lines: text.lines().collect(),
            warnings: Vec::new(),
        }
    }

    fn run(mut self) -> Result<Parsed, FormatError> {
        let (key, title) = self.epic_header()?;

        let mut stories: Vec<Story> = Vec::new();
        let mut current: Option<StoryBuilder> = None;
        let mut section = Section::None;

        for idx in 0..self.lines.len() {
            let line_no = idx + 1;
            let line = self.lines[idx];
            let trimmed = line.trim_end();

            if let Some(rest) = trimmed.strip_prefix("### ") {
                if let Some(done) = current.take() {
                    self.seal(done, &mut stories);
                }
                current = Some(self.story_header(line_no, rest)?);
                section = Section::None;
                continue;
            }
            if trimmed.starts_with("#### ") {
                section = Section::from_heading(&trimmed[5..]);
                continue;
            }
            // A same-or-higher-level heading or a rule closes the section.
            if trimmed.starts_with("## ") || trimmed.starts_with("# ") || trimmed == "---" {
                section = Section::None;
                continue;
            }

            let Some(story) = current.as_mut() else {
                continue;
            };

            match section {
                Section::None => self.metadata_row(line_no, trimmed, story)?,
                Section::Description => story.description_line(trimmed),
                Section::Acceptance => story.acceptance_line(trimmed),
                Section::TechnicalNotes => story.notes_line(trimmed),
                Section::Subtasks => self.subtask_row(line_no, trimmed, story)?,
                Section::Commits => self.commit_row(line_no, trimmed, story),
                Section::Unknown => {}
            }
        }
        if let Some(done) = current.take() {
            self.seal(done, &mut stories);
        }

        Ok(Parsed {
            document: EpicDocument {
                key,
                title,
                stories,
            },
            warnings: self.warnings,
        })
    }

    /// First `# ` heading: `# [KEY:] Title`.
    fn epic_header(&self) -> Result<(Option<IssueKey>, String), FormatError> {
        let header = self
            .lines
            .iter()
            .find_map(|l| l.trim_end().strip_prefix("# "))
            .ok_or(FormatError::MissingEpicHeader)?;
        let header = header.trim();
        if let Some((candidate, rest)) = header.split_once(':') {
            if IssueKey::is_valid(candidate.trim()) {
                let key = IssueKey::parse(candidate.trim()).ok();
                return Ok((key, rest.trim().to_string()));
            }
        }
        Ok((None, header.to_string()))
    }

    /// `### [emoji] ID: Title` — the emoji is optional and ignored.
    fn story_header(&self, line: usize, rest: &str) -> Result<StoryBuilder, FormatError> {
        let bad = || FormatError::BadStoryHeader {
            line,
            text: rest.to_string(),
        };
        let (before, title) = rest.split_once(':').ok_or_else(bad)?;
        let id_token = before.split_whitespace().last().ok_or_else(bad)?;
        let id = StoryId::parse(id_token).map_err(|_| bad())?;
        let title = title.trim();
        if title.is_empty() {
            return Err(bad());
        }
        Ok(StoryBuilder::new(id, title.to_string(), line))
    }

    /// Metadata table rows under the story heading:
    /// `| **Story Points** | 3 |`, `| **Priority** | 🟡 High |`, ...
    fn metadata_row(
        &mut self,
        line: usize,
        trimmed: &str,
        story: &mut StoryBuilder,
    ) -> Result<(), FormatError> {
        if !trimmed.starts_with('|') {
            return Ok(());
        }
        let cells = split_cells(trimmed);
        let [name, value] = cells.as_slice() else {
            return Ok(());
        };
        let name = name.trim_matches('*').trim().to_lowercase();
        let value = value.trim();
        match name.as_str() {
            "story points" => match value.parse::<u32>() {
                Ok(sp) => story.story_points = Some(sp),
                Err(_) => self.warn(line, format!("unreadable story points `{value}`")),
            },
            "priority" => {
                story.priority = Priority::decode(value).ok_or(FormatError::UnknownPriority {
                    line,
                    value: value.to_string(),
                })?;
            }
            "status" => {
                story.status = StoryStatus::decode(value).ok_or(FormatError::UnknownStatus {
                    line,
                    value: value.to_string(),
                })?;
            }
            _ => {}
        }
        Ok(())
    }

    /// `| # | Subtask | Description | SP | Status |` rows, fixed column order.
    fn subtask_row(
        &mut self,
        line: usize,
        trimmed: &str,
        story: &mut StoryBuilder,
    ) -> Result<(), FormatError> {
        if !trimmed.starts_with('|') || is_table_chrome(trimmed) {
            return Ok(());
        }
        let cells = split_cells(trimmed);
        let [seq, title, description, sp, status] = cells.as_slice() else {
            self.warn(
                line,
                format!("subtask row has {} columns, expected 5", cells.len()),
            );
            return Ok(());
        };
        let Ok(seq) = seq.parse::<u32>() else {
            self.warn(line, format!("subtask number `{seq}` is not a number"));
            return Ok(());
        };
        let Ok(sp) = sp.parse::<u32>() else {
            self.warn(line, format!("subtask story points `{sp}` is not a number"));
            return Ok(());
        };
        let status = StoryStatus::decode(status).ok_or(FormatError::UnknownStatus {
            line,
            value: status.to_string(),
        })?;
        if story.subtasks.iter().any(|s| s.seq == seq) {
            return Err(FormatError::DuplicateSubtaskSeq { line, seq });
        }
        story.subtasks.push(Subtask {
            seq,
            title: title.to_string(),
            description: description.to_string(),
            story_points: Some(sp),
            status,
        });
        Ok(())
    }

    /// `` | `hash` | Message | `` rows.
    fn commit_row(&mut self, line: usize, trimmed: &str, story: &mut StoryBuilder) {
        if !trimmed.starts_with('|') || is_table_chrome(trimmed) {
            return;
        }
        let cells = split_cells(trimmed);
        let [hash, message] = cells.as_slice() else {
            self.warn(
                line,
                format!("commit row has {} columns, expected 2", cells.len()),
            );
            return;
        };
        let raw = hash.trim_matches('`').trim();
        match CommitHash::parse(raw) {
            Ok(hash) => story.commits.push(CommitReference {
                hash,
                message: message.to_string(),
            }),
            Err(e) => self.warn(line, e.to_string()),
        }
    }

    /// Density check on close, then into the document. Sequence numbers
    /// must be unique (checked on insert); gaps only warn, attributed to
    /// the story header line.
    fn seal(&mut self, story: StoryBuilder, stories: &mut Vec<Story>) {
        let mut seqs: Vec<u32> = story.subtasks.iter().map(|s| s.seq).collect();
        seqs.sort_unstable();
        for (i, seq) in seqs.iter().enumerate() {
            if *seq != (i as u32) + 1 {
                self.warnings.push(ParseWarning {
                    line: story.line,
                    reason: format!(
                        "story {}: subtask numbers are not dense 1..{}",
                        story.id,
                        seqs.len()
                    ),
                });
                break;
            }
        }
        stories.push(story.finish());
    }

    fn warn(&mut self, line: usize, reason: String) {
        tracing::debug!(line, %reason, "skipping malformed row");
        self.warnings.push(ParseWarning { line, reason });
    }
}

fn is_table_chrome(row: &str) -> bool {
    // Header row or `|---|` separator.
    let inner = row.trim().trim_matches('|');
    let cells: Vec<&str> = inner.split('|').map(str::trim).collect();
    if cells
        .iter()
        .all(|c| !c.is_empty() && c.chars().all(|ch| ch == '-' || ch == ':'))
    {
        return true;
    }
    matches!(
        cells.first().map(|c| c.to_lowercase()),
        Some(ref c) if c == "#" || c == "commit"
    )
}

fn split_cells(row: &str) -> Vec<String> {
    row.trim()
        .trim_start_matches('|')
        .trim_end_matches('|')
        .split('|')
        .map(|c| c.trim().to_string())
        .collect()
}

struct StoryBuilder {
    id: StoryId,
    title: String,
    /// Header line, for warnings attributed to the story as a whole.
    line: usize,
    description: Vec<String>,
    notes: Vec<String>,
    status: StoryStatus,
    priority: Priority,
    story_points: Option<u32>,
    acceptance: Vec<AcceptanceCriterion>,
    subtasks: Vec<Subtask>,
    commits: Vec<CommitReference>,
}

impl StoryBuilder {
    fn new(id: StoryId, title: String, line: usize) -> Self {
        Self {
            id,
            title,
            line,
            description: Vec::new(),
            notes: Vec::new(),
            status: StoryStatus::default(),
            priority: Priority::default(),
            story_points: None,
            acceptance: Vec::new(),
            subtasks: Vec::new(),
            commits: Vec::new(),
        }
    }

    fn description_line(&mut self, line: &str) {
        self.description.push(line.to_string());
    }

    fn notes_line(&mut self, line: &str) {
        self.notes.push(line.to_string());
    }

    fn acceptance_line(&mut self, line: &str) {
        let Some(rest) = line.trim_start().strip_prefix("- [") else {
            return;
        };
        let Some((mark, text)) = rest.split_once(']') else {
            return;
        };
        let checked = mark == "x" || mark == "X";
        let text = text.trim();
        if !text.is_empty() {
            self.acceptance.push(AcceptanceCriterion {
                text: text.to_string(),
                checked,
            });
        }
    }

    fn finish(self) -> Story {
        Story {
            id: self.id,
            title: self.title,
            description: join_block(self.description),
            technical_notes: join_block(self.notes),
            status: self.status,
            priority: self.priority,
            story_points: self.story_points,
            acceptance: self.acceptance,
            subtasks: self.subtasks,
            commits: self.commits,
        }
    }
}

fn join_block(lines: Vec<String>) -> String {
    let joined = lines.join("\n");
    joined.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "\
# PROJ-100: Payments Epic

### 🔄 US-001: Checkout flow

| Field | Value |
|-------|-------|
| **Story Points** | 5 |
| **Priority** | 🟡 High |
| **Status** | 🔄 In Progress |

#### Description
**As a** shopper
**I want** to pay by card
**So that** checkout completes

#### Acceptance Criteria
- [x] card form renders
- [ ] 3DS challenge handled

#### Subtasks
| # | Subtask | Description | SP | Status |
|---|---------|-------------|-----|--------|
| 1 | Setup | scaffold module | 1 | ✅ Done |
| 2 | Card form | build the form | 2 | 📋 Planned |

#### Related Commits
| Commit | Message |
|--------|---------|
| `abc1234` | add card form |

#### Technical Notes
PCI scope is limited to the iframe.

### ✅ PROJ-142: Refunds

| **Story Points** | 3 |
| **Priority** | 🟢 Medium |
| **Status** | ✅ Done |
";

    #[test]
    fn parses_full_document() {
        let parsed = parse(DOC).unwrap();
        assert!(parsed.warnings.is_empty(), "{:?}", parsed.warnings);

        let doc = parsed.document;
        assert_eq!(doc.key.as_ref().unwrap().as_str(), "PROJ-100");
        assert_eq!(doc.title, "Payments Epic");
        assert_eq!(doc.stories.len(), 2);

        let s = &doc.stories[0];
        assert_eq!(s.id.as_str(), "US-001");
        assert_eq!(s.title, "Checkout flow");
        assert_eq!(s.status, StoryStatus::InProgress);
        assert_eq!(s.priority, Priority::High);
        assert_eq!(s.story_points, Some(5));
        assert!(s.description.starts_with("**As a** shopper"));
        assert_eq!(s.acceptance.len(), 2);
        assert!(s.acceptance[0].checked);
        assert_eq!(s.subtasks.len(), 2);
        assert_eq!(s.subtasks[0].seq, 1);
        assert_eq!(s.subtasks[0].status, StoryStatus::Done);
        assert_eq!(s.commits.len(), 1);
        assert_eq!(s.commits[0].hash.as_str(), "abc1234");
        assert_eq!(s.technical_notes, "PCI scope is limited to the iframe.");

        let r = &doc.stories[1];
        assert_eq!(r.id.as_str(), "PROJ-142");
        assert!(r.is_linked());
        assert_eq!(r.status, StoryStatus::Done);
    }

    #[test]
    fn missing_epic_header_is_fatal() {
        let err = parse("### US-001: thing\n").unwrap_err();
        assert!(matches!(err, FormatError::MissingEpicHeader));
    }

    #[test]
    fn malformed_story_header_is_fatal() {
        let err = parse("# Epic\n\n### no separator here\n").unwrap_err();
        assert!(matches!(err, FormatError::BadStoryHeader { line: 3, .. }));
    }

    #[test]
    fn unknown_status_is_fatal_with_line() {
        let text = "# Epic\n\n### US-001: thing\n\n| **Status** | ❓ Weird |\n";
        let err = parse(text).unwrap_err();
        assert!(matches!(err, FormatError::UnknownStatus { line: 5, .. }));
    }

    #[test]
    fn malformed_subtask_row_warns_and_continues() {
        let text = "\
# Epic

### US-001: thing

#### Subtasks
| # | Subtask | Description | SP | Status |
|---|---------|-------------|-----|--------|
| 1 | Setup | scaffold | 1 | 📋 Planned |
| 2 | Broken | missing sp column | 📋 Planned |
| 3 | Fine | also fine | 2 | ✅ Done |
";
        let parsed = parse(text).unwrap();
        assert_eq!(parsed.warnings.len(), 2); // bad row + non-dense numbering
        assert_eq!(parsed.warnings[0].line, 9);
        // The density warning points at the story header, not "line 0".
        assert_eq!(parsed.warnings[1].line, 3);
        assert!(parsed.warnings[1].reason.contains("not dense"));
        let s = &parsed.document.stories[0];
        assert_eq!(s.subtasks.len(), 2);
        assert_eq!(s.subtasks[1].seq, 3);
    }

    #[test]
    fn duplicate_subtask_seq_is_fatal() {
        let text = "\
# Epic

### US-001: thing

#### Subtasks
| 1 | Setup | a | 1 | 📋 Planned |
| 1 | Again | b | 1 | 📋 Planned |
";
        let err = parse(text).unwrap_err();
        assert!(matches!(
            err,
            FormatError::DuplicateSubtaskSeq { seq: 1, .. }
        ));
    }

    #[test]
    fn bad_commit_hash_warns() {
        let text = "\
# Epic

### US-001: thing

#### Related Commits
| `NOTHEX` | nope |
| `abc1234` | good |
";
        let parsed = parse(text).unwrap();
        assert_eq!(parsed.warnings.len(), 1);
        assert_eq!(parsed.document.stories[0].commits.len(), 1);
    }

    #[test]
    fn optional_sections_default_empty() {
        let parsed = parse("# Epic\n\n### US-001: bare story\n").unwrap();
        let s = &parsed.document.stories[0];
        assert!(s.acceptance.is_empty());
        assert!(s.subtasks.is_empty());
        assert!(s.commits.is_empty());
        assert_eq!(s.status, StoryStatus::Planned);
        assert_eq!(s.priority, Priority::Medium);
        assert_eq!(s.story_points, None);
    }

    #[test]
    fn epic_header_without_key() {
        let parsed = parse("# Just a Title\n").unwrap();
        assert!(parsed.document.key.is_none());
        assert_eq!(parsed.document.title, "Just a Title");
    }
}
