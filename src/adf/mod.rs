//! Rich-text conversion between markdown fragments and the tracker's
//! structured document format (ADF-shaped).
//!
//! Pure functions: the subset the parser emits (bold, checkboxes, fenced
//! code blocks with a language tag, inline code, simple tables) round-trips
//! losslessly; everything else degrades to a plain paragraph instead of
//! failing. Nothing here touches the network.

use serde::{Deserialize, Serialize};

use crate::core::CommitReference;

// =============================================================================
// Node tree
// =============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AdfNode {
    Doc {
        version: u8,
        content: Vec<AdfNode>,
    },
    Heading {
        attrs: HeadingAttrs,
        content: Vec<AdfNode>,
    },
    Paragraph {
        content: Vec<AdfNode>,
    },
    TaskList {
        attrs: LocalIdAttrs,
        content: Vec<AdfNode>,
    },
    TaskItem {
        attrs: TaskItemAttrs,
        content: Vec<AdfNode>,
    },
    BulletList {
        content: Vec<AdfNode>,
    },
    ListItem {
        content: Vec<AdfNode>,
    },
    CodeBlock {
        attrs: CodeBlockAttrs,
        content: Vec<AdfNode>,
    },
    Table {
        attrs: TableAttrs,
        content: Vec<AdfNode>,
    },
    TableRow {
        content: Vec<AdfNode>,
    },
    TableHeader {
        content: Vec<AdfNode>,
    },
    TableCell {
        content: Vec<AdfNode>,
    },
    Text {
        text: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        marks: Vec<Mark>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadingAttrs {
    pub level: u8,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LocalIdAttrs {
    #[serde(rename = "localId", default)]
    pub local_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskItemAttrs {
    #[serde(rename = "localId", default)]
    pub local_id: String,
    /// "TODO" or "DONE".
    pub state: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CodeBlockAttrs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableAttrs {
    #[serde(rename = "isNumberColumnEnabled")]
    pub is_number_column_enabled: bool,
    pub layout: String,
}

impl Default for TableAttrs {
    fn default() -> Self {
        Self {
            is_number_column_enabled: false,
            layout: "default".into(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Mark {
    Strong,
    Em,
    Code,
}

impl AdfNode {
    pub fn doc(content: Vec<AdfNode>) -> AdfNode {
        let content = if content.is_empty() {
            vec![AdfNode::paragraph_text(" ")]
        } else {
            content
        };
        AdfNode::Doc {
            version: 1,
            content,
        }
    }

    pub fn paragraph_text(text: &str) -> AdfNode {
        AdfNode::Paragraph {
            content: vec![AdfNode::Text {
                text: text.to_string(),
                marks: Vec::new(),
            }],
        }
    }

    fn text(text: impl Into<String>) -> AdfNode {
        AdfNode::Text {
            text: text.into(),
            marks: Vec::new(),
        }
    }

    fn marked(text: impl Into<String>, mark: Mark) -> AdfNode {
        AdfNode::Text {
            text: text.into(),
            marks: vec![mark],
        }
    }

    /// All raw text in the node, depth-first. Used for containment checks
    /// (e.g. commit hash lookup in comment bodies).
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        match self {
            AdfNode::Text { text, .. } => {
                if !out.is_empty() {
                    out.push(' ');
                }
                out.push_str(text);
            }
            AdfNode::Doc { content, .. }
            | AdfNode::Heading { content, .. }
            | AdfNode::Paragraph { content }
            | AdfNode::TaskList { content, .. }
            | AdfNode::TaskItem { content, .. }
            | AdfNode::BulletList { content }
            | AdfNode::ListItem { content }
            | AdfNode::CodeBlock { content, .. }
            | AdfNode::Table { content, .. }
            | AdfNode::TableRow { content }
            | AdfNode::TableHeader { content }
            | AdfNode::TableCell { content } => {
                for child in content {
                    child.collect_text(out);
                }
            }
        }
    }
}

// =============================================================================
// markdown -> rich text
// =============================================================================

/// Convert a markdown fragment to a rich-text document.
pub fn to_rich_text(fragment: &str) -> AdfNode {
    let mut blocks: Vec<AdfNode> = Vec::new();
    let mut lines = fragment.lines().peekable();
    // Open list being extended by consecutive item lines, if any.
    let mut open_list: Option<(bool, Vec<AdfNode>)> = None; // (is_task, items)

    while let Some(line) = lines.next() {
        let trimmed = line.trim_end();

        if trimmed.trim().is_empty() {
            flush_list(&mut open_list, &mut blocks);
            continue;
        }

        if let Some(rest) = trimmed.strip_prefix("```") {
            flush_list(&mut open_list, &mut blocks);
            let language = rest.trim();
            let language = (!language.is_empty()).then(|| language.to_string());
            let mut body = String::new();
            for code_line in lines.by_ref() {
                if code_line.trim_end() == "```" {
                    break;
                }
                if !body.is_empty() {
                    body.push('\n');
                }
                body.push_str(code_line);
            }
            blocks.push(AdfNode::CodeBlock {
                attrs: CodeBlockAttrs { language },
                content: vec![AdfNode::text(body)],
            });
            continue;
        }

        if let Some(text) = trimmed.strip_prefix("## ") {
            flush_list(&mut open_list, &mut blocks);
            blocks.push(AdfNode::Heading {
                attrs: HeadingAttrs { level: 2 },
                content: vec![AdfNode::text(text)],
            });
            continue;
        }
        if let Some(text) = trimmed.strip_prefix("### ") {
            flush_list(&mut open_list, &mut blocks);
            blocks.push(AdfNode::Heading {
                attrs: HeadingAttrs { level: 3 },
                content: vec![AdfNode::text(text)],
            });
            continue;
        }

        if let Some(item) = task_item(trimmed) {
            match &mut open_list {
                Some((true, items)) => items.push(item),
                _ => {
                    flush_list(&mut open_list, &mut blocks);
                    open_list = Some((true, vec![item]));
                }
            }
            continue;
        }

        if let Some(text) = bullet_text(trimmed) {
            let item = AdfNode::ListItem {
                content: vec![AdfNode::Paragraph {
                    content: parse_inline(text),
                }],
            };
            match &mut open_list {
                Some((false, items)) => items.push(item),
                _ => {
                    flush_list(&mut open_list, &mut blocks);
                    open_list = Some((false, vec![item]));
                }
            }
            continue;
        }

        if trimmed.starts_with('|') {
            flush_list(&mut open_list, &mut blocks);
            let mut rows: Vec<&str> = vec![trimmed];
            while let Some(next) = lines.peek() {
                if next.trim_end().starts_with('|') {
                    rows.push(lines.next().unwrap_or_default().trim_end());
                } else {
                    break;
                }
            }
            blocks.push(parse_table(&rows));
            continue;
        }

        flush_list(&mut open_list, &mut blocks);
        blocks.push(AdfNode::Paragraph {
            content: parse_inline(trimmed),
        });
    }
    flush_list(&mut open_list, &mut blocks);

    AdfNode::doc(blocks)
}

fn flush_list(open: &mut Option<(bool, Vec<AdfNode>)>, blocks: &mut Vec<AdfNode>) {
    if let Some((is_task, items)) = open.take() {
        blocks.push(if is_task {
            AdfNode::TaskList {
                attrs: LocalIdAttrs::default(),
                content: items,
            }
        } else {
            AdfNode::BulletList { content: items }
        });
    }
}

fn task_item(line: &str) -> Option<AdfNode> {
    let rest = line.strip_prefix("- [")?;
    let (mark, text) = rest.split_once("] ")?;
    let state = match mark {
        "x" | "X" => "DONE",
        " " => "TODO",
        _ => return None,
    };
    Some(AdfNode::TaskItem {
        attrs: TaskItemAttrs {
            local_id: String::new(),
            state: state.into(),
        },
        content: parse_inline(text),
    })
}

fn bullet_text(line: &str) -> Option<&str> {
    if line.starts_with("- [") {
        return None;
    }
    line.strip_prefix("- ").or_else(|| line.strip_prefix("* "))
}

fn parse_table(rows: &[&str]) -> AdfNode {
    let has_separator = rows.get(1).is_some_and(|r| is_separator_row(r));
    let mut out_rows = Vec::new();
    for (i, row) in rows.iter().enumerate() {
        if is_separator_row(row) {
            continue;
        }
        let header = has_separator && i == 0;
        let cells: Vec<AdfNode> = split_cells(row)
            .into_iter()
            .map(|cell| {
                let content = vec![AdfNode::Paragraph {
                    content: parse_inline(&cell),
                }];
                if header {
                    AdfNode::TableHeader { content }
                } else {
                    AdfNode::TableCell { content }
                }
            })
            .collect();
        out_rows.push(AdfNode::TableRow { content: cells });
    }
    AdfNode::Table {
        attrs: TableAttrs::default(),
        content: out_rows,
    }
}

fn is_separator_row(row: &str) -> bool {
    let inner = row.trim().trim_matches('|');
    !inner.is_empty()
        && inner
            .split('|')
            .all(|c| !c.trim().is_empty() && c.trim().chars().all(|ch| ch == '-' || ch == ':'))
}

fn split_cells(row: &str) -> Vec<String> {
    row.trim()
        .trim_start_matches('|')
        .trim_end_matches('|')
        .split('|')
        .map(|c| c.trim().to_string())
        .collect()
}

/// Inline formatting: `**bold**`, `*italic*`, `` `code` ``.
fn parse_inline(text: &str) -> Vec<AdfNode> {
    let mut out: Vec<AdfNode> = Vec::new();
    let mut plain = String::new();
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;

    let mut push_plain = |plain: &mut String, out: &mut Vec<AdfNode>| {
        if !plain.is_empty() {
            out.push(AdfNode::text(std::mem::take(plain)));
        }
    };

    while i < chars.len() {
        if chars[i] == '*' && i + 1 < chars.len() && chars[i + 1] == '*' {
            if let Some(end) = find_delim(&chars, i + 2, "**") {
                push_plain(&mut plain, &mut out);
                let inner: String = chars[i + 2..end].iter().collect();
                out.push(AdfNode::marked(inner, Mark::Strong));
                i = end + 2;
                continue;
            }
        } else if chars[i] == '`' {
            if let Some(end) = find_delim(&chars, i + 1, "`") {
                push_plain(&mut plain, &mut out);
                let inner: String = chars[i + 1..end].iter().collect();
                out.push(AdfNode::marked(inner, Mark::Code));
                i = end + 1;
                continue;
            }
        } else if chars[i] == '*' {
            if let Some(end) = find_delim(&chars, i + 1, "*") {
                push_plain(&mut plain, &mut out);
                let inner: String = chars[i + 1..end].iter().collect();
                out.push(AdfNode::marked(inner, Mark::Em));
                i = end + 1;
                continue;
            }
        }
        plain.push(chars[i]);
        i += 1;
    }
    push_plain(&mut plain, &mut out);

    if out.is_empty() {
        out.push(AdfNode::text(text));
    }
    out
}

fn find_delim(chars: &[char], from: usize, delim: &str) -> Option<usize> {
    let d: Vec<char> = delim.chars().collect();
    let mut i = from;
    while i + d.len() <= chars.len() {
        if chars[i..i + d.len()] == d[..] && i > from {
            return Some(i);
        }
        i += 1;
    }
    None
}

// =============================================================================
// rich text -> markdown
// =============================================================================

/// Render a rich-text document back to a markdown fragment. Inverse of
/// [`to_rich_text`] for the supported subset; unsupported nodes render as
/// their plain text.
pub fn from_rich_text(node: &AdfNode) -> String {
    match node {
        AdfNode::Doc { content, .. } => {
            let blocks: Vec<String> = content.iter().map(render_block).collect();
            blocks.join("\n")
        }
        other => render_block(other),
    }
}

fn render_block(node: &AdfNode) -> String {
    match node {
        AdfNode::Heading { attrs, content } => {
            let hashes = "#".repeat(attrs.level.clamp(1, 6) as usize);
            format!("{hashes} {}", render_inline(content))
        }
        AdfNode::Paragraph { content } => render_inline(content),
        AdfNode::TaskList { content, .. } => {
            let items: Vec<String> = content
                .iter()
                .map(|item| match item {
                    AdfNode::TaskItem { attrs, content } => {
                        let mark = if attrs.state == "DONE" { 'x' } else { ' ' };
                        format!("- [{mark}] {}", render_inline(content))
                    }
                    other => other.plain_text(),
                })
                .collect();
            items.join("\n")
        }
        AdfNode::BulletList { content } => {
            let items: Vec<String> = content
                .iter()
                .map(|item| match item {
                    AdfNode::ListItem { content } => {
                        let inner = content
                            .iter()
                            .map(render_block)
                            .collect::<Vec<_>>()
                            .join(" ");
                        format!("- {inner}")
                    }
                    other => other.plain_text(),
                })
                .collect();
            items.join("\n")
        }
        AdfNode::CodeBlock { attrs, content } => {
            let lang = attrs.language.as_deref().unwrap_or("");
            format!("```{lang}\n{}\n```", render_inline(content))
        }
        AdfNode::Table { content, .. } => render_table(content),
        AdfNode::Text { .. } => render_inline(std::slice::from_ref(node)),
        other => other.plain_text(),
    }
}

fn render_table(rows: &[AdfNode]) -> String {
    let mut lines = Vec::new();
    let mut header_cols = 0usize;
    for (i, row) in rows.iter().enumerate() {
        let AdfNode::TableRow { content } = row else {
            continue;
        };
        let is_header = content
            .iter()
            .all(|c| matches!(c, AdfNode::TableHeader { .. }));
        let cells: Vec<String> = content
            .iter()
            .map(|cell| match cell {
                AdfNode::TableHeader { content } | AdfNode::TableCell { content } => content
                    .iter()
                    .map(render_block)
                    .collect::<Vec<_>>()
                    .join(" "),
                other => other.plain_text(),
            })
            .collect();
        if i == 0 && is_header {
            header_cols = cells.len();
        }
        lines.push(format!("| {} |", cells.join(" | ")));
        if i == 0 && is_header {
            let seps = vec!["---"; header_cols];
            lines.push(format!("| {} |", seps.join(" | ")));
        }
    }
    lines.join("\n")
}

fn render_inline(nodes: &[AdfNode]) -> String {
    let mut out = String::new();
    for node in nodes {
        match node {
            AdfNode::Text { text, marks } => {
                let mut rendered = text.clone();
                for mark in marks {
                    rendered = match mark {
                        Mark::Strong => format!("**{rendered}**"),
                        Mark::Em => format!("*{rendered}*"),
                        Mark::Code => format!("`{rendered}`"),
                    };
                }
                out.push_str(&rendered);
            }
            other => out.push_str(&other.plain_text()),
        }
    }
    out
}

// =============================================================================
// Canned documents
// =============================================================================

/// The "Related Commits" comment body: heading plus a two-column table,
/// hashes code-marked.
pub fn commits_table(commits: &[CommitReference]) -> AdfNode {
    let mut rows = vec![AdfNode::TableRow {
        content: vec![
            AdfNode::TableHeader {
                content: vec![AdfNode::Paragraph {
                    content: vec![AdfNode::marked("Commit", Mark::Strong)],
                }],
            },
            AdfNode::TableHeader {
                content: vec![AdfNode::Paragraph {
                    content: vec![AdfNode::marked("Message", Mark::Strong)],
                }],
            },
        ],
    }];
    for commit in commits {
        rows.push(AdfNode::TableRow {
            content: vec![
                AdfNode::TableCell {
                    content: vec![AdfNode::Paragraph {
                        content: vec![AdfNode::marked(commit.hash.as_str(), Mark::Code)],
                    }],
                },
                AdfNode::TableCell {
                    content: vec![AdfNode::Paragraph {
                        content: vec![AdfNode::text(commit.message.clone())],
                    }],
                },
            ],
        });
    }
    AdfNode::doc(vec![
        AdfNode::Heading {
            attrs: HeadingAttrs { level: 3 },
            content: vec![AdfNode::text("Related Commits")],
        },
        AdfNode::Table {
            attrs: TableAttrs::default(),
            content: rows,
        },
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CommitHash;

    fn roundtrip(fragment: &str) {
        let doc = to_rich_text(fragment);
        assert_eq!(from_rich_text(&doc), fragment, "render mismatch");
        assert_eq!(to_rich_text(&from_rich_text(&doc)), doc, "reparse mismatch");
    }

    #[test]
    fn roundtrip_bold_and_code() {
        roundtrip("**As a** user with `sudo`");
    }

    #[test]
    fn roundtrip_checkboxes() {
        roundtrip("- [x] done thing\n- [ ] open thing");
    }

    #[test]
    fn roundtrip_fenced_code_block() {
        roundtrip("```rust\nfn main() {}\n```");
    }

    #[test]
    fn roundtrip_simple_table() {
        roundtrip("| Commit | Message |\n| --- | --- |\n| `abc1234` | fix |");
    }

    #[test]
    fn roundtrip_headings_and_list() {
        roundtrip("## Acceptance Criteria\n- [ ] validates\n## Technical Notes\nuses *retries*");
    }

    #[test]
    fn unknown_shape_falls_back_to_paragraph() {
        // Setext-ish underline is not in the subset; it must not be lost.
        let doc = to_rich_text("plain text\n====");
        let AdfNode::Doc { content, .. } = &doc else {
            panic!("expected doc");
        };
        assert_eq!(content.len(), 2);
        assert!(matches!(content[1], AdfNode::Paragraph { .. }));
    }

    #[test]
    fn unclosed_marks_stay_literal() {
        let doc = to_rich_text("a ** b ` c");
        assert_eq!(from_rich_text(&doc), "a ** b ` c");
    }

    #[test]
    fn empty_fragment_yields_placeholder_paragraph() {
        let doc = to_rich_text("");
        let AdfNode::Doc { content, .. } = &doc else {
            panic!("expected doc");
        };
        assert_eq!(content.len(), 1);
    }

    #[test]
    fn commits_table_serialization_shape() {
        let commits = vec![CommitReference {
            hash: CommitHash::parse("abc1234").unwrap(),
            message: "initial".into(),
        }];
        let doc = commits_table(&commits);
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["type"], "doc");
        assert_eq!(json["content"][0]["type"], "heading");
        assert_eq!(json["content"][1]["type"], "table");
        let text = doc.plain_text();
        assert!(text.contains("abc1234"));
        assert!(text.contains("Related Commits"));
    }
}
