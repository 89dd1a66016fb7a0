//! Line diff between a snapshot and the current document

use similar::{Algorithm, ChangeTag, TextDiff};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffLineKind {
    Added,
    Deleted,
    Context,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffLine {
    pub kind: DiffLineKind,
    pub old_line_number: Option<u32>,
    pub new_line_number: Option<u32>,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextDiffResult {
    pub file_path: String,
    pub lines: Vec<DiffLine>,
}

impl TextDiffResult {
    pub fn added(&self) -> usize {
        self.count(DiffLineKind::Added)
    }

    pub fn deleted(&self) -> usize {
        self.count(DiffLineKind::Deleted)
    }

    pub fn has_changes(&self) -> bool {
        self.lines.iter().any(|l| l.kind != DiffLineKind::Context)
    }

    fn count(&self, kind: DiffLineKind) -> usize {
        self.lines.iter().filter(|l| l.kind == kind).count()
    }
}

/// Diff `old` (the snapshot) against `new` (the current text)
pub fn compute_text_diff(old: &str, new: &str, file_path: &str) -> TextDiffResult {
    let diff = TextDiff::configure()
        .algorithm(Algorithm::Myers)
        .diff_lines(old, new);

    let mut lines = Vec::new();
    let mut old_line = 0u32;
    let mut new_line = 0u32;
    for change in diff.iter_all_changes() {
        let content = change.to_string().trim_end_matches(['\r', '\n']).to_string();
        let line = match change.tag() {
            ChangeTag::Delete => {
                old_line += 1;
                DiffLine {
                    kind: DiffLineKind::Deleted,
                    old_line_number: Some(old_line),
                    new_line_number: None,
                    content,
                }
            }
            ChangeTag::Insert => {
                new_line += 1;
                DiffLine {
                    kind: DiffLineKind::Added,
                    old_line_number: None,
                    new_line_number: Some(new_line),
                    content,
                }
            }
            ChangeTag::Equal => {
                old_line += 1;
                new_line += 1;
                DiffLine {
                    kind: DiffLineKind::Context,
                    old_line_number: Some(old_line),
                    new_line_number: Some(new_line),
                    content,
                }
            }
        };
        lines.push(line);
    }

    TextDiffResult {
        file_path: file_path.to_string(),
        lines,
    }
}
