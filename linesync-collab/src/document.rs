//! Shared line-oriented text buffer.
//!
//! Lines are stored the way they would be read from disk: every line except
//! possibly the last keeps its trailing `\n`, so joining all lines yields the
//! full text. Columns are counted in `char`s and never include the
//! terminator.
//!
//! Positions are 1-based lines and 0-based columns everywhere outside this
//! module; the conversion to vector indices happens here.

use serde::{Deserialize, Serialize};

/// Line terminator kept at the end of every line that has been split.
pub const TERMINATOR: char = '\n';

/// A (line, column) address. `line` is 1-based, `column` is 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub const fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }

    /// Start of the document.
    pub const fn origin() -> Self {
        Self { line: 1, column: 0 }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.line, self.column)
    }
}

/// The authoritative document: lines plus a version counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    lines: Vec<String>,
    version: u64,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// An empty document with a single empty line.
    pub fn new() -> Self {
        Self {
            lines: vec![String::new()],
            version: 0,
        }
    }

    /// Build a document from lines as produced by [`crate::storage::load_lines`].
    ///
    /// An empty sequence becomes a single empty line.
    pub fn from_lines(lines: Vec<String>) -> Self {
        if lines.is_empty() {
            return Self::new();
        }
        Self { lines, version: 0 }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Full text, terminators included.
    pub fn text(&self) -> String {
        self.lines.concat()
    }

    /// Number of chars on a 1-based line, excluding the terminator.
    /// Lines outside the document have length 0.
    pub fn line_len(&self, line: usize) -> usize {
        line.checked_sub(1)
            .and_then(|idx| self.lines.get(idx))
            .map_or(0, |text| visible_len(text))
    }

    /// Clamp an arbitrary signed address to the nearest valid position.
    pub fn clamp(&self, line: i64, column: i64) -> Position {
        let max_line = self.line_count() as i64;
        let line = line.clamp(1, max_line) as usize;
        let max_column = self.line_len(line) as i64;
        let column = column.clamp(0, max_column) as usize;
        Position { line, column }
    }

    /// Whether `pos` addresses a valid caret location.
    pub fn contains(&self, pos: Position) -> bool {
        pos.line >= 1 && pos.line <= self.line_count() && pos.column <= self.line_len(pos.line)
    }

    /// Insert `ch` before column `pos.column`.
    ///
    /// `pos` must satisfy [`Document::contains`].
    pub(crate) fn insert_char(&mut self, pos: Position, ch: char) {
        let text = &mut self.lines[pos.line - 1];
        let offset = byte_offset(text, pos.column);
        text.insert(offset, ch);
    }

    /// Split the line at `pos`: the prefix keeps a terminator, the suffix
    /// becomes the following line.
    pub(crate) fn split_line(&mut self, pos: Position) {
        let idx = pos.line - 1;
        let text = &mut self.lines[idx];
        let offset = byte_offset(text, pos.column);
        let suffix = text.split_off(offset);
        text.push(TERMINATOR);
        self.lines.insert(idx + 1, suffix);
    }

    /// Remove the char at `pos.column` (which must be before the terminator).
    pub(crate) fn remove_char(&mut self, pos: Position) {
        let text = &mut self.lines[pos.line - 1];
        let offset = byte_offset(text, pos.column);
        text.remove(offset);
    }

    /// Merge `line` into the line above it and return the visible length of
    /// the line above before the merge.
    ///
    /// `line` must be in `2..=line_count`.
    pub(crate) fn merge_with_previous(&mut self, line: usize) -> usize {
        let idx = line - 1;
        let tail = self.lines.remove(idx);
        let prev = &mut self.lines[idx - 1];
        if prev.ends_with(TERMINATOR) {
            prev.pop();
        }
        let joint = prev.chars().count();
        prev.push_str(&tail);
        joint
    }

    pub(crate) fn bump_version(&mut self) -> u64 {
        self.version += 1;
        self.version
    }
}

fn visible_len(text: &str) -> usize {
    let count = text.chars().count();
    if text.ends_with(TERMINATOR) {
        count - 1
    } else {
        count
    }
}

/// Byte offset of the `column`-th char, or the end of the string.
fn byte_offset(text: &str, column: usize) -> usize {
    text.char_indices()
        .nth(column)
        .map_or(text.len(), |(offset, _)| offset)
}
