//! Gap-buffered text store.
//!
//! The document is held as two byte segments around a virtual edit point:
//! `left` holds everything before the point, `right_rev` holds the tail in
//! reverse order. Moving the point costs O(bytes moved), so a run of edits
//! near the same offset stays cheap regardless of document size.

use crate::grapheme;
use crate::types::{Edit, Position};
use std::cell::{Cell, RefCell};

/// A mutable text store addressed by byte offset.
///
/// The store holds UTF-8 text. The grapheme-based coordinate APIs always
/// produce cluster-aligned offsets; callers going through raw byte offsets
/// are expected to keep edits on code-point boundaries.
#[derive(Debug, Clone)]
pub struct TextStore {
    left: Vec<u8>,
    right_rev: Vec<u8>,
    /// Byte offsets of line starts; first entry always 0.
    line_starts: RefCell<Vec<usize>>,
    line_index_dirty: Cell<bool>,
}

impl Default for TextStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TextStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            left: Vec::new(),
            right_rev: Vec::new(),
            line_starts: RefCell::new(vec![0]),
            line_index_dirty: Cell::new(false),
        }
    }

    /// Creates a store holding `text`, used when a document is loaded or
    /// replaced wholesale.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            left: text.into().into_bytes(),
            right_rev: Vec::new(),
            line_starts: RefCell::new(vec![0]),
            line_index_dirty: Cell::new(true),
        }
    }

    /// Total size in bytes.
    pub fn len(&self) -> usize {
        self.left.len() + self.right_rev.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Materializes the full document.
    pub fn text(&self) -> String {
        let mut bytes = Vec::with_capacity(self.len());
        bytes.extend_from_slice(&self.left);
        bytes.extend(self.right_rev.iter().rev().copied());
        String::from_utf8_lossy(&bytes).into_owned()
    }

    /// Moves the edit point to `offset`, shifting bytes between segments.
    ///
    /// Panics if `offset` is past the end of the store.
    fn move_gap(&mut self, offset: usize) {
        assert!(
            offset <= self.len(),
            "TextStore::move_gap: offset {} out of range (size {})",
            offset,
            self.len()
        );
        if offset < self.left.len() {
            let tail = self.left.split_off(offset);
            self.right_rev.extend(tail.into_iter().rev());
        } else if offset > self.left.len() {
            let take = offset - self.left.len();
            let keep = self.right_rev.len() - take;
            let moved = self.right_rev.split_off(keep);
            self.left.extend(moved.into_iter().rev());
        }
    }

    /// Inserts `text` at a byte offset in `[0, len]`.
    pub fn insert(&mut self, offset: usize, text: &str) {
        self.move_gap(offset);
        self.left.extend_from_slice(text.as_bytes());
        self.line_index_dirty.set(true);
    }

    /// Removes up to `length` bytes starting at `offset`, clamping at the
    /// end of the store. A zero `length` is a no-op.
    pub fn erase(&mut self, offset: usize, length: usize) {
        if length == 0 {
            return;
        }
        self.move_gap(offset);
        let take = length.min(self.right_rev.len());
        self.right_rev.truncate(self.right_rev.len() - take);
        self.line_index_dirty.set(true);
    }

    /// Atomic erase-then-insert. Returns an [`Edit`] capturing the exact
    /// removed and inserted text so the mutation can be undone losslessly.
    pub fn replace(&mut self, offset: usize, length: usize, text: &str) -> Edit {
        self.move_gap(offset);
        let take = length.min(self.right_rev.len());
        let keep = self.right_rev.len() - take;
        let mut removed = self.right_rev.split_off(keep);
        removed.reverse();
        self.left.extend_from_slice(text.as_bytes());
        self.line_index_dirty.set(true);
        Edit {
            offset,
            inserted: text.to_string(),
            removed: String::from_utf8_lossy(&removed).into_owned(),
        }
    }

    /// Returns the byte at `offset`.
    ///
    /// Raw access: panics when `offset` is out of range.
    pub fn byte_at(&self, offset: usize) -> u8 {
        if offset < self.left.len() {
            return self.left[offset];
        }
        let right_index = offset - self.left.len();
        assert!(
            right_index < self.right_rev.len(),
            "TextStore::byte_at: offset {} out of range (size {})",
            offset,
            self.len()
        );
        self.right_rev[self.right_rev.len() - right_index - 1]
    }

    /// Returns the text in `[start, end)`, clamped to the store extent.
    pub fn slice(&self, start: usize, end: usize) -> String {
        if start >= end || start >= self.len() {
            return String::new();
        }
        let end = end.min(self.len());
        let split = self.left.len();
        let mut bytes = Vec::with_capacity(end - start);
        if start < split {
            bytes.extend_from_slice(&self.left[start..end.min(split)]);
        }
        if end > split {
            let from = start.max(split) - split;
            let to = end - split;
            for i in from..to {
                bytes.push(self.right_rev[self.right_rev.len() - 1 - i]);
            }
        }
        String::from_utf8_lossy(&bytes).into_owned()
    }

    /// Number of lines. A trailing newline opens a final empty line; an
    /// empty store has one line.
    pub fn line_count(&self) -> usize {
        self.ensure_line_index();
        self.line_starts.borrow().len()
    }

    /// Byte offset of the start of line `line_index`, or the document
    /// length when the index is past the last line.
    pub fn line_start(&self, line_index: usize) -> usize {
        self.ensure_line_index();
        self.line_starts
            .borrow()
            .get(line_index)
            .copied()
            .unwrap_or_else(|| self.len())
    }

    /// Text of line `line_index` with the trailing newline stripped, or an
    /// empty string when the index is past the last line.
    pub fn line_text(&self, line_index: usize) -> String {
        let start = self.line_start(line_index);
        if start >= self.len() {
            return String::new();
        }
        let mut end = self.len();
        {
            let starts = self.line_starts.borrow();
            if line_index + 1 < starts.len() {
                end = starts[line_index + 1];
            }
        }
        if end > start && self.byte_at(end - 1) == b'\n' {
            end -= 1;
        }
        self.slice(start, end)
    }

    /// Number of grapheme clusters on line `line_index`.
    pub fn line_grapheme_count(&self, line_index: usize) -> usize {
        grapheme::count(&self.line_text(line_index))
    }

    /// Maps a byte offset to a (line, grapheme column) position. Offsets
    /// past the end clamp to the last position.
    pub fn position_at(&self, offset: usize) -> Position {
        let offset = offset.min(self.len());
        self.ensure_line_index();
        let (line_index, start) = {
            let starts = self.line_starts.borrow();
            let idx = starts.partition_point(|&s| s <= offset);
            let line_index = idx.saturating_sub(1);
            (line_index, starts[line_index])
        };
        let column = grapheme::count(&self.slice(start, offset));
        Position::new(line_index as u32, column as u32)
    }

    /// Maps a (line, grapheme column) position to a byte offset. A line
    /// index past the last line resolves to the document end; a column past
    /// the line's clusters clamps to the end of the line's byte range.
    pub fn offset_at(&self, pos: Position) -> usize {
        self.ensure_line_index();
        let (start, end) = {
            let starts = self.line_starts.borrow();
            let line = pos.line as usize;
            if line >= starts.len() {
                return self.len();
            }
            let start = starts[line];
            let end = if line + 1 < starts.len() {
                starts[line + 1]
            } else {
                self.len()
            };
            (start, end)
        };
        let line_slice = self.slice(start, end);
        start + grapheme::byte_offset(&line_slice, pos.column as usize)
    }

    /// Rebuilds the line-start index if a mutation has invalidated it.
    /// Amortized O(size): one full scan per batch of edits.
    fn ensure_line_index(&self) {
        if !self.line_index_dirty.get() {
            return;
        }
        let mut starts = self.line_starts.borrow_mut();
        starts.clear();
        starts.push(0);
        for (i, &byte) in self.left.iter().enumerate() {
            if byte == b'\n' {
                starts.push(i + 1);
            }
        }
        let split = self.left.len();
        for (i, &byte) in self.right_rev.iter().rev().enumerate() {
            if byte == b'\n' {
                starts.push(split + i + 1);
            }
        }
        self.line_index_dirty.set(false);
    }
}
