// SPDX-License-Identifier: MIT OR Apache-2.0
//! Source text helpers: line/column to byte offset mapping and range
//! slicing. The indexer uses these to synthesize hover strings from the
//! raw file contents.

use crate::types::{Position, Range};

/// The contents of one source file with a precomputed line-offset table.
#[derive(Debug, Clone)]
pub struct FileContents {
    pub path: String,
    pub content: String,
    /// Byte offset of the start of each 1-based line.
    line_offsets: Vec<usize>,
}

impl FileContents {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        let mut line_offsets = vec![0];
        for (i, b) in content.bytes().enumerate() {
            if b == b'\n' {
                line_offsets.push(i + 1);
            }
        }
        Self {
            path: path.into(),
            content,
            line_offsets,
        }
    }

    /// Byte offset of a 1-based position. `None` if the position is past
    /// the end of the file.
    pub fn to_offset(&self, position: Position) -> Option<usize> {
        let line = usize::from(position.line).checked_sub(1)?;
        let line_start = *self.line_offsets.get(line)?;
        let offset = line_start + usize::from(position.column) - 1;
        (offset <= self.content.len()).then_some(offset)
    }

    /// The exact source slice covered by `range`.
    pub fn slice(&self, range: Range) -> Option<&str> {
        let start = self.to_offset(range.start)?;
        let end = self.to_offset(range.end)?;
        self.content.get(start..end)
    }

    /// Slice from the end of one range to the end of another. This is the
    /// shape hover synthesis needs: everything after the spelled name up to
    /// the end of the declaration.
    pub fn slice_between(&self, from_end_of: Range, to_end_of: Range) -> Option<&str> {
        let start = self.to_offset(from_end_of.end)?;
        let end = self.to_offset(to_end_of.end)?;
        (start < end).then(|| self.content.get(start..end))?
    }
}

/// Map of path → contents captured during one parse. Populated from unsaved
/// editor buffers up front and lazily from disk for everything else.
pub type FileContentsMap = gxhash::HashMap<String, FileContents>;

/// Append `name` to a type spelling, inserting a space unless the spelling
/// already ends in a separator (`Foo*`, `Foo&`, `Foo `).
pub fn concat_type_and_name(type_desc: &mut String, name: &str) {
    if let Some(last) = type_desc.chars().last() {
        if last != ' ' && last != '*' && last != '&' {
            type_desc.push(' ');
        }
    }
    type_desc.push_str(name);
}

/// Length of the common prefix of two strings, with a bonus point when the
/// strings have equal length. Used to fuzzily match parameter type
/// descriptions ("a" vs "a" scores above "a" vs "a&&").
pub fn matching_prefix_score(a: &str, b: &str) -> i32 {
    let matched = a
        .bytes()
        .zip(b.bytes())
        .take_while(|(x, y)| x == y)
        .count() as i32;
    if a.len() == b.len() {
        matched + 1
    } else {
        matched
    }
}
