// SPDX-License-Identifier: MIT OR Apache-2.0
//! Positional primitives and the symbol taxonomy shared by the per-file
//! indexer and the query database.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A 1-based line/column pair. Columns count bytes, matching what the
/// front end reports for spelling locations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    pub line: u16,
    pub column: u16,
}

impl Position {
    pub fn new(line: u16, column: u16) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Half-open source range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// Shorthand used heavily in tests: `Range::spanning(1, 7, 1, 10)`.
    pub fn spanning(start_line: u16, start_column: u16, end_line: u16, end_column: u16) -> Self {
        Self {
            start: Position::new(start_line, start_column),
            end: Position::new(end_line, end_column),
        }
    }

    pub fn contains(&self, line: u16, column: u16) -> bool {
        let p = Position::new(line, column);
        self.start <= p && p < self.end
    }

    /// Roughly how many columns the range spans. Multi-line ranges are
    /// treated as unboundedly large so point queries prefer tighter spans.
    pub fn size(&self) -> u32 {
        if self.start.line != self.end.line {
            return u32::MAX;
        }
        u32::from(self.end.column) - u32::from(self.start.column)
    }

    pub fn overlaps(&self, other: &Range) -> bool {
        self.start < other.end && other.start < self.end
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

macro_rules! local_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl From<usize> for $name {
            fn from(value: usize) -> Self {
                $name(value as u32)
            }
        }
    };
}

local_id!(
    /// Index into one `IndexFile`'s `types` table. Only meaningful within
    /// the index that allocated it.
    TypeId
);
local_id!(
    /// Index into one `IndexFile`'s `funcs` table.
    FuncId
);
local_id!(
    /// Index into one `IndexFile`'s `vars` table.
    VarId
);
local_id!(
    /// Index into the dependency/file table of one parse.
    FileId
);

/// The source language of a file, as reported per declaration by the front
/// end. Ordered so that a "greater" language upgrades a file (a header seen
/// from both C and C++ translation units ends up `Cpp`).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum LanguageId {
    #[default]
    Unknown,
    C,
    Cpp,
    ObjC,
}

impl LanguageId {
    /// Infer a language from a path extension. Used as the initial guess
    /// before any declaration arrives.
    pub fn from_path(path: &str) -> LanguageId {
        match path.rsplit('.').next() {
            Some("c") => LanguageId::C,
            Some("cc" | "cpp" | "cxx" | "c++" | "hh" | "hpp" | "hxx" | "h++") => LanguageId::Cpp,
            Some("m" | "mm") => LanguageId::ObjC,
            _ => LanguageId::Unknown,
        }
    }
}

/// Normalized symbol taxonomy. The front end's entity kinds collapse into
/// this closed set; see `indexer::symbol_kind_for_entity`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum ClangSymbolKind {
    #[default]
    Unknown,
    Enum,
    Struct,
    Union,
    TypeAlias,
    Function,
    Variable,
    Parameter,
    Field,
    EnumConstant,
    Class,
    Protocol,
    Extension,
    InstanceMethod,
    ClassMethod,
    StaticMethod,
    InstanceProperty,
    StaticProperty,
    Namespace,
    NamespaceAlias,
    Constructor,
    Destructor,
    ConversionFunction,
    Macro,
}

/// One observed call site. `caller` is absent when the call happens outside
/// any indexed function (for example a global initializer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FuncRef<Id> {
    pub id: Option<Id>,
    pub loc: Range,
    pub is_implicit: bool,
}

impl<Id> FuncRef<Id> {
    pub fn new(id: Option<Id>, loc: Range, is_implicit: bool) -> Self {
        Self {
            id,
            loc,
            is_implicit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DiagnosticSeverity {
    Error = 1,
    Warning = 2,
    Information = 3,
    Hint = 4,
}

/// A diagnostic attributed to one indexed file, in editor coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub range: Range,
    pub severity: DiagnosticSeverity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// An `#include` recorded in the including file, with the resolved target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexInclude {
    pub line: u32,
    pub resolved_path: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_contains_is_half_open() {
        let r = Range::spanning(1, 7, 1, 10);
        assert!(r.contains(1, 7));
        assert!(r.contains(1, 9));
        assert!(!r.contains(1, 10));
        assert!(!r.contains(2, 1));
    }

    #[test]
    fn range_display_matches_editor_notation() {
        assert_eq!(Range::spanning(1, 7, 1, 10).to_string(), "1:7-1:10");
        assert_eq!(Range::spanning(5, 1, 6, 2).to_string(), "5:1-6:2");
    }

    #[test]
    fn multi_line_ranges_sort_after_single_line_by_size() {
        assert!(Range::spanning(1, 1, 2, 1).size() > Range::spanning(1, 1, 1, 80).size());
    }

    #[test]
    fn language_upgrade_order() {
        assert!(LanguageId::Cpp > LanguageId::C);
        assert!(LanguageId::C > LanguageId::Unknown);
        assert_eq!(LanguageId::from_path("foo/bar.cc"), LanguageId::Cpp);
        assert_eq!(LanguageId::from_path("foo/bar.c"), LanguageId::C);
        assert_eq!(LanguageId::from_path("view.mm"), LanguageId::ObjC);
        assert_eq!(LanguageId::from_path("README"), LanguageId::Unknown);
    }
}
