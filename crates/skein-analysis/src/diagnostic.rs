//! Diagnostics flowing from the checking engine to the caller.
//!
//! A [`Diagnostic`] is immutable once built. Each carries the human-readable
//! module name, a source range, a [`Category`] and the message text.

use serde::{Deserialize, Serialize};

use crate::lint::LintCode;

/// Module name used for diagnostics that do not belong to any module.
pub const HOST_MODULE: &str = "[Host]";

/// Position in a source file (0-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// Source range `[begin, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Location {
    pub begin: Position,
    pub end: Position,
}

impl Location {
    pub const fn new(begin: Position, end: Position) -> Self {
        Self { begin, end }
    }

    /// Range covering `len` columns on one line.
    pub const fn span(line: u32, column: u32, len: u32) -> Self {
        Self {
            begin: Position::new(line, column),
            end: Position::new(line, column + len),
        }
    }
}

/// What kind of finding a diagnostic reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    SyntaxError,
    TypeError,
    /// A lint finding, tagged with its rule
    Lint(LintCode),
    /// Driver/engine desynchronization detected while reporting
    Internal,
    NotFound,
    /// The engine hit an internal invariant violation; the run was aborted
    InternalCompilerError,
    Notice,
    /// Non-fatal configuration problem
    Warning,
}

impl Category {
    /// The stable tag passed to the report callback.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SyntaxError => "SyntaxError",
            Self::TypeError => "TypeError",
            Self::Lint(code) => code.name(),
            Self::Internal => "Internal",
            Self::NotFound => "Not Found",
            Self::InternalCompilerError => "InternalCompilerError",
            Self::Notice => "Notice",
            Self::Warning => "Warning",
        }
    }

    /// True for categories that make a module fail when reported as errors.
    pub fn is_error(&self) -> bool {
        !matches!(self, Self::Lint(_) | Self::Notice | Self::Warning)
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Category {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// One reported finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub module_name: String,
    pub location: Location,
    pub category: Category,
    pub message: String,
}

impl Diagnostic {
    pub fn new(
        module_name: impl Into<String>,
        location: Location,
        category: Category,
        message: impl Into<String>,
    ) -> Self {
        Self {
            module_name: module_name.into(),
            location,
            category,
            message: message.into(),
        }
    }

    /// A diagnostic about the run itself rather than any module.
    pub fn host(category: Category, message: impl Into<String>) -> Self {
        Self::new(HOST_MODULE, Location::default(), category, message)
    }

    /// Line number (1-indexed for display).
    pub fn line(&self) -> u32 {
        self.location.begin.line + 1
    }

    /// Column number (1-indexed for display).
    pub fn column(&self) -> u32 {
        self.location.begin.column + 1
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}({},{}): {}: {}",
            self.module_name,
            self.line(),
            self.column(),
            self.category,
            self.message
        )
    }
}

/// Format diagnostics one per line.
///
/// ```text
/// src/main.luau(10,5): TypeError: Unknown global 'foo'
/// ```
pub fn format_diagnostics(diagnostics: &[Diagnostic]) -> String {
    use std::fmt::Write;

    let mut output = String::new();
    for diag in diagnostics {
        writeln!(output, "{}", diag).ok();
    }
    output
}
