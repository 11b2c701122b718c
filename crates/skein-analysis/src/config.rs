//! Per-module checking configuration.
//!
//! The analysis context carries one default [`ModuleConfig`]. Before a module
//! is checked, a copy of it is handed to the caller's config resolver (if any),
//! which may adjust it for that module.

use serde::{Deserialize, Serialize};

use crate::lint::{LintCode, LintSet, LintSeverity, LintWarning};

/// How strictly a module is type checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Nonstrict,
    Strict,
    /// Declaration file; only parsed
    Definition,
    /// Type checking disabled
    NoCheck,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nonstrict => "nonstrict",
            Self::Strict => "strict",
            Self::Definition => "definition",
            Self::NoCheck => "nocheck",
        }
    }

    /// Whether type errors are produced at all in this mode.
    pub fn type_checks(&self) -> bool {
        matches!(self, Self::Nonstrict | Self::Strict)
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Checking configuration for one module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleConfig {
    pub mode: Mode,

    /// Accept `declare` statements outside definition files
    pub allow_declaration_syntax: bool,

    /// Keep every comment and include them in the JSON check log
    pub capture_comments: bool,

    /// Rules that run at all
    pub enabled_lint: LintSet,

    /// Rules whose findings are reported as lint errors
    pub fatal_lint: LintSet,

    /// Report every lint finding as a lint error
    pub lint_errors: bool,

    /// Report type errors (syntax errors are always reported)
    pub type_errors: bool,

    /// Extra global names known to the checker
    pub globals: Vec<String>,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Nonstrict,
            allow_declaration_syntax: false,
            capture_comments: false,
            enabled_lint: LintSet::defaults(),
            fatal_lint: LintSet::empty(),
            lint_errors: false,
            type_errors: true,
            globals: Vec::new(),
        }
    }
}

impl ModuleConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the checking mode.
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Add a known global name.
    pub fn with_global(mut self, name: impl Into<String>) -> Self {
        self.globals.push(name.into());
        self
    }

    /// Report findings of `code` as lint errors.
    pub fn with_fatal_lint(mut self, code: LintCode) -> Self {
        self.fatal_lint.enable(code);
        self
    }

    /// Turn a rule off.
    pub fn without_lint(mut self, code: LintCode) -> Self {
        self.enabled_lint.disable(code);
        self
    }

    /// Report every lint finding as an error.
    pub fn with_lint_errors(mut self, enabled: bool) -> Self {
        self.lint_errors = enabled;
        self
    }

    pub fn with_declaration_syntax(mut self, enabled: bool) -> Self {
        self.allow_declaration_syntax = enabled;
        self
    }

    pub fn with_comment_capture(mut self, enabled: bool) -> Self {
        self.capture_comments = enabled;
        self
    }

    pub fn is_global(&self, name: &str) -> bool {
        self.globals.iter().any(|g| g == name)
    }

    /// Severity `code` reports at under this configuration.
    pub fn severity(&self, code: LintCode) -> LintSeverity {
        if self.lint_errors || self.fatal_lint.contains(code) {
            LintSeverity::Error
        } else {
            code.default_severity()
        }
    }

    /// Split raw lint findings into errors and warnings.
    ///
    /// Findings of disabled rules are dropped; input order is kept within
    /// each half.
    pub fn classify_lints(&self, findings: Vec<LintWarning>) -> (Vec<LintWarning>, Vec<LintWarning>) {
        findings
            .into_iter()
            .filter(|w| self.enabled_lint.contains(w.code))
            .partition(|w| self.severity(w.code) == LintSeverity::Error)
    }
}
