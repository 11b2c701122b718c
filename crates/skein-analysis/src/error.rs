//! Error types for skein-analysis

use skein_sched::PoolError;
use thiserror::Error;

use crate::diagnostic::Location;

/// Module name used when an internal error is not tied to a module
pub const UNKNOWN_MODULE: &str = "<unknown module>";

/// The checking engine hit an internal invariant violation.
///
/// This is fatal to the whole run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("internal compiler error in {}: {message}", .module_name.as_deref().unwrap_or(UNKNOWN_MODULE))]
pub struct InternalCompilerError {
    pub message: String,
    pub module_name: Option<String>,
    pub location: Option<Location>,
}

impl InternalCompilerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            module_name: None,
            location: None,
        }
    }

    pub fn in_module(mut self, module_name: impl Into<String>) -> Self {
        self.module_name = Some(module_name.into());
        self
    }

    pub fn at(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    /// Module name for reporting; [`UNKNOWN_MODULE`] when absent.
    pub fn module_or_unknown(&self) -> &str {
        self.module_name.as_deref().unwrap_or(UNKNOWN_MODULE)
    }
}

/// Errors from the analysis layer
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("worker pool error: {0}")]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Internal(#[from] InternalCompilerError),

    /// The engine was built without full type graph retention
    #[error("type graphs were not retained for module '{module}'")]
    TypeGraphsNotRetained { module: String },

    #[error("no check result for module '{0}'")]
    NoResult(String),
}

/// Result type using AnalysisError
pub type AnalysisResult<T> = Result<T, AnalysisError>;
