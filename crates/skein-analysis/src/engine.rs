//! The contract between the orchestration layer and a checking engine.
//!
//! The driver never looks inside an engine. It queues root modules, hands
//! the engine a [`Submitter`] for the worker pool and blocks in
//! [`CheckEngine::check_queued_modules`] until the engine reports that the
//! whole dependency closure has been checked. Results are then read back by
//! name, single-threaded, after every worker has been joined.

use std::sync::Arc;

use serde::Serialize;
use skein_sched::Submitter;

use crate::config::ModuleConfig;
use crate::diagnostic::Location;
use crate::error::{AnalysisResult, InternalCompilerError};
use crate::flags::TunableRegistry;
use crate::lint::LintResult;

/// Looks up the source text of a module by name.
pub type SourceResolver = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Adjusts the configuration of one module in place.
pub type ConfigResolver = Arc<dyn Fn(&str, &mut ModuleConfig) + Send + Sync>;

/// Receives `(module_name, json_text)` check logs.
pub type JsonLogSink = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// What a type error carries
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "lowercase")]
pub enum TypeErrorData {
    Syntax(String),
    Type(String),
}

/// A syntax or type error found in a module
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeError {
    pub module_name: String,
    pub location: Location,
    pub data: TypeErrorData,
}

impl TypeError {
    pub fn syntax(module_name: impl Into<String>, location: Location, message: impl Into<String>) -> Self {
        Self {
            module_name: module_name.into(),
            location,
            data: TypeErrorData::Syntax(message.into()),
        }
    }

    pub fn type_error(
        module_name: impl Into<String>,
        location: Location,
        message: impl Into<String>,
    ) -> Self {
        Self {
            module_name: module_name.into(),
            location,
            data: TypeErrorData::Type(message.into()),
        }
    }

    pub fn is_syntax(&self) -> bool {
        matches!(self.data, TypeErrorData::Syntax(_))
    }

    pub fn message(&self) -> &str {
        match &self.data {
            TypeErrorData::Syntax(m) | TypeErrorData::Type(m) => m,
        }
    }
}

/// Result of checking one module. Immutable once published.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    pub errors: Vec<TypeError>,
    pub lint: LintResult,
}

impl CheckResult {
    /// Whether the module passes: no errors and no lint errors.
    pub fn passed(&self) -> bool {
        self.errors.is_empty() && self.lint.errors.is_empty()
    }
}

/// Options fixed when an engine is built
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckOptions {
    pub run_lint_checks: bool,
    /// Keep what is needed to render annotated sources afterwards
    pub retain_full_type_graphs: bool,
}

impl Default for CheckOptions {
    fn default() -> Self {
        Self {
            run_lint_checks: true,
            retain_full_type_graphs: false,
        }
    }
}

/// Everything an engine is constructed from.
#[derive(Clone)]
pub struct EngineSetup {
    pub resolve_source: Option<SourceResolver>,
    pub resolve_config: Option<ConfigResolver>,
    pub default_config: ModuleConfig,
    pub options: CheckOptions,
    pub tunables: Arc<TunableRegistry>,
    pub json_log: Option<JsonLogSink>,
}

impl EngineSetup {
    /// No resolvers, default config and options, standard tunables.
    pub fn new() -> Self {
        Self {
            resolve_source: None,
            resolve_config: None,
            default_config: ModuleConfig::default(),
            options: CheckOptions::default(),
            tunables: Arc::new(TunableRegistry::standard()),
            json_log: None,
        }
    }

    pub fn with_source_resolver<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.resolve_source = Some(Arc::new(f));
        self
    }

    pub fn with_config_resolver<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &mut ModuleConfig) + Send + Sync + 'static,
    {
        self.resolve_config = Some(Arc::new(f));
        self
    }

    pub fn with_options(mut self, options: CheckOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_tunables(mut self, tunables: TunableRegistry) -> Self {
        self.tunables = Arc::new(tunables);
        self
    }

    /// Source text of `name`, if the resolver knows it.
    pub fn source(&self, name: &str) -> Option<String> {
        self.resolve_source.as_ref().and_then(|resolve| resolve(name))
    }

    /// The default config adjusted for `name` by the config resolver.
    pub fn config_for(&self, name: &str) -> ModuleConfig {
        let mut config = self.default_config.clone();
        if let Some(resolve) = &self.resolve_config {
            resolve(name, &mut config);
        }
        config
    }
}

impl Default for EngineSetup {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EngineSetup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineSetup")
            .field("resolve_source", &self.resolve_source.is_some())
            .field("resolve_config", &self.resolve_config.is_some())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// A checking engine driven by the analysis driver.
///
/// Implementations must tolerate modules being checked in any interleaving
/// on any worker, and tasks submitting further tasks from worker threads.
pub trait CheckEngine: Send + Sync + 'static {
    /// Record `name` as a root to check on the next
    /// [`check_queued_modules`](Self::check_queued_modules).
    fn queue_module_check(&self, name: &str);

    /// Check every queued module and everything they transitively depend
    /// on, running the work through `submitter`.
    ///
    /// Blocks until the closure is exhausted and returns the names of every
    /// checked module. An internal error aborts the closure and is returned
    /// once in-flight work has drained.
    fn check_queued_modules(&self, submitter: &Submitter) -> Result<Vec<String>, InternalCompilerError>;

    /// Check result of a module from the last run.
    fn check_result(&self, name: &str) -> Option<Arc<CheckResult>>;

    /// Whether a parsed form of `name` exists.
    fn has_source_module(&self, name: &str) -> bool;

    /// Render the module source with inferred types inserted.
    ///
    /// Fails with [`AnalysisError::TypeGraphsNotRetained`](crate::AnalysisError::TypeGraphsNotRetained)
    /// if the engine was built without retention.
    fn annotated_source(&self, name: &str) -> AnalysisResult<String>;

    /// Module name as shown to users.
    fn human_readable_name(&self, name: &str) -> String {
        if name == "-" {
            "stdin".to_string()
        } else {
            name.to_string()
        }
    }
}
