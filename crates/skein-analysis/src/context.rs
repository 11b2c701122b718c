//! Caller-facing state for one analysis run.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::ModuleConfig;
use crate::diagnostic::Diagnostic;
use crate::engine::{CheckEngine, ConfigResolver, JsonLogSink, SourceResolver};
use crate::flags::FlagTable;

/// Receives every diagnostic of a run.
pub type ReportSink = Arc<dyn Fn(&Diagnostic) + Send + Sync>;

/// Receives `(module_name, annotated_source)` for passing modules.
pub type AnnotateSink = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// Callbacks, options and the transient engine handle of a run
///
/// Caller state lives in the closures. Every callback is optional: without
/// `report` the run is silent, without `resolve_source` no module resolves.
#[derive(Default)]
pub struct AnalysisContext {
    /// Worker threads; `0` picks a default and emits a notice
    pub thread_count: usize,
    pub flags: FlagTable,
    /// Configuration every module starts from
    pub config: ModuleConfig,

    report: Option<ReportSink>,
    annotate: Option<AnnotateSink>,
    resolve_source: Option<SourceResolver>,
    resolve_config: Option<ConfigResolver>,
    json_log: Option<JsonLogSink>,

    engine: Mutex<Option<Arc<dyn CheckEngine>>>,
}

impl AnalysisContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.thread_count = threads;
        self
    }

    pub fn with_flags(mut self, flags: FlagTable) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_config(mut self, config: ModuleConfig) -> Self {
        self.config = config;
        self
    }

    pub fn on_report<F>(mut self, f: F) -> Self
    where
        F: Fn(&Diagnostic) + Send + Sync + 'static,
    {
        self.report = Some(Arc::new(f));
        self
    }

    pub fn on_annotate<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &str) + Send + Sync + 'static,
    {
        self.annotate = Some(Arc::new(f));
        self
    }

    pub fn resolve_source_with<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.resolve_source = Some(Arc::new(f));
        self
    }

    pub fn resolve_config_with<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &mut ModuleConfig) + Send + Sync + 'static,
    {
        self.resolve_config = Some(Arc::new(f));
        self
    }

    pub fn on_json_log<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &str) + Send + Sync + 'static,
    {
        self.json_log = Some(Arc::new(f));
        self
    }

    /// Deliver a diagnostic; a no-op without a report callback.
    pub fn report(&self, diagnostic: &Diagnostic) {
        if let Some(report) = &self.report {
            report(diagnostic);
        }
    }

    pub fn wants_annotations(&self) -> bool {
        self.annotate.is_some()
    }

    pub fn annotate(&self, module_name: &str, annotated: &str) {
        if let Some(annotate) = &self.annotate {
            annotate(module_name, annotated);
        }
    }

    pub(crate) fn source_resolver(&self) -> Option<SourceResolver> {
        self.resolve_source.clone()
    }

    pub(crate) fn config_resolver(&self) -> Option<ConfigResolver> {
        self.resolve_config.clone()
    }

    pub(crate) fn json_log_sink(&self) -> Option<JsonLogSink> {
        self.json_log.clone()
    }

    /// The live engine, present only while a run is in progress.
    pub fn active_engine(&self) -> Option<Arc<dyn CheckEngine>> {
        self.engine.lock().clone()
    }

    pub fn is_running(&self) -> bool {
        self.engine.lock().is_some()
    }

    pub(crate) fn attach_engine(&self, engine: Arc<dyn CheckEngine>) {
        *self.engine.lock() = Some(engine);
    }

    pub(crate) fn detach_engine(&self) {
        self.engine.lock().take();
    }
}

impl std::fmt::Debug for AnalysisContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisContext")
            .field("thread_count", &self.thread_count)
            .field("flags", &self.flags)
            .field("config", &self.config)
            .field("report", &self.report.is_some())
            .field("annotate", &self.annotate.is_some())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::Category;

    #[test]
    fn test_fresh_context_is_idle_and_silent() {
        let ctx = AnalysisContext::new();
        assert_eq!(ctx.thread_count, 0);
        assert!(!ctx.is_running());
        assert!(!ctx.wants_annotations());
        ctx.report(&Diagnostic::host(Category::Notice, "dropped"));
        ctx.annotate("a", "b");
    }

    #[test]
    fn test_report_reaches_callback() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let ctx = AnalysisContext::new().on_report(move |d| sink.lock().push(d.message.clone()));

        ctx.report(&Diagnostic::host(Category::Warning, "one"));
        ctx.report(&Diagnostic::host(Category::Warning, "two"));
        assert_eq!(*seen.lock(), vec!["one", "two"]);
    }
}
