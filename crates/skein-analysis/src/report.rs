//! Result reporting after a completed run.
//!
//! Runs single-threaded once the pool has been joined. For each module, in
//! the order the engine returned them, diagnostics are emitted as: syntax
//! and type errors (engine order), then lint errors, then lint warnings.

use tracing::{debug, warn};

use crate::context::AnalysisContext;
use crate::diagnostic::{Category, Diagnostic, Location};
use crate::engine::CheckEngine;

/// Message for a module the engine has no check result for
pub const MISSING_RESULT: &str = "tried to report a module result for a non-existent module";

/// Message for a module the engine has no parsed form of
pub const MISSING_SOURCE: &str = "could not find this module";

/// Walks checked modules and feeds the context's callbacks
pub struct ResultReporter<'a, E: ?Sized> {
    ctx: &'a AnalysisContext,
    engine: &'a E,
}

impl<'a, E: CheckEngine + ?Sized> ResultReporter<'a, E> {
    pub fn new(ctx: &'a AnalysisContext, engine: &'a E) -> Self {
        Self { ctx, engine }
    }

    /// Report every module and return how many failed.
    pub fn report_all<S: AsRef<str>>(&self, modules: &[S]) -> usize {
        modules
            .iter()
            .filter(|name| !self.report_module(name.as_ref()))
            .count()
    }

    /// Report one module; returns whether it passed.
    pub fn report_module(&self, name: &str) -> bool {
        let human_name = self.engine.human_readable_name(name);

        let Some(result) = self.engine.check_result(name) else {
            self.emit(&human_name, Location::default(), Category::Internal, MISSING_RESULT);
            return false;
        };

        if !self.engine.has_source_module(name) {
            self.emit(&human_name, Location::default(), Category::NotFound, MISSING_SOURCE);
            return false;
        }

        for error in &result.errors {
            let category = if error.is_syntax() {
                Category::SyntaxError
            } else {
                Category::TypeError
            };
            let module = self.engine.human_readable_name(&error.module_name);
            self.emit(&module, error.location, category, error.message());
        }

        for lint in &result.lint.errors {
            self.emit(&human_name, lint.location, Category::Lint(lint.code), &lint.text);
        }

        for lint in &result.lint.warnings {
            self.emit(&human_name, lint.location, Category::Lint(lint.code), &lint.text);
        }

        let passed = result.passed();
        debug!(module = %human_name, passed, errors = result.errors.len(), "module reported");

        if passed && self.ctx.wants_annotations() {
            match self.engine.annotated_source(name) {
                Ok(annotated) => self.ctx.annotate(name, &annotated),
                Err(e) => warn!(module = %human_name, "skipping annotation: {}", e),
            }
        }

        passed
    }

    fn emit(&self, module: &str, location: Location, category: Category, message: &str) {
        self.ctx
            .report(&Diagnostic::new(module, location, category, message));
    }
}
