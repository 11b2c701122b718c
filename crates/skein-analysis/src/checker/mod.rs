//! Built-in checking engine for a Luau-like script language.
//!
//! [`BasicEngine`] discovers dependencies while it checks: every resolvable
//! `require` found in a module becomes a new check task on the same pool.
//! Termination is an in-flight counter under a mutex; the driving thread
//! sleeps on a condvar until it drops to zero. A task schedules its
//! dependencies before it retires, so the counter cannot reach zero while
//! any part of the closure is still undiscovered.
//!
//! The first internal error marks the run aborted. Nothing new is scheduled
//! after that, queued tasks return immediately, and
//! [`check_queued_modules`](CheckEngine::check_queued_modules) reports the
//! error once the counter drains.

mod analyze;
mod annotate;
mod lexer;
mod syntax;

use std::collections::{HashMap, HashSet};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use skein_sched::Submitter;
use tracing::{debug, error, warn};

use crate::config::Mode;
use crate::engine::{CheckEngine, CheckResult, EngineSetup, TypeError, TypeErrorData};
use crate::error::{AnalysisError, AnalysisResult, InternalCompilerError};
use crate::flags::names;
use crate::lint::{LintResult, LintWarning};

pub use analyze::{BUILTIN_GLOBALS, edit_distance};

use analyze::{Annotation, CapturedComment, analyze_module};

/// Reference [`CheckEngine`]
pub struct BasicEngine {
    inner: Arc<Inner>,
}

struct Inner {
    setup: EngineSetup,
    state: Mutex<State>,
    idle: Condvar,
}

#[derive(Default)]
struct State {
    queued: Vec<String>,
    roots: Vec<String>,
    scheduled: HashSet<String>,
    in_flight: usize,
    sources: HashMap<String, Option<Arc<str>>>,
    modules: HashMap<String, CheckedModule>,
    aborted: Option<InternalCompilerError>,
}

struct CheckedModule {
    result: Arc<CheckResult>,
    /// `None` when the module has no source
    parsed: Option<ParsedModule>,
    /// Resolvable dependencies, first occurrence order
    requires: Vec<String>,
}

struct ParsedModule {
    mode: Mode,
    retained: Option<Retained>,
}

struct Retained {
    source: Arc<str>,
    annotations: Vec<Annotation>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckLog<'a> {
    module_name: &'a str,
    mode: Mode,
    requires: &'a [String],
    errors: &'a [TypeError],
    lint: &'a LintResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    comments: Option<&'a [CapturedComment]>,
}

impl BasicEngine {
    pub fn new(setup: EngineSetup) -> Self {
        Self {
            inner: Arc::new(Inner {
                setup,
                state: Mutex::new(State::default()),
                idle: Condvar::new(),
            }),
        }
    }

    /// Effective mode a module was checked in.
    pub fn module_mode(&self, name: &str) -> Option<Mode> {
        let state = self.inner.state.lock();
        state
            .modules
            .get(name)
            .and_then(|m| m.parsed.as_ref())
            .map(|p| p.mode)
    }

    /// Resolvable modules `name` requires.
    pub fn dependencies(&self, name: &str) -> Vec<String> {
        let state = self.inner.state.lock();
        state
            .modules
            .get(name)
            .map(|m| m.requires.clone())
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for BasicEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("BasicEngine")
            .field("queued", &state.queued.len())
            .field("in_flight", &state.in_flight)
            .field("checked", &state.modules.len())
            .field("aborted", &state.aborted.is_some())
            .finish()
    }
}

impl CheckEngine for BasicEngine {
    fn queue_module_check(&self, name: &str) {
        self.inner.state.lock().queued.push(name.to_string());
    }

    fn check_queued_modules(&self, submitter: &Submitter) -> Result<Vec<String>, InternalCompilerError> {
        let roots = {
            let mut state = self.inner.state.lock();
            let roots = std::mem::take(&mut state.queued);
            state.modules.clear();
            state.scheduled.clear();
            state.sources.clear();
            state.aborted = None;
            state.roots = roots.clone();
            roots
        };

        for root in &roots {
            self.inner.schedule(root, submitter);
        }

        let mut state = self.inner.state.lock();
        while state.in_flight > 0 {
            self.inner.idle.wait(&mut state);
        }

        if let Some(ice) = state.aborted.take() {
            return Err(ice);
        }

        Ok(dependency_order(&state.roots, &state.modules))
    }

    fn check_result(&self, name: &str) -> Option<Arc<CheckResult>> {
        let state = self.inner.state.lock();
        state.modules.get(name).map(|m| Arc::clone(&m.result))
    }

    fn has_source_module(&self, name: &str) -> bool {
        let state = self.inner.state.lock();
        state.modules.get(name).is_some_and(|m| m.parsed.is_some())
    }

    fn annotated_source(&self, name: &str) -> AnalysisResult<String> {
        if !self.inner.setup.options.retain_full_type_graphs {
            return Err(AnalysisError::TypeGraphsNotRetained {
                module: name.to_string(),
            });
        }

        let state = self.inner.state.lock();
        let retained = state
            .modules
            .get(name)
            .and_then(|m| m.parsed.as_ref())
            .and_then(|p| p.retained.as_ref())
            .ok_or_else(|| AnalysisError::NoResult(name.to_string()))?;

        Ok(annotate::render(&retained.source, &retained.annotations))
    }
}

impl Inner {
    /// Submit a check of `name` unless it was already scheduled this run.
    fn schedule(self: &Arc<Self>, name: &str, submitter: &Submitter) {
        {
            let mut state = self.state.lock();
            if state.aborted.is_some() || !state.scheduled.insert(name.to_string()) {
                return;
            }
            state.in_flight += 1;
        }

        let inner = Arc::clone(self);
        let module = name.to_string();
        let next = submitter.clone();

        if submitter
            .submit(move || inner.run_check(&module, &next))
            .is_err()
        {
            self.abort(InternalCompilerError::new("worker pool rejected a module check").in_module(name));
            self.retire();
        }
    }

    fn run_check(self: &Arc<Self>, name: &str, submitter: &Submitter) {
        let _retire = scopeguard::guard(self, |inner| inner.retire());

        if self.state.lock().aborted.is_some() {
            return;
        }

        #[cfg(feature = "time-trace")]
        let started = std::time::Instant::now();

        match catch_unwind(AssertUnwindSafe(|| self.check_module(name))) {
            Ok(checked) => {
                for dependency in &checked.requires {
                    self.schedule(dependency, submitter);
                }
                self.state.lock().modules.insert(name.to_string(), checked);
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                self.abort(InternalCompilerError::new(message).in_module(name));
            }
        }

        #[cfg(feature = "time-trace")]
        debug!(module = name, elapsed_us = started.elapsed().as_micros() as u64, "module check time");
    }

    fn check_module(&self, name: &str) -> CheckedModule {
        let Some(source) = self.load_source(name) else {
            debug!(module = name, "no source for module");
            return CheckedModule {
                result: Arc::new(CheckResult::default()),
                parsed: None,
                requires: Vec::new(),
            };
        };

        let config = self.setup.config_for(name);
        let tunables = &self.setup.tunables;
        let analysis = analyze_module(name, &source, &config, tunables);

        let mut requires: Vec<String> = Vec::new();
        let mut type_errors = analysis.type_errors;
        for require in &analysis.requires {
            if self.load_source(&require.name).is_some() {
                if !requires.contains(&require.name) {
                    requires.push(require.name.clone());
                }
            } else {
                type_errors.push(TypeError::type_error(
                    name,
                    require.location,
                    format!("Unknown require: {}", require.name),
                ));
            }
        }

        if !analysis.mode.type_checks() || !config.type_errors {
            type_errors.clear();
        }
        type_errors.sort_by_key(|e| e.location.begin);

        let limit = tunables
            .int_or(names::TYPE_MAXIMUM_STRINGIFIER_LENGTH, 500)
            .max(1) as usize;

        let mut errors = analysis.syntax_errors;
        errors.extend(type_errors);
        for error in &mut errors {
            match &mut error.data {
                TypeErrorData::Syntax(m) | TypeErrorData::Type(m) => truncate_message(m, limit),
            }
        }

        let (mut lint_errors, mut lint_warnings) = if self.setup.options.run_lint_checks {
            config.classify_lints(analysis.lints)
        } else {
            (Vec::new(), Vec::new())
        };
        for lint in lint_errors.iter_mut().chain(lint_warnings.iter_mut()) {
            truncate_lint(lint, limit);
        }

        let result = CheckResult {
            errors,
            lint: LintResult {
                errors: lint_errors,
                warnings: lint_warnings,
            },
        };

        debug!(
            module = name,
            mode = %analysis.mode,
            errors = result.errors.len(),
            requires = requires.len(),
            "module checked"
        );

        if tunables.flag(names::DEBUG_LOG_CHECK_TO_JSON)
            && let Some(sink) = &self.setup.json_log
        {
            let log = CheckLog {
                module_name: name,
                mode: analysis.mode,
                requires: &requires,
                errors: &result.errors,
                lint: &result.lint,
                comments: analysis.comments.as_deref(),
            };
            match serde_json::to_string(&log) {
                Ok(json) => sink(name, &json),
                Err(e) => warn!(module = name, "failed to serialize check log: {}", e),
            }
        }

        let retained = self
            .setup
            .options
            .retain_full_type_graphs
            .then(|| Retained {
                source: Arc::clone(&source),
                annotations: analysis.annotations,
            });

        CheckedModule {
            result: Arc::new(result),
            parsed: Some(ParsedModule {
                mode: analysis.mode,
                retained,
            }),
            requires,
        }
    }

    /// Source of `name`, resolved at most once per run.
    fn load_source(&self, name: &str) -> Option<Arc<str>> {
        if let Some(cached) = self.state.lock().sources.get(name) {
            return cached.clone();
        }

        let resolved = self.setup.source(name).map(Arc::<str>::from);
        self.state
            .lock()
            .sources
            .entry(name.to_string())
            .or_insert(resolved)
            .clone()
    }

    fn abort(&self, ice: InternalCompilerError) {
        let mut state = self.state.lock();
        if state.aborted.is_none() {
            error!(module = ice.module_or_unknown(), message = %ice.message, "aborting analysis");
            state.aborted = Some(ice);
        }
    }

    /// One in-flight check finished.
    fn retire(&self) {
        let mut state = self.state.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        if state.in_flight == 0 {
            self.idle.notify_all();
        }
    }
}

/// Dependencies before dependents, roots in caller order.
fn dependency_order(roots: &[String], modules: &HashMap<String, CheckedModule>) -> Vec<String> {
    let mut order = Vec::with_capacity(modules.len());
    let mut visited: HashSet<&str> = HashSet::new();

    for root in roots {
        if !modules.contains_key(root) || !visited.insert(root.as_str()) {
            continue;
        }

        let mut stack: Vec<(&str, usize)> = vec![(root.as_str(), 0)];
        while let Some(top) = stack.last_mut() {
            let name = top.0;
            let requires = modules.get(name).map_or(&[][..], |m| m.requires.as_slice());

            match requires.get(top.1) {
                Some(dependency) => {
                    top.1 += 1;
                    if modules.contains_key(dependency) && visited.insert(dependency.as_str()) {
                        stack.push((dependency.as_str(), 0));
                    }
                }
                None => {
                    order.push(name.to_string());
                    stack.pop();
                }
            }
        }
    }

    order
}

fn truncate_message(text: &mut String, limit: usize) {
    if let Some((cut, _)) = text.char_indices().nth(limit) {
        text.truncate(cut);
        text.push_str("...");
    }
}

fn truncate_lint(lint: &mut LintWarning, limit: usize) {
    truncate_message(&mut lint.text, limit);
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "check task panicked".to_string()
    }
}
