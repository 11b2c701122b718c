//! Analysis driver: one full check of a root set and its dependency closure.
//!
//! A run goes through these steps, all on the calling thread:
//!
//! 1. apply the context's flag table to a fresh [`TunableRegistry`]
//! 2. pick the worker count
//! 3. build the engine and attach it to the context
//! 4. queue the roots, start the pool and block in `check_queued_modules`
//! 5. tear the pool down (on every path) and report results, or the
//!    internal error that aborted the run
//!
//! The engine handle is detached from the context before `run_analysis`
//! returns, however it returns.

use std::sync::Arc;

use skein_sched::{WorkerPool, default_thread_count};
use tracing::{debug, error, info_span};

use crate::checker::BasicEngine;
use crate::context::AnalysisContext;
use crate::diagnostic::{Category, Diagnostic};
use crate::engine::{CheckEngine, CheckOptions, EngineSetup};
use crate::error::{AnalysisResult, InternalCompilerError};
use crate::flags::{TunableRegistry, apply_flags, names};
use crate::report::ResultReporter;

/// Value of [`RunStatus::failed_count`] for a fatally aborted run
pub const FATAL_SENTINEL: i64 = -1;

/// Notice emitted when the worker count is picked automatically
pub const DEFAULT_THREADS_NOTICE: &str = "analysis threads requested <1; using default number of threads";

/// Notice emitted when time tracing is requested without support for it
pub const TIME_TRACE_UNAVAILABLE: &str = "Time tracing requested in flags; not enabled in this build";

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Every module was checked; `failed` of them did not pass
    Completed { failed: usize },
    /// An internal compiler error aborted the run; nothing was reported
    Fatal,
}

impl RunStatus {
    /// Failed-module count, or [`FATAL_SENTINEL`].
    pub fn failed_count(&self) -> i64 {
        match self {
            Self::Completed { failed } => *failed as i64,
            Self::Fatal => FATAL_SENTINEL,
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal)
    }

    pub fn passed(&self) -> bool {
        matches!(self, Self::Completed { failed: 0 })
    }
}

/// Check `roots` with the built-in [`BasicEngine`].
pub fn run_analysis<S: AsRef<str>>(ctx: &AnalysisContext, roots: &[S]) -> RunStatus {
    run_analysis_with(ctx, roots, BasicEngine::new)
}

/// Check `roots` with an engine produced by `build`.
pub fn run_analysis_with<S, E, B>(ctx: &AnalysisContext, roots: &[S], build: B) -> RunStatus
where
    S: AsRef<str>,
    E: CheckEngine,
    B: FnOnce(EngineSetup) -> E,
{
    let _span = info_span!("analysis", roots = roots.len()).entered();

    let mut tunables = TunableRegistry::standard();
    for warning in apply_flags(&ctx.flags, &mut tunables) {
        ctx.report(&warning);
    }

    if tunables.flag(names::DEBUG_TIME_TRACING) && !cfg!(feature = "time-trace") {
        ctx.report(&Diagnostic::host(Category::Notice, TIME_TRACE_UNAVAILABLE));
        return RunStatus::Completed { failed: 1 };
    }

    let threads = if ctx.thread_count == 0 {
        ctx.report(&Diagnostic::host(Category::Notice, DEFAULT_THREADS_NOTICE));
        default_thread_count()
    } else {
        ctx.thread_count
    };

    let setup = EngineSetup {
        resolve_source: ctx.source_resolver(),
        resolve_config: ctx.config_resolver(),
        default_config: ctx.config.clone(),
        options: CheckOptions {
            run_lint_checks: true,
            retain_full_type_graphs: ctx.wants_annotations(),
        },
        tunables: Arc::new(tunables),
        json_log: ctx.json_log_sink(),
    };

    let engine = Arc::new(build(setup));
    ctx.attach_engine(Arc::clone(&engine) as Arc<dyn CheckEngine>);
    let ctx = scopeguard::guard(ctx, |ctx| ctx.detach_engine());

    let checked = match check_closure(engine.as_ref(), roots, threads) {
        Ok(Ok(checked)) => checked,
        Ok(Err(ice)) => {
            error!(module = ice.module_or_unknown(), message = %ice.message, "internal compiler error");
            ctx.report(&ice_diagnostic(engine.as_ref(), &ice));
            return RunStatus::Fatal;
        }
        Err(e) => {
            error!("{}", e);
            ctx.report(&Diagnostic::host(Category::InternalCompilerError, e.to_string()));
            return RunStatus::Fatal;
        }
    };

    debug!(modules = checked.len(), threads, "dependency closure checked");

    let failed = ResultReporter::new(&ctx, engine.as_ref()).report_all(&checked);
    RunStatus::Completed { failed }
}

/// Queue `roots`, drain the closure on a fresh pool of `threads` workers
/// and return the checked modules.
///
/// The pool is joined before this returns, on success and on error alike.
/// The outer error is a pool failure; the inner one is the engine's.
pub fn check_closure<S, E>(
    engine: &E,
    roots: &[S],
    threads: usize,
) -> AnalysisResult<Result<Vec<String>, InternalCompilerError>>
where
    S: AsRef<str>,
    E: CheckEngine + ?Sized,
{
    for root in roots {
        engine.queue_module_check(root.as_ref());
    }

    let pool = WorkerPool::new(threads)?;
    let outcome = engine.check_queued_modules(&pool.submitter());
    debug!(stats = ?pool.stats().snapshot(), "closure drained");
    pool.shutdown();

    Ok(outcome)
}

fn ice_diagnostic<E: CheckEngine + ?Sized>(engine: &E, ice: &InternalCompilerError) -> Diagnostic {
    let module = match &ice.module_name {
        Some(name) => engine.human_readable_name(name),
        None => ice.module_or_unknown().to_string(),
    };
    Diagnostic::new(
        module,
        ice.location.unwrap_or_default(),
        Category::InternalCompilerError,
        ice.message.clone(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::HOST_MODULE;

    #[test]
    fn test_status_counts() {
        assert_eq!(RunStatus::Completed { failed: 3 }.failed_count(), 3);
        assert_eq!(RunStatus::Fatal.failed_count(), FATAL_SENTINEL);
        assert!(RunStatus::Completed { failed: 0 }.passed());
        assert!(!RunStatus::Fatal.passed());
    }

    #[test]
    fn test_host_notices_use_host_module() {
        let notice = Diagnostic::host(Category::Notice, DEFAULT_THREADS_NOTICE);
        assert_eq!(notice.module_name, HOST_MODULE);
    }
}
