//! # skein-analysis
//!
//! Orchestrates checking a set of modules and everything they require.
//!
//! A caller builds an [`AnalysisContext`] holding its callbacks and options
//! and hands it to [`run_analysis`] with the root module names. The driver
//! applies the flag table to a fresh [`TunableRegistry`], starts a
//! [`WorkerPool`](skein_sched::WorkerPool), and lets the checking engine fan
//! out over the pool as it discovers dependencies. Once the closure is
//! checked, every module's diagnostics are reported in a fixed order.
//!
//! ```
//! use skein_analysis::{AnalysisContext, RunStatus, run_analysis};
//! use std::sync::{Arc, Mutex};
//!
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = Arc::clone(&seen);
//!
//! let ctx = AnalysisContext::new()
//!     .with_threads(2)
//!     .resolve_source_with(|name| match name {
//!         "main" => Some("local util = require('util')\nreturn util.run()".into()),
//!         "util" => Some("return { run = function() return 1 end }".into()),
//!         _ => None,
//!     })
//!     .on_report(move |d| sink.lock().unwrap().push(d.to_string()));
//!
//! assert_eq!(run_analysis(&ctx, &["main"]), RunStatus::Completed { failed: 0 });
//! assert!(seen.lock().unwrap().is_empty());
//! ```

#![warn(clippy::all)]

pub mod checker;
pub mod config;
pub mod context;
pub mod diagnostic;
pub mod driver;
pub mod engine;
pub mod error;
pub mod flags;
pub mod lint;
pub mod report;

pub use checker::BasicEngine;
pub use config::{Mode, ModuleConfig};
pub use context::AnalysisContext;
pub use diagnostic::{Category, Diagnostic, HOST_MODULE, Location, Position, format_diagnostics};
pub use driver::{FATAL_SENTINEL, RunStatus, check_closure, run_analysis, run_analysis_with};
pub use engine::{CheckEngine, CheckOptions, CheckResult, EngineSetup, TypeError, TypeErrorData};
pub use error::{AnalysisError, AnalysisResult, InternalCompilerError};
pub use flags::{BoolFlag, FlagTable, IntFlag, TunableRegistry, TunableValue, apply_flags};
pub use lint::{LintCode, LintResult, LintSet, LintSeverity, LintWarning};
pub use report::ResultReporter;
