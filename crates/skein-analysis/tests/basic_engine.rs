//! End-to-end runs of the built-in engine.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use skein_analysis::driver::{DEFAULT_THREADS_NOTICE, TIME_TRACE_UNAVAILABLE};
use skein_analysis::{
    AnalysisContext, BasicEngine, Category, CheckEngine, CheckOptions, Diagnostic, EngineSetup,
    FlagTable, LintCode, Mode, ModuleConfig, RunStatus, check_closure, run_analysis,
};

fn sources(modules: &[(&str, &str)]) -> HashMap<String, String> {
    modules
        .iter()
        .map(|(name, src)| (name.to_string(), src.to_string()))
        .collect()
}

fn context(modules: HashMap<String, String>) -> (AnalysisContext, Arc<Mutex<Vec<Diagnostic>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let ctx = AnalysisContext::new()
        .resolve_source_with(move |name| modules.get(name).cloned())
        .on_report(move |d| sink.lock().push(d.clone()));
    (ctx, seen)
}

fn chain(len: usize) -> HashMap<String, String> {
    (0..len)
        .map(|i| {
            let src = if i + 1 == len {
                "return 1".to_string()
            } else {
                format!("local dep = require(\"m{}\")\nreturn dep", i + 1)
            };
            (format!("m{i}"), src)
        })
        .collect()
}

#[test]
fn require_chain_is_checked_dependency_first() {
    let modules = chain(50);
    let setup = EngineSetup::new().with_source_resolver(move |name| modules.get(name).cloned());
    let engine = BasicEngine::new(setup);

    let checked = check_closure(&engine, &["m0"], 4)
        .expect("pool starts")
        .expect("no internal error");

    let expected: Vec<String> = (0..50).rev().map(|i| format!("m{i}")).collect();
    assert_eq!(checked, expected);
    for name in &checked {
        assert!(engine.check_result(name).is_some_and(|r| r.passed()), "{name}");
    }
    assert_eq!(engine.dependencies("m0"), vec!["m1".to_string()]);
}

#[test]
fn chain_through_run_analysis_passes() {
    let (ctx, seen) = context(chain(50));
    let ctx = ctx.with_threads(4);
    assert_eq!(run_analysis(&ctx, &["m0"]), RunStatus::Completed { failed: 0 });
    assert!(seen.lock().is_empty(), "{:?}", seen.lock());
}

#[test]
fn shared_dependency_is_checked_once() {
    let modules = sources(&[
        ("a", "local b = require(\"b\")\nlocal c = require(\"c\")\nreturn b, c"),
        ("b", "local c = require(\"c\")\nreturn c"),
        ("c", "return {}"),
    ]);
    let setup = EngineSetup::new().with_source_resolver(move |name| modules.get(name).cloned());
    let engine = BasicEngine::new(setup);

    let checked = check_closure(&engine, &["a", "c"], 3)
        .expect("pool starts")
        .expect("no internal error");
    assert_eq!(checked, vec!["c", "b", "a"]);
}

#[test]
fn thread_count_does_not_change_results() {
    let modules = sources(&[
        ("main", "local util = require(\"util\")\nlocal unused = 1\nreturn util"),
        ("util", "--!strict\nreturn pirnt"),
    ]);

    let run = |threads: usize| {
        let (ctx, seen) = context(modules.clone());
        let status = run_analysis(&ctx.with_threads(threads), &["main"]);
        let seen: Vec<String> = seen
            .lock()
            .iter()
            .filter(|d| d.category != Category::Notice)
            .map(|d| d.to_string())
            .collect();
        (status, seen)
    };

    let (auto_status, auto_seen) = run(0);
    let (fixed_status, fixed_seen) = run(4);
    assert_eq!(auto_status, RunStatus::Completed { failed: 1 });
    assert_eq!(auto_status, fixed_status);
    assert_eq!(auto_seen, fixed_seen);
    assert_eq!(fixed_seen.len(), 2);
}

#[test]
fn zero_threads_reports_notice_first() {
    let (ctx, seen) = context(sources(&[("m", "return 1")]));
    run_analysis(&ctx, &["m"]);

    let seen = seen.lock();
    assert_eq!(seen[0].category, Category::Notice);
    assert_eq!(seen[0].message, DEFAULT_THREADS_NOTICE);
}

#[test]
fn strict_unknown_global_is_a_type_error() {
    let (ctx, seen) = context(sources(&[("m", "--!strict\npirnt(1)")]));
    let status = run_analysis(&ctx.with_threads(1), &["m"]);

    assert_eq!(status, RunStatus::Completed { failed: 1 });
    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].category, Category::TypeError);
    assert_eq!(seen[0].message, "Unknown global 'pirnt'; did you mean 'print'?");
    assert_eq!(seen[0].location.begin.line, 1);
}

#[test]
fn nonstrict_unknown_global_is_only_a_warning() {
    let (ctx, seen) = context(sources(&[("m", "pirnt(1)")]));
    let status = run_analysis(&ctx.with_threads(1), &["m"]);

    assert!(status.passed());
    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].category, Category::Lint(LintCode::UnknownGlobal));
}

#[test]
fn fatal_lint_fails_the_module() {
    let (ctx, seen) = context(sources(&[("m", "local unused = 1")]));
    let ctx = ctx
        .with_threads(2)
        .with_config(ModuleConfig::default().with_fatal_lint(LintCode::LocalUnused));

    assert_eq!(run_analysis(&ctx, &["m"]), RunStatus::Completed { failed: 1 });
    assert_eq!(seen.lock()[0].category.as_str(), "LocalUnused");
}

#[test]
fn config_resolver_overrides_default_per_module() {
    let modules = sources(&[
        ("loose", "return pirnt"),
        ("tight", "local loose = require(\"loose\")\nreturn loose, pirnt"),
    ]);
    let (ctx, seen) = context(modules);
    let ctx = ctx.with_threads(2).resolve_config_with(|name, config| {
        if name == "tight" {
            config.mode = Mode::Strict;
        }
    });

    assert_eq!(run_analysis(&ctx, &["tight"]), RunStatus::Completed { failed: 1 });
    let seen = seen.lock();
    let by_module: Vec<_> = seen
        .iter()
        .map(|d| (d.module_name.as_str(), d.category.as_str()))
        .collect();
    assert_eq!(by_module, vec![("loose", "UnknownGlobal"), ("tight", "TypeError")]);
}

#[test]
fn unknown_require_is_reported() {
    let (ctx, seen) = context(sources(&[("m", "local x = require(\"missing\")\nreturn x")]));
    assert_eq!(
        run_analysis(&ctx.with_threads(1), &["m"]),
        RunStatus::Completed { failed: 1 }
    );
    assert_eq!(seen.lock()[0].message, "Unknown require: missing");
}

#[test]
fn missing_root_is_not_found() {
    let (ctx, seen) = context(HashMap::new());
    assert_eq!(
        run_analysis(&ctx.with_threads(1), &["ghost"]),
        RunStatus::Completed { failed: 1 }
    );
    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].category, Category::NotFound);
}

#[test]
fn syntax_errors_are_always_reported() {
    let (ctx, seen) = context(sources(&[("m", "--!nocheck\nfunction f()\n  return 1\n")]));
    let ctx = ctx.with_config(ModuleConfig {
        type_errors: false,
        ..ModuleConfig::default()
    });

    assert_eq!(
        run_analysis(&ctx.with_threads(1), &["m"]),
        RunStatus::Completed { failed: 1 }
    );
    let seen = seen.lock();
    assert_eq!(seen[0].category, Category::SyntaxError);
    assert!(seen[0].message.starts_with("Expected 'end'"));
}

#[test]
fn annotations_for_passing_modules() {
    let delivered = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&delivered);
    let (ctx, _) = context(sources(&[
        ("ok", "local n = 1\nreturn n"),
        ("bad", "local ok = require(\"ok\")\nreturn ok, 1 end"),
    ]));
    let ctx = ctx
        .with_threads(2)
        .on_annotate(move |name, text| sink.lock().push((name.to_string(), text.to_string())));

    assert_eq!(run_analysis(&ctx, &["bad"]), RunStatus::Completed { failed: 1 });
    assert_eq!(
        *delivered.lock(),
        vec![("ok".to_string(), "local n: number = 1\nreturn n".to_string())]
    );
}

#[test]
fn json_log_written_when_flag_set() {
    let logs = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&logs);
    let (ctx, _) = context(sources(&[("m", "--!strict\nreturn 1")]));
    let ctx = ctx
        .with_threads(1)
        .with_flags(FlagTable::new().with_bool("DebugLogCheckToJson", true))
        .on_json_log(move |name, json| sink.lock().push((name.to_string(), json.to_string())));

    assert!(run_analysis(&ctx, &["m"]).passed());

    let logs = logs.lock();
    assert_eq!(logs.len(), 1);
    let value: serde_json::Value = serde_json::from_str(&logs[0].1).expect("valid json");
    assert_eq!(value["moduleName"], "m");
    assert_eq!(value["mode"], "strict");
    assert_eq!(value["errors"].as_array().map(Vec::len), Some(0));
    assert!(value.get("comments").is_none());
}

const DECLARING_MODULE: &str = "declare function f(): number\n-- c\nreturn 1";

#[test]
fn declarations_rejected_by_default() {
    let (ctx, seen) = context(sources(&[("m", DECLARING_MODULE)]));
    let ctx = ctx.with_threads(1);

    assert_eq!(run_analysis(&ctx, &["m"]), RunStatus::Completed { failed: 1 });
    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    assert_eq!(
        seen[0].to_string(),
        "m(1,1): SyntaxError: Declaration syntax is not enabled for this module"
    );
}

#[test]
fn declarations_accepted_and_comments_logged_when_enabled() {
    let logs = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&logs);
    let (ctx, seen) = context(sources(&[("m", DECLARING_MODULE)]));
    let ctx = ctx
        .with_threads(1)
        .with_config(
            ModuleConfig::default()
                .with_declaration_syntax(true)
                .with_comment_capture(true),
        )
        .with_flags(FlagTable::new().with_bool("DebugLogCheckToJson", true))
        .on_json_log(move |_, json| sink.lock().push(json.to_string()));

    assert!(run_analysis(&ctx, &["m"]).passed());
    assert!(seen.lock().is_empty(), "{:?}", seen.lock());

    let logs = logs.lock();
    let value: serde_json::Value = serde_json::from_str(&logs[0]).expect("valid json");
    let comments = value["comments"].as_array().expect("comments captured");
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0]["text"], " c");
    assert_eq!(comments[0]["location"]["begin"]["line"], 1);
}

#[test]
fn json_log_silent_by_default() {
    let logs = Arc::new(Mutex::new(0usize));
    let sink = Arc::clone(&logs);
    let (ctx, _) = context(sources(&[("m", "return 1")]));
    let ctx = ctx.with_threads(1).on_json_log(move |_, _| *sink.lock() += 1);

    run_analysis(&ctx, &["m"]);
    assert_eq!(*logs.lock(), 0);
}

#[test]
fn forced_strict_mode_flag() {
    let (ctx, seen) = context(sources(&[("m", "return pirnt")]));
    let ctx = ctx
        .with_threads(1)
        .with_flags(FlagTable::new().with_bool("DebugForceStrictMode", true));

    assert_eq!(run_analysis(&ctx, &["m"]), RunStatus::Completed { failed: 1 });
    assert_eq!(seen.lock()[0].category, Category::TypeError);
}

#[test]
fn panicking_resolver_becomes_internal_error() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let ctx = AnalysisContext::new()
        .with_threads(2)
        .resolve_source_with(|name| match name {
            "main" => Some("local b = require(\"boom\")\nreturn b".to_string()),
            _ => panic!("resolver exploded"),
        })
        .on_report(move |d| sink.lock().push(d.clone()));

    assert_eq!(run_analysis(&ctx, &["main"]), RunStatus::Fatal);
    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].category, Category::InternalCompilerError);
    assert_eq!(seen[0].module_name, "main");
    assert_eq!(seen[0].message, "resolver exploded");
    assert!(!ctx.is_running());
}

#[cfg(not(feature = "time-trace"))]
#[test]
fn time_tracing_without_support_stops_early() {
    let (ctx, seen) = context(sources(&[("m", "return 1")]));
    let ctx = ctx
        .with_threads(1)
        .with_flags(FlagTable::new().with_bool("DebugTimeTracing", true));

    assert_eq!(run_analysis(&ctx, &["m"]), RunStatus::Completed { failed: 1 });
    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].message, TIME_TRACE_UNAVAILABLE);
}

#[test]
fn engine_without_lint_checks_reports_no_lints() {
    let modules = sources(&[("m", "local unused = 1")]);
    let setup = EngineSetup::new()
        .with_source_resolver(move |name| modules.get(name).cloned())
        .with_options(CheckOptions {
            run_lint_checks: false,
            retain_full_type_graphs: false,
        });
    let engine = BasicEngine::new(setup);

    check_closure(&engine, &["m"], 1)
        .expect("pool starts")
        .expect("no internal error");
    let result = engine.check_result("m").expect("checked");
    assert!(result.lint.warnings.is_empty());
    assert!(engine.annotated_source("m").is_err());
}
