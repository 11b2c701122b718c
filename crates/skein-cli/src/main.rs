//! skein - check modules and everything they require, in parallel.

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use skein_analysis::{AnalysisContext, FlagTable, Mode, RunStatus, run_analysis};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::filter::EnvFilter;

mod config;
mod output;
mod resolve;

use output::{OutputFormat, render_annotated, render_diagnostic};
use resolve::{ModuleResolver, STDIN_MODULE};

#[derive(Parser)]
#[command(
    name = "skein",
    version,
    about = "Check Luau modules and their dependencies in parallel",
    long_about = "skein checks each given module and every module it requires, \
                  spreading the work over a pool of threads.\n\n\
                  Check files:   skein src/main.luau src/server\n\
                  Check stdin:   cat x.luau | skein -"
)]
struct Cli {
    /// Modules to check (paths; `.luau`/`.lua` may be omitted, `-` is stdin)
    #[arg(required = true)]
    modules: Vec<String>,

    /// Worker threads (0 picks a default)
    #[arg(short = 'j', long)]
    threads: Option<usize>,

    /// Print annotated sources of modules that pass
    #[arg(long)]
    annotate: bool,

    /// Set a tunable, e.g. `--flag ParseErrorLimit=10`
    #[arg(long = "flag", value_name = "NAME=VALUE")]
    flags: Vec<String>,

    /// Config file path
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Human)]
    format: OutputFormat,

    /// Write a JSON check log per module into this directory
    #[arg(long, value_name = "DIR")]
    json_log: Option<PathBuf>,

    /// Check in strict mode unless a module says otherwise
    #[arg(long)]
    strict: bool,
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive("warn".parse()?))
        .init();

    let cli = Cli::parse();
    let config = config::load_config(cli.config.as_deref())?;

    let ctx = build_context(&cli, config)?;
    let status = run_analysis(&ctx, &cli.modules);

    Ok(match status {
        RunStatus::Completed { failed: 0 } => ExitCode::SUCCESS,
        RunStatus::Completed { failed } => {
            if cli.format == OutputFormat::Human {
                eprintln!("{}", format!("{failed} module(s) failed").red());
            }
            ExitCode::from(1)
        }
        RunStatus::Fatal => {
            if cli.format == OutputFormat::Human {
                eprintln!("{}", "analysis aborted by an internal error".red().bold());
            }
            ExitCode::from(2)
        }
    })
}

fn build_context(cli: &Cli, config: config::Config) -> Result<AnalysisContext> {
    let mut flags = config.flag_table();
    for assignment in &cli.flags {
        flags
            .insert_assignment(assignment)
            .with_context(|| format!("invalid --flag '{assignment}'"))?;
    }

    let mut module_config = config.analysis.clone();
    if cli.strict {
        module_config.mode = Mode::Strict;
    }

    let mut resolver = ModuleResolver::new(search_paths(&cli.modules, config.search_paths()));
    if cli.modules.iter().any(|m| m == STDIN_MODULE) {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("failed to read stdin")?;
        resolver = resolver.with_stdin(text);
    }

    let format = cli.format;
    let mut ctx = AnalysisContext::new()
        .with_threads(cli.threads.or(config.threads).unwrap_or(0))
        .with_config(module_config)
        .resolve_source_with(move |name| resolver.read(name))
        .on_report(move |diag| println!("{}", render_diagnostic(diag, format)));

    if cli.annotate {
        ctx = ctx.on_annotate(move |name, annotated| {
            println!("{}", render_annotated(name, annotated, format));
        });
    }

    if let Some(dir) = &cli.json_log {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
        flags = enable_json_log(flags);
        let dir = dir.clone();
        ctx = ctx.on_json_log(move |name, json| write_json_log(&dir, name, json));
    }

    Ok(ctx.with_flags(flags))
}

/// The current directory and the directories of the given modules, then the
/// configured ones; duplicates dropped.
fn search_paths(modules: &[String], configured: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(".")];
    let module_dirs = modules
        .iter()
        .filter(|m| m.as_str() != STDIN_MODULE)
        .filter_map(|m| Path::new(m).parent())
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(Path::to_path_buf);

    for path in module_dirs.chain(configured) {
        if !paths.contains(&path) {
            paths.push(path);
        }
    }
    paths
}

fn enable_json_log(flags: FlagTable) -> FlagTable {
    flags.with_bool("DebugLogCheckToJson", true)
}

fn write_json_log(dir: &Path, module_name: &str, json: &str) {
    let file_name: String = module_name
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
        .collect();
    let path = dir.join(format!("{file_name}.json"));
    if let Err(e) = std::fs::write(&path, json) {
        tracing::warn!(module = module_name, path = %path.display(), "failed to write check log: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_paths() {
        let modules = vec![
            "src/main.luau".to_string(),
            "src/other".to_string(),
            "top".to_string(),
            "-".to_string(),
        ];
        assert_eq!(
            search_paths(&modules, vec![PathBuf::from("lib"), PathBuf::from("src")]),
            vec![PathBuf::from("."), PathBuf::from("src"), PathBuf::from("lib")]
        );
    }

    #[test]
    fn test_cli_parses_options() {
        let cli = Cli::try_parse_from([
            "skein", "-j", "3", "--flag", "ParseErrorLimit=5", "--flag", "DebugForceStrictMode=on",
            "--format", "json", "--strict", "a.luau", "b",
        ])
        .unwrap();
        assert_eq!(cli.threads, Some(3));
        assert_eq!(cli.flags.len(), 2);
        assert_eq!(cli.format, OutputFormat::Json);
        assert!(cli.strict);
        assert_eq!(cli.modules, vec!["a.luau", "b"]);

        assert!(Cli::try_parse_from(["skein"]).is_err());
    }

    #[test]
    fn test_bad_flag_is_an_error() {
        let cli = Cli::try_parse_from(["skein", "--flag", "NoEquals", "m"]).unwrap();
        assert!(build_context(&cli, config::Config::default()).is_err());
    }

    #[test]
    fn test_json_log_file_names() {
        let dir = tempfile::tempdir().unwrap();
        write_json_log(dir.path(), "src/main.luau", "{}");
        assert_eq!(
            std::fs::read_to_string(dir.path().join("src_main.luau.json")).unwrap(),
            "{}"
        );
    }

    #[test]
    fn test_end_to_end_with_fixtures() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("main.luau"),
            "local util = require(\"util\")\nreturn util",
        )
        .unwrap();
        std::fs::write(dir.path().join("util.lua"), "--!strict\nreturn pirnt").unwrap();

        let main = dir.path().join("main").to_string_lossy().into_owned();
        let cli = Cli::try_parse_from(["skein", "-j", "2", main.as_str()]).unwrap();
        let ctx = build_context(&cli, config::Config::default()).unwrap();

        assert_eq!(run_analysis(&ctx, &cli.modules), RunStatus::Completed { failed: 1 });
    }
}
