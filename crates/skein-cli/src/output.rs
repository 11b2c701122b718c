//! Rendering diagnostics and annotated sources for the terminal.

use clap::ValueEnum;
use colored::{ColoredString, Colorize};
use serde::Serialize;
use skein_analysis::{Category, Diagnostic};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// `name(line,col): Category: message`
    #[default]
    Human,
    /// One JSON object per line
    Json,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AnnotatedRecord<'a> {
    module_name: &'a str,
    annotated: &'a str,
}

/// One diagnostic as a single output line.
pub fn render_diagnostic(diag: &Diagnostic, format: OutputFormat) -> String {
    match format {
        OutputFormat::Human => format!(
            "{}({},{}): {}: {}",
            diag.module_name,
            diag.line(),
            diag.column(),
            paint(diag.category),
            diag.message
        ),
        OutputFormat::Json => to_json_line(diag),
    }
}

/// An annotated module source.
pub fn render_annotated(module_name: &str, annotated: &str, format: OutputFormat) -> String {
    match format {
        OutputFormat::Human => annotated.to_string(),
        OutputFormat::Json => to_json_line(&AnnotatedRecord {
            module_name,
            annotated,
        }),
    }
}

fn paint(category: Category) -> ColoredString {
    let tag = category.as_str();
    match category {
        Category::Lint(_) => tag.yellow(),
        Category::InternalCompilerError | Category::Internal => tag.red().bold(),
        c if c.is_error() => tag.red(),
        _ => tag.cyan(),
    }
}

fn to_json_line<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| {
        tracing::error!("failed to serialize output record: {}", e);
        String::from("{}")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use skein_analysis::{LintCode, Location};

    fn sample() -> Diagnostic {
        Diagnostic::new(
            "src/main.luau",
            Location::span(2, 6, 3),
            Category::Lint(LintCode::LocalUnused),
            "Variable 'foo' is never used; prefix with '_' to silence",
        )
    }

    #[test]
    fn test_human_format() {
        colored::control::set_override(false);
        assert_eq!(
            render_diagnostic(&sample(), OutputFormat::Human),
            "src/main.luau(3,7): LocalUnused: Variable 'foo' is never used; prefix with '_' to silence"
        );
    }

    #[test]
    fn test_category_colors() {
        use colored::Color;
        assert_eq!(paint(Category::TypeError).fgcolor, Some(Color::Red));
        assert_eq!(paint(Category::SyntaxError).fgcolor, Some(Color::Red));
        assert_eq!(paint(Category::NotFound).fgcolor, Some(Color::Red));
        assert_eq!(paint(Category::Notice).fgcolor, Some(Color::Cyan));
        assert_eq!(paint(Category::Warning).fgcolor, Some(Color::Cyan));
        assert_eq!(
            paint(Category::Lint(LintCode::LocalUnused)).fgcolor,
            Some(Color::Yellow)
        );
    }

    #[test]
    fn test_json_format() {
        let line = render_diagnostic(&sample(), OutputFormat::Json);
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["moduleName"], "src/main.luau");
        assert_eq!(value["category"], "LocalUnused");
        assert_eq!(value["location"]["begin"]["line"], 2);
        assert!(!line.contains('\n'));
    }

    #[test]
    fn test_annotated_json_is_one_line() {
        let line = render_annotated("m", "local a: number = 1\nreturn a", OutputFormat::Json);
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["moduleName"], "m");
        assert_eq!(value["annotated"], "local a: number = 1\nreturn a");
        assert!(!line.contains('\n'));
    }
}
