//! Per-module analysis on top of the token stream.
//!
//! [`analyze_module`] reads hot comments, checks block structure and, when
//! the module is structurally sound, walks its scopes to resolve names. The
//! output is raw: lint findings are not yet filtered by the module config and
//! unresolvable requires are left for the engine, which knows what exists.

use std::collections::HashSet;

use serde::Serialize;

use crate::config::{Mode, ModuleConfig};
use crate::diagnostic::{Location, Position};
use crate::engine::TypeError;
use crate::flags::{TunableRegistry, names};
use crate::lint::{LintCode, LintSet, LintWarning};

use super::lexer::{Lexed, Token, TokenKind, is_keyword, lex};
use super::syntax::{check_blocks, closer_for, find_declarations, is_closer, is_declaration};

pub const BUILTIN_GLOBALS: &[&str] = &[
    "_G", "_VERSION", "assert", "bit32", "buffer", "collectgarbage", "coroutine", "debug", "error",
    "gcinfo", "getfenv", "getmetatable", "ipairs", "load", "loadstring", "math", "newproxy", "next",
    "os", "pairs", "pcall", "print", "rawequal", "rawget", "rawlen", "rawset", "require", "select",
    "setfenv", "setmetatable", "string", "table", "tonumber", "tostring", "type", "typeof", "unpack",
    "utf8", "vector", "xpcall",
];

/// Type names that may appear where the walker expects an expression
const BUILTIN_TYPES: &[&str] = &["any", "boolean", "never", "number", "thread", "unknown", "userdata"];

const HOT_COMMENTS: &[&str] = &["strict", "nonstrict", "nocheck", "nolint", "native", "optimize"];

/// Keywords that can only start a statement
const STATEMENT_KEYWORDS: &[&str] = &[
    "break", "continue", "do", "else", "elseif", "end", "for", "if", "local", "repeat", "return",
    "until", "while",
];

pub const DECLARATION_NOT_ENABLED_MESSAGE: &str = "Declaration syntax is not enabled for this module";

/// Largest integer a double represents exactly
const MAX_EXACT_INTEGER: u128 = 1 << 53;

/// A `require` call naming a module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequireRef {
    pub name: String,
    pub location: Location,
}

/// Text to insert after a local name when annotating
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub at: Position,
    pub text: String,
}

/// A source comment kept for the check log
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapturedComment {
    pub location: Location,
    /// Text after the leading `--`
    pub text: String,
}

#[derive(Debug, Default)]
pub struct ModuleAnalysis {
    pub mode: Mode,
    pub syntax_errors: Vec<TypeError>,
    pub type_errors: Vec<TypeError>,
    /// Findings of rules not silenced by `--!nolint`
    pub lints: Vec<LintWarning>,
    pub requires: Vec<RequireRef>,
    pub annotations: Vec<Annotation>,
    /// Every comment, when the config asks for them
    pub comments: Option<Vec<CapturedComment>>,
}

pub fn analyze_module(
    module: &str,
    src: &str,
    config: &ModuleConfig,
    tunables: &TunableRegistry,
) -> ModuleAnalysis {
    let lexed = lex(src);
    let mut lints = Vec::new();
    let directives = read_hot_comments(&lexed, tunables, &mut lints);

    let mode = if tunables.flag(names::DEBUG_FORCE_STRICT_MODE) {
        Mode::Strict
    } else if tunables.flag(names::DEBUG_FORCE_NONSTRICT_MODE) {
        Mode::Nonstrict
    } else {
        directives.mode.unwrap_or(config.mode)
    };

    let recursion_limit = tunables.int_or(names::RECURSION_LIMIT, 200).max(1) as usize;
    let error_limit = tunables.int_or(names::PARSE_ERROR_LIMIT, 100).max(1) as usize;

    let declarations = if config.allow_declaration_syntax || mode == Mode::Definition {
        Vec::new()
    } else {
        find_declarations(&lexed.tokens)
    };

    let mut syntax_errors: Vec<TypeError> = lexed
        .errors
        .iter()
        .map(|e| TypeError::syntax(module, e.location, e.message.clone()))
        .chain(
            check_blocks(&lexed.tokens, lexed.eof, recursion_limit)
                .into_iter()
                .map(|issue| TypeError::syntax(module, issue.location, issue.message)),
        )
        .chain(
            declarations
                .into_iter()
                .map(|location| TypeError::syntax(module, location, DECLARATION_NOT_ENABLED_MESSAGE)),
        )
        .collect();
    syntax_errors.sort_by_key(|e| e.location.begin);
    syntax_errors.truncate(error_limit);

    let mut analysis = ModuleAnalysis {
        mode,
        requires: find_requires(&lexed.tokens),
        comments: config.capture_comments.then(|| {
            lexed
                .comments
                .iter()
                .map(|c| CapturedComment {
                    location: c.location,
                    text: c.text.to_string(),
                })
                .collect()
        }),
        ..ModuleAnalysis::default()
    };

    if syntax_errors.is_empty() {
        let mut walker = ScopeWalker::new(module, &lexed.tokens, config, mode, tunables);
        walker.run();
        analysis.type_errors = walker.type_errors;
        analysis.annotations = walker.annotations;
        lints.extend(walker.lints);
    }
    analysis.syntax_errors = syntax_errors;

    lints.extend(integer_lints(&lexed.tokens));

    if mode != Mode::Definition {
        lints.retain(|w| !directives.nolint.contains(w.code));
        lints.sort_by_key(|w| (w.location.begin, w.code));
        analysis.lints = lints;
    }

    analysis
}

#[derive(Debug, Default)]
struct Directives {
    mode: Option<Mode>,
    nolint: LintSet,
}

fn read_hot_comments(lexed: &Lexed<'_>, tunables: &TunableRegistry, lints: &mut Vec<LintWarning>) -> Directives {
    let mut directives = Directives::default();
    let first_token = lexed.tokens.first().map(|t| t.location.begin);
    let mut warn = |location, text: String| {
        lints.push(LintWarning::new(LintCode::CommentDirective, location, text));
    };

    for comment in &lexed.comments {
        let Some(body) = comment.hot() else {
            continue;
        };

        if first_token.is_some_and(|first| comment.location.begin > first) {
            warn(
                comment.location,
                "Comment directive is ignored because it is placed after the first non-comment token"
                    .to_string(),
            );
            continue;
        }

        let mut words = body.split_whitespace();
        let Some(directive) = words.next() else {
            continue;
        };

        match directive {
            "strict" => directives.mode = Some(Mode::Strict),
            "nonstrict" => directives.mode = Some(Mode::Nonstrict),
            "nocheck" => directives.mode = Some(Mode::NoCheck),
            "native" => {}
            "nolint" => {
                let rules: Vec<&str> = words.collect();
                if rules.is_empty() {
                    directives.nolint = LintSet::all();
                }
                for rule in rules {
                    match LintCode::from_name(rule) {
                        Some(code) => directives.nolint.enable(code),
                        None => warn(
                            comment.location,
                            format!("nolint directive refers to unknown lint rule '{rule}'"),
                        ),
                    }
                }
            }
            "optimize" => {
                let level = words.next().unwrap_or("");
                if !matches!(level, "0" | "1" | "2") {
                    warn(
                        comment.location,
                        format!("optimize directive uses unknown optimization level '{level}', 0..2 expected"),
                    );
                }
            }
            other => {
                let mut text = format!("Unknown comment directive '{other}'");
                if let Some(close) = suggest(other, HOT_COMMENTS.iter().copied(), tunables) {
                    text.push_str(&format!("; did you mean '{close}'?"));
                }
                warn(comment.location, text);
            }
        }
    }

    directives
}

fn is_member_access(prev: Option<&Token<'_>>) -> bool {
    prev.is_some_and(|p| p.is_symbol(".") || p.is_symbol(":") || p.is_symbol("::"))
}

/// `require("x")` and `require 'x'` calls, in source order.
pub fn find_requires(tokens: &[Token<'_>]) -> Vec<RequireRef> {
    let mut found = Vec::new();

    for (i, token) in tokens.iter().enumerate() {
        if !token.is_keyword("require") || is_member_access(i.checked_sub(1).map(|p| &tokens[p])) {
            continue;
        }

        let arg = match (tokens.get(i + 1), tokens.get(i + 2), tokens.get(i + 3)) {
            (Some(open), Some(arg), Some(close)) if open.is_symbol("(") && close.is_symbol(")") => {
                Some(arg)
            }
            (Some(arg), _, _) => Some(arg),
            _ => None,
        };

        if let Some(arg) = arg
            && let Some(name) = arg.string_value()
        {
            found.push(RequireRef {
                name: name.to_string(),
                location: arg.location,
            });
        }
    }

    found
}

fn integer_lints(tokens: &[Token<'_>]) -> Vec<LintWarning> {
    tokens
        .iter()
        .filter(|t| t.kind == TokenKind::Number)
        .filter(|t| {
            let digits: String = t.text.chars().filter(|c| *c != '_').collect();
            digits.bytes().all(|b| b.is_ascii_digit())
                && digits.parse::<u128>().map_or(true, |v| v > MAX_EXACT_INTEGER)
        })
        .map(|t| {
            LintWarning::new(
                LintCode::IntegerParsing,
                t.location,
                "Integer literal exceeds 2^53 and cannot be represented exactly",
            )
        })
        .collect()
}

/// Closest candidate within the `SuggestionDistance` tunable.
pub fn suggest<'c>(
    name: &str,
    candidates: impl IntoIterator<Item = &'c str>,
    tunables: &TunableRegistry,
) -> Option<&'c str> {
    let limit = tunables.int_or(names::SUGGESTION_DISTANCE, 2);
    if limit <= 0 {
        return None;
    }

    candidates
        .into_iter()
        .filter(|c| *c != name)
        .map(|c| (edit_distance(name, c), c))
        .filter(|(d, _)| *d as i64 <= limit)
        .min()
        .map(|(_, c)| c)
}

pub fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=b.len()).collect();

    for (i, ca) in a.chars().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let above = row[j + 1];
            row[j + 1] = if ca == *cb {
                diagonal
            } else {
                1 + diagonal.min(above).min(row[j])
            };
            diagonal = above;
        }
    }

    row[b.len()]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LocalKind {
    Variable,
    Function,
    Import,
    Param,
}

#[derive(Debug)]
struct Local<'a> {
    name: &'a str,
    location: Location,
    kind: LocalKind,
    used: bool,
}

/// Literal shape of an initializer
#[derive(Debug, Clone, PartialEq, Eq)]
enum Shape {
    Number,
    String,
    Boolean,
    Nil,
    Table,
    Function,
    Require(String),
}

impl Shape {
    fn annotation(&self) -> String {
        match self {
            Self::Number => ": number".to_string(),
            Self::String => ": string".to_string(),
            Self::Boolean => ": boolean".to_string(),
            Self::Nil => ": nil".to_string(),
            Self::Table => ": table".to_string(),
            Self::Function => ": function".to_string(),
            Self::Require(name) => format!(": typeof(require(\"{name}\"))"),
        }
    }
}

/// Walks the token stream tracking lexical scopes.
struct ScopeWalker<'t, 'a> {
    module: &'t str,
    tokens: &'t [Token<'a>],
    config: &'t ModuleConfig,
    mode: Mode,
    tunables: &'t TunableRegistry,

    locals: Vec<Local<'a>>,
    /// `locals.len()` at each scope entry
    scopes: Vec<usize>,
    /// Declarations that become visible once the walk reaches the index
    pending: Vec<(usize, Local<'a>)>,
    /// Loop variables waiting for the `do` that opens their scope
    loop_vars: Vec<Local<'a>>,
    /// `until` scopes: popped at the first token on a later line at this depth
    deferred_pops: Vec<(u32, usize)>,
    brackets: Vec<&'a str>,
    assigned_globals: HashSet<&'a str>,

    type_errors: Vec<TypeError>,
    lints: Vec<LintWarning>,
    annotations: Vec<Annotation>,
}

impl<'t, 'a> ScopeWalker<'t, 'a> {
    fn new(
        module: &'t str,
        tokens: &'t [Token<'a>],
        config: &'t ModuleConfig,
        mode: Mode,
        tunables: &'t TunableRegistry,
    ) -> Self {
        Self {
            module,
            tokens,
            config,
            mode,
            tunables,
            locals: Vec::new(),
            scopes: Vec::new(),
            pending: Vec::new(),
            loop_vars: Vec::new(),
            deferred_pops: Vec::new(),
            brackets: Vec::new(),
            assigned_globals: collect_assigned_globals(tokens),
            type_errors: Vec::new(),
            lints: Vec::new(),
            annotations: Vec::new(),
        }
    }

    fn token(&self, i: usize) -> Option<&'t Token<'a>> {
        self.tokens.get(i)
    }

    fn prev(&self, i: usize) -> Option<&'t Token<'a>> {
        i.checked_sub(1).and_then(|p| self.tokens.get(p))
    }

    fn run(&mut self) {
        self.push_scope();

        let mut i = 0;
        while let Some(token) = self.token(i) {
            self.activate_pending(i);
            self.apply_deferred_pops(token.line());
            i = self.step(i, token);
        }

        self.activate_pending(usize::MAX);
        while !self.scopes.is_empty() {
            self.pop_scope();
        }
        self.deferred_pops.clear();
    }

    /// Handle the token at `i`; returns the next index to visit.
    fn step(&mut self, i: usize, token: &'t Token<'a>) -> usize {
        let prev = self.prev(i);

        if token.kind == TokenKind::Symbol {
            match token.text {
                "(" | "[" | "{" => self.brackets.push(token.text),
                ")" | "]" | "}" => {
                    self.brackets.pop();
                }
                _ => {}
            }
            return i + 1;
        }

        if token.kind != TokenKind::Name || is_member_access(prev) {
            return i + 1;
        }

        match token.text {
            "local" => return self.local_statement(i),
            "function" => return self.function(i),
            "for" => return self.for_header(i),
            "do" => {
                self.push_scope();
                let vars = std::mem::take(&mut self.loop_vars);
                self.locals.extend(vars);
            }
            "if" | "repeat" => self.push_scope(),
            "end" => {
                self.flush_deferred_pops();
                self.pop_scope();
            }
            "else" | "elseif" => self.flush_deferred_pops(),
            "until" => self.deferred_pops.push((token.line(), self.brackets.len())),
            "type" if self.is_type_alias(i) => return self.skip_type_alias(i),
            "export" if self.token(i + 1).is_some_and(|t| t.is_keyword("type")) => {
                return self.skip_type_alias(i + 1);
            }
            "declare" if is_declaration(self.tokens, i) => return self.skip_declaration(i),
            name if is_keyword(name) => {}
            _ => self.name(i, token),
        }

        i + 1
    }

    fn name(&mut self, i: usize, token: &'t Token<'a>) {
        let next = self.token(i + 1);
        let assigns = next.is_some_and(|n| {
            n.is_symbol("=")
                || matches!(n.text, "+=" | "-=" | "*=" | "/=" | "%=" | "^=" | "..=" | "//=")
        });

        if assigns {
            // `{ key = value }` names a field, `x = value` writes x
            return;
        }

        self.read(i, token);
    }

    fn read(&mut self, i: usize, token: &'t Token<'a>) {
        let name = token.text;

        if let Some(local) = self.locals.iter_mut().rev().find(|l| l.name == name) {
            local.used = true;
            return;
        }

        if matches!(name, "getfenv" | "setfenv") {
            self.lint(
                LintCode::DeprecatedGlobal,
                token.location,
                format!("Global '{name}' is deprecated"),
            );
        }

        if name == "table"
            && self.token(i + 1).is_some_and(|t| t.is_symbol("."))
            && let Some(member) = self.token(i + 2)
        {
            let advice = match member.text {
                "getn" => Some("use '#' instead"),
                "foreach" | "foreachi" => Some("use a loop instead"),
                _ => None,
            };
            if let Some(advice) = advice {
                let location = Location::new(token.location.begin, member.location.end);
                self.lint(
                    LintCode::DeprecatedGlobal,
                    location,
                    format!("Member 'table.{}' is deprecated, {advice}", member.text),
                );
            }
        }

        if self.is_known_global(name) {
            return;
        }

        match self.mode {
            Mode::Strict => {
                let mut message = format!("Unknown global '{name}'");
                let candidates: Vec<&str> = self.visible_names();
                if let Some(close) = suggest(name, candidates, self.tunables) {
                    message.push_str(&format!("; did you mean '{close}'?"));
                }
                self.type_errors
                    .push(TypeError::type_error(self.module, token.location, message));
            }
            Mode::Nonstrict => {
                self.lint(
                    LintCode::UnknownGlobal,
                    token.location,
                    format!("Unknown global '{name}'"),
                );
            }
            Mode::NoCheck | Mode::Definition => {}
        }
    }

    fn is_known_global(&self, name: &str) -> bool {
        BUILTIN_GLOBALS.contains(&name)
            || BUILTIN_TYPES.contains(&name)
            || name == "self"
            || self.config.is_global(name)
            || self.assigned_globals.contains(name)
    }

    fn visible_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = BUILTIN_GLOBALS.to_vec();
        names.extend(self.config.globals.iter().map(String::as_str));
        names.extend(self.assigned_globals.iter().copied());
        names.extend(self.locals.iter().map(|l| l.name));
        names.sort_unstable();
        names.dedup();
        names
    }

    fn local_statement(&mut self, i: usize) -> usize {
        if let Some(func) = self.token(i + 1)
            && func.is_keyword("function")
        {
            if let Some(name) = self.token(i + 2).filter(|t| t.is_name()) {
                self.declare(name, LocalKind::Function);
            }
            return i + 1;
        }

        let mut names: Vec<(&'t Token<'a>, bool)> = Vec::new();
        let mut j = i + 1;
        while let Some(token) = self.token(j) {
            if !token.is_name() || is_keyword(token.text) {
                break;
            }
            j += 1;

            // `<const>` / `<close>` attributes
            if self.token(j).is_some_and(|t| t.is_symbol("<")) {
                j = self.matching(j, "<", ">") + 1;
            }

            let typed = self.token(j).is_some_and(|t| t.is_symbol(":"));
            if typed {
                j = self.skip_type(j + 1);
            }
            names.push((token, typed));

            if self.token(j).is_some_and(|t| t.is_symbol(",")) {
                j += 1;
            } else {
                break;
            }
        }

        let (shapes, visible_at) = if self.token(j).is_some_and(|t| t.is_symbol("=")) {
            let (starts, end) = self.expression_list(j + 1);
            let shapes: Vec<Option<Shape>> = starts
                .iter()
                .enumerate()
                .map(|(n, start)| {
                    let last = starts.get(n + 1).map_or(end, |next| next - 1);
                    self.shape(*start, last.saturating_sub(1))
                })
                .collect();
            (shapes, end)
        } else {
            (Vec::new(), j)
        };

        for (index, (token, typed)) in names.into_iter().enumerate() {
            let shape = shapes.get(index).cloned().flatten();
            let kind = match shape {
                Some(Shape::Require(_)) => LocalKind::Import,
                _ => LocalKind::Variable,
            };

            if !typed && let Some(shape) = &shape {
                self.annotations.push(Annotation {
                    at: token.location.end,
                    text: shape.annotation(),
                });
            }

            self.pending.push((
                visible_at,
                Local {
                    name: token.text,
                    location: token.location,
                    kind,
                    used: false,
                },
            ));
        }

        j
    }

    /// `function` keyword at `i`: name path, parameters, return type.
    fn function(&mut self, i: usize) -> usize {
        let mut j = i + 1;
        let is_local = self.prev(i).is_some_and(|p| p.is_keyword("local"));
        let mut is_method = false;

        if let Some(head) = self.token(j).filter(|t| t.is_name()) {
            let is_path = self
                .token(j + 1)
                .is_some_and(|t| t.is_symbol(".") || t.is_symbol(":"));
            if is_path && !is_local {
                self.read(j, head);
            }
            j += 1;
            while let Some(sep) = self.token(j).filter(|t| t.is_symbol(".") || t.is_symbol(":")) {
                is_method |= sep.is_symbol(":");
                j += 2;
            }
        }

        if self.token(j).is_some_and(|t| t.is_symbol("<")) {
            j = self.matching(j, "<", ">") + 1;
        }

        self.push_scope();
        if is_method {
            self.locals.push(Local {
                name: "self",
                location: Location::default(),
                kind: LocalKind::Param,
                used: true,
            });
        }

        if self.token(j).is_some_and(|t| t.is_symbol("(")) {
            j += 1;
            while let Some(token) = self.token(j) {
                if token.is_symbol(")") {
                    j += 1;
                    break;
                }
                if token.is_symbol(":") {
                    j = self.skip_type(j + 1);
                    continue;
                }
                if token.is_name() {
                    self.declare(token, LocalKind::Param);
                }
                j += 1;
            }
        }

        if self.token(j).is_some_and(|t| t.is_symbol(":")) {
            j = self.skip_type(j + 1);
        }

        j
    }

    fn for_header(&mut self, i: usize) -> usize {
        let mut j = i + 1;
        while let Some(token) = self.token(j).filter(|t| t.is_name() && !is_keyword(t.text)) {
            self.loop_vars.push(Local {
                name: token.text,
                location: token.location,
                kind: LocalKind::Param,
                used: false,
            });
            j += 1;
            if self.token(j).is_some_and(|t| t.is_symbol(":")) {
                j = self.skip_type(j + 1);
            }
            if self.token(j).is_some_and(|t| t.is_symbol(",")) {
                j += 1;
            } else {
                break;
            }
        }
        j
    }

    fn is_type_alias(&self, i: usize) -> bool {
        self.token(i + 1).is_some_and(|t| t.is_name() && !is_keyword(t.text))
            && self
                .token(i + 2)
                .is_some_and(|t| t.is_symbol("=") || t.is_symbol("<"))
    }

    /// Skip `type Name<..> = <type>`.
    fn skip_type_alias(&self, i: usize) -> usize {
        let mut j = i + 2;
        if self.token(j).is_some_and(|t| t.is_symbol("<")) {
            j = self.matching(j, "<", ">") + 1;
        }
        if self.token(j).is_some_and(|t| t.is_symbol("=")) {
            j = self.skip_type(j + 1);
        }
        j
    }

    /// Skip `declare function name<..>(..): T` or `declare name: T`.
    fn skip_declaration(&self, i: usize) -> usize {
        if !self.token(i + 1).is_some_and(|t| t.is_keyword("function")) {
            return self.skip_type(i + 3);
        }

        let mut j = i + 3;
        if self.token(j).is_some_and(|t| t.is_symbol("<")) {
            j = self.matching(j, "<", ">") + 1;
        }
        if self.token(j).is_some_and(|t| t.is_symbol("(")) {
            j = self.matching(j, "(", ")") + 1;
        }
        if self.token(j).is_some_and(|t| t.is_symbol(":")) {
            j = self.skip_type(j + 1);
        }
        j
    }

    /// Index just past the type expression starting at `j`.
    fn skip_type(&self, mut j: usize) -> usize {
        let mut expect_operand = true;

        while let Some(token) = self.token(j) {
            let operand = (token.is_name() && (!is_keyword(token.text) || token.text == "nil"))
                || token.kind == TokenKind::String;

            if operand {
                if !expect_operand {
                    break;
                }
                expect_operand = false;
                j += 1;
                if token.text == "typeof" && self.token(j).is_some_and(|t| t.is_symbol("(")) {
                    j = self.matching(j, "(", ")") + 1;
                }
                continue;
            }

            match token.text {
                "(" | "{" | "[" if expect_operand => {
                    let close = match token.text {
                        "(" => ")",
                        "{" => "}",
                        _ => "]",
                    };
                    j = self.matching(j, token.text, close) + 1;
                    expect_operand = false;
                }
                "<" if !expect_operand => j = self.matching(j, "<", ">") + 1,
                "|" | "&" | "->" | "." => {
                    expect_operand = true;
                    j += 1;
                }
                "?" | "..." => j += 1,
                _ => break,
            }
        }

        j
    }

    /// Index of the token closing the group opened at `j`.
    fn matching(&self, j: usize, open: &str, close: &str) -> usize {
        let mut depth = 0usize;
        for (k, token) in self.tokens.iter().enumerate().skip(j) {
            if token.is_symbol(open) {
                depth += 1;
            } else if token.is_symbol(close) {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return k;
                }
            }
        }
        self.tokens.len()
    }

    /// Start index of each expression in a comma-separated list, and the
    /// index just past the list.
    fn expression_list(&self, start: usize) -> (Vec<usize>, usize) {
        let mut starts = vec![start];
        let mut depth = 0usize;
        let mut k = start;

        while let Some(token) = self.token(k) {
            let prev = self.prev(k);

            if depth == 0 && k > start {
                if token.is_symbol(",") {
                    starts.push(k + 1);
                    k += 1;
                    continue;
                }
                if let Some(prev) = prev
                    && ends_expression(prev, token)
                {
                    break;
                }
            }

            if closer_for(token, prev).is_some() {
                depth += 1;
            } else if is_closer(token, prev) {
                if depth == 0 {
                    break;
                }
                depth -= 1;
            }
            k += 1;
        }

        (starts, k)
    }

    /// The literal shape of the expression spanning `first..=last`, if it is
    /// a single literal.
    fn shape(&self, first: usize, last: usize) -> Option<Shape> {
        if last < first {
            return None;
        }
        let token = self.token(first)?;

        match token.kind {
            TokenKind::Number if first == last => return Some(Shape::Number),
            TokenKind::String if first == last => return Some(Shape::String),
            _ => {}
        }

        match token.text {
            "true" | "false" if first == last => Some(Shape::Boolean),
            "nil" if first == last => Some(Shape::Nil),
            "{" if self.matching(first, "{", "}") == last => Some(Shape::Table),
            "function" if self.block_end(first) == last => Some(Shape::Function),
            "require" => {
                let call = find_requires(self.tokens.get(first..=last)?);
                let spans = match self.token(first + 1) {
                    Some(t) if t.is_symbol("(") => first + 3 == last,
                    Some(_) => first + 1 == last,
                    None => false,
                };
                call.into_iter()
                    .next()
                    .filter(|_| spans)
                    .map(|r| Shape::Require(r.name))
            }
            _ => None,
        }
    }

    /// Index of the `end` closing the keyword block opened at `j`.
    fn block_end(&self, j: usize) -> usize {
        let mut depth = 0usize;
        for (k, token) in self.tokens.iter().enumerate().skip(j) {
            let prev = self.prev(k);
            if closer_for(token, prev).is_some() {
                depth += 1;
            } else if is_closer(token, prev) {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return k;
                }
            }
        }
        self.tokens.len()
    }

    fn declare(&mut self, token: &'t Token<'a>, kind: LocalKind) {
        self.locals.push(Local {
            name: token.text,
            location: token.location,
            kind,
            used: false,
        });
    }

    fn activate_pending(&mut self, index: usize) {
        let (ready, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|(at, _)| *at <= index);
        self.pending = waiting;
        self.locals.extend(ready.into_iter().map(|(_, local)| local));
    }

    fn apply_deferred_pops(&mut self, line: u32) {
        while let Some(&(until_line, depth)) = self.deferred_pops.last() {
            if line > until_line && self.brackets.len() <= depth {
                self.deferred_pops.pop();
                self.pop_scope();
            } else {
                break;
            }
        }
    }

    /// Close `until` scopes still open at the current bracket depth.
    fn flush_deferred_pops(&mut self) {
        while let Some(&(_, depth)) = self.deferred_pops.last() {
            if depth < self.brackets.len() {
                break;
            }
            self.deferred_pops.pop();
            self.pop_scope();
        }
    }

    fn push_scope(&mut self) {
        self.scopes.push(self.locals.len());
    }

    fn pop_scope(&mut self) {
        let Some(mark) = self.scopes.pop() else {
            return;
        };
        let closed: Vec<Local<'a>> = self.locals.drain(mark.min(self.locals.len())..).collect();

        for local in closed {
            if local.used || local.name.starts_with('_') {
                continue;
            }
            let (code, text) = match local.kind {
                LocalKind::Param => continue,
                LocalKind::Variable => (
                    LintCode::LocalUnused,
                    format!("Variable '{}' is never used; prefix with '_' to silence", local.name),
                ),
                LocalKind::Function => (
                    LintCode::FunctionUnused,
                    format!("Function '{}' is never used; prefix with '_' to silence", local.name),
                ),
                LocalKind::Import => (
                    LintCode::ImportUnused,
                    format!("Import '{}' is unused", local.name),
                ),
            };
            self.lint(code, local.location, text);
        }
    }

    fn lint(&mut self, code: LintCode, location: Location, text: String) {
        if self.mode != Mode::Definition {
            self.lints.push(LintWarning::new(code, location, text));
        }
    }
}

/// Names written at statement level with `name = ...` or declared with
/// `function name(...)` or `declare name: T`.
fn collect_assigned_globals<'a>(tokens: &[Token<'a>]) -> HashSet<&'a str> {
    let mut globals = HashSet::new();
    let mut depth = 0usize;

    for (i, token) in tokens.iter().enumerate() {
        match token.text {
            "(" | "[" | "{" if token.kind == TokenKind::Symbol => depth += 1,
            ")" | "]" | "}" if token.kind == TokenKind::Symbol => depth = depth.saturating_sub(1),
            _ => {}
        }

        if !token.is_name() || is_keyword(token.text) || depth > 0 {
            continue;
        }

        let prev = i.checked_sub(1).map(|p| &tokens[p]);
        if is_member_access(prev) || prev.is_some_and(|p| p.is_keyword("local")) {
            continue;
        }

        let next = tokens.get(i + 1);
        let assigned = next.is_some_and(|n| n.is_symbol("="));
        let declared = (prev.is_some_and(|p| p.is_keyword("function"))
            && next.is_some_and(|n| n.is_symbol("(") || n.is_symbol("<")))
            || i.checked_sub(1).is_some_and(|p| is_declaration(tokens, p));

        if assigned || declared {
            globals.insert(token.text);
        }
    }

    globals
}

/// Whether `token` starts a new statement rather than continuing the
/// expression that ended with `prev`.
fn ends_expression(prev: &Token<'_>, token: &Token<'_>) -> bool {
    if token.is_symbol(";") || (token.is_name() && STATEMENT_KEYWORDS.contains(&token.text)) {
        return true;
    }

    let prev_is_operand = match prev.kind {
        TokenKind::Number | TokenKind::String => true,
        TokenKind::Name => !matches!(prev.text, "and" | "or" | "not" | "return" | "in"),
        TokenKind::Symbol => matches!(prev.text, ")" | "]" | "}" | "..."),
    };
    if !prev_is_operand {
        return false;
    }

    let token_is_operand = matches!(token.kind, TokenKind::Name | TokenKind::Number)
        && !matches!(token.text, "and" | "or");

    token_is_operand || token.line() > prev.line()
}
