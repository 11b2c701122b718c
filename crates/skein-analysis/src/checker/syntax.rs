//! Block structure: brackets and keyword blocks must nest properly.

use crate::diagnostic::{Location, Position};

use super::lexer::{Token, TokenKind, is_keyword};

pub const RECURSION_LIMIT_MESSAGE: &str =
    "Exceeded allowed recursion depth; simplify your code to make it compile";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxIssue {
    pub location: Location,
    pub message: String,
}

struct Open<'a> {
    opener: &'a str,
    closer: &'static str,
    line: u32,
}

/// The closer expected for `token` if it opens a block.
pub fn closer_for(token: &Token<'_>, prev: Option<&Token<'_>>) -> Option<&'static str> {
    match (token.kind, token.text) {
        (TokenKind::Symbol, "(") => Some(")"),
        (TokenKind::Symbol, "{") => Some("}"),
        (TokenKind::Symbol, "[") => Some("]"),
        // `declare function` is a signature without a body
        (TokenKind::Name, "function") if !is_member_access(prev) && !is_declare(prev) => Some("end"),
        (TokenKind::Name, "do" | "if") if !is_member_access(prev) => Some("end"),
        (TokenKind::Name, "repeat") if !is_member_access(prev) => Some("until"),
        _ => None,
    }
}

/// Whether `token` closes a block.
pub fn is_closer(token: &Token<'_>, prev: Option<&Token<'_>>) -> bool {
    match (token.kind, token.text) {
        (TokenKind::Symbol, ")" | "}" | "]") => true,
        (TokenKind::Name, "end" | "until") => !is_member_access(prev),
        _ => false,
    }
}

fn is_member_access(prev: Option<&Token<'_>>) -> bool {
    prev.is_some_and(|p| p.is_symbol(".") || p.is_symbol(":"))
}

fn is_declare(prev: Option<&Token<'_>>) -> bool {
    prev.is_some_and(|p| p.is_keyword("declare"))
}

/// Whether the token at `i` starts a declaration statement,
/// `declare function name(...): T` or `declare name: T`.
pub fn is_declaration(tokens: &[Token<'_>], i: usize) -> bool {
    let Some(token) = tokens.get(i) else {
        return false;
    };
    let prev = i.checked_sub(1).map(|p| &tokens[p]);
    if !token.is_keyword("declare")
        || is_member_access(prev)
        || prev.is_some_and(|p| p.is_keyword("local") || p.is_keyword("function"))
    {
        return false;
    }

    match (tokens.get(i + 1), tokens.get(i + 2)) {
        (Some(next), _) if next.is_keyword("function") => true,
        (Some(name), Some(colon)) => name.is_name() && !is_keyword(name.text) && colon.is_symbol(":"),
        _ => false,
    }
}

/// Locations of every declaration statement, in source order.
pub fn find_declarations(tokens: &[Token<'_>]) -> Vec<Location> {
    (0..tokens.len())
        .filter(|&i| is_declaration(tokens, i))
        .map(|i| tokens[i].location)
        .collect()
}

/// Match every opener with its closer.
///
/// Stops at the first nesting level deeper than `recursion_limit`.
pub fn check_blocks(tokens: &[Token<'_>], eof: Position, recursion_limit: usize) -> Vec<SyntaxIssue> {
    let mut issues = Vec::new();
    let mut stack: Vec<Open<'_>> = Vec::new();

    for (i, token) in tokens.iter().enumerate() {
        let prev = i.checked_sub(1).map(|p| &tokens[p]);

        if let Some(closer) = closer_for(token, prev) {
            stack.push(Open {
                opener: token.text,
                closer,
                line: token.line(),
            });

            if stack.len() > recursion_limit {
                issues.push(SyntaxIssue {
                    location: token.location,
                    message: RECURSION_LIMIT_MESSAGE.to_string(),
                });
                return issues;
            }
            continue;
        }

        if !is_closer(token, prev) {
            continue;
        }

        match stack.iter().rposition(|open| open.closer == token.text) {
            Some(index) if index + 1 == stack.len() => {
                stack.pop();
            }
            Some(index) => {
                if let Some(top) = stack.last() {
                    issues.push(SyntaxIssue {
                        location: token.location,
                        message: expected(top, &format!("'{}'", token.text)),
                    });
                }
                stack.truncate(index);
            }
            None => issues.push(SyntaxIssue {
                location: token.location,
                message: format!("Unexpected '{}'", token.text),
            }),
        }
    }

    for open in stack.iter().rev() {
        issues.push(SyntaxIssue {
            location: Location::new(eof, eof),
            message: expected(open, "<eof>"),
        });
    }

    issues
}

fn expected(open: &Open<'_>, got: &str) -> String {
    format!(
        "Expected '{}' (to close '{}' at line {}), got {}",
        open.closer,
        open.opener,
        open.line + 1,
        got
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::lexer::lex;

    fn check(src: &str, limit: usize) -> Vec<String> {
        let lexed = lex(src);
        check_blocks(&lexed.tokens, lexed.eof, limit)
            .into_iter()
            .map(|issue| issue.message)
            .collect()
    }

    #[test]
    fn test_balanced() {
        let src = "local function f(a)\n  if a then\n    for i = 1, 2 do end\n  end\n  repeat until true\n  return {a[1]}\nend";
        assert!(check(src, 200).is_empty());
    }

    #[test]
    fn test_unexpected_closer() {
        assert_eq!(check("x = 1 end", 200), vec!["Unexpected 'end'"]);
        assert_eq!(check(")", 200), vec!["Unexpected ')'"]);
    }

    #[test]
    fn test_unclosed_at_eof() {
        assert_eq!(
            check("\nfunction f()\n  return 1\n", 200),
            vec!["Expected 'end' (to close 'function' at line 2), got <eof>"]
        );
    }

    #[test]
    fn test_mismatched_closer() {
        assert_eq!(
            check("f(function() )", 200),
            vec!["Expected 'end' (to close 'function' at line 1), got ')'"]
        );
    }

    #[test]
    fn test_member_named_like_keyword() {
        assert!(check("x = t.end", 200).is_empty());
    }

    #[test]
    fn test_declared_function_has_no_body() {
        assert!(check("declare function f(): number\nreturn f()", 200).is_empty());
        assert!(check("declare function g(cb: (number) -> ()): ()", 200).is_empty());
        assert_eq!(
            check("local declare = 1\nfunction f()", 200),
            vec!["Expected 'end' (to close 'function' at line 2), got <eof>"]
        );
    }

    #[test]
    fn test_find_declarations() {
        let lexed = lex("declare function f(): number\ndeclare version: string\nlocal declare = 1\ndeclare(x)\nt.declare = 2");
        let lines: Vec<u32> = find_declarations(&lexed.tokens)
            .iter()
            .map(|l| l.begin.line)
            .collect();
        assert_eq!(lines, vec![0, 1]);
    }

    #[test]
    fn test_recursion_limit() {
        let deep = format!("x = {}1{}", "(".repeat(10), ")".repeat(10));
        assert!(check(&deep, 10).is_empty());
        assert_eq!(check(&deep, 9), vec![RECURSION_LIMIT_MESSAGE]);
    }
}
