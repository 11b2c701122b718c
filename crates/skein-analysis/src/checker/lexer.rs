//! Tokenizer for the script language checked by [`BasicEngine`](super::BasicEngine).
//!
//! Positions are 0-based; columns count bytes. Lexing never fails: problems
//! are collected as errors next to the token stream, and scanning resumes
//! after the offending construct.

use crate::diagnostic::{Location, Position};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Name,
    Number,
    /// Quoted or long-bracket string, delimiters included
    String,
    Symbol,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    pub location: Location,
}

impl<'a> Token<'a> {
    pub fn is_symbol(&self, symbol: &str) -> bool {
        self.kind == TokenKind::Symbol && self.text == symbol
    }

    pub fn is_name(&self) -> bool {
        self.kind == TokenKind::Name
    }

    pub fn is_keyword(&self, keyword: &str) -> bool {
        self.kind == TokenKind::Name && self.text == keyword
    }

    /// Contents of a string token with its delimiters removed.
    pub fn string_value(&self) -> Option<&'a str> {
        if self.kind != TokenKind::String {
            return None;
        }
        let text = self.text;
        if let Some(level) = long_bracket_level(text.as_bytes()) {
            let open = level + 2;
            return text.get(open..text.len().saturating_sub(open));
        }
        text.get(1..text.len().saturating_sub(1))
    }

    pub fn line(&self) -> u32 {
        self.location.begin.line
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment<'a> {
    /// Text after the leading `--`
    pub text: &'a str,
    pub location: Location,
}

impl<'a> Comment<'a> {
    /// Body of a `--!` hot comment.
    pub fn hot(&self) -> Option<&'a str> {
        self.text.strip_prefix('!')
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexError {
    pub location: Location,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct Lexed<'a> {
    pub tokens: Vec<Token<'a>>,
    pub comments: Vec<Comment<'a>>,
    pub errors: Vec<LexError>,
    /// Position just past the last byte
    pub eof: Position,
}

pub const KEYWORDS: &[&str] = &[
    "and", "break", "continue", "do", "else", "elseif", "end", "false", "for", "function", "if",
    "in", "local", "nil", "not", "or", "repeat", "return", "then", "true", "until", "while",
];

pub fn is_keyword(name: &str) -> bool {
    KEYWORDS.contains(&name)
}

const SYMBOLS: &[&str] = &[
    "...", "..=", "//=", "==", "~=", "<=", ">=", "..", "::", "->", "+=", "-=", "*=", "/=", "%=",
    "^=", "//",
];

struct Cursor<'a> {
    bytes: &'a [u8],
    offset: usize,
    line: u32,
    column: u32,
}

impl<'a> Cursor<'a> {
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.offset).copied()
    }

    fn peek_at(&self, n: usize) -> Option<u8> {
        self.bytes.get(self.offset + n).copied()
    }

    fn position(&self) -> Position {
        Position::new(self.line, self.column)
    }

    fn bump(&mut self) {
        if let Some(b) = self.peek() {
            self.offset += 1;
            if b == b'\n' {
                self.line += 1;
                self.column = 0;
            } else {
                self.column += 1;
            }
        }
    }

    fn bump_n(&mut self, n: usize) {
        for _ in 0..n {
            self.bump();
        }
    }

    fn rest(&self) -> &'a [u8] {
        &self.bytes[self.offset.min(self.bytes.len())..]
    }

    /// Consume up to and including `]=*]` of the given level.
    /// Returns false if the input ends first.
    fn skip_long_bracket(&mut self, level: usize) -> bool {
        while let Some(b) = self.peek() {
            if b == b']' {
                let rest = self.rest();
                let closes = rest.len() > level + 1
                    && rest[1..=level].iter().all(|c| *c == b'=')
                    && rest[level + 1] == b']';
                if closes {
                    self.bump_n(level + 2);
                    return true;
                }
            }
            self.bump();
        }
        false
    }
}

/// `[`, `=`* , `[` at the start of `bytes`: returns the number of `=`.
fn long_bracket_level(bytes: &[u8]) -> Option<usize> {
    if bytes.first() != Some(&b'[') {
        return None;
    }
    let level = bytes[1..].iter().take_while(|b| **b == b'=').count();
    (bytes.get(level + 1) == Some(&b'[')).then_some(level)
}

fn is_name_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_name_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

pub fn lex(src: &str) -> Lexed<'_> {
    let mut cur = Cursor {
        bytes: src.as_bytes(),
        offset: 0,
        line: 0,
        column: 0,
    };
    let mut out = Lexed::default();

    while let Some(b) = cur.peek() {
        let start = cur.offset;
        let begin = cur.position();

        if b.is_ascii_whitespace() {
            cur.bump();
            continue;
        }

        if b == b'-' && cur.peek_at(1) == Some(b'-') {
            cur.bump_n(2);
            if let Some(level) = long_bracket_level(cur.rest()) {
                cur.bump_n(level + 2);
                if !cur.skip_long_bracket(level) {
                    out.errors.push(LexError {
                        location: Location::new(begin, cur.position()),
                        message: "Unfinished long comment".to_string(),
                    });
                }
            } else {
                while cur.peek().is_some_and(|c| c != b'\n') {
                    cur.bump();
                }
            }
            out.comments.push(Comment {
                text: &src[start + 2..cur.offset],
                location: Location::new(begin, cur.position()),
            });
            continue;
        }

        let kind = if is_name_start(b) {
            while cur.peek().is_some_and(is_name_continue) {
                cur.bump();
            }
            TokenKind::Name
        } else if b.is_ascii_digit() || (b == b'.' && cur.peek_at(1).is_some_and(|c| c.is_ascii_digit())) {
            lex_number(&mut cur);
            TokenKind::Number
        } else if b == b'"' || b == b'\'' || b == b'`' {
            if !lex_quoted(&mut cur, b) {
                out.errors.push(LexError {
                    location: Location::new(begin, cur.position()),
                    message: "Malformed string".to_string(),
                });
            }
            TokenKind::String
        } else if let Some(level) = long_bracket_level(cur.rest()) {
            cur.bump_n(level + 2);
            if !cur.skip_long_bracket(level) {
                out.errors.push(LexError {
                    location: Location::new(begin, cur.position()),
                    message: "Malformed string".to_string(),
                });
            }
            TokenKind::String
        } else {
            let rest = cur.rest();
            let len = SYMBOLS
                .iter()
                .find(|s| rest.starts_with(s.as_bytes()))
                .map_or_else(|| utf8_len(b), |s| s.len());
            cur.bump_n(len);
            TokenKind::Symbol
        };

        out.tokens.push(Token {
            kind,
            text: &src[start..cur.offset],
            location: Location::new(begin, cur.position()),
        });
    }

    out.eof = cur.position();
    out
}

fn utf8_len(lead: u8) -> usize {
    match lead {
        0xF0..=0xFF => 4,
        0xE0..=0xEF => 3,
        0xC0..=0xDF => 2,
        _ => 1,
    }
}

fn lex_number(cur: &mut Cursor<'_>) {
    if cur.peek() == Some(b'0') && matches!(cur.peek_at(1), Some(b'x' | b'X' | b'b' | b'B')) {
        cur.bump_n(2);
        while cur.peek().is_some_and(|c| c.is_ascii_hexdigit() || c == b'_') {
            cur.bump();
        }
        return;
    }

    while let Some(c) = cur.peek() {
        let exponent_sign = matches!(c, b'+' | b'-')
            && cur.offset > 0
            && matches!(cur.bytes[cur.offset - 1], b'e' | b'E');
        if c.is_ascii_alphanumeric() || c == b'.' || c == b'_' || exponent_sign {
            // `1..x` is a number followed by a concatenation
            if c == b'.' && cur.peek_at(1) == Some(b'.') {
                break;
            }
            cur.bump();
        } else {
            break;
        }
    }
}

/// Returns false for an unterminated string.
fn lex_quoted(cur: &mut Cursor<'_>, quote: u8) -> bool {
    cur.bump();
    while let Some(c) = cur.peek() {
        match c {
            b'\\' => {
                cur.bump();
                // `\z` and escaped newlines may span lines
                cur.bump();
            }
            b'\n' | b'\r' => return false,
            c if c == quote => {
                cur.bump();
                return true;
            }
            _ => cur.bump(),
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn texts<'a>(lexed: &Lexed<'a>) -> Vec<&'a str> {
        lexed.tokens.iter().map(|t| t.text).collect()
    }

    #[test]
    fn test_basic_tokens() {
        let lexed = lex("local x = require(\"a\") .. 1.5e+3 -- trailing");
        assert_eq!(
            texts(&lexed),
            vec!["local", "x", "=", "require", "(", "\"a\"", ")", "..", "1.5e+3"]
        );
        assert_eq!(lexed.comments.len(), 1);
        assert_eq!(lexed.comments[0].text, " trailing");
        assert!(lexed.errors.is_empty());
    }

    #[test]
    fn test_positions_are_zero_based() {
        let lexed = lex("a\n  bb");
        assert_eq!(lexed.tokens[1].location, Location::span(1, 2, 2));
        assert_eq!(lexed.eof, Position::new(1, 4));
    }

    #[test]
    fn test_long_strings_and_comments() {
        let lexed = lex("--[==[ x\n]] ]==] s = [[a\nb]]");
        assert_eq!(texts(&lexed), vec!["s", "=", "[[a\nb]]"]);
        assert_eq!(lexed.tokens[2].string_value(), Some("a\nb"));
        assert_eq!(lexed.tokens[0].line(), 1);
    }

    #[test]
    fn test_malformed_string() {
        let lexed = lex("x = 'abc\ny = 1");
        assert_eq!(lexed.errors.len(), 1);
        assert_eq!(lexed.errors[0].message, "Malformed string");
        assert_eq!(lexed.errors[0].location.begin, Position::new(0, 4));
        assert!(lexed.tokens.iter().any(|t| t.text == "y"));
    }

    #[test]
    fn test_hot_comment() {
        let lexed = lex("--!strict\nlocal a = 1");
        assert_eq!(lexed.comments[0].hot(), Some("strict"));
    }

    #[test]
    fn test_number_then_concat() {
        assert_eq!(texts(&lex("1..x")), vec!["1", "..", "x"]);
        assert_eq!(texts(&lex("0xFF_FF")), vec!["0xFF_FF"]);
    }

    proptest! {
        #[test]
        fn lexing_arbitrary_input_never_panics(src in "\\PC*") {
            let lexed = lex(&src);
            for token in &lexed.tokens {
                prop_assert!(!token.text.is_empty());
            }
        }
    }
}
