//! The lexer: turns `.iota` source text into a stream of [`Token`]s.
//!
//! Built as a regex table: whitespace and comments are skipped by one
//! leading regex, and the remaining matchers
//! are tried in order at each position, longest-match-first within a class
//! via greedy regexes (e.g. identifiers vs. keywords are disambiguated in
//! [`TokenKind::keyword_or_id`] rather than by matcher ordering).

use derive_more::Display;
use regex::Regex;

use crate::diagnostics::CompileError;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Display)]
#[display("{kind:?} {text:?}")]
pub struct Token<'src> {
    pub kind: TokenKind,
    pub text: &'src str,
    pub offset: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Id,
    IntLit,
    Int,
    Boolean,
    Void,
    True,
    False,
    If,
    Else,
    While,
    Return,
    Static,
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Semi,
    Assign,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    EqEq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Bang,
}

impl TokenKind {
    fn keyword_or_id(text: &str) -> TokenKind {
        use TokenKind::*;
        match text {
            "int" => Int,
            "boolean" => Boolean,
            "void" => Void,
            "true" => True,
            "false" => False,
            "if" => If,
            "else" => Else,
            "while" => While,
            "return" => Return,
            "static" => Static,
            _ => Id,
        }
    }
}

pub struct Lexer<'input> {
    input: &'input str,
    pos: usize,
    whitespace: Regex,
    id_or_kw: Regex,
    int_lit: Regex,
}

/// Fixed-text tokens, tried longest-first so `<=` is not lexed as `<` then `=`.
const SYMBOLS: &[(&str, TokenKind)] = &[
    ("(", TokenKind::LParen),
    (")", TokenKind::RParen),
    ("{", TokenKind::LBrace),
    ("}", TokenKind::RBrace),
    (",", TokenKind::Comma),
    (";", TokenKind::Semi),
    ("==", TokenKind::EqEq),
    ("!=", TokenKind::Ne),
    ("<=", TokenKind::Le),
    (">=", TokenKind::Ge),
    ("<", TokenKind::Lt),
    (">", TokenKind::Gt),
    ("=", TokenKind::Assign),
    ("+", TokenKind::Plus),
    ("-", TokenKind::Minus),
    ("*", TokenKind::Star),
    ("/", TokenKind::Slash),
    ("%", TokenKind::Percent),
    ("&&", TokenKind::AndAnd),
    ("||", TokenKind::OrOr),
    ("!", TokenKind::Bang),
];

impl<'input> Lexer<'input> {
    pub fn new(input: &'input str) -> Self {
        Lexer {
            input,
            pos: 0,
            whitespace: Regex::new(r"\A(?:[ \t\f\r\n\v]|(?://[^\n]*))*").unwrap(),
            id_or_kw: Regex::new(r"\A[A-Za-z_][A-Za-z0-9_]*").unwrap(),
            int_lit: Regex::new(r"\A[0-9]+").unwrap(),
        }
    }

    pub fn end_of_input(&self) -> bool {
        self.pos == self.input.len()
    }

    fn skip_whitespace(&mut self) {
        if let Some(m) = self.whitespace.find(&self.input[self.pos..]) {
            self.pos += m.end();
        }
    }

    /// Get the next token, or `None` at end of input.
    pub fn next(&mut self) -> Result<Option<Token<'input>>, CompileError> {
        self.skip_whitespace();
        if self.end_of_input() {
            return Ok(None);
        }
        let start = self.pos;
        let rest = &self.input[self.pos..];

        if let Some(m) = self.id_or_kw.find(rest) {
            self.pos += m.end();
            let text = m.as_str();
            return Ok(Some(Token {
                kind: TokenKind::keyword_or_id(text),
                text,
                offset: start,
            }));
        }
        if let Some(m) = self.int_lit.find(rest) {
            self.pos += m.end();
            return Ok(Some(Token {
                kind: TokenKind::IntLit,
                text: m.as_str(),
                offset: start,
            }));
        }
        for (sym, kind) in SYMBOLS {
            if rest.starts_with(sym) {
                self.pos += sym.len();
                return Ok(Some(Token {
                    kind: *kind,
                    text: &rest[..sym.len()],
                    offset: start,
                }));
            }
        }

        let ch = rest.chars().next().unwrap();
        Err(CompileError::Scan { offset: start, ch })
    }
}
