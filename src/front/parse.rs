//! A recursive-descent parser from `.iota` source text to an [`ast::Program`].
//!
//! One token of lookahead, with a single `parse` entry point
//! (`fn parse(input: &str) -> Result<Program, ParseError>`) over the full
//! `iota` statement/expression grammar: static methods, `if`/`while`,
//! arithmetic, comparisons, short-circuit `&&`/`||`, and calls.

use internment::Intern;

use super::ast::*;
use super::lex::{Lexer, Token, TokenKind};
use crate::common::Type;
use crate::diagnostics::CompileError;

pub fn parse(input: &str) -> Result<Program, CompileError> {
    let mut tokens = Vec::new();
    let mut lexer = Lexer::new(input);
    while let Some(tok) = lexer.next()? {
        tokens.push(tok);
    }
    let mut parser = Parser { tokens, pos: 0 };
    let program = parser.program()?;
    parser.expect_eof()?;
    Ok(program)
}

struct Parser<'src> {
    tokens: Vec<Token<'src>>,
    pos: usize,
}

impl<'src> Parser<'src> {
    fn peek(&self) -> Option<Token<'src>> {
        self.tokens.get(self.pos).copied()
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.peek().map(|t| t.kind)
    }

    fn bump(&mut self) -> Option<Token<'src>> {
        let t = self.peek();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn err(&self, msg: impl Into<String>) -> CompileError {
        let where_ = match self.peek() {
            Some(t) => format!("at {:?} (offset {})", t.text, t.offset),
            None => "at end of input".to_string(),
        };
        CompileError::Parse(format!("{} {}", msg.into(), where_))
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token<'src>, CompileError> {
        match self.peek() {
            Some(t) if t.kind == kind => {
                self.pos += 1;
                Ok(t)
            }
            _ => Err(self.err(format!("expected {kind:?}"))),
        }
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.peek_kind() == Some(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_eof(&self) -> Result<(), CompileError> {
        if self.peek().is_some() {
            return Err(self.err("expected end of input"));
        }
        Ok(())
    }

    fn type_token(&mut self) -> Result<Type, CompileError> {
        match self.peek_kind() {
            Some(TokenKind::Int) => {
                self.bump();
                Ok(Type::Int)
            }
            Some(TokenKind::Boolean) => {
                self.bump();
                Ok(Type::Bool)
            }
            Some(TokenKind::Void) => {
                self.bump();
                Ok(Type::Void)
            }
            _ => Err(self.err("expected a type")),
        }
    }

    fn ident(&mut self) -> Result<Intern<String>, CompileError> {
        let tok = self.expect(TokenKind::Id)?;
        Ok(Intern::new(tok.text.to_string()))
    }

    fn program(&mut self) -> Result<Program, CompileError> {
        let mut methods = Vec::new();
        while self.peek().is_some() {
            methods.push(self.method()?);
        }
        Ok(Program { methods })
    }

    fn method(&mut self) -> Result<Method, CompileError> {
        self.expect(TokenKind::Static)?;
        let ret = self.type_token()?;
        let name = self.ident()?;
        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        if self.peek_kind() != Some(TokenKind::RParen) {
            loop {
                let ty = self.type_token()?;
                let id = self.ident()?;
                params.push((id, ty));
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen)?;
        let mut locals = Vec::new();
        let body = self.block(&mut locals)?;
        Ok(Method {
            name,
            params,
            ret,
            locals,
            body,
        })
    }

    fn block(&mut self, locals: &mut Vec<(Intern<String>, Type)>) -> Result<Vec<Stmt>, CompileError> {
        self.expect(TokenKind::LBrace)?;
        let mut stmts = Vec::new();
        while self.peek_kind() != Some(TokenKind::RBrace) {
            stmts.push(self.stmt(locals)?);
        }
        self.expect(TokenKind::RBrace)?;
        Ok(stmts)
    }

    fn stmt(&mut self, locals: &mut Vec<(Intern<String>, Type)>) -> Result<Stmt, CompileError> {
        match self.peek_kind() {
            Some(TokenKind::Int) | Some(TokenKind::Boolean) => {
                let ty = self.type_token()?;
                let id = self.ident()?;
                self.expect(TokenKind::Assign)?;
                let value = self.expr()?;
                self.expect(TokenKind::Semi)?;
                locals.push((id, ty));
                Ok(Stmt::VarDecl(id, ty, value))
            }
            Some(TokenKind::If) => {
                self.bump();
                self.expect(TokenKind::LParen)?;
                let cond = self.expr()?;
                self.expect(TokenKind::RParen)?;
                let tt = self.block(locals)?;
                let ff = if self.eat(TokenKind::Else) {
                    self.block(locals)?
                } else {
                    Vec::new()
                };
                Ok(Stmt::If { cond, tt, ff })
            }
            Some(TokenKind::While) => {
                self.bump();
                self.expect(TokenKind::LParen)?;
                let cond = self.expr()?;
                self.expect(TokenKind::RParen)?;
                let body = self.block(locals)?;
                Ok(Stmt::While { cond, body })
            }
            Some(TokenKind::Return) => {
                self.bump();
                let value = if self.peek_kind() == Some(TokenKind::Semi) {
                    None
                } else {
                    Some(self.expr()?)
                };
                self.expect(TokenKind::Semi)?;
                Ok(Stmt::Return(value))
            }
            Some(TokenKind::Id) => {
                // Disambiguate `x = expr;` from a call-expression statement
                // by looking one token past the identifier.
                let save = self.pos;
                let id = self.ident()?;
                if self.eat(TokenKind::Assign) {
                    let value = self.expr()?;
                    self.expect(TokenKind::Semi)?;
                    Ok(Stmt::Assign(id, value))
                } else {
                    self.pos = save;
                    let e = self.expr()?;
                    self.expect(TokenKind::Semi)?;
                    Ok(Stmt::ExprStmt(e))
                }
            }
            _ => Err(self.err("expected a statement")),
        }
    }

    // Precedence climbing, loosest to tightest: || , && , ==/!= , relational , +/- , */%/ , unary , primary.
    fn expr(&mut self) -> Result<Expr, CompileError> {
        self.or_expr()
    }

    fn or_expr(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.and_expr()?;
        while self.eat(TokenKind::OrOr) {
            let rhs = self.and_expr()?;
            lhs = Expr::Binary(BOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.eq_expr()?;
        while self.eat(TokenKind::AndAnd) {
            let rhs = self.eq_expr()?;
            lhs = Expr::Binary(BOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn eq_expr(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.rel_expr()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::EqEq) => BOp::Eq,
                Some(TokenKind::Ne) => BOp::Ne,
                _ => break,
            };
            self.bump();
            let rhs = self.rel_expr()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn rel_expr(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.add_expr()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Lt) => BOp::Lt,
                Some(TokenKind::Le) => BOp::Le,
                Some(TokenKind::Gt) => BOp::Gt,
                Some(TokenKind::Ge) => BOp::Ge,
                _ => break,
            };
            self.bump();
            let rhs = self.add_expr()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn add_expr(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.mul_expr()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Plus) => BOp::Add,
                Some(TokenKind::Minus) => BOp::Sub,
                _ => break,
            };
            self.bump();
            let rhs = self.mul_expr()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn mul_expr(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.unary_expr()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Star) => BOp::Mul,
                Some(TokenKind::Slash) => BOp::Div,
                Some(TokenKind::Percent) => BOp::Mod,
                _ => break,
            };
            self.bump();
            let rhs = self.unary_expr()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary_expr(&mut self) -> Result<Expr, CompileError> {
        match self.peek_kind() {
            Some(TokenKind::Minus) => {
                self.bump();
                Ok(Expr::Unary(UOp::Neg, Box::new(self.unary_expr()?)))
            }
            Some(TokenKind::Bang) => {
                self.bump();
                Ok(Expr::Unary(UOp::Not, Box::new(self.unary_expr()?)))
            }
            _ => self.primary_expr(),
        }
    }

    fn primary_expr(&mut self) -> Result<Expr, CompileError> {
        match self.peek_kind() {
            Some(TokenKind::IntLit) => {
                let tok = self.bump().unwrap();
                let v: i64 = tok
                    .text
                    .parse()
                    .map_err(|_| self.err("malformed integer literal"))?;
                let v = i32::try_from(v).map_err(|_| self.err("integer literal out of range"))?;
                Ok(Expr::IntLit(v))
            }
            Some(TokenKind::True) => {
                self.bump();
                Ok(Expr::BoolLit(true))
            }
            Some(TokenKind::False) => {
                self.bump();
                Ok(Expr::BoolLit(false))
            }
            Some(TokenKind::LParen) => {
                self.bump();
                let e = self.expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(e)
            }
            Some(TokenKind::Id) => {
                let id = self.ident()?;
                if self.eat(TokenKind::LParen) {
                    let mut args = Vec::new();
                    if self.peek_kind() != Some(TokenKind::RParen) {
                        loop {
                            args.push(self.expr()?);
                            if !self.eat(TokenKind::Comma) {
                                break;
                            }
                        }
                    }
                    self.expect(TokenKind::RParen)?;
                    Ok(Expr::Call(id, args))
                } else {
                    Ok(Expr::Var(id))
                }
            }
            _ => Err(self.err("expected an expression")),
        }
    }
}
