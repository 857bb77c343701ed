use anyhow::{bail, Result};

use crate::ast::*;
use crate::lexer::Lexer;
use crate::token::{Token, TokenKind};

/// Recursive-descent parser over a lazily pulled token stream. Binary
/// expressions are parsed by precedence climbing; postfix chains bind
/// tighter than any infix operator. The first unexpected token aborts the
/// translation unit.
pub struct Parser<'src> {
    lexer: Lexer<'src>,
    current: Token<'src>,
}

fn precedence(kind: TokenKind) -> i32 {
    match kind {
        TokenKind::Star | TokenKind::Slash => 5,
        TokenKind::Plus | TokenKind::Minus => 4,
        TokenKind::Lt | TokenKind::Gt => 3,
        TokenKind::EqualEqual | TokenKind::NotEqual => 2,
        TokenKind::Equal => 1,
        _ => -1,
    }
}

fn binop(kind: TokenKind) -> Option<BinOp> {
    let op = match kind {
        TokenKind::Plus => BinOp::Add,
        TokenKind::Minus => BinOp::Sub,
        TokenKind::Star => BinOp::Mul,
        TokenKind::Slash => BinOp::Div,
        TokenKind::Lt => BinOp::Lt,
        TokenKind::Gt => BinOp::Gt,
        TokenKind::EqualEqual => BinOp::Eq,
        TokenKind::NotEqual => BinOp::Ne,
        TokenKind::Equal => BinOp::Assign,
        _ => return None,
    };
    Some(op)
}

impl<'src> Parser<'src> {
    pub fn new(src: &'src str) -> Self {
        let mut lexer = Lexer::new(src);
        let current = lexer.next_token();
        Parser { lexer, current }
    }

    pub fn parse_module(mut self) -> Result<Vec<Stmt>> {
        let mut stmts = Vec::new();
        while self.current.kind != TokenKind::Eof {
            let stmt = match self.current.kind {
                TokenKind::Def => self.parse_function()?,
                TokenKind::Struct => self.parse_struct()?,
                TokenKind::Extern => self.parse_extern()?,
                _ => self.parse_statement()?,
            };
            stmts.push(stmt);
        }
        Ok(stmts)
    }

    fn advance(&mut self) {
        self.current = self.lexer.next_token();
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.current.kind == kind {
            self.advance();
            return true;
        }
        false
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token<'src>> {
        if self.current.kind == kind {
            let tok = self.current;
            self.advance();
            return Ok(tok);
        }
        bail!(
            "{}:{}: expected {}, found {}",
            self.current.line,
            self.current.column,
            kind,
            self.current.kind
        )
    }

    fn parse_struct(&mut self) -> Result<Stmt> {
        self.expect(TokenKind::Struct)?;
        let name = self.expect(TokenKind::Ident)?.text.to_string();

        let mut fields = Vec::new();
        while self.current.kind != TokenKind::End && self.current.kind != TokenKind::Eof {
            let field = self.expect(TokenKind::Ident)?.text.to_string();
            self.expect(TokenKind::Colon)?;
            let ty_name = self.parse_type_name()?;
            fields.push((field, ty_name));
        }
        self.expect(TokenKind::End)?;

        Ok(Stmt::StructDecl { name, fields })
    }

    fn parse_extern(&mut self) -> Result<Stmt> {
        self.expect(TokenKind::Extern)?;
        self.expect(TokenKind::Def)?;
        let (name, params, ret_ty_name) = self.parse_signature()?;
        Ok(Stmt::Function(FunctionDecl {
            name,
            params,
            ret_ty_name,
            body: None,
        }))
    }

    fn parse_function(&mut self) -> Result<Stmt> {
        self.expect(TokenKind::Def)?;
        let (name, params, ret_ty_name) = self.parse_signature()?;
        let body = self.parse_block()?;
        self.expect(TokenKind::End)?;
        Ok(Stmt::Function(FunctionDecl {
            name,
            params,
            ret_ty_name,
            body: Some(body),
        }))
    }

    fn parse_signature(&mut self) -> Result<(String, Vec<(String, String)>, String)> {
        let name = self.expect(TokenKind::Ident)?.text.to_string();
        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        if self.current.kind != TokenKind::RParen {
            loop {
                let param = self.expect(TokenKind::Ident)?.text.to_string();
                self.expect(TokenKind::Colon)?;
                let ty_name = self.parse_type_name()?;
                params.push((param, ty_name));
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen)?;

        let ret_ty_name = if self.eat(TokenKind::Arrow) {
            self.parse_type_name()?
        } else {
            "void".to_string()
        };
        Ok((name, params, ret_ty_name))
    }

    fn parse_block(&mut self) -> Result<Block> {
        let mut stmts = Vec::new();
        while self.current.kind != TokenKind::End
            && self.current.kind != TokenKind::Else
            && self.current.kind != TokenKind::Eof
        {
            stmts.push(self.parse_statement()?);
        }
        Ok(stmts)
    }

    fn parse_statement(&mut self) -> Result<Stmt> {
        if self.eat(TokenKind::Return) {
            if matches!(
                self.current.kind,
                TokenKind::End | TokenKind::Else | TokenKind::Eof
            ) {
                return Ok(Stmt::Return(None));
            }
            let value = self.parse_expression()?;
            return Ok(Stmt::Return(Some(value)));
        }

        if self.eat(TokenKind::If) {
            let cond = self.parse_expression()?;
            let then_blk = self.parse_block()?;
            let else_blk = if self.eat(TokenKind::Else) {
                Some(self.parse_block()?)
            } else {
                None
            };
            self.expect(TokenKind::End)?;
            return Ok(Stmt::If {
                cond,
                then_blk,
                else_blk,
            });
        }

        if self.eat(TokenKind::While) {
            let cond = self.parse_expression()?;
            let body = self.parse_block()?;
            self.expect(TokenKind::End)?;
            return Ok(Stmt::While { cond, body });
        }

        if self.eat(TokenKind::Var) {
            let name = self.expect(TokenKind::Ident)?.text.to_string();
            let ty_name = if self.eat(TokenKind::Colon) {
                Some(self.parse_type_name()?)
            } else {
                None
            };
            let init = if self.eat(TokenKind::Equal) {
                Some(self.parse_expression()?)
            } else {
                if ty_name.is_none() {
                    // At least one of annotation and initializer is required.
                    self.expect(TokenKind::Equal)?;
                }
                None
            };
            return Ok(Stmt::VarDecl { name, ty_name, init });
        }

        let expr = self.parse_expression()?;
        Ok(Stmt::Expr(expr))
    }

    fn parse_expression(&mut self) -> Result<Expr> {
        let lhs = self.parse_primary()?;
        self.parse_binary(0, lhs)
    }

    fn parse_binary(&mut self, min_prec: i32, mut lhs: Expr) -> Result<Expr> {
        loop {
            let prec = precedence(self.current.kind);
            if prec < min_prec {
                return Ok(lhs);
            }
            let Some(op) = binop(self.current.kind) else {
                return Ok(lhs);
            };
            self.advance();

            let mut rhs = self.parse_primary()?;
            if prec < precedence(self.current.kind) {
                rhs = self.parse_binary(prec + 1, rhs)?;
            }
            lhs = Expr::new(ExprKind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            });
        }
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let mut lhs = match self.current.kind {
            TokenKind::Ident => {
                let name = self.current.text.to_string();
                self.advance();
                if self.eat(TokenKind::LParen) {
                    let mut args = Vec::new();
                    if self.current.kind != TokenKind::RParen {
                        loop {
                            args.push(self.parse_expression()?);
                            if !self.eat(TokenKind::Comma) {
                                break;
                            }
                        }
                    }
                    self.expect(TokenKind::RParen)?;
                    Expr::new(ExprKind::Call { callee: name, args })
                } else {
                    Expr::new(ExprKind::Variable(name))
                }
            }
            TokenKind::Int => {
                let text = self.current.text.to_string();
                self.advance();
                Expr::new(ExprKind::Literal(Literal::Int(text)))
            }
            TokenKind::Float => {
                let text = self.current.text.to_string();
                self.advance();
                Expr::new(ExprKind::Literal(Literal::Float(text)))
            }
            TokenKind::True => {
                self.advance();
                Expr::new(ExprKind::Literal(Literal::Bool(true)))
            }
            TokenKind::False => {
                self.advance();
                Expr::new(ExprKind::Literal(Literal::Bool(false)))
            }
            TokenKind::Str => {
                let text = self.current.text.to_string();
                self.advance();
                Expr::new(ExprKind::Literal(Literal::Str(text)))
            }
            TokenKind::LBracket => {
                self.advance();
                let mut elems = Vec::new();
                if self.current.kind != TokenKind::RBracket {
                    loop {
                        elems.push(self.parse_expression()?);
                        if !self.eat(TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(TokenKind::RBracket)?;
                Expr::new(ExprKind::ArrayLit(elems))
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expression()?;
                self.expect(TokenKind::RParen)?;
                inner
            }
            found => {
                bail!(
                    "{}:{}: expected expression, found {}",
                    self.current.line,
                    self.current.column,
                    found
                )
            }
        };

        // Postfix chains bind before any infix operator.
        loop {
            if self.eat(TokenKind::Dot) {
                let field = self.expect(TokenKind::Ident)?.text.to_string();
                lhs = Expr::new(ExprKind::Member {
                    base: Box::new(lhs),
                    field,
                });
            } else if self.eat(TokenKind::LBracket) {
                let index = self.parse_expression()?;
                self.expect(TokenKind::RBracket)?;
                lhs = Expr::new(ExprKind::Index {
                    base: Box::new(lhs),
                    index: Box::new(index),
                });
            } else {
                break;
            }
        }

        Ok(lhs)
    }

    fn parse_type_name(&mut self) -> Result<String> {
        let mut name = self.expect(TokenKind::Ident)?.text.to_string();
        while self.eat(TokenKind::LBracket) {
            self.expect(TokenKind::RBracket)?;
            name.push_str("[]");
        }
        Ok(name)
    }
}
