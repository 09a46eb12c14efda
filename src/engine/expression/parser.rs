//! Recursive-descent parser producing a fully resolved [`Expr`] tree.
//!
//! Identifier resolution happens during the parse: parameter references are
//! bound to environment indices, helper calls are checked against the
//! registry, and anything unresolved is rejected here rather than at
//! evaluation time.

use super::ast::{Arg, BinaryOp, Expr, Lambda, UnaryOp};
use super::helpers::HelperRegistry;
use super::lexer::{SpannedToken, Token, tokenize};
use super::{ExprError, names_match};

/// Compile-time name resolution context.
pub struct BindingScope<'a> {
    /// Ordered names of the evaluation environment.
    pub bindings: &'a [String],
    /// Registered helper functions (namespaces + root).
    pub helpers: &'a HelperRegistry,
    /// Whether identifier matching is case-sensitive.
    pub case_sensitive: bool,
}

impl BindingScope<'_> {
    fn binding_index(&self, name: &str) -> Option<usize> {
        self.bindings
            .iter()
            .position(|b| names_match(b, name, self.case_sensitive))
    }
}

/// Parse an expression string against the given scope.
pub fn parse(source: &str, scope: &BindingScope<'_>) -> Result<Expr, ExprError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        scope,
        lambda_stack: Vec::new(),
        source_len: source.len(),
    };
    let expr = parser.parse_expr()?;
    if let Some(extra) = parser.peek() {
        return Err(ExprError::Parse {
            position: extra.position,
            message: format!("unexpected {} after expression", extra.token.describe()),
        });
    }
    Ok(expr)
}

struct Parser<'a, 's> {
    tokens: Vec<SpannedToken>,
    pos: usize,
    scope: &'a BindingScope<'s>,
    lambda_stack: Vec<String>,
    source_len: usize,
}

impl Parser<'_, '_> {
    fn peek(&self) -> Option<&SpannedToken> {
        self.tokens.get(self.pos)
    }

    fn peek_token(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|t| &t.token)
    }

    fn next(&mut self) -> Option<SpannedToken> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek_token() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token) -> Result<(), ExprError> {
        if self.eat(&expected) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("expected {}", expected.describe())))
        }
    }

    fn unexpected(&self, context: &str) -> ExprError {
        match self.peek() {
            Some(t) => ExprError::Parse {
                position: t.position,
                message: format!("{context}, found {}", t.token.describe()),
            },
            None => ExprError::Parse {
                position: self.source_len,
                message: format!("{context}, found end of expression"),
            },
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, ExprError> {
        self.parse_ternary()
    }

    fn parse_ternary(&mut self) -> Result<Expr, ExprError> {
        let cond = self.parse_or()?;
        if self.eat(&Token::Question) {
            let then_branch = self.parse_expr()?;
            self.expect(Token::Colon)?;
            let else_branch = self.parse_expr()?;
            return Ok(Expr::Conditional {
                cond: Box::new(cond),
                then_branch: Box::new(then_branch),
                else_branch: Box::new(else_branch),
            });
        }
        Ok(cond)
    }

    fn parse_or(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_and()?;
        while self.eat(&Token::OrOr) {
            let right = self.parse_and()?;
            left = Expr::Binary {
                op: BinaryOp::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_equality()?;
        while self.eat(&Token::AndAnd) {
            let right = self.parse_equality()?;
            left = Expr::Binary {
                op: BinaryOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_comparison()?;
        loop {
            let op = match self.peek_token() {
                Some(Token::EqEq) => BinaryOp::Eq,
                Some(Token::NotEq) => BinaryOp::Ne,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_comparison()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek_token() {
                Some(Token::Lt) => BinaryOp::Lt,
                Some(Token::Le) => BinaryOp::Le,
                Some(Token::Gt) => BinaryOp::Gt,
                Some(Token::Ge) => BinaryOp::Ge,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_additive()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek_token() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_multiplicative()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek_token() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::Percent) => BinaryOp::Mod,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_unary()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ExprError> {
        let op = match self.peek_token() {
            Some(Token::Bang) => Some(UnaryOp::Not),
            Some(Token::Minus) => Some(UnaryOp::Neg),
            _ => None,
        };
        if let Some(op) = op {
            self.pos += 1;
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary {
                op,
                operand: Box::new(operand),
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, ExprError> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.eat(&Token::Dot) {
                let name = self.expect_ident("member name after '.'")?;
                if self.peek_token() == Some(&Token::LParen) {
                    let args = self.parse_args()?;
                    expr = Expr::Method {
                        base: Box::new(expr),
                        name,
                        args,
                    };
                } else {
                    expr = Expr::Member {
                        base: Box::new(expr),
                        field: name,
                    };
                }
            } else if self.eat(&Token::LBracket) {
                let index = self.parse_expr()?;
                self.expect(Token::RBracket)?;
                expr = Expr::Index {
                    base: Box::new(expr),
                    index: Box::new(index),
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, ExprError> {
        let token = match self.next() {
            Some(t) => t,
            None => {
                return Err(ExprError::Parse {
                    position: self.source_len,
                    message: "unexpected end of expression".to_string(),
                });
            }
        };

        match token.token {
            Token::Number(n) => Ok(Expr::Number(n)),
            Token::Str(s) => Ok(Expr::StringLit(s)),
            Token::True => Ok(Expr::Bool(true)),
            Token::False => Ok(Expr::Bool(false)),
            Token::Null => Ok(Expr::Null),
            Token::LParen => {
                let expr = self.parse_expr()?;
                self.expect(Token::RParen)?;
                Ok(expr)
            }
            Token::Ident(name) => self.resolve_ident(name, token.position),
            other => Err(ExprError::Parse {
                position: token.position,
                message: format!("unexpected {}", other.describe()),
            }),
        }
    }

    /// Resolve a bare identifier: lambda parameter, environment binding,
    /// root helper call, or helper namespace call.
    fn resolve_ident(&mut self, name: String, position: usize) -> Result<Expr, ExprError> {
        let cs = self.scope.case_sensitive;

        // A call directly on the identifier is a root helper invocation.
        if self.peek_token() == Some(&Token::LParen) {
            if !self.scope.helpers.has_root(&name, cs) {
                return Err(ExprError::UnknownFunction { name });
            }
            let args = self.parse_args()?;
            return Ok(Expr::Call {
                namespace: None,
                name,
                args,
            });
        }

        // Innermost lambda parameters shadow outer bindings.
        if let Some(param) = self
            .lambda_stack
            .iter()
            .rev()
            .find(|p| names_match(p, &name, cs))
        {
            return Ok(Expr::LambdaParam {
                name: param.clone(),
            });
        }

        if let Some(index) = self.scope.binding_index(&name) {
            return Ok(Expr::Param {
                name: self.scope.bindings[index].clone(),
                index,
            });
        }

        // Helper namespaces are only valid as the qualifier of a call.
        if self.scope.helpers.has_namespace(&name, cs) {
            self.expect(Token::Dot)?;
            let func = self.expect_ident("helper function name after namespace")?;
            if !self.scope.helpers.has_function(&name, &func, cs) {
                return Err(ExprError::UnknownFunction {
                    name: format!("{name}.{func}"),
                });
            }
            if self.peek_token() != Some(&Token::LParen) {
                return Err(ExprError::Parse {
                    position,
                    message: format!("helper '{name}.{func}' must be called with arguments"),
                });
            }
            let args = self.parse_args()?;
            return Ok(Expr::Call {
                namespace: Some(name),
                name: func,
                args,
            });
        }

        Err(ExprError::UnknownIdentifier { name })
    }

    fn parse_args(&mut self) -> Result<Vec<Arg>, ExprError> {
        self.expect(Token::LParen)?;
        let mut args = Vec::new();
        if self.eat(&Token::RParen) {
            return Ok(args);
        }
        loop {
            args.push(self.parse_arg()?);
            if self.eat(&Token::Comma) {
                continue;
            }
            self.expect(Token::RParen)?;
            break;
        }
        Ok(args)
    }

    /// A call argument is a lambda when it looks like `ident =>`, otherwise
    /// a plain expression.
    fn parse_arg(&mut self) -> Result<Arg, ExprError> {
        let is_lambda = matches!(self.peek_token(), Some(Token::Ident(_)))
            && matches!(
                self.tokens.get(self.pos + 1).map(|t| &t.token),
                Some(Token::Arrow)
            );
        if is_lambda {
            let param = self.expect_ident("lambda parameter")?;
            self.expect(Token::Arrow)?;
            self.lambda_stack.push(param.clone());
            let body = self.parse_expr();
            self.lambda_stack.pop();
            return Ok(Arg::Lambda(Lambda {
                param,
                body: Box::new(body?),
            }));
        }
        Ok(Arg::Value(self.parse_expr()?))
    }

    fn expect_ident(&mut self, context: &str) -> Result<String, ExprError> {
        match self.peek_token() {
            Some(Token::Ident(name)) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.unexpected(context)),
        }
    }
}
