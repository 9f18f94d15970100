use super::{ast::*, Parser};
use crate::lex::{LiteralKind, NumberValue, Span, Spanned, TokenKind, TokenKind::*};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Assoc {
    Left,
    Right,
}

/// Precedence, associativity and operator of every binary operator token.
fn binary_op(kind: TokenKind) -> Option<(u8, Assoc, BinOp)> {
    let op = match kind {
        OrOr => (1, Assoc::Left, BinOp::Or),
        CaretCaret => (1, Assoc::Left, BinOp::Xor),
        AndAnd => (2, Assoc::Left, BinOp::And),
        Eq | EqEq => (4, Assoc::Left, BinOp::Eq),
        Ne => (4, Assoc::Left, BinOp::Ne),
        Lt => (4, Assoc::Left, BinOp::Lt),
        Gt => (4, Assoc::Left, BinOp::Gt),
        Le => (4, Assoc::Left, BinOp::Le),
        Ge => (4, Assoc::Left, BinOp::Ge),
        Pipe => (5, Assoc::Left, BinOp::BitOr),
        Tilde => (6, Assoc::Left, BinOp::BitXor),
        Amp => (7, Assoc::Left, BinOp::BitAnd),
        Shl => (8, Assoc::Left, BinOp::Shl),
        Shr => (8, Assoc::Left, BinOp::Shr),
        Plus => (9, Assoc::Left, BinOp::Add),
        Minus => (9, Assoc::Left, BinOp::Sub),
        Star => (10, Assoc::Left, BinOp::Mul),
        Slash => (10, Assoc::Left, BinOp::Div),
        Percent => (10, Assoc::Left, BinOp::Mod),
        Caret => (12, Assoc::Right, BinOp::Pow),
        _ => return None,
    };
    Some(op)
}

fn prefix_op(kind: TokenKind) -> Option<(u8, UnOp)> {
    match kind {
        Not => Some((3, UnOp::Not)),
        Minus => Some((11, UnOp::Neg)),
        Tilde => Some((11, UnOp::BitNot)),
        _ => None,
    }
}

impl<'a> Parser<'a> {
    pub fn parse_expression(&mut self) -> Option<Expr> {
        self.expr_prec(1)
    }

    /// Precedence climbing: folds every binary operator binding at least as
    /// tightly as `min_prec` into the left operand.
    fn expr_prec(&mut self, min_prec: u8) -> Option<Expr> {
        let mut left = self.prefix()?;

        loop {
            let token = self.peek();
            if token.starts_line() {
                break;
            }
            let (prec, assoc, op) = match binary_op(token.kind) {
                Some(info) if info.0 >= min_prec => info,
                _ => break,
            };
            self.advance();

            let next_min = match assoc {
                Assoc::Left => prec + 1,
                Assoc::Right => prec,
            };
            let right = self.expr_prec(next_min)?;
            let span = left.span.to(right.span);
            left = Expr::new(
                ExprKind::BinaryOp {
                    op: Spanned::new(op, token.span),
                    left: Box::new(left),
                    right: Box::new(right),
                },
                span,
            );
        }

        Some(left)
    }

    fn prefix(&mut self) -> Option<Expr> {
        let token = self.peek();
        match prefix_op(token.kind) {
            Some((prec, op)) => {
                self.advance();
                let expr = self.expr_prec(prec)?;
                let span = token.span.to(expr.span);
                Some(Expr::new(
                    ExprKind::UnaryOp {
                        op: Spanned::new(op, token.span),
                        expr: Box::new(expr),
                    },
                    span,
                ))
            }
            None => self.postfix(),
        }
    }

    /// A primary term followed by `.member`, `[index]` and `(args)` suffixes.
    fn postfix(&mut self) -> Option<Expr> {
        let mut expr = self.primary()?;

        loop {
            let token = self.peek();
            if token.starts_line() {
                break;
            }
            match token.kind {
                Dot => {
                    self.advance();
                    let member = self.ident("Expected member name after '.'")?;
                    let span = expr.span.to(member.span);
                    expr = Expr::new(
                        ExprKind::Member {
                            base: Box::new(expr),
                            member,
                        },
                        span,
                    );
                }
                OpenSquare => {
                    self.advance();
                    let index = self.parse_expression()?;
                    let close = self.consume(CloseSquare, "Expected ']' after array index")?;
                    let span = expr.span.to(close.span);
                    expr = Expr::new(
                        ExprKind::ArraySubscript {
                            base: Box::new(expr),
                            index: Box::new(index),
                        },
                        span,
                    );
                }
                OpenParen => {
                    let callee = match expr.as_name() {
                        Some(name) => name,
                        None => {
                            self.handler
                                .report(token.span, "Only named functions can be called");
                            return None;
                        }
                    };
                    self.advance();
                    let args = self.call_args(token.span)?;
                    let span = expr.span.to(args.span);
                    expr = Expr::new(ExprKind::FunctionCall { callee, args }, span);
                }
                _ => break,
            }
        }

        Some(expr)
    }

    /// Arguments after an already consumed `(`, through the closing `)`.
    pub(super) fn call_args(&mut self, open: Span) -> Option<ExprList> {
        let mut exprs = vec![];
        if !self.check(CloseParen) {
            loop {
                exprs.push(self.parse_expression()?);
                if !self.eat(Comma) {
                    break;
                }
            }
        }
        let close = self.consume(CloseParen, "Expected ')' after arguments")?;
        Some(ExprList {
            exprs,
            span: open.to(close.span),
        })
    }

    fn primary(&mut self) -> Option<Expr> {
        let token = self.advance();
        let lit = match token.kind {
            True => Lit::Bool(true),
            False => Lit::Bool(false),
            Literal { kind } => match (kind, token.value) {
                (LiteralKind::Str, _) => Lit::Str(token.symbol),
                (LiteralKind::Int, NumberValue::Int(v)) => Lit::Int(v),
                (LiteralKind::UInt, NumberValue::Int(v)) => Lit::UInt(v),
                (LiteralKind::Float, NumberValue::Float(v)) => Lit::Float(v),
                (LiteralKind::Double, NumberValue::Float(v)) => Lit::Double(v),
                _ => {
                    self.handler.report(token.span, "Malformed number literal");
                    return None;
                }
            },
            Ident => {
                let name = Spanned::new(token.symbol, token.span);
                return Some(Expr::new(ExprKind::Name(name), token.span));
            }
            OpenParen => {
                let mut expr = self.parse_expression()?;
                let close = self.consume(CloseParen, "Expected ')' after expression")?;
                expr.span = token.span.to(close.span);
                return Some(expr);
            }
            kind => {
                self.handler
                    .report(token.span, &format!("Expected expression, found {}", kind));
                return None;
            }
        };

        Some(Expr::new(ExprKind::Literal(lit), token.span))
    }
}

#[cfg(test)]
mod tests {
    use crate::{context::CompilationContext, err::Handler, parse::Parser};
    use std::rc::Rc;

    fn expr(src: &str) -> String {
        let src: Rc<str> = src.into();
        let ctx = CompilationContext::default();
        let handler = Rc::new(Handler::new("expr.dba", &src).quiet());
        let mut parser = Parser::new(src, &ctx, &handler);
        parser.parse_expression().expect("bad expression").to_string()
    }

    #[test]
    fn precedence() {
        assert_eq!(expr("1 + 2 * 3"), "(+ 1 (* 2 3))");
        assert_eq!(expr("1 - 2 - 3"), "(- (- 1 2) 3)");
        assert_eq!(expr("a < b and c = d"), "(&& (< a b) (= c d))");
        assert_eq!(expr("a or b and c"), "(|| a (&& b c))");
        assert_eq!(expr("a | b ~ c & d"), "(| a (~ b (& c d)))");
        assert_eq!(expr("1 << 2 + 3"), "(<< 1 (+ 2 3))");
        assert_eq!(expr("a mod 3"), "(% a 3)");
    }

    #[test]
    fn power_is_right_associative() {
        assert_eq!(expr("2 ^ 3 ^ 2"), "(^ 2 (^ 3 2))");
        assert_eq!(expr("-2 ^ 2"), "(- (^ 2 2))");
    }

    #[test]
    fn prefix_operators() {
        assert_eq!(expr("not a = b"), "(! (= a b))");
        assert_eq!(expr("-a * b"), "(* (- a) b)");
        assert_eq!(expr("~x & 1"), "(& (~ x) 1)");
    }

    #[test]
    fn postfix_chains() {
        assert_eq!(expr("a.b[1].c"), "(. ([] (. a b) 1) c)");
        assert_eq!(expr("f(1, g(2))[0]"), "([] (call f 1 (call g 2)) 0)");
        assert_eq!(expr("(1 + 2) * 3"), "(* (+ 1 2) 3)");
    }

    #[test]
    fn literals() {
        assert_eq!(expr("0x1F"), "31");
        assert_eq!(expr("0b101"), "5");
        assert_eq!(expr("7u"), "7u");
        assert_eq!(expr("1.5"), "1.5f");
        assert_eq!(expr("2d"), "2.0d");
        assert_eq!(expr("\"say \"\"hi\"\"\""), "\"say \\\"hi\\\"\"");
        assert_eq!(expr("true"), "true");
    }
}
