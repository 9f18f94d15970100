pub mod ast;
mod expr;

use crate::{
    context::CompilationContext,
    err::Handler,
    lex::{Lexer, Span, Spanned, Token, TokenKind, TokenKind::*},
};
use ast::*;
use ast::Ident;
use std::rc::Rc;

/// Recursive-descent statement parser.
///
/// Every failure has been reported to the handler by the time `None` is
/// returned; there is no recovery, the first error ends the parse.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    handler: Rc<Handler>,
    prev: Token,
    in_function: bool,
    loop_depth: usize,
    case_depth: usize,
}

impl<'a> Parser<'a> {
    pub fn new(src: Rc<str>, ctx: &'a CompilationContext, handler: &Rc<Handler>) -> Self {
        Self {
            lexer: Lexer::new(src, &ctx.keywords, handler),
            handler: handler.clone(),
            prev: Token::dummy(),
            in_function: false,
            loop_depth: 0,
            case_depth: 0,
        }
    }

    pub fn parse(&mut self) -> Option<Program> {
        let mut program = Program::default();
        while !self.eof() {
            match self.peek().kind {
                Function => {
                    let function = self.function()?;
                    program.functions.push(function);
                }
                Type => {
                    let ty = self.user_type()?;
                    program.types.push(ty);
                }
                _ => self.parse_statement(&mut program.stmts)?,
            }
        }
        log::debug!(
            "parsed {} function(s), {} type(s), {} statement(s)",
            program.functions.len(),
            program.types.len(),
            program.stmts.len()
        );
        Some(program)
    }

    /// Parses one statement, including any nested block, and appends it to
    /// `into`.
    pub fn parse_statement(&mut self, into: &mut Vec<Stmt>) -> Option<()> {
        let token = self.peek();
        if !token.starts_line() {
            self.handler.report(
                token.span,
                &format!("Expected end of statement, found {}", token.kind),
            );
            return None;
        }

        let stmt = match token.kind {
            Ident => self.ident_stmt()?,
            Local | Global => {
                self.advance();
                let scope = if self.prev.kind == Local {
                    DeclScope::Local
                } else {
                    DeclScope::Global
                };
                self.var_decl(scope, token.span)?
            }
            Dim => {
                self.advance();
                self.dim(token.span)?
            }
            If => {
                self.advance();
                self.if_stmt(token.span)?
            }
            Select => {
                self.advance();
                self.select(token.span)?
            }
            Do => {
                self.advance();
                let body = self.loop_body(&[Loop])?;
                self.consume(Loop, "Expected 'loop' to close 'do'")?;
                self.mk_stmt(StmtKind::DoLoop(body), token.span)
            }
            While => {
                self.advance();
                let cond = self.parse_expression()?;
                let body = self.loop_body(&[EndWhile])?;
                self.consume(EndWhile, "Expected 'endwhile' to close 'while'")?;
                self.mk_stmt(StmtKind::WhileLoop { cond, body }, token.span)
            }
            Repeat => {
                self.advance();
                let body = self.loop_body(&[Until])?;
                self.consume(Until, "Expected 'until' to close 'repeat'")?;
                let cond = self.parse_expression()?;
                self.mk_stmt(StmtKind::RepeatLoop { body, cond }, token.span)
            }
            For => {
                self.advance();
                self.for_loop(token.span)?
            }
            Goto => {
                self.advance();
                let label = self.ident("Expected label name after 'goto'")?;
                self.mk_stmt(StmtKind::Goto(label), token.span)
            }
            Return => {
                self.advance();
                self.return_stmt(token.span)?
            }
            Exit | Continue => {
                self.advance();
                if self.loop_depth == 0 {
                    self.handler.report(
                        token.span,
                        &format!("{} is only allowed inside a loop", token.kind),
                    );
                    return None;
                }
                let flow = if token.kind == Exit {
                    LoopFlow::Exit
                } else {
                    LoopFlow::Continue
                };
                self.mk_stmt(StmtKind::LoopFlow(flow), token.span)
            }
            Fallthrough => {
                self.advance();
                if self.case_depth == 0 {
                    self.handler
                        .report(token.span, "'fallthrough' is only allowed inside a case");
                    return None;
                }
                self.mk_stmt(StmtKind::Fallthrough, token.span)
            }
            End => {
                self.advance();
                self.mk_stmt(StmtKind::End, token.span)
            }
            Function | Type => {
                self.handler.report(
                    token.span,
                    &format!("{} is only allowed at the top level", token.kind),
                );
                return None;
            }
            kind => {
                self.handler
                    .report(token.span, &format!("Expected statement, found {}", kind));
                return None;
            }
        };

        log::trace!("statement {}", stmt);
        self.end_of_statement()?;
        into.push(stmt);
        Some(())
    }

    /// Statements led by a name: label, declaration, assignment or command.
    fn ident_stmt(&mut self) -> Option<Stmt> {
        let name_tok = self.advance();
        let name = Spanned::new(name_tok.symbol, name_tok.span);

        match self.peek().kind {
            Colon => {
                self.advance();
                return Some(self.mk_stmt(StmtKind::LabelDecl(name), name.span));
            }
            As => {
                self.lexer.unget();
                return self.var_decl(DeclScope::Default, name.span);
            }
            OpenParen if !self.peek().starts_line() => {
                self.advance();
                let args = self.call_args(self.prev.span)?;
                let callee = name;
                return Some(self.mk_stmt(StmtKind::FunctionCall { callee, args }, name.span));
            }
            _ => {}
        }

        let target = self.assign_target(name)?;
        let next = self.peek();
        if !next.starts_line() {
            if next.kind == Eq {
                self.advance();
                let value = self.parse_expression()?;
                let kind = StmtKind::Assign {
                    target,
                    op: None,
                    value,
                };
                return Some(self.mk_stmt(kind, name.span));
            }
            if next.kind.is_op_assign() {
                self.advance();
                let op = match next.kind {
                    PlusEq => BinOp::Add,
                    MinusEq => BinOp::Sub,
                    StarEq => BinOp::Mul,
                    _ => BinOp::Div,
                };
                let value = self.parse_expression()?;
                let kind = StmtKind::Assign {
                    target,
                    op: Some(Spanned::new(op, next.span)),
                    value,
                };
                return Some(self.mk_stmt(kind, name.span));
            }
        }

        if target.as_name().is_none() {
            self.handler
                .report(next.span, "Expected '=' after assignment target");
            return None;
        }

        // A command call: `name arg, arg`.
        let mut args = ExprList {
            exprs: vec![],
            span: name.span,
        };
        if !self.at_statement_end() {
            loop {
                let e = self.parse_expression()?;
                args.span = args.span.to(e.span);
                args.exprs.push(e);
                if !self.eat(Comma) {
                    break;
                }
            }
        }
        Some(self.mk_stmt(StmtKind::FunctionCall { callee: name, args }, name.span))
    }

    /// `name`, followed by any chain of `.member` and `[index]`.
    fn assign_target(&mut self, name: Ident) -> Option<Expr> {
        let mut target = Expr::new(ExprKind::Name(name), name.span);
        loop {
            if self.peek().starts_line() {
                break;
            }
            if self.eat(Dot) {
                let member = self.ident("Expected member name after '.'")?;
                let span = target.span.to(member.span);
                target = Expr::new(
                    ExprKind::Member {
                        base: Box::new(target),
                        member,
                    },
                    span,
                );
            } else if self.eat(OpenSquare) {
                let index = self.parse_expression()?;
                let close = self.consume(CloseSquare, "Expected ']' after array index")?;
                let span = target.span.to(close.span);
                target = Expr::new(
                    ExprKind::ArraySubscript {
                        base: Box::new(target),
                        index: Box::new(index),
                    },
                    span,
                );
            } else {
                break;
            }
        }
        Some(target)
    }

    /// `name [as type] [= expr]`, after an optional `local`/`global`.
    fn var_decl(&mut self, scope: DeclScope, lo: Span) -> Option<Stmt> {
        let name = self.ident("Expected variable name")?;
        let ty = if self.eat(As) {
            Some(self.type_name()?)
        } else {
            None
        };
        let init = if self.eat(Eq) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        let decl = VarDecl {
            scope,
            name,
            ty,
            dim: None,
            init,
        };
        Some(self.mk_stmt(StmtKind::VarDecl(decl), lo))
    }

    /// `dim name[size] [as type]`
    fn dim(&mut self, lo: Span) -> Option<Stmt> {
        let name = self.ident("Expected array name after 'dim'")?;
        self.consume(OpenSquare, "Expected '[' after array name")?;
        let size = self.parse_expression()?;
        self.consume(CloseSquare, "Expected ']' after array size")?;

        let ty = if self.eat(As) {
            let ty = self.type_name()?;
            if ty.array {
                self.handler
                    .report(ty.span, "Element type of a 'dim' array cannot be an array");
                return None;
            }
            Some(ty)
        } else {
            None
        };

        let decl = VarDecl {
            scope: DeclScope::Default,
            name,
            ty,
            dim: Some(size),
            init: None,
        };
        Some(self.mk_stmt(StmtKind::VarDecl(decl), lo))
    }

    fn type_name(&mut self) -> Option<TypeName> {
        let name = self.ident("Expected type name")?;
        let mut span = name.span;
        let mut array = false;
        if self.check(OpenSquare) && !self.peek().starts_line() {
            self.advance();
            let close = self.consume(CloseSquare, "Expected ']' in array type")?;
            span = span.to(close.span);
            array = true;
        }
        Some(TypeName { name, array, span })
    }

    fn if_stmt(&mut self, lo: Span) -> Option<Stmt> {
        let mut branches = vec![];
        let mut else_body = None;

        let cond = self.parse_expression()?;
        let body = self.block(&[ElseIf, Else, EndIf])?;
        branches.push(IfBranch { cond, body });

        loop {
            let token = self.advance();
            match token.kind {
                ElseIf => {
                    let cond = self.parse_expression()?;
                    let body = self.block(&[ElseIf, Else, EndIf])?;
                    branches.push(IfBranch { cond, body });
                }
                Else => {
                    else_body = Some(self.block(&[EndIf])?);
                    self.consume(EndIf, "Expected 'endif' after 'else' block")?;
                    break;
                }
                _ => break,
            }
        }

        let stmt = ast::If {
            branches,
            else_body,
        };
        Some(self.mk_stmt(StmtKind::If(stmt), lo))
    }

    fn select(&mut self, lo: Span) -> Option<Stmt> {
        let expr = self.parse_expression()?;
        self.end_of_statement()?;

        let mut cases = vec![];
        let mut seen_default = false;
        loop {
            let token = self.advance();
            match token.kind {
                EndSelect => break,
                Case => {}
                Eof => {
                    self.handler
                        .report(token.span, "Expected 'endselect' to close 'select'");
                    return None;
                }
                kind => {
                    self.handler.report(
                        token.span,
                        &format!("Expected 'case' or 'endselect', found {}", kind),
                    );
                    return None;
                }
            }

            let values = if self.eat(Default) {
                if seen_default {
                    self.handler
                        .report(self.prev.span, "Duplicate 'case default'");
                    return None;
                }
                seen_default = true;
                None
            } else {
                let first = self.parse_expression()?;
                let mut list = ExprList {
                    span: first.span,
                    exprs: vec![first],
                };
                while self.eat(Comma) {
                    let e = self.parse_expression()?;
                    list.span = list.span.to(e.span);
                    list.exprs.push(e);
                }
                Some(list)
            };

            self.case_depth += 1;
            let body = self.block(&[Case, EndCase, EndSelect]);
            self.case_depth -= 1;
            let body = body?;
            self.eat_line_start(EndCase);

            cases.push(ast::Case {
                values,
                body,
                span: token.span,
            });
        }

        if let Some(last) = cases.last() {
            if let Some(span) = find_fallthrough(&last.body) {
                self.handler
                    .report(span, "'fallthrough' in the last case has no case to fall into");
                return None;
            }
        }

        Some(self.mk_stmt(StmtKind::Select(ast::Select { expr, cases }), lo))
    }

    fn for_loop(&mut self, lo: Span) -> Option<Stmt> {
        let var = self.ident("Expected loop variable after 'for'")?;
        self.consume(Eq, "Expected '=' after loop variable")?;
        let start = self.parse_expression()?;

        let inclusive = if self.eat(To) {
            true
        } else if self.eat(Until) {
            false
        } else {
            let token = self.peek();
            self.handler.report(
                token.span,
                &format!("Expected 'to' or 'until', found {}", token.kind),
            );
            return None;
        };
        let end = self.parse_expression()?;
        let step = if self.eat(Step) {
            Some(self.parse_expression()?)
        } else {
            None
        };

        let body = self.loop_body(&[Next])?;
        self.consume(Next, "Expected 'next' to close 'for'")?;
        if !self.at_statement_end() {
            let next_var = self.ident("Expected loop variable after 'next'")?;
            if !next_var.node.eq_ignore_case(var.node) {
                self.handler.report(
                    next_var.span,
                    &format!(
                        "'next {}' does not match the loop variable '{}'",
                        next_var.node, var.node
                    ),
                );
                return None;
            }
        }

        let l = ast::ForLoop {
            var,
            start,
            end,
            inclusive,
            step,
            body,
        };
        Some(self.mk_stmt(StmtKind::ForLoop(l), lo))
    }

    fn return_stmt(&mut self, lo: Span) -> Option<Stmt> {
        if self.at_statement_end() {
            return Some(self.mk_stmt(StmtKind::Return(None), lo));
        }
        if !self.in_function {
            self.handler
                .report(lo, "Returning a value is only allowed inside a function");
            return None;
        }
        let value = self.parse_expression()?;
        Some(self.mk_stmt(StmtKind::Return(Some(value)), lo))
    }

    fn function(&mut self) -> Option<ast::Function> {
        let kw = self.advance();
        if !kw.starts_line() {
            self.handler.report(kw.span, "Expected end of statement");
            return None;
        }

        let name = self.ident("Expected function name")?;
        self.consume(OpenParen, "Expected '(' after function name")?;
        let mut params = vec![];
        if !self.eat(CloseParen) {
            loop {
                let by_ref = self.eat(ByRef);
                let pname = self.ident("Expected parameter name")?;
                let ty = if self.eat(As) {
                    Some(self.type_name()?)
                } else {
                    None
                };
                params.push(Param {
                    name: pname,
                    ty,
                    by_ref,
                });
                if !self.eat(Comma) {
                    break;
                }
            }
            self.consume(CloseParen, "Expected ')' after parameters")?;
        }
        let ret = if self.eat(As) {
            Some(self.type_name()?)
        } else {
            None
        };

        self.in_function = true;
        let body = self.block(&[EndFunction]);
        self.in_function = false;
        let body = body?;

        let end = self.consume(EndFunction, "Expected 'endfunction'")?;
        let end_value = if self.at_statement_end() {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.end_of_statement()?;

        let span = kw.span.to(end.span);
        log::trace!("function {} with {} param(s)", name.node, params.len());
        Some(ast::Function {
            name,
            params,
            ret,
            body,
            end_value,
            span,
        })
    }

    fn user_type(&mut self) -> Option<UserTypeDecl> {
        let kw = self.advance();
        if !kw.starts_line() {
            self.handler.report(kw.span, "Expected end of statement");
            return None;
        }
        let name = self.ident("Expected type name after 'type'")?;
        self.end_of_statement()?;

        let mut fields = vec![];
        while !self.check(EndType) {
            if self.eof() {
                let span = self.peek().span;
                self.handler
                    .report(span, "Expected 'endtype' to close 'type'");
                return None;
            }
            let fname = self.ident("Expected field name")?;
            self.consume(As, "Expected 'as' after field name")?;
            let ty = self.type_name()?;
            self.end_of_statement()?;
            fields.push(Field { name: fname, ty });
        }
        let end = self.advance();
        self.end_of_statement()?;

        Some(UserTypeDecl {
            name,
            fields,
            span: kw.span.to(end.span),
        })
    }

    fn loop_body(&mut self, terminators: &[TokenKind]) -> Option<Block> {
        self.loop_depth += 1;
        let body = self.block(terminators);
        self.loop_depth -= 1;
        body
    }

    /// Statements up to (not including) a line-starting terminator.
    fn block(&mut self, terminators: &[TokenKind]) -> Option<Block> {
        let lo = self.peek().span;
        let mut stmts = vec![];
        loop {
            let token = self.peek();
            if token.starts_line() && terminators.contains(&token.kind) {
                break;
            }
            if token.is_eof() {
                let expected = terminators
                    .iter()
                    .map(|k| k.to_string())
                    .collect::<Vec<_>>()
                    .join(" or ");
                self.handler.report(
                    token.span,
                    &format!("Unterminated block: expected {}", expected),
                );
                return None;
            }
            self.parse_statement(&mut stmts)?;
        }
        let span = lo.to(self.prev.span);
        Some(Block { stmts, span })
    }

    fn end_of_statement(&mut self) -> Option<()> {
        if self.at_statement_end() {
            Some(())
        } else {
            let token = self.peek();
            self.handler.report(
                token.span,
                &format!("Expected end of statement, found {}", token.kind),
            );
            None
        }
    }

    fn at_statement_end(&mut self) -> bool {
        let token = self.peek();
        token.starts_line() || token.is_eof()
    }

    fn mk_stmt(&self, kind: StmtKind, lo: Span) -> Stmt {
        Stmt {
            kind,
            span: lo.to(self.prev.span),
        }
    }

    fn ident(&mut self, msg: &str) -> Option<Ident> {
        let token = self.consume(Ident, msg)?;
        Some(Spanned::new(token.symbol, token.span))
    }

    fn consume(&mut self, kind: TokenKind, msg: &str) -> Option<Token> {
        if self.check(kind) {
            return Some(self.advance());
        }

        let token = self.peek();
        self.handler
            .report(token.span, &format!("{}, found {}", msg, token.kind));
        None
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn eat_line_start(&mut self, kind: TokenKind) -> bool {
        let token = self.peek();
        if token.kind == kind && token.starts_line() {
            self.advance();
            true
        } else {
            false
        }
    }

    fn check(&mut self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn peek(&mut self) -> Token {
        self.lexer.peek()
    }

    fn advance(&mut self) -> Token {
        let token = self.lexer.next();
        self.prev = token.clone();
        token
    }

    fn eof(&mut self) -> bool {
        self.peek().is_eof()
    }
}

/// The first `fallthrough` that would leave `body`, ignoring nested selects.
fn find_fallthrough(body: &Block) -> Option<Span> {
    body.stmts.iter().find_map(|s| match &s.kind {
        StmtKind::Fallthrough => Some(s.span),
        StmtKind::If(stmt) => stmt
            .branches
            .iter()
            .map(|b| &b.body)
            .chain(stmt.else_body.iter())
            .find_map(find_fallthrough),
        StmtKind::DoLoop(b)
        | StmtKind::WhileLoop { body: b, .. }
        | StmtKind::RepeatLoop { body: b, .. } => find_fallthrough(b),
        StmtKind::ForLoop(l) => find_fallthrough(&l.body),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Option<Program> {
        let src: Rc<str> = src.into();
        let ctx = CompilationContext::default();
        let handler = Rc::new(Handler::new("test.dba", &src).quiet());
        let mut parser = Parser::new(src, &ctx, &handler);
        parser.parse()
    }

    fn render(src: &str) -> String {
        parse(src).expect("parse failed").to_string()
    }

    #[test]
    fn single_line_if_matches_block_if() {
        assert_eq!(render("if x then print y"), render("if x : print y : endif"));
        assert_eq!(
            render("if x then print y\nprint z"),
            render("if x\n print y\nendif\nprint z")
        );
    }

    #[test]
    fn single_line_if_with_else() {
        assert_eq!(
            render("if a = 1 then b = 2 else b = 3"),
            "(if ((= a 1) (block (= b 2))) (else (block (= b 3))))\n"
        );
    }

    #[test]
    fn nested_single_line_ifs_close_together() {
        assert_eq!(
            render("if a then if b then c = 1\nd = 2"),
            "(if (a (block (if (b (block (= c 1)))))))\n(= d 2)\n"
        );
    }

    #[test]
    fn labels_and_commands() {
        assert_eq!(
            render("start:\nprint 1, 2\ngoto start"),
            "(label start)\n(call print 1 2)\n(goto start)\n"
        );
    }

    #[test]
    fn colon_separates_statements() {
        assert_eq!(render("a = 1 : b = 2"), "(= a 1)\n(= b 2)\n");
    }

    #[test]
    fn declarations() {
        assert_eq!(
            render("local x as integer = 5\ndim arr[10] as float\nnames as string[]"),
            "(var local x integer = 5)\n(var arr float [10])\n(var names string[])\n"
        );
    }

    #[test]
    fn compound_assignment() {
        assert_eq!(render("p.x += 2"), "(+= (. p x) 2)\n");
    }

    #[test]
    fn for_loops() {
        assert_eq!(
            render("for i = 1 to 3\nprint i\nnext i"),
            "(for i 1 to 3 (block (call print i)))\n"
        );
        assert_eq!(
            render("for i = 0 until 10 step 2\nnext"),
            "(for i 0 until 10 step 2 (block))\n"
        );
        assert!(parse("for i = 1 to 3\nnext j").is_none());
    }

    #[test]
    fn select_with_default() {
        assert_eq!(
            render("select x\ncase 1, 2\nprint 1\nfallthrough\ncase default\nprint 2\nendselect"),
            "(select x (case 1 2 (block (call print 1) (fallthrough))) (default (block (call print 2))))\n"
        );
    }

    #[test]
    fn control_flow_placement() {
        assert!(parse("exit").is_none());
        assert!(parse("do\nexit\nloop").is_some());
        assert!(parse("return 5").is_none());
        assert!(parse("select x\ncase 1\nfallthrough\nendselect").is_none());
        assert!(parse("function f()\nfunction g()\nendfunction\nendfunction").is_none());
        assert!(parse("if x\ntype t\nendtype\nendif").is_none());
    }

    #[test]
    fn functions_and_types() {
        let src = "type vec\nx as float\ny as float\nendtype\n\
                   function add(a as integer, byref b as integer) as integer\n\
                   return a + b\nendfunction";
        assert_eq!(
            render(src),
            "(type vec (x float) (y float))\n\
             (function add (a integer byref b integer) integer (block (return (+ a b))))\n"
        );
    }

    #[test]
    fn unterminated_block_fails() {
        assert!(parse("while x\nprint 1").is_none());
        assert!(parse("a = 1 b = 2").is_none());
    }
}
