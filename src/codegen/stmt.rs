use super::{Emitter, LoopTargets, ARRAY_FREE, STRING_FREE};
use crate::{
    err::Result,
    ir::{IrType, VReg},
    parse::ast::BinOp,
    typeck::{
        hir::{self, ExprKind, StmtKind},
        ty::TypeRef,
    },
};

impl<'p> Emitter<'p> {
    pub(crate) fn block(&mut self, block: &'p hir::Block) -> Result<()> {
        let mut this = self.enter_frame();
        for stmt in &block.stmts {
            this.stmt(stmt)?;
        }
        Ok(())
    }

    /// Evaluates a condition in its own frame so temporaries die before
    /// the branch.
    fn condition(&mut self, cond: &'p hir::Expr) -> Result<VReg> {
        let mut this = self.enter_frame();
        this.expr(cond)
    }

    fn stmt(&mut self, stmt: &'p hir::Stmt) -> Result<()> {
        match &stmt.kind {
            StmtKind::Label(id) => {
                if let Some(block) = self.labels.get(id).copied() {
                    self.b.set_block(block);
                }
            }
            StmtKind::Decl { var, dim, init } => {
                let ty = self
                    .program
                    .scopes
                    .get(*var)
                    .as_variable()
                    .map(|v| v.ty.clone());
                let ty = match ty {
                    Some(ty) => ty,
                    None => return self.handler.mk_err(stmt.span, "Not a variable"),
                };
                let addr = self.var_addr(*var)?;
                if let Some(size) = dim {
                    self.dim(addr, &ty, size)?;
                }
                if let Some(init) = init {
                    let value = self.expr(init)?;
                    self.store_value(addr, value, &ty);
                }
            }
            StmtKind::Assign { target, value } => self.assign(target, value)?,
            StmtKind::Expr(e) => {
                self.call_or_expr(e)?;
            }
            StmtKind::If {
                branches,
                else_body,
            } => self.if_chain(branches, else_body.as_ref())?,
            StmtKind::Select { expr, cases } => self.select(expr, cases)?,
            StmtKind::DoLoop(body) => {
                let body_block = self.b.create_block("do.body");
                let after = self.b.create_block("do.end");
                self.b.set_block(body_block);
                self.loop_body(body, after, body_block)?;
                self.b.br(body_block);
                self.b.set_block(after);
            }
            StmtKind::While { cond, body } => {
                let head = self.b.create_block("while.cond");
                let body_block = self.b.create_block("while.body");
                let after = self.b.create_block("while.end");
                self.b.set_block(head);
                let c = self.condition(cond)?;
                self.b.cond_br(c, body_block, after);
                self.b.set_block(body_block);
                self.loop_body(body, after, head)?;
                self.b.br(head);
                self.b.set_block(after);
            }
            StmtKind::Repeat { body, cond } => {
                let body_block = self.b.create_block("repeat.body");
                let test = self.b.create_block("repeat.cond");
                let after = self.b.create_block("repeat.end");
                self.b.set_block(body_block);
                self.loop_body(body, after, test)?;
                self.b.set_block(test);
                let c = self.condition(cond)?;
                self.b.cond_br(c, after, body_block);
                self.b.set_block(after);
            }
            StmtKind::For(l) => self.for_loop(l)?,
            StmtKind::Goto(label) => {
                if let Some(block) = self.labels.get(label).copied() {
                    self.b.br(block);
                }
                self.detach("after.goto");
            }
            StmtKind::Return(value) => {
                self.emit_return(value.as_ref())?;
                self.detach("after.return");
            }
            StmtKind::Exit | StmtKind::Continue => {
                let targets = match self.loops.last().copied() {
                    Some(t) => t,
                    None => return self.handler.mk_err(stmt.span, "Not inside a loop"),
                };
                let pending = self.cleanups.pending_from(targets.depth);
                self.emit_cleanups(&pending);
                if matches!(stmt.kind, StmtKind::Exit) {
                    self.b.br(targets.brk);
                } else {
                    self.b.br(targets.cont);
                }
                self.detach("after.jump");
            }
            StmtKind::Fallthrough => {
                let (target, depth) = match self.next_case.last().copied() {
                    Some((Some(t), depth)) => (t, depth),
                    _ => return self.handler.mk_err(stmt.span, "No case to fall through to"),
                };
                let pending = self.cleanups.pending_from(depth);
                self.emit_cleanups(&pending);
                self.b.br(target);
                self.detach("after.fallthrough");
            }
            StmtKind::End => {
                self.b.call_void("__rt_end", vec![]);
                self.b.unreachable();
                self.detach("after.end");
            }
        }
        Ok(())
    }

    fn loop_body(
        &mut self,
        body: &'p hir::Block,
        brk: crate::ir::BlockId,
        cont: crate::ir::BlockId,
    ) -> Result<()> {
        self.loops.push(LoopTargets {
            brk,
            cont,
            depth: self.cleanups.depth(),
        });
        let result = self.block(body);
        self.loops.pop();
        result
    }

    fn if_chain(
        &mut self,
        branches: &'p [hir::IfBranch],
        else_body: Option<&'p hir::Block>,
    ) -> Result<()> {
        let tests: Vec<_> = (0..branches.len())
            .map(|i| {
                if i == 0 {
                    None
                } else {
                    Some(self.b.create_block("if.test"))
                }
            })
            .collect();
        let bodies: Vec<_> = branches
            .iter()
            .map(|_| self.b.create_block("if.then"))
            .collect();
        let else_block = else_body.map(|_| self.b.create_block("if.else"));
        let merge = self.b.create_block("if.end");

        for (i, branch) in branches.iter().enumerate() {
            if let Some(test) = tests[i] {
                self.b.set_block(test);
            }
            let c = self.condition(&branch.cond)?;
            let next = tests
                .get(i + 1)
                .copied()
                .flatten()
                .or(else_block)
                .unwrap_or(merge);
            self.b.cond_br(c, bodies[i], next);
            self.b.set_block(bodies[i]);
            self.block(&branch.body)?;
            self.b.br(merge);
        }
        if let (Some(block), Some(body)) = (else_block, else_body) {
            self.b.set_block(block);
            self.block(body)?;
            self.b.br(merge);
        }
        self.b.set_block(merge);
        Ok(())
    }

    fn select(&mut self, selector: &'p hir::Expr, cases: &'p [hir::Case]) -> Result<()> {
        let value = self.expr(selector)?;
        let after = self.b.create_block("select.end");
        let bodies: Vec<_> = cases
            .iter()
            .map(|c| {
                let label = if c.values.is_empty() {
                    "case.default"
                } else {
                    "case.body"
                };
                self.b.create_block(label)
            })
            .collect();
        let default = cases
            .iter()
            .position(|c| c.values.is_empty())
            .map(|i| bodies[i]);

        let tested: Vec<_> = cases
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.values.is_empty())
            .map(|(i, _)| i)
            .collect();
        for (n, &i) in tested.iter().enumerate() {
            let hit = self.case_test(value, &selector.ty, &cases[i].values)?;
            if n + 1 < tested.len() {
                let next = self.b.create_block("case.test");
                self.b.cond_br(hit, bodies[i], next);
                self.b.set_block(next);
            } else {
                self.b.cond_br(hit, bodies[i], default.unwrap_or(after));
            }
        }
        if tested.is_empty() {
            self.b.br(default.unwrap_or(after));
        }

        for (i, case) in cases.iter().enumerate() {
            self.b.set_block(bodies[i]);
            let depth = self.cleanups.depth();
            self.next_case.push((bodies.get(i + 1).copied(), depth));
            let result = self.block(&case.body);
            self.next_case.pop();
            result?;
            self.b.br(after);
        }
        self.b.set_block(after);
        Ok(())
    }

    /// True if `value` equals any of `values`.
    fn case_test(&mut self, value: VReg, ty: &TypeRef, values: &'p [hir::Expr]) -> Result<VReg> {
        let mut this = self.enter_frame();
        let mut hit = None;
        for v in values {
            let candidate = this.expr(v)?;
            let eq = this.compare(BinOp::Eq, value, candidate, ty);
            hit = Some(match hit {
                Some(h) => this.b.or(h, eq),
                None => eq,
            });
        }
        match hit {
            Some(h) => Ok(h),
            None => Ok(this.b.const_bool(false)),
        }
    }

    /// `to` tests the bound after the body, `until` before it; both stop
    /// only when the variable equals the bound.
    fn for_loop(&mut self, l: &'p hir::ForLoop) -> Result<()> {
        let ty = l.var.ty.clone();
        let ir = self.ir_type(&ty);
        let addr = self.addr_of(&l.var)?;
        let start = self.expr(&l.start)?;
        self.store_value(addr, start, &ty);
        let end = self.expr(&l.end)?;
        let step = match &l.step {
            Some(s) => self.expr(s)?,
            None => self.one(&ty),
        };

        let body = self.b.create_block("for.body");
        let after = self.b.create_block("for.end");
        if l.inclusive {
            let test = self.b.create_block("for.next");
            let incr = self.b.create_block("for.step");
            self.b.set_block(body);
            self.loop_body(&l.body, after, test)?;
            self.b.set_block(test);
            let cur = self.b.load(addr, ir);
            let done = self.compare(BinOp::Eq, cur, end, &ty);
            self.b.cond_br(done, after, incr);
            self.b.set_block(incr);
            self.advance(addr, cur, step, &ty);
            self.b.br(body);
        } else {
            let head = self.b.create_block("for.head");
            let incr = self.b.create_block("for.step");
            self.b.set_block(head);
            let cur = self.b.load(addr, ir.clone());
            let done = self.compare(BinOp::Eq, cur, end, &ty);
            self.b.cond_br(done, after, body);
            self.b.set_block(body);
            self.loop_body(&l.body, after, incr)?;
            self.b.set_block(incr);
            let cur = self.b.load(addr, ir);
            self.advance(addr, cur, step, &ty);
            self.b.br(head);
        }
        self.b.set_block(after);
        Ok(())
    }

    /// Steps the loop variable at `addr`. A string variable has `step`
    /// appended; the joined temporary is released once it is copied in.
    fn advance(&mut self, addr: VReg, cur: VReg, step: VReg, ty: &TypeRef) {
        if ty.is_string() {
            let next = self.b.call("__rt_string_concat", vec![cur, step]);
            self.b.call_void("__rt_string_assign", vec![addr, next]);
            self.b.call_void(STRING_FREE, vec![next]);
        } else {
            let next = self.arith_add(cur, step, ty);
            self.b.store(addr, next);
        }
    }

    fn dim(&mut self, addr: VReg, ty: &TypeRef, size: &'p hir::Expr) -> Result<()> {
        let elem = match ty.elem() {
            Some(elem) => elem,
            None => return self.handler.mk_err(size.span, "Not an array"),
        };
        let count = self.expr(size)?;
        let elem_size = self.program.types.size_of(elem) as i64;
        let elem_size = self.b.const_int(elem_size, IrType::I64);
        let old = self.b.load(addr, IrType::handle());
        self.b.call_void(ARRAY_FREE, vec![old]);
        let array = self.b.call("__rt_array_new", vec![count, elem_size]);
        self.b.store(addr, array);
        Ok(())
    }

    fn assign(&mut self, target: &'p hir::Expr, value: &'p hir::Expr) -> Result<()> {
        if let ExprKind::Swizzle { base, axes } = &target.kind {
            let addr = self.addr_of(base)?;
            let vector_ty = self.ir_type(&base.ty);
            let v = self.assigned_value(addr, value)?;
            let mut vector = self.b.load(addr, vector_ty);
            for (lane, axis) in axes.iter().enumerate() {
                let x = if axes.len() == 1 {
                    v
                } else {
                    self.b.extract_element(v, lane as u32)
                };
                vector = self.b.insert_element(vector, x, *axis as u32);
            }
            self.b.store(addr, vector);
            return Ok(());
        }

        let addr = self.addr_of(target)?;
        let v = self.assigned_value(addr, value)?;
        self.store_value(addr, v, &target.ty);
        Ok(())
    }

    /// Evaluates `value` with `addr` as the target it may reread.
    fn assigned_value(&mut self, addr: VReg, value: &'p hir::Expr) -> Result<VReg> {
        let outer = self.target.replace(addr);
        let v = self.expr(value);
        self.target = outer;
        v
    }

    /// Stores `value` into `addr`, copying owned handles.
    pub(crate) fn store_value(&mut self, addr: VReg, value: VReg, ty: &TypeRef) {
        if ty.is_string() {
            self.b.call_void("__rt_string_assign", vec![addr, value]);
        } else if ty.is_array() {
            self.b.call_void("__rt_array_assign", vec![addr, value]);
        } else {
            self.b.store(addr, value);
        }
    }
}
