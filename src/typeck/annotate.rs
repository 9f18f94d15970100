use super::{
    cast::CastMode,
    hir::{self, FunctionId},
    layout::Types,
    overload::{Callee, Overload, OverloadSet, ParamSig},
    pattern::{parse_type_pattern, PassBy, Repeat},
    ty::{BuiltinType, TypeRef},
};
use crate::{
    context::CompilationContext,
    err::{Handler, Result},
    lex::Span,
    parse::ast::{self, DeclScope, Ident, StmtKind},
    symbol::{
        Area, Label, ScopeId, ScopeTree, Symbol, SymbolId, SymbolKind, Variable, VariableKind,
    },
};
use std::{collections::HashMap, rc::Rc};

/// Resolves and types a parsed unit.
pub fn annotate(
    ast: &ast::Program,
    ctx: &CompilationContext,
    handler: &Rc<Handler>,
) -> Result<hir::Program> {
    let mut this = Annotate::new(ast, ctx, handler);
    this.declare_builtins()?;
    this.declare_types()?;
    this.declare_functions()?;
    this.declare_globals()?;
    this.annotate_functions()?;
    let main = this.annotate_main()?;
    Ok(this.finish(main))
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Status {
    Pending,
    InProgress,
    Done,
}

#[derive(Debug)]
struct FnSig {
    symbol: SymbolId,
    overload: usize,
    /// `None` until inferred from the first returned value.
    ret: Option<TypeRef>,
    params: Vec<SymbolId>,
    scope: ScopeId,
    link_name: String,
    status: Status,
}

/// State of the body being analyzed.
#[derive(Debug)]
pub(super) struct Body {
    pub scope: ScopeId,
    pub func: Option<FunctionId>,
    pub locals: Vec<SymbolId>,
    pub labels: Vec<SymbolId>,
    bare_return: Option<Span>,
}

impl Body {
    fn new(scope: ScopeId, func: Option<FunctionId>) -> Self {
        Self {
            scope,
            func,
            locals: vec![],
            labels: vec![],
            bare_return: None,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Visit {
    New,
    Visiting,
    Done,
}

pub(super) struct Annotate<'a> {
    ast: &'a ast::Program,
    ctx: &'a CompilationContext,
    pub handler: Rc<Handler>,
    pub scopes: ScopeTree,
    pub types: Types,
    builtins: Vec<hir::Builtin>,
    globals: Vec<SymbolId>,
    /// Globals declared ahead of their statements, keyed by name span.
    pre_declared: HashMap<(usize, usize), SymbolId>,
    sigs: Vec<FnSig>,
    functions: Vec<Option<hir::Function>>,
    pub body: Body,
}

impl<'a> Annotate<'a> {
    fn new(ast: &'a ast::Program, ctx: &'a CompilationContext, handler: &Rc<Handler>) -> Self {
        let scopes = ScopeTree::new();
        let root = scopes.root();
        Self {
            ast,
            ctx,
            handler: handler.clone(),
            scopes,
            types: Types::new(ctx),
            builtins: vec![],
            globals: vec![],
            pre_declared: HashMap::new(),
            sigs: vec![],
            functions: vec![],
            body: Body::new(root, None),
        }
    }

    fn finish(self, main: hir::Function) -> hir::Program {
        let functions = self.functions.into_iter().flatten().collect();
        hir::Program {
            scopes: self.scopes,
            types: self.types,
            builtins: self.builtins,
            globals: self.globals,
            functions,
            main,
        }
    }

    fn declare_builtins(&mut self) -> Result<()> {
        let ctx = self.ctx;
        let ptr = self.types.ptr;
        for (index, decl) in ctx.builtins.iter().enumerate() {
            let members = match parse_type_pattern(&decl.pattern) {
                Ok(m) => m,
                Err(e) => return self.handler.mk_err(Span::DUMMY, &e.to_string()),
            };
            let ret = members[0].ty.to_type_ref(ptr);
            let params: Vec<_> = members[1..]
                .iter()
                .map(|m| ParamSig {
                    name: None,
                    ty: m.ty.to_type_ref(ptr),
                    pass: m.pass,
                    repeat: m.repeat,
                })
                .collect();

            let name = Symbol::intern(&decl.name);
            self.builtins.push(hir::Builtin {
                name,
                link_name: decl.symbol.clone(),
                params: params.clone(),
                ret: ret.clone(),
            });
            let overload = Overload {
                params,
                ret,
                callee: Callee::Builtin(index),
                span: Span::DUMMY,
            };
            self.add_overload(name, Span::DUMMY, overload)?;
        }
        log::debug!("declared {} builtin command(s)", ctx.builtins.len());
        Ok(())
    }

    fn declare_types(&mut self) -> Result<()> {
        let ast = self.ast;
        let root = self.scopes.root();
        for decl in &ast.types {
            let name = decl.name.node;
            if name.as_str_with(BuiltinType::from_name).is_some() {
                return self.handler.mk_err(
                    decl.name.span,
                    &format!("'{}' is the name of a built-in type", name),
                );
            }
            let scope = self.scopes.push_scope(root, None);
            let id = self.types.declare(name, scope);
            let symbol = self.add_symbol(root, decl.name, SymbolKind::UserType(id))?;
            self.scopes.set_owner(scope, symbol);
        }

        let mut state = vec![Visit::New; ast.types.len()];
        for i in 0..ast.types.len() {
            self.layout_type(i, &mut state)?;
        }
        Ok(())
    }

    /// Lays out type `i` after every type it embeds by value.
    fn layout_type(&mut self, i: usize, state: &mut [Visit]) -> Result<()> {
        let ast = self.ast;
        let decl = &ast.types[i];
        match state[i] {
            Visit::Done => return Ok(()),
            Visit::Visiting => {
                return self.handler.mk_err(
                    decl.name.span,
                    &format!("Type '{}' contains itself", decl.name.node),
                );
            }
            Visit::New => state[i] = Visit::Visiting,
        }

        let mut fields = vec![];
        for field in &decl.fields {
            let ty = self.resolve_type_name(&field.ty)?;
            if let Some(inner) = ty.as_user() {
                self.layout_type(inner.0 as usize, state)?;
            }
            fields.push((field.name.node, ty));
        }

        let id = super::ty::UserTypeId(i as u32);
        self.types.layout(id, fields);
        state[i] = Visit::Done;

        let scope = self.types.get(id).scope;
        let members: Vec<_> = self.types.get(id).members.clone();
        for (index, (member, field)) in members.into_iter().zip(&decl.fields).enumerate() {
            let var = Variable {
                ty: member.ty,
                kind: VariableKind::Member { index },
            };
            self.add_symbol(scope, field.name, SymbolKind::Variable(var))?;
        }
        Ok(())
    }

    fn declare_functions(&mut self) -> Result<()> {
        let ast = self.ast;
        let root = self.scopes.root();
        for (i, f) in ast.functions.iter().enumerate() {
            let id = FunctionId(i as u32);

            let mut params = vec![];
            for p in &f.params {
                let ty = match &p.ty {
                    Some(t) => self.resolve_type_name(t)?,
                    None => self.suffix_type(p.name.node),
                };
                let pass = if p.by_ref {
                    PassBy::InOutRef
                } else {
                    PassBy::Value
                };
                params.push(ParamSig {
                    name: Some(p.name.node),
                    ty,
                    pass,
                    repeat: Repeat::Once,
                });
            }
            let ret = match &f.ret {
                Some(t) => Some(self.resolve_type_name(t)?),
                None => None,
            };

            let overload = Overload {
                params: params.clone(),
                ret: ret
                    .clone()
                    .unwrap_or_else(|| self.types.builtin(BuiltinType::Void)),
                callee: Callee::User(id),
                span: f.name.span,
            };
            let (symbol, index) = self.add_overload(f.name.node, f.name.span, overload)?;

            let scope = self.scopes.push_scope(root, Some(symbol));
            let mut param_symbols = vec![];
            for (index, (p, sig)) in f.params.iter().zip(params).enumerate() {
                let var = Variable {
                    ty: sig.ty,
                    kind: VariableKind::Param {
                        index,
                        by_ref: p.by_ref,
                    },
                };
                param_symbols.push(self.add_symbol(scope, p.name, SymbolKind::Variable(var))?);
            }

            let folded = f.name.node.fold().to_string();
            let link_name = if index == 0 && folded != "main" {
                folded
            } else {
                format!("{}.{}", folded, index)
            };
            self.sigs.push(FnSig {
                symbol,
                overload: index,
                ret,
                params: param_symbols,
                scope,
                link_name,
                status: Status::Pending,
            });
            self.functions.push(None);
        }
        Ok(())
    }

    /// Top-level declarations and `global` declarations anywhere become
    /// globals before any body is analyzed.
    fn declare_globals(&mut self) -> Result<()> {
        let ast = self.ast;
        let root = self.scopes.root();

        let mut decls = vec![];
        collect_globals(&ast.stmts, true, &mut decls);
        for f in &ast.functions {
            collect_globals(&f.body.stmts, false, &mut decls);
        }

        for decl in decls {
            let ty = self.decl_type(decl)?;
            let var = Variable {
                ty,
                kind: VariableKind::Global,
            };
            let id = self.add_symbol(root, decl.name, SymbolKind::Variable(var))?;
            self.globals.push(id);
            let span = decl.name.span;
            self.pre_declared.insert((span.lo(), span.hi()), id);
        }
        Ok(())
    }

    fn annotate_functions(&mut self) -> Result<()> {
        for i in 0..self.sigs.len() {
            if self.sigs[i].status == Status::Pending {
                self.annotate_function(FunctionId(i as u32))?;
            }
        }
        Ok(())
    }

    fn annotate_function(&mut self, id: FunctionId) -> Result<()> {
        let i = id.0 as usize;
        self.sigs[i].status = Status::InProgress;
        log::debug!("analyzing function {}", self.sigs[i].link_name);

        let body = Body::new(self.sigs[i].scope, Some(id));
        let outer = std::mem::replace(&mut self.body, body);
        let result = self.annotate_function_body(id);
        self.body = outer;

        self.functions[i] = Some(result?);
        self.sigs[i].status = Status::Done;
        Ok(())
    }

    fn annotate_function_body(&mut self, id: FunctionId) -> Result<hir::Function> {
        let ast = self.ast;
        let i = id.0 as usize;
        let f = &ast.functions[i];

        self.declare_labels(&f.body.stmts)?;
        let body = self.annotate_block(&f.body)?;
        let end_value = match &f.end_value {
            Some(e) => Some(self.annotate_return_value(e)?),
            None => None,
        };

        let ret = match self.sigs[i].ret.clone() {
            Some(ret) => ret,
            None => {
                let void = self.types.builtin(BuiltinType::Void);
                self.set_return_type(id, void.clone());
                void
            }
        };
        if !ret.is_void() {
            if let Some(span) = self.body.bare_return {
                return self.handler.mk_err(
                    span,
                    &format!("Function '{}' must return a value", f.name.node),
                );
            }
        }

        let sig = &self.sigs[i];
        Ok(hir::Function {
            name: f.name.node,
            link_name: sig.link_name.clone(),
            symbol: Some(sig.symbol),
            params: sig.params.clone(),
            ret,
            locals: std::mem::take(&mut self.body.locals),
            labels: std::mem::take(&mut self.body.labels),
            scope: sig.scope,
            body,
            end_value,
            span: f.span,
        })
    }

    fn annotate_main(&mut self) -> Result<hir::Function> {
        let ast = self.ast;
        let root = self.scopes.root();
        let scope = self.scopes.push_scope(root, None);
        self.body = Body::new(scope, None);

        self.declare_labels(&ast.stmts)?;
        let span = match (ast.stmts.first(), ast.stmts.last()) {
            (Some(first), Some(last)) => first.span.to(last.span),
            _ => Span::DUMMY,
        };
        let stmts = self.annotate_stmts(&ast.stmts)?;

        Ok(hir::Function {
            name: Symbol::intern("main"),
            link_name: "main".to_string(),
            symbol: None,
            params: vec![],
            ret: self.types.builtin(BuiltinType::Void),
            locals: std::mem::take(&mut self.body.locals),
            labels: std::mem::take(&mut self.body.labels),
            scope,
            body: hir::Block { stmts, span },
            end_value: None,
            span,
        })
    }

    /// Return type of `id`, analyzing its body first if the type has to be
    /// inferred.
    pub(super) fn ensure_return_type(&mut self, id: FunctionId, span: Span) -> Result<TypeRef> {
        let i = id.0 as usize;
        if let Some(ret) = &self.sigs[i].ret {
            return Ok(ret.clone());
        }

        match self.sigs[i].status {
            Status::Pending => {
                self.annotate_function(id)?;
                match &self.sigs[i].ret {
                    Some(ret) => Ok(ret.clone()),
                    None => Ok(self.types.builtin(BuiltinType::Void)),
                }
            }
            _ => self.handler.mk_err(
                span,
                &format!(
                    "Cannot infer the return type of '{}' from a recursive call; declare it with 'as'",
                    self.sigs[i].link_name
                ),
            ),
        }
    }

    fn set_return_type(&mut self, id: FunctionId, ty: TypeRef) {
        let sig = &mut self.sigs[id.0 as usize];
        log::debug!("return type of {} is {:?}", sig.link_name, ty.kind);
        sig.ret = Some(ty.clone());
        let overload = sig.overload;
        if let SymbolKind::Function(set) = &mut self.scopes.get_mut(sig.symbol).kind {
            set.overloads[overload].ret = ty;
        }
    }

    fn add_overload(
        &mut self,
        name: Symbol,
        span: Span,
        overload: Overload,
    ) -> Result<(SymbolId, usize)> {
        let root = self.scopes.root();
        let id = match self.scopes.find(root, name, Area::Local) {
            Some(id) => id,
            None => {
                let set = OverloadSet {
                    overloads: vec![overload],
                };
                let id = self.add_symbol(root, Ident::new(name, span), SymbolKind::Function(set))?;
                return Ok((id, 0));
            }
        };

        let sym = self.scopes.get_mut(id);
        let set = match &mut sym.kind {
            SymbolKind::Function(set) => set,
            kind => {
                let msg = format!("'{}' is already declared as a {}", name, kind.describe());
                return self.handler.mk_err(span, &msg);
            }
        };
        if set
            .overloads
            .iter()
            .any(|o| same_params(&o.params, &overload.params))
        {
            let msg = format!("Function '{}' is already declared with these parameters", name);
            return self.handler.mk_err(span, &msg);
        }
        set.overloads.push(overload);
        Ok((id, set.overloads.len() - 1))
    }

    pub(super) fn add_symbol(
        &mut self,
        scope: ScopeId,
        name: Ident,
        kind: SymbolKind,
    ) -> Result<SymbolId> {
        match self.scopes.add(scope, name.node, name.span, kind) {
            Ok(id) => Ok(id),
            Err(existing) => {
                let prev = self.scopes.get(existing);
                let msg = format!("'{}' is already declared as a {}", name.node, prev.kind.describe());
                self.handler.report(name.span, &msg);
                if prev.span != Span::DUMMY {
                    self.handler.note(prev.span, "previous declaration is here");
                }
                Err(())
            }
        }
    }

    pub(super) fn declare_local(&mut self, name: Ident, ty: TypeRef) -> Result<SymbolId> {
        let var = Variable {
            ty,
            kind: VariableKind::Local,
        };
        let id = self.add_symbol(self.body.scope, name, SymbolKind::Variable(var))?;
        self.body.locals.push(id);
        log::trace!("declared local {}", name.node);
        Ok(id)
    }

    fn declare_labels(&mut self, stmts: &[ast::Stmt]) -> Result<()> {
        let mut names = vec![];
        collect_labels(stmts, &mut names);
        for (index, name) in names.into_iter().enumerate() {
            let label = SymbolKind::Label(Label { index });
            let id = self.add_symbol(self.body.scope, name, label)?;
            self.body.labels.push(id);
        }
        Ok(())
    }

    pub(super) fn resolve_type_name(&mut self, name: &ast::TypeName) -> Result<TypeRef> {
        let sym = name.name.node;
        let base = match sym.as_str_with(BuiltinType::from_name) {
            Some(BuiltinType::Void) | Some(BuiltinType::Any) | Some(BuiltinType::Array) => {
                return self.handler.mk_err(
                    name.span,
                    &format!("Type '{}' cannot be used for a value", sym),
                );
            }
            Some(t) => self.types.builtin(t),
            None => {
                let root = self.scopes.root();
                let found = self
                    .scopes
                    .find(root, sym, Area::Local)
                    .map(|id| &self.scopes.get(id).kind);
                match found {
                    Some(SymbolKind::UserType(id)) => self.types.user_ref(*id),
                    _ => {
                        return self
                            .handler
                            .mk_err(name.name.span, &format!("Unknown type '{}'", sym));
                    }
                }
            }
        };

        if name.array {
            Ok(self.types.array_of(base))
        } else {
            Ok(base)
        }
    }

    /// Type implied by a name's suffix: `#` float, `$` string, else integer.
    pub(super) fn suffix_type(&self, name: Symbol) -> TypeRef {
        match name.last_char() {
            Some('#') => self.types.builtin(BuiltinType::F32),
            Some('$') => self.types.builtin(BuiltinType::String),
            _ => self.types.builtin(BuiltinType::I32),
        }
    }

    fn decl_type(&mut self, decl: &ast::VarDecl) -> Result<TypeRef> {
        let base = match &decl.ty {
            Some(t) => self.resolve_type_name(t)?,
            None => self.suffix_type(decl.name.node),
        };
        if decl.dim.is_some() {
            Ok(self.types.array_of(base))
        } else {
            Ok(base)
        }
    }

    fn is_global_decl(&self, decl: &ast::VarDecl) -> bool {
        decl.scope == DeclScope::Global
            || (self.body.func.is_none() && decl.scope == DeclScope::Default)
    }

    pub(super) fn var_expr(&self, id: SymbolId, span: Span) -> Result<hir::Expr> {
        let sym = self.scopes.get(id);
        match &sym.kind {
            SymbolKind::Variable(v) => Ok(hir::Expr {
                kind: hir::ExprKind::Var(id),
                ty: v.ty.clone(),
                span,
            }),
            kind => self.handler.mk_err(
                span,
                &format!("'{}' is a {}, not a variable", sym.name, kind.describe()),
            ),
        }
    }

    fn annotate_block(&mut self, block: &ast::Block) -> Result<hir::Block> {
        Ok(hir::Block {
            stmts: self.annotate_stmts(&block.stmts)?,
            span: block.span,
        })
    }

    fn annotate_stmts(&mut self, stmts: &[ast::Stmt]) -> Result<Vec<hir::Stmt>> {
        stmts.iter().map(|s| self.annotate_stmt(s)).collect()
    }

    fn annotate_stmt(&mut self, stmt: &ast::Stmt) -> Result<hir::Stmt> {
        let span = stmt.span;
        let kind = match &stmt.kind {
            StmtKind::LabelDecl(name) => {
                match self.scopes.find(self.body.scope, name.node, Area::Local) {
                    Some(id) => hir::StmtKind::Label(id),
                    None => return self.handler.mk_err(name.span, "Label declared out of place"),
                }
            }
            StmtKind::VarDecl(decl) => self.annotate_var_decl(decl)?,
            StmtKind::Assign { target, op, value } => {
                let target = self.annotate_target(target, op.is_none())?;
                let value = self.annotate_expr(value)?;
                let value = match op {
                    Some(op) => self.annotate_binary(*op, target.reread(), value, span)?,
                    None => value,
                };
                let value = self.coerce(value, &target.ty, CastMode::Implicit)?;
                hir::StmtKind::Assign { target, value }
            }
            StmtKind::FunctionCall { callee, args } => {
                hir::StmtKind::Expr(self.annotate_call(*callee, args, span)?)
            }
            StmtKind::If(stmt) => {
                let mut branches = vec![];
                for branch in &stmt.branches {
                    let cond = self.annotate_condition(&branch.cond)?;
                    let body = self.annotate_block(&branch.body)?;
                    branches.push(hir::IfBranch { cond, body });
                }
                let else_body = match &stmt.else_body {
                    Some(b) => Some(self.annotate_block(b)?),
                    None => None,
                };
                hir::StmtKind::If {
                    branches,
                    else_body,
                }
            }
            StmtKind::Select(select) => self.annotate_select(select)?,
            StmtKind::DoLoop(body) => hir::StmtKind::DoLoop(self.annotate_block(body)?),
            StmtKind::WhileLoop { cond, body } => hir::StmtKind::While {
                cond: self.annotate_condition(cond)?,
                body: self.annotate_block(body)?,
            },
            StmtKind::RepeatLoop { body, cond } => hir::StmtKind::Repeat {
                body: self.annotate_block(body)?,
                cond: self.annotate_condition(cond)?,
            },
            StmtKind::ForLoop(l) => self.annotate_for(l)?,
            StmtKind::Goto(label) => {
                let found = self
                    .scopes
                    .find(self.body.scope, label.node, Area::Local)
                    .filter(|id| matches!(self.scopes.get(*id).kind, SymbolKind::Label(_)));
                match found {
                    Some(id) => hir::StmtKind::Goto(id),
                    None => {
                        return self
                            .handler
                            .mk_err(label.span, &format!("Label '{}' not found", label.node));
                    }
                }
            }
            StmtKind::Return(None) => {
                if self.body.func.is_some() && self.body.bare_return.is_none() {
                    self.body.bare_return = Some(span);
                }
                hir::StmtKind::Return(None)
            }
            StmtKind::Return(Some(e)) => hir::StmtKind::Return(Some(self.annotate_return_value(e)?)),
            StmtKind::LoopFlow(ast::LoopFlow::Exit) => hir::StmtKind::Exit,
            StmtKind::LoopFlow(ast::LoopFlow::Continue) => hir::StmtKind::Continue,
            StmtKind::Fallthrough => hir::StmtKind::Fallthrough,
            StmtKind::End => hir::StmtKind::End,
        };
        Ok(hir::Stmt { kind, span })
    }

    fn annotate_var_decl(&mut self, decl: &ast::VarDecl) -> Result<hir::StmtKind> {
        let var = if self.is_global_decl(decl) {
            let span = decl.name.span;
            match self.pre_declared.get(&(span.lo(), span.hi())) {
                Some(id) => *id,
                None => return self.handler.mk_err(span, "Global declared out of place"),
            }
        } else {
            let ty = self.decl_type(decl)?;
            self.declare_local(decl.name, ty)?
        };
        let ty = match self.scopes.get(var).as_variable() {
            Some(v) => v.ty.clone(),
            None => return self.handler.mk_err(decl.name.span, "Not a variable"),
        };

        let dim = match &decl.dim {
            Some(size) => {
                let size = self.annotate_expr(size)?;
                if !size.ty.is_integer() {
                    let msg = format!(
                        "Array size must be an integer, found {}",
                        self.types.name_of(&size.ty)
                    );
                    return self.handler.mk_err(size.span, &msg);
                }
                let int = self.types.builtin(BuiltinType::I32);
                Some(self.coerce(size, &int, CastMode::Implicit)?)
            }
            None => None,
        };
        let init = match &decl.init {
            Some(e) => {
                let e = self.annotate_expr(e)?;
                Some(self.coerce(e, &ty, CastMode::Implicit)?)
            }
            None => None,
        };
        Ok(hir::StmtKind::Decl { var, dim, init })
    }

    /// An assignment target. A plain name that resolves to nothing is
    /// declared on the spot when `may_declare` is set.
    fn annotate_target(&mut self, target: &ast::Expr, may_declare: bool) -> Result<hir::Expr> {
        if let Some(name) = target.as_name() {
            let found = self.scopes.find(self.body.scope, name.node, Area::Global);
            if found.is_none() && may_declare {
                let ty = self.suffix_type(name.node);
                let id = self.declare_local(name, ty)?;
                return self.var_expr(id, name.span);
            }
        }

        let target = self.annotate_expr(target)?;
        if !target.is_lvalue() {
            return self
                .handler
                .mk_err(target.span, "Cannot assign to this expression");
        }
        Ok(target)
    }

    fn annotate_condition(&mut self, cond: &ast::Expr) -> Result<hir::Expr> {
        let cond = self.annotate_expr(cond)?;
        let bool_ty = self.types.builtin(BuiltinType::Bool);
        self.coerce(cond, &bool_ty, CastMode::Implicit)
    }

    fn annotate_select(&mut self, select: &ast::Select) -> Result<hir::StmtKind> {
        let expr = self.annotate_expr(&select.expr)?;
        let selectable = expr.ty.is_numeric() || expr.ty.is_string() || expr.ty.is(BuiltinType::Bool);
        if !selectable {
            let msg = format!("Cannot select on a value of type {}", self.types.name_of(&expr.ty));
            return self.handler.mk_err(expr.span, &msg);
        }

        let mut cases = vec![];
        for case in &select.cases {
            let mut values = vec![];
            if let Some(list) = &case.values {
                for v in &list.exprs {
                    let v = self.annotate_expr(v)?;
                    values.push(self.coerce(v, &expr.ty, CastMode::Implicit)?);
                }
            }
            let body = self.annotate_block(&case.body)?;
            cases.push(hir::Case { values, body });
        }
        Ok(hir::StmtKind::Select { expr, cases })
    }

    fn annotate_for(&mut self, l: &ast::ForLoop) -> Result<hir::StmtKind> {
        let name = l.var;
        let var = match self.scopes.find(self.body.scope, name.node, Area::Global) {
            Some(id) => {
                let var = self.var_expr(id, name.span)?;
                if !var.ty.is_numeric() {
                    let msg = format!(
                        "Loop variable '{}' must be numeric, found {}",
                        name.node,
                        self.types.name_of(&var.ty)
                    );
                    return self.handler.mk_err(name.span, &msg);
                }
                var
            }
            None => {
                let ty = match name.node.last_char() {
                    Some('$') => {
                        if l.step.is_none() {
                            let msg =
                                format!("String loop variable '{}' needs a step", name.node);
                            return self.handler.mk_err(name.span, &msg);
                        }
                        self.types.builtin(BuiltinType::String)
                    }
                    Some('#') => self.types.builtin(BuiltinType::F32),
                    _ => self.types.builtin(BuiltinType::IPtr),
                };
                let id = self.declare_local(name, ty)?;
                self.var_expr(id, name.span)?
            }
        };

        let start = self.annotate_expr(&l.start)?;
        let start = self.coerce(start, &var.ty, CastMode::Implicit)?;
        let end = self.annotate_expr(&l.end)?;
        let end = self.coerce(end, &var.ty, CastMode::Implicit)?;
        let step = match &l.step {
            Some(s) => {
                let s = self.annotate_expr(s)?;
                Some(self.coerce(s, &var.ty, CastMode::Implicit)?)
            }
            None => None,
        };
        let body = self.annotate_block(&l.body)?;

        Ok(hir::StmtKind::For(hir::ForLoop {
            var,
            start,
            end,
            step,
            inclusive: l.inclusive,
            body,
        }))
    }

    fn annotate_return_value(&mut self, e: &ast::Expr) -> Result<hir::Expr> {
        let value = self.annotate_expr(e)?;
        let id = match self.body.func {
            Some(id) => id,
            None => {
                return self
                    .handler
                    .mk_err(e.span, "Returning a value is only allowed inside a function");
            }
        };

        match self.sigs[id.0 as usize].ret.clone() {
            Some(ret) if ret.is_void() => {
                let msg = format!("Function '{}' does not return a value", self.sigs[id.0 as usize].link_name);
                self.handler.mk_err(e.span, &msg)
            }
            Some(ret) => self.coerce(value, &ret, CastMode::Implicit),
            None => {
                if value.ty.is_void() {
                    return self.handler.mk_err(e.span, "Expression has no value");
                }
                self.set_return_type(id, value.ty.clone());
                Ok(value)
            }
        }
    }
}

fn same_params(a: &[ParamSig], b: &[ParamSig]) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .zip(b)
            .all(|(x, y)| x.ty.is_same(&y.ty) && x.repeat == y.repeat)
}

fn nested_blocks(stmt: &ast::Stmt) -> Vec<&ast::Block> {
    match &stmt.kind {
        StmtKind::If(s) => s
            .branches
            .iter()
            .map(|b| &b.body)
            .chain(s.else_body.iter())
            .collect(),
        StmtKind::Select(s) => s.cases.iter().map(|c| &c.body).collect(),
        StmtKind::DoLoop(b)
        | StmtKind::WhileLoop { body: b, .. }
        | StmtKind::RepeatLoop { body: b, .. } => vec![b],
        StmtKind::ForLoop(l) => vec![&l.body],
        _ => vec![],
    }
}

fn collect_globals<'s>(stmts: &'s [ast::Stmt], top_level: bool, out: &mut Vec<&'s ast::VarDecl>) {
    for stmt in stmts {
        if let StmtKind::VarDecl(decl) = &stmt.kind {
            if decl.scope == DeclScope::Global || (top_level && decl.scope == DeclScope::Default) {
                out.push(decl);
            }
        }
        for block in nested_blocks(stmt) {
            collect_globals(&block.stmts, top_level, out);
        }
    }
}

fn collect_labels(stmts: &[ast::Stmt], out: &mut Vec<Ident>) {
    for stmt in stmts {
        if let StmtKind::LabelDecl(name) = &stmt.kind {
            out.push(*name);
        }
        for block in nested_blocks(stmt) {
            collect_labels(&block.stmts, out);
        }
    }
}
