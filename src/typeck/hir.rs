//! The typed tree: every expression carries its resolved type, names are
//! resolved to symbols and implicit conversions are explicit `Cast` nodes.

use super::{
    cast::CastKind,
    layout::Types,
    overload::{Callee, ParamSig},
    ty::TypeRef,
};
use crate::{
    lex::Span,
    parse::ast::{BinOp, UnOp},
    symbol::{ScopeId, ScopeTree, Symbol, SymbolId},
};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionId(pub u32);

#[derive(Debug, Clone, PartialEq)]
pub enum Const {
    Int(u64),
    Float(f64),
    Bool(bool),
    Str(Symbol),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: TypeRef,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Const(Const),
    Var(SymbolId),
    /// Field `index` of a user type value.
    Member {
        base: Box<Expr>,
        index: usize,
    },
    Swizzle {
        base: Box<Expr>,
        axes: Vec<u8>,
    },
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
    },
    Call {
        callee: Callee,
        args: Vec<Arg>,
    },
    /// Vector or matrix built from its components.
    Construct(Vec<Expr>),
    Unary {
        op: UnOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Cast {
        kind: CastKind,
        expr: Box<Expr>,
    },
    /// Value held by the enclosing assignment's target, read through the
    /// address the assignment computed. Only appears in compound assignments.
    Target,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Arg {
    pub expr: Expr,
    /// Passed by address; `expr` is an l-value.
    pub by_ref: bool,
}

impl Expr {
    pub fn is_lvalue(&self) -> bool {
        match &self.kind {
            ExprKind::Var(_) | ExprKind::Index { .. } => true,
            ExprKind::Member { base, .. } => base.is_lvalue(),
            ExprKind::Swizzle { base, axes } => {
                let mut seen = [false; 4];
                let unique = axes.iter().all(|a| !std::mem::replace(&mut seen[*a as usize], true));
                let count = base
                    .ty
                    .as_builtin()
                    .map_or(0, |t| t.info().components());
                unique && axes.len() <= count && base.is_lvalue()
            }
            _ => false,
        }
    }

    /// Read of this assignment target that does not evaluate it again.
    /// A swizzle target rereads its base vector.
    pub fn reread(&self) -> Expr {
        let target = |e: &Expr| Expr {
            kind: ExprKind::Target,
            ty: e.ty.clone(),
            span: e.span,
        };
        match &self.kind {
            ExprKind::Swizzle { base, axes } => Expr {
                kind: ExprKind::Swizzle {
                    base: Box::new(target(base)),
                    axes: axes.clone(),
                },
                ty: self.ty.clone(),
                span: self.span,
            },
            _ => target(self),
        }
    }

    /// True if evaluating this produces a string the caller must release.
    pub fn is_fresh(&self) -> bool {
        match &self.kind {
            ExprKind::Const(Const::Str(_)) => true,
            ExprKind::Call { .. } => true,
            ExprKind::Binary { .. } => true,
            ExprKind::Cast { kind, .. } => *kind == CastKind::ToString,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfBranch {
    pub cond: Expr,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Case {
    /// Empty for `case default`; each value already has the selector's type.
    pub values: Vec<Expr>,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForLoop {
    pub var: Expr,
    pub start: Expr,
    pub end: Expr,
    pub step: Option<Expr>,
    pub inclusive: bool,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Label(SymbolId),
    Decl {
        var: SymbolId,
        dim: Option<Expr>,
        init: Option<Expr>,
    },
    Assign {
        target: Expr,
        value: Expr,
    },
    Expr(Expr),
    If {
        branches: Vec<IfBranch>,
        else_body: Option<Block>,
    },
    Select {
        expr: Expr,
        cases: Vec<Case>,
    },
    DoLoop(Block),
    While {
        cond: Expr,
        body: Block,
    },
    Repeat {
        body: Block,
        cond: Expr,
    },
    For(ForLoop),
    Goto(SymbolId),
    Return(Option<Expr>),
    Exit,
    Continue,
    Fallthrough,
    End,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: Symbol,
    pub link_name: String,
    pub symbol: Option<SymbolId>,
    pub params: Vec<SymbolId>,
    pub ret: TypeRef,
    /// Every local of the body, parameters excluded.
    pub locals: Vec<SymbolId>,
    pub labels: Vec<SymbolId>,
    pub scope: ScopeId,
    pub body: Block,
    /// Value returned when control reaches `endfunction`.
    pub end_value: Option<Expr>,
    pub span: Span,
}

/// An external command bound from a module descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct Builtin {
    pub name: Symbol,
    pub link_name: String,
    pub params: Vec<ParamSig>,
    pub ret: TypeRef,
}

#[derive(Debug, Clone)]
pub struct Program {
    pub scopes: ScopeTree,
    pub types: Types,
    pub builtins: Vec<Builtin>,
    pub globals: Vec<SymbolId>,
    pub functions: Vec<Function>,
    pub main: Function,
}

impl Program {
    pub fn function(&self, id: FunctionId) -> &Function {
        &self.functions[id.0 as usize]
    }
}
