use crate::{
    lex::{Span, Spanned},
    symbol::Symbol,
};
use std::fmt;

pub type Ident = Spanned<Symbol>;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BinOp {
    // Math
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,

    // Bitwise
    BitOr,
    BitXor,
    BitAnd,
    Shl,
    Shr,

    // Comparisons
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,

    // Logical
    And,
    Or,
    Xor,
}

impl BinOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinOp::And | BinOp::Or | BinOp::Xor)
    }

    pub fn is_bitwise(self) -> bool {
        matches!(
            self,
            BinOp::BitOr | BinOp::BitXor | BinOp::BitAnd | BinOp::Shl | BinOp::Shr
        )
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Pow => "^",
            BinOp::BitOr => "|",
            BinOp::BitXor => "~",
            BinOp::BitAnd => "&",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::Eq => "=",
            BinOp::Ne => "<>",
            BinOp::Lt => "<",
            BinOp::Gt => ">",
            BinOp::Le => "<=",
            BinOp::Ge => ">=",
            BinOp::And => "&&",
            BinOp::Or => "||",
            BinOp::Xor => "^^",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
    BitNot,
}

impl fmt::Display for UnOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnOp::Neg => f.write_str("-"),
            UnOp::Not => f.write_str("!"),
            UnOp::BitNot => f.write_str("~"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Lit {
    Str(Symbol),
    Int(u64),
    UInt(u64),
    Float(f64),
    Double(f64),
    Bool(bool),
}

impl fmt::Display for Lit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lit::Str(s) => write!(f, "{:?}", s.to_string()),
            Lit::Int(v) => write!(f, "{}", v),
            Lit::UInt(v) => write!(f, "{}u", v),
            Lit::Float(v) => write!(f, "{:?}f", v),
            Lit::Double(v) => write!(f, "{:?}d", v),
            Lit::Bool(v) => write!(f, "{}", v),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// The name of a bare `Name` expression.
    pub fn as_name(&self) -> Option<Ident> {
        match &self.kind {
            ExprKind::Name(name) => Some(*name),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Literal(Lit),
    Name(Ident),
    Member {
        base: Box<Expr>,
        member: Ident,
    },
    ArraySubscript {
        base: Box<Expr>,
        index: Box<Expr>,
    },
    /// Calls, explicit casts (`integer(x)`) and vector constructors
    /// (`vec3f(x, y, z)`) share this shape; semantic analysis tells them apart.
    FunctionCall {
        callee: Ident,
        args: ExprList,
    },
    UnaryOp {
        op: Spanned<UnOp>,
        expr: Box<Expr>,
    },
    BinaryOp {
        op: Spanned<BinOp>,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExprList {
    pub exprs: Vec<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeName {
    pub name: Ident,
    /// Written with a trailing `[]`.
    pub array: bool,
    pub span: Span,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DeclScope {
    /// No qualifier: global at top level, local inside a function.
    Default,
    Local,
    Global,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    pub scope: DeclScope,
    pub name: Ident,
    /// `None` derives the type from the name's suffix.
    pub ty: Option<TypeName>,
    /// Element count of a `dim` array.
    pub dim: Option<Expr>,
    pub init: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfBranch {
    pub cond: Expr,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq)]
pub struct If {
    /// The `if` clause followed by every `elseif`.
    pub branches: Vec<IfBranch>,
    pub else_body: Option<Block>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Case {
    /// `None` for `case default`.
    pub values: Option<ExprList>,
    pub body: Block,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub expr: Expr,
    pub cases: Vec<Case>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForLoop {
    pub var: Ident,
    pub start: Expr,
    pub end: Expr,
    /// `to` includes the bound, `until` stops before it.
    pub inclusive: bool,
    pub step: Option<Expr>,
    pub body: Block,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LoopFlow {
    Exit,
    Continue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    LabelDecl(Ident),
    VarDecl(VarDecl),
    Assign {
        target: Expr,
        /// Operator of a compound assignment (`+=` and friends).
        op: Option<Spanned<BinOp>>,
        value: Expr,
    },
    FunctionCall {
        callee: Ident,
        args: ExprList,
    },
    If(If),
    Select(Select),
    DoLoop(Block),
    WhileLoop {
        cond: Expr,
        body: Block,
    },
    RepeatLoop {
        body: Block,
        cond: Expr,
    },
    ForLoop(ForLoop),
    Goto(Ident),
    Return(Option<Expr>),
    LoopFlow(LoopFlow),
    Fallthrough,
    End,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: Ident,
    pub ty: Option<TypeName>,
    pub by_ref: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: Ident,
    pub params: Vec<Param>,
    pub ret: Option<TypeName>,
    pub body: Block,
    /// Value given after `endfunction`.
    pub end_value: Option<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: Ident,
    pub ty: TypeName,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserTypeDecl {
    pub name: Ident,
    pub fields: Vec<Field>,
    pub span: Span,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    pub functions: Vec<Function>,
    pub types: Vec<UserTypeDecl>,
    pub stmts: Vec<Stmt>,
}

// S-expression rendering; spans are left out so that trees parsed from
// differently laid out sources compare equal as text.

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::Literal(lit) => write!(f, "{}", lit),
            ExprKind::Name(name) => write!(f, "{}", name.node),
            ExprKind::Member { base, member } => write!(f, "(. {} {})", base, member.node),
            ExprKind::ArraySubscript { base, index } => write!(f, "([] {} {})", base, index),
            ExprKind::FunctionCall { callee, args } => {
                write!(f, "(call {}{})", callee.node, args)
            }
            ExprKind::UnaryOp { op, expr } => write!(f, "({} {})", op.node, expr),
            ExprKind::BinaryOp { op, left, right } => {
                write!(f, "({} {} {})", op.node, left, right)
            }
        }
    }
}

impl fmt::Display for ExprList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for e in &self.exprs {
            write!(f, " {}", e)?;
        }
        Ok(())
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name.node)?;
        if self.array {
            f.write_str("[]")?;
        }
        Ok(())
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(block")?;
        for s in &self.stmts {
            write!(f, " {}", s)?;
        }
        f.write_str(")")
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            StmtKind::LabelDecl(name) => write!(f, "(label {})", name.node),
            StmtKind::VarDecl(decl) => {
                let scope = match decl.scope {
                    DeclScope::Default => "",
                    DeclScope::Local => "local ",
                    DeclScope::Global => "global ",
                };
                write!(f, "(var {}{}", scope, decl.name.node)?;
                if let Some(ty) = &decl.ty {
                    write!(f, " {}", ty)?;
                }
                if let Some(dim) = &decl.dim {
                    write!(f, " [{}]", dim)?;
                }
                if let Some(init) = &decl.init {
                    write!(f, " = {}", init)?;
                }
                f.write_str(")")
            }
            StmtKind::Assign { target, op, value } => match op {
                Some(op) => write!(f, "({}= {} {})", op.node, target, value),
                None => write!(f, "(= {} {})", target, value),
            },
            StmtKind::FunctionCall { callee, args } => write!(f, "(call {}{})", callee.node, args),
            StmtKind::If(stmt) => {
                f.write_str("(if")?;
                for branch in &stmt.branches {
                    write!(f, " ({} {})", branch.cond, branch.body)?;
                }
                if let Some(body) = &stmt.else_body {
                    write!(f, " (else {})", body)?;
                }
                f.write_str(")")
            }
            StmtKind::Select(stmt) => {
                write!(f, "(select {}", stmt.expr)?;
                for case in &stmt.cases {
                    match &case.values {
                        Some(values) => write!(f, " (case{} {})", values, case.body)?,
                        None => write!(f, " (default {})", case.body)?,
                    }
                }
                f.write_str(")")
            }
            StmtKind::DoLoop(body) => write!(f, "(do {})", body),
            StmtKind::WhileLoop { cond, body } => write!(f, "(while {} {})", cond, body),
            StmtKind::RepeatLoop { body, cond } => write!(f, "(repeat {} {})", body, cond),
            StmtKind::ForLoop(l) => {
                let kw = if l.inclusive { "to" } else { "until" };
                write!(f, "(for {} {} {} {}", l.var.node, l.start, kw, l.end)?;
                if let Some(step) = &l.step {
                    write!(f, " step {}", step)?;
                }
                write!(f, " {})", l.body)
            }
            StmtKind::Goto(label) => write!(f, "(goto {})", label.node),
            StmtKind::Return(Some(e)) => write!(f, "(return {})", e),
            StmtKind::Return(None) => f.write_str("(return)"),
            StmtKind::LoopFlow(LoopFlow::Exit) => f.write_str("(exit)"),
            StmtKind::LoopFlow(LoopFlow::Continue) => f.write_str("(continue)"),
            StmtKind::Fallthrough => f.write_str("(fallthrough)"),
            StmtKind::End => f.write_str("(end)"),
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(function {} (", self.name.node)?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            if p.by_ref {
                f.write_str("byref ")?;
            }
            write!(f, "{}", p.name.node)?;
            if let Some(ty) = &p.ty {
                write!(f, " {}", ty)?;
            }
        }
        f.write_str(")")?;
        if let Some(ret) = &self.ret {
            write!(f, " {}", ret)?;
        }
        write!(f, " {}", self.body)?;
        if let Some(e) = &self.end_value {
            write!(f, " {}", e)?;
        }
        f.write_str(")")
    }
}

impl fmt::Display for UserTypeDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(type {}", self.name.node)?;
        for field in &self.fields {
            write!(f, " ({} {})", field.name.node, field.ty)?;
        }
        f.write_str(")")
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for t in &self.types {
            writeln!(f, "{}", t)?;
        }
        for func in &self.functions {
            writeln!(f, "{}", func)?;
        }
        for s in &self.stmts {
            writeln!(f, "{}", s)?;
        }
        Ok(())
    }
}
