use super::{
    annotate::Annotate,
    cast::{cast_for, CastKind, CastMode},
    hir::{self, Const},
    overload::{self, Callee, Overload},
    pattern::PassBy,
    ty::{find_promotion, BuiltinType, TypeRef},
};
use crate::{
    err::Result,
    lex::{Span, Spanned},
    parse::ast::{self, BinOp, ExprKind, Ident, Lit, UnOp},
    symbol::{Area, SymbolKind},
};

impl Annotate<'_> {
    pub(super) fn annotate_expr(&mut self, expr: &ast::Expr) -> Result<hir::Expr> {
        let span = expr.span;
        match &expr.kind {
            ExprKind::Literal(lit) => Ok(self.annotate_literal(lit, span)),
            ExprKind::Name(name) => {
                match self.scopes.find(self.body.scope, name.node, Area::Global) {
                    Some(id) => self.var_expr(id, span),
                    None => self
                        .handler
                        .mk_err(span, &format!("'{}' is not declared", name.node)),
                }
            }
            ExprKind::Member { base, member } => {
                let base = self.annotate_expr(base)?;
                self.annotate_member(base, *member, span)
            }
            ExprKind::ArraySubscript { base, index } => {
                let base = self.annotate_expr(base)?;
                let elem = match base.ty.elem() {
                    Some(elem) if base.ty.is_array() => elem.clone(),
                    _ => {
                        let msg = format!("Cannot index a value of type {}", self.types.name_of(&base.ty));
                        return self.handler.mk_err(base.span, &msg);
                    }
                };
                let index = self.annotate_expr(index)?;
                if !index.ty.is_integer() {
                    let msg = format!(
                        "Array index must be an integer, found {}",
                        self.types.name_of(&index.ty)
                    );
                    return self.handler.mk_err(index.span, &msg);
                }
                let int = self.types.builtin(BuiltinType::I32);
                let index = self.coerce(index, &int, CastMode::Implicit)?;
                Ok(hir::Expr {
                    kind: hir::ExprKind::Index {
                        base: Box::new(base),
                        index: Box::new(index),
                    },
                    ty: elem,
                    span,
                })
            }
            ExprKind::FunctionCall { callee, args } => self.annotate_call(*callee, args, span),
            ExprKind::UnaryOp { op, expr } => {
                let expr = self.annotate_expr(expr)?;
                self.annotate_unary(*op, expr, span)
            }
            ExprKind::BinaryOp { op, left, right } => {
                let left = self.annotate_expr(left)?;
                let right = self.annotate_expr(right)?;
                self.annotate_binary(*op, left, right, span)
            }
        }
    }

    fn annotate_literal(&self, lit: &Lit, span: Span) -> hir::Expr {
        use BuiltinType::*;
        let (c, t) = match *lit {
            Lit::Str(s) => (Const::Str(s), String),
            Lit::Int(v) => {
                let t = if v <= i32::MAX as u64 {
                    I32
                } else if v <= u32::MAX as u64 {
                    U32
                } else if v <= i64::MAX as u64 {
                    I64
                } else {
                    U64
                };
                (Const::Int(v), t)
            }
            Lit::UInt(v) => (Const::Int(v), if v <= u32::MAX as u64 { U32 } else { U64 }),
            Lit::Float(v) => (Const::Float(v), F32),
            Lit::Double(v) => (Const::Float(v), F64),
            Lit::Bool(v) => (Const::Bool(v), Bool),
        };
        hir::Expr {
            kind: hir::ExprKind::Const(c),
            ty: self.types.builtin(t),
            span,
        }
    }

    fn annotate_member(&mut self, base: hir::Expr, member: Ident, span: Span) -> Result<hir::Expr> {
        if let Some(id) = base.ty.as_user() {
            let found = self.types.get(id).member(member.node).map(|(i, m)| (i, m.ty.clone()));
            return match found {
                Some((index, ty)) => Ok(hir::Expr {
                    kind: hir::ExprKind::Member {
                        base: Box::new(base),
                        index,
                    },
                    ty,
                    span,
                }),
                None => {
                    let msg = format!(
                        "Type {} has no member '{}'",
                        self.types.name_of(&base.ty),
                        member.node
                    );
                    self.handler.mk_err(member.span, &msg)
                }
            };
        }

        let vector = base
            .ty
            .as_builtin()
            .filter(|t| t.is_simd() && t.info().rows == 1);
        let t = match vector {
            Some(t) => t,
            None => {
                let msg = format!(
                    "Value of type {} has no members",
                    self.types.name_of(&base.ty)
                );
                return self.handler.mk_err(member.span, &msg);
            }
        };

        let cols = t.info().cols as usize;
        let axes = match member.node.as_str_with(|s| parse_swizzle(s, cols)) {
            Some(axes) => axes,
            None => {
                let msg = format!("Invalid swizzle '{}' on {}", member.node, t);
                return self.handler.mk_err(member.span, &msg);
            }
        };
        let ty = match vector_of(t.component(), axes.len()) {
            Some(r) => self.types.builtin(r),
            None => return self.handler.mk_err(member.span, "Invalid swizzle"),
        };
        Ok(hir::Expr {
            kind: hir::ExprKind::Swizzle {
                base: Box::new(base),
                axes,
            },
            ty,
            span,
        })
    }

    pub(super) fn annotate_call(
        &mut self,
        callee: Ident,
        args: &ast::ExprList,
        span: Span,
    ) -> Result<hir::Expr> {
        let found = self.scopes.find(self.body.scope, callee.node, Area::Global);
        let is_function = found.map_or(false, |id| {
            matches!(self.scopes.get(id).kind, SymbolKind::Function(_))
        });

        if !is_function {
            if let Some(t) = callee.node.as_str_with(BuiltinType::from_name) {
                return self.annotate_construct(t, callee, args, span);
            }
        }

        let set = match found.map(|id| &self.scopes.get(id).kind) {
            Some(SymbolKind::Function(set)) => set.clone(),
            Some(kind) => {
                let msg = format!("'{}' is a {}, not a function", callee.node, kind.describe());
                return self.handler.mk_err(callee.span, &msg);
            }
            None => {
                return self
                    .handler
                    .mk_err(callee.span, &format!("Function '{}' is not declared", callee.node));
            }
        };

        let mut exprs = Vec::with_capacity(args.exprs.len());
        for a in &args.exprs {
            exprs.push(self.annotate_expr(a)?);
        }

        let resolution = {
            let arg_types: Vec<_> = exprs
                .iter()
                .map(|e| overload::Arg {
                    ty: &e.ty,
                    is_lvalue: e.is_lvalue(),
                })
                .collect();
            overload::resolve(&set, &arg_types)
        };
        let resolution = match resolution {
            Some(r) => r,
            None => {
                let found: Vec<_> = exprs.iter().map(|e| self.types.name_of(&e.ty)).collect();
                let msg = format!(
                    "No overload of '{}' accepts ({})",
                    callee.node,
                    found.join(", ")
                );
                self.handler.report(span, &msg);
                for o in &set.overloads {
                    let note = format!("candidate: {}", self.describe_overload(callee.node, o));
                    self.handler.note(o.span, &note);
                }
                return Err(());
            }
        };

        let chosen = &set.overloads[resolution.index];
        log::trace!(
            "{} resolved to overload #{} ({} cast(s))",
            callee.node,
            resolution.index,
            resolution.cost
        );

        let mut hir_args = Vec::with_capacity(exprs.len());
        for (expr, binding) in exprs.into_iter().zip(&resolution.bindings) {
            let param = &chosen.params[binding.param];
            if param.pass.needs_lvalue() {
                hir_args.push(hir::Arg { expr, by_ref: true });
            } else {
                let expr = self.apply_cast(expr, &param.ty, binding.cast);
                hir_args.push(hir::Arg {
                    expr,
                    by_ref: false,
                });
            }
        }

        let ret = match chosen.callee {
            Callee::User(id) => self.ensure_return_type(id, callee.span)?,
            Callee::Builtin(_) => chosen.ret.clone(),
        };
        Ok(hir::Expr {
            kind: hir::ExprKind::Call {
                callee: chosen.callee,
                args: hir_args,
            },
            ty: ret,
            span,
        })
    }

    fn describe_overload(&self, name: crate::symbol::Symbol, o: &Overload) -> String {
        let params: Vec<_> = o
            .params
            .iter()
            .map(|p| {
                let prefix = match p.pass {
                    PassBy::Value | PassBy::ConstRef => "",
                    PassBy::OutRef => "out ",
                    PassBy::InOutRef => "byref ",
                };
                format!("{}{}", prefix, self.types.name_of(&p.ty))
            })
            .collect();
        format!("{}({})", name, params.join(", "))
    }

    /// `integer(x)` casts, `vec3f(x, y, z)` builds a vector.
    fn annotate_construct(
        &mut self,
        t: BuiltinType,
        callee: Ident,
        args: &ast::ExprList,
        span: Span,
    ) -> Result<hir::Expr> {
        let ty = self.types.builtin(t);
        let mut exprs = Vec::with_capacity(args.exprs.len());
        for a in &args.exprs {
            exprs.push(self.annotate_expr(a)?);
        }

        let components = t.info().components();
        if t.is_simd() && exprs.len() == components && components > 1 {
            let elem = self.types.builtin(t.component());
            let mut parts = Vec::with_capacity(components);
            for e in exprs {
                parts.push(self.coerce(e, &elem, CastMode::Implicit)?);
            }
            return Ok(hir::Expr {
                kind: hir::ExprKind::Construct(parts),
                ty,
                span,
            });
        }

        if exprs.len() != 1 {
            let msg = if t.is_simd() {
                format!("{} takes 1 or {} arguments, found {}", t, components, exprs.len())
            } else {
                format!("{} takes 1 argument, found {}", t, exprs.len())
            };
            return self.handler.mk_err(callee.span, &msg);
        }
        let expr = exprs.remove(0);
        let mut cast = self.coerce(expr, &ty, CastMode::Explicit)?;
        cast.span = span;
        Ok(cast)
    }

    fn annotate_unary(&mut self, op: Spanned<UnOp>, expr: hir::Expr, span: Span) -> Result<hir::Expr> {
        let ok = match op.node {
            UnOp::Neg => expr.ty.is_numeric() || expr.ty.is_simd(),
            UnOp::BitNot => expr.ty.is_integer(),
            UnOp::Not => true,
        };
        if !ok {
            let msg = format!(
                "Operator '{}' cannot be applied to {}",
                op.node,
                self.types.name_of(&expr.ty)
            );
            return self.handler.mk_err(op.span, &msg);
        }

        let expr = if op.node == UnOp::Not {
            let bool_ty = self.types.builtin(BuiltinType::Bool);
            self.coerce(expr, &bool_ty, CastMode::Implicit)?
        } else {
            expr
        };
        Ok(hir::Expr {
            ty: expr.ty.clone(),
            kind: hir::ExprKind::Unary {
                op: op.node,
                expr: Box::new(expr),
            },
            span,
        })
    }

    pub(super) fn annotate_binary(
        &mut self,
        op: Spanned<BinOp>,
        left: hir::Expr,
        right: hir::Expr,
        span: Span,
    ) -> Result<hir::Expr> {
        let bool_ty = self.types.builtin(BuiltinType::Bool);
        if op.node.is_logical() {
            let left = self.coerce(left, &bool_ty, CastMode::Implicit)?;
            let right = self.coerce(right, &bool_ty, CastMode::Implicit)?;
            return Ok(binary(op.node, left, right, bool_ty, span));
        }

        let promoted = match (left.ty.as_builtin(), right.ty.as_builtin()) {
            (Some(a), Some(b)) => find_promotion(a, b),
            _ => None,
        };
        let t = match promoted {
            Some(t) if self.operator_allowed(op.node, t) => t,
            _ => {
                let msg = format!(
                    "Operator '{}' cannot be applied to {} and {}",
                    op.node,
                    self.types.name_of(&left.ty),
                    self.types.name_of(&right.ty)
                );
                return self.handler.mk_err(op.span, &msg);
            }
        };

        let ty = self.types.builtin(t);
        let left = self.coerce(left, &ty, CastMode::Implicit)?;
        let right = self.coerce(right, &ty, CastMode::Implicit)?;
        let result = if op.node.is_comparison() { bool_ty } else { ty };
        Ok(binary(op.node, left, right, result, span))
    }

    fn operator_allowed(&self, op: BinOp, t: BuiltinType) -> bool {
        use BinOp::*;
        if t == BuiltinType::String {
            return matches!(op, Add | Eq | Ne | Lt | Gt | Le | Ge);
        }
        if t == BuiltinType::Bool {
            return op.is_bitwise() || matches!(op, Eq | Ne);
        }
        if t.is_simd() {
            return matches!(op, Add | Sub | Mul | Div);
        }
        if op.is_bitwise() {
            return t.is_integer();
        }
        t.is_numeric()
    }

    /// Converts `expr` to `to`, failing when no conversion exists.
    pub(super) fn coerce(&self, expr: hir::Expr, to: &TypeRef, mode: CastMode) -> Result<hir::Expr> {
        let kind = cast_for(&expr.ty, to, mode);
        if !kind.is_valid() {
            let msg = format!(
                "Cannot convert {} to {}",
                self.types.name_of(&expr.ty),
                self.types.name_of(to)
            );
            return self.handler.mk_err(expr.span, &msg);
        }
        Ok(self.apply_cast(expr, to, kind))
    }

    fn apply_cast(&self, expr: hir::Expr, to: &TypeRef, kind: CastKind) -> hir::Expr {
        if kind == CastKind::None {
            return expr;
        }
        let span = expr.span;
        hir::Expr {
            kind: hir::ExprKind::Cast {
                kind,
                expr: Box::new(expr),
            },
            ty: to.clone(),
            span,
        }
    }
}

fn binary(op: BinOp, left: hir::Expr, right: hir::Expr, ty: TypeRef, span: Span) -> hir::Expr {
    hir::Expr {
        kind: hir::ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
        ty,
        span,
    }
}

/// Axis indices of a swizzle such as `xy` or `bgr`. The two alphabets
/// cannot be mixed.
fn parse_swizzle(s: &str, cols: usize) -> Option<Vec<u8>> {
    const XYZW: &str = "xyzw";
    const RGBA: &str = "rgba";

    let s = s.to_ascii_lowercase();
    if s.is_empty() || s.len() > 4 {
        return None;
    }
    let first = s.chars().next()?;
    let alphabet = if XYZW.contains(first) { XYZW } else { RGBA };
    s.chars()
        .map(|c| {
            alphabet
                .find(c)
                .filter(|i| *i < cols)
                .map(|i| i as u8)
        })
        .collect()
}

fn vector_of(component: BuiltinType, n: usize) -> Option<BuiltinType> {
    use BuiltinType::*;
    match (component, n) {
        (c, 1) => Some(c),
        (I32, 2) => Some(Vec2i),
        (I32, 3) => Some(Vec3i),
        (I32, 4) => Some(Vec4i),
        (F32, 2) => Some(Vec2f),
        (F32, 3) => Some(Vec3f),
        (F32, 4) => Some(Vec4f),
        (F64, 2) => Some(Vec2d),
        (F64, 3) => Some(Vec3d),
        (F64, 4) => Some(Vec4d),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swizzles() {
        assert_eq!(parse_swizzle("xy", 3), Some(vec![0, 1]));
        assert_eq!(parse_swizzle("BGR", 3), Some(vec![2, 1, 0]));
        assert_eq!(parse_swizzle("w", 3), None);
        assert_eq!(parse_swizzle("xg", 4), None);
        assert_eq!(parse_swizzle("xxxxx", 4), None);
        assert_eq!(parse_swizzle("q", 4), None);
    }

    #[test]
    fn swizzle_result_types() {
        assert_eq!(vector_of(BuiltinType::F32, 1), Some(BuiltinType::F32));
        assert_eq!(vector_of(BuiltinType::F32, 3), Some(BuiltinType::Vec3f));
        assert_eq!(vector_of(BuiltinType::F64, 2), Some(BuiltinType::Vec2d));
        assert_eq!(vector_of(BuiltinType::U8, 2), None);
    }
}
