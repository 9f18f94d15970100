use super::{Cleanup, Emitter, STRING_FREE};
use crate::{
    err::Result,
    ir::{CmpOp, Constant, InstrKind, IrType, VReg},
    parse::ast::{BinOp, UnOp},
    typeck::{
        cast::CastKind,
        hir::{self, Const, ExprKind},
        overload::Callee,
        pattern::Repeat,
        ty::{BuiltinType, TypeRef},
    },
};

fn component(ty: &TypeRef) -> Option<BuiltinType> {
    ty.as_builtin().map(BuiltinType::component)
}

fn is_float(ty: &TypeRef) -> bool {
    component(ty).map_or(false, BuiltinType::is_float)
}

fn is_signed(ty: &TypeRef) -> bool {
    component(ty).map_or(false, BuiltinType::is_signed)
}

fn int_bits(ty: &IrType) -> u32 {
    match ty.scalar() {
        IrType::Bool => 1,
        IrType::I8 => 8,
        IrType::I16 => 16,
        IrType::I32 => 32,
        IrType::I64 => 64,
        _ => 0,
    }
}

fn cmp_op(op: BinOp, signed: bool) -> CmpOp {
    match (op, signed) {
        (BinOp::Ne, _) => CmpOp::Ne,
        (BinOp::Lt, true) => CmpOp::Slt,
        (BinOp::Lt, false) => CmpOp::Ult,
        (BinOp::Le, true) => CmpOp::Sle,
        (BinOp::Le, false) => CmpOp::Ule,
        (BinOp::Gt, true) => CmpOp::Sgt,
        (BinOp::Gt, false) => CmpOp::Ugt,
        (BinOp::Ge, true) => CmpOp::Sge,
        (BinOp::Ge, false) => CmpOp::Uge,
        _ => CmpOp::Eq,
    }
}

impl<'p> Emitter<'p> {
    pub(crate) fn expr(&mut self, e: &'p hir::Expr) -> Result<VReg> {
        match &e.kind {
            ExprKind::Const(c) => Ok(self.constant(c, &e.ty)),
            ExprKind::Var(_) | ExprKind::Member { .. } | ExprKind::Index { .. } => {
                let addr = self.addr_of(e)?;
                let ty = self.ir_type(&e.ty);
                Ok(self.b.load(addr, ty))
            }
            ExprKind::Swizzle { base, axes } => {
                let v = self.expr(base)?;
                if axes.len() == 1 {
                    Ok(self.b.extract_element(v, axes[0] as u32))
                } else {
                    Ok(self.b.shuffle(v, axes.iter().map(|a| *a as u32).collect()))
                }
            }
            ExprKind::Target => match self.target {
                Some(addr) => {
                    let ty = self.ir_type(&e.ty);
                    Ok(self.b.load(addr, ty))
                }
                None => self.handler.mk_err(e.span, "No assignment target to read"),
            },
            ExprKind::Call { .. } => match self.call(e)? {
                Some(v) => Ok(v),
                None => self.handler.mk_err(e.span, "Expression has no value"),
            },
            ExprKind::Construct(parts) => {
                let mut lanes = Vec::with_capacity(parts.len());
                for p in parts {
                    lanes.push(self.expr(p)?);
                }
                let ty = self.ir_type(&e.ty);
                Ok(self.b.build_vector(lanes, ty))
            }
            ExprKind::Unary { op, expr } => {
                let v = self.expr(expr)?;
                Ok(match op {
                    UnOp::Neg if is_float(&expr.ty) => self.b.fneg(v),
                    UnOp::Neg => self.b.neg(v),
                    UnOp::Not | UnOp::BitNot => self.b.not(v),
                })
            }
            ExprKind::Binary { op, left, right } => {
                let l = self.expr(left)?;
                let r = self.expr(right)?;
                self.binary(*op, l, r, &left.ty)
            }
            ExprKind::Cast { kind, expr } => {
                let v = self.expr(expr)?;
                self.cast(*kind, v, &expr.ty, &e.ty, e)
            }
        }
    }

    /// Statement-level expression; calls may produce no value.
    pub(crate) fn call_or_expr(&mut self, e: &'p hir::Expr) -> Result<Option<VReg>> {
        match &e.kind {
            ExprKind::Call { .. } => self.call(e),
            _ => self.expr(e).map(Some),
        }
    }

    fn constant(&mut self, c: &Const, ty: &TypeRef) -> VReg {
        let ir = self.ir_type(ty);
        match c {
            Const::Int(v) => self.b.const_int(*v as i64, ir),
            Const::Float(v) => self.b.constant(Constant::Float(*v), ir),
            Const::Bool(v) => self.b.const_bool(*v),
            Const::Str(s) => {
                let text = s.to_string();
                let lit = self.b.string_constant(&text);
                self.fresh_string("__rt_string_from_lit", vec![lit])
            }
        }
    }

    /// Calls a runtime function returning a new string and schedules its
    /// release.
    fn fresh_string(&mut self, func: &str, args: Vec<VReg>) -> VReg {
        let s = self.b.call(func, args);
        self.cleanups.register(Cleanup::direct(STRING_FREE, s));
        s
    }

    pub(crate) fn addr_of(&mut self, e: &'p hir::Expr) -> Result<VReg> {
        match &e.kind {
            ExprKind::Var(id) => self.var_addr(*id),
            ExprKind::Member { base, index } => {
                let base_addr = self.addr_or_spill(base)?;
                Ok(self.b.get_field_ptr(base_addr, *index as u32))
            }
            ExprKind::Index { base, index } => {
                let handle = self.expr(base)?;
                let i = self.expr(index)?;
                let raw = self.b.call("__rt_array_elem", vec![handle, i]);
                let elem = self.ir_type(&e.ty);
                Ok(self.b.convert(InstrKind::Bitcast, raw, IrType::ptr(elem)))
            }
            _ => self.handler.mk_err(e.span, "Expression has no address"),
        }
    }

    /// Address of `e`, copying it to a temporary slot when it is a value.
    fn addr_or_spill(&mut self, e: &'p hir::Expr) -> Result<VReg> {
        if matches!(
            e.kind,
            ExprKind::Var(_) | ExprKind::Member { .. } | ExprKind::Index { .. }
        ) {
            return self.addr_of(e);
        }
        let v = self.expr(e)?;
        let ty = self.ir_type(&e.ty);
        let slot = self.b.alloca(ty);
        self.b.store(slot, v);
        Ok(slot)
    }

    fn call(&mut self, e: &'p hir::Expr) -> Result<Option<VReg>> {
        let (callee, args) = match &e.kind {
            ExprKind::Call { callee, args } => (*callee, args),
            _ => return self.handler.mk_err(e.span, "Not a call"),
        };

        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            let v = if arg.by_ref {
                self.addr_of(&arg.expr)?
            } else {
                self.expr(&arg.expr)?
            };
            values.push(v);
        }

        let program = self.program;
        let (name, values) = match callee {
            Callee::User(id) => (program.function(id).link_name.clone(), values),
            Callee::Builtin(i) => {
                let builtin = &program.builtins[i];
                let mut out = Vec::with_capacity(values.len() + 1);
                let mut rest = values.into_iter();
                for p in &builtin.params {
                    match p.repeat {
                        Repeat::Once | Repeat::Optional => match rest.next() {
                            Some(v) => out.push(v),
                            None => {
                                let ty = self.param_type(&p.ty, p.pass);
                                out.push(self.b.const_zero(ty));
                            }
                        },
                        Repeat::Variadic | Repeat::OneOrMore => {
                            let tail: Vec<_> = rest.by_ref().collect();
                            let count = self.b.const_int(tail.len() as i64, IrType::I32);
                            out.push(count);
                            out.extend(tail);
                            break;
                        }
                    }
                }
                (builtin.link_name.clone(), out)
            }
        };

        if e.ty.is_void() {
            self.b.call_void(name, values);
            return Ok(None);
        }
        if e.ty.is_string() {
            return Ok(Some(self.fresh_string(&name, values)));
        }
        Ok(Some(self.b.call(name, values)))
    }

    /// Compares two values of type `ty`, giving a `Bool`.
    pub(crate) fn compare(&mut self, op: BinOp, l: VReg, r: VReg, ty: &TypeRef) -> VReg {
        if ty.is_string() {
            let order = self.b.call("__rt_string_cmp", vec![l, r]);
            let zero = self.b.const_int(0, IrType::I32);
            return self.b.icmp(cmp_op(op, true), order, zero);
        }
        if is_float(ty) {
            return self.b.fcmp(cmp_op(op, true), l, r);
        }
        self.b.icmp(cmp_op(op, is_signed(ty)), l, r)
    }

    pub(crate) fn one(&mut self, ty: &TypeRef) -> VReg {
        let ir = self.ir_type(ty);
        if is_float(ty) {
            self.b.constant(Constant::Float(1.0), ir)
        } else {
            self.b.const_int(1, ir)
        }
    }

    pub(crate) fn arith_add(&mut self, l: VReg, r: VReg, ty: &TypeRef) -> VReg {
        if is_float(ty) {
            self.b.fadd(l, r)
        } else {
            self.b.add(l, r)
        }
    }

    /// `ty` is the common operand type.
    fn binary(&mut self, op: BinOp, l: VReg, r: VReg, ty: &TypeRef) -> Result<VReg> {
        if op.is_comparison() {
            return Ok(self.compare(op, l, r, ty));
        }
        if ty.is_string() {
            return Ok(self.fresh_string("__rt_string_concat", vec![l, r]));
        }
        if op == BinOp::Pow {
            return Ok(self.pow(l, r, ty));
        }

        let float = is_float(ty);
        let signed = is_signed(ty);
        let b = &mut self.b;
        Ok(match op {
            BinOp::Add if float => b.fadd(l, r),
            BinOp::Sub if float => b.fsub(l, r),
            BinOp::Mul if float => b.fmul(l, r),
            BinOp::Div if float => b.fdiv(l, r),
            BinOp::Mod if float => b.frem(l, r),
            BinOp::Add => b.add(l, r),
            BinOp::Sub => b.sub(l, r),
            BinOp::Mul => b.mul(l, r),
            BinOp::Div if signed => b.sdiv(l, r),
            BinOp::Div => b.udiv(l, r),
            BinOp::Mod if signed => b.srem(l, r),
            BinOp::Mod => b.urem(l, r),
            BinOp::BitAnd | BinOp::And => b.and(l, r),
            BinOp::BitOr | BinOp::Or => b.or(l, r),
            BinOp::BitXor | BinOp::Xor => b.xor(l, r),
            BinOp::Shl => b.shl(l, r),
            BinOp::Shr if signed => b.ashr(l, r),
            BinOp::Shr => b.lshr(l, r),
            _ => unreachable!(),
        })
    }

    /// Powers go through the 64-bit runtime helpers.
    fn pow(&mut self, l: VReg, r: VReg, ty: &TypeRef) -> VReg {
        let ir = self.ir_type(ty);
        let (wide, func) = if is_float(ty) {
            (IrType::F64, "__rt_pow_f64")
        } else if is_signed(ty) {
            (IrType::I64, "__rt_pow_i64")
        } else {
            (IrType::I64, "__rt_pow_u64")
        };
        let l = self.resize(l, &ir, &wide, is_signed(ty));
        let r = self.resize(r, &ir, &wide, is_signed(ty));
        let result = self.b.call(func, vec![l, r]);
        self.resize(result, &wide, &ir, is_signed(ty))
    }

    /// Width change between two integer or two float types.
    fn resize(&mut self, v: VReg, from: &IrType, to: &IrType, signed: bool) -> VReg {
        if from == to {
            return v;
        }
        if from.scalar().is_float() {
            return self.b.convert(InstrKind::FPCast, v, to.clone());
        }
        let (fb, tb) = (int_bits(from), int_bits(to));
        let kind = if tb < fb {
            InstrKind::Trunc
        } else if signed && fb > 1 {
            InstrKind::SExt
        } else {
            InstrKind::ZExt
        };
        self.b.convert(kind, v, to.clone())
    }

    fn cast(
        &mut self,
        kind: CastKind,
        v: VReg,
        from: &TypeRef,
        to: &TypeRef,
        e: &hir::Expr,
    ) -> Result<VReg> {
        let (from_ir, to_ir) = (self.ir_type(from), self.ir_type(to));
        match kind {
            CastKind::None => Ok(v),
            CastKind::ToString => Ok(self.to_string(v, from, &from_ir)),
            CastKind::ToBool => {
                let zero = self.b.const_zero(from_ir);
                Ok(if is_float(from) {
                    self.b.fcmp(CmpOp::Ne, v, zero)
                } else {
                    self.b.icmp(CmpOp::Ne, v, zero)
                })
            }
            CastKind::Splat => {
                let scalar = match to.as_builtin() {
                    Some(t) => self.program.types.builtin(t.component()),
                    None => return self.handler.mk_err(e.span, "Invalid splat"),
                };
                let scalar_ir = self.ir_type(&scalar);
                let s = self.numeric_cast(v, from, &from_ir, &scalar, &scalar_ir);
                Ok(self.b.splat(s, to_ir))
            }
            CastKind::Reinterpret => Ok(match (from_ir.is_ptr(), to_ir.is_ptr()) {
                (true, false) => self.b.convert(InstrKind::PtrToInt, v, to_ir),
                (false, true) => self.b.convert(InstrKind::IntToPtr, v, to_ir),
                _ if from_ir == to_ir => v,
                _ => self.b.convert(InstrKind::Bitcast, v, to_ir),
            }),
            CastKind::Extend | CastKind::Truncate | CastKind::IntToFloat | CastKind::FloatToInt => {
                Ok(self.numeric_cast(v, from, &from_ir, to, &to_ir))
            }
            CastKind::Invalid => {
                let msg = format!(
                    "Cannot convert {} to {}",
                    self.program.types.name_of(from),
                    self.program.types.name_of(to)
                );
                self.handler.mk_err(e.span, &msg)
            }
        }
    }

    /// Scalar or lane-wise conversion between numeric types.
    fn numeric_cast(
        &mut self,
        v: VReg,
        from: &TypeRef,
        from_ir: &IrType,
        to: &TypeRef,
        to_ir: &IrType,
    ) -> VReg {
        let kind = match (is_float(from), is_float(to)) {
            (true, true) => {
                if from_ir == to_ir {
                    return v;
                }
                InstrKind::FPCast
            }
            (true, false) if is_signed(to) => InstrKind::FPToSI,
            (true, false) => InstrKind::FPToUI,
            (false, true) if is_signed(from) => InstrKind::SIToFP,
            (false, true) => InstrKind::UIToFP,
            (false, false) => return self.resize(v, from_ir, to_ir, is_signed(from)),
        };
        self.b.convert(kind, v, to_ir.clone())
    }

    fn to_string(&mut self, v: VReg, from: &TypeRef, from_ir: &IrType) -> VReg {
        if from.is(BuiltinType::Bool) {
            return self.fresh_string("__rt_to_string_bool", vec![v]);
        }
        if is_float(from) {
            let wide = self.resize(v, from_ir, &IrType::F64, true);
            return self.fresh_string("__rt_to_string_float", vec![wide]);
        }
        let signed = is_signed(from);
        let wide = self.resize(v, from_ir, &IrType::I64, signed);
        let func = if signed {
            "__rt_to_string_int"
        } else {
            "__rt_to_string_uint"
        };
        self.fresh_string(func, vec![wide])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comparison_predicates() {
        assert_eq!(cmp_op(BinOp::Lt, true), CmpOp::Slt);
        assert_eq!(cmp_op(BinOp::Lt, false), CmpOp::Ult);
        assert_eq!(cmp_op(BinOp::Eq, false), CmpOp::Eq);
        assert_eq!(cmp_op(BinOp::Ge, true), CmpOp::Sge);
    }

    #[test]
    fn integer_widths() {
        assert_eq!(int_bits(&IrType::Bool), 1);
        assert_eq!(int_bits(&IrType::vector(IrType::I32, 3)), 32);
        assert_eq!(int_bits(&IrType::F32), 0);
    }
}
