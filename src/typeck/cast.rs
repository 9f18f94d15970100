use super::ty::{BuiltinType, TypeFlags, TypeKind, TypeRef};
use std::fmt;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CastMode {
    /// `typename(expr)` in the source.
    Explicit,
    /// Assignment, promotion, return values.
    Implicit,
    /// Argument passing. Never converts a value to a string implicitly:
    /// a string parameter takes only a string argument.
    Input,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CastKind {
    None,
    Extend,
    Truncate,
    IntToFloat,
    FloatToInt,
    ToBool,
    ToString,
    /// Scalar broadcast into every vector component.
    Splat,
    /// Same bits, different type.
    Reinterpret,
    Invalid,
}

impl CastKind {
    pub fn is_valid(self) -> bool {
        self != CastKind::Invalid
    }

    /// Counts toward the cost of an overload candidate.
    pub fn is_conversion(self) -> bool {
        !matches!(self, CastKind::None | CastKind::Invalid)
    }
}

impl fmt::Display for CastKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CastKind::None => "none",
            CastKind::Extend => "extend",
            CastKind::Truncate => "trunc",
            CastKind::IntToFloat => "itof",
            CastKind::FloatToInt => "ftoi",
            CastKind::ToBool => "tobool",
            CastKind::ToString => "tostring",
            CastKind::Splat => "splat",
            CastKind::Reinterpret => "bitcast",
            CastKind::Invalid => "invalid",
        };
        f.write_str(s)
    }
}

/// Selects the conversion from `from` to `to`.
pub fn cast_for(from: &TypeRef, to: &TypeRef, mode: CastMode) -> CastKind {
    if from.is_same(to) {
        return CastKind::None;
    }

    match (from.kind, to.kind) {
        (TypeKind::Builtin(BuiltinType::Ptr), TypeKind::Builtin(BuiltinType::Ptr)) => {
            CastKind::Reinterpret
        }
        (TypeKind::Builtin(a), TypeKind::Builtin(b)) if a != b => cast_builtin(a, b, mode),
        // Arrays of different elements, or distinct user types.
        _ => CastKind::Invalid,
    }
}

pub fn cast_builtin(from: BuiltinType, to: BuiltinType, mode: CastMode) -> CastKind {
    use BuiltinType::*;

    if from == to {
        return CastKind::None;
    }

    let (fi, ti) = (from.info(), to.info());
    if fi.is(TypeFlags::NO_PROMOTE) || ti.is(TypeFlags::NO_PROMOTE) {
        return match (from, to) {
            (Ptr, IPtr) | (Ptr, UPtr) | (IPtr, Ptr) | (UPtr, Ptr) => CastKind::Reinterpret,
            _ => CastKind::Invalid,
        };
    }

    if to == String {
        return match mode {
            CastMode::Input => CastKind::Invalid,
            _ if from.is_simd() => CastKind::Invalid,
            _ => CastKind::ToString,
        };
    }
    if from == String {
        return CastKind::Invalid;
    }

    if to == Bool {
        return if from.is_simd() {
            CastKind::Invalid
        } else {
            CastKind::ToBool
        };
    }

    match (from.is_simd(), to.is_simd()) {
        (false, true) => return CastKind::Splat,
        (true, false) => return CastKind::Invalid,
        (true, true) => {
            if fi.components() != ti.components() {
                return CastKind::Invalid;
            }
            let (fc, tc) = (from.component(), to.component());
            return if fc == tc {
                CastKind::Reinterpret
            } else {
                cast_builtin(fc, tc, mode)
            };
        }
        (false, false) => {}
    }

    let from_float = from.is_float();
    let to_float = to.is_float();
    match (from_float, to_float) {
        (false, true) => CastKind::IntToFloat,
        (true, false) => CastKind::FloatToInt,
        _ if ti.bits > fi.bits => CastKind::Extend,
        _ if ti.bits < fi.bits => CastKind::Truncate,
        _ => CastKind::Reinterpret,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{context::PtrSize, typeck::ty::ALL_BUILTINS};
    use BuiltinType::*;

    const MODES: [CastMode; 3] = [CastMode::Explicit, CastMode::Implicit, CastMode::Input];

    #[test]
    fn identity_casts_are_none() {
        for t in ALL_BUILTINS.iter() {
            let ty = TypeRef::builtin(*t, PtrSize::Bits64);
            for mode in MODES.iter() {
                assert_eq!(cast_for(&ty, &ty, *mode), CastKind::None, "{}", t);
            }
        }
    }

    #[test]
    fn numeric_casts() {
        assert_eq!(cast_builtin(I8, I32, CastMode::Implicit), CastKind::Extend);
        assert_eq!(cast_builtin(I64, U8, CastMode::Implicit), CastKind::Truncate);
        assert_eq!(cast_builtin(I32, U32, CastMode::Implicit), CastKind::Reinterpret);
        assert_eq!(cast_builtin(I32, F32, CastMode::Input), CastKind::IntToFloat);
        assert_eq!(cast_builtin(F64, I32, CastMode::Implicit), CastKind::FloatToInt);
        assert_eq!(cast_builtin(F32, F64, CastMode::Implicit), CastKind::Extend);
        assert_eq!(cast_builtin(F32, Bool, CastMode::Implicit), CastKind::ToBool);
        assert_eq!(cast_builtin(F32, Vec3f, CastMode::Implicit), CastKind::Splat);
        assert_eq!(cast_builtin(Vec3i, Vec3f, CastMode::Explicit), CastKind::IntToFloat);
        assert_eq!(cast_builtin(Vec4f, Quatf, CastMode::Explicit), CastKind::Reinterpret);
        assert_eq!(cast_builtin(Vec3f, Vec2f, CastMode::Explicit), CastKind::Invalid);
    }

    #[test]
    fn string_coercion_depends_on_mode() {
        assert_eq!(cast_builtin(I32, String, CastMode::Explicit), CastKind::ToString);
        assert_eq!(cast_builtin(I32, String, CastMode::Implicit), CastKind::ToString);
        assert_eq!(cast_builtin(I32, String, CastMode::Input), CastKind::Invalid);
        assert_eq!(cast_builtin(String, I32, CastMode::Explicit), CastKind::Invalid);
    }

    #[test]
    fn opaque_types_do_not_convert() {
        assert_eq!(cast_builtin(I32, Any, CastMode::Input), CastKind::Invalid);
        assert_eq!(cast_builtin(Void, I32, CastMode::Explicit), CastKind::Invalid);
        assert_eq!(cast_builtin(Ptr, UPtr, CastMode::Explicit), CastKind::Reinterpret);

        let p = PtrSize::Bits64;
        let a = TypeRef::array_of(TypeRef::builtin(I32, p), p);
        let b = TypeRef::array_of(TypeRef::builtin(F32, p), p);
        assert_eq!(cast_for(&a, &b, CastMode::Implicit), CastKind::Invalid);
    }
}
