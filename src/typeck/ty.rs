use crate::context::PtrSize;
use bitflags::bitflags;
use std::fmt;

bitflags! {
    pub struct TypeFlags: u8 {
        const SIGNED = 0b0000_0001;
        const UNSIGNED = 0b0000_0010;
        const FLOAT = 0b0000_0100;
        const NORMALIZED = 0b0000_1000;
        const SIMD = 0b0001_0000;
        const POINTER = 0b0010_0000;
        /// Never takes part in binary-operator promotion.
        const NO_PROMOTE = 0b0100_0000;
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BuiltinType {
    Void,
    Any,
    Bool,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F16,
    F32,
    F64,
    UNorm8,
    SNorm8,
    UNorm16,
    SNorm16,
    UNorm32,
    SNorm32,
    IPtr,
    UPtr,
    Vec2i,
    Vec3i,
    Vec4i,
    Vec2f,
    Vec3f,
    Vec4f,
    Vec2d,
    Vec3d,
    Vec4d,
    Quatf,
    Mat2f,
    Mat3f,
    Mat4f,
    Mat2d,
    Mat3d,
    Mat4d,
    String,
    Array,
    Ptr,
}

/// Static attributes of a built-in type. `bits` is the width of one
/// component; pointer-sized types are ranked as 64-bit.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TypeInfo {
    pub flags: TypeFlags,
    pub rows: u8,
    pub cols: u8,
    pub bits: u16,
}

impl TypeInfo {
    const fn new(flags: TypeFlags, bits: u16, cols: u8, rows: u8) -> Self {
        Self {
            flags,
            rows,
            cols,
            bits,
        }
    }

    pub fn components(&self) -> usize {
        self.rows as usize * self.cols as usize
    }

    pub fn is(&self, flags: TypeFlags) -> bool {
        self.flags.intersects(flags)
    }
}

const fn flags(bits: u8) -> TypeFlags {
    TypeFlags { bits }
}

const S: TypeFlags = TypeFlags::SIGNED;
const U: TypeFlags = TypeFlags::UNSIGNED;
const FL: TypeFlags = flags(0b0000_0101);
const SN: TypeFlags = flags(0b0000_1001);
const UN: TypeFlags = flags(0b0000_1010);
const SP: TypeFlags = flags(0b0010_0001);
const UP: TypeFlags = flags(0b0010_0010);
const VI: TypeFlags = flags(0b0001_0001);
const VF: TypeFlags = flags(0b0001_0101);
const PT: TypeFlags = flags(0b0110_0000);
const NP: TypeFlags = TypeFlags::NO_PROMOTE;
const NONE: TypeFlags = flags(0);

/// Attributes indexed by `BuiltinType as usize`.
static TYPE_INFO: [TypeInfo; 41] = [
    TypeInfo::new(NP, 0, 0, 0),   // Void
    TypeInfo::new(NP, 0, 1, 1),   // Any
    TypeInfo::new(NONE, 1, 1, 1), // Bool
    TypeInfo::new(S, 8, 1, 1),
    TypeInfo::new(U, 8, 1, 1),
    TypeInfo::new(S, 16, 1, 1),
    TypeInfo::new(U, 16, 1, 1),
    TypeInfo::new(S, 32, 1, 1),
    TypeInfo::new(U, 32, 1, 1),
    TypeInfo::new(S, 64, 1, 1),
    TypeInfo::new(U, 64, 1, 1),
    TypeInfo::new(FL, 16, 1, 1),
    TypeInfo::new(FL, 32, 1, 1),
    TypeInfo::new(FL, 64, 1, 1),
    TypeInfo::new(UN, 8, 1, 1),
    TypeInfo::new(SN, 8, 1, 1),
    TypeInfo::new(UN, 16, 1, 1),
    TypeInfo::new(SN, 16, 1, 1),
    TypeInfo::new(UN, 32, 1, 1),
    TypeInfo::new(SN, 32, 1, 1),
    TypeInfo::new(SP, 64, 1, 1), // IPtr
    TypeInfo::new(UP, 64, 1, 1), // UPtr
    TypeInfo::new(VI, 32, 2, 1),
    TypeInfo::new(VI, 32, 3, 1),
    TypeInfo::new(VI, 32, 4, 1),
    TypeInfo::new(VF, 32, 2, 1),
    TypeInfo::new(VF, 32, 3, 1),
    TypeInfo::new(VF, 32, 4, 1),
    TypeInfo::new(VF, 64, 2, 1),
    TypeInfo::new(VF, 64, 3, 1),
    TypeInfo::new(VF, 64, 4, 1),
    TypeInfo::new(VF, 32, 4, 1), // Quatf
    TypeInfo::new(VF, 32, 2, 2),
    TypeInfo::new(VF, 32, 3, 3),
    TypeInfo::new(VF, 32, 4, 4),
    TypeInfo::new(VF, 64, 2, 2),
    TypeInfo::new(VF, 64, 3, 3),
    TypeInfo::new(VF, 64, 4, 4),
    TypeInfo::new(NONE, 0, 1, 1), // String
    TypeInfo::new(NP, 0, 1, 1),   // Array
    TypeInfo::new(PT, 0, 1, 1),   // Ptr
];

pub const ALL_BUILTINS: [BuiltinType; 41] = {
    use BuiltinType::*;
    [
        Void, Any, Bool, I8, U8, I16, U16, I32, U32, I64, U64, F16, F32, F64, UNorm8, SNorm8,
        UNorm16, SNorm16, UNorm32, SNorm32, IPtr, UPtr, Vec2i, Vec3i, Vec4i, Vec2f, Vec3f,
        Vec4f, Vec2d, Vec3d, Vec4d, Quatf, Mat2f, Mat3f, Mat4f, Mat2d, Mat3d, Mat4d, String,
        Array, Ptr,
    ]
};

/// Source spellings; the first name of each type is canonical.
const NAMES: &[(&str, BuiltinType)] = {
    use BuiltinType::*;
    &[
        ("void", Void),
        ("any", Any),
        ("boolean", Bool),
        ("int8", I8),
        ("byte", U8),
        ("uint8", U8),
        ("int16", I16),
        ("word", U16),
        ("uint16", U16),
        ("integer", I32),
        ("int32", I32),
        ("dword", U32),
        ("uint32", U32),
        ("int64", I64),
        ("uint64", U64),
        ("float16", F16),
        ("float", F32),
        ("float32", F32),
        ("double", F64),
        ("float64", F64),
        ("unorm8", UNorm8),
        ("snorm8", SNorm8),
        ("unorm16", UNorm16),
        ("snorm16", SNorm16),
        ("unorm32", UNorm32),
        ("snorm32", SNorm32),
        ("intptr", IPtr),
        ("uintptr", UPtr),
        ("vec2i", Vec2i),
        ("vec3i", Vec3i),
        ("vec4i", Vec4i),
        ("vec2f", Vec2f),
        ("vec2", Vec2f),
        ("vec3f", Vec3f),
        ("vec3", Vec3f),
        ("vec4f", Vec4f),
        ("vec4", Vec4f),
        ("vec2d", Vec2d),
        ("vec3d", Vec3d),
        ("vec4d", Vec4d),
        ("quatf", Quatf),
        ("quat", Quatf),
        ("mat2f", Mat2f),
        ("mat2", Mat2f),
        ("mat3f", Mat3f),
        ("mat3", Mat3f),
        ("mat4f", Mat4f),
        ("mat4", Mat4f),
        ("mat2d", Mat2d),
        ("mat3d", Mat3d),
        ("mat4d", Mat4d),
        ("string", String),
        ("array", Array),
        ("pointer", Ptr),
    ]
};

impl BuiltinType {
    pub fn info(self) -> &'static TypeInfo {
        &TYPE_INFO[self as usize]
    }

    /// Looks up a source type name, ignoring case.
    pub fn from_name(name: &str) -> Option<BuiltinType> {
        NAMES
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, t)| *t)
    }

    pub fn name(self) -> &'static str {
        NAMES
            .iter()
            .find(|(_, t)| *t == self)
            .map(|(n, _)| *n)
            .unwrap_or("?")
    }

    pub fn is_integer(self) -> bool {
        let info = self.info();
        self == BuiltinType::Bool
            || (info.components() == 1
                && info.is(TypeFlags::SIGNED | TypeFlags::UNSIGNED)
                && !info.is(TypeFlags::FLOAT | TypeFlags::NORMALIZED | TypeFlags::NO_PROMOTE))
    }

    pub fn is_float(self) -> bool {
        let info = self.info();
        info.is(TypeFlags::FLOAT) && !info.is(TypeFlags::SIMD)
    }

    pub fn is_normalized(self) -> bool {
        self.info().is(TypeFlags::NORMALIZED)
    }

    pub fn is_simd(self) -> bool {
        self.info().is(TypeFlags::SIMD)
    }

    pub fn is_numeric(self) -> bool {
        self != BuiltinType::Bool && (self.is_integer() || self.is_float() || self.is_normalized())
    }

    pub fn is_signed(self) -> bool {
        self.info().is(TypeFlags::SIGNED)
    }

    /// The scalar type of one component of a vector or matrix.
    pub fn component(self) -> BuiltinType {
        use BuiltinType::*;
        match self {
            Vec2i | Vec3i | Vec4i => I32,
            Vec2f | Vec3f | Vec4f | Quatf | Mat2f | Mat3f | Mat4f => F32,
            Vec2d | Vec3d | Vec4d | Mat2d | Mat3d | Mat4d => F64,
            t => t,
        }
    }

    /// Byte size of a value of this type; strings and arrays are handles.
    pub fn size(self, ptr: PtrSize) -> usize {
        use BuiltinType::*;
        match self {
            Void => 0,
            Bool => 1,
            IPtr | UPtr | Ptr | String | Array | Any => ptr.bytes(),
            t => {
                let info = t.info();
                info.components() * info.bits as usize / 8
            }
        }
    }

    pub fn align(self, ptr: PtrSize) -> usize {
        use BuiltinType::*;
        match self {
            Void => 1,
            IPtr | UPtr | Ptr | String | Array | Any => ptr.bytes(),
            t => (t.info().bits as usize / 8).max(1),
        }
    }

    fn normalized(bits: u16, signed: bool) -> BuiltinType {
        use BuiltinType::*;
        match (bits, signed) {
            (0..=8, false) => UNorm8,
            (0..=8, true) => SNorm8,
            (9..=16, false) => UNorm16,
            (9..=16, true) => SNorm16,
            (_, false) => UNorm32,
            (_, true) => SNorm32,
        }
    }
}

impl fmt::Display for BuiltinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The working type both operands of a binary operator are converted to, or
/// `None` when the pair cannot be promoted.
pub fn find_promotion(a: BuiltinType, b: BuiltinType) -> Option<BuiltinType> {
    use BuiltinType::*;

    if a == b {
        return Some(a);
    }

    let (ia, ib) = (a.info(), b.info());
    if ia.is(TypeFlags::NO_PROMOTE) || ib.is(TypeFlags::NO_PROMOTE) {
        return None;
    }

    if a == String || b == String {
        return Some(String);
    }

    if a.is_simd() || b.is_simd() {
        // Exact ties keep the left operand.
        return Some(if ib.components() > ia.components() { b } else { a });
    }

    if a.is_float() || b.is_float() {
        return Some(match (a.is_float(), b.is_float()) {
            (true, true) if ib.bits > ia.bits => b,
            (true, _) => a,
            _ => b,
        });
    }

    if a.is_normalized() || b.is_normalized() {
        let bits = ia.bits.max(ib.bits);
        let signed = a.is_signed() || b.is_signed();
        return Some(BuiltinType::normalized(bits, signed));
    }

    let key = |info: &TypeInfo| {
        (
            info.bits,
            info.is(TypeFlags::UNSIGNED),
            info.is(TypeFlags::POINTER),
        )
    };
    Some(if key(ib) > key(ia) { b } else { a })
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserTypeId(pub u32);

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TypeKind {
    Builtin(BuiltinType),
    User(UserTypeId),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Access {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

/// A resolved type.
///
/// `Array` and `Ptr` carry their element type in `elem`.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeRef {
    pub kind: TypeKind,
    pub elem: Option<Box<TypeRef>>,
    pub access: Access,
    pub may_reorder: bool,
    pub size: usize,
}

impl TypeRef {
    pub fn builtin(t: BuiltinType, ptr: PtrSize) -> Self {
        Self {
            kind: TypeKind::Builtin(t),
            elem: None,
            access: Access::ReadWrite,
            may_reorder: true,
            size: t.size(ptr),
        }
    }

    pub fn array_of(elem: TypeRef, ptr: PtrSize) -> Self {
        Self {
            elem: Some(Box::new(elem)),
            ..Self::builtin(BuiltinType::Array, ptr)
        }
    }

    pub fn ptr_to(elem: TypeRef, ptr: PtrSize) -> Self {
        Self {
            elem: Some(Box::new(elem)),
            ..Self::builtin(BuiltinType::Ptr, ptr)
        }
    }

    pub fn user(id: UserTypeId, size: usize) -> Self {
        Self {
            kind: TypeKind::User(id),
            elem: None,
            access: Access::ReadWrite,
            may_reorder: true,
            size,
        }
    }

    pub fn with_access(mut self, access: Access) -> Self {
        self.access = access;
        self
    }

    /// Structural equality ignoring access qualifiers.
    pub fn is_same(&self, other: &TypeRef) -> bool {
        self.kind == other.kind
            && match (&self.elem, &other.elem) {
                (Some(a), Some(b)) => a.is_same(b),
                (None, None) => true,
                _ => false,
            }
    }

    pub fn as_builtin(&self) -> Option<BuiltinType> {
        match self.kind {
            TypeKind::Builtin(t) => Some(t),
            TypeKind::User(_) => None,
        }
    }

    pub fn as_user(&self) -> Option<UserTypeId> {
        match self.kind {
            TypeKind::User(id) => Some(id),
            TypeKind::Builtin(_) => None,
        }
    }

    pub fn is(&self, t: BuiltinType) -> bool {
        self.as_builtin() == Some(t)
    }

    pub fn is_void(&self) -> bool {
        self.is(BuiltinType::Void)
    }

    pub fn is_string(&self) -> bool {
        self.is(BuiltinType::String)
    }

    pub fn is_array(&self) -> bool {
        self.is(BuiltinType::Array)
    }

    pub fn is_numeric(&self) -> bool {
        self.as_builtin().map_or(false, BuiltinType::is_numeric)
    }

    pub fn is_integer(&self) -> bool {
        self.as_builtin().map_or(false, BuiltinType::is_integer)
    }

    pub fn is_simd(&self) -> bool {
        self.as_builtin().map_or(false, BuiltinType::is_simd)
    }

    pub fn elem(&self) -> Option<&TypeRef> {
        self.elem.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use BuiltinType::*;

    fn numeric() -> impl Iterator<Item = BuiltinType> {
        ALL_BUILTINS
            .iter()
            .copied()
            .filter(|t| t.is_numeric() || *t == Bool)
    }

    #[test]
    fn table_matches_enum_order() {
        for (i, t) in ALL_BUILTINS.iter().enumerate() {
            assert_eq!(*t as usize, i);
        }
        assert_eq!(Mat3f.info().components(), 9);
        assert_eq!(Vec3d.size(PtrSize::Bits64), 24);
        assert_eq!(IPtr.size(PtrSize::Bits32), 4);
    }

    #[test]
    fn names_resolve() {
        assert_eq!(BuiltinType::from_name("Integer"), Some(I32));
        assert_eq!(BuiltinType::from_name("vec3"), Some(Vec3f));
        assert_eq!(BuiltinType::from_name("uint8"), Some(U8));
        assert_eq!(I32.name(), "integer");
        assert_eq!(BuiltinType::from_name("player"), None);
    }

    #[test]
    fn promotion_is_symmetric_for_scalars() {
        for a in numeric() {
            for b in numeric() {
                assert_eq!(find_promotion(a, b), find_promotion(b, a), "{} {}", a, b);
            }
        }
    }

    #[test]
    fn larger_vector_wins_in_either_order() {
        assert_eq!(find_promotion(Vec2f, Vec3f), Some(Vec3f));
        assert_eq!(find_promotion(Vec3f, Vec2f), Some(Vec3f));
        assert_eq!(find_promotion(F32, Vec4f), Some(Vec4f));
    }

    #[test]
    fn equal_size_vectors_keep_left() {
        assert_eq!(find_promotion(Vec3f, Vec3i), Some(Vec3f));
        assert_eq!(find_promotion(Vec3i, Vec3f), Some(Vec3i));
        assert_eq!(find_promotion(Vec4f, Quatf), Some(Vec4f));
    }

    #[test]
    fn promotion_rules() {
        assert_eq!(find_promotion(I32, F32), Some(F32));
        assert_eq!(find_promotion(F64, F32), Some(F64));
        assert_eq!(find_promotion(I32, String), Some(String));
        assert_eq!(find_promotion(I32, U32), Some(U32));
        assert_eq!(find_promotion(I8, I64), Some(I64));
        assert_eq!(find_promotion(Bool, U8), Some(U8));
        assert_eq!(find_promotion(UNorm8, SNorm16), Some(SNorm16));
        assert_eq!(find_promotion(UNorm8, U16), Some(UNorm16));
        assert_eq!(find_promotion(I64, IPtr), Some(IPtr));
        assert_eq!(find_promotion(Void, I32), None);
        assert_eq!(find_promotion(Array, Array), Some(Array));
        assert_eq!(find_promotion(Any, I32), None);
    }

    #[test]
    fn same_type_ignores_access() {
        let a = TypeRef::builtin(I32, PtrSize::Bits64);
        let b = a.clone().with_access(Access::ReadOnly);
        assert!(a.is_same(&b));
        let arr = TypeRef::array_of(a.clone(), PtrSize::Bits64);
        assert!(!arr.is_same(&a));
        assert!(arr.is_same(&TypeRef::array_of(b, PtrSize::Bits64)));
    }
}
