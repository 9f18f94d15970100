use super::types::{write_list, BlockId, Constant, IrType, VReg};
use std::fmt;

#[derive(Debug, Clone)]
pub struct Instruction {
    /// Result register (None for void instructions)
    pub result: Option<VReg>,
    pub kind: InstrKind,
}

impl Instruction {
    pub fn new(result: Option<VReg>, kind: InstrKind) -> Self {
        Self { result, kind }
    }
}

#[derive(Debug, Clone)]
pub enum InstrKind {
    Const(Constant, IrType),

    // Integer arithmetic
    Add(VReg, VReg),
    Sub(VReg, VReg),
    Mul(VReg, VReg),
    SDiv(VReg, VReg),
    UDiv(VReg, VReg),
    SRem(VReg, VReg),
    URem(VReg, VReg),
    Neg(VReg),

    // Floating point
    FAdd(VReg, VReg),
    FSub(VReg, VReg),
    FMul(VReg, VReg),
    FDiv(VReg, VReg),
    FRem(VReg, VReg),
    FNeg(VReg),

    // Bitwise
    And(VReg, VReg),
    Or(VReg, VReg),
    Xor(VReg, VReg),
    Shl(VReg, VReg),
    /// Arithmetic shift right (sign-extending)
    AShr(VReg, VReg),
    /// Logical shift right (zero-extending)
    LShr(VReg, VReg),
    Not(VReg),

    ICmp(CmpOp, VReg, VReg),
    FCmp(CmpOp, VReg, VReg),

    // Conversions
    SExt(VReg, IrType),
    ZExt(VReg, IrType),
    Trunc(VReg, IrType),
    FPToSI(VReg, IrType),
    FPToUI(VReg, IrType),
    SIToFP(VReg, IrType),
    UIToFP(VReg, IrType),
    /// Float extend/truncate
    FPCast(VReg, IrType),
    PtrToInt(VReg, IrType),
    IntToPtr(VReg, IrType),
    Bitcast(VReg, IrType),

    // Vectors
    /// Scalar broadcast into every lane.
    Splat(VReg, IrType),
    /// Vector built from one value per lane.
    BuildVector(Vec<VReg>, IrType),
    ExtractElement(VReg, u32),
    InsertElement(VReg, VReg, u32),
    Shuffle(VReg, Vec<u32>),

    // Memory
    Alloca(IrType),
    Load(VReg, IrType),
    /// Store to memory (ptr, value)
    Store(VReg, VReg),
    /// Pointer to field `index` of the struct behind `ptr`.
    GetFieldPtr(VReg, u32),
    GlobalRef(String),

    Call { func: String, args: Vec<VReg> },
}

/// Comparison predicates; the signed forms double as ordered float predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Slt,
    Sle,
    Sgt,
    Sge,
    Ult,
    Ule,
    Ugt,
    Uge,
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CmpOp::Eq => "eq",
            CmpOp::Ne => "ne",
            CmpOp::Slt => "slt",
            CmpOp::Sle => "sle",
            CmpOp::Sgt => "sgt",
            CmpOp::Sge => "sge",
            CmpOp::Ult => "ult",
            CmpOp::Ule => "ule",
            CmpOp::Ugt => "ugt",
            CmpOp::Uge => "uge",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Terminator {
    Ret(Option<VReg>),
    Br(BlockId),
    CondBr {
        cond: VReg,
        then_block: BlockId,
        else_block: BlockId,
    },
    Unreachable,
}

impl Terminator {
    /// Blocks control may continue to.
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Terminator::Br(b) => vec![*b],
            Terminator::CondBr {
                then_block,
                else_block,
                ..
            } => vec![*then_block, *else_block],
            Terminator::Ret(_) | Terminator::Unreachable => vec![],
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(result) = self.result {
            write!(f, "{} = ", result)?;
        }
        match &self.kind {
            InstrKind::Const(c, ty) => write!(f, "const {} {}", ty, c),
            InstrKind::Add(a, b) => write!(f, "add {}, {}", a, b),
            InstrKind::Sub(a, b) => write!(f, "sub {}, {}", a, b),
            InstrKind::Mul(a, b) => write!(f, "mul {}, {}", a, b),
            InstrKind::SDiv(a, b) => write!(f, "sdiv {}, {}", a, b),
            InstrKind::UDiv(a, b) => write!(f, "udiv {}, {}", a, b),
            InstrKind::SRem(a, b) => write!(f, "srem {}, {}", a, b),
            InstrKind::URem(a, b) => write!(f, "urem {}, {}", a, b),
            InstrKind::Neg(v) => write!(f, "neg {}", v),
            InstrKind::FAdd(a, b) => write!(f, "fadd {}, {}", a, b),
            InstrKind::FSub(a, b) => write!(f, "fsub {}, {}", a, b),
            InstrKind::FMul(a, b) => write!(f, "fmul {}, {}", a, b),
            InstrKind::FDiv(a, b) => write!(f, "fdiv {}, {}", a, b),
            InstrKind::FRem(a, b) => write!(f, "frem {}, {}", a, b),
            InstrKind::FNeg(v) => write!(f, "fneg {}", v),
            InstrKind::And(a, b) => write!(f, "and {}, {}", a, b),
            InstrKind::Or(a, b) => write!(f, "or {}, {}", a, b),
            InstrKind::Xor(a, b) => write!(f, "xor {}, {}", a, b),
            InstrKind::Shl(a, b) => write!(f, "shl {}, {}", a, b),
            InstrKind::AShr(a, b) => write!(f, "ashr {}, {}", a, b),
            InstrKind::LShr(a, b) => write!(f, "lshr {}, {}", a, b),
            InstrKind::Not(v) => write!(f, "not {}", v),
            InstrKind::ICmp(op, a, b) => write!(f, "icmp {} {}, {}", op, a, b),
            InstrKind::FCmp(op, a, b) => write!(f, "fcmp {} {}, {}", op, a, b),
            InstrKind::SExt(v, ty) => write!(f, "sext {} to {}", v, ty),
            InstrKind::ZExt(v, ty) => write!(f, "zext {} to {}", v, ty),
            InstrKind::Trunc(v, ty) => write!(f, "trunc {} to {}", v, ty),
            InstrKind::FPToSI(v, ty) => write!(f, "fptosi {} to {}", v, ty),
            InstrKind::FPToUI(v, ty) => write!(f, "fptoui {} to {}", v, ty),
            InstrKind::SIToFP(v, ty) => write!(f, "sitofp {} to {}", v, ty),
            InstrKind::UIToFP(v, ty) => write!(f, "uitofp {} to {}", v, ty),
            InstrKind::FPCast(v, ty) => write!(f, "fpcast {} to {}", v, ty),
            InstrKind::PtrToInt(v, ty) => write!(f, "ptrtoint {} to {}", v, ty),
            InstrKind::IntToPtr(v, ty) => write!(f, "inttoptr {} to {}", v, ty),
            InstrKind::Bitcast(v, ty) => write!(f, "bitcast {} to {}", v, ty),
            InstrKind::Splat(v, ty) => write!(f, "splat {} to {}", v, ty),
            InstrKind::BuildVector(lanes, ty) => {
                write!(f, "vector {} [", ty)?;
                write_list(f, lanes)?;
                write!(f, "]")
            }
            InstrKind::ExtractElement(v, i) => write!(f, "extractelement {}, {}", v, i),
            InstrKind::InsertElement(v, x, i) => write!(f, "insertelement {}, {}, {}", v, x, i),
            InstrKind::Shuffle(v, lanes) => {
                write!(f, "shuffle {} [", v)?;
                write_list(f, lanes)?;
                write!(f, "]")
            }
            InstrKind::Alloca(ty) => write!(f, "alloca {}", ty),
            InstrKind::Load(ptr, ty) => write!(f, "load {} {}", ty, ptr),
            InstrKind::Store(ptr, val) => write!(f, "store {}, {}", ptr, val),
            InstrKind::GetFieldPtr(ptr, idx) => write!(f, "getfieldptr {}, {}", ptr, idx),
            InstrKind::GlobalRef(name) => write!(f, "globalref @{}", name),
            InstrKind::Call { func, args } => {
                write!(f, "call @{}(", func)?;
                write_list(f, args)?;
                write!(f, ")")
            }
        }
    }
}

impl fmt::Display for Terminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Terminator::Ret(None) => write!(f, "ret void"),
            Terminator::Ret(Some(v)) => write!(f, "ret {}", v),
            Terminator::Br(block) => write!(f, "br {}", block),
            Terminator::CondBr {
                cond,
                then_block,
                else_block,
            } => write!(f, "br {}, {}, {}", cond, then_block, else_block),
            Terminator::Unreachable => write!(f, "unreachable"),
        }
    }
}
