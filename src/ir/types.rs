//! Values, types and containers of the IR.

use super::instr::{Instruction, Terminator};
use std::fmt;

/// A virtual register (SSA value)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VReg(pub u32);

impl fmt::Display for VReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// A basic block label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(pub u32);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IrType {
    Void,
    /// 1 bit
    Bool,
    I8,
    I16,
    I32,
    I64,
    F16,
    F32,
    F64,
    Ptr(Box<IrType>),
    /// Fixed-size vector of scalars; matrices are flattened row by row.
    Vector(Box<IrType>, usize),
    Array(Box<IrType>, usize),
    Struct(Vec<IrType>),
}

impl IrType {
    pub fn ptr(inner: IrType) -> Self {
        IrType::Ptr(Box::new(inner))
    }

    /// Opaque byte pointer used for runtime handles.
    pub fn handle() -> Self {
        IrType::ptr(IrType::I8)
    }

    pub fn vector(elem: IrType, n: usize) -> Self {
        IrType::Vector(Box::new(elem), n)
    }

    pub fn is_int(&self) -> bool {
        matches!(self, IrType::Bool | IrType::I8 | IrType::I16 | IrType::I32 | IrType::I64)
    }

    pub fn is_float(&self) -> bool {
        matches!(self, IrType::F16 | IrType::F32 | IrType::F64)
    }

    pub fn is_ptr(&self) -> bool {
        matches!(self, IrType::Ptr(_))
    }

    /// Scalar type of a vector, or the type itself.
    pub fn scalar(&self) -> &IrType {
        match self {
            IrType::Vector(elem, _) => elem,
            t => t,
        }
    }
}

impl fmt::Display for IrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrType::Void => write!(f, "void"),
            IrType::Bool => write!(f, "i1"),
            IrType::I8 => write!(f, "i8"),
            IrType::I16 => write!(f, "i16"),
            IrType::I32 => write!(f, "i32"),
            IrType::I64 => write!(f, "i64"),
            IrType::F16 => write!(f, "f16"),
            IrType::F32 => write!(f, "f32"),
            IrType::F64 => write!(f, "f64"),
            IrType::Ptr(inner) => write!(f, "*{}", inner),
            IrType::Vector(elem, n) => write!(f, "<{} x {}>", n, elem),
            IrType::Array(elem, n) => write!(f, "[{} x {}]", n, elem),
            IrType::Struct(fields) => {
                write!(f, "{{")?;
                write_list(f, fields)?;
                write!(f, "}}")
            }
        }
    }
}

pub(super) fn write_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
    /// Zero bits of any type.
    Zero,
    /// NUL-terminated byte string.
    String(String),
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Int(v) => write!(f, "{}", v),
            Constant::Float(v) => write!(f, "{:?}", v),
            Constant::Bool(v) => write!(f, "{}", v),
            Constant::Null => write!(f, "null"),
            Constant::Zero => write!(f, "zeroinitializer"),
            Constant::String(s) => write!(f, "{:?}", s),
        }
    }
}

/// A compilation unit's worth of IR.
#[derive(Debug, Clone, Default)]
pub struct Module {
    pub name: String,
    pub functions: Vec<Function>,
    pub globals: Vec<Global>,
    pub structs: Vec<StructDef>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; module {}", self.name)?;
        for s in &self.structs {
            writeln!(f, "type %{} = {}", s.name, IrType::Struct(s.fields.clone()))?;
        }
        for g in &self.globals {
            writeln!(f, "{}", g)?;
        }
        for func in &self.functions {
            writeln!(f)?;
            write!(f, "{}", func)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub params: Vec<(VReg, IrType)>,
    pub ret_type: IrType,
    pub blocks: Vec<BasicBlock>,
    pub is_external: bool,
    pub is_vararg: bool,
}

impl Function {
    pub fn new(name: impl Into<String>, params: Vec<(VReg, IrType)>, ret_type: IrType) -> Self {
        Self {
            name: name.into(),
            params,
            ret_type,
            blocks: Vec::new(),
            is_external: false,
            is_vararg: false,
        }
    }

    pub fn entry_block(&self) -> Option<&BasicBlock> {
        self.blocks.first()
    }

    pub fn block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.iter().find(|b| b.id == id)
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keyword = if self.is_external { "declare" } else { "define" };
        write!(f, "{} {} @{}(", keyword, self.ret_type, self.name)?;
        for (i, (reg, ty)) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            if self.is_external {
                write!(f, "{}", ty)?;
            } else {
                write!(f, "{} {}", ty, reg)?;
            }
        }
        if self.is_vararg {
            write!(f, "{}...", if self.params.is_empty() { "" } else { ", " })?;
        }
        write!(f, ")")?;
        if self.is_external {
            return writeln!(f);
        }

        writeln!(f, " {{")?;
        for block in &self.blocks {
            write!(f, "{}", block)?;
        }
        writeln!(f, "}}")
    }
}

#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub id: BlockId,
    pub label: Option<String>,
    pub instructions: Vec<Instruction>,
    pub terminator: Option<Terminator>,
}

impl BasicBlock {
    pub fn new(id: BlockId) -> Self {
        Self {
            id,
            label: None,
            instructions: Vec::new(),
            terminator: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

impl fmt::Display for BasicBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.label {
            Some(label) => writeln!(f, "{}:  ; {}", self.id, label)?,
            None => writeln!(f, "{}:", self.id)?,
        }
        for instr in &self.instructions {
            writeln!(f, "  {}", instr)?;
        }
        match &self.terminator {
            Some(t) => writeln!(f, "  {}", t),
            None => writeln!(f, "  ; no terminator"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Global {
    pub name: String,
    pub ty: IrType,
    pub init: Option<Constant>,
    pub is_const: bool,
}

impl fmt::Display for Global {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keyword = if self.is_const { "constant" } else { "global" };
        write!(f, "@{} = {} {}", self.name, keyword, self.ty)?;
        if let Some(init) = &self.init {
            write!(f, " {}", init)?;
        }
        Ok(())
    }
}

/// A user type definition
#[derive(Debug, Clone)]
pub struct StructDef {
    pub name: String,
    pub fields: Vec<IrType>,
}
