//! Compilation-wide configuration, built once and shared read-only by every
//! stage of the pipeline.

use crate::lex::Keywords;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PtrSize {
    Bits32,
    Bits64,
}

impl PtrSize {
    pub fn bytes(self) -> usize {
        match self {
            PtrSize::Bits32 => 4,
            PtrSize::Bits64 => 8,
        }
    }

    pub fn bits(self) -> usize {
        self.bytes() * 8
    }
}

/// A command supplied by a module descriptor: the callable name, the type
/// pattern of its signature (return type first) and the linker symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltinDecl {
    pub name: String,
    pub pattern: String,
    pub symbol: String,
}

impl BuiltinDecl {
    pub fn new(name: &str, pattern: &str, symbol: &str) -> Self {
        Self {
            name: name.to_string(),
            pattern: pattern.to_string(),
            symbol: symbol.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompilationContext {
    pub keywords: Keywords,
    pub ptr_size: PtrSize,
    /// Upper bound on the alignment of a user-type member.
    pub member_align: usize,
    pub builtins: Vec<BuiltinDecl>,
}

impl Default for CompilationContext {
    fn default() -> Self {
        Self::new(PtrSize::Bits64)
    }
}

impl CompilationContext {
    pub fn new(ptr_size: PtrSize) -> Self {
        Self {
            keywords: Keywords::new(),
            ptr_size,
            member_align: ptr_size.bytes(),
            builtins: default_builtins(),
        }
    }

    pub fn empty(ptr_size: PtrSize) -> Self {
        Self {
            builtins: vec![],
            ..Self::new(ptr_size)
        }
    }

    pub fn add_builtin(&mut self, name: &str, pattern: &str, symbol: &str) {
        self.builtins.push(BuiltinDecl::new(name, pattern, symbol));
    }
}

fn default_builtins() -> Vec<BuiltinDecl> {
    [
        ("print", "X G", "dbrt_print_str"),
        ("print", "X L", "dbrt_print_int"),
        ("print", "X R", "dbrt_print_long"),
        ("print", "X F", "dbrt_print_float"),
        ("print", "X O", "dbrt_print_double"),
        ("print", "X", "dbrt_print_newline"),
        ("str$", "G L", "dbrt_str_int"),
        ("str$", "G F", "dbrt_str_float"),
        ("val", "L G", "dbrt_val"),
        ("len", "L G", "dbrt_len"),
        ("left$", "G G L", "dbrt_left"),
        ("right$", "G G L", "dbrt_right"),
        ("mid$", "G G L L?", "dbrt_mid"),
        ("rnd", "L L", "dbrt_rnd"),
        ("abs", "L L", "dbrt_abs_int"),
        ("abs", "F F", "dbrt_abs_float"),
        ("sqrt", "F F", "dbrt_sqrt"),
        ("sin", "F F", "dbrt_sin"),
        ("cos", "F F", "dbrt_cos"),
        ("timer", "L", "dbrt_timer"),
        ("wait", "X L", "dbrt_wait"),
        ("swap", "X L* L*", "dbrt_swap_int"),
        ("max", "L L L+", "dbrt_max_int"),
    ]
    .iter()
    .map(|(name, pattern, symbol)| BuiltinDecl::new(name, pattern, symbol))
    .collect()
}
