//! Lowers the typed tree into IR.

mod cleanup;
mod expr;
mod stmt;

pub use self::cleanup::{Cleanup, CleanupStack};

use self::cleanup::FrameGuard;
use crate::{
    err::{Handler, Result},
    ir::{BlockId, IrBuilder, IrType, Module, VReg},
    symbol::{SymbolId, VariableKind},
    typeck::{
        hir::{self, Program},
        layout::Trivial,
        pattern::{PassBy, Repeat},
        ty::{BuiltinType, TypeKind, TypeRef},
    },
};
use std::{
    collections::{HashMap, HashSet},
    rc::Rc,
};

pub(crate) const STRING_FREE: &str = "__rt_string_free";
pub(crate) const ARRAY_FREE: &str = "__rt_array_free";

/// Runtime support the generated code links against.
const RUNTIME: &[(&str, &[Rt], Rt)] = &[
    ("__rt_string_from_lit", &[Rt::Handle], Rt::Handle),
    ("__rt_string_concat", &[Rt::Handle, Rt::Handle], Rt::Handle),
    ("__rt_string_free", &[Rt::Handle], Rt::Void),
    ("__rt_string_clone", &[Rt::Handle], Rt::Handle),
    ("__rt_string_assign", &[Rt::Slot, Rt::Handle], Rt::Void),
    ("__rt_string_cmp", &[Rt::Handle, Rt::Handle], Rt::I32),
    ("__rt_to_string_int", &[Rt::I64], Rt::Handle),
    ("__rt_to_string_uint", &[Rt::I64], Rt::Handle),
    ("__rt_to_string_float", &[Rt::F64], Rt::Handle),
    ("__rt_to_string_bool", &[Rt::Bool], Rt::Handle),
    ("__rt_array_new", &[Rt::I32, Rt::I64], Rt::Handle),
    ("__rt_array_elem", &[Rt::Handle, Rt::I32], Rt::Handle),
    ("__rt_array_free", &[Rt::Handle], Rt::Void),
    ("__rt_array_assign", &[Rt::Slot, Rt::Handle], Rt::Void),
    ("__rt_pow_i64", &[Rt::I64, Rt::I64], Rt::I64),
    ("__rt_pow_u64", &[Rt::I64, Rt::I64], Rt::I64),
    ("__rt_pow_f64", &[Rt::F64, Rt::F64], Rt::F64),
    ("__rt_end", &[], Rt::Void),
];

#[derive(Debug, Copy, Clone)]
enum Rt {
    Void,
    Bool,
    I32,
    I64,
    F64,
    Handle,
    Slot,
}

impl Rt {
    fn ir(self) -> IrType {
        match self {
            Rt::Void => IrType::Void,
            Rt::Bool => IrType::Bool,
            Rt::I32 => IrType::I32,
            Rt::I64 => IrType::I64,
            Rt::F64 => IrType::F64,
            Rt::Handle => IrType::handle(),
            Rt::Slot => IrType::ptr(IrType::handle()),
        }
    }
}

/// Emits one IR module for a checked program.
pub fn emit(program: &Program, handler: &Rc<Handler>, module_name: &str) -> Result<Module> {
    let mut e = Emitter::new(program, handler, module_name);
    e.declare_runtime();
    e.declare_builtins();
    e.declare_types();
    e.declare_globals();

    let mut failed = false;
    for f in &program.functions {
        if e.function(f, false).is_err() {
            failed = true;
        }
    }
    if e.function(&program.main, true).is_err() {
        failed = true;
    }

    if failed || handler.has_errors() {
        return Err(());
    }
    Ok(e.b.finish())
}

#[derive(Debug, Copy, Clone)]
pub(crate) struct LoopTargets {
    pub brk: BlockId,
    pub cont: BlockId,
    /// Cleanup depth outside the loop body.
    pub depth: usize,
}

pub(crate) struct Emitter<'p> {
    pub program: &'p Program,
    pub handler: Rc<Handler>,
    pub b: IrBuilder,
    pub cleanups: CleanupStack,
    /// Address of each local and parameter of the current function.
    pub slots: HashMap<SymbolId, VReg>,
    pub labels: HashMap<SymbolId, BlockId>,
    pub loops: Vec<LoopTargets>,
    /// Body of the following case, for `fallthrough`, and the cleanup
    /// depth outside the current case body.
    pub next_case: Vec<(Option<BlockId>, usize)>,
    pub ret: TypeRef,
    pub is_main: bool,
    /// Address of the target of the assignment being lowered.
    pub target: Option<VReg>,
}

impl<'p> Emitter<'p> {
    fn new(program: &'p Program, handler: &Rc<Handler>, module_name: &str) -> Self {
        Self {
            program,
            handler: handler.clone(),
            b: IrBuilder::new(module_name),
            cleanups: CleanupStack::default(),
            slots: HashMap::new(),
            labels: HashMap::new(),
            loops: vec![],
            next_case: vec![],
            ret: program.types.builtin(BuiltinType::Void),
            is_main: false,
            target: None,
        }
    }

    pub(crate) fn enter_frame(&mut self) -> FrameGuard<'_, 'p> {
        FrameGuard::new(self)
    }

    /// IR representation of a source type.
    pub(crate) fn ir_type(&self, ty: &TypeRef) -> IrType {
        use BuiltinType::*;
        let t = match ty.kind {
            TypeKind::User(id) => {
                let fields = self
                    .program
                    .types
                    .get(id)
                    .members
                    .iter()
                    .map(|m| self.ir_type(&m.ty))
                    .collect();
                return IrType::Struct(fields);
            }
            TypeKind::Builtin(t) => t,
        };
        match t {
            Void => IrType::Void,
            Bool => IrType::Bool,
            I8 | U8 | UNorm8 | SNorm8 => IrType::I8,
            I16 | U16 | UNorm16 | SNorm16 => IrType::I16,
            I32 | U32 | UNorm32 | SNorm32 => IrType::I32,
            I64 | U64 => IrType::I64,
            F16 => IrType::F16,
            F32 => IrType::F32,
            F64 => IrType::F64,
            IPtr | UPtr => match self.program.types.ptr.bits() {
                32 => IrType::I32,
                _ => IrType::I64,
            },
            String | Array | Ptr | Any => IrType::handle(),
            t if t.is_simd() => {
                let elem = self.ir_type(&self.program.types.builtin(t.component()));
                IrType::vector(elem, t.info().components())
            }
            _ => IrType::Void,
        }
    }

    pub(crate) fn emit_cleanups(&mut self, cleanups: &[Cleanup]) {
        for c in cleanups {
            let value = match &c.indirect {
                Some(ty) => self.b.load(c.value, ty.clone()),
                None => c.value,
            };
            self.b.call_void(c.func, vec![value]);
        }
    }

    /// Registers the release of whatever `slot` holds when the current
    /// frame closes.
    pub(crate) fn register_slot_cleanup(&mut self, slot: VReg, ty: &TypeRef) {
        match ty.kind {
            TypeKind::Builtin(BuiltinType::String) => {
                self.cleanups.register(Cleanup::slot(STRING_FREE, slot));
            }
            TypeKind::Builtin(BuiltinType::Array) => {
                self.cleanups.register(Cleanup::slot(ARRAY_FREE, slot));
            }
            TypeKind::User(id) => {
                let program = self.program;
                let t = program.types.get(id);
                if t.trivial.contains(Trivial::FINI) {
                    return;
                }
                for (i, m) in t.members.iter().enumerate() {
                    if program.types.needs_fini(&m.ty) {
                        let field = self.b.get_field_ptr(slot, i as u32);
                        self.register_slot_cleanup(field, &m.ty);
                    }
                }
            }
            TypeKind::Builtin(_) => {}
        }
    }

    fn declare_runtime(&mut self) {
        for (name, params, ret) in RUNTIME {
            let params = params.iter().map(|p| p.ir()).collect();
            self.b.declare_external(*name, params, ret.ir());
        }
    }

    fn declare_builtins(&mut self) {
        let program = self.program;
        let mut seen = HashSet::new();
        for builtin in &program.builtins {
            if !seen.insert(builtin.link_name.clone()) {
                continue;
            }
            let mut params = vec![];
            let mut vararg = false;
            for p in &builtin.params {
                match p.repeat {
                    Repeat::Variadic | Repeat::OneOrMore => {
                        params.push(IrType::I32);
                        vararg = true;
                        break;
                    }
                    Repeat::Once | Repeat::Optional => params.push(self.param_type(&p.ty, p.pass)),
                }
            }
            let ret = self.ir_type(&builtin.ret);
            if vararg {
                self.b
                    .declare_external_vararg(builtin.link_name.clone(), params, ret);
            } else {
                self.b.declare_external(builtin.link_name.clone(), params, ret);
            }
        }
    }

    fn declare_types(&mut self) {
        let program = self.program;
        for (_, t) in program.types.iter() {
            let fields = t.members.iter().map(|m| self.ir_type(&m.ty)).collect();
            self.b.add_struct(t.name.fold().to_string(), fields);
        }
    }

    fn declare_globals(&mut self) {
        let program = self.program;
        for id in &program.globals {
            let sym = program.scopes.get(*id);
            if let Some(var) = sym.as_variable() {
                let ty = self.ir_type(&var.ty);
                self.b
                    .add_global(global_name(sym.name), ty, Some(crate::ir::Constant::Zero));
            }
        }
    }

    pub(crate) fn param_type(&self, ty: &TypeRef, pass: PassBy) -> IrType {
        let t = self.ir_type(ty);
        if pass.needs_lvalue() {
            IrType::ptr(t)
        } else {
            t
        }
    }

    fn function(&mut self, f: &'p hir::Function, is_main: bool) -> Result<()> {
        log::debug!("emitting function {}", f.link_name);
        self.slots.clear();
        self.labels.clear();
        self.loops.clear();
        self.next_case.clear();
        self.cleanups.clear();
        self.ret = f.ret.clone();
        self.is_main = is_main;

        let result = self.function_body(f, is_main);
        if result.is_err() {
            self.b.abandon_function();
        } else {
            self.b.finish_function();
        }
        self.cleanups.clear();
        result
    }

    fn function_body(&mut self, f: &'p hir::Function, is_main: bool) -> Result<()> {
        let program = self.program;
        let scopes = &program.scopes;
        let mut params = vec![];
        let mut param_syms = vec![];
        for id in &f.params {
            let var = match scopes.get(*id).as_variable() {
                Some(v) => v,
                None => return self.handler.mk_err(f.span, "Parameter is not a variable"),
            };
            let by_ref = matches!(var.kind, VariableKind::Param { by_ref: true, .. });
            let pass = if by_ref { PassBy::InOutRef } else { PassBy::Value };
            params.push(self.param_type(&var.ty, pass));
            param_syms.push((*id, var.ty.clone(), by_ref));
        }
        let ret = if is_main {
            IrType::I32
        } else {
            self.ir_type(&f.ret)
        };
        let regs = self.b.start_function(f.link_name.clone(), params, ret);

        // Function-wide frame: slot releases of every local.
        self.cleanups.push_frame();
        for ((id, ty, by_ref), reg) in param_syms.into_iter().zip(regs) {
            if by_ref {
                self.slots.insert(id, reg);
                continue;
            }
            let ir = self.ir_type(&ty);
            let slot = self.b.alloca(ir);
            let value = if ty.is_string() {
                self.b.call("__rt_string_clone", vec![reg])
            } else {
                reg
            };
            self.b.store(slot, value);
            if ty.is_string() {
                self.register_slot_cleanup(slot, &ty);
            }
            self.slots.insert(id, slot);
        }
        for id in &f.locals {
            let ty = match scopes.get(*id).as_variable() {
                Some(v) => v.ty.clone(),
                None => continue,
            };
            let ir = self.ir_type(&ty);
            let slot = self.b.alloca(ir.clone());
            let zero = self.b.const_zero(ir);
            self.b.store(slot, zero);
            self.register_slot_cleanup(slot, &ty);
            self.slots.insert(*id, slot);
        }
        for id in &f.labels {
            let name = scopes.get(*id).name.fold().to_string();
            let block = self.b.create_block(&name);
            self.labels.insert(*id, block);
        }

        self.block(&f.body)?;

        if !self.b.is_terminated() && !self.b.is_reachable() {
            self.b.unreachable();
        }
        if !self.b.is_terminated() {
            match &f.end_value {
                Some(e) => self.emit_return(Some(e))?,
                None => self.emit_return(None)?,
            }
        }
        Ok(())
    }

    /// Returns from the current function, releasing every open frame.
    pub(crate) fn emit_return(&mut self, value: Option<&'p hir::Expr>) -> Result<()> {
        let value = match value {
            Some(e) => {
                let v = self.expr(e)?;
                if e.ty.is_string() {
                    if e.is_fresh() {
                        self.cleanups.ignore(v);
                        Some(v)
                    } else {
                        Some(self.b.call("__rt_string_clone", vec![v]))
                    }
                } else {
                    Some(v)
                }
            }
            None if self.is_main => Some(self.b.const_int(0, IrType::I32)),
            None if !self.ret.is_void() => {
                let ty = self.ir_type(&self.ret);
                Some(self.b.const_zero(ty))
            }
            None => None,
        };

        let pending = self.cleanups.pending_from(0);
        self.emit_cleanups(&pending);
        self.b.ret(value);
        Ok(())
    }

    /// Continues in a block nothing branches to yet.
    pub(crate) fn detach(&mut self, label: &str) {
        let block = self.b.create_block(label);
        self.b.set_block(block);
    }

    pub(crate) fn var_addr(&mut self, id: SymbolId) -> Result<VReg> {
        if let Some(slot) = self.slots.get(&id) {
            return Ok(*slot);
        }
        let program = self.program;
        let sym = program.scopes.get(id);
        match sym.as_variable().map(|v| v.kind) {
            Some(VariableKind::Global) => Ok(self.b.global_ref(&global_name(sym.name))),
            _ => {
                let msg = format!("No storage for '{}'", sym.name);
                self.handler.mk_err(sym.span, &msg)
            }
        }
    }
}

fn global_name(name: crate::symbol::Symbol) -> String {
    format!("g.{}", name.fold())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_names_are_unique() {
        let mut names: Vec<_> = RUNTIME.iter().map(|(n, _, _)| *n).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), RUNTIME.len());
        assert!(names.contains(&STRING_FREE));
        assert!(names.contains(&ARRAY_FREE));
    }
}
