use super::instr::{CmpOp, InstrKind, Instruction, Terminator};
use super::types::{BasicBlock, BlockId, Constant, Function, Global, IrType, Module, StructDef, VReg};
use std::collections::HashMap;

/// Builds a module one function at a time. Instructions go to the current
/// block; switching blocks closes the previous one with a branch when it
/// has no terminator yet.
pub struct IrBuilder {
    next_vreg: u32,
    next_block: u32,
    next_string: u32,
    module: Module,
    current_fn: Option<Function>,
    current_block: Option<BasicBlock>,
    /// Number of allocas hoisted to the front of the entry block.
    entry_allocas: usize,
    labels: HashMap<BlockId, String>,
}

impl IrBuilder {
    pub fn new(module_name: impl Into<String>) -> Self {
        Self {
            next_vreg: 0,
            next_block: 0,
            next_string: 0,
            module: Module::new(module_name),
            current_fn: None,
            current_block: None,
            entry_allocas: 0,
            labels: HashMap::new(),
        }
    }

    pub fn finish(mut self) -> Module {
        self.finish_function();
        self.module
    }

    pub fn fresh_vreg(&mut self) -> VReg {
        let vreg = VReg(self.next_vreg);
        self.next_vreg += 1;
        vreg
    }

    fn fresh_block(&mut self) -> BlockId {
        let id = BlockId(self.next_block);
        self.next_block += 1;
        id
    }

    // Functions

    /// Starts a function and positions the builder in its entry block.
    pub fn start_function(
        &mut self,
        name: impl Into<String>,
        params: Vec<IrType>,
        ret_type: IrType,
    ) -> Vec<VReg> {
        self.finish_function();
        self.next_vreg = 0;
        self.next_block = 0;
        self.entry_allocas = 0;

        let param_vregs: Vec<(VReg, IrType)> = params
            .into_iter()
            .map(|ty| (self.fresh_vreg(), ty))
            .collect();
        let vregs = param_vregs.iter().map(|(v, _)| *v).collect();

        let name = name.into();
        log::trace!("start function {}", name);
        self.current_fn = Some(Function::new(name, param_vregs, ret_type));
        let entry = self.fresh_block();
        self.current_block = Some(BasicBlock::new(entry).with_label("entry"));
        vregs
    }

    pub fn finish_function(&mut self) {
        self.close_block();
        if let Some(func) = self.current_fn.take() {
            self.module.functions.push(func);
        }
        self.labels.clear();
    }

    /// Drops the function being built.
    pub fn abandon_function(&mut self) {
        if let Some(func) = self.current_fn.take() {
            log::debug!("discarding function {}", func.name);
        }
        self.current_block = None;
        self.labels.clear();
    }

    pub fn declare_external(&mut self, name: impl Into<String>, params: Vec<IrType>, ret_type: IrType) {
        let mut func = Function::new(name, vec![], ret_type);
        func.is_external = true;
        func.params = params.into_iter().map(|ty| (VReg(0), ty)).collect();
        self.module.functions.push(func);
    }

    pub fn declare_external_vararg(
        &mut self,
        name: impl Into<String>,
        params: Vec<IrType>,
        ret_type: IrType,
    ) {
        self.declare_external(name, params, ret_type);
        if let Some(func) = self.module.functions.last_mut() {
            func.is_vararg = true;
        }
    }

    pub fn add_struct(&mut self, name: impl Into<String>, fields: Vec<IrType>) {
        self.module.structs.push(StructDef {
            name: name.into(),
            fields,
        });
    }

    pub fn add_global(&mut self, name: impl Into<String>, ty: IrType, init: Option<Constant>) {
        self.module.globals.push(Global {
            name: name.into(),
            ty,
            init,
            is_const: false,
        });
    }

    /// Adds a NUL-terminated constant and returns a pointer to its first byte.
    pub fn string_constant(&mut self, value: &str) -> VReg {
        let name = format!(".str.{}", self.next_string);
        self.next_string += 1;
        self.module.globals.push(Global {
            name: name.clone(),
            ty: IrType::Array(Box::new(IrType::I8), value.len() + 1),
            init: Some(Constant::String(value.to_string())),
            is_const: true,
        });
        self.global_ref(&name)
    }

    pub fn global_ref(&mut self, name: &str) -> VReg {
        self.emit_with_result(InstrKind::GlobalRef(name.to_string()))
    }

    // Blocks

    pub fn create_block(&mut self, label: &str) -> BlockId {
        let id = self.fresh_block();
        self.labels.insert(id, label.to_string());
        id
    }

    /// Makes `id` the current block. A previous block without a terminator
    /// falls through to `id`.
    pub fn set_block(&mut self, id: BlockId) {
        if let Some(block) = &mut self.current_block {
            if block.terminator.is_none() {
                block.terminator = Some(Terminator::Br(id));
            }
        }
        self.close_block();
        log::trace!("switch to block {}", id);
        let mut block = BasicBlock::new(id);
        block.label = self.labels.remove(&id);
        self.current_block = Some(block);
    }

    fn close_block(&mut self) {
        if let Some(block) = self.current_block.take() {
            if let Some(func) = &mut self.current_fn {
                func.blocks.push(block);
            }
        }
    }

    pub fn current_block_id(&self) -> Option<BlockId> {
        self.current_block.as_ref().map(|b| b.id)
    }

    /// True if the current block already ends in a terminator.
    pub fn is_terminated(&self) -> bool {
        self.current_block
            .as_ref()
            .map_or(true, |b| b.terminator.is_some())
    }

    /// False when nothing branches to the current block yet, as for the
    /// block opened after a `ret`. Only closed blocks are searched, so a
    /// later branch back to this block is not seen.
    pub fn is_reachable(&self) -> bool {
        let (func, block) = match (&self.current_fn, &self.current_block) {
            (Some(func), Some(block)) => (func, block),
            _ => return false,
        };
        func.blocks.is_empty()
            || func
                .blocks
                .iter()
                .filter_map(|b| b.terminator.as_ref())
                .any(|t| t.successors().contains(&block.id))
    }

    // Instructions

    fn emit(&mut self, result: Option<VReg>, kind: InstrKind) -> Option<VReg> {
        if let Some(block) = &mut self.current_block {
            block.instructions.push(Instruction::new(result, kind));
        }
        result
    }

    fn emit_with_result(&mut self, kind: InstrKind) -> VReg {
        let result = self.fresh_vreg();
        self.emit(Some(result), kind);
        result
    }

    pub fn constant(&mut self, value: Constant, ty: IrType) -> VReg {
        self.emit_with_result(InstrKind::Const(value, ty))
    }

    pub fn const_int(&mut self, value: i64, ty: IrType) -> VReg {
        self.constant(Constant::Int(value), ty)
    }

    pub fn const_bool(&mut self, value: bool) -> VReg {
        self.constant(Constant::Bool(value), IrType::Bool)
    }

    pub fn const_null(&mut self) -> VReg {
        self.constant(Constant::Null, IrType::handle())
    }

    pub fn const_zero(&mut self, ty: IrType) -> VReg {
        self.constant(Constant::Zero, ty)
    }

    pub fn add(&mut self, a: VReg, b: VReg) -> VReg {
        self.emit_with_result(InstrKind::Add(a, b))
    }

    pub fn sub(&mut self, a: VReg, b: VReg) -> VReg {
        self.emit_with_result(InstrKind::Sub(a, b))
    }

    pub fn mul(&mut self, a: VReg, b: VReg) -> VReg {
        self.emit_with_result(InstrKind::Mul(a, b))
    }

    pub fn sdiv(&mut self, a: VReg, b: VReg) -> VReg {
        self.emit_with_result(InstrKind::SDiv(a, b))
    }

    pub fn udiv(&mut self, a: VReg, b: VReg) -> VReg {
        self.emit_with_result(InstrKind::UDiv(a, b))
    }

    pub fn srem(&mut self, a: VReg, b: VReg) -> VReg {
        self.emit_with_result(InstrKind::SRem(a, b))
    }

    pub fn urem(&mut self, a: VReg, b: VReg) -> VReg {
        self.emit_with_result(InstrKind::URem(a, b))
    }

    pub fn neg(&mut self, v: VReg) -> VReg {
        self.emit_with_result(InstrKind::Neg(v))
    }

    pub fn fadd(&mut self, a: VReg, b: VReg) -> VReg {
        self.emit_with_result(InstrKind::FAdd(a, b))
    }

    pub fn fsub(&mut self, a: VReg, b: VReg) -> VReg {
        self.emit_with_result(InstrKind::FSub(a, b))
    }

    pub fn fmul(&mut self, a: VReg, b: VReg) -> VReg {
        self.emit_with_result(InstrKind::FMul(a, b))
    }

    pub fn fdiv(&mut self, a: VReg, b: VReg) -> VReg {
        self.emit_with_result(InstrKind::FDiv(a, b))
    }

    pub fn frem(&mut self, a: VReg, b: VReg) -> VReg {
        self.emit_with_result(InstrKind::FRem(a, b))
    }

    pub fn fneg(&mut self, v: VReg) -> VReg {
        self.emit_with_result(InstrKind::FNeg(v))
    }

    pub fn and(&mut self, a: VReg, b: VReg) -> VReg {
        self.emit_with_result(InstrKind::And(a, b))
    }

    pub fn or(&mut self, a: VReg, b: VReg) -> VReg {
        self.emit_with_result(InstrKind::Or(a, b))
    }

    pub fn xor(&mut self, a: VReg, b: VReg) -> VReg {
        self.emit_with_result(InstrKind::Xor(a, b))
    }

    pub fn shl(&mut self, a: VReg, b: VReg) -> VReg {
        self.emit_with_result(InstrKind::Shl(a, b))
    }

    pub fn ashr(&mut self, a: VReg, b: VReg) -> VReg {
        self.emit_with_result(InstrKind::AShr(a, b))
    }

    pub fn lshr(&mut self, a: VReg, b: VReg) -> VReg {
        self.emit_with_result(InstrKind::LShr(a, b))
    }

    pub fn not(&mut self, v: VReg) -> VReg {
        self.emit_with_result(InstrKind::Not(v))
    }

    pub fn icmp(&mut self, op: CmpOp, a: VReg, b: VReg) -> VReg {
        self.emit_with_result(InstrKind::ICmp(op, a, b))
    }

    pub fn fcmp(&mut self, op: CmpOp, a: VReg, b: VReg) -> VReg {
        self.emit_with_result(InstrKind::FCmp(op, a, b))
    }

    /// Emits a conversion instruction built by `f` from `v` and `ty`.
    pub fn convert(&mut self, f: fn(VReg, IrType) -> InstrKind, v: VReg, ty: IrType) -> VReg {
        self.emit_with_result(f(v, ty))
    }

    pub fn splat(&mut self, v: VReg, ty: IrType) -> VReg {
        self.emit_with_result(InstrKind::Splat(v, ty))
    }

    pub fn build_vector(&mut self, lanes: Vec<VReg>, ty: IrType) -> VReg {
        self.emit_with_result(InstrKind::BuildVector(lanes, ty))
    }

    pub fn extract_element(&mut self, v: VReg, index: u32) -> VReg {
        self.emit_with_result(InstrKind::ExtractElement(v, index))
    }

    pub fn insert_element(&mut self, v: VReg, x: VReg, index: u32) -> VReg {
        self.emit_with_result(InstrKind::InsertElement(v, x, index))
    }

    pub fn shuffle(&mut self, v: VReg, lanes: Vec<u32>) -> VReg {
        self.emit_with_result(InstrKind::Shuffle(v, lanes))
    }

    /// Stack slot in the entry block, ahead of any other instruction.
    pub fn alloca(&mut self, ty: IrType) -> VReg {
        let result = self.fresh_vreg();
        let instr = Instruction::new(Some(result), InstrKind::Alloca(ty));
        let at = self.entry_allocas;
        self.entry_allocas += 1;

        let in_entry = self
            .current_fn
            .as_ref()
            .map_or(true, |f| f.blocks.is_empty());
        if in_entry {
            if let Some(block) = &mut self.current_block {
                block.instructions.insert(at, instr);
            }
        } else if let Some(entry) = self.current_fn.as_mut().and_then(|f| f.blocks.first_mut()) {
            entry.instructions.insert(at, instr);
        }
        result
    }

    pub fn load(&mut self, ptr: VReg, ty: IrType) -> VReg {
        self.emit_with_result(InstrKind::Load(ptr, ty))
    }

    pub fn store(&mut self, ptr: VReg, value: VReg) {
        self.emit(None, InstrKind::Store(ptr, value));
    }

    pub fn get_field_ptr(&mut self, ptr: VReg, index: u32) -> VReg {
        self.emit_with_result(InstrKind::GetFieldPtr(ptr, index))
    }

    pub fn call(&mut self, func: impl Into<String>, args: Vec<VReg>) -> VReg {
        self.emit_with_result(InstrKind::Call {
            func: func.into(),
            args,
        })
    }

    pub fn call_void(&mut self, func: impl Into<String>, args: Vec<VReg>) {
        self.emit(
            None,
            InstrKind::Call {
                func: func.into(),
                args,
            },
        );
    }

    // Terminators. A block keeps its first terminator.

    fn terminate(&mut self, t: Terminator) {
        if let Some(block) = &mut self.current_block {
            if block.terminator.is_none() {
                block.terminator = Some(t);
            }
        }
    }

    pub fn ret(&mut self, value: Option<VReg>) {
        self.terminate(Terminator::Ret(value));
    }

    pub fn br(&mut self, target: BlockId) {
        self.terminate(Terminator::Br(target));
    }

    pub fn cond_br(&mut self, cond: VReg, then_block: BlockId, else_block: BlockId) {
        self.terminate(Terminator::CondBr {
            cond,
            then_block,
            else_block,
        });
    }

    pub fn unreachable(&mut self) {
        self.terminate(Terminator::Unreachable);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_block_falls_through() {
        let mut b = IrBuilder::new("m");
        b.start_function("f", vec![], IrType::Void);
        let next = b.create_block("next");
        b.set_block(next);
        b.ret(None);
        let m = b.finish();

        let f = m.function("f").unwrap();
        assert_eq!(f.blocks.len(), 2);
        assert_eq!(f.blocks[0].terminator, Some(Terminator::Br(next)));
        assert_eq!(f.blocks[1].label.as_deref(), Some("next"));
    }

    #[test]
    fn terminated_block_keeps_terminator() {
        let mut b = IrBuilder::new("m");
        b.start_function("f", vec![], IrType::Void);
        let other = b.create_block("other");
        b.ret(None);
        assert!(b.is_terminated());
        b.br(other);
        b.set_block(other);
        b.ret(None);
        let m = b.finish();
        let f = m.function("f").unwrap();
        assert_eq!(f.blocks[0].terminator, Some(Terminator::Ret(None)));
    }

    #[test]
    fn block_after_ret_is_unreachable() {
        let mut b = IrBuilder::new("m");
        b.start_function("f", vec![], IrType::Void);
        assert!(b.is_reachable());
        let next = b.create_block("next");
        b.br(next);
        b.set_block(next);
        assert!(b.is_reachable());
        b.ret(None);
        let dead = b.create_block("dead");
        b.set_block(dead);
        assert!(!b.is_reachable());
    }

    #[test]
    fn allocas_go_to_entry() {
        let mut b = IrBuilder::new("m");
        b.start_function("f", vec![IrType::I32], IrType::Void);
        let one = b.const_int(1, IrType::I32);
        let body = b.create_block("body");
        b.set_block(body);
        let slot = b.alloca(IrType::I32);
        b.store(slot, one);
        b.ret(None);
        let m = b.finish();

        let entry = m.function("f").unwrap().entry_block().unwrap();
        assert!(matches!(entry.instructions[0].kind, InstrKind::Alloca(IrType::I32)));
        assert_eq!(entry.instructions[0].result, Some(slot));
    }

    #[test]
    fn abandoned_function_is_dropped() {
        let mut b = IrBuilder::new("m");
        b.start_function("bad", vec![], IrType::Void);
        b.abandon_function();
        b.start_function("good", vec![], IrType::Void);
        b.ret(None);
        let m = b.finish();
        assert!(m.function("bad").is_none());
        assert!(m.function("good").is_some());
    }

    #[test]
    fn dump_shape() {
        let mut b = IrBuilder::new("m");
        b.declare_external_vararg("dbrt_print", vec![IrType::handle()], IrType::Void);
        let params = b.start_function("add", vec![IrType::I32, IrType::I32], IrType::I32);
        let sum = b.add(params[0], params[1]);
        b.ret(Some(sum));
        let text = b.finish().to_string();

        assert!(text.contains("declare void @dbrt_print(*i8, ...)"));
        assert!(text.contains("define i32 @add(i32 %0, i32 %1) {"));
        assert!(text.contains("%2 = add %0, %1"));
        assert!(text.contains("ret %2"));
    }
}
