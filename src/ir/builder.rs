//! Fluent construction of IR functions.
//!
//! Front-end adapters and tests assemble function bodies through this
//! builder; it keeps referrer lists and block edges consistent so the
//! lifter's preconditions hold by construction.

use crate::lang::Type;

use super::{
    dominance, BlockSet, Const, ConstKind, Function, InstrId, InstrKind, Param, Value,
};

/// Builder for one [`Function`].
#[derive(Debug)]
pub struct FunctionBuilder {
    f: Function,
    fake_exits: Vec<usize>,
}

impl FunctionBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            f: Function::new(name),
            fake_exits: Vec::new(),
        }
    }

    /// Append a new basic block and return its index.
    pub fn block(&mut self) -> usize {
        self.f.add_block()
    }

    /// Add a CFG edge without emitting a terminator.
    pub fn edge(&mut self, from: usize, to: usize) {
        self.f.add_edge(from, to);
    }

    pub fn set_exit(&mut self, b: usize) {
        self.f.exit = Some(b);
    }

    /// Declare `b` as possibly terminating the function abnormally.
    pub fn fake_exit(&mut self, b: usize) {
        self.fake_exits.push(b);
    }

    pub fn set_has_defer(&mut self) {
        self.f.has_defer = true;
    }

    pub fn param(&mut self, name: impl Into<String>, ty: Type) -> Value {
        self.f.params.push(Param {
            name: name.into(),
            ty,
        });
        Value::Param(self.f.params.len() as u32 - 1)
    }

    pub fn int_const(&mut self, v: i64) -> Value {
        let id = self.f.emit_const(Const {
            ty: Type::Basic("int".into()),
            kind: ConstKind::Int(v),
        });
        Value::Const(id)
    }

    pub fn builtin(&mut self, name: impl Into<String>) -> Value {
        let id = self.f.emit_const(Const {
            ty: Type::Basic("func".into()),
            kind: ConstKind::Builtin(name.into()),
        });
        Value::Const(id)
    }

    /// Allocate a local cell of element type `elem`, registered in
    /// `Function::locals`.
    pub fn alloc(&mut self, block: usize, elem: Type, name: impl Into<String>) -> InstrId {
        let id = self.f.append_instr(
            block,
            InstrKind::Alloc {
                heap: false,
                index: -1,
            },
            Some(Type::Pointer(Box::new(elem))),
        );
        self.f.instr_mut(id).name = Some(name.into());
        self.f.locals.push(id);
        id
    }

    /// Register an existing cell as backing a named result.
    pub fn mark_result(&mut self, alloc: InstrId) {
        self.f.results.push(alloc);
    }

    /// Register an existing cell as the function's deferstack.
    pub fn mark_deferstack(&mut self, alloc: InstrId) {
        self.f.deferstack = Some(alloc);
    }

    pub fn store(&mut self, block: usize, addr: Value, val: Value) -> InstrId {
        self.f
            .append_instr(block, InstrKind::Store { addr, val }, None)
    }

    pub fn load(&mut self, block: usize, addr: Value) -> InstrId {
        let ty = self.f.value_type(addr).deref();
        self.f
            .append_instr(block, InstrKind::Load { addr }, Some(ty))
    }

    /// Emit a φ with one edge per predecessor. The front-end uses these for
    /// short-circuit operators; the lifter pins them live.
    pub fn phi(&mut self, block: usize, edges: Vec<Value>) -> InstrId {
        let ty = edges
            .first()
            .map(|v| self.f.value_type(*v))
            .unwrap_or(Type::Basic("int".into()));
        self.f.append_instr(
            block,
            InstrKind::Phi {
                edges: edges.into_iter().map(Some).collect(),
            },
            Some(ty),
        )
    }

    pub fn debug_ref(&mut self, block: usize, x: Value, is_addr: bool) -> InstrId {
        self.f
            .append_instr(block, InstrKind::DebugRef { x, is_addr }, None)
    }

    pub fn defer_instr(&mut self, block: usize, deferstack: Option<Value>) -> InstrId {
        self.f
            .append_instr(block, InstrKind::Defer { deferstack }, None)
    }

    pub fn run_defers(&mut self, block: usize) -> InstrId {
        self.f.blocks[block].rundefers += 1;
        self.f.append_instr(block, InstrKind::RunDefers, None)
    }

    pub fn call(&mut self, block: usize, func: Value, args: Vec<Value>, ty: Type) -> InstrId {
        self.f
            .append_instr(block, InstrKind::Call { func, args }, Some(ty))
    }

    pub fn composite(&mut self, block: usize, ty: Type, values: Vec<Value>) -> InstrId {
        self.f
            .append_instr(block, InstrKind::CompositeValue { values }, Some(ty))
    }

    pub fn field_addr(&mut self, block: usize, x: Value, field: usize, ty: Type) -> InstrId {
        self.f
            .append_instr(block, InstrKind::FieldAddr { x, field }, Some(ty))
    }

    pub fn index_addr(&mut self, block: usize, x: Value, index: Value, ty: Type) -> InstrId {
        self.f
            .append_instr(block, InstrKind::IndexAddr { x, index }, Some(ty))
    }

    pub fn type_assert(&mut self, block: usize, x: Value, ty: Type) -> InstrId {
        self.f
            .append_instr(block, InstrKind::TypeAssert { x }, Some(ty))
    }

    /// An instruction the lifter treats as opaque.
    pub fn other(&mut self, block: usize, operands: Vec<Value>) -> InstrId {
        self.f
            .append_instr(block, InstrKind::Other { operands }, None)
    }

    /// Emit a jump terminator and the matching edge.
    pub fn jump(&mut self, from: usize, to: usize) -> InstrId {
        let id = self.f.append_instr(from, InstrKind::Jump, None);
        self.edge(from, to);
        id
    }

    /// Emit a conditional branch terminator; the true edge precedes the
    /// false edge in successor order.
    pub fn cond_br(&mut self, from: usize, cond: Value, then_to: usize, else_to: usize) -> InstrId {
        let id = self.f.append_instr(from, InstrKind::If { cond }, None);
        self.edge(from, then_to);
        self.edge(from, else_to);
        id
    }

    pub fn ret(&mut self, block: usize, results: Vec<Value>) -> InstrId {
        self.f
            .append_instr(block, InstrKind::Return { results }, None)
    }

    /// Finalize the function: freeze fake exits and compute both dominator
    /// trees.
    pub fn finish(mut self) -> Function {
        let mut fe = BlockSet::new(self.f.blocks.len());
        for b in self.fake_exits {
            fe.add(b);
        }
        self.f.fake_exits = fe;
        dominance::build_dom_tree(&mut self.f);
        dominance::build_post_dom_tree(&mut self.f);
        self.f
    }
}
