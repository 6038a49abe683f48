//! Mid-level intermediate representation of function bodies.
//!
//! The IR graph is cyclic (blocks reference instructions, instructions
//! reference values, values list their users), so everything lives in
//! per-function arenas addressed by stable 32-bit handles. Instruction
//! slots inside a block may hold a tombstone (`None`) while a pass is
//! running; compaction drops them.

pub mod block_set;
pub mod builder;
pub mod closure;
pub mod dominance;
pub mod fold;
pub mod lift;
pub mod refine;

pub use block_set::BlockSet;
pub use builder::FunctionBuilder;

use crate::lang::Type;

/// A dense map keyed by basic-block index.
pub type BlockMap<T> = Vec<T>;

/// Handle of an instruction in a function's pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstrId(pub u32);

/// Handle of a constant in a function's constant pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConstId(pub u32);

/// An IR value: an instruction result, a constant, or a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Value {
    Instr(InstrId),
    Const(ConstId),
    Param(u32),
}

/// Information a `Copy` pseudo-instruction attaches to a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyInfo(u8);

impl CopyInfo {
    pub const UNSPECIFIED: CopyInfo = CopyInfo(0);
    pub const NOT_NIL: CopyInfo = CopyInfo(1);
    pub const NOT_NEGATIVE: CopyInfo = CopyInfo(1 << 1);
    pub const SINGLE_CONCRETE_TYPE: CopyInfo = CopyInfo(1 << 2);
    pub const CLOSED: CopyInfo = CopyInfo(1 << 3);

    pub fn contains(self, other: CopyInfo) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for CopyInfo {
    type Output = CopyInfo;
    fn bitor(self, rhs: CopyInfo) -> CopyInfo {
        CopyInfo(self.0 | rhs.0)
    }
}

/// The operation an instruction performs.
#[derive(Debug, Clone, PartialEq)]
pub enum InstrKind {
    /// A local storage cell. `index` is the dense liftable number, or -1
    /// when the cell is not liftable.
    Alloc { heap: bool, index: i32 },
    Store { addr: Value, val: Value },
    Load { addr: Value },
    /// One incoming value per predecessor, in predecessor order. Edges are
    /// `None` only while the lifter is placing nodes; in finished IR every
    /// edge is filled.
    Phi { edges: Vec<Option<Value>> },
    /// Placed at the entry of a block; `from` records the predecessor the
    /// value arrived from.
    Sigma { from: usize, x: Value },
    DebugRef { x: Value, is_addr: bool },
    Defer { deferstack: Option<Value> },
    RunDefers,
    /// Pseudo-instruction recording refined information about `x` gained by
    /// executing `why`.
    Copy {
        x: Value,
        why: InstrId,
        info: CopyInfo,
    },
    CompositeValue { values: Vec<Value> },
    FieldAddr { x: Value, field: usize },
    IndexAddr { x: Value, index: Value },
    TypeAssert { x: Value },
    MapUpdate { map: Value, key: Value, value: Value },
    Call { func: Value, args: Vec<Value> },
    Recv { chan: Value },
    Send { chan: Value, x: Value },
    Slice {
        x: Value,
        low: Option<Value>,
        high: Option<Value>,
        max: Option<Value>,
    },
    StringLookup { x: Value, index: Value },
    Jump,
    If { cond: Value },
    Return { results: Vec<Value> },
    /// An operation the lifter treats as opaque.
    Other { operands: Vec<Value> },
}

impl InstrKind {
    /// The values this instruction uses.
    pub fn operands(&self) -> Vec<Value> {
        let mut out = Vec::new();
        self.for_operands(|v| out.push(*v));
        out
    }

    fn for_operands(&self, mut f: impl FnMut(&Value)) {
        match self {
            InstrKind::Alloc { .. } | InstrKind::RunDefers | InstrKind::Jump => {}
            InstrKind::Store { addr, val } => {
                f(addr);
                f(val);
            }
            InstrKind::Load { addr } => f(addr),
            InstrKind::Phi { edges } => edges.iter().flatten().for_each(f),
            InstrKind::Sigma { x, .. } => f(x),
            InstrKind::DebugRef { x, .. } => f(x),
            InstrKind::Defer { deferstack } => {
                if let Some(ds) = deferstack {
                    f(ds);
                }
            }
            InstrKind::Copy { x, .. } => f(x),
            InstrKind::CompositeValue { values } => values.iter().for_each(f),
            InstrKind::FieldAddr { x, .. } => f(x),
            InstrKind::IndexAddr { x, index } => {
                f(x);
                f(index);
            }
            InstrKind::TypeAssert { x } => f(x),
            InstrKind::MapUpdate { map, key, value } => {
                f(map);
                f(key);
                f(value);
            }
            InstrKind::Call { func, args } => {
                f(func);
                args.iter().for_each(f);
            }
            InstrKind::Recv { chan } => f(chan),
            InstrKind::Send { chan, x } => {
                f(chan);
                f(x);
            }
            InstrKind::Slice { x, low, high, max } => {
                f(x);
                [low, high, max].into_iter().flatten().for_each(f);
            }
            InstrKind::StringLookup { x, index } => {
                f(x);
                f(index);
            }
            InstrKind::If { cond } => f(cond),
            InstrKind::Return { results } => results.iter().for_each(f),
            InstrKind::Other { operands } => operands.iter().for_each(f),
        }
    }

    /// Mutable access to every operand slot.
    pub fn operands_mut(&mut self) -> Vec<&mut Value> {
        let mut out = Vec::new();
        match self {
            InstrKind::Alloc { .. } | InstrKind::RunDefers | InstrKind::Jump => {}
            InstrKind::Store { addr, val } => {
                out.push(addr);
                out.push(val);
            }
            InstrKind::Load { addr } => out.push(addr),
            InstrKind::Phi { edges } => out.extend(edges.iter_mut().flatten()),
            InstrKind::Sigma { x, .. } => out.push(x),
            InstrKind::DebugRef { x, .. } => out.push(x),
            InstrKind::Defer { deferstack } => {
                if let Some(ds) = deferstack {
                    out.push(ds);
                }
            }
            InstrKind::Copy { x, .. } => out.push(x),
            InstrKind::CompositeValue { values } => out.extend(values.iter_mut()),
            InstrKind::FieldAddr { x, .. } => out.push(x),
            InstrKind::IndexAddr { x, index } => {
                out.push(x);
                out.push(index);
            }
            InstrKind::TypeAssert { x } => out.push(x),
            InstrKind::MapUpdate { map, key, value } => {
                out.push(map);
                out.push(key);
                out.push(value);
            }
            InstrKind::Call { func, args } => {
                out.push(func);
                out.extend(args.iter_mut());
            }
            InstrKind::Recv { chan } => out.push(chan),
            InstrKind::Send { chan, x } => {
                out.push(chan);
                out.push(x);
            }
            InstrKind::Slice { x, low, high, max } => {
                out.push(x);
                out.extend([low, high, max].into_iter().flatten());
            }
            InstrKind::StringLookup { x, index } => {
                out.push(x);
                out.push(index);
            }
            InstrKind::If { cond } => out.push(cond),
            InstrKind::Return { results } => out.extend(results.iter_mut()),
            InstrKind::Other { operands } => out.extend(operands.iter_mut()),
        }
        out
    }
}

/// An instruction record in the pool.
#[derive(Debug, Clone)]
pub struct Instr {
    pub kind: InstrKind,
    /// The block holding the instruction; `None` for detached or discarded
    /// nodes.
    pub block: Option<usize>,
    /// Result type, for value-producing instructions.
    pub ty: Option<Type>,
    /// Per-block dense position, assigned by `number_instrs_per_block`.
    pub id: u32,
    /// Instructions using this instruction's result.
    pub referrers: Vec<InstrId>,
    /// Liveness scratch bit used by the lifter.
    pub live: bool,
    /// Name of the source-level entity, if any.
    pub name: Option<String>,
}

/// A constant in a function's pool.
#[derive(Debug, Clone, PartialEq)]
pub struct Const {
    pub ty: Type,
    pub kind: ConstKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConstKind {
    /// The zero value of the constant's type.
    Zero,
    Int(i64),
    Str(String),
    Bool(bool),
    /// A universe-scope builtin function, usable as a callee.
    Builtin(String),
    /// An aggregate of other constants, produced by composite folding.
    Aggregate(Vec<ConstId>),
}

/// A function parameter.
#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub ty: Type,
}

/// Dominator-tree node attached to each block.
#[derive(Debug, Clone, Default)]
pub struct DomNode {
    pub idom: Option<usize>,
    pub children: Vec<usize>,
    /// Preorder/postorder numbering for O(1) dominance queries.
    pub pre: u32,
    pub post: u32,
}

/// A basic block. `index` equals its position in `Function::blocks`.
#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub index: usize,
    pub preds: Vec<usize>,
    pub succs: Vec<usize>,
    /// Instruction slots; `None` is a tombstone awaiting compaction.
    pub instrs: Vec<Option<InstrId>>,
    /// Number of tombstones in `instrs`.
    pub gaps: usize,
    /// Number of `RunDefers` instructions in the block.
    pub rundefers: usize,
    pub dom: DomNode,
    pub pdom: DomNode,
}

impl BasicBlock {
    fn new(index: usize) -> Self {
        Self {
            index,
            preds: Vec::new(),
            succs: Vec::new(),
            instrs: Vec::new(),
            gaps: 0,
            rundefers: 0,
            dom: DomNode::default(),
            pdom: DomNode::default(),
        }
    }

    /// Position of `succ` in this block's successor list.
    pub fn succ_index(&self, succ: usize) -> Option<usize> {
        self.succs.iter().position(|&s| s == succ)
    }

    /// Position of `pred` in this block's predecessor list.
    pub fn pred_index(&self, pred: usize) -> Option<usize> {
        self.preds.iter().position(|&p| p == pred)
    }
}

/// A function body owning its blocks, instruction pool, and constants.
#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub blocks: Vec<BasicBlock>,
    /// The canonical exit block, if the body can return.
    pub exit: Option<usize>,
    /// Blocks that may terminate the function abnormally; they act as extra
    /// predecessors of the exit for post-dominance.
    pub fake_exits: BlockSet,
    pub params: Vec<Param>,
    /// Alloc instructions backing source-level locals.
    pub locals: Vec<InstrId>,
    /// Alloc instructions backing named results.
    pub results: Vec<InstrId>,
    /// Whether the function contains `defer` statements at the source
    /// level and may therefore recover.
    pub has_defer: bool,
    /// The deferstack cell, when the front-end materialized one.
    pub deferstack: Option<InstrId>,

    pool: Vec<Instr>,
    consts: Vec<Const>,
}

impl Function {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            blocks: Vec::new(),
            exit: None,
            fake_exits: BlockSet::new(0),
            params: Vec::new(),
            locals: Vec::new(),
            results: Vec::new(),
            has_defer: false,
            deferstack: None,
            pool: Vec::new(),
            consts: Vec::new(),
        }
    }

    pub fn add_block(&mut self) -> usize {
        let index = self.blocks.len();
        self.blocks.push(BasicBlock::new(index));
        index
    }

    /// Declare `b` as a block that may terminate the function abnormally.
    pub fn mark_fake_exit(&mut self, b: usize) {
        let mut fe = BlockSet::new(self.blocks.len());
        for i in 0..self.blocks.len() {
            if self.fake_exits.has(i) {
                fe.add(i);
            }
        }
        fe.add(b);
        self.fake_exits = fe;
    }

    /// Add a CFG edge.
    pub fn add_edge(&mut self, from: usize, to: usize) {
        self.blocks[from].succs.push(to);
        self.blocks[to].preds.push(from);
    }

    pub fn instr(&self, id: InstrId) -> &Instr {
        &self.pool[id.0 as usize]
    }

    pub fn instr_mut(&mut self, id: InstrId) -> &mut Instr {
        &mut self.pool[id.0 as usize]
    }

    pub fn constant(&self, id: ConstId) -> &Const {
        &self.consts[id.0 as usize]
    }

    /// Create a detached instruction.
    pub fn new_instr(&mut self, kind: InstrKind, ty: Option<Type>) -> InstrId {
        let id = InstrId(self.pool.len() as u32);
        self.pool.push(Instr {
            kind,
            block: None,
            ty,
            id: 0,
            referrers: Vec::new(),
            live: false,
            name: None,
        });
        id
    }

    /// Create an instruction and append it to `block`.
    pub fn append_instr(&mut self, block: usize, kind: InstrKind, ty: Option<Type>) -> InstrId {
        let id = self.new_instr(kind, ty);
        self.pool[id.0 as usize].block = Some(block);
        self.blocks[block].instrs.push(Some(id));
        self.update_operand_referrers(id);
        id
    }

    /// Intern a constant.
    pub fn emit_const(&mut self, c: Const) -> ConstId {
        if let Some(i) = self.consts.iter().position(|e| *e == c) {
            return ConstId(i as u32);
        }
        let id = ConstId(self.consts.len() as u32);
        self.consts.push(c);
        id
    }

    /// Result type of a value.
    pub fn value_type(&self, v: Value) -> Type {
        match v {
            Value::Instr(id) => self
                .instr(id)
                .ty
                .clone()
                .expect("value instruction without a type"),
            Value::Const(id) => self.constant(id).ty.clone(),
            Value::Param(i) => self.params[i as usize].ty.clone(),
        }
    }

    /// The referrer list of a value, if it tracks one. Only instruction
    /// results do; constants and parameters return `None`.
    pub fn referrers(&self, v: Value) -> Option<&Vec<InstrId>> {
        match v {
            Value::Instr(id) => Some(&self.instr(id).referrers),
            _ => None,
        }
    }

    pub fn add_referrer(&mut self, v: Value, user: InstrId) {
        if let Value::Instr(id) = v {
            self.pool[id.0 as usize].referrers.push(user);
        }
    }

    pub fn remove_referrer(&mut self, v: Value, user: InstrId) {
        if let Value::Instr(id) = v {
            self.pool[id.0 as usize].referrers.retain(|&r| r != user);
        }
    }

    /// Register `user` in the referrer list of each of its operands.
    pub fn update_operand_referrers(&mut self, user: InstrId) {
        for op in self.pool[user.0 as usize].kind.operands() {
            self.add_referrer(op, user);
        }
    }

    /// Replace all intraprocedural uses of `x` with `y`, updating referrer
    /// lists on both sides. `x` must be an instruction result.
    pub fn replace_all(&mut self, x: Value, y: Value) {
        let Value::Instr(xid) = x else {
            panic!("replace_all on a value without referrers");
        };
        let users = std::mem::take(&mut self.pool[xid.0 as usize].referrers);
        for user in &users {
            for slot in self.pool[user.0 as usize].kind.operands_mut() {
                if *slot == x {
                    *slot = y;
                }
            }
            // Duplicate referrer entries are fine.
            self.add_referrer(y, *user);
        }
    }

    /// Rewrite occurrences of `x` among `user`'s operands to `y`, keeping
    /// referrer lists consistent.
    pub fn replace(&mut self, user: InstrId, x: Value, y: Value) {
        let mut matched = false;
        for slot in self.pool[user.0 as usize].kind.operands_mut() {
            if *slot == x {
                *slot = y;
                matched = true;
            }
        }
        if matched {
            self.add_referrer(y, user);
            self.remove_referrer(x, user);
        }
    }

    /// Whether block `a` dominates block `b`.
    pub fn dominates(&self, a: usize, b: usize) -> bool {
        let an = &self.blocks[a].dom;
        let bn = &self.blocks[b].dom;
        an.pre <= bn.pre && bn.post <= an.post
    }

    /// Assign dense per-block instruction numbers, skipping tombstones.
    pub fn number_instrs_per_block(&mut self) {
        for b in 0..self.blocks.len() {
            let mut base = 0u32;
            for slot in self.blocks[b].instrs.clone() {
                if let Some(id) = slot {
                    self.pool[id.0 as usize].id = base;
                    base += 1;
                }
            }
        }
    }

    /// Verify the structural invariants that hold after lifting. Intended
    /// for tests; panics on violation.
    pub fn invariant_check(&self) {
        let mut positions = std::collections::HashSet::new();
        for block in &self.blocks {
            for (pos, slot) in block.instrs.iter().enumerate() {
                let Some(id) = slot else { continue };
                assert!(
                    positions.insert(*id),
                    "instruction {:?} appears in more than one live slot",
                    id
                );
                let instr = self.instr(*id);
                assert_eq!(
                    instr.block,
                    Some(block.index),
                    "instruction {:?} placed in block {} but claims {:?}",
                    id,
                    block.index,
                    instr.block
                );
                match &instr.kind {
                    InstrKind::Phi { edges } => {
                        assert_eq!(
                            edges.len(),
                            block.preds.len(),
                            "phi {:?} has {} edges for {} predecessors",
                            id,
                            edges.len(),
                            block.preds.len()
                        );
                        for (i, edge) in edges.iter().enumerate() {
                            let edge = edge.unwrap_or_else(|| {
                                panic!("phi {:?} left edge {} unfilled", id, i)
                            });
                            if let Some(refs) = self.referrers(edge) {
                                assert!(
                                    refs.contains(id),
                                    "phi {:?} missing from referrers of edge {}",
                                    id,
                                    i
                                );
                            }
                        }
                    }
                    InstrKind::Sigma { from, x } => {
                        assert!(
                            self.blocks[*from].succs.contains(&block.index),
                            "sigma {:?} in block {} claims unrelated source block {}",
                            id,
                            block.index,
                            from
                        );
                        if let Some(refs) = self.referrers(*x) {
                            assert!(
                                refs.contains(id),
                                "sigma {:?} missing from referrers of its operand",
                                id
                            );
                        }
                    }
                    InstrKind::Load { addr } => {
                        if let Value::Instr(a) = addr {
                            if let InstrKind::Alloc { index, .. } = self.instr(*a).kind {
                                assert_eq!(
                                    index, -1,
                                    "load {:?} reads lifted cell {:?} at {}",
                                    id, a, pos
                                );
                            }
                        }
                    }
                    InstrKind::Store { addr, .. } => {
                        if let Value::Instr(a) = addr {
                            if let InstrKind::Alloc { index, .. } = self.instr(*a).kind {
                                assert_eq!(
                                    index, -1,
                                    "store {:?} writes lifted cell {:?} at {}",
                                    id, a, pos
                                );
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
        for local in &self.locals {
            if let InstrKind::Alloc { index, .. } = self.instr(*local).kind {
                assert_eq!(index, -1, "lifted cell {:?} still registered as local", local);
            }
        }
        let has_defer_instr = self.blocks.iter().flat_map(|b| b.instrs.iter()).any(|s| {
            s.map_or(false, |id| {
                matches!(self.instr(id).kind, InstrKind::Defer { .. })
            })
        });
        if !has_defer_instr {
            let has_rundefers = self.blocks.iter().flat_map(|b| b.instrs.iter()).any(|s| {
                s.map_or(false, |id| matches!(self.instr(id).kind, InstrKind::RunDefers))
            });
            assert!(
                !has_rundefers,
                "function without defers still contains rundefers"
            );
        }
    }
}
