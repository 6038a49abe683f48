//! Information refinement.
//!
//! A second dominator-tree preorder that records what executing an
//! instruction reveals about its operands: a dereferenced pointer is not
//! null past the dereference, an index is not negative, an asserted value
//! has a single concrete type, a closed channel is closed. The facts are
//! materialized as `Copy` pseudo-instructions inserted right after the
//! instruction that justifies them, and later uses in dominated code are
//! renamed onto the copies.

use std::collections::HashMap;

use super::{ConstKind, CopyInfo, Function, InstrId, InstrKind, Value};

/// A scoped value-to-value renaming. Each frame records enough to restore
/// the previous mapping on pop.
#[derive(Debug, Default)]
struct StackMap {
    frames: Vec<Vec<(Value, Option<Value>)>>,
    map: HashMap<Value, Value>,
}

impl StackMap {
    fn push(&mut self) {
        self.frames.push(Vec::new());
    }

    fn pop(&mut self) {
        let frame = self.frames.pop().expect("unbalanced StackMap pop");
        for (k, prev) in frame.into_iter().rev() {
            match prev {
                Some(p) => {
                    self.map.insert(k, p);
                }
                None => {
                    self.map.remove(&k);
                }
            }
        }
    }

    fn set(&mut self, k: Value, v: Value) {
        let prev = self.map.insert(k, v);
        self.frames
            .last_mut()
            .expect("StackMap set outside any frame")
            .push((k, prev));
    }

    fn get(&self, k: Value) -> Option<Value> {
        self.map.get(&k).copied()
    }
}

/// The innermost non-renamed value `v` maps to, with path compression so
/// repeated queries stay cheap.
fn replacement(renaming: &mut StackMap, v: Value) -> Option<Value> {
    let mut r = renaming.get(v)?;
    loop {
        match renaming.get(r) {
            Some(rr) => r = rr,
            None => {
                renaming.set(v, r);
                return Some(r);
            }
        }
    }
}

/// Whether `v` is already known to carry `info`, so a copy would add
/// nothing.
fn has_info(fn_: &Function, v: Value, info: CopyInfo) -> bool {
    match v {
        Value::Instr(id) => match &fn_.instr(id).kind {
            InstrKind::Copy { x, info: have, .. } => {
                have.contains(info) || has_info(fn_, *x, info)
            }
            InstrKind::FieldAddr { .. }
            | InstrKind::IndexAddr { .. }
            | InstrKind::TypeAssert { .. }
            | InstrKind::Alloc { .. } => info == CopyInfo::NOT_NIL,
            InstrKind::Sigma { x, .. } => has_info(fn_, *x, info),
            _ => false,
        },
        Value::Const(id) => {
            matches!(fn_.constant(id).kind, ConstKind::Builtin(_)) && info == CopyInfo::NOT_NIL
        }
        Value::Param(_) => false,
    }
}

/// Insert a copy of `v` carrying `info` right after position `i` in block
/// `u`, and rename dominated uses of `v` onto it.
fn rename_value(
    fn_: &mut Function,
    renaming: &mut StackMap,
    u: usize,
    v: Value,
    why: InstrId,
    info: CopyInfo,
    i: usize,
) {
    let ty = fn_.value_type(v);
    let copy = fn_.new_instr(InstrKind::Copy { x: v, why, info }, Some(ty));
    fn_.instr_mut(copy).block = Some(u);
    fn_.add_referrer(v, copy);
    renaming.set(v, Value::Instr(copy));
    fn_.blocks[u].instrs.insert(i + 1, Some(copy));
}

/// Run the refinement subpass over the whole function.
pub fn refine(fn_: &mut Function) {
    if fn_.blocks.is_empty() {
        return;
    }
    let mut renaming = StackMap::default();
    split_on_new_information(fn_, 0, &mut renaming);
}

fn split_on_new_information(fn_: &mut Function, u: usize, renaming: &mut StackMap) {
    renaming.push();

    let mut i = 0;
    while i < fn_.blocks[u].instrs.len() {
        let Some(id) = fn_.blocks[u].instrs[i] else {
            i += 1;
            continue;
        };

        // Redirect operands to their refined copies first.
        for op in fn_.instr(id).kind.operands() {
            if let Some(r) = replacement(renaming, op) {
                fn_.replace(id, op, r);
            }
        }

        match fn_.instr(id).kind.clone() {
            InstrKind::IndexAddr { x, index } => {
                // Renamed even when information already exists: the
                // combination of base and index can be unique.
                rename_value(fn_, renaming, u, index, id, CopyInfo::NOT_NEGATIVE, i);
                rename_value(fn_, renaming, u, x, id, CopyInfo::NOT_NIL, i);
                i += 2;
            }
            InstrKind::FieldAddr { x, .. } => {
                if !has_info(fn_, x, CopyInfo::NOT_NIL) {
                    rename_value(fn_, renaming, u, x, id, CopyInfo::NOT_NIL, i);
                    i += 1;
                }
            }
            InstrKind::TypeAssert { x } => {
                // A second assertion on an already asserted value can't
                // reveal a new concrete type.
                let info = CopyInfo::NOT_NIL | CopyInfo::SINGLE_CONCRETE_TYPE;
                if !has_info(fn_, x, info) {
                    rename_value(fn_, renaming, u, x, id, info, i);
                    i += 1;
                }
            }
            InstrKind::Load { addr } => {
                if !has_info(fn_, addr, CopyInfo::NOT_NIL) {
                    rename_value(fn_, renaming, u, addr, id, CopyInfo::NOT_NIL, i);
                    i += 1;
                }
            }
            InstrKind::Store { addr, .. } => {
                if !has_info(fn_, addr, CopyInfo::NOT_NIL) {
                    rename_value(fn_, renaming, u, addr, id, CopyInfo::NOT_NIL, i);
                    i += 1;
                }
            }
            InstrKind::MapUpdate { map, .. } => {
                if !has_info(fn_, map, CopyInfo::NOT_NIL) {
                    rename_value(fn_, renaming, u, map, id, CopyInfo::NOT_NIL, i);
                    i += 1;
                }
            }
            InstrKind::Call { func, args } => {
                let mut off = 0;
                if !has_info(fn_, func, CopyInfo::NOT_NIL) {
                    rename_value(fn_, renaming, u, func, id, CopyInfo::NOT_NIL, i);
                    off += 1;
                }
                if let Value::Const(c) = func {
                    if matches!(&fn_.constant(c).kind, ConstKind::Builtin(name) if name == "close")
                    {
                        let arg = args[0];
                        let info = CopyInfo::NOT_NIL | CopyInfo::CLOSED;
                        if !has_info(fn_, arg, info) {
                            rename_value(fn_, renaming, u, arg, id, info, i);
                            off += 1;
                        }
                    }
                }
                i += off;
            }
            InstrKind::Recv { chan } => {
                // Receiving from a nil channel never completes.
                if !has_info(fn_, chan, CopyInfo::NOT_NIL) {
                    rename_value(fn_, renaming, u, chan, id, CopyInfo::NOT_NIL, i);
                    i += 1;
                }
            }
            InstrKind::Send { chan, .. } => {
                // Sending to a nil channel never completes; whether it is
                // closed is not knowable locally.
                if !has_info(fn_, chan, CopyInfo::NOT_NIL) {
                    rename_value(fn_, renaming, u, chan, id, CopyInfo::NOT_NIL, i);
                    i += 1;
                }
            }
            InstrKind::Slice { x, low, high, max } => {
                let mut off = 0;
                if low.is_none() && high.is_none() && max.is_none() {
                    // With no bounds we only learn the base was not nil.
                    if !has_info(fn_, x, CopyInfo::NOT_NIL) {
                        rename_value(fn_, renaming, u, x, id, CopyInfo::UNSPECIFIED, i);
                        off += 1;
                    }
                } else {
                    rename_value(fn_, renaming, u, x, id, CopyInfo::UNSPECIFIED, i);
                    off += 1;
                }
                // Bounds are copied even when known non-negative, to hang
                // numeric ranges off them.
                for bound in [low, high, max].into_iter().flatten() {
                    rename_value(fn_, renaming, u, bound, id, CopyInfo::NOT_NEGATIVE, i);
                    off += 1;
                }
                i += off;
            }
            InstrKind::StringLookup { x, index } => {
                rename_value(fn_, renaming, u, x, id, CopyInfo::UNSPECIFIED, i);
                rename_value(fn_, renaming, u, index, id, CopyInfo::NOT_NEGATIVE, i);
                i += 2;
            }
            _ => {}
        }

        i += 1;
    }

    for v in fn_.blocks[u].dom.children.clone() {
        split_on_new_information(fn_, v, renaming);
    }

    renaming.pop();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::FunctionBuilder;
    use crate::lang::Type;

    #[test]
    fn test_load_gains_not_nil() {
        let mut b = FunctionBuilder::new("f");
        let entry = b.block();
        let p = b.param("p", Type::Pointer(Box::new(Type::Basic("int".into()))));
        let first = b.load(entry, p);
        let second = b.load(entry, p);
        b.ret(entry, vec![]);
        let mut f = b.finish();

        refine(&mut f);

        // One copy after the first load; the second load reads through it
        // and gains nothing new.
        let instrs: Vec<_> = f.blocks[0].instrs.iter().flatten().copied().collect();
        let copies: Vec<_> = instrs
            .iter()
            .filter(|&&id| matches!(f.instr(id).kind, InstrKind::Copy { .. }))
            .collect();
        assert_eq!(copies.len(), 1);
        let InstrKind::Copy { x, why, info } = f.instr(*copies[0]).kind else {
            unreachable!()
        };
        assert_eq!(x, p);
        assert_eq!(why, first);
        assert!(info.contains(CopyInfo::NOT_NIL));
        let InstrKind::Load { addr } = f.instr(second).kind else {
            unreachable!()
        };
        assert_eq!(addr, Value::Instr(*copies[0]));
    }

    #[test]
    fn test_index_addr_refines_base_and_index() {
        let mut b = FunctionBuilder::new("f");
        let entry = b.block();
        let base = b.param("xs", Type::Slice(Box::new(Type::Basic("int".into()))));
        let idx = b.param("i", Type::Basic("int".into()));
        b.index_addr(
            entry,
            base,
            idx,
            Type::Pointer(Box::new(Type::Basic("int".into()))),
        );
        b.ret(entry, vec![]);
        let mut f = b.finish();

        refine(&mut f);

        let instrs: Vec<_> = f.blocks[0].instrs.iter().flatten().copied().collect();
        // index_addr, copy of base, copy of index, return
        assert_eq!(instrs.len(), 4);
        let InstrKind::Copy { info: base_info, .. } = f.instr(instrs[1]).kind else {
            unreachable!()
        };
        let InstrKind::Copy { info: idx_info, .. } = f.instr(instrs[2]).kind else {
            unreachable!()
        };
        assert!(base_info.contains(CopyInfo::NOT_NIL));
        assert!(idx_info.contains(CopyInfo::NOT_NEGATIVE));
    }

    #[test]
    fn test_stack_map_scoping() {
        let mut sm = StackMap::default();
        let a = Value::Param(0);
        let b = Value::Param(1);
        sm.push();
        sm.set(a, b);
        sm.push();
        let c = Value::Param(2);
        sm.set(a, c);
        assert_eq!(sm.get(a), Some(c));
        sm.pop();
        assert_eq!(sm.get(a), Some(b));
        sm.pop();
        assert_eq!(sm.get(a), None);
    }
}
