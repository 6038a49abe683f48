//! Constant composite folding.
//!
//! A `CompositeValue` whose operands are all constants is itself a
//! constant; folding it into an aggregate constant lets other passes see
//! through it. Callers iterate this with their other passes until nothing
//! changes.

use super::{Const, ConstId, ConstKind, Function, InstrId, InstrKind, Value};

/// Fold all-constant composites, returning whether anything changed.
pub fn fold_composites(fn_: &mut Function) -> bool {
    let mut changed = false;

    for b in 0..fn_.blocks.len() {
        let slots = std::mem::take(&mut fn_.blocks[b].instrs);
        let mut kept = Vec::with_capacity(slots.len());
        for slot in slots {
            let Some(id) = slot else { continue };
            let mut replaced = false;

            if let InstrKind::CompositeValue { values } = fn_.instr(id).kind.clone() {
                let consts: Option<Vec<ConstId>> = values
                    .iter()
                    .map(|v| match v {
                        Value::Const(c) => Some(*c),
                        _ => None,
                    })
                    .collect();
                if let Some(values) = consts {
                    let ty = fn_
                        .instr(id)
                        .ty
                        .clone()
                        .expect("composite values are typed");
                    let ac = fn_.emit_const(Const {
                        ty,
                        kind: ConstKind::Aggregate(values),
                    });
                    fn_.replace_all(Value::Instr(id), Value::Const(ac));
                    kill_instruction(fn_, id);
                    replaced = true;
                }
            }

            if replaced {
                changed = true;
            } else {
                kept.push(Some(id));
            }
        }
        fn_.blocks[b].instrs = kept;
        fn_.blocks[b].gaps = 0;
    }

    changed
}

/// Detach an instruction, removing it from its operands' referrer lists.
fn kill_instruction(fn_: &mut Function, id: InstrId) {
    for op in fn_.instr(id).kind.operands() {
        fn_.remove_referrer(op, id);
    }
    fn_.instr_mut(id).block = None;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::FunctionBuilder;
    use crate::lang::Type;

    #[test]
    fn test_folds_all_constant_composite() {
        let mut b = FunctionBuilder::new("f");
        let entry = b.block();
        let one = b.int_const(1);
        let two = b.int_const(2);
        let cv = b.composite(entry, Type::Basic("pair".into()), vec![one, two]);
        let sink = b.other(entry, vec![Value::Instr(cv)]);
        b.ret(entry, vec![]);
        let mut f = b.finish();

        assert!(fold_composites(&mut f));

        // The composite is gone and the use now reads an aggregate const.
        let instrs: Vec<_> = f.blocks[0].instrs.iter().flatten().copied().collect();
        assert!(!instrs.contains(&cv));
        let InstrKind::Other { ref operands } = f.instr(sink).kind else {
            unreachable!()
        };
        let Value::Const(c) = operands[0] else {
            panic!("use not redirected to a constant")
        };
        assert!(matches!(f.constant(c).kind, ConstKind::Aggregate(_)));

        // Idempotent once everything is folded.
        assert!(!fold_composites(&mut f));
    }

    #[test]
    fn test_keeps_composite_with_dynamic_operand() {
        let mut b = FunctionBuilder::new("f");
        let entry = b.block();
        let one = b.int_const(1);
        let p = b.param("p", Type::Basic("int".into()));
        let cv = b.composite(entry, Type::Basic("pair".into()), vec![one, p]);
        b.ret(entry, vec![]);
        let mut f = b.finish();

        assert!(!fold_composites(&mut f));
        let instrs: Vec<_> = f.blocks[0].instrs.iter().flatten().copied().collect();
        assert!(instrs.contains(&cv));
    }
}
