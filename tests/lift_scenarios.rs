use liftmap::ir::{lift::lift, Function, FunctionBuilder, InstrId, InstrKind, Value};
use liftmap::lang::Type;

fn int() -> Type {
    Type::Basic("int".into())
}

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn live_instrs(f: &Function, b: usize) -> Vec<InstrId> {
    f.blocks[b].instrs.iter().flatten().copied().collect()
}

fn count_kind(f: &Function, pred: impl Fn(&InstrKind) -> bool) -> usize {
    f.blocks
        .iter()
        .flat_map(|b| b.instrs.iter().flatten())
        .filter(|&&id| pred(&f.instr(id).kind))
        .count()
}

fn int_const(f: &Function, v: Value) -> Option<i64> {
    match v {
        Value::Const(c) => match f.constant(c).kind {
            liftmap::ir::ConstKind::Int(n) => Some(n),
            _ => None,
        },
        _ => None,
    }
}

/// Scenario A: one cell, one store, one load; everything dissolves into the
/// stored constant.
#[test]
fn test_simple_load_store_lift() {
    init_logs();
    let mut b = FunctionBuilder::new("simple");
    let entry = b.block();
    let x = b.alloc(entry, int(), "x");
    let forty_two = b.int_const(42);
    b.store(entry, Value::Instr(x), forty_two);
    let load = b.load(entry, Value::Instr(x));
    let sink = b.other(entry, vec![Value::Instr(load)]);
    b.ret(entry, vec![]);
    b.set_exit(entry);
    let mut f = b.finish();

    assert!(lift(&mut f));
    f.invariant_check();

    assert_eq!(count_kind(&f, |k| matches!(k, InstrKind::Alloc { .. })), 0);
    assert_eq!(count_kind(&f, |k| matches!(k, InstrKind::Store { .. })), 0);
    assert_eq!(count_kind(&f, |k| matches!(k, InstrKind::Load { .. })), 0);
    assert!(f.locals.is_empty());

    let InstrKind::Other { ref operands } = f.instr(sink).kind else {
        unreachable!()
    };
    assert_eq!(int_const(&f, operands[0]), Some(42));
}

/// Scenario B: two predecessors store different values, the join loads.
/// The join gains a φ with edges in predecessor order and the load reads
/// it.
#[test]
fn test_branch_merge_phi() {
    let mut b = FunctionBuilder::new("merge");
    let entry = b.block();
    let then_b = b.block();
    let else_b = b.block();
    let join = b.block();
    let exit = b.block();

    let cond = b.param("cond", Type::Basic("bool".into()));
    let x = b.alloc(entry, int(), "x");
    b.cond_br(entry, cond, then_b, else_b);

    let one = b.int_const(1);
    b.store(then_b, Value::Instr(x), one);
    b.jump(then_b, join);

    let two = b.int_const(2);
    b.store(else_b, Value::Instr(x), two);
    b.jump(else_b, join);

    let load = b.load(join, Value::Instr(x));
    let sink = b.other(join, vec![Value::Instr(load)]);
    b.jump(join, exit);
    b.ret(exit, vec![]);
    b.set_exit(exit);
    let mut f = b.finish();

    assert!(lift(&mut f));
    f.invariant_check();

    let join_instrs = live_instrs(&f, join);
    let phi = join_instrs[0];
    let InstrKind::Phi { ref edges } = f.instr(phi).kind else {
        panic!("join does not begin with a phi");
    };
    assert_eq!(f.blocks[join].preds, vec![then_b, else_b]);
    let edge_values: Vec<i64> = edges
        .iter()
        .map(|e| int_const(&f, e.unwrap()).unwrap())
        .collect();
    assert_eq!(edge_values, vec![1, 2]);

    // The load is gone; its user reads the phi.
    assert_eq!(count_kind(&f, |k| matches!(k, InstrKind::Load { .. })), 0);
    let InstrKind::Other { ref operands } = f.instr(sink).kind else {
        unreachable!()
    };
    assert_eq!(operands[0], Value::Instr(phi));
}

/// Scenario C: the cell escapes mid-block. A second heap cell appears, the
/// boundary carries the lifted value into it, and post-escape loads target
/// the new cell.
#[test]
fn test_escape_forces_split() {
    init_logs();
    let mut b = FunctionBuilder::new("escape");
    let entry = b.block();
    let x = b.alloc(entry, int(), "x");
    let one = b.int_const(1);
    b.store(entry, Value::Instr(x), one);
    let load1 = b.load(entry, Value::Instr(x));
    let escape = b.other(entry, vec![Value::Instr(x)]);
    let load2 = b.load(entry, Value::Instr(x));
    let sink = b.other(entry, vec![Value::Instr(load1), Value::Instr(load2)]);
    b.ret(entry, vec![]);
    b.set_exit(entry);
    let mut f = b.finish();

    assert!(lift(&mut f));
    f.invariant_check();

    // Exactly one alloc survives: the heap twin. The original is gone and
    // deregistered.
    let instrs = live_instrs(&f, entry);
    let allocs: Vec<InstrId> = instrs
        .iter()
        .copied()
        .filter(|&id| matches!(f.instr(id).kind, InstrKind::Alloc { .. }))
        .collect();
    assert_eq!(allocs.len(), 1);
    let twin = allocs[0];
    assert_ne!(twin, x);
    let InstrKind::Alloc { heap, index } = f.instr(twin).kind else {
        unreachable!()
    };
    assert!(heap);
    assert_eq!(index, -1);
    assert!(f.locals.is_empty());

    // The boundary store writes the lifted value into the twin, before the
    // escape.
    let stores: Vec<usize> = instrs
        .iter()
        .enumerate()
        .filter(|(_, &id)| matches!(f.instr(id).kind, InstrKind::Store { .. }))
        .map(|(pos, _)| pos)
        .collect();
    assert_eq!(stores.len(), 1);
    let InstrKind::Store { addr, val } = f.instr(instrs[stores[0]]).kind else {
        unreachable!()
    };
    assert_eq!(addr, Value::Instr(twin));
    assert_eq!(int_const(&f, val), Some(1));
    let escape_pos = instrs.iter().position(|&id| id == escape).unwrap();
    assert!(stores[0] < escape_pos);

    // The escape now takes the twin's address; the post-escape load reads
    // the twin; the pre-escape load dissolved into the constant.
    let InstrKind::Other { ref operands } = f.instr(escape).kind else {
        unreachable!()
    };
    assert_eq!(operands[0], Value::Instr(twin));
    let InstrKind::Load { addr } = f.instr(load2).kind else {
        panic!("post-escape load was removed");
    };
    assert_eq!(addr, Value::Instr(twin));
    let InstrKind::Other { ref operands } = f.instr(sink).kind else {
        unreachable!()
    };
    assert_eq!(int_const(&f, operands[0]), Some(1));
    assert_eq!(operands[1], Value::Instr(load2));
}

/// Scenario D: rundefers without any defer is dropped.
#[test]
fn test_rundefers_elided_without_defer() {
    let mut b = FunctionBuilder::new("nodefers");
    let entry = b.block();
    b.run_defers(entry);
    b.ret(entry, vec![]);
    b.set_exit(entry);
    let mut f = b.finish();

    assert!(!lift(&mut f));
    f.invariant_check();
    assert_eq!(count_kind(&f, |k| matches!(k, InstrKind::RunDefers)), 0);
}

#[test]
fn test_rundefers_kept_with_defer() {
    let mut b = FunctionBuilder::new("defers");
    let entry = b.block();
    b.defer_instr(entry, None);
    b.run_defers(entry);
    b.ret(entry, vec![]);
    b.set_exit(entry);
    b.set_has_defer();
    let mut f = b.finish();

    assert!(!lift(&mut f));
    f.invariant_check();
    assert_eq!(count_kind(&f, |k| matches!(k, InstrKind::RunDefers)), 1);
}

/// Property 1: a function without allocs comes back untouched.
#[test]
fn test_no_allocs_is_noop() {
    let mut b = FunctionBuilder::new("inert");
    let entry = b.block();
    let p = b.param("p", int());
    b.other(entry, vec![p]);
    b.ret(entry, vec![]);
    b.set_exit(entry);
    let mut f = b.finish();

    let before = format!("{:?}{:?}", f.blocks, f.locals);
    assert!(!lift(&mut f));
    let after = format!("{:?}{:?}", f.blocks, f.locals);
    assert_eq!(before, after);
}

/// Property 7: a second lift changes nothing.
#[test]
fn test_lift_twice_is_noop() {
    for build in [build_merge_fn, build_escape_fn, build_sigma_fn] {
        let mut f = build();
        assert!(lift(&mut f));
        f.invariant_check();
        let before = format!("{:?}{:?}", f.blocks, f.locals);
        assert!(!lift(&mut f));
        f.invariant_check();
        let after = format!("{:?}{:?}", f.blocks, f.locals);
        assert_eq!(before, after);
    }
}

fn build_merge_fn() -> Function {
    let mut b = FunctionBuilder::new("merge");
    let entry = b.block();
    let then_b = b.block();
    let else_b = b.block();
    let join = b.block();
    let exit = b.block();
    let cond = b.param("cond", Type::Basic("bool".into()));
    let x = b.alloc(entry, int(), "x");
    b.cond_br(entry, cond, then_b, else_b);
    let one = b.int_const(1);
    b.store(then_b, Value::Instr(x), one);
    b.jump(then_b, join);
    let two = b.int_const(2);
    b.store(else_b, Value::Instr(x), two);
    b.jump(else_b, join);
    let load = b.load(join, Value::Instr(x));
    b.other(join, vec![Value::Instr(load)]);
    b.jump(join, exit);
    b.ret(exit, vec![]);
    b.set_exit(exit);
    b.finish()
}

fn build_escape_fn() -> Function {
    let mut b = FunctionBuilder::new("escape");
    let entry = b.block();
    let x = b.alloc(entry, int(), "x");
    let one = b.int_const(1);
    b.store(entry, Value::Instr(x), one);
    let load1 = b.load(entry, Value::Instr(x));
    b.other(entry, vec![Value::Instr(x)]);
    let load2 = b.load(entry, Value::Instr(x));
    b.other(entry, vec![Value::Instr(load1), Value::Instr(load2)]);
    b.ret(entry, vec![]);
    b.set_exit(entry);
    b.finish()
}

fn build_sigma_fn() -> Function {
    let mut b = FunctionBuilder::new("sigma");
    let entry = b.block();
    let then_b = b.block();
    let else_b = b.block();
    let join = b.block();
    let exit = b.block();
    let cond = b.param("cond", Type::Basic("bool".into()));
    let x = b.alloc(entry, int(), "x");
    let five = b.int_const(5);
    b.store(entry, Value::Instr(x), five);
    b.cond_br(entry, cond, then_b, else_b);
    let l1 = b.load(then_b, Value::Instr(x));
    b.other(then_b, vec![Value::Instr(l1)]);
    b.jump(then_b, join);
    let l2 = b.load(else_b, Value::Instr(x));
    b.other(else_b, vec![Value::Instr(l2)]);
    b.jump(else_b, join);
    b.jump(join, exit);
    b.ret(exit, vec![]);
    b.set_exit(exit);
    b.finish()
}

/// σ-nodes land at the entries of the branch's successors and adopt the
/// dominating value; the loads in the arms read them.
#[test]
fn test_sigma_placed_on_branch_arms() {
    let mut f = build_sigma_fn();
    assert!(lift(&mut f));
    f.invariant_check();

    for arm in [1usize, 2] {
        let instrs = live_instrs(&f, arm);
        let InstrKind::Sigma { from, x } = f.instr(instrs[0]).kind else {
            panic!("arm {} does not begin with a sigma", arm);
        };
        assert_eq!(from, 0);
        assert_eq!(int_const(&f, x), Some(5));
        // The arm's load dissolved into the sigma.
        let InstrKind::Other { ref operands } = f.instr(instrs[1]).kind else {
            panic!("sigma not followed by the consumer");
        };
        assert_eq!(operands[0], Value::Instr(instrs[0]));
    }

    // The join sees no load, so placement pruning left it without a φ.
    assert_eq!(count_kind(&f, |k| matches!(k, InstrKind::Phi { .. })), 0);
}

/// Cells that back named results in a deferring function stay put: a
/// recover may still write them.
#[test]
fn test_results_pinned_when_function_defers() {
    let mut b = FunctionBuilder::new("recoverable");
    let entry = b.block();
    let r = b.alloc(entry, int(), "r");
    b.mark_result(r);
    let one = b.int_const(1);
    b.store(entry, Value::Instr(r), one);
    let load = b.load(entry, Value::Instr(r));
    b.other(entry, vec![Value::Instr(load)]);
    b.defer_instr(entry, None);
    b.run_defers(entry);
    b.ret(entry, vec![]);
    b.set_exit(entry);
    b.set_has_defer();
    let mut f = b.finish();

    assert!(!lift(&mut f));
    f.invariant_check();
    assert_eq!(count_kind(&f, |k| matches!(k, InstrKind::Alloc { .. })), 1);
    assert!(f.locals.contains(&r));
}

/// The deferstack call is evicted when its cell does not escape, and defer
/// instructions drop their deferstack operand.
#[test]
fn test_deferstack_call_evicted() {
    let mut b = FunctionBuilder::new("deferstack");
    let entry = b.block();
    let ds = b.alloc(entry, Type::Basic("deferstack".into()), "ds");
    b.mark_deferstack(ds);
    let runtime_new = b.builtin("deferstack");
    let call = b.call(entry, runtime_new, vec![], Type::Basic("deferstack".into()));
    b.store(entry, Value::Instr(ds), Value::Instr(call));
    let d = b.defer_instr(entry, Some(Value::Instr(call)));
    b.run_defers(entry);
    b.ret(entry, vec![]);
    b.set_exit(entry);
    b.set_has_defer();
    let mut f = b.finish();

    lift(&mut f);
    f.invariant_check();

    assert_eq!(count_kind(&f, |k| matches!(k, InstrKind::Call { .. })), 0);
    let InstrKind::Defer { deferstack } = f.instr(d).kind else {
        unreachable!()
    };
    assert!(deferstack.is_none());
    // The function defers, so rundefers stays.
    assert_eq!(count_kind(&f, |k| matches!(k, InstrKind::RunDefers)), 1);
}

/// φs emitted by the front-end for short-circuit operators survive lifting
/// even when nothing refers to them.
#[test]
fn test_preexisting_phi_pinned_live() {
    let mut b = FunctionBuilder::new("shortcircuit");
    let entry = b.block();
    let then_b = b.block();
    let else_b = b.block();
    let join = b.block();
    let exit = b.block();
    let cond = b.param("cond", Type::Basic("bool".into()));
    let x = b.alloc(entry, int(), "x");
    let five = b.int_const(5);
    b.store(entry, Value::Instr(x), five);
    b.cond_br(entry, cond, then_b, else_b);
    b.jump(then_b, join);
    b.jump(else_b, join);
    let t = b.int_const(1);
    let fv = b.int_const(0);
    let pre_phi = b.phi(join, vec![t, fv]);
    let load = b.load(join, Value::Instr(x));
    b.other(join, vec![Value::Instr(load)]);
    b.jump(join, exit);
    b.ret(exit, vec![]);
    b.set_exit(exit);
    let mut f = b.finish();

    assert!(lift(&mut f));
    f.invariant_check();
    assert!(live_instrs(&f, join).contains(&pre_phi));
}

/// Invariant 2 across a mix of shapes: surviving loads and stores only
/// ever mention unliftable cells, and φ/σ shapes are structurally sound.
#[test]
fn test_structural_invariants_after_lift() {
    for build in [build_merge_fn, build_escape_fn, build_sigma_fn] {
        let mut f = build();
        lift(&mut f);
        f.invariant_check();

        for block in &f.blocks {
            for id in block.instrs.iter().flatten() {
                match &f.instr(*id).kind {
                    InstrKind::Load { addr } | InstrKind::Store { addr, .. } => {
                        if let Value::Instr(a) = addr {
                            if let InstrKind::Alloc { index, .. } = f.instr(*a).kind {
                                assert_eq!(index, -1);
                            }
                        }
                    }
                    InstrKind::Phi { edges } => {
                        assert_eq!(edges.len(), block.preds.len());
                    }
                    InstrKind::Sigma { from, .. } => {
                        assert!(f.blocks[*from].succs.contains(&block.index));
                    }
                    _ => {}
                }
            }
        }
    }
}
