//! The SSI lifting pass.
//!
//! `lift` replaces local cells accessed only through loads and stores with
//! IR registers, inserting φ-nodes at control-flow joins and σ-nodes at
//! splits. The result is pruned SSI form: φs are placed over the iterated
//! dominance frontier and σs over the iterated post-dominance frontier,
//! both pruned by a transitive-closure reachability index.
//!
//! Cells whose address escapes are split where possible: uses up to the
//! escape stay liftable against the original cell, uses past it are
//! redirected to a second, heap cell populated at the boundary.
//!
//! References: Cytron et al. 1991 for SSA construction; Cooper, Harvey,
//! Kennedy 2001 for dominance; Ananian 1997 and Singer 2006 for SSI.

use std::collections::HashMap;

use log::trace;

use super::closure::{transitive_closure, Closure};
use super::dominance::{build_dom_frontier, build_post_dom_frontier, DomFrontier};
use super::{BlockMap, BlockSet, Const, ConstKind, Function, InstrId, InstrKind, Value};

/// A newly placed φ-node and the cell it replaces.
struct NewPhi {
    phi: InstrId,
    alloc: InstrId,
}

/// The σ-nodes (one slot per successor) placed for a cell at one branch.
struct NewSigma {
    alloc: InstrId,
    sigmas: Vec<Option<InstrId>>,
}

/// A rename prescription: redirect references to `from` onto `to` from
/// instruction position `starting_at` onward.
#[derive(Clone, Copy)]
struct RenameAlloc {
    from: InstrId,
    to: InstrId,
    starting_at: usize,
}

/// Per-block work recorded by the liftability analyzer.
#[derive(Default)]
struct LiftInstructions {
    /// Instructions to insert immediately before the keyed instruction, in
    /// recording order.
    insert_instructions: HashMap<InstrId, Vec<InstrId>>,
    rename_allocs: Vec<RenameAlloc>,
}

fn alloc_index(fn_: &Function, id: InstrId) -> i32 {
    match fn_.instr(id).kind {
        InstrKind::Alloc { index, .. } => index,
        _ => panic!("alloc_index on non-alloc instruction"),
    }
}

fn set_alloc_index(fn_: &mut Function, id: InstrId, value: i32) {
    match &mut fn_.instr_mut(id).kind {
        InstrKind::Alloc { index, .. } => *index = value,
        _ => panic!("set_alloc_index on non-alloc instruction"),
    }
}

fn phi_edges(fn_: &Function, id: InstrId) -> Vec<Option<Value>> {
    match &fn_.instr(id).kind {
        InstrKind::Phi { edges } => edges.clone(),
        _ => panic!("phi_edges on non-phi instruction"),
    }
}

fn sigma_x(fn_: &Function, id: InstrId) -> Value {
    match &fn_.instr(id).kind {
        InstrKind::Sigma { x, .. } => *x,
        _ => panic!("sigma_x on non-sigma instruction"),
    }
}

/// Lift liftable cells of `fn_` into registers, leaving the function in
/// pruned SSI form. Returns whether any cell was lifted.
///
/// Preconditions: no dead blocks; referrer lists are consistent; the
/// dominator and post-dominator trees are up to date.
pub fn lift(fn_: &mut Function) -> bool {
    let nblocks = fn_.blocks.len();

    let mut df: Option<DomFrontier> = None;
    let mut rdf: Option<DomFrontier> = None;
    let mut clo: Option<Closure> = None;
    let mut new_phis: BlockMap<Vec<NewPhi>> = Vec::new();
    let mut new_sigmas: BlockMap<Vec<NewSigma>> = Vec::new();

    // While the pass runs, deleted instructions become tombstones counted
    // in `gaps`; compaction at the end rebuilds each block's instruction
    // vector, prepending surviving σs and φs.

    let mut uses_defer = false;
    let (deferstack_alloc, deferstack_call) = deferstack_preamble(fn_);
    let eliminate_defer_stack = deferstack_alloc.map_or(false, |a| {
        !matches!(fn_.instr(a).kind, InstrKind::Alloc { heap: true, .. })
    });

    // Liftable cells get dense numbers; the renaming phase indexes its map
    // with them.
    let mut num_allocs: i32 = 0;

    let mut instructions: BlockMap<LiftInstructions> =
        (0..nblocks).map(|_| LiftInstructions::default()).collect();

    fn_.number_instrs_per_block();

    for b in 0..nblocks {
        fn_.blocks[b].gaps = 0;
        fn_.blocks[b].rundefers = 0;

        for slot in fn_.blocks[b].instrs.clone() {
            let Some(id) = slot else { continue };
            match fn_.instr(id).kind.clone() {
                InstrKind::Alloc { .. } => {
                    if !liftable(fn_, id, &mut instructions) {
                        set_alloc_index(fn_, id, -1);
                        continue;
                    }
                    if num_allocs == 0 {
                        df = Some(build_dom_frontier(fn_));
                        rdf = Some(build_post_dom_frontier(fn_));
                        if nblocks > 2 {
                            clo = Some(transitive_closure(fn_));
                        }
                        new_phis = (0..nblocks).map(|_| Vec::new()).collect();
                        new_sigmas = (0..nblocks).map(|_| Vec::new()).collect();
                    }
                    set_alloc_index(fn_, id, num_allocs);
                    num_allocs += 1;
                }
                InstrKind::Defer { deferstack } => {
                    uses_defer = true;
                    if eliminate_defer_stack {
                        if let Some(ds) = deferstack {
                            fn_.remove_referrer(ds, id);
                            if let InstrKind::Defer { deferstack } = &mut fn_.instr_mut(id).kind {
                                *deferstack = None;
                            }
                        }
                    }
                }
                InstrKind::RunDefers => {
                    fn_.blocks[b].rundefers += 1;
                }
                _ => {}
            }
        }
    }

    if num_allocs > 0 {
        let df = df.expect("frontier built with first liftable alloc");
        let rdf = rdf.expect("post frontier built with first liftable alloc");

        // Apply split prescriptions: first the in-block renames (their
        // positions refer to the pre-insertion numbering), then the
        // insertions.
        for b in 0..nblocks {
            for i in 0..instructions[b].rename_allocs.len() {
                let RenameAlloc {
                    from,
                    to,
                    starting_at,
                } = instructions[b].rename_allocs[i];
                for slot in fn_.blocks[b].instrs.clone().into_iter().skip(starting_at) {
                    if let Some(instr) = slot {
                        fn_.replace(instr, Value::Instr(from), Value::Instr(to));
                    }
                }
            }
        }

        for b in 0..nblocks {
            if instructions[b].insert_instructions.is_empty() {
                continue;
            }
            let old = std::mem::take(&mut fn_.blocks[b].instrs);
            let mut rebuilt = Vec::with_capacity(old.len());
            for slot in old {
                if let Some(id) = slot {
                    if let Some(add) = instructions[b].insert_instructions.get(&id) {
                        rebuilt.extend(add.iter().map(|&a| Some(a)));
                    }
                }
                rebuilt.push(slot);
            }
            fn_.blocks[b].instrs = rebuilt;
        }

        // φ- and σ-placement per liftable cell.
        let mut sets = PlacementSets::new(nblocks);
        for b in 0..nblocks {
            for slot in fn_.blocks[b].instrs.clone() {
                let Some(id) = slot else { continue };
                if matches!(fn_.instr(id).kind, InstrKind::Alloc { index, .. } if index >= 0) {
                    lift_alloc(
                        fn_,
                        clo.as_ref(),
                        &df,
                        &rdf,
                        id,
                        &mut new_phis,
                        &mut new_sigmas,
                        &mut sets,
                    );
                }
            }
        }

        // The renaming map holds, per cell number, its current name;
        // `None` stands for the zero value, materialized lazily.
        let mut renaming: Vec<Option<Value>> = vec![None; num_allocs as usize];
        rename(fn_, 0, &mut renaming, &new_phis, &new_sigmas);

        simplify_phis_and_sigmas(fn_, &new_phis, &new_sigmas);

        mark_live_nodes(fn_, &new_phis, &new_sigmas);
    }

    // Evict the deferstack call when its cell does not escape, whether or
    // not anything was lifted.
    if eliminate_defer_stack {
        if let Some(call) = deferstack_call {
            let b = fn_.instr(call).block.expect("deferstack call is placed");
            if let Some(pos) = fn_.blocks[b].instrs.iter().position(|s| *s == Some(call)) {
                fn_.blocks[b].instrs[pos] = None;
                fn_.blocks[b].gaps += 1;
                fn_.instr_mut(call).block = None;
            }
        }
    }

    // Compaction: prepend live σs (in predecessor order) and φs, drop
    // tombstones, and drop rundefers in functions without defers.
    for b in 0..nblocks {
        let mut head: Vec<InstrId> = Vec::new();
        if num_allocs > 0 {
            head.reserve(new_phis[b].len());
            for pred in fn_.blocks[b].preds.clone() {
                let idx = fn_.blocks[pred]
                    .succ_index(b)
                    .expect("pred/succ lists are consistent");
                for ns in &new_sigmas[pred] {
                    if let Some(sigma) = ns.sigmas[idx] {
                        if fn_.instr(sigma).live {
                            head.push(sigma);
                            // Referrers were not populated at placement
                            // time, since most σs are discarded.
                            let x = sigma_x(fn_, sigma);
                            fn_.add_referrer(x, sigma);
                        } else {
                            fn_.instr_mut(sigma).block = None;
                        }
                    }
                }
            }
            for np in &new_phis[b] {
                if fn_.instr(np.phi).live {
                    head.push(np.phi);
                } else {
                    for edge in phi_edges(fn_, np.phi).into_iter().flatten() {
                        fn_.remove_referrer(edge, np.phi);
                    }
                    fn_.instr_mut(np.phi).block = None;
                }
            }
        }

        let rundefers_to_kill = if uses_defer {
            0
        } else {
            fn_.blocks[b].rundefers
        };

        if head.is_empty() && fn_.blocks[b].gaps == 0 && rundefers_to_kill == 0 {
            continue;
        }

        let mut killed: Vec<InstrId> = Vec::new();
        if rundefers_to_kill > 0 {
            for slot in &fn_.blocks[b].instrs {
                if let Some(id) = slot {
                    if matches!(fn_.instr(*id).kind, InstrKind::RunDefers) {
                        killed.push(*id);
                    }
                }
            }
        }
        for &id in &killed {
            fn_.instr_mut(id).block = None;
        }

        // Compact in place, reusing the block's storage.
        let instrs = &mut fn_.blocks[b].instrs;
        instrs.retain(|slot| match slot {
            None => false,
            Some(id) => !killed.contains(id),
        });
        instrs.splice(0..0, head.into_iter().map(Some));
        fn_.blocks[b].gaps = 0;
        if rundefers_to_kill > 0 {
            fn_.blocks[b].rundefers = 0;
        }
    }

    // Lifted cells are no longer locals.
    let locals = std::mem::take(&mut fn_.locals);
    let (lifted, kept): (Vec<InstrId>, Vec<InstrId>) = locals
        .into_iter()
        .partition(|&l| alloc_index(fn_, l) >= 0);
    fn_.locals = kept;
    for l in lifted {
        fn_.instr_mut(l).block = None;
    }

    num_allocs > 0
}

/// The deferstack cell and the call producing its initial value, if the
/// front-end materialized them.
fn deferstack_preamble(fn_: &Function) -> (Option<InstrId>, Option<InstrId>) {
    let Some(alloc) = fn_.deferstack else {
        return (None, None);
    };
    for &user in &fn_.instr(alloc).referrers {
        if let InstrKind::Store { addr, val } = &fn_.instr(user).kind {
            if *addr == Value::Instr(alloc) {
                if let Value::Instr(call) = val {
                    if matches!(fn_.instr(*call).kind, InstrKind::Call { .. }) {
                        return (Some(alloc), Some(*call));
                    }
                }
            }
        }
    }
    (Some(alloc), None)
}

/// Per-block classification of one cell's uses.
#[derive(Clone)]
struct BlockDesc {
    /// Contains unliftable uses, or is reachable from a block that does.
    is_unliftable: bool,
    has_liftable_load: bool,
    has_liftable_other: bool,
    /// The unliftable use sits in a φ/σ position, so boundary stores must
    /// go into predecessors.
    store_in_preds: bool,
    last_liftable: isize,
    first_unliftable: isize,
}

/// Decide whether `alloc` can be lifted, recording split prescriptions for
/// partially liftable cells.
///
/// A cell used only through loads, stores and debug references lifts
/// entirely. A cell that additionally escapes (its address is taken as a
/// value) splits: a boundary forms in the CFG where the first unliftable
/// use occurs, the region past it is renamed onto a second heap cell, and
/// a `tmp = load c; store c', tmp` pair at each boundary carries the last
/// lifted value over.
fn liftable(
    fn_: &mut Function,
    alloc: InstrId,
    instructions: &mut BlockMap<LiftInstructions>,
) -> bool {
    assert_eq!(
        alloc_index(fn_, alloc),
        -1,
        "liftable asked about an already numbered cell"
    );

    // Results of deferring functions stay addressable: a recover may yet
    // write them.
    if fn_.has_defer && fn_.results.contains(&alloc) {
        return false;
    }

    let nblocks = fn_.blocks.len();
    let mut blocks: Vec<BlockDesc> = (0..nblocks)
        .map(|b| BlockDesc {
            is_unliftable: false,
            has_liftable_load: false,
            has_liftable_other: false,
            store_in_preds: false,
            last_liftable: -1,
            first_unliftable: fn_.blocks[b].instrs.len() as isize + 1,
        })
        .collect();

    // First pass: find each block's first unliftable use.
    for &user in &fn_.instr(alloc).referrers {
        let instr = fn_.instr(user);
        let desc = &mut blocks[instr.block.expect("referrer is placed")];
        let mut has_unliftable = false;
        let mut in_head = false;
        match &instr.kind {
            InstrKind::Store { val, .. } => {
                if *val == Value::Instr(alloc) {
                    has_unliftable = true;
                }
            }
            InstrKind::Load { .. } | InstrKind::DebugRef { .. } => {}
            InstrKind::Phi { .. } | InstrKind::Sigma { .. } => {
                in_head = true;
                has_unliftable = true;
            }
            _ => has_unliftable = true,
        }
        if has_unliftable {
            desc.is_unliftable = true;
            if (instr.id as isize) < desc.first_unliftable {
                desc.first_unliftable = instr.id as isize;
            }
            if in_head {
                desc.store_in_preds = true;
                desc.first_unliftable = 0;
            }
        }
    }

    // Second pass: find the last liftable use before the boundary.
    for &user in &fn_.instr(alloc).referrers {
        let instr = fn_.instr(user);
        let desc = &mut blocks[instr.block.expect("referrer is placed")];
        if instr.id as isize >= desc.first_unliftable {
            continue;
        }
        let mut has_liftable = false;
        match &instr.kind {
            InstrKind::Store { val, .. } => {
                if *val != Value::Instr(alloc) {
                    desc.has_liftable_other = true;
                    has_liftable = true;
                }
            }
            InstrKind::Load { .. } => {
                desc.has_liftable_load = true;
                has_liftable = true;
            }
            InstrKind::DebugRef { .. } => {
                desc.has_liftable_other = true;
            }
            _ => {}
        }
        if has_liftable && instr.id as isize > desc.last_liftable {
            desc.last_liftable = instr.id as isize;
        }
    }

    for i in 0..nblocks {
        if blocks[i].last_liftable == -1 && !blocks[i].store_in_preds {
            // No liftable uses here; place the boundary at the first
            // non-head instruction so a store never lands before a φ.
            let mut first = -1isize;
            for (pos, slot) in fn_.blocks[i].instrs.iter().enumerate() {
                let Some(id) = slot else { continue };
                match fn_.instr(*id).kind {
                    InstrKind::Phi { .. } | InstrKind::Sigma { .. } => {}
                    _ => {
                        first = pos as isize;
                        break;
                    }
                }
            }
            blocks[i].first_unliftable = first;
        } else {
            blocks[i].first_unliftable = blocks[i].last_liftable + 1;
        }
    }

    // Unliftability floods forward: everything reachable from an
    // unliftable block is pinned, and its stores go into predecessors.
    let mut seen = vec![false; nblocks];
    let mut stack: Vec<usize> = Vec::new();
    for b in 0..nblocks {
        if blocks[b].is_unliftable {
            stack.extend(fn_.blocks[b].succs.iter().copied());
        }
    }
    while let Some(b) = stack.pop() {
        if seen[b] {
            continue;
        }
        seen[b] = true;
        let desc = &mut blocks[b];
        desc.has_liftable_load = false;
        desc.has_liftable_other = false;
        desc.is_unliftable = true;
        desc.first_unliftable = 0;
        desc.store_in_preds = true;
        stack.extend(fn_.blocks[b].succs.iter().copied());
    }

    let mut has_liftable_load = false;
    let mut has_liftable_other = false;
    let mut has_unliftable = false;
    for desc in &blocks {
        has_liftable_load |= desc.has_liftable_load;
        has_liftable_other |= desc.has_liftable_other;
        has_unliftable |= desc.is_unliftable;
    }

    if !has_liftable_load && !has_liftable_other {
        // Nothing worth lifting.
        return false;
    } else if !has_unliftable {
        // Entirely liftable, no splitting needed.
        return true;
    } else if !has_liftable_load {
        // Only stores are liftable. Lifting them would feed the split
        // cell's boundary stores, whose only liftable uses are again
        // stores, and lifting to a fixed point would never converge.
        return false;
    }

    trace!("{}: splitting cell {:?}", fn_.name, alloc);

    let alloc_block = fn_.instr(alloc).block.expect("alloc is placed");
    let cell_ty = fn_.value_type(Value::Instr(alloc));
    let new_alloc = fn_.new_instr(InstrKind::Alloc { heap: true, index: -1 }, Some(cell_ty));
    fn_.instr_mut(new_alloc).block = Some(alloc_block);
    fn_.instr_mut(new_alloc).name = fn_.instr(alloc).name.clone();

    instructions[alloc_block]
        .insert_instructions
        .entry(alloc)
        .or_default()
        .push(new_alloc);

    let mut pred_has_store = vec![false; nblocks];
    for b in 0..nblocks {
        let desc = blocks[b].clone();
        if !desc.is_unliftable {
            continue;
        }

        instructions[b].rename_allocs.push(RenameAlloc {
            from: alloc,
            to: new_alloc,
            starting_at: desc.first_unliftable.max(0) as usize,
        });

        if desc.store_in_preds {
            // Boundary stores at the end of every liftable predecessor the
            // cell's home block dominates. A predecessor that cannot see
            // the cell is skipped.
            for pred in fn_.blocks[b].preds.clone() {
                if blocks[pred].is_unliftable {
                    continue;
                }
                if !fn_.dominates(alloc_block, pred) {
                    continue;
                }
                if pred_has_store[pred] {
                    // A second store into the same predecessor would itself
                    // be liftable and feed an endless lift-split cycle.
                    continue;
                }
                pred_has_store[pred] = true;

                let before = fn_.blocks[pred]
                    .instrs
                    .iter()
                    .rev()
                    .flatten()
                    .next()
                    .copied()
                    .expect("liftable predecessor has a terminator");
                propagate(fn_, instructions, alloc, new_alloc, pred, before);
            }
        } else {
            let before = fn_.blocks[b].instrs[desc.first_unliftable as usize]
                .expect("boundary instruction is live");
            propagate(fn_, instructions, alloc, new_alloc, b, before);
        }
    }

    true
}

/// Record a `tmp = load c; store c', tmp` boundary pair to be inserted
/// before `before` in `in_block`.
fn propagate(
    fn_: &mut Function,
    instructions: &mut BlockMap<LiftInstructions>,
    alloc: InstrId,
    new_alloc: InstrId,
    in_block: usize,
    before: InstrId,
) {
    let elem = fn_.value_type(Value::Instr(alloc)).deref();
    let load = fn_.new_instr(
        InstrKind::Load {
            addr: Value::Instr(alloc),
        },
        Some(elem),
    );
    fn_.instr_mut(load).block = Some(in_block);
    let store = fn_.new_instr(
        InstrKind::Store {
            addr: Value::Instr(new_alloc),
            val: Value::Instr(load),
        },
        None,
    );
    fn_.instr_mut(store).block = Some(in_block);
    fn_.update_operand_referrers(load);
    fn_.update_operand_referrers(store);

    let entry = instructions[in_block]
        .insert_instructions
        .entry(before)
        .or_default();
    entry.push(load);
    entry.push(store);
}

/// The five scratch block sets the placement loop cycles through.
struct PlacementSets {
    defblocks: BlockSet,
    useblocks: BlockSet,
    a_phi: BlockSet,
    a_sigma: BlockSet,
    w: BlockSet,
}

impl PlacementSets {
    fn new(n: usize) -> Self {
        Self {
            defblocks: BlockSet::new(n),
            useblocks: BlockSet::new(n),
            a_phi: BlockSet::new(n),
            a_sigma: BlockSet::new(n),
            w: BlockSet::new(n),
        }
    }

    fn clear(&mut self) {
        self.defblocks.clear();
        self.useblocks.clear();
        self.a_phi.clear();
        self.a_sigma.clear();
        self.w.clear();
    }
}

/// Place the φ- and σ-nodes one lifted cell may require.
#[allow(clippy::too_many_arguments)]
fn lift_alloc(
    fn_: &mut Function,
    clo: Option<&Closure>,
    df: &DomFrontier,
    rdf: &DomFrontier,
    alloc: InstrId,
    new_phis: &mut BlockMap<Vec<NewPhi>>,
    new_sigmas: &mut BlockMap<Vec<NewSigma>>,
    sets: &mut PlacementSets,
) {
    sets.clear();
    let elem = fn_.value_type(Value::Instr(alloc)).deref();

    // defblocks: blocks defining the cell; useblocks: blocks using it,
    // including users of its loads.
    for &user in &fn_.instr(alloc).referrers {
        match &fn_.instr(user).kind {
            InstrKind::Store { .. } => {
                sets.defblocks
                    .add(fn_.instr(user).block.expect("store is placed"));
            }
            InstrKind::Load { .. } => {
                sets.useblocks
                    .add(fn_.instr(user).block.expect("load is placed"));
                for &load_user in &fn_.instr(user).referrers {
                    sets.useblocks
                        .add(fn_.instr(load_user).block.expect("load user is placed"));
                }
            }
            _ => {}
        }
    }
    // The cell itself is a (zero) definition.
    sets.defblocks
        .add(fn_.instr(alloc).block.expect("alloc is placed"));

    trace!("{}: lifting cell {:?}", fn_.name, alloc);

    let mut change = true;
    while change {
        change = false;

        // Iterated dominance frontier, φ insertion.
        sets.w.copy_from(&sets.defblocks);
        while let Some(i) = sets.w.take() {
            for &y in &df[i] {
                if !sets.a_phi.add(y) {
                    continue;
                }
                if fn_.instr(alloc).referrers.is_empty() {
                    continue;
                }
                let live = match clo {
                    None => true,
                    Some(clo) => fn_.instr(alloc).referrers.iter().any(|&r| {
                        matches!(fn_.instr(r).kind, InstrKind::Load { .. })
                            && clo.has(fn_, y, fn_.instr(r).block.expect("load is placed"))
                    }),
                };
                if !live {
                    continue;
                }
                if fn_.blocks[y].preds.is_empty() {
                    // An unreachable exit (the function never returns)
                    // would give the φ no edges; leave the loads alone and
                    // let renaming replace them with zero constants.
                    continue;
                }

                let npreds = fn_.blocks[y].preds.len();
                let phi = fn_.new_instr(
                    InstrKind::Phi {
                        edges: vec![None; npreds],
                    },
                    Some(elem.clone()),
                );
                fn_.instr_mut(phi).block = Some(y);
                fn_.instr_mut(phi).name = fn_.instr(alloc).name.clone();
                trace!("{}: place phi {:?} at block {}", fn_.name, phi, y);
                new_phis[y].push(NewPhi { phi, alloc });

                for p in fn_.blocks[y].preds.clone() {
                    sets.useblocks.add(p);
                }
                change = true;
                if sets.defblocks.add(y) {
                    sets.w.add(y);
                }
            }
        }

        // Iterated post-dominance frontier, σ insertion.
        sets.w.copy_from(&sets.useblocks);
        while let Some(i) = sets.w.take() {
            for &y in &rdf[i] {
                if !sets.a_sigma.add(y) {
                    continue;
                }
                let succs = fn_.blocks[y].succs.clone();
                let mut sigmas: Vec<Option<InstrId>> = Vec::with_capacity(succs.len());
                let mut any_live = false;
                for &succ in &succs {
                    let live = fn_.instr(alloc).referrers.clone().iter().any(|&r| {
                        clo.map_or(true, |clo| {
                            clo.has(fn_, succ, fn_.instr(r).block.expect("referrer is placed"))
                        })
                    });
                    if live {
                        let sigma = fn_.new_instr(
                            InstrKind::Sigma {
                                from: y,
                                x: Value::Instr(alloc),
                            },
                            Some(elem.clone()),
                        );
                        fn_.instr_mut(sigma).block = Some(succ);
                        fn_.instr_mut(sigma).name = fn_.instr(alloc).name.clone();
                        sigmas.push(Some(sigma));
                        any_live = true;
                    } else {
                        sigmas.push(None);
                    }
                }
                if any_live {
                    trace!("{}: place sigmas at branch block {}", fn_.name, y);
                    new_sigmas[y].push(NewSigma { alloc, sigmas });
                    for s in succs {
                        sets.defblocks.add(s);
                    }
                    change = true;
                    if sets.useblocks.add(y) {
                        sets.w.add(y);
                    }
                }
            }
        }
    }
}

/// The current name for a cell, materializing its zero constant lazily.
fn renamed(fn_: &mut Function, renaming: &mut [Option<Value>], alloc: InstrId) -> Value {
    let idx = alloc_index(fn_, alloc) as usize;
    if let Some(v) = renaming[idx] {
        return v;
    }
    let elem = fn_.value_type(Value::Instr(alloc)).deref();
    let c = fn_.emit_const(Const {
        ty: elem,
        kind: ConstKind::Zero,
    });
    let v = Value::Const(c);
    renaming[idx] = Some(v);
    v
}

/// Preorder dominator-tree renaming: loads become the dominating stored
/// value, stores record new names, lifted allocs/loads/stores leave
/// tombstones, σs adopt the dominating name on the way out, and φ edges in
/// successors are filled with either the matching σ or the dominating name.
fn rename(
    fn_: &mut Function,
    u: usize,
    renaming: &mut Vec<Option<Value>>,
    new_phis: &BlockMap<Vec<NewPhi>>,
    new_sigmas: &BlockMap<Vec<NewSigma>>,
) {
    // Each φ is the new name of its cell.
    for np in &new_phis[u] {
        renaming[alloc_index(fn_, np.alloc) as usize] = Some(Value::Instr(np.phi));
    }

    for pos in 0..fn_.blocks[u].instrs.len() {
        let Some(id) = fn_.blocks[u].instrs[pos] else {
            continue;
        };
        match fn_.instr(id).kind.clone() {
            InstrKind::Alloc { index, .. } if index >= 0 => {
                // The cell's creation is an implicit store of zero.
                renaming[index as usize] = None;
                trace!("{}: kill alloc {:?}", fn_.name, id);
                fn_.blocks[u].instrs[pos] = None;
                fn_.blocks[u].gaps += 1;
            }

            InstrKind::Store { addr: Value::Instr(a), val }
                if matches!(fn_.instr(a).kind, InstrKind::Alloc { index, .. } if index >= 0) =>
            {
                let index = alloc_index(fn_, a);
                renaming[index as usize] = Some(val);
                trace!("{}: kill store {:?}; new name {:?}", fn_.name, id, val);
                fn_.remove_referrer(Value::Instr(a), id);
                fn_.remove_referrer(val, id);
                fn_.blocks[u].instrs[pos] = None;
                fn_.blocks[u].gaps += 1;
            }

            InstrKind::Load { addr: Value::Instr(a) }
                if matches!(fn_.instr(a).kind, InstrKind::Alloc { index, .. } if index >= 0) =>
            {
                // Loads are renamed one by one; each load is used in a
                // single block, so replacing it with the current name is
                // sound even across branches.
                let newval = renamed(fn_, renaming, a);
                trace!("{}: replace load {:?} with {:?}", fn_.name, id, newval);
                fn_.remove_referrer(Value::Instr(a), id);
                fn_.replace_all(Value::Instr(id), newval);
                fn_.blocks[u].instrs[pos] = None;
                fn_.blocks[u].gaps += 1;
            }

            InstrKind::DebugRef { x: Value::Instr(a), is_addr }
                if matches!(fn_.instr(a).kind, InstrKind::Alloc { index, .. } if index >= 0) =>
            {
                if is_addr {
                    let newval = renamed(fn_, renaming, a);
                    fn_.remove_referrer(Value::Instr(a), id);
                    if let InstrKind::DebugRef { x, is_addr } = &mut fn_.instr_mut(id).kind {
                        *x = newval;
                        *is_addr = false;
                    }
                    fn_.add_referrer(newval, id);
                } else {
                    // The source expression denoted the address of a cell
                    // that no longer exists.
                    fn_.remove_referrer(Value::Instr(a), id);
                    fn_.blocks[u].instrs[pos] = None;
                    fn_.blocks[u].gaps += 1;
                }
            }

            _ => {}
        }
    }

    // Outgoing σs carry the dominating name.
    for ns in &new_sigmas[u] {
        for sigma in ns.sigmas.iter().flatten() {
            let newval = renamed(fn_, renaming, ns.alloc);
            if let InstrKind::Sigma { x, .. } = &mut fn_.instr_mut(*sigma).kind {
                *x = newval;
            }
        }
    }

    // Fill each successor φ's edge for this predecessor: the σ on this
    // edge if one exists, the dominating name otherwise.
    for (succi, v) in fn_.blocks[u].succs.clone().into_iter().enumerate() {
        if new_phis[v].is_empty() {
            continue;
        }
        let i = fn_.blocks[v]
            .pred_index(u)
            .expect("pred/succ lists are consistent");
        for np in &new_phis[v] {
            let mut newval = None;
            for ns in &new_sigmas[u] {
                if ns.alloc == np.alloc {
                    if let Some(sigma) = ns.sigmas[succi] {
                        newval = Some(Value::Instr(sigma));
                        break;
                    }
                }
            }
            let newval = match newval {
                Some(v) => v,
                None => renamed(fn_, renaming, np.alloc),
            };
            if let InstrKind::Phi { edges } = &mut fn_.instr_mut(np.phi).kind {
                edges[i] = Some(newval);
            }
            fn_.add_referrer(newval, np.phi);
        }
    }

    // Recurse over the dominator tree with a fresh copy of the renaming;
    // entering through an edge with σs adopts them as new names.
    for v in fn_.blocks[u].dom.children.clone() {
        let mut r = renaming.clone();
        if let Some(idx) = fn_.blocks[u].succ_index(v) {
            for ns in &new_sigmas[u] {
                if let Some(sigma) = ns.sigmas[idx] {
                    r[alloc_index(fn_, ns.alloc) as usize] = Some(Value::Instr(sigma));
                }
            }
        }
        rename(fn_, v, &mut r, new_phis, new_sigmas);
    }
}

/// A φ is trivial when its edges are all one value, or that value plus the
/// φ itself. Returns the replacement.
fn is_useless_phi(fn_: &Function, phi: InstrId) -> Option<Value> {
    let self_v = Value::Instr(phi);
    let mut seen: Option<Value> = None;
    for edge in phi_edges(fn_, phi).into_iter().flatten() {
        if edge == self_v {
            continue;
        }
        match seen {
            None => seen = Some(edge),
            Some(s) if s == edge => {}
            Some(_) => return None,
        }
    }
    seen
}

/// Replace trivial φs and deduplicate σ- and φ-nodes until nothing
/// changes. The `live` flag is reused here to mean "already discarded".
fn simplify_phis_and_sigmas(
    fn_: &mut Function,
    new_phis: &BlockMap<Vec<NewPhi>>,
    new_sigmas: &BlockMap<Vec<NewSigma>>,
) {
    let mut changed = true;
    while changed {
        changed = false;

        // Trivial φs: replacing one may make others trivial, hence the
        // outer fixed point.
        for np_list in new_phis {
            for np in np_list {
                if fn_.instr(np.phi).live {
                    continue;
                }
                if let Some(r) = is_useless_phi(fn_, np.phi) {
                    fn_.replace_all(Value::Instr(np.phi), r);
                    fn_.instr_mut(np.phi).live = true;
                    changed = true;
                }
            }
        }

        // σs at the same (successor, source value) are duplicates; they
        // appear when several cells were renamed to one dominating store.
        for sigma_list in new_sigmas {
            let mut primary: HashMap<(usize, Value), InstrId> = HashMap::new();
            for ns in sigma_list {
                for (succ, slot) in ns.sigmas.iter().enumerate() {
                    let Some(sigma) = *slot else { continue };
                    if fn_.instr(sigma).live {
                        continue;
                    }
                    let key = (succ, sigma_x(fn_, sigma));
                    if let Some(&alt) = primary.get(&key) {
                        fn_.replace_all(Value::Instr(sigma), Value::Instr(alt));
                        fn_.instr_mut(sigma).live = true;
                        changed = true;
                    } else {
                        primary.insert(key, sigma);
                    }
                }
            }
        }

        // φs can become duplicates after σ deduplication; key them by
        // their edge vectors.
        for np_list in new_phis {
            let mut primary: HashMap<Vec<Option<Value>>, InstrId> = HashMap::new();
            for np in np_list {
                if fn_.instr(np.phi).live {
                    continue;
                }
                let key = phi_edges(fn_, np.phi);
                if let Some(&alt) = primary.get(&key) {
                    fn_.replace_all(Value::Instr(np.phi), Value::Instr(alt));
                    fn_.instr_mut(np.phi).live = true;
                    changed = true;
                } else {
                    primary.insert(key, np.phi);
                }
            }
        }
    }

    // Return the flag to its liveness meaning.
    for np_list in new_phis {
        for np in np_list {
            fn_.instr_mut(np.phi).live = false;
        }
    }
    for sigma_list in new_sigmas {
        for ns in sigma_list {
            for sigma in ns.sigmas.iter().flatten() {
                fn_.instr_mut(*sigma).live = false;
            }
        }
    }
}

fn has_direct_referrer(fn_: &Function, instr: InstrId) -> bool {
    fn_.instr(instr).referrers.iter().any(|&r| {
        !matches!(
            fn_.instr(r).kind,
            InstrKind::Phi { .. } | InstrKind::Sigma { .. }
        )
    })
}

fn mark_live(fn_: &mut Function, instr: InstrId) {
    if fn_.instr(instr).live {
        return;
    }
    fn_.instr_mut(instr).live = true;
    let operands: Vec<Value> = match &fn_.instr(instr).kind {
        InstrKind::Phi { edges } => edges.iter().flatten().copied().collect(),
        InstrKind::Sigma { x, .. } => vec![*x],
        _ => return,
    };
    for op in operands {
        if let Value::Instr(dep) = op {
            if matches!(
                fn_.instr(dep).kind,
                InstrKind::Phi { .. } | InstrKind::Sigma { .. }
            ) {
                mark_live(fn_, dep);
            }
        }
    }
}

/// A φ/σ is live iff some non-φ, non-σ instruction uses it, transitively.
/// Pre-existing φs (from short-circuit operators) are pinned live.
fn mark_live_nodes(
    fn_: &mut Function,
    new_phis: &BlockMap<Vec<NewPhi>>,
    new_sigmas: &BlockMap<Vec<NewSigma>>,
) {
    for np_list in new_phis {
        for np in np_list {
            if !fn_.instr(np.phi).live && has_direct_referrer(fn_, np.phi) {
                mark_live(fn_, np.phi);
            }
        }
    }
    for sigma_list in new_sigmas {
        for ns in sigma_list {
            for sigma in ns.sigmas.clone().into_iter().flatten() {
                if !fn_.instr(sigma).live && has_direct_referrer(fn_, sigma) {
                    mark_live(fn_, sigma);
                }
            }
        }
    }
    // φs emitted by the front-end for short-circuit operators are always
    // kept.
    for b in 0..fn_.blocks.len() {
        for slot in fn_.blocks[b].instrs.clone() {
            let Some(id) = slot else { continue };
            if matches!(fn_.instr(id).kind, InstrKind::Phi { .. }) {
                mark_live(fn_, id);
            }
        }
    }
}
