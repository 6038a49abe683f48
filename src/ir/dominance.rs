//! Dominator and post-dominator trees, and the dominance frontiers built
//! from them.
//!
//! Tree construction and the frontier algorithm both follow Cooper, Harvey
//! and Kennedy, "A Simple, Fast Dominance Algorithm": immediate dominators
//! by intersection over a reverse postorder, frontiers per Figure 5. The
//! post-dominator tree is the dual over the reversed CFG, rooted at the
//! exit block, with declared fake exits acting as extra predecessors of the
//! exit.

use super::{BlockMap, DomNode, Function};

/// Dominance frontier: per block, the blocks on its frontier (possibly
/// with duplicates, like the classical formulation).
pub type DomFrontier = BlockMap<Vec<usize>>;

struct Graph {
    preds: Vec<Vec<usize>>,
    succs: Vec<Vec<usize>>,
    root: usize,
}

impl Graph {
    /// The forward CFG, with fake-exit edges added so the exit block stays
    /// inside the dominator tree even when no ordinary return reaches it.
    fn forward(fn_: &Function) -> Graph {
        let mut preds: Vec<Vec<usize>> = fn_.blocks.iter().map(|b| b.preds.clone()).collect();
        let mut succs: Vec<Vec<usize>> = fn_.blocks.iter().map(|b| b.succs.clone()).collect();
        if let Some(exit) = fn_.exit {
            for b in 0..fn_.blocks.len() {
                if fn_.fake_exits.has(b) {
                    succs[b].push(exit);
                    preds[exit].push(b);
                }
            }
        }
        Graph {
            preds,
            succs,
            root: 0,
        }
    }

    /// The reversed CFG with fake-exit edges added, rooted at the exit.
    fn reverse(fn_: &Function, exit: usize) -> Graph {
        let mut preds: Vec<Vec<usize>> = fn_.blocks.iter().map(|b| b.succs.clone()).collect();
        let mut succs: Vec<Vec<usize>> = fn_.blocks.iter().map(|b| b.preds.clone()).collect();
        for b in 0..fn_.blocks.len() {
            if fn_.fake_exits.has(b) {
                preds[b].push(exit);
                succs[exit].push(b);
            }
        }
        Graph { preds, succs, root: exit }
    }
}

/// Compute the dominator tree and number it for O(1) queries.
pub fn build_dom_tree(fn_: &mut Function) {
    let graph = Graph::forward(fn_);
    let nodes = compute_tree(&graph, fn_.blocks.len());
    for (i, node) in nodes.into_iter().enumerate() {
        fn_.blocks[i].dom = node;
    }
}

/// Compute the post-dominator tree. A function without an exit block keeps
/// empty post-dominator nodes, which suppresses σ placement entirely.
pub fn build_post_dom_tree(fn_: &mut Function) {
    let Some(exit) = fn_.exit else {
        for b in &mut fn_.blocks {
            b.pdom = DomNode::default();
        }
        return;
    };
    let graph = Graph::reverse(fn_, exit);
    let nodes = compute_tree(&graph, fn_.blocks.len());
    for (i, node) in nodes.into_iter().enumerate() {
        fn_.blocks[i].pdom = node;
    }
}

fn compute_tree(graph: &Graph, n: usize) -> Vec<DomNode> {
    let mut nodes = vec![DomNode::default(); n];
    if n == 0 {
        return nodes;
    }

    // Reverse postorder over the graph from its root.
    let mut postorder = Vec::with_capacity(n);
    let mut seen = vec![false; n];
    dfs_postorder(graph, graph.root, &mut seen, &mut postorder);
    let mut po_num = vec![usize::MAX; n];
    for (i, &b) in postorder.iter().enumerate() {
        po_num[b] = i;
    }
    let rpo: Vec<usize> = postorder.iter().rev().copied().collect();

    // Immediate dominators by iterated intersection.
    let mut idom: Vec<Option<usize>> = vec![None; n];
    idom[graph.root] = Some(graph.root);
    let mut changed = true;
    while changed {
        changed = false;
        for &b in &rpo {
            if b == graph.root {
                continue;
            }
            let mut new_idom: Option<usize> = None;
            for &p in &graph.preds[b] {
                if idom[p].is_none() {
                    continue;
                }
                new_idom = Some(match new_idom {
                    None => p,
                    Some(cur) => intersect(&idom, &po_num, p, cur),
                });
            }
            if new_idom.is_some() && idom[b] != new_idom {
                idom[b] = new_idom;
                changed = true;
            }
        }
    }

    for b in 0..n {
        if b == graph.root {
            continue;
        }
        if let Some(parent) = idom[b] {
            nodes[b].idom = Some(parent);
            nodes[parent].children.push(b);
        }
    }

    // Pre/post numbering of the tree for constant-time dominance queries.
    let mut counter = 0u32;
    number(&mut nodes, graph.root, &mut counter);

    nodes
}

fn dfs_postorder(graph: &Graph, b: usize, seen: &mut [bool], out: &mut Vec<usize>) {
    if seen[b] {
        return;
    }
    seen[b] = true;
    for &succ in &graph.succs[b] {
        dfs_postorder(graph, succ, seen, out);
    }
    out.push(b);
}

fn intersect(idom: &[Option<usize>], po_num: &[usize], mut a: usize, mut b: usize) -> usize {
    while a != b {
        while po_num[a] < po_num[b] {
            a = idom[a].expect("intersect walked past the root");
        }
        while po_num[b] < po_num[a] {
            b = idom[b].expect("intersect walked past the root");
        }
    }
    a
}

fn number(nodes: &mut [DomNode], b: usize, counter: &mut u32) {
    nodes[b].pre = *counter;
    *counter += 1;
    for child in nodes[b].children.clone() {
        number(nodes, child, counter);
    }
    nodes[b].post = *counter;
    *counter += 1;
}

/// Build the dominance frontier per CHK Figure 5: for each join block, walk
/// each predecessor up the dominator tree, recording the join, until the
/// join's immediate dominator is reached.
pub fn build_dom_frontier(fn_: &Function) -> DomFrontier {
    let mut df: DomFrontier = vec![Vec::new(); fn_.blocks.len()];
    for b in &fn_.blocks {
        let mut preds = b.preds.clone();
        if Some(b.index) == fn_.exit {
            for i in 0..fn_.blocks.len() {
                if fn_.fake_exits.has(i) {
                    preds.push(i);
                }
            }
        }
        if preds.len() >= 2 {
            for &p in &preds {
                let mut runner = p;
                while Some(runner) != b.dom.idom {
                    df[runner].push(b.index);
                    match fn_.blocks[runner].dom.idom {
                        Some(up) => runner = up,
                        None => break,
                    }
                }
            }
        }
    }
    df
}

/// The post-dominance frontier over the reversed CFG, with fake exits
/// acting as extra successors toward the exit.
pub fn build_post_dom_frontier(fn_: &Function) -> DomFrontier {
    let mut rdf: DomFrontier = vec![Vec::new(); fn_.blocks.len()];
    for b in &fn_.blocks {
        let mut succs = b.succs.clone();
        if fn_.fake_exits.has(b.index) {
            if let Some(exit) = fn_.exit {
                succs.push(exit);
            }
        }
        if succs.len() >= 2 {
            for &s in &succs {
                let mut runner = s;
                while Some(runner) != b.pdom.idom {
                    rdf[runner].push(b.index);
                    match fn_.blocks[runner].pdom.idom {
                        Some(up) => runner = up,
                        None => break,
                    }
                }
            }
        }
    }
    rdf
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::FunctionBuilder;

    fn diamond() -> Function {
        let mut b = FunctionBuilder::new("diamond");
        let entry = b.block();
        let left = b.block();
        let right = b.block();
        let join = b.block();
        let exit = b.block();
        b.edge(entry, left);
        b.edge(entry, right);
        b.edge(left, join);
        b.edge(right, join);
        b.edge(join, exit);
        b.set_exit(exit);
        b.finish()
    }

    #[test]
    fn test_idoms_of_diamond() {
        let f = diamond();
        assert_eq!(f.blocks[1].dom.idom, Some(0));
        assert_eq!(f.blocks[2].dom.idom, Some(0));
        assert_eq!(f.blocks[3].dom.idom, Some(0));
        assert_eq!(f.blocks[4].dom.idom, Some(3));
        assert!(f.dominates(0, 4));
        assert!(f.dominates(3, 4));
        assert!(!f.dominates(1, 3));
    }

    #[test]
    fn test_dom_frontier_of_diamond() {
        let f = diamond();
        let df = build_dom_frontier(&f);
        // The join is on the frontier of both arms, and of nothing else.
        assert_eq!(df[1], vec![3]);
        assert_eq!(df[2], vec![3]);
        assert!(df[0].is_empty());
        assert!(df[3].is_empty());
    }

    #[test]
    fn test_post_dom_frontier_of_diamond() {
        let f = diamond();
        let rdf = build_post_dom_frontier(&f);
        // The branch block is on the post-frontier of both arms.
        assert_eq!(rdf[1], vec![0]);
        assert_eq!(rdf[2], vec![0]);
    }

    #[test]
    fn test_loop_frontier_contains_header() {
        // entry -> header; header -> body, exit; body -> header
        let mut b = FunctionBuilder::new("loop");
        let entry = b.block();
        let header = b.block();
        let body = b.block();
        let exit = b.block();
        b.edge(entry, header);
        b.edge(header, body);
        b.edge(header, exit);
        b.edge(body, header);
        b.set_exit(exit);
        let f = b.finish();

        let df = build_dom_frontier(&f);
        assert!(df[body].contains(&header));
        assert!(df[header].contains(&header));
    }

    #[test]
    fn test_fake_exit_feeds_post_dominance() {
        // entry -> {loops forever, returns}; the infinite arm is a fake
        // exit so post-dominance still covers it.
        let mut b = FunctionBuilder::new("infinite");
        let entry = b.block();
        let spin = b.block();
        let exit = b.block();
        b.edge(entry, spin);
        b.edge(entry, exit);
        b.edge(spin, spin);
        b.set_exit(exit);
        b.fake_exit(spin);
        let f = b.finish();

        assert_eq!(f.blocks[spin].pdom.idom, Some(exit));
    }
}
