//! Pre-order AST traversal.

use super::ast::{Ast, NodeId};

/// Visit `root` and every node below it in pre-order. The visitor returns
/// whether to descend into the node's children.
pub fn walk<F>(ast: &Ast, root: NodeId, visit: &mut F)
where
    F: FnMut(NodeId) -> bool,
{
    if !visit(root) {
        return;
    }
    for child in ast.children(root) {
        walk(ast, child, visit);
    }
}

/// Collect `root` and all nodes below it in pre-order.
pub fn descendants(ast: &Ast, root: NodeId) -> Vec<NodeId> {
    let mut out = Vec::new();
    walk(ast, root, &mut |id| {
        out.push(id);
        true
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_walk_preorder() {
        let mut ast = Ast::new();
        let f = ast.ident("f");
        let a = ast.ident("a");
        let call = ast.call(f, vec![a]);
        let order = descendants(&ast, call);
        assert_eq!(order, vec![call, f, a]);
    }

    #[test]
    fn test_walk_prune() {
        let mut ast = Ast::new();
        let f = ast.ident("f");
        let a = ast.ident("a");
        let call = ast.call(f, vec![a]);
        let mut seen = Vec::new();
        walk(&ast, call, &mut |id| {
            seen.push(id);
            false
        });
        assert_eq!(seen, vec![call]);
    }
}
