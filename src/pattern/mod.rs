//! Declarative tree patterns over the target-language AST.
//!
//! A [`Pattern`] is compiled from an S-expression text form (see
//! [`parser`]) and evaluated by the [`matcher`]. Patterns bind named holes
//! on first use and structurally re-match them on later uses.

pub mod matcher;
pub mod parser;
pub mod symbols;

use crate::lang::{NodeKind, Token};

pub use matcher::{Bound, Matcher};
pub use parser::{ParseError, Parser};
pub use symbols::{IndexSymbol, SymbolsPattern};

/// A node of the pattern tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Matches any value, binds nothing.
    Any,
    /// Matches the host's null, or any null reference/slice.
    Nil,
    /// Matches an equal string, a token by name, or a constant value whose
    /// stringification equals the string.
    String(String),
    /// Matches a language token by code.
    Token(Token),
    /// Matches a sequence whose first element matches `head` and whose
    /// remainder matches `tail`. The empty list matches only an empty
    /// sequence, not null.
    List { head: Box<Node>, tail: Box<Node> },
    /// A named hole: evaluates `sub` on first use and records the result;
    /// on later uses re-matches the recorded value structurally.
    Binding {
        name: String,
        idx: usize,
        sub: Box<Node>,
    },
    /// Matches an AST node of `kind` whose fields match positionally.
    Ast { kind: NodeKind, fields: Vec<Node> },
    /// Tries each alternative in order; first success wins.
    Or(Vec<Node>),
    /// Succeeds iff the child fails; binds nothing.
    Not(Box<Node>),
    /// Matches an identifier resolving to the universe scope under the
    /// given name.
    Builtin { name: Box<Node> },
    /// Matches an identifier resolving to any object whose simple name
    /// matches.
    Object { name: Box<Node> },
    /// Matches a callable or typable expression whose fully qualified name
    /// matches.
    Symbol { name: Box<Node> },
    /// Matches an integer constant expression, then matches `value` against
    /// its type-and-value descriptor.
    IntegerLiteral { value: Box<Node> },
    /// Matches an expression whose constant value depends on no identifier.
    TrulyConstantExpression { value: Box<Node> },
}

impl Node {
    pub fn is_nil(&self) -> bool {
        matches!(self, Node::Nil)
    }
}

/// A compiled pattern: the tree plus its binding names and the triage
/// information derived from it.
#[derive(Debug, Clone)]
pub struct Pattern {
    pub root: Node,
    /// Distinct binding names, indexed by `Node::Binding::idx`.
    pub bindings: Vec<String>,
    /// Node kinds the pattern can match at its root; `None` when
    /// unconstrained. Used by the AST-walk driver as a pre-filter.
    pub relevant_kinds: Option<Vec<NodeKind>>,
    /// Symbols that must be present for the pattern to ever match.
    pub symbols: SymbolsPattern,
}

impl Pattern {
    /// Compile a finished tree into a pattern. The parser calls this; it is
    /// public so internal patterns can be assembled programmatically.
    pub fn compile(root: Node, bindings: Vec<String>) -> Pattern {
        let relevant_kinds = relevant_kinds(&root);
        let symbols = symbols::collect(&root);
        Pattern {
            root,
            bindings,
            relevant_kinds,
            symbols,
        }
    }

    /// Parse pattern text with type-aware variants permitted.
    pub fn parse(text: &str) -> Result<Pattern, ParseError> {
        Parser::new().parse(text)
    }

    /// Parse pattern text, panicking on error. For patterns embedded in the
    /// toolkit itself.
    pub fn must_parse(text: &str) -> Pattern {
        match Pattern::parse(text) {
            Ok(p) => p,
            Err(e) => panic!("invalid embedded pattern: {}", e),
        }
    }
}

/// Node kinds a pattern can match at its root, or `None` when any kind can.
fn relevant_kinds(node: &Node) -> Option<Vec<NodeKind>> {
    match node {
        Node::Ast { kind, .. } => Some(vec![*kind]),
        Node::Binding { sub, .. } => relevant_kinds(sub),
        Node::Or(alts) => {
            let mut kinds = Vec::new();
            for alt in alts {
                let mut sub = relevant_kinds(alt)?;
                sub.retain(|k| !kinds.contains(k));
                kinds.append(&mut sub);
            }
            Some(kinds)
        }
        Node::Symbol { .. } | Node::Object { .. } | Node::Builtin { .. } => Some(vec![
            NodeKind::Ident,
            NodeKind::SelectorExpr,
            NodeKind::IndexExpr,
            NodeKind::IndexListExpr,
        ]),
        Node::IntegerLiteral { .. } => Some(vec![NodeKind::BasicLit, NodeKind::UnaryExpr]),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relevant_kinds_single() {
        let p = Pattern::must_parse("(CallExpr _ _)");
        assert_eq!(p.relevant_kinds, Some(vec![NodeKind::CallExpr]));
    }

    #[test]
    fn test_relevant_kinds_or_union() {
        let p = Pattern::must_parse("(Or (CallExpr _ _) (Ident _))");
        assert_eq!(
            p.relevant_kinds,
            Some(vec![NodeKind::CallExpr, NodeKind::Ident])
        );
    }

    #[test]
    fn test_relevant_kinds_unconstrained() {
        let p = Pattern::must_parse("(Or (CallExpr _ _) _)");
        assert_eq!(p.relevant_kinds, None);
    }
}
