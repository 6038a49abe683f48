//! The generic match driver and per-variant match semantics.
//!
//! Matching pairs a pattern-side value (a [`Node`] or a recalled binding)
//! with a concrete value from the AST. Both sides are normalized by
//! unwrapping transparent nodes before dispatch. Binding effects are
//! tracked in frames so `Or` alternatives and `Not` children can be rolled
//! back without trace.

use std::collections::HashMap;
use std::sync::OnceLock;

use crate::lang::ast::{Ast, AstValue, NodeId, NodeKind};
use crate::lang::types::{ObjId, Object, Type, TypeAndValue, TypeInfo};
use crate::lang::walk::walk;
use crate::lang::Token;

use super::{Node, Pattern};

/// A value captured during matching: the typed union behind the dynamic
/// `name → any` binding map.
#[derive(Debug, Clone, PartialEq)]
pub enum Bound {
    Node(NodeId),
    Nodes(Vec<NodeId>),
    Str(String),
    Tok(Token),
    Object(ObjId),
    TypeVal(TypeAndValue),
    Nil,
}

impl From<AstValue> for Bound {
    fn from(v: AstValue) -> Bound {
        match v {
            AstValue::Node(id) => Bound::Node(id),
            AstValue::Nodes(ids) => Bound::Nodes(ids),
            AstValue::Str(s) => Bound::Str(s),
            AstValue::Tok(t) => Bound::Tok(t),
            AstValue::Nil => Bound::Nil,
        }
    }
}

/// The left-hand side of one match step: either pattern structure or a
/// previously captured concrete value being re-matched.
#[derive(Debug, Clone)]
enum Lhs<'p> {
    Pat(&'p Node),
    Val(Bound),
}

/// Pattern matcher for one AST and its type-checker results.
///
/// The matcher is cheap to construct and single-threaded; `TypeInfo` is
/// read-only while matching.
pub struct Matcher<'a> {
    pub ast: &'a Ast,
    pub type_info: &'a TypeInfo,
    /// Bindings of the most recent successful `matches` call.
    pub state: HashMap<String, Bound>,

    bindings_mapping: Vec<String>,
    set_bindings: Vec<u64>,
}

impl<'a> Matcher<'a> {
    pub fn new(ast: &'a Ast, type_info: &'a TypeInfo) -> Self {
        Self {
            ast,
            type_info,
            state: HashMap::new(),
            bindings_mapping: Vec::new(),
            set_bindings: Vec::new(),
        }
    }

    /// Match `pattern` against `node`. On success the captured bindings are
    /// left in `state`.
    pub fn matches(&mut self, pattern: &Pattern, node: NodeId) -> bool {
        self.bindings_mapping = pattern.bindings.clone();
        self.state.clear();
        self.push();
        let ok = self
            .match_value(&Lhs::Pat(&pattern.root), &Bound::Node(node))
            .is_some();
        self.merge();
        assert!(
            self.set_bindings.is_empty(),
            "{} binding frames left on the stack, expected none",
            self.set_bindings.len()
        );
        ok
    }

    fn set(&mut self, name: &str, idx: usize, value: Bound) {
        self.state.insert(name.to_string(), value);
        let top = self
            .set_bindings
            .last_mut()
            .expect("binding set outside any frame");
        *top |= 1 << idx;
    }

    fn push(&mut self) {
        self.set_bindings.push(0);
    }

    fn pop(&mut self) {
        let set = self.set_bindings.pop().expect("unbalanced frame pop");
        if set != 0 {
            for (i, name) in self.bindings_mapping.iter().enumerate() {
                if set & (1 << i) != 0 {
                    self.state.remove(name);
                }
            }
        }
    }

    fn merge(&mut self) {
        self.set_bindings.pop().expect("unbalanced frame merge");
    }

    /// Unwrap transparent nodes: parenthesized expressions, expression,
    /// declaration and labeled statements, and block statements and field
    /// lists (which become their element sequences).
    fn normalize(&self, mut v: Bound) -> Bound {
        loop {
            let Bound::Node(id) = v else { return v };
            v = match self.ast.node(id) {
                crate::lang::AstNode::ParenExpr { x } => Bound::Node(*x),
                crate::lang::AstNode::ExprStmt { x } => Bound::Node(*x),
                crate::lang::AstNode::DeclStmt { decl } => Bound::Node(*decl),
                crate::lang::AstNode::LabeledStmt { stmt, .. } => Bound::Node(*stmt),
                crate::lang::AstNode::BlockStmt { list } => Bound::Nodes(list.clone()),
                crate::lang::AstNode::FieldList { list } => Bound::Nodes(list.clone()),
                _ => return Bound::Node(id),
            };
        }
    }

    /// The generic match driver. Returns the matched value on success.
    fn match_value(&mut self, l: &Lhs<'_>, r: &Bound) -> Option<Bound> {
        let r = self.normalize(r.clone());

        match l {
            Lhs::Pat(node) => self.match_pattern(node, &r),
            Lhs::Val(v) => {
                let v = self.normalize(v.clone());
                self.match_concrete(&v, &r)
            }
        }
    }

    fn match_pattern(&mut self, node: &Node, r: &Bound) -> Option<Bound> {
        match node {
            Node::Any => Some(r.clone()),

            Node::Nil => match r {
                Bound::Nil => Some(Bound::Nil),
                _ => None,
            },

            Node::String(s) => match r {
                Bound::Tok(tok) => {
                    let want = Token::from_name(s)?;
                    (want == *tok).then(|| Bound::Tok(*tok))
                }
                Bound::Str(o) => (s == o).then(|| r.clone()),
                Bound::TypeVal(tv) => {
                    let value = tv.value.as_ref()?;
                    (value.to_string() == *s).then(|| r.clone())
                }
                _ => None,
            },

            Node::Token(t) => match r {
                Bound::Tok(o) => (t == o).then(|| r.clone()),
                _ => None,
            },

            Node::List { head, tail } => {
                let Bound::Nodes(elems) = r else {
                    // The empty list does not equal the host's null; this is
                    // how an absent else branch differs from an empty one.
                    return None;
                };
                if head.is_nil() {
                    return elems.is_empty().then(|| r.clone());
                }
                if elems.is_empty() {
                    return None;
                }
                self.match_value(&Lhs::Pat(head), &Bound::Node(elems[0]))?;
                self.match_value(&Lhs::Pat(tail), &Bound::Nodes(elems[1..].to_vec()))?;
                Some(r.clone())
            }

            Node::Binding { name, idx, sub } => {
                if sub.is_nil() {
                    if let Some(stored) = self.state.get(name).cloned() {
                        // Recall: the new value must match the stored one.
                        return self.match_value(&Lhs::Val(stored), r);
                    }
                    // First use of a bare binding matches anything.
                    return self.bind(name, *idx, &Node::Any, r);
                }
                self.bind(name, *idx, sub, r)
            }

            Node::Ast { kind, fields } => self.match_node_ast(*kind, fields, r),

            Node::Or(alts) => {
                for alt in alts {
                    self.push();
                    if let Some(v) = self.match_value(&Lhs::Pat(alt), r) {
                        self.merge();
                        return Some(v);
                    }
                    self.pop();
                }
                None
            }

            Node::Not(sub) => {
                // Side effects of the child never escape, whether it
                // matches or not.
                self.push();
                let ok = self.match_value(&Lhs::Pat(sub), r).is_some();
                self.pop();
                if ok {
                    None
                } else {
                    Some(r.clone())
                }
            }

            Node::Builtin { name } => {
                let ident = self.match_ident(name, r)?;
                let obj = self.type_info.object_of(ident)?;
                let ident_name = self.ident_name(ident);
                match self.type_info.object(obj) {
                    Object::Builtin { name } if *name == ident_name => Some(Bound::Node(ident)),
                    _ => None,
                }
            }

            Node::Object { name } => {
                let ident = self.match_ident(name, r)?;
                let obj = self.type_info.object_of(ident)?;
                Some(Bound::Object(obj))
            }

            Node::Symbol { name } => self.match_symbol(name, r),

            Node::IntegerLiteral { value } => {
                let matched = self.match_value(&Lhs::Pat(&integer_literal_base().root), r)?;
                let Bound::Node(expr) = matched else {
                    return None;
                };
                let tv = self.type_info.types.get(&expr)?.clone();
                tv.value.as_ref()?;
                self.match_value(&Lhs::Pat(value), &Bound::TypeVal(tv))?;
                Some(Bound::Node(expr))
            }

            Node::TrulyConstantExpression { value } => {
                let Bound::Node(expr) = r else {
                    return None;
                };
                let tv = self.type_info.types.get(expr)?.clone();
                tv.value.as_ref()?;
                let mut truly = true;
                walk(self.ast, *expr, &mut |id| {
                    if self.ast.kind(id) == NodeKind::Ident {
                        truly = false;
                        return false;
                    }
                    true
                });
                if !truly {
                    return None;
                }
                self.match_value(&Lhs::Pat(value), &Bound::TypeVal(tv))?;
                Some(Bound::Node(*expr))
            }
        }
    }

    /// Evaluate `sub` and record the result under `name`. Declaring the
    /// same name twice in one match is a programmer error in the pattern.
    fn bind(&mut self, name: &str, idx: usize, sub: &Node, r: &Bound) -> Option<Bound> {
        if self.state.contains_key(name) {
            panic!("binding already created: {}", name);
        }
        let new = self.match_value(&Lhs::Pat(sub), r)?;
        self.set(name, idx, new.clone());
        Some(new)
    }

    /// Match a pattern node of a concrete kind against an AST value.
    fn match_node_ast(&mut self, kind: NodeKind, fields: &[Node], r: &Bound) -> Option<Bound> {
        match r {
            Bound::Nodes(elems) => {
                // A lone element stands for its one-element sequence.
                if elems.len() != 1 {
                    return None;
                }
                self.match_node_ast(kind, fields, &Bound::Node(elems[0]))
            }
            Bound::Node(id) => {
                if self.ast.kind(*id) != kind {
                    return None;
                }
                let concrete = self.ast.fields(*id);
                if concrete.len() != fields.len() {
                    panic!(
                        "internal error: {:?} pattern has {} fields, node has {}",
                        kind,
                        fields.len(),
                        concrete.len()
                    );
                }
                for (pat, value) in fields.iter().zip(concrete) {
                    self.match_value(&Lhs::Pat(pat), &Bound::from(value))?;
                }
                Some(Bound::Node(*id))
            }
            _ => None,
        }
    }

    /// Match two concrete values (a recalled binding against the AST).
    fn match_concrete(&mut self, l: &Bound, r: &Bound) -> Option<Bound> {
        match (l, r) {
            (Bound::Nil, Bound::Nil) => Some(Bound::Nil),
            (Bound::Nil, _) | (_, Bound::Nil) => None,

            (Bound::Node(a), Bound::Node(b)) => self.match_ast_ast(*a, *b),

            // An object recalls by identity against what the identifier
            // resolves to.
            (Bound::Object(obj), Bound::Node(id)) => {
                let ident = match self.ast.node(*id) {
                    crate::lang::AstNode::Ident { .. } => *id,
                    crate::lang::AstNode::SelectorExpr { sel, .. } => *sel,
                    _ => return None,
                };
                (self.type_info.object_of(ident) == Some(*obj)).then(|| Bound::Object(*obj))
            }

            // A sequence matches a lone element of the same shape by
            // wrapping the element.
            (Bound::Nodes(_), Bound::Node(b)) => {
                self.match_concrete(l, &Bound::Nodes(vec![*b]))
            }
            (Bound::Node(a), Bound::Nodes(_)) => {
                self.match_concrete(&Bound::Nodes(vec![*a]), r)
            }

            (Bound::Nodes(a), Bound::Nodes(b)) => {
                if a.len() != b.len() {
                    return None;
                }
                for (x, y) in a.iter().zip(b) {
                    self.match_value(&Lhs::Val(Bound::Node(*x)), &Bound::Node(*y))?;
                }
                Some(r.clone())
            }

            _ => None,
        }
    }

    /// Structural comparison of two AST nodes of the same kind, field by
    /// field. Source positions and comments are not fields, so they are
    /// skipped by construction.
    fn match_ast_ast(&mut self, a: NodeId, b: NodeId) -> Option<Bound> {
        if self.ast.kind(a) != self.ast.kind(b) {
            return None;
        }
        let af = self.ast.fields(a);
        let bf = self.ast.fields(b);
        for (x, y) in af.into_iter().zip(bf) {
            match (x, y) {
                (AstValue::Str(x), AstValue::Str(y)) => {
                    if x != y {
                        return None;
                    }
                }
                (AstValue::Tok(x), AstValue::Tok(y)) => {
                    if x != y {
                        return None;
                    }
                }
                (AstValue::Node(x), AstValue::Node(y)) => {
                    self.match_value(&Lhs::Val(Bound::Node(x)), &Bound::Node(y))?;
                }
                (AstValue::Nodes(x), AstValue::Nodes(y)) => {
                    if x.len() != y.len() {
                        return None;
                    }
                    for (xe, ye) in x.iter().zip(&y) {
                        self.match_value(&Lhs::Val(Bound::Node(*xe)), &Bound::Node(*ye))?;
                    }
                }
                (AstValue::Nil, AstValue::Nil) => {}
                _ => return None,
            }
        }
        Some(Bound::Node(b))
    }

    /// Match an identifier whose name field matches `name`, returning the
    /// identifier node.
    fn match_ident(&mut self, name: &Node, r: &Bound) -> Option<NodeId> {
        let fields = [name.clone()];
        let normalized = self.normalize(r.clone());
        let matched = self.match_node_ast(NodeKind::Ident, &fields, &normalized)?;
        match matched {
            Bound::Node(id) => Some(id),
            _ => None,
        }
    }

    fn ident_name(&self, id: NodeId) -> String {
        match self.ast.node(id) {
            crate::lang::AstNode::Ident { name } => name.clone(),
            _ => unreachable!("ident_name on non-identifier"),
        }
    }

    /// Match a callable or typable expression against a fully qualified
    /// name pattern.
    fn match_symbol(&mut self, name: &Node, r: &Bound) -> Option<Bound> {
        let matched = self.match_value(&Lhs::Pat(symbol_callee_base()), r)?;
        let Bound::Node(mut expr) = matched else {
            return None;
        };

        // Unwrap generic instantiation, then parentheses.
        loop {
            expr = match self.ast.node(expr) {
                crate::lang::AstNode::IndexExpr { x, .. } => *x,
                crate::lang::AstNode::IndexListExpr { x, .. } => *x,
                crate::lang::AstNode::ParenExpr { x } => *x,
                _ => break,
            };
        }

        let ident = match self.ast.node(expr) {
            crate::lang::AstNode::Ident { .. } => expr,
            crate::lang::AstNode::SelectorExpr { sel, .. } => *sel,
            _ => unreachable!("symbol base pattern admitted {:?}", self.ast.kind(expr)),
        };
        let obj = self.type_info.object_of(ident)?;

        match self.type_info.object(obj).clone() {
            Object::Func { full_name } => {
                self.match_value(&Lhs::Pat(name), &Bound::Str(full_name))?;
                Some(Bound::Object(obj))
            }
            Object::Builtin { name: short } => {
                self.match_value(&Lhs::Pat(name), &Bound::Str(short))?;
                Some(Bound::Object(obj))
            }
            Object::TypeName { .. } => self.match_type_name(name, obj),
            Object::Var {
                name: simple,
                pkg_path,
                package_scope,
            }
            | Object::Const {
                name: simple,
                pkg_path,
                package_scope,
            } => {
                let pkg = pkg_path?;
                if !package_scope {
                    return None;
                }
                let full = format!("{}.{}", pkg, simple);
                self.match_value(&Lhs::Pat(name), &Bound::Str(full))?;
                Some(Bound::Object(obj))
            }
        }
    }

    /// Match a type name, peeling one alias layer at a time until a name
    /// matches or no layer remains.
    fn match_type_name(&mut self, name: &Node, orig: ObjId) -> Option<Bound> {
        let mut cur = orig;
        loop {
            let Object::TypeName {
                name: type_text,
                package_scope,
                alias_of,
            } = self.type_info.object(cur).clone()
            else {
                return None;
            };
            if !package_scope {
                return None;
            }
            let ok = self
                .match_value(&Lhs::Pat(name), &Bound::Str(type_text))
                .is_some();
            match (ok, alias_of) {
                (true, _) => return Some(Bound::Object(orig)),
                (false, None) => return None,
                (false, Some(target)) => match target {
                    Type::Named(next) => cur = next,
                    Type::Basic(basic) => {
                        self.match_value(&Lhs::Pat(name), &Bound::Str(basic))?;
                        return Some(Bound::Object(orig));
                    }
                    _ => return None,
                },
            }
        }
    }
}

/// `(Or (BasicLit "INT" _) (UnaryExpr (Or "+" "-") (IntegerLiteral _)))`,
/// the shape an integer constant expression may take.
fn integer_literal_base() -> &'static Pattern {
    static Q: OnceLock<Pattern> = OnceLock::new();
    Q.get_or_init(|| {
        Pattern::must_parse(r#"(Or (BasicLit "INT" _) (UnaryExpr (Or "+" "-") (IntegerLiteral _)))"#)
    })
}

/// The expression shapes a `Symbol` may resolve through: an identifier, a
/// selector, or a generic instantiation wrapping either.
fn symbol_callee_base() -> &'static Node {
    static Q: OnceLock<Node> = OnceLock::new();
    Q.get_or_init(|| {
        let base = vec![
            Node::Ast {
                kind: NodeKind::Ident,
                fields: vec![Node::Any],
            },
            Node::Ast {
                kind: NodeKind::SelectorExpr,
                fields: vec![Node::Any, Node::Any],
            },
        ];
        let mut alts = base.clone();
        alts.push(Node::Ast {
            kind: NodeKind::IndexExpr,
            fields: vec![Node::Or(base.clone()), Node::Any],
        });
        alts.push(Node::Ast {
            kind: NodeKind::IndexListExpr,
            fields: vec![Node::Or(base), Node::Any],
        });
        Node::Or(alts)
    })
}
