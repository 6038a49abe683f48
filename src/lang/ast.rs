//! Arena-allocated abstract syntax tree of the target language.
//!
//! The front-end owns parsing; the toolkit only defines the shape it
//! consumes. Nodes live in a single [`Ast`] arena and reference each other
//! through [`NodeId`] handles. Source positions, legacy scope objects, and
//! comment attachments are deliberately not part of a node's match-relevant
//! fields, so structural comparison skips them by construction.

use super::token::Token;

/// Handle of a node in an [`Ast`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

/// Kind tag of an AST node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Ident,
    BasicLit,
    UnaryExpr,
    BinaryExpr,
    CallExpr,
    SelectorExpr,
    IndexExpr,
    IndexListExpr,
    ParenExpr,
    CompositeLit,
    KeyValueExpr,
    StarExpr,
    AssignStmt,
    ExprStmt,
    DeclStmt,
    LabeledStmt,
    BlockStmt,
    IfStmt,
    ReturnStmt,
    EmptyStmt,
    GenDecl,
    ValueSpec,
    Field,
    FieldList,
    FuncType,
    FuncDecl,
}

impl NodeKind {
    /// The kind named `name` in pattern text, if any.
    pub fn from_name(name: &str) -> Option<NodeKind> {
        let kind = match name {
            "Ident" => NodeKind::Ident,
            "BasicLit" => NodeKind::BasicLit,
            "UnaryExpr" => NodeKind::UnaryExpr,
            "BinaryExpr" => NodeKind::BinaryExpr,
            "CallExpr" => NodeKind::CallExpr,
            "SelectorExpr" => NodeKind::SelectorExpr,
            "IndexExpr" => NodeKind::IndexExpr,
            "IndexListExpr" => NodeKind::IndexListExpr,
            "ParenExpr" => NodeKind::ParenExpr,
            "CompositeLit" => NodeKind::CompositeLit,
            "KeyValueExpr" => NodeKind::KeyValueExpr,
            "StarExpr" => NodeKind::StarExpr,
            "AssignStmt" => NodeKind::AssignStmt,
            "ExprStmt" => NodeKind::ExprStmt,
            "DeclStmt" => NodeKind::DeclStmt,
            "LabeledStmt" => NodeKind::LabeledStmt,
            "BlockStmt" => NodeKind::BlockStmt,
            "IfStmt" => NodeKind::IfStmt,
            "ReturnStmt" => NodeKind::ReturnStmt,
            "EmptyStmt" => NodeKind::EmptyStmt,
            "GenDecl" => NodeKind::GenDecl,
            "ValueSpec" => NodeKind::ValueSpec,
            "Field" => NodeKind::Field,
            "FieldList" => NodeKind::FieldList,
            "FuncType" => NodeKind::FuncType,
            "FuncDecl" => NodeKind::FuncDecl,
            _ => return None,
        };
        Some(kind)
    }

    /// Number of match-relevant fields of the kind.
    pub fn arity(self) -> usize {
        match self {
            NodeKind::Ident => 1,
            NodeKind::BasicLit => 2,
            NodeKind::UnaryExpr => 2,
            NodeKind::BinaryExpr => 3,
            NodeKind::CallExpr => 2,
            NodeKind::SelectorExpr => 2,
            NodeKind::IndexExpr => 2,
            NodeKind::IndexListExpr => 2,
            NodeKind::ParenExpr => 1,
            NodeKind::CompositeLit => 2,
            NodeKind::KeyValueExpr => 2,
            NodeKind::StarExpr => 1,
            NodeKind::AssignStmt => 3,
            NodeKind::ExprStmt => 1,
            NodeKind::DeclStmt => 1,
            NodeKind::LabeledStmt => 2,
            NodeKind::BlockStmt => 1,
            NodeKind::IfStmt => 4,
            NodeKind::ReturnStmt => 1,
            NodeKind::EmptyStmt => 0,
            NodeKind::GenDecl => 2,
            NodeKind::ValueSpec => 3,
            NodeKind::Field => 2,
            NodeKind::FieldList => 1,
            NodeKind::FuncType => 2,
            NodeKind::FuncDecl => 4,
        }
    }
}

/// A node of the target-language AST.
#[derive(Debug, Clone)]
pub enum AstNode {
    Ident { name: String },
    BasicLit { kind: Token, value: String },
    UnaryExpr { op: Token, x: NodeId },
    BinaryExpr { x: NodeId, op: Token, y: NodeId },
    CallExpr { fun: NodeId, args: Vec<NodeId> },
    SelectorExpr { x: NodeId, sel: NodeId },
    IndexExpr { x: NodeId, index: NodeId },
    IndexListExpr { x: NodeId, indices: Vec<NodeId> },
    ParenExpr { x: NodeId },
    CompositeLit { typ: Option<NodeId>, elts: Vec<NodeId> },
    KeyValueExpr { key: NodeId, value: NodeId },
    StarExpr { x: NodeId },
    AssignStmt { lhs: Vec<NodeId>, tok: Token, rhs: Vec<NodeId> },
    ExprStmt { x: NodeId },
    DeclStmt { decl: NodeId },
    LabeledStmt { label: NodeId, stmt: NodeId },
    BlockStmt { list: Vec<NodeId> },
    IfStmt { init: Option<NodeId>, cond: NodeId, body: NodeId, els: Option<NodeId> },
    ReturnStmt { results: Vec<NodeId> },
    EmptyStmt,
    GenDecl { tok: Token, specs: Vec<NodeId> },
    ValueSpec { names: Vec<NodeId>, typ: Option<NodeId>, values: Vec<NodeId> },
    Field { names: Vec<NodeId>, typ: NodeId },
    FieldList { list: Vec<NodeId> },
    FuncType { params: Option<NodeId>, results: Option<NodeId> },
    FuncDecl { recv: Option<NodeId>, name: NodeId, typ: NodeId, body: Option<NodeId> },
}

/// A concrete value on the AST side of a match: a node, a homogeneous node
/// sequence, a raw string or token field, or the host's null.
#[derive(Debug, Clone, PartialEq)]
pub enum AstValue {
    Node(NodeId),
    Nodes(Vec<NodeId>),
    Str(String),
    Tok(Token),
    Nil,
}

impl AstValue {
    fn opt(node: Option<NodeId>) -> AstValue {
        match node {
            Some(id) => AstValue::Node(id),
            None => AstValue::Nil,
        }
    }
}

/// Arena owning the nodes of one parsed source unit.
#[derive(Debug, Default)]
pub struct Ast {
    nodes: Vec<AstNode>,
}

impl Ast {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, node: AstNode) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    pub fn node(&self, id: NodeId) -> &AstNode {
        &self.nodes[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Kind tag of a node.
    pub fn kind(&self, id: NodeId) -> NodeKind {
        match self.node(id) {
            AstNode::Ident { .. } => NodeKind::Ident,
            AstNode::BasicLit { .. } => NodeKind::BasicLit,
            AstNode::UnaryExpr { .. } => NodeKind::UnaryExpr,
            AstNode::BinaryExpr { .. } => NodeKind::BinaryExpr,
            AstNode::CallExpr { .. } => NodeKind::CallExpr,
            AstNode::SelectorExpr { .. } => NodeKind::SelectorExpr,
            AstNode::IndexExpr { .. } => NodeKind::IndexExpr,
            AstNode::IndexListExpr { .. } => NodeKind::IndexListExpr,
            AstNode::ParenExpr { .. } => NodeKind::ParenExpr,
            AstNode::CompositeLit { .. } => NodeKind::CompositeLit,
            AstNode::KeyValueExpr { .. } => NodeKind::KeyValueExpr,
            AstNode::StarExpr { .. } => NodeKind::StarExpr,
            AstNode::AssignStmt { .. } => NodeKind::AssignStmt,
            AstNode::ExprStmt { .. } => NodeKind::ExprStmt,
            AstNode::DeclStmt { .. } => NodeKind::DeclStmt,
            AstNode::LabeledStmt { .. } => NodeKind::LabeledStmt,
            AstNode::BlockStmt { .. } => NodeKind::BlockStmt,
            AstNode::IfStmt { .. } => NodeKind::IfStmt,
            AstNode::ReturnStmt { .. } => NodeKind::ReturnStmt,
            AstNode::EmptyStmt => NodeKind::EmptyStmt,
            AstNode::GenDecl { .. } => NodeKind::GenDecl,
            AstNode::ValueSpec { .. } => NodeKind::ValueSpec,
            AstNode::Field { .. } => NodeKind::Field,
            AstNode::FieldList { .. } => NodeKind::FieldList,
            AstNode::FuncType { .. } => NodeKind::FuncType,
            AstNode::FuncDecl { .. } => NodeKind::FuncDecl,
        }
    }

    /// Match-relevant fields of a node, in declaration order.
    pub fn fields(&self, id: NodeId) -> Vec<AstValue> {
        match self.node(id) {
            AstNode::Ident { name } => vec![AstValue::Str(name.clone())],
            AstNode::BasicLit { kind, value } => {
                vec![AstValue::Tok(*kind), AstValue::Str(value.clone())]
            }
            AstNode::UnaryExpr { op, x } => vec![AstValue::Tok(*op), AstValue::Node(*x)],
            AstNode::BinaryExpr { x, op, y } => {
                vec![AstValue::Node(*x), AstValue::Tok(*op), AstValue::Node(*y)]
            }
            AstNode::CallExpr { fun, args } => {
                vec![AstValue::Node(*fun), AstValue::Nodes(args.clone())]
            }
            AstNode::SelectorExpr { x, sel } => {
                vec![AstValue::Node(*x), AstValue::Node(*sel)]
            }
            AstNode::IndexExpr { x, index } => {
                vec![AstValue::Node(*x), AstValue::Node(*index)]
            }
            AstNode::IndexListExpr { x, indices } => {
                vec![AstValue::Node(*x), AstValue::Nodes(indices.clone())]
            }
            AstNode::ParenExpr { x } => vec![AstValue::Node(*x)],
            AstNode::CompositeLit { typ, elts } => {
                vec![AstValue::opt(*typ), AstValue::Nodes(elts.clone())]
            }
            AstNode::KeyValueExpr { key, value } => {
                vec![AstValue::Node(*key), AstValue::Node(*value)]
            }
            AstNode::StarExpr { x } => vec![AstValue::Node(*x)],
            AstNode::AssignStmt { lhs, tok, rhs } => vec![
                AstValue::Nodes(lhs.clone()),
                AstValue::Tok(*tok),
                AstValue::Nodes(rhs.clone()),
            ],
            AstNode::ExprStmt { x } => vec![AstValue::Node(*x)],
            AstNode::DeclStmt { decl } => vec![AstValue::Node(*decl)],
            AstNode::LabeledStmt { label, stmt } => {
                vec![AstValue::Node(*label), AstValue::Node(*stmt)]
            }
            AstNode::BlockStmt { list } => vec![AstValue::Nodes(list.clone())],
            AstNode::IfStmt {
                init,
                cond,
                body,
                els,
            } => vec![
                AstValue::opt(*init),
                AstValue::Node(*cond),
                AstValue::Node(*body),
                AstValue::opt(*els),
            ],
            AstNode::ReturnStmt { results } => vec![AstValue::Nodes(results.clone())],
            AstNode::EmptyStmt => vec![],
            AstNode::GenDecl { tok, specs } => {
                vec![AstValue::Tok(*tok), AstValue::Nodes(specs.clone())]
            }
            AstNode::ValueSpec { names, typ, values } => vec![
                AstValue::Nodes(names.clone()),
                AstValue::opt(*typ),
                AstValue::Nodes(values.clone()),
            ],
            AstNode::Field { names, typ } => {
                vec![AstValue::Nodes(names.clone()), AstValue::Node(*typ)]
            }
            AstNode::FieldList { list } => vec![AstValue::Nodes(list.clone())],
            AstNode::FuncType { params, results } => {
                vec![AstValue::opt(*params), AstValue::opt(*results)]
            }
            AstNode::FuncDecl {
                recv,
                name,
                typ,
                body,
            } => vec![
                AstValue::opt(*recv),
                AstValue::Node(*name),
                AstValue::Node(*typ),
                AstValue::opt(*body),
            ],
        }
    }

    /// Immediate child nodes, for traversal.
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        for field in self.fields(id) {
            match field {
                AstValue::Node(n) => out.push(n),
                AstValue::Nodes(ns) => out.extend(ns),
                _ => {}
            }
        }
        out
    }

    // Convenience constructors, used by front-end adapters and tests.

    pub fn ident(&mut self, name: impl Into<String>) -> NodeId {
        self.add(AstNode::Ident { name: name.into() })
    }

    pub fn basic_lit(&mut self, kind: Token, value: impl Into<String>) -> NodeId {
        self.add(AstNode::BasicLit {
            kind,
            value: value.into(),
        })
    }

    pub fn unary(&mut self, op: Token, x: NodeId) -> NodeId {
        self.add(AstNode::UnaryExpr { op, x })
    }

    pub fn binary(&mut self, x: NodeId, op: Token, y: NodeId) -> NodeId {
        self.add(AstNode::BinaryExpr { x, op, y })
    }

    pub fn call(&mut self, fun: NodeId, args: Vec<NodeId>) -> NodeId {
        self.add(AstNode::CallExpr { fun, args })
    }

    pub fn selector(&mut self, x: NodeId, sel: NodeId) -> NodeId {
        self.add(AstNode::SelectorExpr { x, sel })
    }

    pub fn paren(&mut self, x: NodeId) -> NodeId {
        self.add(AstNode::ParenExpr { x })
    }

    pub fn block(&mut self, list: Vec<NodeId>) -> NodeId {
        self.add(AstNode::BlockStmt { list })
    }

    pub fn expr_stmt(&mut self, x: NodeId) -> NodeId {
        self.add(AstNode::ExprStmt { x })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arity_matches_fields() {
        let mut ast = Ast::new();
        let x = ast.ident("x");
        let y = ast.ident("y");
        let nodes = [
            ast.add(AstNode::BinaryExpr {
                x,
                op: Token::Add,
                y,
            }),
            ast.add(AstNode::IfStmt {
                init: None,
                cond: x,
                body: y,
                els: None,
            }),
            ast.add(AstNode::EmptyStmt),
            ast.call(x, vec![y]),
        ];
        for id in nodes {
            assert_eq!(ast.fields(id).len(), ast.kind(id).arity());
        }
    }

    #[test]
    fn test_children_flattens_lists() {
        let mut ast = Ast::new();
        let f = ast.ident("f");
        let a = ast.ident("a");
        let b = ast.ident("b");
        let call = ast.call(f, vec![a, b]);
        assert_eq!(ast.children(call), vec![f, a, b]);
    }

    #[test]
    fn test_kind_from_name() {
        assert_eq!(NodeKind::from_name("CallExpr"), Some(NodeKind::CallExpr));
        assert_eq!(NodeKind::from_name("NoSuchNode"), None);
    }
}
