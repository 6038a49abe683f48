//! Data model of the target language as consumed by the engines: AST arena,
//! tokens, and type-checker results. Parsing and type inference are provided
//! by an external front-end.

pub mod ast;
pub mod token;
pub mod types;
pub mod walk;

pub use ast::{Ast, AstNode, AstValue, NodeId, NodeKind};
pub use token::Token;
pub use types::{ConstValue, ObjId, Object, Type, TypeAndValue, TypeInfo};
