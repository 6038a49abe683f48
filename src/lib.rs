//! # liftmap
//!
//! A static analysis toolkit for a statically typed, garbage-collected
//! language with packages, methods, interfaces, generics, and closures.
//! The repository hosts many individual checkers, but nearly every checker
//! is a thin frontend over two shared engines:
//!
//! 1. A **syntactic pattern engine** that matches declarative tree patterns
//!    against the language's AST, with typed bindings and optional
//!    consultation of type-checker results.
//! 2. An **SSI lifting pass** over a mid-level IR that promotes stack-like
//!    local cells into pruned Static Single Information form — SSA extended
//!    with σ-nodes at post-dominance frontiers. Every flow-sensitive
//!    checker is built on the lifted IR.
//!
//! ## Matching patterns
//!
//! ```rust
//! use liftmap::lang::{Ast, TypeInfo};
//! use liftmap::pattern::Pattern;
//! use liftmap::analyzers::match_pattern;
//!
//! let mut ast = Ast::new();
//! let callee = ast.ident("println");
//! let arg = ast.ident("x");
//! let call = ast.call(callee, vec![arg]);
//! let info = TypeInfo::new();
//!
//! let pattern = Pattern::must_parse("(CallExpr (Ident _) [x@_])");
//! let bindings = match_pattern(&ast, &info, &pattern, call).unwrap();
//! assert!(bindings.contains_key("x"));
//! ```
//!
//! ## Lifting IR
//!
//! ```rust
//! use liftmap::ir::{FunctionBuilder, Value};
//! use liftmap::lang::Type;
//!
//! let mut b = FunctionBuilder::new("example");
//! let entry = b.block();
//! let x = b.alloc(entry, Type::Basic("int".into()), "x");
//! let forty_two = b.int_const(42);
//! b.store(entry, Value::Instr(x), forty_two);
//! let loaded = b.load(entry, Value::Instr(x));
//! b.other(entry, vec![Value::Instr(loaded)]);
//! b.ret(entry, vec![]);
//! b.set_exit(entry);
//! let mut f = b.finish();
//!
//! assert!(liftmap::ir::lift::lift(&mut f));
//! assert!(f.locals.is_empty());
//! ```
//!
//! ## Scope
//!
//! Parsing and type inference of the target language are provided by an
//! external front-end; this crate consumes its AST and `TypeInfo`. Rule
//! definitions, CLI flags, report formatting, and fix-its live outside the
//! core.

pub mod analyzers;
pub mod config;
pub mod core;
pub mod ir;
pub mod lang;
pub mod pattern;

pub use crate::analyzers::{
    compile_pattern, lift_all, lift_function, match_pattern, matches, LiftStats, Pass,
};
pub use crate::config::{LiftConfig, LiftmapConfig, PatternConfig};
pub use crate::core::{Error, Result};
pub use crate::pattern::{Matcher, Pattern};
