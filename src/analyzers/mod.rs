//! The façade checkers build on: pattern matching over an analysis pass and
//! batch lifting of IR functions.
//!
//! Each checker is a thin frontend: it declares patterns (and post-match
//! predicates the core never interprets) and consumes either match results
//! or the lifted IR.

use std::collections::{HashMap, HashSet};

use anyhow::Context as _;
use rayon::prelude::*;
use serde::Serialize;

use crate::config::{LiftConfig, PatternConfig};
use crate::ir::{fold, lift, refine, Function};
use crate::lang::{walk::walk, Ast, NodeId, TypeInfo};
use crate::pattern::{Bound, IndexSymbol, Matcher, Parser, Pattern};

/// One analysis unit as handed over by the front-end: an AST, its
/// type-checker results, the roots to scan, and optionally an index of the
/// symbols the unit mentions (for pattern triage).
pub struct Pass<'a> {
    pub ast: &'a Ast,
    pub type_info: &'a TypeInfo,
    pub roots: Vec<NodeId>,
    pub symbol_index: Option<&'a HashSet<IndexSymbol>>,
}

/// A node a pattern matched, with the bindings it captured.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub node: NodeId,
    pub bindings: HashMap<String, Bound>,
}

/// Compile pattern text under the given configuration, with the
/// type-aware variants gated by `allow_type_info`.
///
/// Checkers register their patterns through this at startup; a failure
/// surfaces with the offending text attached.
pub fn compile_pattern(text: &str, config: &PatternConfig) -> anyhow::Result<Pattern> {
    let parser = if config.allow_type_info {
        Parser::new()
    } else {
        Parser::without_type_info()
    };
    let pattern = parser
        .parse(text)
        .map_err(crate::core::Error::from)
        .with_context(|| format!("invalid pattern {:?}", text))?;
    Ok(pattern)
}

/// Match `pattern` against a single node, returning the captured bindings
/// on success.
pub fn match_pattern(
    ast: &Ast,
    type_info: &TypeInfo,
    pattern: &Pattern,
    node: NodeId,
) -> Option<HashMap<String, Bound>> {
    let mut m = Matcher::new(ast, type_info);
    m.matches(pattern, node).then(|| m.state)
}

/// Walk the pass's roots and collect every node the pattern matches.
///
/// Triage happens before any matching: a pass whose symbol index lacks the
/// pattern's required symbols is skipped outright, and within a pass only
/// nodes of the pattern's relevant kinds are tried.
pub fn matches(pass: &Pass<'_>, pattern: &Pattern) -> Vec<MatchResult> {
    if let Some(index) = pass.symbol_index {
        if !pattern.symbols.matched_by(&|sym| index.contains(sym)) {
            return Vec::new();
        }
    }

    let mut out = Vec::new();
    let mut m = Matcher::new(pass.ast, pass.type_info);
    for &root in &pass.roots {
        walk(pass.ast, root, &mut |id| {
            let relevant = pattern
                .relevant_kinds
                .as_ref()
                .map_or(true, |kinds| kinds.contains(&pass.ast.kind(id)));
            if relevant && m.matches(pattern, id) {
                out.push(MatchResult {
                    node: id,
                    bindings: m.state.clone(),
                });
            }
            true
        });
    }
    out
}

/// Lift one function and run the configured follow-up passes. Returns
/// whether the IR changed.
pub fn lift_function(fn_: &mut Function, config: &LiftConfig) -> bool {
    let mut changed = lift::lift(fn_);
    if config.fold {
        while fold::fold_composites(fn_) {
            changed = true;
        }
    }
    if config.refine {
        refine::refine(fn_);
    }
    changed
}

/// Summary of a batch lift.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LiftStats {
    pub functions: usize,
    pub lifted: usize,
}

/// Lift a batch of functions in parallel. Each function is owned
/// exclusively by the worker lifting it; nothing is shared.
pub fn lift_all(functions: &mut [Function], config: &LiftConfig) -> LiftStats {
    let lifted = functions
        .par_iter_mut()
        .map(|f| lift_function(f, config) as usize)
        .sum();
    LiftStats {
        functions: functions.len(),
        lifted,
    }
}
