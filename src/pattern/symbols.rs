//! Symbol requirements of a pattern.
//!
//! A pattern that pins fully qualified names via `Symbol` can only ever
//! match code that mentions those names. Collecting them up front gives the
//! driver a cheap triage filter: a source unit whose symbol index lacks the
//! required names is skipped without running the matcher. The filter is
//! conservative; it never affects match semantics.

use std::fmt;

use super::Node;

/// One required symbol, split into package path, receiver type name, and
/// member name. Empty components act as wildcards only in the sense that a
/// malformed `Symbol` string degrades to the all-empty requirement, which
/// matches nothing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexSymbol {
    pub path: String,
    pub type_name: String,
    pub name: String,
}

impl IndexSymbol {
    /// Split a `Symbol` name into its components.
    ///
    /// Accepted forms are `"pkgpath.Name"`, `"(pkgpath.Type).Name"`, and
    /// `"(*pkgpath.Type).Name"`; a bare `"Name"` has an empty path.
    /// Malformed forms (unbalanced parens, missing dots) yield the all-empty
    /// symbol, which matches nothing.
    pub fn parse(s: &str) -> IndexSymbol {
        let empty = IndexSymbol {
            path: String::new(),
            type_name: String::new(),
            name: String::new(),
        };
        if let Some(rest) = s.strip_prefix('(') {
            let Some(close) = rest.find(')') else {
                return empty;
            };
            let recv = rest[..close].strip_prefix('*').unwrap_or(&rest[..close]);
            let after = &rest[close + 1..];
            let Some(name) = after.strip_prefix('.') else {
                return empty;
            };
            let Some(dot) = recv.rfind('.') else {
                return empty;
            };
            IndexSymbol {
                path: recv[..dot].to_string(),
                type_name: recv[dot + 1..].to_string(),
                name: name.to_string(),
            }
        } else {
            match s.rfind('.') {
                Some(dot) => IndexSymbol {
                    path: s[..dot].to_string(),
                    type_name: String::new(),
                    name: s[dot + 1..].to_string(),
                },
                None => IndexSymbol {
                    path: String::new(),
                    type_name: String::new(),
                    name: s.to_string(),
                },
            }
        }
    }
}

impl fmt::Display for IndexSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(IndexSymbol {:?} {:?} {:?})",
            self.path, self.type_name, self.name
        )
    }
}

/// The symbols a pattern requires, as an and/or tree. `Any` places no
/// requirement.
#[derive(Debug, Clone, PartialEq)]
pub enum SymbolsPattern {
    Any,
    Single(IndexSymbol),
    And(Vec<SymbolsPattern>),
    Or(Vec<SymbolsPattern>),
}

impl SymbolsPattern {
    /// Whether a source unit whose symbol index answers `has` could possibly
    /// match the pattern.
    pub fn matched_by<F>(&self, has: &F) -> bool
    where
        F: Fn(&IndexSymbol) -> bool,
    {
        match self {
            SymbolsPattern::Any => true,
            SymbolsPattern::Single(sym) => has(sym),
            SymbolsPattern::And(parts) => parts.iter().all(|p| p.matched_by(has)),
            SymbolsPattern::Or(parts) => parts.iter().any(|p| p.matched_by(has)),
        }
    }
}

impl fmt::Display for SymbolsPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymbolsPattern::Any => write!(f, "_"),
            SymbolsPattern::Single(sym) => write!(f, "{}", sym),
            SymbolsPattern::And(parts) => {
                write!(f, "(And")?;
                for p in parts {
                    write!(f, " {}", p)?;
                }
                write!(f, ")")
            }
            SymbolsPattern::Or(parts) => {
                write!(f, "(Or")?;
                for p in parts {
                    write!(f, " {}", p)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Requirement derived for one pattern subtree.
enum Collected {
    /// The subtree can never match at all (an empty `Or`).
    Impossible,
    /// The subtree imposes no symbol requirement.
    Unconstrained,
    Req(SymbolsPattern),
}

/// Collect the symbol requirements of a pattern tree.
pub fn collect(root: &Node) -> SymbolsPattern {
    match collect_node(root) {
        Collected::Req(p) => p,
        // A pattern that cannot match needs no triage help; report no
        // requirement rather than a fabricated one.
        Collected::Impossible | Collected::Unconstrained => SymbolsPattern::Any,
    }
}

fn collect_node(node: &Node) -> Collected {
    match node {
        Node::Symbol { name } => match symbol_names(name) {
            Some(names) if names.len() == 1 => Collected::Req(SymbolsPattern::Single(
                IndexSymbol::parse(&names[0]),
            )),
            Some(names) => Collected::Req(SymbolsPattern::Or(
                names
                    .iter()
                    .map(|n| SymbolsPattern::Single(IndexSymbol::parse(n)))
                    .collect(),
            )),
            None => Collected::Unconstrained,
        },
        Node::Or(alts) => {
            let mut reqs = Vec::new();
            for alt in alts {
                match collect_node(alt) {
                    // An alternative that can never match contributes no
                    // escape hatch; skip it.
                    Collected::Impossible => {}
                    Collected::Unconstrained => return Collected::Unconstrained,
                    Collected::Req(r) => reqs.push(r),
                }
            }
            match reqs.len() {
                0 => Collected::Impossible,
                1 => Collected::Req(reqs.pop().unwrap()),
                _ => Collected::Req(SymbolsPattern::Or(reqs)),
            }
        }
        Node::Binding { sub, .. } => collect_node(sub),
        Node::Ast { fields, .. } => collect_all(fields.iter()),
        Node::List { head, tail } => collect_all([head.as_ref(), tail.as_ref()].into_iter()),
        // A negated subtree cannot require anything to be present.
        Node::Not(_) => Collected::Unconstrained,
        _ => Collected::Unconstrained,
    }
}

/// Conjunction over sibling subtrees (the fields of one pattern node).
fn collect_all<'a>(nodes: impl Iterator<Item = &'a Node>) -> Collected {
    let mut reqs = Vec::new();
    for node in nodes {
        match collect_node(node) {
            Collected::Impossible => return Collected::Impossible,
            Collected::Unconstrained => {}
            Collected::Req(r) => reqs.push(r),
        }
    }
    match reqs.len() {
        0 => Collected::Unconstrained,
        1 => Collected::Req(reqs.pop().unwrap()),
        _ => Collected::Req(SymbolsPattern::And(reqs)),
    }
}

/// The literal names a `Symbol`'s name subpattern can take, or `None` when
/// it is unconstrained (a wildcard or binding).
fn symbol_names(name: &Node) -> Option<Vec<String>> {
    match name {
        Node::String(s) => Some(vec![s.clone()]),
        Node::Or(alts) => {
            let mut out = Vec::new();
            for alt in alts {
                out.extend(symbol_names(alt)?);
            }
            Some(out)
        }
        Node::Binding { sub, .. } => symbol_names(sub),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use crate::pattern::Pattern;

    fn symbols_of(text: &str) -> String {
        Pattern::must_parse(text).symbols.to_string()
    }

    #[test]
    fn test_collect_or_of_symbols() {
        assert_eq!(
            symbols_of(r#"(Or (Symbol "foo") (Symbol "bar"))"#),
            r#"(Or (IndexSymbol "" "" "foo") (IndexSymbol "" "" "bar"))"#
        );
        assert_eq!(
            symbols_of(r#"(Symbol (Or "foo" "bar"))"#),
            r#"(Or (IndexSymbol "" "" "foo") (IndexSymbol "" "" "bar"))"#
        );
    }

    #[test]
    fn test_collect_and_over_fields() {
        assert_eq!(
            symbols_of(r#"(CallExpr (Symbol "foo") [(Symbol "bar") (Symbol "baz")])"#),
            r#"(And (IndexSymbol "" "" "foo") (IndexSymbol "" "" "bar") (IndexSymbol "" "" "baz"))"#
        );
        assert_eq!(
            symbols_of(r#"(BasicLit (Symbol "foo") (Ident "bar"))"#),
            r#"(IndexSymbol "" "" "foo")"#
        );
    }

    #[test]
    fn test_collect_impossible_alternative_skipped() {
        // (Or) never matches anything, so the "foo" symbol stays required.
        assert_eq!(
            symbols_of(r#"(Or (Symbol "foo") (Or))"#),
            r#"(IndexSymbol "" "" "foo")"#
        );
    }

    #[test]
    fn test_collect_unconstrained_alternatives() {
        assert_eq!(symbols_of(r#"(Or (Symbol "foo") (Ident _))"#), "_");
        assert_eq!(symbols_of(r#"(Or (Symbol "foo") (EmptyStmt))"#), "_");
        assert_eq!(symbols_of(r#"(Or (Symbol "foo") nil)"#), "_");
    }

    #[test]
    fn test_symbol_name_forms() {
        assert_eq!(
            symbols_of(r#"(Symbol "example.com/foo.Get")"#),
            r#"(IndexSymbol "example.com/foo" "" "Get")"#
        );
        assert_eq!(
            symbols_of(r#"(Symbol "(*example.com/foo.Client).Get")"#),
            r#"(IndexSymbol "example.com/foo" "Client" "Get")"#
        );
    }

    #[test]
    fn test_malformed_symbol_names() {
        for (input, want) in [
            (r#"(Symbol "")"#, r#"(IndexSymbol "" "" "")"#),
            (r#"(Symbol "foo.")"#, r#"(IndexSymbol "foo" "" "")"#),
            (r#"(Symbol "(foo")"#, r#"(IndexSymbol "" "" "")"#),
            (r#"(Symbol "(foo)")"#, r#"(IndexSymbol "" "" "")"#),
            (r#"(Symbol "(foo.Bar)")"#, r#"(IndexSymbol "" "" "")"#),
            (r#"(Symbol "(foo.Bar).")"#, r#"(IndexSymbol "foo" "Bar" "")"#),
            (r#"(Symbol "(foo.Bar.")"#, r#"(IndexSymbol "" "" "")"#),
            (r#"(Symbol "(foo).Bar")"#, r#"(IndexSymbol "" "" "")"#),
        ] {
            assert_eq!(symbols_of(input), want, "input: {}", input);
        }
    }
}
