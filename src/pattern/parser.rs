//! Parser for the textual pattern language.
//!
//! Patterns are written in an S-expression form:
//!
//! - `(Head arg … arg)` builds the named variant or AST-kind pattern.
//! - `_` is the wildcard, `nil` the host null.
//! - `"…"` is a string, an integer literal is shorthand for its decimal
//!   string form.
//! - `a:b` is sugar for `(List a b)`, `[a b c]` for a chain of lists, and
//!   `[]` for the empty list.
//! - `name@sub` declares the binding `name` over `sub`; a bare lower-case
//!   identifier binds on first use and recalls afterwards.
//!
//! The `allow_type_info` knob controls whether variants that consult the
//! type checker (`Symbol`, `Object`, `Builtin`, `IntegerLiteral`,
//! `TrulyConstantExpression`) are accepted.

use std::collections::HashMap;
use std::fmt;

use crate::lang::NodeKind;

use super::{Node, Pattern};

/// A pattern parse failure, with the byte offset it occurred at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub position: usize,
    pub message: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "offset {}: {}", self.position, self.message)
    }
}

impl std::error::Error for ParseError {}

impl From<ParseError> for crate::core::Error {
    fn from(e: ParseError) -> Self {
        crate::core::Error::pattern_parse(e.position, e.message)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    LParen,
    RParen,
    LBracket,
    RBracket,
    Colon,
    At,
    Ident(String),
    Str(String),
    Int(String),
}

#[derive(Debug, Clone)]
struct SpannedTok {
    tok: Tok,
    pos: usize,
}

/// Parser for pattern text.
#[derive(Debug, Clone)]
pub struct Parser {
    /// Whether variants that consult type-checker results are accepted.
    pub allow_type_info: bool,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    /// A parser accepting the full language, including type-aware variants.
    pub fn new() -> Self {
        Self {
            allow_type_info: true,
        }
    }

    /// A parser for purely syntactic patterns.
    pub fn without_type_info() -> Self {
        Self {
            allow_type_info: false,
        }
    }

    /// Parse `text` into a compiled [`Pattern`].
    pub fn parse(&self, text: &str) -> Result<Pattern, ParseError> {
        let tokens = lex(text)?;
        let mut st = ParseState {
            allow_type_info: self.allow_type_info,
            tokens,
            next: 0,
            end: text.len(),
            bindings: Vec::new(),
            declared: HashMap::new(),
        };
        let root = st.parse_value()?;
        if st.next != st.tokens.len() {
            return Err(st.err_here("trailing input after pattern"));
        }
        Ok(Pattern::compile(root, st.bindings))
    }
}

struct ParseState {
    allow_type_info: bool,
    tokens: Vec<SpannedTok>,
    next: usize,
    end: usize,
    /// Distinct binding names in order of first appearance.
    bindings: Vec<String>,
    /// Names declared with an explicit subpattern; a second declaration of
    /// the same name is an error.
    declared: HashMap<String, ()>,
}

impl ParseState {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.next).map(|t| &t.tok)
    }

    fn pos(&self) -> usize {
        self.tokens.get(self.next).map_or(self.end, |t| t.pos)
    }

    fn bump(&mut self) -> Option<SpannedTok> {
        let t = self.tokens.get(self.next).cloned();
        if t.is_some() {
            self.next += 1;
        }
        t
    }

    fn err_here(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            position: self.pos(),
            message: message.into(),
        }
    }

    /// Register a binding name, returning its dense index. `declares` is
    /// true for the `name@sub` and `(Binding …)` forms, which may appear at
    /// most once per name.
    fn binding_idx(&mut self, name: &str, declares: bool, pos: usize) -> Result<usize, ParseError> {
        if declares {
            if self.declared.insert(name.to_string(), ()).is_some() {
                return Err(ParseError {
                    position: pos,
                    message: format!("binding {:?} already declared", name),
                });
            }
        }
        if let Some(i) = self.bindings.iter().position(|b| b == name) {
            return Ok(i);
        }
        if self.bindings.len() >= 64 {
            return Err(ParseError {
                position: pos,
                message: "too many distinct bindings in one pattern".into(),
            });
        }
        self.bindings.push(name.to_string());
        Ok(self.bindings.len() - 1)
    }

    /// value := unary (":" value)?   — lists are right-associative.
    fn parse_value(&mut self) -> Result<Node, ParseError> {
        let head = self.parse_unary()?;
        if self.peek() == Some(&Tok::Colon) {
            self.bump();
            let tail = self.parse_value()?;
            return Ok(Node::List {
                head: Box::new(head),
                tail: Box::new(tail),
            });
        }
        Ok(head)
    }

    fn parse_unary(&mut self) -> Result<Node, ParseError> {
        let Some(t) = self.bump() else {
            return Err(ParseError {
                position: self.end,
                message: "expected a pattern".into(),
            });
        };
        match t.tok {
            Tok::LParen => self.parse_compound(),
            Tok::LBracket => self.parse_bracket_list(),
            Tok::Str(s) => Ok(Node::String(s)),
            Tok::Int(s) => Ok(Node::String(s)),
            Tok::Ident(name) => self.parse_ident(name, t.pos),
            other => Err(ParseError {
                position: t.pos,
                message: format!("unexpected {:?}", other),
            }),
        }
    }

    fn parse_ident(&mut self, name: String, pos: usize) -> Result<Node, ParseError> {
        // name@sub declares a binding over the subpattern.
        if self.peek() == Some(&Tok::At) {
            self.bump();
            let idx = self.binding_idx(&name, true, pos)?;
            let sub = self.parse_unary()?;
            return Ok(Node::Binding {
                name,
                idx,
                sub: Box::new(sub),
            });
        }
        match name.as_str() {
            "_" => Ok(Node::Any),
            "nil" => Ok(Node::Nil),
            _ => {
                if name.starts_with(|c: char| c.is_ascii_uppercase()) {
                    // A bare variant name; only field-less kinds make sense.
                    let Some(kind) = NodeKind::from_name(&name) else {
                        return Err(ParseError {
                            position: pos,
                            message: format!("unknown variant {:?}", name),
                        });
                    };
                    if kind.arity() != 0 {
                        return Err(ParseError {
                            position: pos,
                            message: format!(
                                "{} takes {} arguments and cannot be used bare",
                                name,
                                kind.arity()
                            ),
                        });
                    }
                    Ok(Node::Ast {
                        kind,
                        fields: vec![],
                    })
                } else {
                    // Bare lower-case identifier: bind on first use, recall
                    // afterwards.
                    let idx = self.binding_idx(&name, false, pos)?;
                    Ok(Node::Binding {
                        name,
                        idx,
                        sub: Box::new(Node::Nil),
                    })
                }
            }
        }
    }

    fn parse_bracket_list(&mut self) -> Result<Node, ParseError> {
        let mut elems = Vec::new();
        while self.peek() != Some(&Tok::RBracket) {
            if self.peek().is_none() {
                return Err(self.err_here("unterminated list"));
            }
            elems.push(self.parse_value()?);
        }
        self.bump();
        // Desugar to a right-nested chain ending in the empty list.
        let mut node = empty_list();
        for elem in elems.into_iter().rev() {
            node = Node::List {
                head: Box::new(elem),
                tail: Box::new(node),
            };
        }
        Ok(node)
    }

    fn parse_compound(&mut self) -> Result<Node, ParseError> {
        let Some(head) = self.bump() else {
            return Err(ParseError {
                position: self.end,
                message: "unterminated pattern".into(),
            });
        };
        let Tok::Ident(name) = head.tok else {
            return Err(ParseError {
                position: head.pos,
                message: "expected a variant name".into(),
            });
        };

        let mut args = Vec::new();
        if name == "Or" {
            // Alternatives are mutually exclusive, so each may declare the
            // same binding name; only re-declaration along one match path
            // is an error.
            let saved = self.declared.clone();
            let mut union = saved.clone();
            while self.peek() != Some(&Tok::RParen) {
                if self.peek().is_none() {
                    return Err(self.err_here("unterminated pattern"));
                }
                self.declared = saved.clone();
                args.push(self.parse_value()?);
                union.extend(self.declared.drain());
            }
            self.declared = union;
        } else {
            while self.peek() != Some(&Tok::RParen) {
                if self.peek().is_none() {
                    return Err(self.err_here("unterminated pattern"));
                }
                args.push(self.parse_value()?);
            }
        }
        self.bump();

        self.build_compound(&name, args, head.pos)
    }

    fn build_compound(
        &mut self,
        name: &str,
        mut args: Vec<Node>,
        pos: usize,
    ) -> Result<Node, ParseError> {
        let arity = |want: usize, args: &Vec<Node>| -> Result<(), ParseError> {
            if args.len() != want {
                return Err(ParseError {
                    position: pos,
                    message: format!(
                        "{} takes {} arguments, found {}",
                        name,
                        want,
                        args.len()
                    ),
                });
            }
            Ok(())
        };

        match name {
            "Or" => Ok(Node::Or(args)),
            "Not" => {
                arity(1, &args)?;
                Ok(Node::Not(Box::new(args.pop().unwrap())))
            }
            "Any" => {
                arity(0, &args)?;
                Ok(Node::Any)
            }
            "List" => {
                arity(2, &args)?;
                let tail = args.pop().unwrap();
                let head = args.pop().unwrap();
                Ok(Node::List {
                    head: Box::new(head),
                    tail: Box::new(tail),
                })
            }
            "Binding" => {
                arity(2, &args)?;
                let sub = args.pop().unwrap();
                let Node::String(bind_name) = args.pop().unwrap() else {
                    return Err(ParseError {
                        position: pos,
                        message: "Binding takes a quoted name".into(),
                    });
                };
                let idx = self.binding_idx(&bind_name, true, pos)?;
                Ok(Node::Binding {
                    name: bind_name,
                    idx,
                    sub: Box::new(sub),
                })
            }
            "Builtin" | "Object" | "Symbol" | "IntegerLiteral" | "TrulyConstantExpression" => {
                if !self.allow_type_info {
                    return Err(ParseError {
                        position: pos,
                        message: format!("{} requires type information", name),
                    });
                }
                arity(1, &args)?;
                let arg = Box::new(args.pop().unwrap());
                Ok(match name {
                    "Builtin" => Node::Builtin { name: arg },
                    "Object" => Node::Object { name: arg },
                    "Symbol" => Node::Symbol { name: arg },
                    "IntegerLiteral" => Node::IntegerLiteral { value: arg },
                    _ => Node::TrulyConstantExpression { value: arg },
                })
            }
            _ => {
                let Some(kind) = NodeKind::from_name(name) else {
                    return Err(ParseError {
                        position: pos,
                        message: format!("unknown variant {:?}", name),
                    });
                };
                arity(kind.arity(), &args)?;
                Ok(Node::Ast { kind, fields: args })
            }
        }
    }
}

/// The empty list pattern, which matches only an empty sequence.
pub(crate) fn empty_list() -> Node {
    Node::List {
        head: Box::new(Node::Nil),
        tail: Box::new(Node::Nil),
    }
}

fn lex(text: &str) -> Result<Vec<SpannedTok>, ParseError> {
    let mut out = Vec::new();
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        let pos = i;
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                i += 1;
            }
            '(' => {
                out.push(SpannedTok {
                    tok: Tok::LParen,
                    pos,
                });
                i += 1;
            }
            ')' => {
                out.push(SpannedTok {
                    tok: Tok::RParen,
                    pos,
                });
                i += 1;
            }
            '[' => {
                out.push(SpannedTok {
                    tok: Tok::LBracket,
                    pos,
                });
                i += 1;
            }
            ']' => {
                out.push(SpannedTok {
                    tok: Tok::RBracket,
                    pos,
                });
                i += 1;
            }
            ':' => {
                out.push(SpannedTok {
                    tok: Tok::Colon,
                    pos,
                });
                i += 1;
            }
            '@' => {
                out.push(SpannedTok { tok: Tok::At, pos });
                i += 1;
            }
            '"' => {
                i += 1;
                let mut s = String::new();
                loop {
                    if i >= bytes.len() {
                        return Err(ParseError {
                            position: pos,
                            message: "unterminated string".into(),
                        });
                    }
                    match bytes[i] as char {
                        '"' => {
                            i += 1;
                            break;
                        }
                        '\\' => {
                            i += 1;
                            if i >= bytes.len() {
                                return Err(ParseError {
                                    position: pos,
                                    message: "unterminated string".into(),
                                });
                            }
                            s.push(bytes[i] as char);
                            i += 1;
                        }
                        ch => {
                            s.push(ch);
                            i += 1;
                        }
                    }
                }
                out.push(SpannedTok {
                    tok: Tok::Str(s),
                    pos,
                });
            }
            '0'..='9' => {
                let start = i;
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
                out.push(SpannedTok {
                    tok: Tok::Int(text[start..i].to_string()),
                    pos,
                });
            }
            '-' if i + 1 < bytes.len() && bytes[i + 1].is_ascii_digit() => {
                let start = i;
                i += 1;
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
                out.push(SpannedTok {
                    tok: Tok::Int(text[start..i].to_string()),
                    pos,
                });
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < bytes.len() {
                    let c = bytes[i] as char;
                    if c.is_ascii_alphanumeric() || c == '_' {
                        i += 1;
                    } else {
                        break;
                    }
                }
                out.push(SpannedTok {
                    tok: Tok::Ident(text[start..i].to_string()),
                    pos,
                });
            }
            other => {
                return Err(ParseError {
                    position: pos,
                    message: format!("unexpected character {:?}", other),
                });
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepts_basic_forms() {
        let inputs = [
            r#"(Binding "name" _)"#,
            r#"(Binding "name" _:[])"#,
            r#"(Binding "name" _:_:[])"#,
            r#"(CallExpr (Symbol "foo") _)"#,
            r#"(Or (BasicLit "INT" x@_) (Ident x@_))"#,
            r#"[_ (Ident "y") _]"#,
            r#"[]"#,
            r#"(IntegerLiteral 0)"#,
        ];
        let p = Parser::new();
        for input in inputs {
            if let Err(e) = p.parse(input) {
                panic!("failed to parse {:?}: {}", input, e);
            }
        }
    }

    #[test]
    fn test_parse_rejects_malformed() {
        let p = Parser::new();
        for input in [
            "(",
            "(CallExpr _)",
            "(NoSuchVariant _)",
            "(Binding _ _)",
            "(CallExpr x@_ x@_)",
            "(CallExpr _ _) extra",
            r#""unterminated"#,
        ] {
            assert!(p.parse(input).is_err(), "expected error for {:?}", input);
        }
    }

    #[test]
    fn test_duplicate_bindings_across_or_alternatives() {
        // Only one alternative can bind in a given match, so reusing a
        // name across alternatives is legal.
        let p = Parser::new();
        let pat = p.parse(r#"(Or (BasicLit "INT" x@_) (Ident x@_))"#).unwrap();
        assert_eq!(pat.bindings, vec!["x".to_string()]);
        // A sibling of the Or shares its match path with whichever
        // alternative won, so the reuse is rejected.
        assert!(p.parse("(CallExpr (Or (Ident x@_) _) x@_)").is_err());
    }

    #[test]
    fn test_type_info_gate() {
        let gated = [
            r#"(Symbol "foo")"#,
            r#"(Object "foo")"#,
            r#"(Builtin "len")"#,
            "(IntegerLiteral _)",
            "(TrulyConstantExpression _)",
        ];
        let without = Parser::without_type_info();
        let with = Parser::new();
        for input in gated {
            assert!(without.parse(input).is_err(), "gate failed for {:?}", input);
            assert!(with.parse(input).is_ok(), "rejects valid {:?}", input);
        }
    }

    #[test]
    fn test_bare_idents_bind_and_recall() {
        let p = Parser::new().parse("(BinaryExpr x \"==\" x)").unwrap();
        assert_eq!(p.bindings, vec!["x".to_string()]);
    }

    #[test]
    fn test_list_sugar_desugars() {
        let p = Parser::new();
        let bracket = p.parse("[_ _]").unwrap();
        let colon = p.parse("_:_:[]").unwrap();
        assert_eq!(bracket.root, colon.root);
    }

    #[test]
    fn test_errors_carry_position() {
        let err = Parser::new().parse("(CallExpr ? _)").unwrap_err();
        assert_eq!(err.position, 10);
    }
}
