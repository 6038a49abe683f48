use liftmap::analyzers::match_pattern;
use liftmap::lang::{Ast, AstNode, ConstValue, Object, Token, Type, TypeAndValue, TypeInfo};
use liftmap::pattern::{Bound, Matcher, Pattern};

fn int_tv(v: i128) -> TypeAndValue {
    TypeAndValue {
        ty: Type::Basic("int".into()),
        value: Some(ConstValue::Int(v)),
    }
}

/// Scenario E: bindings made inside a failed `Or` alternative are rolled
/// back; the successful alternative's binding is the one observed.
#[test]
fn test_or_rollback_binding() {
    let mut ast = Ast::new();
    let ident = ast.ident("foo");
    let info = TypeInfo::new();

    let pattern = Pattern::must_parse(r#"(Or (BasicLit "INT" x@_) (Ident x@_))"#);
    let bindings = match_pattern(&ast, &info, &pattern, ident).unwrap();
    assert_eq!(bindings.get("x"), Some(&Bound::Str("foo".into())));
}

/// Scenario F: with `type Alias = int`, a symbol pattern matches through
/// the alias under both its own name and its target's.
#[test]
fn test_symbol_matches_through_alias() {
    let mut ast = Ast::new();
    let callee = ast.ident("Alias");
    let zero = ast.basic_lit(Token::Int, "0");
    let call = ast.call(callee, vec![zero]);

    let mut info = TypeInfo::new();
    let alias = info.add_object(Object::TypeName {
        name: "pkg.Alias".into(),
        package_scope: true,
        alias_of: Some(Type::Basic("int".into())),
    });
    info.record_use(callee, alias);

    let by_target = Pattern::must_parse(r#"(CallExpr (Symbol "int") _)"#);
    assert!(match_pattern(&ast, &info, &by_target, call).is_some());

    let by_alias = Pattern::must_parse(r#"(CallExpr (Symbol "pkg.Alias") _)"#);
    assert!(match_pattern(&ast, &info, &by_alias, call).is_some());

    let other = Pattern::must_parse(r#"(CallExpr (Symbol "string") _)"#);
    assert!(match_pattern(&ast, &info, &other, call).is_none());
}

/// Property 6, transitively: a chain of aliases matches at every layer.
#[test]
fn test_symbol_alias_chain() {
    let mut ast = Ast::new();
    let callee = ast.ident("Outer");
    let call = ast.call(callee, vec![]);

    let mut info = TypeInfo::new();
    let inner = info.add_object(Object::TypeName {
        name: "pkg.Inner".into(),
        package_scope: true,
        alias_of: Some(Type::Basic("int".into())),
    });
    let outer = info.add_object(Object::TypeName {
        name: "pkg.Outer".into(),
        package_scope: true,
        alias_of: Some(Type::Named(inner)),
    });
    info.record_use(callee, outer);

    for name in ["pkg.Outer", "pkg.Inner", "int"] {
        let p = Pattern::must_parse(&format!(r#"(CallExpr (Symbol "{}") _)"#, name));
        assert!(
            match_pattern(&ast, &info, &p, call).is_some(),
            "alias chain failed for {}",
            name
        );
    }
}

#[test]
fn test_symbol_function_and_method() {
    let mut ast = Ast::new();
    let recv = ast.ident("c");
    let sel = ast.ident("Get");
    let method_expr = ast.selector(recv, sel);
    let plain = ast.ident("Fetch");

    let mut info = TypeInfo::new();
    let get = info.add_object(Object::Func {
        full_name: "(*example.com/foo.Client).Get".into(),
    });
    let fetch = info.add_object(Object::Func {
        full_name: "example.com/foo.Fetch".into(),
    });
    info.record_use(sel, get);
    info.record_use(plain, fetch);

    let method = Pattern::must_parse(r#"(Symbol "(*example.com/foo.Client).Get")"#);
    assert!(match_pattern(&ast, &info, &method, method_expr).is_some());

    let func = Pattern::must_parse(r#"(Symbol "example.com/foo.Fetch")"#);
    assert!(match_pattern(&ast, &info, &func, plain).is_some());
    assert!(match_pattern(&ast, &info, &func, method_expr).is_none());
}

#[test]
fn test_symbol_generic_instantiation() {
    let mut ast = Ast::new();
    let f = ast.ident("Map");
    let targ = ast.ident("T");
    let inst = ast.add(AstNode::IndexExpr { x: f, index: targ });

    let mut info = TypeInfo::new();
    let obj = info.add_object(Object::Func {
        full_name: "pkg.Map".into(),
    });
    info.record_use(f, obj);

    let p = Pattern::must_parse(r#"(Symbol "pkg.Map")"#);
    assert!(match_pattern(&ast, &info, &p, inst).is_some());
}

#[test]
fn test_symbol_package_vars_and_consts() {
    let mut ast = Ast::new();
    let global = ast.ident("Timeout");
    let local = ast.ident("timeout");

    let mut info = TypeInfo::new();
    let g = info.add_object(Object::Const {
        name: "Timeout".into(),
        pkg_path: Some("pkg".into()),
        package_scope: true,
    });
    let l = info.add_object(Object::Var {
        name: "timeout".into(),
        pkg_path: Some("pkg".into()),
        package_scope: false,
    });
    info.record_use(global, g);
    info.record_use(local, l);

    let p = Pattern::must_parse(r#"(Symbol "pkg.Timeout")"#);
    assert!(match_pattern(&ast, &info, &p, global).is_some());
    let q = Pattern::must_parse(r#"(Symbol "pkg.timeout")"#);
    assert!(match_pattern(&ast, &info, &q, local).is_none());
}

/// Property 5: `Not` inverts its child and no binding escapes it, even
/// from a partial match inside the child.
#[test]
fn test_not_inverts_and_contains_bindings() {
    let mut ast = Ast::new();
    let f = ast.ident("f");
    let arg = ast.ident("a");
    let call = ast.call(f, vec![arg]);
    let info = TypeInfo::new();

    // The child binds x while matching the callee, then fails on the
    // argument list; the binding must not be observable.
    let p = Pattern::must_parse("(Not (CallExpr (Ident x@_) []))");
    let bindings = match_pattern(&ast, &info, &p, call).unwrap();
    assert!(!bindings.contains_key("x"));

    // When the child succeeds, Not fails.
    let q = Pattern::must_parse("(Not (CallExpr (Ident _) _))");
    assert!(match_pattern(&ast, &info, &q, call).is_none());
}

#[test]
fn test_binding_recall_is_structural() {
    let mut ast = Ast::new();
    let a1 = ast.ident("a");
    let a2 = ast.ident("a");
    let b1 = ast.ident("b");
    let same = ast.binary(a1, Token::Eql, a2);
    let diff = ast.binary(a1, Token::Eql, b1);
    let info = TypeInfo::new();

    let p = Pattern::must_parse(r#"(BinaryExpr x "==" x)"#);
    assert!(match_pattern(&ast, &info, &p, same).is_some());
    assert!(match_pattern(&ast, &info, &p, diff).is_none());
}

/// The empty list pattern distinguishes a present-but-empty else branch
/// from an absent one.
#[test]
fn test_empty_list_vs_absent_else() {
    let mut ast = Ast::new();
    let cond = ast.ident("cond");
    let body = ast.block(vec![]);
    let empty_else = ast.block(vec![]);
    let with_empty_else = ast.add(AstNode::IfStmt {
        init: None,
        cond,
        body,
        els: Some(empty_else),
    });
    let body2 = ast.block(vec![]);
    let without_else = ast.add(AstNode::IfStmt {
        init: None,
        cond,
        body: body2,
        els: None,
    });
    let info = TypeInfo::new();

    let absent = Pattern::must_parse("(IfStmt nil _ _ nil)");
    let empty = Pattern::must_parse("(IfStmt nil _ _ [])");

    assert!(match_pattern(&ast, &info, &absent, without_else).is_some());
    assert!(match_pattern(&ast, &info, &absent, with_empty_else).is_none());
    assert!(match_pattern(&ast, &info, &empty, with_empty_else).is_some());
    assert!(match_pattern(&ast, &info, &empty, without_else).is_none());
}

#[test]
fn test_integer_literal_variants() {
    let mut ast = Ast::new();
    let plain = ast.basic_lit(Token::Int, "42");
    let inner = ast.basic_lit(Token::Int, "1");
    let negated = ast.unary(Token::Sub, inner);
    let unvalued = ast.basic_lit(Token::Int, "9");

    let mut info = TypeInfo::new();
    info.record_type(plain, int_tv(42));
    info.record_type(inner, int_tv(1));
    info.record_type(negated, int_tv(-1));

    let p42 = Pattern::must_parse(r#"(IntegerLiteral "42")"#);
    assert!(match_pattern(&ast, &info, &p42, plain).is_some());
    assert!(match_pattern(&ast, &info, &p42, negated).is_none());

    let pneg = Pattern::must_parse(r#"(IntegerLiteral "-1")"#);
    assert!(match_pattern(&ast, &info, &pneg, negated).is_some());

    // Integer atoms are shorthand for their decimal string.
    let shorthand = Pattern::must_parse("(IntegerLiteral 42)");
    assert!(match_pattern(&ast, &info, &shorthand, plain).is_some());

    // Without a recorded constant value there is no match.
    let pany = Pattern::must_parse("(IntegerLiteral _)");
    assert!(match_pattern(&ast, &info, &pany, unvalued).is_none());
}

#[test]
fn test_truly_constant_expression() {
    let mut ast = Ast::new();
    let lit = ast.basic_lit(Token::Int, "2");
    let named = ast.ident("limit");
    let folded = ast.binary(named, Token::Add, lit);

    let mut info = TypeInfo::new();
    info.record_type(lit, int_tv(2));
    // The checker can fold `limit + 2`, but the expression still names an
    // identifier.
    info.record_type(folded, int_tv(12));

    let p = Pattern::must_parse("(TrulyConstantExpression _)");
    assert!(match_pattern(&ast, &info, &p, lit).is_some());
    assert!(match_pattern(&ast, &info, &p, folded).is_none());
}

#[test]
fn test_builtin_requires_universe_object() {
    let mut ast = Ast::new();
    let len_ident = ast.ident("len");
    let shadowed = ast.ident("len");

    let mut info = TypeInfo::new();
    let builtin = info.add_object(Object::Builtin { name: "len".into() });
    let local = info.add_object(Object::Var {
        name: "len".into(),
        pkg_path: None,
        package_scope: false,
    });
    info.record_use(len_ident, builtin);
    info.record_use(shadowed, local);

    let p = Pattern::must_parse(r#"(Builtin "len")"#);
    assert!(match_pattern(&ast, &info, &p, len_ident).is_some());
    assert!(match_pattern(&ast, &info, &p, shadowed).is_none());
}

#[test]
fn test_object_binds_resolved_object() {
    let mut ast = Ast::new();
    let ident = ast.ident("conn");
    let mut info = TypeInfo::new();
    let obj = info.add_object(Object::Var {
        name: "conn".into(),
        pkg_path: Some("pkg".into()),
        package_scope: true,
    });
    info.record_use(ident, obj);

    let p = Pattern::must_parse(r#"(Object x@_)"#);
    let bindings = match_pattern(&ast, &info, &p, ident).unwrap();
    assert_eq!(bindings.get("x"), Some(&Bound::Str("conn".into())));
}

#[test]
fn test_transparent_nodes_unwrap() {
    let mut ast = Ast::new();
    let a = ast.ident("a");
    let wrapped = ast.paren(a);
    let b = ast.ident("b");
    let expr = ast.binary(wrapped, Token::Add, b);
    let info = TypeInfo::new();

    let p = Pattern::must_parse(r#"(BinaryExpr (Ident "a") "+" (Ident "b"))"#);
    assert!(match_pattern(&ast, &info, &p, expr).is_some());

    // A statement wrapper is equally transparent at the root.
    let stmt = ast.expr_stmt(expr);
    assert!(match_pattern(&ast, &info, &p, stmt).is_some());
}

/// Property 3: matching is deterministic, including its bindings.
#[test]
fn test_match_is_deterministic() {
    let mut ast = Ast::new();
    let f = ast.ident("f");
    let arg = ast.ident("a");
    let call = ast.call(f, vec![arg]);
    let info = TypeInfo::new();

    let p = Pattern::must_parse("(CallExpr fun@(Ident _) [arg@_])");
    let mut m = Matcher::new(&ast, &info);
    assert!(m.matches(&p, call));
    let first = m.state.clone();
    assert!(m.matches(&p, call));
    assert_eq!(first, m.state);
}
