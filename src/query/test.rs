use crate::{
    ast::{Expr, QueryFunction},
    textual::{ParseErrorKind, Parser},
    universe::Environment,
    Error,
};

fn parse_err(env: &mut Environment, source: &str) -> ParseErrorKind {
    match env.eval_str(source) {
        Err(Error::Parse(err)) => err.kind,
        other => panic!("expected a parse error, got {:?}", other),
    }
}

fn with_templates() -> Environment {
    let mut env = Environment::new();
    env.load_str("(deftemplate a (slot x)) (deftemplate b (slot y))")
        .unwrap();
    env
}

#[test]
fn call_layout() {
    let mut env = with_templates();
    let expr = Parser::new(&mut env)
        .parse_expr_str("(do-for-all-facts ((?p a b) (?q b)) (eq ?p ?q) (retract ?p) ?q)")
        .unwrap();
    let Expr::Query(query) = expr else {
        panic!("expected a query, got {:?}", expr)
    };
    assert_eq!(query.function, QueryFunction::DoForAllFacts);
    assert_eq!(query.restriction_count(), 2);
    let chains: Vec<_> = query
        .restrictions()
        .iter()
        .map(|e| matches!(e, Expr::Delimiter))
        .collect();
    assert_eq!(chains, [false, false, true, false, true]);
    assert!(matches!(query.test(), Expr::Call(call) if call.args == [
        Expr::QueryFact { depth: 0, position: 0 },
        Expr::QueryFact { depth: 0, position: 1 },
    ]));
    assert!(query.action().is_some());
}

#[test]
fn duplicate_member_variable() {
    let mut env = with_templates();
    assert_eq!(
        parse_err(&mut env, "(any-factp ((?a a) (?a b)) TRUE)"),
        ParseErrorKind::DuplicateMemberVariable {
            function: "any-factp",
            variable: "a".into()
        }
    );
}

#[test]
fn bind_in_test() {
    let mut env = with_templates();
    assert_eq!(
        parse_err(&mut env, "(any-factp ((?a a)) (bind ?x 1))"),
        ParseErrorKind::BindInQueryTest("any-factp")
    );
    // binds of the enclosing body do not count
    env.load_str("(deffunction f () (bind ?x 1) (any-factp ((?a a)) (eq ?x 1)))")
        .unwrap();
}

#[test]
fn rebinding_a_member() {
    let mut env = with_templates();
    assert_eq!(
        parse_err(&mut env, "(do-for-fact ((?a a)) TRUE (bind ?a 5))"),
        ParseErrorKind::RebindMemberVariable {
            function: "do-for-fact",
            variable: "a".into()
        }
    );
    // other binds stay legal and visible after the query
    env.load_str(
        "(deffunction count-a ()
           (bind ?n 0)
           (do-for-all-facts ((?a a)) TRUE (bind ?n (+ ?n 1)))
           ?n)",
    )
    .unwrap();
    env.load_str("(assert (a (x 1)) (a (x 2)))").unwrap();
    assert_eq!(env.eval_str("(count-a)").unwrap(), crate::Value::Integer(2));
}

#[test]
fn template_resolution() {
    let mut env = with_templates();
    assert_eq!(
        parse_err(&mut env, "(find-all-facts ((?a nope)) TRUE)"),
        ParseErrorKind::UnknownTemplate("nope".into())
    );

    let mut env = Environment::new();
    env.load_str(
        "(defmodule A (export ?ALL))
         (deftemplate thing (slot x))
         (defmodule B (export deftemplate thing))
         (deftemplate thing (slot x))
         (defmodule C (import A ?ALL) (import B ?ALL))",
    )
    .unwrap();
    assert_eq!(
        parse_err(&mut env, "(any-factp ((?t thing)) TRUE)"),
        ParseErrorKind::AmbiguousTemplate("thing".into())
    );
    env.eval_str("(any-factp ((?t A::thing)) TRUE)").unwrap();
}

#[test]
fn malformed_restrictions() {
    let mut env = with_templates();
    for source in [
        "(any-factp () TRUE)",
        "(any-factp ?a TRUE)",
        "(any-factp ((a a)) TRUE)",
        "(any-factp ((?a)) TRUE)",
        "(any-factp ((?a 3)) TRUE)",
    ] {
        assert_eq!(
            parse_err(&mut env, source),
            ParseErrorKind::InvalidRestrictions("any-factp"),
            "{}",
            source
        );
    }
    assert_eq!(
        parse_err(&mut env, "(any-factp ((?a a)) TRUE extra)"),
        ParseErrorKind::UnexpectedToken(crate::textual::Token::Symbol)
    );
    assert!(matches!(
        parse_err(&mut env, "(do-for-fact ((?a a)) TRUE)"),
        ParseErrorKind::Syntax(function) if function == "do-for-fact"
    ));
}

#[test]
fn control_flow_contexts() {
    let mut env = with_templates();
    assert_eq!(
        parse_err(&mut env, "(any-factp ((?a a)) (break))"),
        ParseErrorKind::MisplacedBreak
    );
    assert_eq!(
        parse_err(&mut env, "(any-factp ((?a a)) (return TRUE))"),
        ParseErrorKind::MisplacedReturn
    );
    env.load_str("(deffunction f () (any-factp ((?a a)) (return TRUE)))")
        .unwrap();
    env.load_str("(do-for-all-facts ((?a a)) TRUE (break) (return 1))")
        .unwrap();
}

#[test]
fn invalid_slot_reference() {
    let mut env = with_templates();
    assert_eq!(
        parse_err(&mut env, "(any-factp ((?a a)) (eq ?a:1 1))"),
        ParseErrorKind::InvalidSlotReference("a:1".into())
    );
}

#[test]
fn nested_depths() {
    let mut env = with_templates();
    let expr = Parser::new(&mut env)
        .parse_expr_str("(any-factp ((?o a)) (any-factp ((?i b)) (eq ?i ?o)))")
        .unwrap();
    let Expr::Query(outer) = expr else {
        panic!("expected a query")
    };
    let Expr::Query(inner) = outer.test() else {
        panic!("expected a nested query")
    };
    assert!(matches!(inner.test(), Expr::Call(call) if call.args == [
        Expr::QueryFact { depth: 0, position: 0 },
        Expr::QueryFact { depth: 1, position: 0 },
    ]));
}
