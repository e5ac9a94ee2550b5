use crate::{universe::Environment, EvalError, Value};

fn setup(source: &str) -> Environment {
    let mut env = Environment::new();
    env.capture_output();
    env.load_str(source).unwrap();
    env
}

fn eval_pretty(env: &mut Environment, source: &str) -> String {
    let value = env.eval_str(source).unwrap();
    env.pretty().value_to_string(&value)
}

const NUMBERS: &str = "
    (deftemplate t1 (slot n))
    (deftemplate t2 (slot n))
    (deftemplate t3 (slot n))
    (assert (t1 (n 1)) (t1 (n 2)) (t2 (n 3)) (t3 (n 4)) (t3 (n 5)))
";

#[test]
fn rightmost_member_varies_fastest() {
    let mut env = setup(NUMBERS);
    assert_eq!(
        eval_pretty(&mut env, "(find-all-facts ((?a t1 t2) (?b t3)) TRUE)"),
        "(<Fact-1> <Fact-4> <Fact-1> <Fact-5> <Fact-2> <Fact-4> <Fact-2> <Fact-5> \
         <Fact-3> <Fact-4> <Fact-3> <Fact-5>)"
    );

    env.eval_str(
        r#"(do-for-all-facts ((?a t1 t2) (?b t3)) TRUE
             (printout t (fact-slot-value ?a n) "-" (fact-slot-value ?b n) " "))"#,
    )
    .unwrap();
    assert_eq!(env.take_output(), "1-4 1-5 2-4 2-5 3-4 3-5 ");
}

#[test]
fn first_match() {
    let mut env = setup(NUMBERS);
    assert_eq!(
        eval_pretty(&mut env, "(any-factp ((?a t1) (?b t3)) (> ?b:n 4))"),
        "TRUE"
    );
    assert_eq!(
        eval_pretty(&mut env, "(find-fact ((?a t1) (?b t3)) (= (+ ?a:n ?b:n) 6))"),
        "(<Fact-1> <Fact-5>)"
    );
    assert_eq!(
        eval_pretty(
            &mut env,
            "(do-for-fact ((?a t1 t2)) (> ?a:n 1) (fact-slot-value ?a n))"
        ),
        "2"
    );
}

#[test]
fn no_match() {
    let mut env = setup(NUMBERS);
    assert_eq!(eval_pretty(&mut env, "(any-factp ((?a t1)) (> ?a:n 10))"), "FALSE");
    assert_eq!(eval_pretty(&mut env, "(find-fact ((?a t1)) FALSE)"), "()");
    assert_eq!(
        eval_pretty(&mut env, "(find-all-facts ((?a t1) (?b t2)) FALSE)"),
        "()"
    );
    for function in ["do-for-fact", "do-for-all-facts", "delayed-do-for-all-facts"] {
        let source = format!("({} ((?a t1)) (eq ?a:n 0) (printout t ran crlf))", function);
        assert_eq!(eval_pretty(&mut env, &source), "FALSE");
    }
    assert_eq!(env.take_output(), "");
}

#[test]
fn empty_templates_yield_nothing() {
    let mut env = setup("(deftemplate empty (slot x)) (assert (other 1))");
    assert_eq!(
        eval_pretty(&mut env, "(find-all-facts ((?a other) (?b empty)) TRUE)"),
        "()"
    );
}

#[test]
fn streaming_sees_retractions() {
    let mut env = setup(
        "(deftemplate item (slot n))
         (assert (item (n 1)) (item (n 2)) (item (n 3)))",
    );
    // retracting the next fact in the scan hides it from the rest of the enumeration
    env.eval_str(
        "(do-for-all-facts ((?i item)) TRUE
           (printout t (fact-slot-value ?i n) crlf)
           (if (fact-existp (+ (fact-index ?i) 1)) then (retract (+ (fact-index ?i) 1))))",
    )
    .unwrap();
    assert_eq!(env.take_output(), "1\n3\n");
}

#[test]
fn delayed_actions_run_on_snapshot() {
    let source = "(deftemplate item (slot n)) (assert (item (n 1)) (item (n 2)) (item (n 3)))";

    let mut env = setup(source);
    env.eval_str(
        "(delayed-do-for-all-facts ((?i item)) TRUE
           (printout t (fact-slot-value ?i n) crlf)
           (assert (item (n (+ (fact-slot-value ?i n) 10)))))",
    )
    .unwrap();
    assert_eq!(env.take_output(), "1\n2\n3\n");
    assert_eq!(
        eval_pretty(&mut env, "(length$ (find-all-facts ((?i item)) TRUE))"),
        "6"
    );

    // the streaming variant picks up facts asserted during the scan
    let mut env = setup(source);
    env.eval_str(
        "(do-for-all-facts ((?i item)) (< ?i:n 10)
           (printout t (fact-slot-value ?i n) crlf)
           (assert (item (n (+ (fact-slot-value ?i n) 10)))))",
    )
    .unwrap();
    assert_eq!(env.take_output(), "1\n2\n3\n");
    assert_eq!(
        eval_pretty(&mut env, "(length$ (find-all-facts ((?i item)) TRUE))"),
        "6"
    );
}

#[test]
fn retracting_the_current_fact() {
    let source = "(deftemplate item (slot n)) (assert (item (n 1)) (item (n 2)))";
    for function in ["do-for-all-facts", "delayed-do-for-all-facts"] {
        let mut env = setup(source);
        let query = format!(
            "({} ((?i item)) TRUE (printout t (fact-index ?i) crlf) (retract ?i))",
            function
        );
        env.eval_str(&query).unwrap();
        assert_eq!(env.take_output(), "1\n2\n");
        assert_eq!(eval_pretty(&mut env, "(any-factp ((?i item)) TRUE)"), "FALSE");
    }
}

#[test]
fn nested_queries_reach_outward() {
    let mut env = setup(
        "(deftemplate person (slot name) (slot age))
         (deftemplate pet (slot owner) (slot kind))
         (assert (person (name ann) (age 30)) (person (name bob) (age 12)))
         (assert (pet (owner bob) (kind cat)) (pet (owner bob) (kind dog)))",
    );
    // the inner test refers to its own member and to the outer one
    assert_eq!(
        eval_pretty(
            &mut env,
            "(find-all-facts ((?p person))
               (any-factp ((?x pet)) (eq ?x:owner ?p:name)))"
        ),
        "(<Fact-2>)"
    );
    env.eval_str(
        r#"(do-for-all-facts ((?p person)) TRUE
             (do-for-all-facts ((?x pet)) (eq ?x:owner (fact-slot-value ?p name))
               (printout t (fact-slot-value ?p name) " has a " (fact-slot-value ?x kind) crlf)))"#,
    )
    .unwrap();
    assert_eq!(env.take_output(), "bob has a cat\nbob has a dog\n");

    // an inner member shadows an outer one of the same name
    assert_eq!(
        eval_pretty(
            &mut env,
            "(find-fact ((?p person)) (any-factp ((?p pet)) (eq ?p:kind dog)))"
        ),
        "(<Fact-1>)"
    );
}

#[test]
fn slot_refs_only_in_tests() {
    let mut env = setup(
        "(deftemplate person (slot name) (slot age))
         (assert (person (name ann) (age 30)))",
    );
    assert_eq!(
        eval_pretty(&mut env, "(find-fact ((?p person)) (= ?p:age 30))"),
        "(<Fact-1>)"
    );
    let err = env
        .eval_str("(do-for-fact ((?p person)) TRUE ?p:age)")
        .unwrap_err();
    assert!(matches!(
        err,
        crate::Error::Eval(EvalError::UnboundVariable(name)) if name == "p:age"
    ));
}

#[test]
fn halt_stops_enumeration() {
    let mut env = setup(
        "(defglobal ?*seen* = 0)
         (assert (n 1) (n 2) (n 3) (n 4))",
    );
    let result = env
        .eval_str(
            "(do-for-all-facts ((?f n)) TRUE
               (bind ?*seen* (+ ?*seen* 1))
               (if (= ?*seen* 2) then (halt))
               ?*seen*)",
        )
        .unwrap();
    assert_eq!(env.global("seen"), Some(&Value::Integer(2)));
    assert_eq!(result, Value::Integer(1));

    // halting in a test keeps the solutions found so far
    let mut env = setup("(assert (n 1) (n 2) (n 3))");
    assert_eq!(
        eval_pretty(
            &mut env,
            "(find-all-facts ((?f n))
               (if (= (fact-index ?f) 2) then (halt) TRUE else TRUE))"
        ),
        "(<Fact-1>)"
    );
    assert!(env.is_halted());
}

#[test]
fn halt_signal_from_another_handle() {
    let mut env = setup("(assert (n 1) (n 2))");
    let signal = env.halt_signal();
    signal.set();
    // every command starts with a cleared signal
    assert_eq!(
        eval_pretty(&mut env, "(find-all-facts ((?f n)) TRUE)"),
        "(<Fact-1> <Fact-2>)"
    );
    assert!(!signal.is_set());
}

#[test]
fn break_and_return() {
    let mut env = setup("(assert (n 1) (n 2) (n 3))");
    assert_eq!(
        eval_pretty(
            &mut env,
            "(do-for-all-facts ((?f n)) TRUE
               (if (= (fact-index ?f) 2) then (break))
               (fact-index ?f))"
        ),
        "FALSE"
    );
    assert_eq!(
        eval_pretty(
            &mut env,
            "(delayed-do-for-all-facts ((?f n)) TRUE
               (if (= (fact-index ?f) 3) then (break))
               (fact-index ?f))"
        ),
        "FALSE"
    );
    assert_eq!(
        eval_pretty(&mut env, "(do-for-all-facts ((?f n)) TRUE (fact-index ?f))"),
        "3"
    );
    assert_eq!(
        eval_pretty(&mut env, "(do-for-fact ((?f n)) TRUE (break))"),
        "FALSE"
    );

    env.load_str(
        "(deffunction first-big ()
           (do-for-all-facts ((?f n)) TRUE
             (if (> (fact-index ?f) 1) then (return ?f)))
           none)",
    )
    .unwrap();
    assert_eq!(eval_pretty(&mut env, "(first-big)"), "<Fact-2>");

    env.load_str(
        "(deffunction last-one ()
           (delayed-do-for-all-facts ((?f n)) TRUE
             (if (= (fact-index ?f) 3) then (return last)))
           none)",
    )
    .unwrap();
    assert_eq!(eval_pretty(&mut env, "(last-one)"), "last");
}

#[test]
fn busy_counts_released_on_error() {
    let mut env = setup(
        "(deftemplate thing (slot x))
         (assert (thing (x 1)) (thing (x oops)))",
    );
    let err = env
        .eval_str("(find-all-facts ((?t thing)) (> ?t:x 0))")
        .unwrap_err();
    assert!(matches!(
        err,
        crate::Error::Eval(EvalError::TypeMismatch { .. })
    ));
    assert_eq!(env.queries.len(), 0);
    let template = env.resolve_template("thing").unwrap();
    assert!(!template.is_busy());

    // and the template can be removed once its facts are gone
    env.eval_str("(do-for-all-facts ((?t thing)) TRUE (retract ?t))")
        .unwrap();
    assert_eq!(eval_pretty(&mut env, "(undeftemplate thing)"), "TRUE");
}

#[test]
fn recursion_through_queries_is_limited() {
    // run on a thread with the default test stack size
    let handle = std::thread::Builder::new()
        .stack_size(2 * 1024 * 1024)
        .spawn(|| {
            let mut env = setup(
                "(assert (n 1))
                 (deffunction r (?d)
                   (if (> ?d 0)
                     then (do-for-fact ((?f n)) (> ?d 0) (r (- ?d 1)))
                     else done))",
            );
            assert_eq!(env.settings.max_call_depth, 64);
            assert_eq!(eval_pretty(&mut env, "(r 20)"), "done");
            for depth in [40, 120, 250] {
                let err = env.eval_str(&format!("(r {})", depth)).unwrap_err();
                assert!(matches!(
                    err,
                    crate::Error::Eval(EvalError::CallDepthExceeded(64))
                ));
                assert_eq!(env.depth, 0);
                assert_eq!(env.queries.len(), 0);
                assert!(!env.resolve_template("n").unwrap().is_busy());
            }

            env.load_str("(deffunction p (?d) (if (> ?d 0) then (p (- ?d 1)) else done))")
                .unwrap();
            assert_eq!(eval_pretty(&mut env, "(p 60)"), "done");
            assert!(matches!(
                env.eval_str("(p 255)").unwrap_err(),
                crate::Error::Eval(EvalError::CallDepthExceeded(64))
            ));
        })
        .unwrap();
    handle.join().unwrap();
}

#[test]
fn templates_in_use_cannot_be_removed() {
    let mut env = setup("(deftemplate thing (slot x)) (assert (thing (x 1)))");
    let err = env
        .eval_str("(do-for-all-facts ((?t thing)) TRUE (retract ?t) (undeftemplate thing))")
        .unwrap_err();
    assert!(matches!(
        err,
        crate::Error::Eval(EvalError::TemplateInUse(name)) if name == "thing"
    ));
}

#[test]
fn runtime_restrictions() {
    let mut env = setup(
        "(defglobal ?*kinds* = (create$ t1 t3))
         (deftemplate t1 (slot n))
         (deftemplate t3 (slot n))
         (assert (t1 (n 1)) (t3 (n 2)))",
    );
    assert_eq!(
        eval_pretty(&mut env, "(find-all-facts ((?a ?*kinds*)) TRUE)"),
        "(<Fact-1> <Fact-2>)"
    );
    assert_eq!(
        eval_pretty(&mut env, "(find-all-facts ((?a (sym-cat t 3))) TRUE)"),
        "(<Fact-2>)"
    );
    assert!(matches!(
        env.eval_str("(find-all-facts ((?a (sym-cat t 9))) TRUE)"),
        Err(crate::Error::Eval(EvalError::TemplateNotFound(name))) if name == "t9"
    ));
    assert!(matches!(
        env.eval_str("(find-all-facts ((?a (+ 1 2))) TRUE)"),
        Err(crate::Error::Eval(EvalError::InvalidRestriction { .. }))
    ));
}

#[test]
fn runtime_ambiguity_across_modules() {
    let mut env = setup(
        "(defmodule A (export ?ALL))
         (deftemplate thing (slot x))
         (defmodule B (export ?ALL))
         (deftemplate thing (slot x))
         (defmodule C (import A ?ALL) (import B ?ALL))",
    );
    assert!(matches!(
        env.eval_str("(find-all-facts ((?t (sym-cat th ing))) TRUE)"),
        Err(crate::Error::Eval(EvalError::AmbiguousTemplate(_)))
    ));
    assert_eq!(
        eval_pretty(&mut env, "(find-all-facts ((?t A::thing B::thing)) TRUE)"),
        "()"
    );
}

#[test]
fn member_accessor_after_retraction() {
    let mut env = setup("(deftemplate item (slot n)) (assert (item (n 1)))");
    let err = env
        .eval_str("(do-for-fact ((?i item)) TRUE (retract ?i) (fact-slot-value ?i n))")
        .unwrap_err();
    assert!(matches!(
        err,
        crate::Error::Eval(EvalError::FactRetracted(1))
    ));
}
