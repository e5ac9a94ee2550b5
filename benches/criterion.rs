use criterion::{criterion_group, criterion_main, Criterion};
use factset::{Environment, Value};

macro_rules! sanity_check {
    ($computation:expr,$result:expr) => {{
        let r = $computation;
        assert_eq!(r, $result);
        r
    }};
}

/// Three templates with `size` facts each, numbered `0..size`.
fn prepare_join(size: usize) -> Environment {
    let mut env = Environment::new();
    env.load_str(
        "(deftemplate a (slot n))
         (deftemplate b (slot n))
         (deftemplate c (slot n))
         (deffunction fill (?size)
           (bind ?i 0)
           (while (< ?i ?size)
             (assert (a (n ?i)) (b (n ?i)) (c (n ?i)))
             (bind ?i (+ ?i 1))))",
    )
    .unwrap();
    env.eval_str(&format!("(fill {})", size)).unwrap();
    env
}

fn length(value: Value) -> usize {
    match value {
        Value::Multifield(values) => values.len(),
        _ => 0,
    }
}

/// All triples where the numbers add up to the size.
fn join_sum(env: &mut Environment, size: usize) -> usize {
    let source = format!(
        "(find-all-facts ((?a a) (?b b) (?c c)) (= (+ ?a:n ?b:n ?c:n) {}))",
        size
    );
    let result = env.eval_str(&source).unwrap();
    length(result)
}

fn join_equal(env: &mut Environment) -> usize {
    let result = env
        .eval_str("(find-all-facts ((?a a) (?b b) (?c c)) (= ?a:n ?b:n ?c:n))")
        .unwrap();
    length(result)
}

fn any_factp_last(env: &mut Environment, size: usize) -> Value {
    let source = format!(
        "(any-factp ((?a a) (?b b)) (and (= ?a:n {0}) (= ?b:n {0})))",
        size - 1
    );
    env.eval_str(&source).unwrap()
}

fn delayed_retract_all(size: usize) -> Value {
    let mut env = prepare_join(size);
    env.eval_str("(delayed-do-for-all-facts ((?a a b c)) TRUE (retract ?a))")
        .unwrap()
}

fn criterion_benchmark(c: &mut Criterion) {
    let size = 30;
    let mut env = prepare_join(size);

    // pairs (i, j) with i + j <= size - 1 have exactly one k completing the sum
    let expected = size * (size + 1) / 2 * 3;
    c.bench_function("join sum", |b| {
        b.iter(|| sanity_check!(join_sum(&mut env, size - 1), expected))
    });
    c.bench_function("join equal", |b| {
        b.iter(|| sanity_check!(join_equal(&mut env), size * 3))
    });
    c.bench_function("any-factp last", |b| {
        b.iter(|| sanity_check!(any_factp_last(&mut env, size), Value::TRUE))
    });
    c.bench_function("delayed retract all", |b| {
        b.iter(|| sanity_check!(delayed_retract_all(size), Value::TRUE))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
