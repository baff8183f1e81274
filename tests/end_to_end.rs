use rewrite_kernel::{Config, Env, KernelError};

fn assert_fact(env: &mut Env, src: &str) -> bool {
  let t = env.parse(src).unwrap();
  env.derive_and_add(t).unwrap()
}

fn rewrite(env: &mut Env, src: &str) -> String {
  let t = env.parse(src).unwrap();
  let r = env.rewrite(t);
  env.pp(r).to_string()
}

#[test]
fn equation_then_arithmetic() {
  let mut env = Env::default();
  assert!(assert_fact(&mut env, "(= x 3)"));
  assert_eq!(rewrite(&mut env, "(+ x 1)"), "4");
}

#[test]
fn conjunction_fact_refutes_negated_disjunction() {
  let mut env = Env::default();
  assert_fact(&mut env, "(= (and p q) true)");
  assert_eq!(rewrite(&mut env, "(and p q r)"), "r");
  assert_eq!(rewrite(&mut env, "(not (or (not p) (not q)))"), "true");
  assert_eq!(rewrite(&mut env, "(or (not p) (not q))"), "false");
}

#[test]
fn disjunction_fact_inverts() {
  let mut env = Env::default();
  assert_fact(&mut env, "(not (or p q))");
  assert_eq!(rewrite(&mut env, "(and (not p) (not q))"), "true");
  assert_eq!(rewrite(&mut env, "(or q p)"), "false");
}

#[test]
fn hypotheses_are_scoped() {
  let mut env = Env::default();
  let mark = env.push();
  assert_fact(&mut env, "(< x 5)");
  assert_eq!(rewrite(&mut env, "(< x 10)"), "true");
  env.pop(mark).unwrap();
  assert_eq!(rewrite(&mut env, "(< x 10)"), "(< x 10)");
}

#[test]
fn nested_scopes() {
  let mut env = Env::default();
  assert_fact(&mut env, "(= a 1)");
  let outer = env.push();
  assert_fact(&mut env, "(= b 2)");
  let inner = env.push();
  assert_fact(&mut env, "(= c 3)");
  assert_eq!(rewrite(&mut env, "(+ a b c)"), "6");
  env.pop(inner).unwrap();
  assert_eq!(rewrite(&mut env, "(+ a b c)"), "(+ 3 c)");
  env.pop(outer).unwrap();
  assert_eq!(rewrite(&mut env, "(+ a b c)"), "(+ 1 b c)");
  assert_eq!(env.pop(outer), Err(KernelError::UnbalancedPop { mark: 1, depth: 1 }));
}

#[test]
fn priorities_order_competing_rules() {
  let mut env = Env::default();
  assert_fact(&mut env, "(forall (?x) (= (f ?x a) c))");
  assert_eq!(rewrite(&mut env, "(f b a)"), "c");
  assert_fact(&mut env, "(priority 5 (forall (?y) (= (f b ?y) d)))");
  assert_eq!(rewrite(&mut env, "(f b a)"), "d");
}

#[test]
fn priority_out_of_range_is_rejected() {
  let mut env = Env::default();
  let t = env.parse("(priority 4294967296 (p a))").unwrap();
  assert!(matches!(env.derive_and_add(t), Err(KernelError::PriorityOutOfRange { .. })));
  assert!(env.net().is_empty());
}

#[test]
fn unoriented_equations_hold_both_ways() {
  let mut env = Env::default();
  assert_fact(&mut env, "(forall (?x ?y) (= (g ?x ?y) (g ?y ?x)))");
  assert_eq!(rewrite(&mut env, "(= (g a b) (g b a))"), "true");
  assert_eq!(rewrite(&mut env, "(g a b)"), "(g a b)");
}

#[test]
fn uninterpreted_atoms_are_left_alone() {
  let mut env = Env::default();
  assert_eq!(rewrite(&mut env, "(frob (k 1) \"s\")"), "(frob (k 1) \"s\")");
}

#[test]
fn quoted_terms_are_opaque() {
  let mut env = Env::default();
  assert_eq!(rewrite(&mut env, "(quote (+ 1 2))"), "(quote (+ 1 2))");
}

#[test]
fn without_inversion() {
  let mut env = Env::new(Config { invert_rules: false, ..Config::DEFAULT });
  assert_fact(&mut env, "(not (or p q))");
  assert_eq!(rewrite(&mut env, "(and (not p) (not q))"), "(and (not p) (not q))");
}
