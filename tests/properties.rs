use proptest::prelude::*;
use rewrite_kernel::{Config, Env};

/// A terminating rule set over the generated vocabulary.
const RULES: &[&str] = &[
  "(= (g a) b)",
  "(forall (?x) (= (f ?x ?x) ?x))",
  "(forall (?x) (= (g (g ?x)) ?x))",
  "(= c 2)",
  "(= (and p q) true)",
];

#[derive(Clone, Debug)]
enum Tm {
  Atom(&'static str),
  Num(i8),
  F(Box<Tm>, Box<Tm>),
  G(Box<Tm>),
  Not(Box<Tm>),
  Eq(Box<Tm>, Box<Tm>),
  Op(&'static str, Vec<Tm>),
}

impl Tm {
  fn src(&self) -> String {
    let list = |head: &str, args: &[&Tm]| {
      let args: Vec<_> = args.iter().map(|a| a.src()).collect();
      format!("({head} {})", args.join(" "))
    };
    match self {
      Tm::Atom(s) => s.to_string(),
      Tm::Num(n) => n.to_string(),
      Tm::F(x, y) => list("f", &[x, y]),
      Tm::G(x) => list("g", &[x]),
      Tm::Not(x) => list("not", &[x]),
      Tm::Eq(x, y) => list("=", &[x, y]),
      Tm::Op(op, args) => list(op, &args.iter().collect::<Vec<_>>()),
    }
  }
}

fn term() -> impl Strategy<Value = Tm> {
  let leaf = prop_oneof![
    prop::sample::select(vec!["a", "b", "c", "p", "q", "r"]).prop_map(Tm::Atom),
    (-3i8..4).prop_map(Tm::Num),
  ];
  leaf.prop_recursive(4, 24, 3, |inner| {
    prop_oneof![
      (inner.clone(), inner.clone()).prop_map(|(x, y)| Tm::F(Box::new(x), Box::new(y))),
      inner.clone().prop_map(|x| Tm::G(Box::new(x))),
      inner.clone().prop_map(|x| Tm::Not(Box::new(x))),
      (inner.clone(), inner.clone()).prop_map(|(x, y)| Tm::Eq(Box::new(x), Box::new(y))),
      (prop::sample::select(vec!["and", "or", "+", "*"]), prop::collection::vec(inner, 2..4))
        .prop_map(|(op, args)| Tm::Op(op, args)),
    ]
  })
}

/// Forced rules rewriting `a` and `(h b)` into each other. They are registered
/// as prepared, since asserting the second one would normalize it away.
const CYCLIC: &[&str] = &["(==> a (h b))", "(==> (h b) a)", "(= (g a) b)"];

fn session(cfg: Config) -> Env {
  let mut env = Env::new(cfg);
  for r in RULES {
    let t = env.parse(r).unwrap();
    env.derive_and_add(t).unwrap();
  }
  env
}

fn cyclic_session(cfg: Config) -> Env {
  let mut env = Env::new(cfg);
  for r in CYCLIC {
    let t = env.parse(r).unwrap();
    for e in env.prepare(t).unwrap() {
      assert!(env.add_rule(e));
    }
  }
  env
}

/// Rewrite each term in turn in one session, printing the results.
fn transcript(mut env: Env, ts: &[Tm]) -> Vec<String> {
  (ts.iter())
    .map(|t| {
      let t = env.parse(&t.src()).unwrap();
      let r = env.rewrite(t);
      env.pp(r).to_string()
    })
    .collect()
}

fn uncached(cfg: &Config) -> Config { Config { cache_enabled: false, ..cfg.clone() } }

proptest! {
  #![proptest_config(ProptestConfig::with_cases(64))]

  #[test]
  fn rewrite_is_idempotent(t in term()) {
    let mut env = session(Config::DEFAULT);
    let t = env.parse(&t.src()).unwrap();
    let r = env.rewrite(t);
    prop_assert_eq!(env.rewrite(r), r);
  }

  #[test]
  fn cache_is_transparent(ts in prop::collection::vec(term(), 1..5), max_depth in 2u32..8) {
    for cfg in [Config::DEFAULT, Config { max_depth, ..Config::DEFAULT }] {
      prop_assert_eq!(
        transcript(session(cfg.clone()), &ts),
        transcript(session(uncached(&cfg)), &ts)
      );
    }
  }

  #[test]
  fn cache_is_transparent_on_cycles(ts in prop::collection::vec(term(), 1..5)) {
    let cfg = Config::DEFAULT;
    let cached = transcript(cyclic_session(cfg.clone()), &ts);
    prop_assert_eq!(cached, transcript(cyclic_session(uncached(&cfg)), &ts));
  }

  #[test]
  fn ground_order_is_total(x in term(), y in term()) {
    let mut env = Env::default();
    let (a, b) = (env.parse(&x.src()).unwrap(), env.parse(&y.src()).unwrap());
    let (ab, ba) = (env.terms.smaller(a, b), env.terms.smaller(b, a));
    prop_assert!(!(ab && ba));
    prop_assert_eq!(a == b, !ab && !ba);
    prop_assert_eq!(env.terms.cmp_terms(a, b), env.terms.cmp_terms(b, a).reverse());
  }

  #[test]
  fn push_pop_is_exact(t in term(), h in term()) {
    let mut env = session(Config::DEFAULT);
    let t = env.parse(&t.src()).unwrap();
    let before = env.rewrite(t);
    let rules = env.net().len();
    let mark = env.push();
    let h = env.parse(&h.src()).unwrap();
    let _ = env.derive_and_add(h);
    env.pop(mark).unwrap();
    prop_assert_eq!(env.net().len(), rules);
    prop_assert_eq!(env.rewrite(t), before);
  }
}
