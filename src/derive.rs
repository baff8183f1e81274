//! Turning facts into rules: canonicalization, De Morgan inversion, and the
//! closure that re-derives a new rule against the rules already known.

use crate::env::{Env, Harvest};
use crate::error::{KernelError, Result};
use crate::net::Entry;
use crate::rewrite::Flags;
use crate::term::{Builtin, QuantKind, TermData};
use crate::types::*;
use std::cmp::Ordering;
use std::collections::HashSet;
use tracing::{debug, warn};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum RuleKind {
  /// `pattern` rewrites to `replacement`, and the replacement is smaller
  Oriented,
  /// An equation with no usable orientation. The pattern is the `=` atom with
  /// sorted sides and the replacement is `true`.
  Unoriented,
  /// A user-forced orientation, exempt from the ordering
  ForceOriented,
}

impl RuleKind {
  fn builtin(self) -> Builtin {
    match self {
      RuleKind::Oriented => Builtin::Oriented,
      RuleKind::Unoriented => Builtin::Unoriented,
      RuleKind::ForceOriented => Builtin::ForceOriented,
    }
  }
}

/// A conditional rewrite rule. Each rule is also a hash-consed term
/// `(rule L R C)`, `(unoriented L R C)` or `(force L R C)`, and two rules are the
/// same rule exactly when those terms are identical.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Rule {
  term: TermId,
  kind: RuleKind,
  pattern: TermId,
  replacement: TermId,
  condition: TermId,
}

impl Rule {
  pub(crate) fn new(
    terms: &mut crate::term::Terms, kind: RuleKind, pattern: TermId, replacement: TermId,
    condition: TermId,
  ) -> Rule {
    let term = terms.bapp(kind.builtin(), vec![pattern, replacement, condition]);
    Rule { term, kind, pattern, replacement, condition }
  }

  pub fn term(&self) -> TermId { self.term }
  pub fn kind(&self) -> RuleKind { self.kind }
  pub fn pattern(&self) -> TermId { self.pattern }
  pub fn replacement(&self) -> TermId { self.replacement }
  /// `true` for unconditional rules
  pub fn condition(&self) -> TermId { self.condition }
}

impl Env {
  fn mk_rule(&mut self, kind: RuleKind, pat: TermId, rep: TermId, cond: TermId) -> Rule {
    Rule::new(&mut self.terms, kind, pat, rep, cond)
  }

  /// `(= a b)` with the sides in term order.
  pub(crate) fn mk_eq_sorted(&mut self, a: TermId, b: TermId) -> TermId {
    let (a, b) = if self.terms.cmp_terms(a, b) == Ordering::Greater { (b, a) } else { (a, b) };
    self.terms.bapp(Builtin::Eq, vec![a, b])
  }

  fn conjoin(&mut self, a: TermId, b: TermId) -> TermId {
    if a == self.terms.tt {
      return b
    }
    if b == self.terms.tt {
      return a
    }
    self.terms.bapp(Builtin::And, vec![a, b])
  }

  /// Canonicalize a fact into rules, without consulting known rules.
  ///
  /// * `true` and `false` contribute nothing, and a conjunction contributes the
  ///   rules of each conjunct.
  /// * `(priority n F)` gives the rules of `F` priority `n`.
  /// * `(implies C F)` and `(forall (..) F :when C)` add `C` to the condition.
  /// * `(not P)` becomes `P -> false`.
  /// * `(= A B)` is oriented towards the smaller side if there is one, and kept
  ///   as an unoriented rule otherwise.
  /// * `(==> A B)` becomes the forced rule `A -> B`.
  /// * Any other `P` becomes `P -> true`.
  pub fn prepare(&mut self, fact: TermId) -> Result<Vec<Entry>> {
    let mut out = vec![];
    self.prepare_into(fact, self.terms.tt, 0, &mut out)?;
    Ok(out)
  }

  pub(crate) fn prepare_into(
    &mut self, fact: TermId, cond: TermId, priority: Priority, out: &mut Vec<Entry>,
  ) -> Result<()> {
    let tm = &self.terms;
    if let TermData::Quant { kind: QuantKind::ForAll, body, cond: guard, .. } = tm[fact] {
      let cond = self.conjoin(cond, guard);
      return self.prepare_into(body, cond, priority, out)
    }
    let Some((b, args)) = tm.as_builtin(fact) else {
      return self.push_rule(RuleKind::Oriented, fact, self.terms.tt, cond, priority, out)
    };
    let args = args.to_vec();
    match (b, &*args) {
      (Builtin::True | Builtin::False, []) => Ok(()),
      (Builtin::And, _) => {
        for &a in &args {
          self.prepare_into(a, cond, priority, out)?
        }
        Ok(())
      }
      (Builtin::Priority, &[n, f]) => {
        let p = match self.terms.as_num(n) {
          Some(v) => v.to_i32().ok_or_else(|| KernelError::PriorityOutOfRange { value: v.to_string() })?,
          None => return Err(KernelError::PriorityOutOfRange { value: self.pp(n).to_string() }),
        };
        self.prepare_into(f, cond, p, out)
      }
      (Builtin::Implies, &[c, f]) => {
        let cond = self.conjoin(cond, c);
        self.prepare_into(f, cond, priority, out)
      }
      (Builtin::Not, &[p]) => match self.terms.as_builtin(p) {
        Some((Builtin::Not, &[q])) => self.prepare_into(q, cond, priority, out),
        Some((Builtin::True | Builtin::False, _)) => Ok(()),
        _ => self.push_rule(RuleKind::Oriented, p, self.terms.ff, cond, priority, out),
      },
      (Builtin::Eq, &[a, c]) => self.orient(a, c, cond, priority, out),
      (Builtin::ForceEq, &[a, c]) =>
        self.push_rule(RuleKind::ForceOriented, a, c, cond, priority, out),
      _ => self.push_rule(RuleKind::Oriented, fact, self.terms.tt, cond, priority, out),
    }
  }

  fn orient(
    &mut self, a: TermId, b: TermId, cond: TermId, priority: Priority, out: &mut Vec<Entry>,
  ) -> Result<()> {
    if a == b {
      return Ok(())
    }
    let tm = &self.terms;
    let (pat, rep) = if tm.smaller(b, a) {
      (a, b)
    } else if tm.smaller(a, b) {
      (b, a)
    } else {
      let eq = self.mk_eq_sorted(a, b);
      return self.push_rule(RuleKind::Unoriented, eq, self.terms.tt, cond, priority, out)
    };
    self.push_rule(RuleKind::Oriented, pat, rep, cond, priority, out)
  }

  fn push_rule(
    &mut self, kind: RuleKind, pat: TermId, rep: TermId, cond: TermId, priority: Priority,
    out: &mut Vec<Entry>,
  ) -> Result<()> {
    if pat != rep {
      let rule = self.mk_rule(kind, pat, rep, cond);
      out.push(Entry { rule, priority })
    }
    Ok(())
  }

  /// The De Morgan dual of a boolean rule over `and`/`or`:
  /// `(and A B) -> true` gives `(or (not A) (not B)) -> false`, and so on.
  pub fn invert_rule(&mut self, e: Entry) -> Option<Entry> {
    let r = e.rule;
    if r.kind() != RuleKind::Oriented {
      return None
    }
    let value = self.terms.bool_value(r.replacement())?;
    let (b, args) = self.terms.as_builtin(r.pattern())?;
    let dual = match b {
      Builtin::And => Builtin::Or,
      Builtin::Or => Builtin::And,
      _ => return None,
    };
    let mut args: Vec<_> = args.to_vec().into_iter().map(|a| self.terms.mk_not(a)).collect();
    args.sort_by(|&x, &y| self.terms.cmp_terms(x, y));
    let pat = self.terms.bapp(dual, args);
    let rep = self.terms.bool(!value);
    let rule = self.mk_rule(RuleKind::Oriented, pat, rep, r.condition());
    Some(Entry { rule, priority: e.priority })
  }

  pub(crate) fn with_inversions(&mut self, mut es: Vec<Entry>) -> Vec<Entry> {
    if self.cfg.invert_rules {
      let inv: Vec<_> = es.clone().into_iter().filter_map(|e| self.invert_rule(e)).collect();
      es.extend(inv)
    }
    es
  }

  /// Normalize a fact against the known rules, canonicalize it, and add the
  /// inversions of the resulting rules.
  pub fn prepare_detailed(&mut self, fact: TermId) -> Result<Vec<Entry>> {
    let fact = self.nc_rewrite(fact);
    let es = self.prepare(fact)?;
    Ok(self.with_inversions(es))
  }

  /// Assert a fact in the current hypothesis layer, together with the rules its
  /// closure derives. Returns whether anything new was registered.
  ///
  /// The rules of the fact itself are always registered; at most
  /// `closure_limit` derived rules are processed after them.
  pub fn derive_and_add(&mut self, fact: TermId) -> Result<bool> {
    debug!(fact = %self.pp(fact), "assert");
    let mut work = self.prepare_detailed(fact)?;
    let mut seen = HashSet::new();
    work.retain(|e| seen.insert(e.rule.term()));
    let limit = work.len() + self.cfg.closure_limit;
    let mut added = false;
    let mut i = 0;
    while let Some(&e) = work.get(i) {
      if i >= limit {
        self.stat("closure_limit");
        warn!(dropped = work.len() - i, "closure limit reached");
        break
      }
      i += 1;
      if self.net.contains(&e.rule) {
        continue
      }
      for d in self.closure_step(e) {
        if seen.insert(d.rule.term()) {
          work.push(d)
        }
      }
      added |= self.add_rule(e);
    }
    Ok(added)
  }

  /// Try the known rules against `e` with `e` itself assumed in a scratch layer.
  /// If the engine reports any step, the rule is rebuilt from its rewritten
  /// components and the re-canonicalized result is returned.
  fn closure_step(&mut self, e: Entry) -> Vec<Entry> {
    let r = e.rule;
    let mark = self.push();
    self.net.add(&self.terms, r, e.priority);
    let outer = self.harvest.replace(Harvest { skip: r.term(), steps: vec![] });
    let flags = Flags::ALLOW_TOP_REPEAT | Flags::DISABLE_REPEAT;
    let new_args: Vec<_> =
      (self.terms.children(r.pattern()).into_iter()).map(|c| self.nc_rewrite_with(c, flags)).collect();
    let pat = self.terms.with_children(r.pattern(), new_args);
    let rep = self.nc_rewrite_with(r.replacement(), flags);
    let cond = self.nc_rewrite_with(r.condition(), flags);
    let harvest = std::mem::replace(&mut self.harvest, outer);
    self.restore(mark);
    let steps = harvest.map_or(0, |h| h.steps.len());
    if steps == 0 || (pat, rep, cond) == (r.pattern(), r.replacement(), r.condition()) {
      return vec![]
    }
    let tm = &mut self.terms;
    let fact = match r.kind() {
      RuleKind::Unoriented => pat,
      RuleKind::ForceOriented => tm.bapp(Builtin::ForceEq, vec![pat, rep]),
      RuleKind::Oriented => match tm.bool_value(rep) {
        Some(true) => pat,
        Some(false) => tm.mk_not(pat),
        None => tm.bapp(Builtin::Eq, vec![pat, rep]),
      },
    };
    if cond == self.terms.ff {
      return vec![]
    }
    let mut out = vec![];
    if let Err(err) = self.prepare_into(fact, cond, e.priority, &mut out) {
      debug!(%err, "derived fact rejected");
      return vec![]
    }
    let out = self.with_inversions(out);
    debug!(from = %self.pp(r.term()), steps, derived = out.len(), "closure");
    out
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn env_with(facts: &[&str]) -> Env {
    let mut env = Env::default();
    for f in facts {
      let t = env.parse(f).unwrap();
      env.derive_and_add(t).unwrap();
    }
    env
  }

  fn rules(env: &mut Env, fact: &str) -> Vec<String> {
    let t = env.parse(fact).unwrap();
    let es = env.prepare(t).unwrap();
    es.iter().map(|e| env.pp(e.rule.term()).to_string()).collect()
  }

  #[test]
  fn canonical_forms() {
    let mut env = Env::default();
    assert_eq!(rules(&mut env, "(= x 3)"), ["(rule x 3 true)"]);
    assert_eq!(rules(&mut env, "(= 3 x)"), ["(rule x 3 true)"]);
    assert_eq!(rules(&mut env, "(not (p a))"), ["(rule (p a) false true)"]);
    assert_eq!(rules(&mut env, "(and (p a) (not (not (q a))))"), [
      "(rule (p a) true true)",
      "(rule (q a) true true)"
    ]);
    assert_eq!(rules(&mut env, "(implies (p ?x) (q ?x))"), ["(rule (q ?x) true (p ?x))"]);
    assert_eq!(rules(&mut env, "(forall (?x) (= (f ?x) ?x) :when (p ?x))"), ["(rule (f ?x) ?x (p ?x))"]);
    assert_eq!(rules(&mut env, "(= (+ ?x ?y) (+ ?y ?x))"), [
      "(unoriented (= (+ ?x ?y) (+ ?y ?x)) true true)"
    ]);
    assert_eq!(rules(&mut env, "(==> a (f a))"), ["(force a (f a) true)"]);
    assert!(rules(&mut env, "true").is_empty());
    assert!(rules(&mut env, "(= a a)").is_empty());
  }

  #[test]
  fn priorities() {
    let mut env = Env::default();
    let t = env.parse("(priority 7 (p a))").unwrap();
    assert_eq!(env.prepare(t).unwrap()[0].priority, 7);
    let t = env.parse("(priority 99999999999 (p a))").unwrap();
    assert!(matches!(env.prepare(t), Err(KernelError::PriorityOutOfRange { .. })));
  }

  #[test]
  fn inversion() {
    let mut env = Env::default();
    let t = env.parse("(and p q)").unwrap();
    let f = env.parse("(rule (and p q) true true)").unwrap();
    let (_, args) = env.terms.as_app(f).unwrap();
    let (pat, rep) = (args[0], args[1]);
    let tt = env.terms.tt;
    let rule = Rule::new(&mut env.terms, RuleKind::Oriented, pat, rep, tt);
    let inv = env.invert_rule(Entry { rule, priority: 3 }).unwrap();
    assert_eq!(env.pp(inv.rule.term()).to_string(), "(rule (or (not p) (not q)) false true)");
    assert_eq!(inv.priority, 3);
    let e = env.prepare(t).unwrap()[0];
    assert!(env.invert_rule(e).is_none());
  }

  #[test]
  fn derive_reports_novelty() {
    let mut env = env_with(&["(= x 3)"]);
    let t = env.parse("(= x 3)").unwrap();
    assert!(!env.derive_and_add(t).unwrap());
    let t = env.parse("(p x)").unwrap();
    assert!(env.derive_and_add(t).unwrap());
    let t = env.parse("(p 3)").unwrap();
    assert!(!env.derive_and_add(t).unwrap());
  }

  fn has_rule(env: &mut Env, src: &str) -> bool {
    let t = env.parse(src).unwrap();
    let args = env.terms.as_app(t).unwrap().1.to_vec();
    let rule = Rule::new(&mut env.terms, RuleKind::Oriented, args[0], args[1], args[2]);
    env.net().contains(&rule)
  }

  #[test]
  fn facts_are_normalized_before_registering() {
    let mut env = env_with(&["(= b c)", "(= (f b) d)", "(= (g (f c)) e)"]);
    assert!(has_rule(&mut env, "(rule c b true)"));
    assert!(has_rule(&mut env, "(rule (g d) e true)"));
  }

  #[test]
  fn closure_rewrites_new_rules() {
    let mut env = env_with(&["(implies (p ?x) (= (h ?x) c))", "(and (p a) (= (k (h a)) d))"]);
    assert!(has_rule(&mut env, "(rule (k (h a)) d true)"));
    assert!(has_rule(&mut env, "(rule (k c) d true)"));
  }

  #[test]
  fn closure_is_capped() {
    let mut env = env_with(&["(implies (p ?x) (= (h ?x) c))"]);
    env.cfg.closure_limit = 0;
    let t = env.parse("(and (p a) (= (k (h a)) d))").unwrap();
    assert!(env.derive_and_add(t).unwrap());
    assert_eq!(env.stats().get("closure_limit"), Some(&1));
    assert!(has_rule(&mut env, "(rule (p a) true true)"));
    assert!(has_rule(&mut env, "(rule (k (h a)) d true)"));
    assert!(!has_rule(&mut env, "(rule (k c) d true)"));
    assert_eq!(env.net().len(), 3);
  }

  #[test]
  fn every_conjunct_is_registered() {
    let mut env = Env::default();
    let conjuncts: Vec<_> = (0..70).map(|i| format!("(p{i} a)")).collect();
    let t = env.parse(&format!("(and {})", conjuncts.join(" "))).unwrap();
    assert!(env.derive_and_add(t).unwrap());
    assert_eq!(env.net().len(), 70);
    assert!(env.stats().get("closure_limit").is_none());
    assert_eq!(rw_str(&mut env, "(p69 a)"), "true");
  }

  fn rw_str(env: &mut Env, src: &str) -> String {
    let t = env.parse(src).unwrap();
    let r = env.rewrite(t);
    env.pp(r).to_string()
  }
}
