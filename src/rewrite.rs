//! The rewrite engine: bottom-up normalization with memoized normal forms,
//! cycle detection, AC matching and contextual hypotheses.

use crate::derive::Rule;
use crate::env::{Annot, Env};
use crate::net::Entry;
use crate::term::{Builtin, Subst, TermData};
use crate::types::*;
use itertools::Itertools;
use std::collections::HashSet;
use tracing::{debug, trace, warn};

const RED_ZONE: usize = 64 * 1024;
const STACK_PER_RECURSION: usize = 1024 * 1024;

/// Options for one normalization request.
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct Flags(u8);

impl Flags {
  pub const NONE: Flags = Flags(0);
  /// Fully renormalize the result of a top-level step, instead of only
  /// retrying top-level steps on it
  pub const ALLOW_TOP_REPEAT: Flags = Flags(1);
  /// Do not look an unrewritable atom up as `(not atom)`
  pub const NO_NEG_TRANSITIVITY: Flags = Flags(2);
  /// Stop after the first top-level step at each node
  pub const DISABLE_REPEAT: Flags = Flags(4);

  pub fn contains(self, other: Flags) -> bool { self.0 & other.0 == other.0 }
  pub fn without(self, other: Flags) -> Flags { Flags(self.0 & !other.0) }
}

impl std::ops::BitOr for Flags {
  type Output = Flags;
  fn bitor(self, rhs: Flags) -> Flags { Flags(self.0 | rhs.0) }
}

impl std::fmt::Debug for Flags {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let names = [
      (Flags::ALLOW_TOP_REPEAT, "ALLOW_TOP_REPEAT"),
      (Flags::NO_NEG_TRANSITIVITY, "NO_NEG_TRANSITIVITY"),
      (Flags::DISABLE_REPEAT, "DISABLE_REPEAT"),
    ];
    write!(f, "Flags({})", names.iter().filter(|p| self.contains(p.0)).map(|p| p.1).join(" | "))
  }
}

impl Env {
  /// Normalize `t` under the current rules and hypotheses. Each call is one
  /// episode: the inner normalization is repeated until it reaches a fixpoint.
  pub fn rewrite(&mut self, t: TermId) -> TermId {
    self.stat("rewrite");
    self.cycle += 1;
    let mut cur = t;
    for _ in 0..self.cfg.max_passes {
      let next = self.int_rewrite(cur, Flags::ALLOW_TOP_REPEAT);
      if next == cur {
        return cur
      }
      cur = next;
    }
    warn!(term = %self.pp(t), passes = self.cfg.max_passes, "no fixpoint reached");
    cur
  }

  /// One inner normalization pass.
  pub fn int_rewrite(&mut self, t: TermId, flags: Flags) -> TermId { self.normalize(t, flags) }

  /// Like [`Env::int_rewrite`] with the default flags, but never consults or
  /// fills the cache, so that every step is actually performed.
  pub fn nc_rewrite(&mut self, t: TermId) -> TermId {
    self.nc_rewrite_with(t, Flags::ALLOW_TOP_REPEAT)
  }

  pub(crate) fn nc_rewrite_with(&mut self, t: TermId, flags: Flags) -> TermId {
    self.bypass_cache += 1;
    let r = self.normalize(t, flags);
    self.bypass_cache -= 1;
    r
  }

  fn caching(&self) -> bool { self.cfg.cache_enabled && self.bypass_cache == 0 }

  /// A valid cached normal form of `t`, with the nesting height its computation needed.
  /// Entries that would have hit the depth guard from here are not served.
  fn cached(&mut self, t: TermId, flags: Flags) -> Option<(TermId, u32)> {
    let room = self.cfg.max_depth.saturating_sub(self.depth);
    let (floor, state) = (self.block_cycle, self.state);
    let a = self.ann(t);
    let valid = !a.uncacheable
      && a.epoch >= floor
      && a.state == state
      && a.flags == flags
      && a.height < room;
    a.normal.filter(|_| valid).map(|nf| (nf, a.height))
  }

  fn normalize(&mut self, t: TermId, flags: Flags) -> TermId {
    self.reach = self.reach.max(self.depth);
    if self.depth >= self.cfg.max_depth {
      self.stat("depth_limit");
      debug!(term = %self.pp(t), "depth limit");
      return t
    }
    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, || self.normalize_guarded(t, flags))
  }

  fn normalize_guarded(&mut self, t: TermId, flags: Flags) -> TermId {
    let caching = self.caching();
    if caching {
      if let Some((nf, height)) = self.cached(t, flags) {
        self.reach = self.reach.max(self.depth + height);
        self.stat("cache_hit");
        return nf
      }
      self.stat("cache_miss");
    }
    if self.ann(t).in_rewrite != 0 {
      self.stat("cycle");
      trace!(term = %self.pp(t), "rewrite cycle");
      self.ann(t).uncacheable = true;
      self.block_cycle = self.cycle + 1;
      return t
    }
    let entry = self.depth;
    let outer = std::mem::replace(&mut self.reach, entry);
    self.depth += 1;
    let depth = self.depth;
    self.ann(t).in_rewrite = depth;
    let nf = self.normalize_node(t, flags);
    self.ann(t).in_rewrite = 0;
    self.depth -= 1;
    let height = self.reach - entry;
    let truncated = self.reach >= self.cfg.max_depth;
    self.reach = self.reach.max(outer);
    if caching && !truncated {
      let (epoch, state) = (self.cycle, self.state);
      let a = self.ann(t);
      if !a.uncacheable {
        *a = Annot { normal: Some(nf), epoch, state, flags, height, ..*a }
      }
    }
    nf
  }

  fn normalize_node(&mut self, t: TermId, flags: Flags) -> TermId {
    let mut cur = self.bottom_up(t, flags);
    let mut steps = 0;
    while let Some(next) = self.top_step(cur, flags) {
      trace!(from = %self.pp(cur), to = %self.pp(next), "step");
      if flags.contains(Flags::DISABLE_REPEAT) {
        return next
      }
      if flags.contains(Flags::ALLOW_TOP_REPEAT) {
        return self.normalize(next, flags)
      }
      cur = next;
      steps += 1;
      if steps >= self.cfg.max_steps {
        warn!(term = %self.pp(t), "step limit reached");
        break
      }
    }
    cur
  }

  fn rebuild(&mut self, t: TermId, new: Vec<TermId>) -> TermId {
    if new == self.terms.children(t) {
      t
    } else {
      self.terms.with_children(t, new)
    }
  }

  fn rewrite_children(&mut self, t: TermId, flags: Flags) -> TermId {
    let old = self.terms.children(t);
    if old.is_empty() {
      return t
    }
    let new = old.into_iter().map(|c| self.normalize(c, flags)).collect();
    self.rebuild(t, new)
  }

  /// Normalize the immediate subterms of `t`, short-circuiting connectives and
  /// assuming conditions in the branches they guard.
  fn bottom_up(&mut self, t: TermId, flags: Flags) -> TermId {
    let Some((b, args)) = self.terms.as_builtin(t) else { return self.rewrite_children(t, flags) };
    let args = args.to_vec();
    match (b, &*args) {
      (Builtin::Quote, _) => t,
      (Builtin::And | Builtin::Or, _) => {
        let zero = self.terms.bool(b == Builtin::Or);
        let mut new = Vec::with_capacity(args.len());
        for &a in &args {
          let a = self.normalize(a, flags);
          if a == zero {
            return zero
          }
          new.push(a)
        }
        self.rebuild(t, new)
      }
      (Builtin::Ite, &[c, a, e]) => {
        let c = self.normalize(c, flags);
        match self.terms.bool_value(c) {
          Some(true) => return self.normalize(a, flags),
          Some(false) => return self.normalize(e, flags),
          None => {}
        }
        let a = self.under(c, |env| env.normalize(a, flags));
        let not_c = self.terms.mk_not(c);
        let e = self.under(not_c, |env| env.normalize(e, flags));
        self.rebuild(t, vec![c, a, e])
      }
      (Builtin::Implies, &[p, q]) => {
        let p = self.normalize(p, flags);
        if p == self.terms.ff {
          return self.terms.tt
        }
        let q = self.under(p, |env| env.normalize(q, flags));
        self.rebuild(t, vec![p, q])
      }
      (Builtin::Not, &[p]) => {
        let p = self.normalize(p, flags);
        self.terms.mk_not(p)
      }
      _ => self.rewrite_children(t, flags),
    }
  }

  /// Run `f` with `hyp` assumed in a scratch hypothesis layer.
  fn under(&mut self, hyp: TermId, f: impl FnOnce(&mut Self) -> TermId) -> TermId {
    if !self.cfg.contextual || self.terms.bool_value(hyp).is_some() {
      return f(self)
    }
    self.scoped(|env| {
      env.assume(hyp);
      f(env)
    })
  }

  /// Register `fact` in the current layer without closure, with its free
  /// variables frozen at the current level.
  pub(crate) fn assume(&mut self, fact: TermId) {
    let level = self.net.depth() as u32 - 1;
    let fact = self.terms.mark_vars(fact, level);
    match self.prepare(fact) {
      Ok(es) =>
        for e in self.with_inversions(es) {
          self.add_rule(e);
        },
      Err(err) => debug!(%err, "hypothesis ignored"),
    }
  }

  /// Candidate rules for `t`, each once, highest priority first. Among equal
  /// priorities newer layers come first.
  fn candidates(&self, t: TermId) -> Vec<Entry> {
    let mut seen = HashSet::new();
    let mut out: Vec<_> = self.net.init_find(&self.terms, t).filter(|e| seen.insert(e.rule.term())).collect();
    out.sort_by_key(|e| std::cmp::Reverse(e.priority));
    out
  }

  fn report(&mut self, rule: Option<Rule>, from: TermId, to: TermId) {
    if let Some(h) = &mut self.harvest {
      if rule.map_or(true, |r| r.term() != h.skip) {
        h.steps.push((from, to))
      }
    }
  }

  /// One rewrite step at the root of `t`: builtins first, then rules, then the
  /// negation lookup.
  fn top_step(&mut self, t: TermId, flags: Flags) -> Option<TermId> {
    if let Some(r) = self.builtin_step(t) {
      self.report(None, t, r);
      return Some(r)
    }
    for e in self.candidates(t) {
      match self.try_rule(e.rule, t, flags) {
        Some(r) if r != t => {
          self.stat("rule_fired");
          trace!(rule = %self.pp(e.rule.term()), "fired");
          self.report(Some(e.rule), t, r);
          return Some(r)
        }
        _ => {}
      }
    }
    if flags.contains(Flags::NO_NEG_TRANSITIVITY) {
      return None
    }
    self.negation_lookup(t, flags)
  }

  fn builtin_step(&mut self, t: TermId) -> Option<TermId> {
    let (f, _) = self.terms.as_app(t)?;
    let fs = self.builtins_for(f)?.to_vec();
    for b in fs {
      match b(self, t) {
        Some(r) if r != t => {
          self.stat("builtin_fired");
          return Some(r)
        }
        _ => {}
      }
    }
    None
  }

  /// If no rule rewrites the atom `t` but `(not t)` rewrites to a truth value,
  /// `t` rewrites to the opposite one.
  fn negation_lookup(&mut self, t: TermId, flags: Flags) -> Option<TermId> {
    match self.terms.as_builtin(t) {
      None if self.terms.as_app(t).is_none() => return None,
      Some((
        Builtin::True
        | Builtin::False
        | Builtin::Not
        | Builtin::And
        | Builtin::Or
        | Builtin::Implies
        | Builtin::Ite,
        _,
      )) => return None,
      _ => {}
    }
    let neg = self.terms.bapp(Builtin::Not, vec![t]);
    let flags = flags | Flags::NO_NEG_TRANSITIVITY;
    for e in self.candidates(neg) {
      let Some(r) = self.try_rule(e.rule, neg, flags) else { continue };
      let r = self.normalize(r, flags);
      if let Some(b) = self.terms.bool_value(r) {
        let r = self.terms.bool(!b);
        self.stat("rule_fired");
        self.report(Some(e.rule), t, r);
        return Some(r)
      }
    }
    None
  }

  /// Match `rule` against `t`, discharge its condition, and build the result.
  fn try_rule(&mut self, rule: Rule, t: TermId, flags: Flags) -> Option<TermId> {
    let mut s = Subst::new();
    let rest = self.match_rule(rule.pattern(), t, &mut s)?;
    let cond = self.terms.subst(rule.condition(), &s);
    if cond != self.terms.tt {
      let c = self.normalize(cond, flags.without(Flags::DISABLE_REPEAT) | Flags::ALLOW_TOP_REPEAT);
      if c != self.terms.tt {
        return None
      }
    }
    let rep = self.terms.subst(rule.replacement(), &s);
    Some(match rest {
      Some((f, mut rest)) => {
        rest.insert(0, rep);
        self.terms.app(f, rest)
      }
      None => rep,
    })
  }

  /// Match a rule pattern. Under an AC functor the pattern may cover a
  /// sub-multiset of the arguments; the unmatched ones are returned with the head.
  fn match_rule(
    &self, pat: TermId, t: TermId, s: &mut Subst,
  ) -> Option<Option<(FuncId, Vec<TermId>)>> {
    if let (Some((f, ps)), Some((g, ts))) = (self.terms.as_app(pat), self.terms.as_app(t)) {
      if f == g && f.builtin().is_some_and(Builtin::is_ac) && 2 <= ps.len() && ps.len() <= ts.len() {
        let mut used = vec![false; ts.len()];
        if !self.match_ac(ps, ts, &mut used, s) {
          return None
        }
        if ps.len() == ts.len() {
          return Some(None)
        }
        let rest = ts.iter().zip(&used).filter(|p| !*p.1).map(|p| *p.0).collect();
        return Some(Some((f, rest)))
      }
    }
    self.match_term(pat, t, s).then_some(None)
  }

  fn match_ac(&self, ps: &[TermId], ts: &[TermId], used: &mut [bool], s: &mut Subst) -> bool {
    let Some((&p, ps)) = ps.split_first() else { return true };
    for i in 0..ts.len() {
      if used[i] {
        continue
      }
      let n = s.len();
      if self.match_term(p, ts[i], s) {
        used[i] = true;
        if self.match_ac(ps, ts, used, s) {
          return true
        }
        used[i] = false;
      }
      s.truncate(n);
    }
    false
  }

  /// First-order matching, extending `s`. A marked variable matches itself and
  /// the variable it freezes.
  pub(crate) fn match_term(&self, p: TermId, t: TermId, s: &mut Subst) -> bool {
    if p == t {
      return true
    }
    match (&self.terms[p], &self.terms[t]) {
      (TermData::Var(v), _) => match s.iter().find(|b| b.0 == *v) {
        Some(b) => b.1 == t,
        None => {
          s.push((*v, t));
          true
        }
      },
      (TermData::Marked(v, _), TermData::Var(w)) => v == w,
      (TermData::App(f, ps), TermData::App(g, ts)) => f == g && self.match_list(ps, ts, s),
      (TermData::Case { scrut: a, arms: xs }, TermData::Case { scrut: b, arms: ys }) =>
        self.match_term(*a, *b, s) && self.match_list(xs, ys, s),
      (
        TermData::Quant { kind: k1, vars: v1, body: b1, cond: c1 },
        TermData::Quant { kind: k2, vars: v2, body: b2, cond: c2 },
      ) => k1 == k2 && v1 == v2 && self.match_term(*b1, *b2, s) && self.match_term(*c1, *c2, s),
      _ => false,
    }
  }

  fn match_list(&self, ps: &[TermId], ts: &[TermId], s: &mut Subst) -> bool {
    ps.len() == ts.len() && ps.iter().zip(ts).all(|(&p, &t)| self.match_term(p, t, s))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::derive::RuleKind;
  use crate::env::Config;

  fn env_with(facts: &[&str]) -> Env {
    let mut env = Env::default();
    for f in facts {
      let t = env.parse(f).unwrap();
      env.derive_and_add(t).unwrap();
    }
    env
  }

  fn rw(env: &mut Env, src: &str) -> String {
    let t = env.parse(src).unwrap();
    let r = env.rewrite(t);
    env.pp(r).to_string()
  }

  #[test]
  fn flags_compose() {
    let f = Flags::ALLOW_TOP_REPEAT | Flags::DISABLE_REPEAT;
    assert!(f.contains(Flags::DISABLE_REPEAT) && !f.contains(Flags::NO_NEG_TRANSITIVITY));
    assert_eq!(f.without(Flags::DISABLE_REPEAT), Flags::ALLOW_TOP_REPEAT);
    assert_eq!(format!("{:?}", Flags::NONE), "Flags()");
  }

  #[test]
  fn substitution_then_arithmetic() {
    let mut env = env_with(&["(= x 3)"]);
    assert_eq!(rw(&mut env, "(+ x 1)"), "4");
    assert_eq!(rw(&mut env, "(f x (* x x))"), "(f 3 9)");
  }

  #[test]
  fn ac_sub_multiset() {
    let mut env = env_with(&["(= (and p q) true)", "(= (+ a b) c)"]);
    assert_eq!(rw(&mut env, "(+ b d a)"), "(+ c d)");
    assert_eq!(rw(&mut env, "(and p q r)"), "r");
    assert_eq!(rw(&mut env, "(and r q p)"), "r");
    assert_eq!(rw(&mut env, "(or (not p) (not q))"), "false");
    assert_eq!(rw(&mut env, "(not (or (not p) (not q)))"), "true");
  }

  #[test]
  fn conditional_rules() {
    let mut env = env_with(&["(implies (p ?x) (= (f ?x) ?x))", "(p a)"]);
    assert_eq!(rw(&mut env, "(f a)"), "a");
    assert_eq!(rw(&mut env, "(f b)"), "(f b)");
  }

  #[test]
  fn negation_transitivity() {
    let mut env = env_with(&["(= (not (q a)) r)", "r"]);
    assert_eq!(rw(&mut env, "(q a)"), "false");
    let t = env.parse("(q a)").unwrap();
    assert_eq!(env.int_rewrite(t, Flags::ALLOW_TOP_REPEAT | Flags::NO_NEG_TRANSITIVITY), t);
  }

  #[test]
  fn contextual_branches() {
    let mut env = Env::default();
    assert_eq!(rw(&mut env, "(ite (p a) (and (p a) b) (or (p a) c))"), "(ite (p a) b c)");
    assert_eq!(rw(&mut env, "(implies (= x 2) (< x 5))"), "true");
    let mut env = Env::new(Config { contextual: false, ..Config::DEFAULT });
    assert_eq!(rw(&mut env, "(implies (= x 2) (< x 5))"), "(implies (= 2 x) (< x 5))");
  }

  #[test]
  fn cycles_terminate() {
    let mut env = Env::default();
    let (a, fb) = (env.parse("a").unwrap(), env.parse("(f b)").unwrap());
    for (l, r) in [(a, fb), (fb, a)] {
      let tt = env.terms.tt;
      let rule = Rule::new(&mut env.terms, RuleKind::ForceOriented, l, r, tt);
      assert!(env.add_rule(Entry { rule, priority: 0 }));
    }
    assert_eq!(rw(&mut env, "(g a)"), "(g a)");
    assert!(env.stats().get("cycle").is_some());
  }

  #[test]
  fn depth_guard() {
    let mut env = env_with(&["(==> (s ?x) (s (s ?x)))"]);
    env.cfg.max_depth = 50;
    let t = env.parse("(s z)").unwrap();
    let _ = env.rewrite(t);
    assert!(env.stats().get("depth_limit").is_some());
  }

  #[test]
  fn depth_limited_results_are_not_cached() {
    let run = |cache_enabled: bool, srcs: &[&str]| {
      let mut env = Env::new(Config { max_depth: 3, cache_enabled, ..Config::DEFAULT });
      let t = env.parse("(= a 0)").unwrap();
      env.derive_and_add(t).unwrap();
      srcs.iter().map(|src| rw(&mut env, src)).collect::<Vec<_>>()
    };
    for srcs in [&["(f (f (f a)))", "(f a)"][..], &["(f a)", "(f (f (f a)))", "(f a)"]] {
      assert_eq!(run(true, srcs), run(false, srcs));
    }
    assert_eq!(run(true, &["(f (f (f a)))", "(f a)"]), ["(f (f (f a)))", "(f 0)"]);
    assert_eq!(run(true, &["(f a)", "(f (f (f a)))"]), ["(f 0)", "(f (f (f a)))"]);
  }

  #[test]
  fn cache_is_used_and_invalidated() {
    let mut env = env_with(&["(= (f a) b)"]);
    assert_eq!(rw(&mut env, "(g (f a))"), "(g b)");
    let misses = env.stats()["cache_miss"];
    assert_eq!(rw(&mut env, "(g (f a))"), "(g b)");
    assert!(env.stats()["cache_hit"] >= 1);
    assert_eq!(env.stats()["cache_miss"], misses);
    let t = env.parse("(= b 7)").unwrap();
    env.derive_and_add(t).unwrap();
    assert_eq!(rw(&mut env, "(g (f a))"), "(g 7)");
  }
}
