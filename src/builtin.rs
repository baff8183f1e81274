//! Builtin simplifiers, dispatched on the head functor of a term. Each one
//! returns `Some` with an equivalent term when it applies.

use crate::bignum::Num;
use crate::env::Env;
use crate::term::{Builtin, Terms};
use crate::types::*;
use std::cmp::Ordering;

pub type BuiltinFn = fn(&mut Env, TermId) -> Option<TermId>;

/// Register the core simplifiers on a fresh session.
pub fn install_core(env: &mut Env) {
  let table: [(Builtin, BuiltinFn); 13] = [
    (Builtin::Not, not),
    (Builtin::And, and_or),
    (Builtin::Or, and_or),
    (Builtin::Implies, implies),
    (Builtin::Ite, ite),
    (Builtin::Eq, eq),
    (Builtin::Lt, compare),
    (Builtin::Le, compare),
    (Builtin::Plus, arith_ac),
    (Builtin::Times, arith_ac),
    (Builtin::Minus, minus),
    (Builtin::Div, div),
    (Builtin::Mod, modulo),
  ];
  for (b, f) in table {
    env.register_builtin(b.func(), f)
  }
}

fn not(env: &mut Env, t: TermId) -> Option<TermId> {
  let tm = &mut env.terms;
  let &[p] = tm.is_app_of(t, Builtin::Not)? else { return None };
  (tm.bool_value(p).is_some() || tm.is_app_of(p, Builtin::Not).is_some()).then(|| tm.mk_not(p))
}

/// Flatten, drop units, absorb, sort and deduplicate; a zero or a
/// complementary pair decides the whole connective.
fn and_or(env: &mut Env, t: TermId) -> Option<TermId> {
  let tm = &mut env.terms;
  let (b, args) = tm.as_builtin(t)?;
  let conj = b == Builtin::And;
  let dual = if conj { Builtin::Or } else { Builtin::And };
  let (unit, zero) = (tm.bool(conj), tm.bool(!conj));
  let mut out = vec![];
  for &a in args {
    match tm.is_app_of(a, b) {
      Some(inner) => out.extend_from_slice(inner),
      None => out.push(a),
    }
  }
  if out.contains(&zero) {
    return Some(zero)
  }
  out.retain(|&a| a != unit);
  out.sort_by(|&x, &y| tm.cmp_terms(x, y));
  out.dedup();
  let complement = |a: TermId| match tm.is_app_of(a, Builtin::Not) {
    Some(&[p]) => out.binary_search_by(|&x| tm.cmp_terms(x, p)).is_ok(),
    _ => false,
  };
  if out.iter().any(|&a| complement(a)) {
    return Some(zero)
  }
  let absorbed =
    |a: TermId| tm.is_app_of(a, dual).is_some_and(|inner| inner.iter().any(|x| out.contains(x)));
  let out: Vec<_> = out.iter().copied().filter(|&a| !absorbed(a)).collect();
  Some(tm.mk_conn(conj, out))
}

fn implies(env: &mut Env, t: TermId) -> Option<TermId> {
  let tm = &mut env.terms;
  let &[p, q] = tm.is_app_of(t, Builtin::Implies)? else { return None };
  match (tm.bool_value(p), tm.bool_value(q)) {
    (Some(true), _) => Some(q),
    (Some(false), _) | (_, Some(true)) => Some(tm.tt),
    (_, Some(false)) => Some(tm.mk_not(p)),
    _ if p == q => Some(tm.tt),
    _ => None,
  }
}

fn ite(env: &mut Env, t: TermId) -> Option<TermId> {
  let tm = &mut env.terms;
  let &[c, a, b] = tm.is_app_of(t, Builtin::Ite)? else { return None };
  match (tm.bool_value(c), tm.bool_value(a), tm.bool_value(b)) {
    (Some(true), ..) => Some(a),
    (Some(false), ..) => Some(b),
    _ if a == b => Some(a),
    (_, Some(true), Some(false)) => Some(c),
    (_, Some(false), Some(true)) => Some(tm.mk_not(c)),
    _ => None,
  }
}

/// A term that denotes a fixed value, distinct from every other such term.
fn is_literal(tm: &Terms, t: TermId) -> bool {
  tm.as_num(t).is_some() || tm.bool_value(t).is_some() || matches!(tm[t], crate::term::TermData::Str(_))
}

fn eq(env: &mut Env, t: TermId) -> Option<TermId> {
  let tm = &mut env.terms;
  let &[a, b] = tm.is_app_of(t, Builtin::Eq)? else { return None };
  if a == b {
    return Some(tm.tt)
  }
  if is_literal(tm, a) && is_literal(tm, b) {
    return Some(tm.ff)
  }
  for (x, y) in [(a, b), (b, a)] {
    match tm.bool_value(x) {
      Some(true) => return Some(y),
      Some(false) => return Some(tm.mk_not(y)),
      None => {}
    }
  }
  (tm.cmp_terms(a, b) == Ordering::Greater).then(|| tm.bapp(Builtin::Eq, vec![b, a]))
}

/// Fold the literal arguments of `+` or `*` into one, after flattening nested
/// applications of the same operator.
fn arith_ac(env: &mut Env, t: TermId) -> Option<TermId> {
  let tm = &mut env.terms;
  let (b, args) = tm.as_builtin(t)?;
  let plus = b == Builtin::Plus;
  let mut flat = vec![];
  for &a in args {
    match tm.is_app_of(a, b) {
      Some(inner) => flat.extend_from_slice(inner),
      None => flat.push(a),
    }
  }
  let mut acc = if plus { Num::zero() } else { Num::one() };
  let mut rest = vec![];
  for a in flat {
    match tm.as_num(a) {
      Some(n) => acc = if plus { &acc + n } else { &acc * n },
      None => rest.push(a),
    }
  }
  if !plus && acc.is_zero() {
    return Some(tm.int(0))
  }
  let unit = if plus { acc.is_zero() } else { acc.is_one() };
  if !unit || rest.is_empty() {
    rest.push(tm.num(acc))
  }
  rest.sort_by(|&x, &y| tm.cmp_terms(x, y));
  Some(if rest.len() == 1 { rest[0] } else { tm.bapp(b, rest) })
}

fn minus(env: &mut Env, t: TermId) -> Option<TermId> {
  let tm = &mut env.terms;
  let args = tm.is_app_of(t, Builtin::Minus)?.to_vec();
  match *args {
    [a] => {
      if let Some(n) = tm.as_num(a) {
        let n = -n;
        return Some(tm.num(n))
      }
      match tm.is_app_of(a, Builtin::Minus) {
        Some(&[x]) => Some(x),
        _ => None,
      }
    }
    [a, b] => match (tm.as_num(a), tm.as_num(b)) {
      (Some(x), Some(y)) => {
        let n = x - y;
        Some(tm.num(n))
      }
      (_, Some(y)) if y.is_zero() => Some(a),
      _ if a == b => Some(tm.int(0)),
      _ => None,
    },
    _ => None,
  }
}

fn div(env: &mut Env, t: TermId) -> Option<TermId> {
  let tm = &mut env.terms;
  let &[a, b] = tm.is_app_of(t, Builtin::Div)? else { return None };
  match (tm.as_num(a), tm.as_num(b)) {
    (Some(x), Some(y)) => {
      let n = (x / y).ok()?;
      Some(tm.num(n))
    }
    (_, Some(y)) if y.is_one() => Some(a),
    _ => None,
  }
}

fn modulo(env: &mut Env, t: TermId) -> Option<TermId> {
  let tm = &mut env.terms;
  let &[a, b] = tm.is_app_of(t, Builtin::Mod)? else { return None };
  let (x, y) = (tm.as_num(a)?, tm.as_num(b)?);
  if !(x.is_int() && y.is_int()) {
    return None
  }
  let n = x.rem_euclid(y).ok()?;
  Some(tm.num(n))
}

/// A one-sided bound on some term `a`: `a < k`, `a <= k`, `a > k` or `a >= k`.
#[derive(Debug)]
struct Bound {
  upper: bool,
  strict: bool,
  k: Num,
}

impl Bound {
  /// Read `l < r` (or `l <= r`) as a bound on `a`.
  fn of(tm: &Terms, a: TermId, l: TermId, strict: bool, r: TermId) -> Option<Bound> {
    if l == a {
      Some(Bound { upper: true, strict, k: tm.as_num(r)?.clone() })
    } else if r == a {
      Some(Bound { upper: false, strict, k: tm.as_num(l)?.clone() })
    } else {
      None
    }
  }

  fn implies(&self, q: &Bound) -> bool {
    if self.upper != q.upper {
      return false
    }
    let tighter = if self.upper { self.k < q.k } else { self.k > q.k };
    tighter || (self.k == q.k && (self.strict || !q.strict))
  }

  fn refutes(&self, q: &Bound) -> bool {
    if self.upper == q.upper {
      return false
    }
    let (lo, hi) = if self.upper { (&q.k, &self.k) } else { (&self.k, &q.k) };
    lo > hi || (lo == hi && (self.strict || q.strict))
  }
}

/// Unconditional facts `l < r` / `l <= r` currently registered as rules,
/// as `(l, strict, r)`. A rule `(< l r) -> false` is read as `r <= l`.
fn order_facts(env: &mut Env, a: TermId, b: TermId) -> Vec<(TermId, bool, TermId)> {
  let probes = [Builtin::Lt, Builtin::Le].map(|op| env.terms.bapp(op, vec![a, b]));
  let tm = &env.terms;
  let mut out = vec![];
  for probe in probes {
    for e in env.net.init_find(tm, probe) {
      let r = e.rule;
      if r.condition() != tm.tt {
        continue
      }
      let (Some(value), Some((op, &[l, rhs]))) = (tm.bool_value(r.replacement()), tm.as_builtin(r.pattern()))
      else {
        continue
      };
      let strict = match op {
        Builtin::Lt => true,
        Builtin::Le => false,
        _ => continue,
      };
      out.push(if value { (l, strict, rhs) } else { (rhs, !strict, l) })
    }
  }
  out
}

/// `<` and `<=`: literal comparison, reflexivity, and bounds implied or
/// refuted by known facts about the non-literal side.
fn compare(env: &mut Env, t: TermId) -> Option<TermId> {
  let (op, args) = env.terms.as_builtin(t)?;
  let &[x, y] = args else { return None };
  let strict = op == Builtin::Lt;
  let tm = &env.terms;
  if let (Some(p), Some(q)) = (tm.as_num(x), tm.as_num(y)) {
    return Some(tm.bool(if strict { p < q } else { p <= q }))
  }
  if x == y {
    return Some(tm.bool(!strict))
  }
  let a = match (tm.as_num(x), tm.as_num(y)) {
    (None, Some(_)) => x,
    (Some(_), None) => y,
    _ => return None,
  };
  let query = Bound::of(tm, a, x, strict, y)?;
  for (l, s, r) in order_facts(env, x, y) {
    let Some(fact) = Bound::of(&env.terms, a, l, s, r) else { continue };
    if fact.implies(&query) {
      return Some(env.terms.tt)
    }
    if fact.refutes(&query) {
      return Some(env.terms.ff)
    }
  }
  None
}
