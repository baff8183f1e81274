use crate::bignum::Num;
use crate::types::*;
use enum_map::Enum;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum QuantKind {
  ForAll,
  Exists,
  Lambda,
}

impl QuantKind {
  pub fn name(self) -> &'static str {
    match self {
      QuantKind::ForAll => "forall",
      QuantKind::Exists => "exists",
      QuantKind::Lambda => "lambda",
    }
  }
}

/// The payload of a hash-consed term. Two equal payloads always get the same `TermId`.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum TermData {
  Num(Num),
  Str(Box<str>),
  App(FuncId, Box<[TermId]>),
  Quant {
    kind: QuantKind,
    vars: Box<[VarId]>,
    body: TermId,
    /// `true` when the quantifier has no guard
    cond: TermId,
  },
  Case {
    scrut: TermId,
    arms: Box<[TermId]>,
  },
  /// A pattern variable, or a variable bound by an enclosing quantifier
  Var(VarId),
  /// A variable frozen as a constant at the given hypothesis level
  Marked(VarId, u32),
  Index(u32),
}

impl TermData {
  /// Position of the variant in the term order, after size.
  fn rank(&self) -> u8 {
    match self {
      TermData::Num(_) => 0,
      TermData::Str(_) => 1,
      TermData::Index(_) => 2,
      TermData::Var(_) => 3,
      TermData::Marked(..) => 4,
      TermData::Case { .. } => 5,
      TermData::Quant { .. } => 6,
      TermData::App(..) => 7,
    }
  }
}

macro_rules! mk_builtins {
  ($($id:ident: $name:literal,)*) => {
    /// Functors with a fixed meaning to the kernel. `Builtin::X.func()` is always `FuncId(X as u32)`.
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Enum)]
    pub enum Builtin {
      $($id,)*
    }
    impl Builtin {
      pub const ALL: &'static [Builtin] = &[$(Builtin::$id,)*];
      pub fn name(self) -> &'static str {
        match self {
          $(Builtin::$id => $name,)*
        }
      }
    }
  }
}
mk_builtins! {
  True: "true",
  False: "false",
  Not: "not",
  And: "and",
  Or: "or",
  Implies: "implies",
  Ite: "ite",
  Eq: "=",
  Lt: "<",
  Le: "<=",
  Plus: "+",
  Times: "*",
  Minus: "-",
  Div: "/",
  Mod: "mod",
  Quote: "quote",
  Priority: "priority",
  ForceEq: "==>",
  Oriented: "rule",
  Unoriented: "unoriented",
  ForceOriented: "force",
}

impl Builtin {
  pub fn func(self) -> FuncId { FuncId(self.into_usize() as u32) }

  /// Associative-commutative functors; their arguments are kept flat and sorted.
  pub fn is_ac(self) -> bool {
    matches!(self, Builtin::And | Builtin::Or | Builtin::Plus | Builtin::Times)
  }
}

impl FuncId {
  pub fn builtin(self) -> Option<Builtin> {
    let n = self.0 as usize;
    (n < Builtin::LENGTH).then(|| Builtin::from_usize(n))
  }
}

pub struct Node {
  pub data: TermData,
  /// Number of nodes in the tree, saturating
  pub size: u32,
  /// No `Var` occurs in the term (marked variables count as constants)
  pub ground: bool,
}

/// The hash-consing term store.
pub struct Terms {
  nodes: IdxVec<TermId, Node>,
  table: HashMap<TermData, TermId>,
  funcs: IdxVec<FuncId, Box<str>>,
  func_ids: HashMap<Box<str>, FuncId>,
  vars: IdxVec<VarId, Box<str>>,
  var_ids: HashMap<Box<str>, VarId>,
  pub tt: TermId,
  pub ff: TermId,
}

pub type Subst = Vec<(VarId, TermId)>;

impl std::ops::Index<TermId> for Terms {
  type Output = TermData;
  fn index(&self, t: TermId) -> &TermData { &self.nodes[t].data }
}

impl Default for Terms {
  fn default() -> Self { Self::new() }
}

impl Terms {
  pub fn new() -> Self {
    let mut terms = Terms {
      nodes: Default::default(),
      table: Default::default(),
      funcs: Default::default(),
      func_ids: Default::default(),
      vars: Default::default(),
      var_ids: Default::default(),
      tt: TermId(0),
      ff: TermId(0),
    };
    for &b in Builtin::ALL {
      assert_eq!(terms.func(b.name()), b.func());
    }
    terms.tt = terms.app(Builtin::True.func(), vec![]);
    terms.ff = terms.app(Builtin::False.func(), vec![]);
    terms
  }

  pub fn len(&self) -> usize { self.nodes.len() }
  pub fn is_empty(&self) -> bool { self.len() == 0 }

  /// Intern a term.
  pub fn mk(&mut self, data: TermData) -> TermId {
    if let Some(&t) = self.table.get(&data) {
      return t
    }
    let (size, ground) = match &data {
      TermData::Num(_) | TermData::Str(_) | TermData::Index(_) | TermData::Marked(..) => (1, true),
      TermData::Var(_) => (1, false),
      TermData::App(_, args) => self.measure(1, args.iter().copied()),
      TermData::Case { scrut, arms } =>
        self.measure(1, std::iter::once(*scrut).chain(arms.iter().copied())),
      TermData::Quant { vars, body, cond, .. } =>
        self.measure(1 + vars.len() as u32, [*body, *cond].into_iter()),
    };
    let t = self.nodes.push(Node { data: data.clone(), size, ground });
    self.table.insert(data, t);
    t
  }

  fn measure(&self, base: u32, children: impl Iterator<Item = TermId>) -> (u32, bool) {
    children.fold((base, true), |(size, ground), c| {
      (size.saturating_add(self.nodes[c].size), ground && self.nodes[c].ground)
    })
  }

  pub fn size(&self, t: TermId) -> u32 { self.nodes[t].size }
  pub fn is_ground(&self, t: TermId) -> bool { self.nodes[t].ground }

  pub fn func(&mut self, name: &str) -> FuncId {
    if let Some(&f) = self.func_ids.get(name) {
      return f
    }
    let f = self.funcs.push(name.into());
    self.func_ids.insert(name.into(), f);
    f
  }
  pub fn lookup_func(&self, name: &str) -> Option<FuncId> { self.func_ids.get(name).copied() }
  pub fn func_name(&self, f: FuncId) -> &str { &self.funcs[f] }

  pub fn var(&mut self, name: &str) -> VarId {
    if let Some(&v) = self.var_ids.get(name) {
      return v
    }
    let v = self.vars.push(name.into());
    self.var_ids.insert(name.into(), v);
    v
  }
  pub fn var_name(&self, v: VarId) -> &str { &self.vars[v] }

  pub fn app(&mut self, f: FuncId, args: Vec<TermId>) -> TermId {
    self.mk(TermData::App(f, args.into()))
  }
  pub fn bapp(&mut self, b: Builtin, args: Vec<TermId>) -> TermId { self.app(b.func(), args) }
  pub fn constant(&mut self, name: &str) -> TermId {
    let f = self.func(name);
    self.app(f, vec![])
  }
  pub fn mk_var(&mut self, v: VarId) -> TermId { self.mk(TermData::Var(v)) }
  pub fn num(&mut self, n: Num) -> TermId { self.mk(TermData::Num(n)) }
  pub fn int(&mut self, n: i64) -> TermId { self.num(Num::from(n)) }
  pub fn string(&mut self, s: &str) -> TermId { self.mk(TermData::Str(s.into())) }
  pub fn bool(&self, b: bool) -> TermId {
    if b {
      self.tt
    } else {
      self.ff
    }
  }

  pub fn as_app(&self, t: TermId) -> Option<(FuncId, &[TermId])> {
    match &self[t] {
      TermData::App(f, args) => Some((*f, args)),
      _ => None,
    }
  }

  pub fn as_builtin(&self, t: TermId) -> Option<(Builtin, &[TermId])> {
    let (f, args) = self.as_app(t)?;
    Some((f.builtin()?, args))
  }

  pub fn is_app_of(&self, t: TermId, b: Builtin) -> Option<&[TermId]> {
    match self.as_builtin(t) {
      Some((b2, args)) if b2 == b => Some(args),
      _ => None,
    }
  }

  pub fn as_num(&self, t: TermId) -> Option<&Num> {
    match &self[t] {
      TermData::Num(n) => Some(n),
      _ => None,
    }
  }

  pub fn bool_value(&self, t: TermId) -> Option<bool> {
    if t == self.tt {
      Some(true)
    } else if t == self.ff {
      Some(false)
    } else {
      None
    }
  }

  /// Negation, collapsing literals and double negation.
  pub fn mk_not(&mut self, t: TermId) -> TermId {
    if let Some(b) = self.bool_value(t) {
      return self.bool(!b)
    }
    match self.is_app_of(t, Builtin::Not) {
      Some(&[p]) => p,
      _ => self.bapp(Builtin::Not, vec![t]),
    }
  }

  /// `and`/`or` of `args`, collapsing the empty and singleton cases.
  pub fn mk_conn(&mut self, conj: bool, mut args: Vec<TermId>) -> TermId {
    match args.len() {
      0 => self.bool(conj),
      1 => args.pop().unwrap_or_else(|| unreachable!()),
      _ => self.bapp(if conj { Builtin::And } else { Builtin::Or }, args),
    }
  }

  /// Immediate subterms, in a fixed order.
  pub fn children(&self, t: TermId) -> Vec<TermId> {
    match &self[t] {
      TermData::App(_, args) => args.to_vec(),
      TermData::Quant { body, cond, .. } => vec![*body, *cond],
      TermData::Case { scrut, arms } => std::iter::once(*scrut).chain(arms.iter().copied()).collect(),
      TermData::Num(_)
      | TermData::Str(_)
      | TermData::Var(_)
      | TermData::Marked(..)
      | TermData::Index(_) => vec![],
    }
  }

  /// Rebuild `t` with new immediate subterms, in the order given by [`Terms::children`].
  pub fn with_children(&mut self, t: TermId, new: Vec<TermId>) -> TermId {
    let data = match &self[t] {
      TermData::App(f, args) => {
        assert_eq!(args.len(), new.len());
        TermData::App(*f, new.into())
      }
      TermData::Quant { kind, vars, .. } => {
        let [body, cond] = *new else { panic!("quantifier has two children") };
        TermData::Quant { kind: *kind, vars: vars.clone(), body, cond }
      }
      TermData::Case { .. } => {
        let Some((&scrut, arms)) = new.split_first() else { panic!("case has a scrutinee") };
        TermData::Case { scrut, arms: arms.into() }
      }
      _ => return t,
    };
    self.mk(data)
  }

  /// Apply `f` to each immediate subterm and rebuild, sharing `t` if nothing changed.
  pub fn map_children(
    &mut self, t: TermId, mut f: impl FnMut(&mut Self, TermId) -> TermId,
  ) -> TermId {
    let old = self.children(t);
    if old.is_empty() {
      return t
    }
    let new: Vec<_> = old.iter().map(|&c| f(self, c)).collect();
    if new == old {
      t
    } else {
      self.with_children(t, new)
    }
  }

  /// Number of free occurrences of each variable.
  pub fn var_counts(&self, t: TermId, out: &mut BTreeMap<VarId, u32>) {
    self.var_counts_under(t, &mut vec![], out)
  }

  fn var_counts_under(&self, t: TermId, bound: &mut Vec<VarId>, out: &mut BTreeMap<VarId, u32>) {
    if self.is_ground(t) {
      return
    }
    match &self[t] {
      TermData::Var(v) =>
        if !bound.contains(v) {
          *out.entry(*v).or_default() += 1
        },
      TermData::Quant { vars, body, cond, .. } => {
        let n = bound.len();
        bound.extend_from_slice(vars);
        self.var_counts_under(*body, bound, out);
        self.var_counts_under(*cond, bound, out);
        bound.truncate(n);
      }
      _ => self.children(t).into_iter().for_each(|c| self.var_counts_under(c, bound, out)),
    }
  }

  pub fn free_vars(&self, t: TermId) -> BTreeSet<VarId> {
    let mut counts = BTreeMap::new();
    self.var_counts(t, &mut counts);
    counts.into_keys().collect()
  }

  /// Replace free variables according to `s`. Bound variables shadow the substitution.
  pub fn subst(&mut self, t: TermId, s: &[(VarId, TermId)]) -> TermId {
    if s.is_empty() || self.is_ground(t) {
      return t
    }
    match &self[t] {
      TermData::Var(v) => s.iter().find(|p| p.0 == *v).map_or(t, |p| p.1),
      TermData::Quant { vars, .. } if s.iter().any(|p| vars.contains(&p.0)) => {
        let vars = vars.clone();
        let inner: Subst = s.iter().copied().filter(|p| !vars.contains(&p.0)).collect();
        self.map_children(t, |this, c| this.subst(c, &inner))
      }
      _ => self.map_children(t, |this, c| this.subst(c, s)),
    }
  }

  /// Freeze the free variables of `t` as constants at `level`.
  pub fn mark_vars(&mut self, t: TermId, level: u32) -> TermId {
    let s: Subst = (self.free_vars(t).into_iter())
      .map(|v| (v, self.mk(TermData::Marked(v, level))))
      .collect();
    self.subst(t, &s)
  }

  /// The total structural order: size, then variant, then payload and children left to right.
  pub fn cmp_terms(&self, a: TermId, b: TermId) -> Ordering {
    if a == b {
      return Ordering::Equal
    }
    let (na, nb) = (&self.nodes[a], &self.nodes[b]);
    na.size.cmp(&nb.size).then_with(|| na.data.rank().cmp(&nb.data.rank())).then_with(|| {
      match (&na.data, &nb.data) {
        (TermData::Num(x), TermData::Num(y)) => x.cmp(y),
        (TermData::Str(x), TermData::Str(y)) => x.cmp(y),
        (TermData::Index(x), TermData::Index(y)) => x.cmp(y),
        (TermData::Var(x), TermData::Var(y)) => x.cmp(y),
        (TermData::Marked(x, l1), TermData::Marked(y, l2)) => (x, l1).cmp(&(y, l2)),
        (TermData::App(f, xs), TermData::App(g, ys)) => f.cmp(g).then_with(|| self.cmp_list(xs, ys)),
        (TermData::Case { scrut: s1, arms: a1 }, TermData::Case { scrut: s2, arms: a2 }) =>
          self.cmp_terms(*s1, *s2).then_with(|| self.cmp_list(a1, a2)),
        (
          TermData::Quant { kind: k1, vars: v1, body: b1, cond: c1 },
          TermData::Quant { kind: k2, vars: v2, body: b2, cond: c2 },
        ) => k1
          .cmp(k2)
          .then_with(|| v1.cmp(v2))
          .then_with(|| self.cmp_terms(*b1, *b2))
          .then_with(|| self.cmp_terms(*c1, *c2)),
        _ => unreachable!("equal rank"),
      }
    })
  }

  fn cmp_list(&self, xs: &[TermId], ys: &[TermId]) -> Ordering {
    xs.len().cmp(&ys.len()).then_with(|| {
      (xs.iter().zip(ys))
        .map(|(&x, &y)| self.cmp_terms(x, y))
        .find(|o| o.is_ne())
        .unwrap_or(Ordering::Equal)
    })
  }

  /// The orientation order. On ground terms this is `cmp_terms`. Otherwise `a` is smaller
  /// only if it is strictly smaller in size and no variable occurs in `a` more often
  /// than in `b`, which keeps the relation stable under substitution.
  pub fn smaller(&self, a: TermId, b: TermId) -> bool {
    if self.is_ground(a) && self.is_ground(b) {
      return self.cmp_terms(a, b) == Ordering::Less
    }
    let (mut ca, mut cb) = (BTreeMap::new(), BTreeMap::new());
    self.var_counts(a, &mut ca);
    self.var_counts(b, &mut cb);
    self.size(a) < self.size(b) && ca.iter().all(|(v, n)| cb.get(v).is_some_and(|m| m >= n))
  }
}
