//! The discrimination net: a depth-bounded trie indexing rules by a shallow
//! "trace" of their pattern.
//!
//! The trace of a term starts with its root shape code. Each further element is
//! the smallest non-wildcard shape code among the immediate subterms of the
//! previously chosen subterm, so a trace records one discriminating feature per
//! level. A rule is appended to the bucket of *every* node along its trace,
//! which makes the root bucket alone sufficient for recall; deeper nodes only
//! repeat entries. Lookups therefore may return a rule several times, and the
//! caller must verify an actual match before firing it.
//!
//! The net is a stack of persistent layers. `push` adds an empty layer for
//! scoped hypotheses, `pop_to` drops layers, and `copy` forks the whole stack
//! with structural sharing.

use crate::derive::Rule;
use crate::term::{QuantKind, TermData, Terms};
use crate::types::*;

pub const WILDCARD: u32 = 0;
const NUM_CODE: u32 = 1;
const STR_CODE: u32 = 2;
const INDEX_CODE: u32 = 3;
const CASE_CODE: u32 = 4;
const QUANT_CODE: u32 = 5; // one per QuantKind
const FIRST_FUNC_CODE: u32 = 8;

pub const MAX_TRACE: usize = 4;
const ROOT_TABLE: u32 = 1031;
const INNER_TABLE: u32 = 31;

pub fn shape_code(terms: &Terms, t: TermId) -> u32 {
  match &terms[t] {
    TermData::Var(_) | TermData::Marked(..) => WILDCARD,
    TermData::Num(_) => NUM_CODE,
    TermData::Str(_) => STR_CODE,
    TermData::Index(_) => INDEX_CODE,
    TermData::Case { .. } => CASE_CODE,
    TermData::Quant { kind, .. } =>
      QUANT_CODE
        + match kind {
          QuantKind::ForAll => 0,
          QuantKind::Exists => 1,
          QuantKind::Lambda => 2,
        },
    TermData::App(f, _) => FIRST_FUNC_CODE + f.0,
  }
}

pub fn trace(terms: &Terms, t: TermId) -> Vec<u32> {
  let mut out = vec![shape_code(terms, t)];
  let mut cur = t;
  while out.len() < MAX_TRACE && out[0] != WILDCARD {
    let next = (terms.children(cur).into_iter())
      .map(|c| (shape_code(terms, c), c))
      .filter(|p| p.0 != WILDCARD)
      .min_by_key(|p| p.0);
    let Some((code, c)) = next else { break };
    out.push(code);
    cur = c;
  }
  out
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Entry {
  pub rule: Rule,
  pub priority: Priority,
}

#[derive(Clone, Default)]
struct Node {
  entries: im::Vector<Entry>,
  table: im::HashMap<u32, Node>,
}

#[derive(Clone, Default)]
struct Layer {
  root: im::HashMap<u32, Node>,
  /// Rules whose pattern is a bare variable; tried against every term
  catch_all: im::Vector<Entry>,
  /// Rule terms registered in this layer
  rules: im::HashSet<TermId>,
}

#[derive(Clone)]
pub struct DiscrNet {
  /// Invariant: never empty; `layers[0]` is the permanent rule set
  layers: Vec<Layer>,
}

impl Default for DiscrNet {
  fn default() -> Self { Self::new() }
}

impl DiscrNet {
  pub fn new() -> Self { Self { layers: vec![Layer::default()] } }

  /// Number of layers, including the permanent one.
  pub fn depth(&self) -> usize { self.layers.len() }

  /// Number of registered rules.
  pub fn len(&self) -> usize { self.layers.iter().map(|l| l.rules.len()).sum() }
  pub fn is_empty(&self) -> bool { self.len() == 0 }

  pub fn contains(&self, rule: &Rule) -> bool {
    self.layers.iter().any(|l| l.rules.contains(&rule.term()))
  }

  /// Open a scoped layer on top of the current ones. Returns the depth to pass to
  /// `pop_to` to discard it.
  pub fn push(&mut self) -> usize {
    self.layers.push(Layer::default());
    self.layers.len() - 1
  }

  pub fn pop_to(&mut self, depth: usize) { self.layers.truncate(depth.max(1)) }

  /// An independent fork of the whole net.
  pub fn copy(&self) -> DiscrNet { self.clone() }

  /// Register `rule` in the top layer. Returns false if it is already present
  /// anywhere in the stack.
  pub fn add(&mut self, terms: &Terms, rule: Rule, priority: Priority) -> bool {
    if self.contains(&rule) {
      return false
    }
    let layer = self.layers.last_mut().unwrap_or_else(|| unreachable!());
    layer.rules.insert(rule.term());
    let entry = Entry { rule, priority };
    let trace = trace(terms, rule.pattern());
    if trace[0] == WILDCARD {
      layer.catch_all.push_back(entry);
      return true
    }
    let mut node = layer.root.entry(trace[0] % ROOT_TABLE).or_insert_with(Node::default);
    node.entries.push_back(entry);
    for &code in &trace[1..] {
      node = node.table.entry(code % INNER_TABLE).or_insert_with(Node::default);
      node.entries.push_back(entry);
    }
    true
  }

  /// Start a lookup of the candidate rules for `t`.
  pub fn init_find(&self, terms: &Terms, t: TermId) -> Finder<'_> {
    let mut layers = self.layers.iter().rev();
    let cur = layers.next();
    Finder { trace: trace(terms, t), layers, cur, level: 0, node: None, idx: 0 }
  }
}

/// A lazy walk over the candidates for one term: the newest layer first, and in
/// each layer the catch-all bucket followed by the buckets along the trace.
pub struct Finder<'a> {
  trace: Vec<u32>,
  layers: std::iter::Rev<std::slice::Iter<'a, Layer>>,
  cur: Option<&'a Layer>,
  /// 0 is the catch-all bucket, `k > 0` the node reached by `trace[..k]`
  level: usize,
  node: Option<&'a Node>,
  idx: usize,
}

impl<'a> Finder<'a> {
  pub fn next_find(&mut self) -> Option<Entry> {
    loop {
      let layer = self.cur?;
      let bucket = if self.level == 0 { Some(&layer.catch_all) } else { self.node.map(|n| &n.entries) };
      if let Some(&e) = bucket.and_then(|b| b.get(self.idx)) {
        self.idx += 1;
        return Some(e)
      }
      self.idx = 0;
      self.node = if self.level == 0 {
        Some(self.trace[0]).filter(|&c| c != WILDCARD).and_then(|c| layer.root.get(&(c % ROOT_TABLE)))
      } else if self.level < self.trace.len() {
        self.node.and_then(|n| n.table.get(&(self.trace[self.level] % INNER_TABLE)))
      } else {
        None
      };
      self.level += 1;
      if self.node.is_none() {
        self.cur = self.layers.next();
        self.level = 0;
      }
    }
  }
}

impl Iterator for Finder<'_> {
  type Item = Entry;
  fn next(&mut self) -> Option<Entry> { self.next_find() }
}
