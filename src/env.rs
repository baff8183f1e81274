use crate::builtin::{self, BuiltinFn};
use crate::error::{KernelError, Result};
use crate::format::Print;
use crate::net::{DiscrNet, Entry};
use crate::parser;
use crate::rewrite::Flags;
use crate::term::Terms;
use crate::types::*;
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use tracing::debug;

#[derive(Clone, Debug)]
pub struct Config {
  /// Memoize normal forms. Output must not depend on this.
  pub cache_enabled: bool,
  /// Nested normalizations beyond this return the term unchanged.
  pub max_depth: u32,
  /// Upper bound on the closure worklist of a single `derive_and_add`.
  pub closure_limit: usize,
  /// Upper bound on the outer passes of `rewrite`.
  pub max_passes: u32,
  /// Upper bound on consecutive top-level steps when the result is not renormalized.
  pub max_steps: u32,
  /// Assume the condition of an `ite` (and the antecedent of an `implies`) in its branches.
  pub contextual: bool,
  /// Also register the De Morgan dual of boolean rules.
  pub invert_rules: bool,
}

impl Config {
  pub const DEFAULT: Self = Self {
    cache_enabled: true,
    max_depth: 2000,
    closure_limit: 64,
    max_passes: 16,
    max_steps: 256,
    contextual: true,
    invert_rules: true,
  };

  /// The defaults, overridden by `NO_CACHE`, `NO_CONTEXT`, `NO_INVERT`, `MAX_DEPTH`,
  /// `CLOSURE_LIMIT` and `MAX_PASSES` when set.
  pub fn from_env() -> Self {
    fn num<T: FromStr>(var: &str) -> Option<T> { std::env::var(var).ok()?.parse().ok() }
    let mut cfg = Self::DEFAULT;
    cfg.cache_enabled = std::env::var("NO_CACHE").is_err();
    cfg.contextual = std::env::var("NO_CONTEXT").is_err();
    cfg.invert_rules = std::env::var("NO_INVERT").is_err();
    if let Some(n) = num("MAX_DEPTH") {
      cfg.max_depth = n
    }
    if let Some(n) = num("CLOSURE_LIMIT") {
      cfg.closure_limit = n
    }
    if let Some(n) = num("MAX_PASSES") {
      cfg.max_passes = n
    }
    cfg
  }
}

impl Default for Config {
  fn default() -> Self { Self::DEFAULT }
}

/// Engine-owned working state for one term, kept beside the term store rather than on the node.
#[derive(Copy, Clone, Default, Debug)]
pub(crate) struct Annot {
  /// Cached normal form
  pub normal: Option<TermId>,
  /// Episode in which `normal` was computed
  pub epoch: u64,
  /// Rule-set identity under which `normal` was computed
  pub state: u64,
  /// Flags of the computation that produced `normal`
  pub flags: Flags,
  /// Nesting levels below its entry that computing `normal` went through
  pub height: u32,
  /// Nonzero while the term is being normalized: the nesting depth at entry
  pub in_rewrite: u32,
  /// Set once a rewrite cycle was detected on this term
  pub uncacheable: bool,
}

/// Rewrite steps reported by the engine while derivation is probing a rule.
pub(crate) struct Harvest {
  /// Steps made by this rule are not reported
  pub skip: TermId,
  pub steps: Vec<(TermId, TermId)>,
}

/// A hypothesis-stack checkpoint returned by [`Env::push`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[must_use]
pub struct Mark {
  depth: usize,
  state: u64,
}

/// A rewriting session: the term store, the rule net with its hypothesis layers,
/// and all engine bookkeeping. Sessions are independent of each other.
pub struct Env {
  pub terms: Terms,
  pub cfg: Config,
  pub(crate) net: DiscrNet,
  pub(crate) ann: IdxVec<TermId, Annot>,
  builtins: HashMap<FuncId, Vec<BuiltinFn>>,
  /// Episode counter, advanced by every outer `rewrite`
  pub(crate) cycle: u64,
  /// Cache entries from episodes before this one are stale
  pub(crate) block_cycle: u64,
  /// Identity of the current rule set; fresh whenever it changes
  pub(crate) state: u64,
  next_state: u64,
  /// Nesting depth of normalization calls
  pub(crate) depth: u32,
  /// Deepest nesting reached by the innermost open normalization
  pub(crate) reach: u32,
  /// Nonzero inside `nc_rewrite`
  pub(crate) bypass_cache: u32,
  pub(crate) harvest: Option<Harvest>,
  stats: BTreeMap<&'static str, u64>,
}

impl Default for Env {
  fn default() -> Self { Self::new(Config::DEFAULT) }
}

impl Env {
  pub fn new(cfg: Config) -> Self {
    let mut env = Env {
      terms: Terms::new(),
      cfg,
      net: DiscrNet::new(),
      ann: Default::default(),
      builtins: Default::default(),
      cycle: 1,
      block_cycle: 0,
      state: 0,
      next_state: 1,
      depth: 0,
      reach: 0,
      bypass_cache: 0,
      harvest: None,
      stats: Default::default(),
    };
    builtin::install_core(&mut env);
    env
  }

  pub fn stat(&mut self, s: &'static str) { *self.stats.entry(s).or_default() += 1 }
  pub fn stats(&self) -> &BTreeMap<&'static str, u64> { &self.stats }

  pub fn parse(&mut self, src: &str) -> Result<TermId> { parser::parse(&mut self.terms, src) }
  pub fn pp(&self, t: TermId) -> Print<'_> { self.terms.pp(t) }

  pub fn net(&self) -> &DiscrNet { &self.net }

  /// Add a simplification callback for terms headed by `f`. Callbacks registered
  /// earlier run first.
  pub fn register_builtin(&mut self, f: FuncId, b: BuiltinFn) {
    self.builtins.entry(f).or_default().push(b);
    self.touch();
  }

  pub(crate) fn builtins_for(&self, f: FuncId) -> Option<&[BuiltinFn]> {
    self.builtins.get(&f).map(|v| &**v)
  }

  pub(crate) fn ann(&mut self, t: TermId) -> &mut Annot { self.ann.get_mut_extending(t) }

  /// Record that the rule set changed, invalidating cached normal forms.
  pub(crate) fn touch(&mut self) {
    self.state = self.next_state;
    self.next_state += 1;
  }

  /// Register one rule in the current hypothesis layer. Returns false if the rule is
  /// already known.
  pub fn add_rule(&mut self, e: Entry) -> bool {
    if !self.net.add(&self.terms, e.rule, e.priority) {
      return false
    }
    self.touch();
    debug!(rule = %self.pp(e.rule.term()), priority = e.priority, "registered");
    true
  }

  /// Open a hypothesis frame.
  pub fn push(&mut self) -> Mark {
    let mark = Mark { depth: self.net.push(), state: self.state };
    self.touch();
    debug!(depth = mark.depth, "push");
    mark
  }

  /// Drop every fact asserted since `mark` was taken.
  pub fn pop(&mut self, mark: Mark) -> Result<()> {
    let depth = self.net.depth();
    if mark.depth == 0 || mark.depth >= depth {
      return Err(KernelError::UnbalancedPop { mark: mark.depth, depth })
    }
    self.restore(mark);
    Ok(())
  }

  pub(crate) fn restore(&mut self, mark: Mark) {
    self.net.pop_to(mark.depth);
    self.state = mark.state;
    debug!(depth = mark.depth, "pop");
  }

  /// Run `f` inside a fresh hypothesis frame, which is dropped afterwards.
  pub fn scoped<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
    let mark = self.push();
    let r = f(self);
    self.restore(mark);
    r
  }

  /// Start a new top-level proof obligation: forget all memoized normal forms and
  /// restart the episode counters. Rules and hypotheses are kept.
  pub fn new_obligation(&mut self) {
    self.ann.clear();
    self.cycle = 1;
    self.block_cycle = 0;
  }

  /// The default flags of [`Env::int_rewrite`].
  pub fn default_flags(&self) -> Flags { Flags::ALLOW_TOP_REPEAT }
}
