//! A conditional term-rewriting kernel.
//!
//! Facts are turned into oriented rewrite rules ([`derive`]), indexed in a
//! layered discrimination net ([`net`]) that doubles as a hypothesis stack,
//! and applied by a caching normalizer ([`rewrite`]) with builtin
//! simplifiers for the boolean connectives, equality and arithmetic
//! ([`builtin`]). All state lives in an [`Env`] session.

pub mod bignum;
pub mod builtin;
pub mod derive;
pub mod env;
pub mod error;
pub mod format;
pub mod net;
pub mod parser;
pub mod rewrite;
pub mod term;
pub mod types;

pub use derive::{Rule, RuleKind};
pub use env::{Config, Env, Mark};
pub use error::{KernelError, Result};
pub use net::{DiscrNet, Entry, Finder};
pub use rewrite::Flags;
pub use term::{Builtin, TermData, Terms};
pub use types::{FuncId, Priority, TermId, VarId};
