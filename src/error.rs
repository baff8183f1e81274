use thiserror::Error;

/// Errors surfaced by the kernel. Failing to rewrite is never an error.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KernelError {
  #[error("priority {value} does not fit in a 32-bit rule priority")]
  PriorityOutOfRange { value: String },

  #[error("parse error at byte {pos}: {msg}")]
  Parse { pos: usize, msg: String },

  #[error("pop of hypothesis mark {mark} but the stack depth is {depth}")]
  UnbalancedPop { mark: usize, depth: usize },

  #[error("unknown symbol '{0}'")]
  UnknownSymbol(String),
}

pub type Result<T> = std::result::Result<T, KernelError>;
