use std::marker::PhantomData;
use std::ops::{Index, IndexMut};

/// A trait for newtyped integers, that can be used as index types in vectors and sets.
pub trait Idx: Copy + Eq + std::hash::Hash + Ord {
  /// Convert from `T` to `usize`
  fn into_usize(self) -> usize;
  /// Convert from `usize` to `T`
  fn from_usize(_: usize) -> Self;
}

/// A vector indexed by a custom indexing type `I`, usually a newtyped integer.
pub struct IdxVec<I, T>(pub Vec<T>, PhantomData<I>);

impl<I, T> IdxVec<I, T> {
  /// Construct a new empty [`IdxVec`].
  #[must_use]
  pub const fn new() -> Self { Self(vec![], PhantomData) }

  /// The number of elements in the [`IdxVec`].
  #[must_use]
  pub fn len(&self) -> usize { self.0.len() }

  /// Returns the value that would be returned by the next call to `push`.
  pub fn peek(&self) -> I
  where I: Idx {
    I::from_usize(self.0.len())
  }

  /// Insert a new value at the end of the vector.
  pub fn push(&mut self, val: T) -> I
  where I: Idx {
    let id = self.peek();
    self.0.push(val);
    id
  }

  /// Grow the vector until it is long enough that `vec[idx]` will work.
  pub fn extend_to_include(&mut self, idx: I)
  where
    I: Idx,
    T: Default,
  {
    let n = I::into_usize(idx) + 1;
    if self.0.len() < n {
      self.0.resize_with(n, T::default)
    }
  }

  /// Get the element with index `idx`, extending the vector if necessary.
  pub fn get_mut_extending(&mut self, idx: I) -> &mut T
  where
    I: Idx,
    T: Default,
  {
    self.extend_to_include(idx);
    &mut self[idx]
  }

  pub fn clear(&mut self) { self.0.clear() }
}

impl<I, T> From<Vec<T>> for IdxVec<I, T> {
  fn from(vec: Vec<T>) -> Self { Self(vec, PhantomData) }
}

impl<I, T> Default for IdxVec<I, T> {
  fn default() -> Self { vec![].into() }
}

impl<I: Idx, T> Index<I> for IdxVec<I, T> {
  type Output = T;
  fn index(&self, index: I) -> &Self::Output { &self.0[I::into_usize(index)] }
}

impl<I: Idx, T> IndexMut<I> for IdxVec<I, T> {
  fn index_mut(&mut self, index: I) -> &mut Self::Output { &mut self.0[I::into_usize(index)] }
}

#[macro_export]
macro_rules! mk_id {
  ($($id:ident,)*) => {
    $(
      #[derive(Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
      pub struct $id(pub u32);
      impl $crate::types::Idx for $id {
        fn from_usize(n: usize) -> Self { Self(n as u32) }
        fn into_usize(self) -> usize { self.0 as usize }
      }
      impl std::fmt::Debug for $id {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { self.0.fmt(f) }
      }
    )*
  };
}

mk_id! {
  TermId,
  FuncId,
  VarId,
}

/// Rule priority. Larger priorities are tried first.
pub type Priority = i32;
