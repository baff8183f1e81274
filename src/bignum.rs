use num_bigint::BigInt;
use num_traits::{One, Signed, ToPrimitive, Zero};
use std::cmp::Ordering;
use std::fmt::{Debug, Display};

/// An exact rational number. Integers are the numbers with denominator 1.
#[derive(PartialEq, Eq, Hash, Clone)]
pub struct Num {
  num: BigInt,
  den: BigInt, // Invariant: positive, and coprime to num
}

impl Default for Num {
  fn default() -> Self { Self::zero() }
}

impl Display for Num {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    if self.den.is_one() {
      write!(f, "{}", self.num)
    } else {
      write!(f, "{}/{}", self.num, self.den)
    }
  }
}

impl Debug for Num {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "{self}") }
}

pub fn gcd(a: &BigInt, b: &BigInt) -> BigInt {
  let (mut a, mut b) = (a.abs(), b.abs());
  while !a.is_zero() {
    let r = &b % &a;
    b = std::mem::replace(&mut a, r);
  }
  b
}

impl Num {
  pub fn int(n: impl Into<BigInt>) -> Self { Self { num: n.into(), den: BigInt::one() } }
  pub fn zero() -> Self { Self::int(0) }
  pub fn one() -> Self { Self::int(1) }

  /// Returns `Err` if the denominator is zero.
  pub fn ratio(num: BigInt, den: BigInt) -> Result<Self, ()> {
    if den.is_zero() {
      return Err(())
    }
    let g = gcd(&num, &den);
    let (mut num, mut den) = (num / &g, den / g);
    if den.is_negative() {
      (num, den) = (-num, -den)
    }
    Ok(Self { num, den })
  }

  pub fn numer(&self) -> &BigInt { &self.num }
  pub fn denom(&self) -> &BigInt { &self.den }
  pub fn is_int(&self) -> bool { self.den.is_one() }
  pub fn is_zero(&self) -> bool { self.num.is_zero() }
  pub fn is_one(&self) -> bool { self.num.is_one() && self.den.is_one() }

  pub fn to_i32(&self) -> Option<i32> {
    if self.is_int() {
      self.num.to_i32()
    } else {
      None
    }
  }

  pub fn inv(&self) -> Result<Self, ()> { Self::ratio(self.den.clone(), self.num.clone()) }

  /// Euclidean remainder; only defined on integers with a nonzero divisor.
  pub fn rem_euclid(&self, rhs: &Self) -> Result<Self, ()> {
    if !self.is_int() || !rhs.is_int() || rhs.is_zero() {
      return Err(())
    }
    let mut r = &self.num % &rhs.num;
    if r.is_negative() {
      r += rhs.num.abs()
    }
    Ok(Self::int(r))
  }
}

impl Ord for Num {
  fn cmp(&self, other: &Self) -> Ordering { (&self.num * &other.den).cmp(&(&other.num * &self.den)) }
}
impl PartialOrd for Num {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> { Some(self.cmp(other)) }
}

impl std::ops::Add for &Num {
  type Output = Num;
  fn add(self, rhs: Self) -> Num {
    if self.is_int() && rhs.is_int() {
      return Num::int(&self.num + &rhs.num)
    }
    let num = &self.num * &rhs.den + &rhs.num * &self.den;
    Num::ratio(num, &self.den * &rhs.den).unwrap_or_else(|()| unreachable!())
  }
}

impl std::ops::Neg for &Num {
  type Output = Num;
  fn neg(self) -> Num { Num { num: -&self.num, den: self.den.clone() } }
}

impl std::ops::Sub for &Num {
  type Output = Num;
  fn sub(self, rhs: Self) -> Num { self + &-rhs }
}

impl std::ops::Mul for &Num {
  type Output = Num;
  fn mul(self, rhs: Self) -> Num {
    if self.is_int() && rhs.is_int() {
      return Num::int(&self.num * &rhs.num)
    }
    Num::ratio(&self.num * &rhs.num, &self.den * &rhs.den).unwrap_or_else(|()| unreachable!())
  }
}

impl std::ops::Div for &Num {
  type Output = Result<Num, ()>;
  #[allow(clippy::suspicious_arithmetic_impl)]
  fn div(self, rhs: Self) -> Self::Output { Ok(self * &rhs.inv()?) }
}

impl From<i64> for Num {
  fn from(value: i64) -> Self { Self::int(value) }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn q(n: i64, d: i64) -> Num { Num::ratio(n.into(), d.into()).unwrap() }

  #[test]
  fn ratio_normalizes_sign_and_gcd() {
    let r = q(4, -6);
    assert_eq!(r.numer(), &BigInt::from(-2));
    assert_eq!(r.denom(), &BigInt::from(3));
    assert!(Num::ratio(1.into(), 0.into()).is_err());
    assert!(q(6, 3).is_int());
  }

  #[test]
  fn arithmetic() {
    assert_eq!(&q(1, 2) + &q(1, 3), q(5, 6));
    assert_eq!(&q(1, 2) - &q(1, 2), Num::zero());
    assert_eq!(&q(2, 3) * &q(3, 2), Num::one());
    assert_eq!((&q(1, 2) / &q(1, 4)).unwrap(), Num::int(2));
    assert!((&Num::one() / &Num::zero()).is_err());
    assert_eq!(Num::int(-7).rem_euclid(&Num::int(3)).unwrap(), Num::int(2));
    assert!(q(1, 2) < q(2, 3));
    assert_eq!(q(3, 4).to_string(), "3/4");
    assert_eq!(Num::int(i64::from(i32::MAX) + 1).to_i32(), None);
  }
}
