/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Tagged integers for extents and strides.
//!
//! Every leaf of a [`Shape`](crate::Shape) or
//! [`Stride`](crate::Stride) is an [`Int`]: either a value that is
//! known when the layout is written down ([`Int::Static`]) or one
//! that is only known once the program runs ([`Int::Dynamic`]).
//! Arithmetic folds static operands into static results; as soon as
//! a dynamic value is involved the result is dynamic.
//!
//! The tag never changes a value. It only tells the algebra which
//! structural rewrites (e.g. coalescing two modes) can be decided up
//! front:
//!
//! ```
//! # use ndlayout::Int;
//! let a = Int::from(4);
//! let b = Int::dynamic(2);
//! assert!((a * a).is_static());
//! assert!((a * b).is_dynamic());
//! assert_eq!(a * b, 8);
//! ```

use std::cmp::Ordering;
use std::fmt;
use std::hash::Hash;
use std::hash::Hasher;
use std::ops;

use enum_as_inner::EnumAsInner;
use serde::Deserialize;
use serde::Serialize;

/// An extent or stride value, tagged with whether it is statically
/// known.
///
/// Equality, ordering and hashing look at the value only:
/// `Int::Static(4) == Int::Dynamic(4)`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, EnumAsInner)]
pub enum Int {
    /// A value fixed when the layout is described.
    Static(i64),
    /// A value supplied at run time.
    Dynamic(i64),
}

impl Int {
    /// A runtime value.
    pub fn dynamic(value: i64) -> Self {
        Int::Dynamic(value)
    }

    /// The underlying value, regardless of tag.
    pub fn value(self) -> i64 {
        match self {
            Int::Static(v) | Int::Dynamic(v) => v,
        }
    }

    /// Combine two values, producing a static result only if both
    /// inputs are static.
    fn lift(self, other: Int, f: impl FnOnce(i64, i64) -> i64) -> Int {
        let value = f(self.value(), other.value());
        if self.is_static() && other.is_static() {
            Int::Static(value)
        } else {
            Int::Dynamic(value)
        }
    }

    fn try_lift(self, other: Int, f: impl FnOnce(i64, i64) -> Option<i64>) -> Option<Int> {
        let value = f(self.value(), other.value())?;
        Some(if self.both_static(other) {
            Int::Static(value)
        } else {
            Int::Dynamic(value)
        })
    }

    fn map(self, f: impl FnOnce(i64) -> i64) -> Int {
        match self {
            Int::Static(v) => Int::Static(f(v)),
            Int::Dynamic(v) => Int::Dynamic(f(v)),
        }
    }

    pub fn abs(self) -> Int {
        self.map(i64::abs)
    }

    pub fn signum(self) -> Int {
        self.map(i64::signum)
    }

    pub fn min(self, other: Int) -> Int {
        self.lift(other, i64::min)
    }

    pub fn max(self, other: Int) -> Int {
        self.lift(other, i64::max)
    }

    /// `self + other`, or `None` on overflow.
    pub fn checked_add(self, other: Int) -> Option<Int> {
        self.try_lift(other, i64::checked_add)
    }

    /// `self * other`, or `None` on overflow.
    pub fn checked_mul(self, other: Int) -> Option<Int> {
        self.try_lift(other, i64::checked_mul)
    }

    /// `⌈self / other⌉` for positive `other`.
    pub fn ceil_div(self, other: Int) -> Int {
        self.lift(other, |a, b| (a + b - 1) / b)
    }

    /// Division that tolerates the divisor being a multiple of the
    /// dividend: returns `self / other` if `other` divides `self`, `1`
    /// if `self` divides `other`, and `None` otherwise.
    ///
    /// This is the divisibility rule used when walking strides through
    /// a composition.
    pub fn shape_div(self, other: Int) -> Option<Int> {
        let (a, b) = (self.value(), other.value());
        if b != 0 && a % b == 0 {
            Some(self.lift(other, |a, b| a / b))
        } else if a != 0 && b % a == 0 {
            Some(self.lift(other, |_, _| 1))
        } else {
            None
        }
    }

    /// Whether both values are static, i.e. a structural decision that
    /// depends on them can be made without runtime information.
    pub fn both_static(self, other: Int) -> bool {
        self.is_static() && other.is_static()
    }
}

impl PartialEq for Int {
    fn eq(&self, other: &Self) -> bool {
        self.value() == other.value()
    }
}

impl Eq for Int {}

impl PartialEq<i64> for Int {
    fn eq(&self, other: &i64) -> bool {
        self.value() == *other
    }
}

impl PartialOrd for Int {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Int {
    fn cmp(&self, other: &Self) -> Ordering {
        self.value().cmp(&other.value())
    }
}

impl PartialOrd<i64> for Int {
    fn partial_cmp(&self, other: &i64) -> Option<Ordering> {
        Some(self.value().cmp(other))
    }
}

impl Hash for Int {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value().hash(state);
    }
}

impl Default for Int {
    fn default() -> Self {
        Int::Static(0)
    }
}

impl From<i64> for Int {
    fn from(value: i64) -> Self {
        Int::Static(value)
    }
}

impl From<i32> for Int {
    fn from(value: i32) -> Self {
        Int::Static(value.into())
    }
}

impl From<usize> for Int {
    fn from(value: usize) -> Self {
        Int::Static(value as i64)
    }
}

impl From<Int> for i64 {
    fn from(value: Int) -> Self {
        value.value()
    }
}

macro_rules! impl_binop {
    ($trait:ident, $method:ident, $op:tt) => {
        impl ops::$trait for Int {
            type Output = Int;

            fn $method(self, rhs: Int) -> Int {
                self.lift(rhs, |a, b| a $op b)
            }
        }

        impl ops::$trait<i64> for Int {
            type Output = Int;

            fn $method(self, rhs: i64) -> Int {
                self.map(|a| a $op rhs)
            }
        }
    };
}

impl_binop!(Add, add, +);
impl_binop!(Sub, sub, -);
impl_binop!(Mul, mul, *);
impl_binop!(Div, div, /);
impl_binop!(Rem, rem, %);

impl ops::Neg for Int {
    type Output = Int;

    fn neg(self) -> Int {
        self.map(|v| -v)
    }
}

impl std::iter::Product for Int {
    fn product<I: Iterator<Item = Int>>(iter: I) -> Int {
        iter.fold(Int::Static(1), |acc, v| acc * v)
    }
}

impl std::iter::Sum for Int {
    fn sum<I: Iterator<Item = Int>>(iter: I) -> Int {
        iter.fold(Int::Static(0), |acc, v| acc + v)
    }
}

/// Static values print with a leading underscore (`_4`), dynamic
/// ones as plain numbers.
impl fmt::Display for Int {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Int::Static(v) => write!(f, "_{}", v),
            Int::Dynamic(v) => write!(f, "{}", v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_propagation() {
        let s = Int::from(6);
        let d = Int::dynamic(3);
        assert!((s + s).is_static());
        assert!((s - d).is_dynamic());
        assert!((d * s).is_dynamic());
        assert!((s / 2).is_static());
        assert!((-d).is_dynamic());
        assert_eq!(s % d, 0);
        assert_eq!([s, s, s].into_iter().product::<Int>(), 216);
        assert!([s, d].into_iter().sum::<Int>().is_dynamic());
    }

    #[test]
    fn test_value_equality() {
        assert_eq!(Int::Static(4), Int::Dynamic(4));
        assert_ne!(Int::Static(4), Int::Static(5));
        assert!(Int::dynamic(3) < Int::from(4));
        assert_eq!(Int::from(7).max(Int::dynamic(9)), Int::Dynamic(9));
    }

    #[test]
    fn test_ceil_div() {
        assert_eq!(Int::from(24).ceil_div(Int::from(8)), 3);
        assert_eq!(Int::from(25).ceil_div(Int::from(8)), 4);
        assert_eq!(Int::from(1).ceil_div(Int::from(8)), 1);
    }

    #[test]
    fn test_checked() {
        assert_eq!(Int::from(6).checked_mul(Int::from(7)), Some(Int::from(42)));
        assert!(Int::from(6)
            .checked_add(Int::dynamic(1))
            .unwrap()
            .is_dynamic());
        assert_eq!(Int::from(i64::MAX).checked_add(Int::from(1)), None);
        assert_eq!(Int::from(1i64 << 32).checked_mul(Int::from(1i64 << 32)), None);
    }

    #[test]
    fn test_shape_div() {
        assert_eq!(Int::from(12).shape_div(Int::from(4)), Some(Int::from(3)));
        assert_eq!(Int::from(4).shape_div(Int::from(12)), Some(Int::from(1)));
        assert_eq!(Int::from(6).shape_div(Int::from(4)), None);
        assert!(Int::from(12)
            .shape_div(Int::dynamic(4))
            .unwrap()
            .is_dynamic());
    }

    #[test]
    fn test_display() {
        assert_eq!(Int::from(4).to_string(), "_4");
        assert_eq!(Int::dynamic(4).to_string(), "4");
        assert_eq!(Int::from(-2).to_string(), "_-2");
    }
}
