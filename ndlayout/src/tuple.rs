/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Hierarchical tuples: the tree structure underlying shapes, strides
//! and coordinates.
//!
//! A [`Tuple<T>`] is either a single value (a *leaf*) or an ordered
//! sequence of tuples (a *node*). Nodes may nest arbitrarily deep and
//! may have any arity, including zero:
//!
//! ```text
//! (2,(2,2))        node of [leaf 2, node of [leaf 2, leaf 2]]
//! 8                leaf 8
//! ()               empty node
//! ```
//!
//! Rust tuples, arrays and vectors convert into trees, so shapes can
//! be written as literals:
//!
//! ```
//! # use ndlayout::Shape;
//! let shape = Shape::from((2, (2, 2)));
//! assert_eq!(shape.rank(), 2);
//! assert_eq!(shape.depth(), 2);
//! assert_eq!(shape.size(), 8);
//! assert_eq!(shape.to_string(), "(_2,(_2,_2))");
//! ```

use std::fmt;

use enum_as_inner::EnumAsInner;
use serde::Deserialize;
use serde::Serialize;

use crate::int::Int;

/// A possibly-nested tuple with leaves of type `T`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, EnumAsInner)]
pub enum Tuple<T> {
    Leaf(T),
    Node(Vec<Tuple<T>>),
}

/// Extents of a layout, one leaf per (possibly nested) dimension.
pub type Shape = Tuple<Int>;

/// Per-leaf offset contributions, congruent to a [`Shape`].
pub type Stride = Tuple<Int>;

/// A coordinate into a layout. A coordinate may be congruent to the
/// shape (hierarchical), a single integer (linear), or anything in
/// between; see [`crate::coord`].
pub type Coord = Tuple<i64>;

impl<T> Tuple<T> {
    /// The arity of the outermost node; a leaf has rank 1.
    pub fn rank(&self) -> usize {
        match self {
            Tuple::Leaf(_) => 1,
            Tuple::Node(modes) => modes.len(),
        }
    }

    /// Nesting depth: 0 for a leaf, one more than the deepest child for
    /// a node.
    pub fn depth(&self) -> usize {
        match self {
            Tuple::Leaf(_) => 0,
            Tuple::Node(modes) => 1 + modes.iter().map(Tuple::depth).max().unwrap_or(0),
        }
    }

    /// The top-level modes. A leaf is its own single mode.
    pub fn modes(&self) -> &[Tuple<T>] {
        match self {
            Tuple::Leaf(_) => std::slice::from_ref(self),
            Tuple::Node(modes) => modes,
        }
    }

    /// The `i`-th top-level mode.
    pub fn get(&self, i: usize) -> Option<&Tuple<T>> {
        self.modes().get(i)
    }

    /// Leaves in left-to-right order.
    pub fn leaves(&self) -> Leaves<'_, T> {
        Leaves { stack: vec![self] }
    }

    /// Apply `f` to every leaf, keeping the tree structure.
    pub fn map<U>(&self, mut f: impl FnMut(&T) -> U) -> Tuple<U> {
        self.map_ref(&mut f)
    }

    fn map_ref<U>(&self, f: &mut impl FnMut(&T) -> U) -> Tuple<U> {
        match self {
            Tuple::Leaf(v) => Tuple::Leaf(f(v)),
            Tuple::Node(modes) => Tuple::Node(modes.iter().map(|m| m.map_ref(f)).collect()),
        }
    }

    /// Whether `self` and `other` have the same tree structure: same
    /// arity at every node, leaves in the same places.
    pub fn is_congruent<U>(&self, other: &Tuple<U>) -> bool {
        match (self, other) {
            (Tuple::Leaf(_), Tuple::Leaf(_)) => true,
            (Tuple::Node(a), Tuple::Node(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.is_congruent(y))
            }
            _ => false,
        }
    }

    /// Wrap `self` as the single mode of a new node.
    pub fn wrap(self) -> Tuple<T> {
        Tuple::Node(vec![self])
    }
}

impl<T: Clone> Tuple<T> {
    /// The leaves as a flat node of leaves. A leaf stays a leaf.
    pub fn flatten(&self) -> Tuple<T> {
        match self {
            Tuple::Leaf(_) => self.clone(),
            Tuple::Node(_) => Tuple::Node(self.leaves().cloned().map(Tuple::Leaf).collect()),
        }
    }

    /// Rebuild a tree with the structure of `profile` whose leaves are
    /// taken from `values` in order. Returns `None` if the number of
    /// values does not match the number of leaves in `profile`.
    pub fn unflatten<U>(values: &[T], profile: &Tuple<U>) -> Option<Tuple<T>> {
        let mut iter = values.iter().cloned();
        let tree = Self::unflatten_from(&mut iter, profile)?;
        iter.next().is_none().then_some(tree)
    }

    fn unflatten_from<U>(values: &mut impl Iterator<Item = T>, profile: &Tuple<U>) -> Option<Self> {
        match profile {
            Tuple::Leaf(_) => values.next().map(Tuple::Leaf),
            Tuple::Node(modes) => modes
                .iter()
                .map(|m| Self::unflatten_from(values, m))
                .collect::<Option<Vec<_>>>()
                .map(Tuple::Node),
        }
    }
}

impl Tuple<Int> {
    /// The product of all leaves; `1` for an empty node.
    pub fn size(&self) -> Int {
        self.leaves().copied().product()
    }

    /// Compact strides in colexicographic order: the leftmost leaf
    /// varies fastest.
    pub fn compact_col_major(&self) -> Stride {
        let mut current = Int::Static(1);
        self.map(|&extent| {
            let stride = current;
            current = current * extent;
            stride
        })
    }

    /// Compact strides in lexicographic order: the rightmost leaf
    /// varies fastest.
    pub fn compact_row_major(&self) -> Stride {
        let extents: Vec<Int> = self.leaves().copied().collect();
        let mut strides = vec![Int::Static(1); extents.len()];
        let mut current = Int::Static(1);
        for (stride, &extent) in strides.iter_mut().zip(&extents).rev() {
            *stride = current;
            current = current * extent;
        }
        // Same leaf count as `self` by construction.
        Tuple::unflatten(&strides, self).unwrap_or_else(|| self.compact_col_major())
    }

    /// Whether every leaf is statically known.
    pub fn is_static(&self) -> bool {
        self.leaves().all(|v| v.is_static())
    }
}

/// Depth-first, left-to-right iterator over the leaves of a
/// [`Tuple`].
pub struct Leaves<'a, T> {
    stack: Vec<&'a Tuple<T>>,
}

impl<'a, T> Iterator for Leaves<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        while let Some(top) = self.stack.pop() {
            match top {
                Tuple::Leaf(v) => return Some(v),
                Tuple::Node(modes) => self.stack.extend(modes.iter().rev()),
            }
        }
        None
    }
}

impl<T: fmt::Display> fmt::Display for Tuple<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tuple::Leaf(v) => write!(f, "{}", v),
            Tuple::Node(modes) => {
                write!(f, "(")?;
                for (i, mode) in modes.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}", mode)?;
                }
                write!(f, ")")
            }
        }
    }
}

macro_rules! impl_leaf_from {
    ($target:ty => $($source:ty),+) => {
        $(
            impl From<$source> for Tuple<$target> {
                fn from(value: $source) -> Self {
                    Tuple::Leaf(<$target>::from(value))
                }
            }
        )+
    };
}

impl_leaf_from!(Int => Int, i64, i32, usize);

impl From<i64> for Coord {
    fn from(value: i64) -> Self {
        Tuple::Leaf(value)
    }
}

impl From<i32> for Coord {
    fn from(value: i32) -> Self {
        Tuple::Leaf(value.into())
    }
}

impl From<usize> for Coord {
    fn from(value: usize) -> Self {
        Tuple::Leaf(value as i64)
    }
}

macro_rules! impl_tuple_from {
    ($($name:ident),+) => {
        impl<T, $($name),+> From<($($name,)+)> for Tuple<T>
        where
            $($name: Into<Tuple<T>>),+
        {
            #[allow(non_snake_case)]
            fn from(($($name,)+): ($($name,)+)) -> Self {
                Tuple::Node(vec![$($name.into()),+])
            }
        }
    };
}

impl_tuple_from!(A, B);
impl_tuple_from!(A, B, C);
impl_tuple_from!(A, B, C, D);

impl<T> From<()> for Tuple<T> {
    fn from(_: ()) -> Self {
        Tuple::Node(Vec::new())
    }
}

impl<T, E: Into<Tuple<T>>, const N: usize> From<[E; N]> for Tuple<T> {
    fn from(values: [E; N]) -> Self {
        Tuple::Node(values.into_iter().map(Into::into).collect())
    }
}

impl<T, E: Into<Tuple<T>>> From<Vec<E>> for Tuple<T> {
    fn from(values: Vec<E>) -> Self {
        Tuple::Node(values.into_iter().map(Into::into).collect())
    }
}

#[allow(dead_code)]
const _: () = {
    fn assert<T: Send + Sync + 'static>() {}
    let _ = assert::<Shape>;
    let _ = assert::<Coord>;
};
