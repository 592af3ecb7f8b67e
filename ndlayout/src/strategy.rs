/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Property-based generators for [`Shape`]s and [`Layout`]s.
//!
//! These strategies are used in `proptest`-based tests to construct
//! randomized nested shapes and layouts with known properties
//! (compact, injective, power-of-two extents) for testing coordinate
//! mapping and the layout algebra.
//!
//! Example usage:
//!
//! ```ignore
//! use proptest::prelude::*;
//!
//! use crate::strategy::gen_compact_layout;
//!
//! proptest! {
//!     #[test]
//!     fn test_layout(layout in gen_compact_layout(3, 3, 4)) {
//!         prop_assert!(layout.is_compact());
//!     }
//! }
//! ```
//!
//! This module is only included in test builds (`#[cfg(test)]`).

use proptest::prelude::*;

use crate::Int;
use crate::Layout;
use crate::Shape;
use crate::Tuple;

/// Upper bound on the size of generated shapes, so that tests can
/// enumerate every coordinate.
const MAX_SIZE: i64 = 512;

/// Replace extents with 1 once the running product would exceed
/// [`MAX_SIZE`].
fn cap_size(shape: Shape) -> Shape {
    let mut size = 1;
    shape.map(|&e| {
        if size * e.value() > MAX_SIZE {
            Int::from(1)
        } else {
            size *= e.value();
            e
        }
    })
}

/// Generates a random nested [`Shape`] of at most `max_depth` levels,
/// with at most `max_rank` modes per node and extents in
/// `1..=max_extent`.
pub fn gen_shape(max_depth: u32, max_rank: usize, max_extent: i64) -> impl Strategy<Value = Shape> {
    let leaf = (1..=max_extent).prop_map(|e| Tuple::Leaf(Int::from(e)));
    leaf.prop_recursive(max_depth, 16, max_rank as u32, move |inner| {
        prop::collection::vec(inner, 1..=max_rank).prop_map(Tuple::Node)
    })
    .prop_map(cap_size)
}

/// Like [`gen_shape`], with every extent a power of two up to
/// `2^max_log`. Compositions of such layouts always satisfy the
/// stride divisibility condition.
pub fn gen_pow2_shape(max_depth: u32, max_rank: usize, max_log: u32) -> impl Strategy<Value = Shape> {
    let leaf = (0..=max_log).prop_map(|k| Tuple::Leaf(Int::from(1i64 << k)));
    leaf.prop_recursive(max_depth, 16, max_rank as u32, move |inner| {
        prop::collection::vec(inner, 1..=max_rank).prop_map(Tuple::Node)
    })
    .prop_map(cap_size)
}

/// Assigns compact strides to `shape`, leaves ordered by the
/// permutation `order` (a shuffled `0..n`).
fn ordered(shape: Shape, order: Vec<i64>) -> Layout {
    let order = Tuple::unflatten(&order, &shape).unwrap();
    Layout::ordered(shape, order).unwrap()
}

/// Generates a compact layout (a bijection onto `[0, size)`) over a
/// shape from [`gen_shape`], with the leaves' stride order shuffled.
pub fn gen_compact_layout(
    max_depth: u32,
    max_rank: usize,
    max_extent: i64,
) -> impl Strategy<Value = Layout> {
    gen_shape(max_depth, max_rank, max_extent).prop_flat_map(|shape| {
        let n = shape.leaves().count() as i64;
        (Just(shape), Just((0..n).collect::<Vec<_>>()).prop_shuffle())
            .prop_map(|(shape, order)| ordered(shape, order))
    })
}

/// Generates a compact layout whose extents are powers of two.
pub fn gen_pow2_layout(max_depth: u32, max_rank: usize, max_log: u32) -> impl Strategy<Value = Layout> {
    gen_pow2_shape(max_depth, max_rank, max_log).prop_flat_map(|shape| {
        let n = shape.leaves().count() as i64;
        (Just(shape), Just((0..n).collect::<Vec<_>>()).prop_shuffle())
            .prop_map(|(shape, order)| ordered(shape, order))
    })
}

/// Generates `count` compact layouts of the same size: each permutes
/// the extents of one power-of-two shape within its nesting and
/// shuffles the stride order. Any one of them can be composed with
/// any other.
pub fn gen_pow2_family(
    count: usize,
    max_depth: u32,
    max_rank: usize,
    max_log: u32,
) -> impl Strategy<Value = Vec<Layout>> {
    gen_pow2_shape(max_depth, max_rank, max_log).prop_flat_map(move |shape| {
        let extents: Vec<Int> = shape.leaves().copied().collect();
        let n = extents.len() as i64;
        let member = (
            Just(extents).prop_shuffle(),
            Just((0..n).collect::<Vec<_>>()).prop_shuffle(),
        )
            .prop_map(move |(extents, order)| {
                let shape = Tuple::unflatten(&extents, &shape).unwrap();
                ordered(shape, order)
            });
        prop::collection::vec(member, count)
    })
}

/// Generates an injective layout with gaps: a compact layout whose
/// strides are each scaled so that every leaf starts past the span
/// of the leaves ordered before it, padded by a factor of 1 or 2.
pub fn gen_injective_layout(
    max_depth: u32,
    max_rank: usize,
    max_extent: i64,
) -> impl Strategy<Value = Layout> {
    gen_shape(max_depth, max_rank, max_extent).prop_flat_map(|shape| {
        let n = shape.leaves().count();
        (
            Just(shape),
            Just((0..n).collect::<Vec<_>>()).prop_shuffle(),
            prop::collection::vec(1..=2i64, n),
        )
            .prop_map(move |(shape, order, pads)| {
                let extents: Vec<Int> = shape.leaves().copied().collect();
                let mut strides = vec![Int::from(0); n];
                let mut current = Int::from(1);
                for i in order {
                    current = current * pads[i];
                    strides[i] = current;
                    current = current * extents[i];
                }
                let stride = Tuple::unflatten(&strides, &shape).unwrap();
                Layout::new(shape, stride).unwrap()
            })
    })
}

/// Generates an arbitrary layout: nested shape, strides in
/// `-8..=8` (aliasing and gaps allowed).
pub fn gen_layout(max_depth: u32, max_rank: usize, max_extent: i64) -> impl Strategy<Value = Layout> {
    gen_shape(max_depth, max_rank, max_extent).prop_flat_map(|shape| {
        let n = shape.leaves().count();
        (Just(shape), prop::collection::vec(-8..=8i64, n)).prop_map(|(shape, strides)| {
            let strides: Vec<Int> = strides.into_iter().map(Int::from).collect();
            let stride = Tuple::unflatten(&strides, &shape).unwrap();
            Layout::new(shape, stride).unwrap()
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn test_gen_shape(shape in gen_shape(3, 3, 4)) {
            prop_assert!(shape.depth() <= 3);
            prop_assert!(shape.leaves().all(|&e| e >= 1 && e <= 4));
        }

        #[test]
        fn test_gen_compact_layout(layout in gen_compact_layout(3, 3, 4)) {
            prop_assert!(layout.is_compact());
        }

        #[test]
        fn test_gen_injective_layout(layout in gen_injective_layout(2, 3, 4)) {
            prop_assert!(layout.is_injective());
            prop_assert!(layout.cosize() >= layout.size());
        }

        #[test]
        fn test_gen_pow2_layout(layout in gen_pow2_layout(2, 3, 2)) {
            prop_assert!(layout.is_compact());
            prop_assert!(layout.leaf_pairs().all(|(s, _)| (s.value() & (s.value() - 1)) == 0));
        }
    }
}
