/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! The algebraic core: flatten, coalesce, complement and composition.
//!
//! Every operation here is a pure function from layouts to a new
//! layout. Products and divisions ([`crate::product`],
//! [`crate::divide`]) are built entirely from these.
//!
//! # Coalesce
//!
//! Two adjacent leaf modes `(s0, d0)` and `(s1, d1)` can be merged
//! into `(s0 * s1, d0)` when `d1 == s0 * d0`, and a mode of extent 1
//! can be dropped, without changing the offset of any linear
//! coordinate. [`Layout::coalesce`] applies both rewrites to a fixed
//! point, but only where the decision involves static values alone;
//! runtime modes are left as they are.
//!
//! # Complement
//!
//! For an injective layout `L` and a cotarget `T`,
//! `complement(L, T)` is the compact-as-possible layout `C`, with
//! strides ordered increasingly, such that every offset in `[0, T)` is
//! `L(i) + C(j)` for exactly one pair `(i, j)` whenever `L` tiles its
//! own span.
//!
//! # Composition
//!
//! `(A ∘ B)(x) = A(B(x))`. The result has the shape of `B`, with leaf
//! modes of `B` split where they straddle a mode boundary of `A`.

use crate::divide::Tile;
use crate::divide::TileMode;
use crate::int::Int;
use crate::layout::Layout;
use crate::layout::LayoutError;
use crate::tuple::Tuple;

/// Which rewrites [`coalesce_pairs`] may perform on runtime values.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Resolve {
    /// Only rewrite modes whose extents and strides are static.
    Static,
    /// Rewrite regardless of tags.
    All,
}

fn coalesce_pairs(pairs: impl Iterator<Item = (Int, Int)>, resolve: Resolve) -> Layout {
    let mut out: Vec<(Int, Int)> = Vec::new();
    for (s, d) in pairs {
        if s == 1 && (resolve == Resolve::All || s.is_static()) {
            continue;
        }
        match out.last_mut() {
            Some((ps, pd))
                if (resolve == Resolve::All || (ps.both_static(*pd) && d.is_static()))
                    && d == *ps * *pd =>
            {
                *ps = *ps * s;
            }
            _ => out.push((s, d)),
        }
    }
    Layout::from_pairs(out)
}

impl Layout {
    /// Un-nest every mode: one top-level mode per leaf, in order. Leaf
    /// layouts are returned unchanged.
    pub fn flatten(&self) -> Layout {
        Layout::from_parts(self.shape().flatten(), self.stride().flatten())
    }

    /// Merge contiguous modes and drop extent-1 modes.
    ///
    /// The result is flat (or a single leaf) and maps every linear
    /// coordinate to the same offset as `self`:
    ///
    /// ```
    /// # use ndlayout::Layout;
    /// let layout = Layout::new((2, (1, 6)), (1, (6, 2))).unwrap();
    /// assert_eq!(layout.coalesce(), Layout::new(12, 1).unwrap());
    /// ```
    pub fn coalesce(&self) -> Layout {
        coalesce_pairs(self.leaf_pairs(), Resolve::Static)
    }

    /// Coalesce ignoring the static/dynamic distinction; the algebra
    /// uses this internally when it needs the canonical form.
    pub(crate) fn coalesce_resolved(&self) -> Layout {
        coalesce_pairs(self.leaf_pairs(), Resolve::All)
    }

    /// Coalesce each top-level mode separately, keeping the rank.
    pub fn coalesce_by_mode(&self) -> Layout {
        match self.shape() {
            Tuple::Leaf(_) => self.coalesce(),
            Tuple::Node(_) => Layout::concat(self.modes().map(|m| m.coalesce())),
        }
    }

    /// Replace every broadcast (stride-0) leaf with `1:0`.
    pub fn filter_zeros(&self) -> Layout {
        let shape = self
            .shape()
            .leaves()
            .zip(self.stride().leaves())
            .map(|(&s, &d)| if d == 0 { Int::Static(1) } else { s })
            .collect::<Vec<_>>();
        match Tuple::unflatten(&shape, self.shape()) {
            Some(shape) => Layout::from_parts(shape, self.stride().clone()),
            None => self.clone(),
        }
    }

    /// The distinct offsets of `self` as a coalesced layout: broadcast
    /// modes removed, contiguous modes merged.
    pub fn filter(&self) -> Layout {
        self.filter_zeros().coalesce_resolved()
    }

    /// The layout of the offsets in `[0, cotarget)` that `self` leaves
    /// out.
    ///
    /// ```
    /// # use ndlayout::Layout;
    /// let layout = Layout::new(4, 2).unwrap();
    /// assert_eq!(
    ///     layout.complement(24).unwrap(),
    ///     Layout::new((2, 3), (1, 8)).unwrap()
    /// );
    /// ```
    ///
    /// Fails if `cosize(self) > cotarget`, if `self` is not injective,
    /// or if its strides do not nest (each stride, sorted, must be a
    /// multiple of the span covered by the smaller ones). All of these
    /// are decided from the leaves, without visiting any offsets.
    pub fn complement(&self, cotarget: impl Into<Int>) -> Result<Layout, LayoutError> {
        let cotarget = cotarget.into();
        let cosize = self.cosize();
        if cosize > cotarget {
            return Err(LayoutError::CotargetTooSmall {
                cosize: cosize.value(),
                cotarget: cotarget.value(),
            });
        }
        if self.size() == 0 {
            return Ok(Layout::from_pairs(vec![(cotarget, Int::Static(1))]));
        }
        let leaves = self.nested_leaves().inspect_err(|err| {
            tracing::debug!(layout = %self, %err, "complement rejected");
        })?;

        let mut result = Vec::with_capacity(leaves.len() + 1);
        let mut current = Int::Static(1);
        for leaf in leaves {
            result.push((leaf.stride / current, current));
            current = leaf.extent * leaf.stride;
        }
        result.push((cotarget.ceil_div(current), current));

        let complement = coalesce_pairs(result.into_iter(), Resolve::All);
        tracing::trace!(layout = %self, cotarget = %cotarget, result = %complement, "complement");
        Ok(complement)
    }

    /// The leaves of `self` of extent greater than one, sorted by
    /// absolute stride, provided each stride is a multiple of the span
    /// `extent * stride` of the leaf before it. Such a layout is
    /// injective, and its offsets are ordered colexicographically
    /// along the sorted leaves.
    ///
    /// Fails with [`LayoutError::Aliasing`] on a broadcast leaf or a
    /// stride that repeats an offset of the smaller leaves, and with
    /// [`LayoutError::NotComplementable`] on any other stride that
    /// does not nest.
    pub(crate) fn nested_leaves(&self) -> Result<Vec<NestedLeaf>, LayoutError> {
        let mut leaves = Vec::new();
        for (index, (extent, stride)) in self.leaf_pairs().enumerate() {
            if extent <= 1 {
                continue;
            }
            if stride == 0 {
                return Err(LayoutError::Aliasing {
                    layout: self.clone(),
                });
            }
            leaves.push(NestedLeaf {
                index,
                extent,
                stride: stride.abs(),
                reversed: stride < 0,
            });
        }
        leaves.sort_by_key(|leaf| leaf.stride);

        let mut current = Int::Static(1);
        for (k, leaf) in leaves.iter().enumerate() {
            if leaf.stride % current != 0 {
                if reaches(&leaves[..k], leaf.stride.value()) {
                    return Err(LayoutError::Aliasing {
                        layout: self.clone(),
                    });
                }
                return Err(LayoutError::NotComplementable {
                    layout: self.clone(),
                    stride: leaf.stride.value(),
                    span: current.value(),
                });
            }
            current = leaf.extent * leaf.stride;
        }
        Ok(leaves)
    }

    /// Functional composition: `self.compose(rhs)` maps `x` to
    /// `self(rhs(x))`.
    ///
    /// ```
    /// # use ndlayout::Layout;
    /// let a = Layout::new((6, 2), (8, 2)).unwrap();
    /// let b = Layout::new((4, 3), (3, 1)).unwrap();
    /// assert_eq!(
    ///     a.compose(&b).unwrap(),
    ///     Layout::new(((2, 2), 3), ((24, 2), 8)).unwrap()
    /// );
    /// ```
    ///
    /// Requires every offset of `rhs` to lie in `[0, size(self))`, and
    /// the modes of `rhs` to stay within the modes of `self`: once
    /// `self` is coalesced, the largest offsets the `rhs` modes reach
    /// inside any mode but the last must not sum past its extent.
    /// Otherwise the result would not be `self(rhs(x))` and composition
    /// fails with [`LayoutError::CompositionCarry`].
    pub fn compose(&self, rhs: &Layout) -> Result<Layout, LayoutError> {
        let (min_offset, cosize, size) = (rhs.min_offset(), rhs.cosize(), self.size());
        if min_offset < 0 || cosize > size {
            tracing::debug!(lhs = %self, rhs = %rhs, "composition out of domain");
            return Err(LayoutError::CompositionOutOfDomain {
                min_offset,
                cosize: cosize.value(),
                size: size.value(),
            });
        }
        let lhs: Vec<(Int, Int)> = self.coalesce_resolved().leaf_pairs().collect();
        let mut reach = vec![0i64; lhs.len()];
        let result = compose_modes(&lhs, rhs, &mut reach)?;
        let carry = lhs
            .iter()
            .zip(&reach)
            .take(lhs.len().saturating_sub(1))
            .position(|(&(s, _), &r)| r >= s.value());
        if let Some(mode) = carry {
            tracing::debug!(lhs = %self, rhs = %rhs, mode, "composition carries across modes");
            return Err(LayoutError::CompositionCarry {
                lhs: self.clone(),
                rhs: rhs.clone(),
                mode,
            });
        }
        tracing::trace!(lhs = %self, rhs = %rhs, result = %result, "composition");
        Ok(result)
    }

    /// Compose each top-level mode of `self` with the matching entry of
    /// `tile`. Modes past the end of `tile`, and `All` entries, are left
    /// unchanged.
    pub fn compose_tile(&self, tile: &Tile) -> Result<Layout, LayoutError> {
        if tile.len() > self.rank() {
            return Err(LayoutError::RankMismatch {
                expected: self.rank(),
                got: tile.len(),
            });
        }
        let modes = self
            .modes()
            .enumerate()
            .map(|(i, mode)| match tile.get(i) {
                None | Some(TileMode::All) => Ok(mode),
                Some(entry) => mode.compose(&entry.to_layout(&mode)),
            })
            .collect::<Result<Vec<_>, _>>()?;
        match self.shape() {
            Tuple::Leaf(_) => Ok(modes.into_iter().next().unwrap_or_else(Layout::unit)),
            Tuple::Node(_) => Ok(Layout::concat(modes)),
        }
    }
}

/// A leaf of a layout whose strides nest; see [`Layout::nested_leaves`].
#[derive(Clone, Copy, Debug)]
pub(crate) struct NestedLeaf {
    /// Position among the leaves of the layout.
    pub(crate) index: usize,
    pub(crate) extent: Int,
    /// Absolute value of the leaf's stride.
    pub(crate) stride: Int,
    /// Whether the stride is negative.
    pub(crate) reversed: bool,
}

/// Whether `offset` is `Σ coord * stride` for some coordinate of the
/// nested `leaves`. Each coordinate is forced: larger strides exceed
/// everything the smaller leaves can add.
fn reaches(leaves: &[NestedLeaf], offset: i64) -> bool {
    let mut rest = offset;
    for leaf in leaves.iter().rev() {
        let coord = rest / leaf.stride.value();
        if coord >= leaf.extent.value() {
            return false;
        }
        rest -= coord * leaf.stride.value();
    }
    rest == 0
}

/// Compose the flat, coalesced `lhs` with every mode of `rhs`,
/// preserving `rhs`'s structure. `reach[j]` accumulates the largest
/// index each `rhs` mode reaches inside mode `j` of `lhs`.
fn compose_modes(
    lhs: &[(Int, Int)],
    rhs: &Layout,
    reach: &mut [i64],
) -> Result<Layout, LayoutError> {
    match (rhs.shape(), rhs.stride()) {
        (Tuple::Leaf(s), Tuple::Leaf(d)) => compose_leaf(lhs, *s, *d, reach),
        _ => {
            let modes = rhs
                .modes()
                .map(|m| compose_modes(lhs, &m, reach))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Layout::concat(modes))
        }
    }
}

/// Compose the flat `lhs` with the single mode `s:d`.
///
/// Walks the modes of `lhs` left to right, consuming the stride `d`
/// (how many `lhs` elements each step of the rhs skips) and then the
/// extent `s` (how many steps remain) from each mode in turn. Each
/// piece taken from mode `j` steps through it `new_shape` times at
/// `rest_stride`, so reaches `(new_shape - 1) * rest_stride`.
fn compose_leaf(
    lhs: &[(Int, Int)],
    s: Int,
    d: Int,
    reach: &mut [i64],
) -> Result<Layout, LayoutError> {
    if d == 0 {
        return Ok(Layout::from_pairs(vec![(s, d)]));
    }
    let Some((&(_, last_stride), init)) = lhs.split_last() else {
        return Ok(Layout::from_pairs(vec![(s, d)]));
    };
    if init.is_empty() {
        return Ok(Layout::from_pairs(vec![(s, d * last_stride)]));
    }

    let divide = |a: Int, b: Int| {
        a.shape_div(b).ok_or(LayoutError::StrideDivisibility {
            shape: a.value(),
            stride: b.value(),
        })
    };

    let mut out = Vec::new();
    let (mut rest_shape, mut rest_stride) = (s, d);
    for (j, &(curr_shape, curr_stride)) in init.iter().enumerate() {
        let next_shape = divide(curr_shape, rest_stride.abs())?;
        let next_stride = divide(rest_stride.abs(), curr_shape)? * rest_stride.signum();
        if next_shape == 1 || rest_shape == 1 {
            rest_stride = next_stride;
            continue;
        }
        let new_shape = next_shape.min(rest_shape);
        out.push((new_shape, rest_stride * curr_stride));
        reach[j] += (new_shape.value() - 1) * rest_stride.value().abs();
        rest_shape = divide(rest_shape, new_shape)?;
        rest_stride = next_stride;
    }
    if rest_shape != 1 || out.is_empty() {
        out.push((rest_shape, rest_stride * last_stride));
    }
    Ok(Layout::from_pairs(out))
}
