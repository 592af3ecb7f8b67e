/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Coordinate mapping.
//!
//! A layout accepts coordinates in three equivalent forms:
//!
//! - **hierarchical** (h-D): a tree congruent to the shape, one
//!   integer per leaf;
//! - **linear** (1-D): a single integer in `[0, size)`;
//! - **R-D**: one integer per top-level mode.
//!
//! A single integer given where the shape has a node is decoded
//! colexicographically against that node (the leftmost mode varies
//! fastest), so one rule covers all three forms, and any mixture of
//! them at any depth:
//!
//! ```text
//! shape  (2,(2,2))     stride (4,(1,2))
//! h-D    (1,(0,1))  -> 1*4 + 0*1 + 1*2 = 6
//! R-D    (1,2)      -> mode 1 decodes 2 as (0,1) -> 6
//! 1-D    5          -> (1,2) -> 6
//! ```
//!
//! The inverse direction, from an offset back to a coordinate, is
//! only defined for layouts whose strides can be peeled off largest
//! first; see [`LayoutMapInverse`].

use crate::int::Int;
use crate::layout::Layout;
use crate::layout::LayoutError;
use crate::tuple::Coord;
use crate::tuple::Shape;
use crate::tuple::Stride;
use crate::tuple::Tuple;

pub(crate) mod sealed {
    // Only types in this crate can implement it.
    pub trait Sealed {}
}

/// A map from coordinates (`ℕⁿ`, possibly nested) to linear offsets
/// (`ℤ`).
///
/// ```text
/// offset_of(x) = base + Σᵢ xᵢ × strideᵢ
/// ```
pub trait LayoutMap: sealed::Sealed {
    /// The number of top-level modes in the domain.
    fn rank(&self) -> usize;

    /// The number of coordinates in the domain.
    fn size(&self) -> i64;

    /// Maps a coordinate, in any of the accepted forms, to an offset.
    fn offset_of(&self, coord: &Coord) -> Result<i64, LayoutError>;
}

/// The inverse of [`LayoutMap::offset_of`], where it exists.
///
/// Aliasing or strides that do not nest may leave an offset without a
/// unique coordinate; those offsets map to `None`.
pub trait LayoutMapInverse: sealed::Sealed {
    /// The hierarchical coordinate of `offset`, if any.
    fn coord_of(&self, offset: i64) -> Option<Coord>;
}

impl sealed::Sealed for Layout {}

impl LayoutMap for Layout {
    fn rank(&self) -> usize {
        Layout::rank(self)
    }

    fn size(&self) -> i64 {
        Layout::size(self).value()
    }

    fn offset_of(&self, coord: &Coord) -> Result<i64, LayoutError> {
        crd2idx(coord, self.shape(), self.stride())
    }
}

impl LayoutMapInverse for Layout {
    fn coord_of(&self, offset: i64) -> Option<Coord> {
        let leaves: Vec<(Int, Int)> = self.leaf_pairs().collect();
        if leaves.iter().any(|(_, d)| *d < 0) {
            return None;
        }
        let mut order: Vec<usize> = (0..leaves.len()).collect();
        order.sort_by_key(|&i| leaves[i].1);

        // Invert: offset = Σᵢ (strideᵢ × coordᵢ)
        // Solve for coordᵢ by peeling off largest strides first:
        //   coordᵢ = ⌊pos / strideᵢ⌋
        //   pos   -= coordᵢ × strideᵢ
        // If any coordᵢ ≥ sizeᵢ or pos ≠ 0 at the end, the offset is
        // not reachable.
        let mut pos = offset;
        let mut coord = vec![0i64; leaves.len()];
        for &i in order.iter().rev() {
            let (size, stride) = (leaves[i].0.value(), leaves[i].1.value());
            let index = if size > 1 && stride > 0 {
                pos / stride
            } else {
                0
            };
            if index < 0 || index >= size {
                return None;
            }
            coord[i] = index;
            pos -= index * stride;
        }

        if pos != 0 {
            return None;
        }
        Tuple::unflatten(&coord, self.shape())
    }
}

/// Evaluate `coord` against `shape`/`stride`.
pub(crate) fn crd2idx(coord: &Coord, shape: &Shape, stride: &Stride) -> Result<i64, LayoutError> {
    match (coord, shape, stride) {
        (Tuple::Leaf(c), Tuple::Leaf(s), Tuple::Leaf(d)) => {
            check_range(*c, *s)?;
            c.checked_mul(d.value()).ok_or_else(|| overflow(shape, stride))
        }
        (Tuple::Leaf(c), Tuple::Node(shapes), Tuple::Node(strides)) => {
            check_range(*c, shape.size())?;
            let mut rest = *c;
            let mut offset = 0;
            for (i, (s, d)) in shapes.iter().zip(strides).enumerate() {
                let extent = s.size().value();
                let local = if i + 1 == shapes.len() {
                    rest
                } else {
                    rest % extent
                };
                offset = crd2idx(&Tuple::Leaf(local), s, d)?
                    .checked_add(offset)
                    .ok_or_else(|| overflow(shape, stride))?;
                if i + 1 < shapes.len() {
                    rest /= extent;
                }
            }
            Ok(offset)
        }
        (Tuple::Node(coords), Tuple::Node(shapes), Tuple::Node(strides))
            if coords.len() == shapes.len() =>
        {
            coords
                .iter()
                .zip(shapes.iter().zip(strides))
                .try_fold(0i64, |offset, (c, (s, d))| {
                    crd2idx(c, s, d)?
                        .checked_add(offset)
                        .ok_or_else(|| overflow(shape, stride))
                })
        }
        _ => Err(LayoutError::CoordinateMismatch {
            coord: coord.clone(),
            shape: shape.clone(),
        }),
    }
}

fn overflow(shape: &Shape, stride: &Stride) -> LayoutError {
    LayoutError::Overflow {
        shape: shape.clone(),
        stride: stride.clone(),
    }
}

fn check_range(coord: i64, extent: Int) -> Result<(), LayoutError> {
    if coord < 0 || coord >= extent.value() {
        return Err(LayoutError::CoordinateOutOfRange {
            coord,
            extent: extent.value(),
        });
    }
    Ok(())
}

/// Decode a linear index into a coordinate congruent to `shape`.
/// `index` must lie in `[0, size(shape))`.
fn idx2crd(index: i64, shape: &Shape) -> Coord {
    match shape {
        Tuple::Leaf(_) => Tuple::Leaf(index),
        Tuple::Node(modes) => {
            let mut rest = index;
            Tuple::Node(
                modes
                    .iter()
                    .map(|m| {
                        let extent = m.size().value();
                        let local = rest % extent;
                        rest /= extent;
                        idx2crd(local, m)
                    })
                    .collect(),
            )
        }
    }
}

impl Layout {
    /// The offset of `coord`, which may be hierarchical, linear, R-D
    /// or any mixture of these.
    pub fn evaluate(&self, coord: impl Into<Coord>) -> Result<i64, LayoutError> {
        self.offset_of(&coord.into())
    }

    /// The offset of the `index`-th coordinate in colexicographic
    /// order; `index` must be in range.
    pub(crate) fn index_offset(&self, index: i64) -> i64 {
        let mut rest = index;
        let mut offset = 0;
        for (s, d) in self.leaf_pairs() {
            let extent = s.value();
            offset += (rest % extent) * d.value();
            rest /= extent;
        }
        offset
    }

    /// The hierarchical coordinate of linear index `index`.
    pub fn coordinate(&self, index: i64) -> Result<Coord, LayoutError> {
        check_range(index, self.size())?;
        Ok(idx2crd(index, self.shape()))
    }

    /// The R-D coordinate of linear index `index`: one integer per
    /// top-level mode. For a leaf layout this is `index` itself.
    pub fn rd_coordinate(&self, index: i64) -> Result<Coord, LayoutError> {
        check_range(index, self.size())?;
        let extents: Vec<i64> = self.shape().modes().iter().map(|m| m.size().value()).collect();
        Ok(rd_from_linear(index, self.shape(), &extents))
    }

    /// Convert any coordinate form into the R-D form.
    pub fn rd_of(&self, coord: impl Into<Coord>) -> Result<Coord, LayoutError> {
        let index = self.linear_index(coord)?;
        self.rd_coordinate(index)
    }

    /// The linear (colexicographic) index of `coord`, in any form.
    pub fn linear_index(&self, coord: impl Into<Coord>) -> Result<i64, LayoutError> {
        crd2idx(&coord.into(), self.shape(), &self.shape().compact_col_major())
    }
}

fn rd_from_linear(index: i64, shape: &Shape, extents: &[i64]) -> Coord {
    match shape {
        Tuple::Leaf(_) => Tuple::Leaf(index),
        Tuple::Node(_) => {
            let mut rest = index;
            Tuple::Node(
                extents
                    .iter()
                    .map(|&extent| {
                        let local = rest % extent;
                        rest /= extent;
                        Tuple::Leaf(local)
                    })
                    .collect(),
            )
        }
    }
}
