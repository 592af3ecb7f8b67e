/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::fmt;
use std::ops::Range;

use itertools::Itertools;
use serde::Deserialize;
use serde::Serialize;

use crate::int::Int;
use crate::parse::ParseError;
use crate::tuple::Coord;
use crate::tuple::Shape;
use crate::tuple::Stride;
use crate::tuple::Tuple;

/// The type of error for layout operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum LayoutError {
    #[error("coordinate {coord} out of range for extent {extent}")]
    CoordinateOutOfRange { coord: i64, extent: i64 },

    #[error("coordinate {coord} does not match shape {shape}")]
    CoordinateMismatch { coord: Coord, shape: Shape },

    #[error("extent {extent} of shape {shape} is negative")]
    NegativeExtent { extent: i64, shape: Shape },

    #[error("size of shape {shape} overflows i64")]
    SizeOverflow { shape: Shape },

    #[error("offsets of {shape}:{stride} overflow i64")]
    Overflow { shape: Shape, stride: Stride },

    #[error("shape {shape} is not congruent with stride {stride}")]
    Incongruent { shape: Shape, stride: Stride },

    #[error("mode {index} out of range for rank {rank}")]
    ModeOutOfRange { index: usize, rank: usize },

    #[error("rank mismatch: expected {expected}, got {got}")]
    RankMismatch { expected: usize, got: usize },

    #[error("cosize {cosize} exceeds cotarget {cotarget}")]
    CotargetTooSmall { cosize: i64, cotarget: i64 },

    #[error("layout {layout} is not injective")]
    Aliasing { layout: Layout },

    #[error("layout {layout} has stride {stride} that does not extend span {span}")]
    NotComplementable {
        layout: Layout,
        stride: i64,
        span: i64,
    },

    #[error("composition out of domain: offsets {min_offset}..{cosize} are not within 0..{size}")]
    CompositionOutOfDomain {
        min_offset: i64,
        cosize: i64,
        size: i64,
    },

    #[error("composition of {lhs} with {rhs} carries out of mode {mode} of the coalesced lhs")]
    CompositionCarry {
        lhs: Layout,
        rhs: Layout,
        mode: usize,
    },

    #[error("extent {shape} and stride {stride} are not divisible")]
    StrideDivisibility { shape: i64, stride: i64 },

    #[error("tile index {index} out of range for dimension {dim} with {tiles} tiles")]
    TileOutOfRange { dim: usize, index: i64, tiles: i64 },

    #[error("worker {id} out of range for {workers} workers")]
    WorkerOutOfRange { id: i64, workers: i64 },

    #[error("worker {id} has no coordinate in {layout}")]
    WorkerNotInLayout { id: i64, layout: Layout },

    #[error("storage of length {len} cannot back cosize {cosize}")]
    StorageTooSmall { cosize: i64, len: usize },

    #[error("offset {offset} out of bounds for storage of length {len}")]
    OffsetOutOfBounds { offset: i64, len: usize },

    #[error("size mismatch: expected {expected}, got {got}")]
    SizeMismatch { expected: i64, got: i64 },

    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Broad classes of [`LayoutError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A value is outside the domain of the operation: coordinates,
    /// tile and worker indices, sizes that do not fit.
    Domain,
    /// A tree does not have the structure the operation requires.
    Structural,
    /// The layout maps two coordinates to the same offset.
    Aliasing,
}

impl LayoutError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LayoutError::Incongruent { .. }
            | LayoutError::CoordinateMismatch { .. }
            | LayoutError::ModeOutOfRange { .. }
            | LayoutError::RankMismatch { .. }
            | LayoutError::Parse(_) => ErrorKind::Structural,
            LayoutError::Aliasing { .. } => ErrorKind::Aliasing,
            _ => ErrorKind::Domain,
        }
    }
}

/// A layout is a function from coordinates to linear offsets,
/// described by a [`Shape`] and a congruent [`Stride`].
///
/// The offset of a hierarchical coordinate is the sum over leaves of
/// `coord * stride`:
///
/// ```
/// # use ndlayout::Layout;
/// let layout = Layout::new((2, (2, 2)), (4, (1, 2))).unwrap();
/// assert_eq!(layout.size(), 8);
/// assert_eq!(layout.cosize(), 8);
/// assert_eq!(layout.evaluate((1, (0, 1))).unwrap(), 6);
/// ```
///
/// Layouts are immutable values. Every operation returns a new
/// layout; none refer to storage.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawLayout")]
pub struct Layout {
    shape: Shape,
    stride: Stride,
}

#[allow(dead_code)]
const _: () = {
    fn assert<T: Send + Sync + 'static>() {}
    let _ = assert::<Layout>;
    let _ = assert::<LayoutError>;
};

impl Layout {
    /// Create a layout from a shape and a stride. The two trees must be
    /// congruent, extents must be non-negative, and every offset must
    /// fit in an `i64`.
    pub fn new(shape: impl Into<Shape>, stride: impl Into<Stride>) -> Result<Self, LayoutError> {
        let (shape, stride) = (shape.into(), stride.into());
        check_extents(&shape)?;
        if !shape.is_congruent(&stride) {
            return Err(LayoutError::Incongruent { shape, stride });
        }
        check_span(shape, stride)
    }

    /// Assemble a layout from trees already known to be congruent.
    pub(crate) fn from_parts(shape: Shape, stride: Stride) -> Self {
        debug_assert!(shape.is_congruent(&stride));
        Self { shape, stride }
    }

    /// Build a layout from `(extent, stride)` leaf pairs: `1:0` for no
    /// pairs, a leaf layout for one pair and a flat layout otherwise.
    pub(crate) fn from_pairs(pairs: Vec<(Int, Int)>) -> Self {
        match pairs.len() {
            0 => Self::unit(),
            1 => {
                let (s, d) = pairs[0];
                Self::from_parts(Tuple::Leaf(s), Tuple::Leaf(d))
            }
            _ => {
                let (shape, stride): (Vec<_>, Vec<_>) = pairs
                    .into_iter()
                    .map(|(s, d)| (Tuple::Leaf(s), Tuple::Leaf(d)))
                    .unzip();
                Self::from_parts(Tuple::Node(shape), Tuple::Node(stride))
            }
        }
    }

    /// The compact column-major layout of `shape`: the leftmost leaf
    /// has stride 1 and varies fastest. This is the layout used when no
    /// stride is given.
    ///
    /// Fails with [`LayoutError::NegativeExtent`] if any extent of
    /// `shape` is negative and [`LayoutError::SizeOverflow`] if its
    /// size does not fit in an `i64`.
    pub fn col_major(shape: impl Into<Shape>) -> Result<Self, LayoutError> {
        let shape = shape.into();
        check_extents(&shape)?;
        Ok(Self::packed(shape))
    }

    /// The compact row-major layout of `shape`.
    pub fn row_major(shape: impl Into<Shape>) -> Result<Self, LayoutError> {
        let shape = shape.into();
        check_extents(&shape)?;
        let stride = shape.compact_row_major();
        Ok(Self::from_parts(shape, stride))
    }

    /// The column-major layout of a shape taken from an existing
    /// layout.
    pub(crate) fn packed(shape: Shape) -> Self {
        let stride = shape.compact_col_major();
        Self::from_parts(shape, stride)
    }

    /// A compact layout of `shape` whose leaves are assigned strides in
    /// increasing `order`; equal orders are taken left to right.
    ///
    /// ```
    /// # use ndlayout::Layout;
    /// let layout = Layout::ordered((3, 5), (10, 2)).unwrap();
    /// assert_eq!(layout, Layout::new((3, 5), (5, 1)).unwrap());
    /// ```
    pub fn ordered(shape: impl Into<Shape>, order: impl Into<Coord>) -> Result<Self, LayoutError> {
        let (shape, order) = (shape.into(), order.into());
        check_extents(&shape)?;
        if !shape.is_congruent(&order) {
            return Err(LayoutError::CoordinateMismatch {
                coord: order,
                shape,
            });
        }
        let extents: Vec<Int> = shape.leaves().copied().collect();
        let mut strides = vec![Int::Static(0); extents.len()];
        let mut current = Int::Static(1);
        for (i, _) in order
            .leaves()
            .enumerate()
            .sorted_by_key(|&(i, &rank)| (rank, i))
        {
            strides[i] = current;
            current = current * extents[i];
        }
        let stride = Tuple::unflatten(&strides, &shape).ok_or_else(|| {
            LayoutError::Incongruent {
                shape: shape.clone(),
                stride: Tuple::Node(strides.iter().copied().map(Tuple::Leaf).collect()),
            }
        })?;
        Ok(Self::from_parts(shape, stride))
    }

    /// A compact layout with the same shape as `self` whose strides
    /// are ordered like `self`'s. Broadcast (stride-0) leaves keep
    /// stride 0.
    pub fn compact_like(&self) -> Self {
        let order = self.stride.map(|d| d.value().abs());
        let mut current = Int::Static(1);
        let mut strides = vec![Int::Static(0); order.leaves().count()];
        let leaves: Vec<(Int, Int)> = self.leaf_pairs().collect();
        for (i, _) in order
            .leaves()
            .enumerate()
            .sorted_by_key(|&(i, &rank)| (rank, i))
        {
            let (s, d) = leaves[i];
            if d != 0 {
                strides[i] = current;
                current = current * s;
            }
        }
        self.with_flat_strides(&strides)
    }

    /// A compact layout with the same shape as `self` for a
    /// thread-local fragment: the first mode is column-major and the
    /// remaining modes follow `self`'s stride order.
    pub fn fragment_like(&self) -> Self {
        if self.rank() < 2 {
            return Self::packed(self.shape.clone());
        }
        let first = Self::packed(self.shape.modes()[0].clone());
        let span = first.size();
        let rest = self.take(1..self.rank()).map(|rest| rest.compact_like());
        match rest {
            Ok(rest) => {
                let scaled = rest.stride.map(|&d| d * span);
                let rest = Self::from_parts(rest.shape, scaled);
                Self::concat(std::iter::once(first).chain(rest.modes()))
            }
            Err(_) => Self::packed(self.shape.clone()),
        }
    }

    fn with_flat_strides(&self, strides: &[Int]) -> Self {
        match Tuple::unflatten(strides, &self.shape) {
            Some(stride) => Self::from_parts(self.shape.clone(), stride),
            None => self.clone(),
        }
    }

    /// The trivial layout `1:0`.
    pub fn unit() -> Self {
        Self::from_parts(Tuple::Leaf(Int::Static(1)), Tuple::Leaf(Int::Static(0)))
    }

    /// A layout whose top-level modes are `modes`, in order.
    pub fn concat(modes: impl IntoIterator<Item = Layout>) -> Self {
        let (shape, stride): (Vec<_>, Vec<_>) =
            modes.into_iter().map(|m| (m.shape, m.stride)).unzip();
        Self::from_parts(Tuple::Node(shape), Tuple::Node(stride))
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn stride(&self) -> &Stride {
        &self.stride
    }

    /// Consume the layout, returning its shape and stride.
    pub fn into_parts(self) -> (Shape, Stride) {
        (self.shape, self.stride)
    }

    /// The number of coordinates in the domain.
    pub fn size(&self) -> Int {
        self.shape.size()
    }

    /// One past the largest offset the layout produces: the minimum
    /// length of a buffer that can back it. Zero for an empty domain.
    pub fn cosize(&self) -> Int {
        if self.size() == 0 {
            return Int::Static(0);
        }
        self.leaf_pairs()
            .map(|(s, d)| ((s - 1) * d).max(Int::Static(0)))
            .sum::<Int>()
            + 1
    }

    /// The smallest offset the layout produces; negative only with
    /// negative strides.
    pub(crate) fn min_offset(&self) -> i64 {
        if self.size() == 0 {
            return 0;
        }
        self.leaf_pairs()
            .map(|(s, d)| ((s.value() - 1) * d.value()).min(0))
            .sum()
    }

    pub fn rank(&self) -> usize {
        self.shape.rank()
    }

    pub fn depth(&self) -> usize {
        self.shape.depth()
    }

    /// The `i`-th top-level mode as a layout of its own.
    pub fn mode(&self, i: usize) -> Result<Layout, LayoutError> {
        match (self.shape.get(i), self.stride.get(i)) {
            (Some(s), Some(d)) => Ok(Self::from_parts(s.clone(), d.clone())),
            _ => Err(LayoutError::ModeOutOfRange {
                index: i,
                rank: self.rank(),
            }),
        }
    }

    /// Iterate over the top-level modes. A leaf layout yields itself.
    pub fn modes(&self) -> Modes<'_> {
        Modes {
            inner: self.shape.modes().iter().zip(self.stride.modes()),
        }
    }

    /// `(extent, stride)` of every leaf, left to right.
    pub fn leaf_pairs(&self) -> impl Iterator<Item = (Int, Int)> + '_ {
        self.shape
            .leaves()
            .copied()
            .zip(self.stride.leaves().copied())
    }

    /// The layout made of the modes at `indices`, in that order.
    pub fn select(&self, indices: &[usize]) -> Result<Layout, LayoutError> {
        let modes = indices
            .iter()
            .map(|&i| self.mode(i))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::concat(modes))
    }

    /// The layout made of the modes in `range`.
    pub fn take(&self, range: Range<usize>) -> Result<Layout, LayoutError> {
        if range.start > range.end || range.end > self.rank() {
            return Err(LayoutError::ModeOutOfRange {
                index: range.end,
                rank: self.rank(),
            });
        }
        Ok(Self::concat(self.modes().skip(range.start).take(range.len())))
    }

    /// Add `mode` after the existing top-level modes.
    pub fn append(&self, mode: Layout) -> Layout {
        Self::concat(self.modes().chain(std::iter::once(mode)))
    }

    /// Add `mode` before the existing top-level modes.
    pub fn prepend(&self, mode: Layout) -> Layout {
        Self::concat(std::iter::once(mode).chain(self.modes()))
    }

    /// Pad with `1:0` modes until the layout has rank `rank`. Layouts
    /// of at least that rank are returned unchanged.
    pub fn append_to_rank(&self, rank: usize) -> Layout {
        if self.rank() >= rank {
            return self.clone();
        }
        let padding = std::iter::repeat_with(Layout::unit).take(rank - self.rank());
        Self::concat(self.modes().chain(padding))
    }

    /// Replace the `i`-th top-level mode.
    pub fn replace(&self, i: usize, mode: Layout) -> Result<Layout, LayoutError> {
        if i >= self.rank() {
            return Err(LayoutError::ModeOutOfRange {
                index: i,
                rank: self.rank(),
            });
        }
        Ok(Self::concat(self.modes().enumerate().map(|(j, m)| {
            if j == i {
                mode.clone()
            } else {
                m
            }
        })))
    }

    /// Nest the modes in `range` into a single mode.
    pub fn group(&self, range: Range<usize>) -> Result<Layout, LayoutError> {
        let grouped = self.take(range.clone())?;
        let before = self.modes().take(range.start);
        let after = self.modes().skip(range.end);
        Ok(Self::concat(
            before.chain(std::iter::once(grouped)).chain(after),
        ))
    }

    /// Swap the two modes of a rank-2 layout.
    pub fn transpose(&self) -> Result<Layout, LayoutError> {
        if self.rank() != 2 {
            return Err(LayoutError::RankMismatch {
                expected: 2,
                got: self.rank(),
            });
        }
        self.select(&[1, 0])
    }

    /// All offsets, in colexicographic coordinate order.
    pub fn offsets(&self) -> impl Iterator<Item = i64> + '_ {
        (0..self.size().value()).map(move |i| self.index_offset(i))
    }

    /// Whether distinct coordinates map to distinct offsets. Layouts
    /// whose strides nest are decided from their leaves; anything else
    /// visits every offset.
    pub fn is_injective(&self) -> bool {
        match self.nested_leaves() {
            Ok(_) => true,
            Err(LayoutError::Aliasing { .. }) => false,
            Err(_) => self.offsets().all_unique(),
        }
    }

    /// Whether the layout is a bijection onto `[0, size)`.
    pub fn is_compact(&self) -> bool {
        self.min_offset() == 0 && self.cosize() == self.size() && self.is_injective()
    }
}

/// Iterator over the top-level modes of a [`Layout`].
pub struct Modes<'a> {
    inner: std::iter::Zip<std::slice::Iter<'a, Shape>, std::slice::Iter<'a, Stride>>,
}

impl Iterator for Modes<'_> {
    type Item = Layout;

    fn next(&mut self) -> Option<Layout> {
        self.inner
            .next()
            .map(|(s, d)| Layout::from_parts(s.clone(), d.clone()))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for Modes<'_> {}

impl<'a> IntoIterator for &'a Layout {
    type Item = Layout;
    type IntoIter = Modes<'a>;

    fn into_iter(self) -> Modes<'a> {
        self.modes()
    }
}

impl TryFrom<Shape> for Layout {
    type Error = LayoutError;

    fn try_from(shape: Shape) -> Result<Self, LayoutError> {
        Layout::col_major(shape)
    }
}

/// The wire form of a [`Layout`], validated on the way in.
#[derive(Deserialize)]
struct RawLayout {
    shape: Shape,
    stride: Stride,
}

impl TryFrom<RawLayout> for Layout {
    type Error = LayoutError;

    fn try_from(raw: RawLayout) -> Result<Self, LayoutError> {
        Layout::new(raw.shape, raw.stride)
    }
}

/// Extents are non-negative and their product fits in an `i64`. Compact
/// strides over such a shape cannot overflow.
fn check_extents(shape: &Shape) -> Result<(), LayoutError> {
    if let Some(&extent) = shape.leaves().find(|&&e| e < 0) {
        return Err(LayoutError::NegativeExtent {
            extent: extent.value(),
            shape: shape.clone(),
        });
    }
    if shape.leaves().any(|&e| e == 0) {
        return Ok(());
    }
    match shape
        .leaves()
        .try_fold(Int::Static(1), |acc, &e| acc.checked_mul(e))
    {
        Some(_) => Ok(()),
        None => Err(LayoutError::SizeOverflow {
            shape: shape.clone(),
        }),
    }
}

/// Every offset `Σ coord * stride` over the domain fits in an `i64`.
fn check_span(shape: Shape, stride: Stride) -> Result<Layout, LayoutError> {
    let layout = Layout::from_parts(shape, stride);
    if layout.size() == 0 {
        return Ok(layout);
    }
    let span = layout.leaf_pairs().try_fold(0i64, |acc, (s, d)| {
        (s.value() - 1)
            .checked_mul(d.value().checked_abs()?)?
            .checked_add(acc)
    });
    match span {
        Some(_) => Ok(layout),
        None => Err(LayoutError::Overflow {
            shape: layout.shape,
            stride: layout.stride,
        }),
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.shape, self.stride)
    }
}
