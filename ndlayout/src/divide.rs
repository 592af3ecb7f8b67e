/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Division: splitting a layout into tiles.
//!
//! Dividing `L` by a tiler `T` reorganizes `L`'s domain into a
//! (within-tile, across-tile) pair of modes:
//!
//! ```text
//! logical_divide(L, T) = L ∘ (T, complement(T, size(L)))
//! ```
//!
//! The first mode enumerates the elements of one tile, the second
//! the tiles. With a [`Tile`] (one tiler per mode) the split is done
//! mode by mode, and the result can be re-associated several ways:
//!
//! ```text
//! logical  ((t0,r0), (t1,r1), ...)
//! zipped   ((t0,t1,...), (r0,r1,...))
//! tiled    ((t0,t1,...), r0, r1, ...)
//! flat     (t0, t1, ..., r0, r1, ...)
//! ```
//!
//! The zipped form is what tiling and partitioning consume: "tile
//! `k`" is the second mode fixed to `k`.

use serde::Deserialize;
use serde::Serialize;

use crate::int::Int;
use crate::layout::Layout;
use crate::layout::LayoutError;
use crate::tuple::Shape;
use crate::tuple::Tuple;

/// One entry of a [`Tile`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TileMode {
    /// `n` consecutive elements: the tiler `n:1`.
    Count(Int),
    /// An arbitrary tiler.
    Layout(Layout),
    /// The whole mode: one tile spanning its full extent.
    All,
}

impl TileMode {
    /// The tiler this entry stands for when applied to `mode`.
    pub fn to_layout(&self, mode: &Layout) -> Layout {
        match self {
            TileMode::Count(n) => Layout::from_pairs(vec![(*n, Int::Static(1))]),
            TileMode::Layout(layout) => layout.clone(),
            TileMode::All => Layout::from_pairs(vec![(mode.size(), Int::Static(1))]),
        }
    }
}

impl From<Layout> for TileMode {
    fn from(layout: Layout) -> Self {
        TileMode::Layout(layout)
    }
}

impl From<Int> for TileMode {
    fn from(n: Int) -> Self {
        TileMode::Count(n)
    }
}

impl From<i64> for TileMode {
    fn from(n: i64) -> Self {
        TileMode::Count(n.into())
    }
}

impl From<i32> for TileMode {
    fn from(n: i32) -> Self {
        TileMode::Count(n.into())
    }
}

impl From<usize> for TileMode {
    fn from(n: usize) -> Self {
        TileMode::Count(n.into())
    }
}

/// A tile descriptor: one [`TileMode`] per top-level mode of the
/// layout being divided. Modes beyond the end of the tile are taken
/// whole.
///
/// ```
/// # use ndlayout::Layout;
/// # use ndlayout::Tile;
/// # use ndlayout::TileMode;
/// let tile = Tile::from((Layout::new(2, 3).unwrap(), 4));
/// assert_eq!(tile.len(), 2);
/// assert_eq!(tile.get(1), Some(&TileMode::Count(4.into())));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tile(Vec<TileMode>);

#[allow(dead_code)]
const _: () = {
    fn assert<T: Send + Sync + 'static>() {}
    let _ = assert::<Tile>;
};

impl Tile {
    pub fn new(modes: Vec<TileMode>) -> Self {
        Self(modes)
    }

    /// A tile of counts, one per top-level mode of `shape`, each the
    /// size of that mode.
    pub fn from_shape(shape: &Shape) -> Self {
        Self(
            shape
                .modes()
                .iter()
                .map(|m| TileMode::Count(m.size()))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<&TileMode> {
        self.0.get(i)
    }

    pub fn modes(&self) -> &[TileMode] {
        &self.0
    }
}

impl FromIterator<TileMode> for Tile {
    fn from_iter<I: IntoIterator<Item = TileMode>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

macro_rules! impl_tile_from {
    ($($name:ident),+) => {
        impl<$($name),+> From<($($name,)+)> for Tile
        where
            $($name: Into<TileMode>),+
        {
            #[allow(non_snake_case)]
            fn from(($($name,)+): ($($name,)+)) -> Self {
                Tile(vec![$($name.into()),+])
            }
        }
    };
}

impl_tile_from!(A);
impl_tile_from!(A, B);
impl_tile_from!(A, B, C);
impl_tile_from!(A, B, C, D);

impl<E: Into<TileMode>, const N: usize> From<[E; N]> for Tile {
    fn from(modes: [E; N]) -> Self {
        modes.into_iter().map(Into::into).collect()
    }
}

impl<E: Into<TileMode>> From<Vec<E>> for Tile {
    fn from(modes: Vec<E>) -> Self {
        modes.into_iter().map(Into::into).collect()
    }
}

impl Layout {
    /// Divide `self` by `tiler`: the result is the pair
    /// `(tile, rest)`, where `tile` enumerates the elements of `self`
    /// selected by `tiler` and `rest` the repetitions of that tile.
    ///
    /// ```
    /// # use ndlayout::Layout;
    /// let layout = Layout::new((4, 2, 3), (2, 1, 8)).unwrap();
    /// let tiler = Layout::new(4, 2).unwrap();
    /// assert_eq!(
    ///     layout.logical_divide(&tiler).unwrap(),
    ///     Layout::new(((2, 2), (2, 3)), ((4, 1), (2, 8))).unwrap()
    /// );
    /// ```
    pub fn logical_divide(&self, tiler: &Layout) -> Result<Layout, LayoutError> {
        let complement = tiler.complement(self.size())?;
        let result = self.compose(&Layout::concat([tiler.clone(), complement]))?;
        tracing::trace!(layout = %self, tiler = %tiler, result = %result, "logical_divide");
        Ok(result)
    }

    /// Divide each top-level mode by the matching entry of `tile`,
    /// returning one `(tile, rest)` pair per mode.
    fn divide_modes(&self, tile: &Tile) -> Result<Vec<(Layout, Layout)>, LayoutError> {
        if tile.len() > self.rank() {
            return Err(LayoutError::RankMismatch {
                expected: self.rank(),
                got: tile.len(),
            });
        }
        self.modes()
            .enumerate()
            .map(|(i, mode)| match tile.get(i) {
                None | Some(TileMode::All) => Ok((mode, Layout::unit())),
                Some(entry) => {
                    let divided = mode.logical_divide(&entry.to_layout(&mode))?;
                    Ok((divided.mode(0)?, divided.mode(1)?))
                }
            })
            .collect()
    }

    /// Divide mode by mode. Each top-level mode `i` of the result is the
    /// `(tile, rest)` pair for mode `i` of `self`; a leaf layout yields
    /// the pair itself.
    pub fn logical_divide_tile(&self, tile: &Tile) -> Result<Layout, LayoutError> {
        let pairs = self.divide_modes(tile)?;
        let pairs = pairs.into_iter().map(|(t, r)| Layout::concat([t, r]));
        Ok(match self.shape() {
            Tuple::Leaf(_) => pairs.into_iter().next().unwrap_or_else(Layout::unit),
            Tuple::Node(_) => Layout::concat(pairs),
        })
    }

    /// Divide mode by mode and gather all tiles into the first mode and
    /// all rests into the second.
    ///
    /// ```
    /// # use ndlayout::Layout;
    /// # use ndlayout::Tile;
    /// let layout = Layout::new(((3, 2), (4, 2)), ((16, 1), (4, 2))).unwrap();
    /// let tile = Tile::from((Layout::new(2, 3).unwrap(), Layout::new(2, 4).unwrap()));
    /// assert_eq!(
    ///     layout.zipped_divide(&tile).unwrap(),
    ///     Layout::new(((2, 2), (3, 4)), ((1, 2), (16, 4))).unwrap()
    /// );
    /// ```
    pub fn zipped_divide(&self, tile: &Tile) -> Result<Layout, LayoutError> {
        let (tiles, rests): (Vec<_>, Vec<_>) = self.divide_modes(tile)?.into_iter().unzip();
        Ok(match self.shape() {
            Tuple::Leaf(_) => Layout::concat(tiles.into_iter().chain(rests)),
            Tuple::Node(_) => Layout::concat([Layout::concat(tiles), Layout::concat(rests)]),
        })
    }

    /// Like [`Layout::zipped_divide`], but with every rest kept as its
    /// own top-level mode.
    pub fn tiled_divide(&self, tile: &Tile) -> Result<Layout, LayoutError> {
        let (tiles, rests): (Vec<_>, Vec<_>) = self.divide_modes(tile)?.into_iter().unzip();
        let tiles = match self.shape() {
            Tuple::Leaf(_) => tiles.into_iter().next().unwrap_or_else(Layout::unit),
            Tuple::Node(_) => Layout::concat(tiles),
        };
        Ok(Layout::concat(std::iter::once(tiles).chain(rests)))
    }

    /// Like [`Layout::zipped_divide`], with every tile and every rest
    /// spliced into one top-level tuple.
    pub fn flat_divide(&self, tile: &Tile) -> Result<Layout, LayoutError> {
        let (tiles, rests): (Vec<_>, Vec<_>) = self.divide_modes(tile)?.into_iter().unzip();
        Ok(Layout::concat(tiles.into_iter().chain(rests)))
    }
}
