/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Views: a layout bound to storage.
//!
//! A [`View`] pairs a [`Layout`] with a [`Storage`] buffer and a base
//! offset. Element `x` of the view lives at
//! `storage[offset + layout(x)]`.
//!
//! Construction checks that every offset the layout can produce falls
//! inside the buffer, so element access after construction only fails
//! on bad coordinates. Tiling and partitioning consume the view and
//! return a sub-view over the same storage; use [`View::as_view`] or
//! [`View::as_view_mut`] first to keep the original:
//!
//! ```
//! # use ndlayout::Layout;
//! # use ndlayout::View;
//! let data: Vec<i64> = (0..48).collect();
//! let view = View::new(data, Layout::col_major((6, 8)).unwrap()).unwrap();
//! let tile = view.as_view().tile(&(2, 4).into(), (1, 1)).unwrap();
//! assert_eq!(tile.to_vec(), vec![26, 27, 32, 33, 38, 39, 44, 45]);
//! ```
//!
//! Views do no synchronization of their own: sharing and exclusivity
//! are those of the storage type.

use crate::coord::LayoutMap;
use crate::coord::sealed;
use crate::divide::Tile;
use crate::layout::Layout;
use crate::layout::LayoutError;
use crate::partition::partition_layout;
use crate::partition::partition_layout_by_workers;
use crate::partition::tile_layout;
use crate::tuple::Coord;

/// Random-access storage backing a [`View`].
pub trait Storage {
    type Elem;

    fn as_slice(&self) -> &[Self::Elem];
}

/// Storage that can be written through a [`View`].
pub trait StorageMut: Storage {
    fn as_mut_slice(&mut self) -> &mut [Self::Elem];
}

impl<T> Storage for Vec<T> {
    type Elem = T;

    fn as_slice(&self) -> &[T] {
        self
    }
}

impl<T> StorageMut for Vec<T> {
    fn as_mut_slice(&mut self) -> &mut [T] {
        self
    }
}

impl<T> Storage for Box<[T]> {
    type Elem = T;

    fn as_slice(&self) -> &[T] {
        self
    }
}

impl<T> StorageMut for Box<[T]> {
    fn as_mut_slice(&mut self) -> &mut [T] {
        self
    }
}

impl<T, const N: usize> Storage for [T; N] {
    type Elem = T;

    fn as_slice(&self) -> &[T] {
        self
    }
}

impl<T, const N: usize> StorageMut for [T; N] {
    fn as_mut_slice(&mut self) -> &mut [T] {
        self
    }
}

impl<T> Storage for &[T] {
    type Elem = T;

    fn as_slice(&self) -> &[T] {
        self
    }
}

impl<T> Storage for &mut [T] {
    type Elem = T;

    fn as_slice(&self) -> &[T] {
        self
    }
}

impl<T> StorageMut for &mut [T] {
    fn as_mut_slice(&mut self) -> &mut [T] {
        self
    }
}

/// A layout over a storage buffer.
#[derive(Clone, Debug)]
pub struct View<S> {
    storage: S,
    layout: Layout,
    offset: i64,
}

impl<S: Storage> View<S> {
    /// Bind `layout` to `storage`, starting at offset 0.
    ///
    /// Fails with [`LayoutError::StorageTooSmall`] if the buffer is
    /// shorter than `cosize(layout)`.
    pub fn new(storage: S, layout: Layout) -> Result<Self, LayoutError> {
        Self::at(storage, layout, 0)
    }

    /// Bind `layout` to `storage`, starting at `offset`. Layouts with
    /// negative strides need an offset past the start of the buffer.
    pub fn at(storage: S, layout: Layout, offset: i64) -> Result<Self, LayoutError> {
        let len = storage.as_slice().len();
        let lowest = offset + layout.min_offset();
        if lowest < 0 {
            return Err(LayoutError::OffsetOutOfBounds {
                offset: lowest,
                len,
            });
        }
        let end = offset + layout.cosize().value();
        if end > len as i64 {
            return Err(LayoutError::StorageTooSmall { cosize: end, len });
        }
        Ok(Self {
            storage,
            layout,
            offset,
        })
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// The storage offset of the view's origin.
    pub fn offset(&self) -> i64 {
        self.offset
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn into_storage(self) -> S {
        self.storage
    }

    /// The number of elements in the view.
    pub fn size(&self) -> i64 {
        self.layout.size().value()
    }

    /// The storage index of `coord`.
    fn locate(&self, coord: &Coord) -> Result<usize, LayoutError> {
        let offset = self.offset_of(coord)?;
        let len = self.storage.as_slice().len();
        if offset < 0 || offset >= len as i64 {
            return Err(LayoutError::OffsetOutOfBounds { offset, len });
        }
        Ok(offset as usize)
    }

    /// The element at `coord`, in any coordinate form.
    pub fn get(&self, coord: impl Into<Coord>) -> Result<&S::Elem, LayoutError> {
        let index = self.locate(&coord.into())?;
        Ok(&self.storage.as_slice()[index])
    }

    /// The elements in colexicographic coordinate order.
    pub fn iter(&self) -> impl Iterator<Item = &S::Elem> + '_ {
        let slice = self.storage.as_slice();
        self.layout
            .offsets()
            .map(move |o| &slice[(self.offset + o) as usize])
    }

    pub fn to_vec(&self) -> Vec<S::Elem>
    where
        S::Elem: Clone,
    {
        self.iter().cloned().collect()
    }

    /// A view of the same elements borrowing this view's storage.
    pub fn as_view(&self) -> View<&[S::Elem]> {
        View {
            storage: self.storage.as_slice(),
            layout: self.layout.clone(),
            offset: self.offset,
        }
    }

    /// The view of tile `coord` of this view divided by `tile`.
    pub fn tile(self, tile: &Tile, coord: impl Into<Coord>) -> Result<Self, LayoutError> {
        let (layout, base) = tile_layout(&self.layout, tile, coord)?;
        Ok(self.rebase(layout, base))
    }

    /// The view of the part assigned to the worker at `coord` of
    /// `tile`. See [`partition_layout`].
    pub fn partition(self, tile: &Tile, coord: impl Into<Coord>) -> Result<Self, LayoutError> {
        let (layout, base) = partition_layout(&self.layout, tile, coord)?;
        Ok(self.rebase(layout, base))
    }

    /// The view of the part assigned to worker `id` of `workers`. See
    /// [`partition_layout_by_workers`].
    pub fn partition_by_workers(self, workers: &Layout, id: i64) -> Result<Self, LayoutError> {
        let (layout, base) = partition_layout_by_workers(&self.layout, workers, id)?;
        Ok(self.rebase(layout, base))
    }

    // Sub-layouts visit a subset of this view's offsets, so the bounds
    // established at construction still hold.
    fn rebase(self, layout: Layout, base: i64) -> Self {
        Self {
            storage: self.storage,
            layout,
            offset: self.offset + base,
        }
    }
}

impl<S: StorageMut> View<S> {
    pub fn get_mut(&mut self, coord: impl Into<Coord>) -> Result<&mut S::Elem, LayoutError> {
        let index = self.locate(&coord.into())?;
        Ok(&mut self.storage.as_mut_slice()[index])
    }

    /// A mutable view of the same elements borrowing this view's
    /// storage.
    pub fn as_view_mut(&mut self) -> View<&mut [S::Elem]> {
        View {
            storage: self.storage.as_mut_slice(),
            layout: self.layout.clone(),
            offset: self.offset,
        }
    }

    /// Set every element of the view to `value`.
    pub fn fill(&mut self, value: S::Elem)
    where
        S::Elem: Clone,
    {
        let slice = self.storage.as_mut_slice();
        for o in self.layout.offsets() {
            slice[(self.offset + o) as usize] = value.clone();
        }
    }

    /// Copy `src` into this view: the `i`-th element of `src` in
    /// colexicographic order goes to the `i`-th element of `self`. The
    /// two layouts may differ in stride (and shape), but must have the
    /// same size.
    ///
    /// ```
    /// # use ndlayout::Layout;
    /// # use ndlayout::View;
    /// let src = View::new(vec![0, 1, 2, 3, 4, 5], Layout::row_major((2, 3)).unwrap()).unwrap();
    /// let mut dst = View::new(vec![0; 6], Layout::col_major((2, 3)).unwrap()).unwrap();
    /// dst.copy_from(&src).unwrap();
    /// assert_eq!(dst.into_storage(), vec![0, 3, 1, 4, 2, 5]);
    /// ```
    pub fn copy_from<T>(&mut self, src: &View<T>) -> Result<(), LayoutError>
    where
        T: Storage<Elem = S::Elem>,
        S::Elem: Clone,
    {
        if self.size() != src.size() {
            return Err(LayoutError::SizeMismatch {
                expected: self.size(),
                got: src.size(),
            });
        }
        let dst = self.storage.as_mut_slice();
        for (value, o) in src.iter().zip(self.layout.offsets()) {
            dst[(self.offset + o) as usize] = value.clone();
        }
        Ok(())
    }
}

impl<S: Storage> sealed::Sealed for View<S> {}

impl<S: Storage> LayoutMap for View<S> {
    fn rank(&self) -> usize {
        self.layout.rank()
    }

    fn size(&self) -> i64 {
        self.layout.size().value()
    }

    fn offset_of(&self, coord: &Coord) -> Result<i64, LayoutError> {
        Ok(self.offset + self.layout.offset_of(coord)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Shape;
    use crate::Stride;

    fn layout(shape: impl Into<Shape>, stride: impl Into<Stride>) -> Layout {
        Layout::new(shape, stride).unwrap()
    }

    fn iota(n: i64) -> Vec<i64> {
        (0..n).collect()
    }

    #[test]
    fn test_get() {
        let mut view = View::new(iota(12), Layout::row_major((3, 4)).unwrap()).unwrap();
        assert_eq!(view.get((1, 2)).unwrap(), &6);
        // Linear index 7 is (1, 2).
        assert_eq!(view.get(7).unwrap(), &6);
        *view.get_mut((2, 3)).unwrap() = 100;
        assert_eq!(view.storage()[11], 100);
        assert!(matches!(
            view.get((3, 0)),
            Err(LayoutError::CoordinateOutOfRange { coord: 3, extent: 3 })
        ));
    }

    #[test]
    fn test_iter_colex() {
        let view = View::new(iota(6), Layout::row_major((2, 3)).unwrap()).unwrap();
        assert_eq!(view.to_vec(), vec![0, 3, 1, 4, 2, 5]);
        assert_eq!(view.size(), 6);
    }

    #[test]
    fn test_storage_kinds() {
        let array = View::new([7u8; 4], Layout::col_major(4).unwrap()).unwrap();
        assert_eq!(array.to_vec(), vec![7; 4]);

        let boxed: Box<[i64]> = iota(8).into_boxed_slice();
        let boxed = View::new(boxed, layout(4, 2)).unwrap();
        assert_eq!(boxed.to_vec(), vec![0, 2, 4, 6]);

        let data = iota(4);
        let borrowed = View::new(&data[..], Layout::col_major(4).unwrap()).unwrap();
        assert_eq!(borrowed.get(3).unwrap(), &3);
    }

    #[test]
    fn test_storage_too_small() {
        assert!(matches!(
            View::new(iota(5), Layout::col_major((2, 3)).unwrap()),
            Err(LayoutError::StorageTooSmall { cosize: 6, len: 5 })
        ));
        assert!(matches!(
            View::at(iota(6), Layout::col_major(4).unwrap(), 3),
            Err(LayoutError::StorageTooSmall { cosize: 7, len: 6 })
        ));
        // An empty layout needs no storage.
        assert!(View::new(Vec::<i64>::new(), Layout::col_major((0, 3)).unwrap()).is_ok());
    }

    #[test]
    fn test_negative_strides() {
        assert!(matches!(
            View::new(iota(4), layout(4, -1)),
            Err(LayoutError::OffsetOutOfBounds { offset: -3, len: 4 })
        ));
        let reversed = View::at(iota(4), layout(4, -1), 3).unwrap();
        assert_eq!(reversed.to_vec(), vec![3, 2, 1, 0]);
    }

    #[test]
    fn test_tile() {
        let view = View::new(iota(48), Layout::col_major((6, 8)).unwrap()).unwrap();
        let tile = view.as_view().tile(&(2, 4).into(), (2, 1)).unwrap();
        assert_eq!(tile.offset(), 28);
        assert_eq!(tile.get((1, 1)).unwrap(), &35);
        assert!(matches!(
            view.tile(&(2, 4).into(), (0, 2)),
            Err(LayoutError::TileOutOfRange { dim: 1, .. })
        ));
    }

    #[test]
    fn test_tile_then_partition() {
        let view = View::new(iota(64), Layout::col_major((8, 8)).unwrap()).unwrap();
        let tile = view.tile(&(4, 4).into(), (1, 0)).unwrap();
        let part = tile.partition(&(2, 2).into(), (1, 1)).unwrap();
        assert_eq!(part.layout(), &layout((2, 2), (2, 16)));
        assert_eq!(part.to_vec(), vec![13, 15, 29, 31]);
    }

    #[test]
    fn test_partition_by_workers() {
        let matrix = Layout::col_major((6, 8)).unwrap();
        let workers = Layout::col_major((2, 2)).unwrap();
        let mut data = vec![-1i64; 48];
        for id in 0..4 {
            let mut part = View::new(&mut data[..], matrix.clone())
                .unwrap()
                .partition_by_workers(&workers, id)
                .unwrap();
            part.fill(id);
        }
        for (offset, owner) in data.iter().enumerate() {
            let (r, c) = (offset as i64 % 6, offset as i64 / 6);
            assert_eq!(*owner, r % 2 + 2 * (c % 2), "offset {}", offset);
        }
    }

    #[test]
    fn test_as_view_mut() {
        let mut view = View::new(iota(16), Layout::col_major((4, 4)).unwrap()).unwrap();
        view.as_view_mut()
            .tile(&(2, 2).into(), (1, 1))
            .unwrap()
            .fill(0);
        assert_eq!(
            view.to_vec(),
            vec![0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 0, 0, 12, 13, 0, 0]
        );
    }

    #[test]
    fn test_copy_from() {
        let src = View::new(iota(6), Layout::row_major((2, 3)).unwrap()).unwrap();
        let mut dst = View::new(vec![0; 6], Layout::col_major((2, 3)).unwrap()).unwrap();
        dst.copy_from(&src).unwrap();
        for i in 0..2 {
            for j in 0..3 {
                assert_eq!(dst.get((i, j)).unwrap(), src.get((i, j)).unwrap());
            }
        }

        let mut short = View::new(vec![0; 4], Layout::col_major(4).unwrap()).unwrap();
        assert!(matches!(
            short.copy_from(&src),
            Err(LayoutError::SizeMismatch {
                expected: 4,
                got: 6
            })
        ));
    }

    #[test]
    fn test_layout_map() {
        let view = View::new(iota(48), Layout::col_major((6, 8)).unwrap()).unwrap();
        let tile = view.tile(&(2, 4).into(), (1, 1)).unwrap();
        assert_eq!(LayoutMap::rank(&tile), 2);
        assert_eq!(LayoutMap::size(&tile), 8);
        assert_eq!(tile.offset_of(&(1, 1).into()).unwrap(), 33);
    }
}
