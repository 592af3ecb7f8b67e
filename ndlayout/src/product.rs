/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Products: replicating a tile across a matrix of tiles.
//!
//! ```text
//! logical_product(A, B) = (A, complement(A, size(A) * cosize(B)) ∘ B)
//! ```
//!
//! The first mode indexes within one copy of `A`, the second indexes
//! the copies, laid out by `B`. The blocked and raked products
//! re-pair those modes axis by axis, in two orders:
//!
//! ```text
//! blocked  ((a0,b0), (a1,b1), ...)   tiles stay contiguous
//! raked    ((b0,a0), (b1,a1), ...)   tile elements are interleaved
//! ```
//!
//! Operands of different rank are padded with `1:0` modes to the
//! larger rank before pairing.

use crate::layout::Layout;
use crate::layout::LayoutError;

impl Layout {
    /// The rank-2 layout `(self, rest)` where `rest` repeats `self`
    /// according to `tiler`.
    ///
    /// ```
    /// # use ndlayout::Layout;
    /// let tile = Layout::new((2, 2), (1, 2)).unwrap();
    /// let matrix = Layout::new((3, 4), (4, 1)).unwrap();
    /// assert_eq!(
    ///     tile.logical_product(&matrix, false).unwrap(),
    ///     Layout::new(((2, 2), (3, 4)), ((1, 2), (16, 4))).unwrap()
    /// );
    /// ```
    ///
    /// With `coalesce_result`, each of the two modes is coalesced.
    pub fn logical_product(&self, tiler: &Layout, coalesce_result: bool) -> Result<Layout, LayoutError> {
        let rest = self
            .complement(self.size() * tiler.cosize())?
            .compose(tiler)?;
        let result = Layout::concat([self.clone(), rest]);
        tracing::trace!(block = %self, tiler = %tiler, result = %result, "logical_product");
        Ok(if coalesce_result {
            result.coalesce_by_mode()
        } else {
            result
        })
    }

    /// Pair mode `i` of `self` with mode `i` of the repetition, in the
    /// order chosen by `pair`.
    fn zip_product(
        &self,
        tiler: &Layout,
        coalesce_result: bool,
        pair: impl Fn(Layout, Layout) -> [Layout; 2],
    ) -> Result<Layout, LayoutError> {
        let rank = self.rank().max(tiler.rank());
        let block = self.append_to_rank(rank);
        let tiler = tiler.append_to_rank(rank);
        let product = block.logical_product(&tiler, false)?;
        let (block, rest) = (product.mode(0)?, product.mode(1)?);
        let modes: Vec<Layout> = block
            .modes()
            .zip(rest.modes())
            .map(|(b, r)| Layout::concat(pair(b, r)))
            .collect();
        let result = Layout::concat(modes);
        Ok(if coalesce_result {
            result.coalesce_by_mode()
        } else {
            result
        })
    }

    /// The product whose mode `i` is `(self_i, tiler_i)`: each tile
    /// occupies a contiguous block of the result.
    ///
    /// ```
    /// # use ndlayout::Layout;
    /// let tile = Layout::col_major((2, 2)).unwrap();
    /// let matrix = Layout::new((3, 4), (4, 1)).unwrap();
    /// assert_eq!(
    ///     tile.blocked_product(&matrix, false).unwrap(),
    ///     Layout::new(((2, 3), (2, 4)), ((1, 16), (2, 4))).unwrap()
    /// );
    /// ```
    pub fn blocked_product(&self, tiler: &Layout, coalesce_result: bool) -> Result<Layout, LayoutError> {
        self.zip_product(tiler, coalesce_result, |b, r| [b, r])
    }

    /// The product whose mode `i` is `(tiler_i, self_i)`: neighbouring
    /// elements of one tile land in different tiles of the result.
    ///
    /// ```
    /// # use ndlayout::Layout;
    /// let tile = Layout::new((2, 2), (1, 2)).unwrap();
    /// let matrix = Layout::new((3, 4), (4, 1)).unwrap();
    /// assert_eq!(
    ///     tile.raked_product(&matrix, false).unwrap(),
    ///     Layout::new(((3, 2), (4, 2)), ((16, 1), (4, 2))).unwrap()
    /// );
    /// ```
    pub fn raked_product(&self, tiler: &Layout, coalesce_result: bool) -> Result<Layout, LayoutError> {
        self.zip_product(tiler, coalesce_result, |b, r| [r, b])
    }
}
