/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Tiles and partitions of a layout.
//!
//! Both operations start from the zipped divide `((tile), (rest))` and
//! fix one of its two modes:
//!
//! - [`tile_layout`] fixes the across-tile mode to a tile coordinate
//!   and keeps the elements of that one tile;
//! - [`partition_layout`] fixes the within-tile mode to a worker's
//!   position and keeps every element that worker visits, one per
//!   tile.
//!
//! Each returns the remaining layout together with the base offset
//! contributed by the fixed mode. Coordinates for the fixed mode are
//! either R-D (one integer per dimension) or 1-D.
//!
//! With a worker layout, worker `id` sits at the `id`-th smallest
//! offset of that layout, and its strides choose the assignment
//! policy:
//!
//! ```text
//! workers (2,2):(1,2)   id 1 -> coord (1,0)
//! workers (2,2):(2,1)   id 1 -> coord (0,1)
//! workers (2,2):(1,4)   id 2 -> offset 4 -> coord (0,1)
//! ```

use std::iter;

use itertools::Itertools;

use crate::algebra::NestedLeaf;
use crate::divide::Tile;
use crate::divide::TileMode;
use crate::int::Int;
use crate::layout::Layout;
use crate::layout::LayoutError;
use crate::tuple::Coord;
use crate::tuple::Tuple;

/// Fix mode `fixed` of the rank-2 `zipped` layout to `coord`; return the
/// other mode and the offset of `coord`.
fn fix_mode(zipped: &Layout, fixed: usize, coord: &Coord) -> Result<(Layout, i64), LayoutError> {
    let index = zipped.mode(fixed)?;
    let kept = zipped.mode(1 - fixed)?;
    let offset = match coord {
        Tuple::Leaf(c) => {
            check_tile(0, *c, &index)?;
            index.evaluate(*c)?
        }
        Tuple::Node(coords) => {
            if coords.len() != index.rank() {
                return Err(LayoutError::RankMismatch {
                    expected: index.rank(),
                    got: coords.len(),
                });
            }
            coords
                .iter()
                .zip(index.modes())
                .enumerate()
                .map(|(dim, (c, mode))| match c {
                    Tuple::Leaf(c) => {
                        check_tile(dim, *c, &mode)?;
                        mode.evaluate(*c)
                    }
                    nested => mode.evaluate(nested.clone()),
                })
                .sum::<Result<i64, LayoutError>>()?
        }
    };
    Ok((kept, offset))
}

fn check_tile(dim: usize, index: i64, mode: &Layout) -> Result<(), LayoutError> {
    let tiles = mode.size().value();
    if index < 0 || index >= tiles {
        tracing::debug!(dim, index, tiles, "tile index out of range");
        return Err(LayoutError::TileOutOfRange { dim, index, tiles });
    }
    Ok(())
}

/// The layout of tile `coord` of `layout` divided by `tile`, and the
/// offset at which that tile starts.
///
/// ```
/// # use ndlayout::Layout;
/// # use ndlayout::tile_layout;
/// let layout = Layout::col_major((6, 8)).unwrap();
/// let (tile, offset) = tile_layout(&layout, &(2, 4).into(), (1, 1)).unwrap();
/// assert_eq!(tile, Layout::new((2, 4), (1, 6)).unwrap());
/// assert_eq!(offset, 26);
/// ```
///
/// Fails with [`LayoutError::TileOutOfRange`] when `coord` exceeds the
/// number of tiles along some dimension.
pub fn tile_layout(
    layout: &Layout,
    tile: &Tile,
    coord: impl Into<Coord>,
) -> Result<(Layout, i64), LayoutError> {
    let coord = coord.into();
    let zipped = layout.zipped_divide(tile)?;
    let (result, offset) = fix_mode(&zipped, 1, &coord)?;
    tracing::trace!(layout = %layout, coord = %coord, result = %result, offset, "tile");
    Ok((result, offset))
}

/// The part of `layout` assigned to the worker at `coord` within
/// `tile`: every `tile`-shaped block of `layout` contributes the one
/// element at `coord`.
///
/// ```
/// # use ndlayout::Layout;
/// # use ndlayout::partition_layout;
/// let layout = Layout::new((6, 8), (1, 6)).unwrap();
/// let (part, offset) = partition_layout(&layout, &(2, 2).into(), (0, 0)).unwrap();
/// assert_eq!(part, Layout::new((3, 4), (2, 12)).unwrap());
/// assert_eq!(offset, 0);
/// ```
pub fn partition_layout(
    layout: &Layout,
    tile: &Tile,
    coord: impl Into<Coord>,
) -> Result<(Layout, i64), LayoutError> {
    let coord = coord.into();
    let zipped = layout.zipped_divide(tile)?;
    let (result, offset) = fix_mode(&zipped, 0, &coord)?;
    tracing::trace!(layout = %layout, coord = %coord, result = %result, offset, "partition");
    Ok((result, offset))
}

/// Partition `layout` among the workers of `workers`, returning the part
/// of worker `id`. The worker's coordinate is the coordinate of the
/// `id`-th smallest offset of `workers`, so the worker layout's strides
/// decide which worker gets which element. For a compact worker layout
/// that offset is `id` itself.
///
/// A `workers` layout of lower rank than `layout` leaves the remaining
/// dimensions undivided.
///
/// Fails with [`LayoutError::Aliasing`] if two workers share an offset,
/// and with [`LayoutError::WorkerOutOfRange`] unless
/// `0 <= id < size(workers)`.
pub fn partition_layout_by_workers(
    layout: &Layout,
    workers: &Layout,
    id: i64,
) -> Result<(Layout, i64), LayoutError> {
    let nested = match workers.nested_leaves() {
        Ok(leaves) => Some(leaves),
        Err(LayoutError::NotComplementable { .. }) => None,
        Err(err) => {
            tracing::debug!(workers = %workers, %err, "worker layout rejected");
            return Err(err);
        }
    };
    let count = workers.size().value();
    if id < 0 || id >= count {
        tracing::debug!(id, workers = %workers, "worker out of range");
        return Err(LayoutError::WorkerOutOfRange { id, workers: count });
    }
    let coord = match nested {
        Some(leaves) => nested_worker(workers, &leaves, id)?,
        None => ranked_worker(workers, id)?,
    };
    let coord = workers.rd_of(coord)?;

    // Dimensions of `layout` past the rank of `workers` have one worker.
    let rank = layout.rank().max(workers.rank());
    if rank == workers.rank() {
        return partition_layout(layout, &Tile::from_shape(workers.shape()), coord);
    }
    let tile: Tile = Tile::from_shape(workers.shape())
        .modes()
        .iter()
        .cloned()
        .chain(iter::repeat(TileMode::Count(Int::Static(1))))
        .take(rank)
        .collect();
    let coord = Tuple::Node(
        coord
            .modes()
            .iter()
            .cloned()
            .chain(iter::repeat(Tuple::Leaf(0)))
            .take(rank)
            .collect(),
    );
    partition_layout(layout, &tile, coord)
}

/// Decode `id` colexicographically along the stride-sorted leaves,
/// which orders the offsets of a nested layout. Reversed leaves count
/// down from their far end.
fn nested_worker(workers: &Layout, leaves: &[NestedLeaf], id: i64) -> Result<Coord, LayoutError> {
    let mut flat = vec![0i64; workers.shape().leaves().count()];
    let mut rest = id;
    for leaf in leaves {
        let extent = leaf.extent.value();
        let digit = rest % extent;
        rest /= extent;
        flat[leaf.index] = if leaf.reversed {
            extent - 1 - digit
        } else {
            digit
        };
    }
    Tuple::unflatten(&flat, workers.shape()).ok_or_else(|| LayoutError::WorkerNotInLayout {
        id,
        layout: workers.clone(),
    })
}

/// Rank every offset of `workers` and pick the `id`-th. Used for
/// injective worker layouts whose strides do not nest.
fn ranked_worker(workers: &Layout, id: i64) -> Result<Coord, LayoutError> {
    let ranked: Vec<(i64, i64)> = workers.offsets().zip(0..).sorted().collect();
    if ranked.iter().tuple_windows().any(|(a, b)| a.0 == b.0) {
        tracing::debug!(workers = %workers, "worker layout rejected: aliasing");
        return Err(LayoutError::Aliasing {
            layout: workers.clone(),
        });
    }
    let (_, index) = ranked[id as usize];
    workers.coordinate(index)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use itertools::Itertools;

    use super::*;
    use crate::Shape;
    use crate::Stride;

    fn layout(shape: impl Into<Shape>, stride: impl Into<Stride>) -> Layout {
        Layout::new(shape, stride).unwrap()
    }

    fn offsets((layout, base): (Layout, i64)) -> Vec<i64> {
        layout.offsets().map(|o| o + base).collect()
    }

    #[test]
    fn test_tile() {
        let matrix = Layout::col_major((6, 8)).unwrap();
        let tile = Tile::from((2, 4));
        assert_eq!(
            tile_layout(&matrix, &tile, (0, 0)).unwrap(),
            (layout((2, 4), (1, 6)), 0)
        );
        assert_eq!(
            tile_layout(&matrix, &tile, (2, 1)).unwrap(),
            (layout((2, 4), (1, 6)), 28)
        );
        // 1-D tile index, colexicographic over the 3x2 grid of tiles.
        assert_eq!(
            tile_layout(&matrix, &tile, 5).unwrap(),
            (layout((2, 4), (1, 6)), 28)
        );
    }

    #[test]
    fn test_tiles_cover_layout() {
        let matrix = Layout::row_major((4, 6)).unwrap();
        let tile = Tile::from((2, 3));
        let all: Vec<i64> = (0..2)
            .cartesian_product(0..2)
            .flat_map(|(i, j)| offsets(tile_layout(&matrix, &tile, (i, j)).unwrap()))
            .sorted()
            .collect();
        assert_eq!(all, (0..24).collect::<Vec<_>>());
    }

    #[test]
    fn test_tile_out_of_range() {
        let matrix = Layout::col_major((6, 8)).unwrap();
        let tile = Tile::from((2, 4));
        assert!(matches!(
            tile_layout(&matrix, &tile, (3, 0)),
            Err(LayoutError::TileOutOfRange {
                dim: 0,
                index: 3,
                tiles: 3
            })
        ));
        assert!(matches!(
            tile_layout(&matrix, &tile, (0, -1)),
            Err(LayoutError::TileOutOfRange { dim: 1, .. })
        ));
        assert!(matches!(
            tile_layout(&matrix, &tile, 6),
            Err(LayoutError::TileOutOfRange {
                dim: 0,
                index: 6,
                tiles: 6
            })
        ));
        assert!(matches!(
            tile_layout(&matrix, &tile, (0, 0, 0)),
            Err(LayoutError::RankMismatch {
                expected: 2,
                got: 3
            })
        ));
    }

    #[test]
    fn test_tile_leaf_layout() {
        let (tile, offset) = tile_layout(&layout(12, 2), &Tile::from((4,)), 2).unwrap();
        assert_eq!(tile, layout(4, 2));
        assert_eq!(offset, 16);
    }

    #[test]
    fn test_tile_whole_mode() {
        let matrix = Layout::col_major((4, 6)).unwrap();
        let tile = Tile::new(vec![TileMode::Count(2.into()), TileMode::All]);
        let (rows, offset) = tile_layout(&matrix, &tile, (1, 0)).unwrap();
        assert_eq!(rows, layout((2, 6), (1, 4)));
        assert_eq!(offset, 2);
    }

    #[test]
    fn test_partition() {
        let matrix = layout((6, 8), (1, 6));
        let tile = Tile::from((2, 2));
        assert_eq!(
            partition_layout(&matrix, &tile, (0, 0)).unwrap(),
            (layout((3, 4), (2, 12)), 0)
        );
        assert_eq!(
            partition_layout(&matrix, &tile, (1, 1)).unwrap(),
            (layout((3, 4), (2, 12)), 7)
        );
        assert!(matches!(
            partition_layout(&matrix, &tile, (2, 0)),
            Err(LayoutError::TileOutOfRange { dim: 0, .. })
        ));
    }

    #[test]
    fn test_partition_by_workers_policy() {
        let matrix = layout((6, 8), (1, 6));

        let (part, base) =
            partition_layout_by_workers(&matrix, &Layout::col_major((2, 2)).unwrap(), 1).unwrap();
        assert_eq!(part, layout((3, 4), (2, 12)));
        assert_eq!(base, 1);
        assert_eq!(
            offsets((part, base)).into_iter().take(3).collect::<Vec<_>>(),
            vec![1, 3, 5]
        );

        let (part, base) =
            partition_layout_by_workers(&matrix, &layout((2, 2), (2, 1)), 1).unwrap();
        assert_eq!(part, layout((3, 4), (2, 12)));
        assert_eq!(base, 6);
    }

    #[test]
    fn test_partition_by_workers_errors() {
        let matrix = Layout::col_major((4, 4)).unwrap();
        let workers = Layout::col_major((2, 2)).unwrap();
        assert!(matches!(
            partition_layout_by_workers(&matrix, &workers, 4),
            Err(LayoutError::WorkerOutOfRange { id: 4, workers: 4 })
        ));
        assert!(matches!(
            partition_layout_by_workers(&matrix, &workers, -1),
            Err(LayoutError::WorkerOutOfRange { id: -1, .. })
        ));
        // Workers that share an offset are rejected whatever the id.
        for id in [0, 7] {
            assert!(matches!(
                partition_layout_by_workers(&matrix, &layout((2, 2), (1, 1)), id),
                Err(LayoutError::Aliasing { .. })
            ));
        }
        assert!(matches!(
            partition_layout_by_workers(&matrix, &layout((2, 2), (1, 0)), 0),
            Err(LayoutError::Aliasing { .. })
        ));
        // Strides that do not nest, where 3*2 == 2*3.
        assert!(matches!(
            partition_layout_by_workers(&matrix, &layout((4, 3), (2, 3)), 0),
            Err(LayoutError::Aliasing { .. })
        ));
    }

    #[test]
    fn test_partition_by_workers_with_gaps() {
        let matrix = Layout::col_major((6, 8)).unwrap();

        // Offsets 0, 1, 4, 5: worker 2 sits at offset 4.
        let gapped = layout((2, 2), (1, 4));
        let (part, base) = partition_layout_by_workers(&matrix, &gapped, 2).unwrap();
        assert_eq!(part, layout((3, 4), (2, 12)));
        assert_eq!(base, 6);

        // Reversed: offsets -1, 0, 1, 2 with worker 0 at coordinate (1,0).
        let reversed = layout((2, 2), (-1, 2));
        let (_, base) = partition_layout_by_workers(&matrix, &reversed, 0).unwrap();
        assert_eq!(base, 1);
    }

    #[test]
    fn test_partition_by_worker_layouts_covers_matrix() {
        let matrix = Layout::col_major((6, 8)).unwrap();
        for workers in [
            layout((2, 2), (1, 4)),
            layout((3, 2), (2, 3)),
            layout((2, 2), (2, 1)),
            layout((2, 2), (-1, 2)),
            layout((2, (2, 2)), (3, (1, 8))),
        ] {
            let n = workers.size().value();
            let parts: Vec<Vec<i64>> = (0..n)
                .map(|id| offsets(partition_layout_by_workers(&matrix, &workers, id).unwrap()))
                .collect();
            for part in &parts {
                assert_eq!(part.len() as i64, 48 / n, "workers {}", workers);
            }
            let all: Vec<i64> = parts.into_iter().flatten().sorted().collect();
            assert_eq!(all, (0..48).collect::<Vec<_>>(), "workers {}", workers);
        }
    }

    #[tracing_test::traced_test]
    #[test]
    fn test_partition_logs_rejection() {
        let matrix = Layout::col_major((4, 4)).unwrap();
        assert!(partition_layout_by_workers(&matrix, &Layout::col_major(4).unwrap(), 9).is_err());
        assert!(logs_contain("worker out of range"));
    }

    #[test]
    fn test_partition_disjoint_and_exhaustive() {
        let matrix = Layout::row_major((8, 6)).unwrap();
        for workers in [
            Layout::col_major((2, 3)).unwrap(),
            Layout::row_major((2, 3)).unwrap(),
            Layout::col_major(4).unwrap(),
            Layout::col_major((4, 1)).unwrap(),
        ] {
            let n = workers.size().value();
            let parts: Vec<Vec<i64>> = (0..n)
                .map(|id| offsets(partition_layout_by_workers(&matrix, &workers, id).unwrap()))
                .collect();
            for part in &parts {
                assert_eq!(part.len() as i64, 48 / n);
            }
            let all: Vec<i64> = parts.into_iter().flatten().sorted().collect();
            assert_eq!(all, (0..48).collect::<Vec<_>>(), "workers {}", workers);
        }
    }

    #[test]
    fn test_partition_concurrently() {
        let matrix = Layout::col_major((16, 16)).unwrap();
        let workers = Layout::col_major((4, 4)).unwrap();
        let seen: Vec<Vec<i64>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..16)
                .map(|id| {
                    let (matrix, workers) = (&matrix, &workers);
                    scope.spawn(move || {
                        offsets(partition_layout_by_workers(matrix, workers, id).unwrap())
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        let mut all = HashSet::new();
        for part in seen {
            assert_eq!(part.len(), 16);
            for offset in part {
                assert!(all.insert(offset));
            }
        }
        assert_eq!(all.len(), 256);
    }
}
