/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Hierarchical layouts and their algebra.
//!
//! A [`Layout`] is a pair of congruent trees, a [`Shape`] and a
//! [`Stride`], describing a function from (possibly nested)
//! coordinates to linear offsets. Layouts describe how a
//! multidimensional array sits in memory, how it splits into tiles,
//! and how the elements of a tile are shared out among parallel
//! workers.
//!
//! The crate provides:
//!
//! - coordinate mapping in hierarchical, linear and R-D forms
//!   ([`Layout::evaluate`], [`Layout::coordinate`]);
//! - the algebraic core: [`Layout::coalesce`], [`Layout::complement`],
//!   [`Layout::compose`];
//! - products and divisions built on it: [`Layout::logical_product`],
//!   [`Layout::blocked_product`], [`Layout::raked_product`],
//!   [`Layout::logical_divide`], [`Layout::zipped_divide`],
//!   [`Layout::tiled_divide`];
//! - tiles and partitions ([`tile_layout`], [`partition_layout`],
//!   [`partition_layout_by_workers`]) and [`View`]s binding a layout to
//!   storage.
//!
//! All operations are pure functions of their arguments. Layouts are
//! immutable values that can be shared freely between threads.
//!
//! ```
//! # use ndlayout::Layout;
//! let tile: Layout = "(2,2):(1,2)".parse().unwrap();
//! let matrix: Layout = "(3,4):(4,1)".parse().unwrap();
//! let raked = tile.raked_product(&matrix, false).unwrap();
//! let expected: Layout = "((3,2),(4,2)):((16,1),(4,2))".parse().unwrap();
//! assert_eq!(raked, expected);
//! ```

mod int;
pub use int::Int;

/// Hierarchical tuples: shapes, strides and coordinates.
pub mod tuple;
pub use tuple::Coord;
pub use tuple::Shape;
pub use tuple::Stride;
pub use tuple::Tuple;

mod layout;
pub use layout::ErrorKind;
pub use layout::Layout;
pub use layout::LayoutError;
pub use layout::Modes;

/// Coordinate mapping between coordinate forms and offsets.
pub mod coord;
pub use coord::LayoutMap;
pub use coord::LayoutMapInverse;

mod algebra;

/// Products: replicating a tile.
mod product;

/// Division of a layout into tiles.
pub mod divide;
pub use divide::Tile;
pub use divide::TileMode;

/// Tiles and partitions of a layout.
pub mod partition;
pub use partition::partition_layout;
pub use partition::partition_layout_by_workers;
pub use partition::tile_layout;

/// Layouts bound to storage.
pub mod view;
pub use view::Storage;
pub use view::StorageMut;
pub use view::View;

/// Parser for layout literals.
pub mod parse;
pub use parse::ParseError;

/// Property-based generators for randomized test input.
#[cfg(test)]
pub mod strategy;
