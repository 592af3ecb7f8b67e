/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! This module defines a parser for layout literals, the syntax
//! produced by the `Display` impls of [`Int`], [`Tuple`] and
//! [`Layout`]:
//! ```text
//! layout   ::= tuple ( ":" tuple )?
//! tuple    ::= int
//!            | "(" ")"
//!            | "(" tuple ( "," tuple )* ")"
//! int      ::= "_"? "-"? [0-9]+
//! ```
//!
//! Notes:
//! - A leading `_` marks a static value; bare integers are dynamic.
//!   `(_2,_4):(_1,_2)` is the fully static column-major 2x4 layout.
//! - An omitted stride means the compact column-major stride for the
//!   shape.
//! - `(4)` is a rank-1 node, distinct from the leaf `4`.
//! - Whitespace is ignored.

use std::str::FromStr;

use nom::IResult;
use nom::Parser as _;
use nom::branch::alt;
use nom::character::complete::char;
use nom::character::complete::digit1;
use nom::combinator::all_consuming;
use nom::combinator::cut;
use nom::combinator::map;
use nom::combinator::map_res;
use nom::combinator::opt;
use nom::combinator::recognize;
use nom::multi::separated_list0;
use nom::sequence::preceded;
use nom::sequence::terminated;

use crate::int::Int;
use crate::layout::Layout;
use crate::layout::LayoutError;
use crate::tuple::Shape;
use crate::tuple::Stride;
use crate::tuple::Tuple;

/// Errors that can occur while parsing a layout literal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("parse error at {position} in {input:?}: {reason}")]
    Invalid {
        input: String,
        /// Position of the failure in `input` with whitespace removed.
        position: usize,
        reason: String,
    },
}

fn int(input: &str) -> IResult<&str, Int> {
    let (input, (fixed, value)) = (
        opt(char('_')),
        map_res(recognize((opt(char('-')), digit1)), str::parse::<i64>),
    )
        .parse(input)?;
    let value = match fixed {
        Some(_) => Int::Static(value),
        None => Int::Dynamic(value),
    };
    Ok((input, value))
}

fn tuple(input: &str) -> IResult<&str, Tuple<Int>> {
    alt((
        map(
            preceded(
                char('('),
                cut(terminated(separated_list0(char(','), tuple), char(')'))),
            ),
            Tuple::Node,
        ),
        map(int, Tuple::Leaf),
    ))
    .parse(input)
}

fn layout(input: &str) -> IResult<&str, (Shape, Option<Stride>)> {
    (tuple, opt(preceded(char(':'), tuple))).parse(input)
}

/// Run `parser` over all of `input`, ignoring whitespace.
fn parse_all<O>(input: &str, parser: fn(&str) -> IResult<&str, O>) -> Result<O, ParseError> {
    let stripped: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    let invalid = |rest: &str, reason: String| ParseError::Invalid {
        input: input.to_string(),
        position: stripped.len() - rest.len(),
        reason,
    };
    let result = match all_consuming(parser).parse(stripped.as_str()) {
        Ok((_, value)) => Ok(value),
        Err(nom::Err::Error(err) | nom::Err::Failure(err)) => {
            let reason = match (err.code, err.input.chars().next()) {
                (nom::error::ErrorKind::MapRes, _) => "integer out of range".to_string(),
                (_, None) => "unexpected end of input".to_string(),
                (_, Some(c)) => format!("unexpected {:?}", c),
            };
            Err(invalid(err.input, reason))
        }
        Err(nom::Err::Incomplete(_)) => Err(invalid("", "incomplete input".to_string())),
    };
    result
}

impl FromStr for Tuple<Int> {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_all(s, tuple)
    }
}

impl FromStr for Layout {
    type Err = LayoutError;

    /// Parse a layout literal. Fails with [`LayoutError::Parse`] on bad
    /// syntax, [`LayoutError::NegativeExtent`] when an extent is below
    /// zero and [`LayoutError::Incongruent`] when the stride does not
    /// match the shape.
    ///
    /// ```
    /// # use ndlayout::Layout;
    /// let layout: Layout = "(2,(2,2)):(4,(1,2))".parse().unwrap();
    /// assert_eq!(layout.evaluate((1, (0, 1))).unwrap(), 6);
    /// ```
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match parse_all(s, layout)? {
            (shape, None) => Layout::col_major(shape),
            (shape, Some(stride)) => Layout::new(shape, stride),
        }
    }
}
