//! Typed errors raised by the pure core.
//!
//! - `ParseError` and `PartitionError` are fatal: the run cannot start or
//!   continue with an unreadable candidate list or an invalid shard.
//! - `InterpolationError` is scoped to one candidate; the runner records the
//!   candidate as attempted and moves on.

use std::fmt;

use thiserror::Error;

/// Candidate source output could not be decoded.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("candidate {index} must be a string, array or object (got {found})")]
    UnsupportedElement { index: usize, found: &'static str },

    #[error("candidate source output is not valid UTF-8")]
    InvalidUtf8,

    #[error("candidate source produced no candidates (empty output)")]
    Empty,
}

/// Invalid `INDEX/TOTAL` shard value.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PartitionError {
    #[error("shard must be in format INDEX/TOTAL (e.g. 1/4), got '{0}'")]
    Format(String),

    #[error("invalid shard values '{0}': need 1 <= INDEX <= TOTAL")]
    Range(String),
}

/// Structural shape of a candidate, as named in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    String,
    Array,
    Map,
}

impl Shape {
    pub fn as_str(self) -> &'static str {
        match self {
            Shape::String => "string",
            Shape::Array => "array",
            Shape::Map => "map",
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed accessor in a template was applied to the wrong candidate shape.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("type mismatch: {variable} requires an array candidate, got {actual}")]
pub struct InterpolationError {
    /// Verbatim template token, e.g. `$INPUT[0]`.
    pub variable: String,
    pub actual: Shape,
}
