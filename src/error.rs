//! Error types for triorder.
//!
//! This module defines all error types used throughout the library.

use std::collections::TryReserveError;
use thiserror::Error;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during mesh optimization.
#[derive(Error, Debug)]
pub enum Error {
    /// The mesh has no triangles or no vertices.
    #[error("mesh has no geometry")]
    EmptyMesh,

    /// A triangle references an invalid vertex index.
    #[error("triangle {triangle} references invalid vertex index {vertex}")]
    InvalidVertexIndex {
        /// The triangle index.
        triangle: usize,
        /// The invalid vertex index.
        vertex: usize,
    },

    /// Invalid parameter value.
    #[error("invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// The invalid value (as string).
        value: String,
        /// Reason the value is invalid.
        reason: &'static str,
    },

    /// A working buffer could not be allocated.
    #[error("out of memory: {0}")]
    OutOfMemory(#[from] TryReserveError),

    /// An operation that requires a cluster assignment was called without one.
    #[error("cluster assignment is missing or empty")]
    NotClustered,

    /// The operation was cancelled by the caller's cancellation predicate.
    #[error("operation cancelled")]
    Cancelled,

    /// An internal invariant was violated. Indicates a bug, not bad input.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an invalid parameter error.
    pub fn invalid_param<T: std::fmt::Display>(
        name: &'static str,
        value: T,
        reason: &'static str,
    ) -> Self {
        Error::InvalidParameter {
            name,
            value: value.to_string(),
            reason,
        }
    }
}
