//! Mesh optimization algorithms.
//!
//! This module contains the stages of the reordering pipeline:
//!
//! - **Clustering**: partition triangles into connected, orientation-
//!   coherent clusters
//! - **Overdraw**: ray-traced overdraw graphs, cluster ordering, and
//!   overdraw measurement
//! - **Vertex cache**: per-cluster triangle ordering for the
//!   post-transform cache, and cache-efficiency measurement
//! - **Remapping**: first-use vertex memory permutation
//!
//! The stages compose freely; the top-level entry points in
//! [`crate`](crate#functions) wire them together in the usual order.

pub mod cancel;
pub mod cluster;
pub mod overdraw;
pub mod remap;
pub mod vcache;

pub use cancel::CancelToken;
