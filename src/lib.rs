//! # Triorder
//!
//! A triangle reordering library for static indexed meshes. Triorder
//! rearranges the index buffer (and optionally the vertex buffer) so the
//! mesh renders faster on a rasterization pipeline, optimizing three
//! things at once:
//!
//! - **Post-transform cache efficiency**: fewer vertex shader invocations
//!   per triangle under a FIFO post-transform cache
//! - **Overdraw**: fewer fragment shader invocations per covered pixel
//!   under early-Z, averaged over a set of viewpoints
//! - **Pre-transform locality**: vertex storage permuted into first-use
//!   order for the vertex-buffer prefetcher
//!
//! ## Pipeline
//!
//! The full pass ([`optimize`]) partitions the mesh into clusters of
//! connected, similarly oriented triangles, reorders triangles inside each
//! cluster for the vertex cache, then ray-traces the mesh from a set of
//! viewpoints to build a pairwise overdraw graph and orders whole clusters
//! front-to-back against it. The fast pass ([`fast_optimize`]) replaces
//! clustering and ray tracing with a cache-miss model and a geometric
//! sort. Both leave vertex storage alone; [`optimize_vertex_memory`] is
//! the separate final pass for that.
//!
//! ## Quick start
//!
//! ```
//! use triorder::{optimize, measure_cache_efficiency, OptimizeOptions};
//! use nalgebra::Point3;
//!
//! let positions = vec![
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(0.0, 1.0, 0.0),
//!     Point3::new(0.0, 0.0, 1.0),
//! ];
//! let triangles = vec![[0, 1, 2], [0, 1, 3], [0, 2, 3], [1, 2, 3]];
//!
//! let options = OptimizeOptions::default().with_resolution(64);
//! let result = optimize(&positions, &triangles, &options).unwrap();
//!
//! let acmr = measure_cache_efficiency(&result.triangles, options.cache_size).unwrap();
//! assert!(acmr <= 3.0);
//! ```
//!
//! ## Scope
//!
//! Triorder is a pure reordering library: it parses no files, writes no
//! output, and logs nothing. Errors come back as values; front ends own
//! all I/O and reporting.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod algo;
pub mod error;
pub mod mesh;

mod optimize;

pub use algo::cancel::CancelToken;
pub use algo::cluster::Clustering;
pub use algo::overdraw::OverdrawOptimizer;
pub use algo::vcache::{CacheStrategy, DEFAULT_CACHE_SIZE};
pub use error::{Error, Result};
pub use mesh::FaceWinding;
pub use optimize::{
    cluster_mesh, fast_optimize, measure_cache_efficiency, measure_overdraw, optimize,
    optimize_overdraw, optimize_vertex_cache, optimize_vertex_memory, vcache_clusters,
    OptimizeOptions, Optimized, MAX_FACES, MAX_VERTICES,
};

/// Prelude module for convenient imports.
///
/// ```
/// use triorder::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::mesh::{FaceWinding, MeshAdjacency, TriangleSoup};
    pub use crate::{
        cluster_mesh, fast_optimize, measure_cache_efficiency, measure_overdraw, optimize,
        optimize_overdraw, optimize_vertex_cache, optimize_vertex_memory, vcache_clusters,
        CacheStrategy, CancelToken, Clustering, OptimizeOptions, Optimized, OverdrawOptimizer,
    };
}

// Re-export nalgebra types for convenience
pub use nalgebra;
