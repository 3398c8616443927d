//! Core mesh data structures.
//!
//! This module provides the indexed triangle soup shared by every pipeline
//! stage and the adjacency tables derived from it.
//!
//! # Overview
//!
//! The primary type is [`TriangleSoup`]: a plain vertex position array plus
//! an index array of triangle triples. There is no half-edge or other
//! connectivity structure baked in; the optimizer works on triangle
//! granularity and builds exactly the adjacency it needs, once, in
//! [`MeshAdjacency`].
//!
//! # Construction
//!
//! ```
//! use triorder::mesh::TriangleSoup;
//! use nalgebra::Point3;
//!
//! let positions = vec![
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(0.5, 1.0, 0.0),
//! ];
//! let triangles = vec![[0, 1, 2]];
//!
//! let soup = TriangleSoup::new(&positions, &triangles).unwrap();
//! assert_eq!(soup.triangle_count(), 1);
//! ```

mod adjacency;
mod soup;

pub use adjacency::{
    build_across_edge, build_vertex_neighbors, build_vertex_triangles, MeshAdjacency,
};
pub use soup::{transform_normals, FaceWinding, TriangleSoup};
