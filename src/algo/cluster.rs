//! Triangle clustering.
//!
//! Partitions the triangles of a mesh into clusters of connected, similarly
//! oriented faces by region growing over the across-edge dual graph. Each
//! cluster becomes a contiguous range of the triangle array; the overdraw
//! stages reorder whole clusters and the vertex-cache stage reorders
//! triangles within them.
//!
//! # Cluster count
//!
//! The requested cluster count is a hint, not a bound. When it is zero the
//! clusterer targets `clamp(triangle_count / 1024, 1, 64)` clusters. A
//! cluster admits candidates freely up to its target size, then only while
//! they stay within 45 degrees of the cluster's running mean normal, and
//! closes at twice the target size. Disconnected components and degenerate
//! triangles always start clusters of their own, so the final count can
//! exceed the hint.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use nalgebra::Vector3;

use crate::error::{Error, Result};
use crate::mesh::{MeshAdjacency, TriangleSoup};

/// Normal deviation ceiling for late admissions: `1 - cos(45 degrees)`.
const DEVIATION_LIMIT: f32 = 1.0 - std::f32::consts::FRAC_1_SQRT_2;

/// Options for triangle clustering.
#[derive(Debug, Clone)]
pub struct ClusterOptions {
    /// Requested number of clusters; 0 selects an automatic count.
    pub target_clusters: usize,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        Self { target_clusters: 0 }
    }
}

impl ClusterOptions {
    /// Create options with the given cluster-count hint.
    pub fn with_target_clusters(mut self, target: usize) -> Self {
        self.target_clusters = target;
        self
    }
}

/// A cluster partition of a triangle array.
///
/// Triangles are contiguous by cluster: cluster `k` occupies the index
/// range `cluster_starts[k]..cluster_starts[k + 1]`.
#[derive(Debug, Clone)]
pub struct Clustering {
    /// Cluster id per triangle, non-decreasing.
    pub cluster_ids: Vec<u32>,
    /// First triangle of each cluster, one entry longer than the cluster
    /// count; the final entry is the triangle count.
    pub cluster_starts: Vec<u32>,
    /// For each output slot, the input triangle that landed there.
    pub triangle_remap: Vec<u32>,
}

impl Clustering {
    /// Number of clusters.
    pub fn cluster_count(&self) -> usize {
        self.cluster_starts.len().saturating_sub(1)
    }

    /// Triangle index range of cluster `k`.
    pub fn range(&self, k: usize) -> std::ops::Range<usize> {
        self.cluster_starts[k] as usize..self.cluster_starts[k + 1] as usize
    }

    /// Check the partition against a triangle count.
    ///
    /// Returns [`Error::NotClustered`] for an empty partition and
    /// [`Error::Internal`] when the start offsets and ids disagree, which
    /// indicates a bug rather than bad input.
    pub fn check(&self, triangle_count: usize) -> Result<()> {
        if self.cluster_starts.len() < 2 || self.cluster_ids.is_empty() {
            return Err(Error::NotClustered);
        }
        if self.cluster_ids.len() != triangle_count {
            return Err(Error::Internal(format!(
                "cluster assignment covers {} triangles, mesh has {}",
                self.cluster_ids.len(),
                triangle_count
            )));
        }
        if self.cluster_starts[0] != 0
            || *self.cluster_starts.last().unwrap() as usize != triangle_count
        {
            return Err(Error::Internal(
                "cluster start offsets do not span the triangle array".into(),
            ));
        }
        for k in 0..self.cluster_count() {
            for t in self.range(k) {
                if self.cluster_ids[t] as usize != k {
                    return Err(Error::Internal(format!(
                        "triangle {t} has cluster id {} but lies in cluster {k}",
                        self.cluster_ids[t]
                    )));
                }
            }
        }
        Ok(())
    }
}

/// A boundary candidate in the growing queue.
///
/// Ordered so that the `BinaryHeap` pops the candidate with the smallest
/// deviation first, ties broken by smallest triangle index.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    deviation: f32,
    triangle: u32,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.deviation == other.deviation && self.triangle == other.triangle
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap behavior.
        other
            .deviation
            .partial_cmp(&self.deviation)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.triangle.cmp(&self.triangle))
    }
}

/// Partition the triangles of `soup` into orientation-coherent clusters.
///
/// Returns the triangle array reordered so each cluster is contiguous,
/// together with the [`Clustering`] describing the partition. Output is
/// deterministic for a given mesh and options.
pub fn cluster_triangles(
    soup: &TriangleSoup,
    adjacency: &MeshAdjacency,
    face_normals: &[Vector3<f32>],
    options: &ClusterOptions,
) -> Result<(Vec<[u32; 3]>, Clustering)> {
    let triangle_count = soup.triangle_count();
    debug_assert_eq!(face_normals.len(), triangle_count);

    let target = if options.target_clusters > 0 {
        options.target_clusters
    } else {
        (triangle_count / 1024).clamp(1, 64)
    };
    let target_size = triangle_count.div_ceil(target);
    let size_cap = 2 * target_size;

    const UNASSIGNED: u32 = u32::MAX;
    let mut assignment = Vec::new();
    assignment.try_reserve_exact(triangle_count)?;
    assignment.resize(triangle_count, UNASSIGNED);

    let mut queue: BinaryHeap<Candidate> = BinaryHeap::new();
    let mut cluster_count: u32 = 0;

    for seed in 0..triangle_count {
        if assignment[seed] != UNASSIGNED {
            continue;
        }

        let cluster = cluster_count;
        cluster_count += 1;

        // Degenerate faces are isolated: they carry no orientation and
        // contribute no overdraw, so they never join a growing region.
        if face_normals[seed] == Vector3::zeros() {
            assignment[seed] = cluster;
            continue;
        }

        let mut mean = Vector3::zeros();
        let mut size = 0usize;
        queue.clear();
        queue.push(Candidate {
            deviation: 0.0,
            triangle: seed as u32,
        });

        while let Some(candidate) = queue.pop() {
            let t = candidate.triangle as usize;
            if assignment[t] != UNASSIGNED {
                continue;
            }

            let admit = size < target_size
                || (size < size_cap && candidate.deviation <= DEVIATION_LIMIT);
            if !admit {
                break;
            }

            assignment[t] = cluster;
            size += 1;
            mean += face_normals[t];

            let mean_len = mean.norm();
            let mean_dir = if mean_len > 0.0 { mean / mean_len } else { mean };
            for &neighbor in &adjacency.across_edge[t] {
                let n = neighbor as usize;
                if assignment[n] != UNASSIGNED || face_normals[n] == Vector3::zeros() {
                    continue;
                }
                queue.push(Candidate {
                    deviation: 1.0 - face_normals[n].dot(&mean_dir),
                    triangle: neighbor,
                });
            }
        }
    }

    // Make clusters contiguous: stable sort by cluster id keeps the
    // first-visit order inside each cluster.
    let mut remap: Vec<u32> = (0..triangle_count as u32).collect();
    remap.sort_by_key(|&t| assignment[t as usize]);

    let mut triangles = Vec::new();
    triangles.try_reserve_exact(triangle_count)?;
    let mut cluster_ids = Vec::new();
    cluster_ids.try_reserve_exact(triangle_count)?;
    for &t in &remap {
        triangles.push(soup.triangles[t as usize]);
        cluster_ids.push(assignment[t as usize]);
    }

    let mut cluster_starts = Vec::new();
    cluster_starts.try_reserve_exact(cluster_count as usize + 1)?;
    cluster_starts.push(0u32);
    for t in 1..triangle_count {
        if cluster_ids[t] != cluster_ids[t - 1] {
            cluster_starts.push(t as u32);
        }
    }
    cluster_starts.push(triangle_count as u32);

    let clustering = Clustering {
        cluster_ids,
        cluster_starts,
        triangle_remap: remap,
    };
    clustering.check(triangle_count)?;

    Ok((triangles, clustering))
}
