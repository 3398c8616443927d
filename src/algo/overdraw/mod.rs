//! Overdraw measurement and cluster ordering.
//!
//! Overdraw is the number of fragment-shader invocations per covered pixel
//! under early-Z rasterization; it drops when clusters are drawn roughly
//! front to back for typical viewpoints. This module turns the ray
//! tracer's pairwise occlusion counts into a weighted directed graph and
//! orders clusters to minimize the weight of edges pointing backwards, a
//! greedy take on the (NP-hard) minimum feedback arc set. A cheaper
//! geometric ordering is available for meshes with many clusters.

mod raytrace;

pub use raytrace::{canonical_viewpoints, measure, overdraw_matrix};

use nalgebra::{Point3, Vector3};

use crate::algo::cancel::CancelToken;
use crate::algo::cluster::Clustering;
use crate::error::Result;
use crate::mesh::FaceWinding;

/// Cluster count above which [`OverdrawOptimizer::Auto`] switches from ray
/// tracing to the fast geometric ordering.
pub const RAYTRACE_CLUSTER_THRESHOLD: usize = 225;

/// Default ray image resolution.
pub const DEFAULT_RESOLUTION: u32 = 256;

/// Which overdraw ordering to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverdrawOptimizer {
    /// Ray tracing up to [`RAYTRACE_CLUSTER_THRESHOLD`] clusters, the fast
    /// geometric ordering beyond that.
    #[default]
    Auto,
    /// Always ray trace the overdraw graph.
    Raytrace,
    /// Always use the fast geometric ordering.
    Fast,
}

impl OverdrawOptimizer {
    pub(crate) fn resolve(self, cluster_count: usize) -> OverdrawOptimizer {
        match self {
            OverdrawOptimizer::Auto => {
                if cluster_count > RAYTRACE_CLUSTER_THRESHOLD {
                    OverdrawOptimizer::Fast
                } else {
                    OverdrawOptimizer::Raytrace
                }
            }
            other => other,
        }
    }
}

/// Options for the overdraw ray tracer.
#[derive(Debug)]
pub struct TraceOptions {
    /// Ray image resolution per viewpoint (rays per side).
    pub resolution: u32,
    /// Viewpoints on the unit sphere; empty selects the canonical set.
    pub viewpoints: Vec<Vector3<f32>>,
    /// Front-face winding of the mesh.
    pub winding: FaceWinding,
    /// Whether viewpoints may be traced on worker threads.
    pub parallel: bool,
    /// Cancellation predicate polled between image rows.
    pub cancel: CancelToken,
}

impl Default for TraceOptions {
    fn default() -> Self {
        Self {
            resolution: DEFAULT_RESOLUTION,
            viewpoints: Vec::new(),
            winding: FaceWinding::CounterClockwise,
            parallel: true,
            cancel: CancelToken::none(),
        }
    }
}

impl TraceOptions {
    /// Set the ray image resolution.
    pub fn with_resolution(mut self, resolution: u32) -> Self {
        self.resolution = resolution;
        self
    }

    /// Use a custom viewpoint set instead of the canonical one.
    pub fn with_viewpoints(mut self, viewpoints: Vec<Vector3<f32>>) -> Self {
        self.viewpoints = viewpoints;
        self
    }

    /// Set the front-face winding.
    pub fn with_winding(mut self, winding: FaceWinding) -> Self {
        self.winding = winding;
        self
    }

    /// Trace viewpoints on a single thread.
    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }

    /// Install a cancellation predicate.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Pairwise cluster overdraw counts.
///
/// `at(i, j)` counts ray events where a fragment of cluster `i` was drawn
/// nearer than a fragment of cluster `j` on the same ray; drawing `i`
/// before `j` would let early-Z reject the farther fragment. The diagonal
/// is always zero.
#[derive(Debug, Clone)]
pub struct OverdrawMatrix {
    size: usize,
    counts: Vec<u64>,
}

impl OverdrawMatrix {
    /// A zeroed `size x size` matrix.
    pub fn new(size: usize) -> Self {
        Self {
            size,
            counts: vec![0; size * size],
        }
    }

    /// Number of clusters the matrix covers.
    pub fn size(&self) -> usize {
        self.size
    }

    /// The count for the ordered cluster pair `(i, j)`.
    #[inline]
    pub fn at(&self, i: usize, j: usize) -> u64 {
        self.counts[i * self.size + j]
    }

    #[inline]
    pub(crate) fn add(&mut self, i: usize, j: usize, amount: u64) {
        self.counts[i * self.size + j] += amount;
    }

    pub(crate) fn merge(&mut self, other: &OverdrawMatrix) {
        debug_assert_eq!(self.size, other.size);
        for (a, b) in self.counts.iter_mut().zip(other.counts.iter()) {
            *a += b;
        }
    }
}

/// A weighted edge of the overdraw graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphEdge {
    /// Cluster that should be drawn earlier.
    pub from: u32,
    /// Cluster that should be drawn later.
    pub to: u32,
    /// Net overdraw saved by respecting the edge.
    pub weight: u64,
}

/// Extract the directed overdraw graph from a matrix.
///
/// Keeps the edge `i -> j` with weight `at(i, j) - at(j, i)` whenever that
/// difference is positive.
pub fn overdraw_graph(matrix: &OverdrawMatrix) -> Vec<GraphEdge> {
    let n = matrix.size();
    let mut edges = Vec::new();

    for i in 0..n {
        for j in 0..n {
            if matrix.at(i, j) > matrix.at(j, i) {
                edges.push(GraphEdge {
                    from: i as u32,
                    to: j as u32,
                    weight: matrix.at(i, j) - matrix.at(j, i),
                });
            }
        }
    }

    edges
}

/// Order clusters to minimize the weight of backward edges.
///
/// Greedy heuristic: repeatedly pick the unplaced cluster with the largest
/// outgoing-minus-incoming weight over the remaining subgraph, smallest
/// cluster id on ties. Returns the new draw order as a permutation of
/// cluster ids.
pub fn order_clusters(cluster_count: usize, edges: &[GraphEdge]) -> Vec<u32> {
    let mut out_weight = vec![0i64; cluster_count];
    let mut in_weight = vec![0i64; cluster_count];
    for e in edges {
        out_weight[e.from as usize] += e.weight as i64;
        in_weight[e.to as usize] += e.weight as i64;
    }

    let mut placed = vec![false; cluster_count];
    let mut order = Vec::with_capacity(cluster_count);

    for _ in 0..cluster_count {
        let mut best = usize::MAX;
        let mut best_score = i64::MIN;
        for (k, &done) in placed.iter().enumerate() {
            if done {
                continue;
            }
            let score = out_weight[k] - in_weight[k];
            if score > best_score {
                best = k;
                best_score = score;
            }
        }

        placed[best] = true;
        order.push(best as u32);

        // Retire the chosen cluster's edges from the remaining subgraph.
        for e in edges {
            if e.from as usize == best && !placed[e.to as usize] {
                in_weight[e.to as usize] -= e.weight as i64;
            }
            if e.to as usize == best && !placed[e.from as usize] {
                out_weight[e.from as usize] -= e.weight as i64;
            }
        }
    }

    order
}

/// Geometric cluster ordering without ray tracing.
///
/// Sorts clusters by descending dot product of (area-weighted cluster
/// centroid − mesh centroid) with the cluster's area-weighted normal:
/// outward-facing clusters near the silhouette draw first. This is the
/// fast approximation of the full graph ordering.
pub fn fast_cluster_order(
    positions: &[Point3<f32>],
    triangles: &[[u32; 3]],
    clustering: &Clustering,
) -> Vec<u32> {
    let cluster_count = clustering.cluster_count();

    let mut mesh_centroid = Vector3::zeros();
    for tri in triangles {
        for &v in tri {
            mesh_centroid += positions[v as usize].coords;
        }
    }
    mesh_centroid /= (triangles.len() * 3) as f32;

    let mut sort_data = vec![0.0f32; cluster_count];
    for k in 0..cluster_count {
        let mut area_total = 0.0f32;
        let mut centroid = Vector3::zeros();
        let mut normal = Vector3::zeros();

        for t in clustering.range(k) {
            let [a, b, c] = triangles[t];
            let p0 = positions[a as usize];
            let p1 = positions[b as usize];
            let p2 = positions[c as usize];

            let cross = (p1 - p0).cross(&(p2 - p0));
            let area = cross.norm();

            centroid += (p0.coords + p1.coords + p2.coords) * (area / 3.0);
            normal += cross;
            area_total += area;
        }

        if area_total > 0.0 {
            centroid /= area_total;
        }
        let normal_len = normal.norm();
        if normal_len > 0.0 {
            normal /= normal_len;
        }

        sort_data[k] = (centroid - mesh_centroid).dot(&normal);
    }

    let mut order: Vec<u32> = (0..cluster_count as u32).collect();
    order.sort_by(|&a, &b| {
        sort_data[b as usize]
            .total_cmp(&sort_data[a as usize])
            .then_with(|| a.cmp(&b))
    });
    order
}

/// Derive cluster boundaries from the cache-miss model.
///
/// Used by the fast path, where no connectivity-based clustering has run:
/// a triangle missing the cache on all three vertices marks a hard
/// boundary (the orderer jumped to a disjoint patch), and hard clusters
/// are then subdivided wherever the running miss rate falls to
/// `alpha` times the cluster's own miss rate. The returned starts are
/// ascending and begin with 0; they do not include the final triangle
/// count.
pub(crate) fn cache_miss_cluster_starts(
    triangles: &[[u32; 3]],
    vertex_count: usize,
    cache_size: u32,
    alpha: f32,
) -> Vec<u32> {
    use crate::algo::vcache::fifo_miss;

    let face_count = triangles.len();
    let mut timestamps = vec![0u32; vertex_count];
    let mut timestamp = cache_size + 1;

    let mut hard: Vec<u32> = Vec::new();
    for (i, tri) in triangles.iter().enumerate() {
        let mut misses = 0u32;
        for &v in tri {
            misses += fifo_miss(&mut timestamps, &mut timestamp, cache_size, v) as u32;
        }
        if i == 0 || misses == 3 {
            hard.push(i as u32);
        }
    }

    timestamps.fill(0);
    timestamp = 0;

    let mut starts: Vec<u32> = Vec::new();
    for (k, &start) in hard.iter().enumerate() {
        let end = hard.get(k + 1).map(|&b| b as usize).unwrap_or(face_count);
        let len = end - start as usize;

        // First pass: the hard cluster's own miss rate sets the target.
        timestamp += cache_size + 1;
        let mut cluster_misses = 0u32;
        for tri in &triangles[start as usize..end] {
            for &v in tri {
                cluster_misses +=
                    fifo_miss(&mut timestamps, &mut timestamp, cache_size, v) as u32;
            }
        }
        let threshold = alpha * (cluster_misses as f32 / len as f32);

        starts.push(start);

        // Second pass: cut wherever the running rate reaches the target.
        timestamp += cache_size + 1;
        let mut running_misses = 0u32;
        let mut running_faces = 0u32;
        for i in start as usize..end {
            for &v in &triangles[i] {
                running_misses +=
                    fifo_miss(&mut timestamps, &mut timestamp, cache_size, v) as u32;
            }
            running_faces += 1;

            if running_misses as f32 / running_faces as f32 <= threshold {
                starts.push(i as u32 + 1);
                timestamp += cache_size + 1;
                running_misses = 0;
                running_faces = 0;
            }
        }

        // The trailing fragment merges into the last complete cluster so a
        // few leftover triangles cannot drag the result down. This also
        // drops a boundary placed exactly at `end`.
        if *starts.last().unwrap() != start {
            starts.pop();
        }
    }

    starts
}

/// Rearrange the triangle array so clusters appear in `order`.
///
/// Returns the reordered triangles and the updated clustering, whose
/// `triangle_remap` is composed with the input clustering's so it still
/// maps back to the caller's original triangle array.
pub fn apply_cluster_order(
    triangles: &[[u32; 3]],
    clustering: &Clustering,
    order: &[u32],
) -> Result<(Vec<[u32; 3]>, Clustering)> {
    debug_assert_eq!(order.len(), clustering.cluster_count());

    let mut out_triangles = Vec::new();
    out_triangles.try_reserve_exact(triangles.len())?;
    let mut cluster_ids = Vec::new();
    cluster_ids.try_reserve_exact(triangles.len())?;
    let mut triangle_remap = Vec::new();
    triangle_remap.try_reserve_exact(triangles.len())?;
    let mut cluster_starts = Vec::new();
    cluster_starts.try_reserve_exact(order.len() + 1)?;

    cluster_starts.push(0u32);
    for (new_id, &old_id) in order.iter().enumerate() {
        for t in clustering.range(old_id as usize) {
            out_triangles.push(triangles[t]);
            cluster_ids.push(new_id as u32);
            triangle_remap.push(clustering.triangle_remap[t]);
        }
        cluster_starts.push(out_triangles.len() as u32);
    }

    let out = Clustering {
        cluster_ids,
        cluster_starts,
        triangle_remap,
    };
    out.check(triangles.len())?;

    Ok((out_triangles, out))
}
