//! Top-level optimization entry points.
//!
//! These functions wire the pipeline stages together the way most callers
//! want them: [`optimize`] for the full clustering + vertex-cache +
//! overdraw pass, [`fast_optimize`] for the cheaper fused variant, and the
//! individual stages for callers that mix and match. All of them take
//! plain slices, return owned buffers, and never touch global state, so
//! concurrent calls on different meshes are independent.
//!
//! ```
//! use triorder::{optimize, OptimizeOptions};
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
//! assert_eq!(result.triangles.len(), triangles.len());
//! ```

use nalgebra::{Point3, Vector3};

use crate::algo::cluster::{cluster_triangles, ClusterOptions, Clustering};
use crate::algo::overdraw::{self, OverdrawOptimizer, TraceOptions};
use crate::algo::remap;
use crate::algo::vcache::{self, CacheStrategy, DEFAULT_CACHE_SIZE};
use crate::algo::CancelToken;
use crate::error::{Error, Result};
use crate::mesh::{FaceWinding, MeshAdjacency, TriangleSoup};

/// Largest accepted vertex count.
pub const MAX_VERTICES: usize = i32::MAX as usize;
/// Largest accepted triangle count.
pub const MAX_FACES: usize = i32::MAX as usize;

/// Options shared by the optimization entry points.
#[derive(Debug)]
pub struct OptimizeOptions {
    /// Simulated post-transform cache size (at least 3).
    pub cache_size: u32,
    /// Cluster-count hint for the clusterer; 0 selects an automatic count.
    pub target_clusters: usize,
    /// Triangle ordering strategy within clusters.
    pub vcache_strategy: CacheStrategy,
    /// How the cluster draw order is computed.
    pub overdraw_optimizer: OverdrawOptimizer,
    /// Front-face winding of the mesh.
    pub winding: FaceWinding,
    /// Overdraw viewpoints on the unit sphere; empty selects the built-in
    /// canonical set.
    pub viewpoints: Vec<Vector3<f32>>,
    /// Ray image resolution for the overdraw tracer.
    pub resolution: u32,
    /// Whether the tracer may use worker threads.
    pub parallel: bool,
    /// Cancellation predicate polled during ray tracing.
    pub cancel: CancelToken,
}

impl Default for OptimizeOptions {
    fn default() -> Self {
        Self {
            cache_size: DEFAULT_CACHE_SIZE,
            target_clusters: 0,
            vcache_strategy: CacheStrategy::Auto,
            overdraw_optimizer: OverdrawOptimizer::Auto,
            winding: FaceWinding::CounterClockwise,
            viewpoints: Vec::new(),
            resolution: overdraw::DEFAULT_RESOLUTION,
            parallel: true,
            cancel: CancelToken::none(),
        }
    }
}

impl OptimizeOptions {
    /// Set the simulated post-transform cache size.
    pub fn with_cache_size(mut self, cache_size: u32) -> Self {
        self.cache_size = cache_size;
        self
    }

    /// Set the cluster-count hint.
    pub fn with_target_clusters(mut self, target: usize) -> Self {
        self.target_clusters = target;
        self
    }

    /// Set the vertex-cache ordering strategy.
    pub fn with_vcache_strategy(mut self, strategy: CacheStrategy) -> Self {
        self.vcache_strategy = strategy;
        self
    }

    /// Set the overdraw optimizer.
    pub fn with_overdraw_optimizer(mut self, optimizer: OverdrawOptimizer) -> Self {
        self.overdraw_optimizer = optimizer;
        self
    }

    /// Set the front-face winding.
    pub fn with_winding(mut self, winding: FaceWinding) -> Self {
        self.winding = winding;
        self
    }

    /// Use a custom overdraw viewpoint set.
    pub fn with_viewpoints(mut self, viewpoints: Vec<Vector3<f32>>) -> Self {
        self.viewpoints = viewpoints;
        self
    }

    /// Set the overdraw tracer resolution.
    pub fn with_resolution(mut self, resolution: u32) -> Self {
        self.resolution = resolution;
        self
    }

    /// Run everything on the calling thread.
    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }

    /// Install a cancellation predicate.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn trace_options(&self) -> TraceOptions {
        TraceOptions {
            resolution: self.resolution,
            viewpoints: self.viewpoints.clone(),
            winding: self.winding,
            parallel: self.parallel,
            cancel: self.cancel.clone(),
        }
    }
}

/// Output of [`optimize`] and [`fast_optimize`].
#[derive(Debug, Clone)]
pub struct Optimized {
    /// The reordered index buffer.
    pub triangles: Vec<[u32; 3]>,
    /// Number of clusters in the final draw order.
    pub cluster_count: usize,
    /// For each output slot, the input triangle that landed there. Useful
    /// for rewriting external per-face attribute streams.
    pub triangle_remap: Vec<u32>,
}

fn validate_mesh(vertex_count: usize, triangles: &[[u32; 3]]) -> Result<()> {
    if vertex_count == 0 || triangles.is_empty() {
        return Err(Error::EmptyMesh);
    }
    if vertex_count > MAX_VERTICES {
        return Err(Error::invalid_param(
            "vertex_count",
            vertex_count,
            "exceeds MAX_VERTICES",
        ));
    }
    if triangles.len() > MAX_FACES {
        return Err(Error::invalid_param(
            "triangle_count",
            triangles.len(),
            "exceeds MAX_FACES",
        ));
    }
    for (t, tri) in triangles.iter().enumerate() {
        for &v in tri {
            if v as usize >= vertex_count {
                return Err(Error::InvalidVertexIndex {
                    triangle: t,
                    vertex: v as usize,
                });
            }
        }
    }
    Ok(())
}

fn validate_options(options: &OptimizeOptions) -> Result<()> {
    if options.cache_size < 3 {
        return Err(Error::invalid_param(
            "cache_size",
            options.cache_size,
            "must be at least 3",
        ));
    }
    if options.resolution < 1 {
        return Err(Error::invalid_param(
            "resolution",
            options.resolution,
            "must be at least 1",
        ));
    }
    for (i, p) in options.viewpoints.iter().enumerate() {
        if (p.norm() - 1.0).abs() > 1e-3 {
            return Err(Error::invalid_param(
                "viewpoints",
                format!("[{i}] = ({}, {}, {})", p.x, p.y, p.z),
                "viewpoints must be unit vectors",
            ));
        }
    }
    Ok(())
}

/// Compute the cluster draw order for an already-clustered triangle array.
fn cluster_draw_order(
    positions: &[Point3<f32>],
    triangles: &[[u32; 3]],
    clustering: &Clustering,
    options: &OptimizeOptions,
) -> Result<Vec<u32>> {
    let cluster_count = clustering.cluster_count();

    match options.overdraw_optimizer.resolve(cluster_count) {
        OverdrawOptimizer::Raytrace => {
            let soup = TriangleSoup::new(positions, triangles)?;
            let normals = soup.face_normals()?;
            let matrix = overdraw::overdraw_matrix(
                &soup,
                &normals,
                &clustering.cluster_ids,
                cluster_count,
                &options.trace_options(),
            )?;
            let edges = overdraw::overdraw_graph(&matrix);
            Ok(overdraw::order_clusters(cluster_count, &edges))
        }
        _ => Ok(overdraw::fast_cluster_order(
            positions,
            triangles,
            clustering,
        )),
    }
}

/// Run the full pipeline: clustering, per-cluster vertex-cache ordering,
/// and overdraw-driven cluster ordering.
///
/// Returns the reordered index buffer, the cluster count, and the
/// triangle permutation back to the input. Vertex storage is untouched;
/// run [`optimize_vertex_memory`] afterwards for the vertex pass.
pub fn optimize(
    positions: &[Point3<f32>],
    triangles: &[[u32; 3]],
    options: &OptimizeOptions,
) -> Result<Optimized> {
    validate_mesh(positions.len(), triangles)?;
    validate_options(options)?;

    let soup = TriangleSoup::new(positions, triangles)?;
    let adjacency = MeshAdjacency::build(&soup)?;
    let normals = soup.face_normals()?;

    let cluster_options = ClusterOptions::default().with_target_clusters(options.target_clusters);
    let (clustered, clustering) =
        cluster_triangles(&soup, &adjacency, &normals, &cluster_options)?;

    let (cached, permutation) = vcache::optimize_cache_clusters(
        &clustered,
        positions.len(),
        options.cache_size,
        &clustering,
        options.vcache_strategy,
    )?;

    // Thread the vertex-cache permutation into the remap so the final
    // table still points back at the caller's triangles.
    let triangle_remap = permutation
        .iter()
        .map(|&slot| clustering.triangle_remap[slot as usize])
        .collect();
    let clustering = Clustering {
        cluster_ids: clustering.cluster_ids,
        cluster_starts: clustering.cluster_starts,
        triangle_remap,
    };

    let order = cluster_draw_order(positions, &cached, &clustering, options)?;
    let (final_triangles, final_clustering) =
        overdraw::apply_cluster_order(&cached, &clustering, &order)?;

    Ok(Optimized {
        triangles: final_triangles,
        cluster_count: final_clustering.cluster_count(),
        triangle_remap: final_clustering.triangle_remap,
    })
}

/// Run the fast fused pipeline.
///
/// A single vertex-cache pass over the whole mesh produces the triangle
/// order; cluster boundaries fall out of its cache-miss structure, with
/// `alpha >= 1` steering how aggressively clusters are subdivided (larger
/// values cut sooner, giving the overdraw sort more, smaller clusters to
/// work with); the clusters are then sorted geometrically. Much cheaper
/// than [`optimize`] and usually close on vertex-cache quality, at some
/// cost in overdraw quality.
pub fn fast_optimize(
    positions: &[Point3<f32>],
    triangles: &[[u32; 3]],
    alpha: f32,
    options: &OptimizeOptions,
) -> Result<Optimized> {
    validate_mesh(positions.len(), triangles)?;
    validate_options(options)?;
    if !alpha.is_finite() || alpha < 1.0 {
        return Err(Error::invalid_param(
            "alpha",
            alpha,
            "must be at least 1.0",
        ));
    }

    let (cached, permutation) = vcache::optimize_cache(
        triangles,
        positions.len(),
        options.cache_size,
        options.vcache_strategy,
    )?;

    let mut cluster_starts = overdraw::cache_miss_cluster_starts(
        &cached,
        positions.len(),
        options.cache_size,
        alpha,
    );
    cluster_starts.push(cached.len() as u32);

    let mut cluster_ids = Vec::new();
    cluster_ids.try_reserve_exact(cached.len())?;
    for k in 0..cluster_starts.len() - 1 {
        let len = (cluster_starts[k + 1] - cluster_starts[k]) as usize;
        cluster_ids.extend(std::iter::repeat(k as u32).take(len));
    }

    let clustering = Clustering {
        cluster_ids,
        cluster_starts,
        triangle_remap: permutation,
    };
    clustering.check(cached.len())?;

    let order = overdraw::fast_cluster_order(positions, &cached, &clustering);
    let (final_triangles, final_clustering) =
        overdraw::apply_cluster_order(&cached, &clustering, &order)?;

    Ok(Optimized {
        triangles: final_triangles,
        cluster_count: final_clustering.cluster_count(),
        triangle_remap: final_clustering.triangle_remap,
    })
}

/// Expose the clusterer alone.
///
/// Returns the triangle array sorted by cluster and the partition
/// description. `target_clusters` is a hint; see
/// [`cluster_triangles`](crate::algo::cluster::cluster_triangles).
pub fn cluster_mesh(
    positions: &[Point3<f32>],
    triangles: &[[u32; 3]],
    target_clusters: usize,
) -> Result<(Vec<[u32; 3]>, Clustering)> {
    validate_mesh(positions.len(), triangles)?;

    let soup = TriangleSoup::new(positions, triangles)?;
    let adjacency = MeshAdjacency::build(&soup)?;
    let normals = soup.face_normals()?;
    let options = ClusterOptions::default().with_target_clusters(target_clusters);
    cluster_triangles(&soup, &adjacency, &normals, &options)
}

/// Reorder triangles for the post-transform cache within each cluster of
/// an existing partition.
pub fn vcache_clusters(
    triangles: &[[u32; 3]],
    vertex_count: usize,
    cache_size: u32,
    clustering: &Clustering,
    strategy: CacheStrategy,
) -> Result<Vec<[u32; 3]>> {
    validate_mesh(vertex_count, triangles)?;
    let (out, _) =
        vcache::optimize_cache_clusters(triangles, vertex_count, cache_size, clustering, strategy)?;
    Ok(out)
}

/// Reorder a whole index buffer for the post-transform cache, ignoring
/// clusters.
pub fn optimize_vertex_cache(
    triangles: &[[u32; 3]],
    vertex_count: usize,
    cache_size: u32,
    strategy: CacheStrategy,
) -> Result<Vec<[u32; 3]>> {
    validate_mesh(vertex_count, triangles)?;
    let (out, _) = vcache::optimize_cache(triangles, vertex_count, cache_size, strategy)?;
    Ok(out)
}

/// Reorder the clusters of a partitioned mesh to reduce overdraw.
///
/// The triangle array must already be contiguous by cluster (the output of
/// [`cluster_mesh`] or [`vcache_clusters`]). Triangle order within each
/// cluster is preserved.
pub fn optimize_overdraw(
    positions: &[Point3<f32>],
    triangles: &[[u32; 3]],
    clustering: &Clustering,
    options: &OptimizeOptions,
) -> Result<(Vec<[u32; 3]>, Clustering)> {
    validate_mesh(positions.len(), triangles)?;
    validate_options(options)?;
    clustering.check(triangles.len())?;

    let order = cluster_draw_order(positions, triangles, clustering, options)?;
    overdraw::apply_cluster_order(triangles, clustering, &order)
}

/// Permute vertex storage into first-use order of the index stream.
///
/// Returns the reordered vertex array, the rewritten index buffer, and
/// the old-to-new remap table. Callers with additional per-vertex
/// attribute streams apply the same remap to each of them with
/// [`apply_remap`](crate::algo::remap::apply_remap); the inverse table
/// comes from [`invert_remap`](crate::algo::remap::invert_remap).
pub fn optimize_vertex_memory<V: Clone>(
    vertices: &[V],
    triangles: &[[u32; 3]],
) -> Result<(Vec<V>, Vec<[u32; 3]>, Vec<u32>)> {
    validate_mesh(vertices.len(), triangles)?;

    let vertex_remap = remap::first_use_remap(triangles, vertices.len())?;
    let vertices_out = remap::apply_remap(vertices, &vertex_remap)?;

    let mut triangles_out = Vec::new();
    triangles_out.try_reserve_exact(triangles.len())?;
    triangles_out.extend_from_slice(triangles);
    remap::remap_triangles(&mut triangles_out, &vertex_remap);

    Ok((vertices_out, triangles_out, vertex_remap))
}

/// Measure the average cache miss ratio of an index buffer under a FIFO
/// post-transform cache.
pub fn measure_cache_efficiency(triangles: &[[u32; 3]], cache_size: u32) -> Result<f32> {
    if triangles.is_empty() {
        return Err(Error::EmptyMesh);
    }
    if cache_size < 3 {
        return Err(Error::invalid_param(
            "cache_size",
            cache_size,
            "must be at least 3",
        ));
    }
    Ok(vcache::measure_cache_efficiency(triangles, cache_size))
}

/// Measure average and maximum overdraw from the configured viewpoints.
pub fn measure_overdraw(
    positions: &[Point3<f32>],
    triangles: &[[u32; 3]],
    options: &OptimizeOptions,
) -> Result<(f32, f32)> {
    validate_mesh(positions.len(), triangles)?;
    validate_options(options)?;

    let soup = TriangleSoup::new(positions, triangles)?;
    let normals = soup.face_normals()?;
    overdraw::measure(&soup, &normals, &options.trace_options())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tetrahedron() -> (Vec<Point3<f32>>, Vec<[u32; 3]>) {
        (
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
                Point3::new(0.0, 0.0, 1.0),
            ],
            vec![[0, 1, 2], [0, 1, 3], [0, 2, 3], [1, 2, 3]],
        )
    }

    fn grid(n: usize) -> (Vec<Point3<f32>>, Vec<[u32; 3]>) {
        let mut positions = Vec::with_capacity((n + 1) * (n + 1));
        let mut triangles = Vec::with_capacity(n * n * 2);

        for j in 0..=n {
            for i in 0..=n {
                positions.push(Point3::new(i as f32, j as f32, 0.0));
            }
        }

        for j in 0..n {
            for i in 0..n {
                let v00 = (j * (n + 1) + i) as u32;
                let v10 = v00 + 1;
                let v01 = v00 + (n + 1) as u32;
                let v11 = v01 + 1;

                triangles.push([v00, v10, v11]);
                triangles.push([v00, v11, v01]);
            }
        }

        (positions, triangles)
    }

    fn triangle_multiset(triangles: &[[u32; 3]]) -> Vec<[u32; 3]> {
        let mut set: Vec<[u32; 3]> = triangles
            .iter()
            .map(|t| {
                let mut s = *t;
                s.sort_unstable();
                s
            })
            .collect();
        set.sort_unstable();
        set
    }

    fn test_options() -> OptimizeOptions {
        OptimizeOptions::default().with_resolution(64)
    }

    #[test]
    fn tetrahedron_end_to_end() {
        let (positions, triangles) = tetrahedron();
        let options = test_options();

        let acmr_in = measure_cache_efficiency(&triangles, options.cache_size).unwrap();
        let result = optimize(&positions, &triangles, &options).unwrap();

        assert_eq!(result.cluster_count, 1);
        assert_eq!(
            triangle_multiset(&triangles),
            triangle_multiset(&result.triangles)
        );

        let acmr_out =
            measure_cache_efficiency(&result.triangles, options.cache_size).unwrap();
        assert!(acmr_out <= acmr_in);

        // A convex solid contributes one or two front hits per covered
        // pixel depending on the winding mix; a ray grazing a shared edge
        // can register on both adjacent faces, so allow one extra.
        let (avg, max) = measure_overdraw(&positions, &result.triangles, &options).unwrap();
        assert!(avg >= 1.0, "avg {avg}");
        assert!(avg <= 2.0, "avg {avg}");
        assert!(max <= 3.0, "max {max}");
    }

    #[test]
    fn disjoint_triangles_keep_tiebreak_order() {
        let positions = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(5.0, 0.0, 0.0),
            Point3::new(6.0, 0.0, 0.0),
            Point3::new(5.0, 1.0, 0.0),
        ];
        let triangles = vec![[0, 1, 2], [3, 4, 5]];

        let (clustered, clustering) = cluster_mesh(&positions, &triangles, 0).unwrap();
        assert_eq!(clustering.cluster_count(), 2);

        // Coplanar side-by-side triangles never occlude each other, so the
        // overdraw matrix is all zeros and the tie-break keeps id order.
        let soup = TriangleSoup::new(&positions, &clustered).unwrap();
        let normals = soup.face_normals().unwrap();
        let matrix = overdraw::overdraw_matrix(
            &soup,
            &normals,
            &clustering.cluster_ids,
            2,
            &test_options().trace_options(),
        )
        .unwrap();
        for i in 0..2 {
            for j in 0..2 {
                assert_eq!(matrix.at(i, j), 0);
            }
        }

        let result = optimize(&positions, &triangles, &test_options()).unwrap();
        assert_eq!(result.cluster_count, 2);
        assert_eq!(result.triangles, triangles);
    }

    #[test]
    fn grid_end_to_end() {
        let (positions, triangles) = grid(32);
        let viewpoints = vec![
            Vector3::new(0.0, 0.0, 1.0),
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(1.0, 1.0, 1.0).normalize(),
        ];
        let options = test_options().with_viewpoints(viewpoints);

        let acmr_in = measure_cache_efficiency(&triangles, options.cache_size).unwrap();
        let (overdraw_in, _) = measure_overdraw(&positions, &triangles, &options).unwrap();

        let result = optimize(&positions, &triangles, &options).unwrap();
        assert_eq!(
            triangle_multiset(&triangles),
            triangle_multiset(&result.triangles)
        );

        let acmr_out =
            measure_cache_efficiency(&result.triangles, options.cache_size).unwrap();
        assert!(acmr_out <= acmr_in, "acmr {acmr_out} vs {acmr_in}");
        assert!(acmr_out < 1.2, "acmr {acmr_out}");

        let (overdraw_out, _) =
            measure_overdraw(&positions, &result.triangles, &options).unwrap();
        assert!(overdraw_out <= overdraw_in + 1e-3);
    }

    #[test]
    fn degenerate_triangle_survives_the_pipeline() {
        let (positions, mut triangles) = tetrahedron();
        triangles.push([1, 1, 2]);

        let result = optimize(&positions, &triangles, &test_options()).unwrap();
        assert_eq!(result.cluster_count, 2);
        assert!(result.triangles.contains(&[1, 1, 2]));
        assert_eq!(
            triangle_multiset(&triangles),
            triangle_multiset(&result.triangles)
        );
    }

    #[test]
    fn optimize_is_deterministic() {
        let (positions, triangles) = grid(8);
        let a = optimize(&positions, &triangles, &test_options()).unwrap();
        let b = optimize(&positions, &triangles, &test_options()).unwrap();
        assert_eq!(a.triangles, b.triangles);
        assert_eq!(a.triangle_remap, b.triangle_remap);
    }

    #[test]
    fn cancellation_aborts_the_ray_trace() {
        let (positions, triangles) = tetrahedron();
        let options = test_options().with_cancel(CancelToken::new(|| true));
        assert!(matches!(
            optimize(&positions, &triangles, &options),
            Err(Error::Cancelled)
        ));
    }

    #[test]
    fn triangle_remap_maps_output_to_input() {
        let (positions, triangles) = grid(6);
        let result = optimize(&positions, &triangles, &test_options()).unwrap();

        let mut seen = vec![false; triangles.len()];
        for (slot, &src) in result.triangle_remap.iter().enumerate() {
            assert!(!seen[src as usize]);
            seen[src as usize] = true;
            assert_eq!(result.triangles[slot], triangles[src as usize]);
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn overdraw_pass_draws_the_occluder_first() {
        // Two stacked triangles; the input draws back before front.
        let positions = vec![
            Point3::new(-1.0, -1.0, -0.5),
            Point3::new(1.0, -1.0, -0.5),
            Point3::new(0.0, 1.0, -0.5),
            Point3::new(-1.0, -1.0, 0.5),
            Point3::new(1.0, -1.0, 0.5),
            Point3::new(0.0, 1.0, 0.5),
        ];
        let triangles = vec![[0, 1, 2], [3, 4, 5]];

        let (clustered, clustering) = cluster_mesh(&positions, &triangles, 0).unwrap();
        assert_eq!(clustering.cluster_count(), 2);

        let options = test_options().with_viewpoints(vec![Vector3::new(0.0, 0.0, 1.0)]);
        let (out, updated) =
            optimize_overdraw(&positions, &clustered, &clustering, &options).unwrap();

        assert_eq!(out[0], [3, 4, 5]);
        assert_eq!(out[1], [0, 1, 2]);
        assert_eq!(updated.cluster_count(), 2);
    }

    #[test]
    fn fast_optimize_improves_the_grid() {
        let (positions, triangles) = grid(32);
        let options = test_options();

        let acmr_in = measure_cache_efficiency(&triangles, options.cache_size).unwrap();
        let result = fast_optimize(&positions, &triangles, 1.05, &options).unwrap();

        assert!(result.cluster_count >= 1);
        assert_eq!(
            triangle_multiset(&triangles),
            triangle_multiset(&result.triangles)
        );

        let acmr_out =
            measure_cache_efficiency(&result.triangles, options.cache_size).unwrap();
        assert!(acmr_out <= acmr_in, "acmr {acmr_out} vs {acmr_in}");
        assert!(acmr_out < 1.2, "acmr {acmr_out}");
    }

    #[test]
    fn fast_optimize_rejects_alpha_below_one() {
        let (positions, triangles) = tetrahedron();
        assert!(matches!(
            fast_optimize(&positions, &triangles, 0.75, &test_options()),
            Err(Error::InvalidParameter { .. })
        ));
    }

    #[test]
    fn vertex_memory_round_trip() {
        let (positions, triangles) = grid(4);
        // Leave a couple of vertices unreferenced.
        let mut extended = positions.clone();
        extended.push(Point3::new(100.0, 0.0, 0.0));
        extended.push(Point3::new(101.0, 0.0, 0.0));

        let (vertices_out, triangles_out, vertex_remap) =
            optimize_vertex_memory(&extended, &triangles).unwrap();

        let inverse = remap::invert_remap(&vertex_remap).unwrap();
        let restored = remap::apply_remap(&vertices_out, &inverse).unwrap();
        assert_eq!(extended, restored);

        // Indices rewritten through the remap reference the same points.
        for (tri_in, tri_out) in triangles.iter().zip(triangles_out.iter()) {
            for (&a, &b) in tri_in.iter().zip(tri_out.iter()) {
                assert_eq!(extended[a as usize], vertices_out[b as usize]);
            }
        }

        // The first referenced vertex lands in slot zero.
        assert_eq!(triangles_out[0][0], 0);
    }

    #[test]
    fn invalid_arguments_are_rejected() {
        let (positions, triangles) = tetrahedron();

        assert!(matches!(
            optimize(
                &positions,
                &triangles,
                &OptimizeOptions::default().with_cache_size(2)
            ),
            Err(Error::InvalidParameter { .. })
        ));

        assert!(matches!(
            optimize(
                &positions,
                &triangles,
                &test_options().with_viewpoints(vec![Vector3::new(0.0, 0.0, 2.0)])
            ),
            Err(Error::InvalidParameter { .. })
        ));

        assert!(matches!(
            optimize(&positions, &[[0, 1, 9]], &test_options()),
            Err(Error::InvalidVertexIndex { .. })
        ));

        assert!(matches!(
            optimize(&positions, &[], &test_options()),
            Err(Error::EmptyMesh)
        ));
    }

    #[test]
    fn empty_clustering_is_not_clustered() {
        let (_, triangles) = tetrahedron();
        let empty = Clustering {
            cluster_ids: Vec::new(),
            cluster_starts: Vec::new(),
            triangle_remap: Vec::new(),
        };
        assert!(matches!(
            vcache_clusters(&triangles, 4, 24, &empty, CacheStrategy::Auto),
            Err(Error::NotClustered)
        ));
    }

    #[test]
    fn whole_mesh_vertex_cache_entry_point() {
        let (_, triangles) = grid(8);
        let out = optimize_vertex_cache(&triangles, 81, 16, CacheStrategy::Auto).unwrap();
        assert_eq!(triangle_multiset(&triangles), triangle_multiset(&out));
    }
}
