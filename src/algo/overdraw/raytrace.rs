//! Software overdraw ray tracer.
//!
//! Simulates early-Z rasterization from a set of viewpoints by shooting a
//! regular grid of parallel rays at the mesh and recording every
//! front-facing surface each ray passes through. With a cluster assignment
//! the hits accumulate into the pairwise [`OverdrawMatrix`]; without one
//! the tracer reports scalar average and maximum overdraw.
//!
//! The mesh is recentered on its bounding-box center and scaled so its
//! bounding sphere has radius one, so a fixed camera rig covers any input.
//! Rays traverse a median-split BVH; for a fixed mesh, viewpoint set and
//! resolution the output is bit-reproducible, including on the parallel
//! path, because per-viewpoint partial sums are integers.

use nalgebra::{Point3, Vector3};
use rayon::prelude::*;

use crate::algo::overdraw::{OverdrawMatrix, TraceOptions};
use crate::error::{Error, Result};
use crate::mesh::{FaceWinding, TriangleSoup};

/// Triangles per BVH leaf.
const LEAF_SIZE: usize = 8;

/// Canonical viewpoint set: the 12 vertices and 20 normalized face
/// centroids of the icosahedron, 32 unit directions in a fixed order.
///
/// Used whenever the caller supplies no viewpoints of their own.
pub fn canonical_viewpoints() -> Vec<Vector3<f32>> {
    let phi = (1.0 + 5.0f32.sqrt()) / 2.0;

    let vertices = [
        Vector3::new(-1.0, phi, 0.0),
        Vector3::new(1.0, phi, 0.0),
        Vector3::new(-1.0, -phi, 0.0),
        Vector3::new(1.0, -phi, 0.0),
        Vector3::new(0.0, -1.0, phi),
        Vector3::new(0.0, 1.0, phi),
        Vector3::new(0.0, -1.0, -phi),
        Vector3::new(0.0, 1.0, -phi),
        Vector3::new(phi, 0.0, -1.0),
        Vector3::new(phi, 0.0, 1.0),
        Vector3::new(-phi, 0.0, -1.0),
        Vector3::new(-phi, 0.0, 1.0),
    ];

    const FACES: [[usize; 3]; 20] = [
        [0, 11, 5],
        [0, 5, 1],
        [0, 1, 7],
        [0, 7, 10],
        [0, 10, 11],
        [1, 5, 9],
        [5, 11, 4],
        [11, 10, 2],
        [10, 7, 6],
        [7, 1, 8],
        [3, 9, 4],
        [3, 4, 2],
        [3, 2, 6],
        [3, 6, 8],
        [3, 8, 9],
        [4, 9, 5],
        [2, 4, 11],
        [6, 2, 10],
        [8, 6, 7],
        [9, 8, 1],
    ];

    let mut points: Vec<Vector3<f32>> = vertices.iter().map(|v| v.normalize()).collect();
    for face in &FACES {
        let centroid = vertices[face[0]] + vertices[face[1]] + vertices[face[2]];
        points.push(centroid.normalize());
    }

    points
}

/// One ray-triangle intersection.
#[derive(Debug, Clone, Copy)]
struct Hit {
    t: f32,
    triangle: u32,
}

#[derive(Debug, Clone, Copy)]
struct BvhNode {
    min: Point3<f32>,
    max: Point3<f32>,
    /// Child node index, or -1 for a leaf.
    left: i32,
    right: i32,
    /// Leaf range into the triangle order array.
    start: u32,
    count: u32,
}

/// The normalized mesh plus its acceleration structure.
struct Scene {
    positions: Vec<Point3<f32>>,
    triangles: Vec<[u32; 3]>,
    face_normals: Vec<Vector3<f32>>,
    nodes: Vec<BvhNode>,
    order: Vec<u32>,
    root: usize,
    epsilon: f32,
}

impl Scene {
    /// Normalize the mesh into the unit sphere and build the BVH.
    fn build(soup: &TriangleSoup, face_normals: &[Vector3<f32>]) -> Result<Self> {
        let (min, max) = soup.bounding_box();
        let center = nalgebra::center(&min, &max);

        let mut radius: f32 = 0.0;
        for p in &soup.positions {
            radius = radius.max((p - center).norm());
        }
        let scale = if radius > 0.0 { 1.0 / radius } else { 1.0 };

        let mut positions = Vec::new();
        positions.try_reserve_exact(soup.positions.len())?;
        for p in &soup.positions {
            positions.push(Point3::from((p - center) * scale));
        }

        // Normal directions survive the translate + uniform scale, so the
        // caller's face normals are reused as-is.
        let mut normalized = TriangleSoup::new(&positions, &soup.triangles)?;
        let epsilon = 1e-6 * normalized.characteristic_edge_length().max(0.0);

        let mut scene = Self {
            positions,
            triangles: soup.triangles.clone(),
            face_normals: face_normals.to_vec(),
            nodes: Vec::new(),
            order: (0..soup.triangle_count() as u32).collect(),
            root: 0,
            epsilon,
        };
        scene.build_bvh()?;

        Ok(scene)
    }

    fn triangle_bounds(&self, t: usize) -> (Point3<f32>, Point3<f32>) {
        let [a, b, c] = self.triangles[t];
        let pa = self.positions[a as usize];
        let pb = self.positions[b as usize];
        let pc = self.positions[c as usize];

        let mut min = pa;
        let mut max = pa;
        for p in [pb, pc] {
            for i in 0..3 {
                min[i] = min[i].min(p[i]);
                max[i] = max[i].max(p[i]);
            }
        }
        (min, max)
    }

    fn build_bvh(&mut self) -> Result<()> {
        let n = self.order.len();
        let mut bounds = Vec::new();
        bounds.try_reserve_exact(n)?;
        let mut centers = Vec::new();
        centers.try_reserve_exact(n)?;
        for t in 0..n {
            let b = self.triangle_bounds(t);
            centers.push(nalgebra::center(&b.0, &b.1));
            bounds.push(b);
        }

        let mut nodes = Vec::new();
        nodes.try_reserve(2 * n)?;
        let mut order = std::mem::take(&mut self.order);
        let root = build_node(&mut nodes, &mut order, &centers, &bounds, 0, n);
        self.order = order;
        self.nodes = nodes;
        self.root = root;
        Ok(())
    }

    /// Collect every intersection along a ray into `hits`, front-face
    /// culled by `winding`. Hits are left unsorted.
    fn collect_hits(
        &self,
        origin: &Point3<f32>,
        dir: &Vector3<f32>,
        winding: FaceWinding,
        hits: &mut Vec<Hit>,
        stack: &mut Vec<usize>,
    ) {
        hits.clear();
        if self.nodes.is_empty() {
            return;
        }

        let inv_dir = Vector3::new(1.0 / dir.x, 1.0 / dir.y, 1.0 / dir.z);

        stack.clear();
        stack.push(self.root);

        while let Some(node_idx) = stack.pop() {
            let node = &self.nodes[node_idx];
            if !slab_test(&node.min, &node.max, origin, &inv_dir) {
                continue;
            }

            if node.left < 0 {
                let start = node.start as usize;
                let end = start + node.count as usize;
                for &t in &self.order[start..end] {
                    if let Some(hit) = self.intersect(origin, dir, winding, t) {
                        hits.push(hit);
                    }
                }
            } else {
                stack.push(node.left as usize);
                stack.push(node.right as usize);
            }
        }
    }

    /// Barycentric ray-triangle test with front-face culling.
    fn intersect(
        &self,
        origin: &Point3<f32>,
        dir: &Vector3<f32>,
        winding: FaceWinding,
        t: u32,
    ) -> Option<Hit> {
        let n = self.face_normals[t as usize];
        let facing = n.dot(dir);
        let front = match winding {
            FaceWinding::CounterClockwise => facing < 0.0,
            FaceWinding::Clockwise => facing > 0.0,
        };
        if !front {
            return None;
        }

        let [a, b, c] = self.triangles[t as usize];
        let v0 = self.positions[a as usize];
        let e1 = self.positions[b as usize] - v0;
        let e2 = self.positions[c as usize] - v0;

        let pvec = dir.cross(&e2);
        let det = e1.dot(&pvec);
        if det.abs() <= self.epsilon {
            return None;
        }

        let inv_det = 1.0 / det;
        let tvec = origin - v0;
        let u = tvec.dot(&pvec) * inv_det;
        if !(0.0..=1.0).contains(&u) {
            return None;
        }

        let qvec = tvec.cross(&e1);
        let v = dir.dot(&qvec) * inv_det;
        if v < 0.0 || u + v > 1.0 {
            return None;
        }

        let t_hit = e2.dot(&qvec) * inv_det;
        if t_hit <= self.epsilon {
            return None;
        }

        Some(Hit {
            t: t_hit,
            triangle: t,
        })
    }
}

fn build_node(
    nodes: &mut Vec<BvhNode>,
    order: &mut [u32],
    centers: &[Point3<f32>],
    bounds: &[(Point3<f32>, Point3<f32>)],
    start: usize,
    end: usize,
) -> usize {
    let mut min = Point3::new(f32::INFINITY, f32::INFINITY, f32::INFINITY);
    let mut max = Point3::new(f32::NEG_INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY);
    for &t in &order[start..end] {
        let (tmin, tmax) = bounds[t as usize];
        for i in 0..3 {
            min[i] = min[i].min(tmin[i]);
            max[i] = max[i].max(tmax[i]);
        }
    }

    let count = end - start;
    if count <= LEAF_SIZE {
        nodes.push(BvhNode {
            min,
            max,
            left: -1,
            right: -1,
            start: start as u32,
            count: count as u32,
        });
        return nodes.len() - 1;
    }

    // Split at the median along the widest centroid axis; ties on the sort
    // key fall back to the triangle index so the tree is deterministic.
    let mut cmin = centers[order[start] as usize];
    let mut cmax = cmin;
    for &t in &order[start..end] {
        let c = centers[t as usize];
        for i in 0..3 {
            cmin[i] = cmin[i].min(c[i]);
            cmax[i] = cmax[i].max(c[i]);
        }
    }
    let extent = cmax - cmin;
    let mut axis = 0;
    if extent[1] > extent[0] {
        axis = 1;
    }
    if extent[2] > extent[axis] {
        axis = 2;
    }

    order[start..end].sort_unstable_by(|&a, &b| {
        centers[a as usize][axis]
            .total_cmp(&centers[b as usize][axis])
            .then_with(|| a.cmp(&b))
    });

    let mid = (start + end) / 2;
    let left = build_node(nodes, order, centers, bounds, start, mid);
    let right = build_node(nodes, order, centers, bounds, mid, end);

    nodes.push(BvhNode {
        min,
        max,
        left: left as i32,
        right: right as i32,
        start: start as u32,
        count: count as u32,
    });
    nodes.len() - 1
}

/// Slab test against an axis-aligned box, unlimited t range.
#[inline]
fn slab_test(
    min: &Point3<f32>,
    max: &Point3<f32>,
    origin: &Point3<f32>,
    inv_dir: &Vector3<f32>,
) -> bool {
    let mut t_near = 0.0f32;
    let mut t_far = f32::INFINITY;

    for i in 0..3 {
        let t1 = (min[i] - origin[i]) * inv_dir[i];
        let t2 = (max[i] - origin[i]) * inv_dir[i];
        t_near = t_near.max(t1.min(t2));
        t_far = t_far.min(t1.max(t2));
        if t_near > t_far {
            return false;
        }
    }

    true
}

/// Deterministic orthonormal camera basis for a viewpoint.
///
/// `w` looks from the viewpoint at the origin; the reference axis for `u`
/// is the coordinate axis least aligned with `w`, smallest index first on
/// ties.
fn viewpoint_basis(p: &Vector3<f32>) -> (Vector3<f32>, Vector3<f32>, Vector3<f32>) {
    let w = (-p).normalize();

    let mut smallest = 0;
    for i in 1..3 {
        if w[i].abs() < w[smallest].abs() {
            smallest = i;
        }
    }
    let mut reference = Vector3::zeros();
    reference[smallest] = 1.0;

    let u = reference.cross(&w).normalize();
    let v = w.cross(&u);
    (u, v, w)
}

/// Per-viewpoint scalar accumulation.
#[derive(Debug, Default, Clone, Copy)]
struct Coverage {
    covered: u64,
    shaded: u64,
    max: u32,
}

/// Shoot the ray grid for one viewpoint and fold each ray's sorted hits
/// through `accumulate`.
fn trace_viewpoint<A, F>(
    scene: &Scene,
    viewpoint: &Vector3<f32>,
    options: &TraceOptions,
    state: &mut A,
    accumulate: &F,
) -> Result<()>
where
    F: Fn(&mut A, &[Hit]),
{
    let (u, v, w) = viewpoint_basis(viewpoint);
    let eye = Point3::from(*viewpoint);
    let res = options.resolution;

    let mut hits: Vec<Hit> = Vec::with_capacity(64);
    let mut stack: Vec<usize> = Vec::with_capacity(64);

    for py in 0..res {
        if options.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let y = -1.0 + 2.0 * (py as f32 + 0.5) / res as f32;
        for px in 0..res {
            let x = -1.0 + 2.0 * (px as f32 + 0.5) / res as f32;
            if x * x + y * y > 1.0 {
                continue;
            }

            let origin = eye + u * x + v * y;
            scene.collect_hits(&origin, &w, options.winding, &mut hits, &mut stack);
            if hits.is_empty() {
                continue;
            }

            hits.sort_unstable_by(|a, b| a.t.total_cmp(&b.t).then_with(|| a.triangle.cmp(&b.triangle)));
            accumulate(state, &hits);
        }
    }

    Ok(())
}

/// Run every viewpoint, in parallel when allowed, and fold the integer
/// partial results in viewpoint order.
fn trace_all<A, F>(
    scene: &Scene,
    viewpoints: &[Vector3<f32>],
    options: &TraceOptions,
    make_state: impl Fn() -> A + Sync,
    accumulate: F,
) -> Result<Vec<A>>
where
    A: Send,
    F: Fn(&mut A, &[Hit]) + Sync,
{
    if options.parallel && viewpoints.len() > 1 {
        viewpoints
            .par_iter()
            .map(|vp| {
                let mut state = make_state();
                trace_viewpoint(scene, vp, options, &mut state, &accumulate)?;
                Ok(state)
            })
            .collect()
    } else {
        viewpoints
            .iter()
            .map(|vp| {
                let mut state = make_state();
                trace_viewpoint(scene, vp, options, &mut state, &accumulate)?;
                Ok(state)
            })
            .collect()
    }
}

/// Accumulate the pairwise cluster overdraw matrix over all viewpoints.
///
/// For every ordered pair of hits along a ray whose triangles lie in
/// different clusters, the (earlier, later) cluster cell is incremented.
pub fn overdraw_matrix(
    soup: &TriangleSoup,
    face_normals: &[Vector3<f32>],
    cluster_ids: &[u32],
    cluster_count: usize,
    options: &TraceOptions,
) -> Result<OverdrawMatrix> {
    let scene = Scene::build(soup, face_normals)?;
    let canonical;
    let viewpoints: &[Vector3<f32>] = if options.viewpoints.is_empty() {
        canonical = canonical_viewpoints();
        &canonical
    } else {
        &options.viewpoints
    };

    let partials = trace_all(
        &scene,
        viewpoints,
        options,
        || OverdrawMatrix::new(cluster_count),
        |matrix: &mut OverdrawMatrix, hits: &[Hit]| {
            for (a, first) in hits.iter().enumerate() {
                let ca = cluster_ids[first.triangle as usize];
                for second in &hits[a + 1..] {
                    let cb = cluster_ids[second.triangle as usize];
                    if ca != cb {
                        matrix.add(ca as usize, cb as usize, 1);
                    }
                }
            }
        },
    )?;

    let mut matrix = OverdrawMatrix::new(cluster_count);
    for partial in partials {
        matrix.merge(&partial);
    }

    Ok(matrix)
}

/// Measure scalar overdraw over all viewpoints.
///
/// Returns `(average, maximum)`: total front-facing hits divided by total
/// covered pixels, and the largest per-pixel hit count seen anywhere.
/// Returns `(0.0, 0.0)` when no ray hits the mesh.
pub fn measure(
    soup: &TriangleSoup,
    face_normals: &[Vector3<f32>],
    options: &TraceOptions,
) -> Result<(f32, f32)> {
    let scene = Scene::build(soup, face_normals)?;
    let canonical;
    let viewpoints: &[Vector3<f32>] = if options.viewpoints.is_empty() {
        canonical = canonical_viewpoints();
        &canonical
    } else {
        &options.viewpoints
    };

    let partials = trace_all(
        &scene,
        viewpoints,
        options,
        Coverage::default,
        |coverage: &mut Coverage, hits: &[Hit]| {
            coverage.covered += 1;
            coverage.shaded += hits.len() as u64;
            coverage.max = coverage.max.max(hits.len() as u32);
        },
    )?;

    let mut total = Coverage::default();
    for partial in partials {
        total.covered += partial.covered;
        total.shaded += partial.shaded;
        total.max = total.max.max(partial.max);
    }

    if total.covered == 0 {
        return Ok((0.0, 0.0));
    }

    Ok((
        total.shaded as f32 / total.covered as f32,
        total.max as f32,
    ))
}
