//! Indexed triangle soup.
//!
//! The soup is the shared input of every pipeline stage: a flat vertex
//! position array plus an index array of triangle triples. It carries no
//! connectivity; adjacency is built separately and lazily (see
//! [`MeshAdjacency`](crate::mesh::MeshAdjacency)).

use nalgebra::{Matrix4, Point3, Vector3};

use crate::error::{Error, Result};

/// Front-face winding of the input mesh.
///
/// The winding only matters to the overdraw ray tracer, which culls faces
/// whose winding-adjusted normal points away from the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FaceWinding {
    /// Clockwise triangles are front-facing.
    Clockwise,
    /// Counter-clockwise triangles are front-facing.
    #[default]
    CounterClockwise,
}

/// Maximum number of triangles sampled when estimating the characteristic
/// edge length.
const EDGE_LENGTH_SAMPLES: usize = 333;

/// An indexed triangle mesh without connectivity.
///
/// Positions and triangles are owned; algorithms borrow the soup immutably
/// and own their scratch buffers. Degenerate triangles (repeated vertex
/// indices) are allowed and flow through the pipeline; they get a zero
/// face normal and form singleton clusters.
#[derive(Debug, Clone)]
pub struct TriangleSoup {
    /// Vertex positions.
    pub positions: Vec<Point3<f32>>,
    /// Triangle vertex index triples.
    pub triangles: Vec<[u32; 3]>,
    /// Cached characteristic edge length, negative while unknown.
    resolution: f32,
}

impl TriangleSoup {
    /// Build a soup from borrowed vertex and index data.
    ///
    /// Validates that both arrays are non-empty and that every index is in
    /// range. Degenerate triangles are accepted.
    pub fn new(positions: &[Point3<f32>], triangles: &[[u32; 3]]) -> Result<Self> {
        if positions.is_empty() || triangles.is_empty() {
            return Err(Error::EmptyMesh);
        }

        for (t, tri) in triangles.iter().enumerate() {
            for &v in tri {
                if v as usize >= positions.len() {
                    return Err(Error::InvalidVertexIndex {
                        triangle: t,
                        vertex: v as usize,
                    });
                }
            }
        }

        let mut pos = Vec::new();
        pos.try_reserve_exact(positions.len())?;
        pos.extend_from_slice(positions);

        let mut tris = Vec::new();
        tris.try_reserve_exact(triangles.len())?;
        tris.extend_from_slice(triangles);

        Ok(Self {
            positions: pos,
            triangles: tris,
            resolution: -1.0,
        })
    }

    /// Number of vertices.
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Number of triangles.
    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    /// The three corner positions of triangle `t`.
    #[inline]
    pub fn corners(&self, t: usize) -> [Point3<f32>; 3] {
        let [a, b, c] = self.triangles[t];
        [
            self.positions[a as usize],
            self.positions[b as usize],
            self.positions[c as usize],
        ]
    }

    /// Unit face normal per triangle.
    ///
    /// Uses `normalize((p0 - p1) x (p1 - p2))`. Degenerate triangles yield
    /// the zero vector; downstream stages treat those as isolated.
    pub fn face_normals(&self) -> Result<Vec<Vector3<f32>>> {
        let mut normals = Vec::new();
        normals.try_reserve_exact(self.triangles.len())?;

        for t in 0..self.triangles.len() {
            let [p0, p1, p2] = self.corners(t);
            let n = (p0 - p1).cross(&(p1 - p2));
            let len = n.norm();
            normals.push(if len > 0.0 { n / len } else { Vector3::zeros() });
        }

        Ok(normals)
    }

    /// Area-weighted unit normal per vertex.
    ///
    /// Accumulates the unnormalized face cross products onto each corner
    /// vertex and normalizes at the end, so large faces dominate.
    pub fn vertex_normals(&self) -> Result<Vec<Vector3<f32>>> {
        let mut normals = Vec::new();
        normals.try_reserve_exact(self.positions.len())?;
        normals.resize(self.positions.len(), Vector3::zeros());

        for tri in &self.triangles {
            let p0 = self.positions[tri[0] as usize];
            let p1 = self.positions[tri[1] as usize];
            let p2 = self.positions[tri[2] as usize];
            let n = (p0 - p1).cross(&(p1 - p2));
            for &v in tri {
                normals[v as usize] += n;
            }
        }

        for n in &mut normals {
            let len = n.norm();
            if len > 0.0 {
                *n /= len;
            }
        }

        Ok(normals)
    }

    /// Centroid per triangle.
    pub fn triangle_centers(&self) -> Result<Vec<Point3<f32>>> {
        let mut centers = Vec::new();
        centers.try_reserve_exact(self.triangles.len())?;

        for t in 0..self.triangles.len() {
            let [p0, p1, p2] = self.corners(t);
            centers.push(Point3::from((p0.coords + p1.coords + p2.coords) / 3.0));
        }

        Ok(centers)
    }

    /// Axis-aligned bounding box as `(min, max)`.
    pub fn bounding_box(&self) -> (Point3<f32>, Point3<f32>) {
        let mut min = self.positions[0];
        let mut max = self.positions[0];
        for p in &self.positions[1..] {
            for i in 0..3 {
                min[i] = min[i].min(p[i]);
                max[i] = max[i].max(p[i]);
            }
        }
        (min, max)
    }

    /// Characteristic edge length of the mesh.
    ///
    /// The square root of the median squared edge length over up to 333
    /// sampled triangles (with replacement, deterministic LCG seeded at
    /// zero). The result is cached; call again to reuse it for free.
    /// Returns -1.0 when the soup holds no triangles and no cached value.
    pub fn characteristic_edge_length(&mut self) -> f32 {
        let nf = self.triangles.len();

        if nf < 1 || self.resolution > 0.0 {
            return self.resolution;
        }

        let nsamp = (nf / 2).clamp(1, EDGE_LENGTH_SAMPLES);
        let mut samples = Vec::with_capacity(nsamp * 3);

        let mut randq: u32 = 0;
        for _ in 0..nsamp {
            randq = 1664525u32.wrapping_mul(randq).wrapping_add(1013904223);
            let [p0, p1, p2] = self.corners(randq as usize % nf);
            samples.push((p0 - p1).norm_squared());
            samples.push((p1 - p2).norm_squared());
            samples.push((p2 - p0).norm_squared());
        }

        let mid = samples.len() / 2;
        samples.select_nth_unstable_by(mid, |a, b| a.total_cmp(b));
        self.resolution = samples[mid].sqrt();
        self.resolution
    }

    /// Remove triangle `i` by swapping it with the last triangle.
    ///
    /// Out-of-range indices are ignored. The triangle order past `i` is not
    /// preserved.
    pub fn remove_triangle(&mut self, i: usize) {
        if i < self.triangles.len() {
            self.triangles.swap_remove(i);
        }
    }

    /// Transform all vertex positions by an affine matrix.
    ///
    /// Normal arrays must be re-derived or transformed separately with
    /// [`transform_normals`].
    pub fn transform(&mut self, m: &Matrix4<f32>) {
        for p in &mut self.positions {
            *p = m.transform_point(p);
        }
        self.resolution = -1.0;
    }
}

/// Transform an array of unit normals by the inverse-transpose of `m`.
///
/// Applies to vertex normal and face normal arrays alike; the result is
/// renormalized so non-uniform scales keep normals unit length. A singular
/// transform leaves the array untouched.
pub fn transform_normals(normals: &mut [Vector3<f32>], m: &Matrix4<f32>) {
    let linear = m.fixed_view::<3, 3>(0, 0).into_owned();
    let Some(inverse) = linear.try_inverse() else {
        return;
    };
    let normal_matrix = inverse.transpose();

    for n in normals.iter_mut() {
        let mapped = normal_matrix * *n;
        let len = mapped.norm();
        if len > 0.0 {
            *n = mapped / len;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Matrix4;

    fn tetrahedron() -> TriangleSoup {
        let positions = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
        ];
        let triangles = vec![[0, 1, 2], [0, 1, 3], [0, 2, 3], [1, 2, 3]];
        TriangleSoup::new(&positions, &triangles).unwrap()
    }

    #[test]
    fn rejects_empty_mesh() {
        let positions = [Point3::new(0.0, 0.0, 0.0)];
        assert!(matches!(
            TriangleSoup::new(&positions, &[]),
            Err(Error::EmptyMesh)
        ));
        assert!(matches!(
            TriangleSoup::new(&[], &[[0, 0, 0]]),
            Err(Error::EmptyMesh)
        ));
    }

    #[test]
    fn rejects_out_of_range_index() {
        let positions = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let err = TriangleSoup::new(&positions, &[[0, 1, 5]]).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidVertexIndex {
                triangle: 0,
                vertex: 5
            }
        ));
    }

    #[test]
    fn face_normals_are_unit_length() {
        let soup = tetrahedron();
        let normals = soup.face_normals().unwrap();
        assert_eq!(normals.len(), 4);
        for n in &normals {
            assert!((n.norm() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn vertex_normals_average_incident_faces() {
        let positions = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let soup = TriangleSoup::new(&positions, &[[0, 1, 2]]).unwrap();
        let normals = soup.vertex_normals().unwrap();
        for n in &normals {
            assert!((n - Vector3::new(0.0, 0.0, 1.0)).norm() < 1e-6);
        }
    }

    #[test]
    fn triangle_centers_are_centroids() {
        let soup = tetrahedron();
        let centers = soup.triangle_centers().unwrap();
        assert_eq!(centers.len(), 4);
        let expected = Point3::new(1.0 / 3.0, 1.0 / 3.0, 0.0);
        assert!((centers[0] - expected).norm() < 1e-6);
    }

    #[test]
    fn degenerate_triangle_gets_zero_normal() {
        let positions = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let soup = TriangleSoup::new(&positions, &[[0, 1, 2], [0, 0, 1]]).unwrap();
        let normals = soup.face_normals().unwrap();
        assert_eq!(normals[1], Vector3::zeros());
    }

    #[test]
    fn edge_length_is_deterministic_and_cached() {
        let mut a = tetrahedron();
        let mut b = tetrahedron();
        let first = a.characteristic_edge_length();
        assert!(first > 0.0);
        assert_eq!(first, b.characteristic_edge_length());
        assert_eq!(first, a.characteristic_edge_length());
    }

    #[test]
    fn remove_triangle_swaps_with_last() {
        let mut soup = tetrahedron();
        soup.remove_triangle(0);
        assert_eq!(soup.triangle_count(), 3);
        assert_eq!(soup.triangles[0], [1, 2, 3]);
    }

    #[test]
    fn remove_triangle_out_of_range_is_noop() {
        let mut soup = tetrahedron();
        soup.remove_triangle(4);
        assert_eq!(soup.triangle_count(), 4);
        soup.remove_triangle(usize::MAX);
        assert_eq!(soup.triangle_count(), 4);
    }

    #[test]
    fn transform_normals_handles_nonuniform_scale() {
        // A plane in xy scaled differently in x and y keeps its +z normal.
        let mut normals = vec![Vector3::new(0.0, 0.0, 1.0)];
        let m = Matrix4::new_nonuniform_scaling(&Vector3::new(2.0, 3.0, 1.0));
        transform_normals(&mut normals, &m);
        assert!((normals[0] - Vector3::new(0.0, 0.0, 1.0)).norm() < 1e-6);

        // A shear of x by z tilts the x=0 plane, so its normal picks up a
        // z component and must stay unit length.
        let mut sheared = vec![Vector3::new(1.0, 0.0, 0.0)];
        let mut shear = Matrix4::identity();
        shear[(0, 2)] = 1.0;
        transform_normals(&mut sheared, &shear);
        assert!((sheared[0].norm() - 1.0).abs() < 1e-6);
        assert!(sheared[0].z.abs() > 1e-6);
    }

    #[test]
    fn transformed_positions_invalidate_edge_length() {
        let mut soup = tetrahedron();
        let before = soup.characteristic_edge_length();
        soup.transform(&Matrix4::new_scaling(2.0));
        let after = soup.characteristic_edge_length();
        assert!((after - 2.0 * before).abs() < 1e-5);
    }
}
