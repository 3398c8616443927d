//! Mesh adjacency tables.
//!
//! Three tables cover every query the pipeline needs: the triangles around
//! a vertex, the triangles across each edge of a triangle, and the vertices
//! adjacent to a vertex. All three are derived from the index array alone
//! and are deterministic in triangle order.

use crate::error::Result;
use crate::mesh::TriangleSoup;

/// Vertex and triangle adjacency of a [`TriangleSoup`].
///
/// The across-edge and vertex-neighbor tables may contain duplicates when
/// two triangles share more than one incidence; consumers that need set
/// semantics must deduplicate. Counts are informational only.
#[derive(Debug, Clone)]
pub struct MeshAdjacency {
    /// For each vertex, the triangles incident to it, in triangle order.
    pub vertex_triangles: Vec<Vec<u32>>,
    /// For each triangle, the triangles sharing at least one edge with it.
    /// Never contains the triangle itself.
    pub across_edge: Vec<Vec<u32>>,
    /// For each vertex, the vertices connected to it by some triangle edge.
    pub vertex_neighbors: Vec<Vec<u32>>,
}

impl MeshAdjacency {
    /// Build all three adjacency tables for a soup.
    pub fn build(soup: &TriangleSoup) -> Result<Self> {
        let vertex_triangles = build_vertex_triangles(&soup.triangles, soup.vertex_count())?;
        let across_edge = build_across_edge(&soup.triangles, &vertex_triangles)?;
        let vertex_neighbors = build_vertex_neighbors(&soup.triangles, soup.vertex_count())?;

        Ok(Self {
            vertex_triangles,
            across_edge,
            vertex_neighbors,
        })
    }
}

/// For each vertex, collect the triangles that reference it.
pub fn build_vertex_triangles(triangles: &[[u32; 3]], vertex_count: usize) -> Result<Vec<Vec<u32>>> {
    let mut vt = Vec::new();
    vt.try_reserve_exact(vertex_count)?;
    vt.resize(vertex_count, Vec::new());

    for (t, tri) in triangles.iter().enumerate() {
        for &v in tri {
            vt[v as usize].push(t as u32);
        }
    }

    Ok(vt)
}

/// For each triangle, collect the triangles sharing at least one edge.
///
/// For each directed edge `(a, b)` of a triangle, every other triangle
/// around `a` that also contains `b` is emitted. A neighbor that shares an
/// edge and an extra incidence shows up more than once.
pub fn build_across_edge(
    triangles: &[[u32; 3]],
    vertex_triangles: &[Vec<u32>],
) -> Result<Vec<Vec<u32>>> {
    let mut ae = Vec::new();
    ae.try_reserve_exact(triangles.len())?;
    ae.resize(triangles.len(), Vec::new());

    for (t, tri) in triangles.iter().enumerate() {
        for i in 0..3 {
            let a = tri[i];
            let b = tri[(i + 1) % 3];

            for &other in &vertex_triangles[a as usize] {
                if other as usize == t {
                    continue;
                }
                for &w in &triangles[other as usize] {
                    if w == b {
                        ae[t].push(other);
                    }
                }
            }
        }
    }

    Ok(ae)
}

/// For each vertex, collect the vertices connected to it by a triangle edge.
pub fn build_vertex_neighbors(triangles: &[[u32; 3]], vertex_count: usize) -> Result<Vec<Vec<u32>>> {
    let mut vv = Vec::new();
    vv.try_reserve_exact(vertex_count)?;
    vv.resize(vertex_count, Vec::new());

    for tri in triangles {
        vv[tri[0] as usize].push(tri[1]);
        vv[tri[1] as usize].push(tri[0]);
        vv[tri[1] as usize].push(tri[2]);
        vv[tri[2] as usize].push(tri[1]);
        vv[tri[2] as usize].push(tri[0]);
        vv[tri[0] as usize].push(tri[2]);
    }

    Ok(vv)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;

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
    fn vertex_triangles_covers_every_incidence() {
        let soup = tetrahedron();
        let adjacency = MeshAdjacency::build(&soup).unwrap();

        assert_eq!(adjacency.vertex_triangles.len(), 4);
        // Each tetrahedron vertex touches exactly three faces.
        for vt in &adjacency.vertex_triangles {
            assert_eq!(vt.len(), 3);
        }
        assert_eq!(adjacency.vertex_triangles[0], vec![0, 1, 2]);
    }

    #[test]
    fn across_edge_never_contains_self_and_shares_a_vertex() {
        let soup = tetrahedron();
        let adjacency = MeshAdjacency::build(&soup).unwrap();

        assert_eq!(adjacency.across_edge.len(), 4);
        for (t, neighbors) in adjacency.across_edge.iter().enumerate() {
            for &n in neighbors {
                assert_ne!(n as usize, t);
                let tri = soup.triangles[t];
                let other = soup.triangles[n as usize];
                let shared = tri
                    .iter()
                    .filter(|v| other.contains(v))
                    .count();
                assert!(shared >= 1);
            }
        }
        // Every tetrahedron face borders the other three.
        for neighbors in &adjacency.across_edge {
            let mut unique: Vec<u32> = neighbors.clone();
            unique.sort_unstable();
            unique.dedup();
            assert_eq!(unique.len(), 3);
        }
    }

    #[test]
    fn disjoint_triangles_have_no_across_edge_neighbors() {
        let positions = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(5.0, 0.0, 0.0),
            Point3::new(6.0, 0.0, 0.0),
            Point3::new(5.0, 1.0, 0.0),
        ];
        let soup = TriangleSoup::new(&positions, &[[0, 1, 2], [3, 4, 5]]).unwrap();
        let adjacency = MeshAdjacency::build(&soup).unwrap();

        assert!(adjacency.across_edge[0].is_empty());
        assert!(adjacency.across_edge[1].is_empty());
    }

    #[test]
    fn vertex_neighbors_includes_both_edge_directions() {
        let positions = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let soup = TriangleSoup::new(&positions, &[[0, 1, 2]]).unwrap();
        let adjacency = MeshAdjacency::build(&soup).unwrap();

        assert_eq!(adjacency.vertex_neighbors[0], vec![1, 2]);
        assert_eq!(adjacency.vertex_neighbors[1], vec![0, 2]);
        assert_eq!(adjacency.vertex_neighbors[2], vec![1, 0]);
    }
}
