//! Vertex memory remapping.
//!
//! Once the final triangle order is fixed, vertex storage is permuted so
//! that vertices appear in the order the index stream first references
//! them. Sequential first-use order is what vertex-buffer prefetchers
//! reward. Unreferenced vertices are appended after the referenced ones in
//! their original relative order, so the remap is a bijection over the
//! whole vertex array.

use crate::error::Result;

const UNMAPPED: u32 = u32::MAX;

/// Compute the first-use vertex remap for an index stream.
///
/// Returns `remap` with `remap[old] = new` for every vertex. Referenced
/// vertices are numbered in order of first appearance in `triangles`;
/// unreferenced vertices follow in their original order.
pub fn first_use_remap(triangles: &[[u32; 3]], vertex_count: usize) -> Result<Vec<u32>> {
    let mut remap = Vec::new();
    remap.try_reserve_exact(vertex_count)?;
    remap.resize(vertex_count, UNMAPPED);

    let mut next = 0u32;
    for tri in triangles {
        for &v in tri {
            let slot = &mut remap[v as usize];
            if *slot == UNMAPPED {
                *slot = next;
                next += 1;
            }
        }
    }

    for slot in &mut remap {
        if *slot == UNMAPPED {
            *slot = next;
            next += 1;
        }
    }

    debug_assert_eq!(next as usize, vertex_count);
    Ok(remap)
}

/// Invert a remap table: `inverse[remap[i]] == i`.
pub fn invert_remap(remap: &[u32]) -> Result<Vec<u32>> {
    let mut inverse = Vec::new();
    inverse.try_reserve_exact(remap.len())?;
    inverse.resize(remap.len(), 0u32);

    for (old, &new) in remap.iter().enumerate() {
        inverse[new as usize] = old as u32;
    }

    Ok(inverse)
}

/// Reorder a vertex attribute array by a remap table.
///
/// `output[remap[i]] = vertices[i]`. Works for positions and any external
/// per-vertex attribute stream of the same length.
pub fn apply_remap<V: Clone>(vertices: &[V], remap: &[u32]) -> Result<Vec<V>> {
    debug_assert_eq!(vertices.len(), remap.len());

    if vertices.is_empty() {
        return Ok(Vec::new());
    }

    let mut output = Vec::new();
    output.try_reserve_exact(vertices.len())?;
    output.resize(vertices.len(), vertices[0].clone());

    for (v, &new) in vertices.iter().zip(remap.iter()) {
        output[new as usize] = v.clone();
    }

    Ok(output)
}

/// Rewrite an index array in place through a remap table.
pub fn remap_triangles(triangles: &mut [[u32; 3]], remap: &[u32]) {
    for tri in triangles {
        for v in tri {
            *v = remap[*v as usize];
        }
    }
}
