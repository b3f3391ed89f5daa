//! Edge view of a join mesh.
//!
//! Every consecutive ordered pair of a face ring becomes an undirected
//! edge, canonicalized so the smaller global vertex id comes first;
//! duplicates are removed and the result carries a vertex → incident-edge
//! adjacency with signed edge ids (sign = storage direction relative to
//! the query direction).

use crate::error::FvMeshError;
use crate::join::mesh::JoinMesh;
use itertools::Itertools;

/// Canonical edge table plus signed vertex adjacency.
#[derive(Clone, Debug, Default)]
pub struct JoinEdges {
    /// Edge endpoints, smaller global vertex id first.
    pub def: Vec<[usize; 2]>,
    /// Global edge numbering (contiguous over the canonical order).
    pub gnum: Vec<u64>,
    /// Vertex → incident edge index.
    pub vtx_idx: Vec<usize>,
    /// Adjacent vertex per incidence.
    pub adj_vtx: Vec<usize>,
    /// Signed 1-based edge number per incidence: positive when the
    /// stored edge runs from this vertex to the adjacent one.
    pub edge_ids: Vec<i64>,
}

impl JoinEdges {
    #[inline]
    pub fn n_edges(&self) -> usize {
        self.def.len()
    }

    /// Build the edge view of a join mesh.
    pub fn define(mesh: &JoinMesh) -> Self {
        let n_vertices = mesh.n_vertices();

        // Collect every ring edge canonicalized by global vertex id.
        let mut pairs: Vec<[usize; 2]> = Vec::with_capacity(mesh.face_vtx.ids.len());
        for f in 0..mesh.n_faces() {
            let ring = mesh.face_vtx.row(f);
            let n = ring.len();
            for k in 0..n {
                let (v1, v2) = (ring[k], ring[(k + 1) % n]);
                if mesh.vertices[v1].gnum > mesh.vertices[v2].gnum {
                    pairs.push([v2, v1]);
                } else {
                    pairs.push([v1, v2]);
                }
            }
        }
        pairs.sort_by_key(|&[a, b]| (mesh.vertices[a].gnum, mesh.vertices[b].gnum));
        let def: Vec<[usize; 2]> = pairs.into_iter().dedup().collect();
        let gnum: Vec<u64> = (1..=def.len() as u64).collect();

        // Vertex -> incident edges, both directions.
        let mut vtx_idx = vec![0usize; n_vertices + 1];
        for &[a, b] in &def {
            vtx_idx[a + 1] += 1;
            vtx_idx[b + 1] += 1;
        }
        for v in 0..n_vertices {
            vtx_idx[v + 1] += vtx_idx[v];
        }
        let mut adj_vtx = vec![0usize; vtx_idx[n_vertices]];
        let mut edge_ids = vec![0i64; vtx_idx[n_vertices]];
        let mut cursor = vtx_idx.clone();
        for (e, &[a, b]) in def.iter().enumerate() {
            let num = e as i64 + 1;
            adj_vtx[cursor[a]] = b;
            edge_ids[cursor[a]] = num;
            cursor[a] += 1;
            adj_vtx[cursor[b]] = a;
            edge_ids[cursor[b]] = -num;
            cursor[b] += 1;
        }

        JoinEdges {
            def,
            gnum,
            vtx_idx,
            adj_vtx,
            edge_ids,
        }
    }

    /// Signed edge id joining `v1` and `v2`: positive if the stored edge
    /// runs `v1 -> v2`, negative otherwise. A missing pair is a fatal
    /// topology inconsistency.
    pub fn edge_id(&self, v1: usize, v2: usize) -> Result<i64, FvMeshError> {
        if v1 >= self.vtx_idx.len() - 1 || v2 >= self.vtx_idx.len() - 1 {
            return Err(FvMeshError::EdgeLookup { v1, v2 });
        }
        for k in self.vtx_idx[v1]..self.vtx_idx[v1 + 1] {
            if self.adj_vtx[k] == v2 {
                return Ok(self.edge_ids[k]);
            }
        }
        Err(FvMeshError::EdgeLookup { v1, v2 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::join::mesh::JoinMesh;
    use crate::meshgen::structured_box;

    fn zmin_join_mesh() -> JoinMesh {
        let mesh = structured_box(2, 2, 1, [1.0, 1.0, 1.0]);
        let fam = mesh.families.iter().position(|g| g == "zmin").unwrap() as i32 + 2;
        let sel: Vec<usize> = (0..mesh.n_b_faces())
            .filter(|&f| mesh.b_face_family[f] == fam)
            .collect();
        JoinMesh::from_selection("zmin", &mesh, &sel)
    }

    #[test]
    fn shared_ring_edges_are_deduplicated() {
        let jm = zmin_join_mesh();
        let edges = JoinEdges::define(&jm);
        // A 2x2 quad patch has 12 distinct edges (4 + 4 + 4 shared).
        assert_eq!(edges.n_edges(), 12);
        assert_eq!(edges.gnum.len(), 12);
    }

    #[test]
    fn lookup_sign_encodes_direction() {
        let jm = zmin_join_mesh();
        let edges = JoinEdges::define(&jm);
        let [a, b] = edges.def[0];
        let fwd = edges.edge_id(a, b).unwrap();
        let rev = edges.edge_id(b, a).unwrap();
        assert_eq!(fwd, 1);
        assert_eq!(rev, -1);
    }

    #[test]
    fn missing_pair_is_an_error() {
        let jm = zmin_join_mesh();
        let edges = JoinEdges::define(&jm);
        // Vertex 0 and the last-registered corner share no ring edge.
        let far = jm.n_vertices() - 1;
        assert!(edges.edge_id(0, far).is_err());
        // Out-of-range ids are rejected rather than read past the table.
        assert!(edges.edge_id(0, jm.n_vertices() + 5).is_err());
    }
}
