//! Join working mesh: a self-contained subset of faces and vertices with
//! local and global numbering, built for one joining operation and
//! discarded at the end.

use crate::comm::{Communicator, Wait};
use crate::error::FvMeshError;
use crate::math::BIG;
use crate::parall;
use crate::topology::adjacency::Csr;
use crate::topology::mesh::Mesh;
use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// Life-cycle tag of a join vertex.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum VertexState {
    Undefined = 0,
    Origin = 1,
    New = 2,
    Periodic = 3,
    Merge = 4,
    Split = 5,
    PerioMerge = 6,
}

/// Compact vertex payload exchanged between ranks during joining.
///
/// `repr(C)` and `Pod` so a slice can be widened to `u64` words for the
/// wire, avoiding per-byte transfer overhead.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct JoinVertex {
    state: u32,
    _pad: u32,
    pub gnum: u64,
    pub tolerance: f64,
    pub coord: [f64; 3],
}

impl JoinVertex {
    pub fn new(state: VertexState, gnum: u64, tolerance: f64, coord: [f64; 3]) -> Self {
        Self {
            state: state as u32,
            _pad: 0,
            gnum,
            tolerance,
            coord,
        }
    }

    #[inline]
    pub fn state(&self) -> VertexState {
        match self.state {
            1 => VertexState::Origin,
            2 => VertexState::New,
            3 => VertexState::Periodic,
            4 => VertexState::Merge,
            5 => VertexState::Split,
            6 => VertexState::PerioMerge,
            _ => VertexState::Undefined,
        }
    }

    #[inline]
    pub fn set_state(&mut self, state: VertexState) {
        self.state = state as u32;
    }
}

#[cfg(test)]
mod layout_tests {
    use super::*;
    use static_assertions::const_assert_eq;

    // The widened wire packing relies on a u64-divisible size.
    const_assert_eq!(std::mem::size_of::<JoinVertex>() % 8, 0);
}

/// Self-contained face/vertex subset handled by one joining operation.
#[derive(Clone, Debug, Default)]
pub struct JoinMesh {
    pub name: String,
    pub face_gnum: Vec<u64>,
    /// Face rings over local join-vertex indices.
    pub face_vtx: Csr,
    pub vertices: Vec<JoinVertex>,
    /// Parent mesh vertex id per (pre-fusion) join vertex.
    pub parent_vtx: Vec<usize>,
    pub n_g_faces: u64,
    pub n_g_vertices: u64,
}

impl JoinMesh {
    #[inline]
    pub fn n_faces(&self) -> usize {
        self.face_gnum.len()
    }

    #[inline]
    pub fn n_vertices(&self) -> usize {
        self.vertices.len()
    }

    /// Extract the selected boundary faces of `mesh` into a working mesh
    /// with compact local vertex numbering.
    pub fn from_selection(name: &str, mesh: &Mesh, face_list: &[usize]) -> Self {
        let mut local_id = vec![usize::MAX; mesh.n_vertices()];
        let mut vertices = Vec::new();
        let mut parent_vtx = Vec::new();
        let mut rows: Vec<Vec<usize>> = Vec::with_capacity(face_list.len());
        let mut face_gnum = Vec::with_capacity(face_list.len());

        for &f in face_list {
            let mut ring = Vec::with_capacity(mesh.b_face_vtx.row_len(f));
            for &v in mesh.b_face_vtx.row(f) {
                if local_id[v] == usize::MAX {
                    local_id[v] = vertices.len();
                    vertices.push(JoinVertex::new(
                        VertexState::Origin,
                        mesh.global_vtx_num[v],
                        0.0,
                        mesh.vtx_coord[v],
                    ));
                    parent_vtx.push(v);
                }
                ring.push(local_id[v]);
            }
            rows.push(ring);
            face_gnum.push(
                mesh.global_b_face_num
                    .as_ref()
                    .map_or(f as u64 + 1, |g| g[f]),
            );
        }

        JoinMesh {
            name: name.to_string(),
            face_gnum,
            face_vtx: Csr::from_rows(rows),
            n_g_faces: face_list.len() as u64,
            n_g_vertices: vertices.len() as u64,
            vertices,
            parent_vtx,
        }
    }

    /// Log the global min/max vertex tolerance of the working mesh.
    pub fn log_minmax_tolerance(&self) {
        let mut tmin = BIG;
        let mut tmax = -BIG;
        for v in &self.vertices {
            tmin = tmin.min(v.tolerance);
            tmax = tmax.max(v.tolerance);
        }
        log::info!("join mesh `{}`: tolerance min {tmin:e}, max {tmax:e}", self.name);
    }

    /// Redistribute faces across ranks by a block distribution of their
    /// global numbering, so every rank holds a contiguous slab. Vertex
    /// payloads ride along, widened to `u64` words on the wire.
    pub fn exchange<C: Communicator>(&self, comm: &C) -> Result<JoinMesh, FvMeshError> {
        let size = comm.size();
        if size <= 1 {
            return Ok(self.clone());
        }
        let me = comm.rank();

        let mut n_g_faces = self.face_gnum.iter().copied().max().unwrap_or(0);
        n_g_faces = parall::allreduce(comm, n_g_faces, u64::max)?;
        let block = n_g_faces.div_ceil(size as u64).max(1);

        // Serialize each face (gnum, ring of vertices) for its block owner.
        let mut per_rank: Vec<Vec<u8>> = vec![Vec::new(); size];
        for f in 0..self.n_faces() {
            let dest = (((self.face_gnum[f] - 1) / block) as usize).min(size - 1);
            let buf = &mut per_rank[dest];
            buf.extend_from_slice(&self.face_gnum[f].to_le_bytes());
            let ring = self.face_vtx.row(f);
            buf.extend_from_slice(&(ring.len() as u64).to_le_bytes());
            for &v in ring {
                let words: [u64; 6] = bytemuck::cast(self.vertices[v]);
                for w in words {
                    buf.extend_from_slice(&w.to_le_bytes());
                }
            }
        }

        // Size exchange, then payload exchange.
        let tag_size = comm.next_collective_tag();
        let tag_data = comm.next_collective_tag();
        let mut recv_sizes = Vec::new();
        for peer in 0..size {
            if peer == me {
                continue;
            }
            let mut buf = [0u8; 8];
            recv_sizes.push((peer, comm.irecv(peer, tag_size, &mut buf)));
        }
        for peer in 0..size {
            if peer == me {
                continue;
            }
            comm.isend(peer, tag_size, &(per_rank[peer].len() as u64).to_le_bytes())
                .wait();
        }
        let mut incoming: Vec<(usize, usize)> = Vec::new();
        for (peer, h) in recv_sizes {
            let data = h.wait().ok_or_else(|| FvMeshError::Comm {
                neighbor: peer,
                detail: "size exchange returned no data".into(),
            })?;
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&data[..8]);
            incoming.push((peer, u64::from_le_bytes(raw) as usize));
        }

        let mut recv_data = Vec::new();
        for &(peer, n) in &incoming {
            if n == 0 {
                continue;
            }
            let mut buf = vec![0u8; n];
            recv_data.push((peer, comm.irecv(peer, tag_data, &mut buf)));
        }
        for peer in 0..size {
            if peer == me || per_rank[peer].is_empty() {
                continue;
            }
            comm.isend(peer, tag_data, &per_rank[peer]).wait();
        }

        // Decode the local slab plus everything received.
        let mut out = JoinMesh {
            name: self.name.clone(),
            n_g_faces,
            ..Default::default()
        };
        let decode = |bytes: &[u8], out: &mut JoinMesh| {
            let mut at = 0usize;
            while at < bytes.len() {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&bytes[at..at + 8]);
                let gnum = u64::from_le_bytes(raw);
                at += 8;
                raw.copy_from_slice(&bytes[at..at + 8]);
                let ring_len = u64::from_le_bytes(raw) as usize;
                at += 8;
                let mut ring = Vec::with_capacity(ring_len);
                for _ in 0..ring_len {
                    let mut words = [0u64; 6];
                    for w in words.iter_mut() {
                        raw.copy_from_slice(&bytes[at..at + 8]);
                        *w = u64::from_le_bytes(raw);
                        at += 8;
                    }
                    let vtx: JoinVertex = bytemuck::cast(words);
                    ring.push(out.vertices.len());
                    out.vertices.push(vtx);
                    out.parent_vtx.push(usize::MAX);
                }
                out.face_gnum.push(gnum);
                out.face_vtx.ids.extend_from_slice(&ring);
                out.face_vtx.idx.push(out.face_vtx.ids.len());
            }
        };
        out.face_vtx = Csr::with_rows(0);
        decode(&per_rank[me], &mut out);
        for (peer, h) in recv_data {
            let data = h.wait().ok_or_else(|| FvMeshError::Comm {
                neighbor: peer,
                detail: "face exchange returned no data".into(),
            })?;
            decode(&data, &mut out);
        }

        // Collapse duplicated vertices by global number.
        let mut by_gnum: hashbrown::HashMap<u64, usize> = hashbrown::HashMap::new();
        let mut o2n = vec![0usize; out.vertices.len()];
        let mut compact: Vec<JoinVertex> = Vec::new();
        let mut parent: Vec<usize> = Vec::new();
        for (i, v) in out.vertices.iter().enumerate() {
            let id = *by_gnum.entry(v.gnum).or_insert_with(|| {
                compact.push(*v);
                parent.push(out.parent_vtx[i]);
                compact.len() - 1
            });
            // Keep the tightest tolerance among duplicates.
            compact[id].tolerance = compact[id].tolerance.min(v.tolerance);
            o2n[i] = id;
        }
        for id in out.face_vtx.ids.iter_mut() {
            *id = o2n[*id];
        }
        out.n_g_vertices = compact.len() as u64;
        out.vertices = compact;
        out.parent_vtx = parent;

        Ok(out)
    }
}
