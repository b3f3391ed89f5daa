//! Vertex merge: tolerance computation, global tolerance reduction,
//! transitive fusion of in-tolerance vertices and polygon-ring cleanup.

use crate::comm::{Communicator, Wait};
use crate::error::FvMeshError;
use crate::join::mesh::{JoinMesh, JoinVertex, VertexState};
use crate::join::{JoinParam, ToleranceMode};
use crate::math::{self, BIG};
use crate::parall;
use crate::topology::adjacency::Csr;
use bytemuck::{Pod, Zeroable};
use hashbrown::HashMap;

/// One vertex tolerance on the wire, keyed by global number.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct GnumTol {
    gnum: u64,
    tolerance: f64,
}

/// Compute the local merge tolerance of every join vertex.
pub fn compute_tolerance(mesh: &mut JoinMesh, param: &JoinParam) -> Result<(), FvMeshError> {
    for v in mesh.vertices.iter_mut() {
        v.tolerance = BIG;
    }

    match param.tcm {
        ToleranceMode::EdgeLength => {
            for f in 0..mesh.n_faces() {
                let ring = mesh.face_vtx.row(f).to_vec();
                let n = ring.len();
                for k in 0..n {
                    let (a, b) = (ring[k], ring[(k + 1) % n]);
                    let length =
                        math::distance(mesh.vertices[a].coord, mesh.vertices[b].coord);
                    let tolerance = length * param.fraction;
                    let ta = &mut mesh.vertices[a].tolerance;
                    *ta = ta.min(tolerance);
                    let tb = &mut mesh.vertices[b].tolerance;
                    *tb = tb.min(tolerance);
                }
            }
        }
        ToleranceMode::EdgeLengthSine => {
            for f in 0..mesh.n_faces() {
                let ring = mesh.face_vtx.row(f).to_vec();
                let n = ring.len();
                for k in 0..n {
                    let v = ring[k];
                    let prev = ring[(k + n - 1) % n];
                    let next = ring[(k + 1) % n];
                    let e1 = math::sub(mesh.vertices[next].coord, mesh.vertices[v].coord);
                    let e2 = math::sub(mesh.vertices[prev].coord, mesh.vertices[v].coord);
                    let (l1, l2) = (math::norm(e1), math::norm(e2));
                    if l1 <= f64::MIN_POSITIVE || l2 <= f64::MIN_POSITIVE {
                        continue;
                    }
                    let sine = math::norm(math::cross(e1, e2)) / (l1 * l2);
                    let tolerance = l1.min(l2) * sine * param.fraction;
                    let tv = &mut mesh.vertices[v].tolerance;
                    *tv = tv.min(tolerance);
                }
            }
        }
    }
    Ok(())
}

/// Reduce vertex tolerances globally: the tolerance of a vertex seen by
/// several partitions is the minimum over all of them (fusion is
/// forbidden whenever any partition disagrees).
///
/// Vertices are block-distributed by global number; each rank reduces
/// its slab and answers the requesting ranks in their request order.
pub fn sync_tolerance<C: Communicator>(
    comm: &C,
    vertices: &mut [JoinVertex],
) -> Result<(), FvMeshError> {
    let size = comm.size();
    if size <= 1 {
        return Ok(());
    }
    let me = comm.rank();

    let mut n_g = vertices.iter().map(|v| v.gnum).max().unwrap_or(0);
    n_g = parall::allreduce(comm, n_g, u64::max)?;
    let block = n_g.div_ceil(size as u64).max(1);
    let owner = |gnum: u64| (((gnum - 1) / block) as usize).min(size - 1);

    // Request phase: each rank ships (gnum, tolerance) to the block owner.
    let mut requests: Vec<Vec<GnumTol>> = vec![Vec::new(); size];
    let mut request_pos: Vec<Vec<usize>> = vec![Vec::new(); size];
    for (i, v) in vertices.iter().enumerate() {
        let dest = owner(v.gnum);
        requests[dest].push(GnumTol {
            gnum: v.gnum,
            tolerance: v.tolerance,
        });
        request_pos[dest].push(i);
    }

    let incoming = exchange_gnum_tol(comm, &requests)?;

    // Reduce the slab by minimum.
    let mut slab: HashMap<u64, f64> = HashMap::new();
    for batch in incoming.iter() {
        for gt in batch.1.iter() {
            let e = slab.entry(gt.gnum).or_insert(f64::MAX);
            *e = e.min(gt.tolerance);
        }
    }
    for gt in requests[me].iter() {
        let e = slab.entry(gt.gnum).or_insert(f64::MAX);
        *e = e.min(gt.tolerance);
    }

    // Answer phase: replies mirror the request order of each source.
    let mut replies: Vec<Vec<GnumTol>> = vec![Vec::new(); size];
    for (src, batch) in incoming {
        replies[src] = batch
            .iter()
            .map(|gt| GnumTol {
                gnum: gt.gnum,
                tolerance: slab[&gt.gnum],
            })
            .collect();
    }
    replies[me] = requests[me]
        .iter()
        .map(|gt| GnumTol {
            gnum: gt.gnum,
            tolerance: slab[&gt.gnum],
        })
        .collect();

    let answers = exchange_gnum_tol(comm, &replies)?;

    for (src, batch) in answers.into_iter().chain(std::iter::once((me, replies[me].clone()))) {
        for (k, gt) in batch.into_iter().enumerate() {
            let i = request_pos[src][k];
            debug_assert_eq!(vertices[i].gnum, gt.gnum);
            vertices[i].tolerance = gt.tolerance;
        }
    }
    Ok(())
}

/// Variable-size all-to-all of `GnumTol` batches; returns one batch per
/// remote source rank.
fn exchange_gnum_tol<C: Communicator>(
    comm: &C,
    outgoing: &[Vec<GnumTol>],
) -> Result<Vec<(usize, Vec<GnumTol>)>, FvMeshError> {
    let size = comm.size();
    let me = comm.rank();
    let tag_size = comm.next_collective_tag();
    let tag_data = comm.next_collective_tag();

    let mut size_handles = Vec::new();
    for peer in 0..size {
        if peer == me {
            continue;
        }
        let mut buf = [0u8; 8];
        size_handles.push((peer, comm.irecv(peer, tag_size, &mut buf)));
    }
    for peer in 0..size {
        if peer == me {
            continue;
        }
        comm.isend(peer, tag_size, &(outgoing[peer].len() as u64).to_le_bytes())
            .wait();
    }
    let mut counts = Vec::new();
    for (peer, h) in size_handles {
        let data = h.wait().ok_or_else(|| FvMeshError::Comm {
            neighbor: peer,
            detail: "tolerance size exchange returned no data".into(),
        })?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&data[..8]);
        counts.push((peer, u64::from_le_bytes(raw) as usize));
    }

    let mut data_handles = Vec::new();
    for &(peer, n) in &counts {
        if n == 0 {
            continue;
        }
        let mut buf = vec![0u8; n * std::mem::size_of::<GnumTol>()];
        data_handles.push((peer, comm.irecv(peer, tag_data, &mut buf)));
    }
    for peer in 0..size {
        if peer == me || outgoing[peer].is_empty() {
            continue;
        }
        comm.isend(peer, tag_data, bytemuck::cast_slice(&outgoing[peer]))
            .wait();
    }

    let mut result = Vec::new();
    for (peer, h) in data_handles {
        let data = h.wait().ok_or_else(|| FvMeshError::Comm {
            neighbor: peer,
            detail: "tolerance exchange returned no data".into(),
        })?;
        result.push((peer, bytemuck::pod_collect_to_vec(&data)));
    }
    for (peer, n) in counts {
        if n == 0 {
            result.push((peer, Vec::new()));
        }
    }
    Ok(result)
}

/// Outcome of a vertex fusion pass.
#[derive(Clone, Debug, Default)]
pub struct Fusion {
    /// Pre-fusion join vertex -> post-fusion join vertex.
    pub old_to_new: Vec<usize>,
    /// Post-fusion join vertex -> the pre-fusion member it descends from.
    pub representative: Vec<usize>,
    pub n_fused: usize,
}

struct Dsu(Vec<usize>);

impl Dsu {
    fn new(n: usize) -> Self {
        Dsu((0..n).collect())
    }
    fn find(&mut self, x: usize) -> usize {
        let mut r = x;
        while self.0[r] != r {
            r = self.0[r];
        }
        let mut c = x;
        while self.0[c] != c {
            let next = self.0[c];
            self.0[c] = r;
            c = next;
        }
        r
    }
    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.0[ra.max(rb)] = ra.min(rb);
        }
    }
}

/// Fuse vertices that lie inside each other's tolerance sphere,
/// transitively over the candidate graph, and rewrite the face rings.
///
/// The merged vertex takes the smallest global id of its component, the
/// averaged coordinates and the minimum tolerance.
pub fn merge_vertices(mesh: &mut JoinMesh) -> Result<Fusion, FvMeshError> {
    let n = mesh.n_vertices();
    let max_tol = mesh
        .vertices
        .iter()
        .map(|v| v.tolerance)
        .fold(0.0, f64::max);
    if max_tol <= 0.0 || n == 0 {
        return Ok(Fusion {
            old_to_new: (0..n).collect(),
            representative: (0..n).collect(),
            n_fused: 0,
        });
    }

    // Uniform-grid candidate search: a fusible pair is never farther
    // apart than the largest tolerance.
    let h = max_tol;
    let key = |c: [f64; 3]| -> [i64; 3] {
        [
            (c[0] / h).floor() as i64,
            (c[1] / h).floor() as i64,
            (c[2] / h).floor() as i64,
        ]
    };
    let mut grid: HashMap<[i64; 3], Vec<usize>> = HashMap::new();
    for (i, v) in mesh.vertices.iter().enumerate() {
        grid.entry(key(v.coord)).or_default().push(i);
    }

    let mut dsu = Dsu::new(n);
    for (cell, members) in grid.iter() {
        for dx in -1..=1i64 {
            for dy in -1..=1i64 {
                for dz in -1..=1i64 {
                    let nb = [cell[0] + dx, cell[1] + dy, cell[2] + dz];
                    let Some(others) = grid.get(&nb) else {
                        continue;
                    };
                    for &a in members {
                        for &b in others {
                            if b <= a {
                                continue;
                            }
                            let va = &mesh.vertices[a];
                            let vb = &mesh.vertices[b];
                            let d = math::distance(va.coord, vb.coord);
                            // Symmetric condition: each vertex inside the
                            // other's tolerance sphere.
                            if d <= va.tolerance && d <= vb.tolerance {
                                dsu.union(a, b);
                            }
                        }
                    }
                }
            }
        }
    }

    // Gather components and elect representatives by smallest gnum.
    let comp_of: Vec<usize> = (0..n).map(|i| dsu.find(i)).collect();
    let mut members: HashMap<usize, Vec<usize>> = HashMap::new();
    for (i, &r) in comp_of.iter().enumerate() {
        members.entry(r).or_default().push(i);
    }

    let mut old_to_new = vec![usize::MAX; n];
    let mut representative = Vec::new();
    let mut merged: Vec<JoinVertex> = Vec::new();
    let mut n_fused = 0usize;

    for i in 0..n {
        let root = comp_of[i];
        if old_to_new[i] != usize::MAX {
            continue;
        }
        let group = &members[&root];
        let new_id = merged.len();
        let rep = *group
            .iter()
            .min_by_key(|&&m| mesh.vertices[m].gnum)
            .expect("non-empty component");

        let mut coord = [0.0; 3];
        let mut tol = f64::MAX;
        for &m in group {
            coord = math::add(coord, mesh.vertices[m].coord);
            tol = tol.min(mesh.vertices[m].tolerance);
            old_to_new[m] = new_id;
        }
        coord = math::scale(1.0 / group.len() as f64, coord);

        let mut v = mesh.vertices[rep];
        v.coord = coord;
        v.tolerance = tol;
        if group.len() > 1 {
            v.set_state(VertexState::Merge);
            n_fused += group.len() - 1;
        }
        merged.push(v);
        representative.push(rep);
    }

    for id in mesh.face_vtx.ids.iter_mut() {
        *id = old_to_new[*id];
    }
    mesh.vertices = merged;
    mesh.n_g_vertices = mesh.vertices.len() as u64;

    Ok(Fusion {
        old_to_new,
        representative,
        n_fused,
    })
}

/// Remove empty edges (`.. A A ..`) and degenerate edges
/// (`.. A B -B ..`, a ring edge traversed and immediately re-traversed
/// backwards) from every face ring, in repeated passes until stable.
///
/// Returns the number of modified faces; a ring dropping below 3
/// vertices aborts with a diagnostic naming the face.
pub fn simplify_rings(faces: &mut Csr, gnum: Option<&[u64]>) -> Result<usize, FvMeshError> {
    let n_faces = faces.n_rows();
    let mut n_modified = 0usize;
    let mut new_idx = Vec::with_capacity(n_faces + 1);
    let mut new_ids = Vec::with_capacity(faces.ids.len());
    new_idx.push(0usize);

    for f in 0..n_faces {
        let ring = faces.row(f);
        let n_init = ring.len();
        let face_gnum = gnum.map_or(f as u64 + 1, |g| g[f]);

        // Empty edges: drop consecutive duplicates, wrap included.
        let mut cur: Vec<usize> = Vec::with_capacity(n_init);
        if ring[n_init - 1] != ring[0] {
            cur.push(ring[0]);
        }
        for j in 0..n_init - 1 {
            if ring[j] != ring[j + 1] {
                cur.push(ring[j + 1]);
            }
        }
        if cur.len() < 3 {
            return Err(FvMeshError::DegenerateFace {
                face: f,
                gnum: face_gnum,
            });
        }

        // Degenerate edges: a vertex re-appearing two steps later marks
        // the traversed-then-reversed pair; several pairs may nest, so
        // run as many passes as needed on the same ring.
        loop {
            let n = cur.len();
            let mut kill = vec![false; n];
            let mut count = 0;
            for j in 0..n {
                if cur[j] == cur[(j + 2) % n] {
                    count += 1;
                    kill[j] = true;
                    kill[(j + 1) % n] = true;
                }
            }
            if count == 0 {
                break;
            }
            let next: Vec<usize> = cur
                .iter()
                .zip(kill.iter())
                .filter(|&(_, &k)| !k)
                .map(|(&v, _)| v)
                .collect();
            cur = next;
            if cur.len() < 3 {
                return Err(FvMeshError::DegenerateFace {
                    face: f,
                    gnum: face_gnum,
                });
            }
        }

        if cur.len() != n_init {
            n_modified += 1;
        }
        new_ids.extend_from_slice(&cur);
        new_idx.push(new_ids.len());
    }

    faces.idx = new_idx;
    faces.ids = new_ids;
    if n_modified > 0 {
        log::debug!("ring cleanup simplified {n_modified} faces");
    }
    Ok(n_modified)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::NoComm;
    use crate::join::mesh::{JoinMesh, JoinVertex, VertexState};
    use crate::topology::adjacency::Csr;

    fn two_quads_with_near_vertices(gap: f64) -> JoinMesh {
        // Quad 0 spans x in [0,1]; quad 1 abuts at x = 1 + gap with its
        // own duplicated edge vertices.
        let coords = [
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
            [1.0 + gap, 0.0, 0.0],
            [2.0, 0.0, 0.0],
            [2.0, 1.0, 0.0],
            [1.0 + gap, 1.0, 0.0],
        ];
        let vertices: Vec<JoinVertex> = coords
            .iter()
            .enumerate()
            .map(|(i, &c)| JoinVertex::new(VertexState::Origin, i as u64 + 1, 0.0, c))
            .collect();
        JoinMesh {
            name: "pair".into(),
            face_gnum: vec![1, 2],
            face_vtx: Csr::from_rows([[0usize, 1, 2, 3], [4, 5, 6, 7]]),
            parent_vtx: (0..8).collect(),
            n_g_faces: 2,
            n_g_vertices: 8,
            vertices,
        }
    }

    #[test]
    fn near_vertices_fuse_within_tolerance() {
        let mut jm = two_quads_with_near_vertices(1.0e-12);
        let param = JoinParam::default();
        compute_tolerance(&mut jm, &param).unwrap();
        sync_tolerance(&NoComm, &mut jm.vertices).unwrap();
        let fusion = merge_vertices(&mut jm).unwrap();
        assert_eq!(fusion.n_fused, 2);
        assert_eq!(jm.vertices.len(), 6);
        // The fused vertices carry the merge state and the smaller gnum.
        let merged: Vec<_> = jm
            .vertices
            .iter()
            .filter(|v| v.state() == VertexState::Merge)
            .collect();
        assert_eq!(merged.len(), 2);
        assert!(merged.iter().all(|v| v.gnum == 2 || v.gnum == 3));
    }

    #[test]
    fn distant_vertices_stay_apart() {
        let mut jm = two_quads_with_near_vertices(0.5);
        let param = JoinParam::default();
        compute_tolerance(&mut jm, &param).unwrap();
        let fusion = merge_vertices(&mut jm).unwrap();
        assert_eq!(fusion.n_fused, 0);
        assert_eq!(jm.vertices.len(), 8);
    }

    #[test]
    fn empty_edges_are_removed() {
        let mut faces = Csr::from_rows([vec![0usize, 0, 1, 2, 3, 3]]);
        let n = simplify_rings(&mut faces, None).unwrap();
        assert_eq!(n, 1);
        assert_eq!(faces.row(0), &[0, 1, 2, 3]);
    }

    #[test]
    fn degenerate_edges_are_removed() {
        // Ring 0 1 2 1 3: vertex 1 is revisited two steps later, so the
        // 2-1 spur collapses.
        let mut faces = Csr::from_rows([vec![0usize, 1, 2, 1, 3]]);
        let n = simplify_rings(&mut faces, None).unwrap();
        assert_eq!(n, 1);
        assert_eq!(faces.row(0), &[0, 1, 3]);
    }

    #[test]
    fn collapsing_below_three_vertices_fails() {
        let mut faces = Csr::from_rows([vec![0usize, 1, 1, 0]]);
        let err = simplify_rings(&mut faces, Some(&[42])).unwrap_err();
        match err {
            FvMeshError::DegenerateFace { gnum, .. } => assert_eq!(gnum, 42),
            other => panic!("unexpected error {other:?}"),
        }
    }
}
