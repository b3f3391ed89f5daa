//! Face joining: fusing two families of coincident boundary faces.
//!
//! The operation extracts the selected faces into a self-contained
//! working mesh, computes per-vertex merge tolerances (globally reduced
//! by minimum), fuses mutually-in-tolerance vertices transitively,
//! simplifies the resulting polygon rings, and stitches the coincident
//! face pairs back into the parent mesh as interior faces.

pub mod edges;
pub mod merge;
pub mod mesh;

pub use edges::JoinEdges;
pub use mesh::{JoinMesh, JoinVertex, VertexState};

use crate::comm::Communicator;
use crate::error::FvMeshError;
use crate::halo::Halo;
use crate::topology::INVALID_ID;
use crate::topology::mesh::{DEFAULT_FAMILY_ID, Mesh, ModifiedFlags};
use hashbrown::HashMap;

/// Tolerance computation mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ToleranceMode {
    /// `tol = fraction * min(incident edge length)`.
    EdgeLength,
    /// `tol = fraction * min(edge length * sin(angle to neighbour edge))`,
    /// tighter in flat configurations.
    EdgeLengthSine,
}

/// User parameters of one joining operation.
#[derive(Clone, Debug)]
pub struct JoinParam {
    /// Fraction of the characteristic local edge length.
    pub fraction: f64,
    /// Tolerance computation mode.
    pub tcm: ToleranceMode,
    pub verbosity: i32,
}

impl Default for JoinParam {
    fn default() -> Self {
        Self {
            fraction: 0.1,
            tcm: ToleranceMode::EdgeLength,
            verbosity: 0,
        }
    }
}

/// Outcome of a joining operation.
#[derive(Clone, Copy, Debug, Default)]
pub struct JoinStats {
    pub n_fused_vertices: usize,
    pub n_joined_face_pairs: usize,
    pub n_simplified_faces: usize,
}

/// Join the boundary faces of two groups judged to coincide.
///
/// Fused faces become interior faces between their owner cells; faces
/// that find no partner keep their boundary status. Raises the geometry
/// and balance flags and rebuilds the halo from the interface set when
/// one is attached.
pub fn join_faces<C: Communicator>(
    comm: &C,
    mesh: &mut Mesh,
    param: &JoinParam,
    group_a: &str,
    group_b: &str,
) -> Result<JoinStats, FvMeshError> {
    if param.fraction <= 0.0 || param.fraction >= 1.0 {
        return Err(FvMeshError::config(format!(
            "joining fraction {} outside (0, 1)",
            param.fraction
        )));
    }

    let fam_a = mesh.family_id(group_a);
    let fam_b = mesh.family_id(group_b);
    let selection: Vec<usize> = (0..mesh.n_b_faces())
        .filter(|&f| mesh.b_face_family[f] == fam_a || mesh.b_face_family[f] == fam_b)
        .collect();
    if selection.is_empty() {
        return Ok(JoinStats::default());
    }

    let mut join_mesh = JoinMesh::from_selection("join", mesh, &selection);

    // Tolerances, local then globally reduced by minimum.
    merge::compute_tolerance(&mut join_mesh, param)?;
    merge::sync_tolerance(comm, &mut join_mesh.vertices)?;
    if param.verbosity > 0 {
        join_mesh.log_minmax_tolerance();
    }

    // Fuse candidate vertices and simplify the rings.
    let fusion = merge::merge_vertices(&mut join_mesh)?;
    let n_simplified = merge::simplify_rings(&mut join_mesh.face_vtx, Some(&join_mesh.face_gnum))?;

    // Carry the fusion back to the parent mesh vertices.
    let mut parent_o2n: Vec<usize> = (0..mesh.n_vertices()).collect();
    for (jv, &rep) in fusion.old_to_new.iter().enumerate() {
        let pv = join_mesh.parent_vtx[jv];
        let pr = join_mesh.parent_vtx[fusion.representative[rep]];
        parent_o2n[pv] = pr;
        if pv == pr {
            mesh.vtx_coord[pv] = join_mesh.vertices[rep].coord;
        }
    }
    for id in mesh.i_face_vtx.ids.iter_mut() {
        *id = parent_o2n[*id];
    }
    for id in mesh.b_face_vtx.ids.iter_mut() {
        *id = parent_o2n[*id];
    }
    merge::simplify_rings(&mut mesh.i_face_vtx, mesh.global_i_face_num.as_deref())?;
    merge::simplify_rings(&mut mesh.b_face_vtx, mesh.global_b_face_num.as_deref())?;

    // Pair up selected faces whose rings now coincide.
    let mut by_signature: HashMap<Vec<usize>, Vec<usize>> = HashMap::new();
    for &f in &selection {
        let mut sig = mesh.b_face_vtx.row(f).to_vec();
        sig.sort_unstable();
        by_signature.entry(sig).or_default().push(f);
    }

    let mut n_pairs = 0usize;
    let mut removed: Vec<usize> = Vec::new();
    for (sig, faces) in by_signature.iter() {
        if faces.len() < 2 {
            continue;
        }
        if faces.len() > 2 {
            return Err(FvMeshError::topology(format!(
                "{} boundary faces share the vertex set {:?} after joining",
                faces.len(),
                sig
            )));
        }
        let (fa, fb) = (faces[0], faces[1]);
        let ring = mesh.b_face_vtx.row(fa).to_vec();
        let (ca, cb) = (mesh.b_face_cells[fa], mesh.b_face_cells[fb]);
        if ca == cb {
            return Err(FvMeshError::topology(format!(
                "joined faces {fa} and {fb} share the owner cell {ca}"
            )));
        }
        // Boundary normals point outward, so the ring of face A points
        // from its owner toward B's owner.
        mesh.i_face_vtx.ids.extend_from_slice(&ring);
        mesh.i_face_vtx.idx.push(mesh.i_face_vtx.ids.len());
        mesh.i_face_cells.push([ca, cb]);
        mesh.i_face_family.push(DEFAULT_FAMILY_ID);
        removed.push(fa);
        removed.push(fb);
        n_pairs += 1;
    }
    for f in removed {
        mesh.b_face_cells[f] = INVALID_ID;
    }
    mesh.discard_free_faces();
    compact_vertices(mesh);
    mesh.global_i_face_num = None;
    mesh.global_b_face_num = None;

    let mut flags = ModifiedFlags::GEOMETRY;
    flags.insert(ModifiedFlags::BALANCE);
    mesh.mark_modified(flags);

    if let Some(ifs) = mesh.interfaces.clone() {
        mesh.halo = Some(Halo::from_interface_set(
            mesh.n_cells,
            &ifs,
            mesh.periodicity.as_ref(),
        )?);
    }

    log::info!(
        "face joining `{group_a}`/`{group_b}`: {} vertices fused, {} face pairs joined",
        fusion.n_fused,
        n_pairs
    );

    Ok(JoinStats {
        n_fused_vertices: fusion.n_fused,
        n_joined_face_pairs: n_pairs,
        n_simplified_faces: n_simplified,
    })
}

/// Drop vertices no longer referenced by any face and compact numbering.
fn compact_vertices(mesh: &mut Mesh) {
    let n = mesh.n_vertices();
    let mut used = vec![false; n];
    for &v in mesh.i_face_vtx.ids.iter().chain(mesh.b_face_vtx.ids.iter()) {
        used[v] = true;
    }
    if used.iter().all(|&u| u) {
        return;
    }
    let mut o2n = vec![INVALID_ID; n];
    let mut coords = Vec::new();
    let mut gnum = Vec::new();
    for v in 0..n {
        if used[v] {
            o2n[v] = coords.len();
            coords.push(mesh.vtx_coord[v]);
            gnum.push(mesh.global_vtx_num[v]);
        }
    }
    mesh.vtx_coord = coords;
    mesh.global_vtx_num = gnum;
    for id in mesh.i_face_vtx.ids.iter_mut() {
        *id = o2n[*id];
    }
    for id in mesh.b_face_vtx.ids.iter_mut() {
        *id = o2n[*id];
    }
}
