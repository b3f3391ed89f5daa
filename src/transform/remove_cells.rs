//! Cell removal with automatic promotion of interior faces to boundary
//! faces.

use crate::comm::Communicator;
use crate::error::FvMeshError;
use crate::geometry::MeshQuantities;
use crate::halo::{Halo, HaloKind};
use crate::parall;
use crate::topology::INVALID_ID;
use crate::topology::mesh::{DEFAULT_FAMILY_ID, Mesh, ModifiedFlags};

/// Group assigned to the boundary created by negative-volume removal.
const NEG_VOLUME_GROUP: &str = "[join_neg_volume]";

/// Remove flagged cells.
///
/// Interior faces between a removed and a kept cell are promoted to
/// boundary faces owned by the kept cell, inheriting (when no
/// `group_name` overrides it) the family of a boundary face adjacent to
/// the removed cell. Interior faces between two removed cells and
/// boundary faces of removed cells are discarded. Kept cells are
/// compacted in place, the global numbering is rebuilt, and the halo is
/// reconstructed from the (filtered) interface set.
pub fn remove_cells<C: Communicator>(
    comm: &C,
    mesh: &mut Mesh,
    flag: &[bool],
    group_name: Option<&str>,
) -> Result<(), FvMeshError> {
    let n_cells = mesh.n_cells;
    let n_cells_ext = mesh.n_cells_with_ghosts;

    // Old -> new renumbering over owned cells, monotonic compaction.
    let mut c_o2n = vec![INVALID_ID; n_cells_ext];
    let mut n_cells_new = 0usize;
    for c in 0..n_cells {
        if !flag[c] {
            c_o2n[c] = n_cells_new;
            n_cells_new += 1;
        }
    }

    let mut n_g_cells_new = n_cells_new as u64;
    parall::counter(comm, &mut n_g_cells_new)?;
    if n_g_cells_new == mesh.n_g_cells {
        return Ok(());
    }
    if mesh.verbosity > 0 {
        log::info!(
            "removing {} cells from mesh",
            mesh.n_g_cells - n_g_cells_new
        );
    }

    // Ghost entries of the renumbering follow from the owners.
    if let Some(halo) = mesh.halo.as_ref() {
        let mut sync_map: Vec<u64> = c_o2n
            .iter()
            .map(|&v| if v == INVALID_ID { u64::MAX } else { v as u64 })
            .collect();
        halo.sync(comm, HaloKind::Extended, 1, &mut sync_map)?;
        for (dst, &v) in c_o2n.iter_mut().zip(sync_map.iter()).skip(n_cells) {
            *dst = if v == u64::MAX { INVALID_ID } else { v as usize };
        }
    }

    // Propagate boundary-face groups to the interior faces of removed
    // boundary cells.
    let mut b_gc_id = vec![DEFAULT_FAMILY_ID; n_cells_ext];
    if group_name.is_none() {
        for f in 0..mesh.n_b_faces() {
            let k = mesh.b_face_cells[f];
            if k < n_cells && flag[k] {
                b_gc_id[k] = mesh.b_face_family[f];
            }
        }
    }

    // Promote interior faces bordering exactly one removed cell.
    let n_b_faces_ini = mesh.n_b_faces();
    let mut promoted: Vec<usize> = Vec::new();
    for f in 0..mesh.n_i_faces() {
        let [c1, c2] = mesh.i_face_cells[f];
        let removed1 = c1 != INVALID_ID && c_o2n[c1] == INVALID_ID;
        let removed2 = c2 != INVALID_ID && c_o2n[c2] == INVALID_ID;
        if !removed1 && !removed2 {
            continue;
        }
        for &k in &[c1, c2] {
            if k != INVALID_ID
                && c_o2n[k] == INVALID_ID
                && b_gc_id[k] != 0
                && mesh.i_face_family[f] == DEFAULT_FAMILY_ID
            {
                mesh.i_face_family[f] = b_gc_id[k];
            }
        }
        // The kept owned side receives a boundary face with an outward
        // ring; a kept ghost side is handled by its owning rank.
        if !removed1 && c1 < n_cells {
            let ring = mesh.i_face_vtx.row(f).to_vec();
            let id = mesh.push_boundary_face(&ring, c1, mesh.i_face_family[f]);
            promoted.push(id);
        }
        if !removed2 && c2 != INVALID_ID && c2 < n_cells {
            let mut ring = mesh.i_face_vtx.row(f).to_vec();
            ring.reverse();
            let id = mesh.push_boundary_face(&ring, c2, mesh.i_face_family[f]);
            promoted.push(id);
        }
        // The interior face itself disappears either way.
        mesh.i_face_cells[f] = [INVALID_ID, INVALID_ID];
    }

    // Group override for the freshly-created boundary faces.
    if let Some(name) = group_name {
        let sel: Vec<usize> = promoted
            .iter()
            .copied()
            .filter(|&f| mesh.b_face_family[f] == DEFAULT_FAMILY_ID)
            .collect();
        mesh.group_b_faces_add(name, &sel);
    }
    debug_assert!(promoted.iter().all(|&f| f >= n_b_faces_ini));

    // Drop boundary faces of removed cells.
    let mut n_g_free_faces = 0u64;
    for f in 0..mesh.n_b_faces() {
        let k = mesh.b_face_cells[f];
        if k != INVALID_ID && k < c_o2n.len() && c_o2n[k] == INVALID_ID {
            mesh.b_face_cells[f] = INVALID_ID;
        }
        if mesh.b_face_cells[f] == INVALID_ID {
            n_g_free_faces += 1;
        }
    }
    parall::counter(comm, &mut n_g_free_faces)?;
    mesh.discard_free_faces();

    // Rewrite face -> cell references through the renumbering. Ghost
    // references are cleared; the halo rebuild reassigns them.
    for f in 0..mesh.n_i_faces() {
        for slot in mesh.i_face_cells[f].iter_mut() {
            let k = *slot;
            *slot = if k != INVALID_ID && k < n_cells {
                c_o2n[k]
            } else {
                INVALID_ID
            };
        }
    }
    for f in 0..mesh.n_b_faces() {
        let k = mesh.b_face_cells[f];
        if k != INVALID_ID {
            mesh.b_face_cells[f] = c_o2n[k];
        }
    }

    // Compact per-cell arrays in place; the renumbering is monotonic so
    // no useful slot is overwritten.
    for c in 0..n_cells {
        let j = c_o2n[c];
        if j != INVALID_ID {
            debug_assert!(j <= c);
            mesh.cell_family[j] = mesh.cell_family[c];
        }
    }
    mesh.cell_family.truncate(n_cells_new);

    // Contiguous global renumbering by prefix scan over ranks.
    let (offset, total) = parall::exclusive_scan_u64(comm, n_cells_new as u64)?;
    debug_assert_eq!(total, n_g_cells_new);
    mesh.global_cell_num = Some((0..n_cells_new as u64).map(|i| offset + i + 1).collect());
    mesh.n_g_cells = n_g_cells_new;

    mesh.n_cells = n_cells_new;
    mesh.n_cells_with_ghosts = n_cells_new;

    let mut flags = ModifiedFlags::GEOMETRY;
    flags.insert(ModifiedFlags::BALANCE);
    mesh.mark_modified(flags);

    // Rebuild the halo from the filtered interface set.
    if let (Some(mut ifs), Some(halo)) = (mesh.interfaces.take(), mesh.halo.take()) {
        let mut dropped: Vec<Vec<bool>> = Vec::with_capacity(ifs.interfaces.len());
        for d in 0..halo.n_domains() {
            let range = halo.recv_range(d, HaloKind::Extended);
            dropped.push(
                range
                    .map(|g| c_o2n[n_cells + g] == INVALID_ID)
                    .collect(),
            );
        }
        ifs.renumber_sends(&c_o2n, &dropped);
        let new_halo = Halo::from_interface_set(n_cells_new, &ifs, mesh.periodicity.as_ref())?;
        mesh.n_cells_with_ghosts = n_cells_new + new_halo.n_ghosts(HaloKind::Extended);
        mesh.halo = Some(new_halo);
        mesh.interfaces = Some(ifs);
    }

    Ok(())
}

/// Remove every cell whose volume is non-positive, tagging the new
/// boundary with a fixed group name.
pub fn remove_cells_negative_volume<C: Communicator>(
    comm: &C,
    mesh: &mut Mesh,
    mq: &MeshQuantities,
) -> Result<(), FvMeshError> {
    let mut n_neg = 0u64;
    let flag: Vec<bool> = (0..mesh.n_cells)
        .map(|c| {
            let neg = mq.cell_vol[c] <= 0.0;
            n_neg += u64::from(neg);
            neg
        })
        .collect();
    parall::counter(comm, &mut n_neg)?;
    if n_neg == 0 {
        return Ok(());
    }
    log::info!("will remove {n_neg} cells with negative volume");
    remove_cells(comm, mesh, &flag, Some(NEG_VOLUME_GROUP))
}

/// Remove an explicit list of cells.
pub fn remove_cells_from_selection<C: Communicator>(
    comm: &C,
    mesh: &mut Mesh,
    cells: &[usize],
    group_name: Option<&str>,
) -> Result<(), FvMeshError> {
    let mut flag = vec![false; mesh.n_cells];
    for &c in cells {
        flag[c] = true;
    }
    remove_cells(comm, mesh, &flag, group_name)?;
    mesh.mark_modified(ModifiedFlags::BALANCE);
    Ok(())
}
