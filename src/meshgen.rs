//! Structured mesh generators for tests, demos and simple cases.

use crate::topology::adjacency::Csr;
use crate::topology::mesh::{DEFAULT_FAMILY_ID, Mesh, ModifiedFlags};

/// Generate a structured hexahedral box of `nx * ny * nz` cells spanning
/// `[0, extent]` in each direction.
///
/// Boundary faces are tagged per side with the groups `"xmin"`, `"xmax"`,
/// `"ymin"`, `"ymax"`, `"zmin"`, `"zmax"`. Interior face normals point
/// from the first adjacent cell to the second; boundary normals point
/// outward.
pub fn structured_box(nx: usize, ny: usize, nz: usize, extent: [f64; 3]) -> Mesh {
    assert!(nx > 0 && ny > 0 && nz > 0);
    let mut mesh = Mesh::new();

    let nvx = nx + 1;
    let nvy = ny + 1;
    let nvz = nz + 1;
    let vid = |i: usize, j: usize, k: usize| i + nvx * (j + nvy * k);
    let cid = |i: usize, j: usize, k: usize| i + nx * (j + ny * k);

    let dx = extent[0] / nx as f64;
    let dy = extent[1] / ny as f64;
    let dz = extent[2] / nz as f64;

    for k in 0..nvz {
        for j in 0..nvy {
            for i in 0..nvx {
                mesh.vtx_coord
                    .push([i as f64 * dx, j as f64 * dy, k as f64 * dz]);
            }
        }
    }
    mesh.global_vtx_num = (1..=mesh.vtx_coord.len() as u64).collect();

    mesh.n_cells = nx * ny * nz;
    mesh.n_cells_with_ghosts = mesh.n_cells;
    mesh.cell_family = vec![DEFAULT_FAMILY_ID; mesh.n_cells];
    mesh.global_cell_num = Some((1..=mesh.n_cells as u64).collect());
    mesh.n_g_cells = mesh.n_cells as u64;

    let fam = |mesh: &mut Mesh, name: &str| mesh.family_id(name);
    let f_xmin = fam(&mut mesh, "xmin");
    let f_xmax = fam(&mut mesh, "xmax");
    let f_ymin = fam(&mut mesh, "ymin");
    let f_ymax = fam(&mut mesh, "ymax");
    let f_zmin = fam(&mut mesh, "zmin");
    let f_zmax = fam(&mut mesh, "zmax");

    let mut i_rows: Vec<[usize; 4]> = Vec::new();
    let mut b_rows: Vec<[usize; 4]> = Vec::new();

    // x-normal faces
    for k in 0..nz {
        for j in 0..ny {
            for i in 0..=nx {
                let ring = [
                    vid(i, j, k),
                    vid(i, j + 1, k),
                    vid(i, j + 1, k + 1),
                    vid(i, j, k + 1),
                ];
                if i == 0 {
                    b_rows.push([ring[0], ring[3], ring[2], ring[1]]);
                    mesh.b_face_cells.push(cid(0, j, k));
                    mesh.b_face_family.push(f_xmin);
                } else if i == nx {
                    b_rows.push(ring);
                    mesh.b_face_cells.push(cid(nx - 1, j, k));
                    mesh.b_face_family.push(f_xmax);
                } else {
                    i_rows.push(ring);
                    mesh.i_face_cells.push([cid(i - 1, j, k), cid(i, j, k)]);
                    mesh.i_face_family.push(DEFAULT_FAMILY_ID);
                }
            }
        }
    }
    // y-normal faces
    for k in 0..nz {
        for j in 0..=ny {
            for i in 0..nx {
                let ring = [
                    vid(i, j, k),
                    vid(i, j, k + 1),
                    vid(i + 1, j, k + 1),
                    vid(i + 1, j, k),
                ];
                if j == 0 {
                    b_rows.push([ring[0], ring[3], ring[2], ring[1]]);
                    mesh.b_face_cells.push(cid(i, 0, k));
                    mesh.b_face_family.push(f_ymin);
                } else if j == ny {
                    b_rows.push(ring);
                    mesh.b_face_cells.push(cid(i, ny - 1, k));
                    mesh.b_face_family.push(f_ymax);
                } else {
                    i_rows.push(ring);
                    mesh.i_face_cells.push([cid(i, j - 1, k), cid(i, j, k)]);
                    mesh.i_face_family.push(DEFAULT_FAMILY_ID);
                }
            }
        }
    }
    // z-normal faces
    for k in 0..=nz {
        for j in 0..ny {
            for i in 0..nx {
                let ring = [
                    vid(i, j, k),
                    vid(i + 1, j, k),
                    vid(i + 1, j + 1, k),
                    vid(i, j + 1, k),
                ];
                if k == 0 {
                    b_rows.push([ring[0], ring[3], ring[2], ring[1]]);
                    mesh.b_face_cells.push(cid(i, j, 0));
                    mesh.b_face_family.push(f_zmin);
                } else if k == nz {
                    b_rows.push(ring);
                    mesh.b_face_cells.push(cid(i, j, nz - 1));
                    mesh.b_face_family.push(f_zmax);
                } else {
                    i_rows.push(ring);
                    mesh.i_face_cells.push([cid(i, j, k - 1), cid(i, j, k)]);
                    mesh.i_face_family.push(DEFAULT_FAMILY_ID);
                }
            }
        }
    }

    mesh.i_face_vtx = Csr::from_rows(&i_rows);
    mesh.b_face_vtx = Csr::from_rows(&b_rows);
    mesh.global_i_face_num = Some((1..=mesh.i_face_cells.len() as u64).collect());
    mesh.global_b_face_num = Some((1..=mesh.b_face_cells.len() as u64).collect());

    mesh.mark_modified(ModifiedFlags::GEOMETRY);
    mesh.clear_modified();
    mesh
}

/// Append a translated copy of `other` to `mesh` with fully disjoint
/// vertex, face and cell numbering. Boundary groups of `other` are
/// imported under the names given by `rename`, falling back to the
/// original names.
pub fn append_disjoint(mesh: &mut Mesh, other: &Mesh, offset: [f64; 3], rename: &[(&str, &str)]) {
    let v_shift = mesh.n_vertices();
    let c_shift = mesh.n_cells;
    let v_gshift = mesh.global_vtx_num.iter().copied().max().unwrap_or(0);
    let c_gshift = mesh.n_g_cells;

    for (v, c) in other.vtx_coord.iter().enumerate() {
        mesh.vtx_coord.push([
            c[0] + offset[0],
            c[1] + offset[1],
            c[2] + offset[2],
        ]);
        mesh.global_vtx_num.push(other.global_vtx_num[v] + v_gshift);
    }

    fn map_family(mesh: &mut Mesh, other: &Mesh, rename: &[(&str, &str)], fam: i32) -> i32 {
        match other.group_name(fam) {
            None => DEFAULT_FAMILY_ID,
            Some(name) => {
                let mapped = rename
                    .iter()
                    .find(|(from, _)| *from == name)
                    .map_or(name, |(_, to)| *to);
                mesh.family_id(mapped)
            }
        }
    }

    for f in 0..other.n_i_faces() {
        let ring: Vec<usize> = other.i_face_vtx.row(f).iter().map(|&v| v + v_shift).collect();
        mesh.i_face_vtx.ids.extend_from_slice(&ring);
        mesh.i_face_vtx.idx.push(mesh.i_face_vtx.ids.len());
        let [c1, c2] = other.i_face_cells[f];
        mesh.i_face_cells.push([c1 + c_shift, c2 + c_shift]);
        let fam = map_family(mesh, other, rename, other.i_face_family[f]);
        mesh.i_face_family.push(fam);
    }
    for f in 0..other.n_b_faces() {
        let ring: Vec<usize> = other.b_face_vtx.row(f).iter().map(|&v| v + v_shift).collect();
        let fam = map_family(mesh, other, rename, other.b_face_family[f]);
        mesh.push_boundary_face(&ring, other.b_face_cells[f] + c_shift, fam);
    }

    mesh.n_cells += other.n_cells;
    mesh.n_cells_with_ghosts = mesh.n_cells;
    mesh.cell_family
        .extend_from_slice(&other.cell_family);
    if let (Some(g), Some(og)) = (mesh.global_cell_num.as_mut(), other.global_cell_num.as_ref()) {
        g.extend(og.iter().map(|&n| n + c_gshift));
    }
    mesh.n_g_cells += other.n_g_cells;
    mesh.global_i_face_num = None;
    mesh.global_b_face_num = None;

    mesh.mark_modified(ModifiedFlags::GEOMETRY);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_counts() {
        let m = structured_box(2, 2, 2, [1.0, 1.0, 1.0]);
        assert_eq!(m.n_cells, 8);
        assert_eq!(m.n_vertices(), 27);
        assert_eq!(m.n_i_faces(), 12);
        assert_eq!(m.n_b_faces(), 24);
        m.validate().unwrap();
    }

    #[test]
    fn append_keeps_numbering_disjoint() {
        let mut a = structured_box(1, 1, 1, [1.0, 1.0, 1.0]);
        let b = structured_box(1, 1, 1, [1.0, 1.0, 1.0]);
        append_disjoint(&mut a, &b, [1.0, 0.0, 0.0], &[("xmin", "join_b")]);
        assert_eq!(a.n_cells, 2);
        assert_eq!(a.n_vertices(), 16);
        assert_eq!(a.n_b_faces(), 12);
        a.validate().unwrap();
        // The renamed side exists and tags exactly one face.
        let fam = a.family_id("join_b");
        let n = a.b_face_family.iter().filter(|&&f| f == fam).count();
        assert_eq!(n, 1);
    }
}
