//! Matrix assembly for the implicit part of a transport equation.
//!
//! Produces a per-cell diagonal array and a per-interior-face
//! extra-diagonal array in the layout the opaque solver interface
//! consumes: one value per face for symmetric systems, two values
//! (`[row c1 -> col c2, row c2 -> col c1]`) otherwise.

use crate::field::bc::BcCoeffs;
use crate::topology::mesh::Mesh;

/// Diagonal inflation applied when no Dirichlet anchors the field.
const EPSDP: f64 = 1.0e-5;

/// Assemble the scalar transport matrix.
///
/// `rovsdt` carries the unsteady/linearized diagonal contribution. With
/// `symmetric` (diffusion only), `xa` holds one entry per interior face;
/// otherwise two. `theta` scales the implicit convective/diffusive
/// terms. With `ndircl == 0` the diagonal is inflated by `1 + EPSDP`
/// to keep the pure-Neumann system invertible.
#[allow(clippy::too_many_arguments)]
pub fn matrix_wrapper_scalar(
    mesh: &Mesh,
    iconvp: bool,
    idiffp: bool,
    ndircl: usize,
    symmetric: bool,
    theta: f64,
    bc: &BcCoeffs,
    rovsdt: &[f64],
    i_mass_flux: &[f64],
    b_mass_flux: &[f64],
    i_visc: &[f64],
    b_visc: &[f64],
    da: &mut [f64],
    xa: &mut [f64],
) {
    let n_cells_ext = mesh.n_cells_with_ghosts;
    let iconv = if iconvp { 1.0 } else { 0.0 };
    let idiff = if idiffp { 1.0 } else { 0.0 };

    debug_assert!(!symmetric || !iconvp, "a convective matrix is not symmetric");
    debug_assert_eq!(
        xa.len(),
        if symmetric {
            mesh.n_i_faces()
        } else {
            2 * mesh.n_i_faces()
        }
    );

    for c in 0..n_cells_ext {
        da[c] = if c < rovsdt.len() { rovsdt[c] } else { 0.0 };
    }
    xa.fill(0.0);

    for f in 0..mesh.n_i_faces() {
        let [c1, c2] = mesh.i_face_cells[f];
        let flux = i_mass_flux[f];
        let flui = 0.5 * (flux + flux.abs());
        let fluj = 0.5 * (flux - flux.abs());
        let visc = i_visc[f];

        if symmetric {
            xa[f] = -theta * idiff * visc;
            da[c1] -= xa[f];
            da[c2] -= xa[f];
        } else {
            // Row c1, column c2 and row c2, column c1.
            xa[2 * f] = theta * (iconv * fluj - idiff * visc);
            xa[2 * f + 1] = theta * (-iconv * flui - idiff * visc);
            da[c1] += theta * (iconv * flui + idiff * visc);
            da[c2] += theta * (-iconv * fluj + idiff * visc);
        }
    }

    for f in 0..mesh.n_b_faces() {
        let c = mesh.b_face_cells[f];
        let flux = b_mass_flux[f];
        let flui = 0.5 * (flux + flux.abs());
        let fluj = 0.5 * (flux - flux.abs());
        da[c] += theta * (iconv * (flui + fluj * bc.b[f]) + idiff * b_visc[f] * bc.bf[f]);
    }

    if ndircl == 0 {
        for c in 0..n_cells_ext {
            da[c] *= 1.0 + EPSDP;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::MeshQuantities;
    use crate::meshgen::structured_box;
    use crate::operators::equation::FaceViscosityRule;
    use crate::operators::face_viscosity::face_viscosity;

    #[test]
    fn symmetric_diffusion_rows_sum_to_boundary_terms() {
        let mesh = structured_box(2, 2, 1, [1.0, 1.0, 1.0]);
        let mq = MeshQuantities::compute(&mesh);
        let mut bc = BcCoeffs::new(mesh.n_b_faces());
        for f in 0..mesh.n_b_faces() {
            bc.set_dirichlet_scalar(f, 0.0, 1.0 / mq.b_dist[f], -1.0);
        }
        let c_visc = vec![1.0; mesh.n_cells];
        let mut i_visc = vec![0.0; mesh.n_i_faces()];
        let mut b_visc = vec![0.0; mesh.n_b_faces()];
        face_viscosity(&mesh, &mq, FaceViscosityRule::Arithmetic, &c_visc, &mut i_visc, &mut b_visc);

        let rovsdt = vec![0.0; mesh.n_cells];
        let i_flux = vec![0.0; mesh.n_i_faces()];
        let b_flux = vec![0.0; mesh.n_b_faces()];
        let mut da = vec![0.0; mesh.n_cells];
        let mut xa = vec![0.0; mesh.n_i_faces()];
        matrix_wrapper_scalar(
            &mesh, false, true, 4, true, 1.0, &bc, &rovsdt, &i_flux, &b_flux, &i_visc, &b_visc,
            &mut da, &mut xa,
        );

        // Each row sums to the boundary diffusion anchor (M-matrix).
        for c in 0..mesh.n_cells {
            let mut row_sum = da[c];
            for f in 0..mesh.n_i_faces() {
                let [c1, c2] = mesh.i_face_cells[f];
                if c1 == c || c2 == c {
                    row_sum += xa[f];
                }
            }
            assert!(row_sum > 0.0, "row {c} lost its anchor");
        }
    }

    #[test]
    fn neumann_system_gets_inflated_diagonal() {
        let mesh = structured_box(2, 1, 1, [1.0, 1.0, 1.0]);
        let mq = MeshQuantities::compute(&mesh);
        let bc = BcCoeffs::new(mesh.n_b_faces());
        let c_visc = vec![1.0; mesh.n_cells];
        let mut i_visc = vec![0.0; mesh.n_i_faces()];
        let mut b_visc = vec![0.0; mesh.n_b_faces()];
        face_viscosity(&mesh, &mq, FaceViscosityRule::Arithmetic, &c_visc, &mut i_visc, &mut b_visc);
        let rovsdt = vec![0.0; mesh.n_cells];
        let zeros_i = vec![0.0; mesh.n_i_faces()];
        let zeros_b = vec![0.0; mesh.n_b_faces()];
        let mut da = vec![0.0; mesh.n_cells];
        let mut xa = vec![0.0; mesh.n_i_faces()];
        matrix_wrapper_scalar(
            &mesh, false, true, 0, true, 1.0, &bc, &rovsdt, &zeros_i, &zeros_b, &i_visc, &b_visc,
            &mut da, &mut xa,
        );
        // Row sum strictly positive thanks to the inflation.
        let row0 = da[0] + xa[0];
        assert!(row0 > 0.0);
    }
}
