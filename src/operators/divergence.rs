//! Divergence of a face mass flux.

use crate::topology::mesh::Mesh;

/// Accumulate the divergence of interior and boundary face mass fluxes
/// into `div`. With `init`, `div` is zeroed first; otherwise the
/// contribution adds to the existing content.
pub fn divergence(
    mesh: &Mesh,
    init: bool,
    i_mass_flux: &[f64],
    b_mass_flux: &[f64],
    div: &mut [f64],
) {
    if init {
        div.fill(0.0);
    }
    for f in 0..mesh.n_i_faces() {
        let [c1, c2] = mesh.i_face_cells[f];
        div[c1] += i_mass_flux[f];
        div[c2] -= i_mass_flux[f];
    }
    for f in 0..mesh.n_b_faces() {
        div[mesh.b_face_cells[f]] += b_mass_flux[f];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meshgen::structured_box;

    #[test]
    fn closed_constant_flux_sums_to_zero() {
        // A uniform flux through interior faces only circulates: the
        // divergence of each cell balances out with matching in/out faces
        // when boundary fluxes close the budget.
        let mesh = structured_box(2, 1, 1, [1.0, 1.0, 1.0]);
        let i_flux = vec![1.0; mesh.n_i_faces()];
        // Outward unit flux on the xmax side, inward on xmin.
        let mut b_flux = vec![0.0; mesh.n_b_faces()];
        let fam_in = mesh
            .families
            .iter()
            .position(|g| g == "xmin")
            .map(|p| p as i32 + 2)
            .unwrap();
        let fam_out = mesh
            .families
            .iter()
            .position(|g| g == "xmax")
            .map(|p| p as i32 + 2)
            .unwrap();
        for f in 0..mesh.n_b_faces() {
            if mesh.b_face_family[f] == fam_in {
                b_flux[f] = -1.0;
            } else if mesh.b_face_family[f] == fam_out {
                b_flux[f] = 1.0;
            }
        }
        let mut div = vec![0.0; mesh.n_cells];
        divergence(&mesh, true, &i_flux, &b_flux, &mut div);
        for c in 0..mesh.n_cells {
            assert!(div[c].abs() < 1e-12, "cell {c}: {}", div[c]);
        }
    }
}
