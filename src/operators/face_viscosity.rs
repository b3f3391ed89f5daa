//! Cell-to-face viscosity averaging.

use crate::geometry::MeshQuantities;
use crate::operators::equation::FaceViscosityRule;
use crate::topology::mesh::Mesh;

/// Average a per-cell diffusion coefficient onto faces.
///
/// Interior faces get `mu_f * S / d` with the arithmetic or
/// distance-weighted harmonic rule; boundary faces carry the bare surface
/// (the exchange coefficient folds the rest through `bf`).
pub fn face_viscosity(
    mesh: &Mesh,
    mq: &MeshQuantities,
    rule: FaceViscosityRule,
    c_visc: &[f64],
    i_visc: &mut [f64],
    b_visc: &mut [f64],
) {
    for f in 0..mesh.n_i_faces() {
        let [c1, c2] = mesh.i_face_cells[f];
        let (v1, v2) = (c_visc[c1], c_visc[c2]);
        let w = mq.weight[f];
        let visc = match rule {
            FaceViscosityRule::Arithmetic => 0.5 * (v1 + v2),
            FaceViscosityRule::Harmonic => {
                let denom = w * v1 + (1.0 - w) * v2;
                if denom.abs() > f64::MIN_POSITIVE {
                    v1 * v2 / denom
                } else {
                    0.0
                }
            }
        };
        i_visc[f] = visc * mq.i_face_surf[f] / mq.i_dist[f];
    }
    for f in 0..mesh.n_b_faces() {
        b_visc[f] = mq.b_face_surf[f];
    }
}
