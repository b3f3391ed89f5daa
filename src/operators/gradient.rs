//! Green-Gauss cell gradient of a scalar field.
//!
//! This is the minimal reconstruction the transport utilities need;
//! higher-order reconstruction internals live with the gradient clients.

use crate::field::bc::BcCoeffs;
use crate::geometry::MeshQuantities;
use crate::math::{self, Vec3};
use crate::topology::mesh::Mesh;

/// Compute the cell gradient of `pvar` into `grad`.
///
/// Face values are distance-weighted interpolations of the adjacent cell
/// values; boundary face values close through the BC coefficients with
/// the given `inc` convention. Ghost entries of `pvar` must be
/// synchronized beforehand; `grad` is overwritten over owned cells.
pub fn gradient_scalar(
    mesh: &Mesh,
    mq: &MeshQuantities,
    bc: &BcCoeffs,
    inc: i32,
    pvar: &[f64],
    grad: &mut [Vec3],
) {
    for g in grad.iter_mut().take(mesh.n_cells_with_ghosts) {
        *g = [0.0; 3];
    }

    for f in 0..mesh.n_i_faces() {
        let [c1, c2] = mesh.i_face_cells[f];
        let w = mq.weight[f];
        let pf = w * pvar[c1] + (1.0 - w) * pvar[c2];
        let s = mq.i_face_normal[f];
        for k in 0..3 {
            grad[c1][k] += pf * s[k];
            grad[c2][k] -= pf * s[k];
        }
    }
    for f in 0..mesh.n_b_faces() {
        let c = mesh.b_face_cells[f];
        let pf = inc as f64 * bc.a[f] + bc.b[f] * pvar[c];
        let s = mq.b_face_normal[f];
        for k in 0..3 {
            grad[c][k] += pf * s[k];
        }
    }
    for c in 0..mesh.n_cells {
        let v = mq.cell_vol[c];
        if v > f64::MIN_POSITIVE {
            grad[c] = math::scale(1.0 / v, grad[c]);
        }
    }
}
