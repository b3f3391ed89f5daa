//! Diffusion potential: pressure-gradient contributions to face mass
//! fluxes and to their cell divergence.

use crate::field::bc::BcCoeffs;
use crate::geometry::MeshQuantities;
use crate::math;
use crate::topology::mesh::Mesh;

/// Update face mass fluxes with the two-point potential flux
/// `i_visc * (p1 - p2)` on interior faces and
/// `b_visc * (inc * af + bf * p)` on boundary faces.
///
/// With `init`, the flux arrays are zeroed first.
pub fn face_diffusion_potential(
    mesh: &Mesh,
    _mq: &MeshQuantities,
    init: bool,
    inc: i32,
    bc: &BcCoeffs,
    pvar: &[f64],
    i_visc: &[f64],
    b_visc: &[f64],
    i_mass_flux: &mut [f64],
    b_mass_flux: &mut [f64],
) {
    if init {
        i_mass_flux.fill(0.0);
        b_mass_flux.fill(0.0);
    }
    for f in 0..mesh.n_i_faces() {
        let [c1, c2] = mesh.i_face_cells[f];
        i_mass_flux[f] += i_visc[f] * (pvar[c1] - pvar[c2]);
    }
    for f in 0..mesh.n_b_faces() {
        let c = mesh.b_face_cells[f];
        let flux = bc.af[f] * inc as f64 + bc.bf[f] * pvar[c];
        b_mass_flux[f] += b_visc[f] * flux;
    }
}

/// Update the cell divergence with the potential flux directly
/// (equivalent to [`face_diffusion_potential`] followed by a divergence).
pub fn diffusion_potential(
    mesh: &Mesh,
    _mq: &MeshQuantities,
    init: bool,
    inc: i32,
    bc: &BcCoeffs,
    pvar: &[f64],
    i_visc: &[f64],
    b_visc: &[f64],
    diverg: &mut [f64],
) {
    if init {
        diverg.fill(0.0);
    }
    for f in 0..mesh.n_i_faces() {
        let [c1, c2] = mesh.i_face_cells[f];
        let flux = i_visc[f] * (pvar[c1] - pvar[c2]);
        diverg[c1] += flux;
        diverg[c2] -= flux;
    }
    for f in 0..mesh.n_b_faces() {
        let c = mesh.b_face_cells[f];
        let flux = b_visc[f] * (bc.af[f] * inc as f64 + bc.bf[f] * pvar[c]);
        diverg[c] += flux;
    }
}

/// Anisotropic variant: the interior transmissibility projects a per-cell
/// symmetric tensor viscosity (Voigt order) onto the face normal.
pub fn face_anisotropic_diffusion_potential(
    mesh: &Mesh,
    mq: &MeshQuantities,
    init: bool,
    inc: i32,
    bc: &BcCoeffs,
    pvar: &[f64],
    viscel: &[[f64; 6]],
    b_visc: &[f64],
    i_mass_flux: &mut [f64],
    b_mass_flux: &mut [f64],
) {
    if init {
        i_mass_flux.fill(0.0);
        b_mass_flux.fill(0.0);
    }
    for f in 0..mesh.n_i_faces() {
        let [c1, c2] = mesh.i_face_cells[f];
        let n = mq.i_face_u_normal[f];
        let w = mq.weight[f];
        // Face tensor: distance-weighted average of the two cell tensors.
        let mut tf = [0.0; 6];
        for k in 0..6 {
            tf[k] = w * viscel[c1][k] + (1.0 - w) * viscel[c2][k];
        }
        let tn = math::sym_33_3_product(tf, n);
        let visc_n = math::dot(tn, n) * mq.i_face_surf[f] / mq.i_dist[f];
        i_mass_flux[f] += visc_n * (pvar[c1] - pvar[c2]);
    }
    for f in 0..mesh.n_b_faces() {
        let c = mesh.b_face_cells[f];
        let flux = bc.af[f] * inc as f64 + bc.bf[f] * pvar[c];
        b_mass_flux[f] += b_visc[f] * flux;
    }
}
