//! Explicit convection/diffusion contribution of a scalar field.

use crate::field::bc::BcCoeffs;
use crate::geometry::MeshQuantities;
use crate::operators::equation::EquationParams;
use crate::topology::mesh::Mesh;

/// Subtract the convection/diffusion balance of `pvar` from `rhs`.
///
/// Convection is upwind, optionally blended with the centred face value
/// through `1 - blend_st`. The boundary convective flux is upwind unless
/// `eqp.icvflb` imposes it per face (the imposed-value array then rides
/// in the BC coefficients). Ghost values of `pvar` must be synchronized.
#[allow(clippy::too_many_arguments)]
pub fn convection_diffusion_scalar(
    eqp: &EquationParams,
    mesh: &Mesh,
    mq: &MeshQuantities,
    bc: &BcCoeffs,
    pvar: &[f64],
    i_mass_flux: &[f64],
    b_mass_flux: &[f64],
    i_visc: &[f64],
    b_visc: &[f64],
    rhs: &mut [f64],
) {
    let iconv = if eqp.iconv { 1.0 } else { 0.0 };
    let idiff = if eqp.idiff { 1.0 } else { 0.0 };
    let inc = eqp.inc as f64;
    let blend = 1.0 - eqp.blend_st;

    for f in 0..mesh.n_i_faces() {
        let [c1, c2] = mesh.i_face_cells[f];
        let flux = i_mass_flux[f];
        let flui = 0.5 * (flux + flux.abs());
        let fluj = 0.5 * (flux - flux.abs());

        let upwind = flui * pvar[c1] + fluj * pvar[c2];
        let w = mq.weight[f];
        let centred = flux * (w * pvar[c1] + (1.0 - w) * pvar[c2]);
        let mut fconv = blend * upwind + (1.0 - blend) * centred;
        if eqp.imasac {
            // Mass-accumulation correction: convect the increment only.
            fconv -= flux * pvar[c1];
        }
        let fdiff = i_visc[f] * (pvar[c1] - pvar[c2]);

        let total = iconv * fconv + idiff * fdiff;
        rhs[c1] -= total;
        rhs[c2] += total;
    }

    for f in 0..mesh.n_b_faces() {
        let c = mesh.b_face_cells[f];
        let flux = b_mass_flux[f];
        let flui = 0.5 * (flux + flux.abs());
        let fluj = 0.5 * (flux - flux.abs());

        let pf = inc * bc.a[f] + bc.b[f] * pvar[c];
        let mut fconv = if eqp.icvflb {
            // Imposed boundary convection flux: transport the
            // reconstructed face value on both lobes.
            flux * pf
        } else {
            flui * pvar[c] + fluj * pf
        };
        if eqp.imasac {
            fconv -= flux * pvar[c];
        }
        let fdiff = b_visc[f] * (inc * bc.af[f] + bc.bf[f] * pvar[c]);

        rhs[c] -= iconv * fconv + idiff * fdiff;
    }
}

/// Vector form with full implicit boundary blocks.
///
/// Same contract as the scalar operator; the boundary face value closes
/// through `a + b * phi_cell` with a 3x3 implicit block.
#[allow(clippy::too_many_arguments)]
pub fn convection_diffusion_vector(
    eqp: &EquationParams,
    mesh: &Mesh,
    mq: &MeshQuantities,
    bc: &crate::field::bc::BcCoeffsVector,
    pvar: &[f64],
    i_mass_flux: &[f64],
    b_mass_flux: &[f64],
    i_visc: &[f64],
    b_visc: &[f64],
    rhs: &mut [f64],
) {
    let iconv = if eqp.iconv { 1.0 } else { 0.0 };
    let idiff = if eqp.idiff { 1.0 } else { 0.0 };
    let inc = eqp.inc as f64;
    let blend = 1.0 - eqp.blend_st;

    for f in 0..mesh.n_i_faces() {
        let [c1, c2] = mesh.i_face_cells[f];
        let flux = i_mass_flux[f];
        let flui = 0.5 * (flux + flux.abs());
        let fluj = 0.5 * (flux - flux.abs());
        let w = mq.weight[f];
        for k in 0..3 {
            let (p1, p2) = (pvar[c1 * 3 + k], pvar[c2 * 3 + k]);
            let upwind = flui * p1 + fluj * p2;
            let centred = flux * (w * p1 + (1.0 - w) * p2);
            let mut fconv = blend * upwind + (1.0 - blend) * centred;
            if eqp.imasac {
                fconv -= flux * p1;
            }
            let fdiff = i_visc[f] * (p1 - p2);
            let total = iconv * fconv + idiff * fdiff;
            rhs[c1 * 3 + k] -= total;
            rhs[c2 * 3 + k] += total;
        }
    }

    for f in 0..mesh.n_b_faces() {
        let c = mesh.b_face_cells[f];
        let flux = b_mass_flux[f];
        let flui = 0.5 * (flux + flux.abs());
        let fluj = 0.5 * (flux - flux.abs());
        let pc = [pvar[c * 3], pvar[c * 3 + 1], pvar[c * 3 + 2]];
        for i in 0..3 {
            let mut pf = inc * bc.a[f][i];
            let mut ff = inc * bc.af[f][i];
            for j in 0..3 {
                pf += bc.b[f][i][j] * pc[j];
                ff += bc.bf[f][i][j] * pc[j];
            }
            let mut fconv = flui * pc[i] + fluj * pf;
            if eqp.imasac {
                fconv -= flux * pc[i];
            }
            let fdiff = b_visc[f] * ff;
            rhs[c * 3 + i] -= iconv * fconv + idiff * fdiff;
        }
    }
}

/// Tensor form: componentwise with diagonal implicit boundary
/// coefficients, stride-specialized (6 for symmetric tensors, 9 for
/// full ones). `bc_a`/`bc_b`/`bc_af`/`bc_bf` are STRIDE-interlaced per
/// boundary face.
#[allow(clippy::too_many_arguments)]
pub fn convection_diffusion_tensor<const STRIDE: usize>(
    eqp: &EquationParams,
    mesh: &Mesh,
    mq: &MeshQuantities,
    bc_a: &[f64],
    bc_b: &[f64],
    bc_af: &[f64],
    bc_bf: &[f64],
    pvar: &[f64],
    i_mass_flux: &[f64],
    b_mass_flux: &[f64],
    i_visc: &[f64],
    b_visc: &[f64],
    rhs: &mut [f64],
) {
    let iconv = if eqp.iconv { 1.0 } else { 0.0 };
    let idiff = if eqp.idiff { 1.0 } else { 0.0 };
    let inc = eqp.inc as f64;
    let blend = 1.0 - eqp.blend_st;

    for f in 0..mesh.n_i_faces() {
        let [c1, c2] = mesh.i_face_cells[f];
        let flux = i_mass_flux[f];
        let flui = 0.5 * (flux + flux.abs());
        let fluj = 0.5 * (flux - flux.abs());
        let w = mq.weight[f];
        for k in 0..STRIDE {
            let (p1, p2) = (pvar[c1 * STRIDE + k], pvar[c2 * STRIDE + k]);
            let upwind = flui * p1 + fluj * p2;
            let centred = flux * (w * p1 + (1.0 - w) * p2);
            let mut fconv = blend * upwind + (1.0 - blend) * centred;
            if eqp.imasac {
                fconv -= flux * p1;
            }
            let fdiff = i_visc[f] * (p1 - p2);
            let total = iconv * fconv + idiff * fdiff;
            rhs[c1 * STRIDE + k] -= total;
            rhs[c2 * STRIDE + k] += total;
        }
    }
    for f in 0..mesh.n_b_faces() {
        let c = mesh.b_face_cells[f];
        let flux = b_mass_flux[f];
        let flui = 0.5 * (flux + flux.abs());
        let fluj = 0.5 * (flux - flux.abs());
        for k in 0..STRIDE {
            let pc = pvar[c * STRIDE + k];
            let pf = inc * bc_a[f * STRIDE + k] + bc_b[f * STRIDE + k] * pc;
            let mut fconv = flui * pc + fluj * pf;
            if eqp.imasac {
                fconv -= flux * pc;
            }
            let fdiff = b_visc[f] * (inc * bc_af[f * STRIDE + k] + bc_bf[f * STRIDE + k] * pc);
            rhs[c * STRIDE + k] -= iconv * fconv + idiff * fdiff;
        }
    }
}

/// Thermal form: the convective lobes are weighted by the specific heat
/// `xcpp` of the upwind cell.
#[allow(clippy::too_many_arguments)]
pub fn convection_diffusion_thermal(
    eqp: &EquationParams,
    mesh: &Mesh,
    mq: &MeshQuantities,
    bc: &BcCoeffs,
    pvar: &[f64],
    xcpp: &[f64],
    i_mass_flux: &[f64],
    b_mass_flux: &[f64],
    i_visc: &[f64],
    b_visc: &[f64],
    rhs: &mut [f64],
) {
    let iconv = if eqp.iconv { 1.0 } else { 0.0 };
    let idiff = if eqp.idiff { 1.0 } else { 0.0 };
    let inc = eqp.inc as f64;
    let blend = 1.0 - eqp.blend_st;

    for f in 0..mesh.n_i_faces() {
        let [c1, c2] = mesh.i_face_cells[f];
        let flux = i_mass_flux[f];
        let flui = 0.5 * (flux + flux.abs());
        let fluj = 0.5 * (flux - flux.abs());
        let w = mq.weight[f];
        let upwind = flui * xcpp[c1] * pvar[c1] + fluj * xcpp[c2] * pvar[c2];
        let cpf = w * xcpp[c1] + (1.0 - w) * xcpp[c2];
        let centred = flux * cpf * (w * pvar[c1] + (1.0 - w) * pvar[c2]);
        let mut fconv = blend * upwind + (1.0 - blend) * centred;
        if eqp.imasac {
            fconv -= flux * xcpp[c1] * pvar[c1];
        }
        let fdiff = i_visc[f] * (pvar[c1] - pvar[c2]);
        let total = iconv * fconv + idiff * fdiff;
        rhs[c1] -= total;
        rhs[c2] += total;
    }
    for f in 0..mesh.n_b_faces() {
        let c = mesh.b_face_cells[f];
        let flux = b_mass_flux[f];
        let flui = 0.5 * (flux + flux.abs());
        let fluj = 0.5 * (flux - flux.abs());
        let pf = inc * bc.a[f] + bc.b[f] * pvar[c];
        let mut fconv = xcpp[c] * (flui * pvar[c] + fluj * pf);
        if eqp.imasac {
            fconv -= flux * xcpp[c] * pvar[c];
        }
        let fdiff = b_visc[f] * (inc * bc.af[f] + bc.bf[f] * pvar[c]);
        rhs[c] -= iconv * fconv + idiff * fdiff;
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
    fn pure_diffusion_balance_vanishes_for_uniform_field() {
        let mesh = structured_box(3, 3, 3, [1.0, 1.0, 1.0]);
        let mq = MeshQuantities::compute(&mesh);
        let bc = BcCoeffs::new(mesh.n_b_faces());
        let eqp = EquationParams::default();

        let c_visc = vec![1.0; mesh.n_cells];
        let mut i_visc = vec![0.0; mesh.n_i_faces()];
        let mut b_visc = vec![0.0; mesh.n_b_faces()];
        face_viscosity(&mesh, &mq, FaceViscosityRule::Arithmetic, &c_visc, &mut i_visc, &mut b_visc);

        let pvar = vec![4.0; mesh.n_cells];
        let i_flux = vec![0.0; mesh.n_i_faces()];
        let b_flux = vec![0.0; mesh.n_b_faces()];
        let mut rhs = vec![0.0; mesh.n_cells];
        convection_diffusion_scalar(
            &eqp, &mesh, &mq, &bc, &pvar, &i_flux, &b_flux, &i_visc, &b_visc, &mut rhs,
        );
        for c in 0..mesh.n_cells {
            assert!(rhs[c].abs() < 1e-12);
        }
    }

    #[test]
    fn upwind_convection_moves_mass_downstream() {
        let mesh = structured_box(2, 1, 1, [1.0, 1.0, 1.0]);
        let mq = MeshQuantities::compute(&mesh);
        let bc = BcCoeffs::new(mesh.n_b_faces());
        let eqp = EquationParams {
            iconv: true,
            idiff: false,
            ..Default::default()
        };
        let pvar = vec![1.0, 0.0];
        let i_flux = vec![2.0; mesh.n_i_faces()]; // flow from cell 0 to 1
        let b_flux = vec![0.0; mesh.n_b_faces()];
        let i_visc = vec![0.0; mesh.n_i_faces()];
        let b_visc = vec![0.0; mesh.n_b_faces()];
        let mut rhs = vec![0.0; mesh.n_cells];
        convection_diffusion_scalar(
            &eqp, &mesh, &mq, &bc, &pvar, &i_flux, &b_flux, &i_visc, &b_visc, &mut rhs,
        );
        // Upwind takes the donor value 1.0: cell 0 loses, cell 1 gains.
        assert!((rhs[0] + 2.0).abs() < 1e-12);
        assert!((rhs[1] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn vector_form_balances_uniform_fields() {
        use crate::field::bc::BcCoeffsVector;
        let mesh = structured_box(2, 2, 2, [1.0, 1.0, 1.0]);
        let mq = MeshQuantities::compute(&mesh);
        let bc = BcCoeffsVector::new(mesh.n_b_faces());
        let eqp = EquationParams::default();
        let c_visc = vec![1.0; mesh.n_cells];
        let mut i_visc = vec![0.0; mesh.n_i_faces()];
        let mut b_visc = vec![0.0; mesh.n_b_faces()];
        face_viscosity(&mesh, &mq, FaceViscosityRule::Arithmetic, &c_visc, &mut i_visc, &mut b_visc);

        let pvar = vec![2.5; mesh.n_cells * 3];
        let zf_i = vec![0.0; mesh.n_i_faces()];
        let zf_b = vec![0.0; mesh.n_b_faces()];
        let mut rhs = vec![0.0; mesh.n_cells * 3];
        convection_diffusion_vector(
            &eqp, &mesh, &mq, &bc, &pvar, &zf_i, &zf_b, &i_visc, &b_visc, &mut rhs,
        );
        for v in rhs {
            assert!(v.abs() < 1e-12);
        }
    }

    #[test]
    fn thermal_form_weights_convection_by_cp() {
        let mesh = structured_box(2, 1, 1, [1.0, 1.0, 1.0]);
        let mq = MeshQuantities::compute(&mesh);
        let bc = BcCoeffs::new(mesh.n_b_faces());
        let eqp = EquationParams {
            iconv: true,
            idiff: false,
            ..Default::default()
        };
        let pvar = vec![1.0, 0.0];
        let xcpp = vec![4.0, 1.0];
        let i_flux = vec![2.0; mesh.n_i_faces()];
        let zf_b = vec![0.0; mesh.n_b_faces()];
        let zv_i = vec![0.0; mesh.n_i_faces()];
        let zv_b = vec![0.0; mesh.n_b_faces()];
        let mut rhs = vec![0.0; mesh.n_cells];
        convection_diffusion_thermal(
            &eqp, &mesh, &mq, &bc, &pvar, &xcpp, &i_flux, &zf_b, &zv_i, &zv_b, &mut rhs,
        );
        // Donor cell 0 carries cp = 4: the transported flux is 4x the
        // plain scalar one.
        assert!((rhs[0] + 8.0).abs() < 1e-12);
        assert!((rhs[1] - 8.0).abs() < 1e-12);
    }

    #[test]
    fn tensor_form_keeps_uniform_components_stationary() {
        let mesh = structured_box(2, 2, 1, [1.0, 1.0, 1.0]);
        let mq = MeshQuantities::compute(&mesh);
        let eqp = EquationParams::default();
        let n_b = mesh.n_b_faces();
        // Homogeneous Neumann in the diagonal coefficient layout.
        let bc_a = vec![0.0; n_b * 6];
        let bc_b = vec![1.0; n_b * 6];
        let bc_af = vec![0.0; n_b * 6];
        let bc_bf = vec![0.0; n_b * 6];

        let c_visc = vec![1.0; mesh.n_cells];
        let mut i_visc = vec![0.0; mesh.n_i_faces()];
        let mut b_visc = vec![0.0; n_b];
        face_viscosity(&mesh, &mq, FaceViscosityRule::Arithmetic, &c_visc, &mut i_visc, &mut b_visc);

        let pvar = vec![1.5; mesh.n_cells * 6];
        let zf_i = vec![0.0; mesh.n_i_faces()];
        let zf_b = vec![0.0; n_b];
        let mut rhs = vec![0.0; mesh.n_cells * 6];
        convection_diffusion_tensor::<6>(
            &eqp, &mesh, &mq, &bc_a, &bc_b, &bc_af, &bc_bf, &pvar, &zf_i, &zf_b, &i_visc, &b_visc,
            &mut rhs,
        );
        for v in rhs {
            assert!(v.abs() < 1e-12);
        }
    }
}
