//! Outer iterative solve of one scalar transport equation.

use crate::comm::Communicator;
use crate::error::FvMeshError;
use crate::field::bc::BcCoeffs;
use crate::geometry::MeshQuantities;
use crate::halo::HaloKind;
use crate::operators::convection_diffusion::convection_diffusion_scalar;
use crate::operators::equation::EquationParams;
use crate::operators::matrix::matrix_wrapper_scalar;
use crate::parall;
use crate::solver::{SolverContext, SparseSolver};
use crate::topology::mesh::Mesh;

/// Outcome of an outer solve.
#[derive(Clone, Copy, Debug, Default)]
pub struct SolveStats {
    pub n_sweeps: usize,
    pub n_solver_iterations: usize,
    pub residual: f64,
    pub rhs_norm: f64,
}

/// Solve one scalar convection/diffusion equation by outer increment
/// sweeps.
///
/// Each sweep evaluates the explicit residual of the current iterate
/// (`smbrp` plus the operator balance plus the linearized unsteady term
/// against `pvara`), solves the implicit system for an increment and
/// applies it. Sweeps stop when the residual falls under
/// `epsrsm * normp` or the `nswrsm` budget runs out. `pvar` ghost slots
/// are kept synchronized.
#[allow(clippy::too_many_arguments)]
pub fn equation_iterative_solve_scalar<C, S>(
    ctx: &SolverContext<C>,
    solver: &S,
    mesh: &Mesh,
    mq: &MeshQuantities,
    eqp: &EquationParams,
    name: &str,
    normp: f64,
    bc: &BcCoeffs,
    i_mass_flux: &[f64],
    b_mass_flux: &[f64],
    i_visc: &[f64],
    b_visc: &[f64],
    rovsdt: &[f64],
    smbrp: &[f64],
    pvara: &[f64],
    pvar: &mut [f64],
    dpvar: &mut [f64],
) -> Result<SolveStats, FvMeshError>
where
    C: Communicator,
    S: SparseSolver<C>,
{
    eqp.validate()?;
    let n_cells = mesh.n_cells;
    let n_cells_ext = mesh.n_cells_with_ghosts;
    let symmetric = !eqp.iconv;

    let mut da = vec![0.0; n_cells_ext];
    let mut xa = vec![0.0; if symmetric { mesh.n_i_faces() } else { 2 * mesh.n_i_faces() }];
    matrix_wrapper_scalar(
        mesh,
        eqp.iconv,
        eqp.idiff,
        eqp.ndircl,
        symmetric,
        eqp.theta,
        bc,
        rovsdt,
        i_mass_flux,
        b_mass_flux,
        i_visc,
        b_visc,
        &mut da,
        &mut xa,
    );

    let mut stats = SolveStats::default();
    let mut rhs = vec![0.0; n_cells_ext];
    let nswrsm = eqp.nswrsm.max(1);

    for sweep in 0..nswrsm {
        // Explicit residual of the current iterate.
        rhs[..n_cells].copy_from_slice(&smbrp[..n_cells]);
        rhs[n_cells..].fill(0.0);
        for c in 0..n_cells {
            rhs[c] -= rovsdt[c] * (pvar[c] - pvara[c]);
        }
        convection_diffusion_scalar(
            eqp,
            mesh,
            mq,
            bc,
            pvar,
            i_mass_flux,
            b_mass_flux,
            i_visc,
            b_visc,
            &mut rhs,
        );

        let res = parall::gdot(ctx.comm, &rhs[..n_cells], &rhs[..n_cells])?.sqrt();
        if sweep == 0 {
            stats.rhs_norm = if normp > 0.0 { normp } else { res };
        }
        stats.residual = res;
        stats.n_sweeps = sweep;
        if res <= eqp.epsrsm * stats.rhs_norm {
            return Ok(stats);
        }

        dpvar[..n_cells_ext].fill(0.0);
        let (mut niter, mut sres) = (0usize, 0.0);
        solver.solve_native(
            name,
            symmetric,
            1,
            1,
            &da,
            &xa,
            eqp.epsilo,
            stats.rhs_norm,
            &mut niter,
            &mut sres,
            &rhs,
            dpvar,
            mesh,
            ctx,
        )?;
        stats.n_solver_iterations += niter;

        for c in 0..n_cells {
            pvar[c] += dpvar[c];
        }
        if let Some(halo) = ctx.halo {
            halo.sync_var(ctx.comm, HaloKind::Standard, pvar)?;
        }
        stats.n_sweeps = sweep + 1;
    }

    if eqp.verbosity > 0 {
        log::info!(
            "{name}: {} sweeps, residual {:e} (norm {:e})",
            stats.n_sweeps,
            stats.residual,
            stats.rhs_norm
        );
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::NoComm;
    use crate::geometry::MeshQuantities;
    use crate::meshgen::structured_box;
    use crate::operators::equation::FaceViscosityRule;
    use crate::operators::face_viscosity::face_viscosity;
    use crate::solver::NativeSolver;

    #[test]
    fn diffusion_equation_converges_in_one_sweep() {
        // -lap(u) = 0, u(xmin) = 0, u(xmax) = 1: linear profile.
        let mesh = structured_box(4, 1, 1, [1.0, 1.0, 1.0]);
        let mq = MeshQuantities::compute(&mesh);
        let mut bc = BcCoeffs::new(mesh.n_b_faces());
        let fam_xmin = mesh.families.iter().position(|g| g == "xmin").unwrap() as i32 + 2;
        let fam_xmax = mesh.families.iter().position(|g| g == "xmax").unwrap() as i32 + 2;
        let mut ndircl = 0;
        for f in 0..mesh.n_b_faces() {
            let hint = 1.0 / mq.b_dist[f];
            if mesh.b_face_family[f] == fam_xmin {
                bc.set_dirichlet_scalar(f, 0.0, hint, -1.0);
                ndircl += 1;
            } else if mesh.b_face_family[f] == fam_xmax {
                bc.set_dirichlet_scalar(f, 1.0, hint, -1.0);
                ndircl += 1;
            } else {
                bc.set_neumann_scalar_hmg(f);
            }
        }
        let c_visc = vec![1.0; mesh.n_cells];
        let mut i_visc = vec![0.0; mesh.n_i_faces()];
        let mut b_visc = vec![0.0; mesh.n_b_faces()];
        face_viscosity(&mesh, &mq, FaceViscosityRule::Arithmetic, &c_visc, &mut i_visc, &mut b_visc);

        let eqp = EquationParams {
            ndircl,
            nswrsm: 2,
            ..Default::default()
        };
        let comm = NoComm;
        let ctx = SolverContext::new(&comm, None);
        let solver = NativeSolver::default();

        let rovsdt = vec![0.0; mesh.n_cells];
        let smbrp = vec![0.0; mesh.n_cells];
        let i_flux = vec![0.0; mesh.n_i_faces()];
        let b_flux = vec![0.0; mesh.n_b_faces()];
        let pvara = vec![0.0; mesh.n_cells];
        let mut pvar = vec![0.0; mesh.n_cells];
        let mut dpvar = vec![0.0; mesh.n_cells];

        let stats = equation_iterative_solve_scalar(
            &ctx, &solver, &mesh, &mq, &eqp, "diffusion", -1.0, &bc, &i_flux, &b_flux, &i_visc,
            &b_visc, &rovsdt, &smbrp, &pvara, &mut pvar, &mut dpvar,
        )
        .unwrap();

        assert!(stats.n_sweeps >= 1);
        for c in 0..mesh.n_cells {
            let x = mq.cell_cen[c][0];
            assert!((pvar[c] - x).abs() < 1e-6, "cell {c}: {} vs {x}", pvar[c]);
        }
    }
}
