//! Distance to wall.
//!
//! Solves `-div(grad(phi)) = 1` with `phi = 0` at walls and homogeneous
//! Neumann elsewhere; the distance follows from
//! `d = sqrt(|grad phi|^2 + 2 phi) - |grad phi|`. A dimensionless
//! variant transports `u* rho / mu` along `grad d / |grad d|` and applies
//! Van Driest damping to the turbulent viscosity.

use crate::comm::Communicator;
use crate::error::FvMeshError;
use crate::field::BoundaryType;
use crate::field::bc::BcCoeffs;
use crate::geometry::MeshQuantities;
use crate::halo::HaloKind;
use crate::math::{self, BIG, EPZERO};
use crate::operators::equation::EquationParams;
use crate::operators::face_viscosity::face_viscosity;
use crate::operators::gradient::gradient_scalar;
use crate::operators::iterative::equation_iterative_solve_scalar;
use crate::operators::potential::face_diffusion_potential;
use crate::parall;
use crate::solver::{SolverContext, SparseSolver};
use crate::topology::mesh::{Mesh, TimeDependency};

/// Van Driest damping constant.
const CDRIES: f64 = 26.0;

/// Wall-distance engine with the persistent state the skip logic needs.
#[derive(Clone, Debug, Default)]
pub struct WallDistance {
    /// Current wall distance, owned + ghost cells.
    pub wall_dist: Vec<f64>,
    /// Boundary coefficients of the solved potential; kept across calls
    /// so unchanged BCs can skip the solve on fixed meshes.
    pub bc: BcCoeffs,
    /// Solved potential saved for the next call.
    aux_pre: Vec<f64>,
    /// Cells clipped to positivity in the last solve.
    pub n_clip_negative: u64,
    /// Cells where the square-root identity failed in the last call.
    pub n_sqrt_failures: u64,
}

impl WallDistance {
    pub fn new(mesh: &Mesh) -> Self {
        Self {
            wall_dist: vec![0.0; mesh.n_cells_with_ghosts],
            bc: BcCoeffs::new(mesh.n_b_faces()),
            aux_pre: vec![0.0; mesh.n_cells_with_ghosts],
            n_clip_negative: 0,
            n_sqrt_failures: 0,
        }
    }

    /// Clip negative potentials to a volume-scaled epsilon; returns the
    /// local clip count and minimum.
    fn clip_negative(mesh: &Mesh, mq: &MeshQuantities, phi: &mut [f64]) -> (u64, f64) {
        let mut count = 0u64;
        let mut dismin = BIG;
        for c in 0..mesh.n_cells {
            if phi[c] < 0.0 {
                count += 1;
                dismin = dismin.min(phi[c]);
                phi[c] = EPZERO * mq.cell_vol[c].cbrt();
            }
        }
        (count, dismin)
    }

    /// Compute the distance to wall by solving a 3D diffusion equation.
    #[allow(clippy::too_many_arguments)]
    pub fn compute<C, S>(
        &mut self,
        ctx: &SolverContext<C>,
        solver: &S,
        mesh: &Mesh,
        mq: &MeshQuantities,
        bc_type: &[BoundaryType],
        eqp: &mut EquationParams,
    ) -> Result<(), FvMeshError>
    where
        C: Communicator,
        S: SparseSolver<C>,
    {
        let n_cells = mesh.n_cells;
        let n_cells_ext = mesh.n_cells_with_ghosts;
        let n_b_faces = mesh.n_b_faces();

        let mut rovsdt = vec![0.0; n_cells_ext];
        let mut smbrp = vec![0.0; n_cells_ext];
        for c in 0..n_cells {
            smbrp[c] = mq.cell_vol[c];
        }

        // Boundary conditions: Dirichlet 0 at walls, homogeneous Neumann
        // elsewhere. On fixed meshes, only re-solve when they changed.
        let mut ndircp = 0u64;
        let mut have_diff = 1u64;

        if mesh.time_dep == TimeDependency::Fixed {
            have_diff = 0;
            for f in 0..n_b_faces {
                let a_prev = self.bc.a[f];
                let b_prev = self.bc.b[f];
                if bc_type[f].is_wall() {
                    let hint = 1.0 / mq.b_dist[f];
                    self.bc.set_dirichlet_scalar(f, 0.0, hint, -1.0);
                    ndircp += 1;
                } else {
                    self.bc.set_neumann_scalar_hmg(f);
                }
                let d = (a_prev - self.bc.a[f]).abs() + (b_prev - self.bc.b[f]).abs();
                if d > 1.0e-12 {
                    have_diff = 1;
                }
            }
            have_diff = parall::allreduce(ctx.comm, have_diff, u64::max)?;
        } else {
            for f in 0..n_b_faces {
                if bc_type[f].is_wall() {
                    let hint = 1.0 / mq.b_dist[f];
                    self.bc.set_dirichlet_scalar(f, 0.0, hint, -1.0);
                    ndircp += 1;
                } else {
                    self.bc.set_neumann_scalar_hmg(f);
                }
            }
        }

        // Immersed boundaries anchor the equation inside cut cells.
        if let (Some(w_surf), Some(w_dist_inv)) =
            (mq.c_w_face_surf.as_ref(), mq.c_w_dist_inv.as_ref())
        {
            for c in 0..n_cells {
                let ibm_imp = w_dist_inv[c] * w_surf[c];
                rovsdt[c] = ibm_imp;
                if ibm_imp > f64::MIN_POSITIVE {
                    ndircp += 1;
                }
            }
        }

        // BCs unchanged but the field was never initialized: solve anyway.
        if have_diff == 0 {
            let d: f64 = self.wall_dist[..n_cells].iter().map(|v| v * v).sum();
            if d <= 0.0 {
                have_diff = 1;
            }
        }

        parall::counter(ctx.comm, &mut ndircp)?;
        parall::counter(ctx.comm, &mut have_diff)?;

        if ndircp == 0 {
            // No wall anywhere: distance is infinite.
            self.wall_dist[..n_cells].fill(BIG);
            return Ok(());
        }
        if have_diff == 0 {
            return Ok(());
        }

        // Unit diffusivity at faces.
        let mut i_visc = vec![0.0; mesh.n_i_faces()];
        let mut b_visc = vec![0.0; n_b_faces];
        let w1 = vec![1.0; n_cells_ext];
        face_viscosity(mesh, mq, eqp.imvisf, &w1, &mut i_visc, &mut b_visc);

        let i_mass_flux = vec![0.0; mesh.n_i_faces()];
        let b_mass_flux = vec![0.0; n_b_faces];
        let mut dpvar = vec![0.0; n_cells_ext];

        let mut eqp_loc = eqp.clone();
        eqp_loc.istat = -1;
        eqp_loc.icoupl = -1;
        eqp_loc.ndircl = ndircp as usize;
        eqp_loc.idifft = false;
        eqp_loc.iwgrec = false;
        eqp_loc.blend_st = 0.0;
        eqp_loc.iconv = false;
        eqp_loc.idiff = true;

        equation_iterative_solve_scalar(
            ctx,
            solver,
            mesh,
            mq,
            &eqp_loc,
            "wall_distance",
            -1.0,
            &self.bc,
            &i_mass_flux,
            &b_mass_flux,
            &i_visc,
            &b_visc,
            &rovsdt,
            &smbrp,
            &self.aux_pre.clone(),
            &mut self.wall_dist,
            &mut dpvar,
        )?;

        // Clippings; on failure of the maximum principle, recompute
        // without reconstruction until positive.
        let (mut mmprpl, mut dismin) = Self::clip_negative(mesh, mq, &mut self.wall_dist);
        parall::counter(ctx.comm, &mut mmprpl)?;
        parall::min_f64(ctx.comm, &mut dismin)?;
        self.n_clip_negative = mmprpl;

        if mmprpl >= 1 {
            if eqp.nswrsm > 0 {
                eqp.nswrsm = 0;
                eqp.ircflu = false;
                eqp_loc.nswrsm = 1;
                eqp_loc.ircflu = false;

                log::warn!(
                    "wall distance: the laplacian solution does not respect the \
                     maximum principle in {mmprpl} cells; recomputing without \
                     reconstruction"
                );

                self.wall_dist.fill(0.0);

                let mut n_iter = 0;
                loop {
                    dpvar.fill(0.0);
                    for c in 0..n_cells {
                        rovsdt[c] = 0.0;
                        smbrp[c] = mq.cell_vol[c];
                    }
                    if let (Some(w_surf), Some(w_dist_inv)) =
                        (mq.c_w_face_surf.as_ref(), mq.c_w_dist_inv.as_ref())
                    {
                        for c in 0..n_cells {
                            rovsdt[c] = w_dist_inv[c] * w_surf[c];
                        }
                    }
                    equation_iterative_solve_scalar(
                        ctx,
                        solver,
                        mesh,
                        mq,
                        &eqp_loc,
                        "wall_distance",
                        -1.0,
                        &self.bc,
                        &i_mass_flux,
                        &b_mass_flux,
                        &i_visc,
                        &b_visc,
                        &rovsdt,
                        &smbrp,
                        &self.aux_pre.clone(),
                        &mut self.wall_dist,
                        &mut dpvar,
                    )?;

                    let (count, _min) = Self::clip_negative(mesh, mq, &mut self.wall_dist);
                    mmprpl = count;
                    parall::counter(ctx.comm, &mut mmprpl)?;

                    n_iter += 1;
                    if mmprpl == 0 {
                        break;
                    }
                    if n_iter > 10 {
                        return Err(FvMeshError::Convergence {
                            name: "wall_distance positivity".into(),
                            iterations: n_iter,
                            residual: dismin,
                        });
                    }
                }
            } else {
                log::warn!(
                    "wall distance: the laplacian solution does not respect the \
                     maximum principle (minimum value {dismin:e})"
                );
            }
        }

        for c in 0..n_cells {
            dpvar[c] = self.wall_dist[c].max(0.0);
            self.aux_pre[c] = self.wall_dist[c];
        }
        if let Some(halo) = ctx.halo {
            halo.sync_var(ctx.comm, HaloKind::Standard, &mut self.aux_pre)?;
            halo.sync_var(ctx.comm, HaloKind::Standard, &mut self.wall_dist)?;
        }

        // Distance from the potential and its gradient.
        let mut grad = vec![[0.0; 3]; n_cells_ext];
        gradient_scalar(mesh, mq, &self.bc, 1, &self.wall_dist, &mut grad);

        let mut counter = 0u64;
        for c in 0..n_cells {
            let norm_grad = math::dot(grad[c], grad[c]);
            if norm_grad + 2.0 * dpvar[c] >= 0.0 {
                self.wall_dist[c] = (norm_grad + 2.0 * dpvar[c]).sqrt() - norm_grad.sqrt();
            } else {
                counter += 1;
            }
        }
        parall::counter(ctx.comm, &mut counter)?;
        self.n_sqrt_failures = counter;
        if counter > 0 {
            log::warn!("wall distance: the associated variable does not converge in {counter} cells");
        }

        if let Some(halo) = ctx.halo {
            halo.sync_var(ctx.comm, HaloKind::Extended, &mut self.wall_dist)?;
        }

        let mut dismin = BIG;
        let mut dismax = -BIG;
        for c in 0..n_cells {
            dismin = dismin.min(self.wall_dist[c]);
            dismax = dismax.max(self.wall_dist[c]);
        }
        parall::min_f64(ctx.comm, &mut dismin)?;
        parall::max_f64(ctx.comm, &mut dismax)?;
        log::info!("wall distance: min = {dismin:14.5e}, max = {dismax:14.5e}");

        Ok(())
    }
}

/// Dimensionless wall distance solved as a steady transport equation.
#[derive(Clone, Debug, Default)]
pub struct YPlus {
    /// Current y+ field, owned + ghost cells.
    pub yplus: Vec<f64>,
    n_wall: Option<u64>,
    /// Boundary coefficients of the transported u*/nu.
    pub bc: BcCoeffs,
}

impl YPlus {
    pub fn new(mesh: &Mesh) -> Self {
        Self {
            yplus: vec![0.0; mesh.n_cells_with_ghosts],
            n_wall: None,
            bc: BcCoeffs::new(mesh.n_b_faces()),
        }
    }

    /// Compute y+ by convecting `u* rho / mu` along the wall-distance
    /// gradient, then apply Van Driest damping to `visct`.
    ///
    /// `visvdr` carries the viscosity absorbed at wall cells by the wall
    /// treatment (NaN where unset); those values are restored after
    /// damping. `nt_cur` is the current timestep number (1-based).
    #[allow(clippy::too_many_arguments)]
    pub fn compute<C, S>(
        &mut self,
        ctx: &SolverContext<C>,
        solver: &S,
        mesh: &Mesh,
        mq: &MeshQuantities,
        bc_type: &[BoundaryType],
        eqp: &EquationParams,
        wall_distance: &mut WallDistance,
        crom: &[f64],
        viscl: &[f64],
        b_uet: &[f64],
        nt_cur: usize,
        visct: &mut [f64],
        visvdr: &[f64],
    ) -> Result<(), FvMeshError>
    where
        C: Communicator,
        S: SparseSolver<C>,
    {
        let n_cells = mesh.n_cells;
        let n_cells_ext = mesh.n_cells_with_ghosts;
        let n_b_faces = mesh.n_b_faces();

        // Number of wall faces, computed once.
        let n_wall = match self.n_wall {
            Some(n) => n,
            None => {
                let mut n = bc_type.iter().filter(|t| t.is_wall()).count() as u64;
                parall::counter(ctx.comm, &mut n)?;
                self.n_wall = Some(n);
                n
            }
        };
        if n_wall == 0 {
            self.yplus.fill(BIG);
            return Ok(());
        }

        // At the first time step u* is not established yet.
        if nt_cur <= 1 {
            self.yplus[..n_cells].fill(BIG);
            if eqp.verbosity >= 1 {
                log::info!("dimensionless wall distance is not computed at the first time step");
            }
            return Ok(());
        }

        // Dirichlet u*/nu at walls, homogeneous Neumann elsewhere; the
        // wall-distance coefficients are refreshed alongside.
        for f in 0..n_b_faces {
            let hint = 1.0 / mq.b_dist[f];
            if bc_type[f].is_wall() {
                let c = mesh.b_face_cells[f];
                let pimp = b_uet[f] * crom[c] / viscl[c];
                self.bc.set_dirichlet_scalar(f, pimp, hint, -1.0);
                wall_distance.bc.set_dirichlet_scalar(f, 0.0, hint, -1.0);
            } else {
                self.bc.set_neumann_scalar(f, 0.0, hint);
                wall_distance.bc.set_neumann_scalar(f, 0.0, hint);
            }
        }

        // Mass flux due to V = grad(y): minus the potential flux of the
        // wall distance under unit viscosity.
        let viscap = vec![1.0; n_cells_ext];
        let mut i_visc = vec![0.0; mesh.n_i_faces()];
        let mut b_visc = vec![0.0; n_b_faces];
        face_viscosity(mesh, mq, eqp.imvisf, &viscap, &mut i_visc, &mut b_visc);

        let mut i_mass_flux = vec![0.0; mesh.n_i_faces()];
        let mut b_mass_flux = vec![0.0; n_b_faces];
        face_diffusion_potential(
            mesh,
            mq,
            true,
            1,
            &wall_distance.bc,
            &wall_distance.wall_dist,
            &i_visc,
            &b_visc,
            &mut i_mass_flux,
            &mut b_mass_flux,
        );
        for v in i_mass_flux.iter_mut() {
            *v = -*v;
        }
        for v in b_mass_flux.iter_mut() {
            *v = -*v;
        }

        // Reinforced diagonal from the flux divergence.
        let mut rovsdp = vec![0.0; n_cells_ext];
        for f in 0..mesh.n_i_faces() {
            let [c1, c2] = mesh.i_face_cells[f];
            rovsdp[c1] += i_mass_flux[f];
            rovsdp[c2] -= i_mass_flux[f];
        }
        for f in 0..n_b_faces {
            rovsdp[mesh.b_face_cells[f]] += b_mass_flux[f];
        }
        for v in rovsdp.iter_mut().take(n_cells) {
            *v = 1.0e-6 * v.abs();
        }
        if let Some(halo) = ctx.halo {
            halo.sync_var(ctx.comm, HaloKind::Standard, &mut rovsdp)?;
        }

        // Bounds of u*/nu over wall faces: the initialization and the
        // final clipping both use them.
        let mut xusnmx = -BIG;
        let mut xusnmn = BIG;
        for f in 0..n_b_faces {
            if bc_type[f].is_wall() {
                xusnmx = xusnmx.max(self.bc.a[f]);
                xusnmn = xusnmn.min(self.bc.a[f]);
            }
        }
        parall::max_f64(ctx.comm, &mut xusnmx)?;
        parall::min_f64(ctx.comm, &mut xusnmn)?;

        let mut dvarp = vec![0.0; n_cells_ext];
        for c in 0..n_cells {
            let usna = self.yplus[c] / wall_distance.wall_dist[c].max(EPZERO);
            dvarp[c] = usna.clamp(xusnmn, xusnmx);
        }

        // L2 norm of u*/nu over the wall surface.
        let mut xnorm0 = 0.0;
        let mut wall_surf = 0.0;
        for f in 0..n_b_faces {
            if bc_type[f].is_wall() {
                wall_surf += mq.b_face_surf[f];
                xnorm0 += self.bc.a[f] * self.bc.a[f] * mq.b_face_surf[f];
            }
        }
        parall::sum_f64(ctx.comm, &mut xnorm0)?;
        parall::sum_f64(ctx.comm, &mut wall_surf)?;
        let xnorm0 = (xnorm0 / wall_surf).sqrt() * mq.tot_vol;

        if let Some(halo) = ctx.halo {
            halo.sync_var(ctx.comm, HaloKind::Standard, &mut dvarp)?;
        }

        let smbdp = vec![0.0; n_cells_ext];
        let mut dpvar = vec![0.0; n_cells_ext];

        let mut eqp_loc = eqp.clone();
        eqp_loc.istat = -1;
        eqp_loc.icoupl = -1;
        eqp_loc.ndircl = 1;
        eqp_loc.idifft = false;
        eqp_loc.iwgrec = false;
        eqp_loc.blend_st = 0.0;
        eqp_loc.iconv = true;
        eqp_loc.idiff = false;
        eqp_loc.imasac = true;

        let zeros_i = vec![0.0; mesh.n_i_faces()];
        let zeros_b = vec![0.0; n_b_faces];
        let dvarp_prev = dvarp.clone();
        equation_iterative_solve_scalar(
            ctx,
            solver,
            mesh,
            mq,
            &eqp_loc,
            "wall_yplus",
            xnorm0,
            &self.bc,
            &i_mass_flux,
            &b_mass_flux,
            &zeros_i,
            &zeros_b,
            &rovsdp,
            &smbdp,
            &dvarp_prev,
            &mut dvarp,
            &mut dpvar,
        )?;

        // Clipping is essential when initializing from the previous u*/nu.
        let mut dismin = BIG;
        let mut dismax = -BIG;
        for c in 0..n_cells {
            dvarp[c] = dvarp[c].clamp(xusnmn, xusnmx);
            self.yplus[c] = dvarp[c] * wall_distance.wall_dist[c];
            dismin = dismin.min(self.yplus[c]);
            dismax = dismax.max(self.yplus[c]);
        }
        parall::min_f64(ctx.comm, &mut dismin)?;
        parall::max_f64(ctx.comm, &mut dismax)?;
        if eqp.verbosity >= 1 {
            log::info!("dimensionless wall distance: min = {dismin:14.5e}, max = {dismax:14.5e}");
        }

        // Van Driest damping, restoring the viscosity absorbed by the
        // wall treatment.
        for c in 0..n_cells {
            let damp = 1.0 - (-self.yplus[c] / CDRIES).exp();
            visct[c] *= damp * damp;
            if visvdr[c].is_finite() {
                visct[c] = visvdr[c];
            }
        }

        Ok(())
    }
}

/// Distance to wall by a brute-force geometric sweep (serial only).
pub fn wall_distance_geometric(
    mesh: &Mesh,
    mq: &MeshQuantities,
    bc_type: &[BoundaryType],
    wall_dist: &mut [f64],
) -> Result<(), FvMeshError> {
    if mesh.halo.is_some() {
        return Err(FvMeshError::config(
            "geometric wall distance cannot be used in parallel or with a periodic mesh",
        ));
    }
    let n_cells = mesh.n_cells;
    for d in wall_dist.iter_mut().take(n_cells) {
        *d = BIG * BIG;
    }
    for f in 0..mesh.n_b_faces() {
        if bc_type[f].is_wall() {
            for c in 0..n_cells {
                let xdis = math::sq_distance(mq.b_face_cog[f], mq.cell_cen[c]);
                if wall_dist[c] > xdis {
                    wall_dist[c] = xdis;
                }
            }
        }
    }
    for d in wall_dist.iter_mut().take(n_cells) {
        *d = d.sqrt();
    }

    let mut dismin = BIG;
    let mut dismax = -BIG;
    for &d in wall_dist.iter().take(n_cells) {
        dismin = dismin.min(d);
        dismax = dismax.max(d);
    }
    log::info!("wall distance (brute force): min = {dismin:14.5}, max = {dismax:14.5}");
    Ok(())
}
