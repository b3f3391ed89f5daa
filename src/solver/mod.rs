//! Opaque sparse-solver seam.
//!
//! The transport layer hands the solver a diagonal block array and an
//! extra-diagonal-per-face array and gets a solution back; everything
//! else about the solver is its own business. The built-in
//! [`NativeSolver`] is matrix-free: a Jacobi-preconditioned conjugate
//! gradient for symmetric systems and Gauss-Seidel sweeps for
//! non-symmetric ones, both halo-synchronizing their iterate so the face
//! loops can read ghost columns.

use crate::comm::Communicator;
use crate::error::FvMeshError;
use crate::halo::{Halo, HaloKind};
use crate::parall;
use crate::topology::mesh::Mesh;

/// Communicator plus optional halo a solve runs under.
pub struct SolverContext<'a, C: Communicator> {
    pub comm: &'a C,
    pub halo: Option<&'a Halo>,
}

impl<'a, C: Communicator> SolverContext<'a, C> {
    pub fn new(comm: &'a C, halo: Option<&'a Halo>) -> Self {
        Self { comm, halo }
    }

    fn sync(&self, stride: usize, v: &mut [f64]) -> Result<(), FvMeshError> {
        if let Some(halo) = self.halo {
            halo.sync_var_strided(self.comm, HaloKind::Standard, stride, v)?;
        }
        Ok(())
    }
}

/// Sparse linear solver behind one opaque call.
pub trait SparseSolver<C: Communicator> {
    /// Solve `A vx = rhs` for the face-based operator defined by `da`
    /// (diagonal blocks of size `db_size`) and `xa` (extra-diagonal
    /// scalars per interior face, `eb_size` of them).
    ///
    /// `epsilon` is the relative tolerance against `rnorm` (computed from
    /// the RHS when non-positive). Iteration count and final residual are
    /// reported through the output parameters; `vx` is in/out (initial
    /// guess in, solution out).
    #[allow(clippy::too_many_arguments)]
    fn solve_native(
        &self,
        name: &str,
        symmetric: bool,
        db_size: usize,
        eb_size: usize,
        da: &[f64],
        xa: &[f64],
        epsilon: f64,
        rnorm: f64,
        n_iter: &mut usize,
        residual: &mut f64,
        rhs: &[f64],
        vx: &mut [f64],
        mesh: &Mesh,
        ctx: &SolverContext<C>,
    ) -> Result<(), FvMeshError>;
}

/// Built-in matrix-free solver.
#[derive(Clone, Debug)]
pub struct NativeSolver {
    pub max_iter: usize,
}

impl Default for NativeSolver {
    fn default() -> Self {
        Self { max_iter: 10_000 }
    }
}

/// `y = A x` for the block-diagonal + face extra-diagonal operator.
/// Only owned rows are written; ghost columns of `x` are read.
fn matvec(
    mesh: &Mesh,
    symmetric: bool,
    db: usize,
    da: &[f64],
    xa: &[f64],
    x: &[f64],
    y: &mut [f64],
) {
    let n_cells = mesh.n_cells;
    for c in 0..n_cells {
        for i in 0..db {
            let mut acc = 0.0;
            for j in 0..db {
                acc += da[(c * db + i) * db + j] * x[c * db + j];
            }
            y[c * db + i] = acc;
        }
    }
    for f in 0..mesh.n_i_faces() {
        let [c1, c2] = mesh.i_face_cells[f];
        let (x12, x21) = if symmetric {
            (xa[f], xa[f])
        } else {
            (xa[2 * f], xa[2 * f + 1])
        };
        for i in 0..db {
            if c1 < n_cells {
                y[c1 * db + i] += x12 * x[c2 * db + i];
            }
            if c2 < n_cells {
                y[c2 * db + i] += x21 * x[c1 * db + i];
            }
        }
    }
}

impl NativeSolver {
    #[allow(clippy::too_many_arguments)]
    fn solve_cg<C: Communicator>(
        &self,
        name: &str,
        db: usize,
        da: &[f64],
        xa: &[f64],
        epsilon: f64,
        rnorm: f64,
        n_iter: &mut usize,
        residual: &mut f64,
        rhs: &[f64],
        vx: &mut [f64],
        mesh: &Mesh,
        ctx: &SolverContext<C>,
    ) -> Result<(), FvMeshError> {
        let n = mesh.n_cells * db;
        let n_ext = mesh.n_cells_with_ghosts * db;

        // Jacobi preconditioner from the block diagonals' diagonal.
        let mut inv_diag = vec![0.0; n];
        for c in 0..mesh.n_cells {
            for i in 0..db {
                let d = da[(c * db + i) * db + i];
                inv_diag[c * db + i] = if d.abs() > f64::MIN_POSITIVE {
                    1.0 / d
                } else {
                    0.0
                };
            }
        }

        ctx.sync(db, vx)?;
        let mut r = vec![0.0; n];
        let mut q = vec![0.0; n];
        matvec(mesh, true, db, da, xa, vx, &mut q);
        for k in 0..n {
            r[k] = rhs[k] - q[k];
        }

        let mut z: Vec<f64> = r.iter().zip(&inv_diag).map(|(a, m)| a * m).collect();
        let mut p = vec![0.0; n_ext];
        p[..n].copy_from_slice(&z);

        let mut rz = parall::gdot(ctx.comm, &r, &z)?;
        let mut res = parall::gdot(ctx.comm, &r, &r)?.sqrt();

        for it in 0..self.max_iter {
            if res <= epsilon * rnorm {
                *n_iter = it;
                *residual = res;
                log::debug!("Solving {name}: N iter: {it}, Res: {res:e}, Norm: {rnorm:e}");
                return Ok(());
            }
            ctx.sync(db, &mut p)?;
            matvec(mesh, true, db, da, xa, &p, &mut q);
            let pq = parall::gdot(ctx.comm, &p[..n], &q)?;
            if pq.abs() <= f64::MIN_POSITIVE {
                break;
            }
            let alpha = rz / pq;
            for k in 0..n {
                vx[k] += alpha * p[k];
                r[k] -= alpha * q[k];
            }
            for k in 0..n {
                z[k] = r[k] * inv_diag[k];
            }
            let rz_new = parall::gdot(ctx.comm, &r, &z)?;
            let beta = rz_new / rz;
            rz = rz_new;
            for k in 0..n {
                p[k] = z[k] + beta * p[k];
            }
            res = parall::gdot(ctx.comm, &r, &r)?.sqrt();
        }

        *residual = res;
        *n_iter = self.max_iter;
        Err(FvMeshError::Convergence {
            name: name.to_string(),
            iterations: self.max_iter,
            residual: res,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn solve_gauss_seidel<C: Communicator>(
        &self,
        name: &str,
        da: &[f64],
        xa: &[f64],
        epsilon: f64,
        rnorm: f64,
        n_iter: &mut usize,
        residual: &mut f64,
        rhs: &[f64],
        vx: &mut [f64],
        mesh: &Mesh,
        ctx: &SolverContext<C>,
    ) -> Result<(), FvMeshError> {
        let n = mesh.n_cells;

        // Cell -> (face, neighbour, coefficient) adjacency for the sweeps.
        let mut row_idx = vec![0usize; n + 1];
        for f in 0..mesh.n_i_faces() {
            let [c1, c2] = mesh.i_face_cells[f];
            if c1 < n {
                row_idx[c1 + 1] += 1;
            }
            if c2 < n {
                row_idx[c2 + 1] += 1;
            }
        }
        for c in 0..n {
            row_idx[c + 1] += row_idx[c];
        }
        let mut cols = vec![0usize; row_idx[n]];
        let mut coefs = vec![0.0; row_idx[n]];
        let mut cursor = row_idx.clone();
        for f in 0..mesh.n_i_faces() {
            let [c1, c2] = mesh.i_face_cells[f];
            if c1 < n {
                cols[cursor[c1]] = c2;
                coefs[cursor[c1]] = xa[2 * f];
                cursor[c1] += 1;
            }
            if c2 < n {
                cols[cursor[c2]] = c1;
                coefs[cursor[c2]] = xa[2 * f + 1];
                cursor[c2] += 1;
            }
        }

        ctx.sync(1, vx)?;
        let mut q = vec![0.0; n];
        for it in 0..self.max_iter {
            matvec(mesh, false, 1, da, xa, vx, &mut q);
            let mut res = 0.0;
            for c in 0..n {
                let d = rhs[c] - q[c];
                res += d * d;
            }
            parall::sum_f64(ctx.comm, &mut res)?;
            let res = res.sqrt();
            if res <= epsilon * rnorm {
                *n_iter = it;
                *residual = res;
                log::debug!("Solving {name}: N iter: {it}, Res: {res:e}, Norm: {rnorm:e}");
                return Ok(());
            }

            for c in 0..n {
                let mut acc = rhs[c];
                for k in row_idx[c]..row_idx[c + 1] {
                    acc -= coefs[k] * vx[cols[k]];
                }
                if da[c].abs() > f64::MIN_POSITIVE {
                    vx[c] = acc / da[c];
                }
            }
            ctx.sync(1, vx)?;
        }

        matvec(mesh, false, 1, da, xa, vx, &mut q);
        let mut res = 0.0;
        for c in 0..n {
            let d = rhs[c] - q[c];
            res += d * d;
        }
        parall::sum_f64(ctx.comm, &mut res)?;
        *residual = res.sqrt();
        *n_iter = self.max_iter;
        Err(FvMeshError::Convergence {
            name: name.to_string(),
            iterations: self.max_iter,
            residual: *residual,
        })
    }
}

impl<C: Communicator> SparseSolver<C> for NativeSolver {
    fn solve_native(
        &self,
        name: &str,
        symmetric: bool,
        db_size: usize,
        eb_size: usize,
        da: &[f64],
        xa: &[f64],
        epsilon: f64,
        rnorm: f64,
        n_iter: &mut usize,
        residual: &mut f64,
        rhs: &[f64],
        vx: &mut [f64],
        mesh: &Mesh,
        ctx: &SolverContext<C>,
    ) -> Result<(), FvMeshError> {
        if eb_size != 1 {
            return Err(FvMeshError::config(format!(
                "extra-diagonal block size {eb_size} not supported"
            )));
        }
        let rnorm = if rnorm > 0.0 {
            rnorm
        } else {
            let n = mesh.n_cells * db_size;
            parall::gdot(ctx.comm, &rhs[..n], &rhs[..n])?.sqrt()
        };
        if rnorm <= f64::MIN_POSITIVE {
            // Null right-hand side: the zero increment is the solution.
            vx[..mesh.n_cells * db_size].fill(0.0);
            *n_iter = 0;
            *residual = 0.0;
            return Ok(());
        }
        if symmetric {
            self.solve_cg(
                name, db_size, da, xa, epsilon, rnorm, n_iter, residual, rhs, vx, mesh, ctx,
            )
        } else {
            if db_size != 1 {
                return Err(FvMeshError::config(
                    "non-symmetric solves support scalar diagonals only",
                ));
            }
            self.solve_gauss_seidel(
                name, da, xa, epsilon, rnorm, n_iter, residual, rhs, vx, mesh, ctx,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::NoComm;
    use crate::field::bc::BcCoeffs;
    use crate::geometry::MeshQuantities;
    use crate::meshgen::structured_box;
    use crate::operators::equation::FaceViscosityRule;
    use crate::operators::face_viscosity::face_viscosity;
    use crate::operators::matrix::matrix_wrapper_scalar;

    #[test]
    fn cg_solves_dirichlet_poisson() {
        // -lap(u) = 0 with u = 0 on xmin and u = 1 on xmax: u is linear
        // in x, so the cell values follow the cell-centre abscissa.
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

        let rovsdt = vec![0.0; mesh.n_cells];
        let zf_i = vec![0.0; mesh.n_i_faces()];
        let zf_b = vec![0.0; mesh.n_b_faces()];
        let mut da = vec![0.0; mesh.n_cells];
        let mut xa = vec![0.0; mesh.n_i_faces()];
        matrix_wrapper_scalar(
            &mesh, false, true, ndircl, true, 1.0, &bc, &rovsdt, &zf_i, &zf_b, &i_visc, &b_visc,
            &mut da, &mut xa,
        );

        // RHS from the boundary Dirichlet values: -af * b_visc.
        let mut rhs = vec![0.0; mesh.n_cells];
        for f in 0..mesh.n_b_faces() {
            rhs[mesh.b_face_cells[f]] -= b_visc[f] * bc.af[f];
        }

        let comm = NoComm;
        let ctx = SolverContext::new(&comm, None);
        let solver = NativeSolver::default();
        let mut vx = vec![0.0; mesh.n_cells];
        let (mut niter, mut res) = (0, 0.0);
        solver
            .solve_native(
                "poisson", true, 1, 1, &da, &xa, 1e-12, -1.0, &mut niter, &mut res, &rhs, &mut vx,
                &mesh, &ctx,
            )
            .unwrap();

        for c in 0..mesh.n_cells {
            let x = mq.cell_cen[c][0];
            assert!((vx[c] - x).abs() < 1e-8, "cell {c}: {} vs {}", vx[c], x);
        }
    }
}
