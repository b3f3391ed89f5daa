//! Regularisation on bad cells.
//!
//! Cells flagged as geometrically unreliable are replaced by the solution
//! of a small diffusion problem reading their good neighbours: every
//! interior face contributes `ssd = S/d` to both diagonals, the
//! extra-diagonal couples two flagged cells, and a good side anchors both
//! cells to its own value through the right-hand side. The solved field
//! is clipped to the pre-solve min/max over good cells.

use crate::comm::Communicator;
use crate::error::FvMeshError;
use crate::field::BoundaryType;
use crate::geometry::MeshQuantities;
use crate::halo::HaloKind;
use crate::parall;
use crate::solver::{SolverContext, SparseSolver};
use crate::topology::mesh::Mesh;

/// Relative tolerance of the regularisation solves.
const EPSILP: f64 = 1.0e-12;

/// Floor factor of the face surface against `V/d`.
/// Tuning constant pending a proper study.
const SURF_FLOOR: f64 = 0.1;

struct Assembly {
    dam_diag: Vec<f64>,
    xam: Vec<f64>,
}

/// Shared face sweep: per-face `ssd` with the floored surface, scalar
/// diagonal accumulation and the flagged/unflagged case split on the
/// right-hand side (per component).
fn assemble(
    mesh: &Mesh,
    mq: &MeshQuantities,
    stride: usize,
    var: &[f64],
    rhs: &mut [f64],
) -> Assembly {
    let n_cells_ext = mesh.n_cells_with_ghosts;
    let n_i_faces = mesh.n_i_faces();

    let mut dam_diag = vec![0.0; n_cells_ext];
    let mut xam = vec![0.0; n_i_faces];

    for f in 0..n_i_faces {
        let [c1, c2] = mesh.i_face_cells[f];

        let mut surf = mq.i_face_surf[f];
        let vol = 0.5 * (mq.cell_vol[c1] + mq.cell_vol[c2]);
        surf = surf.max(SURF_FLOOR * vol / mq.i_dist[f]);
        let ssd = surf / mq.i_dist[f];

        dam_diag[c1] += ssd;
        dam_diag[c2] += ssd;

        let bad1 = mq.is_bad_cell(c1);
        let bad2 = mq.is_bad_cell(c2);
        if bad1 && bad2 {
            xam[f] = -ssd;
        } else if bad1 {
            for k in 0..stride {
                rhs[c1 * stride + k] += ssd * var[c2 * stride + k];
                rhs[c2 * stride + k] += ssd * var[c2 * stride + k];
            }
        } else if bad2 {
            for k in 0..stride {
                rhs[c2 * stride + k] += ssd * var[c1 * stride + k];
                rhs[c1 * stride + k] += ssd * var[c1 * stride + k];
            }
        } else {
            for k in 0..stride {
                rhs[c1 * stride + k] += ssd * var[c1 * stride + k];
                rhs[c2 * stride + k] += ssd * var[c2 * stride + k];
            }
        }
    }

    Assembly { dam_diag, xam }
}

/// Component-wise min/max over non-flagged owned cells, globally reduced.
fn good_cell_bounds<C: Communicator>(
    comm: &C,
    mesh: &Mesh,
    mq: &MeshQuantities,
    stride: usize,
    var: &[f64],
) -> Result<(Vec<f64>, Vec<f64>), FvMeshError> {
    let mut varmin = vec![1.0e20f64; stride];
    let mut varmax = vec![-1.0e20f64; stride];
    for c in 0..mesh.n_cells {
        if !mq.is_bad_cell(c) {
            for k in 0..stride {
                varmin[k] = varmin[k].min(var[c * stride + k]);
                varmax[k] = varmax[k].max(var[c * stride + k]);
            }
        }
    }
    for k in 0..stride {
        parall::min_f64(comm, &mut varmin[k])?;
        parall::max_f64(comm, &mut varmax[k])?;
    }
    Ok((varmin, varmax))
}

fn clip_to_bounds(mesh: &Mesh, stride: usize, varmin: &[f64], varmax: &[f64], var: &mut [f64]) {
    // The diffusion matrix is min/max preserving in exact arithmetic;
    // the clip bounds the solver's residual error.
    for c in 0..mesh.n_cells {
        for k in 0..stride {
            let v = &mut var[c * stride + k];
            *v = v.min(varmax[k]).max(varmin[k]);
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn solve_block<C, S>(
    ctx: &SolverContext<C>,
    solver: &S,
    mesh: &Mesh,
    name: &str,
    stride: usize,
    dam: &[f64],
    xam: &[f64],
    rhs: &[f64],
    var: &mut [f64],
) -> Result<(), FvMeshError>
where
    C: Communicator,
    S: SparseSolver<C>,
{
    let rnorm = parall::gdot(ctx.comm, &rhs[..mesh.n_cells * stride], &rhs[..mesh.n_cells * stride])?
        .sqrt();
    let (mut niterf, mut ressol) = (0usize, 0.0);
    solver.solve_native(
        name,
        true,
        stride,
        1,
        dam,
        xam,
        EPSILP,
        rnorm,
        &mut niterf,
        &mut ressol,
        rhs,
        var,
        mesh,
        ctx,
    )?;
    log::info!("Solving {name}: N iter: {niterf}, Res: {ressol:12.5e}, Norm: {rnorm:12.5e}");
    Ok(())
}

/// Regularisation on bad cells for scalars.
pub fn regularize_scalar<C, S>(
    ctx: &SolverContext<C>,
    solver: &S,
    mesh: &Mesh,
    mq: &MeshQuantities,
    var: &mut [f64],
) -> Result<(), FvMeshError>
where
    C: Communicator,
    S: SparseSolver<C>,
{
    if !mq.bad_cells_regularisation {
        return Ok(());
    }
    let n_cells_ext = mesh.n_cells_with_ghosts;

    let (varmin, varmax) = good_cell_bounds(ctx.comm, mesh, mq, 1, var)?;

    let mut rhs = vec![0.0; n_cells_ext];
    let asm = assemble(mesh, mq, 1, var, &mut rhs);

    // Scalar diagonal blocks are the accumulated ssd directly.
    solve_block(
        ctx,
        solver,
        mesh,
        "potential_regularisation_scalar",
        1,
        &asm.dam_diag,
        &asm.xam,
        &rhs,
        var,
    )?;

    clip_to_bounds(mesh, 1, &varmin, &varmax, var);

    if let Some(halo) = mesh.halo.as_ref() {
        halo.sync_var(ctx.comm, HaloKind::Standard, var)?;
    }
    Ok(())
}

/// Expand a scalar per-cell diagonal into `stride x stride` blocks.
fn expand_diag(diag: &[f64], stride: usize) -> Vec<f64> {
    let mut dam = vec![0.0; diag.len() * stride * stride];
    for (c, &d) in diag.iter().enumerate() {
        for i in 0..stride {
            dam[(c * stride + i) * stride + i] = d;
        }
    }
    dam
}

/// Regularisation on bad cells for vectors.
///
/// With `boundary_projection`, wall and symmetry faces adjacent to a
/// flagged cell add `ssd * n_i * n_j` to the diagonal block, pinning the
/// wall-normal component.
pub fn regularize_vector<C, S>(
    ctx: &SolverContext<C>,
    solver: &S,
    mesh: &Mesh,
    mq: &MeshQuantities,
    bc_type: &[BoundaryType],
    boundary_projection: bool,
    var: &mut [f64],
) -> Result<(), FvMeshError>
where
    C: Communicator,
    S: SparseSolver<C>,
{
    if !mq.bad_cells_regularisation {
        return Ok(());
    }
    let n_cells_ext = mesh.n_cells_with_ghosts;

    let (varmin, varmax) = good_cell_bounds(ctx.comm, mesh, mq, 3, var)?;

    let mut rhs = vec![0.0; n_cells_ext * 3];
    let asm = assemble(mesh, mq, 3, var, &mut rhs);
    let mut dam = expand_diag(&asm.dam_diag, 3);

    if boundary_projection {
        for f in 0..mesh.n_b_faces() {
            if !matches!(
                bc_type[f],
                BoundaryType::SmoothWall | BoundaryType::RoughWall | BoundaryType::Symmetry
            ) {
                continue;
            }
            let c = mesh.b_face_cells[f];
            if !mq.is_bad_cell(c) {
                continue;
            }
            let ssd = mq.b_face_surf[f] / mq.b_dist[f];
            let n = mq.b_face_u_normal[f];
            for i in 0..3 {
                for j in 0..3 {
                    dam[(c * 3 + i) * 3 + j] += ssd * n[i] * n[j];
                }
            }
        }
    }

    solve_block(
        ctx,
        solver,
        mesh,
        "potential_regularisation_vector",
        3,
        &dam,
        &asm.xam,
        &rhs,
        var,
    )?;

    clip_to_bounds(mesh, 3, &varmin, &varmax, var);

    if let Some(halo) = mesh.halo.as_ref() {
        halo.sync_vector(ctx.comm, HaloKind::Standard, var)?;
    }
    Ok(())
}

/// Regularisation on bad cells for symmetric tensors (Voigt order).
pub fn regularize_sym_tensor<C, S>(
    ctx: &SolverContext<C>,
    solver: &S,
    mesh: &Mesh,
    mq: &MeshQuantities,
    var: &mut [f64],
) -> Result<(), FvMeshError>
where
    C: Communicator,
    S: SparseSolver<C>,
{
    if !mq.bad_cells_regularisation {
        return Ok(());
    }
    let n_cells_ext = mesh.n_cells_with_ghosts;

    let (varmin, varmax) = good_cell_bounds(ctx.comm, mesh, mq, 6, var)?;

    let mut rhs = vec![0.0; n_cells_ext * 6];
    let asm = assemble(mesh, mq, 6, var, &mut rhs);
    let dam = expand_diag(&asm.dam_diag, 6);

    solve_block(
        ctx,
        solver,
        mesh,
        "potential_regularisation_sym_tensor",
        6,
        &dam,
        &asm.xam,
        &rhs,
        var,
    )?;

    clip_to_bounds(mesh, 6, &varmin, &varmax, var);

    if let Some(halo) = mesh.halo.as_ref() {
        halo.sync_sym_tensor(ctx.comm, HaloKind::Standard, var)?;
    }
    Ok(())
}

/// Regularisation on bad cells for full tensors (row-major 9-tuples).
pub fn regularize_tensor<C, S>(
    ctx: &SolverContext<C>,
    solver: &S,
    mesh: &Mesh,
    mq: &MeshQuantities,
    var: &mut [f64],
) -> Result<(), FvMeshError>
where
    C: Communicator,
    S: SparseSolver<C>,
{
    if !mq.bad_cells_regularisation {
        return Ok(());
    }
    let n_cells_ext = mesh.n_cells_with_ghosts;

    let (varmin, varmax) = good_cell_bounds(ctx.comm, mesh, mq, 9, var)?;

    let mut rhs = vec![0.0; n_cells_ext * 9];
    let asm = assemble(mesh, mq, 9, var, &mut rhs);
    let dam = expand_diag(&asm.dam_diag, 9);

    solve_block(
        ctx,
        solver,
        mesh,
        "potential_regularisation_tensor",
        9,
        &dam,
        &asm.xam,
        &rhs,
        var,
    )?;

    clip_to_bounds(mesh, 9, &varmin, &varmax, var);

    if let Some(halo) = mesh.halo.as_ref() {
        halo.sync_tensor(ctx.comm, HaloKind::Standard, var)?;
    }
    Ok(())
}
