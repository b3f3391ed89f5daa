//! Bad-cell regularisation scenarios.

use fv_mesh::comm::NoComm;
use fv_mesh::field::BoundaryType;
use fv_mesh::geometry::{BAD_CELL_TO_REGULARIZE, MeshQuantities};
use fv_mesh::meshgen::structured_box;
use fv_mesh::solver::{NativeSolver, SolverContext};
use fv_mesh::transport::regularization::{
    regularize_scalar, regularize_sym_tensor, regularize_vector,
};

#[test]
fn flagged_cell_takes_the_transmissibility_weighted_mean() {
    let mesh = structured_box(10, 10, 10, [1.0, 1.0, 1.0]);
    let mut mq = MeshQuantities::compute(&mesh);
    mq.bad_cells_regularisation = true;

    // One interior cell flagged; its surroundings carry 1..=27.
    let cid = |i: usize, j: usize, k: usize| i + 10 * (j + 10 * k);
    let center = cid(4, 4, 4);
    mq.bad_cell_flag[center] |= BAD_CELL_TO_REGULARIZE;

    let mut var = vec![0.0; mesh.n_cells];
    let mut tag = 1.0;
    for dk in 0..3 {
        for dj in 0..3 {
            for di in 0..3 {
                var[cid(3 + di, 3 + dj, 3 + dk)] = tag;
                tag += 1.0;
            }
        }
    }
    var[center] = 1.0e6; // garbage to regularize away

    let comm = NoComm;
    let ctx = SolverContext::new(&comm, None);
    let solver = NativeSolver::default();
    regularize_scalar(&ctx, &solver, &mesh, &mq, &mut var).unwrap();

    // Uniform mesh: the solve averages the six face neighbours with
    // equal transmissibility weights.
    let nbrs = [
        var[cid(3, 4, 4)],
        var[cid(5, 4, 4)],
        var[cid(4, 3, 4)],
        var[cid(4, 5, 4)],
        var[cid(4, 4, 3)],
        var[cid(4, 4, 5)],
    ];
    let mean: f64 = nbrs.iter().sum::<f64>() / 6.0;
    assert!(
        (var[center] - mean).abs() < 1e-6,
        "center = {}, mean = {mean}",
        var[center]
    );

    // The regularized value stays inside the good-cell bounds.
    assert!(var[center] >= 1.0 && var[center] <= 27.0);
}

#[test]
fn post_solve_field_respects_good_cell_bounds() {
    let mesh = structured_box(4, 4, 4, [1.0, 1.0, 1.0]);
    let mut mq = MeshQuantities::compute(&mesh);
    mq.bad_cells_regularisation = true;
    mq.bad_cell_flag[21] |= BAD_CELL_TO_REGULARIZE;
    mq.bad_cell_flag[22] |= BAD_CELL_TO_REGULARIZE;

    let mut var: Vec<f64> = (0..mesh.n_cells).map(|c| (c % 7) as f64 - 3.0).collect();
    var[21] = 1.0e9;
    var[22] = -1.0e9;

    let varmin = -3.0;
    let varmax = 3.0;

    let comm = NoComm;
    let ctx = SolverContext::new(&comm, None);
    let solver = NativeSolver::default();
    regularize_scalar(&ctx, &solver, &mesh, &mq, &mut var).unwrap();

    for c in 0..mesh.n_cells {
        assert!(var[c] >= varmin - 1e-9 && var[c] <= varmax + 1e-9);
    }
}

#[test]
fn vector_regularisation_with_boundary_projection() {
    let mesh = structured_box(3, 3, 3, [1.0, 1.0, 1.0]);
    let mut mq = MeshQuantities::compute(&mesh);
    mq.bad_cells_regularisation = true;
    // A wall-adjacent corner cell flagged.
    mq.bad_cell_flag[0] |= BAD_CELL_TO_REGULARIZE;

    let bc_type = vec![BoundaryType::SmoothWall; mesh.n_b_faces()];
    let mut var = vec![0.0; mesh.n_cells * 3];
    for c in 0..mesh.n_cells {
        var[c * 3] = 1.0 + (c % 3) as f64;
        var[c * 3 + 1] = -1.0;
        var[c * 3 + 2] = 0.5;
    }
    var[0] = 1.0e4;
    var[1] = 1.0e4;
    var[2] = 1.0e4;

    let comm = NoComm;
    let ctx = SolverContext::new(&comm, None);
    let solver = NativeSolver::default();
    regularize_vector(&ctx, &solver, &mesh, &mq, &bc_type, true, &mut var).unwrap();

    // Components stay within the good-cell bounds.
    for c in 0..mesh.n_cells {
        assert!(var[c * 3] >= 1.0 && var[c * 3] <= 3.0);
        assert!((var[c * 3 + 1] + 1.0).abs() < 1e-8);
        assert!((var[c * 3 + 2] - 0.5).abs() < 1e-8);
    }
}

#[test]
fn sym_tensor_regularisation_keeps_components_bounded() {
    let mesh = structured_box(3, 3, 1, [1.0, 1.0, 1.0]);
    let mut mq = MeshQuantities::compute(&mesh);
    mq.bad_cells_regularisation = true;
    mq.bad_cell_flag[4] |= BAD_CELL_TO_REGULARIZE;

    let mut var = vec![0.0; mesh.n_cells * 6];
    for c in 0..mesh.n_cells {
        for k in 0..6 {
            var[c * 6 + k] = k as f64 + 1.0;
        }
    }
    for k in 0..6 {
        var[4 * 6 + k] = -1.0e5;
    }

    let comm = NoComm;
    let ctx = SolverContext::new(&comm, None);
    let solver = NativeSolver::default();
    regularize_sym_tensor(&ctx, &solver, &mesh, &mq, &mut var).unwrap();

    for k in 0..6 {
        assert!((var[4 * 6 + k] - (k as f64 + 1.0)).abs() < 1e-6);
    }
}
