//! Operator and boundary-coefficient properties.

use fv_mesh::comm::NoComm;
use fv_mesh::field::bc::BcCoeffs;
use fv_mesh::geometry::MeshQuantities;
use fv_mesh::meshgen::structured_box;
use fv_mesh::operators::divergence::divergence;
use fv_mesh::operators::equation::{EquationParams, FaceViscosityRule};
use fv_mesh::operators::face_viscosity::face_viscosity;
use fv_mesh::operators::iterative::equation_iterative_solve_scalar;
use fv_mesh::operators::potential::face_diffusion_potential;
use fv_mesh::solver::{NativeSolver, SolverContext};
use proptest::prelude::*;

proptest! {
    /// Dirichlet coefficients reconstruct the imposed value and cancel
    /// the diffusive flux on the boundary value itself.
    #[test]
    fn dirichlet_setter_is_consistent(
        pimp in -100.0f64..100.0,
        hint in 0.01f64..1.0e4,
        hext in prop_oneof![Just(-1.0f64), 0.01f64..1.0e4],
    ) {
        let mut bc = BcCoeffs::new(1);
        bc.set_dirichlet_scalar(0, pimp, hint, hext);
        if hext < 0.0 {
            prop_assert!((bc.face_value(0, pimp) - pimp).abs() < 1e-9 * (1.0 + pimp.abs()));
        }
        // Flux af + bf * pimp vanishes whenever the cell value already
        // equals the imposed value.
        prop_assert!(bc.flux(0, pimp).abs() < 1e-7 * (1.0 + hint * pimp.abs()));
    }

    /// Neumann coefficients impose the requested flux independently of
    /// the cell value.
    #[test]
    fn neumann_setter_imposes_the_flux(
        qimp in -100.0f64..100.0,
        hint in 0.01f64..1.0e4,
        pi in -100.0f64..100.0,
    ) {
        let mut bc = BcCoeffs::new(1);
        bc.set_neumann_scalar(0, qimp, hint);
        prop_assert_eq!(bc.flux(0, pi), qimp);
        // The reconstructed gradient matches -q/h.
        prop_assert!((bc.face_value(0, pi) - (pi - qimp / hint)).abs()
            < 1e-9 * (1.0 + pi.abs() + (qimp / hint).abs()));
    }
}

#[test]
fn potential_flux_of_a_uniform_field_has_zero_divergence() {
    let mesh = structured_box(3, 3, 3, [1.0, 1.0, 1.0]);
    let mq = MeshQuantities::compute(&mesh);
    let bc = BcCoeffs::new(mesh.n_b_faces());
    let c_visc = vec![2.5; mesh.n_cells];
    let mut i_visc = vec![0.0; mesh.n_i_faces()];
    let mut b_visc = vec![0.0; mesh.n_b_faces()];
    face_viscosity(
        &mesh,
        &mq,
        FaceViscosityRule::Harmonic,
        &c_visc,
        &mut i_visc,
        &mut b_visc,
    );

    let pvar = vec![7.0; mesh.n_cells];
    let mut i_flux = vec![0.0; mesh.n_i_faces()];
    let mut b_flux = vec![0.0; mesh.n_b_faces()];
    face_diffusion_potential(
        &mesh, &mq, true, 1, &bc, &pvar, &i_visc, &b_visc, &mut i_flux, &mut b_flux,
    );

    let mut div = vec![0.0; mesh.n_cells];
    divergence(&mesh, true, &i_flux, &b_flux, &mut div);
    for c in 0..mesh.n_cells {
        assert!(div[c].abs() < 1e-10);
    }
}

#[test]
fn manufactured_diffusion_solution_is_recovered() {
    // -lap(u) = 0 with u = x imposed through Dirichlet walls on both x
    // sides: the solver reproduces the linear profile through the whole
    // outer-sweep machinery.
    let mesh = structured_box(6, 2, 2, [1.0, 1.0, 1.0]);
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
    face_viscosity(
        &mesh,
        &mq,
        FaceViscosityRule::Arithmetic,
        &c_visc,
        &mut i_visc,
        &mut b_visc,
    );

    let eqp = EquationParams {
        ndircl,
        nswrsm: 3,
        ..Default::default()
    };
    let comm = NoComm;
    let ctx = SolverContext::new(&comm, None);
    let solver = NativeSolver::default();

    let rovsdt = vec![0.0; mesh.n_cells];
    let smbrp = vec![0.0; mesh.n_cells];
    let zeros_i = vec![0.0; mesh.n_i_faces()];
    let zeros_b = vec![0.0; mesh.n_b_faces()];
    let pvara = vec![0.0; mesh.n_cells];
    let mut pvar = vec![0.0; mesh.n_cells];
    let mut dpvar = vec![0.0; mesh.n_cells];

    equation_iterative_solve_scalar(
        &ctx, &solver, &mesh, &mq, &eqp, "linear_profile", -1.0, &bc, &zeros_i, &zeros_b, &i_visc,
        &b_visc, &rovsdt, &smbrp, &pvara, &mut pvar, &mut dpvar,
    )
    .unwrap();

    for c in 0..mesh.n_cells {
        assert!((pvar[c] - mq.cell_cen[c][0]).abs() < 1e-6);
    }
}

#[test]
fn operators_add_into_the_rhs_without_overwriting() {
    use fv_mesh::operators::convection_diffusion::convection_diffusion_scalar;
    let mesh = structured_box(2, 2, 1, [1.0, 1.0, 1.0]);
    let mq = MeshQuantities::compute(&mesh);
    let bc = BcCoeffs::new(mesh.n_b_faces());
    let eqp = EquationParams::default();

    let pvar = vec![1.0; mesh.n_cells];
    let zeros_i = vec![0.0; mesh.n_i_faces()];
    let zeros_b = vec![0.0; mesh.n_b_faces()];
    let i_visc = vec![0.0; mesh.n_i_faces()];
    let b_visc = vec![0.0; mesh.n_b_faces()];

    // Pre-existing RHS content survives a no-op operator call.
    let mut rhs = vec![42.0; mesh.n_cells];
    convection_diffusion_scalar(
        &eqp, &mesh, &mq, &bc, &pvar, &zeros_i, &zeros_b, &i_visc, &b_visc, &mut rhs,
    );
    for c in 0..mesh.n_cells {
        assert_eq!(rhs[c], 42.0);
    }
}
