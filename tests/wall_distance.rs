//! Wall-distance scenarios on a plane channel.

use fv_mesh::comm::NoComm;
use fv_mesh::field::BoundaryType;
use fv_mesh::geometry::MeshQuantities;
use fv_mesh::meshgen::structured_box;
use fv_mesh::operators::equation::EquationParams;
use fv_mesh::solver::{NativeSolver, SolverContext};
use fv_mesh::topology::mesh::Mesh;
use fv_mesh::transport::wall_distance::{WallDistance, YPlus};

fn channel_bc(mesh: &Mesh) -> Vec<BoundaryType> {
    let fam_zmin = mesh.families.iter().position(|g| g == "zmin").unwrap() as i32 + 2;
    let fam_zmax = mesh.families.iter().position(|g| g == "zmax").unwrap() as i32 + 2;
    (0..mesh.n_b_faces())
        .map(|f| {
            if mesh.b_face_family[f] == fam_zmin || mesh.b_face_family[f] == fam_zmax {
                BoundaryType::SmoothWall
            } else {
                BoundaryType::Symmetry
            }
        })
        .collect()
}

#[test]
fn channel_distance_is_the_minimum_to_either_wall() {
    let mesh = structured_box(3, 3, 12, [1.0, 1.0, 1.0]);
    let mq = MeshQuantities::compute(&mesh);
    let bc_type = channel_bc(&mesh);
    let comm = NoComm;
    let ctx = SolverContext::new(&comm, None);
    let solver = NativeSolver::default();
    let mut eqp = EquationParams::default();

    let mut wd = WallDistance::new(&mesh);
    wd.compute(&ctx, &solver, &mesh, &mq, &bc_type, &mut eqp)
        .unwrap();

    assert_eq!(wd.n_clip_negative, 0, "no negative clip on a clean channel");
    for c in 0..mesh.n_cells {
        let z = mq.cell_cen[c][2];
        let expect = z.min(1.0 - z);
        let err = (wd.wall_dist[c] - expect).abs() / expect;
        assert!(err < 0.05, "cell {c}: {} vs {expect}", wd.wall_dist[c]);
        assert!(wd.wall_dist[c] >= 0.0);
    }
}

#[test]
fn yplus_scales_the_distance_by_the_wall_friction() {
    let mesh = structured_box(2, 2, 8, [1.0, 1.0, 1.0]);
    let mq = MeshQuantities::compute(&mesh);
    let bc_type = channel_bc(&mesh);
    let comm = NoComm;
    let ctx = SolverContext::new(&comm, None);
    let solver = NativeSolver::default();
    let mut eqp = EquationParams::default();

    let mut wd = WallDistance::new(&mesh);
    wd.compute(&ctx, &solver, &mesh, &mq, &bc_type, &mut eqp)
        .unwrap();

    let crom = vec![1.2; mesh.n_cells];
    let viscl = vec![1.5e-5; mesh.n_cells];
    let b_uet = vec![0.05; mesh.n_b_faces()];
    let mut visct = vec![1.0e-3; mesh.n_cells];
    let visvdr = vec![f64::NAN; mesh.n_cells];

    let mut yp = YPlus::new(&mesh);

    // The first time step leaves y+ at its sentinel.
    yp.compute(
        &ctx, &solver, &mesh, &mq, &bc_type, &eqp, &mut wd, &crom, &viscl, &b_uet, 1, &mut visct,
        &visvdr,
    )
    .unwrap();
    assert!(yp.yplus[0] > 1.0e11);

    // With uniform friction velocity, y+ = u* rho / mu * d exactly.
    yp.compute(
        &ctx, &solver, &mesh, &mq, &bc_type, &eqp, &mut wd, &crom, &viscl, &b_uet, 2, &mut visct,
        &visvdr,
    )
    .unwrap();
    let coef = 0.05 * 1.2 / 1.5e-5;
    for c in 0..mesh.n_cells {
        let expect = coef * wd.wall_dist[c];
        let err = (yp.yplus[c] - expect).abs() / expect;
        assert!(err < 1e-6, "cell {c}: {} vs {expect}", yp.yplus[c]);
    }

    // Van Driest damping reduced the turbulent viscosity everywhere
    // (y+ is large here, so the factor is close to one but below it).
    for c in 0..mesh.n_cells {
        assert!(visct[c] <= 1.0e-3 + 1e-15);
    }
}

#[test]
fn absorbed_wall_viscosity_is_restored_after_damping() {
    let mesh = structured_box(2, 2, 4, [1.0, 1.0, 1.0]);
    let mq = MeshQuantities::compute(&mesh);
    let bc_type = channel_bc(&mesh);
    let comm = NoComm;
    let ctx = SolverContext::new(&comm, None);
    let solver = NativeSolver::default();
    let mut eqp = EquationParams::default();

    let mut wd = WallDistance::new(&mesh);
    wd.compute(&ctx, &solver, &mesh, &mq, &bc_type, &mut eqp)
        .unwrap();

    let crom = vec![1.0; mesh.n_cells];
    let viscl = vec![1.0e-5; mesh.n_cells];
    let b_uet = vec![0.1; mesh.n_b_faces()];
    let mut visct = vec![2.0e-3; mesh.n_cells];
    let mut visvdr = vec![f64::NAN; mesh.n_cells];
    visvdr[0] = 7.0e-4; // wall cell with an absorbed value

    let mut yp = YPlus::new(&mesh);
    yp.compute(
        &ctx, &solver, &mesh, &mq, &bc_type, &eqp, &mut wd, &crom, &viscl, &b_uet, 2, &mut visct,
        &visvdr,
    )
    .unwrap();

    assert_eq!(visct[0], 7.0e-4);
}
