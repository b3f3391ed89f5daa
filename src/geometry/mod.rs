//! Mesh quantities: face and cell geometry derived from the topology.
//!
//! Computed lazily from a [`Mesh`] and tagged with the mesh epoch; the
//! operators consume these arrays read-only. Face geometry uses a
//! triangle-fan decomposition from the ring barycentre, which handles
//! arbitrary planar or mildly warped polygons.

use crate::math::{self, EPZERO, Vec3};
use crate::topology::INVALID_ID;
use crate::topology::mesh::Mesh;

/// Per-cell flag: geometry is unreliable, replace the field value by the
/// regularisation solve.
pub const BAD_CELL_TO_REGULARIZE: u32 = 1 << 0;
/// Per-cell flag: cell is excluded from the computation entirely.
pub const BAD_CELL_DISABLED: u32 = 1 << 1;

/// Geometric quantities attached to one mesh epoch.
#[derive(Clone, Debug, Default)]
pub struct MeshQuantities {
    epoch: u64,

    // Cells
    pub cell_cen: Vec<Vec3>,
    pub cell_vol: Vec<f64>,
    pub tot_vol: f64,

    // Interior faces
    pub i_face_cog: Vec<Vec3>,
    pub i_face_normal: Vec<Vec3>,
    pub i_face_surf: Vec<f64>,
    pub i_face_u_normal: Vec<Vec3>,
    /// Distance between adjacent cell centres projected on the normal.
    pub i_dist: Vec<f64>,
    /// Interpolation weight of the first adjacent cell at the face.
    pub weight: Vec<f64>,

    // Boundary faces
    pub b_face_cog: Vec<Vec3>,
    pub b_face_normal: Vec<Vec3>,
    pub b_face_surf: Vec<f64>,
    pub b_face_u_normal: Vec<Vec3>,
    /// Distance from the adjacent cell centre to the face.
    pub b_dist: Vec<f64>,

    // Bad-cell handling
    pub bad_cells_regularisation: bool,
    pub bad_cell_flag: Vec<u32>,

    // Immersed boundaries (optional)
    pub c_w_face_surf: Option<Vec<f64>>,
    pub c_w_dist_inv: Option<Vec<f64>>,

    /// Degenerate distances floored during computation (diagnostic).
    pub n_clipped_dist: usize,
}

/// Centroid and area vector of one polygonal face ring.
fn face_geometry(ring: &[usize], coords: &[Vec3]) -> (Vec3, Vec3) {
    let n = ring.len();
    let mut bary = [0.0; 3];
    for &v in ring {
        bary = math::add(bary, coords[v]);
    }
    bary = math::scale(1.0 / n as f64, bary);

    let mut area = [0.0; 3];
    let mut cog = [0.0; 3];
    let mut surf_sum = 0.0;
    for k in 0..n {
        let a = coords[ring[k]];
        let b = coords[ring[(k + 1) % n]];
        let tri = math::scale(0.5, math::cross(math::sub(a, bary), math::sub(b, bary)));
        let tri_surf = math::norm(tri);
        let tri_cog = math::scale(
            1.0 / 3.0,
            math::add(math::add(a, b), bary),
        );
        area = math::add(area, tri);
        cog = math::add(cog, math::scale(tri_surf, tri_cog));
        surf_sum += tri_surf;
    }
    if surf_sum > EPZERO {
        cog = math::scale(1.0 / surf_sum, cog);
    } else {
        cog = bary;
    }
    (cog, area)
}

impl MeshQuantities {
    /// Compute all quantities for the current mesh state.
    pub fn compute(mesh: &Mesh) -> Self {
        let n_cells_ext = mesh.n_cells_with_ghosts;
        let n_i = mesh.n_i_faces();
        let n_b = mesh.n_b_faces();

        let mut mq = MeshQuantities {
            epoch: mesh.epoch(),
            cell_cen: vec![[0.0; 3]; n_cells_ext],
            cell_vol: vec![0.0; n_cells_ext],
            i_face_cog: vec![[0.0; 3]; n_i],
            i_face_normal: vec![[0.0; 3]; n_i],
            i_face_surf: vec![0.0; n_i],
            i_face_u_normal: vec![[0.0; 3]; n_i],
            i_dist: vec![0.0; n_i],
            weight: vec![0.5; n_i],
            b_face_cog: vec![[0.0; 3]; n_b],
            b_face_normal: vec![[0.0; 3]; n_b],
            b_face_surf: vec![0.0; n_b],
            b_face_u_normal: vec![[0.0; 3]; n_b],
            b_dist: vec![0.0; n_b],
            bad_cell_flag: vec![0; n_cells_ext],
            ..Default::default()
        };

        for f in 0..n_i {
            let (cog, area) = face_geometry(mesh.i_face_vtx.row(f), &mesh.vtx_coord);
            let surf = math::norm(area);
            mq.i_face_cog[f] = cog;
            mq.i_face_normal[f] = area;
            mq.i_face_surf[f] = surf;
            mq.i_face_u_normal[f] = if surf > EPZERO {
                math::scale(1.0 / surf, area)
            } else {
                [0.0; 3]
            };
        }
        for f in 0..n_b {
            let (cog, area) = face_geometry(mesh.b_face_vtx.row(f), &mesh.vtx_coord);
            let surf = math::norm(area);
            mq.b_face_cog[f] = cog;
            mq.b_face_normal[f] = area;
            mq.b_face_surf[f] = surf;
            mq.b_face_u_normal[f] = if surf > EPZERO {
                math::scale(1.0 / surf, area)
            } else {
                [0.0; 3]
            };
        }

        mq.compute_cell_geometry(mesh);
        mq.compute_face_distances(mesh);
        mq
    }

    /// Cell volumes and centroids by divergence over the bounding faces:
    /// `V = (1/3) Σ_f cog_f · S_f` with outward orientation.
    fn compute_cell_geometry(&mut self, mesh: &Mesh) {
        let n_cells = mesh.n_cells_with_ghosts;
        let mut vol = vec![0.0; n_cells];
        let mut cen = vec![[0.0; 3]; n_cells];

        let mut accumulate = |cell: usize, cog: Vec3, area: Vec3, sign: f64| {
            if cell == INVALID_ID || cell >= n_cells {
                return;
            }
            let s = math::scale(sign, area);
            // Divergence of x/3 gives the volume; of x^2/2 the first moment.
            vol[cell] += math::dot(cog, s) / 3.0;
            for k in 0..3 {
                cen[cell][k] += 0.5 * cog[k] * cog[k] * s[k];
            }
        };

        for f in 0..mesh.n_i_faces() {
            let [c1, c2] = mesh.i_face_cells[f];
            accumulate(c1, self.i_face_cog[f], self.i_face_normal[f], 1.0);
            accumulate(c2, self.i_face_cog[f], self.i_face_normal[f], -1.0);
        }
        for f in 0..mesh.n_b_faces() {
            accumulate(
                mesh.b_face_cells[f],
                self.b_face_cog[f],
                self.b_face_normal[f],
                1.0,
            );
        }

        let mut tot = 0.0;
        for c in 0..n_cells {
            if vol[c].abs() > EPZERO {
                cen[c] = math::scale(1.0 / vol[c], cen[c]);
            }
            if c < mesh.n_cells {
                tot += vol[c];
            }
        }
        self.cell_vol = vol;
        self.cell_cen = cen;
        self.tot_vol = tot;
    }

    fn compute_face_distances(&mut self, mesh: &Mesh) {
        let mut n_clipped = 0usize;
        for f in 0..mesh.n_i_faces() {
            let [c1, c2] = mesh.i_face_cells[f];
            if c1 == INVALID_ID || c2 == INVALID_ID {
                continue;
            }
            let x1 = self.cell_cen[c1];
            let x2 = self.cell_cen[c2];
            let u = self.i_face_u_normal[f];
            let d = math::dot(math::sub(x2, x1), u);
            if d <= EPZERO {
                n_clipped += 1;
                self.i_dist[f] = EPZERO;
                self.weight[f] = 0.5;
            } else {
                self.i_dist[f] = d;
                // Fraction of the segment attributed to cell 1.
                let df = math::dot(math::sub(x2, self.i_face_cog[f]), u);
                self.weight[f] = (df / d).clamp(0.0, 1.0);
            }
        }
        for f in 0..mesh.n_b_faces() {
            let c = mesh.b_face_cells[f];
            if c == INVALID_ID {
                continue;
            }
            let d = math::dot(
                math::sub(self.b_face_cog[f], self.cell_cen[c]),
                self.b_face_u_normal[f],
            );
            if d <= EPZERO {
                n_clipped += 1;
                self.b_dist[f] = EPZERO;
            } else {
                self.b_dist[f] = d;
            }
        }
        if n_clipped > 0 {
            log::warn!("{n_clipped} degenerate cell/face distances floored");
        }
        self.n_clipped_dist = n_clipped;
    }

    /// Epoch of the mesh these quantities were computed from.
    #[inline]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// True when `cell` carries the regularisation flag.
    #[inline]
    pub fn is_bad_cell(&self, cell: usize) -> bool {
        self.bad_cell_flag[cell] & BAD_CELL_TO_REGULARIZE != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meshgen::structured_box;

    #[test]
    fn unit_cube_volume_and_centers() {
        let mesh = structured_box(2, 2, 2, [1.0, 1.0, 1.0]);
        let mq = MeshQuantities::compute(&mesh);
        assert!((mq.tot_vol - 1.0).abs() < 1e-12);
        for c in 0..mesh.n_cells {
            assert!((mq.cell_vol[c] - 0.125).abs() < 1e-12);
        }
        // Every interior face sits between cell centres 0.5 apart.
        for f in 0..mesh.n_i_faces() {
            assert!((mq.i_dist[f] - 0.5).abs() < 1e-12);
            assert!((mq.weight[f] - 0.5).abs() < 1e-12);
            assert!((mq.i_face_surf[f] - 0.25).abs() < 1e-12);
        }
        for f in 0..mesh.n_b_faces() {
            assert!((mq.b_dist[f] - 0.25).abs() < 1e-12);
        }
        assert_eq!(mq.n_clipped_dist, 0);
    }
}
