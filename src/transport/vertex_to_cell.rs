//! Vertex to cell interpolation.
//!
//! Three methods behind one interface: unweighted averaging, Shepard
//! (inverse-distance) weighting and a least-squares linear fit whose
//! intercept at the cell centre is the interpolated value. Weights and
//! factorizations are cached per cell and invalidated when the mesh
//! epoch changes.

use crate::geometry::MeshQuantities;
use crate::math::{self, sym_44_factor_ldlt, sym_44_partial_solve_ldlt};
use crate::topology::mesh::Mesh;

/// Interpolation method.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VertexToCellMethod {
    /// Plain average over the cell's vertices.
    Unweighted,
    /// Inverse-distance (Shepard) weighting.
    Shepard,
    /// Least-squares linear regression.
    Lsq,
}

/// Interpolator with per-method caches.
#[derive(Clone, Debug, Default)]
pub struct VertexToCell {
    epoch: Option<u64>,
    /// `1 / valence` per cell.
    w_unweighted: Option<Vec<f64>>,
    /// Normalized inverse-distance weight per cell-vertex pair.
    w_shepard: Option<Vec<f64>>,
    /// Packed LDL^T factorization of the 4x4 normal matrix per cell.
    f_lsq: Option<Vec<[f64; 10]>>,
}

impl VertexToCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the cached weights; subsequent calls rebuild them.
    pub fn invalidate(&mut self) {
        self.epoch = None;
        self.w_unweighted = None;
        self.w_shepard = None;
        self.f_lsq = None;
    }

    fn refresh_epoch(&mut self, mesh: &Mesh) {
        if self.epoch != Some(mesh.epoch()) {
            self.invalidate();
            self.epoch = Some(mesh.epoch());
        }
    }

    fn build_unweighted(&mut self, mesh: &Mesh) {
        let c2v = mesh.cell_vertices();
        let w: Vec<f64> = (0..mesh.n_cells)
            .map(|c| 1.0 / c2v.row_len(c).max(1) as f64)
            .collect();
        self.w_unweighted = Some(w);
    }

    fn build_shepard(&mut self, mesh: &Mesh, mq: &MeshQuantities) {
        let c2v = mesh.cell_vertices();
        let mut w = vec![0.0; c2v.idx[mesh.n_cells]];
        for c in 0..mesh.n_cells {
            let c_coo = mq.cell_cen[c];
            let s = c2v.idx[c];
            let e = c2v.idx[c + 1];

            // A vertex collocated with the cell centre dominates: keep
            // the collocated vertices and drop the rest.
            let mut n_collocated = 0usize;
            for j in s..e {
                if math::distance(mesh.vtx_coord[c2v.ids[j]], c_coo) <= f64::MIN_POSITIVE {
                    n_collocated += 1;
                }
            }
            if n_collocated > 0 {
                for j in s..e {
                    let collocated =
                        math::distance(mesh.vtx_coord[c2v.ids[j]], c_coo) <= f64::MIN_POSITIVE;
                    w[j] = if collocated {
                        1.0 / n_collocated as f64
                    } else {
                        0.0
                    };
                }
                continue;
            }

            let mut w_sum = 0.0;
            for j in s..e {
                let d = math::distance(mesh.vtx_coord[c2v.ids[j]], c_coo);
                let wj = 1.0 / d;
                w[j] = wj;
                w_sum += wj;
            }
            for wj in w[s..e].iter_mut() {
                *wj /= w_sum;
            }
        }
        self.w_shepard = Some(w);
    }

    fn build_lsq(&mut self, mesh: &Mesh, mq: &MeshQuantities) {
        let c2v = mesh.cell_vertices();
        let mut f = vec![[0.0; 10]; mesh.n_cells];
        for c in 0..mesh.n_cells {
            let c_coo = mq.cell_cen[c];
            let a = &mut f[c];
            for j in c2v.idx[c]..c2v.idx[c + 1] {
                let r = math::sub(mesh.vtx_coord[c2v.ids[j]], c_coo);
                a[0] += r[0] * r[0];
                a[1] += r[1] * r[0];
                a[2] += r[1] * r[1];
                a[3] += r[2] * r[0];
                a[4] += r[2] * r[1];
                a[5] += r[2] * r[2];
                a[6] += r[0];
                a[7] += r[1];
                a[8] += r[2];
                a[9] += 1.0;
            }
            sym_44_factor_ldlt(a);
        }
        self.f_lsq = Some(f);
    }

    /// Interpolate interlaced vertex values to cell values.
    ///
    /// `v_weight` optionally weights each vertex's contribution; weighted
    /// requests bypass the caches. `c_var` is overwritten over owned
    /// cells.
    pub fn interpolate<const STRIDE: usize>(
        &mut self,
        mesh: &Mesh,
        mq: &MeshQuantities,
        method: VertexToCellMethod,
        v_weight: Option<&[f64]>,
        v_var: &[f64],
        c_var: &mut [f64],
    ) {
        self.refresh_epoch(mesh);
        let c2v = mesh.cell_vertices();
        let n_cells = mesh.n_cells;

        c_var[..n_cells * STRIDE].fill(0.0);

        match method {
            VertexToCellMethod::Unweighted => match v_weight {
                None => {
                    if self.w_unweighted.is_none() {
                        self.build_unweighted(mesh);
                    }
                    let w = self.w_unweighted.as_ref().unwrap();
                    for c in 0..n_cells {
                        for j in c2v.idx[c]..c2v.idx[c + 1] {
                            let v = c2v.ids[j];
                            for k in 0..STRIDE {
                                c_var[c * STRIDE + k] += v_var[v * STRIDE + k];
                            }
                        }
                        for k in 0..STRIDE {
                            c_var[c * STRIDE + k] *= w[c];
                        }
                    }
                }
                Some(vw) => {
                    for c in 0..n_cells {
                        let mut c_w = 0.0;
                        for j in c2v.idx[c]..c2v.idx[c + 1] {
                            let v = c2v.ids[j];
                            for k in 0..STRIDE {
                                c_var[c * STRIDE + k] += v_var[v * STRIDE + k] * vw[v];
                            }
                            c_w += vw[v];
                        }
                        for k in 0..STRIDE {
                            c_var[c * STRIDE + k] /= c_w;
                        }
                    }
                }
            },

            VertexToCellMethod::Shepard => {
                if self.w_shepard.is_none() {
                    self.build_shepard(mesh, mq);
                }
                let w = self.w_shepard.as_ref().unwrap();
                match v_weight {
                    None => {
                        for c in 0..n_cells {
                            for j in c2v.idx[c]..c2v.idx[c + 1] {
                                let v = c2v.ids[j];
                                for k in 0..STRIDE {
                                    c_var[c * STRIDE + k] += v_var[v * STRIDE + k] * w[j];
                                }
                            }
                        }
                    }
                    Some(vw) => {
                        for c in 0..n_cells {
                            let mut c_w = 0.0;
                            for j in c2v.idx[c]..c2v.idx[c + 1] {
                                let v = c2v.ids[j];
                                for k in 0..STRIDE {
                                    c_var[c * STRIDE + k] += v_var[v * STRIDE + k] * w[j] * vw[v];
                                }
                                c_w += w[j] * vw[v];
                            }
                            for k in 0..STRIDE {
                                c_var[c * STRIDE + k] /= c_w;
                            }
                        }
                    }
                }
            }

            VertexToCellMethod::Lsq => match v_weight {
                None => {
                    if self.f_lsq.is_none() {
                        self.build_lsq(mesh, mq);
                    }
                    let ldlt = self.f_lsq.as_ref().unwrap();
                    for c in 0..n_cells {
                        let c_coo = mq.cell_cen[c];
                        let mut rhs = [[0.0; 4]; STRIDE];
                        for j in c2v.idx[c]..c2v.idx[c + 1] {
                            let v = c2v.ids[j];
                            let r = math::sub(mesh.vtx_coord[v], c_coo);
                            for k in 0..STRIDE {
                                let phi = v_var[v * STRIDE + k];
                                rhs[k][0] += r[0] * phi;
                                rhs[k][1] += r[1] * phi;
                                rhs[k][2] += r[2] * phi;
                                rhs[k][3] += phi;
                            }
                        }
                        for k in 0..STRIDE {
                            c_var[c * STRIDE + k] = sym_44_partial_solve_ldlt(&ldlt[c], rhs[k]);
                        }
                    }
                }
                Some(vw) => {
                    // Weighted fits rebuild the normal matrix per call.
                    for c in 0..n_cells {
                        let c_coo = mq.cell_cen[c];
                        let mut a = [0.0; 10];
                        let mut rhs = [[0.0; 4]; STRIDE];
                        for j in c2v.idx[c]..c2v.idx[c + 1] {
                            let v = c2v.ids[j];
                            let wv = vw[v];
                            let r = math::sub(mesh.vtx_coord[v], c_coo);
                            a[0] += wv * r[0] * r[0];
                            a[1] += wv * r[1] * r[0];
                            a[2] += wv * r[1] * r[1];
                            a[3] += wv * r[2] * r[0];
                            a[4] += wv * r[2] * r[1];
                            a[5] += wv * r[2] * r[2];
                            a[6] += wv * r[0];
                            a[7] += wv * r[1];
                            a[8] += wv * r[2];
                            a[9] += wv;
                            for k in 0..STRIDE {
                                let phi = v_var[v * STRIDE + k];
                                rhs[k][0] += wv * r[0] * phi;
                                rhs[k][1] += wv * r[1] * phi;
                                rhs[k][2] += wv * r[2] * phi;
                                rhs[k][3] += wv * phi;
                            }
                        }
                        sym_44_factor_ldlt(&mut a);
                        for k in 0..STRIDE {
                            c_var[c * STRIDE + k] = sym_44_partial_solve_ldlt(&a, rhs[k]);
                        }
                    }
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::MeshQuantities;
    use crate::meshgen::structured_box;

    fn affine(x: [f64; 3]) -> f64 {
        x[0] + 2.0 * x[1] + 3.0 * x[2]
    }

    #[test]
    fn lsq_reproduces_affine_fields_exactly() {
        let mesh = structured_box(3, 2, 2, [1.0, 1.0, 1.0]);
        let mq = MeshQuantities::compute(&mesh);
        let v_var: Vec<f64> = mesh.vtx_coord.iter().map(|&x| affine(x)).collect();
        let mut c_var = vec![0.0; mesh.n_cells];
        let mut interp = VertexToCell::new();
        interp.interpolate::<1>(
            &mesh,
            &mq,
            VertexToCellMethod::Lsq,
            None,
            &v_var,
            &mut c_var,
        );
        for c in 0..mesh.n_cells {
            let expect = affine(mq.cell_cen[c]);
            assert!(
                (c_var[c] - expect).abs() < 1e-10,
                "cell {c}: {} vs {expect}",
                c_var[c]
            );
        }
    }

    #[test]
    fn shepard_matches_average_for_symmetric_cells() {
        // On a hexahedron all vertices sit at the same distance from the
        // centre, so Shepard and the plain average agree.
        let mesh = structured_box(2, 2, 2, [1.0, 1.0, 1.0]);
        let mq = MeshQuantities::compute(&mesh);
        let v_var: Vec<f64> = mesh.vtx_coord.iter().map(|&x| affine(x)).collect();
        let mut shep = vec![0.0; mesh.n_cells];
        let mut unw = vec![0.0; mesh.n_cells];
        let mut interp = VertexToCell::new();
        interp.interpolate::<1>(
            &mesh,
            &mq,
            VertexToCellMethod::Shepard,
            None,
            &v_var,
            &mut shep,
        );
        interp.interpolate::<1>(
            &mesh,
            &mq,
            VertexToCellMethod::Unweighted,
            None,
            &v_var,
            &mut unw,
        );
        for c in 0..mesh.n_cells {
            assert!((shep[c] - unw[c]).abs() < 1e-12);
        }
    }

    #[test]
    fn shepard_weights_sum_to_one() {
        let mesh = structured_box(3, 3, 1, [2.0, 1.0, 0.5]);
        let mq = MeshQuantities::compute(&mesh);
        let mut interp = VertexToCell::new();
        interp.refresh_epoch(&mesh);
        interp.build_shepard(&mesh, &mq);
        let w = interp.w_shepard.as_ref().unwrap();
        let c2v = mesh.cell_vertices();
        for c in 0..mesh.n_cells {
            let sum: f64 = w[c2v.idx[c]..c2v.idx[c + 1]].iter().sum();
            assert!((sum - 1.0).abs() < 1e-12, "cell {c}: {sum}");
        }
    }

    #[test]
    fn caches_invalidate_with_the_mesh_epoch() {
        let mut mesh = structured_box(2, 1, 1, [1.0, 1.0, 1.0]);
        let mq = MeshQuantities::compute(&mesh);
        let v_var: Vec<f64> = mesh.vtx_coord.iter().map(|&x| affine(x)).collect();
        let mut c_var = vec![0.0; mesh.n_cells];
        let mut interp = VertexToCell::new();
        interp.interpolate::<1>(
            &mesh,
            &mq,
            VertexToCellMethod::Unweighted,
            None,
            &v_var,
            &mut c_var,
        );
        assert!(interp.w_unweighted.is_some());
        mesh.mark_modified(crate::topology::mesh::ModifiedFlags::GEOMETRY);
        interp.interpolate::<1>(
            &mesh,
            &mq,
            VertexToCellMethod::Unweighted,
            None,
            &v_var,
            &mut c_var,
        );
        // Cache was rebuilt against the new epoch.
        assert_eq!(interp.epoch, Some(mesh.epoch()));
    }
}
