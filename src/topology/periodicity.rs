//! Periodicity transforms: rigid motions identifying two boundary patches.
//!
//! Transforms are stored in forward/reverse pairs; `reverse_id(t)` flips
//! the low bit. Rotations imply vector and tensor rotation during halo
//! synchronization; translations leave field values untouched.

use crate::math::{self, Vec3};
use serde::{Deserialize, Serialize};

/// One rigid motion.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Transform {
    /// Pure translation by the given vector.
    Translation(Vec3),
    /// Rotation about `invariant` by the given 3x3 matrix.
    Rotation {
        matrix: [[f64; 3]; 3],
        invariant: Vec3,
    },
}

impl Transform {
    /// Apply to a point in space.
    pub fn apply_point(&self, p: Vec3) -> Vec3 {
        match self {
            Transform::Translation(t) => math::add(p, *t),
            Transform::Rotation { matrix, invariant } => {
                let r = math::mat_33_3_product(*matrix, math::sub(p, *invariant));
                math::add(r, *invariant)
            }
        }
    }

    /// Apply to a direction/field vector (translations are identity).
    pub fn apply_vector(&self, v: Vec3) -> Vec3 {
        match self {
            Transform::Translation(_) => v,
            Transform::Rotation { matrix, .. } => math::mat_33_3_product(*matrix, v),
        }
    }

    /// Apply to a symmetric tensor in Voigt order (`r t r^T`).
    pub fn apply_sym_tensor(&self, t: [f64; 6]) -> [f64; 6] {
        match self {
            Transform::Translation(_) => t,
            Transform::Rotation { matrix, .. } => {
                math::sym_from_33(math::mat_33_transform(*matrix, math::sym_to_33(t)))
            }
        }
    }

    /// Apply to a full 3x3 tensor stored row-major (`r t r^T`).
    pub fn apply_tensor(&self, t: [f64; 9]) -> [f64; 9] {
        match self {
            Transform::Translation(_) => t,
            Transform::Rotation { matrix, .. } => {
                let full = [
                    [t[0], t[1], t[2]],
                    [t[3], t[4], t[5]],
                    [t[6], t[7], t[8]],
                ];
                let out = math::mat_33_transform(*matrix, full);
                [
                    out[0][0], out[0][1], out[0][2], out[1][0], out[1][1], out[1][2], out[2][0],
                    out[2][1], out[2][2],
                ]
            }
        }
    }

    /// Inverse motion.
    pub fn reverse(&self) -> Transform {
        match self {
            Transform::Translation(t) => Transform::Translation([-t[0], -t[1], -t[2]]),
            Transform::Rotation { matrix, invariant } => {
                let mut inv = [[0.0; 3]; 3];
                for i in 0..3 {
                    for j in 0..3 {
                        inv[i][j] = matrix[j][i];
                    }
                }
                Transform::Rotation {
                    matrix: inv,
                    invariant: *invariant,
                }
            }
        }
    }

    pub fn is_rotation(&self) -> bool {
        matches!(self, Transform::Rotation { .. })
    }
}

/// Set of periodicity transforms attached to a mesh.
///
/// Each declared periodicity contributes two consecutive slots: the
/// forward transform at an even id and its reverse at the odd id.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Periodicity {
    transforms: Vec<Transform>,
}

impl Periodicity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a periodicity; returns the forward transform id.
    pub fn add(&mut self, transform: Transform) -> usize {
        let id = self.transforms.len();
        let rev = transform.reverse();
        self.transforms.push(transform);
        self.transforms.push(rev);
        id
    }

    /// Convenience: translation periodicity.
    pub fn add_translation(&mut self, t: Vec3) -> usize {
        self.add(Transform::Translation(t))
    }

    /// Convenience: rotation periodicity about an axis through `invariant`
    /// by `theta` radians.
    pub fn add_rotation(&mut self, axis: Vec3, theta: f64, invariant: Vec3) -> usize {
        let n = math::norm(axis);
        let u = [axis[0] / n, axis[1] / n, axis[2] / n];
        let (s, c) = theta.sin_cos();
        let omc = 1.0 - c;
        let matrix = [
            [
                c + u[0] * u[0] * omc,
                u[0] * u[1] * omc - u[2] * s,
                u[0] * u[2] * omc + u[1] * s,
            ],
            [
                u[1] * u[0] * omc + u[2] * s,
                c + u[1] * u[1] * omc,
                u[1] * u[2] * omc - u[0] * s,
            ],
            [
                u[2] * u[0] * omc - u[1] * s,
                u[2] * u[1] * omc + u[0] * s,
                c + u[2] * u[2] * omc,
            ],
        ];
        self.add(Transform::Rotation { matrix, invariant })
    }

    #[inline]
    pub fn n_transforms(&self) -> usize {
        self.transforms.len()
    }

    #[inline]
    pub fn transform(&self, id: usize) -> &Transform {
        &self.transforms[id]
    }

    /// Id of the reverse transform.
    #[inline]
    pub fn reverse_id(&self, id: usize) -> usize {
        id ^ 1
    }

    /// Number of transforms involving a rotation.
    pub fn n_rotations(&self) -> usize {
        self.transforms.iter().filter(|t| t.is_rotation()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_roundtrip_on_points_and_vectors() {
        let mut p = Periodicity::new();
        let id = p.add_rotation([0.0, 0.0, 1.0], std::f64::consts::FRAC_PI_2, [0.0; 3]);
        let fwd = p.transform(id);
        let rev = p.transform(p.reverse_id(id));

        let x = [1.0, 0.0, 0.5];
        let y = fwd.apply_point(x);
        assert!((y[0] - 0.0).abs() < 1e-12 && (y[1] - 1.0).abs() < 1e-12);
        let back = rev.apply_point(y);
        for k in 0..3 {
            assert!((back[k] - x[k]).abs() < 1e-12);
        }

        let v = fwd.apply_vector([1.0, 0.0, 0.0]);
        assert!((v[1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn sym_tensor_rotation_preserves_trace() {
        let mut p = Periodicity::new();
        let id = p.add_rotation([0.0, 1.0, 0.0], 0.7, [0.0; 3]);
        let t = [2.0, 1.0, 3.0, 0.5, -0.5, 0.25];
        let r = p.transform(id).apply_sym_tensor(t);
        let tr_before = t[0] + t[1] + t[2];
        let tr_after = r[0] + r[1] + r[2];
        assert!((tr_before - tr_after).abs() < 1e-12);
    }
}
