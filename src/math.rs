//! Small dense linear algebra used by the operators and interpolation.
//!
//! Everything here is fixed-size and allocation-free: 3-vectors, 3x3 and
//! symmetric 3x3 tensors (Voigt order xx, yy, zz, xy, yz, xz), and the
//! packed symmetric 4x4 LDL^T factorization used by the least-squares
//! vertex-to-cell fit.

/// Reference "infinite" value used for unreachable distances.
pub const BIG: f64 = 1.0e12;

/// Reference small value for clamping near-zero denominators.
pub const EPZERO: f64 = 1.0e-12;

/// 3D coordinate / vector.
pub type Vec3 = [f64; 3];

#[inline]
pub fn dot(a: Vec3, b: Vec3) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[inline]
pub fn cross(a: Vec3, b: Vec3) -> Vec3 {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

#[inline]
pub fn sub(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

#[inline]
pub fn add(a: Vec3, b: Vec3) -> Vec3 {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

#[inline]
pub fn scale(s: f64, a: Vec3) -> Vec3 {
    [s * a[0], s * a[1], s * a[2]]
}

#[inline]
pub fn norm(a: Vec3) -> f64 {
    dot(a, a).sqrt()
}

#[inline]
pub fn distance(a: Vec3, b: Vec3) -> f64 {
    norm(sub(a, b))
}

#[inline]
pub fn sq_distance(a: Vec3, b: Vec3) -> f64 {
    let d = sub(a, b);
    dot(d, d)
}

/// Product of a symmetric tensor (Voigt order) with a vector.
#[inline]
pub fn sym_33_3_product(t: [f64; 6], v: Vec3) -> Vec3 {
    [
        t[0] * v[0] + t[3] * v[1] + t[5] * v[2],
        t[3] * v[0] + t[1] * v[1] + t[4] * v[2],
        t[5] * v[0] + t[4] * v[1] + t[2] * v[2],
    ]
}

/// 3x3 matrix * vector.
#[inline]
pub fn mat_33_3_product(m: [[f64; 3]; 3], v: Vec3) -> Vec3 {
    [
        m[0][0] * v[0] + m[0][1] * v[1] + m[0][2] * v[2],
        m[1][0] * v[0] + m[1][1] * v[1] + m[1][2] * v[2],
        m[2][0] * v[0] + m[2][1] * v[1] + m[2][2] * v[2],
    ]
}

/// Expand a symmetric tensor from Voigt order into a full 3x3 matrix.
#[inline]
pub fn sym_to_33(t: [f64; 6]) -> [[f64; 3]; 3] {
    [
        [t[0], t[3], t[5]],
        [t[3], t[1], t[4]],
        [t[5], t[4], t[2]],
    ]
}

/// Pack a symmetric 3x3 matrix into Voigt order (lower part is read).
#[inline]
pub fn sym_from_33(m: [[f64; 3]; 3]) -> [f64; 6] {
    [m[0][0], m[1][1], m[2][2], m[1][0], m[2][1], m[2][0]]
}

/// Congruence transform `r * m * r^T` of a full 3x3 matrix.
pub fn mat_33_transform(r: [[f64; 3]; 3], m: [[f64; 3]; 3]) -> [[f64; 3]; 3] {
    let mut rm = [[0.0; 3]; 3];
    for i in 0..3 {
        for j in 0..3 {
            for k in 0..3 {
                rm[i][j] += r[i][k] * m[k][j];
            }
        }
    }
    let mut out = [[0.0; 3]; 3];
    for i in 0..3 {
        for j in 0..3 {
            for k in 0..3 {
                out[i][j] += rm[i][k] * r[j][k];
            }
        }
    }
    out
}

/// In-place LDL^T factorization of a packed symmetric 4x4 matrix.
///
/// Packed layout (row-major lower triangle):
/// `[a00, a10, a11, a20, a21, a22, a30, a31, a32, a33]`.
/// On return the slots hold `[d0, l10, d1, l20, l21, d2, l30, l31, l32, d3]`.
pub fn sym_44_factor_ldlt(a: &mut [f64; 10]) {
    let d0 = a[0];
    let l10 = a[1] / d0;
    let d1 = a[2] - l10 * l10 * d0;
    let l20 = a[3] / d0;
    let l21 = (a[4] - l20 * l10 * d0) / d1;
    let d2 = a[5] - l20 * l20 * d0 - l21 * l21 * d1;
    let l30 = a[6] / d0;
    let l31 = (a[7] - l30 * l10 * d0) / d1;
    let l32 = (a[8] - l30 * l20 * d0 - l31 * l21 * d1) / d2;
    let d3 = a[9] - l30 * l30 * d0 - l31 * l31 * d1 - l32 * l32 * d2;

    *a = [d0, l10, d1, l20, l21, d2, l30, l31, l32, d3];
}

/// Solve the last unknown of `L D L^T x = b` from a packed factorization.
///
/// Because `L^T` is unit upper triangular, the fourth solution component
/// needs only the forward substitution, which is all the least-squares
/// intercept evaluation requires.
#[inline]
pub fn sym_44_partial_solve_ldlt(ldlt: &[f64; 10], b: [f64; 4]) -> f64 {
    let y0 = b[0];
    let y1 = b[1] - ldlt[1] * y0;
    let y2 = b[2] - ldlt[3] * y0 - ldlt[4] * y1;
    let y3 = b[3] - ldlt[6] * y0 - ldlt[7] * y1 - ldlt[8] * y2;
    y3 / ldlt[9]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mat4_vec(a: &[[f64; 4]; 4], x: &[f64; 4]) -> [f64; 4] {
        let mut y = [0.0; 4];
        for i in 0..4 {
            for j in 0..4 {
                y[i] += a[i][j] * x[j];
            }
        }
        y
    }

    #[test]
    fn ldlt_recovers_last_component() {
        // SPD matrix built as M^T M + I.
        let full = [
            [5.0, 1.0, 0.5, 1.5],
            [1.0, 4.0, 0.25, 0.5],
            [0.5, 0.25, 3.0, 0.75],
            [1.5, 0.5, 0.75, 6.0],
        ];
        let x = [0.3, -1.2, 2.0, 0.7];
        let b = mat4_vec(&full, &x);

        let mut packed = [
            full[0][0], full[1][0], full[1][1], full[2][0], full[2][1], full[2][2], full[3][0],
            full[3][1], full[3][2], full[3][3],
        ];
        sym_44_factor_ldlt(&mut packed);
        let x3 = sym_44_partial_solve_ldlt(&packed, b);
        assert!((x3 - x[3]).abs() < 1e-12, "x3 = {x3}");
    }

    #[test]
    fn sym_product_matches_full_expansion() {
        let t = [2.0, 3.0, 4.0, 0.5, -0.25, 0.75];
        let v = [1.0, -2.0, 3.0];
        let full = sym_to_33(t);
        let a = sym_33_3_product(t, v);
        let b = mat_33_3_product(full, v);
        for i in 0..3 {
            assert!((a[i] - b[i]).abs() < 1e-15);
        }
    }

    #[test]
    fn congruence_of_identity_is_identity() {
        let r = [[0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]];
        let id = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
        let out = mat_33_transform(r, id);
        for i in 0..3 {
            for j in 0..3 {
                let expect = if i == j { 1.0 } else { 0.0 };
                assert!((out[i][j] - expect).abs() < 1e-15);
            }
        }
    }
}
