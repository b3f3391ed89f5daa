//! Canonical boundary-condition coefficients.
//!
//! Four coefficients per face, `(a, b, af, bf)`, such that the
//! reconstructed face value is `a + b * phi_cell` and the diffusive flux
//! is `af + bf * phi_cell`. The setters write into caller-owned slots and
//! never allocate; the operators consult only these coefficients and stay
//! oblivious to the boundary kind that produced them.

use crate::error::FvMeshError;
use crate::math::{self, Vec3};

/// Scalar-field boundary coefficients, one entry per boundary face.
#[derive(Clone, Debug, Default)]
pub struct BcCoeffs {
    pub a: Vec<f64>,
    pub b: Vec<f64>,
    pub af: Vec<f64>,
    pub bf: Vec<f64>,
}

impl BcCoeffs {
    /// Coefficients initialized to a homogeneous Neumann state
    /// (`a = af = bf = 0`, `b = 1`).
    pub fn new(n_b_faces: usize) -> Self {
        Self {
            a: vec![0.0; n_b_faces],
            b: vec![1.0; n_b_faces],
            af: vec![0.0; n_b_faces],
            bf: vec![0.0; n_b_faces],
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.a.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.a.is_empty()
    }

    /// Reconstructed face value for the adjacent cell value `pi`.
    #[inline]
    pub fn face_value(&self, face: usize, pi: f64) -> f64 {
        self.a[face] + self.b[face] * pi
    }

    /// Diffusive flux for the adjacent cell value `pi`.
    #[inline]
    pub fn flux(&self, face: usize, pi: f64) -> f64 {
        self.af[face] + self.bf[face] * pi
    }

    /// Set Neumann BC for a scalar for a given face.
    ///
    /// `qimp` is the flux to impose, `hint` the internal exchange
    /// coefficient.
    pub fn set_neumann_scalar(&mut self, face: usize, qimp: f64, hint: f64) {
        // Gradient BCs
        self.a[face] = -qimp / hint;
        self.b[face] = 1.0;
        // Flux BCs
        self.af[face] = qimp;
        self.bf[face] = 0.0;
    }

    /// Homogeneous Neumann shortcut.
    pub fn set_neumann_scalar_hmg(&mut self, face: usize) {
        self.a[face] = 0.0;
        self.b[face] = 1.0;
        self.af[face] = 0.0;
        self.bf[face] = 0.0;
    }

    /// Set Dirichlet BC for a scalar for a given face.
    ///
    /// `pimp` is the value to impose, `hint` the internal exchange
    /// coefficient, `hext` the external one (assumed infinite if < 0).
    pub fn set_dirichlet_scalar(&mut self, face: usize, pimp: f64, hint: f64, hext: f64) {
        if hext < 0.0 {
            // Gradient BCs
            self.a[face] = pimp;
            self.b[face] = 0.0;
            // Flux BCs
            self.af[face] = -hint * pimp;
            self.bf[face] = hint;
        } else {
            // Gradient BCs
            self.a[face] = hext * pimp / (hint + hext);
            self.b[face] = hint / (hint + hext);
            // Flux BCs
            let heq = hint * hext / (hint + hext);
            self.af[face] = -heq * pimp;
            self.bf[face] = heq;
        }
    }

    /// Set convective-outlet BC for a scalar for a given face.
    ///
    /// `pimp` is the flux value to impose, `cfl` the local Courant number
    /// used to convect it, `hint` the internal exchange coefficient.
    pub fn set_convective_outlet_scalar(&mut self, face: usize, pimp: f64, cfl: f64, hint: f64) {
        // Gradient BCs
        self.b[face] = cfl / (1.0 + cfl);
        self.a[face] = (1.0 - self.b[face]) * pimp;
        // Flux BCs
        self.af[face] = -hint * self.a[face];
        self.bf[face] = hint * (1.0 - self.b[face]);
    }
}

/// Vector-field boundary coefficients with full implicit blocks.
#[derive(Clone, Debug, Default)]
pub struct BcCoeffsVector {
    pub a: Vec<Vec3>,
    pub b: Vec<[[f64; 3]; 3]>,
    pub af: Vec<Vec3>,
    pub bf: Vec<[[f64; 3]; 3]>,
}

const IDENTITY_33: [[f64; 3]; 3] = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

impl BcCoeffsVector {
    pub fn new(n_b_faces: usize) -> Self {
        Self {
            a: vec![[0.0; 3]; n_b_faces],
            b: vec![IDENTITY_33; n_b_faces],
            af: vec![[0.0; 3]; n_b_faces],
            bf: vec![[[0.0; 3]; 3]; n_b_faces],
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.a.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.a.is_empty()
    }

    /// Set Neumann BC for a vector for a given face.
    pub fn set_neumann_vector(&mut self, face: usize, qimpv: Vec3, hint: f64) {
        let h = hint.max(1.0e-300);
        for i in 0..3 {
            self.a[face][i] = -qimpv[i] / h;
            self.af[face][i] = qimpv[i];
            for j in 0..3 {
                self.b[face][i][j] = if i == j { 1.0 } else { 0.0 };
                self.bf[face][i][j] = 0.0;
            }
        }
    }

    /// Set Dirichlet BC for a vector for a given face; a negative
    /// component of `hextv` means an infinite external coefficient.
    pub fn set_dirichlet_vector(&mut self, face: usize, pimpv: Vec3, hint: f64, hextv: Vec3) {
        for i in 0..3 {
            if hextv[i] < 0.0 {
                self.a[face][i] = pimpv[i];
                self.af[face][i] = -hint * pimpv[i];
                for j in 0..3 {
                    self.b[face][i][j] = 0.0;
                    self.bf[face][i][j] = if i == j { hint } else { 0.0 };
                }
            } else {
                let heq = hint * hextv[i] / (hint + hextv[i]);
                self.a[face][i] = hextv[i] * pimpv[i] / (hint + hextv[i]);
                self.af[face][i] = -heq * pimpv[i];
                for j in 0..3 {
                    self.b[face][i][j] = if i == j {
                        hint / (hint + hextv[i])
                    } else {
                        0.0
                    };
                    self.bf[face][i][j] = if i == j { heq } else { 0.0 };
                }
            }
        }
    }

    /// Set Dirichlet BC for a vector with left anisotropic diffusion:
    /// `hintt` is the symmetric exchange tensor in Voigt order. Only the
    /// infinite-`hext` form is defined for the anisotropic case.
    pub fn set_dirichlet_vector_aniso(
        &mut self,
        face: usize,
        pimpv: Vec3,
        hintt: [f64; 6],
        hextv: Vec3,
    ) -> Result<(), FvMeshError> {
        for h in hextv {
            if h >= 0.0 {
                return Err(FvMeshError::config(
                    "anisotropic Dirichlet requires an infinite external exchange coefficient",
                ));
            }
        }
        // Gradient BCs
        self.a[face] = pimpv;
        self.b[face] = [[0.0; 3]; 3];
        // Flux BCs
        let hp = math::sym_33_3_product(hintt, pimpv);
        self.af[face] = [-hp[0], -hp[1], -hp[2]];
        self.bf[face] = math::sym_to_33(hintt);
        Ok(())
    }
}
