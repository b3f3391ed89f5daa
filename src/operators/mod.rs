//! Finite-volume operators on cell-centered fields.
//!
//! Every operator adds into the caller's right-hand side (documented sign
//! per operator), reads only the owned + ghost range, and consults only
//! the `(a, b, af, bf)` boundary coefficients — never the boundary kind
//! that produced them. Ghost values must be synchronized by the caller
//! before a call.

pub mod convection_diffusion;
pub mod divergence;
pub mod equation;
pub mod face_viscosity;
pub mod gradient;
pub mod iterative;
pub mod matrix;
pub mod potential;

pub use convection_diffusion::convection_diffusion_scalar;
pub use divergence::divergence;
pub use equation::{EquationParams, FaceViscosityRule, GradientMode, TimeScheme};
pub use face_viscosity::face_viscosity;
pub use gradient::gradient_scalar;
pub use iterative::equation_iterative_solve_scalar;
pub use matrix::matrix_wrapper_scalar;
pub use potential::{diffusion_potential, face_diffusion_potential};
