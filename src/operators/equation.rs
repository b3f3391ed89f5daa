//! Per-equation parameters consumed by the transport operators.

use crate::error::FvMeshError;

/// Temporal scheme.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TimeScheme {
    Steady,
    #[default]
    Standard,
    SecondOrder,
    LocalTimeStep,
}

/// Gradient reconstruction mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GradientMode {
    #[default]
    Iterative,
    LeastSquares,
    LeastSquaresExtended,
}

/// Cell-to-face viscosity averaging rule.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FaceViscosityRule {
    #[default]
    Arithmetic,
    Harmonic,
}

/// Equation parameters: the per-field configuration every transport
/// operator is parameterized by. Field names follow the conventional
/// solver vocabulary.
#[derive(Clone, Debug)]
pub struct EquationParams {
    /// Temporal scheme.
    pub idtvar: TimeScheme,
    /// Convection on/off.
    pub iconv: bool,
    /// Diffusion on/off.
    pub idiff: bool,
    /// Turbulent diffusion added to the molecular one.
    pub idifft: bool,
    /// Boundary convection flux mode: `false` = upwind everywhere,
    /// `true` = imposed per face.
    pub icvflb: bool,
    /// Solving an increment (0) vs the full variable (1).
    pub inc: i32,
    /// Include the mass-accumulation term.
    pub imasac: bool,
    /// Include the secondary-viscosity transposed-gradient term.
    pub ivisep: bool,
    /// Gradient reconstruction mode.
    pub imrgra: GradientMode,
    /// Gradient limiter mode (< 0 disables limiting).
    pub imligr: i32,
    /// Gradient limiter factor.
    pub climgr: f64,
    /// Gradient reconstruction stop criterion.
    pub epsrgr: f64,
    /// Gradient reconstruction sweep budget.
    pub nswrgr: usize,
    /// Take a hydrostatic pressure source into account.
    pub iphydp: bool,
    /// Weight the gradient by viscosity.
    pub iwgrec: bool,
    /// Weight the gradient by porosity.
    pub iwgrp: bool,
    /// Interior flux reconstruction on/off.
    pub ircflu: bool,
    /// Boundary flux reconstruction on/off.
    pub ircflb: bool,
    /// Face-viscosity averaging rule.
    pub imvisf: FaceViscosityRule,
    /// Outer sweep budget of the iterative solve.
    pub nswrsm: usize,
    /// Outer sweep stop criterion, relative to the RHS norm.
    pub epsrsm: f64,
    /// Linear-solver stop criterion.
    pub epsilo: f64,
    /// Upwind/centred blending for the slope test.
    pub blend_st: f64,
    /// Implicitation factor of the convective/diffusive terms.
    pub theta: f64,
    /// Unsteady term on/off (< 0 disables it).
    pub istat: i32,
    /// Internal coupling id (< 0 disables it).
    pub icoupl: i32,
    /// Number of Dirichlet anchors on the field (global).
    pub ndircl: usize,
    pub verbosity: i32,
}

impl Default for EquationParams {
    fn default() -> Self {
        Self {
            idtvar: TimeScheme::Standard,
            iconv: false,
            idiff: true,
            idifft: true,
            icvflb: false,
            inc: 1,
            imasac: false,
            ivisep: false,
            imrgra: GradientMode::Iterative,
            imligr: -1,
            climgr: 1.5,
            epsrgr: 1.0e-4,
            nswrgr: 100,
            iphydp: false,
            iwgrec: false,
            iwgrp: false,
            ircflu: true,
            ircflb: true,
            imvisf: FaceViscosityRule::Arithmetic,
            nswrsm: 1,
            epsrsm: 1.0e-7,
            epsilo: 1.0e-8,
            blend_st: 0.0,
            theta: 1.0,
            istat: 1,
            icoupl: -1,
            ndircl: 0,
            verbosity: 0,
        }
    }
}

impl EquationParams {
    /// Validate cross-field consistency before an operator run.
    pub fn validate(&self) -> Result<(), FvMeshError> {
        if !(0.0..=1.0).contains(&self.theta) {
            return Err(FvMeshError::config(format!(
                "theta = {} outside [0, 1]",
                self.theta
            )));
        }
        if !(0.0..=1.0).contains(&self.blend_st) {
            return Err(FvMeshError::config(format!(
                "blend_st = {} outside [0, 1]",
                self.blend_st
            )));
        }
        if self.epsilo <= 0.0 || self.epsrsm <= 0.0 {
            return Err(FvMeshError::config(
                "convergence thresholds must be positive",
            ));
        }
        if self.inc != 0 && self.inc != 1 {
            return Err(FvMeshError::config(format!("inc = {} not in {{0, 1}}", self.inc)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        EquationParams::default().validate().unwrap();
    }

    #[test]
    fn bad_theta_is_rejected() {
        let eqp = EquationParams {
            theta: 1.5,
            ..Default::default()
        };
        assert!(eqp.validate().is_err());
    }
}
