//! Quadratic programming backends.
//!
//! Every backend solves the same problem family:
//!
//! ```text
//! minimize    ½ x' H x
//! subject to  a' x = b
//!             x >= 0
//! ```
//!
//! with `H` symmetric positive semidefinite. Backends report a
//! [`SolverStatus`] instead of failing, so callers can tell infeasibility
//! apart from numerical trouble.

pub mod active_set;
pub mod projected_gradient;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::MeanVarError;
use crate::MeanVarResult;

pub use active_set::ActiveSetSolver;
pub use projected_gradient::ProjectedGradientSolver;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A QP over the non-negative orthant with one linear equality.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuadraticProgram {
    /// Symmetric PSD Hessian `H`.
    pub hessian: Vec<Vec<Decimal>>,
    /// Equality row `a`.
    pub equality: Vec<Decimal>,
    /// Equality right-hand side `b`.
    pub rhs: Decimal,
}

impl QuadraticProgram {
    pub fn dimension(&self) -> usize {
        self.equality.len()
    }

    /// Objective value `½ x' H x`, `None` on overflow.
    pub fn objective(&self, x: &[Decimal]) -> Option<Decimal> {
        crate::linalg::quad_form(&self.hessian, x).map(|q| q / dec!(2))
    }

    /// Check dimensions and symmetry of the Hessian.
    #[allow(clippy::needless_range_loop)]
    pub fn validate(&self) -> MeanVarResult<()> {
        let n = self.dimension();
        if n == 0 {
            return Err(MeanVarError::InvalidInput {
                field: "equality".into(),
                reason: "Program has no variables".into(),
            });
        }
        if self.hessian.len() != n || self.hessian.iter().any(|row| row.len() != n) {
            return Err(MeanVarError::InvalidInput {
                field: "hessian".into(),
                reason: format!("Expected {}x{} matrix", n, n),
            });
        }
        let tolerance = Decimal::new(1, 12);
        for i in 0..n {
            for j in (i + 1)..n {
                if (self.hessian[i][j] - self.hessian[j][i]).abs() > tolerance {
                    return Err(MeanVarError::InvalidInput {
                        field: "hessian".into(),
                        reason: format!("Not symmetric at [{},{}]", i, j),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Terminal state of a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverStatus {
    Optimal,
    /// No x >= 0 satisfies the equality.
    Infeasible,
    /// Objective decreases without bound along the feasible set.
    Unbounded,
    /// Iteration budget exhausted before the optimality test passed.
    MaxIterations,
    /// Singular system, overflow or malformed program.
    NumericalError,
}

impl fmt::Display for SolverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SolverStatus::Optimal => "optimal",
            SolverStatus::Infeasible => "infeasible",
            SolverStatus::Unbounded => "unbounded",
            SolverStatus::MaxIterations => "max_iterations",
            SolverStatus::NumericalError => "numerical_error",
        };
        f.write_str(s)
    }
}

/// Result of a solve. `x` is only populated when `status` is `Optimal`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QpSolution {
    pub status: SolverStatus,
    pub x: Option<Vec<Decimal>>,
    pub objective: Option<Decimal>,
    pub iterations: usize,
    /// Backend-specific detail for non-optimal outcomes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl QpSolution {
    pub fn optimal(qp: &QuadraticProgram, x: Vec<Decimal>, iterations: usize) -> Self {
        let objective = qp.objective(&x);
        Self {
            status: SolverStatus::Optimal,
            x: Some(x),
            objective,
            iterations,
            message: None,
        }
    }

    pub fn failed(status: SolverStatus, iterations: usize, message: impl Into<String>) -> Self {
        Self {
            status,
            x: None,
            objective: None,
            iterations,
            message: Some(message.into()),
        }
    }
}

/// Per-solver numerical settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    pub max_iterations: usize,
    /// Relative tolerance for step lengths and multiplier signs.
    pub tolerance: Decimal,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            max_iterations: 10_000,
            tolerance: Decimal::new(1, 12),
        }
    }
}

/// A backend able to solve [`QuadraticProgram`]s.
///
/// Implementations hold only configuration and must be callable from many
/// threads at once.
pub trait QpSolver: Send + Sync {
    fn name(&self) -> &'static str;
    fn solve(&self, qp: &QuadraticProgram) -> QpSolution;
}

/// Built-in backends, selectable from configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SolverKind {
    #[default]
    ActiveSet,
    ProjectedGradient,
}

impl SolverKind {
    pub fn build(self, settings: SolverSettings) -> Box<dyn QpSolver> {
        match self {
            SolverKind::ActiveSet => Box::new(ActiveSetSolver::new(settings)),
            SolverKind::ProjectedGradient => Box::new(ProjectedGradientSolver::new(settings)),
        }
    }
}

impl fmt::Display for SolverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolverKind::ActiveSet => f.write_str("active-set"),
            SolverKind::ProjectedGradient => f.write_str("projected-gradient"),
        }
    }
}

impl FromStr for SolverKind {
    type Err = MeanVarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "active-set" => Ok(SolverKind::ActiveSet),
            "projected-gradient" => Ok(SolverKind::ProjectedGradient),
            other => Err(MeanVarError::InvalidInput {
                field: "solver".into(),
                reason: format!(
                    "Unknown solver '{}'; expected active-set or projected-gradient",
                    other
                ),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Whether some `x >= 0` can satisfy `a'x = b`.
pub(crate) fn admits_nonnegative_solution(a: &[Decimal], b: Decimal) -> bool {
    let has_positive = a.iter().any(|ai| *ai > Decimal::ZERO);
    let has_negative = a.iter().any(|ai| *ai < Decimal::ZERO);
    !((b > Decimal::ZERO && !has_positive) || (b < Decimal::ZERO && !has_negative))
}

/// Tolerance scaled to the magnitude of `v`: `tol * (1 + max|v_i|)`.
pub(crate) fn scaled_tolerance(tolerance: Decimal, v: &[Decimal]) -> Decimal {
    tolerance * (Decimal::ONE + crate::linalg::max_abs(v))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_solver_kind_parsing() {
        assert_eq!("active-set".parse::<SolverKind>().unwrap(), SolverKind::ActiveSet);
        assert_eq!(
            "Projected_Gradient".parse::<SolverKind>().unwrap(),
            SolverKind::ProjectedGradient
        );
        assert!("ecos".parse::<SolverKind>().is_err());
        assert_eq!(SolverKind::ProjectedGradient.to_string(), "projected-gradient");
    }

    #[test]
    fn test_validate_rejects_shape_mismatch() {
        let qp = QuadraticProgram {
            hessian: vec![vec![dec!(1)]],
            equality: vec![dec!(1), dec!(1)],
            rhs: dec!(1),
        };
        assert!(qp.validate().is_err());
    }

    #[test]
    fn test_objective_is_half_quadratic_form() {
        let qp = QuadraticProgram {
            hessian: vec![vec![dec!(2), dec!(0)], vec![dec!(0), dec!(4)]],
            equality: vec![dec!(1), dec!(1)],
            rhs: dec!(1),
        };
        assert_eq!(qp.objective(&[dec!(1), dec!(1)]), Some(dec!(3)));
    }

    #[test]
    fn test_status_display() {
        assert_eq!(SolverStatus::MaxIterations.to_string(), "max_iterations");
    }
}
