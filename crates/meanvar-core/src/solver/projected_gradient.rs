use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::{
    admits_nonnegative_solution, scaled_tolerance, QpSolution, QpSolver, QuadraticProgram,
    SolverSettings, SolverStatus,
};
use crate::linalg::{mat_vec_multiply, max_abs, vec_dot};

/// Iterates beyond this magnitude are treated as divergence.
const DIVERGENCE_BOUND: Decimal = Decimal::from_parts(3_567_587_328, 232, 0, false, 0); // 1e12

/// Doublings allowed while bracketing the projection multiplier.
const MAX_BRACKET_STEPS: usize = 60;

/// Halvings of the projection multiplier bracket.
const MAX_BISECTIONS: usize = 120;

/// Projected gradient descent with a fixed `1/L` step.
///
/// `L` is the Gershgorin bound on the largest Hessian eigenvalue. Each
/// iterate is projected back onto `{x >= 0, a'x = b}`. Slower than the
/// active-set method but independent of it, which makes it a useful
/// cross-check.
#[derive(Debug, Clone, Default)]
pub struct ProjectedGradientSolver {
    settings: SolverSettings,
}

impl ProjectedGradientSolver {
    pub fn new(settings: SolverSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &SolverSettings {
        &self.settings
    }
}

impl QpSolver for ProjectedGradientSolver {
    fn name(&self) -> &'static str {
        "projected-gradient"
    }

    fn solve(&self, qp: &QuadraticProgram) -> QpSolution {
        if let Err(e) = qp.validate() {
            return QpSolution::failed(SolverStatus::NumericalError, 0, e.to_string());
        }

        let n = qp.dimension();
        let lipschitz = qp
            .hessian
            .iter()
            .map(|row| row.iter().map(|h| h.abs()).sum::<Decimal>())
            .max()
            .unwrap_or(Decimal::ZERO);
        let step = if lipschitz.is_zero() {
            Decimal::ONE
        } else {
            Decimal::ONE / lipschitz
        };

        if !admits_nonnegative_solution(&qp.equality, qp.rhs) {
            return QpSolution::failed(
                SolverStatus::Infeasible,
                0,
                format!("no x >= 0 satisfies a'x = {}", qp.rhs),
            );
        }
        let mut x = match project_onto_feasible_set(&vec![Decimal::ZERO; n], &qp.equality, qp.rhs) {
            Some(x) => x,
            None => {
                return QpSolution::failed(
                    SolverStatus::NumericalError,
                    0,
                    "projection of the origin onto the feasible set failed",
                )
            }
        };

        for iteration in 0..self.settings.max_iterations {
            let Some(grad) = mat_vec_multiply(&qp.hessian, &x) else {
                return QpSolution::failed(
                    SolverStatus::NumericalError,
                    iteration,
                    "gradient overflowed the decimal range",
                );
            };
            let y: Vec<Decimal> = x
                .iter()
                .zip(grad.iter())
                .map(|(xi, gi)| *xi - step * *gi)
                .collect();

            let next = match project_onto_feasible_set(&y, &qp.equality, qp.rhs) {
                Some(next) => next,
                None => {
                    return QpSolution::failed(
                        SolverStatus::NumericalError,
                        iteration,
                        "projection onto the feasible set failed to bracket its multiplier",
                    )
                }
            };

            if max_abs(&next) > DIVERGENCE_BOUND {
                return QpSolution::failed(
                    SolverStatus::Unbounded,
                    iteration,
                    "iterates diverged; the Hessian is not positive semidefinite",
                );
            }

            let delta = max_abs(
                &next
                    .iter()
                    .zip(x.iter())
                    .map(|(a, b)| *a - *b)
                    .collect::<Vec<_>>(),
            );
            x = next;

            if delta <= scaled_tolerance(self.settings.tolerance, &x) {
                return QpSolution::optimal(qp, x, iteration + 1);
            }
        }

        QpSolution::failed(
            SolverStatus::MaxIterations,
            self.settings.max_iterations,
            format!(
                "gradient steps still moving after {} iterations",
                self.settings.max_iterations
            ),
        )
    }
}

/// Euclidean projection of `y` onto `{x >= 0, a'x = b}`.
///
/// The projection is `x(θ) = max(0, y + θa)` for the `θ` solving
/// `a'x(θ) = b`; the left side is non-decreasing in `θ`, so `θ` is found by
/// bracketing and bisection. `None` when the set is empty, `θ` cannot be
/// bracketed, or the search leaves the decimal range.
pub fn project_onto_feasible_set(y: &[Decimal], a: &[Decimal], b: Decimal) -> Option<Vec<Decimal>> {
    if !admits_nonnegative_solution(a, b) {
        return None;
    }

    let shifted = |theta: Decimal| -> Option<Vec<Decimal>> {
        y.iter()
            .zip(a.iter())
            .map(|(yi, ai)| Some(yi.checked_add(theta.checked_mul(*ai)?)?.max(Decimal::ZERO)))
            .collect()
    };
    let level = |theta: Decimal| -> Option<Decimal> { vec_dot(&shifted(theta)?, a) };

    let mut lo = -Decimal::ONE;
    let mut hi = Decimal::ONE;
    let mut steps = 0;
    while level(hi)? < b {
        hi *= dec!(2);
        steps += 1;
        if steps > MAX_BRACKET_STEPS {
            return None;
        }
    }
    steps = 0;
    while level(lo)? > b {
        lo *= dec!(2);
        steps += 1;
        if steps > MAX_BRACKET_STEPS {
            return None;
        }
    }

    for _ in 0..MAX_BISECTIONS {
        let mid = (lo + hi) / dec!(2);
        if mid == lo || mid == hi {
            break;
        }
        if level(mid)? < b {
            lo = mid;
        } else {
            hi = mid;
        }
    }

    shifted((lo + hi) / dec!(2))
}
