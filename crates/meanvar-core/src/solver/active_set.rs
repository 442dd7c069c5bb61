use rust_decimal::Decimal;

use super::{
    admits_nonnegative_solution, scaled_tolerance, QpSolution, QpSolver, QuadraticProgram,
    SolverSettings, SolverStatus,
};
use crate::linalg::{mat_vec_multiply, max_abs, solve_linear_system};

/// Primal active-set method.
///
/// The working set holds the variables pinned at zero. Each iteration solves
/// the equality-constrained problem on the free variables exactly, then
/// either walks toward its minimizer until a free variable hits zero, or,
/// once the current face is optimal, releases the pinned variable with the
/// most negative bound multiplier. Terminates finitely on strictly convex
/// programs.
#[derive(Debug, Clone, Default)]
pub struct ActiveSetSolver {
    settings: SolverSettings,
}

impl ActiveSetSolver {
    pub fn new(settings: SolverSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &SolverSettings {
        &self.settings
    }
}

impl QpSolver for ActiveSetSolver {
    fn name(&self) -> &'static str {
        "active-set"
    }

    fn solve(&self, qp: &QuadraticProgram) -> QpSolution {
        if let Err(e) = qp.validate() {
            return QpSolution::failed(SolverStatus::NumericalError, 0, e.to_string());
        }

        let n = qp.dimension();
        let tol = self.settings.tolerance;

        if !admits_nonnegative_solution(&qp.equality, qp.rhs) {
            return QpSolution::failed(
                SolverStatus::Infeasible,
                0,
                format!("no x >= 0 satisfies a'x = {}", qp.rhs),
            );
        }
        let mut x = match initial_vertex(qp) {
            Some(x) => x,
            None => {
                return QpSolution::failed(
                    SolverStatus::NumericalError,
                    0,
                    "starting vertex overflowed the decimal range",
                )
            }
        };
        let mut free: Vec<bool> = x.iter().map(|v| !v.is_zero()).collect();

        for iteration in 0..self.settings.max_iterations {
            let free_idx: Vec<usize> = (0..n).filter(|&i| free[i]).collect();

            let (target, lambda) = if free_idx.is_empty() {
                (Vec::new(), Decimal::ZERO)
            } else {
                match solve_face(qp, &free_idx) {
                    Some(face) => face,
                    None => {
                        return QpSolution::failed(
                            SolverStatus::NumericalError,
                            iteration,
                            format!(
                                "singular KKT system on {} free variables; \
                                 the Hessian needs diagonal regularization",
                                free_idx.len()
                            ),
                        )
                    }
                }
            };

            let step: Vec<Decimal> = free_idx
                .iter()
                .zip(target.iter())
                .map(|(&i, z)| *z - x[i])
                .collect();

            if max_abs(&step) <= scaled_tolerance(tol, &x) {
                // x minimizes the current face; check bound multipliers
                let Some(grad) = mat_vec_multiply(&qp.hessian, &x) else {
                    return QpSolution::failed(
                        SolverStatus::NumericalError,
                        iteration,
                        "gradient overflowed the decimal range",
                    );
                };
                let mult_tol = scaled_tolerance(tol, &grad);
                let mut entering: Option<(usize, Decimal)> = None;
                for i in (0..n).filter(|&i| !free[i]) {
                    let multiplier = grad[i] - lambda * qp.equality[i];
                    if multiplier < -mult_tol && entering.map_or(true, |(_, m)| multiplier < m) {
                        entering = Some((i, multiplier));
                    }
                }
                match entering {
                    Some((i, multiplier)) => {
                        tracing::trace!(variable = i, %multiplier, "releasing bound");
                        free[i] = true;
                    }
                    None => return QpSolution::optimal(qp, x, iteration + 1),
                }
                continue;
            }

            // Longest feasible step toward the face minimizer
            let mut alpha = Decimal::ONE;
            let mut blocking = None;
            for (k, &i) in free_idx.iter().enumerate() {
                if step[k] < Decimal::ZERO {
                    let ratio = x[i] / -step[k];
                    if ratio < alpha {
                        alpha = ratio;
                        blocking = Some(i);
                    }
                }
            }

            match blocking {
                Some(b) => {
                    for (k, &i) in free_idx.iter().enumerate() {
                        x[i] += alpha * step[k];
                    }
                    x[b] = Decimal::ZERO;
                    free[b] = false;
                }
                None => {
                    for (k, &i) in free_idx.iter().enumerate() {
                        x[i] = target[k];
                    }
                }
            }
        }

        QpSolution::failed(
            SolverStatus::MaxIterations,
            self.settings.max_iterations,
            format!(
                "active set did not settle within {} iterations",
                self.settings.max_iterations
            ),
        )
    }
}

/// A feasible vertex: all weight on the single variable whose coefficient
/// best matches the sign of the right-hand side.
fn initial_vertex(qp: &QuadraticProgram) -> Option<Vec<Decimal>> {
    let n = qp.dimension();
    let mut x = vec![Decimal::ZERO; n];
    if qp.rhs.is_zero() {
        return Some(x);
    }

    let positive = qp.rhs > Decimal::ZERO;
    let pick = qp
        .equality
        .iter()
        .enumerate()
        .filter(|(_, a)| if positive { **a > Decimal::ZERO } else { **a < Decimal::ZERO })
        .max_by_key(|(_, a)| a.abs())
        .map(|(i, _)| i)?;

    x[pick] = qp.rhs.checked_div(qp.equality[pick])?;
    Some(x)
}

/// Minimize `½ z' H_FF z` subject to `a_F' z = b` through its KKT system:
///
/// ```text
/// [ H_FF  a_F ] [ z ]   [ 0 ]
/// [ a_F'   0  ] [ ν ] = [ b ]
/// ```
///
/// Returns the minimizer and the equality multiplier `λ = -ν`.
fn solve_face(qp: &QuadraticProgram, free_idx: &[usize]) -> Option<(Vec<Decimal>, Decimal)> {
    let k = free_idx.len();
    let mut kkt = vec![vec![Decimal::ZERO; k + 1]; k + 1];
    for (r, &i) in free_idx.iter().enumerate() {
        for (c, &j) in free_idx.iter().enumerate() {
            kkt[r][c] = qp.hessian[i][j];
        }
        kkt[r][k] = qp.equality[i];
        kkt[k][r] = qp.equality[i];
    }
    let mut rhs = vec![Decimal::ZERO; k + 1];
    rhs[k] = qp.rhs;

    let mut sol = solve_linear_system(&kkt, &rhs)?;
    let nu = sol.pop()?;
    Some((sol, -nu))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn diagonal_program(diag: &[Decimal], a: &[Decimal], b: Decimal) -> QuadraticProgram {
        let n = diag.len();
        let mut hessian = vec![vec![Decimal::ZERO; n]; n];
        for i in 0..n {
            hessian[i][i] = diag[i];
        }
        QuadraticProgram {
            hessian,
            equality: a.to_vec(),
            rhs: b,
        }
    }

    #[test]
    fn test_interior_solution_matches_closed_form() {
        // x_i ∝ a_i / h_i : 1/1, 1/2, 1/4 scaled so a'x = 1
        let qp = diagonal_program(
            &[dec!(1), dec!(2), dec!(4)],
            &[dec!(1), dec!(1), dec!(1)],
            dec!(1),
        );
        let sol = ActiveSetSolver::default().solve(&qp);
        assert_eq!(sol.status, SolverStatus::Optimal);
        let x = sol.x.unwrap();
        let expected = [dec!(4) / dec!(7), dec!(2) / dec!(7), dec!(1) / dec!(7)];
        for (xi, ei) in x.iter().zip(expected.iter()) {
            assert!((*xi - *ei).abs() < dec!(0.000000001), "{} vs {}", xi, ei);
        }
    }

    #[test]
    fn test_negative_coefficient_asset_stays_at_zero() {
        // Asset 2 has a negative coefficient: holding it only costs variance.
        let qp = diagonal_program(
            &[dec!(1), dec!(1), dec!(1)],
            &[dec!(2), dec!(1), dec!(-1)],
            dec!(1),
        );
        let sol = ActiveSetSolver::default().solve(&qp);
        assert_eq!(sol.status, SolverStatus::Optimal);
        let x = sol.x.unwrap();
        assert_eq!(x[2], Decimal::ZERO);
        // x ∝ (2, 1) with 2*x0 + x1 = 1  =>  x = (0.4, 0.2)
        assert!((x[0] - dec!(0.4)).abs() < dec!(0.000000001));
        assert!((x[1] - dec!(0.2)).abs() < dec!(0.000000001));
    }

    #[test]
    fn test_correlated_pair_drops_dominated_asset() {
        // Strong positive correlation makes the low-coefficient asset a hedge
        // the long-only constraint forbids.
        let qp = QuadraticProgram {
            hessian: vec![vec![dec!(1), dec!(0.9)], vec![dec!(0.9), dec!(1)]],
            equality: vec![dec!(1), dec!(0.5)],
            rhs: dec!(1),
        };
        let sol = ActiveSetSolver::default().solve(&qp);
        assert_eq!(sol.status, SolverStatus::Optimal);
        let x = sol.x.unwrap();
        assert!((x[0] - dec!(1)).abs() < dec!(0.000000001));
        assert_eq!(x[1], Decimal::ZERO);
    }

    #[test]
    fn test_infeasible_when_no_coefficient_matches_sign() {
        let qp = diagonal_program(&[dec!(1), dec!(1)], &[dec!(-1), dec!(0)], dec!(1));
        let sol = ActiveSetSolver::default().solve(&qp);
        assert_eq!(sol.status, SolverStatus::Infeasible);
        assert!(sol.x.is_none());
    }

    #[test]
    fn test_zero_rhs_gives_origin() {
        let qp = diagonal_program(&[dec!(1), dec!(1)], &[dec!(1), dec!(2)], dec!(0));
        let sol = ActiveSetSolver::default().solve(&qp);
        assert_eq!(sol.status, SolverStatus::Optimal);
        assert_eq!(sol.x.unwrap(), vec![Decimal::ZERO, Decimal::ZERO]);
    }

    #[test]
    fn test_malformed_program_reports_numerical_error() {
        let qp = QuadraticProgram {
            hessian: vec![vec![dec!(1), dec!(0.5)], vec![dec!(0.2), dec!(1)]],
            equality: vec![dec!(1), dec!(1)],
            rhs: dec!(1),
        };
        let sol = ActiveSetSolver::default().solve(&qp);
        assert_eq!(sol.status, SolverStatus::NumericalError);
        assert!(sol.message.unwrap().contains("Not symmetric"));
    }

    #[test]
    fn test_duplicate_assets_still_solve() {
        // Identical unregularized assets: the second never needs to enter
        let qp = QuadraticProgram {
            hessian: vec![
                vec![dec!(1), dec!(1), dec!(0)],
                vec![dec!(1), dec!(1), dec!(0)],
                vec![dec!(0), dec!(0), dec!(1)],
            ],
            equality: vec![dec!(1), dec!(1), dec!(1)],
            rhs: dec!(1),
        };
        let sol = ActiveSetSolver::default().solve(&qp);
        assert_eq!(sol.status, SolverStatus::Optimal);
        let x = sol.x.unwrap();
        assert!((x[0] + x[1] - dec!(0.5)).abs() < dec!(0.000000001));
        assert!((x[2] - dec!(0.5)).abs() < dec!(0.000000001));
    }

    #[test]
    fn test_iteration_budget_exhausted() {
        let qp = diagonal_program(&[dec!(1), dec!(2)], &[dec!(1), dec!(1)], dec!(1));
        let solver = ActiveSetSolver::new(SolverSettings {
            max_iterations: 0,
            ..SolverSettings::default()
        });
        assert_eq!(solver.solve(&qp).status, SolverStatus::MaxIterations);
    }
}
