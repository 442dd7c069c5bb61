use rust_decimal::prelude::MathematicalOps;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use crate::error::MeanVarError;
use crate::linalg::{max_abs, quad_form, vec_dot};
use crate::returns::ReturnsTable;
use crate::solver::{QpSolver, QuadraticProgram, SolverKind, SolverSettings, SolverStatus};
use crate::statistics::{estimate_statistics, EstimatorSettings, ReturnStatistics};
use crate::types::{with_metadata, AssetWeight, ComputationOutput, Rate, WeightVector};
use crate::MeanVarResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Which equality row pins the scale of the raw weights.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExcessReturnConstraint {
    /// `μ'w - rf = 1`: the risk-free rate is subtracted once from the
    /// portfolio return.
    #[default]
    Aggregate,
    /// `(μ - rf)'w = 1`: the risk-free rate is subtracted from every asset.
    PerAsset,
}

impl fmt::Display for ExcessReturnConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExcessReturnConstraint::Aggregate => f.write_str("aggregate"),
            ExcessReturnConstraint::PerAsset => f.write_str("per-asset"),
        }
    }
}

impl FromStr for ExcessReturnConstraint {
    type Err = MeanVarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "aggregate" => Ok(ExcessReturnConstraint::Aggregate),
            "per-asset" => Ok(ExcessReturnConstraint::PerAsset),
            other => Err(MeanVarError::InvalidInput {
                field: "constraint".into(),
                reason: format!("Unknown constraint '{}'; expected aggregate or per-asset", other),
            }),
        }
    }
}

/// Knobs for a single optimization. Nothing here is global; every call
/// carries its own copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerSettings {
    /// Added to the covariance diagonal before solving (may be zero).
    pub regularization: Decimal,
    /// Tolerance for negative raw weights and the normalization sum.
    pub tolerance: Decimal,
    pub solver: SolverKind,
    pub solver_settings: SolverSettings,
    pub estimator: EstimatorSettings,
    pub constraint: ExcessReturnConstraint,
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self {
            regularization: Decimal::new(1, 12),
            tolerance: Decimal::new(1, 8),
            solver: SolverKind::default(),
            solver_settings: SolverSettings::default(),
            estimator: EstimatorSettings::default(),
            constraint: ExcessReturnConstraint::default(),
        }
    }
}

/// Input to [`optimize_max_sharpe`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaxSharpeInput {
    /// Periodic simple returns, one column per asset.
    pub returns: ReturnsTable,
    /// Risk-free rate in the same periodicity as `returns`.
    #[serde(default)]
    pub risk_free_rate: Rate,
    #[serde(default)]
    pub settings: OptimizerSettings,
}

/// Output of [`optimize_max_sharpe`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaxSharpeOutput {
    /// Normalized long-only weights in table order.
    pub weights: Vec<AssetWeight>,
    /// Per-period expected return `w'μ`.
    pub expected_return: Decimal,
    /// Per-period standard deviation `sqrt(w'Σw)` on the unregularized Σ.
    pub volatility: Decimal,
    /// (expected_return - rf) / volatility.
    pub sharpe_ratio: Decimal,
    /// Herfindahl-Hirschman index of weights.
    pub hhi_concentration: Decimal,
    /// Sum of the solver's raw weights before normalization.
    pub raw_weight_sum: Decimal,
    pub solver: String,
    pub iterations: usize,
    pub degenerate_assets: Vec<String>,
}

/// A normalized solve plus the diagnostics the caller may want to report.
struct SolveOutcome {
    weights: WeightVector,
    raw_sum: Decimal,
    iterations: usize,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Formulate the max-Sharpe problem as a QP over raw weights `x`:
///
/// ```text
/// minimize    ½ x' (2(Σ + εI)) x
/// subject to  a' x = b
///             x >= 0
/// ```
///
/// with `a = μ, b = 1 + rf` for [`ExcessReturnConstraint::Aggregate`] and
/// `a = μ - rf, b = 1` for [`ExcessReturnConstraint::PerAsset`].
pub fn build_program(
    stats: &ReturnStatistics,
    risk_free_rate: Rate,
    settings: &OptimizerSettings,
) -> MeanVarResult<QuadraticProgram> {
    validate_settings(settings)?;

    let n = stats.n_assets();
    let mut hessian = stats.covariance.clone();
    for (i, row) in hessian.iter_mut().enumerate() {
        row[i] = row[i]
            .checked_add(settings.regularization)
            .ok_or_else(|| out_of_range("regularization"))?;
        for h in row.iter_mut() {
            *h = h.checked_mul(dec!(2)).ok_or_else(|| out_of_range("covariance"))?;
        }
    }

    let (equality, rhs) = match settings.constraint {
        ExcessReturnConstraint::Aggregate => (
            stats.mean.clone(),
            Decimal::ONE
                .checked_add(risk_free_rate)
                .ok_or_else(|| out_of_range("risk_free_rate"))?,
        ),
        ExcessReturnConstraint::PerAsset => (
            stats
                .mean
                .iter()
                .map(|m| m.checked_sub(risk_free_rate))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| out_of_range("risk_free_rate"))?,
            Decimal::ONE,
        ),
    };

    tracing::debug!(
        n_assets = n,
        %risk_free_rate,
        regularization = %settings.regularization,
        constraint = %settings.constraint,
        "built max-Sharpe program"
    );

    Ok(QuadraticProgram {
        hessian,
        equality,
        rhs,
    })
}

/// Solve for the long-only maximum-Sharpe weights given sample moments.
///
/// Fails with `InfeasibleProblem` when no asset's mean beats the risk-free
/// rate or the backend proves the program infeasible, with
/// `OptimizationFailed` for any other non-optimal backend status, and with
/// `Normalization` when the raw weights cannot be rescaled.
pub fn optimize_weights(
    stats: &ReturnStatistics,
    risk_free_rate: Rate,
    settings: &OptimizerSettings,
    solver: &dyn QpSolver,
) -> MeanVarResult<WeightVector> {
    solve(stats, risk_free_rate, settings, solver).map(|outcome| outcome.weights)
}

/// Rescale raw non-negative weights to sum to one.
///
/// Entries below `-tolerance` (relative to the largest raw weight) mean the
/// backend violated the bounds and are rejected. Smaller negatives are
/// arithmetic noise and clamp to zero.
pub fn normalize_weights(raw: &[Decimal], tolerance: Decimal) -> MeanVarResult<Vec<Decimal>> {
    if raw.is_empty() {
        return Err(MeanVarError::InvalidInput {
            field: "weights".into(),
            reason: "No weights to normalize".into(),
        });
    }
    require_positive("tolerance", tolerance)?;

    let floor = -(tolerance * Decimal::ONE.max(max_abs(raw)));
    if let Some((i, w)) = raw.iter().enumerate().find(|(_, w)| **w < floor) {
        return Err(MeanVarError::OptimizationFailed {
            status: SolverStatus::NumericalError,
            detail: format!("raw weight {} is {}, below the long-only bound", i, w),
        });
    }

    let clamped: Vec<Decimal> = raw.iter().map(|w| (*w).max(Decimal::ZERO)).collect();
    let sum = checked_sum(&clamped)?;
    if sum <= tolerance {
        return Err(MeanVarError::Normalization { sum });
    }

    Ok(clamped.iter().map(|w| *w / sum).collect())
}

/// Estimate moments from a returns table and compute the long-only
/// maximum-Sharpe portfolio with its summary statistics.
pub fn optimize_max_sharpe(
    input: &MaxSharpeInput,
) -> MeanVarResult<ComputationOutput<MaxSharpeOutput>> {
    let start = Instant::now();
    let settings = &input.settings;
    let rf = input.risk_free_rate;

    let stats = estimate_statistics(&input.returns, &settings.estimator)?;
    let mut warnings = stats.warnings.clone();

    let solver = settings.solver.build(settings.solver_settings.clone());
    let outcome = solve(&stats, rf, settings, solver.as_ref())?;
    let w = outcome.weights.weights();

    let (Some(expected_return), Some(variance)) =
        (vec_dot(w, &stats.mean), quad_form(&stats.covariance, w))
    else {
        return Err(out_of_range("covariance"));
    };
    let variance = variance.max(Decimal::ZERO);
    let volatility = variance.sqrt().unwrap_or(Decimal::ZERO);
    let sharpe_ratio = if volatility.is_zero() {
        Decimal::ZERO
    } else {
        (expected_return - rf) / volatility
    };
    let hhi_concentration = outcome.weights.hhi();

    // --- Warnings ---
    let weights = outcome.weights.to_asset_weights();
    for aw in &weights {
        if aw.weight > dec!(0.40) {
            warnings.push(format!(
                "Concentrated position: {} has weight {:.4}",
                aw.asset, aw.weight
            ));
        }
        if stats.degenerate_assets.contains(&aw.asset) && !aw.weight.is_zero() {
            warnings.push(format!(
                "Zero-variance asset {} holds weight {:.4}; its risk is understated",
                aw.asset, aw.weight
            ));
        }
    }
    if hhi_concentration > dec!(0.5) {
        warnings.push(format!("High concentration: HHI = {:.4}", hhi_concentration));
    }
    let held = weights.iter().filter(|aw| !aw.weight.is_zero()).count();
    if held < weights.len() {
        warnings.push(format!(
            "{} of {} assets received zero weight",
            weights.len() - held,
            weights.len()
        ));
    }

    let output = MaxSharpeOutput {
        weights,
        expected_return,
        volatility,
        sharpe_ratio,
        hhi_concentration,
        raw_weight_sum: outcome.raw_sum,
        solver: solver.name().to_string(),
        iterations: outcome.iterations,
        degenerate_assets: stats.degenerate_assets.clone(),
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Long-only maximum Sharpe ratio via variance-minimizing QP",
        &serde_json::json!({
            "n_assets": stats.n_assets(),
            "n_observations": stats.observations,
            "risk_free_rate": rf.to_string(),
            "covariance": "sample, Bessel-corrected",
            "regularization": settings.regularization.to_string(),
            "tolerance": settings.tolerance.to_string(),
            "constraint": settings.constraint.to_string(),
            "solver": settings.solver.to_string(),
            "long_only": true,
        }),
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Internals
// ---------------------------------------------------------------------------

fn solve(
    stats: &ReturnStatistics,
    risk_free_rate: Rate,
    settings: &OptimizerSettings,
    solver: &dyn QpSolver,
) -> MeanVarResult<SolveOutcome> {
    if !stats.mean.iter().any(|m| *m > risk_free_rate) {
        return Err(MeanVarError::InfeasibleProblem(format!(
            "no asset has a mean return above the risk-free rate {}",
            risk_free_rate
        )));
    }

    let qp = build_program(stats, risk_free_rate, settings)?;
    let solution = solver.solve(&qp);
    tracing::debug!(
        solver = solver.name(),
        status = %solution.status,
        iterations = solution.iterations,
        "QP solve finished"
    );

    let detail = solution
        .message
        .clone()
        .unwrap_or_else(|| format!("{} returned {}", solver.name(), solution.status));
    let raw = match (solution.status, solution.x) {
        (SolverStatus::Optimal, Some(x)) => x,
        (SolverStatus::Optimal, None) => {
            return Err(MeanVarError::OptimizationFailed {
                status: SolverStatus::NumericalError,
                detail: format!("{} reported optimal without a solution", solver.name()),
            })
        }
        (SolverStatus::Infeasible, _) => return Err(MeanVarError::InfeasibleProblem(detail)),
        (status, _) => {
            tracing::warn!(solver = solver.name(), %status, %detail, "QP solve failed");
            return Err(MeanVarError::OptimizationFailed { status, detail });
        }
    };

    if raw.len() != stats.n_assets() {
        return Err(MeanVarError::OptimizationFailed {
            status: SolverStatus::NumericalError,
            detail: format!(
                "{} returned {} weights for {} assets",
                solver.name(),
                raw.len(),
                stats.n_assets()
            ),
        });
    }

    let raw_sum = checked_sum(&raw)?;
    let normalized = normalize_weights(&raw, settings.tolerance)?;

    Ok(SolveOutcome {
        weights: WeightVector::new(stats.assets.clone(), normalized),
        raw_sum,
        iterations: solution.iterations,
    })
}

fn validate_settings(settings: &OptimizerSettings) -> MeanVarResult<()> {
    if settings.regularization.is_sign_negative() && !settings.regularization.is_zero() {
        return Err(MeanVarError::InvalidInput {
            field: "regularization".into(),
            reason: "Must be non-negative".into(),
        });
    }
    require_positive("tolerance", settings.tolerance)?;
    require_positive("solver_settings.tolerance", settings.solver_settings.tolerance)
}

fn require_positive(field: &str, value: Decimal) -> MeanVarResult<()> {
    if value <= Decimal::ZERO {
        return Err(MeanVarError::InvalidInput {
            field: field.into(),
            reason: format!("Must be positive, got {}", value),
        });
    }
    Ok(())
}

fn checked_sum(values: &[Decimal]) -> MeanVarResult<Decimal> {
    values
        .iter()
        .try_fold(Decimal::ZERO, |acc, v| acc.checked_add(*v))
        .ok_or_else(|| MeanVarError::OptimizationFailed {
            status: SolverStatus::NumericalError,
            detail: "raw weights overflow the decimal range".into(),
        })
}

fn out_of_range(field: &str) -> MeanVarError {
    MeanVarError::InvalidInput {
        field: field.into(),
        reason: "Value overflows the decimal range".into(),
    }
}
