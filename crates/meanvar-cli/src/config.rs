use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use meanvar_core::optimizer::{ExcessReturnConstraint, OptimizerSettings};
use meanvar_core::returns::ReturnsRequest;
use meanvar_core::solver::SolverKind;

use crate::input;

/// Optimizer options from a JSON/YAML `--config` file or from flags.
///
/// Every field is optional so a file and the command line can be layered:
/// flags win over the file, the file wins over built-in defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OptimizerConfig {
    pub risk_free_rate: Option<Decimal>,
    pub solver: Option<SolverKind>,
    pub constraint: Option<ExcessReturnConstraint>,
    /// Normalization tolerance.
    pub tolerance: Option<Decimal>,
    /// Backend step/multiplier tolerance.
    pub solver_tolerance: Option<Decimal>,
    pub max_iterations: Option<usize>,
    pub regularization: Option<Decimal>,
    pub reject_degenerate: Option<bool>,
    pub assets: Option<Vec<String>>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl OptimizerConfig {
    pub fn load(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let config: OptimizerConfig = input::file::read_structured(path)?;
        tracing::debug!(path, ?config, "loaded optimizer config");
        Ok(config)
    }

    /// Layer `overrides` on top of `self`.
    pub fn merge(self, overrides: OptimizerConfig) -> Self {
        Self {
            risk_free_rate: overrides.risk_free_rate.or(self.risk_free_rate),
            solver: overrides.solver.or(self.solver),
            constraint: overrides.constraint.or(self.constraint),
            tolerance: overrides.tolerance.or(self.tolerance),
            solver_tolerance: overrides.solver_tolerance.or(self.solver_tolerance),
            max_iterations: overrides.max_iterations.or(self.max_iterations),
            regularization: overrides.regularization.or(self.regularization),
            reject_degenerate: overrides.reject_degenerate.or(self.reject_degenerate),
            assets: overrides.assets.or(self.assets),
            start: overrides.start.or(self.start),
            end: overrides.end.or(self.end),
        }
    }

    pub fn risk_free_rate(&self) -> Decimal {
        self.risk_free_rate.unwrap_or(Decimal::ZERO)
    }

    /// Apply the configured values over [`OptimizerSettings::default`].
    pub fn apply_to(&self, mut settings: OptimizerSettings) -> OptimizerSettings {
        if let Some(solver) = self.solver {
            settings.solver = solver;
        }
        if let Some(constraint) = self.constraint {
            settings.constraint = constraint;
        }
        if let Some(tolerance) = self.tolerance {
            settings.tolerance = tolerance;
        }
        if let Some(tolerance) = self.solver_tolerance {
            settings.solver_settings.tolerance = tolerance;
        }
        if let Some(max_iterations) = self.max_iterations {
            settings.solver_settings.max_iterations = max_iterations;
        }
        if let Some(regularization) = self.regularization {
            settings.regularization = regularization;
        }
        if let Some(reject) = self.reject_degenerate {
            settings.estimator.reject_degenerate = reject;
        }
        settings
    }

    pub fn settings(&self) -> OptimizerSettings {
        self.apply_to(OptimizerSettings::default())
    }

    pub fn request(&self) -> Result<ReturnsRequest, Box<dyn std::error::Error>> {
        if let (Some(start), Some(end)) = (self.start, self.end) {
            if start > end {
                return Err(format!("start date {} is after end date {}", start, end).into());
            }
        }
        Ok(ReturnsRequest {
            universe: self.assets.clone(),
            start: self.start,
            end: self.end,
        })
    }
}
