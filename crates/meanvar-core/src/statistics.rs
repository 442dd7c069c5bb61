use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::MeanVarError;
use crate::linalg::vec_dot;
use crate::returns::ReturnsTable;
use crate::MeanVarResult;

/// Options for [`estimate_statistics`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EstimatorSettings {
    /// Fail with `DegenerateAsset` instead of warning on constant columns.
    #[serde(default)]
    pub reject_degenerate: bool,
}

/// Sample moments of a returns table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnStatistics {
    pub assets: Vec<String>,
    /// Per-asset arithmetic mean return.
    pub mean: Vec<Decimal>,
    /// Bessel-corrected sample covariance, same ordering as `assets`.
    pub covariance: Vec<Vec<Decimal>>,
    /// Number of observations the moments were estimated from.
    pub observations: usize,
    /// Assets whose returns never changed; Σ is singular along them.
    #[serde(default)]
    pub degenerate_assets: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl ReturnStatistics {
    /// Wrap externally estimated moments after checking shape and symmetry.
    pub fn from_parts(
        assets: Vec<String>,
        mean: Vec<Decimal>,
        covariance: Vec<Vec<Decimal>>,
    ) -> MeanVarResult<Self> {
        let n = assets.len();
        if n == 0 {
            return Err(MeanVarError::InsufficientData(
                "At least one asset required".into(),
            ));
        }
        if mean.len() != n {
            return Err(MeanVarError::InvalidInput {
                field: "mean".into(),
                reason: format!("Expected {} means but got {}", n, mean.len()),
            });
        }
        validate_covariance_matrix(&covariance, n)?;

        let degenerate_assets = assets
            .iter()
            .zip(covariance.iter().enumerate())
            .filter(|(_, (i, row))| row[*i].is_zero())
            .map(|(a, _)| a.clone())
            .collect();

        Ok(Self {
            assets,
            mean,
            covariance,
            observations: 0,
            degenerate_assets,
            warnings: Vec::new(),
        })
    }

    pub fn n_assets(&self) -> usize {
        self.assets.len()
    }

    /// Sample variance of each asset (diagonal of Σ).
    pub fn variances(&self) -> Vec<Decimal> {
        (0..self.n_assets()).map(|i| self.covariance[i][i]).collect()
    }
}

/// Estimate the sample mean vector and covariance matrix of a returns table.
///
/// Uses the unbiased estimators: arithmetic mean per asset and covariance
/// divided by `T - 1`. Constant columns are surfaced through
/// `degenerate_assets` (or rejected, see [`EstimatorSettings`]).
pub fn estimate_statistics(
    table: &ReturnsTable,
    settings: &EstimatorSettings,
) -> MeanVarResult<ReturnStatistics> {
    let t = table.n_observations();
    if t < 2 {
        return Err(MeanVarError::InsufficientData(format!(
            "At least 2 return observations required for a sample covariance, got {}",
            t
        )));
    }

    let n = table.n_assets();
    let columns: Vec<Vec<Decimal>> = (0..n).map(|j| table.column(j)).collect();
    let mut mean = Vec::with_capacity(n);
    for (asset, column) in table.assets().iter().zip(columns.iter()) {
        mean.push(sample_mean(column).ok_or_else(|| overflow(asset))?);
    }
    let mut deviations = Vec::with_capacity(n);
    for ((asset, column), m) in table.assets().iter().zip(columns.iter()).zip(mean.iter()) {
        let d: Option<Vec<Decimal>> = column.iter().map(|r| r.checked_sub(*m)).collect();
        deviations.push(d.ok_or_else(|| overflow(asset))?);
    }

    let denom = Decimal::from((t - 1) as i64);
    let mut covariance = vec![vec![Decimal::ZERO; n]; n];
    for i in 0..n {
        for j in i..n {
            let s = vec_dot(&deviations[i], &deviations[j])
                .ok_or_else(|| overflow(&table.assets()[i]))?;
            let cov = (s / denom).normalize();
            covariance[i][j] = cov;
            covariance[j][i] = cov;
        }
    }

    // Exactly constant columns: every deviation is zero.
    let degenerate_assets: Vec<String> = table
        .assets()
        .iter()
        .zip(deviations.iter())
        .filter(|(_, d)| d.iter().all(|x| x.is_zero()))
        .map(|(a, _)| a.clone())
        .collect();

    let mut warnings = Vec::new();
    if !degenerate_assets.is_empty() {
        if settings.reject_degenerate {
            return Err(MeanVarError::DegenerateAsset {
                assets: degenerate_assets,
            });
        }
        tracing::warn!(
            assets = ?degenerate_assets,
            "constant return series, covariance matrix is singular along them"
        );
        warnings.push(format!(
            "Constant returns (zero variance) for: {}; covariance matrix is singular",
            degenerate_assets.join(", ")
        ));
    }

    Ok(ReturnStatistics {
        assets: table.assets().to_vec(),
        mean,
        covariance,
        observations: t,
        degenerate_assets,
        warnings,
    })
}

/// Arithmetic mean, `None` when the running sum overflows.
fn sample_mean(values: &[Decimal]) -> Option<Decimal> {
    let sum = values
        .iter()
        .try_fold(Decimal::ZERO, |acc, r| acc.checked_add(*r))?;
    Some((sum / Decimal::from(values.len() as i64)).normalize())
}

fn overflow(asset: &str) -> MeanVarError {
    MeanVarError::InvalidInput {
        field: format!("returns.{}", asset),
        reason: "Returns too large: sample moments overflow the decimal range".into(),
    }
}

#[allow(clippy::needless_range_loop)]
fn validate_covariance_matrix(cov: &[Vec<Decimal>], n: usize) -> MeanVarResult<()> {
    if cov.len() != n {
        return Err(MeanVarError::InvalidInput {
            field: "covariance".into(),
            reason: format!("Expected {}x{} matrix but got {} rows", n, n, cov.len()),
        });
    }
    for (i, row) in cov.iter().enumerate() {
        if row.len() != n {
            return Err(MeanVarError::InvalidInput {
                field: "covariance".into(),
                reason: format!("Row {} has {} columns, expected {}", i, row.len(), n),
            });
        }
        if row[i].is_sign_negative() && !row[i].is_zero() {
            return Err(MeanVarError::InvalidInput {
                field: "covariance".into(),
                reason: format!("Negative variance on diagonal [{},{}]={}", i, i, row[i]),
            });
        }
    }
    let tolerance = Decimal::new(1, 12);
    for i in 0..n {
        for j in (i + 1)..n {
            if (cov[i][j] - cov[j][i]).abs() > tolerance {
                return Err(MeanVarError::InvalidInput {
                    field: "covariance".into(),
                    reason: format!(
                        "Not symmetric: [{},{}]={} != [{},{}]={}",
                        i, j, cov[i][j], j, i, cov[j][i]
                    ),
                });
            }
        }
    }
    Ok(())
}
