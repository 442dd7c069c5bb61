use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::MeanVarError;
use crate::MeanVarResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One time-indexed row of periodic simple returns, one value per asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnObservation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    /// Returns in the table's asset order (0.01 = 1%).
    pub returns: Vec<Decimal>,
}

/// Raw, unvalidated table shape used for deserialization.
#[derive(Debug, Clone, Deserialize)]
struct ReturnsTableData {
    assets: Vec<String>,
    observations: Vec<ReturnObservation>,
}

/// Immutable table of periodic returns.
///
/// Columns are assets, rows are observations. Every row carries exactly one
/// value per asset; assets without data must be removed before the table is
/// built (see [`ReturnsProvider`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ReturnsTableData")]
pub struct ReturnsTable {
    assets: Vec<String>,
    observations: Vec<ReturnObservation>,
}

impl ReturnsTable {
    /// Build a table, checking asset identifiers, row widths and dates.
    ///
    /// Either every observation is dated or none is; dates must be strictly
    /// increasing.
    pub fn new(
        assets: Vec<String>,
        observations: Vec<ReturnObservation>,
    ) -> MeanVarResult<Self> {
        validate_assets(&assets)?;

        let n = assets.len();
        for (row, obs) in observations.iter().enumerate() {
            if obs.returns.len() != n {
                return Err(MeanVarError::InvalidInput {
                    field: format!("observations[{}]", row),
                    reason: format!("Expected {} returns but got {}", n, obs.returns.len()),
                });
            }
        }

        validate_dates(&observations)?;

        Ok(Self {
            assets,
            observations,
        })
    }

    /// Build an undated table from per-asset return columns.
    pub fn from_columns(assets: Vec<String>, columns: Vec<Vec<Decimal>>) -> MeanVarResult<Self> {
        if columns.len() != assets.len() {
            return Err(MeanVarError::InvalidInput {
                field: "columns".into(),
                reason: format!("Expected {} columns but got {}", assets.len(), columns.len()),
            });
        }
        let rows = columns.first().map(|c| c.len()).unwrap_or(0);
        if let Some((j, col)) = columns.iter().enumerate().find(|(_, c)| c.len() != rows) {
            return Err(MeanVarError::InvalidInput {
                field: format!("columns[{}]", j),
                reason: format!("Expected {} observations but got {}", rows, col.len()),
            });
        }

        let observations = (0..rows)
            .map(|t| ReturnObservation {
                date: None,
                returns: columns.iter().map(|col| col[t]).collect(),
            })
            .collect();
        Self::new(assets, observations)
    }

    pub fn assets(&self) -> &[String] {
        &self.assets
    }

    pub fn observations(&self) -> &[ReturnObservation] {
        &self.observations
    }

    pub fn n_assets(&self) -> usize {
        self.assets.len()
    }

    pub fn n_observations(&self) -> usize {
        self.observations.len()
    }

    /// Position of an asset in the column ordering.
    pub fn asset_index(&self, asset: &str) -> Option<usize> {
        self.assets.iter().position(|a| a == asset)
    }

    /// Return of `asset` in observation `row`.
    pub fn value(&self, row: usize, asset: &str) -> Option<Decimal> {
        let j = self.asset_index(asset)?;
        self.observations.get(row).map(|obs| obs.returns[j])
    }

    /// All observations of the asset at column `j`, oldest first.
    pub fn column(&self, j: usize) -> Vec<Decimal> {
        self.observations.iter().map(|obs| obs.returns[j]).collect()
    }
}

impl TryFrom<ReturnsTableData> for ReturnsTable {
    type Error = MeanVarError;

    fn try_from(data: ReturnsTableData) -> Result<Self, Self::Error> {
        ReturnsTable::new(data.assets, data.observations)
    }
}

fn validate_dates(observations: &[ReturnObservation]) -> MeanVarResult<()> {
    let dated = observations.first().is_some_and(|obs| obs.date.is_some());
    let mut last: Option<NaiveDate> = None;
    for (row, obs) in observations.iter().enumerate() {
        let field = || format!("observations[{}].date", row);
        match (obs.date, dated) {
            (Some(date), true) => {
                if let Some(prev) = last {
                    if date <= prev {
                        return Err(MeanVarError::InvalidInput {
                            field: field(),
                            reason: format!(
                                "Dates must be strictly increasing ({} after {})",
                                date, prev
                            ),
                        });
                    }
                }
                last = Some(date);
            }
            (None, false) => {}
            _ => {
                return Err(MeanVarError::InvalidInput {
                    field: field(),
                    reason: "Either every observation is dated or none is".into(),
                })
            }
        }
    }
    Ok(())
}

fn validate_assets(assets: &[String]) -> MeanVarResult<()> {
    if assets.is_empty() {
        return Err(MeanVarError::InsufficientData(
            "At least one asset required".into(),
        ));
    }
    let mut seen = HashSet::with_capacity(assets.len());
    for (j, asset) in assets.iter().enumerate() {
        if asset.trim().is_empty() {
            return Err(MeanVarError::InvalidInput {
                field: format!("assets[{}]", j),
                reason: "Asset identifier must not be empty".into(),
            });
        }
        if !seen.insert(asset.as_str()) {
            return Err(MeanVarError::InvalidInput {
                field: format!("assets[{}]", j),
                reason: format!("Duplicate asset identifier '{}'", asset),
            });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Provider contract
// ---------------------------------------------------------------------------

/// What the caller wants a returns table for.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReturnsRequest {
    /// Requested assets in order; `None` means every asset the source knows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub universe: Option<Vec<String>>,
    /// Inclusive start date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<NaiveDate>,
    /// Inclusive end date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<NaiveDate>,
}

/// A returns table plus the coverage notes gathered while building it.
#[derive(Debug, Clone, Serialize)]
pub struct ProvidedReturns {
    pub table: ReturnsTable,
    /// Requested assets that had no observed data at all.
    pub dropped_assets: Vec<String>,
    /// Assets kept despite missing observations.
    pub partial_assets: Vec<String>,
    /// Rows removed because a kept asset had no value in them.
    pub dropped_rows: usize,
    pub warnings: Vec<String>,
}

/// Source of periodic returns for an asset universe.
///
/// Implementations drop assets with no data (with a warning) and warn on
/// partial coverage, so the returned table may cover a subset of the
/// requested universe.
pub trait ReturnsProvider {
    fn returns_table(&self, request: &ReturnsRequest) -> MeanVarResult<ProvidedReturns>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn names(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn undated(returns: Vec<Decimal>) -> ReturnObservation {
        ReturnObservation {
            date: None,
            returns,
        }
    }

    #[test]
    fn test_from_columns_transposes() {
        let table = ReturnsTable::from_columns(
            names(&["A", "B"]),
            vec![vec![dec!(0.01), dec!(0.02), dec!(0.03)], vec![dec!(-0.01), dec!(0), dec!(0.01)]],
        )
        .unwrap();
        assert_eq!(table.n_assets(), 2);
        assert_eq!(table.n_observations(), 3);
        assert_eq!(table.value(1, "A"), Some(dec!(0.02)));
        assert_eq!(table.value(2, "B"), Some(dec!(0.01)));
        assert_eq!(table.value(0, "C"), None);
        assert_eq!(table.column(1), vec![dec!(-0.01), dec!(0), dec!(0.01)]);
    }

    #[test]
    fn test_ragged_row_rejected() {
        let obs = vec![
            undated(vec![dec!(0.01), dec!(0.02)]),
            undated(vec![dec!(0.01)]),
        ];
        let err = ReturnsTable::new(names(&["A", "B"]), obs).unwrap_err();
        assert!(matches!(err, MeanVarError::InvalidInput { .. }));
    }

    #[test]
    fn test_duplicate_assets_rejected() {
        let err = ReturnsTable::from_columns(names(&["A", "A"]), vec![vec![], vec![]]).unwrap_err();
        assert!(err.to_string().contains("Duplicate"));
    }

    #[test]
    fn test_empty_universe_rejected() {
        let err = ReturnsTable::new(Vec::new(), Vec::new()).unwrap_err();
        assert!(matches!(err, MeanVarError::InsufficientData(_)));
    }

    #[test]
    fn test_dates_must_increase() {
        let d = |day| NaiveDate::from_ymd_opt(2024, 1, day);
        let obs = vec![
            ReturnObservation {
                date: d(3),
                returns: vec![dec!(0.01)],
            },
            ReturnObservation {
                date: d(2),
                returns: vec![dec!(0.02)],
            },
        ];
        assert!(ReturnsTable::new(names(&["A"]), obs).is_err());
    }

    #[test]
    fn test_mixed_dated_and_undated_rows_rejected() {
        let d = |day| NaiveDate::from_ymd_opt(2024, 1, day);
        let dated = |date, r| ReturnObservation {
            date,
            returns: vec![r],
        };
        // A gap must not hide the 3rd -> 2nd step backwards
        let obs = vec![dated(d(3), dec!(0.01)), undated(vec![dec!(0)]), dated(d(2), dec!(0.02))];
        let err = ReturnsTable::new(names(&["A"]), obs).unwrap_err();
        assert!(matches!(err, MeanVarError::InvalidInput { .. }));

        let obs = vec![undated(vec![dec!(0.01)]), dated(d(2), dec!(0.02))];
        assert!(ReturnsTable::new(names(&["A"]), obs).is_err());

        let obs = vec![dated(d(2), dec!(0.01)), dated(d(3), dec!(0.02)), dated(d(9), dec!(0))];
        assert_eq!(ReturnsTable::new(names(&["A"]), obs).unwrap().n_observations(), 3);
    }

    #[test]
    fn test_deserialize_validates() {
        let json = r#"{"assets":["A","B"],"observations":[{"returns":["0.01"]}]}"#;
        assert!(serde_json::from_str::<ReturnsTable>(json).is_err());

        let json = r#"{"assets":["A"],"observations":[{"date":"2024-01-02","returns":["0.01"]}]}"#;
        let table: ReturnsTable = serde_json::from_str(json).unwrap();
        assert_eq!(table.value(0, "A"), Some(dec!(0.01)));
    }
}
