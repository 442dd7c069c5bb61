use rust_decimal::Decimal;
use thiserror::Error;

use crate::solver::SolverStatus;

#[derive(Debug, Error)]
pub enum MeanVarError {
    #[error("Invalid input: {field}: {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Degenerate assets with constant returns: {}", assets.join(", "))]
    DegenerateAsset { assets: Vec<String> },

    #[error("Infeasible problem: {0}")]
    InfeasibleProblem(String),

    #[error("Optimization failed ({status}): {detail}")]
    OptimizationFailed {
        status: SolverStatus,
        detail: String,
    },

    #[error("Normalization error: raw weights sum to {sum}, cannot rescale to 1")]
    Normalization { sum: Decimal },

    #[error("Data source error: {0}")]
    DataSource(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for MeanVarError {
    fn from(e: serde_json::Error) -> Self {
        MeanVarError::SerializationError(e.to_string())
    }
}
