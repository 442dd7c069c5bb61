use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Periodic rates expressed as decimals (0.01 = 1% per period), in the same
/// periodicity as the returns table. Never as percentages.
pub type Rate = Decimal;

/// One asset's share of the portfolio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetWeight {
    pub asset: String,
    pub weight: Decimal,
}

/// Long-only, fully invested portfolio weights in asset order.
///
/// Only the optimizer builds these, so there is no `Deserialize`:
///
/// ```compile_fail
/// let w: meanvar_core::WeightVector =
///     serde_json::from_str(r#"{"assets": ["A"], "weights": ["-3"]}"#).unwrap();
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeightVector {
    assets: Vec<String>,
    weights: Vec<Decimal>,
}

impl WeightVector {
    /// Pair already-normalized weights with their asset ids.
    ///
    /// Callers guarantee `assets.len() == weights.len()`; the optimizer is
    /// the only producer.
    pub(crate) fn new(assets: Vec<String>, weights: Vec<Decimal>) -> Self {
        debug_assert_eq!(assets.len(), weights.len());
        Self { assets, weights }
    }

    pub fn assets(&self) -> &[String] {
        &self.assets
    }

    pub fn weights(&self) -> &[Decimal] {
        &self.weights
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn get(&self, asset: &str) -> Option<Decimal> {
        self.assets
            .iter()
            .position(|a| a == asset)
            .map(|i| self.weights[i])
    }

    pub fn sum(&self) -> Decimal {
        self.weights.iter().sum()
    }

    /// Herfindahl-Hirschman index: sum of squared weights.
    pub fn hhi(&self) -> Decimal {
        self.weights.iter().map(|w| *w * *w).sum()
    }

    pub fn to_asset_weights(&self) -> Vec<AssetWeight> {
        self.assets
            .iter()
            .zip(self.weights.iter())
            .map(|(asset, weight)| AssetWeight {
                asset: asset.clone(),
                weight: *weight,
            })
            .collect()
    }
}

/// Standard computation output envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationOutput<T: Serialize> {
    pub result: T,
    pub methodology: String,
    pub assumptions: serde_json::Value,
    pub warnings: Vec<String>,
    pub metadata: ComputationMetadata,
}

/// Provenance attached to every optimizer run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationMetadata {
    pub version: String,
    pub computation_time_us: u64,
    pub precision: String,
}

/// Wrap a result with its methodology, assumptions and timing.
pub fn with_metadata<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    ComputationOutput {
        result,
        methodology: methodology.to_string(),
        assumptions: serde_json::to_value(assumptions).unwrap_or_default(),
        warnings,
        metadata: ComputationMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            computation_time_us: elapsed_us,
            precision: "rust_decimal_128bit".to_string(),
        },
    }
}
