use clap::Args;
use serde_json::Value;
use std::time::Instant;

use meanvar_core::statistics::estimate_statistics;
use meanvar_core::types::with_metadata;

use super::{load_csv_returns, SourceArgs};

#[derive(Args, Debug)]
pub struct StatsArgs {
    #[command(flatten)]
    pub source: SourceArgs,
}

pub fn run_stats(args: StatsArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let start = Instant::now();
    let path = args
        .source
        .returns
        .as_deref()
        .ok_or("--returns <file.csv> required for stats")?;
    let config = args.source.base_config()?;

    let provided = load_csv_returns(path, &config)?;
    let stats = estimate_statistics(&provided.table, &config.settings().estimator)?;

    let mut warnings = provided.warnings;
    warnings.extend(stats.warnings.iter().cloned());

    let elapsed = start.elapsed().as_micros() as u64;
    let output = with_metadata(
        "Sample mean and Bessel-corrected sample covariance",
        &serde_json::json!({
            "source": path,
            "n_assets": stats.n_assets(),
            "observations": stats.observations,
            "dropped_assets": provided.dropped_assets,
            "dropped_rows": provided.dropped_rows,
        }),
        warnings,
        elapsed,
        stats,
    );
    Ok(serde_json::to_value(output)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    #[test]
    fn test_stats_from_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("returns.csv");
        std::fs::write(
            &path,
            "Date,X,Y\n2024-01-02,1,2\n2024-01-03,2,4\n2024-01-04,3,6\n2024-01-05,4,9\n",
        )
        .unwrap();

        let value = run_stats(StatsArgs {
            source: SourceArgs {
                returns: Some(path.to_str().unwrap().to_string()),
                ..SourceArgs::default()
            },
        })
        .unwrap();

        let mean: Decimal = value["result"]["mean"][0].as_str().unwrap().parse().unwrap();
        assert_eq!(mean, dec!(2.5));
        assert_eq!(value["result"]["mean"][1], "5.25");
        assert_eq!(value["result"]["observations"], 4);
        assert_eq!(value["assumptions"]["n_assets"], 2);
    }

    #[test]
    fn test_stats_requires_returns() {
        assert!(run_stats(StatsArgs {
            source: SourceArgs::default()
        })
        .is_err());
    }
}
