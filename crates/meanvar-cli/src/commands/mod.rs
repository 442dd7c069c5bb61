pub mod optimize;
pub mod stats;

use chrono::NaiveDate;
use clap::Args;

use meanvar_core::returns::{ProvidedReturns, ReturnsProvider};

use crate::config::OptimizerConfig;
use crate::input::returns_csv::CsvReturnsProvider;

/// Where returns come from and which slice of them to use.
#[derive(Args, Debug, Default)]
pub struct SourceArgs {
    /// Returns CSV: a date column followed by one column per asset
    #[arg(long)]
    pub returns: Option<String>,

    /// Optimizer config file (JSON or YAML); flags override its values
    #[arg(long)]
    pub config: Option<String>,

    /// Restrict to these assets (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub assets: Option<Vec<String>>,

    /// First observation date to include (YYYY-MM-DD)
    #[arg(long)]
    pub start: Option<NaiveDate>,

    /// Last observation date to include (YYYY-MM-DD)
    #[arg(long)]
    pub end: Option<NaiveDate>,

    /// Fail on assets with constant returns instead of warning
    #[arg(long)]
    pub strict_degenerate: bool,
}

impl SourceArgs {
    /// Config file values with the data-source flags layered on top.
    pub fn base_config(&self) -> Result<OptimizerConfig, Box<dyn std::error::Error>> {
        let file = match &self.config {
            Some(path) => OptimizerConfig::load(path)?,
            None => OptimizerConfig::default(),
        };
        Ok(file.merge(OptimizerConfig {
            assets: self.assets.clone(),
            start: self.start,
            end: self.end,
            reject_degenerate: self.strict_degenerate.then_some(true),
            ..OptimizerConfig::default()
        }))
    }
}

/// Load the returns CSV named by `path` for the configured universe and range.
pub fn load_csv_returns(
    path: &str,
    config: &OptimizerConfig,
) -> Result<ProvidedReturns, Box<dyn std::error::Error>> {
    let provider = CsvReturnsProvider::new(crate::input::file::resolve_path(path)?);
    Ok(provider.returns_table(&config.request()?)?)
}
