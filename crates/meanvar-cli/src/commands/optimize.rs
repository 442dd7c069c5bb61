use clap::Args;
use rust_decimal::Decimal;
use serde_json::Value;
use std::path::PathBuf;

use meanvar_core::optimizer::{self, ExcessReturnConstraint, MaxSharpeInput};
use meanvar_core::solver::SolverKind;

use super::{load_csv_returns, SourceArgs};
use crate::config::OptimizerConfig;
use crate::input;
use crate::output::weights_file;

#[derive(Args, Debug)]
pub struct OptimizeArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Full optimizer input (returns table and settings) as JSON or YAML
    #[arg(long, conflicts_with = "returns")]
    pub input: Option<String>,

    /// Risk-free rate per period, same periodicity as the returns
    #[arg(long, allow_hyphen_values = true)]
    pub risk_free_rate: Option<Decimal>,

    /// QP backend: active-set or projected-gradient
    #[arg(long)]
    pub solver: Option<SolverKind>,

    /// Excess-return constraint: aggregate (μ'w - rf = 1) or per-asset ((μ - rf)'w = 1)
    #[arg(long)]
    pub constraint: Option<ExcessReturnConstraint>,

    /// Tolerance on negative raw weights and the normalization sum
    #[arg(long)]
    pub tolerance: Option<Decimal>,

    /// Backend convergence tolerance
    #[arg(long)]
    pub solver_tolerance: Option<Decimal>,

    /// Backend iteration budget
    #[arg(long)]
    pub max_iterations: Option<usize>,

    /// Diagonal loading added to the covariance matrix
    #[arg(long)]
    pub regularization: Option<Decimal>,

    /// Also write the weights as an asset,weight CSV
    #[arg(long)]
    pub weights_out: Option<PathBuf>,
}

impl OptimizeArgs {
    fn config(&self) -> Result<OptimizerConfig, Box<dyn std::error::Error>> {
        Ok(self.source.base_config()?.merge(OptimizerConfig {
            risk_free_rate: self.risk_free_rate,
            solver: self.solver,
            constraint: self.constraint,
            tolerance: self.tolerance,
            solver_tolerance: self.solver_tolerance,
            max_iterations: self.max_iterations,
            regularization: self.regularization,
            ..OptimizerConfig::default()
        }))
    }
}

pub fn run_optimize(args: OptimizeArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let config = args.config()?;
    let mut data_warnings = Vec::new();

    let ms_input = if let Some(ref path) = args.source.returns {
        let provided = load_csv_returns(path, &config)?;
        data_warnings = provided.warnings;
        MaxSharpeInput {
            returns: provided.table,
            risk_free_rate: config.risk_free_rate(),
            settings: config.settings(),
        }
    } else {
        if config.assets.is_some() || config.start.is_some() || config.end.is_some() {
            return Err("--assets, --start and --end only apply to --returns CSV input".into());
        }
        let mut ms_input: MaxSharpeInput = if let Some(ref path) = args.input {
            input::file::read_structured(path)?
        } else if let Some(data) = input::stdin::read_stdin()? {
            data
        } else {
            return Err(
                "--returns <file.csv>, --input <file.json> or stdin required for optimize".into(),
            );
        };
        if let Some(rf) = config.risk_free_rate {
            ms_input.risk_free_rate = rf;
        }
        ms_input.settings = config.apply_to(ms_input.settings);
        ms_input
    };

    let mut result = optimizer::optimize_max_sharpe(&ms_input)?;
    result.warnings.splice(0..0, data_warnings);

    if let Some(ref path) = args.weights_out {
        weights_file::write_weights(path, &result.result.weights)?;
    }

    Ok(serde_json::to_value(result)?)
}
