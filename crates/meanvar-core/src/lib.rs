pub mod error;
pub mod linalg;
pub mod optimizer;
pub mod returns;
pub mod solver;
pub mod statistics;
pub mod types;

pub use error::MeanVarError;
pub use types::*;

/// Standard result type for all meanvar operations
pub type MeanVarResult<T> = Result<T, MeanVarError>;
