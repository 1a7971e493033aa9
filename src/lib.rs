pub mod dense;
pub mod error;
pub mod pca;
pub mod rank;
pub mod reliability;
pub mod scores;
pub mod statistics;
mod utils;

pub use error::{AnalysisError, Diagnostic, Result};
pub use pca::{
    EigenSolver, EigenSource, NalgebraEigen, Pca, PcaBuilder, PcaResult, VarimaxMethod,
};
pub use rank::{ErrorModel, RankModel};
pub use reliability::{Cronbach, ReliabilityReport};
pub use scores::{IdenticalElements, PreprocessingSummary, ScoreMatrix};
pub use utils::Direction;
pub use utils::VarianceDenominator;
