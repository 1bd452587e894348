pub mod als;
pub mod cancel;
pub mod codec;
pub mod content;
pub mod evaluate;
pub mod generation;
pub mod ranking;

mod error;
mod linalg;

pub use als::{AlsParams, CandidateModel, CandidateSet};
pub use cancel::CancelFlag;
pub use content::{ContentIndex, Standardizer};
pub use error::{Error, Result};
pub use evaluate::{EvaluationReport, Holdout};
pub use generation::{Hyperparameters, ModelGeneration, TrainingSummary};
pub use ranking::{RankingModel, RankingParams, ScoreContext};
