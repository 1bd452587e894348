pub mod cache;
pub mod fusion;
pub mod metrics;
pub mod service;
pub mod training;

mod error;
mod scoring;

pub use cache::{CacheKey, RecommendationCache};
pub use error::{Error, Result};
pub use fusion::FusionWeights;
pub use metrics::ModelMetrics;
pub use service::{GenerationSelector, RecommendOptions, RecommenderService, ServiceState};
pub use training::{HybridTrainer, ModelTrainer, TrainingEvent, TrainingTicket, TrainingWorker};
