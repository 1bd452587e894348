pub mod matrix;
pub mod snapshot;
pub mod store;

mod error;

pub use error::{Error, Result};
pub use matrix::InteractionMatrix;
pub use snapshot::{FeatureSnapshot, PairStats};
pub use store::FeatureStore;
