pub mod ids;
pub mod interaction;
pub mod result;
pub mod schema;
pub mod time_serde;

mod error;

pub use error::{Error, Result};
pub use ids::{Entity, GenerationId, ItemId, UserId};
pub use interaction::Interaction;
pub use result::{Fallback, RecommendationResult, ScoredItem, cmp_f32_desc, cmp_scored};
pub use schema::{FeatureKind, FeatureSchema, FeatureSlot, FeatureView};
