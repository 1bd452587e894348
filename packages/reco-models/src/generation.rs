use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use reco_config::Config;
use reco_domain::GenerationId;
use reco_store::FeatureSnapshot;

use crate::{
	AlsParams, CancelFlag, CandidateModel, ContentIndex, Error, RankingModel, RankingParams,
	Result,
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Hyperparameters {
	pub als: AlsParams,
	pub ranking: RankingParams,
}

/// Data size and optimizer outcome of one training run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainingSummary {
	pub users: usize,
	pub items: usize,
	pub interactions: u64,
	pub iterations_run: u32,
	pub final_loss: f64,
}

/// Immutable trained state. Serving reads a generation through an `Arc` and never mutates it; a
/// retrain produces a new value with a higher id.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelGeneration {
	pub generation_id: GenerationId,
	#[serde(with = "reco_domain::time_serde")]
	pub trained_at: OffsetDateTime,
	pub hyperparameters: Hyperparameters,
	pub candidate: CandidateModel,
	pub ranking: RankingModel,
	pub content: ContentIndex,
	pub summary: TrainingSummary,
}

impl Hyperparameters {
	pub fn from_config(cfg: &Config) -> Self {
		Self {
			als: AlsParams::from_config(&cfg.training),
			ranking: RankingParams::from_config(&cfg.ranking),
		}
	}
}

impl ModelGeneration {
	/// Trains every model of a generation from one snapshot. Seeds are derived from the base
	/// seed and the generation id, so retraining the same snapshot under the same id reproduces
	/// the same factors.
	pub fn train(
		generation_id: GenerationId,
		snapshot: &FeatureSnapshot,
		hyperparameters: &Hyperparameters,
		cancel: &CancelFlag,
	) -> Result<Self> {
		let seed = hyperparameters.als.seed.wrapping_add(generation_id.0);
		let als = AlsParams { seed, ..hyperparameters.als.clone() };
		let (candidate, run) = CandidateModel::train(snapshot, &als, cancel)?;
		let ranking = RankingModel::train(
			snapshot,
			&candidate,
			&hyperparameters.ranking,
			seed.wrapping_add(1),
			cancel,
		)?;
		let content = ContentIndex::build(snapshot)?;
		let generation = Self {
			generation_id,
			trained_at: OffsetDateTime::now_utc(),
			hyperparameters: hyperparameters.clone(),
			candidate,
			ranking,
			content,
			summary: TrainingSummary {
				users: snapshot.users().len(),
				items: snapshot.items().len(),
				interactions: snapshot.interaction_events(),
				iterations_run: run.iterations_run,
				final_loss: run.final_loss,
			},
		};

		generation.ensure_finite()?;

		Ok(generation)
	}

	/// Rejects a generation that carries NaN or Inf anywhere in its learned state.
	pub fn ensure_finite(&self) -> Result<()> {
		let broken = if !self.candidate.is_finite() {
			Some("candidate factors")
		} else if !self.ranking.is_finite() {
			Some("ranking weights")
		} else if !self.content.is_finite() {
			Some("content vectors")
		} else {
			None
		};

		match broken {
			Some(part) => Err(Error::Convergence {
				message: format!("Generation {} has non-finite {part}.", self.generation_id),
			}),
			None => Ok(()),
		}
	}
}
