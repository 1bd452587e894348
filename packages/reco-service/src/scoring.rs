use std::{collections::HashSet, sync::Arc, time::Instant};

use ahash::AHashMap;
use time::OffsetDateTime;

use reco_domain::{Entity, Fallback, ItemId, RecommendationResult, ScoredItem, UserId, cmp_scored};
use reco_models::{ModelGeneration, ScoreContext};
use reco_store::FeatureStore;

use crate::{FusionWeights, fusion};

/// One request's worth of read-only scoring against a fixed generation.
#[derive(Clone)]
pub(crate) struct ScoringJob {
	pub(crate) generation: Arc<ModelGeneration>,
	pub(crate) store: Arc<FeatureStore>,
	pub(crate) user_id: UserId,
	pub(crate) k: usize,
	pub(crate) include_seen: bool,
	pub(crate) weights: FusionWeights,
	pub(crate) pool_factor: usize,
	pub(crate) deadline: Instant,
}
impl ScoringJob {
	/// Returns `None` once the deadline has passed; the caller answers from popularity instead.
	pub(crate) fn run(self) -> Option<RecommendationResult> {
		if Instant::now() >= self.deadline {
			return None;
		}

		let seen = self.store.seen_items(self.user_id);
		let exclude = if self.include_seen { HashSet::new() } else { seen.clone() };
		let pool = self.k.saturating_mul(self.pool_factor);
		let candidates =
			self.generation.candidate.candidates_excluding(self.user_id, pool, &exclude);

		if candidates.is_cold_start {
			let items = candidates
				.items
				.into_iter()
				.take(self.k)
				.map(|(item_id, score)| ScoredItem { item_id, score })
				.collect();

			return Some(self.result(items, true, None));
		}

		let user_features = self.store.get_features(Entity::User(self.user_id));
		let mut ranking_scores = Vec::with_capacity(candidates.items.len());

		for (item_id, _) in &candidates.items {
			if Instant::now() >= self.deadline {
				return None;
			}

			let item_features = self.store.get_features(Entity::Item(*item_id));
			let context =
				ScoreContext { user_features: &user_features, item_features: &item_features };

			match self.generation.ranking.score(self.user_id, *item_id, &context) {
				Ok(score) => ranking_scores.push(Some(score)),
				Err(err) => {
					tracing::debug!(
						user_id = %self.user_id,
						item_id = %item_id,
						error = %err,
						"Ranking skipped; using the collaborative score."
					);

					ranking_scores.push(None);
				},
			}
		}

		let items = fusion::fuse(
			&self.weights,
			&candidates.items,
			&ranking_scores,
			&seen,
			self.include_seen,
			self.k,
		);

		Some(self.result(items, false, None))
	}

	/// Popularity answer from the same generation, used when scoring ran out of budget.
	pub(crate) fn fallback(&self, reason: Fallback) -> RecommendationResult {
		let exclude =
			if self.include_seen { HashSet::new() } else { self.store.seen_items(self.user_id) };
		let items = self
			.generation
			.candidate
			.popular_excluding(self.k, &exclude)
			.into_iter()
			.map(|(item_id, score)| ScoredItem { item_id, score })
			.collect();
		let is_cold_start = !self.generation.candidate.knows_user(self.user_id);

		self.result(items, is_cold_start, Some(reason))
	}

	fn result(
		&self,
		items: Vec<ScoredItem>,
		is_cold_start: bool,
		fallback: Option<Fallback>,
	) -> RecommendationResult {
		RecommendationResult {
			user_id: self.user_id,
			items,
			generation_id: Some(self.generation.generation_id),
			computed_at: OffsetDateTime::now_utc(),
			is_cold_start,
			fallback,
		}
	}
}

/// Blends collaborative and content neighbors of `item_id`. `content_weight` is the content
/// share in 0..=1.
pub(crate) fn similar_items(
	generation: &ModelGeneration,
	item_id: ItemId,
	k: usize,
	pool: usize,
	content_weight: f32,
) -> Vec<ItemId> {
	let collaborative = generation.candidate.similar_items(item_id, pool);
	let content = generation.content.similar(item_id, pool);

	if collaborative.is_empty() && content.is_empty() {
		return generation
			.candidate
			.popular_excluding(k, &HashSet::from([item_id]))
			.into_iter()
			.map(|(item_id, _)| item_id)
			.collect();
	}

	let mut blended: AHashMap<ItemId, f32> = AHashMap::new();

	for (other, score) in collaborative {
		*blended.entry(other).or_default() += (1.0 - content_weight) * score;
	}
	for (other, score) in content {
		*blended.entry(other).or_default() += content_weight * score;
	}

	let mut ranked: Vec<ScoredItem> =
		blended.into_iter().map(|(item_id, score)| ScoredItem { item_id, score }).collect();

	ranked.sort_by(cmp_scored);
	ranked.truncate(k);

	ranked.into_iter().map(|item| item.item_id).collect()
}
