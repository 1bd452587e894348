//! Live serving statistics, tracked per generation.

use ahash::AHashSet;
use serde::Serialize;

use reco_domain::{GenerationId, ItemId, RecommendationResult};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ModelMetrics {
	pub generation_id: GenerationId,
	/// Distinct recommended items over the generation's catalog size.
	pub coverage: f64,
	pub avg_score: f64,
	pub cold_start_rate: f64,
	pub requests: u64,
}

#[derive(Debug, Default)]
pub(crate) struct ServingStats {
	requests: u64,
	cold_starts: u64,
	scored_items: u64,
	score_sum: f64,
	distinct_items: AHashSet<ItemId>,
}
impl ServingStats {
	pub(crate) fn record(&mut self, result: &RecommendationResult) {
		self.requests += 1;

		if result.is_cold_start {
			self.cold_starts += 1;
		}

		for item in &result.items {
			self.scored_items += 1;
			self.score_sum += f64::from(item.score);

			self.distinct_items.insert(item.item_id);
		}
	}

	pub(crate) fn summarize(&self, generation_id: GenerationId, catalog_size: usize) -> ModelMetrics {
		ModelMetrics {
			generation_id,
			coverage: ratio(self.distinct_items.len() as f64, catalog_size as f64),
			avg_score: ratio(self.score_sum, self.scored_items as f64),
			cold_start_rate: ratio(self.cold_starts as f64, self.requests as f64),
			requests: self.requests,
		}
	}
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
	if denominator > 0.0 { numerator / denominator } else { 0.0 }
}
