use std::{cmp::Ordering, collections::HashSet};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{Error, GenerationId, ItemId, Result, UserId};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoredItem {
	pub item_id: ItemId,
	pub score: f32,
}

/// Why a result was served from the popularity ranking instead of the models.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fallback {
	/// No generation has been trained yet.
	Untrained,
	/// Scoring exceeded the request budget.
	Timeout,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecommendationResult {
	pub user_id: UserId,
	pub items: Vec<ScoredItem>,
	pub generation_id: Option<GenerationId>,
	#[serde(with = "crate::time_serde")]
	pub computed_at: OffsetDateTime,
	pub is_cold_start: bool,
	pub fallback: Option<Fallback>,
}
impl RecommendationResult {
	pub fn item_ids(&self) -> Vec<ItemId> {
		self.items.iter().map(|item| item.item_id).collect()
	}

	/// Scores must be non-increasing and item ids unique.
	pub fn check_invariants(&self) -> Result<()> {
		let mut seen = HashSet::with_capacity(self.items.len());

		for item in &self.items {
			if !seen.insert(item.item_id) {
				return Err(Error::Validation {
					message: format!("Item {} appears more than once.", item.item_id),
				});
			}
		}
		for pair in self.items.windows(2) {
			if pair[1].score > pair[0].score {
				return Err(Error::Validation {
					message: format!(
						"Scores increase from {} to {} at item {}.",
						pair[0].score, pair[1].score, pair[1].item_id
					),
				});
			}
		}

		Ok(())
	}
}

/// Final ordering: higher score first, then lower item id. NaN sorts last.
pub fn cmp_scored(a: &ScoredItem, b: &ScoredItem) -> Ordering {
	cmp_f32_desc(a.score, b.score).then_with(|| a.item_id.cmp(&b.item_id))
}

pub fn cmp_f32_desc(a: f32, b: f32) -> Ordering {
	match (a.is_nan(), b.is_nan()) {
		(true, true) => Ordering::Equal,
		(true, false) => Ordering::Greater,
		(false, true) => Ordering::Less,
		(false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
	}
}
