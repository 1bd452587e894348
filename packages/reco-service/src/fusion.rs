//! Blending of collaborative and ranking scores into the final order.

use std::collections::HashSet;

use reco_config::Fusion;
use reco_domain::{ItemId, ScoredItem, cmp_scored};

use crate::{Error, Result};

/// Blend weights, normalized to sum to 1.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FusionWeights {
	collaborative: f32,
	content: f32,
}
impl FusionWeights {
	pub fn normalized(collaborative: f32, content: f32) -> Result<Self> {
		if !collaborative.is_finite() || !content.is_finite() {
			return Err(Error::Validation {
				message: "Fusion weights must be finite numbers.".to_string(),
			});
		}
		if collaborative < 0.0 || content < 0.0 {
			return Err(Error::Validation {
				message: "Fusion weights must be zero or greater.".to_string(),
			});
		}

		let sum = collaborative + content;

		if sum <= 0.0 {
			return Err(Error::Validation {
				message: "Fusion weights must not both be zero.".to_string(),
			});
		}

		Ok(Self { collaborative: collaborative / sum, content: content / sum })
	}

	pub fn from_config(fusion: &Fusion) -> Result<Self> {
		Self::normalized(fusion.collaborative_weight, fusion.content_weight)
	}

	pub fn collaborative(&self) -> f32 {
		self.collaborative
	}

	pub fn content(&self) -> f32 {
		self.content
	}

	/// A missing ranking score means the item's features could not be scored; the collaborative
	/// score then stands alone.
	pub fn blend(&self, collaborative: f32, ranking: Option<f32>) -> f32 {
		match ranking {
			Some(ranking) => self.collaborative * collaborative + self.content * ranking,
			None => collaborative,
		}
	}
}

/// Produces the final list: seen items dropped unless `include_seen`, at most `k` entries, no
/// duplicates, higher score first and lower item id on ties. `ranking_scores` runs parallel to
/// `candidates`. Non-finite scores are dropped.
pub fn fuse(
	weights: &FusionWeights,
	candidates: &[(ItemId, f32)],
	ranking_scores: &[Option<f32>],
	seen: &HashSet<ItemId>,
	include_seen: bool,
	k: usize,
) -> Vec<ScoredItem> {
	let mut emitted = HashSet::with_capacity(candidates.len());
	let mut fused: Vec<ScoredItem> = candidates
		.iter()
		.enumerate()
		.filter(|(_, (item_id, _))| include_seen || !seen.contains(item_id))
		.map(|(idx, (item_id, collaborative))| ScoredItem {
			item_id: *item_id,
			score: weights.blend(*collaborative, ranking_scores.get(idx).copied().flatten()),
		})
		.filter(|item| item.score.is_finite())
		.collect();

	fused.sort_by(cmp_scored);
	fused.retain(|item| emitted.insert(item.item_id));
	fused.truncate(k);

	fused
}
