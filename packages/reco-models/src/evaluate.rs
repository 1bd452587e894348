//! Offline precision/recall and RMSE evaluation on a per-user holdout.

use std::collections::{BTreeMap, HashSet};

use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};
use serde::{Deserialize, Serialize};

use reco_domain::{ItemId, UserId};
use reco_store::FeatureSnapshot;

use crate::ModelGeneration;

/// Interactions withheld from training, per user.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Holdout {
	by_user: BTreeMap<UserId, Vec<ItemId>>,
	strengths: BTreeMap<(UserId, ItemId), f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
	pub k: usize,
	pub precision_at_k: f64,
	pub recall_at_k: f64,
	pub f1_at_k: f64,
	/// Root mean squared error of the user and item factor dot product against the summed
	/// strength of every held-out pair.
	pub rmse: f64,
	pub users_evaluated: usize,
}

impl Holdout {
	pub fn is_empty(&self) -> bool {
		self.by_user.is_empty()
	}

	pub fn users(&self) -> impl Iterator<Item = UserId> + '_ {
		self.by_user.keys().copied()
	}

	pub fn items_for(&self, user_id: UserId) -> &[ItemId] {
		self.by_user.get(&user_id).map(Vec::as_slice).unwrap_or(&[])
	}

	/// Summed strength the held-out pair had before it was withheld.
	pub fn strength(&self, user_id: UserId, item_id: ItemId) -> f64 {
		self.strengths.get(&(user_id, item_id)).copied().unwrap_or(0.0)
	}

	pub fn pairs(&self) -> HashSet<(UserId, ItemId)> {
		self.by_user
			.iter()
			.flat_map(|(user_id, items)| items.iter().map(move |item_id| (*user_id, *item_id)))
			.collect()
	}

	/// The snapshot to train on: everything except the held-out pairs.
	pub fn training_snapshot(&self, snapshot: &FeatureSnapshot) -> FeatureSnapshot {
		snapshot.without(&self.pairs())
	}
}

/// Holds out `fraction` of the items of every user with at least `min_interactions` distinct
/// items. At least one item is held out and at least one stays in training.
pub fn holdout_split(
	snapshot: &FeatureSnapshot,
	fraction: f32,
	min_interactions: usize,
	seed: u64,
) -> Holdout {
	let mut rng = StdRng::seed_from_u64(seed);
	let mut by_user = BTreeMap::new();
	let mut strengths = BTreeMap::new();

	for user_id in snapshot.users() {
		let mut items = snapshot.items_of(*user_id);

		if items.len() < min_interactions.max(2) {
			continue;
		}

		let take = ((items.len() as f32 * fraction).floor() as usize).clamp(1, items.len() - 1);

		items.shuffle(&mut rng);
		items.truncate(take);
		items.sort();

		for item_id in &items {
			if let Some(stats) = snapshot.pairs().get(&(*user_id, *item_id)) {
				strengths.insert((*user_id, *item_id), stats.strength);
			}
		}

		by_user.insert(*user_id, items);
	}

	Holdout { by_user, strengths }
}

/// Ranks unseen items with the candidate model and scores them against the holdout. Precision
/// divides by the number of items actually returned, so short catalogs are not penalized.
pub fn evaluate(
	generation: &ModelGeneration,
	train_snapshot: &FeatureSnapshot,
	holdout: &Holdout,
	k: usize,
) -> EvaluationReport {
	let mut precision_sum = 0.0;
	let mut recall_sum = 0.0;
	let mut users = 0_usize;
	let mut squared_error = 0.0;
	let mut pairs = 0_usize;

	for user_id in holdout.users() {
		let relevant: HashSet<ItemId> = holdout.items_for(user_id).iter().copied().collect();
		let seen: HashSet<ItemId> = train_snapshot.items_of(user_id).into_iter().collect();
		let recommended = generation.candidate.candidates_excluding(user_id, k, &seen).items;
		let hits = recommended.iter().filter(|(item_id, _)| relevant.contains(item_id)).count();

		if !recommended.is_empty() {
			precision_sum += hits as f64 / recommended.len() as f64;
		}

		recall_sum += hits as f64 / relevant.len() as f64;
		users += 1;

		for item_id in holdout.items_for(user_id) {
			let predicted = f64::from(generation.candidate.affinity(user_id, *item_id));

			squared_error += (predicted - holdout.strength(user_id, *item_id)).powi(2);
			pairs += 1;
		}
	}

	if users == 0 {
		return EvaluationReport {
			k,
			precision_at_k: 0.0,
			recall_at_k: 0.0,
			f1_at_k: 0.0,
			rmse: 0.0,
			users_evaluated: 0,
		};
	}

	let precision = precision_sum / users as f64;
	let recall = recall_sum / users as f64;
	let f1 = if precision + recall > 0.0 {
		2.0 * precision * recall / (precision + recall)
	} else {
		0.0
	};

	let rmse = (squared_error / pairs.max(1) as f64).sqrt();

	tracing::info!(k, precision, recall, f1, rmse, users, "Offline evaluation finished.");

	EvaluationReport {
		k,
		precision_at_k: precision,
		recall_at_k: recall,
		f1_at_k: f1,
		rmse,
		users_evaluated: users,
	}
}
