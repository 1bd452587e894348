use std::collections::{BTreeMap, BTreeSet, HashSet};

use ahash::AHashMap;
use time::OffsetDateTime;

use reco_domain::{FeatureSchema, ItemId, UserId};

use crate::InteractionMatrix;

/// Accumulated interaction data for one (user, item) pair.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PairStats {
	/// Summed strength. Kept in f64 so repeated large events saturate instead of overflowing.
	pub strength: f64,
	pub events: u32,
}

/// Immutable training view of the feature store.
///
/// Users and items are sorted by id, so matrix and factor row indices are stable for a given
/// snapshot.
#[derive(Clone, Debug)]
pub struct FeatureSnapshot {
	taken_at: OffsetDateTime,
	user_schema: FeatureSchema,
	item_schema: FeatureSchema,
	users: Vec<UserId>,
	items: Vec<ItemId>,
	user_index: AHashMap<UserId, usize>,
	item_index: AHashMap<ItemId, usize>,
	pairs: BTreeMap<(UserId, ItemId), PairStats>,
	matrix: InteractionMatrix,
	popularity: Vec<u64>,
	user_features: Vec<Vec<f32>>,
	item_features: Vec<Vec<f32>>,
}

pub(crate) struct SnapshotParts {
	pub(crate) taken_at: OffsetDateTime,
	pub(crate) user_schema: FeatureSchema,
	pub(crate) item_schema: FeatureSchema,
	pub(crate) users: BTreeSet<UserId>,
	pub(crate) items: BTreeSet<ItemId>,
	pub(crate) pairs: BTreeMap<(UserId, ItemId), PairStats>,
	pub(crate) user_features: AHashMap<UserId, Vec<f32>>,
	pub(crate) item_features: AHashMap<ItemId, Vec<f32>>,
}

impl FeatureSnapshot {
	pub(crate) fn assemble(parts: SnapshotParts) -> Self {
		let SnapshotParts {
			taken_at,
			user_schema,
			item_schema,
			mut users,
			mut items,
			pairs,
			user_features,
			item_features,
		} = parts;

		for (user_id, item_id) in pairs.keys() {
			users.insert(*user_id);
			items.insert(*item_id);
		}

		let users: Vec<UserId> = users.into_iter().collect();
		let items: Vec<ItemId> = items.into_iter().collect();
		let user_index: AHashMap<UserId, usize> =
			users.iter().enumerate().map(|(idx, id)| (*id, idx)).collect();
		let item_index: AHashMap<ItemId, usize> =
			items.iter().enumerate().map(|(idx, id)| (*id, idx)).collect();
		let mut popularity = vec![0_u64; items.len()];
		let mut entries = Vec::with_capacity(pairs.len());

		for ((user_id, item_id), stats) in &pairs {
			let user = user_index[user_id];
			let item = item_index[item_id];

			popularity[item] += u64::from(stats.events);

			entries.push((user, item, stats.strength.min(f64::from(f32::MAX)) as f32));
		}

		let matrix = InteractionMatrix::from_entries(users.len(), items.len(), entries);
		let user_features = users
			.iter()
			.map(|id| {
				user_features.get(id).cloned().unwrap_or_else(|| vec![0.0; user_schema.dims()])
			})
			.collect();
		let item_features = items
			.iter()
			.map(|id| {
				item_features.get(id).cloned().unwrap_or_else(|| vec![0.0; item_schema.dims()])
			})
			.collect();

		Self {
			taken_at,
			user_schema,
			item_schema,
			users,
			items,
			user_index,
			item_index,
			pairs,
			matrix,
			popularity,
			user_features,
			item_features,
		}
	}

	/// Derives a snapshot with the given (user, item) pairs removed. Catalog membership and
	/// features are kept; popularity drops by the removed events.
	pub fn without(&self, holdout: &HashSet<(UserId, ItemId)>) -> Self {
		let pairs = self
			.pairs
			.iter()
			.filter(|(key, _)| !holdout.contains(key))
			.map(|(key, stats)| (*key, *stats))
			.collect();

		Self::assemble(SnapshotParts {
			taken_at: self.taken_at,
			user_schema: self.user_schema.clone(),
			item_schema: self.item_schema.clone(),
			users: self.users.iter().copied().collect(),
			items: self.items.iter().copied().collect(),
			pairs,
			user_features: self
				.users
				.iter()
				.copied()
				.zip(self.user_features.iter().cloned())
				.collect(),
			item_features: self
				.items
				.iter()
				.copied()
				.zip(self.item_features.iter().cloned())
				.collect(),
		})
	}

	pub fn taken_at(&self) -> OffsetDateTime {
		self.taken_at
	}

	pub fn user_schema(&self) -> &FeatureSchema {
		&self.user_schema
	}

	pub fn item_schema(&self) -> &FeatureSchema {
		&self.item_schema
	}

	pub fn users(&self) -> &[UserId] {
		&self.users
	}

	pub fn items(&self) -> &[ItemId] {
		&self.items
	}

	pub fn user_idx(&self, user_id: UserId) -> Option<usize> {
		self.user_index.get(&user_id).copied()
	}

	pub fn item_idx(&self, item_id: ItemId) -> Option<usize> {
		self.item_index.get(&item_id).copied()
	}

	pub fn matrix(&self) -> &InteractionMatrix {
		&self.matrix
	}

	pub fn pairs(&self) -> &BTreeMap<(UserId, ItemId), PairStats> {
		&self.pairs
	}

	/// Event count per item, indexed like `items()`.
	pub fn popularity(&self) -> &[u64] {
		&self.popularity
	}

	pub fn user_features(&self, user: usize) -> &[f32] {
		self.user_features.get(user).map(Vec::as_slice).unwrap_or(&[])
	}

	pub fn item_features(&self, item: usize) -> &[f32] {
		self.item_features.get(item).map(Vec::as_slice).unwrap_or(&[])
	}

	pub fn interaction_events(&self) -> u64 {
		self.popularity.iter().sum()
	}

	/// Items of `user_id` in ascending id order.
	pub fn items_of(&self, user_id: UserId) -> Vec<ItemId> {
		let Some(user) = self.user_idx(user_id) else { return Vec::new() };

		self.matrix.user_row(user).iter().map(|(item, _)| self.items[*item]).collect()
	}
}
