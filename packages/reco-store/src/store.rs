use std::{
	collections::{BTreeMap, BTreeSet, HashSet},
	sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use ahash::AHashMap;
use time::OffsetDateTime;

use reco_domain::{
	Entity, FeatureSchema, FeatureView, Interaction, ItemId, UserId, interaction::validate_strength,
};

use crate::{
	FeatureSnapshot, PairStats, Result,
	snapshot::SnapshotParts,
};

/// Owner of raw interaction and feature data.
///
/// Ingestion appends through `record_interaction` and `update_features`; serving only reads.
/// Training works from `snapshot`, which copies the current state so later writes never leak into
/// a running training job.
pub struct FeatureStore {
	state: RwLock<StoreState>,
}

struct StoreState {
	user_schema: FeatureSchema,
	item_schema: FeatureSchema,
	histories: AHashMap<UserId, Vec<Interaction>>,
	catalog: BTreeSet<ItemId>,
	popularity: AHashMap<ItemId, u64>,
	pairs: BTreeMap<(UserId, ItemId), PairStats>,
	user_features: AHashMap<UserId, Vec<f32>>,
	item_features: AHashMap<ItemId, Vec<f32>>,
}

impl FeatureStore {
	pub fn new(user_schema: FeatureSchema, item_schema: FeatureSchema) -> Self {
		Self {
			state: RwLock::new(StoreState {
				user_schema,
				item_schema,
				histories: AHashMap::new(),
				catalog: BTreeSet::new(),
				popularity: AHashMap::new(),
				pairs: BTreeMap::new(),
				user_features: AHashMap::new(),
				item_features: AHashMap::new(),
			}),
		}
	}

	pub fn record_interaction(
		&self,
		user_id: UserId,
		item_id: ItemId,
		strength: f32,
		timestamp: OffsetDateTime,
	) -> Result<()> {
		validate_strength(strength)?;

		let mut state = self.write();
		let pair = state.pairs.entry((user_id, item_id)).or_default();

		pair.strength += f64::from(strength);
		pair.events += 1;

		*state.popularity.entry(item_id).or_insert(0) += 1;

		state.catalog.insert(item_id);
		state.histories.entry(user_id).or_default().push(Interaction {
			user_id,
			item_id,
			strength,
			timestamp,
		});

		Ok(())
	}

	/// Adds a catalog item that nobody has interacted with yet.
	pub fn register_item(&self, item_id: ItemId) {
		self.write().catalog.insert(item_id);
	}

	pub fn update_features(&self, entity: Entity, values: Vec<f32>) -> Result<()> {
		let mut state = self.write();

		match entity {
			Entity::User(user_id) => {
				state.user_schema.check_values(&values)?;
				state.user_features.insert(user_id, values);
			},
			Entity::Item(item_id) => {
				state.item_schema.check_values(&values)?;
				state.catalog.insert(item_id);
				state.item_features.insert(item_id, values);
			},
		}

		Ok(())
	}

	/// Installs a new user schema. Stored user vectors no longer conform and are dropped; readers
	/// get zero vectors tagged with the new version until features are re-ingested.
	pub fn replace_user_schema(&self, schema: FeatureSchema) {
		let mut state = self.write();

		tracing::info!(version = schema.version, "User feature schema replaced.");

		state.user_schema = schema;
		state.user_features.clear();
	}

	/// Item counterpart of `replace_user_schema`.
	pub fn replace_item_schema(&self, schema: FeatureSchema) {
		let mut state = self.write();

		tracing::info!(version = schema.version, "Item feature schema replaced.");

		state.item_schema = schema;
		state.item_features.clear();
	}

	/// Never fails: unknown entities get the zero vector of the current schema.
	pub fn get_features(&self, entity: Entity) -> FeatureView {
		let state = self.read();

		match entity {
			Entity::User(user_id) => match state.user_features.get(&user_id) {
				Some(values) =>
					FeatureView { schema_version: state.user_schema.version, values: values.clone() },
				None => state.user_schema.zero_view(),
			},
			Entity::Item(item_id) => match state.item_features.get(&item_id) {
				Some(values) =>
					FeatureView { schema_version: state.item_schema.version, values: values.clone() },
				None => state.item_schema.zero_view(),
			},
		}
	}

	pub fn seen_items(&self, user_id: UserId) -> HashSet<ItemId> {
		self.read()
			.histories
			.get(&user_id)
			.map(|events| events.iter().map(|event| event.item_id).collect())
			.unwrap_or_default()
	}

	pub fn history(&self, user_id: UserId) -> Vec<Interaction> {
		self.read().histories.get(&user_id).cloned().unwrap_or_default()
	}

	pub fn contains_user(&self, user_id: UserId) -> bool {
		self.read().histories.contains_key(&user_id)
	}

	pub fn item_count(&self) -> usize {
		self.read().catalog.len()
	}

	/// Most interacted items first; equal counts go to the lower item id.
	pub fn popular_items(&self, k: usize) -> Vec<(ItemId, u64)> {
		let state = self.read();
		let mut ranked: Vec<(ItemId, u64)> = state
			.catalog
			.iter()
			.map(|item_id| (*item_id, state.popularity.get(item_id).copied().unwrap_or(0)))
			.collect();

		ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
		ranked.truncate(k);

		ranked
	}

	pub fn snapshot(&self) -> Arc<FeatureSnapshot> {
		let state = self.read();
		let parts = SnapshotParts {
			taken_at: OffsetDateTime::now_utc(),
			user_schema: state.user_schema.clone(),
			item_schema: state.item_schema.clone(),
			users: state.histories.keys().chain(state.user_features.keys()).copied().collect(),
			items: state.catalog.clone(),
			pairs: state.pairs.clone(),
			user_features: state.user_features.clone(),
			item_features: state.item_features.clone(),
		};

		drop(state);

		Arc::new(FeatureSnapshot::assemble(parts))
	}

	fn read(&self) -> RwLockReadGuard<'_, StoreState> {
		self.state.read().unwrap_or_else(|err| err.into_inner())
	}

	fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
		self.state.write().unwrap_or_else(|err| err.into_inner())
	}
}
