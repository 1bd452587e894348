//! Deterministic fixtures shared by the reco test suites.

use time::{Duration, OffsetDateTime, macros::datetime};

use reco_config::{
	Cache, Config, Evaluation, Fusion, Ranking, Schema, SchemaSection, Service, Slot, SlotKind,
	Training,
};
use reco_domain::{Entity, FeatureSchema, Interaction, ItemId, UserId};
use reco_store::FeatureStore;

pub const EPOCH: OffsetDateTime = datetime!(2026-01-01 00:00 UTC);

/// Small, fast configuration: 8 latent dims, a handful of iterations, two item features.
pub fn config() -> Config {
	Config {
		service: Service {
			log_level: "info".to_string(),
			request_budget_ms: 5_000,
			keep_generations: 3,
		},
		training: Training {
			dims: 8,
			iterations: 10,
			regularization: 0.05,
			alpha: 10.0,
			seed: 7,
			early_stop_tolerance: 0.0,
			patience: 2,
			max_init_scale: 0.1,
			max_strength: 10_000.0,
		},
		ranking: Ranking {
			factors: 4,
			epochs: 4,
			learning_rate: 0.05,
			regularization: 0.01,
			negatives_per_positive: 2,
		},
		fusion: Fusion {
			collaborative_weight: 0.7,
			content_weight: 0.3,
			candidate_pool_factor: 4,
			similar_content_weight: 0.25,
		},
		cache: Cache { enabled: true, ttl_ms: 60_000, max_entries: 1_000 },
		schema: Schema {
			user: SchemaSection {
				version: 1,
				slots: vec![Slot { name: "is_premium".to_string(), kind: SlotKind::Binary }],
			},
			item: SchemaSection {
				version: 1,
				slots: vec![
					Slot { name: "price".to_string(), kind: SlotKind::Numeric },
					Slot { name: "in_stock".to_string(), kind: SlotKind::Binary },
				],
			},
		},
		evaluation: Evaluation { holdout_fraction: 0.25, min_interactions: 3, k: 5 },
	}
}

pub fn store(cfg: &Config) -> FeatureStore {
	FeatureStore::new(
		FeatureSchema::from_config(&cfg.schema.user),
		FeatureSchema::from_config(&cfg.schema.item),
	)
}

pub fn at(offset_secs: i64) -> OffsetDateTime {
	EPOCH + Duration::seconds(offset_secs)
}

pub fn interaction(user: u64, item: u64, strength: f32) -> Interaction {
	Interaction { user_id: UserId(user), item_id: ItemId(item), strength, timestamp: EPOCH }
}

/// Two taste clusters. Users 1..=users_per_cluster like items 1..=items_per_cluster, users
/// 101..=100+users_per_cluster like items 101..=100+items_per_cluster. Each user skips one item of
/// their own cluster (rotating), so every user has an unseen in-cluster item to recommend.
pub fn clustered_interactions(users_per_cluster: u64, items_per_cluster: u64) -> Vec<Interaction> {
	let mut out = Vec::new();

	for (user_base, item_base) in [(0_u64, 0_u64), (100, 100)] {
		for user in 1..=users_per_cluster {
			let skipped = (user - 1) % items_per_cluster + 1;

			for item in 1..=items_per_cluster {
				if item == skipped {
					continue;
				}

				let strength = 1.0 + ((user + item) % 3) as f32;

				out.push(interaction(user_base + user, item_base + item, strength));
			}
		}
	}

	out
}

pub fn seed(store: &FeatureStore, interactions: &[Interaction]) -> reco_store::Result<()> {
	for (offset, event) in interactions.iter().enumerate() {
		store.record_interaction(
			event.user_id,
			event.item_id,
			event.strength,
			at(offset as i64),
		)?;
	}

	Ok(())
}

/// Gives every item in the clustered fixture a price and stock flag. Cluster items share a price
/// band so content similarity agrees with the interaction clusters.
pub fn seed_item_features(store: &FeatureStore, items_per_cluster: u64) -> reco_store::Result<()> {
	for (item_base, price) in [(0_u64, 10.0_f32), (100, 90.0)] {
		for item in 1..=items_per_cluster {
			let in_stock = if item % 2 == 0 { 1.0 } else { 0.0 };

			store.update_features(
				Entity::Item(ItemId(item_base + item)),
				vec![price + item as f32, in_stock],
			)?;
		}
	}

	Ok(())
}
