use std::{collections::HashSet, sync::Arc};

use reco_domain::{Fallback, FeatureKind, FeatureSchema, FeatureSlot, ItemId, UserId};
use reco_service::{GenerationSelector, HybridTrainer, RecommendOptions, RecommenderService};

use super::{all_users, recommend, seeded_store, trained_service};

#[tokio::test]
async fn recommendations_exclude_seen_items() {
	let cfg = reco_testkit::config();
	let (service, _worker) = trained_service(&cfg).await;

	for user in all_users() {
		let seen = service.store().seen_items(UserId(user));
		let result = recommend(&service, user, 10).await;

		assert!(!result.items.is_empty());
		assert!(result.items.iter().all(|item| !seen.contains(&item.item_id)), "User {user}.");
	}
}

#[tokio::test]
async fn include_seen_allows_interacted_items() {
	let cfg = reco_testkit::config();
	let (service, _worker) = trained_service(&cfg).await;
	let options = RecommendOptions { include_seen: true, ..RecommendOptions::default() };
	let result = service.recommend(UserId(1), 10, options).await.expect("Recommend must succeed.");
	let seen = service.store().seen_items(UserId(1));

	assert!(result.items.iter().any(|item| seen.contains(&item.item_id)));
}

#[tokio::test]
async fn results_respect_k_order_and_uniqueness() {
	let cfg = reco_testkit::config();
	let (service, _worker) = trained_service(&cfg).await;

	for k in 0..=12 {
		for user in [1, 104, 999] {
			let result = recommend(&service, user, k).await;

			assert!(result.items.len() <= k);
			assert!(result.check_invariants().is_ok(), "User {user}, k {k}.");
		}
	}
}

#[tokio::test]
async fn repeated_requests_return_identical_results() {
	let cfg = reco_testkit::config();
	let (service, _worker) = trained_service(&cfg).await;
	let first = recommend(&service, 3, 4).await;
	let second = recommend(&service, 3, 4).await;

	assert_eq!(first, second);
}

#[tokio::test]
async fn repeated_requests_match_without_cache() {
	let mut cfg = reco_testkit::config();

	cfg.cache.enabled = false;

	let (service, _worker) = trained_service(&cfg).await;
	let first = recommend(&service, 3, 4).await;
	let second = recommend(&service, 3, 4).await;

	assert_eq!(first.items, second.items);
	assert_eq!(first.generation_id, second.generation_id);
}

#[tokio::test]
async fn unknown_user_gets_popularity_cold_start() {
	let cfg = reco_testkit::config();
	let (service, _worker) = trained_service(&cfg).await;
	let result = recommend(&service, 999, 3).await;

	assert!(result.is_cold_start);
	assert_eq!(result.items.len(), 3);
	assert_eq!(result.fallback, None);
	assert_eq!(result.generation_id, service.active_generation_id());
	assert!(result.check_invariants().is_ok());
}

#[tokio::test]
async fn strongest_unseen_item_is_recommended() {
	let cfg = reco_testkit::config();
	let store = Arc::new(reco_testkit::store(&cfg));

	for (user, item, strength) in
		[(1, 1, 5.0), (1, 2, 1.0), (2, 1, 3.0), (2, 3, 2.0), (3, 2, 1.0), (3, 3, 1.0), (3, 4, 4.0)]
	{
		store
			.record_interaction(UserId(user), ItemId(item), strength, reco_testkit::EPOCH)
			.expect("Interaction must be valid.");
	}

	let service = RecommenderService::new(&cfg, store, Arc::new(HybridTrainer))
		.expect("Config must be valid.");
	let _worker = service.spawn_training_worker().expect("Worker must start.");

	super::retrain(&service).await;

	let result = recommend(&service, 1, 1).await;

	assert_eq!(result.items.len(), 1);
	assert!(![ItemId(1), ItemId(2)].contains(&result.items[0].item_id));
	assert!(!result.is_cold_start);
}

#[tokio::test]
async fn untrained_service_serves_popularity() {
	let cfg = reco_testkit::config();
	let service = RecommenderService::new(&cfg, seeded_store(&cfg), Arc::new(HybridTrainer))
		.expect("Config must be valid.");
	let result = recommend(&service, 999, 4).await;

	assert_eq!(result.fallback, Some(Fallback::Untrained));
	assert_eq!(result.generation_id, None);
	assert!(result.is_cold_start);
	assert_eq!(result.items.len(), 4);
	assert!(result.check_invariants().is_ok());

	let known = recommend(&service, 1, 20).await;
	let seen = service.store().seen_items(UserId(1));

	assert!(!known.is_cold_start);
	assert!(known.items.iter().all(|item| !seen.contains(&item.item_id)));
}

#[tokio::test]
async fn exhausted_budget_serves_popularity() {
	let mut cfg = reco_testkit::config();

	cfg.service.request_budget_ms = 0;

	let (service, _worker) = trained_service(&cfg).await;
	let first = recommend(&service, 2, 3).await;
	let second = recommend(&service, 2, 3).await;
	let seen = service.store().seen_items(UserId(2));

	assert_eq!(first.fallback, Some(Fallback::Timeout));
	assert_eq!(second.fallback, Some(Fallback::Timeout));
	assert_eq!(first.generation_id, service.active_generation_id());
	assert_eq!(first.items.len(), 3);
	assert!(first.items.iter().all(|item| !seen.contains(&item.item_id)));
}

#[tokio::test]
async fn recording_an_interaction_evicts_the_cached_result() {
	let cfg = reco_testkit::config();
	let (service, _worker) = trained_service(&cfg).await;
	let before = recommend(&service, 1, 3).await;
	let top = before.items[0].item_id;

	service
		.record_interaction(UserId(1), top, 2.0, reco_testkit::at(10_000))
		.expect("Interaction must be valid.");

	let after = recommend(&service, 1, 3).await;

	assert!(!after.item_ids().contains(&top));
	assert_eq!(after.items.len(), 3);
}

#[tokio::test]
async fn explicit_generation_must_be_loaded() {
	let cfg = reco_testkit::config();
	let (service, _worker) = trained_service(&cfg).await;
	let active = service.active_generation_id().expect("A generation is active.");
	let pinned = RecommendOptions {
		include_seen: false,
		generation: GenerationSelector::Explicit(active),
	};
	let result = service.recommend(UserId(1), 2, pinned).await.expect("Generation is loaded.");

	assert_eq!(result.generation_id, Some(active));

	let missing = RecommendOptions {
		include_seen: false,
		generation: GenerationSelector::Explicit(active.next()),
	};

	assert!(matches!(
		service.recommend(UserId(1), 2, missing).await,
		Err(reco_service::Error::NotFound { .. })
	));
}

#[tokio::test]
async fn similar_items_exclude_the_anchor() {
	let cfg = reco_testkit::config();
	let untrained = RecommenderService::new(&cfg, seeded_store(&cfg), Arc::new(HybridTrainer))
		.expect("Config must be valid.");
	let fallback = untrained.similar_items(ItemId(1), 3).expect("Service is running.");

	assert_eq!(fallback.len(), 3);
	assert!(!fallback.contains(&ItemId(1)));

	let (service, _worker) = trained_service(&cfg).await;
	let similar = service.similar_items(ItemId(3), 4).expect("Service is running.");
	let unique: HashSet<ItemId> = similar.iter().copied().collect();

	assert_eq!(similar.len(), 4);
	assert_eq!(unique.len(), 4);
	assert!(!similar.contains(&ItemId(3)));
	assert!(similar.iter().all(|item_id| item_id.0 < 100));
}

#[tokio::test]
async fn metrics_track_live_serving() {
	let cfg = reco_testkit::config();
	let (service, _worker) = trained_service(&cfg).await;
	let generation_id = service.active_generation_id().expect("A generation is active.");
	let empty = service.model_metrics(generation_id).expect("Generation is loaded.");

	assert_eq!(empty.requests, 0);
	assert_eq!(empty.coverage, 0.0);

	recommend(&service, 1, 2).await;
	recommend(&service, 101, 2).await;
	recommend(&service, 999, 2).await;
	recommend(&service, 998, 2).await;

	let metrics = service.model_metrics(generation_id).expect("Generation is loaded.");

	assert_eq!(metrics.requests, 4);
	assert_eq!(metrics.cold_start_rate, 0.5);
	assert!(metrics.coverage > 0.0 && metrics.coverage <= 1.0);
	assert!(metrics.avg_score.is_finite());
	assert!(matches!(
		service.model_metrics(generation_id.next()),
		Err(reco_service::Error::NotFound { .. })
	));
}

#[tokio::test]
async fn item_schema_drift_scores_collaboratively() {
	let cfg = reco_testkit::config();
	let (service, _worker) = trained_service(&cfg).await;
	let generation_id = service.active_generation_id().expect("A generation is active.");

	service.store().replace_item_schema(FeatureSchema::new(
		2,
		vec![
			FeatureSlot { name: "price".to_string(), kind: FeatureKind::Numeric },
			FeatureSlot { name: "in_stock".to_string(), kind: FeatureKind::Binary },
			FeatureSlot { name: "rating".to_string(), kind: FeatureKind::Numeric },
		],
	));

	let result = recommend(&service, 1, 3).await;

	assert!(!result.items.is_empty());
	assert!(result.check_invariants().is_ok());
	assert_eq!(result.generation_id, Some(generation_id));
	assert_eq!(result.fallback, None);

	let seen = service.store().seen_items(UserId(1));
	let generation = service.generation(generation_id).expect("Active generation is loaded.");
	let collaborative = generation.candidate.candidates_excluding(UserId(1), 3, &seen);
	let served: Vec<(ItemId, f32)> =
		result.items.iter().map(|item| (item.item_id, item.score)).collect();

	assert_eq!(served, collaborative.items);
}
