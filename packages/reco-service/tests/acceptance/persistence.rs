use std::sync::Arc;

use reco_domain::UserId;
use reco_service::{Error, HybridTrainer, RecommenderService, ServiceState};

use super::{recommend, retrain, seeded_store, trained_service};

#[tokio::test]
async fn imported_generation_serves_identical_results() {
	let cfg = reco_testkit::config();
	let (source, _worker) = trained_service(&cfg).await;
	let generation_id = source.active_generation_id().expect("A generation is active.");
	let blob = source.export_generation(generation_id).expect("Export must succeed.");
	let restored = RecommenderService::new(&cfg, seeded_store(&cfg), Arc::new(HybridTrainer))
		.expect("Config must be valid.");
	let imported = restored.import_generation(&blob).expect("Import must succeed.");

	assert_eq!(imported.generation_id, generation_id);
	assert_eq!(restored.state(), ServiceState::Ready);
	assert_eq!(restored.active_generation_id(), Some(generation_id));

	for user in [1, 5, 102, 999] {
		let expected = recommend(&source, user, 4).await;
		let actual = recommend(&restored, user, 4).await;

		assert_eq!(actual.items, expected.items, "User {user}.");
		assert_eq!(actual.is_cold_start, expected.is_cold_start);
	}
}

#[tokio::test]
async fn older_imports_do_not_replace_the_active_generation() {
	let cfg = reco_testkit::config();
	let (service, _worker) = trained_service(&cfg).await;
	let first = service.active_generation_id().expect("A generation is active.");
	let blob = service.export_generation(first).expect("Export must succeed.");
	let second = retrain(&service).await;
	let restored = RecommenderService::new(&cfg, seeded_store(&cfg), Arc::new(HybridTrainer))
		.expect("Config must be valid.");

	restored
		.import_generation(&service.export_generation(second).expect("Export must succeed."))
		.expect("Import must succeed.");
	restored.import_generation(&blob).expect("Import must succeed.");

	assert_eq!(restored.active_generation_id(), Some(second));
	assert!(restored.generation(first).is_ok());

	let next = retrain_after_import(&restored).await;

	assert!(next > second);
}

#[tokio::test]
async fn older_import_survives_a_full_registry() {
	let mut cfg = reco_testkit::config();

	cfg.service.keep_generations = 1;

	let (service, _worker) = trained_service(&cfg).await;
	let first = service.active_generation_id().expect("A generation is active.");
	let blob = service.export_generation(first).expect("Export must succeed.");
	let second = retrain(&service).await;

	assert!(matches!(service.generation(first), Err(Error::NotFound { .. })));

	let imported = service.import_generation(&blob).expect("Import must succeed.");

	assert_eq!(imported.generation_id, first);
	assert_eq!(service.active_generation_id(), Some(second));
	assert!(service.generation(first).is_ok());
	assert!(service.export_generation(first).is_ok());
	assert!(service.model_metrics(first).is_ok());

	let third = retrain(&service).await;

	assert_eq!(service.active_generation_id(), Some(third));
	assert!(matches!(service.generation(first), Err(Error::NotFound { .. })));
}

#[tokio::test]
async fn corrupt_blobs_are_rejected() {
	let cfg = reco_testkit::config();
	let service = RecommenderService::new(&cfg, seeded_store(&cfg), Arc::new(HybridTrainer))
		.expect("Config must be valid.");

	assert!(matches!(service.import_generation(b"{}"), Err(Error::Validation { .. })));
	assert_eq!(service.state(), ServiceState::Uninitialized);
	assert!(
		service
			.recommend(UserId(1), 2, Default::default())
			.await
			.expect("Untrained service still answers.")
			.generation_id
			.is_none()
	);
}

async fn retrain_after_import(service: &Arc<RecommenderService>) -> reco_domain::GenerationId {
	let _worker = service.spawn_training_worker().expect("Worker must start.");

	retrain(service).await
}
