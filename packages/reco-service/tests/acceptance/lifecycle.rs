use std::{collections::HashMap, sync::Arc};

use reco_domain::{GenerationId, ItemId, UserId};
use reco_service::{Error, GenerationSelector, RecommendOptions, ServiceState, TrainingEvent};

use super::{NanTrainer, all_users, recommend, retrain, service_with, trained_service};

#[tokio::test]
async fn failed_retrain_keeps_serving_the_previous_generation() {
	let mut cfg = reco_testkit::config();

	cfg.cache.enabled = false;

	let trainer = Arc::new(NanTrainer::new(1..usize::MAX));
	let (service, _worker) = service_with(&cfg, trainer);
	let first = retrain(&service).await;
	let before = recommend(&service, 4, 3).await;
	let events = service.subscribe();
	let outcome = service.request_retrain().expect("Retrain must be accepted.").wait().await;

	assert!(matches!(outcome, Err(Error::Convergence { .. })));
	assert_eq!(service.state(), ServiceState::Degraded);
	assert_eq!(service.active_generation_id(), Some(first));
	assert!(service.last_failure().is_some());
	assert!(matches!(&*events.borrow(), TrainingEvent::Failed { .. }));

	let after = recommend(&service, 4, 3).await;

	assert_eq!(after.items, before.items);
	assert_eq!(after.generation_id, Some(first));
}

#[tokio::test]
async fn successful_retrain_recovers_from_degraded() {
	let cfg = reco_testkit::config();
	let (service, _worker) = service_with(&cfg, Arc::new(NanTrainer::new(1..2)));
	let first = retrain(&service).await;
	let outcome = service.request_retrain().expect("Retrain must be accepted.").wait().await;

	assert!(matches!(outcome, Err(Error::Convergence { .. })));
	assert_eq!(service.state(), ServiceState::Degraded);
	assert_eq!(service.active_generation_id(), Some(first));
	assert!(service.last_failure().is_some());

	let next = retrain(&service).await;

	assert!(next > first);
	assert_eq!(service.state(), ServiceState::Ready);
	assert_eq!(service.active_generation_id(), Some(next));
	assert!(service.last_failure().is_none());
	assert_eq!(*service.subscribe().borrow(), TrainingEvent::Ready { generation_id: next });
}

#[tokio::test]
async fn shutdown_rejects_every_call() {
	let cfg = reco_testkit::config();
	let (service, worker) = trained_service(&cfg).await;
	let generation_id = service.active_generation_id().expect("A generation is active.");

	service.shutdown();

	assert_eq!(service.state(), ServiceState::Shutdown);
	assert!(matches!(
		service.recommend(UserId(1), 3, RecommendOptions::default()).await,
		Err(Error::ServiceUnavailable)
	));
	assert!(matches!(service.similar_items(ItemId(1), 3), Err(Error::ServiceUnavailable)));
	assert!(matches!(
		service.record_interaction(UserId(1), ItemId(2), 1.0, reco_testkit::EPOCH),
		Err(Error::ServiceUnavailable)
	));
	assert!(matches!(service.request_retrain(), Err(Error::ServiceUnavailable)));
	assert!(matches!(service.model_metrics(generation_id), Err(Error::ServiceUnavailable)));
	assert!(matches!(service.export_generation(generation_id), Err(Error::ServiceUnavailable)));

	worker.join().await.expect("Worker exits after shutdown.");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_reads_never_mix_generations() {
	let mut cfg = reco_testkit::config();

	cfg.cache.enabled = false;

	let (service, _worker) = trained_service(&cfg).await;
	let first = service.active_generation_id().expect("A generation is active.");
	let ticket = service.request_retrain().expect("Retrain must be accepted.");
	let mut readers = Vec::new();

	for reader in 0..4_u64 {
		let service = Arc::clone(&service);

		readers.push(tokio::spawn(async move {
			let mut results = Vec::new();

			for round in 0..25_u64 {
				let users = all_users();
				let user = users[((reader + round) as usize) % users.len()];

				results.push(recommend(&service, user, 3).await);
			}

			results
		}));
	}

	let second = ticket.wait().await.expect("Retrain must succeed.");
	let mut expected: HashMap<(GenerationId, UserId), Vec<ItemId>> = HashMap::new();

	for generation_id in [first, second] {
		let options = RecommendOptions {
			include_seen: false,
			generation: GenerationSelector::Explicit(generation_id),
		};

		for user in all_users() {
			let result = service
				.recommend(UserId(user), 3, options)
				.await
				.expect("Both generations are loaded.");

			expected.insert((generation_id, UserId(user)), result.item_ids());
		}
	}

	for reader in readers {
		for result in reader.await.expect("Reader must not panic.") {
			let generation_id = result.generation_id.expect("Results are model-backed.");

			assert!(generation_id == first || generation_id == second);
			assert_eq!(
				expected.get(&(generation_id, result.user_id)),
				Some(&result.item_ids()),
				"Result for {} does not match {generation_id}.",
				result.user_id
			);
		}
	}
}

#[tokio::test]
async fn old_generations_are_released() {
	let cfg = reco_testkit::config();
	let (service, _worker) = trained_service(&cfg).await;
	let first = service.active_generation_id().expect("A generation is active.");
	let mut latest = first;

	for _ in 0..cfg.service.keep_generations {
		latest = retrain(&service).await;
	}

	assert!(matches!(service.generation(first), Err(Error::NotFound { .. })));
	assert!(service.generation(latest).is_ok());
	assert_eq!(service.active_generation_id(), Some(latest));
}
