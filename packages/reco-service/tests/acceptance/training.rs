use std::sync::{
	Arc,
	atomic::{AtomicUsize, Ordering},
};

use reco_service::{Error, RecommenderService, ServiceState, TrainingEvent};

use super::{BlockingTrainer, SpyTrainer, seeded_store, service_with};

#[tokio::test]
async fn queued_jobs_run_once_the_worker_starts() {
	let cfg = reco_testkit::config();
	let calls = Arc::new(AtomicUsize::new(0));
	let trainer = Arc::new(SpyTrainer { calls: Arc::clone(&calls) });
	let service = RecommenderService::new(&cfg, seeded_store(&cfg), trainer)
		.expect("Config must be valid.");
	let ticket = service.request_retrain().expect("Retrain must be accepted.");

	assert_eq!(service.state(), ServiceState::Uninitialized);
	assert_eq!(calls.load(Ordering::SeqCst), 0);

	let _worker = service.spawn_training_worker().expect("Worker must start.");
	let generation_id = ticket.wait().await.expect("Retrain must succeed.");

	assert_eq!(calls.load(Ordering::SeqCst), 1);
	assert_eq!(service.state(), ServiceState::Ready);
	assert_eq!(service.active_generation_id(), Some(generation_id));
	assert!(matches!(service.spawn_training_worker(), Err(Error::Training { .. })));
}

#[tokio::test]
async fn generation_ids_increase_with_each_retrain() {
	let cfg = reco_testkit::config();
	let calls = Arc::new(AtomicUsize::new(0));
	let (service, _worker) = service_with(&cfg, Arc::new(SpyTrainer { calls: Arc::clone(&calls) }));
	let first = service.request_retrain().expect("Retrain must be accepted.");
	let second = service.request_retrain().expect("Retrain must be accepted.");
	let first = first.wait().await.expect("Retrain must succeed.");
	let second = second.wait().await.expect("Retrain must succeed.");

	assert!(second > first);
	assert_eq!(calls.load(Ordering::SeqCst), 2);
	assert_eq!(service.active_generation_id(), Some(second));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn running_retrain_can_be_cancelled() {
	let cfg = reco_testkit::config();
	let (service, _worker) = service_with(&cfg, Arc::new(BlockingTrainer));
	let mut events = service.subscribe();
	let ticket = service.request_retrain().expect("Retrain must be accepted.");

	events
		.wait_for(|event| matches!(event, TrainingEvent::Started { .. }))
		.await
		.expect("Service is alive.");

	assert!(service.cancel_training());
	assert!(matches!(ticket.wait().await, Err(Error::Cancelled)));
	assert_eq!(service.state(), ServiceState::Uninitialized);
	assert!(matches!(*service.subscribe().borrow(), TrainingEvent::Cancelled { .. }));
	assert!(!service.cancel_training());
}

#[tokio::test]
async fn empty_store_fails_without_degrading() {
	let cfg = reco_testkit::config();
	let service = RecommenderService::new(
		&cfg,
		Arc::new(reco_testkit::store(&cfg)),
		Arc::new(reco_service::HybridTrainer),
	)
	.expect("Config must be valid.");
	let _worker = service.spawn_training_worker().expect("Worker must start.");
	let outcome = service.request_retrain().expect("Retrain must be accepted.").wait().await;

	assert!(matches!(outcome, Err(Error::Training { .. })));
	assert_eq!(service.state(), ServiceState::Uninitialized);
	assert!(service.last_failure().is_some());
}
