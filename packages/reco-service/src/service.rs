use std::{
	collections::{BTreeMap, HashSet},
	sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard},
	time::Duration,
};

use ahash::AHashMap;
use time::OffsetDateTime;
use tokio::sync::{mpsc, oneshot, watch};

use reco_config::Config;
use reco_domain::{Entity, Fallback, GenerationId, ItemId, RecommendationResult, ScoredItem, UserId};
use reco_models::{CancelFlag, Hyperparameters, ModelGeneration, codec};
use reco_store::FeatureStore;

use crate::{
	Error, FusionWeights, ModelMetrics, ModelTrainer, RecommendationCache, Result, TrainingEvent,
	TrainingTicket, TrainingWorker,
	cache::CacheKey,
	metrics::ServingStats,
	scoring::{self, ScoringJob},
	training::TrainingJob,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServiceState {
	/// No generation has been installed yet; requests get the popularity ranking.
	Uninitialized,
	Ready,
	/// The last retrain failed; the previous generation keeps serving.
	Degraded,
	Shutdown,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GenerationSelector {
	#[default]
	Latest,
	Explicit(GenerationId),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RecommendOptions {
	pub include_seen: bool,
	pub generation: GenerationSelector,
}

/// Serving core: owns the active generation, the result cache and the training queue.
///
/// The active generation is an `Arc` swapped under a short write lock. Requests clone the `Arc`
/// and score against it without holding any lock, so a retrain never blocks reads and a single
/// result never mixes two generations.
pub struct RecommenderService {
	store: Arc<FeatureStore>,
	trainer: Arc<dyn ModelTrainer>,
	hyperparameters: Hyperparameters,
	weights: FusionWeights,
	pool_factor: usize,
	similar_content_weight: f32,
	request_budget: Duration,
	keep_generations: usize,
	cache: RecommendationCache,
	registry: RwLock<Registry>,
	stats: Mutex<AHashMap<GenerationId, ServingStats>>,
	jobs: Mutex<Option<mpsc::UnboundedSender<TrainingJob>>>,
	pending: Mutex<Option<mpsc::UnboundedReceiver<TrainingJob>>>,
	running: Mutex<Option<CancelFlag>>,
	events: watch::Sender<TrainingEvent>,
}

struct Registry {
	state: ServiceState,
	active: Option<Arc<ModelGeneration>>,
	generations: BTreeMap<GenerationId, Arc<ModelGeneration>>,
	next_id: GenerationId,
	last_failure: Option<String>,
}

impl RecommenderService {
	pub fn new(
		cfg: &Config,
		store: Arc<FeatureStore>,
		trainer: Arc<dyn ModelTrainer>,
	) -> Result<Arc<Self>> {
		let (jobs, pending) = mpsc::unbounded_channel();
		let (events, _) = watch::channel(TrainingEvent::Idle);

		Ok(Arc::new(Self {
			store,
			trainer,
			hyperparameters: Hyperparameters::from_config(cfg),
			weights: FusionWeights::from_config(&cfg.fusion)?,
			pool_factor: cfg.fusion.candidate_pool_factor.max(1) as usize,
			similar_content_weight: cfg.fusion.similar_content_weight.clamp(0.0, 1.0),
			request_budget: Duration::from_millis(cfg.service.request_budget_ms),
			keep_generations: cfg.service.keep_generations.max(1) as usize,
			cache: RecommendationCache::from_config(&cfg.cache),
			registry: RwLock::new(Registry {
				state: ServiceState::Uninitialized,
				active: None,
				generations: BTreeMap::new(),
				next_id: GenerationId(1),
				last_failure: None,
			}),
			stats: Mutex::new(AHashMap::new()),
			jobs: Mutex::new(Some(jobs)),
			pending: Mutex::new(Some(pending)),
			running: Mutex::new(None),
			events,
		}))
	}

	pub fn store(&self) -> &Arc<FeatureStore> {
		&self.store
	}

	pub fn state(&self) -> ServiceState {
		self.read_registry().state
	}

	pub fn active_generation_id(&self) -> Option<GenerationId> {
		self.read_registry().active.as_ref().map(|generation| generation.generation_id)
	}

	/// Error text of the most recent failed retrain while the service is degraded.
	pub fn last_failure(&self) -> Option<String> {
		self.read_registry().last_failure.clone()
	}

	pub fn generation(&self, generation_id: GenerationId) -> Result<Arc<ModelGeneration>> {
		self.ensure_running()?;
		self.lookup(generation_id)
	}

	pub fn subscribe(&self) -> watch::Receiver<TrainingEvent> {
		self.events.subscribe()
	}

	/// Starts the task that drains the training queue. Jobs requested earlier are kept and run
	/// once the worker starts. Only one worker may run per service.
	pub fn spawn_training_worker(self: &Arc<Self>) -> Result<TrainingWorker> {
		let mut receiver = lock(&self.pending).take().ok_or_else(|| Error::Training {
			message: "Training worker is already running.".to_string(),
		})?;
		let service = Arc::clone(self);
		let handle = tokio::spawn(async move {
			while let Some(job) = receiver.recv().await {
				let outcome = service.run_training().await;

				if job.reply.send(outcome).is_err() {
					tracing::debug!("Training ticket dropped before completion.");
				}
			}

			tracing::info!("Training worker stopped.");
		});

		Ok(TrainingWorker { handle })
	}

	/// Queues a retrain over a fresh store snapshot.
	pub fn request_retrain(&self) -> Result<TrainingTicket> {
		self.ensure_running()?;

		let (reply, receiver) = oneshot::channel();
		let jobs = lock(&self.jobs);
		let sender = jobs.as_ref().ok_or(Error::ServiceUnavailable)?;

		sender.send(TrainingJob { reply }).map_err(|_| Error::ServiceUnavailable)?;

		Ok(TrainingTicket { receiver })
	}

	/// Cancels the retrain in progress, if any. It stops after its current iteration.
	pub fn cancel_training(&self) -> bool {
		match lock(&self.running).as_ref() {
			Some(cancel) => {
				cancel.cancel();

				true
			},
			None => false,
		}
	}

	pub async fn recommend(
		&self,
		user_id: UserId,
		k: usize,
		options: RecommendOptions,
	) -> Result<RecommendationResult> {
		let Some(generation) = self.resolve(options.generation)? else {
			return Ok(self.untrained_fallback(user_id, k, options.include_seen));
		};
		let key = CacheKey {
			user_id,
			generation_id: generation.generation_id,
			include_seen: options.include_seen,
		};
		let result = self
			.cache
			.get_or_compute(key, k, || self.score(generation, user_id, k, options.include_seen))
			.await?;

		self.record_served(&result);

		Ok(result)
	}

	/// Items most like `item_id` under the active generation, blending factor and content
	/// similarity. Unknown items and an untrained service fall back to popularity.
	pub fn similar_items(&self, item_id: ItemId, k: usize) -> Result<Vec<ItemId>> {
		let Some(generation) = self.resolve(GenerationSelector::Latest)? else {
			return Ok(self
				.store
				.popular_items(k.saturating_add(1))
				.into_iter()
				.map(|(other, _)| other)
				.filter(|other| *other != item_id)
				.take(k)
				.collect());
		};

		Ok(scoring::similar_items(
			&generation,
			item_id,
			k,
			k.saturating_mul(self.pool_factor),
			self.similar_content_weight,
		))
	}

	pub fn record_interaction(
		&self,
		user_id: UserId,
		item_id: ItemId,
		strength: f32,
		timestamp: OffsetDateTime,
	) -> Result<()> {
		self.ensure_running()?;
		self.store.record_interaction(user_id, item_id, strength, timestamp)?;
		self.cache.invalidate_user(user_id);

		Ok(())
	}

	pub fn update_features(&self, entity: Entity, values: Vec<f32>) -> Result<()> {
		self.ensure_running()?;
		self.store.update_features(entity, values)?;

		if let Entity::User(user_id) = entity {
			self.cache.invalidate_user(user_id);
		}

		Ok(())
	}

	pub fn model_metrics(&self, generation_id: GenerationId) -> Result<ModelMetrics> {
		let generation = self.generation(generation_id)?;
		let stats = lock(&self.stats);

		Ok(match stats.get(&generation_id) {
			Some(stats) => stats.summarize(generation_id, generation.summary.items),
			None => ServingStats::default().summarize(generation_id, generation.summary.items),
		})
	}

	pub fn export_generation(&self, generation_id: GenerationId) -> Result<Vec<u8>> {
		let generation = self.generation(generation_id)?;

		Ok(codec::export(&generation)?)
	}

	/// Registers a persisted generation. It becomes active when it is newer than the active one.
	pub fn import_generation(&self, blob: &[u8]) -> Result<Arc<ModelGeneration>> {
		self.ensure_running()?;

		let generation = Arc::new(codec::import(blob)?);
		let activated = self.install(Arc::clone(&generation));

		tracing::info!(
			generation_id = %generation.generation_id,
			activated,
			"Generation imported."
		);

		Ok(generation)
	}

	/// Stops serving. Every later call fails with `ServiceUnavailable`; the training worker exits
	/// once its queue drains.
	pub fn shutdown(&self) {
		{
			let mut registry = self.write_registry();

			if registry.state == ServiceState::Shutdown {
				return;
			}

			registry.state = ServiceState::Shutdown;
		}

		lock(&self.jobs).take();
		self.cancel_training();
		self.cache.clear();

		tracing::info!("Recommender service shut down.");
	}

	async fn run_training(&self) -> Result<GenerationId> {
		self.ensure_running()?;

		let generation_id = {
			let mut registry = self.write_registry();
			let generation_id = registry.next_id;

			registry.next_id = generation_id.next();

			generation_id
		};
		let cancel = CancelFlag::new();

		*lock(&self.running) = Some(cancel.clone());

		self.events.send_replace(TrainingEvent::Started { generation_id });

		tracing::info!(%generation_id, "Retrain started.");

		let snapshot = self.store.snapshot();
		let trainer = Arc::clone(&self.trainer);
		let hyperparameters = self.hyperparameters.clone();
		let joined = tokio::task::spawn_blocking(move || {
			trainer.train(generation_id, &snapshot, &hyperparameters, &cancel)
		})
		.await;

		lock(&self.running).take();

		let outcome = match joined {
			Ok(trained) => trained.map_err(Error::from).and_then(|generation| {
				check_trained(generation_id, &generation)?;

				Ok(generation)
			}),
			Err(err) => Err(Error::Training { message: format!("Training task failed: {err}.") }),
		};

		match outcome {
			Ok(generation) => {
				if self.state() == ServiceState::Shutdown {
					return Err(Error::ServiceUnavailable);
				}

				let summary = generation.summary.clone();

				self.install(Arc::new(generation));
				self.events.send_replace(TrainingEvent::Ready { generation_id });

				tracing::info!(
					%generation_id,
					users = summary.users,
					items = summary.items,
					interactions = summary.interactions,
					iterations = summary.iterations_run,
					loss = summary.final_loss,
					"Retrain finished."
				);

				Ok(generation_id)
			},
			Err(Error::Cancelled) => {
				self.events.send_replace(TrainingEvent::Cancelled { generation_id });

				tracing::info!(%generation_id, "Retrain cancelled.");

				Err(Error::Cancelled)
			},
			Err(err) => {
				self.record_failure(generation_id, &err);

				Err(err)
			},
		}
	}

	fn record_failure(&self, generation_id: GenerationId, err: &Error) {
		let message = err.to_string();

		tracing::error!(%generation_id, error = %err, "Retrain failed.");

		{
			let mut registry = self.write_registry();

			if registry.active.is_some() && registry.state != ServiceState::Shutdown {
				registry.state = ServiceState::Degraded;

				tracing::warn!(
					active = ?registry.active.as_ref().map(|generation| generation.generation_id),
					"Serving the previous generation in degraded mode."
				);
			}

			registry.last_failure = Some(message.clone());
		}

		self.events.send_replace(TrainingEvent::Failed { generation_id, message });
	}

	/// Adds a generation to the registry and activates it when it is the newest. Returns whether
	/// it was activated. Pruning never drops the active generation or the one just installed, so
	/// an older import can exceed `keep_generations` by one until the next install.
	fn install(&self, generation: Arc<ModelGeneration>) -> bool {
		let generation_id = generation.generation_id;
		let mut pruned = Vec::new();
		let activated = {
			let mut registry = self.write_registry();
			let newer = registry
				.active
				.as_ref()
				.is_none_or(|active| generation_id > active.generation_id);

			registry.generations.insert(generation_id, Arc::clone(&generation));

			if newer {
				registry.active = Some(generation);
				registry.state = ServiceState::Ready;
				registry.last_failure = None;
			}
			if registry.next_id <= generation_id {
				registry.next_id = generation_id.next();
			}

			let active_id = registry.active.as_ref().map(|active| active.generation_id);

			while registry.generations.len() > self.keep_generations {
				let Some(oldest) = registry
					.generations
					.keys()
					.copied()
					.find(|id| Some(*id) != active_id && *id != generation_id)
				else {
					break;
				};

				registry.generations.remove(&oldest);
				pruned.push(oldest);
			}

			newer
		};

		if !pruned.is_empty() {
			let mut stats = lock(&self.stats);

			for generation_id in &pruned {
				stats.remove(generation_id);
			}

			tracing::debug!(?pruned, "Old generations released.");
		}

		activated
	}

	async fn score(
		&self,
		generation: Arc<ModelGeneration>,
		user_id: UserId,
		k: usize,
		include_seen: bool,
	) -> Result<RecommendationResult> {
		let job = ScoringJob {
			generation,
			store: Arc::clone(&self.store),
			user_id,
			k,
			include_seen,
			weights: self.weights,
			pool_factor: self.pool_factor,
			deadline: std::time::Instant::now() + self.request_budget,
		};
		let fallback_job = job.clone();
		let handle = tokio::task::spawn_blocking(move || job.run());

		match tokio::time::timeout(self.request_budget, handle).await {
			Ok(Ok(Some(result))) => Ok(result),
			Ok(Ok(None)) | Err(_) => {
				tracing::warn!(
					%user_id,
					budget_ms = self.request_budget.as_millis() as u64,
					"Scoring exceeded its budget; serving the popularity ranking."
				);

				Ok(fallback_job.fallback(Fallback::Timeout))
			},
			Ok(Err(err)) => Err(Error::Training { message: format!("Scoring task failed: {err}.") }),
		}
	}

	fn untrained_fallback(
		&self,
		user_id: UserId,
		k: usize,
		include_seen: bool,
	) -> RecommendationResult {
		let seen = if include_seen { HashSet::new() } else { self.store.seen_items(user_id) };
		let items = self
			.store
			.popular_items(k.saturating_add(seen.len()))
			.into_iter()
			.filter(|(item_id, _)| !seen.contains(item_id))
			.take(k)
			.map(|(item_id, count)| ScoredItem { item_id, score: count as f32 })
			.collect();

		RecommendationResult {
			user_id,
			items,
			generation_id: None,
			computed_at: OffsetDateTime::now_utc(),
			is_cold_start: !self.store.contains_user(user_id),
			fallback: Some(Fallback::Untrained),
		}
	}

	fn record_served(&self, result: &RecommendationResult) {
		if let Some(generation_id) = result.generation_id {
			lock(&self.stats).entry(generation_id).or_default().record(result);
		}
	}

	fn resolve(&self, selector: GenerationSelector) -> Result<Option<Arc<ModelGeneration>>> {
		let registry = self.read_registry();

		if registry.state == ServiceState::Shutdown {
			return Err(Error::ServiceUnavailable);
		}

		match selector {
			GenerationSelector::Latest => Ok(registry.active.clone()),
			GenerationSelector::Explicit(generation_id) =>
				registry.generations.get(&generation_id).cloned().map(Some).ok_or_else(|| {
					Error::NotFound { message: format!("Generation {generation_id} is not loaded.") }
				}),
		}
	}

	fn lookup(&self, generation_id: GenerationId) -> Result<Arc<ModelGeneration>> {
		self.read_registry().generations.get(&generation_id).cloned().ok_or_else(|| {
			Error::NotFound { message: format!("Generation {generation_id} is not loaded.") }
		})
	}

	fn ensure_running(&self) -> Result<()> {
		if self.state() == ServiceState::Shutdown {
			return Err(Error::ServiceUnavailable);
		}

		Ok(())
	}

	fn read_registry(&self) -> RwLockReadGuard<'_, Registry> {
		self.registry.read().unwrap_or_else(|err| err.into_inner())
	}

	fn write_registry(&self) -> RwLockWriteGuard<'_, Registry> {
		self.registry.write().unwrap_or_else(|err| err.into_inner())
	}
}

fn check_trained(generation_id: GenerationId, generation: &ModelGeneration) -> Result<()> {
	if generation.generation_id != generation_id {
		return Err(Error::Training {
			message: format!(
				"Trainer returned generation {} for job {generation_id}.",
				generation.generation_id
			),
		});
	}

	generation.ensure_finite()?;

	Ok(())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(|err| err.into_inner())
}
