//! Per-user result cache with single-flight computation.
//!
//! Entries are keyed by generation, so installing a new generation makes every older entry
//! unreachable without walking the map. Unreachable entries are dropped lazily once the map
//! reaches its capacity.

use std::{
	future::Future,
	sync::{Arc, Mutex, MutexGuard},
	time::Duration,
};

use ahash::AHashMap;
use tokio::{sync::OnceCell, time::Instant};

use reco_config::Cache;
use reco_domain::{GenerationId, RecommendationResult, UserId};

use crate::Result;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
	pub user_id: UserId,
	pub generation_id: GenerationId,
	pub include_seen: bool,
}

pub struct RecommendationCache {
	enabled: bool,
	ttl: Duration,
	max_entries: usize,
	entries: Mutex<AHashMap<CacheKey, Entry>>,
}

struct Entry {
	k: usize,
	created_at: Instant,
	cell: Arc<OnceCell<RecommendationResult>>,
}

impl RecommendationCache {
	pub fn new(enabled: bool, ttl: Duration, max_entries: usize) -> Self {
		Self { enabled, ttl, max_entries: max_entries.max(1), entries: Mutex::new(AHashMap::new()) }
	}

	pub fn from_config(cache: &Cache) -> Self {
		Self::new(cache.enabled, Duration::from_millis(cache.ttl_ms), cache.max_entries as usize)
	}

	/// Returns the cached result for `key` when it is fresh and was computed for at least `k`
	/// items, truncated to `k`. Otherwise runs `compute` once; concurrent callers for the same
	/// key await that single computation. Results carrying a fallback marker are handed out but
	/// not retained.
	pub async fn get_or_compute<F, Fut>(
		&self,
		key: CacheKey,
		k: usize,
		compute: F,
	) -> Result<RecommendationResult>
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<RecommendationResult>>,
	{
		if !self.enabled {
			return compute().await;
		}

		let cell = self.cell_for(key, k);
		let shared = cell.initialized();
		let result = cell.get_or_try_init(compute).await?;

		if shared {
			tracing::debug!(
				user_id = %key.user_id,
				generation_id = %key.generation_id,
				"Recommendation served from cache."
			);
		}
		if result.fallback.is_some() {
			self.forget_cell(&key, &cell);
		}

		let mut result = result.clone();

		result.items.truncate(k);

		Ok(result)
	}

	/// Drops every entry of `user_id`, across generations.
	pub fn invalidate_user(&self, user_id: UserId) {
		self.lock().retain(|key, _| key.user_id != user_id);
	}

	pub fn forget(&self, key: &CacheKey) {
		self.lock().remove(key);
	}

	pub fn clear(&self) {
		self.lock().clear();
	}

	pub fn len(&self) -> usize {
		self.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	fn cell_for(&self, key: CacheKey, k: usize) -> Arc<OnceCell<RecommendationResult>> {
		let mut entries = self.lock();
		let now = Instant::now();

		if let Some(entry) = entries.get(&key)
			&& entry.k >= k
			&& now.duration_since(entry.created_at) < self.ttl
		{
			return Arc::clone(&entry.cell);
		}

		if entries.len() >= self.max_entries {
			self.purge(&mut entries, key.generation_id, now);
		}

		let cell = Arc::new(OnceCell::new());

		entries.insert(key, Entry { k, created_at: now, cell: Arc::clone(&cell) });

		cell
	}

	/// Removes the entry only if it still holds `cell`; a newer computation may have replaced it.
	fn forget_cell(&self, key: &CacheKey, cell: &Arc<OnceCell<RecommendationResult>>) {
		let mut entries = self.lock();

		if entries.get(key).is_some_and(|entry| Arc::ptr_eq(&entry.cell, cell)) {
			entries.remove(key);
		}
	}

	fn purge(&self, entries: &mut AHashMap<CacheKey, Entry>, current: GenerationId, now: Instant) {
		let before = entries.len();

		entries.retain(|key, entry| {
			key.generation_id == current && now.duration_since(entry.created_at) < self.ttl
		});

		if entries.len() >= self.max_entries {
			let mut ages: Vec<(Instant, CacheKey)> =
				entries.iter().map(|(key, entry)| (entry.created_at, *key)).collect();

			ages.sort_by_key(|(created_at, _)| *created_at);

			let excess = entries.len() + 1 - self.max_entries;

			for (_, key) in ages.into_iter().take(excess) {
				entries.remove(&key);
			}
		}

		tracing::debug!(removed = before - entries.len(), "Recommendation cache purged.");
	}

	fn lock(&self) -> MutexGuard<'_, AHashMap<CacheKey, Entry>> {
		self.entries.lock().unwrap_or_else(|err| err.into_inner())
	}
}
