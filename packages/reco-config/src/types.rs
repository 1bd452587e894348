use serde::Deserialize;

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub training: Training,
	pub ranking: Ranking,
	pub fusion: Fusion,
	pub cache: Cache,
	pub schema: Schema,
	pub evaluation: Evaluation,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Service {
	pub log_level: String,
	/// Scoring budget per request. Requests that exceed it are answered from the popularity
	/// ranking instead.
	pub request_budget_ms: u64,
	#[serde(default = "default_keep_generations")]
	pub keep_generations: u32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Training {
	pub dims: u32,
	pub iterations: u32,
	pub regularization: f32,
	/// Confidence scale: `c = 1 + alpha * strength`.
	pub alpha: f32,
	pub seed: u64,
	#[serde(default)]
	pub early_stop_tolerance: f32,
	#[serde(default = "default_patience")]
	pub patience: u32,
	#[serde(default = "default_max_init_scale")]
	pub max_init_scale: f32,
	/// Summed strengths above this are clamped before computing confidence.
	#[serde(default = "default_max_strength")]
	pub max_strength: f32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Ranking {
	pub factors: u32,
	pub epochs: u32,
	pub learning_rate: f32,
	pub regularization: f32,
	pub negatives_per_positive: u32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Fusion {
	pub collaborative_weight: f32,
	pub content_weight: f32,
	#[serde(default = "default_candidate_pool_factor")]
	pub candidate_pool_factor: u32,
	/// Share of content similarity in `similar_items`; the rest comes from item factors.
	#[serde(default)]
	pub similar_content_weight: f32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Cache {
	pub enabled: bool,
	pub ttl_ms: u64,
	#[serde(default = "default_cache_max_entries")]
	pub max_entries: u32,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Schema {
	pub user: SchemaSection,
	pub item: SchemaSection,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SchemaSection {
	pub version: u32,
	#[serde(default)]
	pub slots: Vec<Slot>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Slot {
	pub name: String,
	pub kind: SlotKind,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotKind {
	Numeric,
	Binary,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Evaluation {
	pub holdout_fraction: f32,
	pub min_interactions: u32,
	pub k: u32,
}

fn default_keep_generations() -> u32 {
	4
}

fn default_patience() -> u32 {
	2
}

fn default_max_init_scale() -> f32 {
	0.1
}

fn default_max_strength() -> f32 {
	10_000.0
}

fn default_candidate_pool_factor() -> u32 {
	4
}

fn default_cache_max_entries() -> u32 {
	100_000
}
