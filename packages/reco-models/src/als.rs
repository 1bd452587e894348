//! Implicit-feedback matrix factorization (Hu, Koren and Volinsky ALS) and candidate generation.

use std::collections::{HashMap, HashSet};

use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};

use reco_config::Training;
use reco_domain::{ItemId, ScoredItem, UserId, cmp_scored};
use reco_store::{FeatureSnapshot, InteractionMatrix};

use crate::{CancelFlag, Error, Result, linalg};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlsParams {
	pub dims: usize,
	pub iterations: u32,
	pub regularization: f32,
	pub alpha: f32,
	pub seed: u64,
	pub early_stop_tolerance: f32,
	pub patience: u32,
	pub max_init_scale: f32,
	#[serde(default = "default_max_strength")]
	pub max_strength: f32,
}

/// Broad shortlist for one user.
#[derive(Clone, Debug, PartialEq)]
pub struct CandidateSet {
	pub items: Vec<(ItemId, f32)>,
	pub is_cold_start: bool,
}

/// Outcome of an ALS run besides the factors.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AlsRun {
	pub iterations_run: u32,
	pub final_loss: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(try_from = "CandidateParts", into = "CandidateParts")]
pub struct CandidateModel {
	users: Vec<UserId>,
	items: Vec<ItemId>,
	user_index: HashMap<UserId, usize>,
	item_index: HashMap<ItemId, usize>,
	user_factors: Array2<f32>,
	item_factors: Array2<f32>,
	/// Popularity share per item, ranked; the cold-start answer.
	popular: Vec<(ItemId, f32)>,
}

#[derive(Clone, Serialize, Deserialize)]
struct CandidateParts {
	users: Vec<UserId>,
	items: Vec<ItemId>,
	user_factors: Array2<f32>,
	item_factors: Array2<f32>,
	popular: Vec<(ItemId, f32)>,
}

impl AlsParams {
	pub fn from_config(training: &Training) -> Self {
		Self {
			dims: training.dims as usize,
			iterations: training.iterations,
			regularization: training.regularization,
			alpha: training.alpha,
			seed: training.seed,
			early_stop_tolerance: training.early_stop_tolerance,
			patience: training.patience,
			max_init_scale: training.max_init_scale,
			max_strength: training.max_strength,
		}
	}

	/// `1 + alpha * s`, with `s` clamped to `max_strength` so one outsized event cannot make the
	/// normal equations singular.
	fn confidence(&self, strength: f32) -> f64 {
		1.0 + f64::from(self.alpha) * f64::from(strength.min(self.max_strength))
	}
}

fn default_max_strength() -> f32 {
	10_000.0
}

impl CandidateModel {
	/// Factorizes the snapshot's interaction matrix. Users without interactions get no factors
	/// and are served as cold starts.
	pub fn train(
		snapshot: &FeatureSnapshot,
		params: &AlsParams,
		cancel: &CancelFlag,
	) -> Result<(Self, AlsRun)> {
		let matrix = snapshot.matrix();

		if matrix.nnz() == 0 {
			return Err(Error::EmptyTrainingSet);
		}
		if params.dims == 0 || params.iterations == 0 {
			return Err(Error::Validation {
				message: "ALS dims and iterations must be greater than zero.".to_string(),
			});
		}
		if !(params.max_init_scale.is_finite() && params.max_init_scale > 0.0) {
			return Err(Error::Validation {
				message: "ALS max_init_scale must be a positive number.".to_string(),
			});
		}
		if !(params.max_strength.is_finite() && params.max_strength > 0.0) {
			return Err(Error::Validation {
				message: "ALS max_strength must be a positive number.".to_string(),
			});
		}

		let mut rng = StdRng::seed_from_u64(params.seed);
		let mut user_factors = random_factors(&mut rng, matrix.n_users(), params);
		let mut item_factors = random_factors(&mut rng, matrix.n_items(), params);
		let mut run = AlsRun { iterations_run: 0, final_loss: f64::INFINITY };
		let mut stalled = 0_u32;

		for iteration in 0..params.iterations {
			cancel.check()?;

			solve_side(matrix, Side::Users, &item_factors, &mut user_factors, params)?;
			ensure_finite(&user_factors, "User", iteration)?;
			solve_side(matrix, Side::Items, &user_factors, &mut item_factors, params)?;
			ensure_finite(&item_factors, "Item", iteration)?;

			let loss = weighted_loss(matrix, &user_factors, &item_factors, params);

			if !loss.is_finite() {
				return Err(Error::Convergence {
					message: format!("Loss became non-finite at iteration {iteration}."),
				});
			}

			tracing::debug!(iteration, loss, "ALS iteration finished.");

			let previous = run.final_loss;

			run = AlsRun { iterations_run: iteration + 1, final_loss: loss };

			if previous.is_finite() {
				let improvement = (previous - loss) / previous.abs().max(f64::EPSILON);

				if improvement < f64::from(params.early_stop_tolerance) {
					stalled += 1;
				} else {
					stalled = 0;
				}
				if stalled >= params.patience {
					tracing::info!(iteration, loss, "ALS stopped early after the loss stalled.");

					break;
				}
			}
		}

		let mut active_users = Vec::new();
		let mut active_rows = Vec::new();

		for (idx, user_id) in snapshot.users().iter().enumerate() {
			if !matrix.user_row(idx).is_empty() {
				active_users.push(*user_id);
				active_rows.push(idx);
			}
		}

		let user_factors = user_factors.select(Axis(0), &active_rows);
		let popular = popularity_ranking(snapshot.items(), snapshot.popularity());
		let model = Self::from_parts(CandidateParts {
			users: active_users,
			items: snapshot.items().to_vec(),
			user_factors,
			item_factors,
			popular,
		})
		.map_err(|message| Error::Convergence { message })?;

		Ok((model, run))
	}

	/// Builds a model from trained factors. Row counts must match the id lists and both factor
	/// matrices must share one dimension.
	pub fn from_factors(
		users: Vec<UserId>,
		items: Vec<ItemId>,
		user_factors: Array2<f32>,
		item_factors: Array2<f32>,
		popularity: &[u64],
	) -> Result<Self> {
		let popular = popularity_ranking(&items, popularity);

		Self::from_parts(CandidateParts { users, items, user_factors, item_factors, popular })
			.map_err(|message| Error::Validation { message })
	}

	fn from_parts(parts: CandidateParts) -> Result<Self, String> {
		let CandidateParts { users, items, user_factors, item_factors, popular } = parts;

		if user_factors.nrows() != users.len() || item_factors.nrows() != items.len() {
			return Err("Factor rows do not match the user and item lists.".to_string());
		}
		if user_factors.ncols() != item_factors.ncols() {
			return Err(format!(
				"User factors have {} dims, item factors have {}.",
				user_factors.ncols(),
				item_factors.ncols()
			));
		}

		let user_index = users.iter().enumerate().map(|(idx, id)| (*id, idx)).collect();
		let item_index = items.iter().enumerate().map(|(idx, id)| (*id, idx)).collect();

		Ok(Self { users, items, user_index, item_index, user_factors, item_factors, popular })
	}

	pub fn dims(&self) -> usize {
		self.item_factors.ncols()
	}

	pub fn users(&self) -> &[UserId] {
		&self.users
	}

	pub fn items(&self) -> &[ItemId] {
		&self.items
	}

	pub fn knows_user(&self, user_id: UserId) -> bool {
		self.user_index.contains_key(&user_id)
	}

	pub fn user_factors(&self, user_id: UserId) -> Option<ArrayView1<'_, f32>> {
		self.user_index.get(&user_id).map(|idx| self.user_factors.row(*idx))
	}

	pub fn item_factors(&self, item_id: ItemId) -> Option<ArrayView1<'_, f32>> {
		self.item_index.get(&item_id).map(|idx| self.item_factors.row(*idx))
	}

	pub(crate) fn user_matrix(&self) -> &Array2<f32> {
		&self.user_factors
	}

	pub(crate) fn item_matrix(&self) -> &Array2<f32> {
		&self.item_factors
	}

	/// Dot-product affinity, zero when either side is unknown.
	pub fn affinity(&self, user_id: UserId, item_id: ItemId) -> f32 {
		match (self.user_factors(user_id), self.item_factors(item_id)) {
			(Some(user), Some(item)) => user.dot(&item),
			_ => 0.0,
		}
	}

	pub fn candidates(&self, user_id: UserId, k: usize) -> CandidateSet {
		self.candidates_excluding(user_id, k, &HashSet::new())
	}

	/// Exact nearest-neighbor search by dot product over every item. Unknown users get the
	/// popularity ranking flagged as a cold start.
	pub fn candidates_excluding(
		&self,
		user_id: UserId,
		k: usize,
		exclude: &HashSet<ItemId>,
	) -> CandidateSet {
		let Some(user) = self.user_factors(user_id) else {
			return CandidateSet { items: self.popular_excluding(k, exclude), is_cold_start: true };
		};
		let scores = self.item_factors.dot(&user);
		let scored = self
			.items
			.iter()
			.zip(scores.iter())
			.filter(|(item_id, _)| !exclude.contains(item_id))
			.map(|(item_id, score)| ScoredItem { item_id: *item_id, score: *score })
			.collect();

		CandidateSet { items: top_k(scored, k), is_cold_start: false }
	}

	pub fn popular_excluding(&self, k: usize, exclude: &HashSet<ItemId>) -> Vec<(ItemId, f32)> {
		self.popular.iter().filter(|(item_id, _)| !exclude.contains(item_id)).take(k).copied().collect()
	}

	/// Items closest to `item_id` by cosine over item factors, excluding the item itself.
	pub fn similar_items(&self, item_id: ItemId, k: usize) -> Vec<(ItemId, f32)> {
		let Some(anchor) = self.item_factors(item_id) else { return Vec::new() };
		let scored = self
			.items
			.iter()
			.enumerate()
			.filter(|(_, other)| **other != item_id)
			.filter_map(|(idx, other)| {
				linalg::cosine(anchor, self.item_factors.row(idx))
					.map(|score| ScoredItem { item_id: *other, score })
			})
			.collect();

		top_k(scored, k)
	}

	pub fn is_finite(&self) -> bool {
		linalg::all_finite(&self.user_factors) && linalg::all_finite(&self.item_factors)
	}
}

impl TryFrom<CandidateParts> for CandidateModel {
	type Error = String;

	fn try_from(parts: CandidateParts) -> Result<Self, Self::Error> {
		Self::from_parts(parts)
	}
}

impl From<CandidateModel> for CandidateParts {
	fn from(model: CandidateModel) -> Self {
		Self {
			users: model.users,
			items: model.items,
			user_factors: model.user_factors,
			item_factors: model.item_factors,
			popular: model.popular,
		}
	}
}

#[derive(Clone, Copy)]
enum Side {
	Users,
	Items,
}

/// Ranks items by popularity share. Equal counts go to the lower item id.
pub(crate) fn popularity_ranking(items: &[ItemId], popularity: &[u64]) -> Vec<(ItemId, f32)> {
	let total: u64 = popularity.iter().sum();
	let scored = items
		.iter()
		.zip(popularity)
		.map(|(item_id, count)| ScoredItem {
			item_id: *item_id,
			score: if total == 0 { 0.0 } else { *count as f32 / total as f32 },
		})
		.collect();

	top_k(scored, usize::MAX)
}

pub(crate) fn top_k(mut scored: Vec<ScoredItem>, k: usize) -> Vec<(ItemId, f32)> {
	if k < scored.len() {
		scored.select_nth_unstable_by(k, cmp_scored);
		scored.truncate(k);
	}

	scored.sort_by(cmp_scored);

	scored.into_iter().map(|item| (item.item_id, item.score)).collect()
}

fn random_factors(rng: &mut StdRng, rows: usize, params: &AlsParams) -> Array2<f32> {
	let scale = params.max_init_scale;

	Array2::from_shape_fn((rows, params.dims), |_| rng.gen_range(-scale..scale))
}

fn ensure_finite(factors: &Array2<f32>, label: &str, iteration: u32) -> Result<()> {
	if linalg::all_finite(factors) {
		return Ok(());
	}

	Err(Error::Convergence {
		message: format!("{label} factors contain NaN or Inf at iteration {iteration}."),
	})
}

/// One half-step: holds `fixed` constant and solves every row of `target` exactly.
fn solve_side(
	matrix: &InteractionMatrix,
	side: Side,
	fixed: &Array2<f32>,
	target: &mut Array2<f32>,
	params: &AlsParams,
) -> Result<()> {
	let dims = params.dims;
	let gram = linalg::gram(fixed);
	let lambda = f64::from(params.regularization);
	let rows = match side {
		Side::Users => matrix.n_users(),
		Side::Items => matrix.n_items(),
	};

	for row in 0..rows {
		let observed = match side {
			Side::Users => matrix.user_row(row),
			Side::Items => matrix.item_column(row),
		};

		if observed.is_empty() {
			target.row_mut(row).fill(0.0);

			continue;
		}

		let mut a = gram.clone();
		let mut b = Array1::<f64>::zeros(dims);

		for (other, strength) in observed {
			let confidence = params.confidence(*strength);
			let vector = fixed.row(*other);

			for i in 0..dims {
				let vi = f64::from(vector[i]);

				b[i] += confidence * vi;

				for j in 0..dims {
					a[[i, j]] += (confidence - 1.0) * vi * f64::from(vector[j]);
				}
			}
		}
		for i in 0..dims {
			a[[i, i]] += lambda;
		}

		let solved = linalg::cholesky_solve(&a, &b)?;

		for (slot, value) in target.row_mut(row).iter_mut().zip(solved.iter()) {
			*slot = *value as f32;
		}
	}

	Ok(())
}

/// Full weighted objective: sum over all pairs of `c * (p - x.y)^2` plus L2. Unobserved pairs
/// are folded in through the Gram matrix instead of being enumerated.
fn weighted_loss(
	matrix: &InteractionMatrix,
	user_factors: &Array2<f32>,
	item_factors: &Array2<f32>,
	params: &AlsParams,
) -> f64 {
	let gram = linalg::gram(item_factors);
	let mut loss = 0.0_f64;

	for (user, row) in user_factors.outer_iter().enumerate() {
		let x = row.mapv(f64::from);

		loss += x.dot(&gram.dot(&x));

		for (item, strength) in matrix.user_row(user) {
			let predicted = f64::from(row.dot(&item_factors.row(*item)));
			let confidence = params.confidence(*strength);

			loss += confidence * (1.0 - predicted).powi(2) - predicted.powi(2);
		}
	}

	let norms: f64 = user_factors
		.iter()
		.chain(item_factors.iter())
		.map(|value| f64::from(*value).powi(2))
		.sum();

	loss + f64::from(params.regularization) * norms
}
