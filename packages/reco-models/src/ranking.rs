//! Pairwise ranking model over latent factors and content features.
//!
//! The score of a (user, item) pair is
//! `item_bias[i] + <w, x_i> + <p_u, q_i> + <x_u V_u, x_i V_i>`, where `x_u` and `x_i` are the
//! standardized feature vectors, `p_u` and `q_i` start from the collaborative factors, and
//! `V_u`, `V_i` project features into a shared interaction space. Terms that depend only on the
//! user cancel out in pairwise training and are left out.

use std::collections::HashMap;

use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::{Rng, SeedableRng, rngs::StdRng, seq::SliceRandom};
use serde::{Deserialize, Serialize};

use reco_config::Ranking;
use reco_domain::{FeatureSchema, FeatureView, ItemId, UserId};
use reco_store::FeatureSnapshot;

use crate::{CancelFlag, CandidateModel, Error, Result, Standardizer, linalg};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RankingParams {
	pub factors: usize,
	pub epochs: u32,
	pub learning_rate: f32,
	pub regularization: f32,
	pub negatives_per_positive: u32,
}

/// Feature views for one scoring call. Both must match the schemas the model was trained on.
#[derive(Clone, Copy, Debug)]
pub struct ScoreContext<'a> {
	pub user_features: &'a FeatureView,
	pub item_features: &'a FeatureView,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(try_from = "RankingParts", into = "RankingParts")]
pub struct RankingModel {
	users: Vec<UserId>,
	items: Vec<ItemId>,
	user_index: HashMap<UserId, usize>,
	item_index: HashMap<ItemId, usize>,
	user_schema: FeatureSchema,
	item_schema: FeatureSchema,
	user_scaler: Standardizer,
	item_scaler: Standardizer,
	item_bias: Array1<f32>,
	item_weights: Array1<f32>,
	user_latent: Array2<f32>,
	item_latent: Array2<f32>,
	user_projection: Array2<f32>,
	item_projection: Array2<f32>,
}

#[derive(Clone, Serialize, Deserialize)]
struct RankingParts {
	users: Vec<UserId>,
	items: Vec<ItemId>,
	user_schema: FeatureSchema,
	item_schema: FeatureSchema,
	user_scaler: Standardizer,
	item_scaler: Standardizer,
	item_bias: Array1<f32>,
	item_weights: Array1<f32>,
	user_latent: Array2<f32>,
	item_latent: Array2<f32>,
	user_projection: Array2<f32>,
	item_projection: Array2<f32>,
}

impl RankingParams {
	pub fn from_config(ranking: &Ranking) -> Self {
		Self {
			factors: ranking.factors as usize,
			epochs: ranking.epochs,
			learning_rate: ranking.learning_rate,
			regularization: ranking.regularization,
			negatives_per_positive: ranking.negatives_per_positive,
		}
	}
}

impl RankingModel {
	/// BPR training. Latent factors start from `candidate`, which must have been trained on the
	/// same snapshot. Negatives are drawn uniformly from items the user never touched; users who
	/// touched every item contribute no pairs.
	pub fn train(
		snapshot: &FeatureSnapshot,
		candidate: &CandidateModel,
		params: &RankingParams,
		seed: u64,
		cancel: &CancelFlag,
	) -> Result<Self> {
		if candidate.items() != snapshot.items() {
			return Err(Error::Validation {
				message: "Candidate model and snapshot disagree on the item catalog.".to_string(),
			});
		}
		if params.factors == 0 {
			return Err(Error::Validation {
				message: "Ranking factors must be greater than zero.".to_string(),
			});
		}

		let matrix = snapshot.matrix();
		let n_items = matrix.n_items();
		let users = candidate.users().to_vec();
		let mut rows = Vec::with_capacity(users.len());

		for user_id in &users {
			let idx = snapshot.user_idx(*user_id).ok_or_else(|| Error::Validation {
				message: format!("User {user_id} is missing from the snapshot."),
			})?;

			rows.push(idx);
		}

		let user_dims = snapshot.user_schema().dims();
		let item_dims = snapshot.item_schema().dims();
		let user_scaler =
			Standardizer::fit(user_dims, rows.iter().map(|idx| snapshot.user_features(*idx)));
		let item_scaler =
			Standardizer::fit(item_dims, (0..n_items).map(|idx| snapshot.item_features(idx)));
		let mut user_x = Array2::<f32>::zeros((users.len(), user_dims));
		let mut item_x = Array2::<f32>::zeros((n_items, item_dims));

		for (row, snap_idx) in rows.iter().enumerate() {
			user_x.row_mut(row).assign(&user_scaler.transform(snapshot.user_features(*snap_idx))?);
		}
		for item in 0..n_items {
			item_x.row_mut(item).assign(&item_scaler.transform(snapshot.item_features(item))?);
		}

		let mut rng = StdRng::seed_from_u64(seed);
		let mut model = Self::from_parts(RankingParts {
			users,
			items: snapshot.items().to_vec(),
			user_schema: snapshot.user_schema().clone(),
			item_schema: snapshot.item_schema().clone(),
			user_scaler,
			item_scaler,
			item_bias: Array1::zeros(n_items),
			item_weights: Array1::zeros(item_dims),
			user_latent: candidate.user_matrix().clone(),
			item_latent: candidate.item_matrix().clone(),
			user_projection: small_random(&mut rng, user_dims, params.factors),
			item_projection: small_random(&mut rng, item_dims, params.factors),
		})
		.map_err(|message| Error::Validation { message })?;
		let mut positives = Vec::new();

		for (row, snap_idx) in rows.iter().enumerate() {
			let observed = matrix.user_row(*snap_idx);

			if observed.len() >= n_items {
				continue;
			}

			positives.extend(observed.iter().map(|(item, _)| (row, *snap_idx, *item)));
		}

		if positives.is_empty() {
			tracing::debug!("No ranking pairs available; keeping initial ranking weights.");

			return Ok(model);
		}

		for epoch in 0..params.epochs {
			cancel.check()?;

			positives.shuffle(&mut rng);

			let mut loss = 0.0_f64;
			let mut pairs = 0_u64;

			for (row, snap_idx, positive) in &positives {
				for _ in 0..params.negatives_per_positive {
					let negative = loop {
						let pick = rng.gen_range(0..n_items);

						if !matrix.contains(*snap_idx, pick) {
							break pick;
						}
					};

					loss +=
						model.step(*row, *positive, negative, user_x.row(*row), &item_x, params);
					pairs += 1;
				}
			}

			if !model.is_finite() {
				return Err(Error::Convergence {
					message: format!("Ranking weights contain NaN or Inf after epoch {epoch}."),
				});
			}

			tracing::debug!(epoch, loss = loss / pairs.max(1) as f64, "BPR epoch finished.");
		}

		Ok(model)
	}

	fn from_parts(parts: RankingParts) -> Result<Self, String> {
		let RankingParts {
			users,
			items,
			user_schema,
			item_schema,
			user_scaler,
			item_scaler,
			item_bias,
			item_weights,
			user_latent,
			item_latent,
			user_projection,
			item_projection,
		} = parts;

		if user_latent.nrows() != users.len()
			|| item_latent.nrows() != items.len()
			|| item_bias.len() != items.len()
		{
			return Err("Ranking rows do not match the user and item lists.".to_string());
		}
		if user_latent.ncols() != item_latent.ncols()
			|| user_projection.ncols() != item_projection.ncols()
		{
			return Err("Ranking factor dimensions disagree.".to_string());
		}
		if user_scaler.dims() != user_schema.dims()
			|| user_projection.nrows() != user_schema.dims()
			|| item_scaler.dims() != item_schema.dims()
			|| item_projection.nrows() != item_schema.dims()
			|| item_weights.len() != item_schema.dims()
		{
			return Err("Ranking feature weights do not match the trained schemas.".to_string());
		}

		let user_index = users.iter().enumerate().map(|(idx, id)| (*id, idx)).collect();
		let item_index = items.iter().enumerate().map(|(idx, id)| (*id, idx)).collect();

		Ok(Self {
			users,
			items,
			user_index,
			item_index,
			user_schema,
			item_schema,
			user_scaler,
			item_scaler,
			item_bias,
			item_weights,
			user_latent,
			item_latent,
			user_projection,
			item_projection,
		})
	}

	pub fn user_schema(&self) -> &FeatureSchema {
		&self.user_schema
	}

	pub fn item_schema(&self) -> &FeatureSchema {
		&self.item_schema
	}

	/// Deterministic for a given model. Unknown users and items contribute zero latent and bias
	/// terms, so only their features drive the score.
	pub fn score(
		&self,
		user_id: UserId,
		item_id: ItemId,
		context: &ScoreContext<'_>,
	) -> Result<f32> {
		self.user_schema.check_view(context.user_features)?;
		self.item_schema.check_view(context.item_features)?;

		let x_u = self.user_scaler.transform(&context.user_features.values)?;
		let x_i = self.item_scaler.transform(&context.item_features.values)?;
		let user = self.user_index.get(&user_id).copied();
		let item = self.item_index.get(&item_id).copied();
		let mut score = self.item_weights.dot(&x_i);

		if let Some(item) = item {
			score += self.item_bias[item];
		}
		if let (Some(user), Some(item)) = (user, item) {
			score += self.user_latent.row(user).dot(&self.item_latent.row(item));
		}

		score += x_u.dot(&self.user_projection).dot(&x_i.dot(&self.item_projection));

		Ok(score)
	}

	pub fn is_finite(&self) -> bool {
		self.item_bias.iter().chain(self.item_weights.iter()).all(|value| value.is_finite())
			&& linalg::all_finite(&self.user_latent)
			&& linalg::all_finite(&self.item_latent)
			&& linalg::all_finite(&self.user_projection)
			&& linalg::all_finite(&self.item_projection)
			&& self.user_scaler.is_finite()
			&& self.item_scaler.is_finite()
	}

	fn trained_score(
		&self,
		user: usize,
		item: usize,
		x_u_proj: &Array1<f32>,
		item_x: &Array2<f32>,
	) -> f32 {
		let x_i = item_x.row(item);

		self.item_bias[item]
			+ self.item_weights.dot(&x_i)
			+ self.user_latent.row(user).dot(&self.item_latent.row(item))
			+ x_u_proj.dot(&x_i.dot(&self.item_projection))
	}

	/// One SGD step on `ln sigmoid(s_ui - s_uj)`; returns the pair's loss before the update.
	fn step(
		&mut self,
		user: usize,
		positive: usize,
		negative: usize,
		x_u: ArrayView1<'_, f32>,
		item_x: &Array2<f32>,
		params: &RankingParams,
	) -> f64 {
		let lr = params.learning_rate;
		let reg = params.regularization;
		let x_u_proj = x_u.dot(&self.user_projection);
		let margin = self.trained_score(user, positive, &x_u_proj, item_x)
			- self.trained_score(user, negative, &x_u_proj, item_x);
		let weight = sigmoid(-margin);
		let x_i = item_x.row(positive);
		let x_j = item_x.row(negative);
		let x_diff = &x_i - &x_j;
		let proj_diff = x_i.dot(&self.item_projection) - x_j.dot(&self.item_projection);

		self.item_bias[positive] += lr * (weight - reg * self.item_bias[positive]);
		self.item_bias[negative] += lr * (-weight - reg * self.item_bias[negative]);
		self.item_weights.scaled_add(lr * weight, &x_diff);
		self.item_weights *= 1.0 - lr * reg;

		let p_u = self.user_latent.row(user).to_owned();
		let q_diff = &self.item_latent.row(positive) - &self.item_latent.row(negative);

		self.user_latent.row_mut(user).scaled_add(lr * weight, &q_diff);
		self.user_latent.row_mut(user).scaled_add(-lr * reg, &p_u);

		let q_i = self.item_latent.row(positive).to_owned();
		let q_j = self.item_latent.row(negative).to_owned();

		self.item_latent.row_mut(positive).scaled_add(lr * weight, &p_u);
		self.item_latent.row_mut(positive).scaled_add(-lr * reg, &q_i);
		self.item_latent.row_mut(negative).scaled_add(-lr * weight, &p_u);
		self.item_latent.row_mut(negative).scaled_add(-lr * reg, &q_j);

		let user_grad = outer(x_u, proj_diff.view());
		let item_grad = outer(x_diff.view(), x_u_proj.view());

		self.user_projection.scaled_add(lr * weight, &user_grad);
		self.user_projection *= 1.0 - lr * reg;
		self.item_projection.scaled_add(lr * weight, &item_grad);
		self.item_projection *= 1.0 - lr * reg;

		-f64::from(sigmoid(margin).max(f32::MIN_POSITIVE)).ln()
	}
}

impl TryFrom<RankingParts> for RankingModel {
	type Error = String;

	fn try_from(parts: RankingParts) -> Result<Self, Self::Error> {
		Self::from_parts(parts)
	}
}

impl From<RankingModel> for RankingParts {
	fn from(model: RankingModel) -> Self {
		Self {
			users: model.users,
			items: model.items,
			user_schema: model.user_schema,
			item_schema: model.item_schema,
			user_scaler: model.user_scaler,
			item_scaler: model.item_scaler,
			item_bias: model.item_bias,
			item_weights: model.item_weights,
			user_latent: model.user_latent,
			item_latent: model.item_latent,
			user_projection: model.user_projection,
			item_projection: model.item_projection,
		}
	}
}

fn sigmoid(x: f32) -> f32 {
	1.0 / (1.0 + (-x).exp())
}

fn outer(lhs: ArrayView1<'_, f32>, rhs: ArrayView1<'_, f32>) -> Array2<f32> {
	let column = lhs.insert_axis(Axis(1));
	let row = rhs.insert_axis(Axis(0));

	column.dot(&row)
}

fn small_random(rng: &mut StdRng, rows: usize, cols: usize) -> Array2<f32> {
	Array2::from_shape_fn((rows, cols), |_| rng.gen_range(-0.01..0.01))
}
