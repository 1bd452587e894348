//! Content side of the hybrid model: feature scaling and item-to-item similarity.

use std::collections::HashMap;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use reco_domain::{ItemId, ScoredItem};
use reco_store::FeatureSnapshot;

use crate::{Error, Result, als, linalg};

/// Per-column z-score scaling fitted on training data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Standardizer {
	means: Vec<f32>,
	scales: Vec<f32>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(try_from = "ContentParts", into = "ContentParts")]
pub struct ContentIndex {
	items: Vec<ItemId>,
	item_index: HashMap<ItemId, usize>,
	standardizer: Standardizer,
	vectors: Array2<f32>,
}

#[derive(Clone, Serialize, Deserialize)]
struct ContentParts {
	items: Vec<ItemId>,
	standardizer: Standardizer,
	vectors: Array2<f32>,
}

impl Standardizer {
	/// Fits means and standard deviations column by column. A column with zero variance scales
	/// to zero for every row.
	pub fn fit<'a>(dims: usize, rows: impl IntoIterator<Item = &'a [f32]>) -> Self {
		let mut sums = vec![0.0_f64; dims];
		let mut squares = vec![0.0_f64; dims];
		let mut count = 0_usize;

		for row in rows {
			for (col, value) in row.iter().take(dims).enumerate() {
				let value = f64::from(*value);

				sums[col] += value;
				squares[col] += value * value;
			}

			count += 1;
		}

		if count == 0 {
			return Self::identity(dims);
		}

		let n = count as f64;
		let mut means = Vec::with_capacity(dims);
		let mut scales = Vec::with_capacity(dims);

		for col in 0..dims {
			let mean = sums[col] / n;
			let variance = (squares[col] / n - mean * mean).max(0.0);
			let std = variance.sqrt();

			means.push(mean as f32);
			scales.push(if std <= 1e-12 { 0.0 } else { (1.0 / std) as f32 });
		}

		Self { means, scales }
	}

	pub fn identity(dims: usize) -> Self {
		Self { means: vec![0.0; dims], scales: vec![1.0; dims] }
	}

	pub fn dims(&self) -> usize {
		self.means.len()
	}

	pub fn transform(&self, values: &[f32]) -> Result<Array1<f32>> {
		if values.len() != self.means.len() {
			return Err(Error::FeatureMismatch {
				message: format!(
					"Scaler expects {} values, got {}.",
					self.means.len(),
					values.len()
				),
			});
		}

		Ok(values
			.iter()
			.zip(self.means.iter().zip(&self.scales))
			.map(|(value, (mean, scale))| (value - mean) * scale)
			.collect())
	}

	pub fn is_finite(&self) -> bool {
		self.means.iter().chain(&self.scales).all(|value| value.is_finite())
	}
}

impl ContentIndex {
	pub fn build(snapshot: &FeatureSnapshot) -> Result<Self> {
		let dims = snapshot.item_schema().dims();
		let items = snapshot.items().to_vec();
		let standardizer =
			Standardizer::fit(dims, (0..items.len()).map(|idx| snapshot.item_features(idx)));
		let mut vectors = Array2::<f32>::zeros((items.len(), dims));

		for (idx, mut row) in vectors.outer_iter_mut().enumerate() {
			row.assign(&standardizer.transform(snapshot.item_features(idx))?);
		}

		Self::from_parts(ContentParts { items, standardizer, vectors }).map_err(|message| {
			Error::Validation { message }
		})
	}

	fn from_parts(parts: ContentParts) -> Result<Self, String> {
		let ContentParts { items, standardizer, vectors } = parts;

		if vectors.nrows() != items.len() || vectors.ncols() != standardizer.dims() {
			return Err(format!(
				"Content vectors are {}x{}, expected {}x{}.",
				vectors.nrows(),
				vectors.ncols(),
				items.len(),
				standardizer.dims()
			));
		}

		let item_index = items.iter().enumerate().map(|(idx, id)| (*id, idx)).collect();

		Ok(Self { items, item_index, standardizer, vectors })
	}

	pub fn standardizer(&self) -> &Standardizer {
		&self.standardizer
	}

	/// Cosine neighbors in standardized feature space. Items whose standardized vector is all
	/// zeros have no direction and never appear.
	pub fn similar(&self, item_id: ItemId, k: usize) -> Vec<(ItemId, f32)> {
		let Some(anchor) = self.item_index.get(&item_id).map(|idx| self.vectors.row(*idx)) else {
			return Vec::new();
		};
		let scored = self
			.items
			.iter()
			.enumerate()
			.filter(|(_, other)| **other != item_id)
			.filter_map(|(idx, other)| {
				linalg::cosine(anchor, self.vectors.row(idx))
					.map(|score| ScoredItem { item_id: *other, score })
			})
			.collect();

		als::top_k(scored, k)
	}

	/// Similarity to a single item, if both sides have a direction.
	pub fn similarity(&self, lhs: ItemId, rhs: ItemId) -> Option<f32> {
		let lhs = self.item_index.get(&lhs)?;
		let rhs = self.item_index.get(&rhs)?;

		linalg::cosine(self.vectors.row(*lhs), self.vectors.row(*rhs))
	}

	pub fn is_finite(&self) -> bool {
		self.standardizer.is_finite() && linalg::all_finite(&self.vectors)
	}
}

impl TryFrom<ContentParts> for ContentIndex {
	type Error = String;

	fn try_from(parts: ContentParts) -> Result<Self, Self::Error> {
		Self::from_parts(parts)
	}
}

impl From<ContentIndex> for ContentParts {
	fn from(index: ContentIndex) -> Self {
		Self { items: index.items, standardizer: index.standardizer, vectors: index.vectors }
	}
}
