use ndarray::{Array1, Array2, ArrayView1};

use crate::{Error, Result};

/// Solves `a * x = b` for a symmetric positive-definite `a` by Cholesky factorization.
pub fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Result<Array1<f64>> {
	let n = a.nrows();
	let mut l = Array2::<f64>::zeros((n, n));

	for i in 0..n {
		for j in 0..=i {
			let mut sum = 0.0;

			for k in 0..j {
				sum += l[[i, k]] * l[[j, k]];
			}

			if i == j {
				let diag = a[[i, i]] - sum;

				if diag <= 0.0 || !diag.is_finite() {
					return Err(Error::Convergence {
						message: "Normal equations are not positive definite.".to_string(),
					});
				}

				l[[i, j]] = diag.sqrt();
			} else {
				l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
			}
		}
	}

	let mut y = Array1::<f64>::zeros(n);

	for i in 0..n {
		let mut sum = 0.0;

		for j in 0..i {
			sum += l[[i, j]] * y[j];
		}

		y[i] = (b[i] - sum) / l[[i, i]];
	}

	let mut x = Array1::<f64>::zeros(n);

	for i in (0..n).rev() {
		let mut sum = 0.0;

		for j in (i + 1)..n {
			sum += l[[j, i]] * x[j];
		}

		x[i] = (y[i] - sum) / l[[i, i]];
	}

	Ok(x)
}

/// `factorsᵀ · factors` in f64.
pub fn gram(factors: &Array2<f32>) -> Array2<f64> {
	let wide = factors.mapv(f64::from);

	wide.t().dot(&wide)
}

pub fn all_finite(values: &Array2<f32>) -> bool {
	values.iter().all(|value| value.is_finite())
}

pub fn cosine(lhs: ArrayView1<'_, f32>, rhs: ArrayView1<'_, f32>) -> Option<f32> {
	if lhs.is_empty() || lhs.len() != rhs.len() {
		return None;
	}

	let dot = lhs.dot(&rhs);
	let lhs_norm = lhs.dot(&lhs).sqrt();
	let rhs_norm = rhs.dot(&rhs).sqrt();

	if lhs_norm <= f32::EPSILON || rhs_norm <= f32::EPSILON {
		return None;
	}

	Some((dot / (lhs_norm * rhs_norm)).clamp(-1.0, 1.0))
}
