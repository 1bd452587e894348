/// Sparse user x item confidence matrix in compressed row form, indexed both ways.
///
/// Indices refer to the sorted user and item lists of the owning snapshot. Every stored weight is
/// zero or greater; a missing entry means zero confidence, not a negative preference.
#[derive(Clone, Debug, Default)]
pub struct InteractionMatrix {
	by_user: Vec<Vec<(usize, f32)>>,
	by_item: Vec<Vec<(usize, f32)>>,
	nnz: usize,
}
impl InteractionMatrix {
	/// Entries must be unique per (user, item); rows come out sorted by column index.
	pub fn from_entries(
		n_users: usize,
		n_items: usize,
		entries: impl IntoIterator<Item = (usize, usize, f32)>,
	) -> Self {
		let mut by_user = vec![Vec::new(); n_users];
		let mut by_item = vec![Vec::new(); n_items];
		let mut nnz = 0;

		for (user, item, weight) in entries {
			let weight = weight.max(0.0);

			by_user[user].push((item, weight));
			by_item[item].push((user, weight));

			nnz += 1;
		}
		for row in by_user.iter_mut().chain(by_item.iter_mut()) {
			row.sort_by_key(|(idx, _)| *idx);
		}

		Self { by_user, by_item, nnz }
	}

	pub fn n_users(&self) -> usize {
		self.by_user.len()
	}

	pub fn n_items(&self) -> usize {
		self.by_item.len()
	}

	pub fn nnz(&self) -> usize {
		self.nnz
	}

	pub fn user_row(&self, user: usize) -> &[(usize, f32)] {
		self.by_user.get(user).map(Vec::as_slice).unwrap_or(&[])
	}

	pub fn item_column(&self, item: usize) -> &[(usize, f32)] {
		self.by_item.get(item).map(Vec::as_slice).unwrap_or(&[])
	}

	pub fn get(&self, user: usize, item: usize) -> f32 {
		let row = self.user_row(user);

		row.binary_search_by_key(&item, |(idx, _)| *idx).map(|pos| row[pos].1).unwrap_or(0.0)
	}

	pub fn contains(&self, user: usize, item: usize) -> bool {
		self.user_row(user).binary_search_by_key(&item, |(idx, _)| *idx).is_ok()
	}
}
