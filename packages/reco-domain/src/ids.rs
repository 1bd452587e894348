use std::fmt::{Display, Formatter, Result as FmtResult};

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub u64);

/// Monotonic identifier of a trained model generation. Larger means newer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GenerationId(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Entity {
	User(UserId),
	Item(ItemId),
}

impl Display for UserId {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		write!(f, "u{}", self.0)
	}
}

impl Display for ItemId {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		write!(f, "i{}", self.0)
	}
}

impl Display for GenerationId {
	fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
		write!(f, "g{}", self.0)
	}
}

impl GenerationId {
	pub fn next(self) -> Self {
		Self(self.0 + 1)
	}
}
