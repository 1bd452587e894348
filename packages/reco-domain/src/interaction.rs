use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{Error, ItemId, Result, UserId};

/// One implicit-feedback event. Strength is a confidence signal, never a negative rating.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
	pub user_id: UserId,
	pub item_id: ItemId,
	pub strength: f32,
	#[serde(with = "crate::time_serde")]
	pub timestamp: OffsetDateTime,
}
impl Interaction {
	pub fn new(
		user_id: UserId,
		item_id: ItemId,
		strength: f32,
		timestamp: OffsetDateTime,
	) -> Result<Self> {
		validate_strength(strength)?;

		Ok(Self { user_id, item_id, strength, timestamp })
	}
}

pub fn validate_strength(strength: f32) -> Result<()> {
	if strength.is_nan() || strength.is_infinite() {
		return Err(Error::Validation {
			message: "Interaction strength must be a finite number.".to_string(),
		});
	}
	if strength < 0.0 {
		return Err(Error::Validation {
			message: format!("Interaction strength must be zero or greater, got {strength}."),
		});
	}

	Ok(())
}
