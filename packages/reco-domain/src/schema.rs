use serde::{Deserialize, Serialize};

use reco_config::{SchemaSection, SlotKind};

use crate::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
	Numeric,
	/// Only 0.0 or 1.0.
	Binary,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSlot {
	pub name: String,
	pub kind: FeatureKind,
}

/// Ordered, versioned list of feature slots. A feature vector is only meaningful together with
/// the schema version it was written against.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
	pub version: u32,
	pub slots: Vec<FeatureSlot>,
}

/// Feature values tagged with the schema version they conform to.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureView {
	pub schema_version: u32,
	pub values: Vec<f32>,
}

impl FeatureSchema {
	pub fn new(version: u32, slots: Vec<FeatureSlot>) -> Self {
		Self { version, slots }
	}

	pub fn empty(version: u32) -> Self {
		Self { version, slots: Vec::new() }
	}

	pub fn from_config(section: &SchemaSection) -> Self {
		let slots = section
			.slots
			.iter()
			.map(|slot| FeatureSlot {
				name: slot.name.clone(),
				kind: match slot.kind {
					SlotKind::Numeric => FeatureKind::Numeric,
					SlotKind::Binary => FeatureKind::Binary,
				},
			})
			.collect();

		Self { version: section.version, slots }
	}

	pub fn dims(&self) -> usize {
		self.slots.len()
	}

	pub fn zero_view(&self) -> FeatureView {
		FeatureView { schema_version: self.version, values: vec![0.0; self.slots.len()] }
	}

	/// Checks raw values against the slot list before they are stored.
	pub fn check_values(&self, values: &[f32]) -> Result<()> {
		if values.len() != self.slots.len() {
			return Err(Error::FeatureMismatch {
				message: format!(
					"Expected {} feature values for schema v{}, got {}.",
					self.slots.len(),
					self.version,
					values.len()
				),
			});
		}

		for (slot, value) in self.slots.iter().zip(values) {
			if !value.is_finite() {
				return Err(Error::FeatureMismatch {
					message: format!("Feature {} must be a finite number.", slot.name),
				});
			}
			if slot.kind == FeatureKind::Binary && *value != 0.0 && *value != 1.0 {
				return Err(Error::FeatureMismatch {
					message: format!("Binary feature {} must be 0 or 1, got {value}.", slot.name),
				});
			}
		}

		Ok(())
	}

	/// Checks a stored view against this schema at scoring time.
	pub fn check_view(&self, view: &FeatureView) -> Result<()> {
		if view.schema_version != self.version {
			return Err(Error::FeatureMismatch {
				message: format!(
					"Feature view uses schema v{}, model was trained on v{}.",
					view.schema_version, self.version
				),
			});
		}
		if view.values.len() != self.slots.len() {
			return Err(Error::FeatureMismatch {
				message: format!(
					"Feature view has {} values, schema v{} has {} slots.",
					view.values.len(),
					self.version,
					self.slots.len()
				),
			});
		}

		Ok(())
	}
}
