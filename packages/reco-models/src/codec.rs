//! Self-checking blob format for persisting generations.

use serde::{Deserialize, Serialize};

use crate::{Error, ModelGeneration, Result};

pub const FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct Envelope {
	format_version: u32,
	/// blake3 hex digest of `payload`.
	checksum: String,
	payload: String,
}

pub fn export(generation: &ModelGeneration) -> Result<Vec<u8>> {
	let payload = serde_json::to_string(generation)
		.map_err(|err| Error::Codec { message: format!("Failed to encode generation: {err}.") })?;
	let envelope = Envelope {
		format_version: FORMAT_VERSION,
		checksum: blake3::hash(payload.as_bytes()).to_hex().to_string(),
		payload,
	};

	serde_json::to_vec(&envelope)
		.map_err(|err| Error::Codec { message: format!("Failed to encode envelope: {err}.") })
}

pub fn import(blob: &[u8]) -> Result<ModelGeneration> {
	let envelope: Envelope = serde_json::from_slice(blob).map_err(|err| Error::Codec {
		message: format!("Blob is not a generation envelope: {err}."),
	})?;

	if envelope.format_version != FORMAT_VERSION {
		return Err(Error::Codec {
			message: format!(
				"Unsupported format_version {}; expected {FORMAT_VERSION}.",
				envelope.format_version
			),
		});
	}

	let checksum = blake3::hash(envelope.payload.as_bytes()).to_hex();

	if checksum.as_str() != envelope.checksum {
		return Err(Error::Codec { message: "Checksum does not match the payload.".to_string() });
	}

	let generation: ModelGeneration = serde_json::from_str(&envelope.payload)
		.map_err(|err| Error::Codec { message: format!("Failed to decode generation: {err}.") })?;

	generation.ensure_finite()?;

	Ok(generation)
}
