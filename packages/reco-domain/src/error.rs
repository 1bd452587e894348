pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
	#[error("Validation error: {message}")]
	Validation { message: String },
	#[error("Feature mismatch: {message}")]
	FeatureMismatch { message: String },
}
