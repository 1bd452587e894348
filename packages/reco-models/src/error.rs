pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Training diverged: {message}")]
	Convergence { message: String },
	#[error("Feature mismatch: {message}")]
	FeatureMismatch { message: String },
	#[error("Training was cancelled.")]
	Cancelled,
	#[error("The snapshot has no interactions to train on.")]
	EmptyTrainingSet,
	#[error("Invalid generation blob: {message}")]
	Codec { message: String },
	#[error("Validation error: {message}")]
	Validation { message: String },
}
impl From<reco_domain::Error> for Error {
	fn from(err: reco_domain::Error) -> Self {
		match err {
			reco_domain::Error::Validation { message } => Self::Validation { message },
			reco_domain::Error::FeatureMismatch { message } => Self::FeatureMismatch { message },
		}
	}
}
