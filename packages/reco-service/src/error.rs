pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Validation error: {message}")]
	Validation { message: String },
	#[error("Training diverged: {message}")]
	Convergence { message: String },
	#[error("Feature mismatch: {message}")]
	FeatureMismatch { message: String },
	#[error("Not found: {message}")]
	NotFound { message: String },
	#[error("Training was cancelled.")]
	Cancelled,
	#[error("Training failed: {message}")]
	Training { message: String },
	#[error("Recommender service has been shut down.")]
	ServiceUnavailable,
}
impl From<reco_domain::Error> for Error {
	fn from(err: reco_domain::Error) -> Self {
		match err {
			reco_domain::Error::Validation { message } => Self::Validation { message },
			reco_domain::Error::FeatureMismatch { message } => Self::FeatureMismatch { message },
		}
	}
}

impl From<reco_store::Error> for Error {
	fn from(err: reco_store::Error) -> Self {
		match err {
			reco_store::Error::Domain(inner) => inner.into(),
		}
	}
}

impl From<reco_models::Error> for Error {
	fn from(err: reco_models::Error) -> Self {
		match err {
			reco_models::Error::Convergence { message } => Self::Convergence { message },
			reco_models::Error::FeatureMismatch { message } => Self::FeatureMismatch { message },
			reco_models::Error::Cancelled => Self::Cancelled,
			reco_models::Error::EmptyTrainingSet => Self::Training {
				message: "The snapshot has no interactions to train on.".to_string(),
			},
			reco_models::Error::Codec { message } => Self::Validation { message },
			reco_models::Error::Validation { message } => Self::Validation { message },
		}
	}
}
