pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Domain(#[from] reco_domain::Error),
}
impl Error {
	pub fn is_validation(&self) -> bool {
		matches!(self, Self::Domain(reco_domain::Error::Validation { .. }))
	}

	pub fn is_feature_mismatch(&self) -> bool {
		matches!(self, Self::Domain(reco_domain::Error::FeatureMismatch { .. }))
	}
}
