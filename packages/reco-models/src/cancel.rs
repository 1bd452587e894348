use std::sync::{
	Arc,
	atomic::{AtomicBool, Ordering},
};

/// Cooperative cancellation for training loops. Checked between iterations, so the current
/// iteration always completes.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);
impl CancelFlag {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn cancel(&self) {
		self.0.store(true, Ordering::Release);
	}

	pub fn is_cancelled(&self) -> bool {
		self.0.load(Ordering::Acquire)
	}

	pub(crate) fn check(&self) -> crate::Result<()> {
		if self.is_cancelled() {
			return Err(crate::Error::Cancelled);
		}

		Ok(())
	}
}
