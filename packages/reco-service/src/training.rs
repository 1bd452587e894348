//! Background retraining: the trainer seam, the job queue and its completion signals.

use tokio::{sync::oneshot, task::JoinHandle};

use reco_domain::GenerationId;
use reco_models::{CancelFlag, Hyperparameters, ModelGeneration};
use reco_store::FeatureSnapshot;

use crate::{Error, Result};

/// Produces a generation from a snapshot. Runs on a blocking thread; implementations should
/// check `cancel` between iterations.
pub trait ModelTrainer
where
	Self: Send + Sync,
{
	fn train(
		&self,
		generation_id: GenerationId,
		snapshot: &FeatureSnapshot,
		hyperparameters: &Hyperparameters,
		cancel: &CancelFlag,
	) -> reco_models::Result<ModelGeneration>;
}

/// ALS candidates, BPR ranking and the content index, trained in that order.
#[derive(Clone, Copy, Debug, Default)]
pub struct HybridTrainer;
impl ModelTrainer for HybridTrainer {
	fn train(
		&self,
		generation_id: GenerationId,
		snapshot: &FeatureSnapshot,
		hyperparameters: &Hyperparameters,
		cancel: &CancelFlag,
	) -> reco_models::Result<ModelGeneration> {
		ModelGeneration::train(generation_id, snapshot, hyperparameters, cancel)
	}
}

/// Latest training outcome, broadcast to subscribers.
#[derive(Clone, Debug, PartialEq)]
pub enum TrainingEvent {
	Idle,
	Started { generation_id: GenerationId },
	Ready { generation_id: GenerationId },
	Failed { generation_id: GenerationId, message: String },
	Cancelled { generation_id: GenerationId },
}

pub(crate) struct TrainingJob {
	pub(crate) reply: oneshot::Sender<Result<GenerationId>>,
}

/// Completion handle for one queued retrain.
#[derive(Debug)]
pub struct TrainingTicket {
	pub(crate) receiver: oneshot::Receiver<Result<GenerationId>>,
}
impl TrainingTicket {
	pub async fn wait(self) -> Result<GenerationId> {
		self.receiver.await.map_err(|_| Error::Training {
			message: "Training worker stopped before the job finished.".to_string(),
		})?
	}
}

/// Handle of the background task draining the training queue. The task ends after shutdown.
#[derive(Debug)]
pub struct TrainingWorker {
	pub(crate) handle: JoinHandle<()>,
}
impl TrainingWorker {
	pub async fn join(self) -> Result<()> {
		self.handle
			.await
			.map_err(|err| Error::Training { message: format!("Training worker failed: {err}.") })
	}

	pub fn abort(&self) {
		self.handle.abort();
	}
}
