use std::{fs, path::PathBuf, sync::Arc};

use clap::Parser;
use color_eyre::eyre;
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use reco_config::Config;
use reco_domain::{Entity, FeatureSchema, GenerationId, Interaction, ItemId};
use reco_models::{
	CancelFlag, EvaluationReport, Hyperparameters, ModelGeneration, TrainingSummary, evaluate,
};
use reco_service::{HybridTrainer, RecommenderService};
use reco_store::{FeatureSnapshot, FeatureStore};

#[derive(Debug, Parser)]
#[command(
	version = reco_cli::VERSION,
	rename_all = "kebab",
	styles = reco_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
	/// JSON lines of `{ user_id, item_id, strength, timestamp }`.
	#[arg(long, short = 'i', value_name = "FILE")]
	pub interactions: PathBuf,
	/// JSON lines of `{ item_id, values }` following the configured item schema.
	#[arg(long, value_name = "FILE")]
	pub item_features: Option<PathBuf>,
	/// Where to write the exported generation blob.
	#[arg(long, short = 'o', value_name = "FILE")]
	pub output: Option<PathBuf>,
	/// Also train on a holdout split and report precision, recall and F1 at k.
	#[arg(long)]
	pub evaluate: bool,
}

#[derive(Debug, Deserialize)]
struct ItemFeatures {
	item_id: ItemId,
	values: Vec<f32>,
}

#[derive(Debug, Serialize)]
struct TrainerOutput {
	generation_id: GenerationId,
	summary: TrainingSummary,
	evaluation: Option<EvaluationReport>,
	output: Option<PathBuf>,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = reco_config::load(&args.config)?;
	let filter = EnvFilter::new(config.service.log_level.clone());

	tracing_subscriber::fmt().with_env_filter(filter).init();

	let store = FeatureStore::new(
		FeatureSchema::from_config(&config.schema.user),
		FeatureSchema::from_config(&config.schema.item),
	);
	let interactions = parse_lines::<Interaction>(&fs::read_to_string(&args.interactions)?)?;

	for event in &interactions {
		store.record_interaction(event.user_id, event.item_id, event.strength, event.timestamp)?;
	}

	if let Some(path) = &args.item_features {
		for row in parse_lines::<ItemFeatures>(&fs::read_to_string(path)?)? {
			store.update_features(Entity::Item(row.item_id), row.values)?;
		}
	}

	tracing::info!(interactions = interactions.len(), "Interactions loaded.");

	let store = Arc::new(store);
	let evaluation =
		if args.evaluate { Some(run_evaluation(&config, &store.snapshot())?) } else { None };
	let service = RecommenderService::new(&config, Arc::clone(&store), Arc::new(HybridTrainer))?;
	let worker = service.spawn_training_worker()?;
	let generation_id = service.request_retrain()?.wait().await?;
	let generation = service.generation(generation_id)?;

	if let Some(path) = &args.output {
		fs::write(path, service.export_generation(generation_id)?)?;

		tracing::info!(path = %path.display(), %generation_id, "Generation exported.");
	}

	let output = TrainerOutput {
		generation_id,
		summary: generation.summary.clone(),
		evaluation,
		output: args.output.clone(),
	};

	println!("{}", serde_json::to_string_pretty(&output)?);

	service.shutdown();
	worker.join().await?;

	Ok(())
}

fn run_evaluation(
	config: &Config,
	snapshot: &FeatureSnapshot,
) -> color_eyre::Result<EvaluationReport> {
	let holdout = evaluate::holdout_split(
		snapshot,
		config.evaluation.holdout_fraction,
		config.evaluation.min_interactions as usize,
		config.training.seed,
	);

	if holdout.is_empty() {
		return Err(eyre::eyre!(
			"No user has at least {} interactions; nothing to evaluate.",
			config.evaluation.min_interactions
		));
	}

	let training = holdout.training_snapshot(snapshot);
	let generation = ModelGeneration::train(
		GenerationId(0),
		&training,
		&Hyperparameters::from_config(config),
		&CancelFlag::new(),
	)?;

	Ok(evaluate::evaluate(&generation, &training, &holdout, config.evaluation.k as usize))
}

/// Parses JSON lines, skipping blank ones. Errors name the 1-based line.
fn parse_lines<T>(raw: &str) -> color_eyre::Result<Vec<T>>
where
	T: for<'de> Deserialize<'de>,
{
	raw.lines()
		.enumerate()
		.filter(|(_, line)| !line.trim().is_empty())
		.map(|(idx, line)| {
			serde_json::from_str(line)
				.map_err(|err| eyre::eyre!("Line {} is not a valid record: {err}.", idx + 1))
		})
		.collect()
}
