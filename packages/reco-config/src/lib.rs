mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Cache, Config, Evaluation, Fusion, Ranking, Schema, SchemaSection, Service, Slot, SlotKind,
	Training,
};

use std::{collections::HashSet, fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.log_level.is_empty() {
		return Err(Error::Validation { message: "service.log_level must be non-empty.".to_string() });
	}
	if cfg.service.request_budget_ms == 0 {
		return Err(Error::Validation {
			message: "service.request_budget_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.service.keep_generations == 0 {
		return Err(Error::Validation {
			message: "service.keep_generations must be greater than zero.".to_string(),
		});
	}

	validate_training(&cfg.training)?;
	validate_ranking(&cfg.ranking)?;
	validate_fusion(&cfg.fusion)?;

	if cfg.cache.ttl_ms == 0 {
		return Err(Error::Validation {
			message: "cache.ttl_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.cache.max_entries == 0 {
		return Err(Error::Validation {
			message: "cache.max_entries must be greater than zero.".to_string(),
		});
	}

	validate_schema("schema.user", &cfg.schema.user)?;
	validate_schema("schema.item", &cfg.schema.item)?;

	let holdout = cfg.evaluation.holdout_fraction;

	if !holdout.is_finite() || holdout <= 0.0 || holdout >= 1.0 {
		return Err(Error::Validation {
			message: "evaluation.holdout_fraction must be between 0.0 and 1.0, exclusive."
				.to_string(),
		});
	}
	if cfg.evaluation.min_interactions < 2 {
		return Err(Error::Validation {
			message: "evaluation.min_interactions must be at least 2.".to_string(),
		});
	}
	if cfg.evaluation.k == 0 {
		return Err(Error::Validation {
			message: "evaluation.k must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn validate_training(training: &Training) -> Result<()> {
	if training.dims == 0 {
		return Err(Error::Validation {
			message: "training.dims must be greater than zero.".to_string(),
		});
	}
	if training.iterations == 0 {
		return Err(Error::Validation {
			message: "training.iterations must be greater than zero.".to_string(),
		});
	}
	if !training.regularization.is_finite() || training.regularization <= 0.0 {
		return Err(Error::Validation {
			message: "training.regularization must be a finite number greater than zero."
				.to_string(),
		});
	}
	if !training.alpha.is_finite() || training.alpha < 0.0 {
		return Err(Error::Validation {
			message: "training.alpha must be a finite number, zero or greater.".to_string(),
		});
	}
	if !training.early_stop_tolerance.is_finite() || training.early_stop_tolerance < 0.0 {
		return Err(Error::Validation {
			message: "training.early_stop_tolerance must be a finite number, zero or greater."
				.to_string(),
		});
	}
	if training.patience == 0 {
		return Err(Error::Validation {
			message: "training.patience must be greater than zero.".to_string(),
		});
	}
	if !training.max_init_scale.is_finite() || training.max_init_scale <= 0.0 {
		return Err(Error::Validation {
			message: "training.max_init_scale must be a finite number greater than zero."
				.to_string(),
		});
	}
	if !training.max_strength.is_finite() || training.max_strength <= 0.0 {
		return Err(Error::Validation {
			message: "training.max_strength must be a finite number greater than zero."
				.to_string(),
		});
	}

	Ok(())
}

fn validate_ranking(ranking: &Ranking) -> Result<()> {
	if ranking.factors == 0 {
		return Err(Error::Validation {
			message: "ranking.factors must be greater than zero.".to_string(),
		});
	}
	if ranking.epochs == 0 {
		return Err(Error::Validation {
			message: "ranking.epochs must be greater than zero.".to_string(),
		});
	}
	if !ranking.learning_rate.is_finite() || ranking.learning_rate <= 0.0 {
		return Err(Error::Validation {
			message: "ranking.learning_rate must be a finite number greater than zero."
				.to_string(),
		});
	}
	if !ranking.regularization.is_finite() || ranking.regularization < 0.0 {
		return Err(Error::Validation {
			message: "ranking.regularization must be a finite number, zero or greater."
				.to_string(),
		});
	}
	if ranking.negatives_per_positive == 0 {
		return Err(Error::Validation {
			message: "ranking.negatives_per_positive must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn validate_fusion(fusion: &Fusion) -> Result<()> {
	for (label, weight) in [
		("fusion.collaborative_weight", fusion.collaborative_weight),
		("fusion.content_weight", fusion.content_weight),
	] {
		if !weight.is_finite() {
			return Err(Error::Validation { message: format!("{label} must be a finite number.") });
		}
		if weight < 0.0 {
			return Err(Error::Validation { message: format!("{label} must be zero or greater.") });
		}
	}

	if fusion.collaborative_weight + fusion.content_weight <= 0.0 {
		return Err(Error::Validation {
			message: "fusion weights must sum to a value greater than zero.".to_string(),
		});
	}
	if fusion.candidate_pool_factor == 0 {
		return Err(Error::Validation {
			message: "fusion.candidate_pool_factor must be greater than zero.".to_string(),
		});
	}
	if !(0.0..=1.0).contains(&fusion.similar_content_weight) {
		return Err(Error::Validation {
			message: "fusion.similar_content_weight must be in the range 0.0-1.0.".to_string(),
		});
	}

	Ok(())
}

fn validate_schema(label: &str, section: &SchemaSection) -> Result<()> {
	let mut names = HashSet::new();

	for slot in &section.slots {
		if slot.name.is_empty() {
			return Err(Error::Validation {
				message: format!("{label}.slots names must be non-empty."),
			});
		}
		if !names.insert(slot.name.as_str()) {
			return Err(Error::Validation {
				message: format!("{label}.slots contains duplicate slot {}.", slot.name),
			});
		}
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	cfg.service.log_level = cfg.service.log_level.trim().to_string();

	for slot in cfg.schema.user.slots.iter_mut().chain(cfg.schema.item.slots.iter_mut()) {
		slot.name = slot.name.trim().to_string();
	}
}
