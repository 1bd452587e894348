use std::{
	env, fs,
	path::PathBuf,
	sync::atomic::{AtomicU64, Ordering},
	time::{SystemTime, UNIX_EPOCH},
};

use toml::Value;

use reco_config::{Config, Error, SlotKind};

const SAMPLE_CONFIG_TOML: &str = include_str!("fixtures/sample_config.toml");

fn sample_toml_with(section: &str, key: &str, value: Value) -> String {
	let mut root: Value = toml::from_str(SAMPLE_CONFIG_TOML).expect("Failed to parse sample config.");
	let table = root.as_table_mut().expect("Sample config must be a table.");
	let section = table
		.get_mut(section)
		.and_then(Value::as_table_mut)
		.expect("Sample config must include the requested section.");

	section.insert(key.to_string(), value);

	toml::to_string(&root).expect("Failed to render sample config.")
}

fn write_temp_config(payload: String) -> PathBuf {
	static COUNTER: AtomicU64 = AtomicU64::new(0);

	let nanos = SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.expect("System time must be valid.")
		.as_nanos();
	let ordinal = COUNTER.fetch_add(1, Ordering::SeqCst);
	let pid = std::process::id();
	let mut path = env::temp_dir();

	path.push(format!("reco_config_test_{nanos}_{pid}_{ordinal}.toml"));

	fs::write(&path, payload).expect("Failed to write test config.");

	path
}

fn base_config() -> Config {
	toml::from_str(SAMPLE_CONFIG_TOML).expect("Failed to parse test config.")
}

#[test]
fn sample_config_loads() {
	let path = write_temp_config(SAMPLE_CONFIG_TOML.to_string());
	let result = reco_config::load(&path);

	fs::remove_file(&path).expect("Failed to remove test config.");

	let cfg = result.expect("Sample config must be valid.");

	assert_eq!(cfg.training.dims, 8);
	assert_eq!(cfg.schema.item.slots.len(), 3);
	assert_eq!(cfg.schema.user.slots[1].kind, SlotKind::Binary);
	assert_eq!(cfg.service.keep_generations, 3);
}

#[test]
fn defaults_fill_optional_keys() {
	let mut root: Value = toml::from_str(SAMPLE_CONFIG_TOML).expect("Failed to parse sample config.");
	let table = root.as_table_mut().expect("Sample config must be a table.");

	for (section, key) in [
		("service", "keep_generations"),
		("training", "patience"),
		("fusion", "candidate_pool_factor"),
		("cache", "max_entries"),
	] {
		table
			.get_mut(section)
			.and_then(Value::as_table_mut)
			.expect("Section must exist.")
			.remove(key);
	}

	let cfg: Config = toml::from_str(&toml::to_string(&root).expect("Failed to render config."))
		.expect("Failed to parse config without optional keys.");

	assert_eq!(cfg.service.keep_generations, 4);
	assert_eq!(cfg.training.patience, 2);
	assert_eq!(cfg.fusion.candidate_pool_factor, 4);
	assert_eq!(cfg.cache.max_entries, 100_000);
	assert!(reco_config::validate(&cfg).is_ok());
}

#[test]
fn missing_file_reports_path() {
	let path = env::temp_dir().join("reco_config_test_missing.toml");
	let err = reco_config::load(&path).expect_err("Expected read error.");

	assert!(matches!(err, Error::ReadConfig { .. }), "Unexpected error: {err}");
}

#[test]
fn malformed_toml_is_a_parse_error() {
	let path = write_temp_config("[service\nlog_level = ".to_string());
	let result = reco_config::load(&path);

	fs::remove_file(&path).expect("Failed to remove test config.");

	assert!(matches!(result, Err(Error::ParseConfig { .. })));
}

#[test]
fn regularization_must_be_positive() {
	let payload = sample_toml_with("training", "regularization", Value::Float(0.0));
	let path = write_temp_config(payload);
	let result = reco_config::load(&path);

	fs::remove_file(&path).expect("Failed to remove test config.");

	let err = result.expect_err("Expected regularization validation error.");

	assert!(
		err.to_string().contains("training.regularization must be a finite number greater than zero."),
		"Unexpected error: {err}"
	);
}

#[test]
fn max_strength_must_be_positive() {
	let payload = sample_toml_with("training", "max_strength", Value::Float(0.0));
	let path = write_temp_config(payload);
	let result = reco_config::load(&path);

	fs::remove_file(&path).expect("Failed to remove test config.");

	let err = result.expect_err("Expected max_strength validation error.");

	assert!(
		err.to_string().contains("training.max_strength must be a finite number greater than zero."),
		"Unexpected error: {err}"
	);
}

#[test]
fn cache_ttl_must_be_positive() {
	let payload = sample_toml_with("cache", "ttl_ms", Value::Integer(0));
	let path = write_temp_config(payload);
	let result = reco_config::load(&path);

	fs::remove_file(&path).expect("Failed to remove test config.");

	let err = result.expect_err("Expected cache TTL validation error.");

	assert!(
		err.to_string().contains("cache.ttl_ms must be greater than zero."),
		"Unexpected error: {err}"
	);
}

#[test]
fn fusion_weights_cannot_both_be_zero() {
	let mut cfg = base_config();

	cfg.fusion.collaborative_weight = 0.0;
	cfg.fusion.content_weight = 0.0;

	let err = reco_config::validate(&cfg).expect_err("Expected fusion weight validation error.");

	assert!(
		err.to_string().contains("fusion weights must sum to a value greater than zero."),
		"Unexpected error: {err}"
	);
}

#[test]
fn fusion_weights_must_be_non_negative_and_finite() {
	let mut cfg = base_config();

	cfg.fusion.content_weight = -0.5;

	let err = reco_config::validate(&cfg).expect_err("Expected negative weight error.");

	assert!(err.to_string().contains("fusion.content_weight must be zero or greater."));

	cfg = base_config();
	cfg.fusion.collaborative_weight = f32::NAN;

	let err = reco_config::validate(&cfg).expect_err("Expected non-finite weight error.");

	assert!(err.to_string().contains("fusion.collaborative_weight must be a finite number."));
}

#[test]
fn duplicate_schema_slots_are_rejected() {
	let mut cfg = base_config();
	let duplicate = cfg.schema.item.slots[0].clone();

	cfg.schema.item.slots.push(duplicate);

	let err = reco_config::validate(&cfg).expect_err("Expected duplicate slot error.");

	assert!(
		err.to_string().contains("schema.item.slots contains duplicate slot price."),
		"Unexpected error: {err}"
	);
}

#[test]
fn holdout_fraction_must_be_exclusive_unit_interval() {
	for fraction in [0.0_f32, 1.0, -0.1, f32::INFINITY] {
		let mut cfg = base_config();

		cfg.evaluation.holdout_fraction = fraction;

		assert!(
			reco_config::validate(&cfg).is_err(),
			"Holdout fraction {fraction} must be rejected."
		);
	}
}

#[test]
fn slot_names_are_trimmed_on_load() {
	let mut root: Value = toml::from_str(SAMPLE_CONFIG_TOML).expect("Failed to parse sample config.");
	let slots = root
		.get_mut("schema")
		.and_then(|schema| schema.get_mut("user"))
		.and_then(|user| user.get_mut("slots"))
		.and_then(Value::as_array_mut)
		.expect("Sample config must include user slots.");

	if let Some(slot) = slots.first_mut().and_then(Value::as_table_mut) {
		slot.insert("name".to_string(), Value::String("  tenure_years ".to_string()));
	}

	let path = write_temp_config(toml::to_string(&root).expect("Failed to render config."));
	let result = reco_config::load(&path);

	fs::remove_file(&path).expect("Failed to remove test config.");

	let cfg = result.expect("Config with padded slot names must load.");

	assert_eq!(cfg.schema.user.slots[0].name, "tenure_years");
}
