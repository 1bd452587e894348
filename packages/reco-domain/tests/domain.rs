use time::macros::datetime;

use reco_config::{SchemaSection, Slot, SlotKind};
use reco_domain::{
	Error, Fallback, FeatureKind, FeatureSchema, GenerationId, Interaction, ItemId,
	RecommendationResult, ScoredItem, UserId, cmp_scored,
};

fn result_with(items: Vec<ScoredItem>) -> RecommendationResult {
	RecommendationResult {
		user_id: UserId(1),
		items,
		generation_id: Some(GenerationId(3)),
		computed_at: datetime!(2026-01-01 00:00 UTC),
		is_cold_start: false,
		fallback: None,
	}
}

#[test]
fn negative_strength_is_rejected() {
	let err = Interaction::new(UserId(1), ItemId(2), -0.5, datetime!(2026-01-01 00:00 UTC))
		.expect_err("Expected validation error.");

	assert!(matches!(err, Error::Validation { .. }));
}

#[test]
fn non_finite_strength_is_rejected() {
	for strength in [f32::NAN, f32::INFINITY] {
		assert!(Interaction::new(UserId(1), ItemId(2), strength, datetime!(2026-01-01 00:00 UTC))
			.is_err());
	}
}

#[test]
fn zero_strength_is_allowed() {
	assert!(Interaction::new(UserId(1), ItemId(2), 0.0, datetime!(2026-01-01 00:00 UTC)).is_ok());
}

#[test]
fn interactions_serialize_timestamps_as_rfc3339() {
	let interaction =
		Interaction::new(UserId(7), ItemId(9), 2.5, datetime!(2026-03-04 05:06:07 UTC))
			.expect("Interaction must be valid.");
	let json = serde_json::to_value(&interaction).expect("Failed to serialize interaction.");

	assert_eq!(json["timestamp"], "2026-03-04T05:06:07Z");
	assert_eq!(json["user_id"], 7);

	let parsed: Interaction = serde_json::from_value(json).expect("Failed to parse interaction.");

	assert_eq!(parsed, interaction);
}

#[test]
fn schema_is_built_from_config_in_slot_order() {
	let section = SchemaSection {
		version: 5,
		slots: vec![
			Slot { name: "a".to_string(), kind: SlotKind::Binary },
			Slot { name: "b".to_string(), kind: SlotKind::Numeric },
		],
	};
	let schema = FeatureSchema::from_config(&section);

	assert_eq!(schema.version, 5);
	assert_eq!(schema.slots[0].kind, FeatureKind::Binary);
	assert_eq!(schema.slots[1].name, "b");
	assert_eq!(schema.zero_view().values, vec![0.0, 0.0]);
}

#[test]
fn schema_rejects_wrong_length() {
	let schema = FeatureSchema::empty(1);
	let err = schema.check_values(&[1.0]).expect_err("Expected mismatch.");

	assert!(matches!(err, Error::FeatureMismatch { .. }));
}

#[test]
fn invariants_accept_ties_and_reject_duplicates() {
	let ok = result_with(vec![
		ScoredItem { item_id: ItemId(1), score: 0.9 },
		ScoredItem { item_id: ItemId(2), score: 0.9 },
		ScoredItem { item_id: ItemId(3), score: 0.1 },
	]);

	assert!(ok.check_invariants().is_ok());

	let duplicate = result_with(vec![
		ScoredItem { item_id: ItemId(1), score: 0.9 },
		ScoredItem { item_id: ItemId(1), score: 0.5 },
	]);

	assert!(duplicate.check_invariants().is_err());

	let increasing = result_with(vec![
		ScoredItem { item_id: ItemId(1), score: 0.1 },
		ScoredItem { item_id: ItemId(2), score: 0.5 },
	]);

	assert!(increasing.check_invariants().is_err());
}

#[test]
fn ordering_breaks_ties_by_lower_item_id() {
	let mut items = vec![
		ScoredItem { item_id: ItemId(9), score: 1.0 },
		ScoredItem { item_id: ItemId(4), score: 1.0 },
		ScoredItem { item_id: ItemId(2), score: f32::NAN },
		ScoredItem { item_id: ItemId(7), score: 3.0 },
	];

	items.sort_by(cmp_scored);

	let ids: Vec<u64> = items.iter().map(|item| item.item_id.0).collect();

	assert_eq!(ids, vec![7, 4, 9, 2]);
}

#[test]
fn fallback_serializes_in_snake_case() {
	let mut result = result_with(Vec::new());

	result.fallback = Some(Fallback::Timeout);

	let json = serde_json::to_value(&result).expect("Failed to serialize result.");

	assert_eq!(json["fallback"], "timeout");
	assert_eq!(json["generation_id"], 3);
}
