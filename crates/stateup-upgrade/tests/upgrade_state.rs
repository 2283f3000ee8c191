use serde_json::json;
use stateup_testkit::{
    DEFAULT_REGION, ProviderDefaults, assert_identity_preserved, flat, instance_block,
    instance_descriptor, instance_v0_type, network_descriptor,
};
use stateup_types::{AttrType, Attribute, AttributePath, Block, TreeValue};
use stateup_upgrade::{
    PersistedState, SCHEMA_VERSION_KEY, SchemaDescriptor, UpgradeError, UpgradeOptions,
    upgrade_resource_state, upgrade_states,
};

fn upgrade(
    descriptor: &SchemaDescriptor,
    state: &PersistedState,
) -> Result<stateup_upgrade::UpgradeOutcome, UpgradeError> {
    upgrade_resource_state(descriptor, state, &(), &UpgradeOptions::default())
}

#[test]
fn unversioned_state_walks_the_whole_chain() {
    let state = PersistedState::new("i-1").with_attribute("name", "web");
    let outcome = upgrade(&instance_descriptor(), &state).expect("upgrade");

    assert_eq!(outcome.from_version, 0);
    assert_eq!(outcome.to_version, 2);
    assert_eq!(outcome.steps_applied, vec![0, 1]);
    assert_eq!(
        outcome.value,
        TreeValue::map([
            ("display_name", TreeValue::from("web")),
            ("region", TreeValue::from(DEFAULT_REGION)),
        ])
    );
    assert_eq!(outcome.state.id, "i-1");
    assert_eq!(
        outcome.state.attributes,
        flat(&[("display_name", "web"), ("region", DEFAULT_REGION)])
    );
    assert_eq!(outcome.state.meta[SCHEMA_VERSION_KEY], json!("2"));
}

#[test]
fn current_state_comes_back_unchanged() {
    let state = PersistedState::new("i-1")
        .with_attribute("display_name", "web")
        .with_attribute("region", "us-east-1")
        .with_schema_version("2");
    let outcome = upgrade(&instance_descriptor(), &state).expect("upgrade");
    assert!(outcome.steps_applied.is_empty());
    assert_eq!(outcome.state, state);
}

#[test]
fn unparsable_version_fails_and_leaves_input_alone() {
    let state = PersistedState::new("i-1")
        .with_attribute("name", "web")
        .with_schema_version("abc");
    let before = state.clone();
    let err = upgrade(&instance_descriptor(), &state).unwrap_err();
    assert!(matches!(err, UpgradeError::VersionParse(_)), "{err:?}");
    assert_eq!(state, before);
}

#[test]
fn non_string_version_fails() {
    let state = PersistedState::new("i-1").with_meta(SCHEMA_VERSION_KEY, json!(1));
    let err = upgrade(&instance_descriptor(), &state).unwrap_err();
    assert!(matches!(err, UpgradeError::VersionParse(_)), "{err:?}");
}

#[test]
fn chain_result_matches_directly_written_current_state() {
    let descriptor = instance_descriptor();
    let from_v0 = upgrade(
        &descriptor,
        &PersistedState::new("i-1").with_attribute("name", "web"),
    )
    .expect("upgrade v0");
    let from_v1 = upgrade(
        &descriptor,
        &PersistedState::new("i-1")
            .with_attribute("name", "web")
            .with_attribute("region", DEFAULT_REGION)
            .with_schema_version("1"),
    )
    .expect("upgrade v1");
    let direct = upgrade(
        &descriptor,
        &PersistedState::new("i-1")
            .with_attribute("display_name", "web")
            .with_attribute("region", DEFAULT_REGION)
            .with_schema_version("2"),
    )
    .expect("upgrade v2");

    assert_eq!(from_v0.value, direct.value);
    assert_eq!(from_v1.value, direct.value);
    assert_eq!(from_v0.state, direct.state);
    assert_eq!(from_v1.state, direct.state);
}

#[test]
fn provider_context_reaches_upgraders() {
    let state = PersistedState::new("i-9").with_attribute("name", "db");
    let defaults = ProviderDefaults {
        region: "eu-west-1".into(),
    };
    let outcome = upgrade_resource_state(
        &instance_descriptor(),
        &state,
        &defaults,
        &UpgradeOptions::default(),
    )
    .expect("upgrade");
    assert_eq!(outcome.value.get("region"), Some(&TreeValue::from("eu-west-1")));
}

#[test]
fn hex_encoded_version_is_understood() {
    let state = PersistedState::new("i-1")
        .with_attribute("name", "web")
        .with_attribute("region", "us-west-2")
        .with_schema_version("0x1");
    let outcome = upgrade(&instance_descriptor(), &state).expect("upgrade");
    assert_eq!(outcome.from_version, 1);
    assert_eq!(outcome.steps_applied, vec![1]);
    assert_eq!(outcome.state.meta[SCHEMA_VERSION_KEY], json!("2"));
}

#[test]
fn network_state_is_upgraded_pruned_and_normalized() {
    let state = PersistedState {
        id: "n-1".into(),
        attributes: flat(&[
            ("name", "core"),
            ("port", "443"),
            ("legacy_flag", "true"),
            ("tags.%", "1"),
            ("tags.env", "prod"),
            ("rule.#", "2"),
            ("rule.0.action", "allow"),
            ("rule.0.priority", "10"),
            ("rule.0.cidr", "10.0.0.0/8"),
            ("rule.1.action", "deny"),
            ("rule.1.priority", "20"),
        ]),
        meta: [
            (SCHEMA_VERSION_KEY.to_string(), json!("0")),
            (
                "e2bfb730-ecaa-11e6-8f88-34363bc7c4c0".to_string(),
                json!({"create": 600000000000u64}),
            ),
        ]
        .into_iter()
        .collect(),
    };
    let before = state.clone();
    let outcome = upgrade(&network_descriptor(), &state).expect("upgrade");

    assert_eq!(
        outcome.value,
        TreeValue::map([
            ("id", TreeValue::from("n-1")),
            ("name", TreeValue::from("core")),
            ("ports", TreeValue::List(vec![TreeValue::from(443i64)])),
            ("tags", TreeValue::map([("env", TreeValue::from("prod"))])),
            (
                "rule",
                TreeValue::List(vec![
                    TreeValue::map([
                        ("action", TreeValue::from("allow")),
                        ("priority", TreeValue::from(10i64)),
                        (
                            "match",
                            TreeValue::List(vec![TreeValue::map([(
                                "cidr",
                                TreeValue::from("10.0.0.0/8"),
                            )])]),
                        ),
                    ]),
                    TreeValue::map([
                        ("action", TreeValue::from("deny")),
                        ("priority", TreeValue::from(20i64)),
                        ("match", TreeValue::List(vec![])),
                    ]),
                ]),
            ),
            ("timeouts", TreeValue::Null),
        ])
    );
    assert_eq!(
        outcome.state.attributes,
        flat(&[
            ("id", "n-1"),
            ("name", "core"),
            ("ports.#", "1"),
            ("ports.0", "443"),
            ("tags.%", "1"),
            ("tags.env", "prod"),
            ("rule.#", "2"),
            ("rule.0.action", "allow"),
            ("rule.0.priority", "10"),
            ("rule.0.match.#", "1"),
            ("rule.0.match.0.cidr", "10.0.0.0/8"),
            ("rule.1.action", "deny"),
            ("rule.1.priority", "20"),
            ("rule.1.match.#", "0"),
        ])
    );
    assert_eq!(outcome.state.meta[SCHEMA_VERSION_KEY], json!("1"));
    assert_identity_preserved(&before, &outcome.state);
    assert_eq!(state, before);
}

#[test]
fn removed_attributes_never_survive() {
    let state = PersistedState::new("n-2")
        .with_attribute("name", "edge")
        .with_attribute("legacy_flag", "false");
    let outcome = upgrade(&network_descriptor(), &state).expect("upgrade");
    let fields = outcome.value.as_map().expect("object");
    let declared = network_descriptor().implied_type().clone();
    let AttrType::Object(declared) = declared else {
        panic!("implied type must be an object");
    };
    assert!(fields.keys().all(|key| declared.contains_key(key)));
    assert!(!outcome.state.attributes.contains_key("legacy_flag"));
}

#[test]
fn absent_collections_become_empty() {
    let state = PersistedState::new("n-3")
        .with_attribute("name", "edge")
        .with_schema_version("1");
    let outcome = upgrade(&network_descriptor(), &state).expect("upgrade");
    assert_eq!(outcome.value.get("ports"), Some(&TreeValue::List(vec![])));
    assert_eq!(
        outcome.value.get("tags"),
        Some(&TreeValue::map(Vec::<(String, TreeValue)>::new()))
    );
    assert_eq!(outcome.value.get("rule"), Some(&TreeValue::List(vec![])));
    assert_eq!(outcome.value.get("timeouts"), Some(&TreeValue::Null));
    for key in ["ports.#", "tags.%", "rule.#"] {
        assert_eq!(outcome.state.attributes.get(key).map(String::as_str), Some("0"), "{key}");
    }
}

#[test]
fn collection_attribute_normalization_can_be_disabled() {
    let state = PersistedState::new("n-3")
        .with_attribute("name", "edge")
        .with_schema_version("1");
    let options = UpgradeOptions {
        normalize_collection_attributes: false,
        ..UpgradeOptions::default()
    };
    let outcome =
        upgrade_resource_state(&network_descriptor(), &state, &(), &options).expect("upgrade");
    assert_eq!(outcome.value.get("ports"), Some(&TreeValue::Null));
    assert_eq!(outcome.value.get("rule"), Some(&TreeValue::List(vec![])));
}

#[test]
fn id_injection_can_be_disabled() {
    let state = PersistedState::new("n-4")
        .with_attribute("name", "edge")
        .with_schema_version("1");
    let options = UpgradeOptions {
        inject_id: false,
        ..UpgradeOptions::default()
    };
    let outcome =
        upgrade_resource_state(&network_descriptor(), &state, &(), &options).expect("upgrade");
    assert_eq!(outcome.value.get("id"), Some(&TreeValue::Null));
    assert!(!outcome.state.attributes.contains_key("id"));
    assert_eq!(outcome.state.id, "n-4");
}

#[test]
fn missing_count_marker_is_a_decode_error() {
    let state = PersistedState::new("n-5")
        .with_attribute("name", "edge")
        .with_attribute("rule.0.action", "allow")
        .with_schema_version("1");
    let err = upgrade(&network_descriptor(), &state).unwrap_err();
    assert!(matches!(err, UpgradeError::Decode(_)), "{err:?}");
}

#[test]
fn oversized_count_marker_is_a_decode_error() {
    let state = PersistedState::new("n-7")
        .with_attribute("name", "edge")
        .with_attribute("ports.#", "18446744073709551615")
        .with_schema_version("1");
    let err = upgrade(&network_descriptor(), &state).unwrap_err();
    assert!(matches!(err, UpgradeError::Decode(_)), "{err:?}");
}

#[test]
fn numbers_beyond_machine_precision_round_trip() {
    let descriptor = SchemaDescriptor::builder(
        "meter",
        0,
        Block::new()
            .attribute("big", Attribute::optional(AttrType::Number))
            .attribute("ratio", Attribute::optional(AttrType::Number)),
    )
    .build()
    .expect("build");
    let state = PersistedState::new("m-1")
        .with_attribute("big", "123456789012345678901234567890")
        .with_attribute("ratio", "0.12345678901234567890123");
    let outcome = upgrade(&descriptor, &state).expect("upgrade");
    assert_eq!(outcome.state, state);
}

#[test]
fn newer_state_is_rejected() {
    let state = PersistedState::new("n-6").with_schema_version("5");
    let err = upgrade(&network_descriptor(), &state).unwrap_err();
    assert!(
        matches!(err, UpgradeError::UnsupportedVersion { found: 5, current: 1 }),
        "{err:?}"
    );
}

#[test]
fn gap_in_chain_is_reported() {
    let descriptor = SchemaDescriptor::builder("gappy", 3, instance_block())
        .upgrade(0, instance_v0_type(), |_, v| Ok(v))
        .upgrade(2, instance_v0_type(), |_, v| Ok(v))
        .build()
        .expect("build");

    let err = upgrade(&descriptor, &PersistedState::new("g-1").with_schema_version("1"))
        .unwrap_err();
    assert!(
        matches!(err, UpgradeError::MissingUpgradeStep { version: 1, target: 3 }),
        "{err:?}"
    );

    let err = upgrade(&descriptor, &PersistedState::new("g-2")).unwrap_err();
    assert!(
        matches!(err, UpgradeError::MissingUpgradeStep { version: 1, target: 3 }),
        "{err:?}"
    );
}

#[test]
fn failing_upgrader_aborts_without_output() {
    let descriptor = SchemaDescriptor::builder("flaky", 1, instance_block())
        .upgrade(0, instance_v0_type(), |_, _| {
            Err(anyhow::anyhow!("name too long"))
        })
        .build()
        .expect("build");
    let state = PersistedState::new("f-1").with_attribute("name", "web");
    let err = upgrade(&descriptor, &state).unwrap_err();
    match err {
        UpgradeError::UpgradeStep { at_version, source } => {
            assert_eq!(at_version, 0);
            assert_eq!(source.to_string(), "name too long");
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn irreconcilable_shape_is_a_coercion_error() {
    let descriptor = SchemaDescriptor::builder("broken", 1, instance_block())
        .upgrade(0, instance_v0_type(), |_, _| {
            Ok(TreeValue::map([(
                "display_name",
                TreeValue::map([("first", TreeValue::from("a"))]),
            )]))
        })
        .build()
        .expect("build");
    let err = upgrade(&descriptor, &PersistedState::new("b-1")).unwrap_err();
    match err {
        UpgradeError::Coercion(err) => {
            assert_eq!(err.path, AttributePath::root().attr("display_name"));
            assert_eq!(err.expected, "string");
            assert_eq!(err.actual, "map");
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn legacy_flat_migration_runs_before_typed_upgraders() {
    let descriptor = SchemaDescriptor::builder("legacy", 2, instance_block())
        .legacy_migration(1, |_, mut attrs| {
            let host = attrs.remove("host").unwrap_or_default();
            attrs.insert("name".into(), host);
            attrs.insert("region".into(), "ap-south-1".into());
            Ok(attrs)
        })
        .upgrade(1, stateup_testkit::instance_v1_type(), |_, mut value| {
            if let Some(map) = value.as_map_mut() {
                let name = map.shift_remove("name").unwrap_or_default();
                map.insert("display_name".into(), name);
            }
            Ok(value)
        })
        .build()
        .expect("build");
    let state = PersistedState::new("l-1").with_attribute("host", "box");
    let outcome = upgrade(&descriptor, &state).expect("upgrade");
    assert_eq!(outcome.from_version, 0);
    assert_eq!(outcome.steps_applied, vec![1]);
    assert_eq!(
        outcome.value,
        TreeValue::map([
            ("display_name", TreeValue::from("box")),
            ("region", TreeValue::from("ap-south-1")),
        ])
    );
}

#[test]
fn version_zero_schema_leaves_meta_untouched() {
    let descriptor = SchemaDescriptor::builder("static", 0, instance_block())
        .build()
        .expect("build");
    let state = PersistedState::new("s-1")
        .with_attribute("display_name", "a")
        .with_meta("owner", json!("ops"));
    let outcome = upgrade(&descriptor, &state).expect("upgrade");
    assert_eq!(outcome.state.meta, state.meta);
    assert!(!outcome.state.meta.contains_key(SCHEMA_VERSION_KEY));

    let explicit = state.clone().with_schema_version("0");
    let outcome = upgrade(&descriptor, &explicit).expect("upgrade");
    assert_eq!(outcome.state.meta[SCHEMA_VERSION_KEY], json!("0"));
}

#[test]
fn batch_failures_are_isolated() {
    let states = vec![
        PersistedState::new("i-1").with_attribute("name", "a"),
        PersistedState::new("i-2").with_schema_version("nope"),
        PersistedState::new("i-3")
            .with_attribute("display_name", "c")
            .with_schema_version("2"),
    ];
    let results = upgrade_states(&instance_descriptor(), &states, &(), &UpgradeOptions::default());
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_ref().map(|o| o.state.id.as_str()).ok(), Some("i-1"));
    assert!(matches!(results[1], Err(UpgradeError::VersionParse(_))));
    assert_eq!(results[2].as_ref().map(|o| o.to_version).ok(), Some(2));
}

#[test]
fn concurrent_upgrades_share_one_descriptor() {
    let descriptor = instance_descriptor();
    let options = UpgradeOptions::default();
    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let descriptor = &descriptor;
                let options = &options;
                scope.spawn(move || {
                    let state = PersistedState::new(format!("i-{i}"))
                        .with_attribute("name", format!("host-{i}"));
                    let outcome =
                        upgrade_resource_state(descriptor, &state, &(), options).expect("upgrade");
                    (i, outcome)
                })
            })
            .collect();
        for handle in handles {
            let (i, outcome) = handle.join().expect("thread");
            assert_eq!(outcome.state.id, format!("i-{i}"));
            assert_eq!(
                outcome.value.get("display_name"),
                Some(&TreeValue::from(format!("host-{i}")))
            );
        }
    });
}
