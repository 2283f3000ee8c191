//! Fixture schemas and helpers shared by the upgrade pipeline's integration tests.

use anyhow::{Context, anyhow};
use stateup_types::{AttrType, Attribute, Block, NestedBlock, TreeValue};
use stateup_upgrade::{FlatAttributes, PersistedState, SchemaDescriptor, UpgradeContext};

pub const INSTANCE: &str = "example_instance";
pub const NETWORK: &str = "example_network";
pub const DEFAULT_REGION: &str = "us-east-1";

/// Provider-level context handed to upgraders of the instance fixture.
#[derive(Debug, Clone)]
pub struct ProviderDefaults {
    pub region: String,
}

pub fn flat(pairs: &[(&str, &str)]) -> FlatAttributes {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub fn instance_v0_type() -> AttrType {
    AttrType::object([("name", AttrType::String)])
}

pub fn instance_v1_type() -> AttrType {
    AttrType::object([("name", AttrType::String), ("region", AttrType::String)])
}

pub fn instance_block() -> Block {
    Block::new()
        .attribute("display_name", Attribute::required(AttrType::String))
        .attribute("region", Attribute::optional(AttrType::String))
}

/// Version 2 instance schema: 0 -> 1 adds `region`, 1 -> 2 renames `name` to
/// `display_name`. The region default comes from [`ProviderDefaults`] when the
/// caller passes one, `us-east-1` otherwise.
pub fn instance_descriptor() -> SchemaDescriptor {
    SchemaDescriptor::builder(INSTANCE, 2, instance_block())
        .upgrade(0, instance_v0_type(), add_region)
        .upgrade(1, instance_v1_type(), rename_name)
        .build()
        .expect("instance fixture schema is valid")
}

fn add_region(ctx: &UpgradeContext<'_>, mut value: TreeValue) -> anyhow::Result<TreeValue> {
    let region = ctx
        .provider::<ProviderDefaults>()
        .map_or(DEFAULT_REGION, |defaults| defaults.region.as_str());
    let map = value
        .as_map_mut()
        .ok_or_else(|| anyhow!("expected object at version {}", ctx.version()))?;
    let slot = map.entry("region".to_string()).or_default();
    if slot.is_null() {
        *slot = TreeValue::from(region);
    }
    Ok(value)
}

fn rename_name(ctx: &UpgradeContext<'_>, mut value: TreeValue) -> anyhow::Result<TreeValue> {
    let map = value
        .as_map_mut()
        .ok_or_else(|| anyhow!("expected object at version {}", ctx.version()))?;
    let name = map.shift_remove("name").unwrap_or_default();
    map.insert("display_name".to_string(), name);
    Ok(value)
}

pub fn network_v0_type() -> AttrType {
    AttrType::object([
        ("id", AttrType::String),
        ("name", AttrType::String),
        ("port", AttrType::Number),
        ("legacy_flag", AttrType::Bool),
        ("tags", AttrType::map(AttrType::String)),
        (
            "rule",
            AttrType::list(AttrType::object([
                ("action", AttrType::String),
                ("priority", AttrType::Number),
                ("cidr", AttrType::String),
            ])),
        ),
    ])
}

pub fn network_block() -> Block {
    let rule = Block::new()
        .attribute("action", Attribute::required(AttrType::String))
        .attribute("priority", Attribute::optional(AttrType::Number))
        .block(
            "match",
            NestedBlock::set(Block::new().attribute("cidr", Attribute::required(AttrType::String))),
        );
    Block::new()
        .attribute("id", Attribute::computed(AttrType::String))
        .attribute("name", Attribute::required(AttrType::String))
        .attribute("ports", Attribute::optional(AttrType::set(AttrType::Number)))
        .attribute("tags", Attribute::optional(AttrType::map(AttrType::String)))
        .block("rule", NestedBlock::list(rule))
        .block(
            "timeouts",
            NestedBlock::single(Block::new().attribute("create", Attribute::optional(AttrType::String))),
        )
}

/// Version 1 network schema. The 0 -> 1 step turns the scalar `port` into the
/// `ports` set and moves each rule's `cidr` into a nested `match` block.
/// `legacy_flag` is left behind for the pruner.
pub fn network_descriptor() -> SchemaDescriptor {
    SchemaDescriptor::builder(NETWORK, 1, network_block())
        .upgrade(0, network_v0_type(), upgrade_network_v0)
        .build()
        .expect("network fixture schema is valid")
}

fn upgrade_network_v0(_: &UpgradeContext<'_>, mut value: TreeValue) -> anyhow::Result<TreeValue> {
    let map = value.as_map_mut().context("network state must be an object")?;

    let port = map.shift_remove("port").unwrap_or_default();
    if !port.is_null() {
        map.insert("ports".to_string(), TreeValue::List(vec![port]));
    }

    if let Some(TreeValue::List(rules)) = map.get_mut("rule") {
        for rule in rules.iter_mut() {
            let rule = rule.as_map_mut().context("rule must be an object")?;
            let cidr = rule.shift_remove("cidr").unwrap_or_default();
            let matches = if cidr.is_null() {
                Vec::new()
            } else {
                vec![TreeValue::map([("cidr", cidr)])]
            };
            rule.insert("match".to_string(), TreeValue::List(matches));
        }
    }
    Ok(value)
}

/// Assert that `after` kept `before`'s id and every meta key except `schema_version`.
pub fn assert_identity_preserved(before: &PersistedState, after: &PersistedState) {
    assert_eq!(after.id, before.id, "id must be preserved");
    for (key, value) in &before.meta {
        if key == stateup_upgrade::SCHEMA_VERSION_KEY {
            continue;
        }
        assert_eq!(after.meta.get(key), Some(value), "meta key '{key}' must be preserved");
    }
}
