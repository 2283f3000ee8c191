use indexmap::IndexMap;
use stateup_types::{AttrType, Block, NestedBlock, NestingMode, TreeValue};

/// Replace absent nested blocks with their empty collection so consumers never
/// have to tell "declared but empty" from "never recorded". With
/// `collection_attributes` set, absent list/set/map attributes are filled too.
/// Present values are left as they are.
pub fn normalize_value(value: TreeValue, block: &Block, collection_attributes: bool) -> TreeValue {
    let TreeValue::Map(mut entries) = value else {
        return value;
    };

    if collection_attributes {
        for (name, attr) in &block.attributes {
            let Some(empty) = empty_collection(&attr.ty) else {
                continue;
            };
            let slot = entries.entry(name.clone()).or_default();
            if slot.is_null() {
                *slot = empty;
            }
        }
    }

    for (name, nested) in &block.block_types {
        let current = entries.shift_remove(name).unwrap_or_default();
        let normalized = normalize_nested(current, nested, collection_attributes);
        entries.insert(name.clone(), normalized);
    }

    TreeValue::Map(entries)
}

fn normalize_nested(value: TreeValue, nested: &NestedBlock, collection_attributes: bool) -> TreeValue {
    if value.is_null() {
        return match nested.nesting {
            NestingMode::Group => {
                normalize_value(TreeValue::Map(IndexMap::new()), &nested.block, collection_attributes)
            }
            _ => nested.empty_value().unwrap_or_default(),
        };
    }
    match (nested.nesting, value) {
        (NestingMode::Single | NestingMode::Group, value) => {
            normalize_value(value, &nested.block, collection_attributes)
        }
        (NestingMode::List | NestingMode::Set, TreeValue::List(items)) => TreeValue::List(
            items
                .into_iter()
                .map(|item| normalize_value(item, &nested.block, collection_attributes))
                .collect(),
        ),
        (NestingMode::Map, TreeValue::Map(entries)) => TreeValue::Map(
            entries
                .into_iter()
                .map(|(key, item)| (key, normalize_value(item, &nested.block, collection_attributes)))
                .collect(),
        ),
        (_, value) => value,
    }
}

fn empty_collection(ty: &AttrType) -> Option<TreeValue> {
    match ty {
        AttrType::List(_) | AttrType::Set(_) => Some(TreeValue::List(Vec::new())),
        AttrType::Map(_) => Some(TreeValue::Map(IndexMap::new())),
        _ => None,
    }
}
