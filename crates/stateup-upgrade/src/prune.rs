use stateup_types::{AttrType, AttributePath, TreeValue};

/// Drop every object key that `ty` no longer declares, recursing through
/// collections. Returns the pruned value and the paths that were removed.
///
/// Shape mismatches are left alone for the coercer to report.
pub fn remove_attributes(value: TreeValue, ty: &AttrType) -> (TreeValue, Vec<AttributePath>) {
    let mut removed = Vec::new();
    let value = prune_at(value, ty, &AttributePath::root(), &mut removed);
    (value, removed)
}

fn prune_at(
    value: TreeValue,
    ty: &AttrType,
    path: &AttributePath,
    removed: &mut Vec<AttributePath>,
) -> TreeValue {
    match (value, ty) {
        (TreeValue::Map(entries), AttrType::Object(fields)) => TreeValue::Map(
            entries
                .into_iter()
                .filter_map(|(name, item)| match fields.get(&name) {
                    Some(field_ty) => {
                        let item = prune_at(item, field_ty, &path.attr(name.as_str()), removed);
                        Some((name, item))
                    }
                    None => {
                        removed.push(path.attr(name));
                        None
                    }
                })
                .collect(),
        ),
        (TreeValue::Map(entries), AttrType::Map(elem)) => TreeValue::Map(
            entries
                .into_iter()
                .map(|(key, item)| {
                    let item = prune_at(item, elem, &path.key(key.as_str()), removed);
                    (key, item)
                })
                .collect(),
        ),
        (TreeValue::List(items), AttrType::List(elem) | AttrType::Set(elem)) => TreeValue::List(
            items
                .into_iter()
                .enumerate()
                .map(|(i, item)| prune_at(item, elem, &path.index(i), removed))
                .collect(),
        ),
        // A single block still wrapped in a list from an older encoding.
        (TreeValue::List(items), AttrType::Object(_)) => TreeValue::List(
            items
                .into_iter()
                .enumerate()
                .map(|(i, item)| prune_at(item, ty, &path.index(i), removed))
                .collect(),
        ),
        (value, _) => value,
    }
}
