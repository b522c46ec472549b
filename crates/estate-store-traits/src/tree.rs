//! Helpers for JSON trees shared by store implementations.
//!
//! The tree root is `Value::Null` when empty. Objects never hold `null`
//! children or empty objects: writing `null` deletes, and emptied parents
//! disappear with it.

use serde_json::{Map, Value};

use crate::StorePath;

/// Node at `path`, if any.
pub fn node_at<'a>(root: &'a Value, path: &StorePath) -> Option<&'a Value> {
    let mut node = root;
    for segment in path.segments() {
        node = node.as_object()?.get(segment)?;
    }
    if node.is_null() { None } else { Some(node) }
}

/// Write `value` at `path`, deleting when `value` is `null`.
pub fn write_at(root: &mut Value, path: &StorePath, value: Value) {
    write_segments(root, path.segments(), value);
}

fn write_segments(node: &mut Value, segments: &[String], value: Value) {
    let Some((head, rest)) = segments.split_first() else {
        *node = prune(value);
        return;
    };
    if !node.is_object() {
        if value.is_null() {
            return;
        }
        *node = Value::Object(Map::new());
    }
    if let Value::Object(map) = node {
        let child = map.entry(head.clone()).or_insert(Value::Null);
        write_segments(child, rest, value);
        if child.is_null() {
            map.remove(head);
        }
        if map.is_empty() {
            *node = Value::Null;
        }
    }
}

/// Drop `null` children and empty objects, recursively.
pub fn prune(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let pruned: Map<String, Value> = map
                .into_iter()
                .map(|(k, v)| (k, prune(v)))
                .filter(|(_, v)| !v.is_null())
                .collect();
            if pruned.is_empty() {
                Value::Null
            } else {
                Value::Object(pruned)
            }
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn p(raw: &str) -> StorePath {
        StorePath::parse(raw).unwrap()
    }

    #[test]
    fn writes_create_intermediate_nodes() {
        let mut root = Value::Null;
        write_at(&mut root, &p("a/b/c"), json!(1));
        assert_eq!(root, json!({"a": {"b": {"c": 1}}}));
        assert_eq!(node_at(&root, &p("a/b")), Some(&json!({"c": 1})));
        assert_eq!(node_at(&root, &p("a/x")), None);
    }

    #[test]
    fn null_write_deletes_and_prunes_parents() {
        let mut root = json!({"a": {"b": {"c": 1}}, "z": true});
        write_at(&mut root, &p("a/b/c"), Value::Null);
        assert_eq!(root, json!({"z": true}));
        write_at(&mut root, &p("z"), Value::Null);
        assert_eq!(root, Value::Null);
    }

    #[test]
    fn deleting_missing_path_is_noop() {
        let mut root = json!({"a": 1});
        write_at(&mut root, &p("b/c"), Value::Null);
        assert_eq!(root, json!({"a": 1}));
    }

    #[test]
    fn written_values_are_pruned() {
        let mut root = Value::Null;
        write_at(
            &mut root,
            &p("room"),
            json!({"id": "r", "lastRead": null, "participants": {}}),
        );
        assert_eq!(root, json!({"room": {"id": "r"}}));
    }

    #[test]
    fn root_write_replaces_everything() {
        let mut root = json!({"a": 1});
        write_at(&mut root, &StorePath::root(), json!({"b": 2}));
        assert_eq!(root, json!({"b": 2}));
        assert_eq!(node_at(&root, &StorePath::root()), Some(&json!({"b": 2})));
    }
}
