//! Shallow configuration merge used by script resolution.

use super::node::{Map, Node};

/// Merge maps left to right; later layers win.
///
/// When both sides hold a map under the same key the inner maps are merged
/// key by key (one level deep). Any other value replaces the earlier one.
pub fn merge_maps(layers: &[&Map]) -> Map {
    let mut merged = Map::new();
    for layer in layers {
        for (key, value) in layer.iter() {
            if let (Some(Node::Map(existing)), Node::Map(incoming)) = (merged.get_mut(key), value)
            {
                for (inner_key, inner_value) in incoming {
                    existing.insert(inner_key.clone(), inner_value.clone());
                }
                continue;
            }
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

/// One-entry map, used to wrap a direct command as `{args: ...}`.
pub(crate) fn single(key: &str, value: &Node) -> Map {
    let mut map = Map::new();
    map.insert(key.to_string(), value.clone());
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(json: &str) -> Map {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn later_layers_win() {
        let base = map(r#"{"cwd": ".", "shell": "bash -c"}"#);
        let over = map(r#"{"cwd": "sub"}"#);
        let merged = merge_maps(&[&base, &over]);
        assert_eq!(merged["cwd"].as_str(), Some("sub"));
        assert_eq!(merged["shell"].as_str(), Some("bash -c"));
    }

    #[test]
    fn nested_maps_merge_one_level() {
        let base = map(r#"{"env": {"A": "1", "B": "1"}}"#);
        let over = map(r#"{"env": {"B": "2", "C": "3"}}"#);
        let merged = merge_maps(&[&base, &over]);
        let env = merged["env"].as_map().unwrap();
        assert_eq!(env["A"].as_str(), Some("1"));
        assert_eq!(env["B"].as_str(), Some("2"));
        assert_eq!(env["C"].as_str(), Some("3"));
    }

    #[test]
    fn non_map_replaces_map() {
        let base = map(r#"{"install": {"args": "a"}}"#);
        let over = map(r#"{"install": "b"}"#);
        let merged = merge_maps(&[&base, &over]);
        assert_eq!(merged["install"].as_str(), Some("b"));
    }
}
