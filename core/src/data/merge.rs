use serde_json::Value;

/// Merge `overrides` into `base`. Maps merge key by key, recursively; any
/// other override value (scalar, sequence, null) replaces what was there.
pub fn deep_merge(base: &mut Value, overrides: &Value) {
    match (base, overrides) {
        (Value::Object(base_map), Value::Object(over_map)) => {
            for (key, over_value) in over_map {
                match base_map.get_mut(key) {
                    Some(existing) if existing.is_object() && over_value.is_object() => {
                        deep_merge(existing, over_value);
                    }
                    _ => {
                        base_map.insert(key.clone(), over_value.clone());
                    }
                }
            }
        }
        (base, over) => *base = over.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test] fn merge_overrides_scalar() {
        let mut base = json!({"hbase": {"version": "2.4.0", "user": "hbase"}});
        deep_merge(&mut base, &json!({"hbase": {"version": "2.5.8"}}));
        assert_eq!(base["hbase"]["version"], "2.5.8");
        assert_eq!(base["hbase"]["user"], "hbase");
    }
    #[test] fn merge_recurses_into_maps() {
        let mut base = json!({"hbase": {"config": {"a": 1, "b": 2}}});
        deep_merge(&mut base, &json!({"hbase": {"config": {"b": 3, "c": 4}}}));
        assert_eq!(base["hbase"]["config"], json!({"a": 1, "b": 3, "c": 4}));
    }
    #[test] fn merge_replaces_sequences() {
        let mut base = json!({"rs": ["a", "b"]});
        deep_merge(&mut base, &json!({"rs": ["c"]}));
        assert_eq!(base["rs"], json!(["c"]));
    }
    #[test] fn merge_map_over_scalar() {
        let mut base = json!({"java_home": null});
        deep_merge(&mut base, &json!({"java_home": {"x": 1}}));
        assert_eq!(base["java_home"], json!({"x": 1}));
    }
    #[test] fn merge_adds_new_top_level_keys() {
        let mut base = json!({"hbase": {}});
        deep_merge(&mut base, &json!({"platform": {"family": "debian"}}));
        assert_eq!(base["platform"]["family"], "debian");
        assert!(base["hbase"].is_object());
    }
    #[test] fn merge_empty_overrides_is_noop() {
        let mut base = json!({"a": {"b": 1}});
        deep_merge(&mut base, &json!({}));
        assert_eq!(base, json!({"a": {"b": 1}}));
    }
}
