use serde_json::{Map, Value};

/// Shallow merge of `patch` into `target`. Null values in `patch` are
/// skipped so an absent vendor field never erases stored metadata.
pub fn merge_object(target: &mut Value, patch: Value) {
    let Value::Object(patch) = patch else {
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(target) = target {
        for (key, value) in patch {
            if !value.is_null() {
                target.insert(key, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::merge_object;

    #[test]
    fn newer_values_win_and_nulls_are_ignored() {
        let mut target = json!({ "sessionUrl": "https://a", "code": 9103 });
        merge_object(&mut target, json!({ "code": 9001, "reason": null }));
        assert_eq!(target, json!({ "sessionUrl": "https://a", "code": 9001 }));
    }

    #[test]
    fn non_object_target_is_replaced() {
        let mut target = json!(null);
        merge_object(&mut target, json!({ "submittedAt": "now" }));
        assert_eq!(target, json!({ "submittedAt": "now" }));
    }
}
