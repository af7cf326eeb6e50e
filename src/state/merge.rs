// src/state/merge.rs

use serde_json::Value;

/// Merge `patch` into `target`.
///
/// Objects merge key by key, recursively. Anything else in `patch`
/// (scalars, arrays, null) replaces the value in `target`.
pub fn deep_merge(target: &mut Value, patch: Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                match target.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        target.insert(key, value);
                    }
                }
            }
        }
        (target, patch) => *target = patch,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn nested_objects_merge_and_scalars_overwrite() {
        let mut a = json!({
            "a": 0,
            "b": [{"c": 0}, {"c": 2}],
            "d": {"e": "aaa", "f": 3}
        });
        let b = json!({
            "a": 1,
            "b": [{"c": 3}],
            "d": {"e": "bbb"}
        });

        deep_merge(&mut a, b);

        assert_eq!(
            a,
            json!({"a": 1, "b": [{"c": 3}], "d": {"e": "bbb", "f": 3}})
        );
    }

    #[test]
    fn unrelated_stage_keys_survive() {
        let mut state = json!({
            "lint": {"state": "completed", "thread_id": "t1"},
            "style": {"state": "started", "client_task_id": "c2"}
        });

        deep_merge(&mut state, json!({"style": {"state": "running", "thread_id": "t2"}}));

        assert_eq!(state["lint"], json!({"state": "completed", "thread_id": "t1"}));
        assert_eq!(
            state["style"],
            json!({"state": "running", "client_task_id": "c2", "thread_id": "t2"})
        );
    }
}
