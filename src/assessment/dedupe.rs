use serde_json::Value;
use std::collections::HashSet;

/// Drop repeated criteria, keeping the first entry for each name.
///
/// Entries that are not objects or carry no string `name` are discarded.
/// Input without a `criteria` list comes back untouched.
pub fn dedupe_criteria(mut record: Value) -> Value {
    if let Some(Value::Array(criteria)) = record.get_mut("criteria") {
        let mut seen: HashSet<String> = HashSet::new();
        criteria.retain(|entry| {
            let Some(name) = entry.get("name").and_then(Value::as_str) else {
                return false;
            };
            !name.is_empty() && seen.insert(name.to_string())
        });
    }
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_first_occurrence_wins() {
        let record = json!({
            "criteria": [
                {"name": "x", "score": 1},
                {"name": "x", "score": 2}
            ]
        });
        let out = dedupe_criteria(record);
        assert_eq!(out["criteria"], json!([{"name": "x", "score": 1}]));
    }

    #[test]
    fn test_preserves_relative_order() {
        let record = json!({
            "criteria": [
                {"name": "b"}, {"name": "a"}, {"name": "b"}, {"name": "c"}, {"name": "a"}
            ]
        });
        let names: Vec<_> = dedupe_criteria(record)["criteria"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_drops_malformed_entries() {
        let record = json!({
            "criteria": ["oops", 3, null, {"score": 10}, {"name": "ok"}]
        });
        assert_eq!(dedupe_criteria(record)["criteria"], json!([{"name": "ok"}]));
    }

    #[test]
    fn test_missing_or_non_list_criteria_unchanged() {
        let no_criteria = json!({"overall_score": 5});
        assert_eq!(dedupe_criteria(no_criteria.clone()), no_criteria);

        let scalar = json!({"criteria": "not a list"});
        assert_eq!(dedupe_criteria(scalar.clone()), scalar);

        assert_eq!(dedupe_criteria(json!(42)), json!(42));
        assert_eq!(dedupe_criteria(Value::Null), Value::Null);
    }
}
