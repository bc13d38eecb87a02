//! Single-penalty rule across rubric criteria.
//!
//! A recommendation is charged to exactly one criterion: the highest-ranked
//! one (see [`CriterionName::HIERARCHY`]) that proposed it.

use super::CriterionName;
use serde_json::Value;
use std::collections::HashSet;

fn priority_rank(criterion: &Value) -> usize {
    criterion
        .get("name")
        .and_then(Value::as_str)
        .map(|name| CriterionName::parse(name).rank())
        .unwrap_or(CriterionName::UNRANKED)
}

/// Sort criteria by priority and strip recommendations already claimed by a
/// higher-priority criterion.
///
/// Recommendations are compared after trimming; blank and non-string ones
/// are discarded. Non-object criteria are dropped and a non-list
/// `recommendations` field is reset to `[]`. Running this on its own output
/// is a no-op.
pub fn enforce_single_penalty(mut record: Value) -> Value {
    if let Some(Value::Array(criteria)) = record.get_mut("criteria") {
        let mut ordered: Vec<Value> = std::mem::take(criteria)
            .into_iter()
            .filter(Value::is_object)
            .collect();
        // stable: unknown names keep their encountered order
        ordered.sort_by_key(priority_rank);

        let mut claimed: HashSet<String> = HashSet::new();
        for criterion in ordered.iter_mut() {
            let Value::Object(fields) = criterion else {
                continue;
            };
            let kept: Vec<Value> = match fields.get("recommendations") {
                Some(Value::Array(recommendations)) => recommendations
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::trim)
                    .filter(|rec| !rec.is_empty() && claimed.insert((*rec).to_string()))
                    .map(|rec| Value::String(rec.to_string()))
                    .collect(),
                _ => Vec::new(),
            };
            fields.insert("recommendations".to_string(), Value::Array(kept));
        }

        *criteria = ordered;
    }
    record
}
