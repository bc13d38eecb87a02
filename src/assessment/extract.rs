//! Lenient recovery of JSON objects from generator output.
//!
//! Generated text arrives wrapped in markdown fences, with trailing commas,
//! bare keys or smart quotes. Everything here is total: a caller either gets
//! an object map back or an empty one.

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

/// A JSON object as produced by the extractor.
pub type Record = Map<String, Value>;

fn fenced_object_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)```(?:json)?\s*(\{[\s\S]*?\})\s*```")
            .expect("static fenced-block regex")
    })
}

/// Coerce an arbitrary value into an object map.
///
/// Objects pass through unchanged, strings are parsed (fence-aware, strict
/// then lenient), anything else becomes an empty map.
pub fn extract(raw: &Value) -> Record {
    match raw {
        Value::Object(map) => map.clone(),
        Value::String(text) => extract_text(text),
        _ => Record::new(),
    }
}

/// Parse generator text into an object map, or an empty map on failure.
pub fn extract_text(text: &str) -> Record {
    let candidate = fenced_object_re()
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or(text);

    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(map)) => return map,
        Ok(_) => return Record::new(),
        Err(_) => {}
    }

    let repaired = repair_json(candidate);
    match serde_json::from_str::<Value>(&repaired) {
        Ok(Value::Object(map)) => map,
        _ => Record::new(),
    }
}

/// Rewrite common generator mistakes into strict JSON.
///
/// Handles trailing commas, unquoted object keys, single-quoted strings,
/// typographic quotes and stray control characters. String contents are
/// left untouched.
pub(crate) fn repair_json(input: &str) -> String {
    let chars: Vec<char> = input
        .chars()
        .map(|c| match c {
            '\u{201C}' | '\u{201D}' => '"',
            '\u{2018}' | '\u{2019}' => '\'',
            other => other,
        })
        .collect();

    let mut out = String::with_capacity(input.len() + 16);
    let mut i = 0usize;
    // Last significant character emitted outside of a string literal.
    let mut last_significant: Option<char> = None;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '"' | '\'' => {
                let (literal, next) = read_string_literal(&chars, i);
                out.push_str(&literal);
                last_significant = Some('"');
                i = next;
            }
            ',' => {
                let next = next_significant(&chars, i + 1);
                if !matches!(next, Some('}') | Some(']')) {
                    out.push(',');
                    last_significant = Some(',');
                }
                i += 1;
            }
            c if is_ident_start(c) && matches!(last_significant, Some('{') | Some(',')) => {
                let start = i;
                while i < chars.len() && is_ident_continue(chars[i]) {
                    i += 1;
                }
                let ident: String = chars[start..i].iter().collect();
                if next_significant(&chars, i) == Some(':') {
                    out.push('"');
                    out.push_str(&ident);
                    out.push('"');
                } else {
                    out.push_str(&ident);
                }
                last_significant = Some('a');
            }
            c if c.is_control() && !matches!(c, '\n' | '\t' | '\r') => {
                i += 1;
            }
            c => {
                out.push(c);
                if !c.is_whitespace() {
                    last_significant = Some(c);
                }
                i += 1;
            }
        }
    }

    out
}

/// Read a quoted literal starting at `start`, re-emitting it double-quoted.
/// Returns the literal and the index just past the closing quote.
fn read_string_literal(chars: &[char], start: usize) -> (String, usize) {
    let quote = chars[start];
    let mut literal = String::from('"');
    let mut i = start + 1;
    let mut escaped = false;

    while i < chars.len() {
        let c = chars[i];
        i += 1;
        if escaped {
            if quote == '\'' && c == '\'' {
                literal.push('\'');
            } else {
                literal.push('\\');
                literal.push(c);
            }
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            c if c == quote => {
                literal.push('"');
                return (literal, i);
            }
            '"' => literal.push_str("\\\""),
            '\n' => literal.push_str("\\n"),
            '\t' => literal.push_str("\\t"),
            '\r' => {}
            c if c.is_control() => {}
            c => literal.push(c),
        }
    }

    // Unterminated literal: close it so the parser reports a clean error later.
    literal.push('"');
    (literal, i)
}

fn next_significant(chars: &[char], from: usize) -> Option<char> {
    chars[from.min(chars.len())..]
        .iter()
        .copied()
        .find(|c| !c.is_whitespace())
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '-')
}

/// Legacy wire names emitted by older formatting prompts, mapped to the
/// canonical record keys.
const TOP_LEVEL_ALIASES: &[(&str, &str)] = &[
    ("criteria_breakdown", "criteria"),
    ("overall_compliance_score", "overall_score"),
    ("llm_fix_summary_for_code_generation", "fix_summary"),
    ("identified_generic_problem_categories", "problem_categories"),
];

const CRITERION_ALIASES: &[(&str, &str)] = &[
    ("criterion_name", "name"),
    ("evaluation", "assessment_text"),
    ("evaluation_details", "structured_detail"),
    ("recommendations_for_llm_fix", "recommendations"),
    ("generic_problem_categories", "problem_categories"),
];

const CITATION_ALIASES: &[(&str, &str)] = &[("citation_number", "number")];

fn rename_keys(map: &mut Record, aliases: &[(&str, &str)]) {
    for (legacy, canonical) in aliases {
        if map.contains_key(*canonical) {
            continue;
        }
        if let Some(value) = map.remove(*legacy) {
            map.insert((*canonical).to_string(), value);
        }
    }
}

/// Rename legacy keys to canonical ones, top level and per entry.
///
/// Canonical keys win when both spellings are present. Non-object input is
/// returned unchanged.
pub fn canonicalize_keys(record: Value) -> Value {
    let Value::Object(mut map) = record else {
        return record;
    };

    rename_keys(&mut map, TOP_LEVEL_ALIASES);

    if let Some(Value::Array(criteria)) = map.get_mut("criteria") {
        for entry in criteria.iter_mut() {
            if let Value::Object(criterion) = entry {
                rename_keys(criterion, CRITERION_ALIASES);
            }
        }
    }
    if let Some(Value::Array(citations)) = map.get_mut("citations") {
        for entry in citations.iter_mut() {
            if let Value::Object(citation) = entry {
                rename_keys(citation, CITATION_ALIASES);
            }
        }
    }

    Value::Object(map)
}
