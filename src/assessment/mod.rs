//! Rubric assessment model and post-processing.
//!
//! Generator output flows through [`finalize`]:
//! extract → canonicalize keys → dedupe criteria → single-penalty hierarchy →
//! typed [`Assessment`]. Every stage is total, so a completely unusable
//! response ends up as an empty assessment rather than an error.

pub mod dedupe;
pub mod extract;
pub mod hierarchy;

pub use dedupe::dedupe_criteria;
pub use extract::{canonicalize_keys, extract, extract_text, Record};
pub use hierarchy::enforce_single_penalty;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::HashSet;

/// Rubric dimension identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CriterionName {
    RunnabilityAndConfiguration,
    ApiEffectivenessAndCorrectness,
    LanguageBestPractices,
    FormattingAndConsistency,
    CommentsAndCodeClarity,
    LlmTrainingFitnessAndExplicitness,
    Other(String),
}

impl CriterionName {
    /// Penalty priority, highest first.
    pub const HIERARCHY: [CriterionName; 6] = [
        CriterionName::RunnabilityAndConfiguration,
        CriterionName::ApiEffectivenessAndCorrectness,
        CriterionName::LanguageBestPractices,
        CriterionName::FormattingAndConsistency,
        CriterionName::CommentsAndCodeClarity,
        CriterionName::LlmTrainingFitnessAndExplicitness,
    ];

    /// Rank given to names outside the hierarchy.
    pub const UNRANKED: usize = Self::HIERARCHY.len();

    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "runnability_and_configuration" => Self::RunnabilityAndConfiguration,
            "api_effectiveness_and_correctness" => Self::ApiEffectivenessAndCorrectness,
            "language_best_practices" => Self::LanguageBestPractices,
            "formatting_and_consistency" => Self::FormattingAndConsistency,
            "comments_and_code_clarity" => Self::CommentsAndCodeClarity,
            "llm_training_fitness_and_explicitness" => Self::LlmTrainingFitnessAndExplicitness,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::RunnabilityAndConfiguration => "runnability_and_configuration",
            Self::ApiEffectivenessAndCorrectness => "api_effectiveness_and_correctness",
            Self::LanguageBestPractices => "language_best_practices",
            Self::FormattingAndConsistency => "formatting_and_consistency",
            Self::CommentsAndCodeClarity => "comments_and_code_clarity",
            Self::LlmTrainingFitnessAndExplicitness => "llm_training_fitness_and_explicitness",
            Self::Other(name) => name,
        }
    }

    /// Position in [`Self::HIERARCHY`]; unknown names rank last.
    pub fn rank(&self) -> usize {
        Self::HIERARCHY
            .iter()
            .position(|known| known == self)
            .unwrap_or(Self::UNRANKED)
    }
}

impl std::fmt::Display for CriterionName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for CriterionName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for CriterionName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckStatus {
    Pass,
    Fail,
    #[serde(rename = "NA")]
    NotApplicable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Declared {
    Yes,
    No,
    #[serde(rename = "NA")]
    NotApplicable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntaxValidity {
    pub is_valid: bool,
    pub reasoning: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyManagement {
    pub has_dependencies: bool,
    pub are_declared: Declared,
    pub reasoning: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationManagement {
    pub uses_env_vars: bool,
    pub are_documented: Declared,
    pub reasoning: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardcodedValues {
    pub contains_hardcoded_values: bool,
    pub details: String,
}

/// Structured checks attached to the runnability criterion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnabilityChecks {
    pub syntax_validity: SyntaxValidity,
    pub dependency_management: DependencyManagement,
    pub configuration_management: ConfigurationManagement,
    pub hardcoded_values: HardcodedValues,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckDetail {
    pub status: CheckStatus,
    pub reasoning: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiCallEvaluation {
    pub method_existence_check: CheckDetail,
    pub parameter_check: CheckDetail,
    pub response_handling_check: CheckDetail,
    pub error_handling_check: CheckDetail,
}

/// One call site examined by the API-correctness criterion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiCallAnalysis {
    pub method_name: String,
    pub line_number: u32,
    pub evaluation: ApiCallEvaluation,
}

/// Criterion-specific detail payload.
///
/// Known kinds get their record shape; anything that does not fit is kept
/// as opaque text so no information is lost.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CriterionDetail {
    Runnability(Box<RunnabilityChecks>),
    ApiCalls(Vec<ApiCallAnalysis>),
    Text(String),
}

impl Default for CriterionDetail {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl CriterionDetail {
    fn from_value(name: &CriterionName, value: Option<&Value>) -> Self {
        let Some(value) = value else {
            return Self::default();
        };
        match (name, value) {
            (_, Value::Null) => Self::default(),
            (_, Value::String(text)) => Self::Text(text.clone()),
            (CriterionName::RunnabilityAndConfiguration, Value::Object(_)) => {
                serde_json::from_value::<RunnabilityChecks>(value.clone())
                    .map(|checks| Self::Runnability(Box::new(checks)))
                    .unwrap_or_else(|_| Self::Text(value.to_string()))
            }
            (CriterionName::ApiEffectivenessAndCorrectness, Value::Array(_)) => {
                serde_json::from_value::<Vec<ApiCallAnalysis>>(value.clone())
                    .map(Self::ApiCalls)
                    .unwrap_or_else(|_| Self::Text(value.to_string()))
            }
            _ => Self::Text(value.to_string()),
        }
    }
}

/// One scored rubric dimension.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Criterion {
    pub name: CriterionName,
    pub score: u8,
    pub weight: f64,
    pub assessment_text: String,
    pub structured_detail: CriterionDetail,
    pub recommendations: Vec<String>,
    pub problem_categories: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub number: u32,
    pub url: String,
}

/// Structured verdict for one code sample.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Assessment {
    pub overall_score: u8,
    pub criteria: Vec<Criterion>,
    pub fix_summary: Vec<String>,
    pub problem_categories: Vec<String>,
    pub citations: Vec<Citation>,
}

impl Assessment {
    /// Build a typed assessment from a post-processed record.
    ///
    /// Tolerates wrong field types: numbers may arrive as strings, lists may
    /// contain junk. Criteria without a string name and repeated names are
    /// skipped so the uniqueness invariant holds for any input.
    pub fn from_record(record: &Record) -> Self {
        let mut seen = HashSet::new();
        let criteria = record
            .get("criteria")
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(Value::as_object)
                    .filter_map(criterion_from_record)
                    .filter(|c| seen.insert(c.name.clone()))
                    .collect()
            })
            .unwrap_or_default();

        let citations = record
            .get("citations")
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(Value::as_object)
                    .filter_map(|c| {
                        let url = c.get("url").and_then(Value::as_str)?.trim().to_string();
                        let number = c.get("number").and_then(lenient_int)?;
                        Some(Citation {
                            number: number.clamp(0, i64::from(u32::MAX)) as u32,
                            url,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            overall_score: record
                .get("overall_score")
                .and_then(lenient_int)
                .map(clamp_score)
                .unwrap_or(0),
            criteria,
            fix_summary: unique_strings(record.get("fix_summary")),
            problem_categories: unique_strings(record.get("problem_categories")),
            citations,
        }
    }

    /// True when the generator produced nothing usable.
    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty() && self.fix_summary.is_empty() && self.overall_score == 0
    }

    pub fn criterion(&self, name: &CriterionName) -> Option<&Criterion> {
        self.criteria.iter().find(|c| &c.name == name)
    }

    /// All recommendations across criteria, in priority order.
    pub fn recommendations(&self) -> impl Iterator<Item = &str> {
        self.criteria
            .iter()
            .flat_map(|c| c.recommendations.iter().map(String::as_str))
    }
}

fn criterion_from_record(fields: &Record) -> Option<Criterion> {
    let name = CriterionName::parse(fields.get("name")?.as_str()?);
    let structured_detail = CriterionDetail::from_value(&name, fields.get("structured_detail"));
    Some(Criterion {
        score: fields
            .get("score")
            .and_then(lenient_int)
            .map(clamp_score)
            .unwrap_or(0),
        weight: fields.get("weight").and_then(lenient_float).unwrap_or(0.0),
        assessment_text: fields
            .get("assessment_text")
            .map(text_of)
            .unwrap_or_default(),
        structured_detail,
        recommendations: unique_strings(fields.get("recommendations")),
        problem_categories: unique_strings(fields.get("problem_categories")),
        name,
    })
}

fn clamp_score(value: i64) -> u8 {
    value.clamp(0, 100) as u8
}

pub(crate) fn lenient_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f.round() as i64))
        }
        _ => None,
    }
}

/// Finite floats only; `"NaN"` and `"inf"` strings count as missing.
fn lenient_float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|f| f.is_finite())
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn unique_strings(value: Option<&Value>) -> Vec<String> {
    let mut seen = HashSet::new();
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty() && seen.insert(s.to_string()))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Run the full post-processing chain on raw generator output.
pub fn finalize(raw: &Value) -> Assessment {
    let record = Value::Object(extract(raw));
    let record = canonicalize_keys(record);
    let record = dedupe_criteria(record);
    let record = enforce_single_penalty(record);
    match record {
        Value::Object(map) => Assessment::from_record(&map),
        _ => Assessment::default(),
    }
}

/// [`finalize`] for generator text.
pub fn finalize_text(text: &str) -> Assessment {
    finalize(&Value::String(text.to_string()))
}
