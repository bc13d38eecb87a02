use super::SampleContext;
use crate::assessment::{extract_text, lenient_int, Assessment};
use crate::llm::{prompts, GenerationRequest, Model, Purpose, TextGenerator};
use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

pub const MIN_VALIDATION_SCORE: u8 = 1;
pub const MAX_VALIDATION_SCORE: u8 = 10;

/// Validator verdict on one candidate assessment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub score: u8,
    pub reasoning: String,
}

impl ValidationResult {
    fn failed(err: &anyhow::Error) -> Self {
        Self {
            score: MIN_VALIDATION_SCORE,
            reasoning: format!("Validation failed: {:#}", err),
        }
    }
}

/// Fact-check the assessment against the code, then score it.
pub struct ValidationPipeline {
    generator: Arc<dyn TextGenerator>,
}

impl ValidationPipeline {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Never fails: transport errors and malformed verdicts become a
    /// minimum-score result whose reasoning names the failure.
    pub async fn validate(&self, ctx: &SampleContext, assessment: &Assessment) -> ValidationResult {
        match self.try_validate(ctx, assessment).await {
            Ok(result) => result,
            Err(err) => {
                tracing::warn!(
                    error = %format!("{:#}", err),
                    "validation degraded to minimum score"
                );
                ValidationResult::failed(&err)
            }
        }
    }

    async fn try_validate(
        &self,
        ctx: &SampleContext,
        assessment: &Assessment,
    ) -> Result<ValidationResult> {
        let assessment_json =
            serde_json::to_string_pretty(assessment).context("Failed to serialize assessment")?;

        let audit = self
            .generator
            .generate(GenerationRequest::new(
                Purpose::FactCheck,
                Model::Smart,
                prompts::FACT_CHECK_SYSTEM,
                prompts::fact_check_prompt(&ctx.code, &assessment_json),
            ))
            .await
            .context("Fact-check generation failed")?;

        let formatted = self
            .generator
            .generate(
                GenerationRequest::new(
                    Purpose::ValidationFormat,
                    Model::Speed,
                    prompts::VALIDATION_FORMAT_SYSTEM,
                    prompts::validation_format_prompt(&audit),
                )
                .with_schema("validation", prompts::validation_schema()),
            )
            .await
            .context("Validation formatting failed")?;

        parse_validation(&formatted)
    }
}

/// Read `{validation_score, reasoning}` from formatter output, clamping the score.
pub fn parse_validation(text: &str) -> Result<ValidationResult> {
    let record = extract_text(text);
    let score = record
        .get("validation_score")
        .and_then(lenient_int)
        .ok_or_else(|| anyhow!("validation response has no usable validation_score"))?;
    let reasoning = match record.get("reasoning") {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };
    Ok(ValidationResult {
        score: score.clamp(i64::from(MIN_VALIDATION_SCORE), i64::from(MAX_VALIDATION_SCORE)) as u8,
        reasoning,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_validation_clamps_score() {
        let high = parse_validation(r#"{"validation_score": 14, "reasoning": "fine"}"#).unwrap();
        assert_eq!(high.score, 10);
        let low = parse_validation(r#"{"validation_score": "0", "reasoning": "bad"}"#).unwrap();
        assert_eq!(low.score, 1);
        assert_eq!(low.reasoning, "bad");
    }

    #[test]
    fn test_parse_validation_tolerates_fences_and_missing_reasoning() {
        let result = parse_validation("```json\n{validation_score: 8,}\n```").unwrap();
        assert_eq!(result, ValidationResult { score: 8, reasoning: String::new() });
    }

    #[test]
    fn test_parse_validation_without_score_is_error() {
        assert!(parse_validation(r#"{"reasoning": "no score"}"#).is_err());
        assert!(parse_validation("nonsense").is_err());
    }

    #[test]
    fn test_failed_result_names_cause() {
        let err = anyhow!("connection reset").context("Fact-check generation failed");
        let result = ValidationResult::failed(&err);
        assert_eq!(result.score, MIN_VALIDATION_SCORE);
        assert!(result.reasoning.contains("Fact-check generation failed"));
        assert!(result.reasoning.contains("connection reset"));
    }
}
