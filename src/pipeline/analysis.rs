use super::SampleContext;
use crate::assessment::{finalize_text, Assessment};
use crate::llm::{prompts, GenerationRequest, Model, Purpose, TextGenerator};
use anyhow::{Context, Result};
use std::sync::Arc;

/// One analysis pass: free-form review, structured formatting, post-processing.
pub struct AnalysisPipeline {
    generator: Arc<dyn TextGenerator>,
}

impl AnalysisPipeline {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Produce a candidate assessment, folding in validator feedback when present.
    ///
    /// Unusable formatter output yields an empty assessment; only generation
    /// failures are errors.
    pub async fn analyze(&self, ctx: &SampleContext, feedback: Option<&str>) -> Result<Assessment> {
        let review_request = GenerationRequest::new(
            Purpose::Review,
            Model::Smart,
            prompts::REVIEW_SYSTEM,
            prompts::review_prompt(
                &ctx.cleaned_code,
                ctx.language.as_str(),
                &ctx.product.product,
                &ctx.region_tags,
                feedback,
            ),
        );
        let review = self
            .generator
            .generate(review_request)
            .await
            .context("Review generation failed")?;

        let format_request = GenerationRequest::new(
            Purpose::Format,
            Model::Speed,
            prompts::FORMAT_SYSTEM,
            prompts::formatting_prompt(&review),
        )
        .with_schema("assessment", prompts::assessment_schema());
        let formatted = self
            .generator
            .generate(format_request)
            .await
            .context("Structured formatting failed")?;

        let assessment = finalize_text(&formatted);
        if assessment.is_empty() {
            tracing::warn!("formatter output held no usable assessment");
        }
        tracing::debug!(
            overall_score = assessment.overall_score,
            criteria = assessment.criteria.len(),
            "analysis pass complete"
        );
        Ok(assessment)
    }
}
