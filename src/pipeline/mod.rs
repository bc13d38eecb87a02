//! End-to-end scoring of one sample.

pub mod analysis;
pub mod refine;
pub mod validation;

pub use analysis::AnalysisPipeline;
pub use refine::{LoopOutcome, LoopSettings, RefinementLoop, RefinementRun};
pub use validation::{ValidationPipeline, ValidationResult};

use crate::assessment::Assessment;
use crate::detect::{self, Language, PrecheckConfig};
use crate::llm::TextGenerator;
use crate::product::{ProductMatch, ProductResolver, ResolvedVia};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// Raw input for one scoring request.
#[derive(Debug, Clone)]
pub struct SampleInput {
    pub code: String,
    pub provenance_url: Option<String>,
}

/// Everything computed once per sample before the loop starts.
#[derive(Debug, Clone)]
pub struct SampleContext {
    pub code: String,
    pub cleaned_code: String,
    pub language: Language,
    /// Sorted, unique.
    pub region_tags: Vec<String>,
    pub provenance_url: Option<String>,
    pub product: ProductMatch,
}

#[derive(Debug, Clone, Copy)]
pub struct PrepareOptions {
    pub precheck: PrecheckConfig,
    pub allow_generative_category: bool,
}

impl Default for PrepareOptions {
    fn default() -> Self {
        Self {
            precheck: PrecheckConfig::default(),
            allow_generative_category: true,
        }
    }
}

/// Detect, gate, clean and resolve the product for a sample.
pub async fn prepare_sample(
    input: SampleInput,
    resolver: &ProductResolver,
    options: &PrepareOptions,
) -> Result<SampleContext> {
    let SampleInput {
        code,
        provenance_url,
    } = input;
    let provenance_url = provenance_url.filter(|u| !u.trim().is_empty());

    let detection = detect::detect(
        Arc::from(code.as_str()),
        provenance_url.as_deref().map(Arc::from),
    )
    .await;
    detection.precheck(&options.precheck)?;
    tracing::info!(
        language = %detection.language,
        region_tags = detection.region_tags.len(),
        "sample detected"
    );

    let cleaned_code = detect::strip_comments(&code, detection.language);
    let joined_tags = detection.region_tags.join(",");
    let product = resolver
        .resolve(
            &cleaned_code,
            provenance_url.as_deref(),
            Some(joined_tags.as_str()),
            options.allow_generative_category,
        )
        .await;
    tracing::info!(
        category = %product.category,
        product = %product.product,
        resolved_via = ?product.resolved_via,
        "product resolved"
    );

    Ok(SampleContext {
        code,
        cleaned_code,
        language: detection.language,
        region_tags: detection.region_tags,
        provenance_url,
        product,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisSection {
    pub language: Language,
    pub region_tags: Vec<String>,
    pub product_category: String,
    pub product_name: String,
    pub resolved_via: ResolvedVia,
    #[serde(flatten)]
    pub assessment: Assessment,
}

/// Output document for one scored sample.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub analysis: AnalysisSection,
    pub validation_history: Vec<ValidationResult>,
    pub outcome: LoopOutcome,
    pub iterations: u32,
}

impl AnalysisReport {
    pub fn new(ctx: SampleContext, run: RefinementRun) -> Self {
        Self {
            run_id: run.run_id,
            generated_at: Utc::now(),
            analysis: AnalysisSection {
                language: ctx.language,
                region_tags: ctx.region_tags,
                product_category: ctx.product.category,
                product_name: ctx.product.product,
                resolved_via: ctx.product.resolved_via,
                assessment: run.assessment,
            },
            validation_history: run.history,
            outcome: run.outcome,
            iterations: run.iterations,
        }
    }
}

/// Wires detection, product resolution and the refinement loop together.
pub struct HealthScorer {
    analysis: AnalysisPipeline,
    validation: ValidationPipeline,
    resolver: ProductResolver,
    settings: LoopSettings,
    options: PrepareOptions,
}

impl HealthScorer {
    pub fn new(generator: Arc<dyn TextGenerator>, resolver: ProductResolver) -> Self {
        Self {
            analysis: AnalysisPipeline::new(Arc::clone(&generator)),
            validation: ValidationPipeline::new(generator),
            resolver,
            settings: LoopSettings::default(),
            options: PrepareOptions::default(),
        }
    }

    pub fn with_settings(mut self, settings: LoopSettings) -> Self {
        self.settings = LoopSettings::new(settings.max_loops, settings.threshold);
        self
    }

    pub fn with_options(mut self, options: PrepareOptions) -> Self {
        self.options = options;
        self
    }

    pub async fn score(&self, input: SampleInput) -> Result<AnalysisReport> {
        let ctx = prepare_sample(input, &self.resolver, &self.options).await?;
        let run = RefinementLoop::new(&self.analysis, &self.validation, self.settings)
            .run(&ctx)
            .await?;
        Ok(AnalysisReport::new(ctx, run))
    }
}
