use super::{ProductCatalog, ProductMatch, ResolvedVia, UNCATEGORIZED};
use crate::assessment::{extract_text, Record};
use crate::llm::{prompts, GenerationRequest, Model, Purpose, TextGenerator};
use crate::util::truncate_str;
use anyhow::Result;
use serde_json::Value;
use std::sync::Arc;

/// Resolves the product a sample belongs to.
///
/// Rules are tried on the provenance URL, then on the region tags. The
/// generative classifier only runs when neither matched.
#[derive(Clone)]
pub struct ProductResolver {
    catalog: Arc<ProductCatalog>,
    generator: Option<Arc<dyn TextGenerator>>,
}

impl ProductResolver {
    pub fn new(catalog: Arc<ProductCatalog>) -> Self {
        Self {
            catalog,
            generator: None,
        }
    }

    pub fn with_generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn catalog(&self) -> &ProductCatalog {
        &self.catalog
    }

    /// Rule match only; `None` when no keyword hits.
    pub fn match_rules(&self, haystack: &str) -> Option<ProductMatch> {
        self.catalog.find(haystack).map(ProductMatch::from_entry)
    }

    pub async fn resolve(
        &self,
        code: &str,
        provenance_url: Option<&str>,
        region_tag: Option<&str>,
        allow_generative_fallback: bool,
    ) -> ProductMatch {
        let rule_inputs = [("url", provenance_url), ("region_tag", region_tag)];
        for (source, input) in rule_inputs {
            let Some(input) = input.filter(|s| !s.trim().is_empty()) else {
                continue;
            };
            if let Some(found) = self.match_rules(input) {
                tracing::debug!(source, product = %found.product, "product resolved by rule");
                return found;
            }
        }

        if !allow_generative_fallback || code.trim().is_empty() {
            return ProductMatch::uncategorized();
        }
        let Some(generator) = self.generator.as_ref() else {
            return ProductMatch::uncategorized();
        };

        match self.classify(generator.as_ref(), code).await {
            Ok(Some(found)) => {
                tracing::debug!(product = %found.product, "product resolved by classifier");
                found
            }
            Ok(None) => ProductMatch::uncategorized(),
            Err(err) => {
                tracing::warn!(error = %err, "product classification failed");
                ProductMatch::uncategorized()
            }
        }
    }

    async fn classify(
        &self,
        generator: &dyn TextGenerator,
        code: &str,
    ) -> Result<Option<ProductMatch>> {
        let choices = self.catalog.ordered();
        let request = GenerationRequest::new(
            Purpose::Classify,
            Model::Speed,
            prompts::CLASSIFY_SYSTEM,
            prompts::classification_prompt(
                truncate_str(code, prompts::CLASSIFY_CODE_LIMIT),
                &choices,
            ),
        )
        .with_schema("product_classification", prompts::classification_schema());

        let text = generator.generate(request).await?;
        let answer = extract_text(&text);

        match str_field(&answer, "category") {
            Some(category) if category != UNCATEGORIZED => Ok(Some(ProductMatch {
                category: category.to_string(),
                product: str_field(&answer, "product")
                    .unwrap_or(UNCATEGORIZED)
                    .to_string(),
                resolved_via: ResolvedVia::Generative,
            })),
            _ => Ok(None),
        }
    }
}

fn str_field<'a>(record: &'a Record, key: &str) -> Option<&'a str> {
    record
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}
