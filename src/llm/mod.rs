//! Text generation seam and the OpenRouter implementation.

pub mod client;
pub mod models;
pub mod prompts;

pub use client::OpenRouterClient;
pub use models::{Model, Usage, UsageMeter};

use anyhow::Result;
use futures::future::BoxFuture;
use serde_json::Value;

/// Which pipeline step a generation call belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Purpose {
    Review,
    Format,
    Classify,
    FactCheck,
    ValidationFormat,
}

impl Purpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            Purpose::Review => "review",
            Purpose::Format => "format",
            Purpose::Classify => "classify",
            Purpose::FactCheck => "fact_check",
            Purpose::ValidationFormat => "validation_format",
        }
    }
}

/// JSON schema the response is expected to follow.
#[derive(Debug, Clone)]
pub struct SchemaHint {
    pub name: &'static str,
    pub schema: Value,
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub purpose: Purpose,
    pub system: String,
    pub prompt: String,
    pub model: Model,
    /// Request temperature 0.
    pub deterministic: bool,
    pub schema_hint: Option<SchemaHint>,
}

impl GenerationRequest {
    pub fn new(
        purpose: Purpose,
        model: Model,
        system: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            purpose,
            system: system.into(),
            prompt: prompt.into(),
            model,
            deterministic: true,
            schema_hint: None,
        }
    }

    pub fn with_schema(mut self, name: &'static str, schema: Value) -> Self {
        self.schema_hint = Some(SchemaHint { name, schema });
        self
    }
}

/// Produces free-form text for a prompt. Output formatting is not trusted.
pub trait TextGenerator: Send + Sync {
    fn generate<'a>(
        &'a self,
        request: GenerationRequest,
    ) -> BoxFuture<'a, Result<String>>;
}
