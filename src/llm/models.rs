use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Model tiers used by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Model {
    /// Speed tier - structured formatting and classification (gemini flash-lite)
    Speed,
    /// Smart tier - code review and fact-checking (gemini pro)
    Smart,
}

/// Maximum tokens for all model tiers
const MODEL_MAX_TOKENS: u32 = 16384;

impl Model {
    /// Default OpenRouter model id, overridable through `Config`.
    pub fn default_id(&self) -> &'static str {
        match self {
            Model::Speed => "google/gemini-2.5-flash-lite",
            Model::Smart => "google/gemini-2.5-pro",
        }
    }

    pub fn max_tokens(&self) -> u32 {
        MODEL_MAX_TOKENS
    }
}

/// API usage information from OpenRouter
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
    /// Actual cost in USD as reported by OpenRouter (`total_cost` on the wire).
    #[serde(default, alias = "total_cost")]
    pub cost: Option<f64>,
}

impl Usage {
    pub fn cost(&self) -> f64 {
        self.cost.unwrap_or(0.0)
    }
}

/// Cost is tracked in micro-dollars so it fits an atomic counter.
const MICRO_USD: f64 = 1_000_000.0;

/// Running usage totals for one client, shared across concurrent calls.
#[derive(Debug, Default)]
pub struct UsageMeter {
    prompt_tokens: AtomicU64,
    completion_tokens: AtomicU64,
    total_tokens: AtomicU64,
    cost_micro_usd: AtomicU64,
    calls: AtomicU64,
    priced_calls: AtomicU64,
}

impl UsageMeter {
    pub fn record(&self, usage: &Usage) {
        self.prompt_tokens
            .fetch_add(u64::from(usage.prompt_tokens), Ordering::Relaxed);
        self.completion_tokens
            .fetch_add(u64::from(usage.completion_tokens), Ordering::Relaxed);
        self.total_tokens
            .fetch_add(u64::from(usage.total_tokens), Ordering::Relaxed);
        if let Some(cost) = usage.cost {
            let micros = (cost.max(0.0) * MICRO_USD).round() as u64;
            self.cost_micro_usd.fetch_add(micros, Ordering::Relaxed);
            self.priced_calls.fetch_add(1, Ordering::Relaxed);
        }
        self.calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Totals so far. `cost` stays `None` until a response reported one.
    pub fn snapshot(&self) -> Usage {
        let clamp = |v: u64| u32::try_from(v).unwrap_or(u32::MAX);
        let cost = (self.priced_calls.load(Ordering::Relaxed) > 0)
            .then(|| self.cost_micro_usd.load(Ordering::Relaxed) as f64 / MICRO_USD);
        Usage {
            prompt_tokens: clamp(self.prompt_tokens.load(Ordering::Relaxed)),
            completion_tokens: clamp(self.completion_tokens.load(Ordering::Relaxed)),
            total_tokens: clamp(self.total_tokens.load(Ordering::Relaxed)),
            cost,
        }
    }
}
