//! sample-health library crate
//!
//! Scores code samples against a documentation-quality rubric and refines
//! the verdict with a validator until it is trustworthy or the budget runs out.

pub mod assessment;
pub mod config;
pub mod detect;
pub mod fetch;
pub mod llm;
pub mod logging;
pub mod pipeline;
pub mod product;
pub mod util;

pub use assessment::{finalize, Assessment, Criterion, CriterionName};
pub use pipeline::{AnalysisReport, HealthScorer, LoopOutcome, SampleInput};
