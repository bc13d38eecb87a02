//! Bounded analyze → validate → refine loop.

use super::analysis::AnalysisPipeline;
use super::validation::{ValidationPipeline, ValidationResult};
use super::SampleContext;
use crate::assessment::Assessment;
use crate::config::{DEFAULT_ACCEPTANCE_THRESHOLD, DEFAULT_MAX_LOOPS};
use crate::util::truncate;
use anyhow::{anyhow, Result};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSettings {
    pub max_loops: u32,
    /// Validation scores strictly above this are accepted.
    pub threshold: u8,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            max_loops: DEFAULT_MAX_LOOPS,
            threshold: DEFAULT_ACCEPTANCE_THRESHOLD,
        }
    }
}

impl LoopSettings {
    pub fn new(max_loops: u32, threshold: u8) -> Self {
        Self {
            max_loops: max_loops.max(1),
            threshold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopOutcome {
    /// A candidate scored above the threshold.
    Accepted,
    /// The iteration budget ran out; the last candidate is returned.
    Exhausted,
    /// A later analysis pass failed; the previous candidate is returned.
    Aborted,
}

#[derive(Debug)]
enum LoopState {
    Analyzing {
        iteration: u32,
        feedback: Option<String>,
    },
    Validating {
        iteration: u32,
        candidate: Assessment,
    },
    Retrying {
        iteration: u32,
        feedback: String,
    },
    Done(LoopOutcome),
}

#[derive(Debug, Clone)]
pub struct RefinementRun {
    pub run_id: Uuid,
    pub assessment: Assessment,
    pub history: Vec<ValidationResult>,
    pub outcome: LoopOutcome,
    /// Completed analyze/validate round trips.
    pub iterations: u32,
}

pub struct RefinementLoop<'a> {
    analysis: &'a AnalysisPipeline,
    validation: &'a ValidationPipeline,
    settings: LoopSettings,
}

impl<'a> RefinementLoop<'a> {
    pub fn new(
        analysis: &'a AnalysisPipeline,
        validation: &'a ValidationPipeline,
        settings: LoopSettings,
    ) -> Self {
        Self {
            analysis,
            validation,
            settings: LoopSettings::new(settings.max_loops, settings.threshold),
        }
    }

    /// Drive the loop to completion.
    ///
    /// Only a failure of the first analysis pass is an error; a low score
    /// never is.
    pub async fn run(&self, ctx: &SampleContext) -> Result<RefinementRun> {
        let run_id = Uuid::new_v4();
        let max_loops = self.settings.max_loops;
        let mut history: Vec<ValidationResult> = Vec::new();
        let mut current: Option<Assessment> = None;
        let mut state = LoopState::Analyzing {
            iteration: 0,
            feedback: None,
        };

        let outcome = loop {
            state = match state {
                LoopState::Analyzing {
                    iteration,
                    feedback,
                } => {
                    tracing::info!(%run_id, iteration = iteration + 1, max_loops, "analyzing");
                    match self.analysis.analyze(ctx, feedback.as_deref()).await {
                        Ok(candidate) => LoopState::Validating {
                            iteration,
                            candidate,
                        },
                        Err(err) if current.is_none() => return Err(err),
                        Err(err) => {
                            tracing::warn!(
                                %run_id,
                                iteration = iteration + 1,
                                error = %format!("{:#}", err),
                                "analysis failed; keeping previous candidate"
                            );
                            LoopState::Done(LoopOutcome::Aborted)
                        }
                    }
                }
                LoopState::Validating {
                    iteration,
                    candidate,
                } => {
                    let result = self.validation.validate(ctx, &candidate).await;
                    tracing::info!(
                        %run_id,
                        iteration = iteration + 1,
                        score = result.score,
                        threshold = self.settings.threshold,
                        "validated"
                    );
                    let accepted = result.score > self.settings.threshold;
                    let feedback = result.reasoning.clone();
                    history.push(result);
                    current = Some(candidate);

                    if accepted {
                        LoopState::Done(LoopOutcome::Accepted)
                    } else if iteration + 1 < max_loops {
                        LoopState::Retrying {
                            iteration,
                            feedback,
                        }
                    } else {
                        LoopState::Done(LoopOutcome::Exhausted)
                    }
                }
                LoopState::Retrying {
                    iteration,
                    feedback,
                } => {
                    tracing::debug!(
                        %run_id,
                        feedback = %truncate(&feedback, 200),
                        "retrying with feedback"
                    );
                    LoopState::Analyzing {
                        iteration: iteration + 1,
                        feedback: Some(feedback),
                    }
                }
                LoopState::Done(outcome) => break outcome,
            };
        };

        let assessment =
            current.ok_or_else(|| anyhow!("refinement loop finished without a candidate"))?;
        let iterations = history.len() as u32;
        tracing::info!(%run_id, ?outcome, iterations, "refinement finished");

        Ok(RefinementRun {
            run_id,
            assessment,
            history,
            outcome,
            iterations,
        })
    }
}
