#![allow(dead_code)]

use anyhow::{anyhow, Result};
use futures::future::BoxFuture;
use sample_health::llm::{GenerationRequest, Purpose, TextGenerator};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

/// Replays canned responses per call purpose. The last response queued for a
/// purpose repeats once the queue drains.
#[derive(Default)]
pub struct ScriptedGenerator {
    scripts: Mutex<HashMap<Purpose, VecDeque<Result<String, String>>>>,
    calls: Mutex<Vec<(Purpose, String)>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, purpose: Purpose, text: impl Into<String>) -> Self {
        self.push(purpose, Ok(text.into()))
    }

    pub fn fail(self, purpose: Purpose, message: impl Into<String>) -> Self {
        self.push(purpose, Err(message.into()))
    }

    fn push(self, purpose: Purpose, response: Result<String, String>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(purpose)
            .or_default()
            .push_back(response);
        self
    }

    pub fn calls(&self, purpose: Purpose) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| *p == purpose)
            .count()
    }

    pub fn prompts(&self, purpose: Purpose) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| *p == purpose)
            .map(|(_, prompt)| prompt.clone())
            .collect()
    }

    fn next(&self, purpose: Purpose) -> Result<String> {
        let mut scripts = self.scripts.lock().unwrap();
        let queue = scripts
            .get_mut(&purpose)
            .ok_or_else(|| anyhow!("no script for {}", purpose.as_str()))?;
        let response = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        match response {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("script for {} is empty", purpose.as_str())),
        }
    }
}

impl TextGenerator for ScriptedGenerator {
    fn generate<'a>(
        &'a self,
        request: GenerationRequest,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            self.calls
                .lock()
                .unwrap()
                .push((request.purpose, request.prompt.clone()));
            self.next(request.purpose)
        })
    }
}

/// Formatter output in the legacy key layout, fenced the way models return it.
pub fn formatted_assessment(overall: u8) -> String {
    format!(
        r#"Here is the structured result:
```json
{{
  "overall_compliance_score": {overall},
  "criteria_breakdown": [
    {{
      "criterion_name": "language_best_practices",
      "score": 60,
      "weight": 0.2,
      "evaluation": "Uses a bare except.",
      "recommendations_for_llm_fix": ["Catch specific exceptions", "Pin the client library version"]
    }},
    {{
      "criterion_name": "runnability_and_configuration",
      "score": 70,
      "weight": 0.3,
      "evaluation": "Project id is hardcoded.",
      "recommendations_for_llm_fix": ["Pin the client library version", "Read the project id from the environment"]
    }},
    {{
      "criterion_name": "language_best_practices",
      "score": 10,
      "recommendations_for_llm_fix": ["duplicate entry"]
    }}
  ],
  "llm_fix_summary_for_code_generation": ["Read configuration from the environment"],
  "identified_generic_problem_categories": ["Hardcoded values"],
}}
```"#
    )
}

pub fn verdict(score: u8, reasoning: &str) -> String {
    format!(r#"{{"validation_score": {score}, "reasoning": "{reasoning}"}}"#)
}

pub const PYTHON_SAMPLE: &str = r#"# [START bigquery_query_basic]
from google.cloud import bigquery

# [START bigquery_client_setup]
def query_table(project_id: str) -> None:
    client = bigquery.Client(project=project_id)
    rows = client.query("SELECT 1").result()
    for row in rows:
        print(row)
# [END bigquery_client_setup]
# [END bigquery_query_basic]
"#;
