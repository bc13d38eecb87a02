use serde_json::{json, Value};

/// Characters of code sent to the category classifier.
pub const CLASSIFY_CODE_LIMIT: usize = 15_000;

pub const REVIEW_SYSTEM: &str = r#"You are a senior developer-relations engineer reviewing a code sample that will be published in official product documentation and used as training data for code-generating models.

Review the sample against these criteria, in this priority order:
1. runnability_and_configuration (weight 0.25): does it parse, are dependencies declared, is configuration read from the environment and documented, are there hardcoded project ids, keys or paths?
2. api_effectiveness_and_correctness (weight 0.25): for every client-library call, does the method exist, are the parameters right, is the response handled, are errors handled?
3. language_best_practices (weight 0.15): idioms, resource management, naming, error handling conventions of the language.
4. formatting_and_consistency (weight 0.10): consistent indentation, line length, style guide adherence.
5. comments_and_code_clarity (weight 0.10): comments explain intent, no stale or misleading comments, readable control flow.
6. llm_training_fitness_and_explicitness (weight 0.15): explicit imports, no magic values, self-contained, unambiguous.

Rules:
- Score each criterion 0-100 and give an overall score 0-100.
- Every concrete problem becomes one actionable recommendation. Charge a problem to the FIRST criterion in the list above that covers it; do not repeat it under a later criterion.
- Cite documentation URLs you relied on as numbered citations.
- Region tags ([START x] / [END x]) are documentation markers, not code smells."#;

pub const FORMAT_SYSTEM: &str = r#"You convert a written code review into a single JSON object. Do not add findings that are not in the review and do not drop any.

Output ONLY the JSON object with these keys:
- overall_score: integer 0-100
- criteria: list of {name, score, weight, assessment_text, structured_detail, recommendations, problem_categories}
- fix_summary: ordered list of the fixes a code generator should apply
- problem_categories: short generic labels (e.g. "Error Handling", "Hardcoded Values")
- citations: list of {number, url}

structured_detail for runnability_and_configuration is an object:
{"syntax_validity": {"is_valid": bool, "reasoning": str},
 "dependency_management": {"has_dependencies": bool, "are_declared": "Yes"|"No"|"NA", "reasoning": str},
 "configuration_management": {"uses_env_vars": bool, "are_documented": "Yes"|"No"|"NA", "reasoning": str},
 "hardcoded_values": {"contains_hardcoded_values": bool, "details": str}}

structured_detail for api_effectiveness_and_correctness is a list of
{"method_name": str, "line_number": int, "evaluation": {"method_existence_check": {"status": "Pass"|"Fail"|"NA", "reasoning": str}, "parameter_check": {...}, "response_handling_check": {...}, "error_handling_check": {...}}}

For every other criterion structured_detail is a string."#;

pub const CLASSIFY_SYSTEM: &str = r#"You are an expert cloud developer. Categorize a code sample into exactly one product from the list you are given. Pay close attention to import statements, client library initialization and API calls.

Return a single valid JSON object with two keys, "category" and "product", and nothing else.
Example: {"category": "Databases", "product": "Spanner"}
If nothing fits, return {"category": "Uncategorized", "product": "Uncategorized"}."#;

pub const FACT_CHECK_SYSTEM: &str = r#"You audit code reviews. You are given a code sample and a JSON review of it. Verify every claim in the review against the code and against current public documentation for the libraries used:
- Are the cited API methods and parameters real?
- Are reported problems actually present in the code?
- Are there significant problems the review missed?
- Are scores consistent with the findings?

Write a concise audit. End with a verdict on how trustworthy the review is on a 1-10 scale and what the reviewer should change."#;

pub const VALIDATION_FORMAT_SYSTEM: &str = r#"You convert a written audit of a code review into JSON.

Output ONLY a JSON object: {"validation_score": integer 1-10, "reasoning": string}.
reasoning must list the concrete corrections the reviewer should make, so it can be fed back to them verbatim."#;

pub fn review_prompt(
    code: &str,
    language: &str,
    product: &str,
    region_tags: &[String],
    feedback: Option<&str>,
) -> String {
    let tags = if region_tags.is_empty() {
        "(none)".to_string()
    } else {
        region_tags.join(", ")
    };
    let mut prompt = format!(
        "LANGUAGE: {language}\nPRODUCT: {product}\nREGION TAGS: {tags}\n\nCODE:\n```\n{code}\n```\n"
    );
    if let Some(feedback) = feedback.filter(|f| !f.trim().is_empty()) {
        prompt.push_str(&format!(
            "\nA previous review of this sample was audited. Address this feedback in your new review:\n{}\n",
            feedback.trim()
        ));
    }
    prompt
}

pub fn formatting_prompt(review: &str) -> String {
    format!("REVIEW:\n{review}")
}

pub fn classification_prompt(code: &str, products: &[(&str, &str)]) -> String {
    let choices = products
        .iter()
        .map(|(category, product)| format!("- Category: {category}, Product: {product}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!("CODE SAMPLE:\n```\n{code}\n```\n\nCHOOSE ONE OF:\n{choices}")
}

pub fn fact_check_prompt(code: &str, assessment_json: &str) -> String {
    format!("CODE SAMPLE:\n```\n{code}\n```\n\nREVIEW JSON:\n{assessment_json}")
}

pub fn validation_format_prompt(audit: &str) -> String {
    format!("AUDIT:\n{audit}")
}

pub fn assessment_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "overall_score": {"type": "integer", "minimum": 0, "maximum": 100},
            "criteria": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "name": {"type": "string"},
                        "score": {"type": "integer"},
                        "weight": {"type": "number"},
                        "assessment_text": {"type": "string"},
                        "structured_detail": {},
                        "recommendations": {"type": "array", "items": {"type": "string"}},
                        "problem_categories": {"type": "array", "items": {"type": "string"}}
                    },
                    "required": ["name", "score", "recommendations"]
                }
            },
            "fix_summary": {"type": "array", "items": {"type": "string"}},
            "problem_categories": {"type": "array", "items": {"type": "string"}},
            "citations": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {"number": {"type": "integer"}, "url": {"type": "string"}},
                    "required": ["number", "url"]
                }
            }
        },
        "required": ["overall_score", "criteria"]
    })
}

pub fn classification_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "category": {"type": "string"},
            "product": {"type": "string"}
        },
        "required": ["category", "product"]
    })
}

pub fn validation_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "validation_score": {"type": "integer", "minimum": 1, "maximum": 10},
            "reasoning": {"type": "string"}
        },
        "required": ["validation_score", "reasoning"]
    })
}
