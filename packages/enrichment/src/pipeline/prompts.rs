//! Prompts and response schema for attribute extraction.

use schemars::schema_for;

use crate::traits::backend::CompletionRequest;
use crate::types::attributes::StructuredAttributes;
use crate::types::config::ExtractionConfig;
use crate::types::posting::Posting;

/// System prompt shared by every extraction call.
pub const SYSTEM_PROMPT: &str = "You read job postings and extract hiring attributes. \
You answer with a single JSON object and nothing else.";

/// First extraction attempt.
pub const EXTRACT_PROMPT: &str = r#"Read the job posting below and extract these fields:

{fields}

Rules:
- Only use information stated in the posting. Use null, an empty list or "unspecified" when it is not stated.
- Write every value in English, whatever the language of the posting.

Answer with a JSON object matching this schema:
{schema}

Job title: {title}
Job posting:
{description}"#;

/// Second attempt after an answer that could not be parsed.
pub const REPAIR_PROMPT: &str = r#"Your previous answer could not be used: {error}

Return ONLY a JSON object. No prose, no markdown, no code fences, no reasoning.
The object must have exactly these keys: {keys}
Allowed values for "seniority": intern, junior, mid, senior, lead, unspecified.
Allowed values for "remote_policy": onsite, hybrid, remote, unspecified.
Numbers are plain integers without currency signs, spaces or separators.

Schema:
{schema}

Job title: {title}
Job posting:
{description}"#;

const SALARY_FIELDS: [&str; 3] = ["salary_min", "salary_max", "salary_currency"];
const SKILL_FIELDS: [&str; 1] = ["required_skills"];

/// Field instructions, in schema order.
fn field_instructions(config: &ExtractionConfig) -> Vec<&'static str> {
    let mut fields = vec![
        "- seniority: one of intern, junior, mid, senior, lead, unspecified",
        "- remote_policy: one of onsite, hybrid, remote, unspecified",
    ];
    if config.include_skills {
        fields.push(
            "- required_skills: programming languages, frameworks and tools required, e.g. [\"Python\", \"Docker\"]",
        );
    }
    if config.include_salary {
        fields.push("- salary_min / salary_max: yearly salary bounds as integers, null when absent");
        fields.push("- salary_currency: ISO 4217 code such as EUR or USD, null when absent");
    }
    fields.push("- experience_years: minimum years of experience required as an integer, null when absent");
    fields.push("- required_studies: degree or education level required, null when absent");
    fields
}

/// JSON schema of the answer, in the strict form structured-output APIs
/// accept: every object closed, every property required, no `$ref`.
pub fn attributes_schema(config: &ExtractionConfig) -> serde_json::Value {
    let schema = schema_for!(StructuredAttributes);
    let mut value = serde_json::to_value(schema).unwrap_or_default();

    if let serde_json::Value::Object(map) = &mut value {
        if let Some(serde_json::Value::Object(props)) = map.get_mut("properties") {
            if !config.include_salary {
                for field in SALARY_FIELDS {
                    props.remove(field);
                }
            }
            if !config.include_skills {
                for field in SKILL_FIELDS {
                    props.remove(field);
                }
            }
        }
    }

    close_object_schemas(&mut value);
    inline_refs(&mut value);
    flatten_single_all_of(&mut value);
    strip_keywords(&mut value, &["default", "format"]);

    if let serde_json::Value::Object(map) = &mut value {
        map.remove("definitions");
        map.remove("$schema");
    }
    value
}

/// Top-level keys of the answer.
pub fn schema_keys(config: &ExtractionConfig) -> Vec<String> {
    attributes_schema(config)
        .get("properties")
        .and_then(|p| p.as_object())
        .map(|p| p.keys().cloned().collect())
        .unwrap_or_default()
}

/// Request for the first attempt.
pub fn extraction_request(posting: &Posting, config: &ExtractionConfig) -> CompletionRequest {
    let schema = attributes_schema(config);
    let prompt = EXTRACT_PROMPT
        .replace("{fields}", &field_instructions(config).join("\n"))
        .replace("{schema}", &pretty(&schema))
        .replace("{title}", &posting.title)
        .replace(
            "{description}",
            truncate_chars(&posting.description, config.max_description_chars),
        );
    CompletionRequest::new(SYSTEM_PROMPT, prompt).with_schema(schema)
}

/// Stricter request after an unparseable answer.
pub fn repair_request(posting: &Posting, config: &ExtractionConfig, error: &str) -> CompletionRequest {
    let schema = attributes_schema(config);
    let prompt = REPAIR_PROMPT
        .replace("{error}", error)
        .replace("{keys}", &schema_keys(config).join(", "))
        .replace("{schema}", &pretty(&schema))
        .replace("{title}", &posting.title)
        .replace(
            "{description}",
            truncate_chars(&posting.description, config.max_description_chars),
        );
    CompletionRequest::new(SYSTEM_PROMPT, prompt).with_schema(schema)
}

/// Longest prefix of `text` with at most `max` characters.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

fn pretty(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}

/// `additionalProperties: false` and all properties required, recursively.
fn close_object_schemas(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            if map.get("type") == Some(&serde_json::Value::String("object".to_string())) {
                map.insert(
                    "additionalProperties".to_string(),
                    serde_json::Value::Bool(false),
                );
                if let Some(serde_json::Value::Object(props)) = map.get("properties") {
                    let keys = props
                        .keys()
                        .map(|k| serde_json::Value::String(k.clone()))
                        .collect();
                    map.insert("required".to_string(), serde_json::Value::Array(keys));
                }
            }
            for (_, v) in map.iter_mut() {
                close_object_schemas(v);
            }
        }
        serde_json::Value::Array(items) => items.iter_mut().for_each(close_object_schemas),
        _ => {}
    }
}

/// Replace `#/definitions/*` references with the definitions themselves.
fn inline_refs(value: &mut serde_json::Value) {
    let definitions = value.get("definitions").cloned();
    if let Some(defs) = definitions {
        inline_refs_with(value, &defs);
    }
}

fn inline_refs_with(value: &mut serde_json::Value, definitions: &serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            let target = map
                .get("$ref")
                .and_then(|r| r.as_str())
                .and_then(|r| r.strip_prefix("#/definitions/"))
                .and_then(|name| definitions.get(name))
                .cloned();
            if let Some(def) = target {
                *value = def;
                inline_refs_with(value, definitions);
                return;
            }
            for (_, v) in map.iter_mut() {
                inline_refs_with(v, definitions);
            }
        }
        serde_json::Value::Array(items) => {
            for item in items.iter_mut() {
                inline_refs_with(item, definitions);
            }
        }
        _ => {}
    }
}

/// `{"description": d, "allOf": [s]}` becomes `s` plus the description.
fn flatten_single_all_of(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            let single = match map.get("allOf").and_then(|a| a.as_array()) {
                Some(items) if items.len() == 1 => items[0].as_object().cloned(),
                _ => None,
            };
            if let Some(inner) = single {
                map.remove("allOf");
                for (k, v) in inner {
                    map.entry(k).or_insert(v);
                }
            }
            for (_, v) in map.iter_mut() {
                flatten_single_all_of(v);
            }
        }
        serde_json::Value::Array(items) => items.iter_mut().for_each(flatten_single_all_of),
        _ => {}
    }
}

fn strip_keywords(value: &mut serde_json::Value, keywords: &[&str]) {
    match value {
        serde_json::Value::Object(map) => {
            for keyword in keywords {
                // Only drop schema keywords, not properties that share the name.
                if map.get(*keyword).map_or(false, |v| !v.is_object()) {
                    map.remove(*keyword);
                }
            }
            for (_, v) in map.iter_mut() {
                strip_keywords(v, keywords);
            }
        }
        serde_json::Value::Array(items) => {
            for item in items.iter_mut() {
                strip_keywords(item, keywords);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_posting;

    #[test]
    fn test_schema_is_closed_and_inlined() {
        let schema = attributes_schema(&ExtractionConfig::default());
        let text = schema.to_string();

        assert_eq!(schema["additionalProperties"], false);
        assert!(!text.contains("$ref"));
        assert!(!text.contains("definitions"));
        assert!(text.contains("unspecified"));

        let required = schema["required"].as_array().unwrap();
        assert_eq!(required.len(), 8);
    }

    #[test]
    fn test_switches_remove_fields() {
        let config = ExtractionConfig::default().with_salary(false).with_skills(false);
        let keys = schema_keys(&config);

        assert!(!keys.iter().any(|k| k.starts_with("salary")));
        assert!(!keys.contains(&"required_skills".to_string()));
        assert!(keys.contains(&"seniority".to_string()));

        let request = extraction_request(&sample_posting(1), &config);
        assert!(!request.prompt.contains("salary_min"));
    }

    #[test]
    fn test_description_truncated_in_prompt() {
        let mut posting = sample_posting(1);
        posting.description = "é".repeat(50);
        let config = ExtractionConfig::default().with_max_description_chars(10);

        let request = extraction_request(&posting, &config);
        assert!(request.prompt.contains(&"é".repeat(10)));
        assert!(!request.prompt.contains(&"é".repeat(11)));
    }

    #[test]
    fn test_repair_prompt_mentions_error_and_keys() {
        let request = repair_request(&sample_posting(1), &ExtractionConfig::default(), "expected value at line 1");
        assert!(request.prompt.contains("expected value at line 1"));
        assert!(request.prompt.contains("remote_policy"));
        assert!(request.schema.is_some());
    }
}
