//! Generation collaborator: backends and the structured-output boundary.
//!
//! The loop talks to a text-generation backend through the `Generator`
//! trait, which exposes the two call shapes the stages need: a free-text
//! draft and a structured assessment. Three backends ship:
//!
//! - `OllamaGenerator` - HTTP chat calls against a local Ollama endpoint
//! - `CommandGenerator` - pipe the prompt to a user-configured LM command
//!   on stdin and read stdout (any tool works: `llm`, `ollama run`, scripts)
//! - `ScriptedGenerator` - replay canned stage outputs from a JSON script,
//!   for tests and offline dry runs
//!
//! Structured responses are never trusted as typed data: raw backend text
//! crosses `parse_assessment`, which strips markdown fences, digs a JSON
//! object out of surrounding prose if needed, and validates the grade,
//! rating range, and feedback before an `Assessment` is built.

use crate::state::{Assessment, Grade, RATING_MAX, RATING_MIN};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::Cell;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Instant;

/// Appended to the role instructions for structured calls so backends
/// without a native JSON mode still answer in the expected shape.
const STRUCTURED_FORMAT_NOTE: &str = "Respond with a single JSON object with keys \
\"grade\" (\"pass\" or \"fail\"), \"rating\" (integer 1-10), and \"feedback\" (string). \
No prose or code fences.";

/// Text-generation backend used by the review stages.
///
/// A failure from either call is fatal to the session; the loop performs
/// no retry and returns no partial result.
pub trait Generator {
    /// Free-text call shape: instructions + input -> arbitrary string.
    fn draft(&self, instructions: &str, input: &str) -> Result<String>;

    /// Structured call shape: instructions + input -> validated assessment.
    fn assess(&self, instructions: &str, input: &str) -> Result<Assessment>;
}

/// Validation failure at the structured-output boundary.
///
/// Collects every issue found in one response so a misbehaving backend can
/// be diagnosed from a single error.
#[derive(Debug)]
pub struct ValidationError {
    pub issues: Vec<String>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "assessment violates contract: {}", self.issues.join("; "))
    }
}

impl std::error::Error for ValidationError {}

/// Parse and validate a structured assessment from raw backend text.
///
/// Accepts a bare JSON object, a fenced JSON block, or a JSON object
/// embedded in surrounding prose. Rejects responses missing any of the
/// three contract fields, ratings outside 1..=10, and unknown grades.
pub fn parse_assessment(raw: &str) -> Result<Assessment, ValidationError> {
    let cleaned = strip_code_fences(raw);
    let value: Value = match serde_json::from_str(&cleaned) {
        Ok(value) => value,
        Err(err) => match extract_json_from_text(&cleaned) {
            Some(value) => value,
            None => {
                return Err(ValidationError {
                    issues: vec![format!("response is not a JSON object: {err}")],
                })
            }
        },
    };

    let Some(object) = value.as_object() else {
        return Err(ValidationError {
            issues: vec![format!("expected a JSON object, got {value}")],
        });
    };

    let mut issues = Vec::new();

    let grade = match object.get("grade").and_then(Value::as_str) {
        Some(raw_grade) => match raw_grade.trim().to_ascii_lowercase().as_str() {
            "pass" => Some(Grade::Pass),
            "fail" => Some(Grade::Fail),
            other => {
                issues.push(format!("grade must be \"pass\" or \"fail\" (got {other:?})"));
                None
            }
        },
        None => {
            issues.push("missing string field \"grade\"".to_string());
            None
        }
    };

    let rating = match object.get("rating").and_then(Value::as_i64) {
        Some(rating) if (i64::from(RATING_MIN)..=i64::from(RATING_MAX)).contains(&rating) => {
            Some(rating as u8)
        }
        Some(rating) => {
            issues.push(format!(
                "rating must be within {RATING_MIN}..={RATING_MAX} (got {rating})"
            ));
            None
        }
        None => {
            issues.push("missing integer field \"rating\"".to_string());
            None
        }
    };

    let summary = match object.get("feedback").and_then(Value::as_str) {
        Some(feedback) if !feedback.trim().is_empty() => Some(feedback.trim().to_string()),
        Some(_) => {
            issues.push("field \"feedback\" must be non-empty".to_string());
            None
        }
        None => {
            issues.push("missing string field \"feedback\"".to_string());
            None
        }
    };

    match (grade, rating, summary) {
        (Some(grade), Some(rating), Some(summary)) => Ok(Assessment {
            grade,
            rating,
            summary,
        }),
        _ => Err(ValidationError { issues }),
    }
}

fn strip_code_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }
    let mut lines: Vec<&str> = trimmed.lines().collect();
    if let Some(first) = lines.first() {
        if first.trim_start().starts_with("```") {
            lines.remove(0);
        }
    }
    if let Some(last) = lines.last() {
        if last.trim_start().starts_with("```") {
            lines.pop();
        }
    }
    lines.join("\n").trim().to_string()
}

fn extract_json_from_text(raw: &str) -> Option<Value> {
    for (idx, ch) in raw.char_indices() {
        if ch != '{' {
            continue;
        }
        let slice = &raw[idx..];
        let mut deserializer = serde_json::Deserializer::from_str(slice);
        if let Ok(value) = Value::deserialize(&mut deserializer) {
            return Some(value);
        }
    }
    None
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

/// HTTP backend against an Ollama-compatible `/api/chat` endpoint.
pub struct OllamaGenerator {
    endpoint: String,
    model: String,
}

impl OllamaGenerator {
    pub fn new(endpoint: String, model: String) -> Self {
        Self { endpoint, model }
    }

    fn chat(&self, instructions: &str, input: &str, json_format: bool) -> Result<String> {
        let url = format!("{}/api/chat", self.endpoint.trim_end_matches('/'));
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: instructions,
                },
                ChatMessage {
                    role: "user",
                    content: input,
                },
            ],
            stream: false,
            format: json_format.then_some("json"),
        };

        let start = Instant::now();
        let mut response = ureq::post(&url)
            .send_json(&request)
            .with_context(|| format!("chat request to {url} (model {})", self.model))?;
        let parsed: ChatResponse = response
            .body_mut()
            .read_json()
            .context("parse chat response JSON")?;

        tracing::info!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            prompt_bytes = instructions.len() + input.len(),
            response_bytes = parsed.message.content.len(),
            "chat call complete"
        );

        Ok(parsed.message.content)
    }
}

impl Generator for OllamaGenerator {
    fn draft(&self, instructions: &str, input: &str) -> Result<String> {
        self.chat(instructions, input, false)
    }

    fn assess(&self, instructions: &str, input: &str) -> Result<Assessment> {
        let raw = self.chat(instructions, input, true)?;
        parse_assessment(&raw).map_err(anyhow::Error::from)
    }
}

/// Subprocess backend: prompt on stdin, response on stdout.
pub struct CommandGenerator {
    command: String,
}

impl CommandGenerator {
    pub fn new(command: String) -> Self {
        Self { command }
    }

    fn invoke(&self, prompt: &str) -> Result<String> {
        let args = shell_words::split(&self.command)
            .with_context(|| format!("parse LM command: {}", self.command))?;
        if args.is_empty() {
            return Err(anyhow!("LM command is empty"));
        }

        let start = Instant::now();
        let mut child = Command::new(&args[0])
            .args(&args[1..])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("spawn LM command: {}", args[0]))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(prompt.as_bytes())
                .context("write prompt to LM stdin")?;
        }

        let output = child.wait_with_output().context("wait for LM command")?;

        tracing::info!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            prompt_bytes = prompt.len(),
            response_bytes = output.stdout.len(),
            "lm command complete"
        );

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!(
                "LM command failed with status {}: {}",
                output.status,
                stderr.trim()
            ));
        }

        String::from_utf8(output.stdout).context("decode LM stdout as UTF-8")
    }
}

impl Generator for CommandGenerator {
    fn draft(&self, instructions: &str, input: &str) -> Result<String> {
        self.invoke(&format!("{instructions}\n\n{input}"))
    }

    fn assess(&self, instructions: &str, input: &str) -> Result<Assessment> {
        let prompt = format!("{instructions}\n\n{STRUCTURED_FORMAT_NOTE}\n\n{input}");
        let raw = self.invoke(&prompt)?;
        parse_assessment(&raw).map_err(anyhow::Error::from)
    }
}

/// Schema version for generation script files.
pub const SCRIPT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Deserialize)]
struct ScriptFile {
    #[serde(default)]
    schema_version: u32,
    #[serde(default)]
    assessments: Vec<ScriptAssessment>,
    #[serde(default)]
    critiques: Vec<String>,
    #[serde(default)]
    rewrites: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ScriptAssessment {
    grade: Grade,
    rating: u8,
    feedback: String,
}

/// Deterministic backend replaying canned outputs from a script file.
///
/// Assessments, critiques, and rewrites are consumed in order; running past
/// the end of any list is an error, which keeps a misconfigured script from
/// silently looping.
#[derive(Debug)]
pub struct ScriptedGenerator {
    assessments: Vec<Assessment>,
    critiques: Vec<String>,
    rewrites: Vec<String>,
    next_assessment: Cell<usize>,
    next_critique: Cell<usize>,
    next_rewrite: Cell<usize>,
}

impl ScriptedGenerator {
    /// Load a script from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("read generation script {}", path.display()))?;
        let script: ScriptFile =
            serde_json::from_str(&content).context("parse generation script JSON")?;
        if script.schema_version != 0 && script.schema_version != SCRIPT_SCHEMA_VERSION {
            return Err(anyhow!(
                "unsupported script schema_version {} (expected {})",
                script.schema_version,
                SCRIPT_SCHEMA_VERSION
            ));
        }

        let mut assessments = Vec::with_capacity(script.assessments.len());
        for (idx, entry) in script.assessments.into_iter().enumerate() {
            if !(RATING_MIN..=RATING_MAX).contains(&entry.rating) {
                return Err(anyhow!(
                    "script assessment {idx} rating {} outside {RATING_MIN}..={RATING_MAX}",
                    entry.rating
                ));
            }
            assessments.push(Assessment {
                grade: entry.grade,
                rating: entry.rating,
                summary: entry.feedback,
            });
        }

        Ok(Self {
            assessments,
            critiques: script.critiques,
            rewrites: script.rewrites,
            next_assessment: Cell::new(0),
            next_critique: Cell::new(0),
            next_rewrite: Cell::new(0),
        })
    }

    fn take<'a, T>(items: &'a [T], cursor: &Cell<usize>, label: &str) -> Result<&'a T> {
        let idx = cursor.get();
        let item = items
            .get(idx)
            .ok_or_else(|| anyhow!("generation script exhausted: no {label} at index {idx}"))?;
        cursor.set(idx + 1);
        Ok(item)
    }
}

impl Generator for ScriptedGenerator {
    fn draft(&self, _instructions: &str, input: &str) -> Result<String> {
        // The critiquer and writer are told apart by the driver-built input
        // prefix; scripts keep separate lists for the two roles.
        let is_rewrite = input.starts_with(crate::session::REWRITE_INPUT_PREFIX);
        if is_rewrite {
            Self::take(&self.rewrites, &self.next_rewrite, "rewrite").cloned()
        } else {
            Self::take(&self.critiques, &self.next_critique, "critique").cloned()
        }
    }

    fn assess(&self, _instructions: &str, _input: &str) -> Result<Assessment> {
        Self::take(&self.assessments, &self.next_assessment, "assessment").cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_bare_json_assessment() {
        let assessment =
            parse_assessment(r#"{"grade": "fail", "rating": 4, "feedback": "endpoint is weak"}"#)
                .expect("valid assessment");
        assert_eq!(assessment.grade, Grade::Fail);
        assert_eq!(assessment.rating, 4);
        assert_eq!(assessment.summary, "endpoint is weak");
    }

    #[test]
    fn parses_a_fenced_assessment() {
        let raw = "```json\n{\"grade\": \"pass\", \"rating\": 9, \"feedback\": \"ready\"}\n```";
        let assessment = parse_assessment(raw).expect("fenced assessment");
        assert_eq!(assessment.grade, Grade::Pass);
        assert_eq!(assessment.rating, 9);
    }

    #[test]
    fn parses_an_assessment_embedded_in_prose() {
        let raw = "Here is my review:\n{\"grade\": \"fail\", \"rating\": 2, \"feedback\": \"no biomarker\"} hope that helps";
        let assessment = parse_assessment(raw).expect("embedded assessment");
        assert_eq!(assessment.rating, 2);
    }

    #[test]
    fn rejects_missing_fields_with_one_issue_each() {
        let err = parse_assessment(r#"{"grade": "pass"}"#).unwrap_err();
        assert_eq!(err.issues.len(), 2);
        assert!(err.issues.iter().any(|i| i.contains("rating")));
        assert!(err.issues.iter().any(|i| i.contains("feedback")));
    }

    #[test]
    fn rejects_out_of_range_rating() {
        let err =
            parse_assessment(r#"{"grade": "pass", "rating": 11, "feedback": "x"}"#).unwrap_err();
        assert!(err.issues[0].contains("rating must be within 1..=10"));
        let err =
            parse_assessment(r#"{"grade": "pass", "rating": 0, "feedback": "x"}"#).unwrap_err();
        assert!(err.issues[0].contains("rating must be within 1..=10"));
    }

    #[test]
    fn rejects_unknown_grade() {
        let err =
            parse_assessment(r#"{"grade": "maybe", "rating": 5, "feedback": "x"}"#).unwrap_err();
        assert!(err.issues[0].contains("grade must be"));
    }

    #[test]
    fn rejects_empty_feedback() {
        let err =
            parse_assessment(r#"{"grade": "pass", "rating": 5, "feedback": "  "}"#).unwrap_err();
        assert!(err.issues[0].contains("non-empty"));
    }

    #[test]
    fn rejects_non_json_text() {
        let err = parse_assessment("the proposal looks fine to me").unwrap_err();
        assert!(err.issues[0].contains("not a JSON object"));
    }

    #[test]
    fn scripted_generator_replays_in_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("script.json");
        std::fs::write(
            &path,
            r#"{
                "schema_version": 1,
                "assessments": [
                    {"grade": "fail", "rating": 4, "feedback": "weak endpoints"},
                    {"grade": "pass", "rating": 9, "feedback": "much improved"}
                ],
                "critiques": ["- add a biomarker"],
                "rewrites": ["Respilimab, revised protocol"]
            }"#,
        )
        .expect("write script");

        let generator = ScriptedGenerator::load(&path).expect("load script");
        let first = generator.assess("sys", "input").expect("first assessment");
        assert_eq!(first.rating, 4);
        let second = generator.assess("sys", "input").expect("second assessment");
        assert_eq!(second.rating, 9);
        assert!(generator.assess("sys", "input").is_err());

        let critique = generator
            .draft("critiquer instructions", "Proposal:\nDrug X")
            .unwrap();
        assert_eq!(critique, "- add a biomarker");
        let rewrite_input = format!("{}\nOriginal Proposal:\nDrug X", crate::session::REWRITE_INPUT_PREFIX);
        let rewrite = generator.draft("writer instructions", &rewrite_input).unwrap();
        assert_eq!(rewrite, "Respilimab, revised protocol");
    }

    #[test]
    fn scripted_generator_rejects_out_of_range_ratings() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("script.json");
        std::fs::write(
            &path,
            r#"{"assessments": [{"grade": "pass", "rating": 12, "feedback": "x"}]}"#,
        )
        .expect("write script");
        let err = ScriptedGenerator::load(&path).unwrap_err();
        assert!(err.to_string().contains("outside 1..=10"));
    }
}
