use crate::error::{Error, Result};
use crate::models::item::{clamp_difficulty, GeneratedCandidate};
use crate::models::subtopic::{StyleHint, Subtopic, SubtopicDetails};
use async_trait::async_trait;
use rand::Rng;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Topic material handed to the generator for one unit.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TopicContent {
    pub subtopic_id: String,
    pub title: String,
    pub content: String,
    pub details: SubtopicDetails,
}

impl From<&Subtopic> for TopicContent {
    fn from(s: &Subtopic) -> Self {
        Self {
            subtopic_id: s.id.clone(),
            title: s.title.clone(),
            content: s.content.clone(),
            details: s.details.clone(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct GenerationRequest {
    pub topic: TopicContent,
    pub required_polarity: bool,
    pub style_hint: StyleHint,
    pub avoidance_guidance: Option<String>,
}

/// Produces one true/false quiz candidate per call.
///
/// Implementations return [`Error::Generation`] for transport problems and
/// [`Error::ParseFailure`] when the response cannot be repaired.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedCandidate>;

    /// Identifier recorded as the item origin.
    fn origin(&self) -> String;
}

#[derive(Clone)]
pub struct AIService {
    client: Client,
    api_key: String,
    model: String,
}

impl AIService {
    pub fn new(api_key: String, model: String, client: Client) -> Self {
        Self {
            client,
            api_key,
            model,
        }
    }

    async fn chat_openai(&self, payload: JsonValue) -> Result<String> {
        let res = self
            .client
            .post("https://api.openai.com/v1/chat/completions")
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::Generation(format!("OpenAI request failed: {}", e)))?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(Error::Generation(format!("OpenAI API Error {}: {}", status, text)));
        }

        let body: JsonValue = res
            .json()
            .await
            .map_err(|e| Error::Generation(format!("OpenAI body unreadable: {}", e)))?;

        body.get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| Error::ParseFailure("Invalid OpenAI response format".to_string()))
    }
}

#[async_trait]
impl ContentGenerator for AIService {
    async fn generate(&self, request: &GenerationRequest) -> Result<GeneratedCandidate> {
        let system_prompt = r#"You write true/false study questions from legal and technical source material.
The output must be a valid JSON object with the fields:
  "text": a single self-contained statement,
  "polarity": true if the statement is correct according to the content, false otherwise,
  "explanation": why the statement is correct or incorrect, citing the content,
  "source_reference": the short excerpt of the content the statement is based on,
  "difficulty": an integer from 1 (easy) to 5 (hard).

Rules:
1. The statement MUST have exactly the requested polarity.
2. False statements must be plausible: change one element (a term, a condition, a period, a consequence), never write obvious nonsense.
3. Do not start the statement with "True or false".
4. Use only facts from the provided content.
"#;

        let user_content = serde_json::json!({
            "title": request.topic.title,
            "kind": request.topic.details.kind(),
            "content": request.topic.content,
            "details": request.topic.details,
            "required_polarity": request.required_polarity,
            "style": request.style_hint.instruction(),
            "avoid": request.avoidance_guidance,
        });

        let payload = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": serde_json::to_string(&user_content)?}
            ],
            "response_format": { "type": "json_object" },
            "temperature": 0.9
        });

        let raw = self.chat_openai(payload).await?;
        let candidate = parse_candidate(&raw)?;
        tracing::debug!(
            subtopic_id = %request.topic.subtopic_id,
            polarity = candidate.polarity,
            "generator candidate parsed"
        );
        Ok(candidate)
    }

    fn origin(&self) -> String {
        format!("openai:{}", self.model)
    }
}

/// Parses a generator reply, repairing code fences, surrounding prose,
/// alternate field names and stringly-typed booleans.
pub fn parse_candidate(raw: &str) -> Result<GeneratedCandidate> {
    let value = repair_json(raw)
        .ok_or_else(|| Error::ParseFailure(format!("No JSON object in reply: {}", preview(raw))))?;
    let value = match value.get("question").filter(|q| q.is_object()) {
        Some(inner) => inner.clone(),
        None => value,
    };

    let text = first_str(&value, &["text", "statement", "question", "enunciado"])
        .ok_or_else(|| Error::ParseFailure("Reply has no statement text".to_string()))?;
    let polarity = first_bool(&value, &["polarity", "answer", "is_true", "correct", "respuesta"])
        .ok_or_else(|| Error::ParseFailure("Reply has no polarity".to_string()))?;
    let explanation = first_str(&value, &["explanation", "justification", "explicacion"]).unwrap_or_default();
    let source_reference =
        first_str(&value, &["source_reference", "sourceReference", "source", "reference"]).unwrap_or_default();
    let difficulty = value.get("difficulty").and_then(|d| {
        d.as_i64()
            .or_else(|| d.as_f64().map(|f| f.round() as i64))
            .or_else(|| d.as_str().and_then(|s| s.trim().parse().ok()))
    });

    Ok(GeneratedCandidate {
        text,
        explanation,
        source_reference,
        polarity,
        difficulty: Some(clamp_difficulty(difficulty)),
    })
}

fn repair_json(raw: &str) -> Option<JsonValue> {
    let trimmed = raw.trim();
    if let Ok(v @ JsonValue::Object(_)) = serde_json::from_str::<JsonValue>(trimmed) {
        return Some(v);
    }
    let unfenced = trimmed
        .trim_start_matches("```json")
        .trim_start_matches("```JSON")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    if let Ok(v @ JsonValue::Object(_)) = serde_json::from_str::<JsonValue>(unfenced) {
        return Some(v);
    }
    let start = unfenced.find('{')?;
    let end = unfenced.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<JsonValue>(&unfenced[start..=end]) {
        Ok(v @ JsonValue::Object(_)) => Some(v),
        _ => None,
    }
}

fn first_str(value: &JsonValue, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| value.get(*k).and_then(|v| v.as_str()))
        .map(|s| s.trim().to_string())
        .find(|s| !s.is_empty())
}

fn first_bool(value: &JsonValue, keys: &[&str]) -> Option<bool> {
    keys.iter().find_map(|k| match value.get(*k)? {
        JsonValue::Bool(b) => Some(*b),
        JsonValue::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "verdadero" | "v" | "yes" | "correct" => Some(true),
            "false" | "falso" | "f" | "no" | "incorrect" => Some(false),
            _ => None,
        },
        JsonValue::Number(n) => n.as_i64().and_then(|i| match i {
            1 => Some(true),
            0 => Some(false),
            _ => None,
        }),
        _ => None,
    })
}

fn preview(raw: &str) -> String {
    raw.chars().take(80).collect()
}

/// Templated items used when the generator produced nothing usable, one per
/// content excerpt. Every excerpt is offered once, starting at a random one.
pub fn fallback_candidates(subtopic: &Subtopic, polarity: bool) -> Vec<GeneratedCandidate> {
    let mut excerpts: Vec<&str> = subtopic
        .content
        .split(['.', ';', '\n'])
        .map(str::trim)
        .filter(|s| s.len() > 10)
        .collect();
    if excerpts.is_empty() {
        excerpts.push(subtopic.content.trim());
    }
    let start = rand::thread_rng().gen_range(0..excerpts.len());
    excerpts.rotate_left(start);

    excerpts
        .into_iter()
        .map(|excerpt| templated_candidate(subtopic, excerpt, polarity))
        .collect()
}

fn templated_candidate(subtopic: &Subtopic, excerpt: &str, polarity: bool) -> GeneratedCandidate {
    let (text, explanation) = if polarity {
        (
            format!("Regarding {}: {}.", subtopic.title, excerpt),
            format!("The statement reproduces the content of {}.", subtopic.title),
        )
    } else {
        (
            format!("Regarding {}, it is NOT the case that: {}.", subtopic.title, excerpt),
            format!("The content of {} states exactly this, so the negation is false.", subtopic.title),
        )
    };

    GeneratedCandidate {
        text,
        explanation,
        source_reference: excerpt.to_string(),
        polarity,
        difficulty: Some(1),
    }
}
