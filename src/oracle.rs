use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::config::OracleConfig;
use crate::domain::DocumentVerdict;

pub const DOCUMENT_RUBRIC: &str = r#"Analyse this family document and decide whether it is valid and appropriate.

Evaluation criteria:
1. Is the document readable and of good quality?
2. Does the content look authentic (no obvious forgery or tampering)?
3. Is the document appropriate for a family record (no offensive, illegal or inappropriate content)?
4. Are there signs of image manipulation?

Answer ONLY with a JSON object in exactly this format:
{
  "status": "valid" | "invalid" | "suspicious",
  "confidence": 0-100,
  "reason": "Short explanation (max 50 words)",
  "details": "Additional details if needed"
}

If you cannot analyse the document, use status "error" with an explanation."#;

const RAW_REASON_LIMIT: usize = 200;

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("classification request failed: {0}")]
    Transport(String),
    #[error("classification service responded with status {0}")]
    Status(u16),
}

/// Vision model that answers a rubric about a document image with free text.
#[async_trait]
pub trait ClassificationOracle: Send + Sync {
    async fn classify(&self, document_url: &str, rubric: &str) -> Result<String, OracleError>;
}

pub struct HttpOracle {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl HttpOracle {
    /// `None` when no API key is configured.
    pub fn from_config(config: &OracleConfig) -> anyhow::Result<Option<Self>> {
        let Some(api_key) = config.api_key.clone() else {
            return Ok(None);
        };
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Some(Self {
            client,
            api_url: config.api_url.clone(),
            api_key,
            model: config.model.clone(),
        }))
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: Option<ChatMessage>,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[async_trait]
impl ClassificationOracle for HttpOracle {
    async fn classify(&self, document_url: &str, rubric: &str) -> Result<String, OracleError> {
        let body = json!({
            "model": self.model,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": rubric },
                    { "type": "image_url", "image_url": { "url": document_url } }
                ]
            }],
            "max_tokens": 500,
            "temperature": 0.1
        });

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| OracleError::Transport(err.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(OracleError::Status(status.as_u16()));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|err| OracleError::Transport(err.without_url().to_string()))?;

        Ok(parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .unwrap_or_default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedVerdict {
    pub verdict: DocumentVerdict,
    pub confidence: Option<i32>,
    pub reason: Option<String>,
    pub details: Option<String>,
}

/// Reads the oracle's free text. The JSON object is the span from the first
/// `{` to the last `}`; text without a parseable object is accepted as
/// `valid`, while an object lacking a usable status is an `error`.
pub fn parse_verdict(raw: &str) -> ParsedVerdict {
    let object = match (raw.find('{'), raw.rfind('}')) {
        (Some(start), Some(end)) if start < end => {
            serde_json::from_str::<Value>(&raw[start..=end]).ok()
        }
        _ => None,
    };

    let Some(object) = object.filter(Value::is_object) else {
        return ParsedVerdict {
            verdict: DocumentVerdict::Valid,
            confidence: None,
            reason: Some(truncate(raw.trim(), RAW_REASON_LIMIT)),
            details: None,
        };
    };

    let text = |key: &str| {
        object
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let verdict = text("status").and_then(|status| status.parse::<DocumentVerdict>().ok());
    let confidence = object
        .get("confidence")
        .and_then(Value::as_f64)
        .map(|c| c.round().clamp(0.0, 100.0) as i32);

    match verdict {
        Some(verdict) => ParsedVerdict {
            verdict,
            confidence,
            reason: text("reason"),
            details: text("details"),
        },
        None => ParsedVerdict {
            verdict: DocumentVerdict::Error,
            confidence,
            reason: Some(
                text("reason").unwrap_or_else(|| "classification returned no status".to_string()),
            ),
            details: text("details"),
        },
    }
}

fn truncate(raw: &str, limit: usize) -> String {
    raw.chars().take(limit).collect()
}
