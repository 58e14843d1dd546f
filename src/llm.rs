//! Language-model capability and the Gemini client behind it.

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::retry::{RetryPolicy, retry};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// One request to the model.
#[derive(Debug, Clone, Default)]
pub struct Prompt {
    pub system: String,
    pub user: String,
    /// Response schema; when set the model must answer with matching JSON.
    pub schema: Option<serde_json::Value>,
    /// Let the model ground its answer with web search.
    pub web_search: bool,
}

impl Prompt {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            ..Default::default()
        }
    }

    pub fn with_schema(mut self, schema: serde_json::Value) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_web_search(mut self) -> Self {
        self.web_search = true;
        self
    }
}

/// Text-in, text-out model call.
pub trait LanguageModel: Send + Sync {
    fn generate(&self, prompt: Prompt) -> BoxFuture<'_, Result<String, LlmError>>;
}

/// Call the model with a schema and decode its JSON answer.
pub async fn generate_structured<T: DeserializeOwned>(
    llm: &dyn LanguageModel,
    prompt: Prompt,
) -> Result<T, LlmError> {
    let text = llm.generate(prompt).await?;
    let json = strip_code_fence(&text);
    serde_json::from_str(json).map_err(|e| LlmError::Parse(format!("{e}: {json}")))
}

/// Models sometimes wrap JSON in ```json fences even when asked not to.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[derive(Debug, Clone, PartialEq)]
pub enum LlmError {
    Http(String),
    Api { status: u16, body: String },
    Parse(String),
    Empty,
}

impl LlmError {
    fn is_retryable(&self) -> bool {
        match self {
            LlmError::Http(_) => true,
            LlmError::Api { status, .. } => *status == 429 || *status >= 500,
            LlmError::Parse(_) | LlmError::Empty => false,
        }
    }
}

impl std::fmt::Display for LlmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlmError::Http(e) => write!(f, "HTTP error: {e}"),
            LlmError::Api { status, body } => write!(f, "API error {status}: {body}"),
            LlmError::Parse(e) => write!(f, "Parse error: {e}"),
            LlmError::Empty => write!(f, "Empty response"),
        }
    }
}

impl std::error::Error for LlmError {}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    system_instruction: Content,
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part>,
}

#[derive(Serialize)]
struct Part {
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    response_schema: serde_json::Value,
}

#[derive(Deserialize, Debug)]
struct GenerateResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Deserialize, Debug)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize, Debug)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize, Debug)]
struct ResponsePart {
    text: Option<String>,
}

/// Gemini `generateContent` client.
pub struct GeminiClient {
    api_key: String,
    model: String,
    http: reqwest::Client,
    retry: RetryPolicy,
}

impl GeminiClient {
    pub fn new(api_key: String, model: String, retry: RetryPolicy) -> Self {
        Self {
            api_key,
            model,
            http: reqwest::Client::new(),
            retry,
        }
    }

    async fn generate_once(&self, prompt: &Prompt) -> Result<String, LlmError> {
        let request = build_request(prompt);
        let url = format!("{}/{}:generateContent", GEMINI_API_BASE, self.model);

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api { status: status.as_u16(), body });
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        let text = extract_text(parsed)?;
        debug!("Gemini answered with {} chars", text.len());
        Ok(text)
    }
}

impl LanguageModel for GeminiClient {
    fn generate(&self, prompt: Prompt) -> BoxFuture<'_, Result<String, LlmError>> {
        Box::pin(async move {
            retry(&self.retry, "Gemini request", LlmError::is_retryable, || {
                self.generate_once(&prompt)
            })
            .await
        })
    }
}

fn build_request(prompt: &Prompt) -> GenerateRequest {
    let tools = if prompt.web_search {
        vec![serde_json::json!({ "google_search": {} })]
    } else {
        vec![]
    };

    GenerateRequest {
        system_instruction: Content {
            role: None,
            parts: vec![Part { text: prompt.system.clone() }],
        },
        contents: vec![Content {
            role: Some("user"),
            parts: vec![Part { text: prompt.user.clone() }],
        }],
        tools,
        generation_config: prompt.schema.clone().map(|schema| GenerationConfig {
            response_mime_type: "application/json",
            response_schema: schema,
        }),
    }
}

fn extract_text(response: GenerateResponse) -> Result<String, LlmError> {
    let text: String = response
        .candidates
        .unwrap_or_default()
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        Err(LlmError::Empty)
    } else {
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_with_schema_sets_json_mime() {
        let prompt = Prompt::new("sys", "hi").with_schema(serde_json::json!({ "type": "OBJECT" }));
        let value = serde_json::to_value(build_request(&prompt)).unwrap();

        assert_eq!(value["systemInstruction"]["parts"][0]["text"], "sys");
        assert_eq!(value["contents"][0]["role"], "user");
        assert_eq!(value["generationConfig"]["responseMimeType"], "application/json");
        assert!(value.get("tools").is_none());
    }

    #[test]
    fn test_request_with_web_search_adds_tool() {
        let prompt = Prompt::new("sys", "news?").with_web_search();
        let value = serde_json::to_value(build_request(&prompt)).unwrap();

        assert!(value["tools"][0].get("google_search").is_some());
        assert!(value.get("generationConfig").is_none());
    }

    #[test]
    fn test_extract_text_joins_parts() {
        let response: GenerateResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"Hello "},{"text":"runner"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(extract_text(response).unwrap(), "Hello runner");
    }

    #[test]
    fn test_extract_text_empty_is_error() {
        let response: GenerateResponse = serde_json::from_str(r#"{"candidates":[]}"#).unwrap();
        assert_eq!(extract_text(response), Err(LlmError::Empty));
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("  {\"a\":1} "), "{\"a\":1}");
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(LlmError::Api { status: 429, body: String::new() }.is_retryable());
        assert!(LlmError::Api { status: 503, body: String::new() }.is_retryable());
        assert!(!LlmError::Api { status: 400, body: String::new() }.is_retryable());
        assert!(!LlmError::Empty.is_retryable());
    }
}
