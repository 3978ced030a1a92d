use anyhow::{anyhow, Context, Result};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::agent::{build_extraction_prompt, ExtractionAgent};

const EXTRACTION_SYSTEM_PROMPT: &str =
    "Sei un estrattore di dati da documenti. Rispondi solo con JSON valido, senza commenti.";

/// Where the extraction model runs.
///
/// Only Ollama's local HTTP API is supported: documents never leave the
/// machine, so a non-local base URL is refused.
#[derive(Debug, Clone)]
pub struct OllamaClientConfig {
    pub base_url: String,
    pub model: String,
}

impl Default for OllamaClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "llama3.2".to_string(),
        }
    }
}

impl OllamaClientConfig {
    /// `OLLAMA_BASE_URL` and `OLLAMA_MODEL`, falling back to the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let base_url = std::env::var("OLLAMA_BASE_URL").unwrap_or(defaults.base_url);
        let model = std::env::var("OLLAMA_MODEL").unwrap_or(defaults.model);
        Self { base_url, model }
    }
}

/// Blocking client for `/api/chat`, used as the document extraction agent.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: Client,
    base_url: Url,
    model: String,
}

impl OllamaClient {
    pub fn new(config: OllamaClientConfig) -> Result<Self> {
        let base_url = validate_local_base_url(&config.base_url)?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url,
            model: config.model,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Single-turn chat call. Returns the trimmed assistant message.
    pub fn chat(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let endpoint = self
            .base_url
            .join("api/chat")
            .context("Failed to build Ollama /api/chat URL")?;

        let request = OllamaChatRequest {
            model: self.model.clone(),
            stream: false,
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: system_prompt.to_string(),
                },
                Message {
                    role: "user".to_string(),
                    content: user_prompt.to_string(),
                },
            ],
            format: Some("json".to_string()),
            options: Some(OllamaOptions {
                temperature: Some(0.0),
            }),
        };

        let response: OllamaChatResponse = self
            .http
            .post(endpoint.clone())
            .json(&request)
            .send()
            .with_context(|| format!("POST {endpoint} failed"))?
            .error_for_status()
            .with_context(|| format!("POST {endpoint} returned non-success status"))?
            .json()
            .with_context(|| format!("Failed to parse JSON response from {endpoint}"))?;

        let content = response
            .message
            .map(|m| m.content)
            .ok_or_else(|| anyhow!("Ollama response had no message content"))?;

        Ok(content.trim().to_string())
    }
}

impl ExtractionAgent for OllamaClient {
    fn describe(&self) -> String {
        format!("ollama ({})", self.model)
    }

    fn ask(&self, document_text: &str, fields: &[&str]) -> Result<String> {
        let prompt = build_extraction_prompt(fields, document_text);
        tracing::debug!(
            "Sending {} char(s) of document text to {}",
            document_text.chars().count(),
            self.describe()
        );
        self.chat(EXTRACTION_SYSTEM_PROMPT, &prompt)
    }
}

fn validate_local_base_url(base_url: &str) -> Result<Url> {
    let url =
        Url::parse(base_url).with_context(|| format!("Invalid OLLAMA_BASE_URL: {base_url}"))?;

    match url.scheme() {
        "http" => {}
        other => {
            return Err(anyhow!(
                "Unsupported scheme '{other}' for OLLAMA_BASE_URL (use http://localhost:11434)"
            ))
        }
    }

    let host = url
        .host_str()
        .ok_or_else(|| anyhow!("OLLAMA_BASE_URL is missing a host"))?;

    let is_local = host.eq_ignore_ascii_case("localhost")
        || host == "127.0.0.1"
        || host == "::1"
        || host == "[::1]";

    if !is_local {
        return Err(anyhow!(
            "Refusing non-local OLLAMA_BASE_URL host '{host}'. Documents are only sent to a local Ollama (use http://localhost:11434)."
        ));
    }

    Ok(url)
}

#[derive(Debug, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<Message>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: Option<Message>,
}
