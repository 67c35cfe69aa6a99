//! Provider clients for streaming chat backends.
//!
//! Two provider families are supported: Gemini-style backends (key in an
//! `x-goog-api-key` header, candidates/parts response shape) and OpenAI-style
//! backends (Bearer auth, choices/delta response shape). Both are exposed
//! through the [`Provider`] trait so the chat session can hold a uniform
//! collection of backends and switch between them at runtime.

use std::fmt;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Response, header};
use serde::Deserialize;
use serde_json::json;

use crate::chunk::StreamChunk;
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::history::ChatHistory;
use crate::render::{LiveDisplay, RenderStyle, stream_to_string};
use crate::sse::process_sse;

const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const OPENAI_API_URL: &str = "https://api.openai.com/v1";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// A boxed stream of provider chunks.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>>;

///////////////////////////////////////// ProviderKind /////////////////////////////////////////

/// Which provider family a client speaks.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    /// Gemini-style backend.
    Gemini,
    /// OpenAI-style backend.
    OpenAi,
}

impl ProviderKind {
    /// Stable lowercase name, as accepted on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Gemini => "gemini",
            ProviderKind::OpenAi => "openai",
        }
    }

    /// Human-facing display name.
    pub fn label(&self) -> &'static str {
        match self {
            ProviderKind::Gemini => "Gemini",
            ProviderKind::OpenAi => "OpenAI",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "gemini" => Ok(ProviderKind::Gemini),
            "openai" => Ok(ProviderKind::OpenAi),
            _ => Err(Error::configuration(format!(
                "unknown provider {s:?}; expected \"gemini\" or \"openai\""
            ))),
        }
    }
}

/// One entry in a provider's model table.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ModelInfo {
    /// Model identifier sent on the wire.
    pub id: &'static str,
    /// Short human-facing description.
    pub description: &'static str,
}

/// Models offered by Gemini-style backends, default first.
pub const GEMINI_MODELS: &[ModelInfo] = &[
    ModelInfo {
        id: "gemini-2.0-flash",
        description: "Fast & efficient",
    },
    ModelInfo {
        id: "gemini-1.5-flash",
        description: "Balanced performance",
    },
    ModelInfo {
        id: "gemini-1.5-pro",
        description: "Most capable",
    },
    ModelInfo {
        id: "gemini-2.0-flash-exp",
        description: "Experimental",
    },
];

/// Models offered by OpenAI-style backends, default first.
pub const OPENAI_MODELS: &[ModelInfo] = &[
    ModelInfo {
        id: "gpt-4o",
        description: "Latest GPT-4 model",
    },
    ModelInfo {
        id: "gpt-4o-mini",
        description: "Fast & cost-effective",
    },
    ModelInfo {
        id: "gpt-4-turbo",
        description: "Previous generation",
    },
    ModelInfo {
        id: "gpt-3.5-turbo",
        description: "Legacy model",
    },
];

//////////////////////////////////////////// Provider ////////////////////////////////////////////

/// A streaming chat backend.
///
/// Implementations own their credentials, HTTP plumbing, and current model
/// selection. The session interacts with every backend through this trait
/// alone.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Which family this backend belongs to.
    fn kind(&self) -> ProviderKind;

    /// The models this backend offers.
    fn models(&self) -> &'static [ModelInfo];

    /// The currently selected model identifier.
    fn model(&self) -> &str;

    /// Selects a different model for subsequent requests.
    fn set_model(&mut self, model: String);

    /// Checks that the credential works by issuing a minimal non-streaming
    /// request. Returns false on any failure; never errors.
    async fn validate_connection(&self) -> bool;

    /// Opens a streaming completion for `prompt` given the prior `history`.
    ///
    /// The history does not include the new prompt; implementations append
    /// it when building the request payload.
    async fn open_stream(&self, prompt: &str, history: &ChatHistory) -> Result<ChunkStream>;

    /// Runs one full streaming exchange, rendering incrementally.
    ///
    /// Returns the complete response text, or `None` when the request fails
    /// or the user interrupts it. Failures are reported on the display; they
    /// never propagate, so the caller can leave its history untouched and
    /// move on to the next prompt.
    async fn stream_response(
        &self,
        prompt: &str,
        history: &ChatHistory,
        style: RenderStyle,
        display: &mut LiveDisplay,
        interrupt: Option<&AtomicBool>,
    ) -> Option<String> {
        let stream = match self.open_stream(prompt, history).await {
            Ok(stream) => stream,
            Err(e) => {
                display.print_error(&format!("{} error: {e}", self.kind().label()));
                return None;
            }
        };
        match stream_to_string(stream, style, display, interrupt).await {
            Ok(text) => Some(text),
            Err(e) if e.is_abort() => {
                display.print_info("Response interrupted");
                None
            }
            Err(e) => {
                display.print_error(&format!("{} error: {e}", self.kind().label()));
                None
            }
        }
    }
}

////////////////////////////////////////// HTTP plumbing /////////////////////////////////////////

fn build_http_client(timeout: Duration) -> Result<ReqwestClient> {
    ReqwestClient::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| {
            Error::http_client(
                format!("Failed to build HTTP client: {e}"),
                Some(Box::new(e)),
            )
        })
}

fn map_send_error(e: reqwest::Error, timeout: Duration) -> Error {
    if e.is_timeout() {
        Error::timeout(
            format!("Request timed out: {e}"),
            Some(timeout.as_secs_f64()),
        )
    } else if e.is_connect() {
        Error::connection(format!("Connection error: {e}"), Some(Box::new(e)))
    } else {
        Error::http_client(format!("Request failed: {e}"), Some(Box::new(e)))
    }
}

/// Process API response errors and convert to our Error type.
async fn process_error_response(response: Response) -> Error {
    let status_code = response.status().as_u16();

    let retry_after = response
        .headers()
        .get("retry-after")
        .and_then(|val| val.to_str().ok())
        .and_then(|val| val.parse::<u64>().ok());

    // Both provider families wrap errors in {"error": {...}}.
    #[derive(Deserialize)]
    struct ErrorResponse {
        error: Option<ErrorDetail>,
    }

    #[derive(Deserialize)]
    struct ErrorDetail {
        #[serde(rename = "type")]
        error_type: Option<String>,
        message: Option<String>,
        param: Option<String>,
    }

    let error_body = match response.text().await {
        Ok(body) => body,
        Err(e) => {
            return Error::http_client(
                format!("Failed to read error response: {e}"),
                Some(Box::new(e)),
            );
        }
    };

    let parsed_error = serde_json::from_str::<ErrorResponse>(&error_body).ok();
    let error_type = parsed_error
        .as_ref()
        .and_then(|e| e.error.as_ref())
        .and_then(|e| e.error_type.clone());
    let error_message = parsed_error
        .as_ref()
        .and_then(|e| e.error.as_ref())
        .and_then(|e| e.message.clone())
        .unwrap_or_else(|| error_body.clone());
    let error_param = parsed_error
        .as_ref()
        .and_then(|e| e.error.as_ref())
        .and_then(|e| e.param.clone());

    match status_code {
        400 => Error::bad_request(error_message, error_param),
        401 | 403 => Error::authentication(error_message),
        408 => Error::timeout(error_message, None),
        429 => Error::rate_limit(error_message, retry_after),
        500 => Error::internal_server(error_message),
        502..=504 => Error::service_unavailable(error_message, retry_after),
        _ => Error::api(status_code, error_type, error_message),
    }
}

//////////////////////////////////////////// Gemini //////////////////////////////////////////////

/// Client for Gemini-style backends.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    api_key: String,
    model: String,
    client: ReqwestClient,
    base_url: String,
    temperature: f32,
    max_tokens: u32,
    timeout: Duration,
}

impl GeminiClient {
    /// Creates a client from the resolved settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Authentication`] when no Gemini credential is
    /// configured.
    pub fn new(settings: &Settings) -> Result<Self> {
        let api_key = settings
            .gemini_api_key
            .clone()
            .ok_or_else(|| Error::authentication("GEMINI_API_KEY not set"))?;
        let timeout = DEFAULT_TIMEOUT;
        Ok(Self {
            api_key,
            model: GEMINI_MODELS[0].id.to_string(),
            client: build_http_client(timeout)?,
            base_url: GEMINI_API_URL.to_string(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            timeout,
        })
    }

    /// Overrides the API base URL. Used by tests against a local server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn default_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(
            "x-goog-api-key",
            HeaderValue::from_str(&self.api_key)
                .map_err(|_| Error::authentication("API key contains invalid header characters"))?,
        );
        Ok(headers)
    }

    fn request_body(&self, prompt: &str, history: &ChatHistory) -> serde_json::Value {
        let mut contents: Vec<serde_json::Value> = history
            .to_gemini_format()
            .into_iter()
            .map(|text| json!({"parts": [{"text": text}]}))
            .collect();
        contents.push(json!({"parts": [{"text": prompt}]}));
        json!({
            "contents": contents,
            "generationConfig": {
                "temperature": self.temperature,
                "maxOutputTokens": self.max_tokens,
            },
        })
    }
}

#[async_trait]
impl Provider for GeminiClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    fn models(&self) -> &'static [ModelInfo] {
        GEMINI_MODELS
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn set_model(&mut self, model: String) {
        self.model = model;
    }

    async fn validate_connection(&self) -> bool {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let headers = match self.default_headers() {
            Ok(headers) => headers,
            Err(_) => return false,
        };
        let body = json!({"contents": [{"parts": [{"text": "Hello"}]}]});
        match self
            .client
            .post(&url)
            .headers(headers)
            .json(&body)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    async fn open_stream(&self, prompt: &str, history: &ChatHistory) -> Result<ChunkStream> {
        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.base_url, self.model
        );

        let response = self
            .client
            .post(&url)
            .headers(self.default_headers()?)
            .json(&self.request_body(prompt, history))
            .send()
            .await
            .map_err(|e| map_send_error(e, self.timeout))?;

        if !response.status().is_success() {
            return Err(process_error_response(response).await);
        }

        Ok(Box::pin(process_sse(response.bytes_stream())))
    }
}

//////////////////////////////////////////// OpenAI //////////////////////////////////////////////

/// Client for OpenAI-style backends.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    api_key: String,
    model: String,
    client: ReqwestClient,
    base_url: String,
    temperature: f32,
    max_tokens: u32,
    timeout: Duration,
}

impl OpenAiClient {
    /// Creates a client from the resolved settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Authentication`] when no OpenAI credential is
    /// configured.
    pub fn new(settings: &Settings) -> Result<Self> {
        let api_key = settings
            .openai_api_key
            .clone()
            .ok_or_else(|| Error::authentication("OPENAI_API_KEY not set"))?;
        let timeout = DEFAULT_TIMEOUT;
        Ok(Self {
            api_key,
            model: OPENAI_MODELS[0].id.to_string(),
            client: build_http_client(timeout)?,
            base_url: OPENAI_API_URL.to_string(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            timeout,
        })
    }

    /// Overrides the API base URL. Used by tests against a local server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn default_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key))
                .map_err(|_| Error::authentication("API key contains invalid header characters"))?,
        );
        Ok(headers)
    }

    fn request_body(&self, prompt: &str, history: &ChatHistory) -> serde_json::Value {
        let mut messages: Vec<serde_json::Value> = history
            .to_openai_format()
            .into_iter()
            .map(|message| json!({"role": message.role, "content": message.content}))
            .collect();
        messages.push(json!({"role": "user", "content": prompt}));
        json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "stream": true,
        })
    }
}

#[async_trait]
impl Provider for OpenAiClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    fn models(&self) -> &'static [ModelInfo] {
        OPENAI_MODELS
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn set_model(&mut self, model: String) {
        self.model = model;
    }

    async fn validate_connection(&self) -> bool {
        let url = format!("{}/chat/completions", self.base_url);
        let headers = match self.default_headers() {
            Ok(headers) => headers,
            Err(_) => return false,
        };
        let body = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": "Hello"}],
            "max_tokens": 10,
        });
        match self
            .client
            .post(&url)
            .headers(headers)
            .json(&body)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    async fn open_stream(&self, prompt: &str, history: &ChatHistory) -> Result<ChunkStream> {
        let url = format!("{}/chat/completions", self.base_url);

        let response = self
            .client
            .post(&url)
            .headers(self.default_headers()?)
            .json(&self.request_body(prompt, history))
            .send()
            .await
            .map_err(|e| map_send_error(e, self.timeout))?;

        if !response.status().is_success() {
            return Err(process_error_response(response).await);
        }

        Ok(Box::pin(process_sse(response.bytes_stream())))
    }
}
