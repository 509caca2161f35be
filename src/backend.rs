use crate::config::{BackendSettings, Config};
use crate::error::BackendError;
use crate::retry::{with_retry_if, RetryConfig};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

// ==================== Single-item API ====================

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    #[serde(rename = "ToLang")]
    to_lang: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    translate: Option<String>,
}

/// HTTP translation API that handles one string per request.
#[derive(Debug, Clone)]
pub struct ApiBackend {
    client: reqwest::Client,
    endpoint: String,
    headers: BTreeMap<String, String>,
    target_lang: String,
    delay: Duration,
    retry: RetryConfig,
}

impl ApiBackend {
    pub fn new(
        endpoint: impl Into<String>,
        target_lang: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            endpoint: endpoint.into(),
            headers: BTreeMap::new(),
            target_lang: target_lang.into(),
            delay: Duration::ZERO,
            retry: RetryConfig::default(),
        })
    }

    pub fn with_headers(mut self, headers: BTreeMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    /// Pause after every successful call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub async fn translate(&self, text: &str) -> Result<String, BackendError> {
        let request = ApiRequest {
            to_lang: &self.target_lang,
            text,
        };

        let translated = with_retry_if(
            &self.retry,
            "Translation API",
            || self.send(&request),
            BackendError::is_retryable,
        )
        .await?;

        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }
        Ok(translated)
    }

    async fn send(&self, request: &ApiRequest<'_>) -> Result<String, BackendError> {
        let mut builder = self.client.post(&self.endpoint).json(request);
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ApiResponse = serde_json::from_str(&body)
            .map_err(|e| BackendError::Decode(format!("{} (body: {})", e, body)))?;

        let translated = parsed.translate.unwrap_or_default().trim().to_string();
        if translated.is_empty() {
            return Err(BackendError::EmptyTranslation(request.text.to_string()));
        }
        Ok(translated)
    }
}

// ==================== Chat completions (batched) ====================

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

fn build_batch_system_prompt() -> &'static str {
    "Translate each item to the target language. These items are all names of \
     industrial electrical components. Return ONLY a JSON array of translated strings \
     in the same order."
}

fn build_batch_user_prompt(texts: &[String], target_language: &str) -> String {
    let items = Value::from(texts.to_vec()).to_string();
    format!("Target language: {}\nItems: {}", target_language, items)
}

/// Decode an LLM reply that should be a JSON array.
///
/// The whole reply is decoded first. If that fails, or yields something other
/// than an array, the text between the first `[` and the last `]` is decoded
/// instead, which tolerates prose around the array.
pub fn decode_json_array(text: &str) -> Result<Vec<Value>, BackendError> {
    if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(text) {
        return Ok(items);
    }

    let (Some(start), Some(end)) = (text.find('['), text.rfind(']')) else {
        return Err(BackendError::NoArray);
    };
    if end <= start {
        return Err(BackendError::NoArray);
    }

    // The slice starts with `[`, so anything that decodes is an array
    serde_json::from_str::<Vec<Value>>(&text[start..=end])
        .map_err(|e| BackendError::Decode(format!("Failed to parse JSON array in reply: {}", e)))
}

/// OpenAI-compatible chat API translating a whole batch per request.
#[derive(Debug, Clone)]
pub struct ChatBackend {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    target_lang: String,
    delay: Duration,
    retry: RetryConfig,
}

impl ChatBackend {
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        model: impl Into<String>,
        target_lang: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            api_url: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            api_key: api_key.into(),
            model: model.into(),
            target_lang: target_lang.into(),
            delay: Duration::ZERO,
            retry: RetryConfig::default(),
        })
    }

    /// Pause after every successful batch.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Translate `texts`, returning translations in the same order.
    pub async fn translate_many(&self, texts: &[String]) -> Result<Vec<String>, BackendError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: build_batch_system_prompt().to_string(),
                },
                Message {
                    role: "user".to_string(),
                    content: build_batch_user_prompt(texts, &self.target_lang),
                },
            ],
            temperature: 0.0,
        };

        let content = with_retry_if(
            &self.retry,
            "Batch translation",
            || self.send(&request),
            BackendError::is_retryable,
        )
        .await?;

        let items = decode_json_array(&content)?;
        if items.len() != texts.len() {
            return Err(BackendError::LengthMismatch {
                expected: texts.len(),
                got: items.len(),
            });
        }

        let translations = items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => s.trim().to_string(),
                other => other.to_string(),
            })
            .collect();

        debug!("Translated batch of {} items", texts.len());

        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }
        Ok(translations)
    }

    /// Translate a single string as a batch of one.
    pub async fn translate(&self, text: &str) -> Result<String, BackendError> {
        let translated = self
            .translate_many(&[text.to_string()])
            .await?
            .pop()
            .unwrap_or_default();

        if translated.is_empty() {
            return Err(BackendError::EmptyTranslation(text.to_string()));
        }
        Ok(translated)
    }

    async fn send(&self, request: &ChatRequest) -> Result<String, BackendError> {
        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let chat: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| BackendError::Decode(format!("{} (body: {})", e, body)))?;

        chat.choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or(BackendError::EmptyResponse)
    }
}

// ==================== Backend selection ====================

/// The translation service for a run, fixed at construction.
#[derive(Debug, Clone)]
pub enum Backend {
    SingleItem(ApiBackend),
    Batched(ChatBackend),
}

impl Backend {
    pub fn from_config(config: &Config) -> Result<Self> {
        let retry = RetryConfig::backend(config.max_attempts);

        let backend = match &config.backend {
            BackendSettings::Api { endpoint, headers } => Backend::SingleItem(
                ApiBackend::new(endpoint.as_str(), config.backend_target_lang.as_str(), config.timeout)
                    .context("Failed to create HTTP client")?
                    .with_headers(headers.clone())
                    .with_delay(config.delay)
                    .with_retry(retry),
            ),
            BackendSettings::OpenAi {
                api_key,
                base_url,
                model,
            } => Backend::Batched(
                ChatBackend::new(
                    base_url,
                    api_key.as_str(),
                    model.as_str(),
                    config.backend_target_lang.as_str(),
                    config.timeout,
                )
                .context("Failed to create HTTP client")?
                .with_delay(config.delay)
                .with_retry(retry),
            ),
        };

        Ok(backend)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Backend::SingleItem(_) => "api",
            Backend::Batched(_) => "openai",
        }
    }

    pub async fn translate(&self, text: &str) -> Result<String, BackendError> {
        match self {
            Backend::SingleItem(api) => api.translate(text).await,
            Backend::Batched(chat) => chat.translate(text).await,
        }
    }

    /// The batch-capable backend, if this is one.
    pub fn as_batched(&self) -> Option<&ChatBackend> {
        match self {
            Backend::Batched(chat) => Some(chat),
            Backend::SingleItem(_) => None,
        }
    }
}
