//! Inference clients for embeddings (TEI/Ollama) and chat completions
//! (Ollama/OpenAI-compatible endpoints such as Groq).

use crate::config::{env_or_default, env_parse};
use crate::ports::{CompletionOptions, EmbeddingService, LanguageModel};
use crate::{AgentError, Result};
use async_trait::async_trait;
use graphrag_core::{CoreError, ModelOutput};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, instrument};

const DEFAULT_TEI_URL: &str = "http://localhost:8081";
const DEFAULT_TEI_PROVIDER: &str = "tei";
const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const DEFAULT_OLLAMA_EMBED_MODEL: &str = "nomic-embed-text:latest";
const DEFAULT_LLM_PROVIDER: &str = "ollama";
const DEFAULT_OLLAMA_MODEL: &str = "phi4-mini:latest";
const DEFAULT_OPENAI_URL: &str = "https://api.groq.com/openai/v1";
const DEFAULT_OPENAI_MODEL: &str = "llama-3.3-70b-versatile";

const STRUCTURED_SYSTEM_PROMPT: &str = "You are a strict JSON generator. Output MUST be a single JSON object matching the provided schema. No prose, no markdown.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TeiProvider {
    Tei,
    Ollama,
}

/// Embedding client for a TEI server or Ollama
#[derive(Clone)]
pub struct TeiClient {
    client: Client,
    base_url: String,
    provider: TeiProvider,
    model: String,
    expected_dimension: Option<usize>,
}

impl TeiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            provider: TeiProvider::Tei,
            model: DEFAULT_OLLAMA_EMBED_MODEL.to_string(),
            expected_dimension: None,
        }
    }

    /// Ollama-backed embeddings
    pub fn ollama(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: TeiProvider::Ollama,
            model: model.into(),
            ..Self::new(base_url)
        }
    }

    pub fn default_local() -> Self {
        let provider = env_or_default("TEI_PROVIDER", DEFAULT_TEI_PROVIDER);
        let client = if provider.eq_ignore_ascii_case("ollama") {
            let url = env_or_default("TEI_URL", DEFAULT_OLLAMA_URL);
            let model = env_or_default("TEI_MODEL", DEFAULT_OLLAMA_EMBED_MODEL);
            Self::ollama(url, model)
        } else {
            Self::new(env_or_default("TEI_URL", DEFAULT_TEI_URL))
        };

        match env_parse::<usize>("EMBEDDING_DIMENSION", 0) {
            0 => client,
            dim => client.with_expected_dimension(dim),
        }
    }

    /// Reject embeddings whose length differs from `dimension`
    pub fn with_expected_dimension(mut self, dimension: usize) -> Self {
        self.expected_dimension = Some(dimension);
        self
    }

    #[instrument(skip(self, text))]
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embedding = match self.provider {
            TeiProvider::Ollama => self.ollama_embed(text).await?,
            TeiProvider::Tei => self.tei_embed(text).await?,
        };
        self.validate_embedding_dim(embedding.len())?;
        debug!("Embedded {} chars into {} dims", text.len(), embedding.len());
        Ok(embedding)
    }

    pub async fn health(&self) -> Result<bool> {
        let url = match self.provider {
            TeiProvider::Tei => format!("{}/health", self.base_url),
            TeiProvider::Ollama => format!("{}/api/tags", self.base_url),
        };
        let response = self.client.get(&url).send().await?;
        Ok(response.status().is_success())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn tei_embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/embed", self.base_url);
        let request = TeiEmbedRequest {
            inputs: text,
            truncate: true,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json::<Value>()
            .await?;

        parse_embedding_response(response)
    }

    async fn ollama_embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.base_url);
        let request = OllamaEmbedRequest {
            model: &self.model,
            prompt: text,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json::<OllamaEmbedResponse>()
            .await?;

        Ok(response.embedding)
    }

    fn validate_embedding_dim(&self, len: usize) -> Result<()> {
        if len == 0 {
            return Err(AgentError::Processing("Empty embedding returned".into()));
        }
        match self.expected_dimension {
            Some(expected) if expected != len => Err(CoreError::InvalidEmbeddingDimension {
                expected,
                actual: len,
            }
            .into()),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl EmbeddingService for TeiClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        TeiClient::embed(self, text).await
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LlmProvider {
    Ollama,
    OpenAi,
}

/// Chat-completion client for Ollama or any OpenAI-compatible API
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    base_url: String,
    provider: LlmProvider,
    model: String,
    api_key: Option<String>,
}

impl LlmClient {
    /// Ollama chat endpoint
    pub fn ollama(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            provider: LlmProvider::Ollama,
            model: model.into(),
            api_key: None,
        }
    }

    /// OpenAI-compatible `/chat/completions` endpoint
    pub fn openai_compatible(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            provider: LlmProvider::OpenAi,
            model: model.into(),
            api_key,
        }
    }

    pub fn default_local() -> Self {
        let provider = env_or_default("LLM_PROVIDER", DEFAULT_LLM_PROVIDER);
        if provider.eq_ignore_ascii_case("openai") || provider.eq_ignore_ascii_case("groq") {
            let url = env_or_default("LLM_URL", DEFAULT_OPENAI_URL);
            let model = env_or_default("LLM_MODEL", DEFAULT_OPENAI_MODEL);
            let api_key = std::env::var("LLM_API_KEY")
                .or_else(|_| std::env::var("GROQ_API_KEY"))
                .ok();
            Self::openai_compatible(url, model, api_key)
        } else {
            let url = env_or_default("LLM_URL", DEFAULT_OLLAMA_URL);
            let model = env_or_default("LLM_MODEL", DEFAULT_OLLAMA_MODEL);
            Self::ollama(url, model)
        }
    }

    pub async fn health(&self) -> Result<bool> {
        let url = match self.provider {
            LlmProvider::Ollama => format!("{}/api/tags", self.base_url),
            LlmProvider::OpenAi => format!("{}/models", self.base_url),
        };
        let mut request = self.client.get(&url);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?;
        Ok(response.status().is_success())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn chat(
        &self,
        messages: Vec<ChatMessage<'_>>,
        options: CompletionOptions,
        schema: Option<&Value>,
    ) -> Result<String> {
        match self.provider {
            LlmProvider::Ollama => self.ollama_chat(messages, options, schema).await,
            LlmProvider::OpenAi => self.openai_chat(messages, options, schema.is_some()).await,
        }
    }

    async fn ollama_chat(
        &self,
        messages: Vec<ChatMessage<'_>>,
        options: CompletionOptions,
        schema: Option<&Value>,
    ) -> Result<String> {
        let url = format!("{}/api/chat", self.base_url);
        let request = OllamaChatRequest {
            model: &self.model,
            messages,
            stream: false,
            format: schema.cloned(),
            options: json!({
                "temperature": options.temperature,
                "num_predict": options.max_tokens,
            }),
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json::<OllamaChatResponse>()
            .await?;

        if let Some(done_reason) = response.done_reason.as_deref() {
            debug!("Ollama chat done_reason={}", done_reason);
        }

        Ok(response.message.content)
    }

    async fn openai_chat(
        &self,
        messages: Vec<ChatMessage<'_>>,
        options: CompletionOptions,
        json_mode: bool,
    ) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = OpenAiChatRequest {
            model: &self.model,
            messages,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            response_format: json_mode.then(|| json!({ "type": "json_object" })),
        };

        let mut builder = self.client.post(&url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await?
            .error_for_status()?
            .json::<OpenAiChatResponse>()
            .await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                AgentError::ModelInvocationFailed("completion response had no choices".into())
            })
    }
}

#[async_trait]
impl LanguageModel for LlmClient {
    #[instrument(skip(self, prompt), fields(model = %self.model))]
    async fn complete(&self, prompt: &str, options: CompletionOptions) -> Result<String> {
        let messages = vec![ChatMessage {
            role: "user",
            content: prompt,
        }];
        self.chat(messages, options, None).await
    }

    #[instrument(skip(self, prompt, schema), fields(model = %self.model))]
    async fn complete_structured(&self, prompt: &str, schema: &Value) -> Result<ModelOutput<Value>> {
        let schema_text = schema.to_string();
        let user_prompt = format!("{prompt}\n\nSchema:\n{schema_text}");
        let messages = vec![
            ChatMessage {
                role: "system",
                content: STRUCTURED_SYSTEM_PROMPT,
            },
            ChatMessage {
                role: "user",
                content: &user_prompt,
            },
        ];
        let options = CompletionOptions {
            temperature: 0.0,
            max_tokens: 512,
        };

        let generated = self.chat(messages, options, Some(schema)).await?;
        Ok(parse_structured_output(&generated))
    }
}

/// Interpret model output as JSON, tolerating code fences and chatter
pub fn parse_structured_output(generated: &str) -> ModelOutput<Value> {
    let cleaned = normalize_json_payload(generated);
    match serde_json::from_str::<Value>(&cleaned) {
        Ok(value) => ModelOutput::Parsed(value),
        Err(e) => {
            debug!("Structured output is not valid JSON ({}): {}", e, generated);
            ModelOutput::Malformed(generated.to_string())
        }
    }
}

#[derive(Serialize)]
struct TeiEmbedRequest<'a> {
    inputs: &'a str,
    truncate: bool,
}

#[derive(Serialize)]
struct OllamaEmbedRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct OllamaEmbedResponse {
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<Value>,
    options: Value,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: OllamaChatMessageResponse,
    #[serde(default)]
    done_reason: Option<String>,
}

#[derive(Deserialize)]
struct OllamaChatMessageResponse {
    content: String,
}

#[derive(Serialize)]
struct OpenAiChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
}

#[derive(Deserialize)]
struct OpenAiChatResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Deserialize)]
struct OpenAiMessage {
    #[serde(default)]
    content: Option<String>,
}

fn parse_embedding_response(value: Value) -> Result<Vec<f32>> {
    match value {
        Value::Array(items) => {
            if items.is_empty() {
                return Ok(Vec::new());
            }
            if items.first().map(|v| v.is_number()).unwrap_or(false) {
                serde_json::from_value(Value::Array(items)).map_err(|e| {
                    AgentError::Processing(format!("Invalid TEI embedding array: {}", e))
                })
            } else {
                let first = items.into_iter().next().ok_or_else(|| {
                    AgentError::Processing("Missing embeddings".to_string())
                })?;
                serde_json::from_value(first).map_err(|e| {
                    AgentError::Processing(format!("Invalid TEI embedding array: {}", e))
                })
            }
        }
        other => Err(AgentError::Processing(format!(
            "Unexpected TEI response format: {}",
            other
        ))),
    }
}

/// Strip code fences and surrounding prose from a JSON answer
pub(crate) fn normalize_json_payload(payload: &str) -> String {
    let trimmed = payload.trim();
    if trimmed.is_empty() {
        return trimmed.to_string();
    }

    let without_fence = if trimmed.starts_with("```") {
        let mut lines = trimmed.lines();
        let _ = lines.next(); // drop ``` or ```json
        let mut content = lines.collect::<Vec<_>>().join("\n");
        if content.ends_with("```") {
            content.truncate(content.len().saturating_sub(3));
        }
        content.trim().to_string()
    } else {
        trimmed.to_string()
    };

    if let (Some(start), Some(end)) = (without_fence.find('{'), without_fence.rfind('}')) {
        if start < end {
            return without_fence[start..=end].to_string();
        }
    }

    without_fence
}
