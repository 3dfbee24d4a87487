use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use maitre_core::config::{LlmConfig, LlmProvider};

use crate::http::{join_url, HttpError, JsonClient};
use crate::persona::Persona;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OLLAMA_BASE_URL: &str = "http://localhost:11434";
const TEMPERATURE: f32 = 0.2;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("answer provider is misconfigured: {0}")]
    Configuration(String),
    #[error("answer provider request failed: {0}")]
    Provider(#[from] HttpError),
    #[error("answer provider returned no content")]
    EmptyResponse,
}

/// Produces a text answer for a rendered prompt in a persona's voice.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    fn model_id(&self) -> &str;

    async fn generate(&self, prompt: &str, persona: Persona) -> Result<String, GenerationError>;
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

fn chat_messages<'a>(system: &'a str, prompt: &'a str) -> Vec<ChatMessage<'a>> {
    vec![ChatMessage { role: "system", content: system }, ChatMessage { role: "user", content: prompt }]
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

impl ChatCompletionResponse {
    fn into_text(self) -> Result<String, GenerationError> {
        self.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(GenerationError::EmptyResponse)
    }
}

/// Chat completions client for OpenAI and compatible hosts such as Groq.
pub struct OpenAiCompatibleGenerator {
    http: JsonClient,
    base_url: String,
    api_key: SecretString,
    model: String,
}

impl OpenAiCompatibleGenerator {
    pub fn new(
        http: JsonClient,
        base_url: impl Into<String>,
        api_key: SecretString,
        model: impl Into<String>,
    ) -> Self {
        Self { http, base_url: base_url.into(), api_key, model: model.into() }
    }
}

#[async_trait]
impl AnswerGenerator for OpenAiCompatibleGenerator {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str, persona: Persona) -> Result<String, GenerationError> {
        let system = persona.system_prompt();
        let request = ChatCompletionRequest {
            model: &self.model,
            messages: chat_messages(&system, prompt),
            temperature: TEMPERATURE,
            stream: false,
        };

        let response: ChatCompletionResponse = self
            .http
            .post(&join_url(&self.base_url, "chat/completions"), Some(&self.api_key), &request)
            .await?;
        response.into_text()
    }
}

#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: ResponseMessage,
}

pub struct OllamaGenerator {
    http: JsonClient,
    base_url: String,
    model: String,
}

impl OllamaGenerator {
    pub fn new(http: JsonClient, base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self { http, base_url: base_url.into(), model: model.into() }
    }
}

#[async_trait]
impl AnswerGenerator for OllamaGenerator {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str, persona: Persona) -> Result<String, GenerationError> {
        let system = persona.system_prompt();
        let request = OllamaChatRequest {
            model: &self.model,
            messages: chat_messages(&system, prompt),
            stream: false,
        };

        let response: OllamaChatResponse =
            self.http.post(&join_url(&self.base_url, "api/chat"), None, &request).await?;
        response
            .message
            .content
            .filter(|content| !content.trim().is_empty())
            .ok_or(GenerationError::EmptyResponse)
    }
}

pub fn build_generator(config: &LlmConfig) -> Result<Arc<dyn AnswerGenerator>, GenerationError> {
    let http = JsonClient::new(Duration::from_secs(config.timeout_secs), config.max_retries)?;

    match config.provider {
        LlmProvider::OpenAi => {
            let api_key = config.api_key.clone().ok_or_else(|| {
                GenerationError::Configuration("llm.api_key is required".to_string())
            })?;
            let base_url = config.base_url.clone().unwrap_or_else(|| OPENAI_BASE_URL.to_string());
            Ok(Arc::new(OpenAiCompatibleGenerator::new(http, base_url, api_key, &config.model)))
        }
        LlmProvider::Ollama => {
            let base_url = config.base_url.clone().unwrap_or_else(|| OLLAMA_BASE_URL.to_string());
            Ok(Arc::new(OllamaGenerator::new(http, base_url, &config.model)))
        }
    }
}

#[cfg(test)]
mod tests {
    use maitre_core::config::{AppConfig, LlmProvider};

    use super::{build_generator, ChatCompletionResponse, GenerationError, OllamaChatResponse};

    #[test]
    fn chat_completion_text_is_first_choice() {
        let response: ChatCompletionResponse = serde_json::from_str(
            r#"{"id":"c1","choices":[{"index":0,"message":{"role":"assistant","content":"We open at 5 PM."},"finish_reason":"stop"}]}"#,
        )
        .expect("decode");
        assert_eq!(response.into_text().expect("text"), "We open at 5 PM.");
    }

    #[test]
    fn empty_choices_are_an_error() {
        let response: ChatCompletionResponse =
            serde_json::from_str(r#"{"choices":[]}"#).expect("decode");
        assert!(matches!(response.into_text(), Err(GenerationError::EmptyResponse)));
    }

    #[test]
    fn ollama_response_decodes_message_content() {
        let response: OllamaChatResponse = serde_json::from_str(
            r#"{"model":"llama3.1","message":{"role":"assistant","content":"Yes, we have vegan naan."},"done":true}"#,
        )
        .expect("decode");
        assert_eq!(response.message.content.as_deref(), Some("Yes, we have vegan naan."));
    }

    #[test]
    fn openai_provider_without_key_is_a_configuration_error() {
        let mut config = AppConfig::default().llm;
        config.provider = LlmProvider::OpenAi;
        config.api_key = None;

        assert!(matches!(build_generator(&config), Err(GenerationError::Configuration(_))));
    }

    #[test]
    fn default_config_builds_ollama_generator() {
        let generator = build_generator(&AppConfig::default().llm).expect("generator");
        assert_eq!(generator.model_id(), "llama3.1");
    }
}
