//! LLM clients for Cypher generation

use crate::config::{LLMProvider, NLQConfig};
use crate::nlq::{LlmError, LlmResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Canned answer of the offline provider
pub const MOCK_QUERY: &str = "MATCH (n) RETURN n LIMIT 10";

/// Text completion capability used by the pipeline.
///
/// Implementations keep sampling randomness at its minimum; callers only
/// choose the completion budget.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(&self, system: &str, user: &str, max_tokens: u32) -> LlmResult<String>;
}

/// Config-driven client for the supported providers
pub struct NLQClient {
    client: Client,
    config: NLQConfig,
    api_base_url: String,
}

impl NLQClient {
    pub fn new(config: &NLQConfig) -> LlmResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| LlmError::ConfigError(e.to_string()))?;

        if config.provider.requires_api_key() && config.api_key.is_none() {
            return Err(LlmError::ConfigError(format!(
                "{:?} requires an API key",
                config.provider
            )));
        }

        let api_base_url = config
            .api_base_url
            .clone()
            .unwrap_or_else(|| config.provider.default_base_url().to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            client,
            config: config.clone(),
            api_base_url,
        })
    }

    pub fn provider(&self) -> LLMProvider {
        self.config.provider
    }

    fn api_key(&self) -> LlmResult<&str> {
        self.config
            .api_key
            .as_deref()
            .ok_or_else(|| LlmError::ConfigError(format!("{:?} requires an API key", self.config.provider)))
    }

    /// Chat completions; OpenAI and Groq share this wire format
    async fn openai_chat(&self, system: &str, user: &str, max_tokens: u32) -> LlmResult<String> {
        #[derive(Serialize)]
        struct Message<'a> {
            role: &'a str,
            content: &'a str,
        }

        #[derive(Serialize)]
        struct Request<'a> {
            model: &'a str,
            messages: Vec<Message<'a>>,
            temperature: f32,
            max_tokens: u32,
        }

        #[derive(Deserialize)]
        struct Response {
            choices: Vec<Choice>,
        }

        #[derive(Deserialize)]
        struct Choice {
            message: MessageContent,
        }

        #[derive(Deserialize)]
        struct MessageContent {
            content: Option<String>,
        }

        let api_key = self.api_key()?;
        let url = format!("{}/chat/completions", self.api_base_url);
        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&Request {
                model: &self.config.model,
                messages: vec![
                    Message { role: "system", content: system },
                    Message { role: "user", content: user },
                ],
                temperature: 0.0,
                max_tokens,
            })
            .send()
            .await
            .map_err(|e| LlmError::NetworkError(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(LlmError::ApiError(format!("{:?} error {}: {}", self.config.provider, status, text)));
        }

        let result: Response = resp
            .json()
            .await
            .map_err(|e| LlmError::SerializationError(e.to_string()))?;
        Ok(result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }

    async fn ollama_chat(&self, system: &str, user: &str, max_tokens: u32) -> LlmResult<String> {
        #[derive(Serialize)]
        struct Options {
            temperature: f32,
            num_predict: u32,
        }

        #[derive(Serialize)]
        struct Request<'a> {
            model: &'a str,
            prompt: &'a str,
            system: &'a str,
            stream: bool,
            options: Options,
        }

        #[derive(Deserialize)]
        struct Response {
            response: String,
        }

        let url = format!("{}/api/generate", self.api_base_url);
        let resp = self
            .client
            .post(&url)
            .json(&Request {
                model: &self.config.model,
                prompt: user,
                system,
                stream: false,
                options: Options {
                    temperature: 0.0,
                    num_predict: max_tokens,
                },
            })
            .send()
            .await
            .map_err(|e| LlmError::NetworkError(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(LlmError::ApiError(format!("Ollama error: {}", resp.status())));
        }

        let result: Response = resp
            .json()
            .await
            .map_err(|e| LlmError::SerializationError(e.to_string()))?;
        Ok(result.response)
    }

    async fn gemini_chat(&self, system: &str, user: &str, max_tokens: u32) -> LlmResult<String> {
        #[derive(Serialize)]
        struct Request {
            contents: Vec<Content>,
            #[serde(rename = "generationConfig")]
            generation_config: GenerationConfig,
        }

        #[derive(Serialize, Deserialize)]
        struct Content {
            role: Option<String>,
            parts: Vec<Part>,
        }

        #[derive(Serialize, Deserialize)]
        struct Part {
            text: String,
        }

        #[derive(Serialize)]
        struct GenerationConfig {
            temperature: f32,
            #[serde(rename = "maxOutputTokens")]
            max_output_tokens: u32,
        }

        #[derive(Deserialize)]
        struct Response {
            candidates: Option<Vec<Candidate>>,
        }

        #[derive(Deserialize)]
        struct Candidate {
            content: Content,
        }

        let api_key = self.api_key()?;

        // System instruction travels as the head of the single user turn
        let full_prompt = format!("{}\n\nQuestion: {}", system, user);

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.api_base_url, self.config.model, api_key
        );

        let resp = self
            .client
            .post(&url)
            .json(&Request {
                contents: vec![Content {
                    role: Some("user".to_string()),
                    parts: vec![Part { text: full_prompt }],
                }],
                generation_config: GenerationConfig {
                    temperature: 0.0,
                    max_output_tokens: max_tokens,
                },
            })
            .send()
            .await
            .map_err(|e| LlmError::NetworkError(e.to_string()))?;

        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(LlmError::ApiError(format!("Gemini error: {}", text)));
        }

        let result: Response = resp
            .json()
            .await
            .map_err(|e| LlmError::SerializationError(e.to_string()))?;

        Ok(result
            .candidates
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .unwrap_or_default())
    }
}

#[async_trait]
impl LlmClient for NLQClient {
    async fn generate(&self, system: &str, user: &str, max_tokens: u32) -> LlmResult<String> {
        let raw = match self.config.provider {
            LLMProvider::OpenAI | LLMProvider::Groq => self.openai_chat(system, user, max_tokens).await?,
            LLMProvider::Ollama => self.ollama_chat(system, user, max_tokens).await?,
            LLMProvider::Gemini => self.gemini_chat(system, user, max_tokens).await?,
            LLMProvider::Mock => MOCK_QUERY.to_string(),
        };
        Ok(raw.trim().to_string())
    }
}
