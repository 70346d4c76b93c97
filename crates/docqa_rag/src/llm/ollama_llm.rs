use std::time::Duration;

use docqa_core::config::GeneratorConfig;
use docqa_core::domain::Message;
use docqa_core::error::AppError;
use serde::{Deserialize, Serialize};

use super::Generator;
use crate::ollama::OllamaClient;

/// Non-streaming client for Ollama's `/api/chat`.
#[derive(Debug, Clone)]
pub struct OllamaGenerator {
    client: OllamaClient,
    model: String,
    temperature: f32,
    timeout: Duration,
}

impl OllamaGenerator {
    pub fn new(client: OllamaClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            temperature: 0.7,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn from_config(cfg: &GeneratorConfig) -> Result<Self, AppError> {
        let client = OllamaClient::new(&cfg.base_url)?;
        Ok(Self::new(client, cfg.model.clone())
            .with_temperature(cfg.temperature)
            .with_timeout(Duration::from_secs(cfg.timeout_secs)))
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Clone, Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Debug, Clone, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
    options: ChatOptions,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

impl Generator for OllamaGenerator {
    fn generate(&self, messages: &[Message]) -> Result<String, AppError> {
        let req = ChatRequest {
            model: &self.model,
            messages,
            stream: false,
            options: ChatOptions {
                temperature: self.temperature,
            },
        };
        let body = serde_json::to_value(req).map_err(|e| {
            AppError::generation("Failed to encode chat request").with_details(e.to_string())
        })?;

        let resp = ureq::post(&self.client.endpoint("api/chat"))
            .timeout(self.timeout)
            .send_json(body);

        match resp {
            Ok(r) if r.status() == 200 => {
                let v: ChatResponse = r.into_json().map_err(|e| {
                    AppError::generation("Failed to decode chat response")
                        .with_details(e.to_string())
                })?;
                let text = v.message.content.trim();
                if text.is_empty() {
                    return Err(AppError::generation("Chat response was empty")
                        .with_details(format!("model={}", self.model)));
                }
                Ok(text.to_string())
            }
            Ok(r) => Err(AppError::generation("Chat request failed")
                .with_details(format!("status={}", r.status()))),
            Err(ureq::Error::Status(status, _)) => Err(AppError::generation("Chat request failed")
                .with_details(format!("status={status}; model={}", self.model))),
            Err(e) => Err(AppError::generation("Failed to call chat endpoint")
                .with_details(e.to_string())
                .with_retryable(true)),
        }
    }
}
