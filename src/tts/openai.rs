//! Модуль для интеграции с OpenAI API
//!
//! Бэкенд синтеза речи через `/v1/audio/speech`. Запросы независимы, поэтому
//! бэкенд можно вызывать параллельно.

use std::path::Path;
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use crate::config::{DubSyncConfig, TtsModel, TtsVoice};
use crate::error::{DubSyncError, Result};
use crate::tts::{BackendConcurrency, SynthesisBackend};

const SPEECH_ENDPOINT: &str = "https://api.openai.com/v1/audio/speech";

/// Бэкенд OpenAI TTS
#[derive(Debug, Clone)]
pub struct OpenAiTtsBackend {
    client: Client,
    api_key: String,
    model: TtsModel,
    voice: TtsVoice,
    endpoint: String,
}

impl OpenAiTtsBackend {
    pub fn new(api_key: impl Into<String>, model: TtsModel, voice: TtsVoice) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            log::error!("OpenAI API key is empty");
            return Err(DubSyncError::Configuration(
                "OpenAI API key is required for TTS generation".to_string(),
            ));
        }

        Ok(Self {
            client: Client::new(),
            api_key,
            model,
            voice,
            endpoint: SPEECH_ENDPOINT.to_string(),
        })
    }

    pub fn from_config(config: &DubSyncConfig) -> Result<Self> {
        Self::new(config.openai_api_key.clone(), config.tts_model, config.tts_voice)
    }

    /// Другой адрес API (прокси или совместимый сервер)
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn request_body(&self, text: &str) -> serde_json::Value {
        serde_json::json!({
            "model": self.model.as_str(),
            "voice": self.voice.as_str(),
            "input": text,
            "response_format": "mp3",
            "speed": 1.0
        })
    }
}

#[async_trait]
impl SynthesisBackend for OpenAiTtsBackend {
    fn name(&self) -> &str {
        "openai"
    }

    fn concurrency(&self) -> BackendConcurrency {
        BackendConcurrency::ParallelSafe
    }

    fn output_extension(&self) -> &str {
        "mp3"
    }

    async fn synthesize(&self, text: &str, output: &Path) -> anyhow::Result<()> {
        log::info!("Sending TTS request to OpenAI API ({} chars)", text.chars().count());

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&self.request_body(text))
            .send()
            .await
            .context("Failed to send TTS request")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = match response.text().await {
                Ok(text) => text,
                Err(e) => format!("Failed to read error response: {}", e),
            };
            return Err(anyhow!("OpenAI API error (status {}): {}", status, error_text));
        }

        let bytes: Bytes = response.bytes().await.context("Failed to read response bytes")?;
        if bytes.is_empty() {
            return Err(anyhow!("Received empty response from OpenAI API"));
        }

        tokio::fs::write(output, &bytes)
            .await
            .with_context(|| format!("Failed to save TTS audio to {}", output.display()))?;

        log::info!("Saved TTS audio to {}", output.display());
        Ok(())
    }
}
