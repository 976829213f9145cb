//! OpenAI provider: chat completions, speech synthesis, image generation,
//! and voice transcription over the standard `/v1` REST surface.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::traits::Provider;
use crate::sessions::Message;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiProvider {
    base_url: String,
    api_key: String,
    client: Client,
}

impl OpenAiProvider {
    pub fn new(api_key: &str, base_url: Option<&str>) -> Self {
        Self {
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            api_key: api_key.to_string(),
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .connect_timeout(std::time::Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("Authorization", format!("Bearer {}", self.api_key))
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
}

#[derive(Debug, Serialize)]
struct ImageRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u8,
    size: &'a str,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

#[async_trait]
impl Provider for OpenAiProvider {
    async fn chat(&self, model: &str, messages: &[Message]) -> Result<String> {
        let response = self
            .authed(self.client.post(self.url("chat/completions")))
            .json(&ChatRequest { model, messages })
            .send()
            .await
            .context("chat completion request failed")?;

        if !response.status().is_success() {
            return Err(super::api_error("openai", response).await);
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .context("failed to parse chat completion response")?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .context("chat completion returned no content")
    }

    async fn speech(&self, model: &str, voice: &str, input: &str) -> Result<Vec<u8>> {
        let response = self
            .authed(self.client.post(self.url("audio/speech")))
            .json(&SpeechRequest {
                model,
                voice,
                input,
            })
            .send()
            .await
            .context("speech synthesis request failed")?;

        if !response.status().is_success() {
            return Err(super::api_error("openai", response).await);
        }

        let bytes = response
            .bytes()
            .await
            .context("failed to read synthesized audio")?;
        Ok(bytes.to_vec())
    }

    async fn image(&self, model: &str, prompt: &str, size: &str) -> Result<String> {
        let response = self
            .authed(self.client.post(self.url("images/generations")))
            .json(&ImageRequest {
                model,
                prompt,
                n: 1,
                size,
            })
            .send()
            .await
            .context("image generation request failed")?;

        if !response.status().is_success() {
            return Err(super::api_error("openai", response).await);
        }

        let parsed: ImageResponse = response
            .json()
            .await
            .context("failed to parse image generation response")?;

        parsed
            .data
            .into_iter()
            .next()
            .and_then(|item| item.url)
            .context("image generation returned no URL")
    }

    async fn transcribe(&self, model: &str, audio: Vec<u8>, filename: &str) -> Result<String> {
        let part = reqwest::multipart::Part::bytes(audio)
            .file_name(filename.to_string())
            .mime_str("audio/ogg")
            .context("invalid audio mime type")?;
        let form = reqwest::multipart::Form::new()
            .text("model", model.to_string())
            .part("file", part);

        let response = self
            .authed(self.client.post(self.url("audio/transcriptions")))
            .multipart(form)
            .send()
            .await
            .context("transcription request failed")?;

        if !response.status().is_success() {
            return Err(super::api_error("openai", response).await);
        }

        let parsed: TranscriptionResponse = response
            .json()
            .await
            .context("failed to parse transcription response")?;
        Ok(parsed.text)
    }

    fn name(&self) -> &str {
        "openai"
    }
}
