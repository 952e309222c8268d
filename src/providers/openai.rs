//! OpenAI-compatible provider: Whisper transcription and chat completions.

use async_trait::async_trait;
use reqwest::{multipart, Client};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::{
    AudioClip, CompletionRequest, LanguageModel, ProviderError, ProviderResult, SpeechToText,
    TranscriptionOptions,
};
use crate::config::ProvidersConfig;

pub struct OpenAiClient {
    client: Client,
    api_key: Option<String>,
    api_base: String,
    transcription_model: String,
    completion_model: String,
}

impl OpenAiClient {
    pub fn new(client: Client, config: &ProvidersConfig) -> Self {
        Self {
            client,
            api_key: config.api_key.clone().filter(|k| !k.trim().is_empty()),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            transcription_model: config.transcription_model.clone(),
            completion_model: config.completion_model.clone(),
        }
    }

    fn api_key(&self) -> ProviderResult<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| ProviderError::NotConfigured("OpenAI API key not set".to_string()))
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path)
    }
}

#[derive(Debug, Deserialize)]
struct WhisperResponse {
    text: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

impl ChatResponse {
    /// First choice's content, if it has any non-blank text.
    fn into_content(self) -> Option<String> {
        self.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
    }
}

async fn error_for_status(
    service: &'static str,
    response: reqwest::Response,
) -> ProviderResult<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    error!(service, status, body = %body, "Provider returned an error status");
    Err(ProviderError::Status {
        service,
        status,
        body,
    })
}

#[async_trait]
impl SpeechToText for OpenAiClient {
    fn name(&self) -> &'static str {
        "OpenAI Whisper"
    }

    async fn transcribe(
        &self,
        clip: AudioClip,
        options: &TranscriptionOptions,
    ) -> ProviderResult<String> {
        let api_key = self.api_key()?;

        let file_part = multipart::Part::bytes(clip.bytes)
            .file_name(clip.file_name)
            .mime_str(&clip.content_type)
            .map_err(|e| ProviderError::Decode {
                service: "audio source",
                message: format!("invalid content type: {}", e),
            })?;

        let form = multipart::Form::new()
            .part("file", file_part)
            .text("model", self.transcription_model.clone())
            .text("language", options.language.clone())
            .text("prompt", options.prompt.clone())
            .text("response_format", "json");

        debug!(model = %self.transcription_model, "Sending transcription request");

        let response = self
            .client
            .post(self.endpoint("audio/transcriptions"))
            .bearer_auth(api_key)
            .multipart(form)
            .send()
            .await?;

        let response = error_for_status("transcription API", response).await?;
        let whisper: WhisperResponse = response.json().await?;

        Ok(whisper.text)
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}

#[async_trait]
impl LanguageModel for OpenAiClient {
    fn name(&self) -> &'static str {
        "OpenAI Chat"
    }

    async fn complete(&self, request: CompletionRequest) -> ProviderResult<Option<String>> {
        let api_key = self.api_key()?;

        let chat_request = ChatRequest {
            model: &self.completion_model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
            temperature: request.temperature,
            response_format: request
                .json_output
                .then_some(ResponseFormat { kind: "json_object" }),
        };

        debug!(
            model = %self.completion_model,
            temperature = request.temperature,
            prompt_chars = request.prompt.len(),
            "Sending completion request"
        );

        let response = self
            .client
            .post(self.endpoint("chat/completions"))
            .bearer_auth(api_key)
            .json(&chat_request)
            .send()
            .await?;

        let response = error_for_status("completion API", response).await?;
        let chat: ChatResponse = response.json().await?;

        Ok(chat.into_content())
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }
}
