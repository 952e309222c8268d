//! # External Providers
//!
//! The pipeline talks to three outside services: wherever the consultation audio
//! lives, a speech-to-text API and a language-model API. Each one sits behind a
//! trait so the pipeline (and its tests) never depend on a concrete client.
//!
//! ## Available implementations:
//! - [`audio::HttpAudioSource`]: downloads audio over HTTP(S)
//! - [`openai::OpenAiClient`]: Whisper transcription and chat completions against
//!   any OpenAI-compatible API

pub mod audio;
pub mod openai;

use async_trait::async_trait;
use thiserror::Error;

/// Errors raised while calling an external provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider not configured: {0}")]
    NotConfigured(String),

    #[error("network error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{service} returned {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("{0} returned no content")]
    EmptyResponse(&'static str),

    #[error("could not decode {service} response: {message}")]
    Decode {
        service: &'static str,
        message: String,
    },
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Downloaded audio ready to be attached to a transcription request.
#[derive(Debug, Clone)]
pub struct AudioClip {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub content_type: String,
}

/// Options sent along with every transcription request.
#[derive(Debug, Clone)]
pub struct TranscriptionOptions {
    /// ISO 639-1 source language
    pub language: String,
    /// Domain priming prompt
    pub prompt: String,
}

/// A single prompt for the language model.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub prompt: String,
    pub temperature: f32,
    /// Ask the provider to constrain its output to a JSON object
    pub json_output: bool,
}

/// Fetches audio referenced by URL.
#[async_trait]
pub trait AudioSource: Send + Sync {
    async fn fetch(&self, url: &str) -> ProviderResult<AudioClip>;
}

/// Speech-to-text provider.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    fn name(&self) -> &'static str;

    async fn transcribe(
        &self,
        clip: AudioClip,
        options: &TranscriptionOptions,
    ) -> ProviderResult<String>;

    fn is_configured(&self) -> bool;
}

/// Text-generation provider. `Ok(None)` means the provider answered but with no
/// usable content.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn name(&self) -> &'static str;

    async fn complete(&self, request: CompletionRequest) -> ProviderResult<Option<String>>;

    fn is_configured(&self) -> bool;
}
