//! # Transcription Step
//!
//! Turns an audio URL into consultation text:
//! 1. Download the audio (the URL must answer with a success status)
//! 2. Attach it to a speech-to-text request with the configured source language
//!    and the medical priming prompt
//! 3. Return the transcript
//!
//! Every failure comes back as [`AppError::Transcription`], so the error handler
//! reports "Audio transcription failed" no matter which of the two calls broke.

use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use crate::config::PipelineConfig;
use crate::error::{AppError, AppResult};
use crate::providers::{AudioSource, SpeechToText, TranscriptionOptions};

pub struct TranscriptionStep {
    audio: Arc<dyn AudioSource>,
    speech: Arc<dyn SpeechToText>,
    options: TranscriptionOptions,
}

impl TranscriptionStep {
    pub fn new(
        audio: Arc<dyn AudioSource>,
        speech: Arc<dyn SpeechToText>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            audio,
            speech,
            options: TranscriptionOptions {
                language: config.language.clone(),
                prompt: config.transcription_prompt.clone(),
            },
        }
    }

    pub async fn run(&self, audio_url: &str) -> AppResult<String> {
        let started = Instant::now();

        let clip = self
            .audio
            .fetch(audio_url)
            .await
            .map_err(|e| AppError::Transcription(format!("could not fetch audio: {}", e)))?;
        let audio_bytes = clip.bytes.len();

        let transcript = self
            .speech
            .transcribe(clip, &self.options)
            .await
            .map_err(|e| AppError::Transcription(e.to_string()))?;

        info!(
            provider = self.speech.name(),
            audio_bytes,
            transcription_length = transcript.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Audio transcription completed"
        );

        Ok(transcript)
    }

    pub fn provider_configured(&self) -> bool {
        self.speech.is_configured()
    }
}
