use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Client, Url};
use tracing::debug;

use super::{AudioClip, AudioSource, ProviderError, ProviderResult};

const DEFAULT_FILE_NAME: &str = "audio.mp3";
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Downloads consultation audio from a public or signed URL.
pub struct HttpAudioSource {
    client: Client,
}

impl HttpAudioSource {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AudioSource for HttpAudioSource {
    async fn fetch(&self, url: &str) -> ProviderResult<AudioClip> {
        debug!(url = %url, "Fetching consultation audio");

        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(ProviderError::Status {
                service: "audio source",
                status: status.as_u16(),
                body: status.canonical_reason().unwrap_or("request failed").to_string(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());
        let file_name = file_name_from_url(response.url());
        let bytes = response.bytes().await?.to_vec();

        debug!(
            file_name = %file_name,
            content_type = %content_type,
            size_bytes = bytes.len(),
            "Audio downloaded"
        );

        Ok(AudioClip {
            bytes,
            file_name,
            content_type,
        })
    }
}

/// The speech API infers the audio format from the file extension, so keep the
/// URL's last path segment when it has one.
fn file_name_from_url(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| name.contains('.'))
        .map(str::to_string)
        .unwrap_or_else(|| DEFAULT_FILE_NAME.to_string())
}
