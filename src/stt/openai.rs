use reqwest::Client;
use serde::Deserialize;
use tokio::runtime::Handle;

use crate::config::SttConfig;
use crate::error::{ParleyError, Result};
use crate::segment::AudioUnit;

use super::{RecognitionResult, SegmentRecognizer, encode_wav};

const TRANSCRIPTIONS_URL: &str = "https://api.openai.com/v1/audio/transcriptions";

/// Sends each unit to the OpenAI transcription endpoint.
pub struct OpenAiEngine {
    client: Client,
    runtime: Handle,
    api_key: String,
    model: String,
    language: String,
}

impl OpenAiEngine {
    pub fn new(config: &SttConfig) -> Result<Self> {
        let api_key = config.openai_api_key.clone().ok_or_else(|| {
            ParleyError::Config("openai backend requires an API key to be set".to_string())
        })?;

        let runtime = Handle::try_current().map_err(|e| {
            ParleyError::Config(format!("openai backend requires a tokio runtime: {e}"))
        })?;

        Ok(Self {
            client: Client::new(),
            runtime,
            api_key,
            model: config.openai_model.clone(),
            language: config.language.clone(),
        })
    }

    fn transcribe(&self, unit: &AudioUnit) -> Result<String> {
        let wav_data = encode_wav(&unit.samples)?;

        let body = self.runtime.block_on(async {
            let file_part = reqwest::multipart::Part::bytes(wav_data)
                .file_name("audio.wav")
                .mime_str("audio/wav")
                .map_err(|e| ParleyError::Stt(format!("failed to set MIME type: {e}")))?;

            let form = reqwest::multipart::Form::new()
                .text("model", self.model.clone())
                .text("language", self.language.clone())
                .text("response_format", "json")
                .part("file", file_part);

            let resp = self
                .client
                .post(TRANSCRIPTIONS_URL)
                .bearer_auth(&self.api_key)
                .multipart(form)
                .send()
                .await
                .map_err(|e| ParleyError::Network(format!("OpenAI API request failed: {e}")))?;

            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            if !status.is_success() {
                return Err(ParleyError::Stt(format!(
                    "OpenAI API returned {status}: {}",
                    body.trim()
                )));
            }

            Ok::<_, ParleyError>(body)
        })?;

        parse_response(&body)
    }
}

impl SegmentRecognizer for OpenAiEngine {
    fn recognize(&mut self, unit: &AudioUnit) -> RecognitionResult {
        RecognitionResult::from_outcome(self.transcribe(unit))
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

#[derive(Deserialize)]
struct OpenAiResponse {
    text: String,
}

fn parse_response(body: &str) -> Result<String> {
    let response: OpenAiResponse = serde_json::from_str(body)
        .map_err(|e| ParleyError::Stt(format!("failed to parse OpenAI response: {e}")))?;
    Ok(response.text)
}
