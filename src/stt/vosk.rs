use std::path::PathBuf;

use vosk::{CompleteResult, DecodingState, Model, Recognizer};

use crate::audio::SAMPLE_RATE;
use crate::config::SttConfig;
use crate::error::{ParleyError, Result};

use super::{RecognitionResult, StreamingRecognizer};

/// Small English model fetched when no `stt.model_path` is configured.
const DEFAULT_MODEL: &str = "vosk-model-small-en-us-0.15";
const MODEL_BASE_URL: &str = "https://alphacephei.com/vosk/models";

/// Kaldi-based streaming recognizer. Its endpointer closes units.
pub struct VoskEngine {
    recognizer: Recognizer,
}

impl VoskEngine {
    pub fn new(config: &SttConfig) -> Result<Self> {
        let path = resolve_model_path(config)?;

        let model =
            Model::new(path.to_str().ok_or_else(|| {
                ParleyError::Config("model path contains invalid UTF-8".to_string())
            })?)
            .ok_or_else(|| ParleyError::Config("failed to load vosk model".to_string()))?;

        let recognizer = Recognizer::new(&model, SAMPLE_RATE as f32)
            .ok_or_else(|| ParleyError::Config("failed to create vosk recognizer".to_string()))?;

        tracing::debug!("loaded vosk model from {}", path.display());
        Ok(Self { recognizer })
    }

    fn text_of(result: CompleteResult<'_>) -> RecognitionResult {
        result
            .single()
            .map_or(RecognitionResult::NoSpeech, |r| {
                RecognitionResult::from_text(r.text)
            })
    }
}

impl StreamingRecognizer for VoskEngine {
    fn accept_block(&mut self, block: &[i16]) -> Result<Option<RecognitionResult>> {
        match self.recognizer.accept_waveform(block) {
            Ok(DecodingState::Finalized) => Ok(Some(Self::text_of(self.recognizer.result()))),
            Ok(DecodingState::Running) => Ok(None),
            Ok(DecodingState::Failed) => Err(ParleyError::Stt(
                "vosk failed to decode audio block".to_string(),
            )),
            Err(e) => Err(ParleyError::Stt(format!("vosk rejected audio block: {e:?}"))),
        }
    }

    fn finish(&mut self) -> Result<RecognitionResult> {
        Ok(Self::text_of(self.recognizer.final_result()))
    }

    fn name(&self) -> &'static str {
        "vosk"
    }
}

fn resolve_model_path(config: &SttConfig) -> Result<PathBuf> {
    if let Some(ref explicit) = config.model_path {
        let path = crate::config::Config::expand_path(explicit);
        if !path.exists() {
            return Err(ParleyError::Config(format!(
                "vosk model not found at {}",
                path.display()
            )));
        }
        return Ok(path);
    }

    let data_dir = dirs::data_dir()
        .ok_or_else(|| ParleyError::Config("could not determine data directory".to_string()))?;
    let path = data_dir.join("parley/models").join(DEFAULT_MODEL);

    let url = format!("{MODEL_BASE_URL}/{DEFAULT_MODEL}.zip");
    crate::models::ensure_model_dir(&path, &url, "Vosk English model")?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_explicit_model_is_config_error() {
        let config = SttConfig {
            backend: "vosk".to_string(),
            model_path: Some("/nonexistent/vosk-model-en".to_string()),
            ..SttConfig::default()
        };
        assert!(matches!(
            resolve_model_path(&config),
            Err(ParleyError::Config(_))
        ));
    }

    #[test]
    fn explicit_model_directory_is_used_as_is() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
        let config = SttConfig {
            backend: "vosk".to_string(),
            model_path: Some(dir.path().to_string_lossy().to_string()),
            ..SttConfig::default()
        };
        assert_eq!(
            resolve_model_path(&config).unwrap_or_else(|e| panic!("{e}")),
            dir.path()
        );
    }
}
