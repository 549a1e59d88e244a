use std::path::PathBuf;

use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::audio::PcmAudio;
use crate::config::SttConfig;
use crate::error::{ParleyError, Result};

use super::{TimedText, WholeRecognizer};

/// Segments with `no_speech` probability above this threshold are discarded.
const NO_SPEECH_THRESHOLD: f32 = 0.6;

/// Stock phrases Whisper emits for non-speech audio. Only dropped when they
/// make up the whole segment.
const HALLUCINATED_PHRASES: &[&str] = &[
    "thanks for watching",
    "thank you for watching",
    "please subscribe",
    "like and subscribe",
    "subscribe to my channel",
];

/// Common Whisper hallucinations from non-speech audio (keyboard tapping, etc.).
fn is_hallucinated_noise(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.starts_with('[') && trimmed.ends_with(']')
        || trimmed.starts_with('(') && trimmed.ends_with(')')
    {
        return true;
    }

    let phrase = trimmed
        .trim_matches(|c: char| c.is_ascii_punctuation() || c.is_whitespace())
        .to_lowercase();
    HALLUCINATED_PHRASES.contains(&phrase.as_str())
}

/// Local whisper.cpp model that segments and timestamps the whole recording.
pub struct WhisperEngine {
    ctx: WhisperContext,
    language: String,
}

impl WhisperEngine {
    pub fn new(config: &SttConfig) -> Result<Self> {
        let model_path = resolve_model_path(config)?;

        let ctx = WhisperContext::new_with_params(
            model_path
                .to_str()
                .ok_or_else(|| ParleyError::Config("model path contains invalid UTF-8".to_string()))?,
            WhisperContextParameters::default(),
        )
        .map_err(|e| ParleyError::Config(format!("failed to load whisper model: {e}")))?;

        Ok(Self {
            ctx,
            language: config.language.clone(),
        })
    }
}

impl WholeRecognizer for WhisperEngine {
    fn transcribe(&mut self, audio: &PcmAudio) -> Result<Vec<TimedText>> {
        let mut state = self
            .ctx
            .create_state()
            .map_err(|e| ParleyError::Stt(format!("failed to create whisper state: {e}")))?;

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_language(Some(&self.language));
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);

        state
            .full(params, &audio.samples)
            .map_err(|e| ParleyError::Stt(format!("whisper transcription failed: {e}")))?;

        let n_segments = state.full_n_segments();
        tracing::debug!("whisper returned {n_segments} segments");

        let mut segments = Vec::new();
        for i in 0..n_segments {
            let segment = state
                .get_segment(i)
                .ok_or_else(|| ParleyError::Stt(format!("segment {i} out of bounds")))?;

            let no_speech_prob = segment.no_speech_probability();
            if no_speech_prob > NO_SPEECH_THRESHOLD {
                tracing::debug!("skipping segment {i}: no_speech_prob={no_speech_prob:.2}");
                continue;
            }

            let text = segment
                .to_str()
                .map_err(|e| ParleyError::Stt(format!("failed to get segment text: {e}")))?
                .trim()
                .to_string();

            if is_hallucinated_noise(&text) {
                continue;
            }

            // Whisper timestamps are in centiseconds (10ms units)
            segments.push(TimedText {
                start: segment.start_timestamp() as f64 / 100.0,
                end: segment.end_timestamp() as f64 / 100.0,
                text,
            });
        }

        Ok(segments)
    }

    fn name(&self) -> &'static str {
        "whisper"
    }
}

fn resolve_model_path(config: &SttConfig) -> Result<PathBuf> {
    if let Some(ref explicit) = config.model_path {
        let path = crate::config::Config::expand_path(explicit);
        if !path.exists() {
            return Err(ParleyError::Config(format!(
                "whisper model not found at {}",
                path.display()
            )));
        }
        return Ok(path);
    }

    // Auto-resolve from model_size
    let data_dir = dirs::data_dir()
        .ok_or_else(|| ParleyError::Config("could not determine data directory".to_string()))?;

    let model_file = format!("ggml-{}.en.bin", config.whisper_model_size);
    let path = data_dir.join("parley/models").join(&model_file);

    let url = format!(
        "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-{}.en.bin",
        config.whisper_model_size
    );
    let desc = format!("Whisper {} model", config.whisper_model_size);
    crate::models::ensure_model(&path, &url, &desc)?;

    Ok(path)
}
