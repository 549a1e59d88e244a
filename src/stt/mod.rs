pub mod command;
pub mod openai;
#[cfg(feature = "vosk")]
pub mod vosk;
#[cfg(feature = "whisper")]
pub mod whisper;

use std::io::Cursor;

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::audio::{self, PcmAudio, SAMPLE_RATE};
use crate::config::SttConfig;
use crate::error::{ParleyError, Result};
use crate::segment::AudioUnit;

/// Outcome of running a recognizer over one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionResult {
    /// Non-empty text on a single line.
    Text(String),
    NoSpeech,
    ServiceError(String),
}

impl RecognitionResult {
    /// Whitespace-only text counts as no speech. Line breaks and runs of
    /// whitespace collapse to single spaces so a turn renders as one line.
    pub fn from_text(text: impl AsRef<str>) -> Self {
        let text = text.as_ref().split_whitespace().collect::<Vec<_>>().join(" ");
        if text.is_empty() {
            Self::NoSpeech
        } else {
            Self::Text(text)
        }
    }

    /// Fold a backend call into a result; errors become non-fatal service errors.
    pub fn from_outcome(outcome: Result<String>) -> Self {
        match outcome {
            Ok(text) => Self::from_text(text),
            Err(e) => Self::ServiceError(e.to_string()),
        }
    }

    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text.as_str()),
            Self::NoSpeech | Self::ServiceError(_) => None,
        }
    }
}

/// A recognition result with the time span it covers.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognizedUnit {
    pub start_time: f64,
    pub end_time: f64,
    pub result: RecognitionResult,
}

/// Time-aligned text as returned by backends that segment on their own.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedText {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// How a backend consumes audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// One blocking call per silence-delimited unit.
    BatchSegment,
    /// Fixed-size PCM blocks; the recognizer's endpointer closes units.
    ChunkedStreaming,
    /// The whole recording at once, returned as timestamped segments.
    TimestampedWhole,
}

/// Recognizes one pre-cut unit.
pub trait SegmentRecognizer: Send {
    fn recognize(&mut self, unit: &AudioUnit) -> RecognitionResult;
    fn name(&self) -> &str;
}

/// Consumes 16-bit mono PCM blocks and reports when an utterance ends.
pub trait StreamingRecognizer: Send {
    /// Returns `Some` once the endpointer has closed the current utterance.
    fn accept_block(&mut self, block: &[i16]) -> Result<Option<RecognitionResult>>;
    /// Flush whatever audio is still pending at end of input.
    fn finish(&mut self) -> Result<RecognitionResult>;
    fn name(&self) -> &str;
}

/// Transcribes a full recording into its own timestamped segments.
pub trait WholeRecognizer: Send {
    fn transcribe(&mut self, audio: &PcmAudio) -> Result<Vec<TimedText>>;
    fn name(&self) -> &str;
}

/// A configured speech-to-text backend, tagged by capability.
pub enum Backend {
    BatchSegment(Box<dyn SegmentRecognizer>),
    ChunkedStreaming(Box<dyn StreamingRecognizer>),
    TimestampedWhole(Box<dyn WholeRecognizer>),
}

impl Backend {
    #[must_use]
    pub const fn capability(&self) -> Capability {
        match self {
            Self::BatchSegment(_) => Capability::BatchSegment,
            Self::ChunkedStreaming(_) => Capability::ChunkedStreaming,
            Self::TimestampedWhole(_) => Capability::TimestampedWhole,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::BatchSegment(r) => r.name(),
            Self::ChunkedStreaming(r) => r.name(),
            Self::TimestampedWhole(r) => r.name(),
        }
    }
}

/// Create a backend based on the config backend name.
pub fn create_backend(config: &SttConfig) -> Result<Backend> {
    match config.backend.as_str() {
        "openai" => Ok(Backend::BatchSegment(Box::new(
            openai::OpenAiEngine::new(config)?,
        ))),
        "command" => Ok(Backend::BatchSegment(Box::new(
            command::CommandEngine::new(config)?,
        ))),
        "whisper" => whisper_backend(config),
        "vosk" => vosk_backend(config),
        other => Err(ParleyError::Config(format!(
            "unknown STT backend: {other} (available: openai, command, whisper, vosk)"
        ))),
    }
}

#[cfg(feature = "whisper")]
fn whisper_backend(config: &SttConfig) -> Result<Backend> {
    Ok(Backend::TimestampedWhole(Box::new(
        whisper::WhisperEngine::new(config)?,
    )))
}

#[cfg(not(feature = "whisper"))]
fn whisper_backend(_config: &SttConfig) -> Result<Backend> {
    Err(ParleyError::Config(
        "parley was built without the `whisper` feature".to_string(),
    ))
}

#[cfg(feature = "vosk")]
fn vosk_backend(config: &SttConfig) -> Result<Backend> {
    Ok(Backend::ChunkedStreaming(Box::new(vosk::VoskEngine::new(
        config,
    )?)))
}

#[cfg(not(feature = "vosk"))]
fn vosk_backend(_config: &SttConfig) -> Result<Backend> {
    Err(ParleyError::Config(
        "parley was built without the `vosk` feature".to_string(),
    ))
}

/// Turn a whole-recording transcription into ordered units.
///
/// A failed call becomes a single service error spanning the recording.
#[must_use]
pub fn normalize_segments(outcome: Result<Vec<TimedText>>, duration: f64) -> Vec<RecognizedUnit> {
    let segments = match outcome {
        Ok(segments) => segments,
        Err(e) => {
            return vec![RecognizedUnit {
                start_time: 0.0,
                end_time: duration,
                result: RecognitionResult::ServiceError(e.to_string()),
            }];
        }
    };

    let mut units: Vec<RecognizedUnit> = segments
        .into_iter()
        .map(|s| RecognizedUnit {
            start_time: s.start,
            end_time: s.end.max(s.start),
            result: RecognitionResult::from_text(&s.text),
        })
        .collect();
    units.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
    units
}

/// Encode 16kHz mono samples as an in-memory 16-bit WAV file.
pub fn encode_wav(samples: &[f32]) -> Result<Vec<u8>> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec)
            .map_err(|e| ParleyError::Stt(format!("failed to create WAV writer: {e}")))?;
        for sample in audio::to_i16(samples) {
            writer
                .write_sample(sample)
                .map_err(|e| ParleyError::Stt(format!("failed to write WAV sample: {e}")))?;
        }
        writer
            .finalize()
            .map_err(|e| ParleyError::Stt(format!("failed to finalize WAV: {e}")))?;
    }

    Ok(cursor.into_inner())
}
