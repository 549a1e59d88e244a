use std::ops::ControlFlow;

use crate::audio::{self, PcmAudio};
use crate::config::SegmenterConfig;
use crate::stt::{RecognitionResult, RecognizedUnit, StreamingRecognizer};

/// Feeds fixed-size PCM blocks to a streaming recognizer and lets its
/// endpointer decide where one unit ends and the next begins.
#[derive(Debug, Clone)]
pub struct ChunkStreamer {
    chunk_frames: usize,
}

impl ChunkStreamer {
    #[must_use]
    pub fn new(config: &SegmenterConfig) -> Self {
        Self {
            chunk_frames: config.chunk_frames.max(1),
        }
    }

    /// Stream `audio` through `recognizer`, handing each closed unit to
    /// `on_unit` in order. Returns `false` if `on_unit` asked to stop early.
    ///
    /// A recognizer error closes the pending span as a service error and
    /// streaming carries on with the next block.
    pub fn run<F>(
        &self,
        audio: &PcmAudio,
        recognizer: &mut dyn StreamingRecognizer,
        mut on_unit: F,
    ) -> bool
    where
        F: FnMut(RecognizedUnit) -> ControlFlow<()>,
    {
        let mut unit_start = 0usize;
        let mut offset = 0usize;
        let mut pending = false;

        for block in audio.samples.chunks(self.chunk_frames) {
            let pcm = audio::to_i16(block);
            offset += block.len();
            pending = true;

            let result = match recognizer.accept_block(&pcm) {
                Ok(Some(result)) => result,
                Ok(None) => continue,
                Err(e) => {
                    tracing::debug!(
                        "{} failed at {:.2}s: {e}",
                        recognizer.name(),
                        audio::samples_to_secs(offset)
                    );
                    RecognitionResult::ServiceError(e.to_string())
                }
            };

            let unit = RecognizedUnit {
                start_time: audio::samples_to_secs(unit_start),
                end_time: audio::samples_to_secs(offset),
                result,
            };
            unit_start = offset;
            pending = false;

            if on_unit(unit).is_break() {
                return false;
            }
        }

        if pending {
            let result = recognizer
                .finish()
                .unwrap_or_else(|e| RecognitionResult::ServiceError(e.to_string()));
            let unit = RecognizedUnit {
                start_time: audio::samples_to_secs(unit_start),
                end_time: audio::samples_to_secs(offset),
                result,
            };
            if on_unit(unit).is_break() {
                return false;
            }
        }

        true
    }
}
