use std::any::Any;
use std::ops::ControlFlow;
use std::panic::{self, AssertUnwindSafe};

use tokio_util::sync::CancellationToken;

use crate::audio::PcmAudio;
use crate::config::Config;
use crate::error::ParleyError;
use crate::segment::silence::SilenceSplitter;
use crate::segment::stream::ChunkStreamer;
use crate::speaker::{AttributionMode, SpeakerAttribution};
use crate::stt::{self, Backend, RecognitionResult, RecognizedUnit};
use crate::transcript::{self, Transcript};

/// How a run ended when no fault occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Completion {
    Finished,
    Cancelled,
}

/// Sequential decode-to-transcript driver: segment, recognize, attribute.
pub struct Pipeline {
    backend: Backend,
    splitter: SilenceSplitter,
    streamer: ChunkStreamer,
    mode: AttributionMode,
    cancel: CancellationToken,
}

impl Pipeline {
    #[must_use]
    pub fn new(config: &Config, backend: Backend, cancel: CancellationToken) -> Self {
        let mode = AttributionMode::resolve(&config.speaker, backend.capability());
        Self {
            backend,
            splitter: SilenceSplitter::new(&config.segmenter),
            streamer: ChunkStreamer::new(&config.segmenter),
            mode,
            cancel,
        }
    }

    #[must_use]
    pub const fn mode(&self) -> AttributionMode {
        self.mode
    }

    /// Transcribe `audio`. Never fails: backend errors only cost their own
    /// unit, and a fault part-way through (a backend panicking) keeps the
    /// turns attributed so far and records the error in the transcript.
    pub fn run(&mut self, audio: &PcmAudio) -> Transcript {
        tracing::info!(
            "transcribing {:.1}s of audio with {} backend ({:?} attribution)",
            audio.duration_secs(),
            self.backend.name(),
            self.mode
        );

        let mut attribution = SpeakerAttribution::new(self.mode);
        let outcome =
            panic::catch_unwind(AssertUnwindSafe(|| self.drive(audio, &mut attribution)))
                .map_err(|payload| ParleyError::Pipeline(panic_message(payload.as_ref())));
        let transcript = transcript::assemble(attribution.into_turns());

        match outcome {
            Ok(Completion::Finished) => {
                tracing::info!(
                    "transcription complete: {} turns",
                    transcript.turns().len()
                );
                transcript
            }
            Ok(Completion::Cancelled) => {
                tracing::warn!(
                    "transcription cancelled, keeping {} turns",
                    transcript.turns().len()
                );
                transcript
            }
            Err(e) => {
                tracing::error!("transcription failed: {e}");
                transcript.with_failure(e.to_string())
            }
        }
    }

    fn drive(&mut self, audio: &PcmAudio, attribution: &mut SpeakerAttribution) -> Completion {
        let cancel = &self.cancel;
        let mut index = 0usize;
        let mut feed = |unit: RecognizedUnit| {
            record(index, &unit, attribution);
            index += 1;
            if cancel.is_cancelled() {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        };

        if cancel.is_cancelled() {
            return Completion::Cancelled;
        }

        match &mut self.backend {
            Backend::BatchSegment(recognizer) => {
                let units = self.splitter.split(audio);
                tracing::info!("found {} audio units, transcribing...", units.len());

                for unit in units {
                    if cancel.is_cancelled() {
                        return Completion::Cancelled;
                    }
                    let result = recognizer.recognize(&unit);
                    let recognized = RecognizedUnit {
                        start_time: unit.start_time,
                        end_time: unit.end_time,
                        result,
                    };
                    if feed(recognized).is_break() {
                        return Completion::Cancelled;
                    }
                }
            }
            Backend::ChunkedStreaming(recognizer) => {
                if !self.streamer.run(audio, recognizer.as_mut(), &mut feed) {
                    return Completion::Cancelled;
                }
            }
            Backend::TimestampedWhole(recognizer) => {
                let units =
                    stt::normalize_segments(recognizer.transcribe(audio), audio.duration_secs());
                tracing::info!("backend returned {} segments", units.len());

                for unit in units {
                    if feed(unit).is_break() {
                        return Completion::Cancelled;
                    }
                }
            }
        }

        Completion::Finished
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "recognizer panicked".to_string())
}

fn record(index: usize, unit: &RecognizedUnit, attribution: &mut SpeakerAttribution) {
    match &unit.result {
        RecognitionResult::NoSpeech => {
            tracing::debug!(
                "unit {index} ({:.2}s-{:.2}s): no speech",
                unit.start_time,
                unit.end_time
            );
        }
        RecognitionResult::ServiceError(message) => {
            tracing::warn!("could not recognize unit {index}: {message}");
        }
        RecognitionResult::Text(_) => {
            if let Some(turn) = attribution.attribute(unit) {
                tracing::debug!(
                    "unit {index} ({:.2}s-{:.2}s): speaker {}",
                    unit.start_time,
                    unit.end_time,
                    turn.speaker
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::audio::SAMPLE_RATE;
    use crate::config::SpeakerMode;
    use crate::error::Result;
    use crate::segment::AudioUnit;
    use crate::stt::{
        SegmentRecognizer, StreamingRecognizer, TimedText, WholeRecognizer,
    };

    /// Replays canned results, one per unit, and optionally cancels after a call.
    struct Scripted {
        results: VecDeque<RecognitionResult>,
        calls: usize,
        cancel_after: Option<(usize, CancellationToken)>,
    }

    impl Scripted {
        fn new(results: Vec<RecognitionResult>) -> Self {
            Self {
                results: results.into(),
                calls: 0,
                cancel_after: None,
            }
        }
    }

    impl SegmentRecognizer for Scripted {
        fn recognize(&mut self, _unit: &AudioUnit) -> RecognitionResult {
            self.calls += 1;
            if let Some((n, token)) = &self.cancel_after
                && self.calls >= *n
            {
                token.cancel();
            }
            self.results
                .pop_front()
                .unwrap_or(RecognitionResult::NoSpeech)
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    struct Segments(Vec<TimedText>);

    impl WholeRecognizer for Segments {
        fn transcribe(&mut self, _audio: &PcmAudio) -> Result<Vec<TimedText>> {
            Ok(self.0.clone())
        }

        fn name(&self) -> &'static str {
            "segments"
        }
    }

    /// Ends an utterance every block, except the given block which fails.
    struct FailsOnBlock {
        block: usize,
        seen: usize,
    }

    impl StreamingRecognizer for FailsOnBlock {
        fn accept_block(&mut self, _block: &[i16]) -> Result<Option<RecognitionResult>> {
            self.seen += 1;
            if self.seen == self.block {
                return Err(ParleyError::Stt("transient decoder hiccup".to_string()));
            }
            Ok(Some(RecognitionResult::from_text(format!("utterance {}", self.seen))))
        }

        fn finish(&mut self) -> Result<RecognitionResult> {
            Ok(RecognitionResult::NoSpeech)
        }

        fn name(&self) -> &'static str {
            "fails-on-block"
        }
    }

    /// Recognizes units until the given call, where it panics.
    struct PanicsOnCall {
        call: usize,
        calls: usize,
    }

    impl SegmentRecognizer for PanicsOnCall {
        fn recognize(&mut self, _unit: &AudioUnit) -> RecognitionResult {
            self.calls += 1;
            if self.calls == self.call {
                panic!("decoder state corrupted");
            }
            RecognitionResult::from_text(format!("unit {}", self.calls))
        }

        fn name(&self) -> &'static str {
            "panics-on-call"
        }
    }

    fn timed(start: f64, end: f64, text: &str) -> TimedText {
        TimedText {
            start,
            end,
            text: text.to_string(),
        }
    }

    fn secs(n: f64) -> usize {
        (n * f64::from(SAMPLE_RATE)) as usize
    }

    /// `speech` seconds of signal separated by 2s of silence.
    fn conversation(parts: usize) -> PcmAudio {
        let mut samples = Vec::new();
        for i in 0..parts {
            if i > 0 {
                samples.extend(vec![0.0; secs(2.0)]);
            }
            samples.extend(vec![0.3; secs(1.0)]);
        }
        PcmAudio::from_mono(samples)
    }

    fn pairs(transcript: &Transcript) -> Vec<(u8, String)> {
        transcript
            .turns()
            .iter()
            .map(|t| (t.speaker, t.text.clone()))
            .collect()
    }

    #[test]
    fn timestamped_backend_uses_pauses() {
        let backend = Backend::TimestampedWhole(Box::new(Segments(vec![
            timed(0.0, 1.0, "hello"),
            timed(1.0, 1.2, ""),
            timed(3.0, 4.0, "world"),
        ])));
        let mut pipeline = Pipeline::new(&Config::default(), backend, CancellationToken::new());
        assert!(matches!(pipeline.mode(), AttributionMode::Pause { .. }));

        let transcript = pipeline.run(&PcmAudio::from_mono(vec![0.0; secs(4.0)]));
        assert_eq!(
            transcript.render(),
            "Speaker 1: hello\n\nSpeaker 2: world\n\n"
        );
    }

    #[test]
    fn batch_backend_alternates_by_index() {
        let results = (1..=5)
            .map(|i| RecognitionResult::from_text(format!("line {i}")))
            .collect();
        let backend = Backend::BatchSegment(Box::new(Scripted::new(results)));
        let mut pipeline = Pipeline::new(&Config::default(), backend, CancellationToken::new());

        let transcript = pipeline.run(&conversation(5));
        let speakers: Vec<u8> = transcript.turns().iter().map(|t| t.speaker).collect();
        assert_eq!(speakers, vec![1, 2, 1, 2, 1]);

        let starts: Vec<f64> = transcript.turns().iter().map(|t| t.start_time).collect();
        assert!(starts.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn service_errors_and_silence_contribute_nothing() {
        let backend = Backend::BatchSegment(Box::new(Scripted::new(vec![
            RecognitionResult::from_text("first"),
            RecognitionResult::ServiceError("401 Unauthorized".to_string()),
            RecognitionResult::NoSpeech,
            RecognitionResult::from_text("second"),
        ])));
        let mut pipeline = Pipeline::new(&Config::default(), backend, CancellationToken::new());

        let transcript = pipeline.run(&conversation(4));
        assert_eq!(
            pairs(&transcript),
            vec![(1, "first".to_string()), (2, "second".to_string())]
        );
        assert!(transcript.failure().is_none());
    }

    #[test]
    fn all_silence_renders_empty() {
        let backend = Backend::BatchSegment(Box::new(Scripted::new(Vec::new())));
        let mut pipeline = Pipeline::new(&Config::default(), backend, CancellationToken::new());

        let transcript = pipeline.run(&PcmAudio::from_mono(vec![0.0; secs(3.0)]));
        assert_eq!(transcript.render(), "");
    }

    #[test]
    fn forced_pause_mode_applies_to_batch_units() {
        let mut config = Config::default();
        config.speaker.mode = SpeakerMode::Pause;
        let backend = Backend::BatchSegment(Box::new(Scripted::new(vec![
            RecognitionResult::from_text("a"),
            RecognitionResult::from_text("b"),
        ])));
        let mut pipeline = Pipeline::new(&config, backend, CancellationToken::new());

        // Units are [0, 1.5] and [2.5, 4.0]: the gap is exactly 1s, no flip.
        let transcript = pipeline.run(&conversation(2));
        let speakers: Vec<u8> = transcript.turns().iter().map(|t| t.speaker).collect();
        assert_eq!(speakers, vec![1, 1]);
    }

    #[test]
    fn cancellation_keeps_earlier_turns() {
        let cancel = CancellationToken::new();
        let mut recognizer = Scripted::new(vec![
            RecognitionResult::from_text("kept"),
            RecognitionResult::from_text("never requested"),
        ]);
        recognizer.cancel_after = Some((1, cancel.clone()));
        let backend = Backend::BatchSegment(Box::new(recognizer));
        let mut pipeline = Pipeline::new(&Config::default(), backend, cancel);

        let transcript = pipeline.run(&conversation(3));
        assert_eq!(pairs(&transcript), vec![(1, "kept".to_string())]);
        assert!(transcript.failure().is_none());
    }

    #[test]
    fn cancelled_before_start_produces_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let backend = Backend::BatchSegment(Box::new(Scripted::new(vec![
            RecognitionResult::from_text("unused"),
        ])));
        let mut pipeline = Pipeline::new(&Config::default(), backend, cancel);

        assert!(pipeline.run(&conversation(1)).is_empty());
    }

    #[test]
    fn streaming_block_failure_does_not_stop_the_run() {
        let backend = Backend::ChunkedStreaming(Box::new(FailsOnBlock { block: 2, seen: 0 }));
        let mut pipeline = Pipeline::new(&Config::default(), backend, CancellationToken::new());

        // Five 4000-sample blocks, the second of which fails.
        let transcript = pipeline.run(&PcmAudio::from_mono(vec![0.1; 20_000]));
        assert_eq!(
            pairs(&transcript),
            vec![
                (1, "utterance 1".to_string()),
                (2, "utterance 3".to_string()),
                (1, "utterance 4".to_string()),
                (2, "utterance 5".to_string()),
            ]
        );
        assert!(transcript.failure().is_none());
    }

    #[test]
    fn fault_preserves_partial_transcript() {
        let backend = Backend::BatchSegment(Box::new(PanicsOnCall { call: 3, calls: 0 }));
        let mut pipeline = Pipeline::new(&Config::default(), backend, CancellationToken::new());

        let transcript = pipeline.run(&conversation(4));
        assert_eq!(
            pairs(&transcript),
            vec![(1, "unit 1".to_string()), (2, "unit 2".to_string())]
        );
        let failure = transcript
            .failure()
            .unwrap_or_else(|| panic!("expected a failure"));
        assert!(failure.contains("decoder state corrupted"));
        assert!(
            transcript
                .render()
                .ends_with(&format!("Error during transcription: {failure}\n"))
        );
    }
}
