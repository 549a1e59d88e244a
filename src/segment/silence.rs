use std::ops::Range;

use crate::audio::{self, PcmAudio};
use crate::config::SegmenterConfig;

use super::AudioUnit;

/// Loudness is measured over 1ms frames.
const FRAME_SAMPLES: usize = audio::ms_to_samples(1);

/// Splits a recording wherever it stays quiet for long enough.
#[derive(Debug, Clone)]
pub struct SilenceSplitter {
    min_gap_frames: usize,
    threshold_dbfs: f32,
    retained_samples: usize,
}

impl SilenceSplitter {
    #[must_use]
    pub fn new(config: &SegmenterConfig) -> Self {
        Self {
            min_gap_frames: (config.min_silence_gap_ms as usize).max(1),
            threshold_dbfs: config.silence_threshold_dbfs,
            retained_samples: audio::ms_to_samples(config.retained_silence_ms),
        }
    }

    /// Cut `audio` into units separated by silence gaps.
    ///
    /// Each unit keeps up to the retained silence on both edges. Without any
    /// qualifying gap, or when nothing rises above the threshold, the whole
    /// recording comes back as a single unit.
    #[must_use]
    pub fn split(&self, audio: &PcmAudio) -> Vec<AudioUnit> {
        let samples = &audio.samples;
        let len = samples.len();
        if len == 0 {
            return Vec::new();
        }

        let gaps = self.detect_gaps(samples);
        let speech = invert(&gaps, len);

        if gaps.is_empty() || speech.is_empty() {
            tracing::debug!("no silence gaps found, using the whole recording as one unit");
            return vec![make_unit(0, samples, 0..len)];
        }

        let mut spans: Vec<Range<usize>> = speech
            .iter()
            .map(|r| {
                r.start.saturating_sub(self.retained_samples)
                    ..(r.end + self.retained_samples).min(len)
            })
            .collect();

        // Padding must not make neighbours overlap; share the gap at its midpoint.
        for i in 1..spans.len() {
            if spans[i - 1].end > spans[i].start {
                let mid = (speech[i - 1].end + speech[i].start) / 2;
                spans[i - 1].end = mid;
                spans[i].start = mid;
            }
        }

        tracing::debug!("silence splitting produced {} units", spans.len());

        spans
            .into_iter()
            .enumerate()
            .map(|(i, span)| make_unit(i, samples, span))
            .collect()
    }

    /// Sample ranges of every silent run at least `min_gap_frames` long.
    fn detect_gaps(&self, samples: &[f32]) -> Vec<Range<usize>> {
        let mut gaps = Vec::new();
        let mut run_start: Option<usize> = None;
        let mut run_frames = 0usize;

        for (i, frame) in samples.chunks(FRAME_SAMPLES).enumerate() {
            if audio::dbfs(frame) < self.threshold_dbfs {
                run_start.get_or_insert(i * FRAME_SAMPLES);
                run_frames += 1;
                continue;
            }

            if let Some(start) = run_start.take()
                && run_frames >= self.min_gap_frames
            {
                gaps.push(start..i * FRAME_SAMPLES);
            }
            run_frames = 0;
        }

        if let Some(start) = run_start
            && run_frames >= self.min_gap_frames
        {
            gaps.push(start..samples.len());
        }

        gaps
    }
}

/// Complement of sorted, disjoint `gaps` within `0..len`.
fn invert(gaps: &[Range<usize>], len: usize) -> Vec<Range<usize>> {
    let mut speech = Vec::with_capacity(gaps.len() + 1);
    let mut cursor = 0;
    for gap in gaps {
        if gap.start > cursor {
            speech.push(cursor..gap.start);
        }
        cursor = gap.end;
    }
    if cursor < len {
        speech.push(cursor..len);
    }
    speech
}

fn make_unit(index: usize, samples: &[f32], span: Range<usize>) -> AudioUnit {
    AudioUnit {
        index,
        start_time: audio::samples_to_secs(span.start),
        end_time: audio::samples_to_secs(span.end),
        samples: samples[span].to_vec(),
    }
}
