pub mod decode;
pub mod resample;

/// Sample rate every recognizer in this crate consumes.
pub const SAMPLE_RATE: u32 = 16000;

/// Properties of the file the audio was decoded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

/// A fully decoded recording: 16kHz mono f32 samples in `[-1.0, 1.0]`.
///
/// Read-only once decoded; segmenters and recognizers borrow slices of it.
#[derive(Debug, Clone)]
pub struct PcmAudio {
    pub samples: Vec<f32>,
    pub source: SourceFormat,
}

impl PcmAudio {
    /// Wrap samples that are already 16kHz mono.
    #[must_use]
    pub const fn from_mono(samples: Vec<f32>) -> Self {
        Self {
            samples,
            source: SourceFormat {
                sample_rate: SAMPLE_RATE,
                channels: 1,
                bits_per_sample: 32,
            },
        }
    }

    #[must_use]
    pub fn duration_secs(&self) -> f64 {
        samples_to_secs(self.samples.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[must_use]
pub fn samples_to_secs(samples: usize) -> f64 {
    samples as f64 / f64::from(SAMPLE_RATE)
}

#[must_use]
pub const fn ms_to_samples(ms: u64) -> usize {
    (ms as usize) * (SAMPLE_RATE as usize) / 1000
}

/// Convert f32 samples to 16-bit signed PCM, clamping out-of-range values.
#[must_use]
pub fn to_i16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| {
            let clamped = s.clamp(-1.0, 1.0);
            (clamped * f32::from(i16::MAX)) as i16
        })
        .collect()
}

/// RMS loudness relative to full scale. Digital silence is `-inf`.
#[must_use]
pub fn dbfs(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return f32::NEG_INFINITY;
    }

    let sum_sq: f64 = samples.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
    let rms = (sum_sq / samples.len() as f64).sqrt();
    if rms == 0.0 {
        return f32::NEG_INFINITY;
    }

    (20.0 * rms.log10()) as f32
}
