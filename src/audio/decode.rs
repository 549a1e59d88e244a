use std::io::{self, Read};
use std::path::Path;
use std::process::Command;

use hound::{SampleFormat, WavReader};

use crate::error::{ParleyError, Result};

use super::resample::Resampler;
use super::{PcmAudio, SAMPLE_RATE, SourceFormat};

/// Decode an audio file into 16kHz mono samples.
///
/// WAV files are read directly. Anything else (mp3, m4a, ogg, ...) is first
/// converted by an external `ffmpeg` process into a scratch WAV file that is
/// removed when decoding finishes.
pub fn decode(path: &Path) -> Result<PcmAudio> {
    if !path.exists() {
        return Err(ParleyError::Decode(format!(
            "audio file not found: {}",
            path.display()
        )));
    }

    if is_wav(path) {
        tracing::debug!("decoding WAV {}", path.display());
        let reader = WavReader::open(path).map_err(|e| {
            ParleyError::Decode(format!("failed to open WAV file {}: {e}", path.display()))
        })?;
        return decode_wav(reader);
    }

    convert_with_ffmpeg(path)
}

fn is_wav(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("wav"))
}

fn convert_with_ffmpeg(path: &Path) -> Result<PcmAudio> {
    let scratch = tempfile::Builder::new()
        .prefix("parley-decode-")
        .suffix(".wav")
        .tempfile()
        .map_err(|e| ParleyError::Decode(format!("failed to create scratch WAV: {e}")))?;

    tracing::info!("converting {} to WAV with ffmpeg", path.display());

    let output = Command::new("ffmpeg")
        .args(["-nostdin", "-hide_banner", "-loglevel", "error", "-y", "-i"])
        .arg(path)
        .args(["-ac", "1", "-ar", &SAMPLE_RATE.to_string(), "-c:a", "pcm_s16le"])
        .arg(scratch.path())
        .output()
        .map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                ParleyError::Decode(format!(
                    "ffmpeg not found in PATH; it is required to decode {}",
                    path.display()
                ))
            } else {
                ParleyError::Decode(format!("failed to run ffmpeg: {e}"))
            }
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ParleyError::Decode(format!(
            "ffmpeg could not decode {} ({}): {}",
            path.display(),
            output.status,
            stderr.trim()
        )));
    }

    let reader = WavReader::open(scratch.path())
        .map_err(|e| ParleyError::Decode(format!("failed to open converted WAV: {e}")))?;
    decode_wav(reader)
}

/// Decode any PCM or float WAV stream, down-mixing and resampling as needed.
pub fn decode_wav<R: Read>(mut reader: WavReader<R>) -> Result<PcmAudio> {
    let spec = reader.spec();
    let source = SourceFormat {
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        bits_per_sample: spec.bits_per_sample,
    };

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .map(|s| s.map_err(|e| ParleyError::Decode(format!("WAV read error: {e}"))))
            .collect::<Result<Vec<f32>>>()?,
        SampleFormat::Int => {
            if spec.bits_per_sample == 0 || spec.bits_per_sample > 32 {
                return Err(ParleyError::Decode(format!(
                    "unsupported bit depth: {}",
                    spec.bits_per_sample
                )));
            }
            let scale = 1.0 / f64::from(1u32 << (spec.bits_per_sample - 1));
            reader
                .samples::<i32>()
                .map(|s| {
                    s.map(|v| (f64::from(v) * scale) as f32)
                        .map_err(|e| ParleyError::Decode(format!("WAV read error: {e}")))
                })
                .collect::<Result<Vec<f32>>>()?
        }
    };

    tracing::debug!(
        "decoded {} samples: {} Hz, {} channels, {} bits",
        interleaved.len(),
        source.sample_rate,
        source.channels,
        source.bits_per_sample
    );

    let mut resampler = Resampler::new(source.sample_rate, source.channels)
        .map_err(|e| ParleyError::Decode(e.to_string()))?;
    let mut samples = resampler.process(&interleaved)?;
    samples.extend(resampler.finish()?);

    Ok(PcmAudio { samples, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{WavSpec, WavWriter};

    fn write_wav(path: &Path, spec: WavSpec, samples: &[i16]) {
        let mut writer = WavWriter::create(path, spec).unwrap_or_else(|e| panic!("{e}"));
        for &s in samples {
            writer.write_sample(s).unwrap_or_else(|e| panic!("{e}"));
        }
        writer.finalize().unwrap_or_else(|e| panic!("{e}"));
    }

    #[test]
    fn decodes_mono_16k_wav() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
        let path = dir.path().join("mono.wav");
        let spec = WavSpec {
            channels: 1,
            sample_rate: 16000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        write_wav(&path, spec, &[0, 16384, -16384, 0]);

        let audio = decode(&path).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(audio.samples.len(), 4);
        assert!((audio.samples[1] - 0.5).abs() < 1e-6);
        assert!((audio.samples[2] + 0.5).abs() < 1e-6);
        assert_eq!(audio.source.channels, 1);
        assert_eq!(audio.source.bits_per_sample, 16);
    }

    #[test]
    fn downmixes_stereo() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
        let path = dir.path().join("stereo.wav");
        let spec = WavSpec {
            channels: 2,
            sample_rate: 16000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        write_wav(&path, spec, &[16384, 0, 16384, 0, 0, 0]);

        let audio = decode(&path).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(audio.samples.len(), 3);
        assert!((audio.samples[0] - 0.25).abs() < 1e-6);
        assert_eq!(audio.source.channels, 2);
    }

    #[test]
    fn resamples_to_16k() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
        let path = dir.path().join("narrow.wav");
        let spec = WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        write_wav(&path, spec, &vec![1000i16; 16000]);

        let audio = decode(&path).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(audio.source.sample_rate, 8000);
        assert!(audio.samples.len() <= 32000);
        assert!(audio.samples.len() >= 32000 - 2048);
    }

    #[test]
    fn missing_file_is_decode_error() {
        let result = decode(Path::new("/nonexistent/input.mp3"));
        assert!(matches!(result, Err(ParleyError::Decode(_))));
    }

    #[test]
    fn corrupt_wav_is_decode_error() {
        let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("{e}"));
        let path = dir.path().join("broken.wav");
        std::fs::write(&path, b"definitely not a RIFF header").unwrap_or_else(|e| panic!("{e}"));

        let result = decode(&path);
        assert!(matches!(result, Err(ParleyError::Decode(_))));
    }
}
