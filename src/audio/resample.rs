use audioadapter_buffers::direct::SequentialSliceOfVecs;
use rubato::audioadapter::Adapter;
use rubato::{Fft, FixedSync, Resampler as RubatoResampler};

use crate::error::{ParleyError, Result};

use super::SAMPLE_RATE;

/// Resamples multi-channel audio to 16kHz mono f32.
pub struct Resampler {
    inner: Option<Fft<f32>>,
    channels: u16,
    source_rate: u32,
    input_buf: Vec<f32>,
    frames_in: usize,
    frames_out: usize,
}

impl Resampler {
    pub fn new(source_rate: u32, channels: u16) -> Result<Self> {
        if channels == 0 || source_rate == 0 {
            return Err(ParleyError::Resample(format!(
                "invalid source format: {source_rate} Hz, {channels} channels"
            )));
        }

        let needs_resample = source_rate != SAMPLE_RATE;

        let chunk_size = 1024;

        let inner = if needs_resample {
            Some(
                Fft::new(
                    source_rate as usize,
                    SAMPLE_RATE as usize,
                    chunk_size,
                    2, // sub_chunks
                    1, // output is always mono
                    FixedSync::Input,
                )
                .map_err(|e| ParleyError::Resample(format!("failed to create resampler: {e}")))?,
            )
        } else {
            None
        };

        Ok(Self {
            inner,
            channels,
            source_rate,
            input_buf: Vec::new(),
            frames_in: 0,
            frames_out: 0,
        })
    }

    /// Process interleaved multi-channel samples into 16kHz mono.
    pub fn process(&mut self, interleaved: &[f32]) -> Result<Vec<f32>> {
        let mono = self.downmix(interleaved);
        self.frames_in += mono.len();

        let Some(resampler) = self.inner.as_mut() else {
            self.frames_out += mono.len();
            return Ok(mono);
        };

        self.input_buf.extend_from_slice(&mono);

        let mut output = Vec::new();
        let frames_needed = resampler.input_frames_next();

        while self.input_buf.len() >= frames_needed {
            let chunk: Vec<f32> = self.input_buf.drain(..frames_needed).collect();
            Self::run_chunk(resampler, chunk, frames_needed, &mut output)?;
        }

        self.frames_out += output.len();
        Ok(output)
    }

    /// Flush buffered input, zero-padding the final partial chunk, and trim
    /// the output so the total length matches the input duration.
    pub fn finish(&mut self) -> Result<Vec<f32>> {
        let Some(resampler) = self.inner.as_mut() else {
            return Ok(Vec::new());
        };

        let expected_total = (self.frames_in as u64 * u64::from(SAMPLE_RATE))
            .div_ceil(u64::from(self.source_rate)) as usize;

        let mut output = Vec::new();
        if !self.input_buf.is_empty() {
            let frames_needed = resampler.input_frames_next();
            let mut chunk: Vec<f32> = self.input_buf.drain(..).collect();
            chunk.resize(frames_needed, 0.0);
            Self::run_chunk(resampler, chunk, frames_needed, &mut output)?;
        }

        let remaining = expected_total.saturating_sub(self.frames_out);
        output.truncate(remaining);
        self.frames_out += output.len();
        Ok(output)
    }

    fn downmix(&self, interleaved: &[f32]) -> Vec<f32> {
        if self.channels == 1 {
            return interleaved.to_vec();
        }

        let ch = self.channels as usize;
        interleaved
            .chunks_exact(ch)
            .map(|frame| frame.iter().sum::<f32>() / ch as f32)
            .collect()
    }

    fn run_chunk(
        resampler: &mut Fft<f32>,
        chunk: Vec<f32>,
        frames: usize,
        output: &mut Vec<f32>,
    ) -> Result<()> {
        // Wrap as 1-channel sequential buffer for rubato 1.0
        let input_data = vec![chunk];
        let input_buf = SequentialSliceOfVecs::new(&input_data, 1, frames)
            .map_err(|e| ParleyError::Resample(format!("buffer error: {e}")))?;
        let result = resampler
            .process(&input_buf, 0, None)
            .map_err(|e| ParleyError::Resample(format!("resample error: {e}")))?;
        let out_frames = result.frames();
        for frame in 0..out_frames {
            output.push(result.read_sample(0, frame).unwrap_or(0.0));
        }
        Ok(())
    }
}
