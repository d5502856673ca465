//! Streaming mono resampling on top of rubato
//
// rubato's FFT resampler works on fixed-size chunks. Input is buffered until
// a whole chunk is available, so output lags input by less than one chunk and
// consecutive blocks resample as one continuous, band-limited signal.

use anyhow::{anyhow, Context, Result};
use rubato::{FftFixedInOut, Resampler};

/// Chunk length in milliseconds of input
const CHUNK_MS: u32 = 10;

/// Stateful mono resampler fed with arbitrarily sized blocks.
pub struct StreamResampler {
    from_rate: u32,
    to_rate: u32,
    inner: Option<FftFixedInOut<f32>>,
    pending: Vec<f32>,
    input: Vec<Vec<f32>>,
    output: Vec<Vec<f32>>,
}

impl StreamResampler {
    pub fn new(from_rate: u32, to_rate: u32) -> Result<Self> {
        if from_rate == 0 || to_rate == 0 {
            return Err(anyhow!("invalid resample {}Hz -> {}Hz", from_rate, to_rate));
        }

        let inner = if from_rate == to_rate {
            None
        } else {
            let chunk = (from_rate / (1000 / CHUNK_MS)).max(1) as usize;
            let resampler =
                FftFixedInOut::<f32>::new(from_rate as usize, to_rate as usize, chunk, 1)
                    .with_context(|| {
                        format!("Failed to create {}Hz -> {}Hz resampler", from_rate, to_rate)
                    })?;
            Some(resampler)
        };

        let (input, output) = match &inner {
            Some(r) => (
                vec![Vec::with_capacity(r.input_frames_max())],
                vec![vec![0.0; r.output_frames_max()]],
            ),
            None => (Vec::new(), Vec::new()),
        };

        Ok(Self {
            from_rate,
            to_rate,
            inner,
            pending: Vec::new(),
            input,
            output,
        })
    }

    pub fn from_rate(&self) -> u32 {
        self.from_rate
    }

    pub fn to_rate(&self) -> u32 {
        self.to_rate
    }

    pub fn is_passthrough(&self) -> bool {
        self.inner.is_none()
    }

    /// Input frames consumed per resampling step (1 when passing through)
    pub fn input_chunk(&self) -> usize {
        self.inner.as_ref().map_or(1, |r| r.input_frames_next())
    }

    /// Resample one mono block
    pub fn process(&mut self, block: &[f32]) -> Result<Vec<f32>> {
        let mut out = Vec::new();
        self.process_into(block, &mut out)?;
        Ok(out)
    }

    /// Resample one mono block, appending every completed output chunk to `out`
    pub fn process_into(&mut self, block: &[f32], out: &mut Vec<f32>) -> Result<()> {
        let Some(resampler) = self.inner.as_mut() else {
            out.extend_from_slice(block);
            return Ok(());
        };

        self.pending.extend_from_slice(block);
        let mut consumed = 0;
        loop {
            let needed = resampler.input_frames_next();
            if self.pending.len() - consumed < needed {
                break;
            }
            self.input[0].clear();
            self.input[0].extend_from_slice(&self.pending[consumed..consumed + needed]);
            let (_, written) = resampler
                .process_into_buffer(&self.input, &mut self.output, None)
                .context("Resampling failed")?;
            out.extend_from_slice(&self.output[0][..written]);
            consumed += needed;
        }
        self.pending.drain(..consumed);

        Ok(())
    }
}
