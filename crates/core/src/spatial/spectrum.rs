use std::{f32::consts::PI, fmt, sync::Arc};

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};

use crate::{config::EngineConfig, Result, TempoOrbitError};

/// Byte-scaled magnitude spectrum of the most recent samples.
///
/// Samples are collected in a ring of `analysis_window` entries. Every
/// [`push`](Self::push) windows the ring with a Blackman window, smooths the
/// normalised magnitudes over time and maps the decibel range
/// `[min_decibels, max_decibels]` onto `0..=255`.
pub struct SpectrumAnalyser {
    size: usize,
    smoothing: f32,
    min_decibels: f32,
    max_decibels: f32,
    history: Vec<f32>,
    write_index: usize,
    window: Vec<f32>,
    plan: Arc<dyn RealToComplex<f32>>,
    input: Vec<f32>,
    spectrum: Vec<Complex32>,
    scratch: Vec<Complex32>,
    smoothed: Vec<f32>,
    bytes: Vec<u8>,
}

impl SpectrumAnalyser {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let size = config.analysis_window;
        if size < 2 || !size.is_power_of_two() {
            return Err(TempoOrbitError::InvalidConfig(format!(
                "analysis window must be a power of two, got {size}"
            )));
        }

        let plan = RealFftPlanner::<f32>::new().plan_fft_forward(size);
        let input = plan.make_input_vec();
        let spectrum = plan.make_output_vec();
        let scratch = plan.make_scratch_vec();

        Ok(Self {
            size,
            smoothing: config.smoothing,
            min_decibels: config.min_decibels,
            max_decibels: config.max_decibels,
            history: vec![0.0; size],
            write_index: 0,
            window: blackman_window(size),
            plan,
            input,
            spectrum,
            scratch,
            smoothed: vec![0.0; size / 2],
            bytes: vec![0; size / 2],
        })
    }

    /// Number of bins in a snapshot.
    pub fn bin_count(&self) -> usize {
        self.size / 2
    }

    /// Appends `samples` and refreshes the snapshot. Empty blocks leave the
    /// snapshot untouched.
    pub fn push(&mut self, samples: &[f32]) -> Result<()> {
        if samples.is_empty() {
            return Ok(());
        }

        for &sample in samples {
            self.history[self.write_index] = sample;
            self.write_index = (self.write_index + 1) % self.size;
        }
        self.analyse()
    }

    pub fn snapshot(&self) -> &[u8] {
        &self.bytes
    }

    fn analyse(&mut self) -> Result<()> {
        for (i, slot) in self.input.iter_mut().enumerate() {
            let sample = self.history[(self.write_index + i) % self.size];
            *slot = sample * self.window[i];
        }

        self.plan
            .process_with_scratch(&mut self.input, &mut self.spectrum, &mut self.scratch)?;

        let scale = 255.0 / (self.max_decibels - self.min_decibels);
        let norm = 1.0 / self.size as f32;
        for ((bin, smoothed), byte) in self
            .spectrum
            .iter()
            .zip(self.smoothed.iter_mut())
            .zip(self.bytes.iter_mut())
        {
            let magnitude = bin.norm() * norm;
            *smoothed = self.smoothing * *smoothed + (1.0 - self.smoothing) * magnitude;
            if !smoothed.is_finite() {
                *smoothed = 0.0;
            }

            *byte = if *smoothed > 0.0 {
                let decibels = 20.0 * smoothed.log10();
                (scale * (decibels - self.min_decibels)).floor().clamp(0.0, 255.0) as u8
            } else {
                0
            };
        }
        Ok(())
    }
}

impl fmt::Debug for SpectrumAnalyser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpectrumAnalyser")
            .field("size", &self.size)
            .field("smoothing", &self.smoothing)
            .field("min_decibels", &self.min_decibels)
            .field("max_decibels", &self.max_decibels)
            .finish()
    }
}

fn blackman_window(len: usize) -> Vec<f32> {
    const A0: f32 = 0.42;
    const A1: f32 = 0.5;
    const A2: f32 = 0.08;

    (0..len)
        .map(|n| {
            let phase = 2.0 * PI * n as f32 / len as f32;
            A0 - A1 * phase.cos() + A2 * (2.0 * phase).cos()
        })
        .collect()
}
