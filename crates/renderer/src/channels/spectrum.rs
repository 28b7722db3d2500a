use std::f32::consts::PI;
use std::fmt;
use std::sync::Arc;

use realfft::{num_complex::Complex32, RealFftPlanner, RealToComplex};

use crate::gpu::TextureDesc;

const SMOOTHING: f32 = 0.8;
const MIN_DECIBELS: f32 = -100.0;
const MAX_DECIBELS: f32 = -30.0;
const BEAT_GAIN: f32 = 12.0;
const BEAT_THRESHOLD: f32 = 0.6;
const BEAT_DECAY: f32 = 0.9;

/// Turns microphone samples into the 2-row texture a program samples:
/// row 0 holds smoothed magnitudes in decibels, row 1 the latest waveform.
pub(crate) struct SpectrumAnalyser {
    fft_size: usize,
    plan: Arc<dyn RealToComplex<f32>>,
    input: Vec<f32>,
    spectrum: Vec<Complex32>,
    scratch: Vec<Complex32>,
    window: Vec<f32>,
    history: Vec<f32>,
    smoothed: Vec<f32>,
    buffer: Vec<u8>,
    low_energy: f32,
    beat: f32,
}

impl SpectrumAnalyser {
    pub fn new(fft_size: usize) -> Self {
        let fft_size = fft_size.max(2);
        let plan = RealFftPlanner::<f32>::new().plan_fft_forward(fft_size);
        let input = plan.make_input_vec();
        let spectrum = plan.make_output_vec();
        let scratch = plan.make_scratch_vec();
        let bins = fft_size / 2;
        Self {
            fft_size,
            plan,
            input,
            spectrum,
            scratch,
            window: (0..fft_size).map(|i| blackman_value(i, fft_size)).collect(),
            history: vec![0.0; fft_size],
            smoothed: vec![0.0; bins],
            buffer: initial_buffer(bins),
            low_energy: 0.0,
            beat: 0.0,
        }
    }

    pub fn bins(&self) -> usize {
        self.fft_size / 2
    }

    pub fn desc(&self) -> TextureDesc {
        TextureDesc::r8(self.bins() as u32, 2)
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// Onset strength of the low band in `[0, 1]`, decaying between hits.
    pub fn beat(&self) -> f32 {
        self.beat
    }

    /// Feeds new samples and recomputes both rows.
    pub fn process(&mut self, samples: &[f32]) {
        self.push_history(samples);

        for ((slot, sample), weight) in self.input.iter_mut().zip(&self.history).zip(&self.window) {
            *slot = sample * weight;
        }
        if let Err(error) =
            self.plan
                .process_with_scratch(&mut self.input, &mut self.spectrum, &mut self.scratch)
        {
            tracing::warn!(%error, "spectrum analysis failed");
            return;
        }

        let bins = self.bins();
        let scale = 1.0 / self.fft_size as f32;
        for (index, bin) in self.spectrum.iter().take(bins).enumerate() {
            let magnitude = bin.norm() * scale;
            let smoothed = SMOOTHING * self.smoothed[index] + (1.0 - SMOOTHING) * magnitude;
            self.smoothed[index] = smoothed;
            self.buffer[index] = decibels_to_byte(smoothed);
        }

        let waveform = &self.history[self.fft_size - bins..];
        for (slot, sample) in self.buffer[bins..].iter_mut().zip(waveform) {
            *slot = ((sample.clamp(-1.0, 1.0) * 0.5 + 0.5) * 255.0).round() as u8;
        }

        self.update_beat();
    }

    fn push_history(&mut self, samples: &[f32]) {
        if samples.len() >= self.fft_size {
            self.history
                .copy_from_slice(&samples[samples.len() - self.fft_size..]);
        } else {
            self.history.rotate_left(samples.len());
            let start = self.fft_size - samples.len();
            self.history[start..].copy_from_slice(samples);
        }
    }

    fn update_beat(&mut self) {
        let band = (self.bins() / 16).max(1);
        let energy = self.buffer[..band]
            .iter()
            .map(|value| *value as f32 / 255.0)
            .sum::<f32>()
            / band as f32;
        let onset = ((energy - self.low_energy).max(0.0) * BEAT_GAIN).clamp(0.0, 1.0);
        self.low_energy = energy;

        self.beat = if onset >= BEAT_THRESHOLD {
            onset
        } else {
            self.beat * BEAT_DECAY
        };
    }
}

impl fmt::Debug for SpectrumAnalyser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpectrumAnalyser")
            .field("fft_size", &self.fft_size)
            .field("beat", &self.beat)
            .finish()
    }
}

/// Silent spectrum with a centred waveform.
fn initial_buffer(bins: usize) -> Vec<u8> {
    let mut buffer = vec![0; bins * 2];
    buffer[bins..].fill(128);
    buffer
}

fn decibels_to_byte(magnitude: f32) -> u8 {
    let decibels = 20.0 * magnitude.max(1e-12).log10();
    let normalised = (decibels - MIN_DECIBELS) / (MAX_DECIBELS - MIN_DECIBELS);
    (normalised.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn blackman_value(index: usize, len: usize) -> f32 {
    if len <= 1 {
        return 1.0;
    }
    let phase = 2.0 * PI * index as f32 / (len as f32 - 1.0);
    0.42 - 0.5 * phase.cos() + 0.08 * (2.0 * phase).cos()
}
