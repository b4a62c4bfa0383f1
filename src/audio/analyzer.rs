use crate::error::AnalyzerError;
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;

pub const WAVE_SAMPLES: usize = 512;

const BAND_GAIN: f32 = 0.02;
const BAND_EXPONENT: f32 = 0.6;
const BEAT_BANDS: usize = 4;
const BEAT_GAIN: f32 = 1.6;

// Weight kept from the previous value on each update.
const BAND_SMOOTH: f32 = 0.6;
const RMS_SMOOTH: f32 = 0.75;
const BEAT_SMOOTH: f32 = 0.45;

// Anything below this is treated as silence once smoothed.
const FLUSH: f32 = 1e-6;

#[derive(Debug, Clone, Copy)]
pub struct AnalyzerConfig {
    pub fft_size: usize,
    pub sample_rate_hz: u32,
    pub band_count: usize,
    pub low_hz: f32,
    pub high_hz: f32,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            fft_size: 1024,
            sample_rate_hz: 48_000,
            band_count: 32,
            low_hz: 20.0,
            high_hz: 16_000.0,
        }
    }
}

impl AnalyzerConfig {
    /// Defaults for a stream at `sample_rate_hz`, with the top band pulled
    /// under Nyquist for low-rate devices and files.
    pub fn for_stream(fft_size: usize, sample_rate_hz: u32) -> Self {
        let base = Self::default();
        let nyquist = sample_rate_hz as f32 * 0.5;
        Self {
            fft_size,
            sample_rate_hz,
            high_hz: base.high_hz.min(nyquist * 0.95),
            ..base
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SpectrumFrame {
    pub bands: Vec<f32>,
    pub band_centers_hz: Vec<f32>,
    pub rms: f32,
    pub beat: f32,
    pub spectrum_left: Vec<f32>,
    pub spectrum_right: Vec<f32>,
}

pub struct SpectrumAnalyzer {
    cfg: AnalyzerConfig,
    fft: Arc<dyn Fft<f32>>,
    hann: Vec<f32>,
    buf: Vec<Complex<f32>>,
    mags_left: Vec<f32>,
    mags_right: Vec<f32>,
    band_bins: Vec<(usize, usize)>,
    out: SpectrumFrame,
}

impl SpectrumAnalyzer {
    pub fn new(cfg: AnalyzerConfig) -> Result<Self, AnalyzerError> {
        let n = cfg.fft_size;
        if n < 16 || !n.is_power_of_two() {
            return Err(AnalyzerError::NonPowerOfTwo(n));
        }
        if cfg.band_count == 0 {
            return Err(AnalyzerError::NoBands);
        }
        let nyquist = cfg.sample_rate_hz as f32 * 0.5;
        if !(cfg.low_hz > 0.0 && cfg.low_hz < cfg.high_hz && cfg.high_hz <= nyquist) {
            return Err(AnalyzerError::BadCutoffs {
                low: cfg.low_hz,
                high: cfg.high_hz,
            });
        }

        let hann = (0..n)
            .map(|i| 0.5 - 0.5 * ((2.0 * PI * i as f32) / (n as f32)).cos())
            .collect::<Vec<_>>();
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(n);

        let (band_bins, band_centers_hz) = log_bands(&cfg);
        let half = n / 2;
        let out = SpectrumFrame {
            bands: vec![0.0; cfg.band_count],
            band_centers_hz,
            rms: 0.0,
            beat: 0.0,
            spectrum_left: vec![0.0; half],
            spectrum_right: vec![0.0; half],
        };

        Ok(Self {
            cfg,
            fft,
            hann,
            buf: vec![Complex { re: 0.0, im: 0.0 }; n],
            mags_left: vec![0.0; half],
            mags_right: vec![0.0; half],
            band_bins,
            out,
        })
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.cfg
    }

    pub fn fft_size(&self) -> usize {
        self.cfg.fft_size
    }

    pub fn last(&self) -> &SpectrumFrame {
        &self.out
    }

    /// Analyzes the newest `fft_size` frames of the snapshot. Shorter input is
    /// zero-padded at the oldest end.
    pub fn analyze(&mut self, left: &[f32], right: &[f32]) -> &SpectrumFrame {
        let n = self.cfg.fft_size;
        let rms_l = transform(&*self.fft, &self.hann, &mut self.buf, tail(left, n), &mut self.mags_left);
        let rms_r = transform(&*self.fft, &self.hann, &mut self.buf, tail(right, n), &mut self.mags_right);
        let rms = ((rms_l * rms_l + rms_r * rms_r) * 0.5).sqrt().clamp(0.0, 1.0);

        // Normalized so a full-scale sine peaks near 1.
        let norm = 4.0 / n as f32;
        for (dst, m) in self.out.spectrum_left.iter_mut().zip(&self.mags_left) {
            *dst = m * norm;
        }
        for (dst, m) in self.out.spectrum_right.iter_mut().zip(&self.mags_right) {
            *dst = m * norm;
        }

        for (b, &(lo, hi)) in self.band_bins.iter().enumerate() {
            let mut acc = 0.0f32;
            for i in lo..hi {
                acc += (self.mags_left[i] + self.mags_right[i]) * 0.5;
            }
            let avg = acc / (hi - lo).max(1) as f32;
            let v = (avg * BAND_GAIN).min(1.0).powf(BAND_EXPONENT);
            self.out.bands[b] = smooth(self.out.bands[b], v, BAND_SMOOTH);
        }

        let low = self.out.bands.len().min(BEAT_BANDS);
        let beat_raw = if low == 0 {
            0.0
        } else {
            let sum: f32 = self.out.bands[..low].iter().sum();
            (sum / low as f32 * BEAT_GAIN).clamp(0.0, 1.0)
        };
        self.out.beat = smooth(self.out.beat, beat_raw, BEAT_SMOOTH);
        self.out.rms = smooth(self.out.rms, rms, RMS_SMOOTH);

        &self.out
    }
}

fn smooth(prev: f32, next: f32, keep: f32) -> f32 {
    let next = if next.is_finite() { next.max(0.0) } else { 0.0 };
    let v = prev * keep + next * (1.0 - keep);
    if v < FLUSH { 0.0 } else { v }
}

fn tail(samples: &[f32], n: usize) -> &[f32] {
    &samples[samples.len().saturating_sub(n)..]
}

fn transform(
    fft: &dyn Fft<f32>,
    hann: &[f32],
    buf: &mut [Complex<f32>],
    samples: &[f32],
    mags: &mut [f32],
) -> f32 {
    let n = buf.len();
    let pad = n - samples.len();
    let mut acc = 0.0f32;
    for (i, c) in buf.iter_mut().enumerate() {
        let s = if i < pad { 0.0 } else { samples[i - pad] };
        let s = if s.is_finite() { s } else { 0.0 };
        let w = s * hann[i];
        acc += w * w;
        *c = Complex { re: w, im: 0.0 };
    }
    fft.process(buf);
    for (m, c) in mags.iter_mut().zip(buf.iter()) {
        *m = (c.re * c.re + c.im * c.im).sqrt();
    }
    (acc / n as f32).sqrt()
}

fn log_bands(cfg: &AnalyzerConfig) -> (Vec<(usize, usize)>, Vec<f32>) {
    let n = cfg.fft_size;
    let half = n / 2;
    let bin_hz = cfg.sample_rate_hz as f32 / n as f32;
    let ratio = cfg.high_hz / cfg.low_hz;
    let edge = |i: usize| cfg.low_hz * ratio.powf(i as f32 / cfg.band_count as f32);

    let mut bins = Vec::with_capacity(cfg.band_count);
    let mut centers = Vec::with_capacity(cfg.band_count);
    for b in 0..cfg.band_count {
        let (f0, f1) = (edge(b), edge(b + 1));
        let lo = ((f0 / bin_hz).floor() as usize).clamp(1, half - 1);
        let hi = ((f1 / bin_hz).ceil() as usize).clamp(lo + 1, half);
        bins.push((lo, hi));
        centers.push((f0 * f1).sqrt());
    }
    (bins, centers)
}

/// Per-frame sample data handed to wave renderers.
#[derive(Debug, Clone)]
pub struct WaveData {
    pub time_left: Vec<f32>,
    pub time_right: Vec<f32>,
    pub spec_left: Vec<f32>,
    pub spec_right: Vec<f32>,
}

impl Default for WaveData {
    fn default() -> Self {
        Self {
            time_left: vec![0.0; WAVE_SAMPLES],
            time_right: vec![0.0; WAVE_SAMPLES],
            spec_left: vec![0.0; WAVE_SAMPLES],
            spec_right: vec![0.0; WAVE_SAMPLES],
        }
    }
}

impl WaveData {
    pub fn update(&mut self, left: &[f32], right: &[f32], spectrum: &SpectrumFrame) {
        copy_tail(&mut self.time_left, left);
        copy_tail(&mut self.time_right, right);
        copy_head(&mut self.spec_left, &spectrum.spectrum_left);
        copy_head(&mut self.spec_right, &spectrum.spectrum_right);
    }
}

fn copy_tail(dst: &mut [f32], src: &[f32]) {
    let src = tail(src, dst.len());
    let pad = dst.len() - src.len();
    dst[..pad].fill(0.0);
    dst[pad..].copy_from_slice(src);
}

fn copy_head(dst: &mut [f32], src: &[f32]) {
    let n = dst.len().min(src.len());
    dst[..n].copy_from_slice(&src[..n]);
    dst[n..].fill(0.0);
}
