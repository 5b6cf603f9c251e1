// synthetic power spectral density snapshots, standing in for the acquisition hardware

use std::f32::consts::PI;
use std::sync::Arc;

use num_complex::Complex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustfft::{Fft, FftPlanner};

use crate::app_config::SimulatorConfig;
use crate::error::{Error, Result};
use crate::messages::{Calibration, SpectrumFrame};

// log10(0) would give -inf, which the wire format can't carry
pub const FLOOR_DB: f32 = -200.0;

pub struct SyntheticPsd {
    calibration: Calibration,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    // time-domain tones, noise is added fresh for every snapshot
    tones: Vec<f32>,
    noise_amplitude: f32,
    rng: StdRng,
}

impl SyntheticPsd {
    pub fn new(cfg: &SimulatorConfig) -> Result<SyntheticPsd> {
        if cfg.fft_size < 2 {
            return Err(Error::InvalidArgument(format!("fft_size must be at least 2, got {}", cfg.fft_size)));
        }
        if !(cfg.sample_rate > 0.0) {
            return Err(Error::InvalidArgument(format!("sample_rate must be positive, got {}", cfg.sample_rate)));
        }

        let fft = FftPlanner::new().plan_fft_forward(cfg.fft_size);

        // the signal is real-valued, so each tone shows up mirrored around the center
        let mut signal = wavegen::Waveform::<f32>::new(cfg.sample_rate as f32);
        for tone in &cfg.tones {
            signal.add_component(wavegen::sine!(tone.abs() as f32));
        }
        let tones = if cfg.tones.is_empty() {
            vec![0.0; cfg.fft_size]
        } else {
            signal.iter().take(cfg.fft_size).collect()
        };

        let bin_size = cfg.sample_rate / cfg.fft_size as f64;
        let start_freq = cfg.center_freq - cfg.sample_rate / 2.0;

        Ok(SyntheticPsd {
            calibration: Calibration::new(start_freq, bin_size, cfg.fft_size),
            fft,
            window: hamming_window(cfg.fft_size),
            tones,
            noise_amplitude: cfg.noise_amplitude as f32,
            rng: StdRng::seed_from_u64(cfg.seed),
        })
    }

    pub fn calibration(&self) -> Calibration {
        self.calibration
    }

    pub fn snapshot(&mut self) -> Result<SpectrumFrame> {
        let mut samples: Vec<Complex<f32>> = self
            .tones
            .iter()
            .map(|&tone| {
                let noise = if self.noise_amplitude > 0.0 {
                    self.rng.gen_range(-self.noise_amplitude..=self.noise_amplitude)
                } else {
                    0.0
                };
                Complex::new(tone + noise, 0.0)
            })
            .collect();

        let psd = self.calc_psd(&mut samples);
        SpectrumFrame::new(self.calibration, psd)
    }

    // https://pysdr.org/content/sampling.html#calculating-power-spectral-density
    fn calc_psd(&self, samples: &mut [Complex<f32>]) -> Vec<f64> {
        for (sample, w) in samples.iter_mut().zip(&self.window) {
            *sample = sample.scale(*w);
        }
        self.fft.process(samples);

        // RustFFT does not normalize outputs
        let norm_factor = 1.0 / (samples.len() as f32).sqrt();

        let mut psd: Vec<f32> = samples
            .iter()
            .map(|bin| (20.0 * (bin.norm() * norm_factor).log10()).max(FLOOR_DB))
            .collect();
        fftshift(&mut psd);

        psd.into_iter().map(f64::from).collect()
    }
}

// x = 0.53836 - 0.46164*cos( (2*pi*n) / (N - 1))
fn hamming_window(len: usize) -> Vec<f32> {
    (0..len)
        .map(|n| {
            let numerator = 2.0 * PI * (n as f32);
            0.53836 - 0.46164 * (numerator / (len as f32 - 1.0)).cos()
        })
        .collect()
}

// https://numpy.org/doc/stable/reference/generated/numpy.fft.fftshift.html
fn fftshift<T>(buf: &mut [T]) {
    let half = buf.len() / 2;
    buf.rotate_right(half);
}
