// threshold-based peak and valley finder used to annotate spectra

use crate::error::{Error, Result};

/// Sensitivity the renderer applies to the RMS deviation of each frame
pub const DEFAULT_SENSITIVITY: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakEntry {
    pub index: usize,
    pub value: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Peaks {
    pub maxima: Vec<PeakEntry>,
    pub minima: Vec<PeakEntry>,
}

/// Single pass over `samples`. A maximum is confirmed once the signal drops
/// at least `threshold` below it, a minimum once the signal rises at least
/// `threshold` above it. Peaks and valleys alternate, so a noisy plateau
/// gives one detection.
pub fn detect(samples: &[f64], threshold: f64) -> Result<Peaks> {
    // also catches NaN
    if !(threshold > 0.0) {
        return Err(Error::InvalidArgument(format!(
            "peak threshold must be positive, got {threshold}"
        )));
    }

    let mut peaks = Peaks::default();
    let mut max = PeakEntry { index: 0, value: f64::NEG_INFINITY };
    let mut min = PeakEntry { index: 0, value: f64::INFINITY };
    let mut seeking_max = true;

    for (index, &value) in samples.iter().enumerate() {
        if value > max.value {
            max = PeakEntry { index, value };
        }
        if value < min.value {
            min = PeakEntry { index, value };
        }

        if seeking_max {
            if value <= max.value - threshold {
                peaks.maxima.push(max);
                min = PeakEntry { index, value };
                seeking_max = false;
            }
        } else if value >= min.value + threshold {
            peaks.minima.push(min);
            max = PeakEntry { index, value };
            seeking_max = true;
        }
    }

    Ok(peaks)
}

/// `sensitivity` times the RMS deviation of `samples` from their mean
pub fn noise_threshold(samples: &[f64], sensitivity: f64) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    let variance = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt() * sensitivity
}

/// Detection with a threshold that follows the noise floor of this frame.
/// A flat or empty signal has nothing to annotate.
pub fn annotate(samples: &[f64], sensitivity: f64) -> Peaks {
    let threshold = noise_threshold(samples, sensitivity);
    detect(samples, threshold).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indices(entries: &[PeakEntry]) -> Vec<usize> {
        entries.iter().map(|p| p.index).collect()
    }

    #[test]
    fn alternating_peaks_and_valley() {
        let peaks = detect(&[0.0, 10.0, 0.0, 10.0, 0.0], 5.0).unwrap();
        assert_eq!(
            peaks.maxima,
            vec![PeakEntry { index: 1, value: 10.0 }, PeakEntry { index: 3, value: 10.0 }]
        );
        assert_eq!(peaks.minima, vec![PeakEntry { index: 2, value: 0.0 }]);
    }

    #[test]
    fn plateau_gives_one_peak() {
        let peaks = detect(&[0.0, 0.0, 10.0, 10.0, 0.0, 0.0], 5.0).unwrap();
        assert_eq!(peaks.maxima, vec![PeakEntry { index: 2, value: 10.0 }]);
        assert!(peaks.minima.is_empty());
    }

    #[test]
    fn drop_of_exactly_threshold_confirms() {
        let peaks = detect(&[0.0, 5.0, 0.0], 5.0).unwrap();
        assert_eq!(peaks.maxima, vec![PeakEntry { index: 1, value: 5.0 }]);

        let peaks = detect(&[5.0, 0.0, 5.0], 5.0).unwrap();
        assert_eq!(peaks.maxima, vec![PeakEntry { index: 0, value: 5.0 }]);
        assert_eq!(peaks.minima, vec![PeakEntry { index: 1, value: 0.0 }]);
    }

    #[test]
    fn small_wiggles_are_ignored() {
        let samples = [0.0, 1.0, 0.5, 1.5, 0.2, 9.0, 8.5, 9.2, 1.0];
        let peaks = detect(&samples, 3.0).unwrap();
        assert_eq!(indices(&peaks.maxima), vec![7]);
        assert!(peaks.minima.is_empty());
    }

    #[test]
    fn non_positive_threshold_is_rejected() {
        for threshold in [0.0, -1.0, f64::NAN] {
            assert!(matches!(
                detect(&[1.0, 2.0, 1.0], threshold),
                Err(Error::InvalidArgument(_))
            ));
        }
    }

    #[test]
    fn empty_input() {
        assert_eq!(detect(&[], 1.0).unwrap(), Peaks::default());
    }

    #[test]
    fn rms_threshold() {
        // mean 0, every deviation is 2
        let threshold = noise_threshold(&[2.0, -2.0, 2.0, -2.0], 5.0);
        assert!((threshold - 10.0).abs() < 1e-12);
    }

    #[test]
    fn annotate_finds_carrier_above_noise_floor() {
        let mut spectrum = vec![-90.0; 64];
        for (i, s) in spectrum.iter_mut().enumerate() {
            *s += if i % 2 == 0 { 0.5 } else { -0.5 };
        }
        spectrum[40] = -20.0;
        let peaks = annotate(&spectrum, DEFAULT_SENSITIVITY);
        assert_eq!(indices(&peaks.maxima), vec![40]);
    }

    #[test]
    fn annotate_flat_spectrum_is_empty() {
        assert_eq!(annotate(&[-80.0; 16], DEFAULT_SENSITIVITY), Peaks::default());
        assert_eq!(annotate(&[], DEFAULT_SENSITIVITY), Peaks::default());
    }
}
