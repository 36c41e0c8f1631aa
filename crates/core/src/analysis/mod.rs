use serde::{Deserialize, Serialize};

use crate::{
    audio::{PcmBuffer, PcmSource},
    config::TempoConfig,
    mapping::map_speed,
    Result, TempoOrbitError,
};

pub const MIN_BPM: u32 = 60;
pub const MAX_BPM: u32 = 200;
pub const DEFAULT_BPM: u32 = 120;
/// Confidence reported for every successful analysis.
pub const ANALYSIS_CONFIDENCE: f32 = 0.85;
pub const FALLBACK_CONFIDENCE: f32 = 0.5;
pub const FALLBACK_SPEED: f32 = 2.0;

/// Tempo of a piece of audio together with the rotation speed derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TempoEstimate {
    pub bpm: u32,
    pub confidence: f32,
    pub optimal_speed: f32,
}

impl TempoEstimate {
    /// Estimate substituted whenever decoding or analysis fails.
    pub const FALLBACK: Self = Self {
        bpm: DEFAULT_BPM,
        confidence: FALLBACK_CONFIDENCE,
        optimal_speed: FALLBACK_SPEED,
    };

    fn from_bpm(bpm: u32) -> Self {
        let bpm = bpm.clamp(MIN_BPM, MAX_BPM);
        Self {
            bpm,
            confidence: ANALYSIS_CONFIDENCE,
            optimal_speed: map_speed(bpm),
        }
    }
}

impl Default for TempoEstimate {
    fn default() -> Self {
        Self::FALLBACK
    }
}

/// Short-time energy of one analysis window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnergyWindow {
    pub index: usize,
    pub energy: f32,
}

/// Everything a successful analysis derived along the way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TempoAnalysis {
    pub estimate: TempoEstimate,
    /// Peak timestamps in seconds.
    pub peak_times: Vec<f32>,
    pub intervals: Vec<f32>,
    /// Population variance of `intervals`. Not folded into the reported
    /// confidence.
    pub interval_variance: f32,
}

/// Energy-peak tempo estimator.
///
/// Only the first channel is analysed. Windows of `window_seconds` overlap by
/// `overlap`; local energy maxima above `peak_threshold` times the loudest
/// window count as beats and the mean spacing between them gives the tempo.
#[derive(Debug, Clone, Default)]
pub struct TempoEstimator {
    config: TempoConfig,
}

impl TempoEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: TempoConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TempoConfig {
        &self.config
    }

    /// Estimates the tempo of `pcm`. Never fails: any analysis error yields
    /// [`TempoEstimate::FALLBACK`].
    pub fn estimate(&self, pcm: &PcmBuffer) -> TempoEstimate {
        match self.analyze(pcm) {
            Ok(analysis) => analysis.estimate,
            Err(err) => {
                tracing::warn!(error = %err, "tempo analysis failed, using fallback estimate");
                TempoEstimate::FALLBACK
            }
        }
    }

    /// Decodes `source` and estimates its tempo. Decode errors resolve to the
    /// fallback estimate like analysis errors do.
    pub fn estimate_from(&self, source: &mut dyn PcmSource) -> TempoEstimate {
        match source.decode() {
            Ok(pcm) => self.estimate(&pcm),
            Err(err) => {
                tracing::warn!(error = %err, "decoding failed, using fallback estimate");
                TempoEstimate::FALLBACK
            }
        }
    }

    /// Runs the full analysis and reports its intermediate results.
    pub fn analyze(&self, pcm: &PcmBuffer) -> Result<TempoAnalysis> {
        self.config.validate()?;

        if pcm.sample_rate == 0 {
            return Err(TempoOrbitError::InvalidInput(
                "analysis requires a non-zero sample rate",
            ));
        }
        let samples = pcm
            .first_channel()
            .ok_or(TempoOrbitError::InvalidInput("analysis requires at least one channel"))?;

        let (window, hop) = self.window_and_hop(pcm.sample_rate);
        let energies = energy_windows(samples, window, hop);
        if energies.len() < 3 {
            return Err(TempoOrbitError::InvalidInput(
                "analysis requires at least three energy windows",
            ));
        }

        let peak_times: Vec<f32> = pick_peaks(&energies, self.config.peak_threshold)
            .into_iter()
            .map(|index| (index * hop) as f32 / pcm.sample_rate as f32)
            .collect();
        let intervals: Vec<f32> = peak_times.windows(2).map(|pair| pair[1] - pair[0]).collect();
        if intervals.is_empty() {
            return Err(TempoOrbitError::InvalidInput(
                "no beat intervals found in the signal",
            ));
        }

        let mean_interval = intervals.iter().sum::<f32>() / intervals.len() as f32;
        let interval_variance = intervals
            .iter()
            .map(|interval| (interval - mean_interval).powi(2))
            .sum::<f32>()
            / intervals.len() as f32;
        let bpm = (60.0 / mean_interval).round();
        let bpm = bpm.clamp(MIN_BPM as f32, MAX_BPM as f32) as u32;

        tracing::debug!(
            peaks = peak_times.len(),
            mean_interval,
            interval_variance,
            bpm,
            "tempo analysis finished"
        );

        Ok(TempoAnalysis {
            estimate: TempoEstimate::from_bpm(bpm),
            peak_times,
            intervals,
            interval_variance,
        })
    }

    fn window_and_hop(&self, sample_rate: u32) -> (usize, usize) {
        let window = ((sample_rate as f32 * self.config.window_seconds) as usize).max(1);
        let hop = ((window as f32 * (1.0 - self.config.overlap)) as usize).max(1);
        (window, hop)
    }
}

/// Mean squared amplitude over every complete window.
pub fn energy_windows(samples: &[f32], window: usize, hop: usize) -> Vec<EnergyWindow> {
    if window == 0 || hop == 0 || samples.len() < window {
        return Vec::new();
    }

    (0..=(samples.len() - window) / hop)
        .map(|index| {
            let start = index * hop;
            let frame = &samples[start..start + window];
            EnergyWindow {
                index,
                energy: frame.iter().map(|sample| sample * sample).sum::<f32>() / window as f32,
            }
        })
        .collect()
}

/// Indices of strict local maxima that exceed `threshold_ratio` times the
/// loudest window. The first and last window are never peaks.
pub fn pick_peaks(energies: &[EnergyWindow], threshold_ratio: f32) -> Vec<usize> {
    if energies.len() < 3 {
        return Vec::new();
    }

    let max_energy = energies
        .iter()
        .map(|window| window.energy)
        .fold(0.0_f32, f32::max);
    let threshold = threshold_ratio * max_energy;

    energies
        .windows(3)
        .filter(|triple| {
            let energy = triple[1].energy;
            energy > triple[0].energy && energy > triple[2].energy && energy > threshold
        })
        .map(|triple| triple[1].index)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: u32 = 44_100;

    /// Bursts of full-scale noise-free signal starting 1000 samples into each
    /// period, so every burst lands in exactly one dominant window.
    fn bursts(period_seconds: f32, seconds: f32) -> PcmBuffer {
        let period = (period_seconds * SAMPLE_RATE as f32).round() as usize;
        let total = (seconds * SAMPLE_RATE as f32) as usize;
        let samples = (0..total)
            .map(|i| {
                let offset = i % period;
                if (1_000..3_000).contains(&offset) {
                    1.0
                } else {
                    0.0
                }
            })
            .collect();
        PcmBuffer::mono(samples, SAMPLE_RATE)
    }

    #[test]
    fn half_second_bursts_give_120_bpm() {
        let estimator = TempoEstimator::new();
        let analysis = estimator.analyze(&bursts(0.5, 4.0)).unwrap();

        assert_eq!(analysis.estimate.bpm, 120);
        assert_eq!(analysis.estimate.confidence, ANALYSIS_CONFIDENCE);
        assert_eq!(analysis.estimate.optimal_speed, map_speed(120));
        assert!(analysis.interval_variance < 1e-6);
        assert!(analysis.peak_times.len() >= 6);
    }

    #[test]
    fn faster_bursts_give_faster_tempo() {
        let estimate = TempoEstimator::new().estimate(&bursts(0.4, 4.0));
        assert_eq!(estimate.bpm, 150);
        assert_eq!(estimate.confidence, ANALYSIS_CONFIDENCE);
    }

    #[test]
    fn tempo_is_clamped_to_supported_range() {
        // One burst every 0.2 s would be 300 bpm.
        let estimate = TempoEstimator::new().estimate(&bursts(0.2, 4.0));
        assert_eq!(estimate.bpm, MAX_BPM);

        // One burst every 1.5 s would be 40 bpm.
        let estimate = TempoEstimator::new().estimate(&bursts(1.5, 8.0));
        assert_eq!(estimate.bpm, MIN_BPM);
    }

    #[test]
    fn only_first_channel_is_analysed() {
        let mut reference = bursts(0.5, 4.0);
        let rhythmic = reference.channels.remove(0);
        let silent = vec![0.0; rhythmic.len()];
        let pcm = PcmBuffer::new(vec![rhythmic, silent], SAMPLE_RATE);

        assert_eq!(TempoEstimator::new().estimate(&pcm).bpm, 120);
    }

    #[test]
    fn silence_yields_fallback() {
        let pcm = PcmBuffer::mono(vec![0.0; SAMPLE_RATE as usize * 2], SAMPLE_RATE);
        let estimate = TempoEstimator::new().estimate(&pcm);

        assert_eq!(
            estimate,
            TempoEstimate {
                bpm: 120,
                confidence: 0.5,
                optimal_speed: 2.0,
            }
        );
    }

    #[test]
    fn degenerate_buffers_yield_fallback() {
        let estimator = TempoEstimator::new();
        assert_eq!(estimator.estimate(&PcmBuffer::default()), TempoEstimate::FALLBACK);
        assert_eq!(
            estimator.estimate(&PcmBuffer::new(Vec::new(), SAMPLE_RATE)),
            TempoEstimate::FALLBACK
        );
        assert_eq!(
            estimator.estimate(&PcmBuffer::mono(vec![1.0; 100], SAMPLE_RATE)),
            TempoEstimate::FALLBACK
        );
    }

    #[test]
    fn invalid_settings_yield_fallback() {
        let estimator = TempoEstimator::with_config(TempoConfig {
            overlap: 1.0,
            ..Default::default()
        });
        let pcm = bursts(0.4, 4.0);

        assert!(matches!(estimator.analyze(&pcm), Err(TempoOrbitError::InvalidConfig(_))));
        assert_eq!(estimator.estimate(&pcm), TempoEstimate::FALLBACK);
    }

    #[test]
    fn single_peak_has_no_interval() {
        let mut samples = vec![0.0; SAMPLE_RATE as usize];
        for sample in &mut samples[10_000..12_000] {
            *sample = 1.0;
        }
        let pcm = PcmBuffer::mono(samples, SAMPLE_RATE);

        assert!(TempoEstimator::new().analyze(&pcm).is_err());
        assert_eq!(TempoEstimator::new().estimate(&pcm), TempoEstimate::FALLBACK);
    }

    #[test]
    fn decode_failures_yield_fallback() {
        let mut failing = || -> Result<PcmBuffer> { Err(TempoOrbitError::Decode("truncated".into())) };
        let estimate = TempoEstimator::new().estimate_from(&mut failing);
        assert_eq!(estimate, TempoEstimate::FALLBACK);

        let mut working = || -> Result<PcmBuffer> { Ok(bursts(0.5, 4.0)) };
        assert_eq!(TempoEstimator::new().estimate_from(&mut working).bpm, 120);
    }

    #[test]
    fn energy_windows_overlap_by_half() {
        let samples: Vec<f32> = (0..10).map(|i| i as f32).collect();
        let windows = energy_windows(&samples, 4, 2);

        assert_eq!(windows.len(), 4);
        assert_eq!(windows[1].index, 1);
        // Mean of 2^2..5^2.
        assert_eq!(windows[1].energy, (4.0 + 9.0 + 16.0 + 25.0) / 4.0);
        assert!(energy_windows(&samples, 20, 10).is_empty());
    }

    #[test]
    fn peaks_need_to_clear_threshold() {
        let energies: Vec<EnergyWindow> = [0.0, 1.0, 0.0, 0.2, 0.0, 0.9, 0.0]
            .iter()
            .enumerate()
            .map(|(index, &energy)| EnergyWindow { index, energy })
            .collect();

        assert_eq!(pick_peaks(&energies, 0.3), vec![1, 5]);
        assert_eq!(pick_peaks(&energies, 0.0), vec![1, 3, 5]);
    }

    #[test]
    fn plateaus_are_not_peaks() {
        let energies: Vec<EnergyWindow> = [0.0, 1.0, 1.0, 0.0]
            .iter()
            .enumerate()
            .map(|(index, &energy)| EnergyWindow { index, energy })
            .collect();

        assert!(pick_peaks(&energies, 0.3).is_empty());
    }
}
