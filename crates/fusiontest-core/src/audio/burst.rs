//! Windowed burst synthesis
//!
//! Generates a single Hann-windowed burst, either a pure tone at the carrier
//! frequency or a white-noise "click", at the output's sample rate.
//! Every burst is peak-normalized so that the scene assembler alone decides
//! the final playback level.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;
use std::fmt;

/// Shortest burst the synthesizer will produce, in samples
pub const MIN_BURST_SAMPLES: usize = 8;

/// Peak level below which a burst is considered silent and left unnormalized
pub const SILENT_PEAK: f64 = 1e-9;

/// Kind of burst placed in each interval of the stimulus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StimulusKind {
    /// Sine at the carrier frequency under a Hann envelope
    Tone,
    /// Uniform white noise under a Hann envelope
    Click,
}

impl StimulusKind {
    /// Label used in response logs and the session summary
    pub fn label(&self) -> &'static str {
        match self {
            StimulusKind::Tone => "Tone",
            StimulusKind::Click => "Click",
        }
    }
}

impl fmt::Display for StimulusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A single windowed, peak-normalized burst
#[derive(Debug, Clone, PartialEq)]
pub struct Burst {
    /// Sample values in [-1, 1]
    samples: Vec<f32>,
    /// Sample rate the burst was synthesized for
    sample_rate: u32,
}

impl Burst {
    /// Wrap precomputed samples as a burst
    ///
    /// Used by the assembler tests and by callers that want to place an
    /// externally prepared waveform.
    pub fn from_samples(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Burst samples
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Number of samples in the burst
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True when the burst holds no samples
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Sample rate in Hz
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Maximum absolute sample value
    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()))
    }

    /// Burst duration in milliseconds at its sample rate
    pub fn duration_ms(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 * 1000.0 / self.sample_rate as f64
    }
}

/// Number of samples for a burst of `duration_ms` at `sample_rate`
///
/// Rounds to the nearest sample and never returns less than
/// [`MIN_BURST_SAMPLES`], so very short bursts at low sample rates still get
/// a usable window.
///
/// # Example
/// ```
/// use fusiontest_core::audio::burst::burst_length;
///
/// assert_eq!(burst_length(7.0, 48000), 336);
/// assert_eq!(burst_length(0.1, 8000), 8); // 0.8 samples, floored to 8
/// ```
pub fn burst_length(duration_ms: f64, sample_rate: u32) -> usize {
    let n = (sample_rate as f64 * duration_ms / 1000.0).round();
    if n.is_finite() && n > MIN_BURST_SAMPLES as f64 {
        n as usize
    } else {
        MIN_BURST_SAMPLES
    }
}

/// Hann window weight for sample `i` of an `n`-sample window
///
/// The weight is computed from the distance to the nearer edge so that
/// samples `i` and `n - 1 - i` always receive bit-identical weights.
pub fn hann_weight(i: usize, n: usize) -> f64 {
    if n < 2 {
        return 1.0;
    }
    let k = i.min(n - 1 - i.min(n - 1));
    0.5 - 0.5 * (TAU * k as f64 / (n - 1) as f64).cos()
}

/// Synthesize one burst
///
/// # Arguments
/// * `kind` - Tone or noise click
/// * `duration_ms` - Burst duration; any positive value is accepted
/// * `carrier_hz` - Tone frequency (ignored for clicks)
/// * `sample_rate` - Output sample rate in Hz
/// * `rng` - Random source for noise samples (not consumed for tones)
///
/// # Example
/// ```
/// use fusiontest_core::audio::burst::{synthesize_burst, StimulusKind};
/// use rand::SeedableRng;
///
/// let mut rng = rand::rngs::StdRng::seed_from_u64(7);
/// let burst = synthesize_burst(StimulusKind::Tone, 7.0, 1000.0, 48000, &mut rng);
/// assert_eq!(burst.len(), 336);
/// assert!((burst.peak() - 1.0).abs() < 1e-6);
/// ```
pub fn synthesize_burst<R: Rng>(
    kind: StimulusKind,
    duration_ms: f64,
    carrier_hz: f64,
    sample_rate: u32,
    rng: &mut R,
) -> Burst {
    let n = burst_length(duration_ms, sample_rate);
    let rate = sample_rate.max(1) as f64;

    let mut raw: Vec<f64> = match kind {
        StimulusKind::Tone => (0..n)
            .map(|i| (TAU * carrier_hz * i as f64 / rate).sin())
            .collect(),
        StimulusKind::Click => (0..n).map(|_| rng.random_range(-1.0..=1.0)).collect(),
    };

    for (i, sample) in raw.iter_mut().enumerate() {
        *sample *= hann_weight(i, n);
    }

    let peak = raw.iter().fold(0.0f64, |acc, s| acc.max(s.abs()));
    if peak >= SILENT_PEAK {
        for sample in raw.iter_mut() {
            *sample /= peak;
        }
    } else {
        tracing::debug!(kind = %kind, samples = n, "Burst is silent, skipping peak normalization");
    }

    Burst {
        samples: raw.into_iter().map(|s| s as f32).collect(),
        sample_rate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(0xF051_0A)
    }

    #[test]
    fn test_burst_length_rounding() {
        assert_eq!(burst_length(7.0, 48000), 336);
        assert_eq!(burst_length(10.0, 44100), 441);
        // 0.6ms at 44.1kHz = 26.46 samples
        assert_eq!(burst_length(0.6, 44100), 26);
        // 0.25ms at 44.1kHz = 11.025 samples
        assert_eq!(burst_length(0.25, 44100), 11);
    }

    #[test]
    fn test_burst_length_floor() {
        assert_eq!(burst_length(0.1, 8000), MIN_BURST_SAMPLES);
        assert_eq!(burst_length(0.0, 48000), MIN_BURST_SAMPLES);
        assert_eq!(burst_length(f64::NAN, 48000), MIN_BURST_SAMPLES);
    }

    #[test]
    fn test_hann_edges_and_center() {
        let n = 101;
        assert!(hann_weight(0, n).abs() < 1e-12);
        assert!(hann_weight(n - 1, n).abs() < 1e-12);
        assert!((hann_weight(50, n) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_hann_symmetry() {
        for n in [8usize, 9, 26, 336, 1001] {
            for i in 0..n {
                assert_eq!(
                    hann_weight(i, n),
                    hann_weight(n - 1 - i, n),
                    "Window weight mismatch at {} of {}",
                    i,
                    n
                );
            }
        }
    }

    #[test]
    fn test_tone_peak_normalized() {
        let burst = synthesize_burst(StimulusKind::Tone, 7.0, 1000.0, 48000, &mut rng());
        assert_eq!(burst.len(), 336);
        assert!((burst.peak() - 1.0).abs() < 1e-6, "peak {}", burst.peak());
        assert!(burst.samples().iter().all(|s| s.abs() <= 1.0));
    }

    #[test]
    fn test_tone_edges_are_silent() {
        let burst = synthesize_burst(StimulusKind::Tone, 7.0, 1000.0, 48000, &mut rng());
        assert!(burst.samples()[0].abs() < 1e-6);
        assert!(burst.samples()[burst.len() - 1].abs() < 1e-3);
    }

    #[test]
    fn test_tone_is_deterministic() {
        let a = synthesize_burst(StimulusKind::Tone, 5.0, 1000.0, 44100, &mut rng());
        let b = synthesize_burst(
            StimulusKind::Tone,
            5.0,
            1000.0,
            44100,
            &mut StdRng::seed_from_u64(99),
        );
        assert_eq!(a, b);
    }

    #[test]
    fn test_click_seeded_reproducible() {
        let a = synthesize_burst(StimulusKind::Click, 0.6, 1000.0, 48000, &mut rng());
        let b = synthesize_burst(StimulusKind::Click, 0.6, 1000.0, 48000, &mut rng());
        assert_eq!(a, b);

        let c = synthesize_burst(
            StimulusKind::Click,
            0.6,
            1000.0,
            48000,
            &mut StdRng::seed_from_u64(1),
        );
        assert_ne!(a, c);
    }

    #[test]
    fn test_click_peak_normalized() {
        let burst = synthesize_burst(StimulusKind::Click, 2.0, 1000.0, 48000, &mut rng());
        assert_eq!(burst.len(), 96);
        assert!((burst.peak() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_silent_burst_stays_zero() {
        // A carrier at the sample rate lands every sample on a zero crossing
        let burst = synthesize_burst(StimulusKind::Tone, 1.0, 8000.0, 8000, &mut rng());
        assert_eq!(burst.len(), 8);
        assert!(burst.peak() < 1e-6);
    }

    #[test]
    fn test_kind_serde_names() {
        assert_eq!(
            serde_json::to_string(&StimulusKind::Tone).unwrap(),
            "\"tone\""
        );
        let kind: StimulusKind = serde_json::from_str("\"click\"").unwrap();
        assert_eq!(kind, StimulusKind::Click);
    }

    #[test]
    fn test_duration_ms() {
        let burst = synthesize_burst(StimulusKind::Tone, 10.0, 1000.0, 48000, &mut rng());
        assert!((burst.duration_ms() - 10.0).abs() < 1e-9);
    }
}
