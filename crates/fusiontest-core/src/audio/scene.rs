//! Stereo scene assembly
//!
//! Places one or two copies of a burst into left/right channel buffers,
//! normalizes the level to a target RMS and optionally applies a random
//! level rove.
//!
//! ## Layout
//!
//! ```text
//! | burst | gap (silence) | burst |    TwoBurst
//! | burst | gap (silence) | ----- |    OneBurstDecoy (same total length)
//! ```
//!
//! The decoy keeps the two-burst timing grid so that the stimulus duration
//! never tells the listener which variant was played.

use crate::audio::burst::Burst;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reference RMS below which gain normalization is skipped
pub const DEGENERATE_RMS: f64 = 1e-9;

/// Roving range in dB (symmetric around 0)
pub const ROVE_RANGE_DB: f64 = 3.0;

/// Which ear(s) receive the bursts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EarRouting {
    /// Left channel only
    #[serde(rename = "L")]
    Left,
    /// Right channel only
    #[serde(rename = "R")]
    Right,
    /// Both channels (diotic)
    #[serde(rename = "Both")]
    Both,
}

impl EarRouting {
    /// Short label used in logs and exports ("L", "R", "Both")
    pub fn label(&self) -> &'static str {
        match self {
            EarRouting::Left => "L",
            EarRouting::Right => "R",
            EarRouting::Both => "Both",
        }
    }

    /// Whether the left channel carries the stimulus
    pub fn uses_left(&self) -> bool {
        matches!(self, EarRouting::Left | EarRouting::Both)
    }

    /// Whether the right channel carries the stimulus
    pub fn uses_right(&self) -> bool {
        matches!(self, EarRouting::Right | EarRouting::Both)
    }
}

impl fmt::Display for EarRouting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Stimulus variant for a single playback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    /// Two bursts separated by the gap
    TwoBurst,
    /// One burst in the first slot, silence where the second would be
    OneBurstDecoy,
}

impl Variant {
    /// Pick a variant with a fair coin flip
    pub fn random<R: Rng>(rng: &mut R) -> Self {
        if rng.random_bool(0.5) {
            Variant::TwoBurst
        } else {
            Variant::OneBurstDecoy
        }
    }

    /// Number of audible bursts in this variant
    pub fn burst_count(&self) -> u8 {
        match self {
            Variant::TwoBurst => 2,
            Variant::OneBurstDecoy => 1,
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::TwoBurst => f.write_str("two-burst"),
            Variant::OneBurstDecoy => f.write_str("one-burst decoy"),
        }
    }
}

/// Placement and level parameters for one scene
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneLayout {
    /// Silence between the bursts in milliseconds
    pub gap_ms: f64,
    /// Ear routing policy
    pub ear: EarRouting,
    /// Apply a random ±3 dB level rove
    pub roving: bool,
    /// RMS level of the reference channel after normalization
    pub target_rms: f64,
    /// Decoy or two-burst
    pub variant: Variant,
}

/// Assembled stereo stimulus ready for playback
#[derive(Debug, Clone, PartialEq)]
pub struct StereoScene {
    left: Vec<f32>,
    right: Vec<f32>,
    sample_rate: u32,
    burst_len: usize,
    gap_samples: usize,
    /// Linear gain applied by RMS normalization
    normalization_gain: f64,
    /// Linear gain applied by roving (1.0 when roving is off)
    roving_gain: f64,
}

impl StereoScene {
    /// Build a scene from raw channel buffers
    ///
    /// Channels shorter than the other are zero-padded so both always have
    /// the same length.
    pub fn from_channels(mut left: Vec<f32>, mut right: Vec<f32>, sample_rate: u32) -> Self {
        let total = left.len().max(right.len());
        left.resize(total, 0.0);
        right.resize(total, 0.0);
        Self {
            left,
            right,
            sample_rate,
            burst_len: 0,
            gap_samples: 0,
            normalization_gain: 1.0,
            roving_gain: 1.0,
        }
    }

    /// A silent scene of `frames` frames
    pub fn silence(frames: usize, sample_rate: u32) -> Self {
        Self::from_channels(vec![0.0; frames], vec![0.0; frames], sample_rate)
    }

    /// Left channel samples
    pub fn left(&self) -> &[f32] {
        &self.left
    }

    /// Right channel samples
    pub fn right(&self) -> &[f32] {
        &self.right
    }

    /// Number of frames (samples per channel)
    pub fn total_samples(&self) -> usize {
        self.left.len()
    }

    /// Sample rate the scene was assembled for
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Burst length in samples (0 for scenes built from raw channels)
    pub fn burst_len(&self) -> usize {
        self.burst_len
    }

    /// Gap length in samples
    pub fn gap_samples(&self) -> usize {
        self.gap_samples
    }

    /// Offset of the second burst slot
    pub fn second_slot_offset(&self) -> usize {
        self.burst_len + self.gap_samples
    }

    /// Gain applied by RMS normalization
    pub fn normalization_gain(&self) -> f64 {
        self.normalization_gain
    }

    /// Gain applied by roving
    pub fn roving_gain(&self) -> f64 {
        self.roving_gain
    }

    /// RMS of the left channel
    pub fn left_rms(&self) -> f64 {
        rms(&self.left)
    }

    /// RMS of the right channel
    pub fn right_rms(&self) -> f64 {
        rms(&self.right)
    }

    /// Duration in milliseconds
    pub fn duration_ms(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.total_samples() as f64 * 1000.0 / self.sample_rate as f64
    }

    /// Interleave as L, R, L, R, ...
    pub fn interleaved(&self) -> Vec<f32> {
        self.left
            .iter()
            .zip(self.right.iter())
            .flat_map(|(&l, &r)| [l, r])
            .collect()
    }
}

/// Root-mean-square level of a buffer (0.0 for an empty buffer)
pub fn rms(samples: &[f32]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&s| s as f64 * s as f64).sum();
    (sum / samples.len() as f64).sqrt()
}

/// Convert decibels to a linear amplitude factor
pub fn db_to_linear(db: f64) -> f64 {
    10f64.powf(db / 20.0)
}

/// Draw one roving gain, uniform in dB over [-3, +3]
pub fn roving_gain<R: Rng>(rng: &mut R) -> f64 {
    let db = rng.random_range(-ROVE_RANGE_DB..=ROVE_RANGE_DB);
    db_to_linear(db)
}

/// Number of samples in a gap of `gap_ms`
pub fn gap_length(gap_ms: f64, sample_rate: u32) -> usize {
    let n = (sample_rate as f64 * gap_ms / 1000.0).round();
    if n.is_finite() && n > 0.0 {
        n as usize
    } else {
        0
    }
}

fn add_at(dst: &mut [f64], src: &[f32], offset: usize) {
    for (d, &s) in dst.iter_mut().skip(offset).zip(src.iter()) {
        *d += s as f64;
    }
}

/// Assemble a stereo scene from a burst
///
/// The left channel is the normalization reference for both `Left` and
/// `Both` routing; the right channel is the reference only for `Right`.
/// The same gain is applied to both channels so the interaural relationship
/// produced by placement is preserved.
///
/// # Arguments
/// * `burst` - Synthesized burst
/// * `layout` - Gap, routing, roving, target level and variant
/// * `sample_rate` - Output sample rate in Hz
/// * `rng` - Random source for the roving draw (untouched when roving is off)
///
/// # Example
/// ```
/// use fusiontest_core::audio::burst::{synthesize_burst, StimulusKind};
/// use fusiontest_core::audio::scene::{assemble_scene, EarRouting, SceneLayout, Variant};
/// use rand::SeedableRng;
///
/// let mut rng = rand::rngs::StdRng::seed_from_u64(1);
/// let burst = synthesize_burst(StimulusKind::Tone, 7.0, 1000.0, 48000, &mut rng);
/// let layout = SceneLayout {
///     gap_ms: 10.0,
///     ear: EarRouting::Both,
///     roving: false,
///     target_rms: 0.03,
///     variant: Variant::TwoBurst,
/// };
/// let scene = assemble_scene(&burst, &layout, 48000, &mut rng);
/// assert_eq!(scene.total_samples(), 1152);
/// ```
pub fn assemble_scene<R: Rng>(
    burst: &Burst,
    layout: &SceneLayout,
    sample_rate: u32,
    rng: &mut R,
) -> StereoScene {
    let burst_len = burst.len();
    let gap_samples = gap_length(layout.gap_ms, sample_rate);
    let total = burst_len + gap_samples + burst_len;
    let second = burst_len + gap_samples;

    let mut left = vec![0.0f64; total];
    let mut right = vec![0.0f64; total];

    let place = |buffer: &mut [f64]| {
        add_at(buffer, burst.samples(), 0);
        if layout.variant == Variant::TwoBurst {
            add_at(buffer, burst.samples(), second);
        }
    };
    if layout.ear.uses_left() {
        place(&mut left);
    }
    if layout.ear.uses_right() {
        place(&mut right);
    }

    let reference = match layout.ear {
        EarRouting::Right => &right,
        EarRouting::Left | EarRouting::Both => &left,
    };
    let reference_rms = if reference.is_empty() {
        0.0
    } else {
        (reference.iter().map(|s| s * s).sum::<f64>() / reference.len() as f64).sqrt()
    };

    let normalization_gain = if reference_rms > DEGENERATE_RMS {
        layout.target_rms / reference_rms
    } else {
        tracing::warn!(
            ear = %layout.ear,
            reference_rms,
            "Degenerate stimulus, skipping RMS normalization"
        );
        1.0
    };

    let roving = if layout.roving {
        roving_gain(rng)
    } else {
        1.0
    };
    let gain = normalization_gain * roving;

    tracing::debug!(
        variant = %layout.variant,
        ear = %layout.ear,
        burst_len,
        gap_samples,
        total,
        normalization_gain,
        roving_gain = roving,
        "Scene assembled"
    );

    StereoScene {
        left: left.into_iter().map(|s| (s * gain) as f32).collect(),
        right: right.into_iter().map(|s| (s * gain) as f32).collect(),
        sample_rate,
        burst_len,
        gap_samples,
        normalization_gain,
        roving_gain: roving,
    }
}
