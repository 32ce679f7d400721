//! Session configuration
//!
//! [`SessionConfig`] is the flat key-value document supplied at session
//! start (`stim`, `gap`, `dur`, `click_ms`, `ear`, `rove`, `freq_hz`,
//! `target_rms`). It is stored as JSON at
//! `<data_dir>/fusiontest/config.json` and converted into the immutable
//! per-trial [`StimulusConfig`] consumed by the synthesizer and assembler.

use crate::audio::burst::StimulusKind;
use crate::audio::scene::{EarRouting, SceneLayout, Variant};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Gap range offered to the listener setup, in ms
pub const GAP_RANGE_MS: RangeInclusive<f64> = 1.0..=20.0;

/// Tone burst duration range, in ms
pub const TONE_DURATION_RANGE_MS: RangeInclusive<f64> = 3.0..=12.0;

/// Click burst duration range, in ms
pub const CLICK_DURATION_RANGE_MS: RangeInclusive<f64> = 0.1..=2.0;

/// Errors raised while loading or validating a configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid {field}: {value} (expected {expected})")]
    Invalid {
        field: &'static str,
        value: f64,
        expected: String,
    },
}

fn default_stim() -> StimulusKind {
    StimulusKind::Tone
}

fn default_gap() -> f64 {
    10.0
}

fn default_dur() -> f64 {
    7.0
}

fn default_click_ms() -> f64 {
    0.6
}

fn default_ear() -> EarRouting {
    EarRouting::Right
}

fn default_freq_hz() -> f64 {
    crate::CARRIER_FREQUENCY_HZ
}

fn default_target_rms() -> f64 {
    crate::TARGET_RMS
}

/// Wire configuration document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Stimulus kind ("tone" or "click")
    #[serde(default = "default_stim")]
    pub stim: StimulusKind,
    /// Gap between bursts in ms
    #[serde(default = "default_gap")]
    pub gap: f64,
    /// Tone burst duration in ms
    #[serde(default = "default_dur")]
    pub dur: f64,
    /// Click (noise) burst duration in ms
    #[serde(default = "default_click_ms")]
    pub click_ms: f64,
    /// Ear routing ("L", "R" or "Both")
    #[serde(default = "default_ear")]
    pub ear: EarRouting,
    /// ±3 dB level roving
    #[serde(default)]
    pub rove: bool,
    /// Tone carrier frequency in Hz
    #[serde(default = "default_freq_hz")]
    pub freq_hz: f64,
    /// Target RMS of the reference channel
    #[serde(default = "default_target_rms")]
    pub target_rms: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            stim: default_stim(),
            gap: default_gap(),
            dur: default_dur(),
            click_ms: default_click_ms(),
            ear: default_ear(),
            rove: false,
            freq_hz: default_freq_hz(),
            target_rms: default_target_rms(),
        }
    }
}

impl SessionConfig {
    /// Config file path: `<data_dir>/fusiontest/config.json`
    pub fn path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("fusiontest")
            .join("config.json")
    }

    /// Load config from the default path, falling back to defaults on any error
    pub fn load() -> Self {
        let path = Self::path();
        match Self::load_from(&path) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "Loaded config from disk");
                config
            }
            Err(ConfigError::Io { .. }) => {
                tracing::info!(path = %path.display(), "No config file found, using defaults");
                Self::default()
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to load config, using defaults"
                );
                Self::default()
            }
        }
    }

    /// Load and validate config from `path`
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to disk, creating parent directories if needed
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        tracing::info!(path = %path.display(), "Config saved to disk");
        Ok(())
    }

    /// Check every field against the ranges offered to the operator
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("gap", self.gap, &GAP_RANGE_MS)?;
        check_range("dur", self.dur, &TONE_DURATION_RANGE_MS)?;
        check_range("click_ms", self.click_ms, &CLICK_DURATION_RANGE_MS)?;
        check_positive("freq_hz", self.freq_hz)?;
        check_positive("target_rms", self.target_rms)?;
        Ok(())
    }

    /// Burst duration for the configured stimulus kind
    pub fn burst_duration_ms(&self) -> f64 {
        match self.stim {
            StimulusKind::Tone => self.dur,
            StimulusKind::Click => self.click_ms,
        }
    }

    /// Per-trial stimulus parameters
    pub fn to_stimulus(&self) -> StimulusConfig {
        StimulusConfig {
            kind: self.stim,
            gap_ms: self.gap,
            burst_duration_ms: self.burst_duration_ms(),
            ear: self.ear,
            roving: self.rove,
            carrier_hz: self.freq_hz,
            target_rms: self.target_rms,
        }
    }

    /// One-line description of the stimulus for display
    ///
    /// # Example
    /// ```
    /// use fusiontest_core::session::config::SessionConfig;
    ///
    /// let config = SessionConfig::default();
    /// assert_eq!(config.summary(), "Tone 1000 Hz / Hann 7.0 ms / Gap 10.0 ms / Ear R");
    /// ```
    pub fn summary(&self) -> String {
        let stimulus = match self.stim {
            StimulusKind::Tone => format!("Tone {} Hz / Hann {:.1} ms", self.freq_hz, self.dur),
            StimulusKind::Click => format!("Click (noise) / Hann {:.2} ms", self.click_ms),
        };
        let mut line = format!("{} / Gap {:.1} ms / Ear {}", stimulus, self.gap, self.ear);
        if self.rove {
            line.push_str(" / Rove ±3 dB");
        }
        line
    }
}

fn check_range(
    field: &'static str,
    value: f64,
    range: &RangeInclusive<f64>,
) -> Result<(), ConfigError> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            value,
            expected: format!("{}..={} ms", range.start(), range.end()),
        })
    }
}

fn check_positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid {
            field,
            value,
            expected: "a positive number".to_string(),
        })
    }
}

/// Immutable per-trial stimulus parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StimulusConfig {
    /// Tone or click
    pub kind: StimulusKind,
    /// Silence between bursts in ms
    pub gap_ms: f64,
    /// Duration of each burst in ms
    pub burst_duration_ms: f64,
    /// Ear routing
    pub ear: EarRouting,
    /// ±3 dB level roving
    pub roving: bool,
    /// Tone carrier frequency in Hz
    pub carrier_hz: f64,
    /// Target RMS of the reference channel
    pub target_rms: f64,
}

impl StimulusConfig {
    /// Scene layout for one variant of this stimulus
    pub fn layout(&self, variant: Variant) -> SceneLayout {
        SceneLayout {
            gap_ms: self.gap_ms,
            ear: self.ear,
            roving: self.roving,
            target_rms: self.target_rms,
            variant,
        }
    }
}

impl Default for StimulusConfig {
    fn default() -> Self {
        SessionConfig::default().to_stimulus()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SessionConfig::default();
        assert_eq!(config.stim, StimulusKind::Tone);
        assert_eq!(config.gap, 10.0);
        assert_eq!(config.dur, 7.0);
        assert_eq!(config.click_ms, 0.6);
        assert_eq!(config.ear, EarRouting::Right);
        assert!(!config.rove);
        assert_eq!(config.freq_hz, 1000.0);
        assert_eq!(config.target_rms, 0.03);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_wire_document() {
        let json = r#"{
            "stim": "click", "gap": 4.5, "dur": 7.0, "click_ms": 0.25,
            "ear": "Both", "rove": true, "freq_hz": 1000, "target_rms": 0.03
        }"#;
        let config: SessionConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.stim, StimulusKind::Click);
        assert_eq!(config.ear, EarRouting::Both);
        assert!(config.rove);

        let stimulus = config.to_stimulus();
        assert_eq!(stimulus.kind, StimulusKind::Click);
        assert_eq!(stimulus.burst_duration_ms, 0.25);
        assert_eq!(stimulus.gap_ms, 4.5);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config: SessionConfig = serde_json::from_str(r#"{"ear": "L"}"#).unwrap();
        assert_eq!(config.ear, EarRouting::Left);
        assert_eq!(config.gap, 10.0);
        assert_eq!(config.stim, StimulusKind::Tone);
    }

    #[test]
    fn test_tone_uses_dur() {
        let config = SessionConfig {
            dur: 5.0,
            click_ms: 1.0,
            ..SessionConfig::default()
        };
        assert_eq!(config.to_stimulus().burst_duration_ms, 5.0);
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let config = SessionConfig {
            gap: 25.0,
            ..SessionConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "gap", .. }));

        let config = SessionConfig {
            click_ms: 0.0,
            ..SessionConfig::default()
        };
        assert!(config.validate().is_err());

        let config = SessionConfig {
            target_rms: f64::NAN,
            ..SessionConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let config = SessionConfig {
            stim: StimulusKind::Click,
            ear: EarRouting::Left,
            rove: true,
            ..SessionConfig::default()
        };
        config.save(&path).unwrap();

        let loaded = SessionConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = SessionConfig::load_from(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_summary_click() {
        let config = SessionConfig {
            stim: StimulusKind::Click,
            ear: EarRouting::Both,
            rove: true,
            ..SessionConfig::default()
        };
        assert_eq!(
            config.summary(),
            "Click (noise) / Hann 0.60 ms / Gap 10.0 ms / Ear Both / Rove ±3 dB"
        );
    }
}
