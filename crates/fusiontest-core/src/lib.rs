//! Fusiontest Core - Two-burst fusion stimulus engine
//!
//! This library synthesizes Hann-windowed tone and noise bursts, places them
//! into calibrated stereo scenes (two-burst or one-burst decoy), and plays
//! them through a lifecycle-managed output with a 16-bit PCM fallback. A thin
//! session layer supplies configuration and logs listener responses.

pub mod audio;
pub mod session;

pub use audio::engine::{EngineOptions, PlaybackEngine, PlaybackError};
pub use audio::scene::{StereoScene, Variant};
pub use session::config::{SessionConfig, StimulusConfig};
pub use session::controller::{PlaybackRequest, SessionController};
pub use session::log::{ListenerResponse, ResponseLog};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date stamped by build.rs
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Sample rate of containers produced for the PCM fallback path
pub const FALLBACK_SAMPLE_RATE: u32 = 44100;

/// Tone carrier frequency in Hz
pub const CARRIER_FREQUENCY_HZ: f64 = 1000.0;

/// Target RMS of the reference channel after normalization
pub const TARGET_RMS: f64 = 0.03;
