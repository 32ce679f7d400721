//! Fusiontest - two-burst auditory fusion test
//!
//! This library re-exports the stimulus pipeline, playback engine and session
//! layer from `fusiontest-core`. The terminal front end lives in `main.rs`.

pub use fusiontest_core::audio;
pub use fusiontest_core::session;

pub use fusiontest_core::{
    EngineOptions, ListenerResponse, PlaybackEngine, PlaybackError, PlaybackRequest,
    ResponseLog, SessionConfig, SessionController, StereoScene, StimulusConfig, Variant,
};
pub use fusiontest_core::{
    BUILD_DATE, CARRIER_FREQUENCY_HZ, FALLBACK_SAMPLE_RATE, TARGET_RMS, VERSION,
};
