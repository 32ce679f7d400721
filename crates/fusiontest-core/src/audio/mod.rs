//! Audio processing module
//!
//! This module contains the stimulus pipeline:
//! - Hann-windowed tone and noise bursts ([`burst`])
//! - Stereo placement, RMS normalization and roving ([`scene`])
//! - 16-bit PCM container for the fallback path ([`wav`])
//! - Output lifecycle and delivery strategies ([`engine`])
//! - cpal/rodio implementations of those strategies ([`cpal_backend`])

pub mod burst;
pub mod cpal_backend;
pub mod engine;
pub mod scene;
pub mod wav;
