//! Session layer
//!
//! - Configuration document and per-trial stimulus parameters ([`config`])
//! - Playback triggers and response handling ([`controller`])
//! - Response log and CSV export ([`log`])

pub mod config;
pub mod controller;
pub mod log;
