//! Append-only response log with CSV export
//!
//! One row per logged trial, columns in fixed order:
//! `time,stim,ear,gap_ms,burst_ms,click_ms,roving,response,trial`.

use crate::audio::burst::StimulusKind;
use crate::audio::scene::EarRouting;
use crate::session::config::SessionConfig;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::Path;

/// Default export file name
pub const DEFAULT_EXPORT_FILE: &str = "fusion_test_log.csv";

/// CSV header row
pub const CSV_HEADER: &str = "time,stim,ear,gap_ms,burst_ms,click_ms,roving,response,trial";

/// Number of events the listener reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ListenerResponse {
    /// Heard a single (fused) event
    One,
    /// Heard two separate events
    Two,
}

impl ListenerResponse {
    /// Parse "1" or "2"
    pub fn from_count(count: u8) -> Option<Self> {
        match count {
            1 => Some(ListenerResponse::One),
            2 => Some(ListenerResponse::Two),
            _ => None,
        }
    }

    /// Reported count
    pub fn count(&self) -> u8 {
        match self {
            ListenerResponse::One => 1,
            ListenerResponse::Two => 2,
        }
    }
}

/// One logged trial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseRecord {
    /// When the response was logged
    pub time: DateTime<Local>,
    /// Stimulus kind at the time of the trial
    pub stim: StimulusKind,
    /// Ear routing
    pub ear: EarRouting,
    /// Gap in ms
    pub gap_ms: f64,
    /// Tone burst duration in ms
    pub burst_ms: f64,
    /// Click duration in ms
    pub click_ms: f64,
    /// Whether roving was on
    pub roving: bool,
    /// Listener's reported count
    pub response: ListenerResponse,
    /// Trial index (1-based)
    pub trial: usize,
}

impl ResponseRecord {
    /// Snapshot a configuration together with a response
    pub fn new(
        config: &SessionConfig,
        response: ListenerResponse,
        trial: usize,
        time: DateTime<Local>,
    ) -> Self {
        Self {
            time,
            stim: config.stim,
            ear: config.ear,
            gap_ms: config.gap,
            burst_ms: config.dur,
            click_ms: config.click_ms,
            roving: config.rove,
            response,
            trial,
        }
    }

    /// Format as one CSV row (no trailing newline)
    pub fn to_csv_row(&self) -> String {
        format!(
            "{},{},{},{:?},{:?},{:?},{},{},{}",
            self.time.format("%Y-%m-%dT%H:%M:%S"),
            self.stim.label(),
            self.ear.label(),
            self.gap_ms,
            self.burst_ms,
            self.click_ms,
            self.roving,
            self.response.count(),
            self.trial
        )
    }
}

/// Append-only list of response records
#[derive(Debug, Default, Clone)]
pub struct ResponseLog {
    records: Vec<ResponseRecord>,
}

impl ResponseLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record
    pub fn append(&mut self, record: ResponseRecord) {
        tracing::info!(
            trial = record.trial,
            response = record.response.count(),
            stim = %record.stim,
            ear = %record.ear,
            "Response logged"
        );
        self.records.push(record);
    }

    /// All records in insertion order
    pub fn records(&self) -> &[ResponseRecord] {
        &self.records
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when nothing has been logged
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Default index for the next trial (`len + 1`)
    pub fn next_trial(&self) -> usize {
        self.records.len() + 1
    }

    /// Remove every record
    pub fn clear(&mut self) {
        tracing::info!(records = self.records.len(), "Response log cleared");
        self.records.clear();
    }

    /// Render the log as CSV with a header row
    pub fn to_csv(&self) -> String {
        let mut out = String::with_capacity(64 * (self.records.len() + 1));
        out.push_str(CSV_HEADER);
        out.push('\n');
        for record in &self.records {
            // Writing to a String cannot fail
            let _ = writeln!(out, "{}", record.to_csv_row());
        }
        out
    }

    /// Write the CSV export to `path`
    pub fn export_csv(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, self.to_csv())?;
        tracing::info!(
            path = %path.display(),
            records = self.records.len(),
            "Response log exported"
        );
        Ok(())
    }
}
