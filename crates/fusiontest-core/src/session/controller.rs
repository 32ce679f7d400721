//! Session controller
//!
//! Ties one immutable [`SessionConfig`] to the playback engine and the
//! response log. Every playback request synthesizes a fresh burst and
//! assembles a fresh scene at the rate the engine reports, so noise bursts
//! and roving gains differ per trial.

use crate::audio::burst::{synthesize_burst, Burst};
use crate::audio::engine::{OutputHost, PlaybackEngine, PlaybackError, PlaybackReport};
use crate::audio::scene::{assemble_scene, StereoScene, Variant};
use crate::session::config::{SessionConfig, StimulusConfig};
use crate::session::log::{ListenerResponse, ResponseLog, ResponseRecord};
use rand::Rng;

/// Which scene a playback trigger asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackRequest {
    /// One-burst decoy
    Decoy,
    /// Two bursts separated by the gap
    TwoBurst,
    /// Fair coin flip between the two, drawn per request
    Random,
}

impl PlaybackRequest {
    /// Resolve to a concrete variant
    pub fn resolve<R: Rng>(self, rng: &mut R) -> Variant {
        match self {
            PlaybackRequest::Decoy => Variant::OneBurstDecoy,
            PlaybackRequest::TwoBurst => Variant::TwoBurst,
            PlaybackRequest::Random => Variant::random(rng),
        }
    }
}

/// What a playback request actually played
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackOutcome {
    /// Variant that was rendered
    pub variant: Variant,
    /// Engine report for the render
    pub report: PlaybackReport,
}

/// Synthesize and assemble one scene for `stimulus`
pub fn build_scene<R: Rng>(
    stimulus: &StimulusConfig,
    variant: Variant,
    sample_rate: u32,
    rng: &mut R,
) -> StereoScene {
    let burst: Burst = synthesize_burst(
        stimulus.kind,
        stimulus.burst_duration_ms,
        stimulus.carrier_hz,
        sample_rate,
        rng,
    );
    assemble_scene(&burst, &stimulus.layout(variant), sample_rate, rng)
}

/// One listening session
pub struct SessionController<H: OutputHost, R: Rng> {
    config: SessionConfig,
    stimulus: StimulusConfig,
    engine: PlaybackEngine<H>,
    rng: R,
    log: ResponseLog,
}

impl<H: OutputHost, R: Rng> SessionController<H, R> {
    /// Start a session with a fixed configuration
    pub fn new(config: SessionConfig, engine: PlaybackEngine<H>, rng: R) -> Self {
        let stimulus = config.to_stimulus();
        tracing::info!(summary = %config.summary(), "Session started");
        Self {
            config,
            stimulus,
            engine,
            rng,
            log: ResponseLog::new(),
        }
    }

    /// Per-trial stimulus parameters
    pub fn config(&self) -> &StimulusConfig {
        &self.stimulus
    }

    /// The configuration document the session was started with
    pub fn session_config(&self) -> &SessionConfig {
        &self.config
    }

    /// Play one trial
    ///
    /// A failure leaves the session usable; the next request retries.
    pub fn request_playback(
        &mut self,
        request: PlaybackRequest,
    ) -> Result<PlaybackOutcome, PlaybackError> {
        let variant = request.resolve(&mut self.rng);
        let stimulus = &self.stimulus;
        let rng = &mut self.rng;

        match self
            .engine
            .play_with(|rate| build_scene(stimulus, variant, rate, &mut *rng))
        {
            Ok(report) => {
                tracing::info!(
                    variant = %variant,
                    path = ?report.path,
                    sample_rate = report.sample_rate,
                    frames = report.frames,
                    "Trial played"
                );
                Ok(PlaybackOutcome { variant, report })
            }
            Err(e) => {
                tracing::warn!(variant = %variant, error = %e, "Playback denied");
                Err(e)
            }
        }
    }

    /// Log the listener's response
    ///
    /// `trial` defaults to the next index in the log.
    pub fn on_response(
        &mut self,
        response: ListenerResponse,
        trial: Option<usize>,
    ) -> &ResponseRecord {
        let trial = trial.unwrap_or_else(|| self.log.next_trial());
        let record = ResponseRecord::new(&self.config, response, trial, chrono::Local::now());
        self.log.append(record);
        &self.log.records()[self.log.len() - 1]
    }

    /// Responses logged so far
    pub fn log(&self) -> &ResponseLog {
        &self.log
    }

    /// Drop every logged response
    pub fn clear_log(&mut self) {
        self.log.clear();
    }

    /// Complete the first-use unlock on the engine
    pub fn unlock(&mut self) -> Result<(), PlaybackError> {
        self.engine.unlock()
    }

    /// Forward an output route change to the engine
    pub fn handle_route_change(&mut self) {
        self.engine.handle_route_change();
    }

    /// Playback engine
    pub fn engine(&self) -> &PlaybackEngine<H> {
        &self.engine
    }

    /// Mutable playback engine
    pub fn engine_mut(&mut self) -> &mut PlaybackEngine<H> {
        &mut self.engine
    }
}
