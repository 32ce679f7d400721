//! Playback engine for stereo scenes
//!
//! Owns the single audio output resource (the "context") and drives its
//! lifecycle:
//!
//! ```text
//! Uninitialized -> Active <-> Suspended -> Closed
//!                    ^                       |
//!                    +------ (recreate) -----+
//! ```
//!
//! ## Delivery paths
//!
//! Two interchangeable strategies sit behind [`PlaybackEngine::play_with`]:
//! - **Low latency**: the scene is copied into a fixed-length stereo buffer
//!   at the context's running sample rate and mixed into the output stream
//!   ([`OutputHost`] / [`OutputContext`]).
//! - **PCM fallback**: the scene is encoded as a 16-bit WAV container and
//!   handed to a simple playback element ([`PcmSink`]).
//!
//! The path is chosen from a capability probe taken once when the engine is
//! created, and from whether an explicit unlock has completed.
//!
//! ## Failure semantics
//!
//! Nothing here panics or aborts playback of later trials. Context creation
//! failures come back as [`PlaybackError::ResourceUnavailable`] so the caller
//! can retry on the next gesture; resume and close failures are logged and
//! otherwise ignored.

use crate::audio::scene::StereoScene;
use crate::audio::wav::{self, WavError};
use thiserror::Error;

/// Length of the silent probe rendered after a route change or unlock
pub const PROBE_DURATION_MS: f64 = 1.0;

/// Errors that can occur during playback
#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error("Audio output unavailable: {0}")]
    ResourceUnavailable(String),

    #[error("No audio output available on this platform")]
    PlatformUnsupported,

    #[error("Render failed: {0}")]
    Render(String),

    #[error("Sample rate mismatch: expected {expected}, got {actual}")]
    SampleRateMismatch { expected: u32, actual: u32 },

    #[error("Failed to encode fallback container: {0}")]
    Encode(#[from] WavError),
}

impl PlaybackError {
    /// Whether a later gesture may succeed where this one failed
    pub fn is_retryable(&self) -> bool {
        !matches!(self, PlaybackError::PlatformUnsupported)
    }
}

/// Lifecycle state of the output resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    /// No context created yet
    Uninitialized,
    /// Ready to render
    Active,
    /// Paused by the platform or the host application
    Suspended,
    /// Terminal for this instance; a new one is created on next use
    Closed,
}

/// Which strategy delivers a render
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryPath {
    /// Mix directly into the output stream
    LowLatency,
    /// Encode as WAV and hand to the fallback sink
    PcmFallback,
}

/// Result of the platform capability probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformCapabilities {
    /// Any audio output exists at all
    pub output_available: bool,
    /// The low-latency path can be trusted without an unlock
    pub low_latency_reliable: bool,
}

/// Engine behaviour switches
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineOptions {
    /// Render a ~1 ms silent probe after replacing the context
    pub probe_on_route_change: bool,
    /// Use the low-latency path only after [`PlaybackEngine::unlock`] succeeded
    pub require_unlock: bool,
    /// Sample rate of containers produced for the fallback path
    pub fallback_sample_rate: u32,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            probe_on_route_change: true,
            require_unlock: false,
            fallback_sample_rate: crate::FALLBACK_SAMPLE_RATE,
        }
    }
}

/// Summary of one delivered render
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackReport {
    /// Strategy that delivered the render
    pub path: DeliveryPath,
    /// Sample rate the scene was assembled for
    pub sample_rate: u32,
    /// Frames rendered
    pub frames: usize,
}

/// A live audio output resource
pub trait OutputContext {
    /// Current lifecycle state
    fn state(&self) -> ContextState;

    /// Sample rate the output is actually running at
    fn sample_rate(&self) -> u32;

    /// Resume a suspended context
    fn resume(&mut self) -> Result<(), PlaybackError>;

    /// Pause the context
    fn suspend(&mut self) -> Result<(), PlaybackError>;

    /// Close the context; it cannot be reused afterwards
    fn close(&mut self) -> Result<(), PlaybackError>;

    /// Schedule a scene to start immediately
    ///
    /// Overlapping renders are mixed.
    fn render(&mut self, scene: &StereoScene) -> Result<(), PlaybackError>;

    /// True when the set of output devices changed since creation
    fn route_changed(&self) -> bool {
        false
    }
}

/// Factory for output contexts on the current platform
pub trait OutputHost {
    type Context: OutputContext;

    /// Probe what the platform can do
    fn capabilities(&self) -> PlatformCapabilities;

    /// Create a new context
    fn create_context(&mut self) -> Result<Self::Context, PlaybackError>;
}

/// Simple playback element for encoded containers
pub trait PcmSink {
    /// Start playing a WAV container immediately
    fn play_container(&mut self, container: Vec<u8>) -> Result<(), PlaybackError>;
}

/// Playback engine owning the output resource
pub struct PlaybackEngine<H: OutputHost> {
    host: H,
    context: Option<H::Context>,
    fallback: Option<Box<dyn PcmSink>>,
    options: EngineOptions,
    capabilities: PlatformCapabilities,
    unlocked: bool,
    renders: u64,
    replacements: u64,
}

impl<H: OutputHost> PlaybackEngine<H> {
    /// Create an engine and probe the platform once
    ///
    /// No context is created until the first playback or unlock.
    pub fn new(host: H, fallback: Option<Box<dyn PcmSink>>, options: EngineOptions) -> Self {
        let capabilities = host.capabilities();
        tracing::info!(
            output_available = capabilities.output_available,
            low_latency_reliable = capabilities.low_latency_reliable,
            has_fallback = fallback.is_some(),
            require_unlock = options.require_unlock,
            "Playback engine created"
        );

        Self {
            host,
            context: None,
            fallback,
            options,
            capabilities,
            unlocked: false,
            renders: 0,
            replacements: 0,
        }
    }

    /// Current lifecycle state of the output resource
    pub fn state(&self) -> ContextState {
        self.context
            .as_ref()
            .map(|c| c.state())
            .unwrap_or(ContextState::Uninitialized)
    }

    /// Capabilities probed at construction
    pub fn capabilities(&self) -> PlatformCapabilities {
        self.capabilities
    }

    /// Engine options
    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Whether an unlock has completed
    pub fn is_unlocked(&self) -> bool {
        self.unlocked
    }

    /// Number of renders delivered so far
    pub fn render_count(&self) -> u64 {
        self.renders
    }

    /// Number of context replacements after route changes
    pub fn replacement_count(&self) -> u64 {
        self.replacements
    }

    /// Running sample rate of the live context, if any
    pub fn sample_rate(&self) -> Option<u32> {
        self.context
            .as_ref()
            .filter(|c| c.state() != ContextState::Closed)
            .map(|c| c.sample_rate())
    }

    /// Strategy the next render will use
    pub fn delivery_path(&self) -> DeliveryPath {
        let wants_fallback = !self.capabilities.low_latency_reliable
            || (self.options.require_unlock && !self.unlocked);
        if wants_fallback && self.fallback.is_some() {
            DeliveryPath::PcmFallback
        } else {
            DeliveryPath::LowLatency
        }
    }

    /// Make sure a context exists and is active, returning its sample rate
    ///
    /// Creates the context when none exists (or the last one was closed) and
    /// resumes it when suspended. A failed resume is logged and reported as
    /// [`PlaybackError::ResourceUnavailable`].
    pub fn ensure_active(&mut self) -> Result<u32, PlaybackError> {
        if !self.capabilities.output_available {
            return Err(PlaybackError::PlatformUnsupported);
        }

        let needs_context = self
            .context
            .as_ref()
            .map(|c| c.state() == ContextState::Closed)
            .unwrap_or(true);
        if needs_context {
            self.context = None;
            let context = self.host.create_context().map_err(|e| {
                tracing::warn!(error = %e, "Failed to create output context");
                match e {
                    PlaybackError::PlatformUnsupported => PlaybackError::PlatformUnsupported,
                    other => PlaybackError::ResourceUnavailable(other.to_string()),
                }
            })?;
            tracing::info!(
                sample_rate = context.sample_rate(),
                state = ?context.state(),
                "Output context created"
            );
            self.context = Some(context);
        }

        let context = self
            .context
            .as_mut()
            .ok_or_else(|| PlaybackError::ResourceUnavailable("no output context".to_string()))?;

        if context.state() == ContextState::Suspended {
            if let Err(e) = context.resume() {
                tracing::warn!(error = %e, "Resume failed");
            }
        }

        match context.state() {
            ContextState::Active => Ok(context.sample_rate()),
            state => Err(PlaybackError::ResourceUnavailable(format!(
                "output context is {:?}",
                state
            ))),
        }
    }

    /// Assemble and deliver one scene
    ///
    /// `build` receives the sample rate the scene must be assembled at: the
    /// context's running rate on the low-latency path, or the fallback rate.
    /// The active check is repeated right before rendering; if the rate
    /// changed in between, the scene is rebuilt.
    pub fn play_with<F>(&mut self, mut build: F) -> Result<PlaybackReport, PlaybackError>
    where
        F: FnMut(u32) -> StereoScene,
    {
        self.poll_route_change();

        match self.delivery_path() {
            DeliveryPath::LowLatency => {
                let rate = self.ensure_active()?;
                let mut scene = build(rate);

                let render_rate = self.ensure_active()?;
                if render_rate != rate {
                    tracing::info!(
                        from = rate,
                        to = render_rate,
                        "Sample rate changed before render, rebuilding scene"
                    );
                    scene = build(render_rate);
                }

                let context = self.context.as_mut().ok_or_else(|| {
                    PlaybackError::ResourceUnavailable("no output context".to_string())
                })?;
                context.render(&scene)?;
                self.renders += 1;

                tracing::debug!(
                    frames = scene.total_samples(),
                    sample_rate = render_rate,
                    "Rendered on low-latency path"
                );
                Ok(PlaybackReport {
                    path: DeliveryPath::LowLatency,
                    sample_rate: render_rate,
                    frames: scene.total_samples(),
                })
            }
            DeliveryPath::PcmFallback => {
                let rate = self.options.fallback_sample_rate;
                let scene = build(rate);
                let container = wav::encode_scene(&scene)?;
                let sink = self
                    .fallback
                    .as_mut()
                    .ok_or(PlaybackError::PlatformUnsupported)?;
                sink.play_container(container)?;
                self.renders += 1;

                tracing::debug!(
                    frames = scene.total_samples(),
                    sample_rate = rate,
                    "Rendered on PCM fallback path"
                );
                Ok(PlaybackReport {
                    path: DeliveryPath::PcmFallback,
                    sample_rate: rate,
                    frames: scene.total_samples(),
                })
            }
        }
    }

    /// Deliver an already assembled scene
    ///
    /// Fails with [`PlaybackError::SampleRateMismatch`] if the scene was not
    /// assembled at the rate the selected path runs at.
    pub fn play(&mut self, scene: &StereoScene) -> Result<PlaybackReport, PlaybackError> {
        let expected = match self.delivery_path() {
            DeliveryPath::LowLatency => self.ensure_active()?,
            DeliveryPath::PcmFallback => self.options.fallback_sample_rate,
        };
        if scene.sample_rate() != expected {
            return Err(PlaybackError::SampleRateMismatch {
                expected,
                actual: scene.sample_rate(),
            });
        }
        self.play_with(|_| scene.clone())
    }

    /// Complete the first-use unlock
    ///
    /// Activates the context and renders a silent probe. Once this succeeds
    /// the low-latency path is used even when `require_unlock` is set.
    pub fn unlock(&mut self) -> Result<(), PlaybackError> {
        let rate = self.ensure_active()?;
        self.render_probe(rate)?;
        if !self.unlocked {
            tracing::info!(sample_rate = rate, "Low-latency output unlocked");
        }
        self.unlocked = true;
        Ok(())
    }

    /// Check the live context for a route change and recover if needed
    ///
    /// Returns true when the context was replaced.
    pub fn poll_route_change(&mut self) -> bool {
        let changed = self
            .context
            .as_ref()
            .map(|c| c.route_changed())
            .unwrap_or(false);
        if changed {
            self.handle_route_change();
        }
        changed
    }

    /// Replace the context after the output device set changed
    ///
    /// The old context is closed (best effort) and a replacement is created
    /// eagerly. When `probe_on_route_change` is set a ~1 ms silent render
    /// commits the platform to the new route. Failures are logged; the next
    /// playback retries creation.
    pub fn handle_route_change(&mut self) {
        tracing::info!("Output route changed, replacing context");

        if let Some(mut old) = self.context.take() {
            if let Err(e) = old.close() {
                tracing::warn!(error = %e, "Failed to close old context");
            }
        }
        self.replacements += 1;

        if !self.capabilities.output_available {
            return;
        }

        match self.ensure_active() {
            Ok(rate) => {
                if self.options.probe_on_route_change {
                    if let Err(e) = self.render_probe(rate) {
                        tracing::warn!(error = %e, "Route probe render failed");
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Replacement context not available yet");
            }
        }
    }

    /// Pause the live context (best effort)
    pub fn suspend(&mut self) {
        if let Some(context) = self.context.as_mut() {
            if context.state() == ContextState::Active {
                if let Err(e) = context.suspend() {
                    tracing::warn!(error = %e, "Suspend failed");
                }
            }
        }
    }

    /// Close the live context (best effort)
    ///
    /// The next playback creates a fresh context.
    pub fn close(&mut self) {
        if let Some(context) = self.context.as_mut() {
            if context.state() != ContextState::Closed {
                if let Err(e) = context.close() {
                    tracing::warn!(error = %e, "Close failed");
                }
                tracing::info!("Output context closed");
            }
        }
    }

    fn render_probe(&mut self, rate: u32) -> Result<(), PlaybackError> {
        let frames = ((rate as f64 * PROBE_DURATION_MS / 1000.0).floor() as usize).max(1);
        let probe = StereoScene::silence(frames, rate);
        let context = self
            .context
            .as_mut()
            .ok_or_else(|| PlaybackError::ResourceUnavailable("no output context".to_string()))?;
        context.render(&probe)
    }
}

impl<H: OutputHost> Drop for PlaybackEngine<H> {
    fn drop(&mut self) {
        self.close();
    }
}
