//! cpal and rodio implementations of the playback strategies
//!
//! - [`CpalHost`] / [`CpalContext`]: low-latency path. One output stream on
//!   the default device; each render is handed to the output callback as a
//!   fixed-length interleaved stereo buffer and mixed with anything still
//!   playing.
//! - [`RodioSink`]: fallback path. Decodes the WAV container and plays it
//!   through a detached rodio sink.
//!
//! Route changes are detected two ways: the stream error callback reporting
//! `DeviceNotAvailable`, and the default output device name differing from
//! the one the context was opened on.

use crate::audio::engine::{
    ContextState, OutputContext, OutputHost, PcmSink, PlatformCapabilities, PlaybackError,
};
use crate::audio::scene::StereoScene;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream};
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Maximum renders queued for the output callback at once
const RENDER_QUEUE_DEPTH: usize = 32;

/// Maximum renders mixed simultaneously
const MAX_VOICES: usize = 16;

/// Output device information
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    /// Device name
    pub name: String,
    /// Whether this is the default output device
    pub is_default: bool,
    /// Default output sample rate
    pub sample_rate: Option<u32>,
    /// Number of output channels
    pub output_channels: u16,
}

/// One render being mixed by the output callback
struct Voice {
    /// Interleaved L/R frames
    frames: Arc<[f32]>,
    /// Next sample index into `frames`
    position: usize,
}

/// Default cpal host as an [`OutputHost`]
pub struct CpalHost {
    host: cpal::Host,
}

impl CpalHost {
    /// Use the platform's default host
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
        }
    }

    /// List output devices of the default host
    pub fn list_output_devices() -> anyhow::Result<Vec<DeviceInfo>> {
        let host = cpal::default_host();
        let default_name = host.default_output_device().and_then(|d| d.name().ok());
        let mut devices = Vec::new();

        for device in host.output_devices()? {
            let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
            let config = device.default_output_config().ok();
            devices.push(DeviceInfo {
                is_default: default_name.as_deref() == Some(name.as_str()),
                name,
                sample_rate: config.as_ref().map(|c| c.sample_rate().0),
                output_channels: config.as_ref().map(|c| c.channels()).unwrap_or(0),
            });
        }

        Ok(devices)
    }
}

impl Default for CpalHost {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputHost for CpalHost {
    type Context = CpalContext;

    fn capabilities(&self) -> PlatformCapabilities {
        let device = self.host.default_output_device();
        let low_latency_reliable = device
            .as_ref()
            .and_then(|d| d.default_output_config().ok())
            .map(|c| c.sample_format() == SampleFormat::F32 && c.channels() >= 2)
            .unwrap_or(false);

        PlatformCapabilities {
            output_available: device.is_some(),
            low_latency_reliable,
        }
    }

    fn create_context(&mut self) -> Result<CpalContext, PlaybackError> {
        let device = self
            .host
            .default_output_device()
            .ok_or_else(|| PlaybackError::ResourceUnavailable("no default output device".into()))?;
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());

        let supported = device
            .default_output_config()
            .map_err(|e| PlaybackError::ResourceUnavailable(e.to_string()))?;
        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels().max(1) as usize;
        let config = supported.config();

        tracing::info!(
            device = %device_name,
            sample_rate,
            channels,
            "Opening output stream"
        );

        let (render_tx, render_rx) = crossbeam_channel::bounded::<Arc<[f32]>>(RENDER_QUEUE_DEPTH);
        let device_lost = Arc::new(AtomicBool::new(false));
        let frames_played = Arc::new(AtomicU64::new(0));

        let callback_frames = Arc::clone(&frames_played);
        let mut voices: Vec<Voice> = Vec::with_capacity(MAX_VOICES);
        let data_callback = move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            while voices.len() < MAX_VOICES {
                match render_rx.try_recv() {
                    Ok(frames) => voices.push(Voice {
                        frames,
                        position: 0,
                    }),
                    Err(_) => break,
                }
            }

            data.fill(0.0);
            let mut frame_count = 0u64;
            for frame in data.chunks_mut(channels) {
                for voice in voices.iter_mut() {
                    if voice.position + 1 < voice.frames.len() {
                        frame[0] += voice.frames[voice.position];
                        if frame.len() > 1 {
                            frame[1] += voice.frames[voice.position + 1];
                        }
                        voice.position += 2;
                    }
                }
                frame_count += 1;
            }
            voices.retain(|v| v.position + 1 < v.frames.len());
            callback_frames.fetch_add(frame_count, Ordering::Relaxed);
        };

        let error_flag = Arc::clone(&device_lost);
        let error_callback = move |err: cpal::StreamError| {
            if matches!(err, cpal::StreamError::DeviceNotAvailable) {
                error_flag.store(true, Ordering::Release);
            }
            tracing::error!("Output stream error: {}", err);
        };

        let stream = device
            .build_output_stream(&config, data_callback, error_callback, None)
            .map_err(|e| PlaybackError::ResourceUnavailable(e.to_string()))?;
        stream
            .play()
            .map_err(|e| PlaybackError::ResourceUnavailable(e.to_string()))?;

        Ok(CpalContext {
            host: cpal::default_host(),
            stream: Some(stream),
            render_tx,
            state: ContextState::Active,
            sample_rate,
            device_name,
            device_lost,
            frames_played,
        })
    }
}

/// True when a readable default device name differs from `opened_on`
///
/// An unreadable name is not a route change; real losses arrive through the
/// stream error callback.
fn default_device_moved(current: Option<&str>, opened_on: &str) -> bool {
    current.is_some_and(|name| name != opened_on)
}

/// A running cpal output stream
pub struct CpalContext {
    host: cpal::Host,
    stream: Option<Stream>,
    render_tx: crossbeam_channel::Sender<Arc<[f32]>>,
    state: ContextState,
    sample_rate: u32,
    device_name: String,
    device_lost: Arc<AtomicBool>,
    frames_played: Arc<AtomicU64>,
}

impl CpalContext {
    /// Name of the device this context was opened on
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Frames written by the output callback so far
    pub fn frames_played(&self) -> u64 {
        self.frames_played.load(Ordering::Relaxed)
    }
}

impl OutputContext for CpalContext {
    fn state(&self) -> ContextState {
        if self.device_lost.load(Ordering::Acquire) {
            ContextState::Closed
        } else {
            self.state
        }
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn resume(&mut self) -> Result<(), PlaybackError> {
        let stream = self
            .stream
            .as_ref()
            .ok_or_else(|| PlaybackError::ResourceUnavailable("stream closed".into()))?;
        stream
            .play()
            .map_err(|e| PlaybackError::ResourceUnavailable(e.to_string()))?;
        self.state = ContextState::Active;
        Ok(())
    }

    fn suspend(&mut self) -> Result<(), PlaybackError> {
        let stream = self
            .stream
            .as_ref()
            .ok_or_else(|| PlaybackError::ResourceUnavailable("stream closed".into()))?;
        stream
            .pause()
            .map_err(|e| PlaybackError::ResourceUnavailable(e.to_string()))?;
        self.state = ContextState::Suspended;
        Ok(())
    }

    fn close(&mut self) -> Result<(), PlaybackError> {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                tracing::debug!(error = %e, "Pause before close failed");
            }
        }
        self.state = ContextState::Closed;
        Ok(())
    }

    fn render(&mut self, scene: &StereoScene) -> Result<(), PlaybackError> {
        if scene.sample_rate() != self.sample_rate {
            return Err(PlaybackError::SampleRateMismatch {
                expected: self.sample_rate,
                actual: scene.sample_rate(),
            });
        }
        let frames: Arc<[f32]> = scene.interleaved().into();
        self.render_tx
            .try_send(frames)
            .map_err(|e| PlaybackError::Render(e.to_string()))
    }

    fn route_changed(&self) -> bool {
        if self.device_lost.load(Ordering::Acquire) {
            return true;
        }
        let current = self
            .host
            .default_output_device()
            .and_then(|d| d.name().ok());
        default_device_moved(current.as_deref(), &self.device_name)
    }
}

/// rodio-backed playback element for WAV containers
pub struct RodioSink {
    _stream: rodio::OutputStream,
    handle: rodio::OutputStreamHandle,
}

impl RodioSink {
    /// Open the default output device
    pub fn try_default() -> Result<Self, PlaybackError> {
        let (stream, handle) = rodio::OutputStream::try_default()
            .map_err(|e| PlaybackError::ResourceUnavailable(e.to_string()))?;
        Ok(Self {
            _stream: stream,
            handle,
        })
    }
}

impl PcmSink for RodioSink {
    fn play_container(&mut self, container: Vec<u8>) -> Result<(), PlaybackError> {
        let source = rodio::Decoder::new_wav(Cursor::new(container))
            .map_err(|e| PlaybackError::Render(e.to_string()))?;
        let sink = rodio::Sink::try_new(&self.handle)
            .map_err(|e| PlaybackError::ResourceUnavailable(e.to_string()))?;
        sink.append(source);
        sink.detach();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_devices() {
        // May find nothing on CI without audio devices, but shouldn't panic
        match CpalHost::list_output_devices() {
            Ok(devices) => {
                println!("Found {} output devices", devices.len());
                for device in &devices {
                    println!(
                        "  - {} ({} ch, {:?} Hz)",
                        device.name, device.output_channels, device.sample_rate
                    );
                }
            }
            Err(e) => println!("No audio devices available: {}", e),
        }
    }

    #[test]
    fn test_default_device_moved() {
        assert!(!default_device_moved(Some("Headphones"), "Headphones"));
        assert!(default_device_moved(Some("Speakers"), "Headphones"));
        // Unreadable name keeps the current stream
        assert!(!default_device_moved(None, "Headphones"));
    }

    #[test]
    fn test_capabilities_probe_does_not_panic() {
        let host = CpalHost::new();
        let caps = host.capabilities();
        if !caps.output_available {
            assert!(!caps.low_latency_reliable);
        }
    }
}
