//! E2E tests for the playback engine lifecycle
//!
//! Uses an in-memory output host so no audio hardware is needed.

use fusiontest::audio::engine::{
    ContextState, DeliveryPath, EngineOptions, OutputContext, OutputHost, PcmSink,
    PlatformCapabilities, PlaybackEngine, PlaybackError,
};
use fusiontest::audio::scene::StereoScene;
use fusiontest::audio::wav;
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Default)]
struct Device {
    rate: u32,
    created: u32,
    closed: u32,
    suspended_on_create: bool,
    deny_resume: bool,
    unplugged: bool,
    forced_state: Option<ContextState>,
    renders: Vec<usize>,
    containers: Vec<Vec<u8>>,
}

type Shared = Rc<RefCell<Device>>;

struct FakeContext {
    device: Shared,
    state: ContextState,
    rate: u32,
}

impl OutputContext for FakeContext {
    fn state(&self) -> ContextState {
        self.device.borrow().forced_state.unwrap_or(self.state)
    }

    fn sample_rate(&self) -> u32 {
        self.rate
    }

    fn resume(&mut self) -> Result<(), PlaybackError> {
        if self.device.borrow().deny_resume {
            return Err(PlaybackError::ResourceUnavailable("resume denied".into()));
        }
        self.device.borrow_mut().forced_state = None;
        self.state = ContextState::Active;
        Ok(())
    }

    fn suspend(&mut self) -> Result<(), PlaybackError> {
        self.state = ContextState::Suspended;
        Ok(())
    }

    fn close(&mut self) -> Result<(), PlaybackError> {
        self.device.borrow_mut().closed += 1;
        self.state = ContextState::Closed;
        Ok(())
    }

    fn render(&mut self, scene: &StereoScene) -> Result<(), PlaybackError> {
        assert_eq!(scene.sample_rate(), self.rate);
        self.device.borrow_mut().renders.push(scene.total_samples());
        Ok(())
    }

    fn route_changed(&self) -> bool {
        self.device.borrow().unplugged
    }
}

struct FakeHost {
    device: Shared,
    caps: PlatformCapabilities,
}

impl OutputHost for FakeHost {
    type Context = FakeContext;

    fn capabilities(&self) -> PlatformCapabilities {
        self.caps
    }

    fn create_context(&mut self) -> Result<FakeContext, PlaybackError> {
        let mut device = self.device.borrow_mut();
        device.created += 1;
        device.unplugged = false;
        device.forced_state = None;
        Ok(FakeContext {
            device: Rc::clone(&self.device),
            state: if device.suspended_on_create {
                ContextState::Suspended
            } else {
                ContextState::Active
            },
            rate: device.rate,
        })
    }
}

struct FakeSink {
    device: Shared,
}

impl PcmSink for FakeSink {
    fn play_container(&mut self, container: Vec<u8>) -> Result<(), PlaybackError> {
        self.device.borrow_mut().containers.push(container);
        Ok(())
    }
}

fn reliable() -> PlatformCapabilities {
    PlatformCapabilities {
        output_available: true,
        low_latency_reliable: true,
    }
}

fn engine(
    device: &Shared,
    caps: PlatformCapabilities,
    options: EngineOptions,
) -> PlaybackEngine<FakeHost> {
    let host = FakeHost {
        device: Rc::clone(device),
        caps,
    };
    let sink = FakeSink {
        device: Rc::clone(device),
    };
    PlaybackEngine::new(host, Some(Box::new(sink)), options)
}

fn device(rate: u32) -> Shared {
    Rc::new(RefCell::new(Device {
        rate,
        ..Device::default()
    }))
}

/// Scenes are built at the rate the output is actually running at
#[test]
fn test_scene_built_at_running_rate() {
    let device = device(96000);
    let mut engine = engine(&device, reliable(), EngineOptions::default());

    let mut requested = Vec::new();
    let report = engine
        .play_with(|rate| {
            requested.push(rate);
            StereoScene::silence(rate as usize / 1000, rate)
        })
        .unwrap();

    assert_eq!(requested, vec![96000]);
    assert_eq!(report.sample_rate, 96000);
    assert_eq!(report.frames, 96);
    assert_eq!(device.borrow().renders, vec![96]);
}

/// Suspended output is resumed before rendering
#[test]
fn test_suspended_resumes_then_renders() {
    let device = device(48000);
    device.borrow_mut().suspended_on_create = true;
    let mut engine = engine(&device, reliable(), EngineOptions::default());

    engine.play_with(|rate| StereoScene::silence(10, rate)).unwrap();
    assert_eq!(engine.state(), ContextState::Active);
    assert_eq!(device.borrow().renders.len(), 1);
}

/// A denied resume renders nothing and leaves the engine usable
#[test]
fn test_denied_resume_is_not_fatal() {
    let device = device(48000);
    {
        let mut d = device.borrow_mut();
        d.suspended_on_create = true;
        d.deny_resume = true;
    }
    let mut engine = engine(&device, reliable(), EngineOptions::default());

    let err = engine
        .play_with(|rate| StereoScene::silence(10, rate))
        .unwrap_err();
    assert!(err.is_retryable());
    assert!(device.borrow().renders.is_empty());

    device.borrow_mut().deny_resume = false;
    engine.play_with(|rate| StereoScene::silence(10, rate)).unwrap();
    assert_eq!(device.borrow().renders.len(), 1);
}

/// Unplugging the device replaces the context before the next render
#[test]
fn test_route_change_recovery() {
    let device = device(48000);
    let mut engine = engine(&device, reliable(), EngineOptions::default());
    engine.play_with(|rate| StereoScene::silence(10, rate)).unwrap();

    {
        let mut d = device.borrow_mut();
        d.unplugged = true;
        d.rate = 44100;
    }
    let report = engine
        .play_with(|rate| StereoScene::silence(10, rate))
        .unwrap();

    assert_eq!(report.sample_rate, 44100);
    assert_eq!(engine.replacement_count(), 1);
    let d = device.borrow();
    assert_eq!(d.created, 2);
    assert_eq!(d.closed, 1);
    // render, 1 ms probe at 44.1 kHz, render
    assert_eq!(d.renders, vec![10, 44, 10]);
}

/// Unreliable platforms encode 44.1 kHz containers for the fallback sink
#[test]
fn test_fallback_container() {
    let device = device(48000);
    let caps = PlatformCapabilities {
        output_available: true,
        low_latency_reliable: false,
    };
    let mut engine = engine(&device, caps, EngineOptions::default());
    assert_eq!(engine.delivery_path(), DeliveryPath::PcmFallback);

    let report = engine
        .play_with(|rate| StereoScene::silence(rate as usize / 100, rate))
        .unwrap();
    assert_eq!(report.path, DeliveryPath::PcmFallback);

    let d = device.borrow();
    assert_eq!(d.created, 0);
    let decoded = wav::decode_scene(&d.containers[0]).unwrap();
    assert_eq!(decoded.sample_rate(), 44100);
    assert_eq!(decoded.total_samples(), 441);
}

/// With unlock required, renders use the fallback until unlock succeeds
#[test]
fn test_unlock_gesture() {
    let device = device(48000);
    let options = EngineOptions {
        require_unlock: true,
        ..EngineOptions::default()
    };
    let mut engine = engine(&device, reliable(), options);

    engine.play_with(|rate| StereoScene::silence(10, rate)).unwrap();
    assert_eq!(device.borrow().containers.len(), 1);
    assert_eq!(engine.state(), ContextState::Uninitialized);

    engine.unlock().unwrap();
    let report = engine
        .play_with(|rate| StereoScene::silence(10, rate))
        .unwrap();
    assert_eq!(report.path, DeliveryPath::LowLatency);
    // probe plus render
    assert_eq!(device.borrow().renders, vec![48, 10]);
}

/// Closing the engine is terminal for that context only
#[test]
fn test_close_then_play_recreates() {
    let device = device(48000);
    let mut engine = engine(&device, reliable(), EngineOptions::default());
    engine.play_with(|rate| StereoScene::silence(10, rate)).unwrap();
    engine.close();
    assert_eq!(engine.state(), ContextState::Closed);

    engine.play_with(|rate| StereoScene::silence(10, rate)).unwrap();
    assert_eq!(device.borrow().created, 2);
}

/// Output closing between build and render triggers a rebuild at the new rate
#[test]
fn test_closed_before_render_rebuilds_scene() {
    let device = device(48000);
    let mut engine = engine(&device, reliable(), EngineOptions::default());

    let mut requested = Vec::new();
    let report = engine
        .play_with(|rate| {
            if requested.is_empty() {
                let mut d = device.borrow_mut();
                d.forced_state = Some(ContextState::Closed);
                d.rate = 44100;
            }
            requested.push(rate);
            StereoScene::silence(rate as usize / 100, rate)
        })
        .unwrap();

    assert_eq!(requested, vec![48000, 44100]);
    assert_eq!(report.sample_rate, 44100);
    assert_eq!(report.frames, 441);
    let d = device.borrow();
    assert_eq!(d.created, 2);
    // Only the rebuilt scene reaches the output
    assert_eq!(d.renders, vec![441]);
}

/// Output suspended between build and render is resumed without a rebuild
#[test]
fn test_suspended_before_render_resumes() {
    let device = device(48000);
    let mut engine = engine(&device, reliable(), EngineOptions::default());

    let mut builds = 0;
    engine
        .play_with(|rate| {
            builds += 1;
            device.borrow_mut().forced_state = Some(ContextState::Suspended);
            StereoScene::silence(10, rate)
        })
        .unwrap();

    assert_eq!(builds, 1);
    assert_eq!(engine.state(), ContextState::Active);
    assert_eq!(device.borrow().renders, vec![10]);
}

/// A denied resume at the final check renders nothing
#[test]
fn test_denied_resume_before_render() {
    let device = device(48000);
    let mut engine = engine(&device, reliable(), EngineOptions::default());

    let err = engine
        .play_with(|rate| {
            let mut d = device.borrow_mut();
            d.forced_state = Some(ContextState::Suspended);
            d.deny_resume = true;
            StereoScene::silence(10, rate)
        })
        .unwrap_err();

    assert!(matches!(err, PlaybackError::ResourceUnavailable(_)));
    assert!(err.is_retryable());
    assert!(device.borrow().renders.is_empty());
    assert_eq!(engine.state(), ContextState::Suspended);
}
