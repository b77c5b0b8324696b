#![allow(dead_code)]
//! Test harness utilities for xair-core integration tests.

use std::time::Instant;

use crossbeam_channel::Sender;
use serde_json::{json, Value};
use xair_core::config::Config;
use xair_core::dispatch::{MixerLink, MixerState, SurfaceLink};
use xair_core::error::RemoteError;
use xair_core::layer::Layout;
use xair_core::osc::NetworkEvent;
use xair_core::runtime::{event_channel, EngineEvent, Runtime, ShutdownFlag};
use xair_core::tempo::TempoCell;
use xair_types::{ParamValue, ParameterWrite, SurfaceFeedback};

/// Mixer fake that records every write and query.
#[derive(Debug, Default)]
pub struct RecordingMixer {
    pub writes: Vec<ParameterWrite>,
    pub queries: Vec<String>,
    /// Simulate a dead network
    pub unavailable: bool,
}

impl MixerLink for RecordingMixer {
    fn send(&mut self, write: &ParameterWrite) -> Result<(), RemoteError> {
        if self.unavailable {
            return Err(RemoteError::mixer("unplugged"));
        }
        self.writes.push(write.clone());
        Ok(())
    }

    fn query(&mut self, address: &str) -> Result<(), RemoteError> {
        if self.unavailable {
            return Err(RemoteError::mixer("unplugged"));
        }
        self.queries.push(address.to_string());
        Ok(())
    }
}

/// Surface fake that records feedback; fails every send once `unplugged`.
#[derive(Debug, Default)]
pub struct RecordingSurface {
    pub feedback: Vec<SurfaceFeedback>,
    pub unplugged: bool,
}

impl SurfaceLink for RecordingSurface {
    fn feedback(&mut self, feedback: SurfaceFeedback) -> Result<(), RemoteError> {
        if self.unplugged {
            return Err(RemoteError::surface("device gone"));
        }
        self.feedback.push(feedback);
        Ok(())
    }
}

pub type TestRuntime = Runtime<RecordingMixer, RecordingSurface>;

fn idle_buttons() -> Vec<Value> {
    (0..18).map(|_| json!(["none"])).collect()
}

fn strip_encoders() -> Vec<Value> {
    (1..=8)
        .map(|i| json!({ "channel": format!("/ch/{:02}/mix", i), "bus": 0 }))
        .collect()
}

/// Two layers: "main" with mute/send/layer/clip/tap/quit buttons and the
/// main fader, "aux" pointing the same strips at whatever bus it inherits.
pub fn two_layer_layout() -> Layout {
    let mut main_buttons = idle_buttons();
    main_buttons[0] = json!(["mute", "/ch/01/mix", 0]);
    main_buttons[1] = json!(["send", 9]);
    main_buttons[2] = json!(["layer", "aux", 6]);
    main_buttons[3] = json!(["clip"]);
    main_buttons[4] = json!(["tap"]);
    main_buttons[5] = json!(["quit"]);

    let mut aux_buttons = idle_buttons();
    aux_buttons[0] = json!(["layer", "main", 0]);

    let doc = json!({
        "layers": [
            { "name": "main", "encoders": strip_encoders(), "buttons": main_buttons,
              "fader": ["level", "/lr/mix", 0] },
            { "name": "aux", "encoders": strip_encoders(), "buttons": aux_buttons,
              "fader": ["quit"] }
        ]
    });
    Layout::from_json(&doc.to_string()).expect("test layout is valid")
}

/// One layer whose first encoder shows the input 4 preamp gain.
pub fn headamp_layout() -> Layout {
    let mut encoders = strip_encoders();
    encoders[0] = json!({ "channel": "/headamp/04", "bus": 0 });
    let mut buttons = idle_buttons();
    buttons[0] = json!(["clip"]);
    buttons[1] = json!(["send", 3]);
    let doc = json!({
        "layers": [
            { "name": "gain", "encoders": encoders, "buttons": buttons, "fader": ["quit"] }
        ]
    });
    Layout::from_json(&doc.to_string()).expect("test layout is valid")
}

pub fn make_state(layout: Layout) -> MixerState {
    let config = Config::default();
    MixerState::new(layout, &config.tuning, &config.metering, TempoCell::default())
}

/// A runtime over recording fakes, started (initial reads done, first layer
/// painted) with the recordings cleared afterwards.
pub fn started_runtime(state: MixerState) -> (TestRuntime, Sender<EngineEvent>, ShutdownFlag) {
    let (tx, rx) = event_channel();
    let shutdown = ShutdownFlag::new();
    let mut runtime = Runtime::new(
        state,
        RecordingMixer::default(),
        RecordingSurface::default(),
        rx,
        shutdown.clone(),
    );
    runtime.startup();
    clear(&mut runtime);
    (runtime, tx, shutdown)
}

pub fn clear(runtime: &mut TestRuntime) {
    runtime.mixer_mut().writes.clear();
    runtime.mixer_mut().queries.clear();
    runtime.surface_mut().feedback.clear();
}

pub fn network(address: &str, value: ParamValue) -> EngineEvent {
    EngineEvent::Network(NetworkEvent::Parameter {
        address: address.to_string(),
        value,
    })
}

pub fn meters(samples: Vec<i16>) -> EngineEvent {
    EngineEvent::Network(NetworkEvent::Meters(samples))
}

/// Feed one event at the current time.
pub fn feed(runtime: &mut TestRuntime, event: EngineEvent) -> bool {
    runtime.handle(event, Instant::now())
}
