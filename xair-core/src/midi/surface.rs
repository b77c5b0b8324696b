use std::thread::JoinHandle;
use std::time::Duration;

use midir::{MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};
use xair_types::{SurfaceEvent, SurfaceFeedback};

use super::{parse_midi_message, XTouchMini};
use crate::config::SurfaceConfig;
use crate::dispatch::SurfaceLink;
use crate::error::RemoteError;
use crate::runtime::ShutdownFlag;

const CLIENT_NAME: &str = "xair-remote";

/// How often the port monitor looks for the surface.
const MONITOR_INTERVAL: Duration = Duration::from_secs(1);

/// An open control surface: the input callback forwards decoded events,
/// feedback goes out through the output connection.
pub struct MidiSurface {
    input: Option<MidiInputConnection<()>>,
    output: Option<MidiOutputConnection>,
    port_name: String,
    mapping: XTouchMini,
}

impl MidiSurface {
    /// Open the first input and output ports whose name contains
    /// `config.port_match` (case-insensitive). `on_event` runs on the MIDI
    /// driver's thread.
    pub fn open<F>(config: &SurfaceConfig, mut on_event: F) -> Result<Self, RemoteError>
    where
        F: FnMut(SurfaceEvent) + Send + 'static,
    {
        let mapping = XTouchMini::new(config.midi_channel);
        let needle = config.port_match.to_lowercase();

        let midi_out = MidiOutput::new(CLIENT_NAME).map_err(|e| RemoteError::surface(e.to_string()))?;
        let out_port = midi_out
            .ports()
            .into_iter()
            .find(|p| port_matches(midi_out.port_name(p).ok(), &needle))
            .ok_or_else(|| RemoteError::surface(format!("no MIDI output matching '{}'", config.port_match)))?;

        let midi_in = MidiInput::new(CLIENT_NAME).map_err(|e| RemoteError::surface(e.to_string()))?;
        let in_port = midi_in
            .ports()
            .into_iter()
            .find(|p| port_matches(midi_in.port_name(p).ok(), &needle))
            .ok_or_else(|| RemoteError::surface(format!("no MIDI input matching '{}'", config.port_match)))?;
        let port_name = midi_in
            .port_name(&in_port)
            .unwrap_or_else(|_| "Unknown".to_string());

        let output = midi_out
            .connect(&out_port, "xair-remote-out")
            .map_err(|e| RemoteError::surface(e.to_string()))?;

        let input = midi_in
            .connect(
                &in_port,
                "xair-remote-in",
                move |_timestamp, message, _| {
                    match parse_midi_message(message).and_then(|m| mapping.decode(m)) {
                        Some(event) => on_event(event),
                        None => log::debug!(target: "surface", "ignored {:02x?}", message),
                    }
                },
                (),
            )
            .map_err(|e| RemoteError::surface(e.to_string()))?;

        log::info!(target: "surface", "using MIDI port {}", port_name);
        Ok(Self {
            input: Some(input),
            output: Some(output),
            port_name,
            mapping,
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Stop listening; feedback can still be sent until the surface is dropped.
    pub fn close_input(&mut self) {
        if let Some(conn) = self.input.take() {
            conn.close();
        }
    }
}

impl SurfaceLink for MidiSurface {
    fn feedback(&mut self, feedback: SurfaceFeedback) -> Result<(), RemoteError> {
        let Some(message) = self.mapping.encode(feedback) else {
            log::debug!(target: "surface", "no control for {:?}", feedback);
            return Ok(());
        };
        let output = self
            .output
            .as_mut()
            .ok_or_else(|| RemoteError::surface("output closed"))?;
        output
            .send(&message.to_bytes())
            .map_err(|e| RemoteError::surface(e.to_string()))
    }
}

impl Drop for MidiSurface {
    fn drop(&mut self) {
        self.close_input();
        if let Some(conn) = self.output.take() {
            conn.close();
        }
    }
}

fn port_matches(name: Option<String>, needle: &str) -> bool {
    name.is_some_and(|n| n.to_lowercase().contains(needle))
}

/// Whether an input port matching `port_match` is currently listed.
pub fn port_present(port_match: &str) -> bool {
    let needle = port_match.to_lowercase();
    match MidiInput::new(&format!("{}-monitor", CLIENT_NAME)) {
        Ok(midi_in) => midi_in
            .ports()
            .iter()
            .any(|p| port_matches(midi_in.port_name(p).ok(), &needle)),
        Err(e) => {
            log::warn!(target: "surface", "cannot list MIDI ports: {}", e);
            false
        }
    }
}

/// Check once per second that the surface is still connected; call `on_lost`
/// and stop when it disappears or shutdown starts.
pub fn spawn_port_monitor<F>(
    port_match: String,
    shutdown: ShutdownFlag,
    on_lost: F,
) -> std::io::Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    std::thread::Builder::new()
        .name("surface-monitor".into())
        .spawn(move || {
            log::info!(target: "surface", "monitoring connection to '{}'", port_match);
            while !shutdown.is_set() {
                if !port_present(&port_match) {
                    log::error!(target: "surface", "control surface disconnected");
                    on_lost();
                    return;
                }
                std::thread::sleep(MONITOR_INTERVAL);
            }
        })
}
