use std::path::{Path, PathBuf};
use std::time::Duration;

use xair_core::config::{self, Config};
use xair_core::dispatch::MixerState;
use xair_core::layer::Layout;
use xair_core::midi::{spawn_port_monitor, MidiSurface};
use xair_core::osc::OscClient;
use xair_core::runtime::{event_channel, EngineEvent, Runtime, ShutdownFlag};
use xair_core::tempo::{spawn_blink_loop, TempoCell};
use xair_core::{ConfigError, RemoteError};

use crate::Cli;

const LAYOUT_FILE: &str = "layout.json";

/// The layout named on the command line, else the user's `layout.json`, else
/// the one compiled in.
pub fn load_layout(explicit: Option<&Path>) -> Result<Layout, ConfigError> {
    if let Some(path) = explicit {
        return Layout::load(path);
    }
    match user_layout_path().filter(|p| p.exists()) {
        Some(path) => Layout::load(&path),
        None => {
            log::info!(target: "config", "using built-in layout");
            Layout::embedded()
        }
    }
}

fn user_layout_path() -> Option<PathBuf> {
    config::config_dir().map(|dir| dir.join(LAYOUT_FILE))
}

/// Connect both transports, start the background loops and run the dispatch
/// loop until shutdown.
pub fn run_bridge(cli: &Cli, config: &Config) -> Result<(), RemoteError> {
    let layout = load_layout(cli.layout.as_deref())?;
    log::info!(
        target: "config",
        "{} layers, {} channels",
        layout.layers.len(),
        layout.registry.len()
    );

    let tempo = TempoCell::default();
    let mut state = MixerState::new(layout, &config.tuning, &config.metering, tempo.clone());
    state.set_clip_enabled(cli.clip);
    state.set_log_levels(cli.levels);

    let shutdown = ShutdownFlag::new();
    let (tx, rx) = event_channel();

    let surface_tx = tx.clone();
    let surface = MidiSurface::open(&config.surface, move |event| {
        let _ = surface_tx.send(EngineEvent::Surface(event));
    })?;

    let network_tx = tx.clone();
    let mixer = OscClient::connect(&cli.mixer_address, config.mixer.port, shutdown.clone(), move |event| {
        network_tx.send(EngineEvent::Network(event)).is_ok()
    })?;
    let waited = Duration::from_millis(config.mixer.handshake_timeout_ms);
    if let Err(e) = mixer.handshake(waited) {
        shutdown.set();
        return Err(e);
    }

    log::info!(
        target: "runtime",
        "bridging {} and {}",
        surface.port_name(),
        mixer.mixer_addr()
    );

    let mut workers = vec![mixer.spawn_keepalive(
        Duration::from_secs(config.mixer.refresh_interval_secs),
        state.wants_meters(),
        shutdown.clone(),
    )?];

    let blink_tx = tx.clone();
    workers.push(spawn_blink_loop(tempo, shutdown.clone(), move |on| {
        blink_tx.send(EngineEvent::TempoBlink(on)).is_ok()
    })?);

    if cli.monitor {
        let lost_tx = tx.clone();
        workers.push(spawn_port_monitor(
            config.surface.port_match.clone(),
            shutdown.clone(),
            move || {
                let _ = lost_tx.send(EngineEvent::SurfaceLost);
            },
        )?);
    }
    drop(tx);

    let mut runtime = Runtime::new(state, mixer, surface, rx, shutdown)
        .with_read_spacing(Duration::from_millis(config.mixer.initial_read_spacing_ms));
    runtime.startup();
    runtime.run();
    runtime.surface_mut().close_input();

    for worker in workers {
        if worker.join().is_err() {
            log::warn!(target: "runtime", "a background loop panicked");
        }
    }
    log::info!(target: "runtime", "stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_layout_errors_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ \"layers\": [] }").unwrap();
        assert!(matches!(load_layout(Some(&path)), Err(ConfigError::NoLayers)));

        let missing = dir.path().join("missing.json");
        assert!(matches!(load_layout(Some(&missing)), Err(ConfigError::Io { .. })));
    }

    #[test]
    fn explicit_layout_is_used() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("one.json");
        let buttons: Vec<&str> = vec!["[\"none\"]"; 18];
        let doc = format!(
            "{{ \"layers\": [ {{ \"name\": \"only\", \"encoders\": [null,null,null,null,null,null,null,null], \
             \"buttons\": [{}], \"fader\": [\"quit\"] }} ] }}",
            buttons.join(",")
        );
        std::fs::write(&path, doc).unwrap();
        let layout = load_layout(Some(&path)).unwrap();
        assert_eq!(layout.layers.len(), 1);
        assert!(layout.registry.is_empty());
    }
}
