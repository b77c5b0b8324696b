//! The single-writer event loop.
//!
//! Every input source (surface callback, OSC receive thread, blink loop, port
//! monitor) only sends [`EngineEvent`]s into one channel. The runtime is the
//! sole consumer: it hands each event to the [`MixerState`], then applies the
//! collected side effects to the transports.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use xair_types::SurfaceEvent;

use crate::dispatch::{apply_side_effects, MixerLink, MixerState, SideEffect, SurfaceLink};
use crate::osc::NetworkEvent;

/// How often an idle loop re-checks the shutdown flag.
const IDLE_TICK: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Surface(SurfaceEvent),
    Network(NetworkEvent),
    TempoBlink(bool),
    /// The surface port disappeared
    SurfaceLost,
    Shutdown,
}

pub fn event_channel() -> (Sender<EngineEvent>, Receiver<EngineEvent>) {
    crossbeam_channel::unbounded()
}

/// Cooperative shutdown signal shared by every loop.
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Sleep for `duration`, waking early once the flag is set.
    pub fn sleep(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        while !self.is_set() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            std::thread::sleep((deadline - now).min(IDLE_TICK));
        }
    }
}

pub struct Runtime<M: MixerLink, S: SurfaceLink> {
    state: MixerState,
    mixer: M,
    surface: S,
    events: Receiver<EngineEvent>,
    shutdown: ShutdownFlag,
    read_spacing: Duration,
    surface_lost: bool,
}

impl<M: MixerLink, S: SurfaceLink> Runtime<M, S> {
    pub fn new(
        state: MixerState,
        mixer: M,
        surface: S,
        events: Receiver<EngineEvent>,
        shutdown: ShutdownFlag,
    ) -> Self {
        Self {
            state,
            mixer,
            surface,
            events,
            shutdown,
            read_spacing: Duration::ZERO,
            surface_lost: false,
        }
    }

    /// Pause between initial reads so the mixer isn't flooded.
    pub fn with_read_spacing(mut self, spacing: Duration) -> Self {
        self.read_spacing = spacing;
        self
    }

    pub fn state(&self) -> &MixerState {
        &self.state
    }

    pub fn mixer(&self) -> &M {
        &self.mixer
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn mixer_mut(&mut self) -> &mut M {
        &mut self.mixer
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    /// Poll the mixer for every mapped parameter, then paint the first layer.
    pub fn startup(&mut self) {
        let reads = self.state.initial_reads();
        log::info!(target: "runtime", "reading {} parameters", reads.len());
        for address in reads {
            if self.shutdown.is_set() {
                return;
            }
            if let Err(e) = self.mixer.query(&address) {
                log::warn!(target: "mixer", "query {} failed: {}", address, e);
            }
            if !self.read_spacing.is_zero() {
                std::thread::sleep(self.read_spacing);
            }
        }
        let mut effects = Vec::new();
        self.state.full_refresh(&mut effects);
        self.apply(&effects);
    }

    /// Handle one event. Returns false once the loop should stop.
    pub fn handle(&mut self, event: EngineEvent, now: Instant) -> bool {
        let mut effects = Vec::new();
        match event {
            EngineEvent::Surface(event) => self.state.on_surface_event(event, now, &mut effects),
            EngineEvent::Network(NetworkEvent::Parameter { address, value }) => {
                self.state.on_network_update(&address, value, &mut effects)
            }
            EngineEvent::Network(NetworkEvent::Meters(samples)) => {
                self.state.on_meter_batch(&samples, &mut effects)
            }
            EngineEvent::TempoBlink(on) => self.state.on_tempo_blink(on, &mut effects),
            EngineEvent::SurfaceLost => {
                log::error!(target: "runtime", "control surface lost, shutting down");
                self.surface_lost = true;
                return false;
            }
            EngineEvent::Shutdown => return false,
        }
        !self.apply(&effects)
    }

    /// Apply effects; true when they ask for shutdown.
    fn apply(&mut self, effects: &[SideEffect]) -> bool {
        let applied = apply_side_effects(effects, &mut self.mixer, &mut self.surface);
        if applied.surface_lost {
            self.surface_lost = true;
        }
        applied.shutdown
    }

    /// Consume events until shutdown, then clean up.
    pub fn run(&mut self) {
        while !self.shutdown.is_set() {
            match self.events.recv_timeout(IDLE_TICK) {
                Ok(event) => {
                    if !self.handle(event, Instant::now()) {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    log::warn!(target: "runtime", "all event sources closed");
                    break;
                }
            }
        }
        self.cleanup();
    }

    /// Stop every loop and darken the surface.
    pub fn cleanup(&mut self) {
        self.shutdown.set();
        if self.surface_lost {
            return;
        }
        let mut effects = Vec::new();
        self.state.shutdown_feedback(&mut effects);
        self.apply(&effects);
        log::info!(target: "runtime", "surface cleared");
    }
}
