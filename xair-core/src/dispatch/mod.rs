//! The state coordinator.
//!
//! [`MixerState`] owns every channel, every layer and the derived behaviours
//! (tap tempo, clip protection, delay sync). Each handler resolves one event,
//! mutates the cache and pushes the resulting transport operations into a
//! `Vec<SideEffect>`; it never performs I/O itself.
//!
//! Every change carries a [`Provenance`]. Surface-originated changes are
//! written to the mixer and reflected on the originating control. Network
//! changes only ever produce surface feedback, and only for controls that are
//! visible on the current layer.

mod fx;
pub mod side_effects;

pub use fx::{FxAddress, FxSlots, FX_SLOTS};
pub use side_effects::{apply_side_effects, Applied, MixerLink, SideEffect, SurfaceLink};

use std::time::Instant;

use xair_types::{
    Bus, ButtonOutcome, EncoderOutcome, FaderOutcome, LedState, ParamValue, ParameterWrite,
    Provenance, RingDisplay, SurfaceEvent, SurfaceFeedback, BUTTON_COUNT, ENCODER_COUNT,
};

use crate::channel::{invert_enable, is_mute_group, ChannelId, ChannelKind, ChannelRegistry};
use crate::config::{MeteringConfig, TuningConfig};
use crate::layer::{ButtonBinding, Layer, Layout};
use crate::meter::{ClipGuard, MeterBank, METER_CHANNELS};
use crate::subprocess::SubprocessTable;
use crate::tempo::{TempoCell, TempoDetector};

/// Mute groups polled on startup.
const MUTE_GROUPS: usize = 4;

pub struct MixerState {
    registry: ChannelRegistry,
    layers: Vec<Layer>,
    current: usize,
    subprocesses: SubprocessTable,
    tempo: TempoDetector,
    tempo_cell: TempoCell,
    fx: FxSlots,
    meters: MeterBank,
    clip: ClipGuard,
    headamp_step: i32,
    quit_threshold: f32,
    log_levels: bool,
    quitting: bool,
}

impl MixerState {
    pub fn new(
        layout: Layout,
        tuning: &TuningConfig,
        metering: &MeteringConfig,
        tempo_cell: TempoCell,
    ) -> Self {
        let Layout {
            mut registry,
            layers,
            subprocesses,
        } = layout;
        registry.set_encoder_divisor(tuning.encoder_divisor);
        Self {
            registry,
            layers,
            current: 0,
            subprocesses,
            tempo: TempoDetector::new(),
            tempo_cell,
            fx: FxSlots::default(),
            meters: MeterBank::new(metering.meter_scale),
            clip: ClipGuard::new(metering.clip_threshold_db, metering.excluded_channels.iter().copied()),
            headamp_step: metering.headamp_step,
            quit_threshold: tuning.fader_quit_threshold,
            log_levels: false,
            quitting: false,
        }
    }

    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    pub fn current_layer(&self) -> &Layer {
        &self.layers[self.current]
    }

    pub fn clip_enabled(&self) -> bool {
        self.clip.is_enabled()
    }

    pub fn set_clip_enabled(&mut self, enabled: bool) {
        self.clip.set_enabled(enabled);
    }

    pub fn set_log_levels(&mut self, enabled: bool) {
        self.log_levels = enabled;
    }

    pub fn is_quitting(&self) -> bool {
        self.quitting
    }

    pub fn tempo(&self) -> &TempoCell {
        &self.tempo_cell
    }

    /// Clip protection can be switched on at some point.
    fn clip_possible(&self) -> bool {
        self.clip.is_enabled() || self.layers.iter().any(Layer::has_clip_toggle)
    }

    /// Whether the meter subscription has to be kept alive.
    pub fn wants_meters(&self) -> bool {
        self.log_levels || self.clip_possible()
    }

    // ── Surface events ──

    pub fn on_surface_event(&mut self, event: SurfaceEvent, now: Instant, effects: &mut Vec<SideEffect>) {
        match event {
            SurfaceEvent::EncoderTurn { index, delta } => self.on_control_turn(index, delta, effects),
            SurfaceEvent::EncoderPress { index } => self.on_encoder_press(index, effects),
            SurfaceEvent::ButtonPress { index } => self.on_button_press(index, now, effects),
            SurfaceEvent::FaderMove { value } => self.on_fader_move(value, effects),
        }
    }

    pub fn on_control_turn(&mut self, index: usize, delta: i32, effects: &mut Vec<SideEffect>) {
        let outcome =
            self.layers[self.current].resolve_encoder_turn(&mut self.registry, index, delta);
        let ring = SurfaceFeedback::Ring {
            index,
            display: outcome.display(),
        };
        match outcome {
            EncoderOutcome::SendParameter { write, .. } => {
                self.mirror(Provenance::FromSurface, Some(write), [ring], effects)
            }
            _ => effects.push(SideEffect::Surface(ring)),
        }
    }

    pub fn on_encoder_press(&mut self, index: usize, effects: &mut Vec<SideEffect>) {
        let outcome = self.layers[self.current].resolve_encoder_press(&mut self.registry, index);
        let ring = SurfaceFeedback::Ring {
            index,
            display: outcome.display(),
        };
        match outcome {
            EncoderOutcome::SendParameter { write, .. } => {
                self.mirror(Provenance::FromSurface, Some(write), [ring], effects);
                // A press may have toggled a mute shown by a button
                self.led_refresh(effects);
            }
            EncoderOutcome::RunSubprocess { name, .. } => {
                if let Some(argv) = self.subprocesses.toggle(&name) {
                    effects.push(SideEffect::RunCommand { name, argv });
                }
                effects.push(SideEffect::Surface(ring));
            }
            EncoderOutcome::NoAction { .. } => effects.push(SideEffect::Surface(ring)),
        }
    }

    pub fn on_button_press(&mut self, index: usize, now: Instant, effects: &mut Vec<SideEffect>) {
        let outcome = self.layers[self.current].resolve_button_press(&mut self.registry, index);
        match outcome {
            ButtonOutcome::SendParameter { write, led } => {
                let bus_mute = !is_mute_group(&write.address) && write.address.ends_with("/level");
                self.mirror(
                    Provenance::FromSurface,
                    Some(write),
                    [SurfaceFeedback::Led { index, state: led }],
                    effects,
                );
                if bus_mute {
                    // Disabling a send zeroes what its ring shows
                    self.ring_refresh(effects);
                }
            }
            ButtonOutcome::SwitchLayer { name, bus_cursor } => {
                match self.layers.iter().position(|l| l.name() == name) {
                    Some(target) => {
                        self.current = target;
                        self.layers[target].set_active_bus(bus_cursor);
                        log::info!(target: "dispatch", "layer '{}' (bus {})", name, bus_cursor);
                        self.full_refresh(effects);
                    }
                    None => log::warn!(target: "dispatch", "no layer named '{}'", name),
                }
            }
            ButtonOutcome::SelectSend { active_bus, .. } => {
                log::debug!(target: "dispatch", "active bus {}", active_bus);
                self.ring_refresh(effects);
                self.led_refresh_where(effects, |b| matches!(b, ButtonBinding::SendSelect(_)));
            }
            ButtonOutcome::ToggleClip => {
                let enabled = self.clip.toggle();
                log::info!(target: "meter", "clip protection {}", if enabled { "on" } else { "off" });
                self.led_refresh_where(effects, |b| matches!(b, ButtonBinding::ClipToggle));
            }
            ButtonOutcome::TapTempo => {
                if let Some(tempo) = self.tempo.tap(now) {
                    self.publish_tempo(tempo, effects);
                }
            }
            ButtonOutcome::Quit => self.request_shutdown(effects),
            ButtonOutcome::NoAction { led } => {
                effects.push(SideEffect::Surface(SurfaceFeedback::Led { index, state: led }))
            }
        }
    }

    pub fn on_fader_move(&mut self, value: f32, effects: &mut Vec<SideEffect>) {
        let outcome = self.layers[self.current].resolve_fader_move(
            &mut self.registry,
            value,
            self.quit_threshold,
        );
        match outcome {
            FaderOutcome::SendParameter(write) => {
                self.mirror(Provenance::FromSurface, Some(write), [], effects)
            }
            FaderOutcome::Quit => self.request_shutdown(effects),
            FaderOutcome::NoAction => {}
        }
    }

    // ── Network events ──

    /// A parameter report from the mixer. Unknown addresses are dropped.
    pub fn on_network_update(&mut self, address: &str, value: ParamValue, effects: &mut Vec<SideEffect>) {
        if let Some(fx) = FxAddress::parse(address) {
            self.on_fx_update(fx, value, effects);
            return;
        }
        let Some((id, suffix)) = self.registry.resolve(address) else {
            log::debug!(target: "dispatch", "unmapped {} {}", address, value);
            return;
        };
        let channel = self.registry.get_mut(id);
        let value = if channel.kind() == ChannelKind::MuteGroup {
            invert_enable(value)
        } else {
            value
        };
        let Some(update) = channel.decode_update(suffix, value) else {
            log::debug!(target: "dispatch", "unhandled {} {}", address, value);
            return;
        };
        if !channel.apply(update) {
            return;
        }
        log::debug!(target: "dispatch", "{} <- {}", address, value);
        let feedback = self.visible_feedback(id, update.bus());
        self.mirror(Provenance::FromNetwork, None, feedback, effects);
    }

    fn on_fx_update(&mut self, fx: FxAddress, value: ParamValue, effects: &mut Vec<SideEffect>) {
        match fx {
            FxAddress::Type { slot } => {
                let type_id = match value {
                    ParamValue::Int(i) => i,
                    ParamValue::Float(f) => f as i32,
                };
                if let Some(address) = self.fx.record_type(slot, type_id) {
                    log::debug!(target: "dispatch", "fx {} is a delay", slot + 1);
                    effects.push(SideEffect::query(address));
                }
            }
            FxAddress::Param { slot, param } => {
                if let Some(tempo) = self.fx.tempo_from_param(slot, param, value.to_f32()) {
                    log::info!(target: "tempo", "delay time {:.3}s from fx {}", tempo, slot + 1);
                    self.tempo_cell.set(tempo);
                }
            }
        }
    }

    /// One telemetry frame: smooth every input and run clip protection.
    pub fn on_meter_batch(&mut self, samples: &[i16], effects: &mut Vec<SideEffect>) {
        let smoothed = self.meters.push_batch(samples);
        if self.log_levels {
            let line: Vec<String> = smoothed.iter().map(|db| format!("{:.1}", db)).collect();
            log::debug!(target: "meter", "{}", line.join(" "));
        }
        for index in self.clip.tripped(&smoothed) {
            let address = headamp_address(index);
            let Some(id) = self.registry.find(&address) else {
                continue;
            };
            if !self.registry.get(id).is_synced(0) {
                log::debug!(target: "meter", "{} not read yet, skipping", address);
                continue;
            }
            let write = self.registry.change_level(id, 0, self.headamp_step);
            log::info!(
                target: "meter",
                "input {} at {:.1} dB, gain -> {:.3}",
                index + 1,
                smoothed[index],
                write.value.to_f32()
            );
            // Same path as a turn on the surface, without an originating control
            let feedback = self.visible_feedback(id, 0);
            self.mirror(Provenance::FromSurface, Some(write), feedback, effects);
        }
    }

    pub fn on_tempo_blink(&mut self, on: bool, effects: &mut Vec<SideEffect>) {
        let state = LedState::lit(on);
        effects.extend(
            self.current_layer()
                .tap_buttons()
                .map(|index| SideEffect::Surface(SurfaceFeedback::Led { index, state })),
        );
    }

    fn publish_tempo(&mut self, tempo: f32, effects: &mut Vec<SideEffect>) {
        log::info!(target: "tempo", "tempo {:.3}s ({:.0} BPM)", tempo, 60.0 / tempo);
        self.tempo_cell.set(tempo);
        for write in self.fx.tempo_writes(tempo) {
            self.mirror(Provenance::FromSurface, Some(write), [], effects);
        }
    }

    fn request_shutdown(&mut self, effects: &mut Vec<SideEffect>) {
        log::info!(target: "dispatch", "quit requested");
        self.quitting = true;
        effects.push(SideEffect::Shutdown);
    }

    // ── Mirroring ──

    /// Route a change to the side that did not originate it. Network changes
    /// are never written back to the mixer.
    fn mirror(
        &self,
        provenance: Provenance,
        write: Option<ParameterWrite>,
        feedback: impl IntoIterator<Item = SurfaceFeedback>,
        effects: &mut Vec<SideEffect>,
    ) {
        match (provenance, write) {
            (Provenance::FromSurface, Some(write)) => effects.push(SideEffect::Mixer(to_wire(write))),
            (Provenance::FromNetwork, Some(write)) => {
                log::debug!(target: "dispatch", "not echoing {} to the mixer", write.address)
            }
            (_, None) => {}
        }
        effects.extend(feedback.into_iter().map(SideEffect::Surface));
    }

    /// Feedback for every control of the current layer showing `channel` on `bus`.
    fn visible_feedback(&self, channel: ChannelId, bus: Bus) -> Vec<SurfaceFeedback> {
        let layer = self.current_layer();
        let rings = layer.encoder_indices_for(channel, bus).map(|index| SurfaceFeedback::Ring {
            index,
            display: layer.encoder_display(&self.registry, index),
        });
        let leds = layer.button_indices_for(channel, bus).map(|index| SurfaceFeedback::Led {
            index,
            state: layer.button_led(&self.registry, index, self.clip.is_enabled()),
        });
        rings.chain(leds).collect()
    }

    // ── Refresh ──

    /// Every ring and every LED of the current layer.
    pub fn full_refresh(&self, effects: &mut Vec<SideEffect>) {
        self.ring_refresh(effects);
        self.led_refresh(effects);
    }

    pub fn ring_refresh(&self, effects: &mut Vec<SideEffect>) {
        let layer = self.current_layer();
        effects.extend((0..ENCODER_COUNT).map(|index| {
            SideEffect::Surface(SurfaceFeedback::Ring {
                index,
                display: layer.encoder_display(&self.registry, index),
            })
        }));
    }

    fn led_refresh(&self, effects: &mut Vec<SideEffect>) {
        self.led_refresh_where(effects, |_| true);
    }

    fn led_refresh_where(&self, effects: &mut Vec<SideEffect>, keep: impl Fn(&ButtonBinding) -> bool) {
        let layer = self.current_layer();
        let clip = self.clip.is_enabled();
        effects.extend(layer.buttons().filter(|(_, b)| keep(b)).map(|(index, _)| {
            SideEffect::Surface(SurfaceFeedback::Led {
                index,
                state: layer.button_led(&self.registry, index, clip),
            })
        }));
    }

    /// Everything dark, for shutdown.
    pub fn shutdown_feedback(&self, effects: &mut Vec<SideEffect>) {
        effects.extend((0..BUTTON_COUNT).map(|index| {
            SideEffect::Surface(SurfaceFeedback::Led {
                index,
                state: LedState::Off,
            })
        }));
        effects.extend((0..ENCODER_COUNT).map(|index| {
            SideEffect::Surface(SurfaceFeedback::Ring {
                index,
                display: RingDisplay::Off,
            })
        }));
    }

    // ── Startup ──

    /// Addresses to poll once after the handshake: every mapped channel, the
    /// mute groups and the effect slot types.
    ///
    /// Headamps of meterable inputs are registered here when clip protection
    /// may be used, so their gain is known before the first trip.
    pub fn initial_reads(&mut self) -> Vec<String> {
        if self.clip_possible() {
            for index in 0..METER_CHANNELS {
                self.registry.get_or_insert(&headamp_address(index));
            }
        }
        let mut reads: Vec<String> = self
            .registry
            .iter()
            .flat_map(|(_, channel)| channel.poll_addresses())
            .collect();
        for group in 1..=MUTE_GROUPS {
            let address = format!("/config/mute/{}", group);
            if self.registry.find(&address).is_none() {
                reads.push(address);
            }
        }
        reads.extend((0..FX_SLOTS).map(fx::type_address));
        reads
    }
}

/// `/headamp/NN` for a 0-based meter index.
pub fn headamp_address(index: usize) -> String {
    format!("/headamp/{:02}", index + 1)
}

/// Convert a write from internal to wire polarity.
fn to_wire(write: ParameterWrite) -> ParameterWrite {
    if is_mute_group(&write.address) {
        ParameterWrite::new(write.address, invert_enable(write.value))
    } else {
        write
    }
}
