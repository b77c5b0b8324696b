//! Layers: named mappings from the surface's fixed controls to mixer parameters.
//!
//! A layer is built once from the layout file and never changes afterwards,
//! except for its `active_bus` cursor. Bindings refer to channels by
//! [`ChannelId`]; all cached values live in the shared [`ChannelRegistry`].

mod binding;
pub mod layout;

pub use binding::{ButtonBinding, EncoderBinding, FaderBinding, PressAction};
pub use layout::Layout;

use xair_types::{
    Bus, ButtonOutcome, EncoderOutcome, FaderOutcome, LedState, RingDisplay, BUTTON_COUNT,
    ENCODER_COUNT,
};

use crate::channel::{ChannelId, ChannelRegistry};

#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    name: String,
    encoders: Vec<Option<EncoderBinding>>,
    buttons: Vec<ButtonBinding>,
    fader: FaderBinding,
    active_bus: Bus,
}

impl Layer {
    /// Build a layer from already-validated bindings.
    ///
    /// The layout parser checks the binding counts before getting here.
    pub fn new(
        name: impl Into<String>,
        encoders: Vec<Option<EncoderBinding>>,
        buttons: Vec<ButtonBinding>,
        fader: FaderBinding,
    ) -> Self {
        debug_assert_eq!(encoders.len(), ENCODER_COUNT);
        debug_assert_eq!(buttons.len(), BUTTON_COUNT);
        Self {
            name: name.into(),
            encoders,
            buttons,
            fader,
            active_bus: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn active_bus(&self) -> Bus {
        self.active_bus
    }

    pub fn set_active_bus(&mut self, bus: Bus) {
        self.active_bus = bus;
    }

    pub fn encoder(&self, index: usize) -> Option<&EncoderBinding> {
        self.encoders.get(index).and_then(|b| b.as_ref())
    }

    pub fn button(&self, index: usize) -> Option<&ButtonBinding> {
        self.buttons.get(index)
    }

    pub fn fader(&self) -> &FaderBinding {
        &self.fader
    }

    pub fn buttons(&self) -> impl Iterator<Item = (usize, &ButtonBinding)> {
        self.buttons.iter().enumerate()
    }

    /// The bus an encoder currently addresses: its own bus while no send is
    /// selected or its channel has no sends, otherwise the selected send.
    pub fn encoder_bus(&self, binding: &EncoderBinding) -> Bus {
        if self.active_bus == 0 || !binding.has_sends {
            binding.bus
        } else {
            self.active_bus
        }
    }

    pub fn resolve_encoder_turn(
        &self,
        registry: &mut ChannelRegistry,
        index: usize,
        delta: i32,
    ) -> EncoderOutcome {
        let Some(binding) = self.encoder(index) else {
            return EncoderOutcome::NoAction {
                display: RingDisplay::Off,
            };
        };
        let bus = self.encoder_bus(binding);
        let write = registry.change_level(binding.channel, bus, delta);
        EncoderOutcome::SendParameter {
            write,
            display: ring_for(registry, binding.channel, bus),
        }
    }

    pub fn resolve_encoder_press(
        &self,
        registry: &mut ChannelRegistry,
        index: usize,
    ) -> EncoderOutcome {
        let Some(binding) = self.encoder(index) else {
            return EncoderOutcome::NoAction {
                display: RingDisplay::Off,
            };
        };
        let bus = self.encoder_bus(binding);
        match &binding.press {
            PressAction::Reset(value) => {
                let write = registry.get_mut(binding.channel).set_level(bus, *value);
                EncoderOutcome::SendParameter {
                    write,
                    display: ring_for(registry, binding.channel, bus),
                }
            }
            PressAction::ToggleMute { channel, bus: mute_bus } => {
                let (write, _) = registry.get_mut(*channel).toggle_mute(*mute_bus);
                EncoderOutcome::SendParameter {
                    write,
                    display: ring_for(registry, binding.channel, bus),
                }
            }
            PressAction::Subprocess(name) => EncoderOutcome::RunSubprocess {
                name: name.clone(),
                display: ring_for(registry, binding.channel, bus),
            },
        }
    }

    pub fn resolve_button_press(
        &mut self,
        registry: &mut ChannelRegistry,
        index: usize,
    ) -> ButtonOutcome {
        let Some(binding) = self.buttons.get(index) else {
            return ButtonOutcome::NoAction { led: LedState::Off };
        };
        match binding {
            ButtonBinding::Mute { channel, bus } => {
                let (write, enabled) = registry.get_mut(*channel).toggle_mute(*bus);
                ButtonOutcome::SendParameter {
                    write,
                    led: LedState::for_enable(enabled),
                }
            }
            ButtonBinding::LayerSwitch { target, max_bus } => ButtonOutcome::SwitchLayer {
                name: target.clone(),
                bus_cursor: self.active_bus.min(*max_bus),
            },
            ButtonBinding::SendSelect(bus) => {
                let bus = *bus;
                if self.active_bus == bus {
                    self.active_bus = 0;
                } else {
                    self.active_bus = bus;
                }
                ButtonOutcome::SelectSend {
                    active_bus: self.active_bus,
                    led: LedState::lit(self.active_bus == bus),
                }
            }
            ButtonBinding::ClipToggle => ButtonOutcome::ToggleClip,
            ButtonBinding::TapTempo => ButtonOutcome::TapTempo,
            ButtonBinding::Quit => ButtonOutcome::Quit,
            ButtonBinding::Fixed(led) => ButtonOutcome::NoAction { led: *led },
        }
    }

    /// `quit_threshold` is the fraction of travel above which a quit-bound
    /// fader requests shutdown.
    pub fn resolve_fader_move(
        &self,
        registry: &mut ChannelRegistry,
        value: f32,
        quit_threshold: f32,
    ) -> FaderOutcome {
        match &self.fader {
            FaderBinding::Quit if value > quit_threshold => FaderOutcome::Quit,
            FaderBinding::Quit => FaderOutcome::NoAction,
            FaderBinding::Level { channel, bus } => {
                FaderOutcome::SendParameter(registry.get_mut(*channel).set_level(*bus, value))
            }
        }
    }

    /// Encoders currently showing the level of `channel` on `bus`.
    pub fn encoder_indices_for(
        &self,
        channel: ChannelId,
        bus: Bus,
    ) -> impl Iterator<Item = usize> + '_ {
        self.encoders
            .iter()
            .enumerate()
            .filter_map(move |(i, b)| match b {
                Some(b) if b.channel == channel && self.encoder_bus(b) == bus => Some(i),
                _ => None,
            })
    }

    /// Mute buttons bound to `channel` on `bus`.
    pub fn button_indices_for(
        &self,
        channel: ChannelId,
        bus: Bus,
    ) -> impl Iterator<Item = usize> + '_ {
        self.buttons
            .iter()
            .enumerate()
            .filter_map(move |(i, binding)| match binding {
                ButtonBinding::Mute { channel: c, bus: b } if *c == channel && *b == bus => Some(i),
                _ => None,
            })
    }

    pub fn encoder_index_for(&self, channel: ChannelId, bus: Bus) -> Option<usize> {
        self.encoder_indices_for(channel, bus).next()
    }

    pub fn button_index_for(&self, channel: ChannelId, bus: Bus) -> Option<usize> {
        self.button_indices_for(channel, bus).next()
    }

    pub fn encoder_display(&self, registry: &ChannelRegistry, index: usize) -> RingDisplay {
        match self.encoder(index) {
            Some(b) => ring_for(registry, b.channel, self.encoder_bus(b)),
            None => RingDisplay::Off,
        }
    }

    pub fn button_led(&self, registry: &ChannelRegistry, index: usize, clip_enabled: bool) -> LedState {
        match self.buttons.get(index) {
            Some(ButtonBinding::Mute { channel, bus }) => {
                LedState::for_enable(registry.get(*channel).is_enabled(*bus))
            }
            Some(ButtonBinding::LayerSwitch { target, .. }) => LedState::lit(*target == self.name),
            Some(ButtonBinding::SendSelect(bus)) => LedState::lit(self.active_bus == *bus),
            Some(ButtonBinding::ClipToggle) => LedState::lit(clip_enabled),
            Some(ButtonBinding::Fixed(led)) => *led,
            Some(ButtonBinding::TapTempo) | Some(ButtonBinding::Quit) | None => LedState::Off,
        }
    }

    pub fn has_clip_toggle(&self) -> bool {
        self.buttons.iter().any(|b| matches!(b, ButtonBinding::ClipToggle))
    }

    pub fn tap_buttons(&self) -> impl Iterator<Item = usize> + '_ {
        self.buttons
            .iter()
            .enumerate()
            .filter(|(_, b)| matches!(b, ButtonBinding::TapTempo))
            .map(|(i, _)| i)
    }
}

fn ring_for(registry: &ChannelRegistry, channel: ChannelId, bus: Bus) -> RingDisplay {
    RingDisplay::Level(registry.get(channel).sent_level(bus))
}
