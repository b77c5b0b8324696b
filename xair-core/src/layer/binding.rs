use xair_types::{Bus, LedState};

use crate::channel::ChannelId;

/// What pressing an encoder does.
#[derive(Debug, Clone, PartialEq)]
pub enum PressAction {
    /// Set the encoder's level to an absolute value
    Reset(f32),
    ToggleMute { channel: ChannelId, bus: Bus },
    /// Run a named subprocess toggle
    Subprocess(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct EncoderBinding {
    pub channel: ChannelId,
    pub bus: Bus,
    /// The channel has per-bus send levels a selected send can address
    pub has_sends: bool,
    pub press: PressAction,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ButtonBinding {
    Mute { channel: ChannelId, bus: Bus },
    LayerSwitch { target: String, max_bus: Bus },
    SendSelect(Bus),
    ClipToggle,
    TapTempo,
    Quit,
    /// Does nothing; the LED shows a fixed state
    Fixed(LedState),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FaderBinding {
    /// Pulling the fader to the top end requests shutdown
    Quit,
    Level { channel: ChannelId, bus: Bus },
}
