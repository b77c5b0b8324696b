//! Outcome types for control resolution.
//!
//! A layer resolves a physical control into one of these tagged values; the
//! coordinator branches on the variant instead of inspecting strings.

use crate::{Bus, LedState, ParamValue, RingDisplay};

/// Which side of the bridge originated a parameter change.
///
/// A change is only ever mirrored to the *other* side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    FromSurface,
    FromNetwork,
}

/// A fully-qualified parameter write destined for the mixer.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterWrite {
    pub address: String,
    pub value: ParamValue,
}

impl ParameterWrite {
    pub fn new(address: impl Into<String>, value: ParamValue) -> Self {
        Self {
            address: address.into(),
            value,
        }
    }

    pub fn float(address: impl Into<String>, value: f32) -> Self {
        Self::new(address, ParamValue::Float(value))
    }

    pub fn int(address: impl Into<String>, value: i32) -> Self {
        Self::new(address, ParamValue::Int(value))
    }
}

/// Result of turning or pressing an encoder.
#[derive(Debug, Clone, PartialEq)]
pub enum EncoderOutcome {
    SendParameter {
        write: ParameterWrite,
        display: RingDisplay,
    },
    /// Fire a named side-effect binding; nothing is sent to the mixer
    RunSubprocess { name: String, display: RingDisplay },
    NoAction { display: RingDisplay },
}

impl EncoderOutcome {
    pub fn display(&self) -> RingDisplay {
        match self {
            EncoderOutcome::SendParameter { display, .. }
            | EncoderOutcome::RunSubprocess { display, .. }
            | EncoderOutcome::NoAction { display } => *display,
        }
    }
}

/// Result of pressing one of the illuminated buttons.
#[derive(Debug, Clone, PartialEq)]
pub enum ButtonOutcome {
    SendParameter { write: ParameterWrite, led: LedState },
    SwitchLayer { name: String, bus_cursor: Bus },
    /// The layer's bus cursor moved; `led` reflects whether the send is now selected
    SelectSend { active_bus: Bus, led: LedState },
    ToggleClip,
    TapTempo,
    Quit,
    NoAction { led: LedState },
}

/// Result of moving the fader.
#[derive(Debug, Clone, PartialEq)]
pub enum FaderOutcome {
    SendParameter(ParameterWrite),
    Quit,
    NoAction,
}
