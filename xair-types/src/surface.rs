//! Control-surface vocabulary: inbound events and outbound feedback.

use serde::{Deserialize, Serialize};

/// Relative encoders per layer.
pub const ENCODER_COUNT: usize = 8;

/// Illuminated buttons per layer.
pub const BUTTON_COUNT: usize = 18;

/// A discrete event produced by the physical surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SurfaceEvent {
    /// Relative encoder movement in signed ticks
    EncoderTurn { index: usize, delta: i32 },
    EncoderPress { index: usize },
    ButtonPress { index: usize },
    /// Absolute fader position, 0.0..=1.0
    FaderMove { value: f32 },
}

/// Button LED state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedState {
    #[default]
    Off,
    On,
    Blink,
}

impl LedState {
    /// Mute buttons light up while the target is disabled.
    pub fn for_enable(enabled: bool) -> Self {
        if enabled {
            LedState::Off
        } else {
            LedState::On
        }
    }

    pub fn lit(on: bool) -> Self {
        if on {
            LedState::On
        } else {
            LedState::Off
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "off" => Some(LedState::Off),
            "on" => Some(LedState::On),
            "blink" => Some(LedState::Blink),
            _ => None,
        }
    }
}

/// What an encoder ring should show.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RingDisplay {
    /// All ring lights dark (unbound encoder)
    Off,
    Level(f32),
}

impl RingDisplay {
    /// Ring code understood by the surface firmware.
    ///
    /// 0 is dark; 1..=11 light a single position; 34..=44 light the fan pattern.
    /// Levels are spread over 22 steps so the lower half of fader travel
    /// (below roughly -10 dB) shows as a single light and the upper half as a fan.
    pub fn ring_code(self) -> u8 {
        match self {
            RingDisplay::Off => 0,
            RingDisplay::Level(v) => {
                let mut code = 1 + (v.clamp(0.0, 1.0) * 21.0).round_ties_even() as u8;
                if code > 11 {
                    code += 22;
                }
                code
            }
        }
    }
}

/// A feedback command for the surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SurfaceFeedback {
    Ring { index: usize, display: RingDisplay },
    Led { index: usize, state: LedState },
}
