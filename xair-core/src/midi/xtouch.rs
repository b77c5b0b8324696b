//! Behringer X-Touch Mini in MC mode.
//!
//! Encoders send relative CCs 16-23 (1-63 clockwise, 65-127 counter-clockwise),
//! encoder pushes and buttons send notes, the fader sends pitch bend. Rings are
//! driven with CCs 48-55 and button LEDs with note-on velocities.

use xair_types::{LedState, SurfaceEvent, SurfaceFeedback};

use super::MidiMessage;

const ENCODER_CC: [u8; 8] = [16, 17, 18, 19, 20, 21, 22, 23];
const PUSH_NOTES: [u8; 8] = [32, 33, 34, 35, 36, 37, 38, 39];
const BUTTON_NOTES: [u8; 18] = [
    89, 90, 40, 41, 42, 43, 44, 45, 87, 88, 91, 92, 86, 93, 94, 95, 84, 85,
];
const RING_CC: [u8; 8] = [48, 49, 50, 51, 52, 53, 54, 55];

const LED_OFF: u8 = 0;
const LED_BLINK: u8 = 1;
const LED_ON: u8 = 127;

/// Only a full-velocity note-on counts as a press.
const PRESS_VELOCITY: u8 = 127;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct XTouchMini {
    channel: u8,
}

impl XTouchMini {
    pub fn new(channel: u8) -> Self {
        Self {
            channel: channel & 0x0F,
        }
    }

    /// Translate a message from the surface. Messages on other channels,
    /// releases and unknown controls yield `None`.
    pub fn decode(&self, message: MidiMessage) -> Option<SurfaceEvent> {
        if message.channel() != self.channel {
            return None;
        }
        match message {
            MidiMessage::ControlChange {
                controller, value, ..
            } => {
                let index = ENCODER_CC.iter().position(|cc| *cc == controller)?;
                let delta = if value > 64 {
                    -((value - 64) as i32)
                } else {
                    value as i32
                };
                (delta != 0).then_some(SurfaceEvent::EncoderTurn { index, delta })
            }
            MidiMessage::NoteOn { note, velocity, .. } if velocity == PRESS_VELOCITY => {
                if let Some(index) = PUSH_NOTES.iter().position(|n| *n == note) {
                    Some(SurfaceEvent::EncoderPress { index })
                } else {
                    let index = BUTTON_NOTES.iter().position(|n| *n == note)?;
                    Some(SurfaceEvent::ButtonPress { index })
                }
            }
            MidiMessage::PitchBend { value, .. } => Some(SurfaceEvent::FaderMove {
                value: (value as f32 + 8192.0) / 16384.0,
            }),
            _ => None,
        }
    }

    /// The message that shows `feedback`, or `None` for an index the surface
    /// doesn't have.
    pub fn encode(&self, feedback: SurfaceFeedback) -> Option<MidiMessage> {
        match feedback {
            SurfaceFeedback::Ring { index, display } => Some(MidiMessage::ControlChange {
                channel: self.channel,
                controller: *RING_CC.get(index)?,
                value: display.ring_code(),
            }),
            SurfaceFeedback::Led { index, state } => Some(MidiMessage::NoteOn {
                channel: self.channel,
                note: *BUTTON_NOTES.get(index)?,
                velocity: match state {
                    LedState::Off => LED_OFF,
                    LedState::Blink => LED_BLINK,
                    LedState::On => LED_ON,
                },
            }),
        }
    }
}
