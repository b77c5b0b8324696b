//! MIDI plumbing for the control surface: raw message parsing and encoding,
//! the X-Touch Mini control map and the `midir` transport.

mod surface;
pub mod xtouch;

pub use surface::{port_present, spawn_port_monitor, MidiSurface};
pub use xtouch::XTouchMini;

/// The channel-voice messages the surface speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiMessage {
    NoteOn {
        channel: u8,
        note: u8,
        velocity: u8,
    },
    NoteOff {
        channel: u8,
        note: u8,
    },
    ControlChange {
        channel: u8,
        controller: u8,
        value: u8,
    },
    PitchBend {
        channel: u8,
        /// -8192 (full down) to +8191 (full up), 0 = center
        value: i16,
    },
}

impl MidiMessage {
    pub fn channel(&self) -> u8 {
        match self {
            MidiMessage::NoteOn { channel, .. }
            | MidiMessage::NoteOff { channel, .. }
            | MidiMessage::ControlChange { channel, .. }
            | MidiMessage::PitchBend { channel, .. } => *channel,
        }
    }

    /// Wire bytes; data bytes are masked to 7 bits.
    pub fn to_bytes(&self) -> [u8; 3] {
        match *self {
            MidiMessage::NoteOn {
                channel,
                note,
                velocity,
            } => [0x90 | (channel & 0x0F), note & 0x7F, velocity & 0x7F],
            MidiMessage::NoteOff { channel, note } => [0x80 | (channel & 0x0F), note & 0x7F, 0],
            MidiMessage::ControlChange {
                channel,
                controller,
                value,
            } => [0xB0 | (channel & 0x0F), controller & 0x7F, value & 0x7F],
            MidiMessage::PitchBend { channel, value } => {
                let raw = (value.clamp(-8192, 8191) + 8192) as u16;
                [0xE0 | (channel & 0x0F), (raw & 0x7F) as u8, (raw >> 7) as u8]
            }
        }
    }
}

/// Parse a raw MIDI message. Anything but the four message types above, and
/// truncated messages, yield `None`.
pub fn parse_midi_message(data: &[u8]) -> Option<MidiMessage> {
    let (&status, rest) = data.split_first()?;
    let channel = status & 0x0F;
    let [d1, d2] = *rest.first_chunk::<2>()?;

    match status & 0xF0 {
        0x80 => Some(MidiMessage::NoteOff { channel, note: d1 }),
        // Note On with velocity 0 is a Note Off
        0x90 if d2 == 0 => Some(MidiMessage::NoteOff { channel, note: d1 }),
        0x90 => Some(MidiMessage::NoteOn {
            channel,
            note: d1,
            velocity: d2,
        }),
        0xB0 => Some(MidiMessage::ControlChange {
            channel,
            controller: d1,
            value: d2,
        }),
        0xE0 => {
            let value = (((d2 as i16) << 7) | d1 as i16) - 8192;
            Some(MidiMessage::PitchBend { channel, value })
        }
        _ => None,
    }
}
