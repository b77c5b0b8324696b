//! Channel strips and the registry that owns them.
//!
//! A [`Channel`] caches the primary level and the ten send levels of one
//! addressable parameter group, together with their enable bits. Every layer
//! refers to channels through a [`ChannelId`] into one shared
//! [`ChannelRegistry`], so two layers addressing the same strip observe a
//! single source of truth.

use std::collections::HashMap;

use xair_types::{Bus, ParamValue, ParameterWrite, SLOT_COUNT};

/// Default number of relative-encoder ticks per full level travel.
pub const DEFAULT_ENCODER_DIVISOR: f32 = 200.0;

/// Index of a channel inside the [`ChannelRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelId(usize);

impl ChannelId {
    pub fn get(self) -> usize {
        self.0
    }
}

/// The addressing family a channel belongs to, derived from its base address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    /// `/config/mute/N`; the base address itself carries the on/off state
    MuteGroup,
    /// `/headamp/NN`; the primary level is the preamp gain
    Headamp,
    Strip,
}

impl ChannelKind {
    pub fn of(address: &str) -> Self {
        if address.starts_with("/config") {
            ChannelKind::MuteGroup
        } else if address.starts_with("/head") {
            ChannelKind::Headamp
        } else {
            ChannelKind::Strip
        }
    }
}

/// Mute groups use the opposite polarity on the wire: `1` means the group mute
/// is engaged, i.e. the internal "on" bit is clear.
pub fn is_mute_group(address: &str) -> bool {
    address.starts_with("/config/mute")
}

/// Input strips and returns expose per-bus send levels.
pub fn has_sends(address: &str) -> bool {
    address.starts_with("/ch") || address.starts_with("/rtn")
}

/// Flip an on/off payload between internal and wire polarity.
pub fn invert_enable(value: ParamValue) -> ParamValue {
    ParamValue::Int(if value.is_on() { 0 } else { 1 })
}

/// A cached slot change decoded from an inbound parameter address.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SlotUpdate {
    Level { bus: Bus, value: f32 },
    Enable { bus: Bus, enabled: bool },
}

impl SlotUpdate {
    pub fn bus(&self) -> Bus {
        match self {
            SlotUpdate::Level { bus, .. } | SlotUpdate::Enable { bus, .. } => *bus,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    base_address: String,
    kind: ChannelKind,
    levels: [f32; SLOT_COUNT],
    enables: [bool; SLOT_COUNT],
    /// Levels that have been set locally or reported by the mixer at least once
    synced: [bool; SLOT_COUNT],
}

impl Channel {
    pub fn new(base_address: impl Into<String>) -> Self {
        let base_address = base_address.into();
        Self {
            kind: ChannelKind::of(&base_address),
            base_address,
            levels: [0.0; SLOT_COUNT],
            enables: [true; SLOT_COUNT],
            synced: [false; SLOT_COUNT],
        }
    }

    pub fn base_address(&self) -> &str {
        &self.base_address
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    pub fn has_sends(&self) -> bool {
        has_sends(&self.base_address)
    }

    /// Address carrying the level of `bus`.
    pub fn level_address(&self, bus: Bus) -> String {
        if bus > 0 {
            return format!("{}/{:02}/level", self.base_address, bus);
        }
        match self.kind {
            ChannelKind::MuteGroup => self.base_address.clone(),
            ChannelKind::Headamp => format!("{}/gain", self.base_address),
            ChannelKind::Strip => format!("{}/fader", self.base_address),
        }
    }

    /// Address carrying the on/off state of `bus`. Sends have no on/off
    /// parameter of their own, so their mute is expressed through the level.
    pub fn mute_address(&self, bus: Bus) -> String {
        if bus > 0 {
            return self.level_address(bus);
        }
        match self.kind {
            ChannelKind::MuteGroup => self.base_address.clone(),
            _ => format!("{}/on", self.base_address),
        }
    }

    pub fn level(&self, bus: Bus) -> f32 {
        self.levels[bus as usize]
    }

    pub fn is_synced(&self, bus: Bus) -> bool {
        self.synced[bus as usize]
    }

    /// The level actually put on the wire: a disabled send always reads zero
    /// while its cached level is kept for when it is re-enabled.
    pub fn sent_level(&self, bus: Bus) -> f32 {
        if bus > 0 && !self.enables[bus as usize] {
            0.0
        } else {
            self.levels[bus as usize]
        }
    }

    /// Store `value` as-is and return the write that mirrors it.
    pub fn set_level(&mut self, bus: Bus, value: f32) -> ParameterWrite {
        self.levels[bus as usize] = value;
        self.synced[bus as usize] = true;
        ParameterWrite::float(self.level_address(bus), self.sent_level(bus))
    }

    /// Apply a relative encoder movement: `clamp(old + delta / divisor, 0, 1)`.
    pub fn change_level(&mut self, bus: Bus, delta: i32, divisor: f32) -> ParameterWrite {
        let value = (self.level(bus) + delta as f32 / divisor).clamp(0.0, 1.0);
        self.set_level(bus, value)
    }

    pub fn is_enabled(&self, bus: Bus) -> bool {
        self.enables[bus as usize]
    }

    pub fn set_enabled(&mut self, bus: Bus, enabled: bool) {
        self.enables[bus as usize] = enabled;
    }

    /// Flip the enable bit of `bus`. Returns the write to send and the new state.
    ///
    /// The write is in internal polarity; mute groups are inverted on the way out.
    pub fn toggle_mute(&mut self, bus: Bus) -> (ParameterWrite, bool) {
        let enabled = !self.enables[bus as usize];
        self.enables[bus as usize] = enabled;
        (self.mute_write(bus), enabled)
    }

    /// The write that carries the current enable state of `bus`.
    pub fn mute_write(&self, bus: Bus) -> ParameterWrite {
        if bus > 0 {
            ParameterWrite::float(self.mute_address(bus), self.sent_level(bus))
        } else {
            ParameterWrite::int(self.mute_address(bus), self.enables[0] as i32)
        }
    }

    /// Decode the part of an inbound address below the base address.
    ///
    /// `value` must already be in internal polarity.
    pub fn decode_update(&self, suffix: &str, value: ParamValue) -> Option<SlotUpdate> {
        match suffix {
            "" if self.kind == ChannelKind::MuteGroup => Some(SlotUpdate::Enable {
                bus: 0,
                enabled: value.is_on(),
            }),
            "/fader" | "/gain" => Some(SlotUpdate::Level {
                bus: 0,
                value: value.to_f32(),
            }),
            "/on" => Some(SlotUpdate::Enable {
                bus: 0,
                enabled: value.is_on(),
            }),
            _ => {
                let bus = suffix
                    .strip_suffix("/level")?
                    .strip_prefix('/')?
                    .parse::<Bus>()
                    .ok()?;
                if bus == 0 || bus as usize >= SLOT_COUNT {
                    return None;
                }
                Some(SlotUpdate::Level {
                    bus,
                    value: value.to_f32(),
                })
            }
        }
    }

    /// Apply a decoded update. Returns false when it matches the cache already
    /// (an echo of our own write, or a redundant refresh).
    pub fn apply(&mut self, update: SlotUpdate) -> bool {
        match update {
            SlotUpdate::Level { bus, value } => {
                let slot = bus as usize;
                if bus > 0 && !self.enables[slot] {
                    // A muted send reads zero on the wire; any other level unmutes it
                    if value == 0.0 {
                        return false;
                    }
                    self.enables[slot] = true;
                }
                let unchanged = self.synced[slot] && self.levels[slot] == value;
                self.levels[slot] = value;
                self.synced[slot] = true;
                !unchanged
            }
            SlotUpdate::Enable { bus, enabled } => {
                let slot = bus as usize;
                if self.enables[slot] == enabled {
                    return false;
                }
                self.enables[slot] = enabled;
                true
            }
        }
    }

    /// Addresses to poll for a full initial read of this channel.
    pub fn poll_addresses(&self) -> Vec<String> {
        let mut out = vec![self.level_address(0)];
        if self.kind != ChannelKind::MuteGroup && self.kind != ChannelKind::Headamp {
            out.push(self.mute_address(0));
        }
        if self.has_sends() {
            out.extend((1..SLOT_COUNT as Bus).map(|bus| self.level_address(bus)));
        }
        out
    }
}

/// Channels keyed by base address, created lazily and never removed.
#[derive(Debug, Clone)]
pub struct ChannelRegistry {
    channels: Vec<Channel>,
    by_address: HashMap<String, ChannelId>,
    encoder_divisor: f32,
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::with_divisor(DEFAULT_ENCODER_DIVISOR)
    }

    pub fn with_divisor(encoder_divisor: f32) -> Self {
        Self {
            channels: Vec::new(),
            by_address: HashMap::new(),
            encoder_divisor,
        }
    }

    pub fn encoder_divisor(&self) -> f32 {
        self.encoder_divisor
    }

    pub fn set_encoder_divisor(&mut self, divisor: f32) {
        self.encoder_divisor = divisor;
    }

    /// Look up a channel by base address, creating it on first reference.
    pub fn get_or_insert(&mut self, base_address: &str) -> ChannelId {
        if let Some(id) = self.by_address.get(base_address) {
            return *id;
        }
        let id = ChannelId(self.channels.len());
        self.channels.push(Channel::new(base_address));
        self.by_address.insert(base_address.to_string(), id);
        id
    }

    pub fn find(&self, base_address: &str) -> Option<ChannelId> {
        self.by_address.get(base_address).copied()
    }

    pub fn get(&self, id: ChannelId) -> &Channel {
        &self.channels[id.0]
    }

    pub fn get_mut(&mut self, id: ChannelId) -> &mut Channel {
        &mut self.channels[id.0]
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ChannelId, &Channel)> {
        self.channels
            .iter()
            .enumerate()
            .map(|(i, c)| (ChannelId(i), c))
    }

    /// Relative level change using the registry's encoder sensitivity.
    pub fn change_level(&mut self, id: ChannelId, bus: Bus, delta: i32) -> ParameterWrite {
        let divisor = self.encoder_divisor;
        self.get_mut(id).change_level(bus, delta, divisor)
    }

    /// Find the channel owning `address` by trying its three-segment prefix,
    /// then its two-segment prefix, then the whole address. Returns the channel
    /// and the remainder of the address below its base.
    pub fn resolve<'a>(&self, address: &'a str) -> Option<(ChannelId, &'a str)> {
        for segments in [3, 2] {
            if let Some(split) = prefix_end(address, segments) {
                if let Some(id) = self.find(&address[..split]) {
                    return Some((id, &address[split..]));
                }
            }
        }
        self.find(address).map(|id| (id, ""))
    }
}

/// Byte offset where the first `segments` slash-delimited segments end.
fn prefix_end(address: &str, segments: usize) -> Option<usize> {
    let mut seen = 0;
    for (i, c) in address.char_indices().skip(1) {
        if c == '/' {
            seen += 1;
            if seen == segments {
                return Some(i);
            }
        }
    }
    // The whole address has exactly `segments` segments
    if seen + 1 == segments && address.len() > 1 {
        Some(address.len())
    } else {
        None
    }
}
