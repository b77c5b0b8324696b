//! Effect slot tracking for delay tempo sync.
//!
//! The mixer has four effect slots. When a slot holds a delay, its time
//! parameter (0..1 maps to 0..3 s) follows the tap tempo both ways.

use xair_types::ParameterWrite;

pub const FX_SLOTS: usize = 4;

/// Effect type ids whose time parameter is a delay time.
const DELAY_TYPES: [i32; 7] = [10, 11, 12, 21, 24, 25, 26];

/// Seconds covered by the full range of a delay time parameter.
const DELAY_TIME_RANGE_SECS: f32 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FxAddress {
    Type { slot: usize },
    Param { slot: usize, param: u8 },
}

impl FxAddress {
    /// Parse `/fx/N/type` or `/fx/N/par/PP`; `slot` is 0-based.
    pub fn parse(address: &str) -> Option<Self> {
        let rest = address.strip_prefix("/fx/")?;
        let (slot, tail) = rest.split_once('/')?;
        let slot = slot.parse::<usize>().ok()?.checked_sub(1)?;
        if slot >= FX_SLOTS {
            return None;
        }
        if tail == "type" {
            return Some(FxAddress::Type { slot });
        }
        let param = tail.strip_prefix("par/")?.parse().ok()?;
        Some(FxAddress::Param { slot, param })
    }
}

pub fn type_address(slot: usize) -> String {
    format!("/fx/{}/type", slot + 1)
}

fn is_delay(type_id: i32) -> bool {
    DELAY_TYPES.contains(&type_id)
}

/// Parameter carrying the delay time; only type 10 keeps it in slot 02.
fn time_param(type_id: i32) -> u8 {
    if type_id == 10 {
        2
    } else {
        1
    }
}

#[derive(Debug, Clone, Default)]
pub struct FxSlots {
    types: [Option<i32>; FX_SLOTS],
}

impl FxSlots {
    /// Record the effect type of `slot`. Returns the time parameter address to
    /// poll when the slot now holds a delay.
    pub fn record_type(&mut self, slot: usize, type_id: i32) -> Option<String> {
        self.types[slot] = Some(type_id);
        self.time_address(slot)
    }

    fn delay_type(&self, slot: usize) -> Option<i32> {
        self.types.get(slot).copied().flatten().filter(|t| is_delay(*t))
    }

    pub fn time_address(&self, slot: usize) -> Option<String> {
        let type_id = self.delay_type(slot)?;
        Some(format!("/fx/{}/par/{:02}", slot + 1, time_param(type_id)))
    }

    /// Tempo in seconds implied by a parameter report, if it is the time
    /// parameter of a delay slot.
    pub fn tempo_from_param(&self, slot: usize, param: u8, value: f32) -> Option<f32> {
        let type_id = self.delay_type(slot)?;
        (time_param(type_id) == param).then_some(value * DELAY_TIME_RANGE_SECS)
    }

    /// Writes that set every delay slot to `tempo_secs`.
    pub fn tempo_writes(&self, tempo_secs: f32) -> Vec<ParameterWrite> {
        let value = (tempo_secs / DELAY_TIME_RANGE_SECS).clamp(0.0, 1.0);
        (0..FX_SLOTS)
            .filter_map(|slot| self.time_address(slot))
            .map(|address| ParameterWrite::float(address, value))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fx_addresses() {
        assert_eq!(FxAddress::parse("/fx/1/type"), Some(FxAddress::Type { slot: 0 }));
        assert_eq!(
            FxAddress::parse("/fx/4/par/02"),
            Some(FxAddress::Param { slot: 3, param: 2 })
        );
        assert_eq!(FxAddress::parse("/fx/5/type"), None);
        assert_eq!(FxAddress::parse("/fx/0/type"), None);
        assert_eq!(FxAddress::parse("/fx/1/mix/on"), None);
    }

    #[test]
    fn delay_slots_track_tempo() {
        let mut fx = FxSlots::default();
        assert_eq!(fx.record_type(0, 10).as_deref(), Some("/fx/1/par/02"));
        assert_eq!(fx.record_type(1, 3), None);
        assert_eq!(fx.record_type(2, 11).as_deref(), Some("/fx/3/par/01"));

        assert_eq!(fx.tempo_from_param(0, 2, 0.25), Some(0.75));
        assert_eq!(fx.tempo_from_param(0, 1, 0.25), None);
        assert_eq!(fx.tempo_from_param(1, 1, 0.25), None);

        let writes = fx.tempo_writes(1.5);
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0], ParameterWrite::float("/fx/1/par/02", 0.5));
        assert_eq!(writes[1], ParameterWrite::float("/fx/3/par/01", 0.5));

        assert_eq!(fx.tempo_writes(9.0)[0].value.to_f32(), 1.0);
    }
}
